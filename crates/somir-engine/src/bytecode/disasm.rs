//! Instruction decoder and human-readable chunk listing.
//!
//! The decoder is also what the test suite uses to state properties
//! about emitted code (slot discipline, jump containment) without
//! hand-counting byte offsets.

use std::fmt::Write as _;

use thiserror::Error;

use super::chunk::Chunk;
use super::opcode::{InvalidOpcode, Opcode};

/// Errors from decoding a bytecode buffer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DisasmError {
    /// A byte that does not name an opcode.
    #[error(transparent)]
    InvalidOpcode(#[from] InvalidOpcode),
    /// An operand ran past the end of the buffer.
    #[error("truncated operand at offset {0}")]
    TruncatedOperand(usize),
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Byte offset of the opcode.
    pub offset: usize,
    /// The opcode.
    pub opcode: Opcode,
    /// Operands widened to i32; u16 operands decode non-negative.
    pub operands: Vec<i32>,
}

impl Instruction {
    /// Offset of the byte after this instruction.
    pub fn end(&self) -> usize {
        self.offset + 1 + 2 * self.operands.len()
    }
}

/// Decode a whole prototype body into instructions.
pub fn decode_function(code: &[u8]) -> Result<Vec<Instruction>, DisasmError> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < code.len() {
        let offset = pos;
        let opcode = Opcode::try_from(code[pos])?;
        pos += 1;
        let mut operands = Vec::new();
        match opcode {
            Opcode::NoOp
            | Opcode::Ignore
            | Opcode::Let
            | Opcode::UniMinus
            | Opcode::Not
            | Opcode::BinPlus
            | Opcode::BinMinus
            | Opcode::Multiply
            | Opcode::Divide
            | Opcode::Modulo
            | Opcode::Power
            | Opcode::And
            | Opcode::Or
            | Opcode::Equals
            | Opcode::Less
            | Opcode::LessOrEq
            | Opcode::Index
            | Opcode::Return => {}

            Opcode::Constant | Opcode::Pop | Opcode::Global | Opcode::MakeList | Opcode::Call => {
                operands.push(read_u16(code, &mut pos)? as i32);
            }

            Opcode::Local | Opcode::SetLocal | Opcode::Jump | Opcode::JumpIfNot => {
                operands.push(read_i16(code, &mut pos)? as i32);
            }

            Opcode::MakeMethod => {
                operands.push(read_u16(code, &mut pos)? as i32);
                operands.push(read_u16(code, &mut pos)? as i32);
            }

            Opcode::MakeFunc => {
                let proto = read_u16(code, &mut pos)?;
                let n_args = read_u16(code, &mut pos)?;
                let n_upvalues = read_u16(code, &mut pos)?;
                operands.push(proto as i32);
                operands.push(n_args as i32);
                operands.push(n_upvalues as i32);
                for _ in 0..n_upvalues {
                    operands.push(read_i16(code, &mut pos)? as i32);
                }
            }
        }
        out.push(Instruction {
            offset,
            opcode,
            operands,
        });
    }
    Ok(out)
}

fn read_u16(code: &[u8], pos: &mut usize) -> Result<u16, DisasmError> {
    let bytes = code
        .get(*pos..*pos + 2)
        .ok_or(DisasmError::TruncatedOperand(*pos))?;
    *pos += 2;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_i16(code: &[u8], pos: &mut usize) -> Result<i16, DisasmError> {
    let bytes = code
        .get(*pos..*pos + 2)
        .ok_or(DisasmError::TruncatedOperand(*pos))?;
    *pos += 2;
    Ok(i16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Render a chunk as a listing, one instruction per line.
pub fn disassemble(chunk: &Chunk) -> String {
    let mut out = String::new();
    out.push_str("constants:\n");
    for (index, value) in chunk.constants().iter().enumerate() {
        let _ = writeln!(out, "  {index:5}  {value}");
    }
    for (index, func) in chunk.functions.iter().enumerate() {
        let _ = writeln!(
            out,
            "fn {index} (arity {}, upvalues {:?}):",
            func.arity, func.upvalues
        );
        match decode_function(&func.code) {
            Ok(instructions) => {
                for inst in instructions {
                    let _ = write!(out, "  {:04}  {}", inst.offset, inst.opcode.mnemonic());
                    for operand in &inst.operands {
                        let _ = write!(out, " {operand}");
                    }
                    out.push('\n');
                }
            }
            Err(err) => {
                let _ = writeln!(out, "  <decode error: {err}>");
            }
        }
    }
    out
}
