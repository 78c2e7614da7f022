//! Bytecode opcodes for the Somir VM.

use thiserror::Error;

/// Bytecode opcode enumeration.
///
/// All opcodes are single-byte instructions; multi-byte operands follow
/// the opcode little-endian. Categories:
/// - 0x00-0x0F: stack & constants
/// - 0x10-0x1F: locals, upvalues, globals
/// - 0x20-0x2F: arithmetic & logic
/// - 0x30-0x3F: control flow
/// - 0x40-0x4F: aggregates & calls
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// No operation
    NoOp = 0x00,
    /// Push constants[k] (operand: u16 k)
    Constant = 0x01,
    /// Discard n values (operand: u16 n)
    Pop = 0x02,
    /// Discard the top value (expression statements)
    Ignore = 0x03,

    /// Push the value at slot i; negative i addresses an upvalue (operand: i16 i)
    Local = 0x10,
    /// Store the top value into slot i (operand: i16 i)
    SetLocal = 0x11,
    /// Record the top value as the next local slot
    Let = 0x12,
    /// Push the global named by constants[k], a string (operand: u16 k)
    Global = 0x13,

    /// Arithmetic negation: pop a, push -a
    UniMinus = 0x20,
    /// Boolean negation: pop a, push not a
    Not = 0x21,
    /// Pop b, pop a, push a + b
    BinPlus = 0x22,
    /// Pop b, pop a, push a - b
    BinMinus = 0x23,
    /// Pop b, pop a, push a * b
    Multiply = 0x24,
    /// Pop b, pop a, push a / b (real division)
    Divide = 0x25,
    /// Pop b, pop a, push a % b
    Modulo = 0x26,
    /// Pop b, pop a, push a ^ b
    Power = 0x27,
    /// Pop b, pop a, push a and b
    And = 0x28,
    /// Pop b, pop a, push a or b
    Or = 0x29,
    /// Pop b, pop a, push a == b
    Equals = 0x2A,
    /// Pop b, pop a, push a < b
    Less = 0x2B,
    /// Pop b, pop a, push a <= b
    LessOrEq = 0x2C,
    /// Pop index, pop list, push list[index]
    Index = 0x2D,

    /// Unconditional jump (operand: i16 displacement from the byte after it)
    Jump = 0x30,
    /// Pop a boolean; jump when false (operand: i16 displacement)
    JumpIfNot = 0x31,
    /// Pop one value and return it
    Return = 0x32,

    /// Pop n values, push a list of them (operand: u16 n)
    MakeList = 0x40,
    /// Pop n arguments then the callee, push the result (operand: u16 n)
    Call = 0x41,
    /// Build a closure (operands: u16 proto, u16 n_args, u16 n_upvalues,
    /// then i16 × n_upvalues source slots)
    MakeFunc = 0x42,
    /// Pop a receiver, push a bound method (operands: u16 k_ns, u16 k_name,
    /// both string constants)
    MakeMethod = 0x43,
}

impl Opcode {
    /// Mnemonic used by the disassembler.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::NoOp => "NO_OP",
            Opcode::Constant => "CONSTANT",
            Opcode::Pop => "POP",
            Opcode::Ignore => "IGNORE",
            Opcode::Local => "LOCAL",
            Opcode::SetLocal => "SET_LOCAL",
            Opcode::Let => "LET",
            Opcode::Global => "GLOBAL",
            Opcode::UniMinus => "UNI_MINUS",
            Opcode::Not => "NOT",
            Opcode::BinPlus => "BIN_PLUS",
            Opcode::BinMinus => "BIN_MINUS",
            Opcode::Multiply => "MULTIPLY",
            Opcode::Divide => "DIVIDE",
            Opcode::Modulo => "MODULO",
            Opcode::Power => "POWER",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Equals => "EQUALS",
            Opcode::Less => "LESS",
            Opcode::LessOrEq => "LESS_OR_EQ",
            Opcode::Index => "INDEX",
            Opcode::Jump => "JUMP",
            Opcode::JumpIfNot => "JUMP_IF_NOT",
            Opcode::Return => "RETURN",
            Opcode::MakeList => "MAKE_LIST",
            Opcode::Call => "CALL",
            Opcode::MakeFunc => "MAKE_FUNC",
            Opcode::MakeMethod => "MAKE_METHOD",
        }
    }
}

/// Raised when a byte does not name an opcode.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid opcode byte {0:#04x}")]
pub struct InvalidOpcode(pub u8);

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcode;

    fn try_from(byte: u8) -> Result<Opcode, InvalidOpcode> {
        Ok(match byte {
            0x00 => Opcode::NoOp,
            0x01 => Opcode::Constant,
            0x02 => Opcode::Pop,
            0x03 => Opcode::Ignore,
            0x10 => Opcode::Local,
            0x11 => Opcode::SetLocal,
            0x12 => Opcode::Let,
            0x13 => Opcode::Global,
            0x20 => Opcode::UniMinus,
            0x21 => Opcode::Not,
            0x22 => Opcode::BinPlus,
            0x23 => Opcode::BinMinus,
            0x24 => Opcode::Multiply,
            0x25 => Opcode::Divide,
            0x26 => Opcode::Modulo,
            0x27 => Opcode::Power,
            0x28 => Opcode::And,
            0x29 => Opcode::Or,
            0x2A => Opcode::Equals,
            0x2B => Opcode::Less,
            0x2C => Opcode::LessOrEq,
            0x2D => Opcode::Index,
            0x30 => Opcode::Jump,
            0x31 => Opcode::JumpIfNot,
            0x32 => Opcode::Return,
            0x40 => Opcode::MakeList,
            0x41 => Opcode::Call,
            0x42 => Opcode::MakeFunc,
            0x43 => Opcode::MakeMethod,
            other => return Err(InvalidOpcode(other)),
        })
    }
}
