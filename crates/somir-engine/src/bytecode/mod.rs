//! Somir bytecode definitions.
//!
//! This module provides the instruction set, the chunk/prototype model
//! the emitter writes into, the serialized module format behind the
//! `Somir&` magic, and a disassembler.

pub mod chunk;
pub mod disasm;
pub mod encoder;
pub mod opcode;

pub use chunk::{Chunk, ChunkError, FunctionProto, JumpOutOfRange, MAGIC};
pub use disasm::{decode_function, disassemble, DisasmError, Instruction};
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use opcode::{InvalidOpcode, Opcode};
