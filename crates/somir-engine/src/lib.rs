//! Somir language engine.
//!
//! Somir is a small, statically typed scripting language with
//! dynamically scoped closures, compiled to a compact stack bytecode
//! for a companion virtual machine. This crate is the front half of the
//! toolchain:
//!
//! - **Parser**: indentation-aware lexer and recursive-descent parser
//!   (`parser` module)
//! - **Types**: named descriptors, assignability, method tables
//!   (`types` module)
//! - **GC**: mark-and-sweep heap shared by the compiler and the VM
//!   (`gc` module)
//! - **Bytecode**: chunk model, serialization, disassembly (`bytecode`
//!   module)
//! - **Compiler**: type walker and bytecode emitter (`compiler` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use somir_engine::{compiler::Compiler, gc::Heap, parser::parse_program};
//!
//! let heap = Heap::new();
//! let mut program = parse_program("let x = 2 + 3 * 4")?;
//! let chunk = Compiler::new(heap).compile_program(&mut program)?;
//! std::fs::write("out.smc", chunk.encode())?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bytecode;
pub mod compiler;
pub mod gc;
pub mod parser;
pub mod types;
pub mod value;

pub use bytecode::chunk::Chunk;
pub use compiler::{CompileError, Compiler};
pub use gc::Heap;
pub use parser::{parse_program, ParseError};
pub use value::Value;
