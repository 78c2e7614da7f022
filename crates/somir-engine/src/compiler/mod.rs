//! The compile pipeline: scope resolution, type walking, and bytecode
//! emission.
//!
//! Compilation is two interleaved passes per statement. The type walker
//! ([`walker`]) attaches a resolved type to every expression and rejects
//! ill-typed programs; the emitter ([`emitter`]) then appends bytecode,
//! resolving jumps, function prototypes, and closure upvalues. Both
//! share the scope stack in [`context`].

pub mod context;
pub mod emitter;
pub mod error;
pub mod walker;

pub use context::{Binding, Scope, ScopeStack};
pub use error::{CompileError, CompileResult};

use crate::bytecode::chunk::{Chunk, FunctionProto};
use crate::gc::Heap;
use crate::parser::ast::Block;
use crate::types::{define_std_globals, Globals, TypeNamespace};

/// Compiles parsed programs against a fixed type and global namespace.
pub struct Compiler {
    types: TypeNamespace,
    globals: Globals,
    heap: Heap,
}

impl Compiler {
    /// A compiler with the standard namespaces, allocating on `heap`.
    pub fn new(heap: Heap) -> Compiler {
        let types = TypeNamespace::new();
        let mut globals = Globals::new();
        define_std_globals(&mut globals, &types);
        Compiler {
            types,
            globals,
            heap,
        }
    }

    /// The type namespace.
    pub fn types(&self) -> &TypeNamespace {
        &self.types
    }

    /// The globals namespace, mutable so embedders can register more
    /// standard-library declarations before compiling.
    pub fn globals_mut(&mut self) -> &mut Globals {
        &mut self.globals
    }

    /// Compile a program block into a chunk.
    ///
    /// Prototype 0 is the program's top level, typed as returning `any`.
    /// On error the partially built chunk is discarded.
    pub fn compile_program(&self, program: &mut Block) -> CompileResult<Chunk> {
        let mut codegen = Codegen {
            types: &self.types,
            globals: &self.globals,
            heap: self.heap.clone(),
            chunk: Chunk::new(&self.heap),
            scopes: ScopeStack::new(),
        };
        let main = codegen.reserve_prototype()?;
        let any = self.types.any_type();
        codegen.compile_function(main, program, &[], &any)?;
        Ok(codegen.chunk)
    }
}

/// Working state for one program compilation, split across `walker`
/// (type computation) and `emitter` (bytecode emission).
pub(crate) struct Codegen<'a> {
    pub(crate) types: &'a TypeNamespace,
    pub(crate) globals: &'a Globals,
    pub(crate) heap: Heap,
    pub(crate) chunk: Chunk,
    pub(crate) scopes: ScopeStack,
}

impl Codegen<'_> {
    /// Reserve the next prototype index, pushing an empty prototype so
    /// nested reservations cannot collide.
    pub(crate) fn reserve_prototype(&mut self) -> CompileResult<u16> {
        if self.chunk.functions.len() >= u16::MAX as usize {
            return Err(CompileError::new("Too many functions in program"));
        }
        let index = self.chunk.functions.len() as u16;
        self.chunk.functions.push(FunctionProto::default());
        Ok(index)
    }
}
