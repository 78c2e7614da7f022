//! Lexical scope tracking for the compile pipeline.
//!
//! A scope stack mirrors the nesting of function bodies and blocks.
//! Locals get non-negative slots assigned strictly increasing in source
//! order; variables captured from an enclosing function get negative
//! upvalue slots, allocated downward from -1. A nested block continues
//! its parent's local numbering, so sibling blocks reuse stack
//! positions after the emitter pops them.

use rustc_hash::FxHashMap;

use super::error::{CompileError, CompileResult};
use crate::types::TypeRef;

/// A resolved variable: its slot and declared type.
///
/// Slots `>= 0` index the enclosing function's stack frame; slots `< 0`
/// index its upvalue vector (slot `-n` is upvalue `n - 1`).
#[derive(Debug, Clone)]
pub struct Binding {
    /// Local slot (non-negative) or upvalue slot (negative).
    pub slot: i16,
    /// Declared type.
    pub ty: TypeRef,
}

/// One lexical scope: a function top or a nested block.
#[derive(Debug)]
pub struct Scope {
    func_top: bool,
    vars: FxHashMap<String, Binding>,
    next_local: i16,
    next_upvalue: i16,
    /// Parent-context slots captured by this function, in upvalue order.
    pub upvalues: Vec<i16>,
    local_count: u16,
}

impl Scope {
    fn new(func_top: bool, next_local: i16) -> Scope {
        Scope {
            func_top,
            vars: FxHashMap::default(),
            next_local,
            next_upvalue: -1,
            upvalues: Vec::new(),
            local_count: 0,
        }
    }
}

/// The scope stack for one compilation.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    /// An empty stack.
    pub fn new() -> ScopeStack {
        ScopeStack::default()
    }

    /// Open a function-top scope. Local numbering restarts at 0.
    pub fn push_function(&mut self) {
        self.scopes.push(Scope::new(true, 0));
    }

    /// Open a nested block scope. Local numbering continues from the
    /// enclosing scope.
    pub fn push_block(&mut self) {
        let next_local = self.scopes.last().map(|s| s.next_local).unwrap_or(0);
        self.scopes.push(Scope::new(false, next_local));
    }

    /// Close the innermost scope, returning it. Function tops expose
    /// their upvalue list through the returned scope.
    pub fn pop(&mut self) -> Option<Scope> {
        self.scopes.pop()
    }

    /// Locals declared directly in the innermost scope.
    pub fn local_count(&self) -> u16 {
        self.scopes.last().map(|s| s.local_count).unwrap_or(0)
    }

    /// Declare `name` at the next local slot of the enclosing function.
    pub fn define_local(&mut self, name: &str, ty: TypeRef) -> CompileResult<()> {
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| CompileError::new("No open scope"))?;
        if scope.next_local == i16::MAX {
            return Err(CompileError::new("Too many local variables in function"));
        }
        scope.vars.insert(
            name.to_owned(),
            Binding {
                slot: scope.next_local,
                ty,
            },
        );
        scope.next_local += 1;
        scope.local_count += 1;
        Ok(())
    }

    /// Re-type an existing binding in the scope where it is visible.
    pub fn change_type(&mut self, name: &str, ty: TypeRef) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(binding) = scope.vars.get_mut(name) {
                binding.ty = ty;
                return;
            }
        }
    }

    /// Resolve `name`, materializing upvalues along the way.
    ///
    /// A hit behind a function-top boundary allocates an upvalue slot in
    /// every function top crossed, records the source slot it reads
    /// from, and caches a binding so later lookups are direct.
    pub fn get_variable(&mut self, name: &str) -> CompileResult<Option<Binding>> {
        if self.scopes.is_empty() {
            return Ok(None);
        }
        self.resolve(self.scopes.len() - 1, name)
    }

    fn resolve(&mut self, index: usize, name: &str) -> CompileResult<Option<Binding>> {
        if let Some(binding) = self.scopes[index].vars.get(name) {
            return Ok(Some(binding.clone()));
        }
        if index == 0 {
            return Ok(None);
        }
        if !self.scopes[index].func_top {
            return self.resolve(index - 1, name);
        }
        let Some(outer) = self.resolve(index - 1, name)? else {
            return Ok(None);
        };
        let scope = &mut self.scopes[index];
        if scope.next_upvalue == i16::MIN {
            return Err(CompileError::new("Too many upvalues in function definition"));
        }
        let binding = Binding {
            slot: scope.next_upvalue,
            ty: outer.ty,
        };
        scope.next_upvalue -= 1;
        scope.upvalues.push(outer.slot);
        scope.vars.insert(name.to_owned(), binding.clone());
        Ok(Some(binding))
    }

    /// Upvalue source slots of the innermost function top.
    pub fn function_upvalues(&self) -> &[i16] {
        for scope in self.scopes.iter().rev() {
            if scope.func_top {
                return &scope.upvalues;
            }
        }
        &[]
    }
}
