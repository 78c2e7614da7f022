//! The bytecode emitter: second pass over the typed AST.
//!
//! Statements type-walk their expressions and then append opcodes,
//! tracking whether every path of a block ends in a return. Function
//! literals compile their bodies into prototypes reserved during the
//! walk; the upvalue list the child context accumulates is written as
//! `MAKE_FUNC` trailing operands.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use super::error::{CompileError, CompileResult};
use super::Codegen;
use crate::bytecode::opcode::Opcode;
use crate::parser::ast::{Block, Expr, ExprKind, Stmt};
use crate::types::{TypeKind, TypeRef};
use crate::value::Value;

/// Single-opcode lowerings for binary operators. `!=`, `>`, `>=` are
/// not here: they lower to a base comparison followed by `NOT`.
static BINARY_OPS: Lazy<FxHashMap<&'static str, Opcode>> = Lazy::new(|| {
    let mut map = FxHashMap::default();
    map.insert("+", Opcode::BinPlus);
    map.insert("-", Opcode::BinMinus);
    map.insert("*", Opcode::Multiply);
    map.insert("/", Opcode::Divide);
    map.insert("%", Opcode::Modulo);
    map.insert("^", Opcode::Power);
    map.insert("and", Opcode::And);
    map.insert("or", Opcode::Or);
    map.insert("==", Opcode::Equals);
    map.insert("<", Opcode::Less);
    map.insert("<=", Opcode::LessOrEq);
    map.insert("index", Opcode::Index);
    map
});

impl Codegen<'_> {
    /// Compile `body` into the reserved prototype `proto`, returning
    /// the upvalue source slots captured from the enclosing context.
    pub(crate) fn compile_function(
        &mut self,
        proto: u16,
        body: &mut Block,
        params: &[(String, TypeRef)],
        result: &TypeRef,
    ) -> CompileResult<Vec<i16>> {
        if params.len() > u16::MAX as usize {
            return Err(CompileError::new("Too many arguments in function definition"));
        }
        self.scopes.push_function();
        for (name, ty) in params {
            self.scopes.define_local(name, ty.clone())?;
        }
        self.chunk.functions[proto as usize].arity = params.len() as u16;
        self.compile_block(proto, body, result, true)?;
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| CompileError::new("Scope stack underflow"))?;
        let upvalues = scope.upvalues;
        self.chunk.functions[proto as usize].upvalues = upvalues.clone();
        Ok(upvalues)
    }

    /// Compile a block's statements; returns whether every path returns.
    ///
    /// Non-outermost blocks pop their locals on normal exit. The
    /// outermost block of a function checks the implicit-nil-return rule
    /// and emits an explicit `CONSTANT nil; RETURN` tail when it does
    /// not always return.
    pub(crate) fn compile_block(
        &mut self,
        proto: u16,
        block: &mut Block,
        result: &TypeRef,
        main_block: bool,
    ) -> CompileResult<bool> {
        let mut always_returns = false;
        for stmt in &mut block.stmts {
            self.heap.step(); // safe point; the chunk keeps constants rooted
            let stmt_returns = self.compile_statement(proto, stmt, result)?;
            always_returns = always_returns || stmt_returns;
        }
        if !main_block {
            let locals = self.scopes.local_count();
            if locals > 0 {
                let func = &mut self.chunk.functions[proto as usize];
                func.emit_op(Opcode::Pop);
                func.emit_u16(locals);
            }
        }
        if main_block && !always_returns {
            if !self.types.nil_type().assignable_to(result) {
                return Err(CompileError::new(format!(
                    "Using implicit nil return in function with return type {result}"
                )));
            }
            self.emit_constant(proto, Value::Nil)?;
            self.chunk.functions[proto as usize].emit_op(Opcode::Return);
        }
        Ok(always_returns)
    }

    fn compile_statement(
        &mut self,
        proto: u16,
        stmt: &mut Stmt,
        result: &TypeRef,
    ) -> CompileResult<bool> {
        match stmt {
            Stmt::Let { name, value } => {
                let value_ty = self.type_expression(value)?;
                let is_function = matches!(value.kind, ExprKind::Function(_));
                if is_function {
                    // Bind before emission so the body can call itself.
                    self.scopes.define_local(name, value_ty.clone())?;
                }
                self.compile_expression(proto, value)?;
                self.chunk.functions[proto as usize].emit_op(Opcode::Let);
                if !is_function {
                    self.scopes.define_local(name, value_ty)?;
                }
                Ok(false)
            }
            Stmt::Set { name, value } => {
                let Some(binding) = self.scopes.get_variable(name)? else {
                    return Err(CompileError::new(format!(
                        "Trying to set global or undefined variable {name}"
                    )));
                };
                let value_ty = self.type_expression(value)?;
                if !value_ty.assignable_to(&binding.ty) {
                    return Err(CompileError::new(format!(
                        "Trying to set variable of type {} to value of type {value_ty}",
                        binding.ty
                    )));
                }
                self.compile_expression(proto, value)?;
                let func = &mut self.chunk.functions[proto as usize];
                func.emit_op(Opcode::SetLocal);
                func.emit_i16(binding.slot);
                Ok(false)
            }
            Stmt::Expr(expr) => {
                self.type_expression(expr)?;
                self.compile_expression(proto, expr)?;
                self.chunk.functions[proto as usize].emit_op(Opcode::Ignore);
                Ok(false)
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond_ty = self.type_expression(cond)?;
                if !cond_ty.assignable_to(&self.types.bool_type()) {
                    return Err(CompileError::new(format!(
                        "Expecting boolean in condition, got value of type {cond_ty}"
                    )));
                }
                self.compile_expression(proto, cond)?;
                let skip_then = self.chunk.functions[proto as usize].emit_jump(Opcode::JumpIfNot);
                self.scopes.push_block();
                let then_returns = self.compile_block(proto, then_block, result, false)?;
                self.scopes.pop();
                if let Some(else_block) = else_block {
                    let skip_else = self.chunk.functions[proto as usize].emit_jump(Opcode::Jump);
                    self.chunk.functions[proto as usize].patch_jump(skip_then)?;
                    self.scopes.push_block();
                    let else_returns = self.compile_block(proto, else_block, result, false)?;
                    self.scopes.pop();
                    self.chunk.functions[proto as usize].patch_jump(skip_else)?;
                    Ok(then_returns && else_returns)
                } else {
                    self.chunk.functions[proto as usize].patch_jump(skip_then)?;
                    Ok(false)
                }
            }
            Stmt::While { cond, body } => {
                let loop_head = self.chunk.functions[proto as usize].position();
                let cond_ty = self.type_expression(cond)?;
                if !cond_ty.assignable_to(&self.types.bool_type()) {
                    return Err(CompileError::new(format!(
                        "Expecting boolean in while loop, got value of type {cond_ty}"
                    )));
                }
                self.compile_expression(proto, cond)?;
                let exit = self.chunk.functions[proto as usize].emit_jump(Opcode::JumpIfNot);
                self.scopes.push_block();
                self.compile_block(proto, body, result, false)?;
                self.scopes.pop();
                let func = &mut self.chunk.functions[proto as usize];
                func.emit_jump_back(Opcode::Jump, loop_head)?;
                func.patch_jump(exit)?;
                Ok(false)
            }
            Stmt::Return(value) => {
                let value_ty = self.type_expression(value)?;
                if !value_ty.assignable_to(result) {
                    return Err(CompileError::new(format!(
                        "Returning {value_ty} in function with return type {result}"
                    )));
                }
                self.compile_expression(proto, value)?;
                self.chunk.functions[proto as usize].emit_op(Opcode::Return);
                Ok(true)
            }
        }
    }

    fn compile_expression(&mut self, proto: u16, expr: &mut Expr) -> CompileResult<()> {
        match &mut expr.kind {
            ExprKind::Int(value) => self.emit_constant(proto, Value::Int(*value))?,
            ExprKind::Real(value) => self.emit_constant(proto, Value::Real(*value))?,
            ExprKind::Str(text) => {
                // Unrooted only until the next line; the constants
                // vector the chunk pins picks it up immediately.
                let string = self.heap.alloc_str(text.as_str());
                self.emit_constant(proto, Value::Ref(string))?;
            }
            ExprKind::Sym(sym) => {
                let value = match sym.as_str() {
                    "nil" => Value::Nil,
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    other => {
                        return Err(CompileError::new(format!(
                            "Unexpected keyword in expression: {other}"
                        )))
                    }
                };
                self.emit_constant(proto, value)?;
            }
            ExprKind::Id(name) => {
                if let Some(binding) = self.scopes.get_variable(name)? {
                    let func = &mut self.chunk.functions[proto as usize];
                    func.emit_op(Opcode::Local);
                    func.emit_i16(binding.slot);
                } else if self.globals.lookup(name).is_some() {
                    let index = self
                        .chunk
                        .add_string_constant(name)
                        .ok_or_else(|| CompileError::new("Too many constants in program"))?;
                    let func = &mut self.chunk.functions[proto as usize];
                    func.emit_op(Opcode::Global);
                    func.emit_u16(index);
                } else {
                    return Err(CompileError::new(format!(
                        "Trying to access unknown variable: {name}"
                    )));
                }
            }
            ExprKind::Unary { op, expr: operand } => {
                self.compile_expression(proto, operand)?;
                let opcode = match op.as_str() {
                    "-" => Opcode::UniMinus,
                    "not" => Opcode::Not,
                    other => {
                        return Err(CompileError::new(format!("Unknown unary operator: {other}")))
                    }
                };
                self.chunk.functions[proto as usize].emit_op(opcode);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.compile_expression(proto, lhs)?;
                self.compile_expression(proto, rhs)?;
                let func = &mut self.chunk.functions[proto as usize];
                if let Some(&opcode) = BINARY_OPS.get(op.as_str()) {
                    func.emit_op(opcode);
                } else {
                    match op.as_str() {
                        "!=" => {
                            func.emit_op(Opcode::Equals);
                            func.emit_op(Opcode::Not);
                        }
                        ">" => {
                            func.emit_op(Opcode::LessOrEq);
                            func.emit_op(Opcode::Not);
                        }
                        ">=" => {
                            func.emit_op(Opcode::Less);
                            func.emit_op(Opcode::Not);
                        }
                        other => {
                            return Err(CompileError::new(format!("Unsupported operator {other}")))
                        }
                    }
                }
            }
            ExprKind::Call { callee, args } => {
                if args.len() > u16::MAX as usize {
                    return Err(CompileError::new("Too many arguments in function call"));
                }
                for arg in args.iter_mut() {
                    self.compile_expression(proto, arg)?;
                }
                self.compile_expression(proto, callee)?;
                let func = &mut self.chunk.functions[proto as usize];
                func.emit_op(Opcode::Call);
                func.emit_u16(args.len() as u16);
            }
            ExprKind::Function(literal) => {
                let Some(child) = literal.proto else {
                    return Err(CompileError::new("Function literal was not type-walked"));
                };
                let sig = match expr.ty.as_ref().map(|ty| ty.kind()) {
                    Some(TypeKind::Function(sig)) => sig.clone(),
                    _ => return Err(CompileError::new("Function literal was not type-walked")),
                };
                if literal.params.len() > u16::MAX as usize {
                    return Err(CompileError::new("Too many arguments in function definition"));
                }
                {
                    let func = &mut self.chunk.functions[proto as usize];
                    func.emit_op(Opcode::MakeFunc);
                    func.emit_u16(child);
                    func.emit_u16(literal.params.len() as u16);
                }
                let params: Vec<(String, TypeRef)> = literal
                    .params
                    .iter()
                    .map(|param| param.name.clone())
                    .zip(sig.params.iter().cloned())
                    .collect();
                let upvalues =
                    self.compile_function(child, &mut literal.body, &params, &sig.result)?;
                if upvalues.len() > u16::MAX as usize {
                    return Err(CompileError::new("Too many upvalues in function definition"));
                }
                let func = &mut self.chunk.functions[proto as usize];
                func.emit_u16(upvalues.len() as u16);
                for upvalue in upvalues {
                    func.emit_i16(upvalue);
                }
            }
            ExprKind::List(items) => {
                if items.len() > u16::MAX as usize {
                    return Err(CompileError::new("Too many elements in list literal"));
                }
                for item in items.iter_mut() {
                    self.compile_expression(proto, item)?;
                }
                let func = &mut self.chunk.functions[proto as usize];
                func.emit_op(Opcode::MakeList);
                func.emit_u16(items.len() as u16);
            }
            ExprKind::Prop { object, name } => {
                let namespace = object
                    .ty
                    .as_ref()
                    .ok_or_else(|| CompileError::new("Property receiver was not type-walked"))?
                    .namespace();
                self.compile_expression(proto, object)?;
                let ns_index = self
                    .chunk
                    .add_string_constant(namespace)
                    .ok_or_else(|| CompileError::new("Too many constants in program"))?;
                let name_index = self
                    .chunk
                    .add_string_constant(name)
                    .ok_or_else(|| CompileError::new("Too many constants in program"))?;
                let func = &mut self.chunk.functions[proto as usize];
                func.emit_op(Opcode::MakeMethod);
                func.emit_u16(ns_index);
                func.emit_u16(name_index);
            }
        }
        Ok(())
    }

    fn emit_constant(&mut self, proto: u16, value: Value) -> CompileResult<()> {
        let index = self
            .chunk
            .add_constant(value)
            .ok_or_else(|| CompileError::new("Too many constants in program"))?;
        let func = &mut self.chunk.functions[proto as usize];
        func.emit_op(Opcode::Constant);
        func.emit_u16(index);
        Ok(())
    }
}
