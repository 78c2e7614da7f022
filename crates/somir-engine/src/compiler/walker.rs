//! The type walker: attaches a resolved type to every expression.
//!
//! Walking is idempotent: re-walking an already annotated tree computes
//! the same types and reserves no new prototypes.

use super::error::{CompileError, CompileResult};
use super::Codegen;
use crate::parser::ast::{Expr, ExprKind, TypeExpr};
use crate::types::{function_of, list_of, TypeKind, TypeRef};

impl Codegen<'_> {
    /// Resolve a type expression against the type namespace.
    pub(crate) fn resolve_type(&self, expr: &TypeExpr) -> CompileResult<TypeRef> {
        match expr {
            TypeExpr::Name(name) => self
                .types
                .lookup(name)
                .ok_or_else(|| CompileError::new(format!("Unknown type {name}"))),
        }
    }

    /// Compute and attach the type of `expr`.
    pub(crate) fn type_expression(&mut self, expr: &mut Expr) -> CompileResult<TypeRef> {
        let ty = match &mut expr.kind {
            ExprKind::Int(_) => self.types.int_type(),
            ExprKind::Real(_) => self.types.real_type(),
            ExprKind::Str(_) => self.types.string_type(),
            ExprKind::Sym(sym) => match sym.as_str() {
                "nil" => self.types.nil_type(),
                "true" | "false" => self.types.bool_type(),
                other => {
                    return Err(CompileError::new(format!(
                        "Unexpected keyword in expression: {other}"
                    )))
                }
            },
            ExprKind::Id(name) => {
                if let Some(binding) = self.scopes.get_variable(name)? {
                    binding.ty
                } else if let Some(ty) = self.globals.lookup(name) {
                    ty
                } else {
                    return Err(CompileError::new(format!(
                        "Trying to access unknown variable: {name}"
                    )));
                }
            }
            ExprKind::Unary { op, expr: operand } => {
                let operand_ty = self.type_expression(operand)?;
                match op.as_str() {
                    "-" => operand_ty,
                    "not" => self.types.bool_type(),
                    other => {
                        return Err(CompileError::new(format!("Unknown unary operator: {other}")))
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let left = self.type_expression(lhs)?;
                let right = self.type_expression(rhs)?;
                self.binary_type(op, &left, &right)?
            }
            ExprKind::Call { callee, args } => {
                let mut arg_types = Vec::with_capacity(args.len());
                for arg in args.iter_mut() {
                    arg_types.push(self.type_expression(arg)?);
                }
                let callee_ty = self.type_expression(callee)?;
                match callee_ty.kind() {
                    TypeKind::Macro => self.types.any_type(),
                    TypeKind::Function(sig) => {
                        if arg_types.len() != sig.params.len() {
                            return Err(CompileError::new(format!(
                                "Expected {} arguments in function call, got {}",
                                sig.params.len(),
                                arg_types.len()
                            )));
                        }
                        for (arg, param) in arg_types.iter().zip(&sig.params) {
                            if !arg.assignable_to(param) {
                                return Err(CompileError::new(format!(
                                    "Cannot assign {arg} to {param} argument"
                                )));
                            }
                        }
                        sig.result.clone()
                    }
                    _ => return Err(CompileError::new(format!("Trying to call {callee_ty}"))),
                }
            }
            ExprKind::Function(func) => {
                // Reserve once per node; an index left over from a
                // previous compile of the same tree is reserved afresh.
                let stale = match func.proto {
                    Some(index) => (index as usize) >= self.chunk.functions.len(),
                    None => true,
                };
                if stale {
                    func.proto = Some(self.reserve_prototype()?);
                }
                let mut params = Vec::with_capacity(func.params.len());
                for param in &func.params {
                    params.push(self.resolve_type(&param.ty)?);
                }
                let result = self.resolve_type(&func.result)?;
                function_of(params, result)
            }
            ExprKind::List(items) => {
                let mut elem: Option<TypeRef> = None;
                for item in items.iter_mut() {
                    let item_ty = self.type_expression(item)?;
                    elem = match elem {
                        None => Some(item_ty),
                        Some(current) => {
                            if item_ty.assignable_to(&current) {
                                Some(current)
                            } else if current.assignable_to(&item_ty) {
                                Some(item_ty)
                            } else {
                                return Err(CompileError::new(format!(
                                    "Cannot mix {current} and {item_ty} in list literal"
                                )));
                            }
                        }
                    };
                }
                list_of(elem)
            }
            ExprKind::Prop { object, name } => {
                let object_ty = self.type_expression(object)?;
                self.types.method_of(&object_ty, name).ok_or_else(|| {
                    CompileError::new(format!(
                        "Type {object_ty} does not have a method named {name}"
                    ))
                })?
            }
        };
        expr.ty = Some(ty.clone());
        Ok(ty)
    }

    fn binary_type(&self, op: &str, left: &TypeRef, right: &TypeRef) -> CompileResult<TypeRef> {
        let int = self.types.int_type();
        let real = self.types.real_type();
        let boolean = self.types.bool_type();
        let both_int = left.assignable_to(&int) && right.assignable_to(&int);
        let both_real = left.assignable_to(&real) && right.assignable_to(&real);
        match op {
            "+" | "-" | "*" | "%" => {
                if both_int {
                    Ok(int)
                } else if both_real {
                    Ok(real)
                } else {
                    Err(CompileError::new(format!(
                        "Trying to perform arithmetic on {left} and {right}"
                    )))
                }
            }
            "/" | "^" => {
                if both_real {
                    Ok(real)
                } else {
                    Err(CompileError::new(format!(
                        "Trying to perform real operations on {left} and {right}"
                    )))
                }
            }
            "<" | ">" | "<=" | ">=" => {
                if both_real {
                    Ok(boolean)
                } else {
                    Err(CompileError::new(format!(
                        "Trying to compare {left} and {right}"
                    )))
                }
            }
            "==" | "!=" => Ok(boolean),
            "and" | "or" => {
                if left.assignable_to(&boolean) && right.assignable_to(&boolean) {
                    Ok(boolean)
                } else {
                    Err(CompileError::new(format!(
                        "Trying to perform boolean operations on {left} and {right}"
                    )))
                }
            }
            "index" => match left.kind() {
                TypeKind::List(Some(elem)) if right.assignable_to(&int) => Ok(elem.clone()),
                _ => Err(CompileError::new(format!(
                    "Trying to index {left} with {right}"
                ))),
            },
            other => Err(CompileError::new(format!(
                "Type deduction not implemented for operator {other}"
            ))),
        }
    }
}
