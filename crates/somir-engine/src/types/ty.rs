//! Type descriptors and the assignability lattice.

use std::fmt;
use std::rc::Rc;

/// Shared handle to a type descriptor.
///
/// Primitives are interned once in the
/// [`TypeNamespace`](super::TypeNamespace) and compared by pointer on
/// the fast path; list and function types are constructed per use and
/// compared structurally.
pub type TypeRef = Rc<Type>;

/// The shape of a type.
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// Top of the lattice: every type is assignable to `any`.
    Any,
    /// `nil` is assignable to every type (nullable-by-default).
    Nil,
    /// Boolean.
    Bool,
    /// 32-bit signed integer, assignable to `real`.
    Int,
    /// IEEE-754 double.
    Real,
    /// UTF-8 string.
    Str,
    /// Escape hatch: calls on a macro yield `any` and skip arity checks.
    Macro,
    /// List with an element type; `None` until an element is known
    /// (the type of an empty list literal).
    List(Option<TypeRef>),
    /// Function with fixed parameter types and a result type.
    Function(FunctionSig),
}

/// Structural signature of a function type.
#[derive(Debug, Clone)]
pub struct FunctionSig {
    /// Parameter types in declaration order.
    pub params: Vec<TypeRef>,
    /// Declared result type.
    pub result: TypeRef,
}

/// A type descriptor.
///
/// Method tables live in the [`TypeNamespace`](super::TypeNamespace),
/// keyed by [`Type::namespace`], so structurally equal descriptors share
/// one table.
#[derive(Debug)]
pub struct Type {
    kind: TypeKind,
}

impl Type {
    pub(crate) fn new(kind: TypeKind) -> Type {
        Type { kind }
    }

    /// The shape of this type.
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Method-table tag, also emitted as the namespace constant of
    /// `MAKE_METHOD`.
    pub fn namespace(&self) -> &'static str {
        match self.kind {
            TypeKind::Any => "any",
            TypeKind::Nil => "nil",
            TypeKind::Bool => "bool",
            TypeKind::Int => "int",
            TypeKind::Real => "real",
            TypeKind::Str => "string",
            TypeKind::Macro => "macro",
            TypeKind::List(_) => "list",
            TypeKind::Function(_) => "fn",
        }
    }

    /// Whether a value of this type may be assigned where `target` is
    /// expected.
    ///
    /// The lattice is fixed: `nil` below everything, `any` above
    /// everything, `int` below `real`; otherwise assignability is
    /// structural equality. An empty-list type fits every list type.
    pub fn assignable_to(&self, target: &Type) -> bool {
        match (&self.kind, &target.kind) {
            (_, TypeKind::Any) => true,
            (TypeKind::Nil, _) => true,
            (TypeKind::Int, TypeKind::Real) => true,
            (TypeKind::List(None), TypeKind::List(_)) => true,
            _ => self.same(target),
        }
    }

    /// Structural equality.
    pub fn same(&self, other: &Type) -> bool {
        match (&self.kind, &other.kind) {
            (TypeKind::Any, TypeKind::Any)
            | (TypeKind::Nil, TypeKind::Nil)
            | (TypeKind::Bool, TypeKind::Bool)
            | (TypeKind::Int, TypeKind::Int)
            | (TypeKind::Real, TypeKind::Real)
            | (TypeKind::Str, TypeKind::Str)
            | (TypeKind::Macro, TypeKind::Macro) => true,
            (TypeKind::List(a), TypeKind::List(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => a.same(b),
                _ => false,
            },
            (TypeKind::Function(a), TypeKind::Function(b)) => {
                a.params.len() == b.params.len()
                    && a.params.iter().zip(&b.params).all(|(x, y)| x.same(y))
                    && a.result.same(&b.result)
            }
            _ => false,
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Type) -> bool {
        self.same(other)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Any => f.write_str("any"),
            TypeKind::Nil => f.write_str("nil"),
            TypeKind::Bool => f.write_str("bool"),
            TypeKind::Int => f.write_str("int"),
            TypeKind::Real => f.write_str("real"),
            TypeKind::Str => f.write_str("string"),
            TypeKind::Macro => f.write_str("macro"),
            TypeKind::List(Some(elem)) => write!(f, "list[{elem}]"),
            TypeKind::List(None) => f.write_str("list[?]"),
            TypeKind::Function(sig) => {
                f.write_str("fn(")?;
                for (i, param) in sig.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") -> {}", sig.result)
            }
        }
    }
}

/// Construct a list-of-`elem` type.
pub fn list_of(elem: Option<TypeRef>) -> TypeRef {
    Rc::new(Type::new(TypeKind::List(elem)))
}

/// Construct a structural function type.
pub fn function_of(params: Vec<TypeRef>, result: TypeRef) -> TypeRef {
    Rc::new(Type::new(TypeKind::Function(FunctionSig { params, result })))
}
