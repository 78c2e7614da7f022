//! The Somir type system: descriptors, namespaces, and the
//! assignability predicate governing every check in the compiler.

pub mod namespace;
pub mod ty;

pub use namespace::{define_std_globals, Globals, TypeNamespace};
pub use ty::{function_of, list_of, FunctionSig, Type, TypeKind, TypeRef};
