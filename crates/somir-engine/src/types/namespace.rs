//! Type and global namespaces populated at startup.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::ty::{function_of, Type, TypeKind, TypeRef};

/// Name → type descriptor mapping, seeded with the primitives, plus the
/// method tables of the built-in method-carrying types.
pub struct TypeNamespace {
    map: FxHashMap<String, TypeRef>,
    methods: FxHashMap<&'static str, FxHashMap<String, TypeRef>>,
    any: TypeRef,
    nil: TypeRef,
    boolean: TypeRef,
    int: TypeRef,
    real: TypeRef,
    string: TypeRef,
    macro_: TypeRef,
}

impl TypeNamespace {
    /// Build the namespace with `any nil bool int real string macro`
    /// registered and the standard method tables installed.
    pub fn new() -> TypeNamespace {
        let any = Rc::new(Type::new(TypeKind::Any));
        let nil = Rc::new(Type::new(TypeKind::Nil));
        let boolean = Rc::new(Type::new(TypeKind::Bool));
        let int = Rc::new(Type::new(TypeKind::Int));
        let real = Rc::new(Type::new(TypeKind::Real));
        let string = Rc::new(Type::new(TypeKind::Str));
        let macro_ = Rc::new(Type::new(TypeKind::Macro));

        let mut map = FxHashMap::default();
        for (name, ty) in [
            ("any", &any),
            ("nil", &nil),
            ("bool", &boolean),
            ("int", &int),
            ("real", &real),
            ("string", &string),
            ("macro", &macro_),
        ] {
            map.insert(name.to_owned(), ty.clone());
        }

        let mut methods: FxHashMap<&'static str, FxHashMap<String, TypeRef>> =
            FxHashMap::default();

        let mut string_methods = FxHashMap::default();
        string_methods.insert("length".to_owned(), function_of(vec![], int.clone()));
        string_methods.insert(
            "concat".to_owned(),
            function_of(vec![string.clone()], string.clone()),
        );
        methods.insert("string", string_methods);

        let mut list_methods = FxHashMap::default();
        list_methods.insert("size".to_owned(), function_of(vec![], int.clone()));
        methods.insert("list", list_methods);

        TypeNamespace {
            map,
            methods,
            any,
            nil,
            boolean,
            int,
            real,
            string,
            macro_,
        }
    }

    /// Look up a named type.
    pub fn lookup(&self, name: &str) -> Option<TypeRef> {
        self.map.get(name).cloned()
    }

    /// Register a named type (standard-library declarations).
    pub fn define(&mut self, name: &str, ty: TypeRef) {
        self.map.insert(name.to_owned(), ty);
    }

    /// Declared type of method `name` on `ty`, if any.
    pub fn method_of(&self, ty: &Type, name: &str) -> Option<TypeRef> {
        self.methods.get(ty.namespace())?.get(name).cloned()
    }

    /// The interned `any` type.
    pub fn any_type(&self) -> TypeRef {
        self.any.clone()
    }

    /// The interned `nil` type.
    pub fn nil_type(&self) -> TypeRef {
        self.nil.clone()
    }

    /// The interned `bool` type.
    pub fn bool_type(&self) -> TypeRef {
        self.boolean.clone()
    }

    /// The interned `int` type.
    pub fn int_type(&self) -> TypeRef {
        self.int.clone()
    }

    /// The interned `real` type.
    pub fn real_type(&self) -> TypeRef {
        self.real.clone()
    }

    /// The interned `string` type.
    pub fn string_type(&self) -> TypeRef {
        self.string.clone()
    }

    /// The interned `macro` type.
    pub fn macro_type(&self) -> TypeRef {
        self.macro_.clone()
    }
}

impl Default for TypeNamespace {
    fn default() -> TypeNamespace {
        TypeNamespace::new()
    }
}

/// Read-only global bindings (`name → type`) visible to programs.
///
/// Populated at initialization; the language can read globals but never
/// assign them.
#[derive(Default)]
pub struct Globals {
    map: FxHashMap<String, TypeRef>,
}

impl Globals {
    /// An empty globals table.
    pub fn new() -> Globals {
        Globals::default()
    }

    /// Register a global.
    pub fn define(&mut self, name: &str, ty: TypeRef) {
        self.map.insert(name.to_owned(), ty);
    }

    /// Declared type of the global `name`.
    pub fn lookup(&self, name: &str) -> Option<TypeRef> {
        self.map.get(name).cloned()
    }
}

/// Populate `globals` with the standard-library declarations.
pub fn define_std_globals(globals: &mut Globals, types: &TypeNamespace) {
    globals.define("print", types.macro_type());
    globals.define("clock", function_of(vec![], types.real_type()));
    globals.define("readLine", function_of(vec![], types.string_type()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ty::{list_of, TypeKind};

    #[test]
    fn test_primitives_registered() {
        let types = TypeNamespace::new();
        for name in ["any", "nil", "bool", "int", "real", "string", "macro"] {
            assert!(types.lookup(name).is_some(), "missing {name}");
        }
        assert!(types.lookup("void").is_none());
    }

    #[test]
    fn test_interned_primitives_are_shared() {
        let types = TypeNamespace::new();
        assert!(Rc::ptr_eq(
            &types.int_type(),
            &types.lookup("int").expect("int")
        ));
    }

    #[test]
    fn test_string_methods() {
        let types = TypeNamespace::new();
        let length = types
            .method_of(&types.string_type(), "length")
            .expect("string.length");
        match length.kind() {
            TypeKind::Function(sig) => {
                assert!(sig.params.is_empty());
                assert!(sig.result.same(&types.int_type()));
            }
            other => panic!("unexpected kind {other:?}"),
        }
        assert!(types.method_of(&types.string_type(), "reverse").is_none());
        assert!(types.method_of(&types.int_type(), "length").is_none());
    }

    #[test]
    fn test_list_methods_shared_across_element_types() {
        let types = TypeNamespace::new();
        let ints = list_of(Some(types.int_type()));
        let strings = list_of(Some(types.string_type()));
        assert!(types.method_of(&ints, "size").is_some());
        assert!(types.method_of(&strings, "size").is_some());
    }

    #[test]
    fn test_std_globals() {
        let types = TypeNamespace::new();
        let mut globals = Globals::new();
        define_std_globals(&mut globals, &types);
        assert!(matches!(
            globals.lookup("print").expect("print").kind(),
            TypeKind::Macro
        ));
        assert!(globals.lookup("missing").is_none());
    }
}
