//! Resolved types and instantiation-key mangling.
//!
//! `Ty` is always concrete: template bodies are only ever lowered under a
//! substitution, so no type variable survives into a `Ty`.

use cxx2c_ast::Identifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, salsa::Update,
)]
pub enum Ty {
    Void,
    Bool,
    Int,
    SizeT,
    /// `std::string`, lowered to an owned `char*`.
    Str,
    /// `std::array<elem, len>` with a resolved extent.
    Array { elem: Box<Ty>, len: u64 },
    /// `std::unique_ptr<T>` — an owning pointer.
    UniquePtr(Box<Ty>),
    /// A raw observer pointer (`T*`, or the result of `.get()`).
    Ptr(Box<Ty>),
    /// A concrete class or class-template instantiation, by mangled name.
    Class(String),
    /// Placeholder produced after a reported error; compatible with
    /// everything so one mistake does not cascade.
    Error,
}

impl Ty {
    pub fn unique_ptr(inner: Ty) -> Ty {
        Ty::UniquePtr(Box::new(inner))
    }

    pub fn ptr(inner: Ty) -> Ty {
        Ty::Ptr(Box::new(inner))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Ty::Int | Ty::SizeT | Ty::Bool)
    }

    /// Types that may appear in a branch or loop condition.
    pub fn is_truthy(&self) -> bool {
        matches!(
            self,
            Ty::Bool | Ty::Int | Ty::SizeT | Ty::Ptr(_) | Ty::UniquePtr(_) | Ty::Error
        )
    }

    /// Owning types require a cleanup call when an automatic variable holding
    /// one goes out of scope.
    pub fn is_owning(&self) -> bool {
        matches!(self, Ty::Str | Ty::UniquePtr(_) | Ty::Class(_))
    }

    /// The `printf` conversion used to print a value of this type, if the
    /// type is printable.
    pub fn printf_format(&self) -> Option<&'static str> {
        match self {
            Ty::Int | Ty::Bool => Some("%d"),
            Ty::SizeT => Some("%zu"),
            Ty::Str => Some("%s"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ty::Void => write!(f, "void"),
            Ty::Bool => write!(f, "bool"),
            Ty::Int => write!(f, "int"),
            Ty::SizeT => write!(f, "size_t"),
            Ty::Str => write!(f, "std::string"),
            Ty::Array { elem, len } => write!(f, "std::array<{elem}, {len}>"),
            Ty::UniquePtr(inner) => write!(f, "std::unique_ptr<{inner}>"),
            Ty::Ptr(inner) => write!(f, "{inner}*"),
            Ty::Class(name) => write!(f, "{name}"),
            Ty::Error => write!(f, "<error>"),
        }
    }
}

/// One concrete template argument: part of an instantiation key.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, salsa::Update,
)]
pub enum TyArg {
    Ty(Ty),
    Value(u64),
}

/// Substitution from template parameter names to concrete arguments.
pub type Subst = BTreeMap<Identifier, TyArg>;

/// Whether an argument of type `arg` can initialize a parameter of type
/// `param` in the accepted subset: exact match or a trivial numeric
/// conversion.
pub fn compatible(arg: &Ty, param: &Ty) -> bool {
    if matches!(arg, Ty::Error) || matches!(param, Ty::Error) {
        return true;
    }
    // `nullptr` (typed as void*) initializes any pointer.
    if matches!(arg, Ty::Ptr(inner) if **inner == Ty::Void)
        && matches!(param, Ty::Ptr(_) | Ty::UniquePtr(_))
    {
        return true;
    }
    arg == param || (arg.is_numeric() && param.is_numeric())
}

/// Mangle a type into a C identifier fragment.
pub fn mangle_ty(ty: &Ty) -> String {
    match ty {
        Ty::Void => "void".to_string(),
        Ty::Bool => "bool".to_string(),
        Ty::Int => "int".to_string(),
        Ty::SizeT => "size_t".to_string(),
        Ty::Str => "string".to_string(),
        Ty::Array { elem, len } => format!("array_{}_{}", mangle_ty(elem), len),
        Ty::UniquePtr(inner) => format!("uptr_{}", mangle_ty(inner)),
        Ty::Ptr(inner) => format!("ptr_{}", mangle_ty(inner)),
        Ty::Class(name) => name.clone(),
        Ty::Error => "error".to_string(),
    }
}

/// Deterministic symbol for an instantiation key: the template name joined
/// with each mangled argument. Every call-site with the same key produces
/// the same symbol, which is what makes deduplication and reproducible
/// output possible.
pub fn mangle_instantiation(name: &str, args: &[TyArg]) -> String {
    let mut out = name.to_string();
    for arg in args {
        out.push('_');
        match arg {
            TyArg::Ty(ty) => out.push_str(&mangle_ty(ty)),
            TyArg::Value(value) => out.push_str(&value.to_string()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangles_instantiation_keys() {
        assert_eq!(
            mangle_instantiation("fibonacci", &[TyArg::Ty(Ty::Int)]),
            "fibonacci_int"
        );
        assert_eq!(
            mangle_instantiation("FibonacciSequence", &[TyArg::Ty(Ty::Int), TyArg::Value(15)]),
            "FibonacciSequence_int_15"
        );
        assert_eq!(
            mangle_instantiation("Node", &[TyArg::Ty(Ty::Str)]),
            "Node_string"
        );
    }

    #[test]
    fn mangling_is_deterministic() {
        let key = [TyArg::Ty(Ty::unique_ptr(Ty::Class("Node_int".into())))];
        assert_eq!(
            mangle_instantiation("List", &key),
            mangle_instantiation("List", &key)
        );
    }

    #[test]
    fn numeric_compatibility() {
        assert!(compatible(&Ty::Int, &Ty::SizeT));
        assert!(compatible(&Ty::SizeT, &Ty::Int));
        assert!(!compatible(&Ty::Str, &Ty::Int));
        assert!(compatible(&Ty::Error, &Ty::Str));
    }
}
