//! Symbol mangling
//!
//! Semantic types become stable ASCII suffixes: a named generic joins its
//! base name and argument manglings with `__`, recursing into nested
//! generics (`Maybe__I32`, `Node__Maybe__I32`). Pointers prepend `ptr_` /
//! `mutptr_`. Primitives use their canonical capitalized names.
//!
//! The scheme is total over the semantic type domain and depends only on
//! structure, never on how the type was spelled in source.

use crate::types::SemType;

/// Mangle a single semantic type into a symbol suffix.
pub fn mangle_type(ty: &SemType) -> String {
    match ty {
        SemType::Prim(kind) => kind.mangled().to_string(),
        SemType::Ptr { inner, mutable } | SemType::Ref { inner, mutable } => {
            let prefix = if *mutable { "mutptr" } else { "ptr" };
            format!("{}_{}", prefix, mangle_type(inner))
        }
        SemType::Named { name, args, .. } => mangle_generic(name, args),
        // Unsubstituted parameters keep their name; instantiation replaces
        // them before any symbol reaches the output.
        SemType::Param(name) => name.clone(),
        SemType::Func { params, ret } => {
            let mut out = String::from("fn");
            for p in params {
                out.push_str("__");
                out.push_str(&mangle_type(p));
            }
            out.push_str("__to__");
            out.push_str(&mangle_type(ret));
            out
        }
        SemType::Tuple(elems) => {
            let mut out = format!("Tuple{}", elems.len());
            for e in elems {
                out.push_str("__");
                out.push_str(&mangle_type(e));
            }
            out
        }
        SemType::Array { elem, len } => format!("Array__{}__{}", mangle_type(elem), len),
    }
}

/// Mangle a generic instantiation: `Base__Arg1__Arg2...`.
/// With no arguments the base name is returned unchanged.
pub fn mangle_generic(base: &str, args: &[SemType]) -> String {
    let mut out = base.to_string();
    for arg in args {
        out.push_str("__");
        out.push_str(&mangle_type(arg));
    }
    out
}

/// Mangled name of an instantiated impl method: `Container__I32_get`.
pub fn mangle_method(mangled_type: &str, method: &str) -> String {
    format!("{}_{}", mangled_type, method)
}

/// FNV-1a hash of a mangled name; used for `type_id[T]` and
/// `field_type_id`. 64-bit, stable across runs and platforms.
pub fn fnv1a_hash(name: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for byte in name.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrimKind;

    #[test]
    fn test_mangle_primitives() {
        assert_eq!(mangle_type(&SemType::prim(PrimKind::I32)), "I32");
        assert_eq!(mangle_type(&SemType::prim(PrimKind::F64)), "F64");
    }

    #[test]
    fn test_mangle_pointers() {
        let p = SemType::ptr(SemType::prim(PrimKind::U8), false);
        assert_eq!(mangle_type(&p), "ptr_U8");
        let mp = SemType::ptr(SemType::prim(PrimKind::U8), true);
        assert_eq!(mangle_type(&mp), "mutptr_U8");
    }

    #[test]
    fn test_mangle_nested_generics() {
        let maybe_i32 = SemType::named("Maybe", vec![SemType::prim(PrimKind::I32)]);
        assert_eq!(mangle_type(&maybe_i32), "Maybe__I32");
        let node = SemType::named("Node", vec![maybe_i32]);
        assert_eq!(mangle_type(&node), "Node__Maybe__I32");
    }

    #[test]
    fn test_mangle_is_structural() {
        // Two structurally identical types mangle identically regardless of
        // module annotation.
        let a = SemType::Named {
            name: "Range".to_string(),
            module: Some("core::range".to_string()),
            args: vec![],
        };
        let b = SemType::named("Range", vec![]);
        assert_eq!(mangle_type(&a), mangle_type(&b));
    }

    #[test]
    fn test_mangle_method_name() {
        assert_eq!(mangle_method("Container__I32", "get"), "Container__I32_get");
    }

    #[test]
    fn test_fnv1a_known_values() {
        // FNV-1a of the empty string is the offset basis.
        assert_eq!(fnv1a_hash(""), 0xcbf2_9ce4_8422_2325);
        // Deterministic and distinct for distinct inputs.
        assert_eq!(fnv1a_hash("I32"), fnv1a_hash("I32"));
        assert_ne!(fnv1a_hash("I32"), fnv1a_hash("I64"));
    }
}
