//! Semantic types for TML
//!
//! The back-end receives fully resolved semantic types from the type checker.
//! Every type carries enough structure for two jobs: symbol mangling
//! (`Maybe__I32`, `mutptr_U8`) and LLVM lowering (`i32`, `ptr`,
//! `%struct.Maybe__I32`).
//!
//! Types are structural: two types spelled differently in source but
//! resolving to the same structure compare equal, hash equal, and mangle
//! identically.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Primitive type kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimKind {
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    Bool,
    Char,
    Str,
    Unit,
    Never,
}

impl PrimKind {
    /// Canonical capitalized name, used as the mangled form.
    pub fn mangled(self) -> &'static str {
        match self {
            PrimKind::I8 => "I8",
            PrimKind::I16 => "I16",
            PrimKind::I32 => "I32",
            PrimKind::I64 => "I64",
            PrimKind::I128 => "I128",
            PrimKind::U8 => "U8",
            PrimKind::U16 => "U16",
            PrimKind::U32 => "U32",
            PrimKind::U64 => "U64",
            PrimKind::U128 => "U128",
            PrimKind::F32 => "F32",
            PrimKind::F64 => "F64",
            PrimKind::Bool => "Bool",
            PrimKind::Char => "Char",
            PrimKind::Str => "Str",
            PrimKind::Unit => "Unit",
            PrimKind::Never => "Never",
        }
    }

    /// Parse a canonical capitalized name back into a kind.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "I8" => PrimKind::I8,
            "I16" => PrimKind::I16,
            "I32" => PrimKind::I32,
            "I64" => PrimKind::I64,
            "I128" => PrimKind::I128,
            "U8" => PrimKind::U8,
            "U16" => PrimKind::U16,
            "U32" => PrimKind::U32,
            "U64" => PrimKind::U64,
            "U128" => PrimKind::U128,
            "F32" => PrimKind::F32,
            "F64" => PrimKind::F64,
            "Bool" => PrimKind::Bool,
            "Char" => PrimKind::Char,
            "Str" => PrimKind::Str,
            "Unit" => PrimKind::Unit,
            "Never" => PrimKind::Never,
            _ => return None,
        })
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            PrimKind::I8
                | PrimKind::I16
                | PrimKind::I32
                | PrimKind::I64
                | PrimKind::I128
                | PrimKind::U8
                | PrimKind::U16
                | PrimKind::U32
                | PrimKind::U64
                | PrimKind::U128
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            PrimKind::U8 | PrimKind::U16 | PrimKind::U32 | PrimKind::U64 | PrimKind::U128
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimKind::F32 | PrimKind::F64)
    }

    /// Bit width for integer kinds; `None` for everything else.
    pub fn bit_width(self) -> Option<u32> {
        Some(match self {
            PrimKind::I8 | PrimKind::U8 => 8,
            PrimKind::I16 | PrimKind::U16 => 16,
            PrimKind::I32 | PrimKind::U32 => 32,
            PrimKind::I64 | PrimKind::U64 => 64,
            PrimKind::I128 | PrimKind::U128 => 128,
            _ => return None,
        })
    }

    /// Storage size and alignment in bytes. `Unit` is (0, 1) by convention.
    pub fn size_align(self) -> (u64, u64) {
        match self {
            PrimKind::I8 | PrimKind::U8 | PrimKind::Bool => (1, 1),
            PrimKind::I16 | PrimKind::U16 => (2, 2),
            PrimKind::I32 | PrimKind::U32 | PrimKind::Char | PrimKind::F32 => (4, 4),
            PrimKind::I64 | PrimKind::U64 | PrimKind::F64 => (8, 8),
            PrimKind::I128 | PrimKind::U128 => (16, 16),
            PrimKind::Str => (8, 8),
            PrimKind::Unit | PrimKind::Never => (0, 1),
        }
    }
}

/// A fully resolved semantic type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemType {
    /// Primitive kind (`I32`, `Bool`, `Str`, ...)
    Prim(PrimKind),
    /// Raw pointer `*T` / `*mut T`
    Ptr { inner: Box<SemType>, mutable: bool },
    /// Reference `&T` / `&mut T`
    Ref { inner: Box<SemType>, mutable: bool },
    /// Named struct/enum type, possibly generic: `Maybe[I32]`
    Named {
        name: String,
        /// Module path the type resolved to, when known (`core::maybe`)
        module: Option<String>,
        args: Vec<SemType>,
    },
    /// Unresolved generic parameter placeholder (`T`)
    Param(String),
    /// Function type; lowers to a fat pointer in value position
    Func {
        params: Vec<SemType>,
        ret: Box<SemType>,
    },
    /// Tuple type
    Tuple(Vec<SemType>),
    /// Fixed-length array `[T; N]`
    Array { elem: Box<SemType>, len: u64 },
}

impl SemType {
    pub fn prim(kind: PrimKind) -> Self {
        SemType::Prim(kind)
    }

    pub fn unit() -> Self {
        SemType::Prim(PrimKind::Unit)
    }

    pub fn named(name: &str, args: Vec<SemType>) -> Self {
        SemType::Named {
            name: name.to_string(),
            module: None,
            args,
        }
    }

    pub fn ptr(inner: SemType, mutable: bool) -> Self {
        SemType::Ptr {
            inner: Box::new(inner),
            mutable,
        }
    }

    /// Replace generic parameter placeholders using the given substitution.
    /// Parameters with no mapping are left in place.
    pub fn substitute(&self, subst: &HashMap<String, SemType>) -> SemType {
        match self {
            SemType::Prim(_) => self.clone(),
            SemType::Param(name) => subst.get(name).cloned().unwrap_or_else(|| self.clone()),
            SemType::Ptr { inner, mutable } => SemType::Ptr {
                inner: Box::new(inner.substitute(subst)),
                mutable: *mutable,
            },
            SemType::Ref { inner, mutable } => SemType::Ref {
                inner: Box::new(inner.substitute(subst)),
                mutable: *mutable,
            },
            SemType::Named { name, module, args } => SemType::Named {
                name: name.clone(),
                module: module.clone(),
                args: args.iter().map(|a| a.substitute(subst)).collect(),
            },
            SemType::Func { params, ret } => SemType::Func {
                params: params.iter().map(|p| p.substitute(subst)).collect(),
                ret: Box::new(ret.substitute(subst)),
            },
            SemType::Tuple(elems) => {
                SemType::Tuple(elems.iter().map(|e| e.substitute(subst)).collect())
            }
            SemType::Array { elem, len } => SemType::Array {
                elem: Box::new(elem.substitute(subst)),
                len: *len,
            },
        }
    }

    /// True if any unresolved generic parameter remains inside.
    pub fn contains_param(&self) -> bool {
        match self {
            SemType::Param(_) => true,
            SemType::Prim(_) => false,
            SemType::Ptr { inner, .. } | SemType::Ref { inner, .. } => inner.contains_param(),
            SemType::Named { args, .. } => args.iter().any(SemType::contains_param),
            SemType::Func { params, ret } => {
                params.iter().any(SemType::contains_param) || ret.contains_param()
            }
            SemType::Tuple(elems) => elems.iter().any(SemType::contains_param),
            SemType::Array { elem, .. } => elem.contains_param(),
        }
    }

    /// The primitive kind, if this is a primitive type.
    pub fn as_prim(&self) -> Option<PrimKind> {
        match self {
            SemType::Prim(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, SemType::Prim(PrimKind::Unit))
    }

    pub fn is_unsigned(&self) -> bool {
        self.as_prim().is_some_and(PrimKind::is_unsigned)
    }
}

impl std::fmt::Display for SemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SemType::Prim(kind) => write!(f, "{}", kind.mangled()),
            SemType::Ptr { inner, mutable } => {
                write!(f, "*{}{}", if *mutable { "mut " } else { "" }, inner)
            }
            SemType::Ref { inner, mutable } => {
                write!(f, "&{}{}", if *mutable { "mut " } else { "" }, inner)
            }
            SemType::Named { name, args, .. } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "[")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
            SemType::Param(name) => write!(f, "{}", name),
            SemType::Func { params, ret } => {
                write!(f, "func(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
            SemType::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            SemType::Array { elem, len } => write!(f, "[{}; {}]", elem, len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prim_roundtrip() {
        for kind in [PrimKind::I8, PrimKind::U64, PrimKind::F32, PrimKind::Never] {
            assert_eq!(PrimKind::parse(kind.mangled()), Some(kind));
        }
        assert_eq!(PrimKind::parse("i32"), None);
    }

    #[test]
    fn test_substitute_nested() {
        let mut subst = HashMap::new();
        subst.insert("T".to_string(), SemType::prim(PrimKind::I32));

        let ty = SemType::named(
            "Node",
            vec![SemType::named("Maybe", vec![SemType::Param("T".to_string())])],
        );
        let resolved = ty.substitute(&subst);
        assert!(!resolved.contains_param());
        assert_eq!(
            resolved,
            SemType::named("Node", vec![SemType::named("Maybe", vec![SemType::prim(PrimKind::I32)])])
        );
    }

    #[test]
    fn test_substitute_leaves_unknown_params() {
        let subst = HashMap::new();
        let ty = SemType::Param("U".to_string());
        assert_eq!(ty.substitute(&subst), ty);
        assert!(ty.contains_param());
    }

    #[test]
    fn test_unit_size_is_zero() {
        assert_eq!(PrimKind::Unit.size_align(), (0, 1));
    }

    #[test]
    fn test_display() {
        let ty = SemType::ptr(SemType::prim(PrimKind::U8), true);
        assert_eq!(ty.to_string(), "*mut U8");
        let maybe = SemType::named("Maybe", vec![SemType::prim(PrimKind::I32)]);
        assert_eq!(maybe.to_string(), "Maybe[I32]");
    }
}
