//! LLVM value types
//!
//! A compact sum standing in for LLVM's textual type grammar. All type
//! comparisons inside the emitter happen on this enum; the string form is
//! produced only at the emission boundary via `Display`.

use crate::types::PrimKind;

/// Float widths the back-end emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    F32,
    F64,
}

impl FloatKind {
    /// Suffix used to select LLVM math intrinsics (`@llvm.sqrt.f64`).
    pub fn intrinsic_suffix(self) -> &'static str {
        match self {
            FloatKind::F32 => "f32",
            FloatKind::F64 => "f64",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LlvmType {
    Int { bits: u32 },
    Float(FloatKind),
    Ptr,
    /// Closure value `{ code_ptr, env_ptr }`
    FatPtr,
    Vector { lanes: u32, elem: Box<LlvmType> },
    /// Named aggregate, stored mangled (`Pair__I32`); renders `%struct.Pair__I32`
    Struct(String),
    /// Zero-sized storage placeholder for `Unit` in field positions
    ZeroSized,
    Void,
}

impl LlvmType {
    pub fn i1() -> Self {
        LlvmType::Int { bits: 1 }
    }

    pub fn i8() -> Self {
        LlvmType::Int { bits: 8 }
    }

    pub fn i32() -> Self {
        LlvmType::Int { bits: 32 }
    }

    pub fn i64() -> Self {
        LlvmType::Int { bits: 64 }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, LlvmType::Int { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self, LlvmType::Float(_))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, LlvmType::Vector { .. })
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, LlvmType::Struct(_) | LlvmType::FatPtr)
    }

    pub fn int_bits(&self) -> Option<u32> {
        match self {
            LlvmType::Int { bits } => Some(*bits),
            _ => None,
        }
    }

    /// Storage size in bytes, for payload sizing and memcpy lengths.
    /// Aggregates are addressed through pointers in enum payloads, so they
    /// count as pointer-sized here.
    pub fn store_size(&self) -> u64 {
        match self {
            LlvmType::Int { bits } => u64::from((*bits).max(8)) / 8,
            LlvmType::Float(FloatKind::F32) => 4,
            LlvmType::Float(FloatKind::F64) => 8,
            LlvmType::Ptr | LlvmType::Struct(_) => 8,
            LlvmType::FatPtr => 16,
            LlvmType::Vector { lanes, elem } => u64::from(*lanes) * elem.store_size(),
            LlvmType::ZeroSized | LlvmType::Void => 0,
        }
    }
}

impl std::fmt::Display for LlvmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlvmType::Int { bits } => write!(f, "i{}", bits),
            LlvmType::Float(FloatKind::F32) => write!(f, "float"),
            LlvmType::Float(FloatKind::F64) => write!(f, "double"),
            LlvmType::Ptr => write!(f, "ptr"),
            LlvmType::FatPtr => write!(f, "{{ ptr, ptr }}"),
            LlvmType::Vector { lanes, elem } => write!(f, "<{} x {}>", lanes, elem),
            LlvmType::Struct(name) => write!(f, "%struct.{}", name),
            LlvmType::ZeroSized => write!(f, "[0 x i8]"),
            LlvmType::Void => write!(f, "void"),
        }
    }
}

/// Lower a primitive kind to its LLVM value type.
///
/// `Unit` lowers to `void` here; storage positions special-case it to a
/// zero-sized placeholder as needed. `Never` also lowers to `void` (no value
/// ever materializes).
pub fn lower_prim(kind: PrimKind) -> LlvmType {
    match kind {
        PrimKind::Bool => LlvmType::i1(),
        PrimKind::Char => LlvmType::i32(),
        PrimKind::Str => LlvmType::Ptr,
        PrimKind::F32 => LlvmType::Float(FloatKind::F32),
        PrimKind::F64 => LlvmType::Float(FloatKind::F64),
        PrimKind::Unit | PrimKind::Never => LlvmType::Void,
        _ => LlvmType::Int {
            // All remaining kinds are sized integers
            bits: kind.bit_width().unwrap_or(32),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_scalars() {
        assert_eq!(LlvmType::i32().to_string(), "i32");
        assert_eq!(LlvmType::Float(FloatKind::F64).to_string(), "double");
        assert_eq!(LlvmType::Ptr.to_string(), "ptr");
        assert_eq!(LlvmType::Void.to_string(), "void");
    }

    #[test]
    fn test_render_aggregates() {
        assert_eq!(LlvmType::FatPtr.to_string(), "{ ptr, ptr }");
        assert_eq!(
            LlvmType::Struct("Pair__I32".to_string()).to_string(),
            "%struct.Pair__I32"
        );
        let vec = LlvmType::Vector {
            lanes: 4,
            elem: Box::new(LlvmType::i32()),
        };
        assert_eq!(vec.to_string(), "<4 x i32>");
    }

    #[test]
    fn test_lower_prim() {
        assert_eq!(lower_prim(PrimKind::Bool), LlvmType::i1());
        assert_eq!(lower_prim(PrimKind::U64), LlvmType::i64());
        assert_eq!(lower_prim(PrimKind::Str), LlvmType::Ptr);
        assert_eq!(lower_prim(PrimKind::Unit), LlvmType::Void);
    }

    #[test]
    fn test_store_sizes() {
        assert_eq!(LlvmType::i1().store_size(), 1);
        assert_eq!(LlvmType::i64().store_size(), 8);
        assert_eq!(LlvmType::FatPtr.store_size(), 16);
    }
}
