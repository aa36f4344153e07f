//! Error type for IR emission.
//!
//! Dispatchers signal "not my concern" with `Option::None`, which is not an
//! error; everything in this enum is fatal for the translation unit. The
//! `Format` variant lets IR writing use `?` throughout.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodegenError {
    /// A callee or type name cannot be found locally or in any imported module.
    #[error("unresolved symbol `{name}` (line {line})")]
    UnresolvedSymbol { name: String, line: u32 },

    /// A type-checked AST carries inconsistent metadata. This is a compiler
    /// bug upstream of the emitter.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// Defensive bound on the instantiation worklist; unreachable for
    /// well-typed programs.
    #[error("monomorphization depth exceeded while instantiating `{0}`")]
    MonomorphizationDepthExceeded(String),

    /// An enum site disagrees with the payload layout recorded at the
    /// enum's first instantiation.
    #[error("enum `{name}` payload layout mismatch: recorded {recorded}, site expected {found}")]
    PayloadLayoutMismatch {
        name: String,
        recorded: String,
        found: String,
    },

    #[error("IR formatting error: {0}")]
    Format(#[from] std::fmt::Error),
}

impl CodegenError {
    pub fn unresolved(name: impl Into<String>, line: u32) -> Self {
        CodegenError::UnresolvedSymbol {
            name: name.into(),
            line,
        }
    }

    pub fn inconsistency(msg: impl Into<String>) -> Self {
        CodegenError::InternalInconsistency(msg.into())
    }
}
