//! TML LLVM back-end
//!
//! Consumes a fully type-checked AST (produced by the front-end driver) and
//! emits textual LLVM IR suitable for `llc`/`opt` and linkage against the
//! small TML C runtime.
//!
//! ```rust,ignore
//! use tml_backend::{emit_to_ir, EmitterConfig};
//!
//! let unit: tml_backend::CompileUnit = serde_json::from_str(&ast_json)?;
//! let ir = emit_to_ir(&unit, EmitterConfig::default())?;
//! std::fs::write("out.ll", ir)?;
//! ```
//!
//! The emitter is deterministic: the same AST produces byte-identical IR.
//! Lexing, parsing, type checking, linking, and the runtime library are
//! external collaborators; this crate only turns trees into instructions.

pub mod ast;
pub mod codegen;
pub mod env;
pub mod error;
pub mod types;

pub use ast::Program;
pub use codegen::{Emitter, EmitterConfig};
pub use env::{CompileUnit, ImplSource, ModuleExports};
pub use error::CodegenError;
pub use types::{PrimKind, SemType};

use std::path::Path;

/// Emit one translation unit to IR text.
pub fn emit_to_ir(unit: &CompileUnit, config: EmitterConfig) -> Result<String, CodegenError> {
    let mut emitter = Emitter::new(unit, config);
    emitter.emit_program()
}

/// Emit one translation unit and write the `.ll` next to `output_path`.
pub fn emit_to_file(
    unit: &CompileUnit,
    config: EmitterConfig,
    output_path: &Path,
) -> Result<(), String> {
    let ir = emit_to_ir(unit, config).map_err(|e| e.to_string())?;
    std::fs::write(output_path, ir)
        .map_err(|e| format!("failed to write {}: {}", output_path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Block, FuncDef, Item};

    fn trivial_unit() -> CompileUnit {
        CompileUnit::new(Program {
            module: "app".to_string(),
            file: "app.tml".to_string(),
            items: vec![Item::Func(FuncDef {
                name: "main".to_string(),
                type_params: vec![],
                params: vec![],
                ret: SemType::unit(),
                body: Block::empty(),
                line: 1,
            })],
        })
    }

    #[test]
    fn test_emit_to_ir_produces_main_wrapper() {
        let ir = emit_to_ir(&trivial_unit(), EmitterConfig::default()).unwrap();
        assert!(ir.contains("define void @tml_main()"));
        assert!(ir.contains("define i32 @main()"));
        assert!(ir.contains("ret i32 0"));
    }

    #[test]
    fn test_emit_to_file_writes_ll() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.ll");
        emit_to_file(&trivial_unit(), EmitterConfig::default(), &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("define i32 @main()"));
    }

    #[test]
    fn test_unit_roundtrips_through_json() {
        let unit = trivial_unit();
        let json = serde_json::to_string(&unit).unwrap();
        let back: CompileUnit = serde_json::from_str(&json).unwrap();
        assert_eq!(back.program.module, "app");
        let a = emit_to_ir(&unit, EmitterConfig::default()).unwrap();
        let b = emit_to_ir(&back, EmitterConfig::default()).unwrap();
        assert_eq!(a, b);
    }
}
