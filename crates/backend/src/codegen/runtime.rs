//! Runtime function declarations
//!
//! The emitted IR links against a small C runtime: libc
//! symbols plus a handful of helpers for assertions, string handling, and
//! numeric formatting. Declarations are emitted on demand the first time a
//! helper is called; library-IR-only builds emit the whole table up front.
//!
//! Everything lives in one data-driven table so the on-demand and
//! conservative paths cannot drift apart.

use super::state::Emitter;
use crate::error::CodegenError;
use std::collections::HashMap;
use std::sync::LazyLock;

/// A runtime function declaration.
pub struct RuntimeDecl {
    /// Symbol name without `@`
    pub symbol: &'static str,
    /// Full LLVM declaration line
    pub decl: &'static str,
}

/// All C-runtime declarations the emitter may reference.
pub static RUNTIME_DECLARATIONS: LazyLock<Vec<RuntimeDecl>> = LazyLock::new(|| {
    vec![
        // libc
        RuntimeDecl {
            symbol: "malloc",
            decl: "declare ptr @malloc(i64)",
        },
        RuntimeDecl {
            symbol: "free",
            decl: "declare void @free(ptr)",
        },
        RuntimeDecl {
            symbol: "realloc",
            decl: "declare ptr @realloc(ptr, i64)",
        },
        RuntimeDecl {
            symbol: "printf",
            decl: "declare i32 @printf(ptr, ...)",
        },
        RuntimeDecl {
            symbol: "snprintf",
            decl: "declare i32 @snprintf(ptr, i64, ptr, ...)",
        },
        RuntimeDecl {
            symbol: "strcmp",
            decl: "declare i32 @strcmp(ptr, ptr)",
        },
        RuntimeDecl {
            symbol: "strlen",
            decl: "declare i64 @strlen(ptr)",
        },
        RuntimeDecl {
            symbol: "memcmp",
            decl: "declare i32 @memcmp(ptr, ptr, i64)",
        },
        // Runtime helpers
        RuntimeDecl {
            symbol: "panic",
            decl: "declare void @panic(ptr)",
        },
        RuntimeDecl {
            symbol: "assert_tml_loc",
            decl: "declare void @assert_tml_loc(i32, ptr, ptr, i32)",
        },
        RuntimeDecl {
            symbol: "str_eq",
            decl: "declare i32 @str_eq(ptr, ptr)",
        },
        RuntimeDecl {
            symbol: "str_concat",
            decl: "declare ptr @str_concat(ptr, ptr)",
        },
        RuntimeDecl {
            symbol: "str_hash",
            decl: "declare i64 @str_hash(ptr)",
        },
        RuntimeDecl {
            symbol: "format_i64",
            decl: "declare ptr @format_i64(i64)",
        },
        RuntimeDecl {
            symbol: "format_u64",
            decl: "declare ptr @format_u64(i64)",
        },
        RuntimeDecl {
            symbol: "format_f64",
            decl: "declare ptr @format_f64(double)",
        },
        // Collections
        RuntimeDecl {
            symbol: "list_new",
            decl: "declare ptr @list_new(i64)",
        },
        RuntimeDecl {
            symbol: "list_push",
            decl: "declare void @list_push(ptr, i64)",
        },
        RuntimeDecl {
            symbol: "list_get",
            decl: "declare i64 @list_get(ptr, i64)",
        },
        RuntimeDecl {
            symbol: "list_len",
            decl: "declare i64 @list_len(ptr)",
        },
        // Time
        RuntimeDecl {
            symbol: "time_now_ms",
            decl: "declare i64 @time_now_ms()",
        },
        RuntimeDecl {
            symbol: "time_nanos",
            decl: "declare i64 @time_nanos()",
        },
        RuntimeDecl {
            symbol: "time_sleep_ms",
            decl: "declare void @time_sleep_ms(i64)",
        },
    ]
});

static DECLS_BY_SYMBOL: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    RUNTIME_DECLARATIONS
        .iter()
        .map(|d| (d.symbol, d.decl))
        .collect()
});

/// Library types whose drop glue lives in imported library IR rather than
/// the current unit. Matched by the base name of the instantiated type.
pub static LIBRARY_DROP_TYPES: &[&str] = &["Arc", "Rc", "Box", "Mutex", "Text", "List"];

impl Emitter<'_> {
    /// Declare a runtime helper by symbol name (no-op if already declared).
    pub(super) fn declare_runtime(&mut self, symbol: &str) -> Result<(), CodegenError> {
        if let Some(decl) = DECLS_BY_SYMBOL.get(symbol) {
            self.ensure_declared(decl)?;
            Ok(())
        } else {
            Err(CodegenError::inconsistency(format!(
                "no runtime declaration registered for `@{}`",
                symbol
            )))
        }
    }

    /// Emit the full declaration table (library-IR-only builds).
    pub(super) fn declare_all_runtime(&mut self) -> Result<(), CodegenError> {
        for decl in RUNTIME_DECLARATIONS.iter() {
            self.ensure_declared(decl.decl)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Program;
    use crate::env::CompileUnit;
    use crate::codegen::state::EmitterConfig;

    fn unit() -> CompileUnit {
        CompileUnit::new(Program {
            module: "t".to_string(),
            file: "t.tml".to_string(),
            items: vec![],
        })
    }

    #[test]
    fn test_declare_on_demand() {
        let u = unit();
        let mut e = Emitter::new(&u, EmitterConfig::default());
        e.declare_runtime("malloc").unwrap();
        e.declare_runtime("malloc").unwrap();
        assert_eq!(e.declares.matches("@malloc").count(), 1);
        assert!(e.declare_runtime("no_such_helper").is_err());
    }

    #[test]
    fn test_conservative_prelude_covers_abi() {
        let u = unit();
        let mut e = Emitter::new(&u, EmitterConfig::default());
        e.declare_all_runtime().unwrap();
        for sym in ["@malloc", "@free", "@printf", "@assert_tml_loc", "@str_eq"] {
            assert!(e.declares.contains(sym), "missing {}", sym);
        }
    }

    #[test]
    fn test_table_symbols_match_decl_lines() {
        for d in RUNTIME_DECLARATIONS.iter() {
            assert!(
                d.decl.contains(&format!("@{}(", d.symbol)) || d.decl.contains(&format!("@{}()", d.symbol)),
                "decl line for {} does not declare that symbol",
                d.symbol
            );
        }
    }
}
