//! String-literal pool
//!
//! Literals are deduplicated by byte-exact equality into private,
//! null-terminated global constants. Escapes follow LLVM textual
//! conventions (`\NN` hex for non-printable bytes).

use super::state::Emitter;
use crate::error::CodegenError;
use std::fmt::Write as _;

impl Emitter<'_> {
    /// Escape a string for an LLVM IR constant.
    pub(super) fn escape_llvm_string(s: &str) -> Result<String, std::fmt::Error> {
        let mut result = String::new();
        for ch in s.chars() {
            match ch {
                ' '..='!' | '#'..='[' | ']'..='~' => result.push(ch),
                '\\' => result.push_str(r"\\"),
                '"' => result.push_str(r#"\22"#),
                '\n' => result.push_str(r"\0A"),
                '\r' => result.push_str(r"\0D"),
                '\t' => result.push_str(r"\09"),
                _ => {
                    for byte in ch.to_string().as_bytes() {
                        write!(&mut result, r"\{:02X}", byte)?;
                    }
                }
            }
        }
        Ok(result)
    }

    /// Get or create the global for a string literal. Returns the symbol
    /// (`@.str.N`), usable directly as a `ptr` value.
    pub(super) fn string_global(&mut self, s: &str) -> Result<String, CodegenError> {
        if let Some(global) = self.string_pool.get(s) {
            return Ok(global.clone());
        }

        let global = format!("@.str.{}", self.string_counter);
        self.string_counter += 1;

        let escaped = Self::escape_llvm_string(s)?;
        let len = s.len() + 1; // null terminator

        writeln!(
            &mut self.string_globals,
            "{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
            global, len, escaped
        )?;

        self.string_pool.insert(s.to_string(), global.clone());
        Ok(global)
    }
}

#[cfg(test)]
mod tests {
    use super::super::state::{Emitter, EmitterConfig};
    use crate::ast::Program;
    use crate::env::CompileUnit;

    fn unit() -> CompileUnit {
        CompileUnit::new(Program {
            module: "t".to_string(),
            file: "t.tml".to_string(),
            items: vec![],
        })
    }

    #[test]
    fn test_escape() {
        assert_eq!(Emitter::escape_llvm_string("hello").unwrap(), "hello");
        assert_eq!(Emitter::escape_llvm_string("a\nb").unwrap(), r"a\0Ab");
        assert_eq!(Emitter::escape_llvm_string("a\"b").unwrap(), r"a\22b");
        assert_eq!(Emitter::escape_llvm_string("a\\b").unwrap(), r"a\\b");
    }

    #[test]
    fn test_pool_deduplicates_identical_bytes() {
        let u = unit();
        let mut e = Emitter::new(&u, EmitterConfig::default());
        let a = e.string_global("hi").unwrap();
        let b = e.string_global("hi").unwrap();
        let c = e.string_global("ho").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(e.string_globals.matches("constant").count(), 2);
    }

    #[test]
    fn test_null_terminated_with_length() {
        let u = unit();
        let mut e = Emitter::new(&u, EmitterConfig::default());
        e.string_global("abc").unwrap();
        assert!(e.string_globals.contains("[4 x i8] c\"abc\\00\""));
    }
}
