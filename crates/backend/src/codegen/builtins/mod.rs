//! Builtin helpers
//!
//! Builtins inline short, side-effecting IR sequences, usually ending in a
//! call to a runtime helper. Each category dispatcher is fallible: it
//! returns `Ok(Some(value))` when it recognizes the callee and `Ok(None)`
//! to pass the call to the next dispatcher. The order is fixed: assert,
//! atomic, mem, sync, math/format, collection, string, async, time.

mod assert;
mod atomic;
mod mem;
mod misc;
mod sync;

use super::state::{EmitValue, Emitter};
use crate::ast::CallExpr;
use crate::error::CodegenError;

impl Emitter<'_> {
    pub(super) fn try_builtin(
        &mut self,
        call: &CallExpr,
    ) -> Result<Option<EmitValue>, CodegenError> {
        if let Some(v) = self.try_assert_builtin(call)? {
            return Ok(Some(v));
        }
        if let Some(v) = self.try_atomic_builtin(call)? {
            return Ok(Some(v));
        }
        if let Some(v) = self.try_mem_builtin(call)? {
            return Ok(Some(v));
        }
        if let Some(v) = self.try_sync_builtin(call)? {
            return Ok(Some(v));
        }
        if let Some(v) = self.try_misc_builtin(call)? {
            return Ok(Some(v));
        }
        Ok(None)
    }
}
