//! Spinlock builtins
//!
//! `spin_lock` is an `atomicrmw xchg ... acquire` retry loop whose exit
//! condition is "the old value was 0". `spin_unlock` publishes the release
//! with an atomic store of 0. `spin_trylock` is a single exchange whose
//! success is the same old-value test.

use super::super::llvm_ty::LlvmType;
use super::super::state::{EmitValue, Emitter};
use crate::ast::CallExpr;
use crate::error::CodegenError;
use crate::types::{PrimKind, SemType};

impl Emitter<'_> {
    pub(super) fn try_sync_builtin(
        &mut self,
        call: &CallExpr,
    ) -> Result<Option<EmitValue>, CodegenError> {
        match call.callee.as_str() {
            "spin_lock" => {
                let vals = self.emit_args(call)?;
                let lock = Self::arg_or_zero(&vals, 0);
                let addr = self.coerce_to(&lock, &LlvmType::Ptr)?;
                let try_label = self.fresh_label("spin_try");
                let acquired_label = self.fresh_label("spin_acquired");
                self.open_label(&try_label)?;
                let old = self.fresh_reg();
                self.ins(format_args!(
                    "{} = atomicrmw xchg ptr {}, i32 1 acquire",
                    old, addr
                ))?;
                let was_free = self.fresh_reg();
                self.ins(format_args!("{} = icmp eq i32 {}, 0", was_free, old))?;
                self.term(format_args!(
                    "br i1 {}, label %{}, label %{}",
                    was_free, acquired_label, try_label
                ))?;
                self.open_label(&acquired_label)?;
                Ok(Some(EmitValue::unit()))
            }
            "spin_unlock" => {
                let vals = self.emit_args(call)?;
                let lock = Self::arg_or_zero(&vals, 0);
                let addr = self.coerce_to(&lock, &LlvmType::Ptr)?;
                self.ins(format_args!(
                    "store atomic i32 0, ptr {} release, align 4",
                    addr
                ))?;
                Ok(Some(EmitValue::unit()))
            }
            "spin_trylock" => {
                let vals = self.emit_args(call)?;
                let lock = Self::arg_or_zero(&vals, 0);
                let addr = self.coerce_to(&lock, &LlvmType::Ptr)?;
                let old = self.fresh_reg();
                self.ins(format_args!(
                    "{} = atomicrmw xchg ptr {}, i32 1 acquire",
                    old, addr
                ))?;
                let acquired = self.fresh_reg();
                self.ins(format_args!("{} = icmp eq i32 {}, 0", acquired, old))?;
                Ok(Some(EmitValue::new(
                    acquired,
                    LlvmType::i1(),
                    SemType::prim(PrimKind::Bool),
                )))
            }
            _ => Ok(None),
        }
    }
}
