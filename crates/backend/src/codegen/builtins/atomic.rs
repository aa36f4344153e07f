//! Atomic builtins
//!
//! All orderings are `seq_cst` except the dedicated fences. Width follows
//! the `[T]` argument when spelled, else the value operand, defaulting to
//! `i32`. `atomic_cas` emits `cmpxchg` and yields the old value.

use super::super::llvm_ty::LlvmType;
use super::super::state::{EmitValue, Emitter};
use crate::ast::CallExpr;
use crate::error::CodegenError;
use crate::types::{PrimKind, SemType};

impl Emitter<'_> {
    /// Integer kind for an atomic op: `[T]`, else the width of the value
    /// operand, else `I32`.
    fn atomic_kind(&self, call: &CallExpr, vals: &[EmitValue], value_idx: usize) -> PrimKind {
        if let Some(SemType::Prim(kind)) = self.type_arg(call, 0)
            && kind.is_integer()
        {
            return kind;
        }
        vals.get(value_idx)
            .and_then(|v| v.sem.as_prim())
            .filter(|k| k.is_integer())
            .unwrap_or(PrimKind::I32)
    }

    pub(super) fn try_atomic_builtin(
        &mut self,
        call: &CallExpr,
    ) -> Result<Option<EmitValue>, CodegenError> {
        match call.callee.as_str() {
            "atomic_load" => {
                let vals = self.emit_args(call)?;
                let ptr = Self::arg_or_zero(&vals, 0);
                let kind = self.atomic_kind(call, &vals, usize::MAX);
                let bits = kind.bit_width().unwrap_or(32);
                let addr = self.coerce_to(&ptr, &LlvmType::Ptr)?;
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = load atomic i{bits}, ptr {} seq_cst, align {}",
                    reg,
                    addr,
                    bits / 8
                ))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::Int { bits },
                    SemType::prim(kind),
                )))
            }
            "atomic_store" => {
                let vals = self.emit_args(call)?;
                let ptr = Self::arg_or_zero(&vals, 0);
                let value = Self::arg_or_zero(&vals, 1);
                let kind = self.atomic_kind(call, &vals, 1);
                let bits = kind.bit_width().unwrap_or(32);
                let addr = self.coerce_to(&ptr, &LlvmType::Ptr)?;
                let stored = self.coerce_to(&value, &LlvmType::Int { bits })?;
                self.ins(format_args!(
                    "store atomic i{bits} {}, ptr {} seq_cst, align {}",
                    stored,
                    addr,
                    bits / 8
                ))?;
                Ok(Some(EmitValue::unit()))
            }
            "atomic_add" | "atomic_sub" | "atomic_and" | "atomic_or" | "atomic_exchange" => {
                let op = match call.callee.as_str() {
                    "atomic_add" => "add",
                    "atomic_sub" => "sub",
                    "atomic_and" => "and",
                    "atomic_or" => "or",
                    _ => "xchg",
                };
                let vals = self.emit_args(call)?;
                let ptr = Self::arg_or_zero(&vals, 0);
                let value = Self::arg_or_zero(&vals, 1);
                let kind = self.atomic_kind(call, &vals, 1);
                let bits = kind.bit_width().unwrap_or(32);
                let addr = self.coerce_to(&ptr, &LlvmType::Ptr)?;
                let operand = self.coerce_to(&value, &LlvmType::Int { bits })?;
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = atomicrmw {} ptr {}, i{bits} {} seq_cst",
                    reg, op, addr, operand
                ))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::Int { bits },
                    SemType::prim(kind),
                )))
            }
            "atomic_cas" => {
                let vals = self.emit_args(call)?;
                let ptr = Self::arg_or_zero(&vals, 0);
                let expected = Self::arg_or_zero(&vals, 1);
                let new = Self::arg_or_zero(&vals, 2);
                let kind = self.atomic_kind(call, &vals, 1);
                let bits = kind.bit_width().unwrap_or(32);
                let int_ty = LlvmType::Int { bits };
                let addr = self.coerce_to(&ptr, &LlvmType::Ptr)?;
                let exp = self.coerce_to(&expected, &int_ty)?;
                let val = self.coerce_to(&new, &int_ty)?;
                let pair = self.fresh_reg();
                self.ins(format_args!(
                    "{} = cmpxchg ptr {}, i{bits} {}, i{bits} {} seq_cst seq_cst",
                    pair, addr, exp, val
                ))?;
                let old = self.fresh_reg();
                self.ins(format_args!(
                    "{} = extractvalue {{ i{bits}, i1 }} {}, 0",
                    old, pair
                ))?;
                Ok(Some(EmitValue::new(old, int_ty, SemType::prim(kind))))
            }
            // Plain `fence`/`compiler_fence` are intrinsics; these are the
            // directional builtin forms.
            "fence_acquire" => {
                self.ins(format_args!("fence acquire"))?;
                Ok(Some(EmitValue::unit()))
            }
            "fence_release" => {
                self.ins(format_args!("fence release"))?;
                Ok(Some(EmitValue::unit()))
            }
            _ => Ok(None),
        }
    }
}
