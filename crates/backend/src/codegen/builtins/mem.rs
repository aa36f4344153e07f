//! Memory-management builtins
//!
//! Thin wrappers over the C allocator and the byte-wise `@llvm.mem*`
//! intrinsics. Lengths here are raw byte counts; the element-typed bulk
//! operations live with the intrinsics.

use super::super::llvm_ty::LlvmType;
use super::super::state::{EmitValue, Emitter};
use crate::ast::{CallExpr, Expr};
use crate::error::CodegenError;
use crate::types::{PrimKind, SemType};

impl Emitter<'_> {
    pub(super) fn try_mem_builtin(
        &mut self,
        call: &CallExpr,
    ) -> Result<Option<EmitValue>, CodegenError> {
        match call.callee.as_str() {
            "alloc" | "mem_alloc" => {
                let vals = self.emit_args(call)?;
                let size = Self::arg_or_zero(&vals, 0);
                let len = self.coerce_to(&size, &LlvmType::i64())?;
                self.declare_runtime("malloc")?;
                let reg = self.fresh_reg();
                self.ins(format_args!("{} = call ptr @malloc(i64 {})", reg, len))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::Ptr,
                    SemType::ptr(SemType::prim(PrimKind::U8), true),
                )))
            }
            "dealloc" | "mem_free" => {
                let vals = self.emit_args(call)?;
                let ptr = Self::arg_or_zero(&vals, 0);
                let addr = self.coerce_to(&ptr, &LlvmType::Ptr)?;
                self.declare_runtime("free")?;
                self.ins(format_args!("call void @free(ptr {})", addr))?;
                Ok(Some(EmitValue::unit()))
            }
            "mem_copy" | "mem_move" => {
                let which = if call.callee == "mem_copy" {
                    "memcpy"
                } else {
                    "memmove"
                };
                let vals = self.emit_args(call)?;
                let dst = Self::arg_or_zero(&vals, 0);
                let src = Self::arg_or_zero(&vals, 1);
                let len = Self::arg_or_zero(&vals, 2);
                let dst_ptr = self.coerce_to(&dst, &LlvmType::Ptr)?;
                let src_ptr = self.coerce_to(&src, &LlvmType::Ptr)?;
                let n = self.coerce_to(&len, &LlvmType::i64())?;
                self.ensure_declared(&format!(
                    "declare void @llvm.{}.p0.p0.i64(ptr, ptr, i64, i1)",
                    which
                ))?;
                self.ins(format_args!(
                    "call void @llvm.{}.p0.p0.i64(ptr {}, ptr {}, i64 {}, i1 false)",
                    which, dst_ptr, src_ptr, n
                ))?;
                Ok(Some(EmitValue::unit()))
            }
            "mem_set" | "mem_zero" => {
                let vals = self.emit_args(call)?;
                let dst = Self::arg_or_zero(&vals, 0);
                let (byte_repr, len_idx) = if call.callee == "mem_set" {
                    let byte = Self::arg_or_zero(&vals, 1);
                    (self.coerce_to(&byte, &LlvmType::i8())?, 2)
                } else {
                    ("0".to_string(), 1)
                };
                let len = Self::arg_or_zero(&vals, len_idx);
                let dst_ptr = self.coerce_to(&dst, &LlvmType::Ptr)?;
                let n = self.coerce_to(&len, &LlvmType::i64())?;
                self.ensure_declared("declare void @llvm.memset.p0.i64(ptr, i8, i64, i1)")?;
                self.ins(format_args!(
                    "call void @llvm.memset.p0.i64(ptr {}, i8 {}, i64 {}, i1 false)",
                    dst_ptr, byte_repr, n
                ))?;
                Ok(Some(EmitValue::unit()))
            }
            "mem_compare" | "mem_eq" => {
                let vals = self.emit_args(call)?;
                let a = Self::arg_or_zero(&vals, 0);
                let b = Self::arg_or_zero(&vals, 1);
                let len = Self::arg_or_zero(&vals, 2);
                let a_ptr = self.coerce_to(&a, &LlvmType::Ptr)?;
                let b_ptr = self.coerce_to(&b, &LlvmType::Ptr)?;
                let n = self.coerce_to(&len, &LlvmType::i64())?;
                self.declare_runtime("memcmp")?;
                let cmp = self.fresh_reg();
                self.ins(format_args!(
                    "{} = call i32 @memcmp(ptr {}, ptr {}, i64 {})",
                    cmp, a_ptr, b_ptr, n
                ))?;
                if call.callee == "mem_compare" {
                    return Ok(Some(EmitValue::new(
                        cmp,
                        LlvmType::i32(),
                        SemType::prim(PrimKind::I32),
                    )));
                }
                let reg = self.fresh_reg();
                self.ins(format_args!("{} = icmp eq i32 {}, 0", reg, cmp))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::i1(),
                    SemType::prim(PrimKind::Bool),
                )))
            }
            "mem_realloc" => {
                let vals = self.emit_args(call)?;
                let ptr = Self::arg_or_zero(&vals, 0);
                let size = Self::arg_or_zero(&vals, 1);
                let addr = self.coerce_to(&ptr, &LlvmType::Ptr)?;
                let len = self.coerce_to(&size, &LlvmType::i64())?;
                self.declare_runtime("realloc")?;
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = call ptr @realloc(ptr {}, i64 {})",
                    reg, addr, len
                ))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::Ptr,
                    SemType::ptr(SemType::prim(PrimKind::U8), true),
                )))
            }
            "mem_zeroed" => {
                let vals = self.emit_args(call)?;
                let size = Self::arg_or_zero(&vals, 0);
                let len = self.coerce_to(&size, &LlvmType::i64())?;
                self.declare_runtime("malloc")?;
                let reg = self.fresh_reg();
                self.ins(format_args!("{} = call ptr @malloc(i64 {})", reg, len))?;
                self.ensure_declared("declare void @llvm.memset.p0.i64(ptr, i8, i64, i1)")?;
                self.ins(format_args!(
                    "call void @llvm.memset.p0.i64(ptr {}, i8 0, i64 {}, i1 false)",
                    reg, len
                ))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::Ptr,
                    SemType::ptr(SemType::prim(PrimKind::U8), true),
                )))
            }
            "mem_forget" => {
                // Suppress the scope-exit drop; no code
                if let Some(Expr::Var(name)) = call.args.first() {
                    let name = name.clone();
                    self.mark_consumed(&name);
                }
                Ok(Some(EmitValue::unit()))
            }
            _ => Ok(None),
        }
    }
}
