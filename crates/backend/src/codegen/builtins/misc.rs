//! Formatting, string, collection, async, and time builtins
//!
//! `print`/`println` pick a printf format string from the operand type;
//! booleans select between pooled `"true"`/`"false"` strings. String
//! helpers call the runtime's null-safe implementations. `block_on`
//! evaluates its async call and extracts the `Poll::Ready` payload (the
//! emitter's whole async story: the callee must be immediately ready).

use super::super::llvm_ty::{FloatKind, LlvmType};
use super::super::state::{EmitValue, Emitter};
use crate::ast::CallExpr;
use crate::error::CodegenError;
use crate::types::{PrimKind, SemType};

impl Emitter<'_> {
    pub(super) fn try_misc_builtin(
        &mut self,
        call: &CallExpr,
    ) -> Result<Option<EmitValue>, CodegenError> {
        match call.callee.as_str() {
            "print" | "println" => {
                let newline = call.callee == "println";
                let vals = self.emit_args(call)?;
                let value = Self::arg_or_zero(&vals, 0);
                self.emit_print(&value, newline)?;
                Ok(Some(EmitValue::unit()))
            }
            "int_to_text" => {
                let vals = self.emit_args(call)?;
                let value = Self::arg_or_zero(&vals, 0);
                let widened = self.coerce_to(&value, &LlvmType::i64())?;
                let helper = if value.unsigned { "format_u64" } else { "format_i64" };
                self.declare_runtime(helper)?;
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = call ptr @{}(i64 {})",
                    reg, helper, widened
                ))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::Ptr,
                    SemType::prim(PrimKind::Str),
                )))
            }
            "float_to_text" => {
                let vals = self.emit_args(call)?;
                let value = Self::arg_or_zero(&vals, 0);
                let widened = self.coerce_to(&value, &LlvmType::Float(FloatKind::F64))?;
                self.declare_runtime("format_f64")?;
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = call ptr @format_f64(double {})",
                    reg, widened
                ))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::Ptr,
                    SemType::prim(PrimKind::Str),
                )))
            }
            "float_abs" => {
                let vals = self.emit_args(call)?;
                let value = Self::arg_or_zero(&vals, 0);
                let kind = match value.ty {
                    LlvmType::Float(FloatKind::F32) => FloatKind::F32,
                    _ => FloatKind::F64,
                };
                let ty = LlvmType::Float(kind);
                let suffix = kind.intrinsic_suffix();
                self.ensure_declared(&format!("declare {ty} @llvm.fabs.{suffix}({ty})"))?;
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = call {ty} @llvm.fabs.{suffix}({ty} {})",
                    reg, value.repr
                ))?;
                Ok(Some(EmitValue::new(reg, ty, value.sem)))
            }
            // Strings
            "str_eq" => {
                let vals = self.emit_args(call)?;
                let a = Self::arg_or_zero(&vals, 0);
                let b = Self::arg_or_zero(&vals, 1);
                self.declare_runtime("str_eq")?;
                let cmp = self.fresh_reg();
                self.ins(format_args!(
                    "{} = call i32 @str_eq(ptr {}, ptr {})",
                    cmp, a.repr, b.repr
                ))?;
                let reg = self.fresh_reg();
                self.ins(format_args!("{} = icmp ne i32 {}, 0", reg, cmp))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::i1(),
                    SemType::prim(PrimKind::Bool),
                )))
            }
            "str_concat" => {
                let vals = self.emit_args(call)?;
                let a = Self::arg_or_zero(&vals, 0);
                let b = Self::arg_or_zero(&vals, 1);
                self.declare_runtime("str_concat")?;
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = call ptr @str_concat(ptr {}, ptr {})",
                    reg, a.repr, b.repr
                ))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::Ptr,
                    SemType::prim(PrimKind::Str),
                )))
            }
            "str_len" => {
                let vals = self.emit_args(call)?;
                let a = Self::arg_or_zero(&vals, 0);
                self.declare_runtime("strlen")?;
                let reg = self.fresh_reg();
                self.ins(format_args!("{} = call i64 @strlen(ptr {})", reg, a.repr))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::i64(),
                    SemType::prim(PrimKind::U64),
                )))
            }
            "str_hash" => {
                let vals = self.emit_args(call)?;
                let a = Self::arg_or_zero(&vals, 0);
                self.declare_runtime("str_hash")?;
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = call i64 @str_hash(ptr {})",
                    reg, a.repr
                ))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::i64(),
                    SemType::prim(PrimKind::U64),
                )))
            }
            // Collections
            "list_new" => {
                let vals = self.emit_args(call)?;
                let cap = Self::arg_or_zero(&vals, 0);
                let n = self.coerce_to(&cap, &LlvmType::i64())?;
                self.declare_runtime("list_new")?;
                let reg = self.fresh_reg();
                self.ins(format_args!("{} = call ptr @list_new(i64 {})", reg, n))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::Ptr,
                    SemType::named("List", vec![SemType::prim(PrimKind::I64)]),
                )))
            }
            "list_push" => {
                let vals = self.emit_args(call)?;
                let list = Self::arg_or_zero(&vals, 0);
                let value = Self::arg_or_zero(&vals, 1);
                let item = self.coerce_to(&value, &LlvmType::i64())?;
                self.declare_runtime("list_push")?;
                self.ins(format_args!(
                    "call void @list_push(ptr {}, i64 {})",
                    list.repr, item
                ))?;
                Ok(Some(EmitValue::unit()))
            }
            "list_get" => {
                let vals = self.emit_args(call)?;
                let list = Self::arg_or_zero(&vals, 0);
                let index = Self::arg_or_zero(&vals, 1);
                let idx = self.coerce_to(&index, &LlvmType::i64())?;
                self.declare_runtime("list_get")?;
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = call i64 @list_get(ptr {}, i64 {})",
                    reg, list.repr, idx
                ))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::i64(),
                    SemType::prim(PrimKind::I64),
                )))
            }
            "list_len" => {
                let vals = self.emit_args(call)?;
                let list = Self::arg_or_zero(&vals, 0);
                self.declare_runtime("list_len")?;
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = call i64 @list_len(ptr {})",
                    reg, list.repr
                ))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::i64(),
                    SemType::prim(PrimKind::U64),
                )))
            }
            // Async
            "block_on" => {
                let vals = self.emit_args(call)?;
                let poll = Self::arg_or_zero(&vals, 0);
                let value = self.emit_poll_extract(&poll)?;
                Ok(Some(value))
            }
            // Time
            "time_now" => {
                self.declare_runtime("time_now_ms")?;
                let reg = self.fresh_reg();
                self.ins(format_args!("{} = call i64 @time_now_ms()", reg))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::i64(),
                    SemType::prim(PrimKind::I64),
                )))
            }
            "time_nanos" => {
                self.declare_runtime("time_nanos")?;
                let reg = self.fresh_reg();
                self.ins(format_args!("{} = call i64 @time_nanos()", reg))?;
                Ok(Some(EmitValue::new(
                    reg,
                    LlvmType::i64(),
                    SemType::prim(PrimKind::I64),
                )))
            }
            "sleep_ms" => {
                let vals = self.emit_args(call)?;
                let ms = Self::arg_or_zero(&vals, 0);
                let n = self.coerce_to(&ms, &LlvmType::i64())?;
                self.declare_runtime("time_sleep_ms")?;
                self.ins(format_args!("call void @time_sleep_ms(i64 {})", n))?;
                Ok(Some(EmitValue::unit()))
            }
            _ => Ok(None),
        }
    }

    /// printf with a per-type format string from the pool.
    fn emit_print(&mut self, value: &EmitValue, newline: bool) -> Result<(), CodegenError> {
        self.declare_runtime("printf")?;

        // Booleans print as words, via a select over pooled strings
        if value.ty == LlvmType::i1() {
            let true_global = self.string_global("true")?;
            let false_global = self.string_global("false")?;
            let text = self.fresh_reg();
            self.ins(format_args!(
                "{} = select i1 {}, ptr {}, ptr {}",
                text, value.repr, true_global, false_global
            ))?;
            let fmt = self.string_global(if newline { "%s\n" } else { "%s" })?;
            self.ins(format_args!(
                "call i32 @printf(ptr {}, ptr {})",
                fmt, text
            ))?;
            return Ok(());
        }

        let (fmt_spec, rendered) = match &value.ty {
            LlvmType::Int { bits } if *bits <= 32 => {
                let widened = self.coerce_to(value, &LlvmType::i32())?;
                let spec = if value.unsigned { "%u" } else { "%d" };
                (spec, format!("i32 {}", widened))
            }
            LlvmType::Int { .. } => {
                let widened = self.coerce_to(value, &LlvmType::i64())?;
                let spec = if value.unsigned { "%llu" } else { "%lld" };
                (spec, format!("i64 {}", widened))
            }
            LlvmType::Float(_) => {
                let widened = self.coerce_to(value, &LlvmType::Float(FloatKind::F64))?;
                ("%f", format!("double {}", widened))
            }
            LlvmType::Ptr => ("%s", format!("ptr {}", value.repr)),
            other => ("%p", format!("{} {}", other, value.repr)),
        };
        let fmt = if newline {
            self.string_global(&format!("{}\n", fmt_spec))?
        } else {
            self.string_global(fmt_spec)?
        };
        self.ins(format_args!(
            "call i32 @printf(ptr {}, {})",
            fmt, rendered
        ))?;
        Ok(())
    }
}
