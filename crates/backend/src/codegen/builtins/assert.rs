//! Assertion builtins
//!
//! Every assert lowers to the same triad: compute an `i1`, branch to an ok
//! label or a failure label, and in the failure block call
//! `@assert_tml_loc(i32 0, ptr msg, ptr file, i32 line)` followed by
//! `unreachable`. Pointer operands compare through the null-safe runtime
//! `@str_eq`; mixed integer widths extend per signedness before `icmp eq`;
//! floats compare with `fcmp oeq`.

use super::super::llvm_ty::LlvmType;
use super::super::state::{EmitValue, Emitter};
use crate::ast::CallExpr;
use crate::error::CodegenError;

impl Emitter<'_> {
    pub(super) fn try_assert_builtin(
        &mut self,
        call: &CallExpr,
    ) -> Result<Option<EmitValue>, CodegenError> {
        match call.callee.as_str() {
            "assert" => {
                let vals = self.emit_args(call)?;
                let cond = Self::arg_or_zero(&vals, 0);
                let msg = self.assert_message(call, 1, "assertion failed")?;
                self.emit_assert_triad(&cond.repr, &msg, call.line)?;
                Ok(Some(EmitValue::unit()))
            }
            "assert_eq" | "assert_ne" => {
                let negate = call.callee == "assert_ne";
                let vals = self.emit_args(call)?;
                let left = Self::arg_or_zero(&vals, 0);
                let right = Self::arg_or_zero(&vals, 1);
                let default_msg = if negate {
                    "assertion failed: left != right"
                } else {
                    "assertion failed: left == right"
                };
                let msg = self.assert_message(call, 2, default_msg)?;

                let cond = self.emit_equality(&left, &right, negate)?;
                self.emit_assert_triad(&cond, &msg, call.line)?;
                Ok(Some(EmitValue::unit()))
            }
            _ => Ok(None),
        }
    }

    /// The message string global: explicit argument if present (it was
    /// already evaluated with the others), else a pooled default.
    fn assert_message(
        &mut self,
        call: &CallExpr,
        idx: usize,
        default: &str,
    ) -> Result<String, CodegenError> {
        match call.args.get(idx) {
            Some(crate::ast::Expr::StrLit(s)) => {
                let s = s.clone();
                self.string_global(&s)
            }
            _ => self.string_global(default),
        }
    }

    /// `i1` holding "the assertion passes".
    fn emit_equality(
        &mut self,
        left: &EmitValue,
        right: &EmitValue,
        negate: bool,
    ) -> Result<String, CodegenError> {
        // Pointer operands: the null-safe string comparison helper
        if left.ty == LlvmType::Ptr || right.ty == LlvmType::Ptr {
            self.declare_runtime("str_eq")?;
            let cmp = self.fresh_reg();
            self.ins(format_args!(
                "{} = call i32 @str_eq(ptr {}, ptr {})",
                cmp, left.repr, right.repr
            ))?;
            let reg = self.fresh_reg();
            let pred = if negate { "eq" } else { "ne" };
            self.ins(format_args!("{} = icmp {} i32 {}, 0", reg, pred, cmp))?;
            return Ok(reg);
        }
        if left.ty.is_float() || right.ty.is_float() {
            let reg = self.fresh_reg();
            let pred = if negate { "one" } else { "oeq" };
            self.ins(format_args!(
                "{} = fcmp {} {} {}, {}",
                reg, pred, left.ty, left.repr, right.repr
            ))?;
            return Ok(reg);
        }
        let (l, r, ty) = self.unify_int_widths(left, right)?;
        let reg = self.fresh_reg();
        let pred = if negate { "ne" } else { "eq" };
        self.ins(format_args!("{} = icmp {} {} {}, {}", reg, pred, ty, l, r))?;
        Ok(reg)
    }

    /// `br i1 cond, %ok, %fail` with the diagnostic call and `unreachable`
    /// in the failure block; emission continues in `%ok`.
    pub(super) fn emit_assert_triad(
        &mut self,
        cond: &str,
        msg_global: &str,
        line: u32,
    ) -> Result<(), CodegenError> {
        let ok_label = self.fresh_label("assert_ok");
        let fail_label = self.fresh_label("assert_fail");
        self.term(format_args!(
            "br i1 {}, label %{}, label %{}",
            cond, ok_label, fail_label
        ))?;
        self.open_label(&fail_label)?;
        self.declare_runtime("assert_tml_loc")?;
        let file_global = {
            let file = self.unit.program.file.clone();
            self.string_global(&file)?
        };
        self.ins(format_args!(
            "call void @assert_tml_loc(i32 0, ptr {}, ptr {}, i32 {})",
            msg_global, file_global, line
        ))?;
        self.term(format_args!("unreachable"))?;
        self.open_label(&ok_label)?;
        Ok(())
    }
}
