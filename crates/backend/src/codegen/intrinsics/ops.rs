//! Scalar and vector operation intrinsics
//!
//! Arithmetic, comparison, and bitwise intrinsics pick the integer or float
//! instruction from the operand type; vectors reuse the scalar opcode
//! (LLVM's arithmetic is elementwise over vector types). Float comparisons
//! use ordered predicates, so NaN compares unequal to everything. Shifts
//! default to arithmetic right-shift; signedness flips `sdiv`/`srem` to
//! their unsigned forms.

use super::super::llvm_ty::{FloatKind, LlvmType};
use super::super::state::{EmitValue, Emitter};
use crate::ast::CallExpr;
use crate::error::CodegenError;
use crate::types::{PrimKind, SemType};

/// True when the operand is a float or a vector of floats.
fn is_float_like(ty: &LlvmType) -> bool {
    match ty {
        LlvmType::Float(_) => true,
        LlvmType::Vector { elem, .. } => elem.is_float(),
        _ => false,
    }
}

impl Emitter<'_> {
    pub(super) fn intrinsic_arith(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let b = Self::arg_or_zero(&vals, 1);
        let unsigned = a.unsigned || b.unsigned;
        let float = is_float_like(&a.ty);
        let inst = match (call.callee.as_str(), float) {
            ("llvm_add", false) => "add",
            ("llvm_sub", false) => "sub",
            ("llvm_mul", false) => "mul",
            ("llvm_div", false) => {
                if unsigned {
                    "udiv"
                } else {
                    "sdiv"
                }
            }
            ("llvm_rem", false) => {
                if unsigned {
                    "urem"
                } else {
                    "srem"
                }
            }
            ("llvm_add", true) => "fadd",
            ("llvm_sub", true) => "fsub",
            ("llvm_mul", true) => "fmul",
            ("llvm_div", true) => "fdiv",
            ("llvm_rem", true) => "frem",
            _ => "add",
        };
        let (l, r, ty) = if a.ty.is_int() && b.ty.is_int() {
            self.unify_int_widths(&a, &b)?
        } else {
            (a.repr.clone(), b.repr.clone(), a.ty.clone())
        };
        let reg = self.fresh_reg();
        self.ins(format_args!("{} = {} {} {}, {}", reg, inst, ty, l, r))?;
        let mut value = EmitValue::new(reg, ty, a.sem.clone());
        value.unsigned = unsigned;
        Ok(value)
    }

    pub(super) fn intrinsic_neg(&mut self, call: &CallExpr) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let reg = self.fresh_reg();
        if is_float_like(&a.ty) {
            self.ins(format_args!("{} = fneg {} {}", reg, a.ty, a.repr))?;
        } else {
            self.ins(format_args!("{} = sub {} 0, {}", reg, a.ty, a.repr))?;
        }
        Ok(EmitValue::new(reg, a.ty, a.sem))
    }

    pub(super) fn intrinsic_compare(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let b = Self::arg_or_zero(&vals, 1);
        let unsigned = a.unsigned || b.unsigned;
        let float = is_float_like(&a.ty);
        let (inst, pred) = match (call.callee.as_str(), float) {
            ("llvm_eq", false) => ("icmp", "eq"),
            ("llvm_ne", false) => ("icmp", "ne"),
            ("llvm_lt", false) => ("icmp", if unsigned { "ult" } else { "slt" }),
            ("llvm_le", false) => ("icmp", if unsigned { "ule" } else { "sle" }),
            ("llvm_gt", false) => ("icmp", if unsigned { "ugt" } else { "sgt" }),
            ("llvm_ge", false) => ("icmp", if unsigned { "uge" } else { "sge" }),
            ("llvm_eq", true) => ("fcmp", "oeq"),
            ("llvm_ne", true) => ("fcmp", "one"),
            ("llvm_lt", true) => ("fcmp", "olt"),
            ("llvm_le", true) => ("fcmp", "ole"),
            ("llvm_gt", true) => ("fcmp", "ogt"),
            _ => ("fcmp", "oge"),
        };
        let (l, r, ty) = if a.ty.is_int() && b.ty.is_int() {
            self.unify_int_widths(&a, &b)?
        } else {
            (a.repr.clone(), b.repr.clone(), a.ty.clone())
        };
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = {} {} {} {}, {}",
            reg, inst, pred, ty, l, r
        ))?;
        Ok(EmitValue::new(
            reg,
            LlvmType::i1(),
            SemType::prim(PrimKind::Bool),
        ))
    }

    pub(super) fn intrinsic_bitwise(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let b = Self::arg_or_zero(&vals, 1);
        let inst = match call.callee.as_str() {
            "llvm_and" => "and",
            "llvm_or" => "or",
            "llvm_xor" => "xor",
            "llvm_shl" => "shl",
            // Arithmetic shift preserves the sign unless the value is
            // unsigned.
            _ => {
                if a.unsigned {
                    "lshr"
                } else {
                    "ashr"
                }
            }
        };
        let (l, r, ty) = self.unify_int_widths(&a, &b)?;
        let reg = self.fresh_reg();
        self.ins(format_args!("{} = {} {} {}, {}", reg, inst, ty, l, r))?;
        let mut value = EmitValue::new(reg, ty, a.sem.clone());
        value.unsigned = a.unsigned;
        Ok(value)
    }

    pub(super) fn intrinsic_bitnot(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let reg = self.fresh_reg();
        self.ins(format_args!("{} = xor {} {}, -1", reg, a.ty, a.repr))?;
        Ok(EmitValue::new(reg, a.ty, a.sem))
    }

    // ---- compiler hints --------------------------------------------------

    pub(super) fn intrinsic_unreachable(&mut self) -> Result<EmitValue, CodegenError> {
        self.term(format_args!("unreachable"))?;
        Ok(EmitValue::unit())
    }

    pub(super) fn intrinsic_assume(&mut self, call: &CallExpr) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let cond = Self::arg_or_zero(&vals, 0);
        self.ensure_declared("declare void @llvm.assume(i1)")?;
        self.ins(format_args!("call void @llvm.assume(i1 {})", cond.repr))?;
        Ok(EmitValue::unit())
    }

    pub(super) fn intrinsic_expect(
        &mut self,
        call: &CallExpr,
        expected: bool,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let cond = Self::arg_or_zero(&vals, 0);
        self.ensure_declared("declare i1 @llvm.expect.i1(i1, i1)")?;
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = call i1 @llvm.expect.i1(i1 {}, i1 {})",
            reg,
            cond.repr,
            if expected { 1 } else { 0 }
        ))?;
        Ok(EmitValue::new(
            reg,
            LlvmType::i1(),
            SemType::prim(PrimKind::Bool),
        ))
    }

    pub(super) fn intrinsic_fence(
        &mut self,
        single_thread: bool,
    ) -> Result<EmitValue, CodegenError> {
        if single_thread {
            self.ins(format_args!("fence syncscope(\"singlethread\") seq_cst"))?;
        } else {
            self.ins(format_args!("fence seq_cst"))?;
        }
        Ok(EmitValue::unit())
    }

    // ---- bit manipulation ------------------------------------------------

    pub(super) fn intrinsic_count_zeros(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let bits = a.ty.int_bits().unwrap_or(32);
        let name = &call.callee; // ctlz | cttz
        self.ensure_declared(&format!(
            "declare i{bits} @llvm.{name}.i{bits}(i{bits}, i1)"
        ))?;
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = call i{bits} @llvm.{name}.i{bits}(i{bits} {}, i1 false)",
            reg, a.repr
        ))?;
        Ok(EmitValue::new(reg, a.ty, a.sem))
    }

    pub(super) fn intrinsic_bit_unary(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let bits = a.ty.int_bits().unwrap_or(32);
        let name = &call.callee; // ctpop | bswap | bitreverse
        self.ensure_declared(&format!("declare i{bits} @llvm.{name}.i{bits}(i{bits})"))?;
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = call i{bits} @llvm.{name}.i{bits}(i{bits} {})",
            reg, a.repr
        ))?;
        Ok(EmitValue::new(reg, a.ty, a.sem))
    }

    // ---- float math ------------------------------------------------------

    fn float_suffix(ty: &LlvmType) -> FloatKind {
        match ty {
            LlvmType::Float(FloatKind::F32) => FloatKind::F32,
            _ => FloatKind::F64,
        }
    }

    pub(super) fn intrinsic_float_unary(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let kind = Self::float_suffix(&a.ty);
        let suffix = kind.intrinsic_suffix();
        let ty = LlvmType::Float(kind);
        let name = call.callee.as_str();
        self.ensure_declared(&format!("declare {ty} @llvm.{name}.{suffix}({ty})"))?;
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = call {ty} @llvm.{name}.{suffix}({ty} {})",
            reg, a.repr
        ))?;
        Ok(EmitValue::new(reg, ty, a.sem))
    }

    pub(super) fn intrinsic_float_binary(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let b = Self::arg_or_zero(&vals, 1);
        let kind = Self::float_suffix(&a.ty);
        let suffix = kind.intrinsic_suffix();
        let ty = LlvmType::Float(kind);
        let name = call.callee.as_str();
        self.ensure_declared(&format!(
            "declare {ty} @llvm.{name}.{suffix}({ty}, {ty})"
        ))?;
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = call {ty} @llvm.{name}.{suffix}({ty} {}, {ty} {})",
            reg, a.repr, b.repr
        ))?;
        Ok(EmitValue::new(reg, ty, a.sem))
    }

    pub(super) fn intrinsic_fma(&mut self, call: &CallExpr) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let b = Self::arg_or_zero(&vals, 1);
        let c = Self::arg_or_zero(&vals, 2);
        let kind = Self::float_suffix(&a.ty);
        let suffix = kind.intrinsic_suffix();
        let ty = LlvmType::Float(kind);
        self.ensure_declared(&format!(
            "declare {ty} @llvm.fma.{suffix}({ty}, {ty}, {ty})"
        ))?;
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = call {ty} @llvm.fma.{suffix}({ty} {}, {ty} {}, {ty} {})",
            reg, a.repr, b.repr, c.repr
        ))?;
        Ok(EmitValue::new(reg, ty, a.sem))
    }
}
