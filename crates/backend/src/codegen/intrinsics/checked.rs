//! Checked and saturating arithmetic
//!
//! `checked_*[T]` lowers to the `@llvm.*.with.overflow.iN` intrinsics and
//! materializes a `Maybe[T]`: the overflow flag branches between a block
//! storing tag 0 plus the payload (`Just`) and a block storing tag 1
//! (`Nothing`). `checked_div` tests the divisor against zero instead of an
//! overflow flag. The payload store honors the enum's recorded layout.
//!
//! `saturating_add`/`sub` use the `.sat` intrinsics directly. There is no
//! `.sat` multiply, so `saturating_mul` combines the overflow intrinsic
//! with a select on the operands' sign: positive overflow clamps to MAX,
//! negative to MIN.

use super::super::llvm_ty::LlvmType;
use super::super::state::{EmitValue, Emitter, PayloadLayout};
use crate::ast::CallExpr;
use crate::error::CodegenError;
use crate::types::{PrimKind, SemType};

/// MIN/MAX literals for an `iN` type.
fn int_min_max(bits: u32, unsigned: bool) -> (String, String) {
    if unsigned {
        let max = if bits >= 128 {
            u128::MAX.to_string()
        } else {
            ((1u128 << bits) - 1).to_string()
        };
        return ("0".to_string(), max);
    }
    if bits >= 128 {
        (i128::MIN.to_string(), i128::MAX.to_string())
    } else {
        let max = (1i128 << (bits - 1)) - 1;
        let min = -(1i128 << (bits - 1));
        (min.to_string(), max.to_string())
    }
}

impl Emitter<'_> {
    /// Result element kind for a checked/saturating intrinsic: the `[T]`
    /// argument wins, then the first operand's type.
    fn checked_kind(&self, call: &CallExpr, vals: &[EmitValue]) -> PrimKind {
        if let Some(SemType::Prim(kind)) = self.type_arg(call, 0) {
            return kind;
        }
        vals.first()
            .and_then(|v| v.sem.as_prim())
            .filter(|k| k.is_integer())
            .unwrap_or(PrimKind::I32)
    }

    pub(super) fn intrinsic_checked(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let b = Self::arg_or_zero(&vals, 1);
        let kind = self.checked_kind(call, &vals);
        let bits = kind.bit_width().unwrap_or(32);
        let signed = if kind.is_unsigned() { "u" } else { "s" };
        let op = match call.callee.as_str() {
            "checked_add" => "add",
            "checked_sub" => "sub",
            _ => "mul",
        };
        let int_ty = LlvmType::Int { bits };
        let lhs = self.coerce_to(&a, &int_ty)?;
        let rhs = self.coerce_to(&b, &int_ty)?;

        self.ensure_declared(&format!(
            "declare {{ i{bits}, i1 }} @llvm.{signed}{op}.with.overflow.i{bits}(i{bits}, i{bits})"
        ))?;
        let pair = self.fresh_reg();
        self.ins(format_args!(
            "{} = call {{ i{bits}, i1 }} @llvm.{signed}{op}.with.overflow.i{bits}(i{bits} {}, i{bits} {})",
            pair, lhs, rhs
        ))?;
        let result = self.fresh_reg();
        self.ins(format_args!(
            "{} = extractvalue {{ i{bits}, i1 }} {}, 0",
            result, pair
        ))?;
        let overflow = self.fresh_reg();
        self.ins(format_args!(
            "{} = extractvalue {{ i{bits}, i1 }} {}, 1",
            overflow, pair
        ))?;

        let payload = EmitValue::new(result, int_ty, SemType::prim(kind));
        self.build_maybe(kind, &overflow, &payload)
    }

    pub(super) fn intrinsic_checked_div(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let b = Self::arg_or_zero(&vals, 1);
        let kind = self.checked_kind(call, &vals);
        let bits = kind.bit_width().unwrap_or(32);
        let int_ty = LlvmType::Int { bits };
        let lhs = self.coerce_to(&a, &int_ty)?;
        let rhs = self.coerce_to(&b, &int_ty)?;

        // Divisor-is-zero plays the role of the overflow flag; the quotient
        // is computed only on the non-zero path.
        let mangled = self.register_enum("Maybe", &[SemType::prim(kind)])?;
        let layout = self.enum_layout(&mangled)?.clone();
        let just_tag = layout.variant("Just").map_or(0, |v| v.tag);
        let nothing_tag = layout.variant("Nothing").map_or(1, |v| v.tag);

        let is_zero = self.fresh_reg();
        self.ins(format_args!(
            "{} = icmp eq i{bits} {}, 0",
            is_zero, rhs
        ))?;

        let addr = self.fresh_reg();
        self.ins(format_args!("{} = alloca %struct.{}", addr, mangled))?;
        let tag_addr = self.fresh_reg();
        self.ins(format_args!(
            "{} = getelementptr %struct.{}, ptr {}, i32 0, i32 0",
            tag_addr, mangled, addr
        ))?;

        let div_label = self.fresh_label("checked_div");
        let zero_label = self.fresh_label("checked_zero");
        let done_label = self.fresh_label("checked_done");
        self.term(format_args!(
            "br i1 {}, label %{}, label %{}",
            is_zero, zero_label, div_label
        ))?;

        self.open_label(&div_label)?;
        let quot = self.fresh_reg();
        let div_op = if kind.is_unsigned() { "udiv" } else { "sdiv" };
        self.ins(format_args!(
            "{} = {} i{bits} {}, {}",
            quot, div_op, lhs, rhs
        ))?;
        self.ins(format_args!("store i32 {}, ptr {}", just_tag, tag_addr))?;
        let payload = EmitValue::new(quot, int_ty, SemType::prim(kind));
        self.store_maybe_payload(&mangled, &layout.payload, &addr, &payload)?;
        self.term(format_args!("br label %{}", done_label))?;

        self.open_label(&zero_label)?;
        self.ins(format_args!(
            "store i32 {}, ptr {}",
            nothing_tag, tag_addr
        ))?;
        self.term(format_args!("br label %{}", done_label))?;

        self.open_label(&done_label)?;
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = load %struct.{}, ptr {}",
            reg, mangled, addr
        ))?;
        Ok(EmitValue::new(
            reg,
            LlvmType::Struct(mangled),
            SemType::named("Maybe", vec![SemType::prim(kind)]),
        ))
    }

    /// Wrap an already-computed value into `Maybe[T]` based on a condition
    /// register: true selects `Nothing`, false stores `Just(payload)`.
    fn build_maybe(
        &mut self,
        kind: PrimKind,
        overflow: &str,
        payload: &EmitValue,
    ) -> Result<EmitValue, CodegenError> {
        let mangled = self.register_enum("Maybe", &[SemType::prim(kind)])?;
        let layout = self.enum_layout(&mangled)?.clone();
        let just_tag = layout.variant("Just").map_or(0, |v| v.tag);
        let nothing_tag = layout.variant("Nothing").map_or(1, |v| v.tag);

        let addr = self.fresh_reg();
        self.ins(format_args!("{} = alloca %struct.{}", addr, mangled))?;
        let tag_addr = self.fresh_reg();
        self.ins(format_args!(
            "{} = getelementptr %struct.{}, ptr {}, i32 0, i32 0",
            tag_addr, mangled, addr
        ))?;

        let just_label = self.fresh_label("checked_just");
        let nothing_label = self.fresh_label("checked_nothing");
        let done_label = self.fresh_label("checked_done");
        self.term(format_args!(
            "br i1 {}, label %{}, label %{}",
            overflow, nothing_label, just_label
        ))?;

        self.open_label(&just_label)?;
        self.ins(format_args!("store i32 {}, ptr {}", just_tag, tag_addr))?;
        self.store_maybe_payload(&mangled, &layout.payload, &addr, payload)?;
        self.term(format_args!("br label %{}", done_label))?;

        self.open_label(&nothing_label)?;
        self.ins(format_args!(
            "store i32 {}, ptr {}",
            nothing_tag, tag_addr
        ))?;
        self.term(format_args!("br label %{}", done_label))?;

        self.open_label(&done_label)?;
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = load %struct.{}, ptr {}",
            reg, mangled, addr
        ))?;
        Ok(EmitValue::new(
            reg,
            LlvmType::Struct(mangled),
            SemType::named("Maybe", vec![SemType::prim(kind)]),
        ))
    }

    /// Store the `Just` payload according to the recorded layout.
    fn store_maybe_payload(
        &mut self,
        mangled: &str,
        payload: &PayloadLayout,
        addr: &str,
        value: &EmitValue,
    ) -> Result<(), CodegenError> {
        let payload_addr = self.fresh_reg();
        self.ins(format_args!(
            "{} = getelementptr %struct.{}, ptr {}, i32 0, i32 1",
            payload_addr, mangled, addr
        ))?;
        match payload {
            PayloadLayout::Compact(slot_ty) => {
                let slot_ty = slot_ty.clone();
                let stored = self.coerce_to(value, &slot_ty)?;
                self.ins(format_args!(
                    "store {} {}, ptr {}",
                    slot_ty, stored, payload_addr
                ))?;
                Ok(())
            }
            PayloadLayout::Legacy(_) => {
                let field_ty = value.ty.clone();
                self.store_legacy_field(value, &field_ty, &payload_addr)
            }
            PayloadLayout::None => Err(CodegenError::PayloadLayoutMismatch {
                name: mangled.to_string(),
                recorded: "no payload".to_string(),
                found: "checked arithmetic payload".to_string(),
            }),
        }
    }

    // ---- saturating ------------------------------------------------------

    pub(super) fn intrinsic_saturating(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let b = Self::arg_or_zero(&vals, 1);
        let kind = self.checked_kind(call, &vals);
        let bits = kind.bit_width().unwrap_or(32);
        let signed = if kind.is_unsigned() { "u" } else { "s" };
        let op = if call.callee == "saturating_add" {
            "add"
        } else {
            "sub"
        };
        let int_ty = LlvmType::Int { bits };
        let lhs = self.coerce_to(&a, &int_ty)?;
        let rhs = self.coerce_to(&b, &int_ty)?;
        self.ensure_declared(&format!(
            "declare i{bits} @llvm.{signed}{op}.sat.i{bits}(i{bits}, i{bits})"
        ))?;
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = call i{bits} @llvm.{signed}{op}.sat.i{bits}(i{bits} {}, i{bits} {})",
            reg, lhs, rhs
        ))?;
        Ok(EmitValue::new(reg, int_ty, SemType::prim(kind)))
    }

    pub(super) fn intrinsic_saturating_mul(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let a = Self::arg_or_zero(&vals, 0);
        let b = Self::arg_or_zero(&vals, 1);
        let kind = self.checked_kind(call, &vals);
        let bits = kind.bit_width().unwrap_or(32);
        let unsigned = kind.is_unsigned();
        let signed = if unsigned { "u" } else { "s" };
        let int_ty = LlvmType::Int { bits };
        let lhs = self.coerce_to(&a, &int_ty)?;
        let rhs = self.coerce_to(&b, &int_ty)?;

        self.ensure_declared(&format!(
            "declare {{ i{bits}, i1 }} @llvm.{signed}mul.with.overflow.i{bits}(i{bits}, i{bits})"
        ))?;
        let pair = self.fresh_reg();
        self.ins(format_args!(
            "{} = call {{ i{bits}, i1 }} @llvm.{signed}mul.with.overflow.i{bits}(i{bits} {}, i{bits} {})",
            pair, lhs, rhs
        ))?;
        let product = self.fresh_reg();
        self.ins(format_args!(
            "{} = extractvalue {{ i{bits}, i1 }} {}, 0",
            product, pair
        ))?;
        let overflow = self.fresh_reg();
        self.ins(format_args!(
            "{} = extractvalue {{ i{bits}, i1 }} {}, 1",
            overflow, pair
        ))?;

        let (min, max) = int_min_max(bits, unsigned);
        let saturated = if unsigned {
            max
        } else {
            // The sign of the true product decides the clamp direction:
            // mixed signs saturate to MIN, matching signs to MAX.
            let sign_mix = self.fresh_reg();
            self.ins(format_args!(
                "{} = xor i{bits} {}, {}",
                sign_mix, lhs, rhs
            ))?;
            let is_negative = self.fresh_reg();
            self.ins(format_args!(
                "{} = icmp slt i{bits} {}, 0",
                is_negative, sign_mix
            ))?;
            let sat = self.fresh_reg();
            self.ins(format_args!(
                "{} = select i1 {}, i{bits} {}, i{bits} {}",
                sat, is_negative, min, max
            ))?;
            sat
        };
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = select i1 {}, i{bits} {}, i{bits} {}",
            reg, overflow, saturated, product
        ))?;
        Ok(EmitValue::new(reg, int_ty, SemType::prim(kind)))
    }
}
