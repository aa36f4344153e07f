//! Tagged enum construction and destructuring
//!
//! Layout is fixed per enum at first instantiation (see `instantiate.rs`):
//! the tag is an `i32` at offset 0; the payload slot at offset 1 is either
//! the single known payload type (compact) or an `[N x i64]` blob sized to
//! the largest variant (legacy). Every constructor and every `when` arm
//! consults that recorded layout; the two must agree by construction.
//!
//! Construction: alloca, store tag, store payload, load the aggregate back.
//! Destructuring: spill the aggregate, load the tag, cascade per arm,
//! extract payloads with `getelementptr` + `load`, merge with a phi.

use super::llvm_ty::LlvmType;
use super::state::{EmitValue, Emitter, LocalSlot, PayloadLayout, VariantLayout};
use crate::ast::{Expr, Pattern, WhenArm};
use crate::error::CodegenError;
use crate::types::{PrimKind, SemType};

impl Emitter<'_> {
    /// Build a variant value: `Maybe::Just(5)`, bare `Nothing`, etc.
    pub(super) fn emit_variant_ctor(
        &mut self,
        enum_name: &str,
        type_args: &[SemType],
        variant: &str,
        args: &[Expr],
    ) -> Result<EmitValue, CodegenError> {
        let mangled = self.register_enum(enum_name, type_args)?;
        let layout = self.enum_layout(&mangled)?.clone();
        let var_layout = layout.variant(variant).cloned().ok_or_else(|| {
            CodegenError::inconsistency(format!(
                "enum `{}` has no variant `{}`",
                mangled, variant
            ))
        })?;

        let addr = self.fresh_reg();
        self.ins(format_args!("{} = alloca %struct.{}", addr, mangled))?;
        let tag_addr = self.fresh_reg();
        self.ins(format_args!(
            "{} = getelementptr %struct.{}, ptr {}, i32 0, i32 0",
            tag_addr, mangled, addr
        ))?;
        self.ins(format_args!(
            "store i32 {}, ptr {}",
            var_layout.tag, tag_addr
        ))?;

        if !var_layout.payload.is_empty() {
            let payload_addr = self.fresh_reg();
            self.ins(format_args!(
                "{} = getelementptr %struct.{}, ptr {}, i32 0, i32 1",
                payload_addr, mangled, addr
            ))?;
            match &layout.payload {
                PayloadLayout::None => {
                    return Err(CodegenError::PayloadLayoutMismatch {
                        name: mangled,
                        recorded: "no payload".to_string(),
                        found: format!("variant `{}` carries data", variant),
                    });
                }
                PayloadLayout::Compact(slot_ty) => {
                    let slot_ty = slot_ty.clone();
                    let val = match args.first() {
                        Some(arg) => self.emit_expr(arg)?,
                        None => EmitValue::unit(),
                    };
                    let stored = self.coerce_to(&val, &slot_ty)?;
                    self.ins(format_args!(
                        "store {} {}, ptr {}",
                        slot_ty, stored, payload_addr
                    ))?;
                }
                PayloadLayout::Legacy(_) => {
                    let payload = var_layout.payload.clone();
                    let mut slot_index = 0u64;
                    for ((field_ty, _), arg) in payload.iter().zip(args) {
                        let val = self.emit_expr(arg)?;
                        let slot = self.fresh_reg();
                        self.ins(format_args!(
                            "{} = getelementptr i64, ptr {}, i64 {}",
                            slot, payload_addr, slot_index
                        ))?;
                        self.store_legacy_field(&val, field_ty, &slot)?;
                        slot_index += field_ty.store_size().div_ceil(8).max(1);
                    }
                }
            }
        }

        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = load %struct.{}, ptr {}",
            reg, mangled, addr
        ))?;
        Ok(EmitValue::new(
            reg,
            LlvmType::Struct(mangled),
            SemType::Named {
                name: enum_name.to_string(),
                module: None,
                args: type_args.to_vec(),
            },
        ))
    }

    /// Store one payload field into a legacy `[N x i64]` slot. Narrow
    /// integers extend to the slot width; everything else stores through
    /// the slot pointer at the blob's alignment.
    pub(super) fn store_legacy_field(
        &mut self,
        val: &EmitValue,
        field_ty: &LlvmType,
        slot: &str,
    ) -> Result<(), CodegenError> {
        match field_ty {
            LlvmType::Int { bits } if *bits <= 64 => {
                let widened = self.coerce_to(val, &LlvmType::i64())?;
                self.ins(format_args!("store i64 {}, ptr {}", widened, slot))?;
            }
            other => {
                let other = other.clone();
                let stored = self.coerce_to(val, &other)?;
                self.ins(format_args!(
                    "store {} {}, ptr {}, align 8",
                    other, stored, slot
                ))?;
            }
        }
        Ok(())
    }

    /// Load one payload field back out of a legacy slot.
    pub(super) fn load_legacy_field(
        &mut self,
        field_ty: &LlvmType,
        slot: &str,
    ) -> Result<String, CodegenError> {
        match field_ty {
            LlvmType::Int { bits } if *bits < 64 => {
                let wide = self.fresh_reg();
                self.ins(format_args!("{} = load i64, ptr {}", wide, slot))?;
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = trunc i64 {} to i{}",
                    reg, wide, bits
                ))?;
                Ok(reg)
            }
            other => {
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = load {}, ptr {}, align 8",
                    reg, other, slot
                ))?;
                Ok(reg)
            }
        }
    }

    // ---- destructuring ---------------------------------------------------

    /// Lower a `when` expression: read the tag, branch per arm, bind
    /// payloads, merge results.
    pub(super) fn emit_when(
        &mut self,
        scrutinee: &Expr,
        arms: &[WhenArm],
    ) -> Result<EmitValue, CodegenError> {
        let value = self.emit_expr(scrutinee)?;
        let LlvmType::Struct(mangled) = value.ty.clone() else {
            return Err(CodegenError::inconsistency(format!(
                "`when` scrutinee is not an enum value (got {})",
                value.ty
            )));
        };
        let layout = self.enum_layout(&mangled)?.clone();

        let addr = self.spill_to_alloca(&value)?;
        let tag_addr = self.fresh_reg();
        self.ins(format_args!(
            "{} = getelementptr %struct.{}, ptr {}, i32 0, i32 0",
            tag_addr, mangled, addr
        ))?;
        let tag = self.fresh_reg();
        self.ins(format_args!("{} = load i32, ptr {}", tag, tag_addr))?;

        let merge_label = self.fresh_label("when_merge");
        let default_label = self.fresh_label("when_default");

        // Assign a block per arm, then emit the cascade of tag checks.
        let arm_labels: Vec<String> = (0..arms.len())
            .map(|i| self.fresh_label(&format!("when_arm{}_", i)))
            .collect();
        let wildcard_idx = arms
            .iter()
            .position(|arm| matches!(arm.pattern, Pattern::Wildcard));

        for (i, arm) in arms.iter().enumerate() {
            match arm.pattern.variant_name() {
                // Wildcard catches everything not yet matched.
                None => {
                    self.term(format_args!("br label %{}", arm_labels[i]))?;
                    break;
                }
                Some(variant_name) => {
                    let var_layout = layout.variant(variant_name).cloned().ok_or_else(|| {
                        CodegenError::inconsistency(format!(
                            "`when` arm names `{}`, not a variant of `{}`",
                            variant_name, mangled
                        ))
                    })?;
                    let next = if i + 1 < arms.len() {
                        self.fresh_label(&format!("when_check{}_", i + 1))
                    } else {
                        default_label.clone()
                    };
                    let cmp = self.fresh_reg();
                    self.ins(format_args!(
                        "{} = icmp eq i32 {}, {}",
                        cmp, tag, var_layout.tag
                    ))?;
                    self.term(format_args!(
                        "br i1 {}, label %{}, label %{}",
                        cmp, arm_labels[i], next
                    ))?;
                    if i + 1 < arms.len() {
                        self.open_label(&next)?;
                    }
                }
            }
        }

        // Default: the wildcard arm if present, otherwise unreachable (the
        // type checker guarantees exhaustiveness).
        self.open_label(&default_label)?;
        match wildcard_idx {
            Some(i) => self.term(format_args!("br label %{}", arm_labels[i]))?,
            None => self.term(format_args!("unreachable"))?,
        }

        let mut results: Vec<(EmitValue, String, bool)> = Vec::with_capacity(arms.len());
        for (i, arm) in arms.iter().enumerate() {
            self.open_label(&arm_labels[i])?;
            self.push_scope();
            if let Pattern::Variant {
                variant, bindings, ..
            } = &arm.pattern
            {
                let var_layout = layout
                    .variant(variant)
                    .cloned()
                    .ok_or_else(|| {
                        CodegenError::inconsistency(format!(
                            "variant `{}` missing from layout `{}`",
                            variant, mangled
                        ))
                    })?;
                self.bind_payload(&mangled, &layout.payload, &var_layout, bindings, &addr)?;
            }
            let body_scope_val = self.emit_block(&arm.body)?;
            let scope = self.pop_scope();
            self.emit_scope_drops(&scope)?;
            let pred = self.current_label.clone();
            let terminated = self.block_terminated;
            self.term(format_args!("br label %{}", merge_label))?;
            results.push((body_scope_val, pred, terminated));
        }

        self.open_label(&merge_label)?;
        let live: Vec<&(EmitValue, String, bool)> =
            results.iter().filter(|(_, _, t)| !t).collect();
        let mergeable = !live.is_empty()
            && live[0].0.ty != LlvmType::Void
            && live.iter().all(|(v, _, _)| v.ty == live[0].0.ty);
        if mergeable {
            let entries: Vec<String> = live
                .iter()
                .map(|(v, pred, _)| format!("[ {}, %{} ]", v.repr, pred))
                .collect();
            let reg = self.fresh_reg();
            let ty = live[0].0.ty.clone();
            self.ins(format_args!(
                "{} = phi {} {}",
                reg,
                ty,
                entries.join(", ")
            ))?;
            return Ok(EmitValue::new(reg, ty, live[0].0.sem.clone()));
        }
        Ok(EmitValue::unit())
    }

    /// Bind a pattern's payload names as locals, extracting from the
    /// recorded layout at `addr`.
    fn bind_payload(
        &mut self,
        mangled: &str,
        payload: &PayloadLayout,
        var_layout: &VariantLayout,
        bindings: &[String],
        addr: &str,
    ) -> Result<(), CodegenError> {
        if bindings.is_empty() {
            return Ok(());
        }
        let payload_addr = self.fresh_reg();
        self.ins(format_args!(
            "{} = getelementptr %struct.{}, ptr {}, i32 0, i32 1",
            payload_addr, mangled, addr
        ))?;
        match payload {
            PayloadLayout::None => {
                return Err(CodegenError::PayloadLayoutMismatch {
                    name: mangled.to_string(),
                    recorded: "no payload".to_string(),
                    found: format!("pattern binds {} name(s)", bindings.len()),
                });
            }
            PayloadLayout::Compact(slot_ty) => {
                let (field_ty, field_sem) = var_layout
                    .payload
                    .first()
                    .cloned()
                    .unwrap_or((slot_ty.clone(), SemType::prim(PrimKind::I64)));
                let loaded = self.fresh_reg();
                self.ins(format_args!(
                    "{} = load {}, ptr {}",
                    loaded, field_ty, payload_addr
                ))?;
                let val = EmitValue::new(loaded, field_ty, field_sem);
                let slot_addr = self.spill_to_alloca(&val)?;
                self.declare_local(
                    &bindings[0],
                    LocalSlot {
                        addr: slot_addr,
                        ty: val.ty,
                        sem: val.sem,
                        mutable: false,
                        consumed: false,
                    },
                );
            }
            PayloadLayout::Legacy(_) => {
                let mut slot_index = 0u64;
                for ((field_ty, field_sem), name) in var_layout.payload.iter().zip(bindings) {
                    let slot = self.fresh_reg();
                    self.ins(format_args!(
                        "{} = getelementptr i64, ptr {}, i64 {}",
                        slot, payload_addr, slot_index
                    ))?;
                    let loaded = self.load_legacy_field(field_ty, &slot)?;
                    let val = EmitValue::new(loaded, field_ty.clone(), field_sem.clone());
                    let slot_addr = self.spill_to_alloca(&val)?;
                    self.declare_local(
                        name,
                        LocalSlot {
                            addr: slot_addr,
                            ty: val.ty,
                            sem: val.sem,
                            mutable: false,
                            consumed: false,
                        },
                    );
                    slot_index += field_ty.store_size().div_ceil(8).max(1);
                }
            }
        }
        Ok(())
    }

    /// Extract the `Ready` payload out of a `Poll[T]` value. `block_on`
    /// expects the async function to have returned `Poll::Ready(x)`
    /// immediately; this is the whole of its lowering.
    pub(super) fn emit_poll_extract(
        &mut self,
        poll: &EmitValue,
    ) -> Result<EmitValue, CodegenError> {
        let LlvmType::Struct(mangled) = poll.ty.clone() else {
            return Err(CodegenError::inconsistency(
                "block_on argument did not lower to a Poll value",
            ));
        };
        let layout = self.enum_layout(&mangled)?.clone();
        let ready = layout.variant("Ready").cloned().ok_or_else(|| {
            CodegenError::inconsistency(format!("`{}` has no `Ready` variant", mangled))
        })?;
        let Some((field_ty, field_sem)) = ready.payload.first().cloned() else {
            return Ok(EmitValue::unit());
        };

        let addr = self.spill_to_alloca(poll)?;
        let payload_addr = self.fresh_reg();
        self.ins(format_args!(
            "{} = getelementptr %struct.{}, ptr {}, i32 0, i32 1",
            payload_addr, mangled, addr
        ))?;
        let repr = match &layout.payload {
            PayloadLayout::Compact(_) => {
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = load {}, ptr {}",
                    reg, field_ty, payload_addr
                ))?;
                reg
            }
            PayloadLayout::Legacy(_) => self.load_legacy_field(&field_ty, &payload_addr)?,
            PayloadLayout::None => {
                return Ok(EmitValue::unit());
            }
        };
        Ok(EmitValue::new(repr, field_ty, field_sem))
    }
}
