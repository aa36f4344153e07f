//! Type information, reflection, and drop
//!
//! Sizes and alignments fold to literals for primitives (`Unit` is 0).
//! Aggregates use the GEP-null trick at runtime: `getelementptr T, ptr
//! null, i32 1` then `ptrtoint` yields the size without a target data
//! layout. `type_id` is the FNV-1a hash of the mangled name, folded at
//! compile time. Reflection reads the field and variant registries
//! populated at instantiation.
//!
//! `drop[T]` consults the environment for a user drop impl; the short
//! library list covers types whose glue lives in library IR. Dropping a
//! variable marks it consumed so scope exit does not drop it again.

use super::super::llvm_ty::LlvmType;
use super::super::mangle::{fnv1a_hash, mangle_type};
use super::super::runtime::LIBRARY_DROP_TYPES;
use super::super::state::{EmitValue, Emitter};
use crate::ast::{CallExpr, Expr};
use crate::error::CodegenError;
use crate::types::{PrimKind, SemType};

impl Emitter<'_> {
    /// Size of a semantic type as an i64 value; compile-time when known.
    pub(super) fn emit_size_of_sem(
        &mut self,
        sem: &SemType,
    ) -> Result<EmitValue, CodegenError> {
        if let Some((size, _)) = Self::primitive_size_align(sem) {
            return Ok(EmitValue::new(
                size.to_string(),
                LlvmType::i64(),
                SemType::prim(PrimKind::U64),
            ));
        }
        let lowered = self.lower_type(sem)?;
        match &lowered {
            LlvmType::Struct(name) => {
                let end = self.fresh_reg();
                self.ins(format_args!(
                    "{} = getelementptr %struct.{}, ptr null, i32 1",
                    end, name
                ))?;
                let size = self.fresh_reg();
                self.ins(format_args!(
                    "{} = ptrtoint ptr {} to i64",
                    size, end
                ))?;
                Ok(EmitValue::new(
                    size,
                    LlvmType::i64(),
                    SemType::prim(PrimKind::U64),
                ))
            }
            other => Ok(EmitValue::new(
                other.store_size().to_string(),
                LlvmType::i64(),
                SemType::prim(PrimKind::U64),
            )),
        }
    }

    pub(super) fn intrinsic_size_of(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let sem = self.type_arg(call, 0).unwrap_or(SemType::unit());
        self.emit_size_of_sem(&sem)
    }

    pub(super) fn intrinsic_align_of(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let sem = self.type_arg(call, 0).unwrap_or(SemType::unit());
        if let Some((_, align)) = Self::primitive_size_align(&sem) {
            return Ok(EmitValue::new(
                align.to_string(),
                LlvmType::i64(),
                SemType::prim(PrimKind::U64),
            ));
        }
        let lowered = self.lower_type(&sem)?;
        match &lowered {
            LlvmType::Struct(name) => {
                // Alignment via the padding slot of `{ i8, T }` at null
                let probe = self.fresh_reg();
                self.ins(format_args!(
                    "{} = getelementptr {{ i8, %struct.{} }}, ptr null, i32 0, i32 1",
                    probe, name
                ))?;
                let align = self.fresh_reg();
                self.ins(format_args!(
                    "{} = ptrtoint ptr {} to i64",
                    align, probe
                ))?;
                Ok(EmitValue::new(
                    align,
                    LlvmType::i64(),
                    SemType::prim(PrimKind::U64),
                ))
            }
            other => Ok(EmitValue::new(
                other.store_size().max(1).to_string(),
                LlvmType::i64(),
                SemType::prim(PrimKind::U64),
            )),
        }
    }

    pub(super) fn intrinsic_type_id(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let sem = self.type_arg(call, 0).unwrap_or(SemType::unit());
        let id = fnv1a_hash(&mangle_type(&sem));
        Ok(EmitValue::new(
            (id as i64).to_string(),
            LlvmType::i64(),
            SemType::prim(PrimKind::I64),
        ))
    }

    pub(super) fn intrinsic_type_name(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let sem = self.type_arg(call, 0).unwrap_or(SemType::unit());
        let global = self.string_global(&sem.to_string())?;
        Ok(EmitValue::new(
            global,
            LlvmType::Ptr,
            SemType::prim(PrimKind::Str),
        ))
    }

    // ---- struct/enum reflection ------------------------------------------

    /// A reflected aggregate must be a named type; returns its mangled name
    /// after registration.
    fn reflect_target(&mut self, call: &CallExpr) -> Result<(String, SemType), CodegenError> {
        let sem = self
            .type_arg(call, 0)
            .ok_or_else(|| CodegenError::inconsistency("reflection intrinsic without `[T]`"))?;
        let SemType::Named { name, args, .. } = &sem else {
            return Err(CodegenError::inconsistency(format!(
                "reflection over non-aggregate type `{}`",
                sem
            )));
        };
        let mangled = if self.unit.lookup_enum(name).is_some() || self.is_builtin_enum(name) {
            self.register_enum(name, args)?
        } else {
            self.register_struct(name, args)?
        };
        Ok((mangled, sem.clone()))
    }

    /// A compile-time field index: the argument must be an integer literal.
    fn const_index(call: &CallExpr) -> u64 {
        match call.args.first() {
            Some(Expr::IntLit { value, .. }) => *value as u64,
            _ => 0,
        }
    }

    pub(super) fn intrinsic_field_count(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let (mangled, _) = self.reflect_target(call)?;
        let count = self.struct_fields.get(&mangled).map_or(0, Vec::len);
        Ok(EmitValue::new(
            count.to_string(),
            LlvmType::i64(),
            SemType::prim(PrimKind::U64),
        ))
    }

    pub(super) fn intrinsic_variant_count(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let (mangled, _) = self.reflect_target(call)?;
        let count = self.enum_layout(&mangled)?.variants.len();
        Ok(EmitValue::new(
            count.to_string(),
            LlvmType::i64(),
            SemType::prim(PrimKind::U64),
        ))
    }

    pub(super) fn intrinsic_field_name(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let (mangled, _) = self.reflect_target(call)?;
        let index = Self::const_index(call) as usize;
        let name = self
            .struct_fields
            .get(&mangled)
            .and_then(|fields| fields.get(index))
            .map(|f| f.name.clone())
            .unwrap_or_default();
        let global = self.string_global(&name)?;
        Ok(EmitValue::new(
            global,
            LlvmType::Ptr,
            SemType::prim(PrimKind::Str),
        ))
    }

    pub(super) fn intrinsic_field_type_id(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let (mangled, _) = self.reflect_target(call)?;
        let index = Self::const_index(call) as usize;
        let id = self
            .struct_fields
            .get(&mangled)
            .and_then(|fields| fields.get(index))
            .map(|f| fnv1a_hash(&mangle_type(&f.sem)))
            .unwrap_or(0);
        Ok(EmitValue::new(
            (id as i64).to_string(),
            LlvmType::i64(),
            SemType::prim(PrimKind::I64),
        ))
    }

    pub(super) fn intrinsic_field_offset(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let (mangled, _) = self.reflect_target(call)?;
        let index = Self::const_index(call);
        let probe = self.fresh_reg();
        self.ins(format_args!(
            "{} = getelementptr %struct.{}, ptr null, i32 0, i32 {}",
            probe, mangled, index
        ))?;
        let offset = self.fresh_reg();
        self.ins(format_args!(
            "{} = ptrtoint ptr {} to i64",
            offset, probe
        ))?;
        Ok(EmitValue::new(
            offset,
            LlvmType::i64(),
            SemType::prim(PrimKind::U64),
        ))
    }

    // ---- drop ------------------------------------------------------------

    pub(super) fn intrinsic_drop(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        // Dropping a named variable consumes it, whatever its type.
        let var_name = match call.args.first() {
            Some(Expr::Var(name)) => Some(name.clone()),
            _ => None,
        };

        let vals = self.emit_args(call)?;
        let value = Self::arg_or_zero(&vals, 0);
        let sem = self
            .type_arg(call, 0)
            .unwrap_or_else(|| value.sem.clone());

        if let Some(name) = &var_name {
            self.mark_consumed(name);
        }

        match &sem {
            // Primitives have no drop glue
            SemType::Prim(_) | SemType::Ptr { .. } | SemType::Ref { .. } | SemType::Func { .. } => {
                Ok(EmitValue::unit())
            }
            SemType::Named { name, args, .. } => {
                if self.unit.has_drop_impl(name) {
                    let args = args.clone();
                    if let Some(method) = self.register_impl_method(name, &args, "drop")? {
                        let addr = self.spill_to_alloca(&value)?;
                        self.ins(format_args!(
                            "call void @{}(ptr {})",
                            method.mangled_fn, addr
                        ))?;
                    }
                } else if LIBRARY_DROP_TYPES.contains(&name.as_str()) {
                    let symbol = format!("{}_drop", name);
                    self.ensure_declared(&format!("declare void @{}(ptr)", symbol))?;
                    let addr = self.spill_to_alloca(&value)?;
                    self.ins(format_args!("call void @{}(ptr {})", symbol, addr))?;
                }
                Ok(EmitValue::unit())
            }
            _ => Ok(EmitValue::unit()),
        }
    }
}
