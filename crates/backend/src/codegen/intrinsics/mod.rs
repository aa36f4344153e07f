//! Compiler intrinsics
//!
//! Intrinsic names expand to minimal inline LLVM instruction sequences
//! rather than calls. `try_intrinsic` recognizes the name and routes to the
//! category modules; an unrecognized name returns `None` and the caller
//! moves on to the builtin dispatchers.
//!
//! - `ops`: arithmetic, comparison, bitwise, bit counting, float math,
//!   compiler hints
//! - `memory`: raw pointer access, bulk copies, slice/array addressing, SIMD
//! - `checked`: checked arithmetic into `Maybe[T]`, saturating arithmetic
//! - `reflect`: `size_of`/`align_of`/`type_id`/`type_name`, struct/enum
//!   reflection, `drop`

mod checked;
mod memory;
mod ops;
mod reflect;

use super::state::{EmitValue, Emitter};
use crate::ast::CallExpr;
use crate::error::CodegenError;
use crate::types::SemType;

impl Emitter<'_> {
    /// Dispatch a call to its intrinsic lowering, if the callee names one.
    pub(super) fn try_intrinsic(
        &mut self,
        call: &CallExpr,
    ) -> Result<Option<EmitValue>, CodegenError> {
        let value = match call.callee.as_str() {
            // Arithmetic
            "llvm_add" | "llvm_sub" | "llvm_mul" | "llvm_div" | "llvm_rem" => {
                self.intrinsic_arith(call)?
            }
            "llvm_neg" => self.intrinsic_neg(call)?,
            // Comparison
            "llvm_eq" | "llvm_ne" | "llvm_lt" | "llvm_le" | "llvm_gt" | "llvm_ge" => {
                self.intrinsic_compare(call)?
            }
            // Bitwise
            "llvm_and" | "llvm_or" | "llvm_xor" | "llvm_shl" | "llvm_shr" => {
                self.intrinsic_bitwise(call)?
            }
            "llvm_not" => self.intrinsic_bitnot(call)?,
            // Memory
            "ptr_read" => self.intrinsic_ptr_read(call)?,
            "ptr_write" => self.intrinsic_ptr_write(call)?,
            "ptr_offset" => self.intrinsic_ptr_offset(call)?,
            "copy_nonoverlapping" => self.intrinsic_bulk_copy(call, "memcpy")?,
            "copy" => self.intrinsic_bulk_copy(call, "memmove")?,
            "write_bytes" => self.intrinsic_write_bytes(call)?,
            // Slice / array
            "slice_get" => self.intrinsic_slice_get(call)?,
            "slice_get_mut" => self.intrinsic_slice_addr(call)?,
            "slice_set" => self.intrinsic_slice_set(call)?,
            "slice_swap" => self.intrinsic_slice_swap(call)?,
            "slice_offset" | "array_offset_ptr" => self.intrinsic_slice_addr(call)?,
            "array_as_ptr" => self.intrinsic_array_as_ptr(call)?,
            // Type info
            "size_of" => self.intrinsic_size_of(call)?,
            "align_of" => self.intrinsic_align_of(call)?,
            "type_id" => self.intrinsic_type_id(call)?,
            "type_name" => self.intrinsic_type_name(call)?,
            // Compiler hints
            "unreachable" => self.intrinsic_unreachable()?,
            "assume" => self.intrinsic_assume(call)?,
            "likely" => self.intrinsic_expect(call, true)?,
            "unlikely" => self.intrinsic_expect(call, false)?,
            "fence" => self.intrinsic_fence(false)?,
            "compiler_fence" => self.intrinsic_fence(true)?,
            // Bit manipulation
            "ctlz" | "cttz" => self.intrinsic_count_zeros(call)?,
            "ctpop" | "bswap" | "bitreverse" => self.intrinsic_bit_unary(call)?,
            // Float math
            "sqrt" | "sin" | "cos" | "log" | "exp" | "floor" | "ceil" | "round" | "trunc"
            | "fabs" => self.intrinsic_float_unary(call)?,
            "pow" | "copysign" | "minnum" | "maxnum" => self.intrinsic_float_binary(call)?,
            "fma" => self.intrinsic_fma(call)?,
            // Checked / saturating arithmetic
            "checked_add" | "checked_sub" | "checked_mul" => self.intrinsic_checked(call)?,
            "checked_div" => self.intrinsic_checked_div(call)?,
            "saturating_add" | "saturating_sub" => self.intrinsic_saturating(call)?,
            "saturating_mul" => self.intrinsic_saturating_mul(call)?,
            // Reflection
            "field_count" => self.intrinsic_field_count(call)?,
            "variant_count" => self.intrinsic_variant_count(call)?,
            "field_name" => self.intrinsic_field_name(call)?,
            "field_type_id" => self.intrinsic_field_type_id(call)?,
            "field_offset" => self.intrinsic_field_offset(call)?,
            // SIMD
            "simd_load" => self.intrinsic_simd_load(call)?,
            "simd_store" => self.intrinsic_simd_store(call)?,
            "simd_extract" => self.intrinsic_simd_extract(call)?,
            "simd_insert" => self.intrinsic_simd_insert(call)?,
            "simd_splat" => self.intrinsic_simd_splat(call)?,
            // Drop
            "drop" => self.intrinsic_drop(call)?,
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Resolved type argument `[T]` at position `idx`, if spelled.
    pub(super) fn type_arg(&self, call: &CallExpr, idx: usize) -> Option<SemType> {
        call.type_args.get(idx).map(|t| t.substitute(&self.subst))
    }

    /// Evaluate all argument expressions, left to right.
    pub(super) fn emit_args(&mut self, call: &CallExpr) -> Result<Vec<EmitValue>, CodegenError> {
        call.args.iter().map(|a| self.emit_expr(a)).collect()
    }

    /// Missing-argument sentinel: arity validation belongs to the checker,
    /// so the emitter degrades to a literal zero.
    pub(super) fn arg_or_zero(vals: &[EmitValue], idx: usize) -> EmitValue {
        vals.get(idx).cloned().unwrap_or_else(|| {
            EmitValue::new(
                "0",
                super::llvm_ty::LlvmType::i32(),
                SemType::prim(crate::types::PrimKind::I32),
            )
        })
    }
}
