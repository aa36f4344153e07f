//! Memory, slice, and SIMD intrinsics
//!
//! Raw pointer reads and writes go through `load`/`store`; addresses
//! carried as `i64` pass through `inttoptr` first (the coercion layer
//! handles that). Bulk operations lower to the `@llvm.memcpy`/`memmove`/
//! `memset` intrinsics with byte lengths computed from the element type.
//! Slices are data pointers; element addressing is a `getelementptr` over
//! the element type. `ptr_offset` over `*Unit` strides as `i32`.

use super::super::llvm_ty::LlvmType;
use super::super::state::{EmitValue, Emitter};
use crate::ast::CallExpr;
use crate::error::CodegenError;
use crate::types::{PrimKind, SemType};

impl Emitter<'_> {
    /// Element type for a pointer intrinsic: explicit `[T]` wins, then the
    /// pointee of the pointer argument, then `I64`.
    fn elem_sem(&self, call: &CallExpr, ptr_arg: &EmitValue) -> SemType {
        if let Some(t) = self.type_arg(call, 0) {
            return t;
        }
        match &ptr_arg.sem {
            SemType::Ptr { inner, .. } | SemType::Ref { inner, .. } => (**inner).clone(),
            SemType::Array { elem, .. } => (**elem).clone(),
            _ => SemType::prim(PrimKind::I64),
        }
    }

    /// GEP stride type for an element. `Unit` strides as `i32` (a `*Unit`
    /// is treated as I32-sized).
    fn stride_type(&mut self, elem: &SemType) -> Result<LlvmType, CodegenError> {
        let lowered = self.lower_type(elem)?;
        Ok(match lowered {
            LlvmType::Void | LlvmType::ZeroSized => LlvmType::i32(),
            other => other,
        })
    }

    pub(super) fn intrinsic_ptr_read(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let ptr_arg = Self::arg_or_zero(&vals, 0);
        let elem = self.elem_sem(call, &ptr_arg);
        let elem_ty = self.lower_type(&elem)?;
        let addr = self.coerce_to(&ptr_arg, &LlvmType::Ptr)?;
        if elem_ty == LlvmType::Void {
            return Ok(EmitValue::unit());
        }
        let reg = self.fresh_reg();
        self.ins(format_args!("{} = load {}, ptr {}", reg, elem_ty, addr))?;
        Ok(EmitValue::new(reg, elem_ty, elem))
    }

    pub(super) fn intrinsic_ptr_write(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let ptr_arg = Self::arg_or_zero(&vals, 0);
        let value = Self::arg_or_zero(&vals, 1);
        let addr = self.coerce_to(&ptr_arg, &LlvmType::Ptr)?;
        self.ins(format_args!(
            "store {} {}, ptr {}",
            value.ty, value.repr, addr
        ))?;
        Ok(EmitValue::unit())
    }

    pub(super) fn intrinsic_ptr_offset(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let ptr_arg = Self::arg_or_zero(&vals, 0);
        let offset = Self::arg_or_zero(&vals, 1);
        let elem = self.elem_sem(call, &ptr_arg);
        let stride = self.stride_type(&elem)?;
        let addr = self.coerce_to(&ptr_arg, &LlvmType::Ptr)?;
        let off = self.coerce_to(&offset, &LlvmType::i64())?;
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = getelementptr {}, ptr {}, i64 {}",
            reg, stride, addr, off
        ))?;
        Ok(EmitValue::new(reg, LlvmType::Ptr, ptr_arg.sem))
    }

    /// `copy_nonoverlapping` -> memcpy, `copy` -> memmove. Arguments are
    /// `(src, dst, count)`; the byte length is `count * size_of::<T>()`.
    pub(super) fn intrinsic_bulk_copy(
        &mut self,
        call: &CallExpr,
        which: &str,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let src = Self::arg_or_zero(&vals, 0);
        let dst = Self::arg_or_zero(&vals, 1);
        let count = Self::arg_or_zero(&vals, 2);
        let elem = self.elem_sem(call, &src);
        let len = self.emit_byte_length(&elem, &count)?;
        let src_ptr = self.coerce_to(&src, &LlvmType::Ptr)?;
        let dst_ptr = self.coerce_to(&dst, &LlvmType::Ptr)?;
        self.ensure_declared(&format!(
            "declare void @llvm.{}.p0.p0.i64(ptr, ptr, i64, i1)",
            which
        ))?;
        self.ins(format_args!(
            "call void @llvm.{}.p0.p0.i64(ptr {}, ptr {}, i64 {}, i1 false)",
            which, dst_ptr, src_ptr, len
        ))?;
        Ok(EmitValue::unit())
    }

    pub(super) fn intrinsic_write_bytes(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let dst = Self::arg_or_zero(&vals, 0);
        let byte = Self::arg_or_zero(&vals, 1);
        let count = Self::arg_or_zero(&vals, 2);
        let elem = self.elem_sem(call, &dst);
        let len = self.emit_byte_length(&elem, &count)?;
        let dst_ptr = self.coerce_to(&dst, &LlvmType::Ptr)?;
        let byte_val = self.coerce_to(&byte, &LlvmType::i8())?;
        self.ensure_declared("declare void @llvm.memset.p0.i64(ptr, i8, i64, i1)")?;
        self.ins(format_args!(
            "call void @llvm.memset.p0.i64(ptr {}, i8 {}, i64 {}, i1 false)",
            dst_ptr, byte_val, len
        ))?;
        Ok(EmitValue::unit())
    }

    /// `count * size_of::<T>()`, folded when the element size is known at
    /// compile time.
    fn emit_byte_length(
        &mut self,
        elem: &SemType,
        count: &EmitValue,
    ) -> Result<String, CodegenError> {
        let count_repr = self.coerce_to(count, &LlvmType::i64())?;
        let size = self.emit_size_of_sem(elem)?;
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = mul i64 {}, {}",
            reg, count_repr, size.repr
        ))?;
        Ok(reg)
    }

    // ---- slices ----------------------------------------------------------

    fn slice_elem_addr(
        &mut self,
        call: &CallExpr,
        slice: &EmitValue,
        index: &EmitValue,
    ) -> Result<(String, LlvmType, SemType), CodegenError> {
        let elem = self.elem_sem(call, slice);
        let elem_ty = self.stride_type(&elem)?;
        let base = self.coerce_to(slice, &LlvmType::Ptr)?;
        let idx = self.coerce_to(index, &LlvmType::i64())?;
        let addr = self.fresh_reg();
        self.ins(format_args!(
            "{} = getelementptr {}, ptr {}, i64 {}",
            addr, elem_ty, base, idx
        ))?;
        Ok((addr, elem_ty, elem))
    }

    pub(super) fn intrinsic_slice_get(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let slice = Self::arg_or_zero(&vals, 0);
        let index = Self::arg_or_zero(&vals, 1);
        let (addr, elem_ty, elem_sem) = self.slice_elem_addr(call, &slice, &index)?;
        let reg = self.fresh_reg();
        self.ins(format_args!("{} = load {}, ptr {}", reg, elem_ty, addr))?;
        Ok(EmitValue::new(reg, elem_ty, elem_sem))
    }

    /// `slice_get_mut` / `slice_offset` / `array_offset_ptr`: the element
    /// address itself.
    pub(super) fn intrinsic_slice_addr(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let slice = Self::arg_or_zero(&vals, 0);
        let index = Self::arg_or_zero(&vals, 1);
        let (addr, _, elem_sem) = self.slice_elem_addr(call, &slice, &index)?;
        Ok(EmitValue::new(
            addr,
            LlvmType::Ptr,
            SemType::Ptr {
                inner: Box::new(elem_sem),
                mutable: true,
            },
        ))
    }

    pub(super) fn intrinsic_slice_set(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let slice = Self::arg_or_zero(&vals, 0);
        let index = Self::arg_or_zero(&vals, 1);
        let value = Self::arg_or_zero(&vals, 2);
        let (addr, elem_ty, _) = self.slice_elem_addr(call, &slice, &index)?;
        let stored = self.coerce_to(&value, &elem_ty)?;
        self.ins(format_args!(
            "store {} {}, ptr {}",
            elem_ty, stored, addr
        ))?;
        Ok(EmitValue::unit())
    }

    pub(super) fn intrinsic_slice_swap(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let slice = Self::arg_or_zero(&vals, 0);
        let i = Self::arg_or_zero(&vals, 1);
        let j = Self::arg_or_zero(&vals, 2);
        let (addr_a, elem_ty, _) = self.slice_elem_addr(call, &slice, &i)?;
        let (addr_b, _, _) = self.slice_elem_addr(call, &slice, &j)?;
        let val_a = self.fresh_reg();
        self.ins(format_args!("{} = load {}, ptr {}", val_a, elem_ty, addr_a))?;
        let val_b = self.fresh_reg();
        self.ins(format_args!("{} = load {}, ptr {}", val_b, elem_ty, addr_b))?;
        self.ins(format_args!(
            "store {} {}, ptr {}",
            elem_ty, val_b, addr_a
        ))?;
        self.ins(format_args!(
            "store {} {}, ptr {}",
            elem_ty, val_a, addr_b
        ))?;
        Ok(EmitValue::unit())
    }

    pub(super) fn intrinsic_array_as_ptr(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let arr = Self::arg_or_zero(&vals, 0);
        let repr = self.coerce_to(&arr, &LlvmType::Ptr)?;
        let elem = self.elem_sem(call, &arr);
        Ok(EmitValue::new(
            repr,
            LlvmType::Ptr,
            SemType::Ptr {
                inner: Box::new(elem),
                mutable: false,
            },
        ))
    }

    // ---- SIMD ------------------------------------------------------------

    /// Vector type for a SIMD intrinsic: `[T]` is the element, the lane
    /// count comes from the second type argument's array length when given
    /// (`[T; N]`), defaulting to 4 lanes.
    fn vector_type(&mut self, call: &CallExpr) -> Result<(LlvmType, SemType), CodegenError> {
        let elem_sem = self
            .type_arg(call, 0)
            .unwrap_or(SemType::prim(PrimKind::F32));
        let lanes = match self.type_arg(call, 1) {
            Some(SemType::Array { len, .. }) => len as u32,
            Some(SemType::Prim(kind)) => kind.bit_width().unwrap_or(4 * 32) / 32,
            _ => 4,
        };
        let elem_ty = self.lower_type(&elem_sem)?;
        Ok((
            LlvmType::Vector {
                lanes,
                elem: Box::new(elem_ty),
            },
            elem_sem,
        ))
    }

    pub(super) fn intrinsic_simd_load(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let ptr = Self::arg_or_zero(&vals, 0);
        let (vec_ty, elem_sem) = self.vector_type(call)?;
        let addr = self.coerce_to(&ptr, &LlvmType::Ptr)?;
        let reg = self.fresh_reg();
        self.ins(format_args!("{} = load {}, ptr {}", reg, vec_ty, addr))?;
        Ok(EmitValue::new(reg, vec_ty, elem_sem))
    }

    pub(super) fn intrinsic_simd_store(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let ptr = Self::arg_or_zero(&vals, 0);
        let vec = Self::arg_or_zero(&vals, 1);
        let addr = self.coerce_to(&ptr, &LlvmType::Ptr)?;
        self.ins(format_args!(
            "store {} {}, ptr {}",
            vec.ty, vec.repr, addr
        ))?;
        Ok(EmitValue::unit())
    }

    pub(super) fn intrinsic_simd_extract(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let vec = Self::arg_or_zero(&vals, 0);
        let index = Self::arg_or_zero(&vals, 1);
        let elem_ty = match &vec.ty {
            LlvmType::Vector { elem, .. } => (**elem).clone(),
            _ => LlvmType::i32(),
        };
        let idx = self.coerce_to(&index, &LlvmType::i32())?;
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = extractelement {} {}, i32 {}",
            reg, vec.ty, vec.repr, idx
        ))?;
        Ok(EmitValue::new(reg, elem_ty, vec.sem))
    }

    pub(super) fn intrinsic_simd_insert(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let vec = Self::arg_or_zero(&vals, 0);
        let index = Self::arg_or_zero(&vals, 1);
        let value = Self::arg_or_zero(&vals, 2);
        let idx = self.coerce_to(&index, &LlvmType::i32())?;
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = insertelement {} {}, {} {}, i32 {}",
            reg, vec.ty, vec.repr, value.ty, value.repr, idx
        ))?;
        Ok(EmitValue::new(reg, vec.ty.clone(), vec.sem))
    }

    /// Broadcast a scalar: a chain of `insertelement` starting from
    /// `undef`.
    pub(super) fn intrinsic_simd_splat(
        &mut self,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        let vals = self.emit_args(call)?;
        let scalar = Self::arg_or_zero(&vals, 0);
        let (vec_ty, elem_sem) = self.vector_type(call)?;
        let lanes = match &vec_ty {
            LlvmType::Vector { lanes, .. } => *lanes,
            _ => 4,
        };
        let mut current = "undef".to_string();
        for lane in 0..lanes {
            let reg = self.fresh_reg();
            self.ins(format_args!(
                "{} = insertelement {} {}, {} {}, i32 {}",
                reg, vec_ty, current, scalar.ty, scalar.repr, lane
            ))?;
            current = reg;
        }
        Ok(EmitValue::new(current, vec_ty, elem_sem))
    }
}
