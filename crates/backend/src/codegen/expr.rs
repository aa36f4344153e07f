//! Expression and statement emission
//!
//! Lowers expressions to SSA registers in a left-to-right, outside-in walk.
//! Every helper returns an `EmitValue` carrying the register (or literal),
//! the LLVM type, and the semantic type; `Unit` results use the `"0"`
//! sentinel with a `void` type.
//!
//! Control flow follows the label triad discipline: condition, branch,
//! per-arm blocks, merge with phi when both arms produce a value.

use super::llvm_ty::{FloatKind, LlvmType};
use super::runtime::LIBRARY_DROP_TYPES;
use super::state::{EmitValue, Emitter, LocalSlot};
use crate::ast::{BinOp, Block, Expr, Stmt, UnOp};
use crate::error::CodegenError;
use crate::types::{PrimKind, SemType};

impl Emitter<'_> {
    /// Emit a block: statements in order, then the trailing value (or Unit).
    /// Locals dying here get their drop calls unless consumed.
    pub(super) fn emit_block(&mut self, block: &Block) -> Result<EmitValue, CodegenError> {
        self.push_scope();
        for stmt in &block.stmts {
            self.emit_stmt(stmt)?;
        }
        let value = match &block.value {
            Some(expr) => self.emit_expr(expr)?,
            None => EmitValue::unit(),
        };
        let scope = self.pop_scope();
        self.emit_scope_drops(&scope)?;
        Ok(value)
    }

    pub(super) fn emit_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Let {
                name,
                ty,
                mutable,
                value,
            } => {
                let expected = ty
                    .as_ref()
                    .map(|t| t.substitute(&self.subst))
                    .filter(|t| matches!(t, SemType::Named { .. }));
                let val = self.with_expected_enum(expected, |e| e.emit_expr(value))?;
                let (slot_ty, slot_sem) = match ty {
                    Some(annotated) => {
                        let sem = annotated.substitute(&self.subst);
                        (self.lower_type(&sem)?, sem)
                    }
                    None => (val.ty.clone(), val.sem.clone()),
                };
                if slot_ty == LlvmType::Void {
                    // Unit local: no storage, reads come back as the sentinel
                    self.declare_local(
                        name,
                        LocalSlot {
                            addr: "null".to_string(),
                            ty: LlvmType::Void,
                            sem: SemType::unit(),
                            mutable: *mutable,
                            consumed: true,
                        },
                    );
                    return Ok(());
                }
                let addr = self.fresh_reg();
                self.ins(format_args!("{} = alloca {}", addr, slot_ty))?;
                let stored = self.coerce_to(&val, &slot_ty)?;
                self.ins(format_args!("store {} {}, ptr {}", slot_ty, stored, addr))?;
                self.declare_local(
                    name,
                    LocalSlot {
                        addr,
                        ty: slot_ty,
                        sem: slot_sem,
                        mutable: *mutable,
                        consumed: false,
                    },
                );
            }
            Stmt::Assign { target, value } => {
                let (addr, ty, _) = self.emit_place(target)?;
                let val = self.emit_expr(value)?;
                let stored = self.coerce_to(&val, &ty)?;
                self.ins(format_args!("store {} {}, ptr {}", ty, stored, addr))?;
            }
            Stmt::CompoundAssign { target, op, value } => {
                let (addr, ty, sem) = self.emit_place(target)?;
                let loaded = self.fresh_reg();
                self.ins(format_args!("{} = load {}, ptr {}", loaded, ty, addr))?;
                let current = EmitValue::new(loaded, ty.clone(), sem.clone());
                let rhs = self.emit_expr(value)?;
                let result = self.emit_binary_values(*op, &current, &rhs)?;
                let stored = self.coerce_to(&result, &ty)?;
                self.ins(format_args!("store {} {}, ptr {}", ty, stored, addr))?;
            }
            Stmt::Expr(expr) => {
                self.emit_expr(expr)?;
            }
            Stmt::Return { value } => {
                let val = match value {
                    Some(expr) => self.emit_expr(expr)?,
                    None => EmitValue::unit(),
                };
                self.emit_return(&val)?;
            }
            Stmt::While { cond, body } => {
                let cond_label = self.fresh_label("while_cond");
                let body_label = self.fresh_label("while_body");
                let exit_label = self.fresh_label("while_exit");
                self.open_label(&cond_label)?;
                let cond_val = self.emit_expr(cond)?;
                self.term(format_args!(
                    "br i1 {}, label %{}, label %{}",
                    cond_val.repr, body_label, exit_label
                ))?;
                self.open_label(&body_label)?;
                self.loop_stack
                    .push((cond_label.clone(), exit_label.clone()));
                self.emit_block(body)?;
                self.loop_stack.pop();
                self.term(format_args!("br label %{}", cond_label))?;
                self.open_label(&exit_label)?;
            }
            Stmt::Break => {
                if let Some((_, exit)) = self.loop_stack.last().cloned() {
                    self.term(format_args!("br label %{}", exit))?;
                } else {
                    return Err(CodegenError::inconsistency("`break` outside a loop"));
                }
            }
            Stmt::Continue => {
                if let Some((cond, _)) = self.loop_stack.last().cloned() {
                    self.term(format_args!("br label %{}", cond))?;
                } else {
                    return Err(CodegenError::inconsistency("`continue` outside a loop"));
                }
            }
        }
        Ok(())
    }

    /// Emit `ret`, coercing to the current function's return type.
    pub(super) fn emit_return(&mut self, val: &EmitValue) -> Result<(), CodegenError> {
        if self.current_ret == LlvmType::Void {
            self.term(format_args!("ret void"))?;
        } else {
            let ret_ty = self.current_ret.clone();
            let coerced = self.coerce_to(val, &ret_ty)?;
            self.term(format_args!("ret {} {}", ret_ty, coerced))?;
        }
        Ok(())
    }

    pub(super) fn emit_expr(&mut self, expr: &Expr) -> Result<EmitValue, CodegenError> {
        let value = self.emit_expr_inner(expr)?;
        self.note_expr(&value);
        Ok(value)
    }

    fn emit_expr_inner(&mut self, expr: &Expr) -> Result<EmitValue, CodegenError> {
        match expr {
            Expr::IntLit { value, ty } => {
                let kind = ty.unwrap_or(Self::default_int_kind());
                Ok(EmitValue::new(
                    value.to_string(),
                    super::llvm_ty::lower_prim(kind),
                    SemType::prim(kind),
                ))
            }
            Expr::FloatLit { value, ty } => {
                let kind = ty.unwrap_or(PrimKind::F64);
                Ok(EmitValue::new(
                    Self::format_float(*value),
                    super::llvm_ty::lower_prim(kind),
                    SemType::prim(kind),
                ))
            }
            Expr::BoolLit(b) => Ok(EmitValue::new(
                if *b { "1" } else { "0" },
                LlvmType::i1(),
                SemType::prim(PrimKind::Bool),
            )),
            Expr::StrLit(s) => {
                let global = self.string_global(s)?;
                Ok(EmitValue::new(
                    global,
                    LlvmType::Ptr,
                    SemType::prim(PrimKind::Str),
                ))
            }
            Expr::CharLit(c) => Ok(EmitValue::new(
                (*c as u32).to_string(),
                LlvmType::i32(),
                SemType::prim(PrimKind::Char),
            )),
            Expr::UnitLit => Ok(EmitValue::unit()),
            Expr::Var(name) => self.emit_var(name),
            Expr::Binary { op, lhs, rhs } => self.emit_binary(*op, lhs, rhs),
            Expr::Unary { op, operand } => self.emit_unary(*op, operand),
            Expr::Call(call) => self.emit_call(call),
            Expr::MethodCall {
                receiver,
                method,
                type_args,
                args,
                line,
            } => self.emit_method_call(receiver, method, type_args, args, *line),
            Expr::PathCall {
                type_name,
                type_args,
                method,
                args,
                line,
            } => self.emit_path_call(type_name, type_args, method, args, *line),
            Expr::FieldAccess { base, field } => self.emit_field_access(base, field),
            Expr::StructLit {
                name,
                type_args,
                fields,
            } => self.emit_struct_lit(name, type_args, fields),
            Expr::If {
                cond,
                then_block,
                else_block,
            } => self.emit_if(cond, then_block, else_block.as_ref()),
            Expr::When { scrutinee, arms } => self.emit_when(scrutinee, arms),
            Expr::Closure { params, ret, body } => self.emit_closure(params, ret, body),
            Expr::Ref { operand, .. } => {
                let (addr, _, sem) = self.emit_place(operand)?;
                Ok(EmitValue::new(
                    addr,
                    LlvmType::Ptr,
                    SemType::Ref {
                        inner: Box::new(sem),
                        mutable: matches!(expr, Expr::Ref { mutable: true, .. }),
                    },
                ))
            }
            Expr::Deref(operand) => {
                let inner = self.emit_expr(operand)?;
                let pointee_sem = match &inner.sem {
                    SemType::Ptr { inner, .. } | SemType::Ref { inner, .. } => (**inner).clone(),
                    _ => SemType::prim(PrimKind::I64),
                };
                let pointee_ty = self.lower_type(&pointee_sem)?;
                if pointee_ty == LlvmType::Void {
                    return Ok(EmitValue::unit());
                }
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = load {}, ptr {}",
                    reg, pointee_ty, inner.repr
                ))?;
                Ok(EmitValue::new(reg, pointee_ty, pointee_sem))
            }
            Expr::Cast { operand, ty } => self.emit_cast(operand, ty),
        }
    }

    fn emit_var(&mut self, name: &str) -> Result<EmitValue, CodegenError> {
        let Some(slot) = self.lookup_local(name).cloned() else {
            return Err(CodegenError::unresolved(name, 0));
        };
        if slot.ty == LlvmType::Void {
            return Ok(EmitValue::unit());
        }
        let reg = self.fresh_reg();
        self.ins(format_args!("{} = load {}, ptr {}", reg, slot.ty, slot.addr))?;
        // Reading a droppable value is a move; the scope-exit drop now
        // belongs to the new owner.
        if self.sem_is_droppable(&slot.sem) {
            self.mark_consumed(name);
        }
        Ok(EmitValue::new(reg, slot.ty, slot.sem))
    }

    // ---- places ----------------------------------------------------------

    /// Lower an lvalue to an address. Rvalues spill into a fresh alloca so
    /// field projection can still use `getelementptr`.
    pub(super) fn emit_place(
        &mut self,
        expr: &Expr,
    ) -> Result<(String, LlvmType, SemType), CodegenError> {
        match expr {
            Expr::Var(name) => {
                let slot = self
                    .lookup_local(name)
                    .cloned()
                    .ok_or_else(|| CodegenError::unresolved(name, 0))?;
                Ok((slot.addr, slot.ty, slot.sem))
            }
            Expr::FieldAccess { base, field } => {
                let (base_addr, base_ty, base_sem) = self.emit_place_autoderef(base)?;
                let LlvmType::Struct(mangled) = &base_ty else {
                    return Err(CodegenError::inconsistency(format!(
                        "field access on non-struct value of type {}",
                        base_ty
                    )));
                };
                let info = self
                    .struct_fields
                    .get(mangled)
                    .and_then(|fields| fields.iter().find(|f| f.name == *field))
                    .cloned()
                    .ok_or_else(|| {
                        CodegenError::inconsistency(format!(
                            "no field `{}` on `{}` (base {})",
                            field, mangled, base_sem
                        ))
                    })?;
                let addr = self.fresh_reg();
                self.ins(format_args!(
                    "{} = getelementptr %struct.{}, ptr {}, i32 0, i32 {}",
                    addr, mangled, base_addr, info.index
                ))?;
                Ok((addr, info.ty, info.sem))
            }
            Expr::Deref(operand) => {
                let ptr = self.emit_expr(operand)?;
                let pointee_sem = match &ptr.sem {
                    SemType::Ptr { inner, .. } | SemType::Ref { inner, .. } => (**inner).clone(),
                    _ => SemType::prim(PrimKind::I64),
                };
                let pointee_ty = self.lower_type(&pointee_sem)?;
                Ok((ptr.repr, pointee_ty, pointee_sem))
            }
            other => {
                // Rvalue: materialize, then address the temporary
                let val = self.emit_expr(other)?;
                let addr = self.spill_to_alloca(&val)?;
                Ok((addr, val.ty, val.sem))
            }
        }
    }

    /// Place lowering that sees through one reference/pointer level, so
    /// `r.field` works when `r: &Pair[I32]`.
    fn emit_place_autoderef(
        &mut self,
        expr: &Expr,
    ) -> Result<(String, LlvmType, SemType), CodegenError> {
        let (addr, ty, sem) = self.emit_place(expr)?;
        if let SemType::Ptr { inner, .. } | SemType::Ref { inner, .. } = &sem {
            let loaded = self.fresh_reg();
            self.ins(format_args!("{} = load ptr, ptr {}", loaded, addr))?;
            let inner_sem = (**inner).clone();
            let inner_ty = self.lower_type(&inner_sem)?;
            return Ok((loaded, inner_ty, inner_sem));
        }
        Ok((addr, ty, sem))
    }

    pub(super) fn spill_to_alloca(&mut self, val: &EmitValue) -> Result<String, CodegenError> {
        let addr = self.fresh_reg();
        self.ins(format_args!("{} = alloca {}", addr, val.ty))?;
        self.ins(format_args!(
            "store {} {}, ptr {}",
            val.ty, val.repr, addr
        ))?;
        Ok(addr)
    }

    // ---- operators -------------------------------------------------------

    fn emit_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<EmitValue, CodegenError> {
        if op.is_logical() {
            return self.emit_short_circuit(op, lhs, rhs);
        }
        let l = self.emit_expr(lhs)?;
        let r = self.emit_expr(rhs)?;
        self.emit_binary_values(op, &l, &r)
    }

    /// Lower a binary operator over already-emitted operands.
    pub(super) fn emit_binary_values(
        &mut self,
        op: BinOp,
        lhs: &EmitValue,
        rhs: &EmitValue,
    ) -> Result<EmitValue, CodegenError> {
        // String equality goes through the runtime helper
        if op.is_comparison()
            && lhs.sem == SemType::prim(PrimKind::Str)
            && rhs.sem == SemType::prim(PrimKind::Str)
        {
            return self.emit_str_comparison(op, lhs, rhs);
        }

        if lhs.ty.is_float() || rhs.ty.is_float() {
            return self.emit_float_binary(op, lhs, rhs);
        }

        let unsigned = lhs.unsigned || rhs.unsigned;
        let (l, r, ty) = self.unify_int_widths(lhs, rhs)?;
        let reg = self.fresh_reg();
        if op.is_comparison() {
            let pred = Self::icmp_predicate(op, unsigned);
            self.ins(format_args!("{} = icmp {} {} {}, {}", reg, pred, ty, l, r))?;
            return Ok(EmitValue::new(reg, LlvmType::i1(), SemType::prim(PrimKind::Bool)));
        }
        let inst = match op {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => {
                if unsigned {
                    "udiv"
                } else {
                    "sdiv"
                }
            }
            BinOp::Rem => {
                if unsigned {
                    "urem"
                } else {
                    "srem"
                }
            }
            BinOp::BitAnd => "and",
            BinOp::BitOr => "or",
            BinOp::BitXor => "xor",
            BinOp::Shl => "shl",
            BinOp::Shr => {
                if unsigned {
                    "lshr"
                } else {
                    "ashr"
                }
            }
            _ => {
                return Err(CodegenError::inconsistency(format!(
                    "operator {:?} reached integer lowering",
                    op
                )));
            }
        };
        self.ins(format_args!("{} = {} {} {}, {}", reg, inst, ty, l, r))?;
        let sem = lhs.sem.clone();
        let mut value = EmitValue::new(reg, ty, sem);
        value.unsigned = unsigned;
        Ok(value)
    }

    fn emit_float_binary(
        &mut self,
        op: BinOp,
        lhs: &EmitValue,
        rhs: &EmitValue,
    ) -> Result<EmitValue, CodegenError> {
        let ty = if lhs.ty == LlvmType::Float(FloatKind::F64)
            || rhs.ty == LlvmType::Float(FloatKind::F64)
        {
            LlvmType::Float(FloatKind::F64)
        } else {
            lhs.ty.clone()
        };
        let l = self.coerce_to(lhs, &ty)?;
        let r = self.coerce_to(rhs, &ty)?;
        let reg = self.fresh_reg();
        if op.is_comparison() {
            // Ordered predicates: NaN compares unequal to everything
            let pred = Self::fcmp_predicate(op);
            self.ins(format_args!("{} = fcmp {} {} {}, {}", reg, pred, ty, l, r))?;
            return Ok(EmitValue::new(reg, LlvmType::i1(), SemType::prim(PrimKind::Bool)));
        }
        let inst = match op {
            BinOp::Add => "fadd",
            BinOp::Sub => "fsub",
            BinOp::Mul => "fmul",
            BinOp::Div => "fdiv",
            BinOp::Rem => "frem",
            _ => {
                return Err(CodegenError::inconsistency(format!(
                    "operator {:?} reached float lowering",
                    op
                )));
            }
        };
        self.ins(format_args!("{} = {} {} {}, {}", reg, inst, ty, l, r))?;
        Ok(EmitValue::new(reg, ty, lhs.sem.clone()))
    }

    fn emit_str_comparison(
        &mut self,
        op: BinOp,
        lhs: &EmitValue,
        rhs: &EmitValue,
    ) -> Result<EmitValue, CodegenError> {
        self.declare_runtime("str_eq")?;
        let eq = self.fresh_reg();
        self.ins(format_args!(
            "{} = call i32 @str_eq(ptr {}, ptr {})",
            eq, lhs.repr, rhs.repr
        ))?;
        let reg = self.fresh_reg();
        let pred = if op == BinOp::Ne { "eq" } else { "ne" };
        self.ins(format_args!("{} = icmp {} i32 {}, 0", reg, pred, eq))?;
        Ok(EmitValue::new(reg, LlvmType::i1(), SemType::prim(PrimKind::Bool)))
    }

    pub(super) fn icmp_predicate(op: BinOp, unsigned: bool) -> &'static str {
        match (op, unsigned) {
            (BinOp::Eq, _) => "eq",
            (BinOp::Ne, _) => "ne",
            (BinOp::Lt, false) => "slt",
            (BinOp::Le, false) => "sle",
            (BinOp::Gt, false) => "sgt",
            (BinOp::Ge, false) => "sge",
            (BinOp::Lt, true) => "ult",
            (BinOp::Le, true) => "ule",
            (BinOp::Gt, true) => "ugt",
            (BinOp::Ge, true) => "uge",
            _ => "eq",
        }
    }

    pub(super) fn fcmp_predicate(op: BinOp) -> &'static str {
        match op {
            BinOp::Eq => "oeq",
            BinOp::Ne => "one",
            BinOp::Lt => "olt",
            BinOp::Le => "ole",
            BinOp::Gt => "ogt",
            BinOp::Ge => "oge",
            _ => "oeq",
        }
    }

    /// `&&` / `||` with short-circuit evaluation and a phi merge.
    fn emit_short_circuit(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<EmitValue, CodegenError> {
        let l = self.emit_expr(lhs)?;
        let rhs_label = self.fresh_label("sc_rhs");
        let merge_label = self.fresh_label("sc_merge");
        let lhs_pred = self.current_label.clone();
        match op {
            BinOp::And => self.term(format_args!(
                "br i1 {}, label %{}, label %{}",
                l.repr, rhs_label, merge_label
            ))?,
            _ => self.term(format_args!(
                "br i1 {}, label %{}, label %{}",
                l.repr, merge_label, rhs_label
            ))?,
        }
        self.open_label(&rhs_label)?;
        let r = self.emit_expr(rhs)?;
        let rhs_pred = self.current_label.clone();
        self.term(format_args!("br label %{}", merge_label))?;
        self.open_label(&merge_label)?;
        let reg = self.fresh_reg();
        let short_value = if op == BinOp::And { "false" } else { "true" };
        self.ins(format_args!(
            "{} = phi i1 [ {}, %{} ], [ {}, %{} ]",
            reg, short_value, lhs_pred, r.repr, rhs_pred
        ))?;
        Ok(EmitValue::new(reg, LlvmType::i1(), SemType::prim(PrimKind::Bool)))
    }

    fn emit_unary(&mut self, op: UnOp, operand: &Expr) -> Result<EmitValue, CodegenError> {
        let val = self.emit_expr(operand)?;
        let reg = self.fresh_reg();
        match op {
            UnOp::Neg => {
                if val.ty.is_float() {
                    self.ins(format_args!("{} = fneg {} {}", reg, val.ty, val.repr))?;
                } else {
                    self.ins(format_args!("{} = sub {} 0, {}", reg, val.ty, val.repr))?;
                }
            }
            UnOp::Not => {
                if val.ty == LlvmType::i1() {
                    self.ins(format_args!("{} = xor i1 {}, true", reg, val.repr))?;
                } else {
                    self.ins(format_args!("{} = xor {} {}, -1", reg, val.ty, val.repr))?;
                }
            }
        }
        Ok(EmitValue::new(reg, val.ty, val.sem))
    }

    // ---- aggregates ------------------------------------------------------

    fn emit_field_access(&mut self, base: &Expr, field: &str) -> Result<EmitValue, CodegenError> {
        let (addr, ty, sem) = self.emit_place(&Expr::FieldAccess {
            base: Box::new(base.clone()),
            field: field.to_string(),
        })?;
        if ty == LlvmType::Void || ty == LlvmType::ZeroSized {
            return Ok(EmitValue::unit());
        }
        let reg = self.fresh_reg();
        self.ins(format_args!("{} = load {}, ptr {}", reg, ty, addr))?;
        Ok(EmitValue::new(reg, ty, sem))
    }

    fn emit_struct_lit(
        &mut self,
        name: &str,
        type_args: &[SemType],
        fields: &[(String, Expr)],
    ) -> Result<EmitValue, CodegenError> {
        let args: Vec<SemType> = type_args.iter().map(|t| t.substitute(&self.subst)).collect();
        let mangled = self.register_struct(name, &args)?;
        let addr = self.fresh_reg();
        self.ins(format_args!("{} = alloca %struct.{}", addr, mangled))?;
        for (field_name, field_expr) in fields {
            let info = self
                .struct_fields
                .get(&mangled)
                .and_then(|fs| fs.iter().find(|f| f.name == *field_name))
                .cloned()
                .ok_or_else(|| {
                    CodegenError::inconsistency(format!(
                        "struct literal `{}` names unknown field `{}`",
                        mangled, field_name
                    ))
                })?;
            let val = self.emit_expr(field_expr)?;
            if info.ty == LlvmType::ZeroSized {
                continue;
            }
            let field_addr = self.fresh_reg();
            self.ins(format_args!(
                "{} = getelementptr %struct.{}, ptr {}, i32 0, i32 {}",
                field_addr, mangled, addr, info.index
            ))?;
            let stored = self.coerce_to(&val, &info.ty)?;
            self.ins(format_args!(
                "store {} {}, ptr {}",
                info.ty, stored, field_addr
            ))?;
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
                name: name.to_string(),
                module: None,
                args,
            },
        ))
    }

    // ---- control flow ----------------------------------------------------

    fn emit_if(
        &mut self,
        cond: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
    ) -> Result<EmitValue, CodegenError> {
        let cond_val = self.emit_expr(cond)?;
        let then_label = self.fresh_label("if_then");
        let else_label = self.fresh_label("if_else");
        let merge_label = self.fresh_label("if_merge");
        let else_target = if else_block.is_some() {
            else_label.clone()
        } else {
            merge_label.clone()
        };
        self.term(format_args!(
            "br i1 {}, label %{}, label %{}",
            cond_val.repr, then_label, else_target
        ))?;

        self.open_label(&then_label)?;
        let then_val = self.emit_block(then_block)?;
        let then_pred = self.current_label.clone();
        let then_terminated = self.block_terminated;
        self.term(format_args!("br label %{}", merge_label))?;

        let mut merged: Option<EmitValue> = None;
        if let Some(eb) = else_block {
            self.open_label(&else_label)?;
            let else_val = self.emit_block(eb)?;
            let else_pred = self.current_label.clone();
            let else_terminated = self.block_terminated;
            self.term(format_args!("br label %{}", merge_label))?;

            self.open_label(&merge_label)?;
            if !then_terminated
                && !else_terminated
                && then_val.ty != LlvmType::Void
                && then_val.ty == else_val.ty
            {
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = phi {} [ {}, %{} ], [ {}, %{} ]",
                    reg, then_val.ty, then_val.repr, then_pred, else_val.repr, else_pred
                ))?;
                merged = Some(EmitValue::new(reg, then_val.ty.clone(), then_val.sem.clone()));
            }
        } else {
            self.open_label(&merge_label)?;
        }
        Ok(merged.unwrap_or_else(EmitValue::unit))
    }

    // ---- casts -----------------------------------------------------------

    fn emit_cast(&mut self, operand: &Expr, target: &SemType) -> Result<EmitValue, CodegenError> {
        let val = self.emit_expr(operand)?;
        let target_sem = target.substitute(&self.subst);
        let target_ty = self.lower_type(&target_sem)?;
        if val.ty == target_ty {
            return Ok(EmitValue::new(val.repr, target_ty, target_sem));
        }
        let reg = self.fresh_reg();
        match (&val.ty, &target_ty) {
            (LlvmType::Int { bits: have }, LlvmType::Int { bits: want }) => {
                let op = if have > want {
                    "trunc"
                } else if val.unsigned {
                    "zext"
                } else {
                    "sext"
                };
                self.ins(format_args!(
                    "{} = {} i{} {} to i{}",
                    reg, op, have, val.repr, want
                ))?;
            }
            (LlvmType::Int { bits }, LlvmType::Float(_)) => {
                let op = if val.unsigned { "uitofp" } else { "sitofp" };
                self.ins(format_args!(
                    "{} = {} i{} {} to {}",
                    reg, op, bits, val.repr, target_ty
                ))?;
            }
            (LlvmType::Float(_), LlvmType::Int { bits }) => {
                let op = if target_sem.is_unsigned() {
                    "fptoui"
                } else {
                    "fptosi"
                };
                self.ins(format_args!(
                    "{} = {} {} {} to i{}",
                    reg, op, val.ty, val.repr, bits
                ))?;
            }
            (LlvmType::Float(FloatKind::F32), LlvmType::Float(FloatKind::F64)) => {
                self.ins(format_args!(
                    "{} = fpext float {} to double",
                    reg, val.repr
                ))?;
            }
            (LlvmType::Float(FloatKind::F64), LlvmType::Float(FloatKind::F32)) => {
                self.ins(format_args!(
                    "{} = fptrunc double {} to float",
                    reg, val.repr
                ))?;
            }
            (LlvmType::Int { bits }, LlvmType::Ptr) => {
                self.ins(format_args!(
                    "{} = inttoptr i{} {} to ptr",
                    reg, bits, val.repr
                ))?;
            }
            (LlvmType::Ptr, LlvmType::Int { bits }) => {
                self.ins(format_args!(
                    "{} = ptrtoint ptr {} to i{}",
                    reg, val.repr, bits
                ))?;
            }
            _ => {
                return Ok(EmitValue::new(val.repr, target_ty, target_sem));
            }
        }
        Ok(EmitValue::new(reg, target_ty, target_sem))
    }

    // ---- drops -----------------------------------------------------------

    pub(super) fn sem_is_droppable(&self, sem: &SemType) -> bool {
        match sem {
            SemType::Named { name, .. } => {
                self.unit.has_drop_impl(name) || LIBRARY_DROP_TYPES.contains(&name.as_str())
            }
            _ => false,
        }
    }

    /// Drop calls for locals leaving scope, newest first. Skipped entirely
    /// when the block already terminated (an early return consumed them).
    pub(super) fn emit_scope_drops(
        &mut self,
        scope: &[(String, LocalSlot)],
    ) -> Result<(), CodegenError> {
        for (_, slot) in scope.iter().rev() {
            if slot.consumed || !self.sem_is_droppable(&slot.sem) {
                continue;
            }
            self.emit_drop_addr(&slot.addr, &slot.sem)?;
        }
        Ok(())
    }

    /// Call the drop glue for a value already in memory at `addr`.
    pub(super) fn emit_drop_addr(
        &mut self,
        addr: &str,
        sem: &SemType,
    ) -> Result<(), CodegenError> {
        let SemType::Named { name, args, .. } = sem else {
            return Ok(());
        };
        if self.unit.has_drop_impl(name) {
            let args = args.clone();
            if let Some(method) = self.register_impl_method(name, &args, "drop")? {
                self.ins(format_args!(
                    "call void @{}(ptr {})",
                    method.mangled_fn, addr
                ))?;
            }
        } else if LIBRARY_DROP_TYPES.contains(&name.as_str()) {
            let symbol = format!("{}_drop", name);
            self.ensure_declared(&format!("declare void @{}(ptr)", symbol))?;
            self.ins(format_args!("call void @{}(ptr {})", symbol, addr))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icmp_predicates_follow_signedness() {
        assert_eq!(Emitter::icmp_predicate(BinOp::Lt, false), "slt");
        assert_eq!(Emitter::icmp_predicate(BinOp::Lt, true), "ult");
        assert_eq!(Emitter::icmp_predicate(BinOp::Ge, false), "sge");
        assert_eq!(Emitter::icmp_predicate(BinOp::Ge, true), "uge");
        assert_eq!(Emitter::icmp_predicate(BinOp::Eq, true), "eq");
    }

    #[test]
    fn test_fcmp_predicates_are_ordered() {
        assert_eq!(Emitter::fcmp_predicate(BinOp::Eq), "oeq");
        assert_eq!(Emitter::fcmp_predicate(BinOp::Ne), "one");
        assert_eq!(Emitter::fcmp_predicate(BinOp::Le), "ole");
        assert_eq!(Emitter::fcmp_predicate(BinOp::Gt), "ogt");
    }
}
