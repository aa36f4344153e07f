//! Call lowering
//!
//! A call expression is tried against each lowering in a fixed order:
//!
//! 1. compiler intrinsic
//! 2. builtin helper (assert, atomic, mem, sync, math, collection, string,
//!    async, time)
//! 3. closure value in scope
//! 4. bare enum constructor (`Just(x)`, `Nothing`)
//! 5. user function, monomorphizing on demand
//!
//! Method and path calls dispatch primitive behavior impls, user impls, and
//! generic struct statics. Argument coercion happens at every boundary:
//! integer widths extend per signedness, bare pointers wrap into fat
//! pointers, `i64` addresses convert to `ptr`.

use super::llvm_ty::LlvmType;
use super::state::{EmitValue, Emitter};
use crate::ast::{CallExpr, Expr, FuncDef};
use crate::error::CodegenError;
use crate::types::{PrimKind, SemType};
use std::collections::HashMap;

/// Structural match of a parameter type against a concrete argument type,
/// collecting generic parameter bindings. First binding wins.
fn unify_param(param: &SemType, arg: &SemType, out: &mut HashMap<String, SemType>) {
    match (param, arg) {
        (SemType::Param(name), concrete) => {
            out.entry(name.clone()).or_insert_with(|| concrete.clone());
        }
        (SemType::Ptr { inner: p, .. }, SemType::Ptr { inner: a, .. })
        | (SemType::Ref { inner: p, .. }, SemType::Ref { inner: a, .. })
        | (SemType::Array { elem: p, .. }, SemType::Array { elem: a, .. }) => {
            unify_param(p, a, out);
        }
        (SemType::Named { args: ps, .. }, SemType::Named { args: asem, .. }) => {
            for (p, a) in ps.iter().zip(asem) {
                unify_param(p, a, out);
            }
        }
        (SemType::Func { params: pp, ret: pr }, SemType::Func { params: ap, ret: ar }) => {
            for (p, a) in pp.iter().zip(ap) {
                unify_param(p, a, out);
            }
            unify_param(pr, ar, out);
        }
        (SemType::Tuple(ps), SemType::Tuple(asem)) => {
            for (p, a) in ps.iter().zip(asem) {
                unify_param(p, a, out);
            }
        }
        _ => {}
    }
}

impl Emitter<'_> {
    /// Symbol for a user function (kept distinct from C runtime symbols).
    pub(super) fn user_symbol(mangled: &str) -> String {
        format!("tml_{}", mangled)
    }

    pub(super) fn emit_call(&mut self, call: &CallExpr) -> Result<EmitValue, CodegenError> {
        if let Some(value) = self.try_intrinsic(call)? {
            return Ok(value);
        }
        if let Some(value) = self.try_builtin(call)? {
            return Ok(value);
        }
        if let Some(slot) = self.lookup_local(&call.callee).cloned()
            && slot.ty == LlvmType::FatPtr
        {
            return self.emit_closure_call(&call.callee, &call.args);
        }
        if let Some(value) = self.try_bare_variant_ctor(call)? {
            return Ok(value);
        }
        self.emit_user_call(call)
    }

    /// Bare constructor calls resolved through the expected-enum context
    /// first, then by scanning enum definitions for the variant name.
    fn try_bare_variant_ctor(
        &mut self,
        call: &CallExpr,
    ) -> Result<Option<EmitValue>, CodegenError> {
        if let Some(SemType::Named { name, args, .. }) = self.expected_enum.clone() {
            let known = self.unit.lookup_enum(&name).is_some() || self.is_builtin_enum(&name);
            if known {
                let has_variant = match self.unit.lookup_enum(&name) {
                    Some(def) => def.variant(&call.callee).is_some(),
                    None => Self::builtin_enum_def(&name)
                        .is_some_and(|d| d.variant(&call.callee).is_some()),
                };
                if has_variant {
                    let value =
                        self.emit_variant_ctor(&name, &args, &call.callee, &call.args)?;
                    return Ok(Some(value));
                }
            }
        }
        if let Some(def) = self.unit.lookup_enum_with_variant(&call.callee) {
            let enum_name = def.name.clone();
            let type_args =
                self.infer_variant_type_args(&enum_name, &call.callee, &call.args)?;
            let value =
                self.emit_variant_ctor(&enum_name, &type_args, &call.callee, &call.args)?;
            return Ok(Some(value));
        }
        Ok(None)
    }

    fn emit_user_call(&mut self, call: &CallExpr) -> Result<EmitValue, CodegenError> {
        let def = self
            .unit
            .lookup_func(&call.callee)
            .cloned()
            .ok_or_else(|| CodegenError::unresolved(&call.callee, call.line))?;

        if def.is_generic() {
            return self.emit_generic_call(&def, call);
        }

        // A non-generic function living in an imported module still needs
        // its body emitted into this unit; queue it like an instantiation.
        if self.unit.program.find_func(&call.callee).is_none()
            && self.generated.insert(Self::user_symbol(&def.name))
        {
            self.pending_funcs
                .push_back(super::instantiate::PendingFunc {
                    base: def.name.clone(),
                    mangled: def.name.clone(),
                    subst: HashMap::new(),
                });
        }

        // Direct call: lower the declared signature, coerce arguments
        let mut param_tys = Vec::with_capacity(def.params.len());
        for p in &def.params {
            param_tys.push(self.lower_type(&p.ty)?);
        }
        let ret = self.lower_type(&def.ret)?;
        let symbol = Self::user_symbol(&def.name);
        let rendered = self.emit_call_args(&call.args, &param_tys)?;
        self.emit_direct_call(&symbol, &rendered, &ret, &def.ret)
    }

    fn emit_generic_call(
        &mut self,
        def: &FuncDef,
        call: &CallExpr,
    ) -> Result<EmitValue, CodegenError> {
        // Evaluate arguments first; their semantic types drive inference
        // when the call site spelled no explicit type arguments.
        let arg_vals: Vec<EmitValue> = call
            .args
            .iter()
            .map(|a| self.emit_expr(a))
            .collect::<Result<_, _>>()?;

        let type_args: Vec<SemType> = if call.type_args.is_empty() {
            let mut bindings = HashMap::new();
            for (param, arg) in def.params.iter().zip(&arg_vals) {
                unify_param(&param.ty, &arg.sem, &mut bindings);
            }
            // Unresolvable parameters degrade to the best-effort `ptr`
            // lowering rather than failing the call site.
            def.type_params
                .iter()
                .map(|name| {
                    bindings
                        .remove(name)
                        .unwrap_or_else(|| SemType::Param(name.clone()))
                })
                .collect()
        } else {
            call.type_args
                .iter()
                .map(|t| t.substitute(&self.subst))
                .collect()
        };

        let mangled = self.register_generic_func(def, &type_args)?;
        let symbol = Self::user_symbol(&mangled);

        let subst = super::instantiate::build_subst(&def.type_params, &type_args);
        let ret_sem = def.ret.substitute(&subst);
        let ret = self.lower_type(&ret_sem)?;

        let mut rendered = Vec::with_capacity(arg_vals.len());
        for (param, val) in def.params.iter().zip(&arg_vals) {
            let expected_sem = param.ty.substitute(&subst);
            let expected = self.lower_type(&expected_sem)?;
            let repr = self.coerce_to(val, &expected)?;
            rendered.push(format!("{} {}", expected, repr));
        }
        self.emit_direct_call(&symbol, &rendered, &ret, &ret_sem)
    }

    /// Emit argument expressions and coerce them to the expected LLVM
    /// parameter types; extra arguments pass through unchanged.
    pub(super) fn emit_call_args(
        &mut self,
        args: &[Expr],
        params: &[LlvmType],
    ) -> Result<Vec<String>, CodegenError> {
        let mut rendered = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let val = self.emit_expr(arg)?;
            match params.get(i) {
                Some(expected) => {
                    let repr = self.coerce_to(&val, expected)?;
                    rendered.push(format!("{} {}", expected, repr));
                }
                None => rendered.push(format!("{} {}", val.ty, val.repr)),
            }
        }
        Ok(rendered)
    }

    pub(super) fn emit_direct_call(
        &mut self,
        symbol: &str,
        rendered_args: &[String],
        ret: &LlvmType,
        ret_sem: &SemType,
    ) -> Result<EmitValue, CodegenError> {
        if *ret == LlvmType::Void {
            self.ins(format_args!(
                "call void @{}({})",
                symbol,
                rendered_args.join(", ")
            ))?;
            return Ok(EmitValue::unit());
        }
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = call {} @{}({})",
            reg,
            ret,
            symbol,
            rendered_args.join(", ")
        ))?;
        Ok(EmitValue::new(reg, ret.clone(), ret_sem.clone()))
    }

    // ---- method dispatch -------------------------------------------------

    pub(super) fn emit_method_call(
        &mut self,
        receiver: &Expr,
        method: &str,
        type_args: &[SemType],
        args: &[Expr],
        line: u32,
    ) -> Result<EmitValue, CodegenError> {
        let recv = self.emit_expr(receiver)?;

        let (type_name, inst_args): (String, Vec<SemType>) = match &recv.sem {
            // Primitive receivers dispatch through the behavior impl for
            // the primitive's canonical type name (Display, Hash, ...).
            SemType::Prim(kind) => (kind.mangled().to_string(), Vec::new()),
            SemType::Named { name, args, .. } => (name.clone(), args.clone()),
            SemType::Ref { inner, .. } | SemType::Ptr { inner, .. } => match inner.as_ref() {
                SemType::Named { name, args, .. } => (name.clone(), args.clone()),
                SemType::Prim(kind) => (kind.mangled().to_string(), Vec::new()),
                _ => return Err(CodegenError::unresolved(method, line)),
            },
            _ => return Err(CodegenError::unresolved(method, line)),
        };

        let inst_args: Vec<SemType> = if type_args.is_empty() {
            inst_args
        } else {
            type_args.iter().map(|t| t.substitute(&self.subst)).collect()
        };

        let method_ref = match self.register_impl_method(&type_name, &inst_args, method)? {
            Some(m) => m,
            None => {
                if recv.sem.as_prim().is_some() {
                    // A missing primitive behavior impl is a front-end bug
                    return Err(CodegenError::unresolved(
                        format!("{}.{}", type_name, method),
                        line,
                    ));
                }
                self.register_library_method(&type_name, &inst_args, method)
            }
        };

        let mut rendered = Vec::with_capacity(args.len() + 1);
        match method_ref.params.first() {
            Some((self_ty, _)) => {
                let repr = self.coerce_to(&recv, self_ty)?;
                rendered.push(format!("{} {}", self_ty, repr));
            }
            None => rendered.push(format!("{} {}", recv.ty, recv.repr)),
        }
        for (i, arg) in args.iter().enumerate() {
            let val = self.emit_expr(arg)?;
            match method_ref.params.get(i + 1) {
                Some((expected, _)) => {
                    let repr = self.coerce_to(&val, expected)?;
                    rendered.push(format!("{} {}", expected, repr));
                }
                None => rendered.push(format!("{} {}", val.ty, val.repr)),
            }
        }
        self.emit_direct_call(
            &method_ref.mangled_fn,
            &rendered,
            &method_ref.ret,
            &method_ref.ret_sem,
        )
    }

    pub(super) fn emit_path_call(
        &mut self,
        type_name: &str,
        type_args: &[SemType],
        method: &str,
        args: &[Expr],
        line: u32,
    ) -> Result<EmitValue, CodegenError> {
        let resolved_args: Vec<SemType> = type_args
            .iter()
            .map(|t| t.substitute(&self.subst))
            .collect();

        // `Enum::Variant(args)` is construction, not a method call.
        let is_enum = self.unit.lookup_enum(type_name).is_some()
            || self.is_builtin_enum(type_name);
        if is_enum {
            let has_variant = match self.unit.lookup_enum(type_name) {
                Some(def) => def.variant(method).is_some(),
                None => Self::builtin_enum_def(type_name)
                    .is_some_and(|d| d.variant(method).is_some()),
            };
            if has_variant {
                let inst_args = if resolved_args.is_empty() {
                    self.infer_variant_type_args(type_name, method, args)?
                } else {
                    resolved_args
                };
                return self.emit_variant_ctor(type_name, &inst_args, method, args);
            }
        }

        let method_ref = match self.register_impl_method(type_name, &resolved_args, method)? {
            Some(m) => m,
            None => {
                if self.unit.lookup_struct(type_name).is_none() && !is_enum {
                    // Completely unknown type: library-internal path
                    self.register_library_method(type_name, &resolved_args, method)
                } else {
                    return Err(CodegenError::unresolved(
                        format!("{}::{}", type_name, method),
                        line,
                    ));
                }
            }
        };

        let param_tys: Vec<LlvmType> =
            method_ref.params.iter().map(|(ty, _)| ty.clone()).collect();
        let rendered = self.emit_call_args(args, &param_tys)?;
        self.emit_direct_call(
            &method_ref.mangled_fn,
            &rendered,
            &method_ref.ret,
            &method_ref.ret_sem,
        )
    }

    /// Infer enum type arguments from constructor argument types by
    /// unifying the variant's declared payload against the argument sems.
    pub(super) fn infer_variant_type_args(
        &mut self,
        enum_name: &str,
        variant: &str,
        args: &[Expr],
    ) -> Result<Vec<SemType>, CodegenError> {
        let def = match self.unit.lookup_enum(enum_name).cloned() {
            Some(d) => d,
            None => Self::builtin_enum_def(enum_name)
                .ok_or_else(|| CodegenError::unresolved(enum_name, 0))?,
        };
        if def.type_params.is_empty() {
            return Ok(Vec::new());
        }
        let Some((_, variant_def)) = def.variant(variant) else {
            return Err(CodegenError::unresolved(
                format!("{}::{}", enum_name, variant),
                0,
            ));
        };
        let payload = variant_def.payload.clone();

        // Inference must not emit: the constructor evaluates the arguments
        // itself. `peek_sem` inspects without lowering.
        let mut bindings = HashMap::new();
        for (field_ty, arg) in payload.iter().zip(args) {
            if let Some(sem) = self.peek_sem(arg) {
                unify_param(field_ty, &sem, &mut bindings);
            }
        }
        Ok(def
            .type_params
            .iter()
            .map(|name| {
                bindings
                    .remove(name)
                    .unwrap_or_else(|| SemType::prim(PrimKind::I32))
            })
            .collect())
    }

    /// Best-effort semantic type of an expression without emitting any IR.
    /// Returns `None` where a real answer would require lowering.
    pub(super) fn peek_sem(&self, expr: &Expr) -> Option<SemType> {
        match expr {
            Expr::IntLit { ty, .. } => {
                Some(SemType::prim(ty.unwrap_or(Self::default_int_kind())))
            }
            Expr::FloatLit { ty, .. } => Some(SemType::prim(ty.unwrap_or(PrimKind::F64))),
            Expr::BoolLit(_) => Some(SemType::prim(PrimKind::Bool)),
            Expr::StrLit(_) => Some(SemType::prim(PrimKind::Str)),
            Expr::CharLit(_) => Some(SemType::prim(PrimKind::Char)),
            Expr::UnitLit => Some(SemType::unit()),
            Expr::Var(name) => self.lookup_local(name).map(|slot| slot.sem.clone()),
            Expr::Binary { op, lhs, .. } => {
                if op.is_comparison() || op.is_logical() {
                    Some(SemType::prim(PrimKind::Bool))
                } else {
                    self.peek_sem(lhs)
                }
            }
            Expr::Unary { operand, .. } => self.peek_sem(operand),
            Expr::Call(call) => {
                let def = self.unit.lookup_func(&call.callee)?;
                if def.is_generic() {
                    None
                } else {
                    Some(def.ret.clone())
                }
            }
            Expr::StructLit {
                name, type_args, ..
            } => Some(SemType::Named {
                name: name.clone(),
                module: None,
                args: type_args.iter().map(|t| t.substitute(&self.subst)).collect(),
            }),
            Expr::Closure { params, ret, .. } => Some(SemType::Func {
                params: params.iter().map(|p| p.ty.clone()).collect(),
                ret: Box::new(ret.clone()),
            }),
            Expr::Ref { mutable, operand } => self.peek_sem(operand).map(|inner| SemType::Ref {
                inner: Box::new(inner),
                mutable: *mutable,
            }),
            Expr::Cast { ty, .. } => Some(ty.substitute(&self.subst)),
            _ => None,
        }
    }

    // ---- closures --------------------------------------------------------

    /// Call through a fat-pointer closure value: extract both components
    /// and call the code pointer with the environment first.
    pub(super) fn emit_closure_call(
        &mut self,
        name: &str,
        args: &[Expr],
    ) -> Result<EmitValue, CodegenError> {
        let slot = self
            .lookup_local(name)
            .cloned()
            .ok_or_else(|| CodegenError::unresolved(name, 0))?;
        let loaded = self.fresh_reg();
        self.ins(format_args!(
            "{} = load {{ ptr, ptr }}, ptr {}",
            loaded, slot.addr
        ))?;
        let code = self.fresh_reg();
        self.ins(format_args!(
            "{} = extractvalue {{ ptr, ptr }} {}, 0",
            code, loaded
        ))?;
        let env = self.fresh_reg();
        self.ins(format_args!(
            "{} = extractvalue {{ ptr, ptr }} {}, 1",
            env, loaded
        ))?;

        let (param_sems, ret_sem) = match &slot.sem {
            SemType::Func { params, ret } => (params.clone(), (**ret).clone()),
            _ => (Vec::new(), SemType::unit()),
        };
        let mut param_tys = Vec::with_capacity(param_sems.len());
        for p in &param_sems {
            param_tys.push(self.lower_type(p)?);
        }
        let ret = self.lower_type(&ret_sem)?;

        let mut rendered = vec![format!("ptr {}", env)];
        rendered.extend(self.emit_call_args(args, &param_tys)?);

        if ret == LlvmType::Void {
            self.ins(format_args!(
                "call void {}({})",
                code,
                rendered.join(", ")
            ))?;
            return Ok(EmitValue::unit());
        }
        let reg = self.fresh_reg();
        self.ins(format_args!(
            "{} = call {} {}({})",
            reg,
            ret,
            code,
            rendered.join(", ")
        ))?;
        Ok(EmitValue::new(reg, ret, ret_sem))
    }
}
