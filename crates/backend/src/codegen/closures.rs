//! Closure lowering
//!
//! A closure value is a fat pointer `{ code_ptr, env_ptr }`. The emitter
//! synthesizes a top-level function whose first parameter is the
//! environment; captured locals are hoisted into heap cells whose addresses
//! live in the env record. Non-capturing closures pass `null` for the env.
//!
//! Hoisting redirects the enclosing function's local to the same cell, so
//! mutation is visible on both sides of the capture.

use super::llvm_ty::LlvmType;
use super::state::{EmitValue, Emitter, LocalSlot};
use crate::ast::{Block, Expr, Param, Pattern, Stmt};
use crate::error::CodegenError;
use crate::types::SemType;

/// Collect free variable names in first-use order.
fn free_vars_block(block: &Block, bound: &mut Vec<String>, out: &mut Vec<String>) {
    let depth = bound.len();
    for stmt in &block.stmts {
        free_vars_stmt(stmt, bound, out);
    }
    if let Some(value) = &block.value {
        free_vars_expr(value, bound, out);
    }
    bound.truncate(depth);
}

fn free_vars_stmt(stmt: &Stmt, bound: &mut Vec<String>, out: &mut Vec<String>) {
    match stmt {
        Stmt::Let { name, value, .. } => {
            free_vars_expr(value, bound, out);
            bound.push(name.clone());
        }
        Stmt::Assign { target, value } | Stmt::CompoundAssign { target, value, .. } => {
            free_vars_expr(target, bound, out);
            free_vars_expr(value, bound, out);
        }
        Stmt::Expr(e) => free_vars_expr(e, bound, out),
        Stmt::Return { value } => {
            if let Some(v) = value {
                free_vars_expr(v, bound, out);
            }
        }
        Stmt::While { cond, body } => {
            free_vars_expr(cond, bound, out);
            free_vars_block(body, bound, out);
        }
        Stmt::Break | Stmt::Continue => {}
    }
}

fn free_vars_expr(expr: &Expr, bound: &mut Vec<String>, out: &mut Vec<String>) {
    match expr {
        Expr::Var(name) => {
            if !bound.iter().any(|b| b == name) && !out.iter().any(|o| o == name) {
                out.push(name.clone());
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            free_vars_expr(lhs, bound, out);
            free_vars_expr(rhs, bound, out);
        }
        Expr::Unary { operand, .. } | Expr::Deref(operand) => {
            free_vars_expr(operand, bound, out);
        }
        Expr::Ref { operand, .. } => free_vars_expr(operand, bound, out),
        Expr::Cast { operand, .. } => free_vars_expr(operand, bound, out),
        Expr::Call(call) => {
            // The callee may itself be a closure-typed local
            if !bound.iter().any(|b| b == &call.callee)
                && !out.iter().any(|o| o == &call.callee)
            {
                out.push(call.callee.clone());
            }
            for arg in &call.args {
                free_vars_expr(arg, bound, out);
            }
        }
        Expr::MethodCall { receiver, args, .. } => {
            free_vars_expr(receiver, bound, out);
            for arg in args {
                free_vars_expr(arg, bound, out);
            }
        }
        Expr::PathCall { args, .. } => {
            for arg in args {
                free_vars_expr(arg, bound, out);
            }
        }
        Expr::FieldAccess { base, .. } => free_vars_expr(base, bound, out),
        Expr::StructLit { fields, .. } => {
            for (_, value) in fields {
                free_vars_expr(value, bound, out);
            }
        }
        Expr::If {
            cond,
            then_block,
            else_block,
        } => {
            free_vars_expr(cond, bound, out);
            free_vars_block(then_block, bound, out);
            if let Some(eb) = else_block {
                free_vars_block(eb, bound, out);
            }
        }
        Expr::When { scrutinee, arms } => {
            free_vars_expr(scrutinee, bound, out);
            for arm in arms {
                let depth = bound.len();
                if let Pattern::Variant { bindings, .. } = &arm.pattern {
                    bound.extend(bindings.iter().cloned());
                }
                free_vars_block(&arm.body, bound, out);
                bound.truncate(depth);
            }
        }
        Expr::Closure { params, body, .. } => {
            let depth = bound.len();
            bound.extend(params.iter().map(|p| p.name.clone()));
            free_vars_block(body, bound, out);
            bound.truncate(depth);
        }
        _ => {}
    }
}

impl Emitter<'_> {
    /// Lower a closure literal to a fat-pointer value.
    pub(super) fn emit_closure(
        &mut self,
        params: &[Param],
        ret: &SemType,
        body: &Block,
    ) -> Result<EmitValue, CodegenError> {
        let fn_name = format!("__closure_{}", self.closure_counter);
        self.closure_counter += 1;

        // Captures: free names in the body that are locals in scope here.
        let mut bound: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        let mut free = Vec::new();
        free_vars_block(body, &mut bound, &mut free);
        let captures: Vec<(String, LocalSlot)> = free
            .into_iter()
            .filter_map(|name| self.lookup_local(&name).cloned().map(|slot| (name, slot)))
            .collect();

        // Creation site: heap-allocate each capture into its own cell, then
        // store the cell addresses into the env record. The enclosing local
        // is redirected to the cell so mutation stays shared.
        let env_repr = if captures.is_empty() {
            "null".to_string()
        } else {
            self.declare_runtime("malloc")?;
            let env = self.fresh_reg();
            self.ins(format_args!(
                "{} = call ptr @malloc(i64 {})",
                env,
                captures.len() as u64 * 8
            ))?;
            for (i, (name, slot)) in captures.iter().enumerate() {
                let cell = self.fresh_reg();
                self.ins(format_args!(
                    "{} = call ptr @malloc(i64 {})",
                    cell,
                    slot.ty.store_size().max(1)
                ))?;
                if slot.ty != LlvmType::Void {
                    let current = self.fresh_reg();
                    self.ins(format_args!(
                        "{} = load {}, ptr {}",
                        current, slot.ty, slot.addr
                    ))?;
                    self.ins(format_args!(
                        "store {} {}, ptr {}",
                        slot.ty, current, cell
                    ))?;
                }
                let env_slot = self.fresh_reg();
                self.ins(format_args!(
                    "{} = getelementptr ptr, ptr {}, i64 {}",
                    env_slot, env, i
                ))?;
                self.ins(format_args!("store ptr {}, ptr {}", cell, env_slot))?;
                self.update_local_addr(name, cell.clone());
            }
            env
        };

        // Synthesize the function into the side buffer, preserving the
        // enclosing function's emission state.
        let ret_sem = ret.substitute(&self.subst);
        let ret_ty = self.lower_type(&ret_sem)?;
        let mut param_tys = Vec::with_capacity(params.len());
        for p in params {
            let sem = p.ty.substitute(&self.subst);
            param_tys.push((self.lower_type(&sem)?, sem));
        }

        let saved_body = std::mem::take(&mut self.body);
        let saved_scopes = std::mem::take(&mut self.scopes);
        let saved_ret = std::mem::replace(&mut self.current_ret, ret_ty.clone());
        let saved_terminated = self.block_terminated;
        let saved_label = std::mem::replace(&mut self.current_label, "entry".to_string());
        let saved_loops = std::mem::take(&mut self.loop_stack);

        let rendered_params: Vec<String> = params
            .iter()
            .zip(&param_tys)
            .map(|(p, (ty, _))| format!("{} %{}", ty, p.name))
            .collect();
        let header_params = if rendered_params.is_empty() {
            "ptr %env".to_string()
        } else {
            format!("ptr %env, {}", rendered_params.join(", "))
        };
        self.raw(format_args!(
            "define {} @{}({}) {{",
            ret_ty, fn_name, header_params
        ))?;
        self.raw(format_args!("entry:"))?;
        self.block_terminated = false;
        self.push_scope();

        for (p, (ty, sem)) in params.iter().zip(&param_tys) {
            if *ty == LlvmType::Void {
                continue;
            }
            let addr = self.fresh_reg();
            self.ins(format_args!("{} = alloca {}", addr, ty))?;
            self.ins(format_args!("store {} %{}, ptr {}", ty, p.name, addr))?;
            self.declare_local(
                &p.name,
                LocalSlot {
                    addr,
                    ty: ty.clone(),
                    sem: sem.clone(),
                    mutable: false,
                    consumed: false,
                },
            );
        }

        // Bind captures: load each cell address out of the env record.
        for (i, (name, slot)) in captures.iter().enumerate() {
            let env_slot = self.fresh_reg();
            self.ins(format_args!(
                "{} = getelementptr ptr, ptr %env, i64 {}",
                env_slot, i
            ))?;
            let cell = self.fresh_reg();
            self.ins(format_args!("{} = load ptr, ptr {}", cell, env_slot))?;
            self.declare_local(
                name,
                LocalSlot {
                    addr: cell,
                    ty: slot.ty.clone(),
                    sem: slot.sem.clone(),
                    mutable: slot.mutable,
                    consumed: false,
                },
            );
        }

        let result = self.emit_block(body)?;
        self.emit_return(&result)?;
        self.raw(format_args!("}}"))?;
        self.raw(format_args!(""))?;
        self.pop_scope();

        let synthesized = std::mem::replace(&mut self.body, saved_body);
        self.synthesized.push_str(&synthesized);
        self.scopes = saved_scopes;
        self.current_ret = saved_ret;
        self.block_terminated = saved_terminated;
        self.current_label = saved_label;
        self.loop_stack = saved_loops;

        // Creation-site value: { code, env }
        let partial = self.fresh_reg();
        self.ins(format_args!(
            "{} = insertvalue {{ ptr, ptr }} undef, ptr @{}, 0",
            partial, fn_name
        ))?;
        let whole = self.fresh_reg();
        self.ins(format_args!(
            "{} = insertvalue {{ ptr, ptr }} {}, ptr {}, 1",
            whole, partial, env_repr
        ))?;
        Ok(EmitValue::new(
            whole,
            LlvmType::FatPtr,
            SemType::Func {
                params: param_tys.into_iter().map(|(_, sem)| sem).collect(),
                ret: Box::new(ret_sem),
            },
        ))
    }
}
