//! Top-level emission
//!
//! Items are processed in source order; the pending-instantiation queues
//! drain after every item and once more at end of module, so generic bodies
//! land deterministically right after the item that first demanded them.
//! The final text is assembled in a fixed section order: declares, type
//! declarations, string globals, function bodies, synthesized closures.

use super::llvm_ty::LlvmType;
use super::mangle::mangle_method;
use super::state::{Emitter, LocalSlot};
use crate::ast::{FuncDef, Item};
use crate::error::CodegenError;
use crate::types::SemType;
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::debug;

impl Emitter<'_> {
    /// Emit the whole translation unit and return the IR text.
    pub fn emit_program(&mut self) -> Result<String, CodegenError> {
        if self.config.library_mode {
            self.declare_all_runtime()?;
        }

        let items = self.unit.program.items.clone();
        for item in &items {
            match item {
                Item::Struct(def) => {
                    if def.type_params.is_empty() {
                        self.register_struct(&def.name, &[])?;
                    }
                }
                Item::Enum(def) => {
                    if def.type_params.is_empty() {
                        self.register_enum(&def.name, &[])?;
                    }
                }
                Item::Func(def) => {
                    if !def.is_generic() {
                        let symbol = Self::user_symbol(&def.name);
                        if self.generated.insert(symbol.clone()) {
                            self.emit_monomorphized_func(def, &symbol, HashMap::new())?;
                        }
                    }
                }
                Item::Impl(block) => {
                    if block.type_params.is_empty() {
                        for method in &block.methods {
                            if method.is_generic() {
                                continue;
                            }
                            let symbol = mangle_method(&block.type_name, &method.name);
                            if self.generated.insert(symbol.clone()) {
                                self.emit_monomorphized_func(method, &symbol, HashMap::new())?;
                            }
                        }
                    }
                }
            }
            self.drain_pending()?;
        }
        self.drain_pending()?;

        if !self.config.no_main_wrapper && self.unit.program.find_func("main").is_some() {
            self.emit_main_wrapper()?;
        }

        Ok(self.finish())
    }

    /// Emit one function definition under a generic substitution. The
    /// symbol is final (prefixing is the caller's concern: user functions
    /// carry `tml_`, impl methods use their mangled type prefix).
    pub(super) fn emit_monomorphized_func(
        &mut self,
        def: &FuncDef,
        symbol: &str,
        subst: HashMap<String, SemType>,
    ) -> Result<(), CodegenError> {
        debug!(target: "tml_backend::emit", %symbol, "emit function");
        let saved_subst = std::mem::replace(&mut self.subst, subst);

        let ret_sem = def.ret.substitute(&self.subst);
        let ret_ty = self.lower_type(&ret_sem)?;
        let mut params = Vec::with_capacity(def.params.len());
        for p in &def.params {
            let sem = p.ty.substitute(&self.subst);
            let ty = self.lower_type(&sem)?;
            params.push((p.name.clone(), ty, sem));
        }

        self.current_ret = ret_ty.clone();
        self.loop_stack.clear();
        self.scopes.clear();
        self.current_label = "entry".to_string();

        let rendered: Vec<String> = params
            .iter()
            .filter(|(_, ty, _)| *ty != LlvmType::Void)
            .map(|(name, ty, _)| format!("{} %{}", ty, name))
            .collect();
        self.raw(format_args!(
            "define {} @{}({}) {{",
            ret_ty,
            symbol,
            rendered.join(", ")
        ))?;
        self.raw(format_args!("entry:"))?;
        self.block_terminated = false;

        self.push_scope();
        for (name, ty, sem) in &params {
            if *ty == LlvmType::Void {
                continue;
            }
            let addr = self.fresh_reg();
            self.ins(format_args!("{} = alloca {}", addr, ty))?;
            self.ins(format_args!("store {} %{}, ptr {}", ty, name, addr))?;
            self.declare_local(
                name,
                LocalSlot {
                    addr,
                    ty: ty.clone(),
                    sem: sem.clone(),
                    mutable: false,
                    consumed: false,
                },
            );
        }

        let result = self.emit_block(&def.body)?;
        if !self.block_terminated {
            self.emit_return(&result)?;
        }
        self.pop_scope();

        self.raw(format_args!("}}"))?;
        self.raw(format_args!(""))?;
        self.subst = saved_subst;
        Ok(())
    }

    /// `define i32 @main()` calling the user's entry point. A Unit main
    /// returns 0; an I32 main's result becomes the exit code.
    fn emit_main_wrapper(&mut self) -> Result<(), CodegenError> {
        let Some(def) = self.unit.program.find_func("main") else {
            return Ok(());
        };
        let ret_sem = def.ret.clone();
        let ret_ty = self.lower_type(&ret_sem)?;
        let symbol = Self::user_symbol("main");

        self.raw(format_args!("define i32 @main() {{"))?;
        self.raw(format_args!("entry:"))?;
        self.block_terminated = false;
        match &ret_ty {
            LlvmType::Void => {
                self.ins(format_args!("call void @{}()", symbol))?;
                self.term(format_args!("ret i32 0"))?;
            }
            LlvmType::Int { bits: 32 } => {
                let reg = self.fresh_reg();
                self.ins(format_args!("{} = call i32 @{}()", reg, symbol))?;
                self.term(format_args!("ret i32 {}", reg))?;
            }
            other => {
                let reg = self.fresh_reg();
                self.ins(format_args!("{} = call {} @{}()", reg, other, symbol))?;
                self.term(format_args!("ret i32 0"))?;
            }
        }
        self.raw(format_args!("}}"))?;
        self.raw(format_args!(""))?;
        Ok(())
    }

    /// Assemble the output sections. Section order is fixed, so identical
    /// input produces byte-identical IR.
    pub(super) fn finish(&mut self) -> String {
        let mut out = String::new();
        let _ = writeln!(&mut out, "; module: {}", self.unit.program.module);
        let _ = writeln!(&mut out, "; source: {}", self.unit.program.file);
        let _ = writeln!(&mut out);
        for section in [
            &self.declares,
            &self.type_decls,
            &self.string_globals,
            &self.body,
            &self.synthesized,
        ] {
            if !section.is_empty() {
                out.push_str(section);
                out.push('\n');
            }
        }
        out
    }
}
