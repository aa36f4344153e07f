//! Monomorphization engine
//!
//! Generic structs, enums, functions, and impl methods are instantiated on
//! demand. Registration computes the mangled name, populates the field or
//! variant registries immediately (expression lowering consults them before
//! the body exists), and queues body emission. Queues drain FIFO between
//! top-level items and once more at end of module; each drained record may
//! enqueue more, and the loop runs to fixpoint.
//!
//! Enqueueing marks the mangled name as generated, so registering the same
//! instantiation twice leaves a single queue entry.

use super::llvm_ty::LlvmType;
use super::mangle::{mangle_generic, mangle_method};
use super::state::{EnumLayout, Emitter, FieldInfo, PayloadLayout, VariantLayout};
use crate::ast::{EnumDef, FuncDef, StructDef};
use crate::env::ImplSource;
use crate::error::CodegenError;
use crate::types::SemType;
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::debug;

/// Defensive bound on total drained instantiations. The type-argument
/// lattice of a well-formed program is finite, so hitting this means a
/// front-end bug.
const MAX_INSTANTIATIONS: usize = 65_536;

/// A queued generic function instantiation.
#[derive(Debug, Clone)]
pub(super) struct PendingFunc {
    pub base: String,
    pub mangled: String,
    pub subst: HashMap<String, SemType>,
}

/// A queued impl-method instantiation.
#[derive(Debug, Clone)]
pub(super) struct PendingMethod {
    /// Unmangled type name (`Container`)
    pub type_base: String,
    pub mangled_type: String,
    pub method: String,
    pub mangled_fn: String,
    pub subst: HashMap<String, SemType>,
    /// Preferred module for the drain-phase body search
    pub module_hint: Option<String>,
    pub source: ImplSource,
}

/// Resolved call target for an instantiated method.
#[derive(Debug, Clone)]
pub(super) struct MethodRef {
    pub mangled_fn: String,
    /// Lowered parameter types with their (substituted) semantic types
    pub params: Vec<(LlvmType, SemType)>,
    pub ret: LlvmType,
    pub ret_sem: SemType,
}

/// Map generic parameter names to concrete arguments. When the parameter
/// list and argument list disagree in length (a signature the caller only
/// partially knows), positional `T0`, `T1`, ... names are used as a last
/// resort.
pub(super) fn build_subst(
    type_params: &[String],
    args: &[SemType],
) -> HashMap<String, SemType> {
    let mut subst = HashMap::new();
    if type_params.len() == args.len() {
        for (name, arg) in type_params.iter().zip(args) {
            subst.insert(name.clone(), arg.clone());
        }
    } else {
        for (i, arg) in args.iter().enumerate() {
            subst.insert(format!("T{}", i), arg.clone());
        }
    }
    subst
}

impl Emitter<'_> {
    /// Register a struct instantiation. Field metadata is recorded and the
    /// `%struct` type declaration emitted the first time; the mangled name
    /// is returned every time.
    pub(super) fn register_struct(
        &mut self,
        name: &str,
        args: &[SemType],
    ) -> Result<String, CodegenError> {
        let mangled = mangle_generic(name, args);
        if self.struct_fields.contains_key(&mangled) {
            return Ok(mangled);
        }
        let def: StructDef = self
            .unit
            .lookup_struct(name)
            .cloned()
            .ok_or_else(|| CodegenError::unresolved(name, 0))?;

        // Placeholder first: recursive references through pointers only need
        // the mangled name, not the field list.
        self.struct_fields.insert(mangled.clone(), Vec::new());
        debug!(target: "tml_backend::mono", %mangled, "register struct");

        let subst = build_subst(&def.type_params, args);
        let mut fields = Vec::with_capacity(def.fields.len());
        for (index, field) in def.fields.iter().enumerate() {
            let sem = field.ty.substitute(&subst);
            let ty = self.lower_storage_type(&sem)?;
            fields.push(FieldInfo {
                name: field.name.clone(),
                index: index as u32,
                ty,
                sem,
            });
        }

        let rendered: Vec<String> = fields.iter().map(|f| f.ty.to_string()).collect();
        if rendered.is_empty() {
            writeln!(&mut self.type_decls, "%struct.{} = type {{}}", mangled)?;
        } else {
            writeln!(
                &mut self.type_decls,
                "%struct.{} = type {{ {} }}",
                mangled,
                rendered.join(", ")
            )?;
        }
        self.struct_fields.insert(mangled.clone(), fields);
        Ok(mangled)
    }

    /// Register an enum instantiation: assign variant tags in declaration
    /// order, fix the payload layout, and emit the type declaration. The
    /// layout chosen here is consulted by every later access.
    pub(super) fn register_enum(
        &mut self,
        name: &str,
        args: &[SemType],
    ) -> Result<String, CodegenError> {
        let mangled = mangle_generic(name, args);
        if self.enum_layouts.contains_key(&mangled) {
            return Ok(mangled);
        }
        let def: EnumDef = match self.unit.lookup_enum(name).cloned() {
            Some(def) => def,
            None => Self::builtin_enum_def(name)
                .ok_or_else(|| CodegenError::unresolved(name, 0))?,
        };
        debug!(target: "tml_backend::mono", %mangled, "register enum");

        let subst = build_subst(&def.type_params, args);
        let mut variants = Vec::with_capacity(def.variants.len());
        for (tag, variant) in def.variants.iter().enumerate() {
            let mut payload = Vec::with_capacity(variant.payload.len());
            for field_ty in &variant.payload {
                let sem = field_ty.substitute(&subst);
                let ty = self.lower_storage_type(&sem)?;
                payload.push((ty, sem));
            }
            variants.push(VariantLayout {
                name: variant.name.clone(),
                tag: tag as u32,
                payload,
            });
            self.enum_tags
                .insert(format!("{}::{}", mangled, variant.name), tag as u32);
        }

        let payload = Self::choose_payload_layout(&variants);
        let layout = EnumLayout { payload, variants };
        match layout.payload.slot_type() {
            None => writeln!(&mut self.type_decls, "%struct.{} = type {{ i32 }}", mangled)?,
            Some(slot) => writeln!(
                &mut self.type_decls,
                "%struct.{} = type {{ i32, {} }}",
                mangled, slot
            )?,
        }
        self.enum_layouts.insert(mangled.clone(), layout);
        Ok(mangled)
    }

    /// Pick compact `{ i32, T }` when the payload is a single known type
    /// across all data-carrying variants; otherwise the legacy
    /// `{ i32, [N x i64] }` sized to the largest variant.
    fn choose_payload_layout(variants: &[VariantLayout]) -> PayloadLayout {
        let carriers: Vec<&VariantLayout> =
            variants.iter().filter(|v| !v.payload.is_empty()).collect();
        if carriers.is_empty() {
            return PayloadLayout::None;
        }
        let single = carriers
            .iter()
            .all(|v| v.payload.len() == 1 && v.payload[0].0 == carriers[0].payload[0].0);
        if single {
            return PayloadLayout::Compact(carriers[0].payload[0].0.clone());
        }
        let words = carriers
            .iter()
            .map(|v| {
                v.payload
                    .iter()
                    .map(|(ty, _)| ty.store_size().div_ceil(8).max(1))
                    .sum::<u64>()
            })
            .max()
            .unwrap_or(1);
        PayloadLayout::Legacy(words as u32)
    }

    /// Fetch the recorded layout for a mangled enum; a miss here is a
    /// layout-agreement violation.
    pub(super) fn enum_layout(&self, mangled: &str) -> Result<&EnumLayout, CodegenError> {
        self.enum_layouts.get(mangled).ok_or_else(|| {
            CodegenError::PayloadLayoutMismatch {
                name: mangled.to_string(),
                recorded: "<none>".to_string(),
                found: "access before instantiation".to_string(),
            }
        })
    }

    /// Queue a generic function instantiation; returns its mangled name.
    pub(super) fn register_generic_func(
        &mut self,
        def: &FuncDef,
        type_args: &[SemType],
    ) -> Result<String, CodegenError> {
        let mangled = mangle_generic(&def.name, type_args);
        if self.generated.insert(mangled.clone()) {
            debug!(target: "tml_backend::mono", %mangled, "queue function");
            self.pending_funcs.push_back(PendingFunc {
                base: def.name.clone(),
                mangled: mangled.clone(),
                subst: build_subst(&def.type_params, type_args),
            });
        }
        Ok(mangled)
    }

    /// Resolve `Type::method` / `value.method()` against the impl registry
    /// and queue the instantiation. Returns `None` when no impl is visible;
    /// the caller then takes the library-internal path.
    pub(super) fn register_impl_method(
        &mut self,
        type_name: &str,
        type_args: &[SemType],
        method: &str,
    ) -> Result<Option<MethodRef>, CodegenError> {
        let Some((block, def, source)) = self.unit.lookup_impl_method(type_name, method) else {
            return Ok(None);
        };
        let block_params = block.type_params.clone();
        let def = def.clone();
        let module_hint = match &source {
            ImplSource::LibraryModule(path) => Some(path.clone()),
            _ => None,
        };

        let subst = build_subst(&block_params, type_args);
        let mangled_type = mangle_generic(type_name, type_args);
        let mangled_fn = mangle_method(&mangled_type, method);

        let mut params = Vec::with_capacity(def.params.len());
        for p in &def.params {
            let sem = p.ty.substitute(&subst);
            let ty = self.lower_type(&sem)?;
            params.push((ty, sem));
        }
        let ret_sem = def.ret.substitute(&subst);
        let ret = self.lower_type(&ret_sem)?;

        if self.generated.insert(mangled_fn.clone()) {
            debug!(target: "tml_backend::mono", %mangled_fn, "queue impl method");
            self.pending_methods.push_back(PendingMethod {
                type_base: type_name.to_string(),
                mangled_type,
                method: method.to_string(),
                mangled_fn: mangled_fn.clone(),
                subst,
                module_hint,
                source,
            });
        }

        Ok(Some(MethodRef {
            mangled_fn,
            params,
            ret,
            ret_sem,
        }))
    }

    /// Library-internal fallback: no
    /// visible impl body, so queue a record marked `Unknown` with a
    /// best-effort `ptr` signature and let the drain phase search again.
    pub(super) fn register_library_method(
        &mut self,
        type_name: &str,
        type_args: &[SemType],
        method: &str,
    ) -> MethodRef {
        let mangled_type = mangle_generic(type_name, type_args);
        let mangled_fn = mangle_method(&mangled_type, method);
        if self.generated.insert(mangled_fn.clone()) {
            debug!(target: "tml_backend::mono", %mangled_fn, "queue library-internal method");
            self.pending_methods.push_back(PendingMethod {
                type_base: type_name.to_string(),
                mangled_type,
                method: method.to_string(),
                mangled_fn: mangled_fn.clone(),
                subst: build_subst(&[], type_args),
                module_hint: self.unit.preferred_modules.get(type_name).cloned(),
                source: ImplSource::Unknown,
            });
        }
        MethodRef {
            mangled_fn,
            params: Vec::new(),
            ret: LlvmType::Ptr,
            ret_sem: SemType::ptr(SemType::unit(), false),
        }
    }

    /// Drain the pending queues to fixpoint. Called between top-level items
    /// and once more at end of module.
    pub(super) fn drain_pending(&mut self) -> Result<(), CodegenError> {
        let mut steps = 0usize;
        loop {
            if let Some(pending) = self.pending_funcs.pop_front() {
                steps += 1;
                if steps > MAX_INSTANTIATIONS {
                    return Err(CodegenError::MonomorphizationDepthExceeded(pending.mangled));
                }
                debug!(target: "tml_backend::mono", mangled = %pending.mangled, "drain function");
                let def = self
                    .unit
                    .lookup_func(&pending.base)
                    .cloned()
                    .ok_or_else(|| {
                        CodegenError::inconsistency(format!(
                            "queued instantiation `{}` has no visible definition",
                            pending.mangled
                        ))
                    })?;
                let symbol = Self::user_symbol(&pending.mangled);
                self.emit_monomorphized_func(&def, &symbol, pending.subst)?;
                continue;
            }
            if let Some(pending) = self.pending_methods.pop_front() {
                steps += 1;
                if steps > MAX_INSTANTIATIONS {
                    return Err(CodegenError::MonomorphizationDepthExceeded(
                        pending.mangled_fn,
                    ));
                }
                debug!(target: "tml_backend::mono", mangled = %pending.mangled_fn, "drain method");
                match self
                    .unit
                    .lookup_impl_method(&pending.type_base, &pending.method)
                {
                    Some((block, def, _)) => {
                        let block_params = block.type_params.clone();
                        let def = def.clone();
                        // Re-key the substitution against the declared
                        // parameter names now that the block is visible.
                        let subst = if pending.source == ImplSource::Unknown {
                            let args: Vec<SemType> = (0..block_params.len())
                                .map(|i| {
                                    pending
                                        .subst
                                        .get(&format!("T{}", i))
                                        .cloned()
                                        .unwrap_or(SemType::Param(format!("T{}", i)))
                                })
                                .collect();
                            build_subst(&block_params, &args)
                        } else {
                            pending.subst
                        };
                        self.emit_monomorphized_func(&def, &pending.mangled_fn, subst)?;
                    }
                    None => {
                        // Body lives in separately-emitted library IR; an
                        // external declaration keeps this unit linkable.
                        self.ensure_declared(&format!(
                            "declare ptr @{}(...)",
                            pending.mangled_fn
                        ))?;
                    }
                }
                continue;
            }
            break;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Field, Item, Program, StructDef, VariantDef};
    use crate::env::CompileUnit;
    use crate::codegen::state::EmitterConfig;
    use crate::types::PrimKind;

    fn unit_with(items: Vec<Item>) -> CompileUnit {
        CompileUnit::new(Program {
            module: "t".to_string(),
            file: "t.tml".to_string(),
            items,
        })
    }

    fn pair_def() -> StructDef {
        StructDef {
            name: "Pair".to_string(),
            type_params: vec!["T".to_string()],
            fields: vec![
                Field {
                    name: "first".to_string(),
                    ty: SemType::Param("T".to_string()),
                },
                Field {
                    name: "second".to_string(),
                    ty: SemType::Param("T".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_struct_registration_emits_one_type_decl() {
        let u = unit_with(vec![Item::Struct(pair_def())]);
        let mut e = Emitter::new(&u, EmitterConfig::default());
        let args = vec![SemType::prim(PrimKind::I32)];
        let first = e.register_struct("Pair", &args).unwrap();
        let second = e.register_struct("Pair", &args).unwrap();
        assert_eq!(first, "Pair__I32");
        assert_eq!(first, second);
        assert_eq!(
            e.type_decls.matches("%struct.Pair__I32 = type").count(),
            1,
            "duplicate registration must not re-emit the declaration"
        );
        assert!(e.type_decls.contains("%struct.Pair__I32 = type { i32, i32 }"));
    }

    #[test]
    fn test_field_registry_populated_at_registration() {
        let u = unit_with(vec![Item::Struct(pair_def())]);
        let mut e = Emitter::new(&u, EmitterConfig::default());
        e.register_struct("Pair", &[SemType::prim(PrimKind::I64)])
            .unwrap();
        let fields = &e.struct_fields["Pair__I64"];
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "first");
        assert_eq!(fields[1].index, 1);
        assert_eq!(fields[1].ty, LlvmType::i64());
    }

    #[test]
    fn test_builtin_maybe_gets_compact_layout() {
        let u = unit_with(vec![]);
        let mut e = Emitter::new(&u, EmitterConfig::default());
        let mangled = e
            .register_enum("Maybe", &[SemType::prim(PrimKind::I32)])
            .unwrap();
        assert_eq!(mangled, "Maybe__I32");
        let layout = e.enum_layout("Maybe__I32").unwrap();
        assert_eq!(layout.payload, PayloadLayout::Compact(LlvmType::i32()));
        assert!(e.type_decls.contains("%struct.Maybe__I32 = type { i32, i32 }"));
        assert_eq!(e.enum_tags["Maybe__I32::Just"], 0);
        assert_eq!(e.enum_tags["Maybe__I32::Nothing"], 1);
    }

    #[test]
    fn test_heterogeneous_enum_gets_legacy_layout() {
        let u = unit_with(vec![Item::Enum(crate::ast::EnumDef {
            name: "Shape".to_string(),
            type_params: vec![],
            variants: vec![
                VariantDef {
                    name: "Circle".to_string(),
                    payload: vec![SemType::prim(PrimKind::F64)],
                },
                VariantDef {
                    name: "Rect".to_string(),
                    payload: vec![SemType::prim(PrimKind::I64), SemType::prim(PrimKind::I64)],
                },
            ],
        })]);
        let mut e = Emitter::new(&u, EmitterConfig::default());
        e.register_enum("Shape", &[]).unwrap();
        let layout = e.enum_layout("Shape").unwrap();
        assert_eq!(layout.payload, PayloadLayout::Legacy(2));
        assert!(e.type_decls.contains("%struct.Shape = type { i32, [2 x i64] }"));
    }

    #[test]
    fn test_positional_subst_fallback() {
        let subst = build_subst(&[], &[SemType::prim(PrimKind::I8)]);
        assert_eq!(subst.get("T0"), Some(&SemType::prim(PrimKind::I8)));
    }

    #[test]
    fn test_layout_lookup_before_instantiation_is_mismatch() {
        let u = unit_with(vec![]);
        let e = Emitter::new(&u, EmitterConfig::default());
        assert!(matches!(
            e.enum_layout("Maybe__I32"),
            Err(CodegenError::PayloadLayoutMismatch { .. })
        ));
    }
}
