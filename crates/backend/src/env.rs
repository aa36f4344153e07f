//! Compilation environment
//!
//! Symbol lookup across the local translation unit and its imported modules.
//! The type checker fills this in before the emitter runs; the emitter only
//! reads it.
//!
//! Lookup is two-pass when a preferred module path is known for a symbol:
//! first restricted to that module, then unrestricted. This disambiguates
//! types with the same short name defined in different modules
//! (`core::ops::range::Range` vs `core::range::Range`). Import iteration
//! order is the order the driver listed the modules in, so lookup is
//! deterministic.

use crate::ast::{EnumDef, FuncDef, ImplBlock, Item, Program, StructDef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a generic impl's body lives, relative to the current unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImplSource {
    /// Defined in the current translation unit
    Local,
    /// Defined in an imported module with this path
    LibraryModule(String),
    /// Not found yet; the body may surface during the drain phase
    Unknown,
}

/// The exported surface of one imported module, bodies included so the
/// emitter can monomorphize library generics on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleExports {
    pub path: String,
    pub functions: Vec<FuncDef>,
    pub structs: Vec<StructDef>,
    pub enums: Vec<EnumDef>,
    pub impls: Vec<ImplBlock>,
}

/// Everything the emitter needs for one translation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileUnit {
    pub program: Program,
    /// Imported modules in deterministic (driver-listed) order
    pub imports: Vec<ModuleExports>,
    /// Resolution hints: short type name -> module path it resolved to
    pub preferred_modules: HashMap<String, String>,
}

impl CompileUnit {
    pub fn new(program: Program) -> Self {
        CompileUnit {
            program,
            imports: Vec::new(),
            preferred_modules: HashMap::new(),
        }
    }

    /// Find a function by name: local unit first, then imports in order.
    pub fn lookup_func(&self, name: &str) -> Option<&FuncDef> {
        if let Some(f) = self.program.find_func(name) {
            return Some(f);
        }
        self.imports
            .iter()
            .find_map(|m| m.functions.iter().find(|f| f.name == name))
    }

    /// Find a struct definition, honoring a preferred-module hint.
    pub fn lookup_struct(&self, name: &str) -> Option<&StructDef> {
        let local = self.program.items.iter().find_map(|item| match item {
            Item::Struct(s) if s.name == name => Some(s),
            _ => None,
        });
        if local.is_some() {
            return local;
        }
        if let Some(hint) = self.preferred_modules.get(name)
            && let Some(found) = self
                .imports
                .iter()
                .filter(|m| &m.path == hint)
                .find_map(|m| m.structs.iter().find(|s| s.name == name))
        {
            return Some(found);
        }
        self.imports
            .iter()
            .find_map(|m| m.structs.iter().find(|s| s.name == name))
    }

    /// Find an enum definition, honoring a preferred-module hint.
    pub fn lookup_enum(&self, name: &str) -> Option<&EnumDef> {
        let local = self.program.items.iter().find_map(|item| match item {
            Item::Enum(e) if e.name == name => Some(e),
            _ => None,
        });
        if local.is_some() {
            return local;
        }
        if let Some(hint) = self.preferred_modules.get(name)
            && let Some(found) = self
                .imports
                .iter()
                .filter(|m| &m.path == hint)
                .find_map(|m| m.enums.iter().find(|e| e.name == name))
        {
            return Some(found);
        }
        self.imports
            .iter()
            .find_map(|m| m.enums.iter().find(|e| e.name == name))
    }

    /// Find the enum that declares a given variant name. Used to resolve
    /// bare constructors (`Just(1)`) when no expected type is in context.
    pub fn lookup_enum_with_variant(&self, variant: &str) -> Option<&EnumDef> {
        let local = self.program.items.iter().find_map(|item| match item {
            Item::Enum(e) if e.variant(variant).is_some() => Some(e),
            _ => None,
        });
        if local.is_some() {
            return local;
        }
        self.imports
            .iter()
            .find_map(|m| m.enums.iter().find(|e| e.variant(variant).is_some()))
    }

    /// Find an impl block declaring `method` for `type_name`.
    ///
    /// A local impl always wins over a library impl for the same type.
    pub fn lookup_impl_method(
        &self,
        type_name: &str,
        method: &str,
    ) -> Option<(&ImplBlock, &FuncDef, ImplSource)> {
        for item in &self.program.items {
            if let Item::Impl(block) = item
                && block.type_name == type_name
                && let Some(m) = block.method(method)
            {
                return Some((block, m, ImplSource::Local));
            }
        }
        // Preferred module pass
        if let Some(hint) = self.preferred_modules.get(type_name) {
            for module in self.imports.iter().filter(|m| &m.path == hint) {
                for block in &module.impls {
                    if block.type_name == type_name
                        && let Some(m) = block.method(method)
                    {
                        return Some((block, m, ImplSource::LibraryModule(module.path.clone())));
                    }
                }
            }
        }
        for module in &self.imports {
            for block in &module.impls {
                if block.type_name == type_name
                    && let Some(m) = block.method(method)
                {
                    return Some((block, m, ImplSource::LibraryModule(module.path.clone())));
                }
            }
        }
        None
    }

    /// True if the unit (or an import) defines a `drop` method for the type.
    pub fn has_drop_impl(&self, type_name: &str) -> bool {
        self.lookup_impl_method(type_name, "drop").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Block, Field, Program, VariantDef};
    use crate::types::{PrimKind, SemType};

    fn empty_program() -> Program {
        Program {
            module: "app".to_string(),
            file: "app.tml".to_string(),
            items: vec![],
        }
    }

    fn range_struct() -> StructDef {
        StructDef {
            name: "Range".to_string(),
            type_params: vec![],
            fields: vec![Field {
                name: "start".to_string(),
                ty: SemType::prim(PrimKind::I64),
            }],
        }
    }

    #[test]
    fn test_preferred_module_wins_over_import_order() {
        let mut unit = CompileUnit::new(empty_program());
        // Two modules both export `Range`; the hint points at the second.
        unit.imports.push(ModuleExports {
            path: "core::range".to_string(),
            functions: vec![],
            structs: vec![range_struct()],
            enums: vec![],
            impls: vec![],
        });
        let mut preferred = range_struct();
        preferred.fields.push(Field {
            name: "end".to_string(),
            ty: SemType::prim(PrimKind::I64),
        });
        unit.imports.push(ModuleExports {
            path: "core::ops::range".to_string(),
            functions: vec![],
            structs: vec![preferred],
            enums: vec![],
            impls: vec![],
        });
        unit.preferred_modules
            .insert("Range".to_string(), "core::ops::range".to_string());

        let found = unit.lookup_struct("Range").unwrap();
        assert_eq!(found.fields.len(), 2, "hinted module should win");
    }

    #[test]
    fn test_fallback_search_without_hint() {
        let mut unit = CompileUnit::new(empty_program());
        unit.imports.push(ModuleExports {
            path: "core::range".to_string(),
            functions: vec![],
            structs: vec![range_struct()],
            enums: vec![],
            impls: vec![],
        });
        assert!(unit.lookup_struct("Range").is_some());
        assert!(unit.lookup_struct("Missing").is_none());
    }

    #[test]
    fn test_local_impl_beats_library_impl() {
        let method = FuncDef {
            name: "get".to_string(),
            type_params: vec![],
            params: vec![],
            ret: SemType::unit(),
            body: Block::empty(),
            line: 1,
        };
        let mut unit = CompileUnit::new(Program {
            module: "app".to_string(),
            file: "app.tml".to_string(),
            items: vec![Item::Impl(ImplBlock {
                type_name: "Container".to_string(),
                type_params: vec!["T".to_string()],
                behavior: None,
                methods: vec![method.clone()],
            })],
        });
        unit.imports.push(ModuleExports {
            path: "core::container".to_string(),
            functions: vec![],
            structs: vec![],
            enums: vec![],
            impls: vec![ImplBlock {
                type_name: "Container".to_string(),
                type_params: vec!["T".to_string()],
                behavior: None,
                methods: vec![method],
            }],
        });

        let (_, _, source) = unit.lookup_impl_method("Container", "get").unwrap();
        assert_eq!(source, ImplSource::Local);
    }

    #[test]
    fn test_lookup_enum_with_variant() {
        let mut unit = CompileUnit::new(empty_program());
        unit.imports.push(ModuleExports {
            path: "core::maybe".to_string(),
            functions: vec![],
            structs: vec![],
            impls: vec![],
            enums: vec![EnumDef {
                name: "Maybe".to_string(),
                type_params: vec!["T".to_string()],
                variants: vec![
                    VariantDef {
                        name: "Just".to_string(),
                        payload: vec![SemType::Param("T".to_string())],
                    },
                    VariantDef {
                        name: "Nothing".to_string(),
                        payload: vec![],
                    },
                ],
            }],
        });
        assert_eq!(
            unit.lookup_enum_with_variant("Just").map(|e| e.name.as_str()),
            Some("Maybe")
        );
        assert!(unit.lookup_enum_with_variant("Ready").is_none());
    }
}
