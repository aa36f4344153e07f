//! Emitter state and core helpers
//!
//! One `Emitter` per translation unit. All output flows through the line
//! helpers here, which enforce block well-formedness: once a terminator has
//! been written, nothing else lands until a new label opens. Fresh register
//! and label counters never reset, so SSA names are unique for the whole
//! unit.

use super::instantiate::{PendingFunc, PendingMethod};
use super::llvm_ty::{FloatKind, LlvmType, lower_prim};
use crate::ast::EnumDef;
use crate::env::CompileUnit;
use crate::error::CodegenError;
use crate::types::{PrimKind, SemType};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;

/// Result of lowering one expression: the SSA register (or literal) holding
/// the value, its LLVM type, its semantic type, and whether integer
/// operations on it should be unsigned.
#[derive(Debug, Clone)]
pub struct EmitValue {
    pub repr: String,
    pub ty: LlvmType,
    pub sem: SemType,
    pub unsigned: bool,
}

impl EmitValue {
    pub fn unit() -> Self {
        EmitValue {
            repr: "0".to_string(),
            ty: LlvmType::Void,
            sem: SemType::unit(),
            unsigned: false,
        }
    }

    pub fn new(repr: impl Into<String>, ty: LlvmType, sem: SemType) -> Self {
        let unsigned = sem.is_unsigned();
        EmitValue {
            repr: repr.into(),
            ty,
            sem,
            unsigned,
        }
    }
}

/// A named local: the alloca holding it plus its types.
#[derive(Debug, Clone)]
pub struct LocalSlot {
    pub addr: String,
    pub ty: LlvmType,
    pub sem: SemType,
    pub mutable: bool,
    /// Set when the value has been moved or explicitly dropped; suppresses
    /// the scope-exit drop.
    pub consumed: bool,
}

/// Struct field metadata, registered at instantiation time.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub index: u32,
    pub ty: LlvmType,
    pub sem: SemType,
}

/// Payload storage strategy for a tagged enum, fixed at first instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadLayout {
    /// No variant carries data: `{ i32 }`
    None,
    /// Single known payload type: `{ i32, T }`
    Compact(LlvmType),
    /// Heterogeneous payloads: `{ i32, [N x i64] }`
    Legacy(u32),
}

impl PayloadLayout {
    /// Render the payload slot's LLVM type, if there is one.
    pub fn slot_type(&self) -> Option<String> {
        match self {
            PayloadLayout::None => None,
            PayloadLayout::Compact(ty) => Some(ty.to_string()),
            PayloadLayout::Legacy(words) => Some(format!("[{} x i64]", words)),
        }
    }
}

/// Everything recorded about one instantiated enum, keyed by mangled name
/// in the registry.
#[derive(Debug, Clone)]
pub struct EnumLayout {
    pub payload: PayloadLayout,
    pub variants: Vec<VariantLayout>,
}

#[derive(Debug, Clone)]
pub struct VariantLayout {
    pub name: String,
    pub tag: u32,
    /// Lowered payload fields, in declaration order
    pub payload: Vec<(LlvmType, SemType)>,
}

impl EnumLayout {
    pub fn variant(&self, name: &str) -> Option<&VariantLayout> {
        self.variants.iter().find(|v| v.name == name)
    }
}

/// Emitter configuration.
#[derive(Debug, Clone, Default)]
pub struct EmitterConfig {
    /// Emit the conservative runtime declaration prelude up front instead of
    /// on demand (library-IR-only builds).
    pub library_mode: bool,
    /// Suppress the `i32 @main()` wrapper even when the unit defines `main`.
    pub no_main_wrapper: bool,
}

impl EmitterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library_mode(mut self, on: bool) -> Self {
        self.library_mode = on;
        self
    }

    pub fn with_main_wrapper(mut self, on: bool) -> Self {
        self.no_main_wrapper = !on;
        self
    }
}

pub struct Emitter<'a> {
    pub(super) unit: &'a CompileUnit,
    pub(super) config: EmitterConfig,

    // Output sections, assembled in finish()
    pub(super) body: String,
    pub(super) synthesized: String,
    pub(super) type_decls: String,
    pub(super) string_globals: String,
    pub(super) declares: String,
    pub(super) declared: HashSet<String>,

    // Counters (never reset; registers are unique per unit)
    reg_counter: usize,
    label_counter: usize,
    pub(super) string_counter: usize,
    pub(super) closure_counter: usize,

    /// Once a block is terminated, nothing is emitted until a label opens.
    pub(super) block_terminated: bool,
    /// Name of the currently open block, for phi predecessors.
    pub(super) current_label: String,

    // Per-function context
    pub(super) scopes: Vec<Vec<(String, LocalSlot)>>,
    pub(super) current_ret: LlvmType,
    pub(super) loop_stack: Vec<(String, String)>, // (continue target, break target)

    /// Active generic substitution while emitting a monomorphized body.
    pub(super) subst: HashMap<String, SemType>,
    /// Contextual enum type for bare `Nothing`/`None` constructors.
    /// Reader-style: installed and restored around nested expressions.
    pub(super) expected_enum: Option<SemType>,

    // Threaded expression metadata (mirrors the returned EmitValue)
    pub(super) last_expr_ty: LlvmType,
    pub(super) last_expr_unsigned: bool,

    // Pools and registries
    pub(super) string_pool: HashMap<String, String>,
    pub(super) struct_fields: HashMap<String, Vec<FieldInfo>>,
    pub(super) enum_layouts: HashMap<String, EnumLayout>,
    /// `Maybe__I32::Just` -> 0
    pub(super) enum_tags: HashMap<String, u32>,

    // Monomorphization worklist
    pub(super) pending_funcs: VecDeque<PendingFunc>,
    pub(super) pending_methods: VecDeque<PendingMethod>,
    /// Mangled symbols already queued or emitted (enqueue marks generated)
    pub(super) generated: HashSet<String>,
}

impl<'a> Emitter<'a> {
    pub fn new(unit: &'a CompileUnit, config: EmitterConfig) -> Self {
        Emitter {
            unit,
            config,
            body: String::new(),
            synthesized: String::new(),
            type_decls: String::new(),
            string_globals: String::new(),
            declares: String::new(),
            declared: HashSet::new(),
            reg_counter: 0,
            label_counter: 0,
            string_counter: 0,
            closure_counter: 0,
            block_terminated: false,
            current_label: "entry".to_string(),
            scopes: Vec::new(),
            current_ret: LlvmType::Void,
            loop_stack: Vec::new(),
            subst: HashMap::new(),
            expected_enum: None,
            last_expr_ty: LlvmType::Void,
            last_expr_unsigned: false,
            string_pool: HashMap::new(),
            struct_fields: HashMap::new(),
            enum_layouts: HashMap::new(),
            enum_tags: HashMap::new(),
            pending_funcs: VecDeque::new(),
            pending_methods: VecDeque::new(),
            generated: HashSet::new(),
        }
    }

    // ---- line helpers ----------------------------------------------------

    /// Fresh SSA register, `%t`-prefixed so numbering never has to be
    /// consecutive.
    pub(super) fn fresh_reg(&mut self) -> String {
        let name = format!("%t{}", self.reg_counter);
        self.reg_counter += 1;
        name
    }

    /// Fresh block label with a readable prefix.
    pub(super) fn fresh_label(&mut self, prefix: &str) -> String {
        let name = format!("{}{}", prefix, self.label_counter);
        self.label_counter += 1;
        name
    }

    /// Emit one instruction line (indented). Silently dropped if the current
    /// block is already terminated.
    pub(super) fn ins(&mut self, args: std::fmt::Arguments<'_>) -> Result<(), CodegenError> {
        if !self.block_terminated {
            self.body.push_str("  ");
            self.body.write_fmt(args)?;
            self.body.push('\n');
        }
        Ok(())
    }

    /// Emit a terminator (`ret`, `br`, `unreachable`) and close the block.
    pub(super) fn term(&mut self, args: std::fmt::Arguments<'_>) -> Result<(), CodegenError> {
        if !self.block_terminated {
            self.body.push_str("  ");
            self.body.write_fmt(args)?;
            self.body.push('\n');
            self.block_terminated = true;
        }
        Ok(())
    }

    /// Open a new basic block. If the previous block is still open, fall
    /// through with an explicit branch first (LLVM has no implicit
    /// fallthrough).
    pub(super) fn open_label(&mut self, label: &str) -> Result<(), CodegenError> {
        if !self.block_terminated {
            writeln!(&mut self.body, "  br label %{}", label)?;
        }
        writeln!(&mut self.body, "{}:", label)?;
        self.block_terminated = false;
        self.current_label = label.to_string();
        Ok(())
    }

    /// Unindented output (function headers, closing braces).
    pub(super) fn raw(&mut self, args: std::fmt::Arguments<'_>) -> Result<(), CodegenError> {
        self.body.write_fmt(args)?;
        self.body.push('\n');
        Ok(())
    }

    /// Record a `declare` line, emitted once per unit.
    pub(super) fn ensure_declared(&mut self, decl: &str) -> Result<(), CodegenError> {
        if self.declared.insert(decl.to_string()) {
            writeln!(&mut self.declares, "{}", decl)?;
        }
        Ok(())
    }

    // ---- scopes ----------------------------------------------------------

    pub(super) fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    pub(super) fn pop_scope(&mut self) -> Vec<(String, LocalSlot)> {
        self.scopes.pop().unwrap_or_default()
    }

    pub(super) fn declare_local(&mut self, name: &str, slot: LocalSlot) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name.to_string(), slot));
        }
    }

    pub(super) fn lookup_local(&self, name: &str) -> Option<&LocalSlot> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.iter().rev().find(|(n, _)| n == name).map(|(_, s)| s))
    }

    /// Redirect a local to a new address. Used when a closure hoists a
    /// mutable capture to the heap: both the closure and the enclosing
    /// function must read and write the same cell afterwards.
    pub(super) fn update_local_addr(&mut self, name: &str, addr: String) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some((_, slot)) = scope.iter_mut().rev().find(|(n, _)| n == name) {
                slot.addr = addr;
                return;
            }
        }
    }

    pub(super) fn mark_consumed(&mut self, name: &str) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some((_, slot)) = scope.iter_mut().rev().find(|(n, _)| n == name) {
                slot.consumed = true;
                return;
            }
        }
    }

    /// Install an expected-enum context for the duration of `f`, restoring
    /// the previous context on exit.
    pub(super) fn with_expected_enum<R>(
        &mut self,
        expected: Option<SemType>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let saved = std::mem::replace(&mut self.expected_enum, expected);
        let result = f(self);
        self.expected_enum = saved;
        result
    }

    /// Record the result type of the expression just emitted.
    pub(super) fn note_expr(&mut self, value: &EmitValue) {
        self.last_expr_ty = value.ty.clone();
        self.last_expr_unsigned = value.unsigned;
    }

    /// Type and signedness of the most recently emitted expression.
    pub fn last_expr(&self) -> (&LlvmType, bool) {
        (&self.last_expr_ty, self.last_expr_unsigned)
    }

    // ---- type lowering ---------------------------------------------------

    /// Apply the active substitution, then lower to an LLVM value type.
    /// Named types are registered (and their instantiation queued) as a side
    /// effect, keeping the monomorphization closure invariant.
    pub(super) fn lower_type(&mut self, ty: &SemType) -> Result<LlvmType, CodegenError> {
        let ty = ty.substitute(&self.subst);
        Ok(match &ty {
            SemType::Prim(kind) => lower_prim(*kind),
            SemType::Ptr { .. } | SemType::Ref { .. } => LlvmType::Ptr,
            SemType::Named { name, args, .. } => {
                if self.unit.lookup_enum(name).is_some() || self.is_builtin_enum(name) {
                    let layout = self.register_enum(name, args)?;
                    LlvmType::Struct(layout)
                } else if self.unit.lookup_struct(name).is_some() {
                    LlvmType::Struct(self.register_struct(name, args)?)
                } else {
                    // Library type with no visible definition; its values
                    // are handled behind a pointer.
                    LlvmType::Ptr
                }
            }
            // An unresolved parameter surviving substitution means the
            // caller lacked knowledge; fall back to the best-effort `ptr`
            // signature so the drain phase can still find the body.
            SemType::Param(_) => LlvmType::Ptr,
            SemType::Func { .. } => LlvmType::FatPtr,
            SemType::Tuple(_) => LlvmType::Ptr,
            SemType::Array { .. } => LlvmType::Ptr,
        })
    }

    /// Lowering for struct-field storage: `Unit` becomes a zero-sized
    /// placeholder instead of `void`.
    pub(super) fn lower_storage_type(&mut self, ty: &SemType) -> Result<LlvmType, CodegenError> {
        let lowered = self.lower_type(ty)?;
        Ok(match lowered {
            LlvmType::Void => LlvmType::ZeroSized,
            other => other,
        })
    }

    pub(super) fn is_builtin_enum(&self, name: &str) -> bool {
        matches!(name, "Maybe" | "Outcome" | "Poll")
            && self.unit.lookup_enum(name).is_none()
    }

    /// Built-in definitions for the pervasive language enums, used when the
    /// unit compiles without the core library in scope.
    pub(super) fn builtin_enum_def(name: &str) -> Option<EnumDef> {
        use crate::ast::VariantDef;
        let t = || SemType::Param("T".to_string());
        match name {
            "Maybe" => Some(EnumDef {
                name: "Maybe".to_string(),
                type_params: vec!["T".to_string()],
                variants: vec![
                    VariantDef {
                        name: "Just".to_string(),
                        payload: vec![t()],
                    },
                    VariantDef {
                        name: "Nothing".to_string(),
                        payload: vec![],
                    },
                ],
            }),
            "Outcome" => Some(EnumDef {
                name: "Outcome".to_string(),
                type_params: vec!["T".to_string(), "E".to_string()],
                variants: vec![
                    VariantDef {
                        name: "Ok".to_string(),
                        payload: vec![t()],
                    },
                    VariantDef {
                        name: "Err".to_string(),
                        payload: vec![SemType::Param("E".to_string())],
                    },
                ],
            }),
            "Poll" => Some(EnumDef {
                name: "Poll".to_string(),
                type_params: vec!["T".to_string()],
                variants: vec![
                    VariantDef {
                        name: "Ready".to_string(),
                        payload: vec![t()],
                    },
                    VariantDef {
                        name: "Pending".to_string(),
                        payload: vec![],
                    },
                ],
            }),
            _ => None,
        }
    }

    // ---- coercion --------------------------------------------------------

    /// Coerce a value to the expected LLVM type at a call/store boundary.
    /// Integer widths extend (`sext`/`zext` by signedness) or truncate;
    /// bare `ptr` wraps into a fat pointer `{ value, null }`; `i64`
    /// addresses convert with `inttoptr`; floats extend with `fpext`.
    pub(super) fn coerce_to(
        &mut self,
        value: &EmitValue,
        expected: &LlvmType,
    ) -> Result<String, CodegenError> {
        if value.ty == *expected {
            return Ok(value.repr.clone());
        }
        match (&value.ty, expected) {
            (LlvmType::Int { bits: have }, LlvmType::Int { bits: want }) => {
                let reg = self.fresh_reg();
                if have < want {
                    let op = if value.unsigned { "zext" } else { "sext" };
                    self.ins(format_args!(
                        "{} = {} i{} {} to i{}",
                        reg, op, have, value.repr, want
                    ))?;
                } else {
                    self.ins(format_args!(
                        "{} = trunc i{} {} to i{}",
                        reg, have, value.repr, want
                    ))?;
                }
                Ok(reg)
            }
            (LlvmType::Ptr, LlvmType::FatPtr) => {
                let partial = self.fresh_reg();
                self.ins(format_args!(
                    "{} = insertvalue {{ ptr, ptr }} undef, ptr {}, 0",
                    partial, value.repr
                ))?;
                let whole = self.fresh_reg();
                self.ins(format_args!(
                    "{} = insertvalue {{ ptr, ptr }} {}, ptr null, 1",
                    whole, partial
                ))?;
                Ok(whole)
            }
            (LlvmType::Int { bits }, LlvmType::Ptr) => {
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = inttoptr i{} {} to ptr",
                    reg, bits, value.repr
                ))?;
                Ok(reg)
            }
            (LlvmType::Ptr, LlvmType::Int { bits }) => {
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = ptrtoint ptr {} to i{}",
                    reg, value.repr, bits
                ))?;
                Ok(reg)
            }
            (LlvmType::Float(FloatKind::F32), LlvmType::Float(FloatKind::F64)) => {
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = fpext float {} to double",
                    reg, value.repr
                ))?;
                Ok(reg)
            }
            (LlvmType::Float(FloatKind::F64), LlvmType::Float(FloatKind::F32)) => {
                let reg = self.fresh_reg();
                self.ins(format_args!(
                    "{} = fptrunc double {} to float",
                    reg, value.repr
                ))?;
                Ok(reg)
            }
            _ => Ok(value.repr.clone()),
        }
    }

    /// Bring two integer operands to a common width (the larger), extending
    /// per each operand's signedness. Returns the common reprs and type.
    pub(super) fn unify_int_widths(
        &mut self,
        lhs: &EmitValue,
        rhs: &EmitValue,
    ) -> Result<(String, String, LlvmType), CodegenError> {
        match (lhs.ty.int_bits(), rhs.ty.int_bits()) {
            (Some(a), Some(b)) if a != b => {
                let wide = LlvmType::Int { bits: a.max(b) };
                let l = self.coerce_to(lhs, &wide)?;
                let r = self.coerce_to(rhs, &wide)?;
                Ok((l, r, wide))
            }
            _ => Ok((lhs.repr.clone(), rhs.repr.clone(), lhs.ty.clone())),
        }
    }

    // ---- misc ------------------------------------------------------------

    /// Shared sizing helper for `size_of`/`align_of`. Returns compile-time
    /// (size, align) for primitives; `None` for aggregates (those use the
    /// GEP-null sequence at runtime).
    pub(super) fn primitive_size_align(ty: &SemType) -> Option<(u64, u64)> {
        match ty {
            SemType::Prim(kind) => Some(kind.size_align()),
            SemType::Ptr { .. } | SemType::Ref { .. } | SemType::Func { .. } => Some((8, 8)),
            _ => None,
        }
    }

    /// Format a float literal so LLVM's parser reproduces the exact value.
    /// Finite values use shortest-roundtrip decimal; non-finite values use
    /// the IEEE-754 hex form.
    pub(super) fn format_float(value: f64) -> String {
        if value.is_finite() {
            if value == value.trunc() && value.abs() < 1e15 {
                format!("{:.1}", value)
            } else {
                format!("{:?}", value)
            }
        } else {
            format!("0x{:016X}", value.to_bits())
        }
    }

    /// Default integer literal kind when inference left none.
    pub(super) fn default_int_kind() -> PrimKind {
        PrimKind::I32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Program;

    fn unit() -> CompileUnit {
        CompileUnit::new(Program {
            module: "t".to_string(),
            file: "t.tml".to_string(),
            items: vec![],
        })
    }

    #[test]
    fn test_fresh_registers_are_unique() {
        let u = unit();
        let mut e = Emitter::new(&u, EmitterConfig::default());
        let a = e.fresh_reg();
        let b = e.fresh_reg();
        assert_ne!(a, b);
        assert!(a.starts_with("%t"));
    }

    #[test]
    fn test_terminated_block_swallows_instructions() {
        let u = unit();
        let mut e = Emitter::new(&u, EmitterConfig::default());
        e.term(format_args!("ret void")).unwrap();
        e.ins(format_args!("%t0 = add i32 1, 2")).unwrap();
        assert!(!e.body.contains("add i32"), "no emission after terminator");
        e.open_label("next0").unwrap();
        e.ins(format_args!("%t1 = add i32 1, 2")).unwrap();
        assert!(e.body.contains("add i32"));
    }

    #[test]
    fn test_open_label_branches_out_of_open_block() {
        let u = unit();
        let mut e = Emitter::new(&u, EmitterConfig::default());
        e.ins(format_args!("%t0 = add i32 1, 2")).unwrap();
        e.open_label("merge0").unwrap();
        assert!(e.body.contains("br label %merge0"));
    }

    #[test]
    fn test_coerce_widens_by_signedness() {
        let u = unit();
        let mut e = Emitter::new(&u, EmitterConfig::default());
        let signed = EmitValue::new("%a", LlvmType::i8(), SemType::prim(PrimKind::I8));
        e.coerce_to(&signed, &LlvmType::i32()).unwrap();
        assert!(e.body.contains("sext i8 %a to i32"));

        let unsigned = EmitValue::new("%b", LlvmType::i8(), SemType::prim(PrimKind::U8));
        e.coerce_to(&unsigned, &LlvmType::i32()).unwrap();
        assert!(e.body.contains("zext i8 %b to i32"));
    }

    #[test]
    fn test_coerce_wraps_bare_ptr_into_fat_pointer() {
        let u = unit();
        let mut e = Emitter::new(&u, EmitterConfig::default());
        let ptr = EmitValue::new("%p", LlvmType::Ptr, SemType::ptr(SemType::unit(), false));
        e.coerce_to(&ptr, &LlvmType::FatPtr).unwrap();
        assert!(e.body.contains("insertvalue { ptr, ptr } undef, ptr %p, 0"));
        assert!(e.body.contains("insertvalue { ptr, ptr }"));
        assert!(e.body.contains("ptr null, 1"));
    }

    #[test]
    fn test_declares_deduplicate() {
        let u = unit();
        let mut e = Emitter::new(&u, EmitterConfig::default());
        e.ensure_declared("declare ptr @malloc(i64)").unwrap();
        e.ensure_declared("declare ptr @malloc(i64)").unwrap();
        assert_eq!(e.declares.matches("@malloc").count(), 1);
    }

    #[test]
    fn test_expected_enum_is_saved_and_restored() {
        let u = unit();
        let mut e = Emitter::new(&u, EmitterConfig::default());
        let outer = SemType::named("Maybe", vec![SemType::prim(PrimKind::I32)]);
        e.expected_enum = Some(outer.clone());
        e.with_expected_enum(Some(SemType::named("Poll", vec![])), |e| {
            assert_eq!(
                e.expected_enum.as_ref().map(ToString::to_string).as_deref(),
                Some("Poll")
            );
        });
        assert_eq!(e.expected_enum, Some(outer));
    }

    #[test]
    fn test_format_float() {
        assert_eq!(Emitter::format_float(2.0), "2.0");
        assert_eq!(Emitter::format_float(0.1), "0.1");
        assert_eq!(Emitter::format_float(f64::NAN), "0x7FF8000000000000");
    }
}
