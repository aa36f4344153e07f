//! Typed AST consumed by the back-end
//!
//! The front-end (lexer, parser, type checker) hands the emitter a fully
//! type-checked tree: every binding site carries its resolved semantic type,
//! every call site carries its source line (for assertion diagnostics), and
//! qualified calls are already split into their type/method parts.
//!
//! The tree serializes with serde; `tml-emit` reads it as JSON from the
//! driver.

use crate::types::{PrimKind, SemType};
use serde::{Deserialize, Serialize};

/// One translation unit, processed in source order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Module path of this unit (`app::main`)
    pub module: String,
    /// Source file name, used in assertion diagnostics
    pub file: String,
    pub items: Vec<Item>,
}

impl Program {
    pub fn find_func(&self, name: &str) -> Option<&FuncDef> {
        self.items.iter().find_map(|item| match item {
            Item::Func(f) if f.name == name => Some(f),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Item {
    Func(FuncDef),
    Struct(StructDef),
    Enum(EnumDef),
    Impl(ImplBlock),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuncDef {
    pub name: String,
    /// Generic parameter names, in declaration order
    pub type_params: Vec<String>,
    pub params: Vec<Param>,
    pub ret: SemType,
    pub body: Block,
    pub line: u32,
}

impl FuncDef {
    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: SemType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    pub type_params: Vec<String>,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: SemType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub type_params: Vec<String>,
    /// Variant tags are assigned in declaration order starting at 0
    pub variants: Vec<VariantDef>,
}

impl EnumDef {
    pub fn variant(&self, name: &str) -> Option<(u32, &VariantDef)> {
        self.variants
            .iter()
            .enumerate()
            .find(|(_, v)| v.name == name)
            .map(|(i, v)| (i as u32, v))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDef {
    pub name: String,
    /// Payload field types; empty for unit variants
    pub payload: Vec<SemType>,
}

/// A group of methods for one type, possibly generic, possibly implementing
/// a named behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplBlock {
    pub type_name: String,
    pub type_params: Vec<String>,
    pub behavior: Option<String>,
    pub methods: Vec<FuncDef>,
}

impl ImplBlock {
    pub fn method(&self, name: &str) -> Option<&FuncDef> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Statement sequence with an optional trailing value expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub value: Option<Box<Expr>>,
}

impl Block {
    pub fn empty() -> Self {
        Block {
            stmts: Vec::new(),
            value: None,
        }
    }

    pub fn of_value(value: Expr) -> Self {
        Block {
            stmts: Vec::new(),
            value: Some(Box::new(value)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    Let {
        name: String,
        ty: Option<SemType>,
        mutable: bool,
        value: Expr,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    /// `x += 1` and friends; reads, applies `op`, stores back
    CompoundAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    Expr(Expr),
    Return {
        value: Option<Expr>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    IntLit {
        value: i128,
        /// Inferred primitive kind; defaults to I32 when absent
        ty: Option<PrimKind>,
    },
    FloatLit {
        value: f64,
        ty: Option<PrimKind>,
    },
    BoolLit(bool),
    StrLit(String),
    CharLit(char),
    UnitLit,
    Var(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    /// Free-function call: intrinsic, builtin, or user function
    Call(CallExpr),
    /// `recv.method(args)`: primitive or user method dispatch
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        type_args: Vec<SemType>,
        args: Vec<Expr>,
        line: u32,
    },
    /// `Type::method(args)` or `Enum::Variant(args)`
    PathCall {
        type_name: String,
        type_args: Vec<SemType>,
        method: String,
        args: Vec<Expr>,
        line: u32,
    },
    FieldAccess {
        base: Box<Expr>,
        field: String,
    },
    StructLit {
        name: String,
        type_args: Vec<SemType>,
        fields: Vec<(String, Expr)>,
    },
    If {
        cond: Box<Expr>,
        then_block: Block,
        else_block: Option<Block>,
    },
    /// Pattern match over an enum value
    When {
        scrutinee: Box<Expr>,
        arms: Vec<WhenArm>,
    },
    /// `do(x) x * 2` closure literal
    Closure {
        params: Vec<Param>,
        ret: SemType,
        body: Block,
    },
    Ref {
        mutable: bool,
        operand: Box<Expr>,
    },
    Deref(Box<Expr>),
    Cast {
        operand: Box<Expr>,
        ty: SemType,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallExpr {
    pub callee: String,
    pub type_args: Vec<SemType>,
    pub args: Vec<Expr>,
    pub line: u32,
}

impl CallExpr {
    pub fn new(callee: &str, args: Vec<Expr>) -> Self {
        CallExpr {
            callee: callee.to_string(),
            type_args: Vec::new(),
            args,
            line: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhenArm {
    pub pattern: Pattern,
    pub body: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Pattern {
    /// `Just(v)` / `Maybe::Just(v)`: variant with payload bindings
    Variant {
        enum_name: Option<String>,
        variant: String,
        bindings: Vec<String>,
    },
    /// `_` catch-all arm
    Wildcard,
}

impl Pattern {
    pub fn variant_name(&self) -> Option<&str> {
        match self {
            Pattern::Variant { variant, .. } => Some(variant),
            Pattern::Wildcard => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_variant_tags_follow_declaration_order() {
        let def = EnumDef {
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
        };
        assert_eq!(def.variant("Just").map(|(tag, _)| tag), Some(0));
        assert_eq!(def.variant("Nothing").map(|(tag, _)| tag), Some(1));
        assert!(def.variant("Some").is_none());
    }

    #[test]
    fn test_program_find_func() {
        let program = Program {
            module: "app".to_string(),
            file: "app.tml".to_string(),
            items: vec![Item::Func(FuncDef {
                name: "main".to_string(),
                type_params: vec![],
                params: vec![],
                ret: SemType::unit(),
                body: Block::empty(),
                line: 1,
            })],
        };
        assert!(program.find_func("main").is_some());
        assert!(program.find_func("other").is_none());
    }
}
