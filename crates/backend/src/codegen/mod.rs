//! LLVM IR code generation
//!
//! The emitter walks a type-checked AST and streams textual LLVM IR
//! (opaque-pointer dialect, LLVM 15+). One `Emitter` handles one
//! translation unit: `Emitter::new(unit, config)`, then `emit_program()`
//! produces the final text.
//!
//! # Module structure
//!
//! - `state`: the `Emitter` struct, line discipline, coercion
//! - `llvm_ty`: the LLVM type sum (`i32`/`double`/`ptr`/`{ ptr, ptr }`/...)
//! - `mangle`: semantic type -> symbol suffix (`Maybe__I32`)
//! - `strings`: deduplicated string-literal pool
//! - `runtime`: C runtime `declare` table, on demand or conservative
//! - `instantiate`: monomorphization worklist and registries
//! - `expr`: expression/statement lowering
//! - `calls`: call dispatch (intrinsic -> builtin -> closure -> ctor -> user)
//! - `intrinsics`: inline LLVM expansions (~90 names)
//! - `builtins`: assert/atomic/mem/sync/format/... helper sequences
//! - `enums`: tagged enum layout, construction, `when` destructuring
//! - `closures`: fat-pointer closures and capture hoisting
//! - `program`: item loop, queue drains, `main` wrapper, assembly

mod builtins;
mod calls;
mod closures;
mod enums;
mod expr;
mod instantiate;
mod intrinsics;
mod llvm_ty;
mod mangle;
mod program;
mod runtime;
mod state;
mod strings;

pub use llvm_ty::{FloatKind, LlvmType};
pub use mangle::{fnv1a_hash, mangle_generic, mangle_method, mangle_type};
pub use runtime::{LIBRARY_DROP_TYPES, RUNTIME_DECLARATIONS, RuntimeDecl};
pub use state::{EmitValue, Emitter, EmitterConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        Block, CallExpr, EnumDef, Expr, Field, FuncDef, Item, Param, Pattern, Program, Stmt,
        StructDef, VariantDef, WhenArm,
    };
    use crate::env::CompileUnit;
    use crate::types::{PrimKind, SemType};
    use pretty_assertions::assert_eq as assert_text_eq;

    fn int(v: i128) -> Expr {
        Expr::IntLit { value: v, ty: None }
    }

    fn var(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call(CallExpr::new(name, args))
    }

    fn func(name: &str, params: Vec<(&str, SemType)>, ret: SemType, body: Block) -> FuncDef {
        FuncDef {
            name: name.to_string(),
            type_params: vec![],
            params: params
                .into_iter()
                .map(|(n, ty)| Param {
                    name: n.to_string(),
                    ty,
                })
                .collect(),
            ret,
            body,
            line: 1,
        }
    }

    fn unit_of(items: Vec<Item>) -> CompileUnit {
        CompileUnit::new(Program {
            module: "app".to_string(),
            file: "app.tml".to_string(),
            items,
        })
    }

    fn emit(unit: &CompileUnit) -> String {
        let mut emitter = Emitter::new(unit, EmitterConfig::default());
        emitter.emit_program().expect("emission should succeed")
    }

    // Scenario 1: simple arithmetic through a user function and print.
    #[test]
    fn test_simple_arithmetic_program() {
        let add = func(
            "add",
            vec![
                ("a", SemType::prim(PrimKind::I32)),
                ("b", SemType::prim(PrimKind::I32)),
            ],
            SemType::prim(PrimKind::I32),
            Block::of_value(Expr::Binary {
                op: crate::ast::BinOp::Add,
                lhs: Box::new(var("a")),
                rhs: Box::new(var("b")),
            }),
        );
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![Stmt::Expr(call("print", vec![call("add", vec![int(2), int(3)])]))],
                value: None,
            },
        );
        let unit = unit_of(vec![Item::Func(add), Item::Func(main)]);
        let ir = emit(&unit);

        assert!(ir.contains("define i32 @tml_add(i32 %a, i32 %b)"));
        assert!(ir.contains("add i32"));
        assert!(ir.contains("call i32 @tml_add(i32 2, i32 3)"));
        assert!(ir.contains("declare i32 @printf(ptr, ...)"));
        assert!(ir.contains("define i32 @main()"));
        assert!(ir.contains("call void @tml_main()"));
    }

    // Scenario 2: one monomorphized struct type, field access through GEP.
    #[test]
    fn test_monomorphized_generic_struct() {
        let pair = StructDef {
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
        };
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![
                    Stmt::Let {
                        name: "p".to_string(),
                        ty: None,
                        mutable: false,
                        value: Expr::StructLit {
                            name: "Pair".to_string(),
                            type_args: vec![SemType::prim(PrimKind::I32)],
                            fields: vec![
                                ("first".to_string(), int(10)),
                                ("second".to_string(), int(20)),
                            ],
                        },
                    },
                    Stmt::Expr(call(
                        "print",
                        vec![Expr::FieldAccess {
                            base: Box::new(var("p")),
                            field: "first".to_string(),
                        }],
                    )),
                ],
                value: None,
            },
        );
        let unit = unit_of(vec![Item::Struct(pair), Item::Func(main)]);
        let ir = emit(&unit);

        assert_eq!(
            ir.matches("%struct.Pair__I32 = type { i32, i32 }").count(),
            1,
            "exactly one type declaration for the instantiation"
        );
        assert!(ir.contains("getelementptr %struct.Pair__I32, ptr"));
        assert!(ir.contains("i32 0, i32 0"));
        assert!(ir.contains("store i32 10"));
        assert!(ir.contains("store i32 20"));
    }

    // Scenario 3: checked addition produces a Maybe with overflow branches.
    #[test]
    fn test_checked_add_into_maybe() {
        let scrutinee = Expr::Call(CallExpr {
            callee: "checked_add".to_string(),
            type_args: vec![SemType::prim(PrimKind::I32)],
            args: vec![int(2_147_483_647), int(1)],
            line: 3,
        });
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![Stmt::Expr(Expr::When {
                    scrutinee: Box::new(scrutinee),
                    arms: vec![
                        WhenArm {
                            pattern: Pattern::Variant {
                                enum_name: None,
                                variant: "Just".to_string(),
                                bindings: vec!["v".to_string()],
                            },
                            body: Block {
                                stmts: vec![Stmt::Expr(call("print", vec![var("v")]))],
                                value: None,
                            },
                        },
                        WhenArm {
                            pattern: Pattern::Variant {
                                enum_name: None,
                                variant: "Nothing".to_string(),
                                bindings: vec![],
                            },
                            body: Block {
                                stmts: vec![Stmt::Expr(call("print", vec![int(-1)]))],
                                value: None,
                            },
                        },
                    ],
                })],
                value: None,
            },
        );
        let unit = unit_of(vec![Item::Func(main)]);
        let ir = emit(&unit);

        assert!(ir.contains("call { i32, i1 } @llvm.sadd.with.overflow.i32(i32 2147483647, i32 1)"));
        assert!(ir.contains("extractvalue { i32, i1 }"));
        // Just stores tag 0 with the payload; Nothing stores tag 1
        assert!(ir.contains("store i32 0, ptr"));
        assert!(ir.contains("store i32 1, ptr"));
        assert!(ir.contains("%struct.Maybe__I32 = type { i32, i32 }"));
        // Destructuring reads the tag back and branches per arm
        assert!(ir.contains("icmp eq i32"));
    }

    // Scenario 4: spinlock loop around a counter update.
    #[test]
    fn test_spinlock_cas_loop() {
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![
                    Stmt::Let {
                        name: "lock".to_string(),
                        ty: Some(SemType::prim(PrimKind::I32)),
                        mutable: true,
                        value: int(0),
                    },
                    Stmt::Let {
                        name: "counter".to_string(),
                        ty: Some(SemType::prim(PrimKind::I32)),
                        mutable: true,
                        value: int(0),
                    },
                    Stmt::Expr(call(
                        "spin_lock",
                        vec![Expr::Ref {
                            mutable: true,
                            operand: Box::new(var("lock")),
                        }],
                    )),
                    Stmt::CompoundAssign {
                        target: var("counter"),
                        op: crate::ast::BinOp::Add,
                        value: int(1),
                    },
                    Stmt::Expr(call(
                        "spin_unlock",
                        vec![Expr::Ref {
                            mutable: true,
                            operand: Box::new(var("lock")),
                        }],
                    )),
                ],
                value: None,
            },
        );
        let unit = unit_of(vec![Item::Func(main)]);
        let ir = emit(&unit);

        assert!(ir.contains("atomicrmw xchg ptr"));
        assert!(ir.contains("acquire"));
        assert!(ir.contains("icmp eq i32"));
        assert!(ir.contains("store atomic i32 0, ptr"));
        assert!(ir.contains("release"));
        // The counter update sits between lock and unlock
        let lock_pos = ir.find("atomicrmw xchg").unwrap();
        let add_pos = ir[lock_pos..].find("add i32").map(|p| p + lock_pos).unwrap();
        let unlock_pos = ir.find("store atomic i32 0").unwrap();
        assert!(lock_pos < add_pos && add_pos < unlock_pos);
    }

    // Scenario 5: assertion carries the call's source line.
    #[test]
    fn test_assert_with_source_location() {
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![
                    Stmt::Let {
                        name: "x".to_string(),
                        ty: None,
                        mutable: false,
                        value: int(5),
                    },
                    Stmt::Expr(Expr::Call(CallExpr {
                        callee: "assert_eq".to_string(),
                        type_args: vec![],
                        args: vec![var("x"), int(5)],
                        line: 17,
                    })),
                ],
                value: None,
            },
        );
        let unit = unit_of(vec![Item::Func(main)]);
        let ir = emit(&unit);

        assert!(ir.contains("call void @assert_tml_loc(i32 0, ptr @.str."));
        assert!(ir.contains(", i32 17)"));
        assert!(ir.contains("unreachable"));
        assert!(ir.contains("assert_ok"));
        assert!(ir.contains("declare void @assert_tml_loc(i32, ptr, ptr, i32)"));
    }

    // Scenario 6: closures are fat pointers, called through extractvalue.
    #[test]
    fn test_closure_fat_pointer() {
        let closure = Expr::Closure {
            params: vec![Param {
                name: "x".to_string(),
                ty: SemType::prim(PrimKind::I32),
            }],
            ret: SemType::prim(PrimKind::I32),
            body: Block::of_value(Expr::Binary {
                op: crate::ast::BinOp::Mul,
                lhs: Box::new(var("x")),
                rhs: Box::new(int(2)),
            }),
        };
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![
                    Stmt::Let {
                        name: "f".to_string(),
                        ty: None,
                        mutable: false,
                        value: closure,
                    },
                    Stmt::Expr(call("print", vec![call("f", vec![int(21)])])),
                ],
                value: None,
            },
        );
        let unit = unit_of(vec![Item::Func(main)]);
        let ir = emit(&unit);

        assert!(ir.contains("insertvalue { ptr, ptr } undef, ptr @__closure_0, 0"));
        assert!(ir.contains("define i32 @__closure_0(ptr %env, i32 %x)"));
        assert!(ir.contains("extractvalue { ptr, ptr }"));
        assert!(ir.contains("i32 21"));
        assert!(ir.contains("mul i32"));
        // Non-capturing closure gets a null environment
        assert!(ir.contains("ptr null, 1"));
    }

    // Determinism: same AST in, byte-identical IR out.
    #[test]
    fn test_emission_is_deterministic() {
        let make_unit = || {
            let main = func(
                "main",
                vec![],
                SemType::unit(),
                Block {
                    stmts: vec![Stmt::Expr(call(
                        "print",
                        vec![Expr::StrLit("hello".to_string())],
                    ))],
                    value: None,
                },
            );
            unit_of(vec![Item::Func(main)])
        };
        let a = emit(&make_unit());
        let b = emit(&make_unit());
        assert_text_eq!(a, b);
    }

    // Enum round-trip with a legacy (heterogeneous) layout.
    #[test]
    fn test_legacy_enum_construct_then_destructure() {
        let shape = EnumDef {
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
        };
        let ctor = Expr::PathCall {
            type_name: "Shape".to_string(),
            type_args: vec![],
            method: "Rect".to_string(),
            args: vec![int(3), int(4)],
            line: 2,
        };
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![Stmt::Expr(Expr::When {
                    scrutinee: Box::new(ctor),
                    arms: vec![
                        WhenArm {
                            pattern: Pattern::Variant {
                                enum_name: Some("Shape".to_string()),
                                variant: "Rect".to_string(),
                                bindings: vec!["w".to_string(), "h".to_string()],
                            },
                            body: Block {
                                stmts: vec![Stmt::Expr(call("print", vec![var("w")]))],
                                value: None,
                            },
                        },
                        WhenArm {
                            pattern: Pattern::Wildcard,
                            body: Block::empty(),
                        },
                    ],
                })],
                value: None,
            },
        );
        let unit = unit_of(vec![Item::Enum(shape), Item::Func(main)]);
        let ir = emit(&unit);

        assert!(ir.contains("%struct.Shape = type { i32, [2 x i64] }"));
        // Construction stores the Rect tag (1) and both payload slots
        assert!(ir.contains("store i32 1, ptr"));
        assert!(ir.contains("getelementptr i64, ptr"));
        // Destructuring branches on the tag and loads the slots back
        assert!(ir.contains("icmp eq i32"));
        assert!(ir.contains("load i64, ptr"));
    }

    // Generic function calls monomorphize on demand, once.
    #[test]
    fn test_generic_function_monomorphizes_once() {
        let ident = FuncDef {
            name: "ident".to_string(),
            type_params: vec!["T".to_string()],
            params: vec![Param {
                name: "x".to_string(),
                ty: SemType::Param("T".to_string()),
            }],
            ret: SemType::Param("T".to_string()),
            body: Block::of_value(var("x")),
            line: 1,
        };
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![
                    Stmt::Expr(call("ident", vec![int(1)])),
                    Stmt::Expr(call("ident", vec![int(2)])),
                ],
                value: None,
            },
        );
        let unit = unit_of(vec![Item::Func(ident), Item::Func(main)]);
        let ir = emit(&unit);

        assert_eq!(
            ir.matches("define i32 @tml_ident__I32(i32 %x)").count(),
            1,
            "two call sites, one instantiation"
        );
        assert_eq!(ir.matches("call i32 @tml_ident__I32").count(), 2);
    }

    // The library prelude declares the whole runtime ABI up front.
    #[test]
    fn test_library_mode_emits_conservative_prelude() {
        let unit = unit_of(vec![]);
        let mut emitter = Emitter::new(&unit, EmitterConfig::new().with_library_mode(true));
        let ir = emitter.emit_program().unwrap();
        for symbol in ["@malloc", "@free", "@printf", "@assert_tml_loc"] {
            assert!(ir.contains(symbol), "prelude missing {}", symbol);
        }
    }

    // String pool: identical literals share one global.
    #[test]
    fn test_string_literals_deduplicate_across_functions() {
        let f = func(
            "f",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![Stmt::Expr(call(
                    "print",
                    vec![Expr::StrLit("shared".to_string())],
                ))],
                value: None,
            },
        );
        let g = func(
            "g",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![Stmt::Expr(call(
                    "print",
                    vec![Expr::StrLit("shared".to_string())],
                ))],
                value: None,
            },
        );
        let unit = unit_of(vec![Item::Func(f), Item::Func(g)]);
        let ir = emit(&unit);
        assert_eq!(ir.matches("c\"shared\\00\"").count(), 1);
    }

    // Primitive receivers dispatch through the behavior impl for the
    // primitive's canonical type name.
    #[test]
    fn test_primitive_method_dispatch() {
        let double = func(
            "double",
            vec![("self", SemType::prim(PrimKind::I32))],
            SemType::prim(PrimKind::I32),
            Block::of_value(Expr::Binary {
                op: crate::ast::BinOp::Mul,
                lhs: Box::new(var("self")),
                rhs: Box::new(int(2)),
            }),
        );
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![Stmt::Expr(Expr::MethodCall {
                    receiver: Box::new(int(5)),
                    method: "double".to_string(),
                    type_args: vec![],
                    args: vec![],
                    line: 2,
                })],
                value: None,
            },
        );
        let unit = unit_of(vec![
            Item::Impl(crate::ast::ImplBlock {
                type_name: "I32".to_string(),
                type_params: vec![],
                behavior: Some("Arith".to_string()),
                methods: vec![double],
            }),
            Item::Func(main),
        ]);
        let ir = emit(&unit);

        assert!(ir.contains("define i32 @I32_double(i32 %self)"));
        assert!(ir.contains("call i32 @I32_double(i32 5)"));
    }

    // Generic impl methods monomorphize with the receiver's type arguments.
    #[test]
    fn test_generic_impl_method_monomorphizes() {
        let container = StructDef {
            name: "Container".to_string(),
            type_params: vec!["T".to_string()],
            fields: vec![Field {
                name: "value".to_string(),
                ty: SemType::Param("T".to_string()),
            }],
        };
        let get = FuncDef {
            name: "get".to_string(),
            type_params: vec![],
            params: vec![Param {
                name: "self".to_string(),
                ty: SemType::named("Container", vec![SemType::Param("T".to_string())]),
            }],
            ret: SemType::Param("T".to_string()),
            body: Block::of_value(Expr::FieldAccess {
                base: Box::new(var("self")),
                field: "value".to_string(),
            }),
            line: 4,
        };
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![
                    Stmt::Let {
                        name: "c".to_string(),
                        ty: None,
                        mutable: false,
                        value: Expr::StructLit {
                            name: "Container".to_string(),
                            type_args: vec![SemType::prim(PrimKind::I32)],
                            fields: vec![("value".to_string(), int(7))],
                        },
                    },
                    Stmt::Expr(Expr::MethodCall {
                        receiver: Box::new(var("c")),
                        method: "get".to_string(),
                        type_args: vec![],
                        args: vec![],
                        line: 9,
                    }),
                ],
                value: None,
            },
        );
        let unit = unit_of(vec![
            Item::Struct(container),
            Item::Impl(crate::ast::ImplBlock {
                type_name: "Container".to_string(),
                type_params: vec!["T".to_string()],
                behavior: None,
                methods: vec![get],
            }),
            Item::Func(main),
        ]);
        let ir = emit(&unit);

        assert!(ir.contains("%struct.Container__I32 = type { i32 }"));
        assert!(ir.contains("call i32 @Container__I32_get(%struct.Container__I32"));
        assert!(ir.contains("define i32 @Container__I32_get(%struct.Container__I32 %self)"));
        assert!(ir.contains("getelementptr %struct.Container__I32, ptr"));
    }

    // Bare `Nothing()` resolves through the expected-enum context, and
    // `block_on` extracts the Ready payload from a Poll value.
    #[test]
    fn test_expected_enum_context_and_block_on() {
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![
                    Stmt::Let {
                        name: "m".to_string(),
                        ty: Some(SemType::named("Maybe", vec![SemType::prim(PrimKind::I64)])),
                        mutable: false,
                        value: call("Nothing", vec![]),
                    },
                    Stmt::Let {
                        name: "r".to_string(),
                        ty: None,
                        mutable: false,
                        value: call(
                            "block_on",
                            vec![Expr::PathCall {
                                type_name: "Poll".to_string(),
                                type_args: vec![SemType::prim(PrimKind::I32)],
                                method: "Ready".to_string(),
                                args: vec![int(42)],
                                line: 3,
                            }],
                        ),
                    },
                    Stmt::Expr(call("print", vec![var("r")])),
                ],
                value: None,
            },
        );
        let unit = unit_of(vec![Item::Func(main)]);
        let ir = emit(&unit);

        // Nothing stores tag 1 into a Maybe__I64
        assert!(ir.contains("%struct.Maybe__I64 = type { i32, i64 }"));
        assert!(ir.contains("store i32 1, ptr"));
        // Poll::Ready(42) constructs, block_on reads the payload back
        assert!(ir.contains("%struct.Poll__I32 = type { i32, i32 }"));
        assert!(ir.contains("store i32 42, ptr"));
        assert!(ir.contains("load i32, ptr"));
    }

    fn main_with(stmts: Vec<Stmt>) -> CompileUnit {
        unit_of(vec![Item::Func(func(
            "main",
            vec![],
            SemType::unit(),
            Block { stmts, value: None },
        ))])
    }

    fn typed_int(v: i128, kind: PrimKind) -> Expr {
        Expr::IntLit {
            value: v,
            ty: Some(kind),
        }
    }

    fn float(v: f64) -> Expr {
        Expr::FloatLit { value: v, ty: None }
    }

    fn typed_call(name: &str, type_args: Vec<SemType>, args: Vec<Expr>) -> Expr {
        Expr::Call(CallExpr {
            callee: name.to_string(),
            type_args,
            args,
            line: 1,
        })
    }

    // Shift-right is arithmetic by default; unsigned operands flip to lshr.
    #[test]
    fn test_shift_right_signedness() {
        let unit = main_with(vec![
            Stmt::Expr(call("llvm_shr", vec![typed_int(-8, PrimKind::I32), int(1)])),
            Stmt::Expr(call("llvm_shr", vec![typed_int(8, PrimKind::U32), int(1)])),
        ]);
        let ir = emit(&unit);
        assert!(ir.contains("ashr i32 -8, 1"));
        assert!(ir.contains("lshr i32 8, 1"));
    }

    // Float comparisons use ordered predicates (NaN != everything).
    #[test]
    fn test_float_compare_is_ordered() {
        let unit = main_with(vec![
            Stmt::Expr(call("llvm_eq", vec![float(1.0), float(2.0)])),
            Stmt::Expr(call("llvm_lt", vec![float(1.0), float(2.0)])),
        ]);
        let ir = emit(&unit);
        assert!(ir.contains("fcmp oeq double 1.0, 2.0"));
        assert!(ir.contains("fcmp olt double 1.0, 2.0"));
    }

    #[test]
    fn test_bit_manipulation_intrinsics() {
        let unit = main_with(vec![
            Stmt::Expr(call("ctlz", vec![typed_int(8, PrimKind::I64)])),
            Stmt::Expr(call("ctpop", vec![typed_int(255, PrimKind::I32)])),
            Stmt::Expr(call("bswap", vec![typed_int(1, PrimKind::I32)])),
        ]);
        let ir = emit(&unit);
        assert!(ir.contains("declare i64 @llvm.ctlz.i64(i64, i1)"));
        assert!(ir.contains("call i64 @llvm.ctlz.i64(i64 8, i1 false)"));
        assert!(ir.contains("call i32 @llvm.ctpop.i32(i32 255)"));
        assert!(ir.contains("call i32 @llvm.bswap.i32(i32 1)"));
    }

    #[test]
    fn test_float_math_intrinsics() {
        let unit = main_with(vec![
            Stmt::Expr(call("sqrt", vec![float(2.0)])),
            Stmt::Expr(call("pow", vec![float(2.0), float(10.0)])),
            Stmt::Expr(call("fma", vec![float(1.0), float(2.0), float(3.0)])),
        ]);
        let ir = emit(&unit);
        assert!(ir.contains("call double @llvm.sqrt.f64(double 2.0)"));
        assert!(ir.contains("call double @llvm.pow.f64(double 2.0, double 10.0)"));
        assert!(ir.contains("call double @llvm.fma.f64(double 1.0, double 2.0, double 3.0)"));
    }

    // simd_splat is a chain of insertelement starting from undef.
    #[test]
    fn test_simd_splat_chain() {
        let unit = main_with(vec![Stmt::Expr(typed_call(
            "simd_splat",
            vec![SemType::prim(PrimKind::F32)],
            vec![Expr::FloatLit {
                value: 1.5,
                ty: Some(PrimKind::F32),
            }],
        ))]);
        let ir = emit(&unit);
        assert_eq!(ir.matches("insertelement <4 x float>").count(), 4);
        assert!(ir.contains("insertelement <4 x float> undef, float 1.5, i32 0"));
    }

    // A pointer argument carried as i64 goes through inttoptr first.
    #[test]
    fn test_ptr_read_through_i64_address() {
        let unit = main_with(vec![Stmt::Expr(typed_call(
            "ptr_read",
            vec![SemType::prim(PrimKind::I64)],
            vec![typed_int(4096, PrimKind::I64)],
        ))]);
        let ir = emit(&unit);
        assert!(ir.contains("inttoptr i64 4096 to ptr"));
        assert!(ir.contains("load i64, ptr"));
    }

    // size_of: compile-time literal for primitives (Unit is 0), GEP-null
    // sequence for structs.
    #[test]
    fn test_size_of_conventions() {
        let pair = StructDef {
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
        };
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![
                    Stmt::Let {
                        name: "zero".to_string(),
                        ty: None,
                        mutable: false,
                        value: typed_call("size_of", vec![SemType::unit()], vec![]),
                    },
                    Stmt::Let {
                        name: "sized".to_string(),
                        ty: None,
                        mutable: false,
                        value: typed_call(
                            "size_of",
                            vec![SemType::named("Pair", vec![SemType::prim(PrimKind::I32)])],
                            vec![],
                        ),
                    },
                ],
                value: None,
            },
        );
        let unit = unit_of(vec![Item::Struct(pair), Item::Func(main)]);
        let ir = emit(&unit);
        assert!(ir.contains("store i64 0"));
        assert!(ir.contains("getelementptr %struct.Pair__I32, ptr null, i32 1"));
        assert!(ir.contains("ptrtoint ptr"));
    }

    // type_id folds to the FNV-1a hash of the mangled name.
    #[test]
    fn test_type_id_is_fnv1a_of_mangled_name() {
        let unit = main_with(vec![Stmt::Let {
            name: "id".to_string(),
            ty: None,
            mutable: false,
            value: typed_call("type_id", vec![SemType::prim(PrimKind::I32)], vec![]),
        }]);
        let ir = emit(&unit);
        let expected = fnv1a_hash("I32") as i64;
        assert!(ir.contains(&expected.to_string()));
    }

    #[test]
    fn test_field_offset_uses_gep_null() {
        let pair = StructDef {
            name: "Pair".to_string(),
            type_params: vec![],
            fields: vec![
                Field {
                    name: "first".to_string(),
                    ty: SemType::prim(PrimKind::I32),
                },
                Field {
                    name: "second".to_string(),
                    ty: SemType::prim(PrimKind::I64),
                },
            ],
        };
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![Stmt::Expr(typed_call(
                    "field_offset",
                    vec![SemType::named("Pair", vec![])],
                    vec![int(1)],
                ))],
                value: None,
            },
        );
        let unit = unit_of(vec![Item::Struct(pair), Item::Func(main)]);
        let ir = emit(&unit);
        assert!(ir.contains("getelementptr %struct.Pair, ptr null, i32 0, i32 1"));
    }

    // drop on a library type calls its glue exactly once; the explicit drop
    // consumes the local so scope exit stays quiet.
    #[test]
    fn test_drop_library_type_exactly_once() {
        let unit = main_with(vec![
            Stmt::Let {
                name: "a".to_string(),
                ty: Some(SemType::named("Arc", vec![SemType::prim(PrimKind::I32)])),
                mutable: false,
                value: typed_int(0, PrimKind::I64),
            },
            Stmt::Expr(call("drop", vec![var("a")])),
        ]);
        let ir = emit(&unit);
        assert!(ir.contains("declare void @Arc_drop(ptr)"));
        assert_eq!(
            ir.matches("call void @Arc_drop").count(),
            1,
            "explicit drop must not double with the scope-exit drop"
        );
    }

    // Undropped droppable locals get glue at scope exit.
    #[test]
    fn test_scope_exit_drop_for_droppable_local() {
        let unit = main_with(vec![Stmt::Let {
            name: "a".to_string(),
            ty: Some(SemType::named("Text", vec![])),
            mutable: false,
            value: typed_int(0, PrimKind::I64),
        }]);
        let ir = emit(&unit);
        assert_eq!(ir.matches("call void @Text_drop").count(), 1);
    }

    #[test]
    fn test_while_loop_with_break() {
        let unit = main_with(vec![Stmt::While {
            cond: Expr::BoolLit(true),
            body: Block {
                stmts: vec![Stmt::Break],
                value: None,
            },
        }]);
        let ir = emit(&unit);
        assert!(ir.contains("while_cond"));
        assert!(ir.contains("br i1 1, label %while_body"));
        assert!(ir.contains("br label %while_exit"));
    }

    // if/else in value position merges with a phi.
    #[test]
    fn test_if_else_value_merges_with_phi() {
        let unit = main_with(vec![Stmt::Let {
            name: "x".to_string(),
            ty: None,
            mutable: false,
            value: Expr::If {
                cond: Box::new(Expr::BoolLit(true)),
                then_block: Block::of_value(int(1)),
                else_block: Some(Block::of_value(int(2))),
            },
        }]);
        let ir = emit(&unit);
        assert!(ir.contains("phi i32 [ 1, %if_then"));
        assert!(ir.contains("[ 2, %if_else"));
    }

    // String equality goes through the null-safe runtime helper.
    #[test]
    fn test_string_equality_uses_runtime_helper() {
        let unit = main_with(vec![Stmt::Expr(Expr::Binary {
            op: crate::ast::BinOp::Eq,
            lhs: Box::new(Expr::StrLit("a".to_string())),
            rhs: Box::new(Expr::StrLit("b".to_string())),
        })]);
        let ir = emit(&unit);
        assert!(ir.contains("call i32 @str_eq(ptr @.str."));
        assert!(ir.contains("icmp ne i32"));
    }

    #[test]
    fn test_cast_int_to_float() {
        let unit = main_with(vec![Stmt::Expr(Expr::Cast {
            operand: Box::new(int(3)),
            ty: SemType::prim(PrimKind::F64),
        })]);
        let ir = emit(&unit);
        assert!(ir.contains("sitofp i32 3 to double"));
    }

    #[test]
    fn test_atomic_rmw_and_cas() {
        let unit = main_with(vec![
            Stmt::Let {
                name: "x".to_string(),
                ty: Some(SemType::prim(PrimKind::I32)),
                mutable: true,
                value: int(0),
            },
            Stmt::Expr(call(
                "atomic_add",
                vec![
                    Expr::Ref {
                        mutable: true,
                        operand: Box::new(var("x")),
                    },
                    int(5),
                ],
            )),
            Stmt::Expr(call(
                "atomic_cas",
                vec![
                    Expr::Ref {
                        mutable: true,
                        operand: Box::new(var("x")),
                    },
                    int(0),
                    int(1),
                ],
            )),
        ]);
        let ir = emit(&unit);
        assert!(ir.contains("atomicrmw add ptr"));
        assert!(ir.contains("seq_cst"));
        assert!(ir.contains("cmpxchg ptr"));
        assert!(ir.contains("seq_cst seq_cst"));
        assert!(ir.contains("extractvalue { i32, i1 }"));
    }

    // Outcome shares the compact layout when both payloads lower alike.
    #[test]
    fn test_outcome_construct_then_destructure() {
        let ctor = Expr::PathCall {
            type_name: "Outcome".to_string(),
            type_args: vec![SemType::prim(PrimKind::I32), SemType::prim(PrimKind::I32)],
            method: "Ok".to_string(),
            args: vec![int(5)],
            line: 2,
        };
        let unit = main_with(vec![Stmt::Expr(Expr::When {
            scrutinee: Box::new(ctor),
            arms: vec![
                WhenArm {
                    pattern: Pattern::Variant {
                        enum_name: Some("Outcome".to_string()),
                        variant: "Ok".to_string(),
                        bindings: vec!["v".to_string()],
                    },
                    body: Block {
                        stmts: vec![Stmt::Expr(call("print", vec![var("v")]))],
                        value: None,
                    },
                },
                WhenArm {
                    pattern: Pattern::Variant {
                        enum_name: Some("Outcome".to_string()),
                        variant: "Err".to_string(),
                        bindings: vec!["e".to_string()],
                    },
                    body: Block {
                        stmts: vec![Stmt::Expr(call("print", vec![var("e")]))],
                        value: None,
                    },
                },
            ],
        })]);
        let ir = emit(&unit);
        assert!(ir.contains("%struct.Outcome__I32__I32 = type { i32, i32 }"));
        assert!(ir.contains("store i32 5, ptr"));
        assert!(ir.contains("icmp eq i32"));
    }

    // saturating_mul(I32::MIN, -1) clamps to I32::MAX (positive overflow).
    #[test]
    fn test_saturating_mul_sign_select() {
        let main = func(
            "main",
            vec![],
            SemType::unit(),
            Block {
                stmts: vec![Stmt::Expr(Expr::Call(CallExpr {
                    callee: "saturating_mul".to_string(),
                    type_args: vec![SemType::prim(PrimKind::I32)],
                    args: vec![int(-2_147_483_648), int(-1)],
                    line: 1,
                }))],
                value: None,
            },
        );
        let unit = unit_of(vec![Item::Func(main)]);
        let ir = emit(&unit);

        assert!(ir.contains("@llvm.smul.with.overflow.i32"));
        assert!(ir.contains("xor i32"));
        assert!(ir.contains("icmp slt i32"));
        assert!(ir.contains("select i1"));
        assert!(ir.contains("-2147483648"));
        assert!(ir.contains("2147483647"));
    }
}
