//! Rewriting arbitrary (non-normalized) trees.

use proptest::prelude::*;

use tessel_core::{ExprMutatorBase, op};
use tessel_ir::{
    BindingBlock, ConstValue, Constant, DataType, Expr, GlobalVar, Op, PrimExpr, ShapeExpr, Var, VarBinding, VarNode,
};

struct Identity;

impl ExprMutatorBase for Identity {}

/// Replaces every leaf the generator produces with a fresh copy.
struct Rebuild;

fn copy(expr: &Expr) -> Expr {
    Expr::with_parts(expr.kind().clone(), expr.span(), expr.shape().cloned(), expr.checked_type().cloned())
}

impl ExprMutatorBase for Rebuild {
    fn visit_constant(&mut self, expr: &Expr, _op: &Constant) -> Expr {
        copy(expr)
    }

    fn visit_var(&mut self, expr: &Expr, _op: &VarNode) -> Expr {
        copy(expr)
    }

    fn visit_shape_expr(&mut self, expr: &Expr, _op: &ShapeExpr) -> Expr {
        copy(expr)
    }

    fn visit_global_var(&mut self, expr: &Expr, _op: &GlobalVar) -> Expr {
        copy(expr)
    }

    fn visit_op(&mut self, expr: &Expr, _op: &Op) -> Expr {
        copy(expr)
    }
}

fn arb_expr() -> impl Strategy<Value = Expr> {
    let x = Var::new("x", None, None);
    let y = Var::new("y", None, None);
    let leaf = prop_oneof![
        Just(x.to_expr()),
        Just(y.to_expr()),
        (0i64..10).prop_map(|v| Expr::constant(ConstValue::Int(v), DataType::Int64)),
        (0i64..4).prop_map(|d| Expr::shape_expr(vec![PrimExpr::Int(d)])),
        Just(Expr::global_var("g")),
    ];
    leaf.prop_recursive(4, 32, 3, move |inner| {
        let bound = Var::new("b", None, None);
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Expr::tuple),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| op::add(a, b)),
            (inner.clone(), 0usize..3).prop_map(|(t, i)| Expr::tuple_get_item(t, i)),
            (inner.clone(), inner.clone(), inner.clone()).prop_map(|(c, t, f)| Expr::if_then_else(c, t, f)),
            (inner.clone(), inner).prop_map(move |(v, body)| {
                let block = BindingBlock::new(vec![VarBinding::new(bound.clone(), v).into()]);
                Expr::seq(vec![block], body)
            }),
        ]
    })
}

fn count_nodes(e: &Expr) -> usize {
    let mut n = 0;
    tessel_core::post_order_visit(e, |_| n += 1);
    n
}

proptest! {
    #[test]
    fn identity_mutator_returns_the_input(e in arb_expr()) {
        let out = Identity.visit_expr(&e);
        prop_assert!(out.same_as(&e));
    }

    #[test]
    fn rebuilding_preserves_structure(e in arb_expr()) {
        let out = Rebuild.visit_expr(&e);
        prop_assert_eq!(&out, &e);
        prop_assert_eq!(count_nodes(&out), count_nodes(&e));
    }
}
