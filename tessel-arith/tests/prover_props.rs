//! Algebraic properties of the dimension prover.

use proptest::prelude::*;

use tessel_arith::{Analyzer, Prover};
use tessel_ir::{PrimExpr, SymVar};

fn vars() -> [SymVar; 3] {
    [SymVar::new("a"), SymVar::new("b"), SymVar::new("c")]
}

fn arb_prim(vars: [SymVar; 3]) -> impl Strategy<Value = PrimExpr> {
    let leaf = prop_oneof![
        (-6i64..6).prop_map(PrimExpr::Int),
        (0usize..3).prop_map(move |i| PrimExpr::Var(vars[i].clone())),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a + b),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a - b),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a * b),
            (inner.clone(), 1i64..5).prop_map(|(a, k)| a.floor_div(k)),
            (inner.clone(), 1i64..5).prop_map(|(a, k)| a.floor_mod(k)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.min(b)),
            (inner.clone(), inner).prop_map(|(a, b)| a.max(b)),
        ]
    })
}

// Variables are resolved by name; each generated tree draws from one `vars()` set.
fn eval(e: &PrimExpr, env: &[(&str, i64)]) -> Option<i64> {
    let floor_div = |a: i64, b: i64| -> Option<i64> {
        let q = a.checked_div(b)?;
        let r = a.checked_rem(b)?;
        Some(if r != 0 && ((r < 0) != (b < 0)) { q - 1 } else { q })
    };
    Some(match e {
        PrimExpr::Int(v) => *v,
        PrimExpr::Var(v) => env.iter().find(|(k, _)| *k == v.name()).map(|(_, x)| *x)?,
        PrimExpr::Add(a, b) => eval(a, env)?.wrapping_add(eval(b, env)?),
        PrimExpr::Sub(a, b) => eval(a, env)?.wrapping_sub(eval(b, env)?),
        PrimExpr::Mul(a, b) => eval(a, env)?.wrapping_mul(eval(b, env)?),
        PrimExpr::FloorDiv(a, b) => floor_div(eval(a, env)?, eval(b, env)?)?,
        PrimExpr::FloorMod(a, b) => {
            let (x, y) = (eval(a, env)?, eval(b, env)?);
            x.wrapping_sub(floor_div(x, y)?.wrapping_mul(y))
        }
        PrimExpr::Min(a, b) => eval(a, env)?.min(eval(b, env)?),
        PrimExpr::Max(a, b) => eval(a, env)?.max(eval(b, env)?),
    })
}

/// Exact evaluation; `None` when any step leaves `i64`.
fn eval_checked(e: &PrimExpr, env: &[(&str, i64)]) -> Option<i64> {
    let floor_div = |a: i64, b: i64| -> Option<i64> {
        let q = a.checked_div(b)?;
        let r = a.checked_rem(b)?;
        Some(if r != 0 && ((r < 0) != (b < 0)) { q - 1 } else { q })
    };
    match e {
        PrimExpr::Int(v) => Some(*v),
        PrimExpr::Var(v) => env.iter().find(|(k, _)| *k == v.name()).map(|(_, x)| *x),
        PrimExpr::Add(a, b) => eval_checked(a, env)?.checked_add(eval_checked(b, env)?),
        PrimExpr::Sub(a, b) => eval_checked(a, env)?.checked_sub(eval_checked(b, env)?),
        PrimExpr::Mul(a, b) => eval_checked(a, env)?.checked_mul(eval_checked(b, env)?),
        PrimExpr::FloorDiv(a, b) => floor_div(eval_checked(a, env)?, eval_checked(b, env)?),
        PrimExpr::FloorMod(a, b) => {
            let (x, y) = (eval_checked(a, env)?, eval_checked(b, env)?);
            x.checked_sub(floor_div(x, y)?.checked_mul(y)?)
        }
        PrimExpr::Min(a, b) => Some(eval_checked(a, env)?.min(eval_checked(b, env)?)),
        PrimExpr::Max(a, b) => Some(eval_checked(a, env)?.max(eval_checked(b, env)?)),
    }
}

/// Like `arb_prim`, but constants reach the edges of `i64`.
fn arb_wide_prim(vars: [SymVar; 3]) -> impl Strategy<Value = PrimExpr> {
    let leaf = prop_oneof![
        (-6i64..6).prop_map(PrimExpr::Int),
        prop_oneof![Just(i64::MAX), Just(i64::MIN), Just(1i64 << 62), Just(-(1i64 << 62))].prop_map(PrimExpr::Int),
        (0usize..3).prop_map(move |i| PrimExpr::Var(vars[i].clone())),
    ];
    leaf.prop_recursive(3, 12, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a + b),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a - b),
            (inner.clone(), inner).prop_map(|(a, b)| a * b),
        ]
    })
}

#[test]
fn overflowing_dimensions_are_not_proven_equal() {
    let n = SymVar::new("n");
    let mut an = Analyzer::new();
    let wrapped = PrimExpr::from(&n) * (1i64 << 62) * 4;
    assert!(!an.can_prove_equal(&wrapped, &PrimExpr::Int(0)));
    assert!(!an.can_prove_equal(&(PrimExpr::Int(i64::MAX) + 1), &PrimExpr::Int(i64::MIN)));
    assert!(!an.can_prove_equal(&(PrimExpr::Int(i64::MIN) * -1), &PrimExpr::Int(i64::MIN)));
    // Large but representable values still fold.
    assert!(an.can_prove_equal(&(PrimExpr::Int(i64::MAX - 1) + 1), &PrimExpr::Int(i64::MAX)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn proven_equalities_hold_at_sample_points(
        a in arb_wide_prim(vars()),
        b in arb_wide_prim(vars()),
        xs in prop::array::uniform3(-5i64..5),
    ) {
        let env = [("a", xs[0]), ("b", xs[1]), ("c", xs[2])];
        if Analyzer::new().can_prove_equal(&a, &b) {
            if let (Some(x), Some(y)) = (eval_checked(&a, &env), eval_checked(&b, &env)) {
                prop_assert_eq!(x, y, "{} proven equal to {}", a, b);
            }
        }
    }

    #[test]
    fn every_expression_equals_itself(e in arb_prim(vars())) {
        prop_assert!(Analyzer::new().can_prove_equal(&e, &e.clone()));
    }

    #[test]
    fn addition_and_multiplication_commute(a in arb_prim(vars()), b in arb_prim(vars())) {
        let mut an = Analyzer::new();
        prop_assert!(an.can_prove_equal(&(a.clone() + b.clone()), &(b.clone() + a.clone())));
        prop_assert!(an.can_prove_equal(&(a.clone() * b.clone()), &(b * a)));
    }

    #[test]
    fn simplify_preserves_value(e in arb_prim(vars()), xs in prop::array::uniform3(-5i64..5)) {
        let env = [("a", xs[0]), ("b", xs[1]), ("c", xs[2])];
        let before = eval(&e, &env);
        prop_assume!(before.is_some());
        let after = eval(&Analyzer::new().simplify(&e), &env);
        prop_assert_eq!(before, after, "simplified form of {} changed value", e);
    }

    #[test]
    fn simplify_is_idempotent(e in arb_prim(vars())) {
        let an = Analyzer::new();
        let once = an.simplify(&e);
        prop_assert_eq!(an.simplify(&once), once);
    }
}
