#![forbid(unsafe_code)]

use tessel_arith::{Analyzer, Prover};
use tessel_ir::{Attrs, Call, Expr, ExprKind, PrimExpr, Span, Type};

use super::{OpRegistry, OpRule};
use crate::diagnostic::{DiagnosticContext, IrDiagnostic};
use crate::error::BuildError;

pub(super) fn register(registry: &mut OpRegistry) {
    registry
        .register("relax.add", OpRule::new().with_shape(broadcast_shape).with_type(elementwise_type))
        .register("relax.multiply", OpRule::new().with_shape(broadcast_shape).with_type(elementwise_type))
        .register("relax.unique", OpRule::new().with_shape(|_, _, _| Ok(Some(Expr::runtime_dep_shape()))).with_type(unique_type))
        .register("relax.call_tir", OpRule::new().with_shape(call_tir_shape).with_type(call_tir_type))
        .register("relax.print", OpRule::new().with_type(|_, _, _| Ok(Some(Type::void()))))
        .register("relax.shape_of", OpRule::new().with_type(|_, _, _| Ok(Some(Type::Shape))));
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    Expr::call(Expr::op("relax.add"), vec![lhs, rhs])
}

pub fn multiply(lhs: Expr, rhs: Expr) -> Expr {
    Expr::call(Expr::op("relax.multiply"), vec![lhs, rhs])
}

pub fn unique(x: Expr) -> Expr {
    Expr::call(Expr::op("relax.unique"), vec![x])
}

pub fn shape_of(x: Expr) -> Expr {
    Expr::call(Expr::op("relax.shape_of"), vec![x])
}

/// `func` is called in destination-passing style on the `args` tuple and
/// writes an output of `shape`, typed `out_type`.
pub fn call_tir(func: Expr, args: Expr, shape: Expr, out_type: Type) -> Expr {
    Expr::call_with(Expr::op("relax.call_tir"), vec![func, args, shape], Attrs::new(), vec![out_type])
}

pub fn print(values: Vec<Expr>, format: &str) -> Expr {
    let mut attrs = Attrs::new();
    attrs.insert("format".to_string(), format.to_string());
    Expr::call_with(Expr::op("relax.print"), values, attrs, Vec::new())
}

fn op_name(call: &Call) -> &str {
    match call.op.kind() {
        ExprKind::Op(op) => &op.name,
        _ => "<call>",
    }
}

fn fatal(diag: &mut DiagnosticContext, span: Span, message: String) -> BuildError {
    diag.emit_fatal(IrDiagnostic::error(span, message))
}

fn binary_args<'c>(call: &'c Call, span: Span, diag: &mut DiagnosticContext) -> Result<(&'c Expr, &'c Expr), BuildError> {
    match call.args.as_slice() {
        [lhs, rhs] => Ok((lhs, rhs)),
        args => Err(fatal(
            diag,
            span,
            format!("{} expects 2 arguments, found {}", op_name(call), args.len()),
        )),
    }
}

fn broadcast_shape(call: &Call, span: Span, diag: &mut DiagnosticContext) -> Result<Option<Expr>, BuildError> {
    let (lhs, rhs) = binary_args(call, span, diag)?;
    let (Some(l), Some(r)) = (
        lhs.shape().and_then(Expr::as_shape_values),
        rhs.shape().and_then(Expr::as_shape_values),
    ) else {
        return Ok(None);
    };

    let mut analyzer = Analyzer::new();
    let rank = l.len().max(r.len());
    let mut dims: Vec<PrimExpr> = Vec::with_capacity(rank);
    // Right-aligned, numpy style.
    for i in 0..rank {
        let dim = match (l.iter().rev().nth(i), r.iter().rev().nth(i)) {
            (Some(a), None) => a.clone(),
            (None, Some(b)) => b.clone(),
            (None, None) => continue,
            (Some(a), Some(b)) => match (a.as_int(), b.as_int()) {
                (Some(1), _) => b.clone(),
                (_, Some(1)) => a.clone(),
                (Some(x), Some(y)) if x != y => {
                    return Err(fatal(
                        diag,
                        span,
                        format!("{}: cannot broadcast dimension {x} with {y}", op_name(call)),
                    ));
                }
                _ if analyzer.can_prove_equal(a, b) => a.clone(),
                _ => return Ok(None),
            },
        };
        dims.push(dim);
    }
    dims.reverse();
    Ok(Some(Expr::shape_expr(dims)))
}

fn elementwise_type(call: &Call, span: Span, diag: &mut DiagnosticContext) -> Result<Option<Type>, BuildError> {
    let (lhs, rhs) = binary_args(call, span, diag)?;
    let (Some(lt), Some(rt)) = (lhs.checked_type(), rhs.checked_type()) else {
        return Ok(None);
    };
    match (lt, rt) {
        (
            Type::DynTensor { rank: lr, dtype: ld },
            Type::DynTensor { rank: rr, dtype: rd },
        ) => {
            let dtype = match (ld, rd) {
                (Some(a), Some(b)) if a != b => {
                    return Err(fatal(
                        diag,
                        span,
                        format!("{}: data types {a} and {b} do not match", op_name(call)),
                    ));
                }
                (Some(a), Some(_)) => Some(*a),
                _ => None,
            };
            let rank = match (lr, rr) {
                (Some(a), Some(b)) => Some((*a).max(*b)),
                _ => None,
            };
            Ok(Some(Type::DynTensor { rank, dtype }))
        }
        _ => Err(fatal(
            diag,
            span,
            format!("{} expects tensor operands, found {lt} and {rt}", op_name(call)),
        )),
    }
}

fn unique_type(call: &Call, span: Span, diag: &mut DiagnosticContext) -> Result<Option<Type>, BuildError> {
    let [arg] = call.args.as_slice() else {
        return Err(fatal(diag, span, format!("relax.unique expects 1 argument, found {}", call.args.len())));
    };
    match arg.checked_type() {
        None => Ok(None),
        Some(Type::DynTensor { dtype, .. }) => Ok(Some(Type::DynTensor { rank: None, dtype: *dtype })),
        Some(other) => Err(fatal(diag, span, format!("relax.unique expects a tensor, found {other}"))),
    }
}

fn call_tir_shape(call: &Call, _span: Span, _diag: &mut DiagnosticContext) -> Result<Option<Expr>, BuildError> {
    Ok(call
        .args
        .get(2)
        .filter(|shape| shape.as_shape_values().is_some())
        .cloned())
}

fn call_tir_type(call: &Call, span: Span, diag: &mut DiagnosticContext) -> Result<Option<Type>, BuildError> {
    match call.type_args.as_slice() {
        [ty] => Ok(Some(ty.clone())),
        args => Err(fatal(
            diag,
            span,
            format!("relax.call_tir expects exactly one output type, found {}", args.len()),
        )),
    }
}
