#![forbid(unsafe_code)]

//! Single dispatch over the closed expression grammar.
//!
//! [`ExprFunctor`] routes an expression to one handler per node kind and
//! forwards an extra argument of type `A` to it. Every handler falls back to
//! [`ExprFunctor::visit_expr_default`], so an implementor only writes the
//! kinds it cares about. The match in [`dispatch`] is exhaustive; adding a
//! node kind is a compile error here until it is routed.

use tessel_ir::{
    Call, Constant, Expr, ExprKind, ExternFunc, Function, GlobalVar, If, Op, SeqExpr, ShapeExpr, Tuple,
    TupleGetItem, VarNode,
};

pub trait ExprFunctor<A = ()> {
    type Output;

    fn visit_expr(&mut self, expr: &Expr, arg: A) -> Self::Output {
        dispatch(self, expr, arg)
    }

    /// Handler for kinds the implementor leaves unrouted.
    fn visit_expr_default(&mut self, expr: &Expr, arg: A) -> Self::Output;

    fn visit_constant(&mut self, expr: &Expr, _op: &Constant, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }

    fn visit_tuple(&mut self, expr: &Expr, _op: &Tuple, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }

    fn visit_var(&mut self, expr: &Expr, _op: &VarNode, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }

    fn visit_dataflow_var(&mut self, expr: &Expr, _op: &VarNode, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }

    fn visit_shape_expr(&mut self, expr: &Expr, _op: &ShapeExpr, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }

    fn visit_runtime_dep_shape(&mut self, expr: &Expr, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }

    fn visit_extern_func(&mut self, expr: &Expr, _op: &ExternFunc, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }

    fn visit_global_var(&mut self, expr: &Expr, _op: &GlobalVar, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }

    fn visit_function(&mut self, expr: &Expr, _op: &Function, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }

    fn visit_call(&mut self, expr: &Expr, _op: &Call, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }

    fn visit_seq_expr(&mut self, expr: &Expr, _op: &SeqExpr, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }

    fn visit_if(&mut self, expr: &Expr, _op: &If, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }

    fn visit_op(&mut self, expr: &Expr, _op: &Op, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }

    fn visit_tuple_get_item(&mut self, expr: &Expr, _op: &TupleGetItem, arg: A) -> Self::Output {
        self.visit_expr_default(expr, arg)
    }
}

/// Routes `expr` to the handler for its kind.
pub fn dispatch<F, A>(f: &mut F, expr: &Expr, arg: A) -> F::Output
where
    F: ExprFunctor<A> + ?Sized,
{
    match expr.kind() {
        ExprKind::Constant(op) => f.visit_constant(expr, op, arg),
        ExprKind::Tuple(op) => f.visit_tuple(expr, op, arg),
        ExprKind::Var(op) => f.visit_var(expr, op, arg),
        ExprKind::DataflowVar(op) => f.visit_dataflow_var(expr, op, arg),
        ExprKind::ShapeExpr(op) => f.visit_shape_expr(expr, op, arg),
        ExprKind::RuntimeDepShape => f.visit_runtime_dep_shape(expr, arg),
        ExprKind::ExternFunc(op) => f.visit_extern_func(expr, op, arg),
        ExprKind::GlobalVar(op) => f.visit_global_var(expr, op, arg),
        ExprKind::Function(op) => f.visit_function(expr, op, arg),
        ExprKind::Call(op) => f.visit_call(expr, op, arg),
        ExprKind::SeqExpr(op) => f.visit_seq_expr(expr, op, arg),
        ExprKind::If(op) => f.visit_if(expr, op, arg),
        ExprKind::Op(op) => f.visit_op(expr, op, arg),
        ExprKind::TupleGetItem(op) => f.visit_tuple_get_item(expr, op, arg),
    }
}
