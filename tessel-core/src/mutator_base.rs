#![forbid(unsafe_code)]

//! Bottom-up rewriting without normal-form guarantees.
//!
//! Children may be arbitrarily nested and annotations may be missing. A
//! handler rebuilds its node from the rewritten children and hands back the
//! original node when none of them changed. Rebuilt nodes keep the source
//! span but drop stale annotations.

use tessel_ir::{
    Binding, BindingBlock, Call, Constant, Expr, ExprKind, ExternFunc, Function, GlobalVar, If, MatchShape, Op,
    SeqExpr, ShapeExpr, Tuple, TupleGetItem, Type, VarBinding, VarNode,
};

pub trait ExprMutatorBase {
    fn visit_expr(&mut self, expr: &Expr) -> Expr {
        rewrite_expr(self, expr)
    }

    fn visit_constant(&mut self, expr: &Expr, _op: &Constant) -> Expr {
        expr.clone()
    }

    fn visit_var(&mut self, expr: &Expr, _op: &VarNode) -> Expr {
        expr.clone()
    }

    fn visit_dataflow_var(&mut self, expr: &Expr, _op: &VarNode) -> Expr {
        expr.clone()
    }

    fn visit_shape_expr(&mut self, expr: &Expr, _op: &ShapeExpr) -> Expr {
        expr.clone()
    }

    fn visit_runtime_dep_shape(&mut self, expr: &Expr) -> Expr {
        expr.clone()
    }

    fn visit_extern_func(&mut self, expr: &Expr, _op: &ExternFunc) -> Expr {
        expr.clone()
    }

    fn visit_global_var(&mut self, expr: &Expr, _op: &GlobalVar) -> Expr {
        expr.clone()
    }

    fn visit_op(&mut self, expr: &Expr, _op: &Op) -> Expr {
        expr.clone()
    }

    fn visit_tuple(&mut self, expr: &Expr, op: &Tuple) -> Expr {
        rewrite_tuple(self, expr, op)
    }

    fn visit_function(&mut self, expr: &Expr, op: &Function) -> Expr {
        rewrite_function(self, expr, op)
    }

    fn visit_call(&mut self, expr: &Expr, op: &Call) -> Expr {
        rewrite_call(self, expr, op)
    }

    fn visit_seq_expr(&mut self, expr: &Expr, op: &SeqExpr) -> Expr {
        rewrite_seq_expr(self, expr, op)
    }

    fn visit_if(&mut self, expr: &Expr, op: &If) -> Expr {
        rewrite_if(self, expr, op)
    }

    fn visit_tuple_get_item(&mut self, expr: &Expr, op: &TupleGetItem) -> Expr {
        let tuple = self.visit_expr(&op.tuple);
        if tuple.same_as(&op.tuple) {
            return expr.clone();
        }
        Expr::tuple_get_item(tuple, op.index).with_span(expr.span())
    }

    fn visit_binding_block(&mut self, block: &BindingBlock) -> BindingBlock {
        rewrite_binding_block(self, block)
    }

    /// Hook for type annotations embedded in calls and functions.
    fn visit_type(&mut self, ty: &Type) -> Type {
        ty.clone()
    }
}

pub fn rewrite_expr<M: ExprMutatorBase + ?Sized>(m: &mut M, expr: &Expr) -> Expr {
    match expr.kind() {
        ExprKind::Constant(op) => m.visit_constant(expr, op),
        ExprKind::Tuple(op) => m.visit_tuple(expr, op),
        ExprKind::Var(op) => m.visit_var(expr, op),
        ExprKind::DataflowVar(op) => m.visit_dataflow_var(expr, op),
        ExprKind::ShapeExpr(op) => m.visit_shape_expr(expr, op),
        ExprKind::RuntimeDepShape => m.visit_runtime_dep_shape(expr),
        ExprKind::ExternFunc(op) => m.visit_extern_func(expr, op),
        ExprKind::GlobalVar(op) => m.visit_global_var(expr, op),
        ExprKind::Function(op) => m.visit_function(expr, op),
        ExprKind::Call(op) => m.visit_call(expr, op),
        ExprKind::SeqExpr(op) => m.visit_seq_expr(expr, op),
        ExprKind::If(op) => m.visit_if(expr, op),
        ExprKind::Op(op) => m.visit_op(expr, op),
        ExprKind::TupleGetItem(op) => m.visit_tuple_get_item(expr, op),
    }
}

pub fn rewrite_tuple<M: ExprMutatorBase + ?Sized>(m: &mut M, expr: &Expr, op: &Tuple) -> Expr {
    let mut unchanged = true;
    let fields: Vec<Expr> = op
        .fields
        .iter()
        .map(|field| {
            let new_field = m.visit_expr(field);
            unchanged &= new_field.same_as(field);
            new_field
        })
        .collect();
    if unchanged {
        return expr.clone();
    }
    Expr::tuple(fields).with_span(expr.span())
}

pub fn rewrite_function<M: ExprMutatorBase + ?Sized>(m: &mut M, expr: &Expr, op: &Function) -> Expr {
    let ret_type = op.ret_type.as_ref().map(|t| m.visit_type(t));
    let body = m.visit_expr(&op.body);
    if body.same_as(&op.body) && ret_type == op.ret_type {
        return expr.clone();
    }
    Expr::function(op.params.clone(), body, ret_type).with_span(expr.span())
}

pub fn rewrite_call<M: ExprMutatorBase + ?Sized>(m: &mut M, expr: &Expr, op: &Call) -> Expr {
    let callee = m.visit_expr(&op.op);
    let mut unchanged = callee.same_as(&op.op);

    let type_args: Vec<Type> = op.type_args.iter().map(|t| m.visit_type(t)).collect();
    unchanged &= type_args == op.type_args;

    let args: Vec<Expr> = op
        .args
        .iter()
        .map(|arg| {
            let new_arg = m.visit_expr(arg);
            unchanged &= new_arg.same_as(arg);
            new_arg
        })
        .collect();

    if unchanged {
        return expr.clone();
    }
    Expr::call_with(callee, args, op.attrs.clone(), type_args).with_span(expr.span())
}

pub fn rewrite_if<M: ExprMutatorBase + ?Sized>(m: &mut M, expr: &Expr, op: &If) -> Expr {
    let cond = m.visit_expr(&op.cond);
    let true_branch = m.visit_expr(&op.true_branch);
    let false_branch = m.visit_expr(&op.false_branch);
    if cond.same_as(&op.cond) && true_branch.same_as(&op.true_branch) && false_branch.same_as(&op.false_branch) {
        return expr.clone();
    }
    Expr::if_then_else(cond, true_branch, false_branch).with_span(expr.span())
}

/// Blocks left empty by the rewrite are dropped.
pub fn rewrite_seq_expr<M: ExprMutatorBase + ?Sized>(m: &mut M, expr: &Expr, op: &SeqExpr) -> Expr {
    let mut unchanged = true;
    let mut blocks = Vec::with_capacity(op.blocks.len());
    for block in &op.blocks {
        let new_block = m.visit_binding_block(block);
        unchanged &= new_block == *block;
        if !new_block.is_empty() {
            blocks.push(new_block);
        }
    }
    let body = m.visit_expr(&op.body);
    if unchanged && body.same_as(&op.body) {
        return expr.clone();
    }
    Expr::seq(blocks, body).with_span(expr.span())
}

/// Rewrites bound values; binding targets and match patterns are kept.
pub fn rewrite_binding_block<M: ExprMutatorBase + ?Sized>(m: &mut M, block: &BindingBlock) -> BindingBlock {
    let bindings: Vec<Binding> = block
        .bindings
        .iter()
        .map(|binding| match binding {
            Binding::Var(b) => VarBinding::new(b.var.clone(), m.visit_expr(&b.value)).into(),
            Binding::MatchShape(b) => {
                MatchShape::new(m.visit_expr(&b.value), b.pattern.clone(), b.var.clone()).into()
            }
        })
        .collect();
    BindingBlock {
        bindings,
        is_dataflow: block.is_dataflow,
    }
}
