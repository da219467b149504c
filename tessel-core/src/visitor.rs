#![forbid(unsafe_code)]

//! Read-only traversal.
//!
//! Each `visit_*` method defaults to the matching `walk_*` function, which
//! recurses into the node's children. Override a method to intercept a kind
//! and call the `walk_*` function to keep descending.
//!
//! Expression handlers only ever see variable *uses*. Definition sites
//! (function parameters, binding targets) go through
//! [`ExprVisitor::visit_var_def`].

use tessel_ir::{
    Binding, BindingBlock, Call, Constant, Expr, ExprKind, ExternFunc, Function, GlobalVar, If, MatchShape, Op,
    SeqExpr, ShapeExpr, Span, Tuple, TupleGetItem, Type, Var, VarBinding, VarNode,
};

pub trait ExprVisitor {
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    fn visit_constant(&mut self, expr: &Expr, _op: &Constant) {
        self.visit_span(expr.span());
    }

    fn visit_tuple(&mut self, expr: &Expr, op: &Tuple) {
        walk_tuple(self, expr, op);
    }

    fn visit_var(&mut self, expr: &Expr, _op: &VarNode) {
        self.visit_span(expr.span());
    }

    fn visit_dataflow_var(&mut self, expr: &Expr, _op: &VarNode) {
        self.visit_span(expr.span());
    }

    fn visit_shape_expr(&mut self, expr: &Expr, _op: &ShapeExpr) {
        self.visit_span(expr.span());
    }

    fn visit_runtime_dep_shape(&mut self, expr: &Expr) {
        self.visit_span(expr.span());
    }

    fn visit_extern_func(&mut self, expr: &Expr, _op: &ExternFunc) {
        self.visit_span(expr.span());
    }

    fn visit_global_var(&mut self, expr: &Expr, _op: &GlobalVar) {
        self.visit_span(expr.span());
    }

    fn visit_function(&mut self, expr: &Expr, op: &Function) {
        walk_function(self, expr, op);
    }

    fn visit_call(&mut self, expr: &Expr, op: &Call) {
        walk_call(self, expr, op);
    }

    fn visit_seq_expr(&mut self, expr: &Expr, op: &SeqExpr) {
        walk_seq_expr(self, expr, op);
    }

    fn visit_if(&mut self, expr: &Expr, op: &If) {
        walk_if(self, expr, op);
    }

    fn visit_op(&mut self, expr: &Expr, _op: &Op) {
        self.visit_span(expr.span());
    }

    fn visit_tuple_get_item(&mut self, expr: &Expr, op: &TupleGetItem) {
        self.visit_span(expr.span());
        self.visit_expr(&op.tuple);
    }

    fn visit_type(&mut self, _ty: &Type) {}

    fn visit_span(&mut self, _span: Span) {}

    fn visit_binding(&mut self, binding: &Binding) {
        match binding {
            Binding::Var(b) => self.visit_var_binding(b),
            Binding::MatchShape(b) => self.visit_match_shape(b),
        }
    }

    fn visit_var_binding(&mut self, binding: &VarBinding) {
        self.visit_expr(&binding.value);
        self.visit_var_def(&binding.var);
    }

    fn visit_match_shape(&mut self, binding: &MatchShape) {
        walk_match_shape(self, binding);
    }

    fn visit_binding_block(&mut self, block: &BindingBlock) {
        if block.is_dataflow {
            self.visit_dataflow_block(block);
        } else {
            self.visit_ordinary_block(block);
        }
    }

    fn visit_ordinary_block(&mut self, block: &BindingBlock) {
        for binding in &block.bindings {
            self.visit_binding(binding);
        }
    }

    fn visit_dataflow_block(&mut self, block: &BindingBlock) {
        for binding in &block.bindings {
            self.visit_binding(binding);
        }
    }

    fn visit_var_def(&mut self, var: &Var) {
        if var.is_dataflow() {
            self.visit_dataflow_var_def(var);
        } else {
            self.visit_plain_var_def(var);
        }
    }

    fn visit_plain_var_def(&mut self, var: &Var) {
        walk_var_def(self, var);
    }

    fn visit_dataflow_var_def(&mut self, var: &Var) {
        walk_var_def(self, var);
    }
}

pub fn walk_expr<V: ExprVisitor + ?Sized>(v: &mut V, expr: &Expr) {
    match expr.kind() {
        ExprKind::Constant(op) => v.visit_constant(expr, op),
        ExprKind::Tuple(op) => v.visit_tuple(expr, op),
        ExprKind::Var(op) => v.visit_var(expr, op),
        ExprKind::DataflowVar(op) => v.visit_dataflow_var(expr, op),
        ExprKind::ShapeExpr(op) => v.visit_shape_expr(expr, op),
        ExprKind::RuntimeDepShape => v.visit_runtime_dep_shape(expr),
        ExprKind::ExternFunc(op) => v.visit_extern_func(expr, op),
        ExprKind::GlobalVar(op) => v.visit_global_var(expr, op),
        ExprKind::Function(op) => v.visit_function(expr, op),
        ExprKind::Call(op) => v.visit_call(expr, op),
        ExprKind::SeqExpr(op) => v.visit_seq_expr(expr, op),
        ExprKind::If(op) => v.visit_if(expr, op),
        ExprKind::Op(op) => v.visit_op(expr, op),
        ExprKind::TupleGetItem(op) => v.visit_tuple_get_item(expr, op),
    }
}

pub fn walk_tuple<V: ExprVisitor + ?Sized>(v: &mut V, expr: &Expr, op: &Tuple) {
    v.visit_span(expr.span());
    for field in &op.fields {
        v.visit_expr(field);
    }
}

pub fn walk_function<V: ExprVisitor + ?Sized>(v: &mut V, expr: &Expr, op: &Function) {
    v.visit_span(expr.span());
    for param in &op.params {
        v.visit_var_def(param);
    }
    if let Some(ret) = &op.ret_type {
        v.visit_type(ret);
    }
    v.visit_expr(&op.body);
}

/// Callee first, then type arguments, then arguments in order.
pub fn walk_call<V: ExprVisitor + ?Sized>(v: &mut V, expr: &Expr, op: &Call) {
    v.visit_span(expr.span());
    v.visit_expr(&op.op);
    for ty in &op.type_args {
        v.visit_type(ty);
    }
    for arg in &op.args {
        v.visit_expr(arg);
    }
}

pub fn walk_seq_expr<V: ExprVisitor + ?Sized>(v: &mut V, expr: &Expr, op: &SeqExpr) {
    v.visit_span(expr.span());
    for block in &op.blocks {
        v.visit_binding_block(block);
    }
    v.visit_expr(&op.body);
}

pub fn walk_if<V: ExprVisitor + ?Sized>(v: &mut V, expr: &Expr, op: &If) {
    v.visit_span(expr.span());
    v.visit_expr(&op.cond);
    v.visit_expr(&op.true_branch);
    v.visit_expr(&op.false_branch);
}

pub fn walk_match_shape<V: ExprVisitor + ?Sized>(v: &mut V, binding: &MatchShape) {
    v.visit_expr(&binding.value);
    v.visit_expr(&Expr::shape_expr(binding.pattern.clone()));
    v.visit_var_def(&binding.var);
}

/// Visits the span and, when present, the shape annotation of a definition.
pub fn walk_var_def<V: ExprVisitor + ?Sized>(v: &mut V, var: &Var) {
    v.visit_span(var.span());
    if let Some(shape) = var.shape() {
        v.visit_expr(shape);
    }
}

struct PostOrder<F> {
    f: F,
}

impl<F: FnMut(&Expr)> ExprVisitor for PostOrder<F> {
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
        (self.f)(expr);
    }
}

/// Calls `f` on every sub-expression of `expr`, children before parents.
pub fn post_order_visit(expr: &Expr, f: impl FnMut(&Expr)) {
    PostOrder { f }.visit_expr(expr);
}
