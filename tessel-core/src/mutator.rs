#![forbid(unsafe_code)]

//! Rewriting that keeps its output in A-normal form.
//!
//! An [`ExprMutator`] drives a [`BlockBuilder`]: every binding it keeps is
//! re-emitted into a freshly opened block, and every non-atomic value that
//! lands in an argument position is bound to a new variable first. When a
//! rewrite changes a variable's annotations, the variable is replaced by an
//! updated copy and later uses are redirected to it.

use std::collections::HashMap;

use tessel_ir::{
    Binding, BindingBlock, Call, Constant, Expr, ExprKind, ExternFunc, Function, GlobalVar, Id, If, MatchShape, Op,
    PrimExpr, SeqExpr, ShapeExpr, Tuple, TupleGetItem, Type, Var, VarBinding, VarNode,
};

use crate::block_builder::{BlockBuilder, BlockKind};
use crate::error::BuildError;

/// Builder and variable remapping owned by a running mutator.
#[derive(Default)]
pub struct MutatorCtx {
    pub builder: BlockBuilder,
    var_remap: HashMap<Id, Var>,
}

impl MutatorCtx {
    pub fn new(builder: BlockBuilder) -> Self {
        Self {
            builder,
            var_remap: HashMap::new(),
        }
    }

    /// Redirects later uses of `from` to `to`.
    pub fn remap(&mut self, from: &Id, to: Var) {
        tracing::trace!(from = from.name_hint(), to = to.name_hint(), "remap variable");
        self.var_remap.insert(from.clone(), to);
    }

    pub fn remapped(&self, vid: &Id) -> Option<&Var> {
        self.var_remap.get(vid)
    }
}

pub trait ExprMutator {
    fn ctx(&mut self) -> &mut MutatorCtx;

    /// Rewrites `expr`, then renormalizes the result through the builder so
    /// rebuilt calls carry fresh annotations.
    fn visit_expr(&mut self, expr: &Expr) -> Result<Expr, BuildError> {
        let rewritten = self.visit_expr_post_order(expr)?;
        self.ctx().builder.normalize(&rewritten)
    }

    /// Rewrites `expr` without renormalizing it.
    fn visit_expr_post_order(&mut self, expr: &Expr) -> Result<Expr, BuildError> {
        rewrite_expr(self, expr)
    }

    fn visit_constant(&mut self, expr: &Expr, _op: &Constant) -> Result<Expr, BuildError> {
        Ok(expr.clone())
    }

    /// A use of an ordinary variable.
    fn visit_var(&mut self, expr: &Expr, op: &VarNode) -> Result<Expr, BuildError> {
        Ok(remap_use(self, expr, op))
    }

    fn visit_dataflow_var(&mut self, expr: &Expr, op: &VarNode) -> Result<Expr, BuildError> {
        Ok(remap_use(self, expr, op))
    }

    fn visit_shape_expr(&mut self, expr: &Expr, _op: &ShapeExpr) -> Result<Expr, BuildError> {
        Ok(expr.clone())
    }

    fn visit_runtime_dep_shape(&mut self, expr: &Expr) -> Result<Expr, BuildError> {
        Ok(expr.clone())
    }

    fn visit_extern_func(&mut self, expr: &Expr, _op: &ExternFunc) -> Result<Expr, BuildError> {
        Ok(expr.clone())
    }

    fn visit_global_var(&mut self, expr: &Expr, _op: &GlobalVar) -> Result<Expr, BuildError> {
        Ok(expr.clone())
    }

    fn visit_op(&mut self, expr: &Expr, _op: &Op) -> Result<Expr, BuildError> {
        Ok(expr.clone())
    }

    fn visit_tuple(&mut self, expr: &Expr, op: &Tuple) -> Result<Expr, BuildError> {
        rewrite_tuple(self, expr, op)
    }

    fn visit_function(&mut self, expr: &Expr, op: &Function) -> Result<Expr, BuildError> {
        rewrite_function(self, expr, op)
    }

    fn visit_call(&mut self, expr: &Expr, op: &Call) -> Result<Expr, BuildError> {
        rewrite_call(self, expr, op)
    }

    fn visit_seq_expr(&mut self, expr: &Expr, op: &SeqExpr) -> Result<Expr, BuildError> {
        rewrite_seq_expr(self, expr, op)
    }

    fn visit_if(&mut self, expr: &Expr, op: &If) -> Result<Expr, BuildError> {
        rewrite_if(self, expr, op)
    }

    fn visit_tuple_get_item(&mut self, expr: &Expr, op: &TupleGetItem) -> Result<Expr, BuildError> {
        let tuple = self.visit_expr(&op.tuple)?;
        let tuple = normalize_arg(self, &op.tuple, tuple)?;
        if tuple.same_as(&op.tuple) {
            return Ok(expr.clone());
        }
        Ok(Expr::tuple_get_item(tuple, op.index).with_span(expr.span()))
    }

    fn visit_type(&mut self, ty: &Type) -> Type {
        ty.clone()
    }

    /// Rewrites `expr` inside a fresh ordinary block. Anything emitted on
    /// the way is wrapped around the result as a prologue.
    fn visit_with_new_scope(&mut self, expr: &Expr) -> Result<Expr, BuildError> {
        let base = self.ctx().builder.open_scope(BlockKind::Ordinary);
        let out = self.visit_expr(expr);
        let (prologue, body) = self.ctx().builder.close_scope(base, out)?;
        if prologue.is_empty() {
            return Ok(body);
        }
        Ok(Expr::seq(vec![prologue], body))
    }

    fn visit_binding(&mut self, binding: &Binding) -> Result<(), BuildError> {
        match binding {
            Binding::Var(b) => self.visit_var_binding(b),
            Binding::MatchShape(b) => self.visit_match_shape(b),
        }
    }

    fn visit_var_binding(&mut self, binding: &VarBinding) -> Result<(), BuildError> {
        rewrite_var_binding(self, binding)
    }

    fn visit_match_shape(&mut self, binding: &MatchShape) -> Result<(), BuildError> {
        rewrite_match_shape(self, binding)
    }

    fn visit_binding_block(&mut self, block: &BindingBlock) -> Result<BindingBlock, BuildError> {
        if block.is_dataflow {
            self.visit_dataflow_block(block)
        } else {
            self.visit_ordinary_block(block)
        }
    }

    fn visit_ordinary_block(&mut self, block: &BindingBlock) -> Result<BindingBlock, BuildError> {
        rewrite_block(self, BlockKind::Ordinary, block)
    }

    fn visit_dataflow_block(&mut self, block: &BindingBlock) -> Result<BindingBlock, BuildError> {
        rewrite_block(self, BlockKind::Dataflow, block)
    }

    fn visit_var_def(&mut self, var: &Var) -> Result<Var, BuildError> {
        if var.is_dataflow() {
            self.visit_dataflow_var_def(var)
        } else {
            self.visit_plain_var_def(var)
        }
    }

    fn visit_plain_var_def(&mut self, var: &Var) -> Result<Var, BuildError> {
        rewrite_var_def(self, var)
    }

    fn visit_dataflow_var_def(&mut self, var: &Var) -> Result<Var, BuildError> {
        rewrite_var_def(self, var)
    }

    /// `var` carrying `shape` and `ty`. Same node when the shape provably
    /// matches and the type is equal.
    fn with_shape_and_type(&mut self, var: &Var, shape: Option<&Expr>, ty: Option<&Type>) -> Var {
        let shape_changed = match (var.shape(), shape) {
            (None, None) => false,
            (Some(old), Some(new)) => !self.ctx().builder.can_prove_shape_equal(old, new),
            _ => true,
        };
        let type_changed = var.checked_type() != ty;
        if !shape_changed && !type_changed {
            return var.clone();
        }
        let shape = if shape_changed { shape } else { var.shape() };
        let ty = if type_changed { ty } else { var.checked_type() };
        var.with_annotations(shape.cloned(), ty.cloned())
    }

    /// Value bound to `var` in the output, `None` for parameters.
    fn lookup_binding(&mut self, var: &Var) -> Result<Option<Expr>, BuildError> {
        self.ctx().builder.lookup_binding(var)
    }
}

fn remap_use<M: ExprMutator + ?Sized>(m: &mut M, expr: &Expr, op: &VarNode) -> Expr {
    match m.ctx().remapped(&op.vid) {
        Some(var) => var.to_expr(),
        None => expr.clone(),
    }
}

pub fn rewrite_expr<M: ExprMutator + ?Sized>(m: &mut M, expr: &Expr) -> Result<Expr, BuildError> {
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

/// Binds a rewritten argument to a fresh variable unless it is unchanged
/// or already atomic.
pub fn normalize_arg<M: ExprMutator + ?Sized>(m: &mut M, original: &Expr, rewritten: Expr) -> Result<Expr, BuildError> {
    if rewritten.same_as(original) || rewritten.is_atomic() {
        return Ok(rewritten);
    }
    m.ctx().builder.emit(&rewritten, None).map(Expr::from)
}

pub fn rewrite_tuple<M: ExprMutator + ?Sized>(m: &mut M, expr: &Expr, op: &Tuple) -> Result<Expr, BuildError> {
    let mut unchanged = true;
    let mut fields = Vec::with_capacity(op.fields.len());
    for field in &op.fields {
        let new_field = m.visit_expr(field)?;
        let new_field = normalize_arg(m, field, new_field)?;
        unchanged &= new_field.same_as(field);
        fields.push(new_field);
    }
    if unchanged {
        return Ok(expr.clone());
    }
    Ok(Expr::tuple(fields).with_span(expr.span()))
}

/// Parameters are registered with the builder before the body is visited,
/// so lookups inside the body resolve them as unbound.
pub fn rewrite_function<M: ExprMutator + ?Sized>(m: &mut M, expr: &Expr, op: &Function) -> Result<Expr, BuildError> {
    let mut unchanged = true;
    let mut params = Vec::with_capacity(op.params.len());
    for param in &op.params {
        let new_param = m.visit_var_def(param)?;
        unchanged &= new_param.same_as(param);
        params.push(new_param);
    }
    let builder = &mut m.ctx().builder;
    builder.declare_params(&op.params);
    builder.declare_params(&params);

    let ret_type = op.ret_type.as_ref().map(|t| m.visit_type(t));
    let body = m.visit_with_new_scope(&op.body)?;
    if unchanged && ret_type == op.ret_type && body.same_as(&op.body) {
        return Ok(expr.clone());
    }
    Ok(Expr::function(params, body, ret_type).with_span(expr.span()))
}

pub fn rewrite_call<M: ExprMutator + ?Sized>(m: &mut M, expr: &Expr, op: &Call) -> Result<Expr, BuildError> {
    let callee = m.visit_expr(&op.op)?;
    let mut unchanged = callee.same_as(&op.op);

    let type_args: Vec<Type> = op.type_args.iter().map(|t| m.visit_type(t)).collect();
    unchanged &= type_args == op.type_args;

    let mut args = Vec::with_capacity(op.args.len());
    for arg in &op.args {
        let new_arg = m.visit_expr(arg)?;
        let new_arg = normalize_arg(m, arg, new_arg)?;
        unchanged &= new_arg.same_as(arg);
        args.push(new_arg);
    }

    if unchanged {
        return Ok(expr.clone());
    }
    Ok(Expr::call_with(callee, args, op.attrs.clone(), type_args).with_span(expr.span()))
}

/// Each branch gets its own scope; the condition is normalized in the
/// enclosing block.
pub fn rewrite_if<M: ExprMutator + ?Sized>(m: &mut M, expr: &Expr, op: &If) -> Result<Expr, BuildError> {
    let cond = m.visit_expr(&op.cond)?;
    let cond = normalize_arg(m, &op.cond, cond)?;
    let true_branch = m.visit_with_new_scope(&op.true_branch)?;
    let false_branch = m.visit_with_new_scope(&op.false_branch)?;
    if cond.same_as(&op.cond) && true_branch.same_as(&op.true_branch) && false_branch.same_as(&op.false_branch) {
        return Ok(expr.clone());
    }
    Ok(Expr::if_then_else(cond, true_branch, false_branch).with_span(expr.span()))
}

/// Blocks left empty are dropped. Bindings emitted while rewriting the body
/// become a trailing ordinary block.
pub fn rewrite_seq_expr<M: ExprMutator + ?Sized>(m: &mut M, expr: &Expr, op: &SeqExpr) -> Result<Expr, BuildError> {
    let mut unchanged = true;
    let mut blocks = Vec::with_capacity(op.blocks.len() + 1);
    for block in &op.blocks {
        let new_block = m.visit_binding_block(block)?;
        unchanged &= new_block == *block;
        if !new_block.is_empty() {
            blocks.push(new_block);
        }
    }

    let base = m.ctx().builder.open_scope(BlockKind::Ordinary);
    let out = m.visit_expr(&op.body);
    let (prologue, body) = m.ctx().builder.close_scope(base, out)?;
    if !prologue.is_empty() {
        blocks.push(prologue);
        unchanged = false;
    }

    if unchanged && body.same_as(&op.body) {
        return Ok(expr.clone());
    }
    Ok(Expr::seq(blocks, body).with_span(expr.span()))
}

pub fn rewrite_block<M: ExprMutator + ?Sized>(
    m: &mut M,
    kind: BlockKind,
    block: &BindingBlock,
) -> Result<BindingBlock, BuildError> {
    let base = m.ctx().builder.open_scope(kind);
    let out = block.bindings.iter().try_for_each(|binding| m.visit_binding(binding));
    let (new_block, ()) = m.ctx().builder.close_scope(base, out)?;
    Ok(new_block)
}

/// Rewrites the shape annotation of a definition. A changed annotation
/// yields a new variable with the same identity, and uses are redirected
/// to it.
pub fn rewrite_var_def<M: ExprMutator + ?Sized>(m: &mut M, var: &Var) -> Result<Var, BuildError> {
    let Some(shape) = var.shape() else {
        return Ok(var.clone());
    };
    let new_shape = m.visit_expr(shape)?;
    if new_shape.same_as(shape) {
        return Ok(var.clone());
    }
    let new_var = var.with_annotations(Some(new_shape), var.checked_type().cloned());
    if !new_var.same_as(var) {
        m.ctx().remap(var.vid(), new_var.clone());
    }
    Ok(new_var)
}

/// Re-emits the binding. An unchanged binding is emitted as is; otherwise
/// the variable takes on the new value's annotations.
pub fn rewrite_var_binding<M: ExprMutator + ?Sized>(m: &mut M, binding: &VarBinding) -> Result<(), BuildError> {
    let new_value = m.visit_expr(&binding.value)?;
    let mut new_var = m.visit_var_def(&binding.var)?;

    if new_var.same_as(&binding.var) && new_value.same_as(&binding.value) {
        return emit_var_binding(m, binding.clone());
    }

    let updated = m.with_shape_and_type(&new_var, new_value.shape(), new_value.checked_type());
    if !updated.same_as(&new_var) {
        new_var = updated;
        m.ctx().remap(binding.var.vid(), new_var.clone());
    }
    emit_var_binding(m, VarBinding::new(new_var, new_value))
}

/// Ordinary variables bound inside a dataflow block are outputs.
fn emit_var_binding<M: ExprMutator + ?Sized>(m: &mut M, binding: VarBinding) -> Result<(), BuildError> {
    let builder = &mut m.ctx().builder;
    if builder.is_dataflow()? && !binding.var.is_dataflow() {
        builder.emit_output_binding(binding)?;
    } else {
        builder.emit_binding(binding)?;
    }
    Ok(())
}

/// Re-emits a match-shape binding.
///
/// The pattern is rewritten as a shape expression. A tensor-typed value
/// gives the variable the pattern as its shape. Inside a dataflow block a
/// `DataflowVar` target is re-derived through
/// [`BlockBuilder::emit_match_shape`] under a fresh variable, and later
/// uses are redirected to it.
pub fn rewrite_match_shape<M: ExprMutator + ?Sized>(m: &mut M, binding: &MatchShape) -> Result<(), BuildError> {
    let new_value = m.visit_expr(&binding.value)?;

    let pattern_expr = Expr::shape_expr(binding.pattern.clone());
    let new_pattern_expr = m.visit_expr(&pattern_expr)?;
    let pattern_changed = !new_pattern_expr.same_as(&pattern_expr);
    let new_pattern: Vec<PrimExpr> = match new_pattern_expr.as_shape_values() {
        Some(values) => values.to_vec(),
        None => binding.pattern.clone(),
    };

    let new_shape = match new_value.checked_type() {
        Some(Type::DynTensor { .. }) => Some(Expr::shape_expr(new_pattern.clone())),
        _ => None,
    };

    let mut new_var = m.visit_var_def(&binding.var)?;
    let updated = m.with_shape_and_type(&new_var, new_shape.as_ref(), new_value.checked_type());
    if !updated.same_as(&new_var) {
        new_var = updated;
        m.ctx().remap(binding.var.vid(), new_var.clone());
    }

    let unchanged = new_value.same_as(&binding.value) && !pattern_changed && new_var.same_as(&binding.var);
    let rewritten = if unchanged {
        binding.clone()
    } else {
        MatchShape::new(new_value, new_pattern, new_var)
    };

    let builder = &mut m.ctx().builder;
    if builder.is_dataflow()? && rewritten.var.is_dataflow() {
        let fresh = builder.emit_match_shape(&rewritten.value, rewritten.pattern, Some(rewritten.var.name_hint()))?;
        m.ctx().remap(binding.var.vid(), fresh);
    } else {
        builder.emit_match_shape_binding(rewritten)?;
    }
    Ok(())
}
