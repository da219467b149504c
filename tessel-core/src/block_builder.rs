#![forbid(unsafe_code)]

//! Incremental construction of binding blocks.
//!
//! A [`BlockBuilder`] keeps a stack of open frames. Emission appends to the
//! top frame; [`BlockBuilder::end_block`] pops it into an immutable
//! [`BindingBlock`]. The binding table and the name table outlive individual
//! blocks and only ever grow.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tessel_arith::{Analyzer, Prover};
use tessel_ir::{
    Binding, BindingBlock, Call, Expr, ExprKind, Id, MatchShape, PrimExpr, Span, Type, Var, VarBinding,
};

use crate::diagnostic::{DiagnosticContext, IrDiagnostic};
use crate::error::BuildError;
use crate::name_table::NameTable;
use crate::op::OpRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Ordinary,
    Dataflow,
}

/// In-progress block.
#[derive(Debug)]
struct BlockFrame {
    bindings: Vec<Binding>,
    is_dataflow: bool,
}

#[derive(Clone, Debug)]
pub struct BuilderConfig {
    /// Name hint for variables emitted into dataflow blocks.
    pub local_name_hint: String,
    /// Name hint for ordinary variables.
    pub global_name_hint: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            local_name_hint: "lv".to_string(),
            global_name_hint: "gv".to_string(),
        }
    }
}

pub struct BlockBuilder {
    config: BuilderConfig,
    registry: Rc<OpRegistry>,
    prover: Box<dyn Prover>,
    block_stack: Vec<BlockFrame>,
    binding_table: HashMap<Id, Expr>,
    params: HashSet<Id>,
    name_table: NameTable,
    diag_ctx: DiagnosticContext,
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockBuilder {
    /// Default configuration with the built-in operator rules.
    pub fn new() -> Self {
        Self::with_config(BuilderConfig::default(), Rc::new(OpRegistry::with_builtins()))
    }

    pub fn with_config(config: BuilderConfig, registry: Rc<OpRegistry>) -> Self {
        Self {
            config,
            registry,
            prover: Box::new(Analyzer::new()),
            block_stack: Vec::new(),
            binding_table: HashMap::new(),
            params: HashSet::new(),
            name_table: NameTable::new(),
            diag_ctx: DiagnosticContext::new(),
        }
    }

    /// Replaces the dimension prover used by [`BlockBuilder::can_prove_shape_equal`].
    pub fn with_prover(mut self, prover: Box<dyn Prover>) -> Self {
        self.prover = prover;
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn registry(&self) -> &Rc<OpRegistry> {
        &self.registry
    }

    pub fn diagnostics(&self) -> &DiagnosticContext {
        &self.diag_ctx
    }

    /// Number of blocks currently open.
    pub fn depth(&self) -> usize {
        self.block_stack.len()
    }

    pub fn begin_dataflow_block(&mut self) {
        self.begin_block(BlockKind::Dataflow);
    }

    pub fn begin_binding_block(&mut self) {
        self.begin_block(BlockKind::Ordinary);
    }

    pub fn begin_block(&mut self, kind: BlockKind) {
        self.block_stack.push(BlockFrame {
            bindings: Vec::new(),
            is_dataflow: kind == BlockKind::Dataflow,
        });
        tracing::debug!(?kind, depth = self.block_stack.len(), "begin block");
    }

    pub fn end_block(&mut self) -> Result<BindingBlock, BuildError> {
        let frame = self.block_stack.pop().ok_or(BuildError::NoActiveBlock)?;
        tracing::debug!(
            dataflow = frame.is_dataflow,
            bindings = frame.bindings.len(),
            depth = self.block_stack.len(),
            "end block"
        );
        Ok(BindingBlock {
            bindings: frame.bindings,
            is_dataflow: frame.is_dataflow,
        })
    }

    /// Opens a block of `kind`, runs `body`, and closes the block on every
    /// exit path. `body` must leave the stack as it found it.
    pub fn scope<T>(
        &mut self,
        kind: BlockKind,
        body: impl FnOnce(&mut Self) -> Result<T, BuildError>,
    ) -> Result<(BindingBlock, T), BuildError> {
        let base = self.open_scope(kind);
        let out = body(self);
        self.close_scope(base, out)
    }

    /// First half of [`BlockBuilder::scope`] for callers that cannot hand
    /// the builder to a closure. Returns the depth to pass to
    /// [`BlockBuilder::close_scope`].
    pub fn open_scope(&mut self, kind: BlockKind) -> usize {
        let base = self.block_stack.len();
        self.begin_block(kind);
        base
    }

    /// Closes the block opened by [`BlockBuilder::open_scope`] at `base`,
    /// whatever `out` holds.
    pub fn close_scope<T>(
        &mut self,
        base: usize,
        out: Result<T, BuildError>,
    ) -> Result<(BindingBlock, T), BuildError> {
        let found = self.block_stack.len();
        if found != base + 1 {
            self.block_stack.truncate(base);
            return Err(BuildError::UnbalancedScope {
                expected: base + 1,
                found,
            });
        }
        let block = self.end_block()?;
        Ok((block, out?))
    }

    pub fn is_dataflow(&self) -> Result<bool, BuildError> {
        self.block_stack
            .last()
            .map(|frame| frame.is_dataflow)
            .ok_or(BuildError::NoActiveBlock)
    }

    fn current_frame(&mut self) -> Result<&mut BlockFrame, BuildError> {
        self.block_stack.last_mut().ok_or(BuildError::NoActiveBlock)
    }

    fn fresh_var(&mut self, is_dataflow: bool, name_hint: Option<&str>) -> Id {
        let hint = match name_hint {
            Some(hint) if !hint.is_empty() => hint,
            _ if is_dataflow => self.config.local_name_hint.as_str(),
            _ => self.config.global_name_hint.as_str(),
        };
        let name = self.name_table.unique_name(hint);
        tracing::trace!(%name, dataflow = is_dataflow, "minted variable");
        Id::new(&name)
    }

    /// Runs the registered rules for `call`. Missing rules yield `None`.
    fn infer(&mut self, call: &Call, span: Span) -> Result<(Option<Expr>, Option<Type>), BuildError> {
        let registry = Rc::clone(&self.registry);
        let Some(rule) = registry.rule_for(call) else {
            return Ok((None, None));
        };
        let shape = rule.infer_shape(call, span, &mut self.diag_ctx)?;
        let ty = rule.infer_type(call, span, &mut self.diag_ctx)?;
        Ok((shape, ty))
    }

    /// Binds `value` to a fresh variable in the current block.
    ///
    /// The variable is a `DataflowVar` inside a dataflow block. Calls are
    /// annotated by their operator's rules; the annotations land on a copy of
    /// the call and on the variable.
    pub fn emit(&mut self, value: &Expr, name_hint: Option<&str>) -> Result<Var, BuildError> {
        let is_dataflow = self.is_dataflow()?;
        self.emit_as(value, is_dataflow, name_hint)
    }

    fn emit_as(&mut self, value: &Expr, is_dataflow: bool, name_hint: Option<&str>) -> Result<Var, BuildError> {
        self.current_frame()?;
        let vid = self.fresh_var(is_dataflow, name_hint);

        let (var, value) = match value.kind() {
            ExprKind::Call(call) => {
                let (shape, ty) = self.infer(call, value.span())?;
                let var = Var::from_id(vid, is_dataflow, shape.clone(), ty.clone());
                let annotated = Expr::with_parts(value.kind().clone(), value.span(), shape, ty);
                (var, annotated)
            }
            _ => {
                let var = Var::from_id(vid, is_dataflow, value.shape().cloned(), value.checked_type().cloned());
                (var, value.clone())
            }
        };

        tracing::trace!(var = var.name_hint(), value = value.kind_name(), "emit");
        self.binding_table.insert(var.vid().clone(), value.clone());
        self.current_frame()?
            .bindings
            .push(VarBinding::new(var.clone(), value).into());
        Ok(var)
    }

    /// Appends an existing binding. Inside a dataflow block its variable
    /// must be a `DataflowVar`.
    pub fn emit_binding(&mut self, binding: VarBinding) -> Result<Var, BuildError> {
        if self.is_dataflow()? && !binding.var.is_dataflow() {
            return Err(BuildError::var_in_dataflow(&binding.var));
        }
        self.append_binding(binding)
    }

    fn append_binding(&mut self, binding: VarBinding) -> Result<Var, BuildError> {
        let var = binding.var.clone();
        tracing::trace!(var = var.name_hint(), value = binding.value.kind_name(), "emit binding");
        self.binding_table.insert(var.vid().clone(), binding.value.clone());
        self.current_frame()?.bindings.push(binding.into());
        Ok(var)
    }

    /// Binds a fresh variable by matching `pattern` against `value`'s type.
    ///
    /// A shape-typed value yields a shape-typed variable. A tensor-typed
    /// value yields a tensor of rank `pattern.len()` with the value's dtype
    /// and shape `pattern`. Anything else is a fatal diagnostic.
    pub fn emit_match_shape(
        &mut self,
        value: &Expr,
        pattern: Vec<PrimExpr>,
        name_hint: Option<&str>,
    ) -> Result<Var, BuildError> {
        let is_dataflow = self.is_dataflow()?;
        let (shape, ty) = match value.checked_type() {
            Some(Type::Shape) => (None, Type::Shape),
            Some(Type::DynTensor { dtype, .. }) => (
                Some(Expr::shape_expr(pattern.clone())),
                Type::DynTensor {
                    rank: Some(pattern.len()),
                    dtype: *dtype,
                },
            ),
            _ => {
                return Err(self.diag_ctx.emit_fatal(IrDiagnostic::error(
                    value.span(),
                    "the value passed to EmitMatchShape must be tensor-typed or shape-typed",
                )));
            }
        };
        let vid = self.fresh_var(is_dataflow, name_hint);
        let var = Var::from_id(vid, is_dataflow, shape, Some(ty));
        tracing::trace!(var = var.name_hint(), rank = pattern.len(), "emit match_shape");
        self.binding_table.insert(var.vid().clone(), value.clone());
        self.current_frame()?
            .bindings
            .push(MatchShape::new(value.clone(), pattern, var.clone()).into());
        Ok(var)
    }

    /// Appends an existing match-shape binding. Not allowed for a
    /// `DataflowVar` while a dataflow block is open.
    pub fn emit_match_shape_binding(&mut self, binding: MatchShape) -> Result<Var, BuildError> {
        if self.is_dataflow()? && binding.var.is_dataflow() {
            return Err(BuildError::dataflow_match_shape(&binding.var));
        }
        let var = binding.var.clone();
        tracing::trace!(var = var.name_hint(), "emit match_shape binding");
        self.binding_table.insert(var.vid().clone(), binding.value.clone());
        self.current_frame()?.bindings.push(binding.into());
        Ok(var)
    }

    /// Binds `value` to an ordinary variable from inside a dataflow block,
    /// making it visible past the block's end.
    pub fn emit_output(&mut self, value: &Expr, name_hint: Option<&str>) -> Result<Var, BuildError> {
        if !self.is_dataflow()? {
            return Err(BuildError::EmitOutputOutsideDataflow { span: value.span() });
        }
        self.emit_as(value, false, name_hint)
    }

    pub fn emit_output_binding(&mut self, binding: VarBinding) -> Result<Var, BuildError> {
        if !self.is_dataflow()? {
            return Err(BuildError::EmitOutputOutsideDataflow {
                span: binding.value.span(),
            });
        }
        if binding.var.is_dataflow() {
            return Err(BuildError::dataflow_output(&binding.var));
        }
        self.append_binding(binding)
    }

    /// Value bound to `var` by this builder.
    pub fn lookup_var(&self, var: &Var) -> Result<Expr, BuildError> {
        self.binding_table
            .get(var.vid())
            .cloned()
            .ok_or_else(|| BuildError::unbound(var))
    }

    /// Like [`BlockBuilder::lookup_var`], but declared parameters resolve to
    /// `None` since nothing binds them.
    pub fn lookup_binding(&self, var: &Var) -> Result<Option<Expr>, BuildError> {
        if self.params.contains(var.vid()) {
            return Ok(None);
        }
        self.lookup_var(var).map(Some)
    }

    /// Registers function parameters as known but unbound.
    pub fn declare_params(&mut self, params: &[Var]) {
        self.params.extend(params.iter().map(|p| p.vid().clone()));
    }

    /// Re-runs inference on a call and refreshes its annotations.
    ///
    /// An inferred shape is only recorded when it is an explicit shape
    /// expression; the inferred type always replaces the old one. The input
    /// node is never mutated, and is returned as is when nothing changed.
    /// Non-call expressions pass through.
    pub fn normalize(&mut self, expr: &Expr) -> Result<Expr, BuildError> {
        let ExprKind::Call(call) = expr.kind() else {
            return Ok(expr.clone());
        };
        let (shape, ty) = self.infer(call, expr.span())?;
        let shape = match shape {
            Some(s) if s.as_shape_values().is_some() => Some(s),
            _ => expr.shape().cloned(),
        };
        Ok(expr.with_annotations(shape, ty))
    }

    /// Conservative equality of two shape-describing expressions. `false`
    /// means "not proven".
    pub fn can_prove_shape_equal(&mut self, lhs: &Expr, rhs: &Expr) -> bool {
        if lhs.same_as(rhs) || lhs == rhs {
            return true;
        }
        let (Some(l), Some(r)) = (lhs.as_shape_values(), rhs.as_shape_values()) else {
            return false;
        };
        l.len() == r.len() && l.iter().zip(r).all(|(a, b)| self.prover.can_prove_equal(a, b))
    }
}

impl Drop for BlockBuilder {
    fn drop(&mut self) {
        if !self.block_stack.is_empty() {
            tracing::warn!(open_blocks = self.block_stack.len(), "block builder dropped with unfinished blocks");
        }
    }
}
