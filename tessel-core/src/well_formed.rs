#![forbid(unsafe_code)]
#![allow(unused_assignments)]

//! Structural checks on built functions.

use std::collections::HashSet;

use miette::Diagnostic;
use tessel_ir::{
    BindingBlock, Call, Expr, ExprKind, Function, GlobalVar, Id, If, MatchShape, PrimExpr, SeqExpr, ShapeExpr,
    Span, SymVar, Tuple, Var, VarNode,
};
use thiserror::Error;

use crate::visitor::{ExprVisitor, walk_var_def};

#[derive(Debug, Error, Diagnostic)]
pub enum WellFormedError {
    #[error("global variable `{name}` is not defined in the module")]
    #[diagnostic(code(tessel::well_formed::undefined_global))]
    UndefinedGlobal {
        name: String,
        #[label]
        span: Span,
    },

    #[error("variable `{name}` is used before it is defined")]
    #[diagnostic(code(tessel::well_formed::undefined_var))]
    UndefinedVar {
        name: String,
        #[label]
        span: Span,
    },

    #[error("dataflow variable `{name}` is used before it is defined")]
    #[diagnostic(code(tessel::well_formed::undefined_dataflow_var))]
    UndefinedDataflowVar {
        name: String,
        #[label]
        span: Span,
    },

    #[error("dataflow variable `{name}` is used outside a dataflow block")]
    #[diagnostic(code(tessel::well_formed::dataflow_var_escapes))]
    DataflowVarUseOutsideBlock {
        name: String,
        #[label]
        span: Span,
    },

    #[error("dataflow variable `{name}` is defined outside a dataflow block")]
    #[diagnostic(code(tessel::well_formed::dataflow_var_def))]
    DataflowVarDefOutsideBlock {
        name: String,
        #[label]
        span: Span,
    },

    #[error("variable `{name}` is defined more than once")]
    #[diagnostic(code(tessel::well_formed::redefined))]
    Redefined {
        name: String,
        #[label]
        span: Span,
    },

    #[error("{container} is not in normal form: element {index} is a {kind}")]
    #[diagnostic(code(tessel::well_formed::not_normal_form), help("bind the element to a variable first"))]
    NotNormalForm {
        container: &'static str,
        index: usize,
        kind: &'static str,
        #[label]
        span: Span,
    },

    #[error("a SeqExpr may only be a function body or an If branch")]
    #[diagnostic(code(tessel::well_formed::misplaced_seq))]
    MisplacedSeqExpr {
        #[label]
        span: Span,
    },

    #[error("symbolic variable `{name}` is not bound by a parameter or a match-shape pattern")]
    #[diagnostic(code(tessel::well_formed::undefined_sym_var))]
    UndefinedSymVar {
        name: String,
        #[label]
        span: Span,
    },
}

/// Collects every violation it meets instead of stopping at the first.
#[derive(Debug, Default)]
pub struct WellFormedChecker {
    globals: HashSet<String>,
    vars: HashSet<Id>,
    dataflow_vars: HashSet<Id>,
    sym_vars: HashSet<SymVar>,
    in_dataflow: bool,
    errors: Vec<WellFormedError>,
}

impl WellFormedChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_global(&mut self, name: &str) {
        self.globals.insert(name.to_string());
    }

    pub fn check(&mut self, func: &Expr) {
        self.visit_expr(func);
    }

    pub fn errors(&self) -> &[WellFormedError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<WellFormedError> {
        self.errors
    }

    fn visit_body(&mut self, expr: &Expr) {
        match expr.kind() {
            ExprKind::SeqExpr(seq) => {
                for block in &seq.blocks {
                    self.visit_binding_block(block);
                }
                self.visit_expr(&seq.body);
            }
            _ => self.visit_expr(expr),
        }
    }

    /// Bare variables bind; anything else must use bound variables only.
    fn bind_or_check_dims(&mut self, values: &[PrimExpr], span: Span) {
        for value in values {
            match value.as_var() {
                Some(v) => {
                    self.sym_vars.insert(v.clone());
                }
                None => self.check_dim(value, span),
            }
        }
    }

    fn check_dim(&mut self, value: &PrimExpr, span: Span) {
        let mut missing = Vec::new();
        value.for_each_var(&mut |v| {
            if !self.sym_vars.contains(v) {
                missing.push(v.name().to_string());
            }
        });
        self.errors
            .extend(missing.into_iter().map(|name| WellFormedError::UndefinedSymVar { name, span }));
    }

    fn define(&mut self, var: &Var) {
        let fresh = if var.is_dataflow() {
            self.dataflow_vars.insert(var.vid().clone())
        } else {
            self.vars.insert(var.vid().clone())
        };
        if !fresh {
            self.errors.push(WellFormedError::Redefined {
                name: var.name_hint().to_string(),
                span: var.span(),
            });
        }
    }

    /// Nested tuples are descended into so the offending field itself is
    /// reported.
    fn visit_argument(&mut self, container: &'static str, index: usize, arg: &Expr) {
        if arg.is_atomic() || matches!(arg.kind(), ExprKind::Tuple(_)) {
            self.visit_expr(arg);
        } else {
            self.errors.push(WellFormedError::NotNormalForm {
                container,
                index,
                kind: arg.kind_name(),
                span: arg.span(),
            });
        }
    }

    fn visit_annotation(&mut self, expr: &Expr) {
        if let Some(shape) = expr.shape() {
            self.visit_expr(shape);
        }
    }
}

impl ExprVisitor for WellFormedChecker {
    fn visit_global_var(&mut self, expr: &Expr, op: &GlobalVar) {
        if !self.globals.contains(&op.name_hint) {
            self.errors.push(WellFormedError::UndefinedGlobal {
                name: op.name_hint.clone(),
                span: expr.span(),
            });
        }
    }

    fn visit_tuple(&mut self, expr: &Expr, op: &Tuple) {
        for (index, field) in op.fields.iter().enumerate() {
            self.visit_argument("Tuple", index, field);
        }
        self.visit_annotation(expr);
    }

    fn visit_var(&mut self, expr: &Expr, op: &VarNode) {
        if !self.vars.contains(&op.vid) {
            self.errors.push(WellFormedError::UndefinedVar {
                name: op.vid.name_hint().to_string(),
                span: expr.span(),
            });
        }
    }

    fn visit_dataflow_var(&mut self, expr: &Expr, op: &VarNode) {
        let name = op.vid.name_hint().to_string();
        if !self.in_dataflow {
            self.errors.push(WellFormedError::DataflowVarUseOutsideBlock {
                name,
                span: expr.span(),
            });
        } else if !self.dataflow_vars.contains(&op.vid) {
            self.errors.push(WellFormedError::UndefinedDataflowVar {
                name,
                span: expr.span(),
            });
        }
    }

    fn visit_shape_expr(&mut self, expr: &Expr, op: &ShapeExpr) {
        for value in &op.values {
            self.check_dim(value, expr.span());
        }
    }

    /// Parameters and the symbolic variables their shapes bind are scoped
    /// to the function.
    fn visit_function(&mut self, _expr: &Expr, op: &Function) {
        let saved_vars = self.vars.clone();
        let saved_sym_vars = self.sym_vars.clone();
        for param in &op.params {
            if let Some(values) = param.shape().and_then(Expr::as_shape_values) {
                self.bind_or_check_dims(values, param.span());
            }
            self.visit_var_def(param);
        }
        self.visit_body(&op.body);
        self.vars = saved_vars;
        self.sym_vars = saved_sym_vars;
    }

    fn visit_call(&mut self, expr: &Expr, op: &Call) {
        self.visit_expr(&op.op);
        for (index, arg) in op.args.iter().enumerate() {
            self.visit_argument("Call", index, arg);
        }
        self.visit_annotation(expr);
    }

    fn visit_seq_expr(&mut self, expr: &Expr, _op: &SeqExpr) {
        self.errors
            .push(WellFormedError::MisplacedSeqExpr { span: expr.span() });
    }

    fn visit_if(&mut self, _expr: &Expr, op: &If) {
        self.visit_expr(&op.cond);
        self.visit_body(&op.true_branch);
        self.visit_body(&op.false_branch);
    }

    fn visit_match_shape(&mut self, binding: &MatchShape) {
        self.visit_expr(&binding.value);
        self.bind_or_check_dims(&binding.pattern, binding.value.span());
        self.visit_var_def(&binding.var);
    }

    fn visit_dataflow_block(&mut self, block: &BindingBlock) {
        self.in_dataflow = true;
        for binding in &block.bindings {
            self.visit_binding(binding);
        }
        self.in_dataflow = false;
        self.dataflow_vars.clear();
    }

    fn visit_plain_var_def(&mut self, var: &Var) {
        self.define(var);
        walk_var_def(self, var);
    }

    fn visit_dataflow_var_def(&mut self, var: &Var) {
        if !self.in_dataflow {
            self.errors.push(WellFormedError::DataflowVarDefOutsideBlock {
                name: var.name_hint().to_string(),
                span: var.span(),
            });
        }
        self.define(var);
        walk_var_def(self, var);
    }
}

/// Checks every function of a module. Global names are registered up
/// front so functions may refer to each other in any order.
pub fn well_formed(functions: &[(String, Expr)]) -> Result<(), Vec<WellFormedError>> {
    let mut checker = WellFormedChecker::new();
    for (name, _) in functions {
        checker.register_global(name);
    }
    for (name, func) in functions {
        if matches!(func.kind(), ExprKind::Function(_)) {
            tracing::debug!(function = %name, "checking well-formedness");
            checker.check(func);
        }
    }
    let errors = checker.into_errors();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_builder::BlockBuilder;
    use crate::op::add;
    use tessel_ir::{DataType, Type, VarBinding};

    fn tensor_param(name: &str, dims: Vec<PrimExpr>) -> Var {
        let rank = dims.len();
        Var::new(name, Some(Expr::shape_expr(dims)), Some(Type::tensor(rank, DataType::Float32)))
    }

    fn built_function() -> Expr {
        let n = SymVar::new("n");
        let x = tensor_param("x", vec![PrimExpr::from(&n), PrimExpr::Int(4)]);
        let mut bb = BlockBuilder::new();
        bb.begin_dataflow_block();
        let lv = bb.emit(&add(x.to_expr(), x.to_expr()), None).expect("emit");
        let gv = bb.emit_output(lv.as_expr(), None).expect("output");
        let block = bb.end_block().expect("end");
        Expr::function(vec![x], Expr::seq(vec![block], gv.to_expr()), None)
    }

    fn check(func: &Expr) -> Vec<WellFormedError> {
        let mut checker = WellFormedChecker::new();
        checker.check(func);
        checker.into_errors()
    }

    #[test]
    fn builder_output_is_well_formed() {
        let errors = check(&built_function());
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn use_before_definition() {
        let x = Var::new("x", None, None);
        let func = Expr::function(Vec::new(), x.to_expr(), None);
        assert!(matches!(check(&func)[..], [WellFormedError::UndefinedVar { .. }]));
    }

    #[test]
    fn dataflow_var_must_not_escape() {
        let x = Var::new("x", None, None);
        let lv = Var::dataflow("lv", None, None);
        let block = BindingBlock::dataflow(vec![VarBinding::new(lv.clone(), x.to_expr()).into()]);
        let func = Expr::function(vec![x], Expr::seq(vec![block], lv.to_expr()), None);
        assert!(matches!(
            check(&func)[..],
            [WellFormedError::DataflowVarUseOutsideBlock { .. }]
        ));
    }

    #[test]
    fn nested_call_argument_is_reported() {
        let x = Var::new("x", None, None);
        let nested = add(add(x.to_expr(), x.to_expr()), x.to_expr());
        let func = Expr::function(vec![x], nested, None);
        let errors = check(&func);
        assert!(matches!(
            errors[..],
            [WellFormedError::NotNormalForm {
                container: "Call",
                index: 0,
                kind: "Call",
                ..
            }]
        ));
    }

    #[test]
    fn seq_expr_outside_body_position() {
        let x = Var::new("x", None, None);
        let inner = Expr::seq(Vec::new(), x.to_expr());
        let func = Expr::function(vec![x], Expr::tuple(vec![inner]), None);
        let errors = check(&func);
        assert!(matches!(errors[..], [WellFormedError::NotNormalForm { kind: "SeqExpr", .. }]));

        let mut checker = WellFormedChecker::new();
        checker.visit_expr(&Expr::seq(Vec::new(), Expr::tuple(Vec::new())));
        assert!(matches!(checker.errors(), [WellFormedError::MisplacedSeqExpr { .. }]));
    }

    #[test]
    fn symbolic_vars_need_a_binder() {
        let m = SymVar::new("m");
        let n = SymVar::new("n");
        let x = tensor_param("x", vec![PrimExpr::from(&n) * 2]);
        let y = Var::new("y", Some(Expr::shape_expr(vec![PrimExpr::from(&m)])), None);
        let block = BindingBlock::new(vec![VarBinding::new(y.clone(), x.to_expr()).into()]);
        let func = Expr::function(vec![x], Expr::seq(vec![block], y.to_expr()), None);
        let errors = check(&func);
        let names: Vec<&str> = errors
            .iter()
            .filter_map(|e| match e {
                WellFormedError::UndefinedSymVar { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert!(names.contains(&"n") && names.contains(&"m"), "{errors:?}");
    }

    #[test]
    fn match_shape_pattern_binds_symbolic_vars() {
        let m = SymVar::new("m");
        let x = Var::new("x", None, Some(Type::tensor(1, DataType::Float32)));
        let y = Var::new("y", Some(Expr::shape_expr(vec![PrimExpr::from(&m)])), None);
        let z = Var::new("z", Some(Expr::shape_expr(vec![PrimExpr::from(&m) + 1])), None);
        let block = BindingBlock::new(vec![
            MatchShape::new(x.to_expr(), vec![PrimExpr::from(&m)], y.clone()).into(),
            VarBinding::new(z.clone(), y.to_expr()).into(),
        ]);
        let func = Expr::function(vec![x], Expr::seq(vec![block], z.to_expr()), None);
        let errors = check(&func);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn double_definition() {
        let x = Var::new("x", None, None);
        let y = Var::new("y", None, None);
        let block = BindingBlock::new(vec![
            VarBinding::new(y.clone(), x.to_expr()).into(),
            VarBinding::new(y.clone(), x.to_expr()).into(),
        ]);
        let func = Expr::function(vec![x], Expr::seq(vec![block], y.to_expr()), None);
        assert!(matches!(check(&func)[..], [WellFormedError::Redefined { .. }]));
    }

    #[test]
    fn module_globals_are_registered_first() {
        let x = Var::new("x", None, None);
        let caller = Expr::function(
            vec![x.clone()],
            Expr::call(Expr::global_var("callee"), vec![x.to_expr()]),
            None,
        );
        let y = Var::new("y", None, None);
        let callee = Expr::function(vec![y.clone()], y.to_expr(), None);
        let module = vec![("caller".to_string(), caller.clone()), ("callee".to_string(), callee)];
        assert!(well_formed(&module).is_ok());

        let errors = well_formed(&[("caller".to_string(), caller)]).expect_err("missing callee");
        assert!(matches!(errors[..], [WellFormedError::UndefinedGlobal { .. }]));
    }
}
