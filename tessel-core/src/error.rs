#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use miette::Diagnostic;
use tessel_ir::{Expr, Span, Var};
use thiserror::Error;

use crate::diagnostic::IrDiagnostic;

/// Fatal misuse of the construction engine or a rewrite driver.
///
/// None of these are retried; they abort the enclosing pass.
#[derive(Debug, Error, Diagnostic)]
pub enum BuildError {
    #[error("no block is being built")]
    #[diagnostic(code(tessel::builder::no_block), help("open a block with `begin_binding_block` or `scope` first"))]
    NoActiveBlock,

    #[error("EmitOutput must be called inside a dataflow block")]
    #[diagnostic(code(tessel::builder::output_outside_dataflow))]
    EmitOutputOutsideDataflow {
        #[label("surfaced here")]
        span: Span,
    },

    #[error("EmitOutput can only emit ordinary variable bindings, `{name}` is a dataflow variable")]
    #[diagnostic(code(tessel::builder::dataflow_output))]
    DataflowVarOutput {
        name: String,
        #[label]
        span: Span,
    },

    #[error("ordinary variable `{name}` cannot be bound inside a dataflow block")]
    #[diagnostic(code(tessel::builder::var_in_dataflow), help("use `emit_output_binding` to surface a value"))]
    VarInDataflowBlock {
        name: String,
        #[label]
        span: Span,
    },

    #[error("match-shape binding of dataflow variable `{name}` cannot be emitted into a dataflow block")]
    #[diagnostic(code(tessel::builder::dataflow_match_shape))]
    DataflowVarMatchShape {
        name: String,
        #[label]
        span: Span,
    },

    #[error("variable `{name}` is not in the binding table")]
    #[diagnostic(code(tessel::builder::unbound_var))]
    UnboundVar {
        name: String,
        #[label("looked up here")]
        span: Span,
    },

    #[error("unbalanced block scope: expected {expected} open blocks, found {found}")]
    #[diagnostic(code(tessel::builder::unbalanced_scope))]
    UnbalancedScope { expected: usize, found: usize },

    #[error("no handler for expression kind `{kind}`")]
    #[diagnostic(code(tessel::functor::unhandled_kind))]
    UnhandledKind {
        kind: &'static str,
        #[label]
        span: Span,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Fatal(IrDiagnostic),
}

impl BuildError {
    pub(crate) fn var_in_dataflow(var: &Var) -> Self {
        BuildError::VarInDataflowBlock {
            name: var.name_hint().to_string(),
            span: var.span(),
        }
    }

    pub(crate) fn dataflow_output(var: &Var) -> Self {
        BuildError::DataflowVarOutput {
            name: var.name_hint().to_string(),
            span: var.span(),
        }
    }

    pub(crate) fn dataflow_match_shape(var: &Var) -> Self {
        BuildError::DataflowVarMatchShape {
            name: var.name_hint().to_string(),
            span: var.span(),
        }
    }

    pub(crate) fn unbound(var: &Var) -> Self {
        BuildError::UnboundVar {
            name: var.name_hint().to_string(),
            span: var.span(),
        }
    }

    /// Fatal default for a functor that does not handle `expr`'s kind.
    pub fn unhandled(expr: &Expr) -> Self {
        BuildError::UnhandledKind {
            kind: expr.kind_name(),
            span: expr.span(),
        }
    }
}
