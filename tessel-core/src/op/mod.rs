#![forbid(unsafe_code)]

//! Operator inference rules.
//!
//! A rule receives the call being emitted, the call's span and the
//! builder's diagnostic context. Returning `Ok(None)` means "unknown"; an
//! operator with no rule at all is treated the same way.

mod builtin;

use std::collections::HashMap;
use std::fmt;

use tessel_ir::{Call, Expr, Span, Type};

use crate::diagnostic::DiagnosticContext;
use crate::error::BuildError;

pub use builtin::{add, call_tir, multiply, print, shape_of, unique};

pub type InferShapeFn = dyn Fn(&Call, Span, &mut DiagnosticContext) -> Result<Option<Expr>, BuildError>;
pub type InferTypeFn = dyn Fn(&Call, Span, &mut DiagnosticContext) -> Result<Option<Type>, BuildError>;

#[derive(Default)]
pub struct OpRule {
    infer_shape: Option<Box<InferShapeFn>>,
    infer_type: Option<Box<InferTypeFn>>,
}

impl OpRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shape<F>(mut self, f: F) -> Self
    where
        F: Fn(&Call, Span, &mut DiagnosticContext) -> Result<Option<Expr>, BuildError> + 'static,
    {
        self.infer_shape = Some(Box::new(f));
        self
    }

    pub fn with_type<F>(mut self, f: F) -> Self
    where
        F: Fn(&Call, Span, &mut DiagnosticContext) -> Result<Option<Type>, BuildError> + 'static,
    {
        self.infer_type = Some(Box::new(f));
        self
    }

    pub fn infer_shape(&self, call: &Call, span: Span, diag: &mut DiagnosticContext) -> Result<Option<Expr>, BuildError> {
        match &self.infer_shape {
            Some(f) => f(call, span, diag),
            None => Ok(None),
        }
    }

    pub fn infer_type(&self, call: &Call, span: Span, diag: &mut DiagnosticContext) -> Result<Option<Type>, BuildError> {
        match &self.infer_type {
            Some(f) => f(call, span, diag),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for OpRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpRule")
            .field("infer_shape", &self.infer_shape.is_some())
            .field("infer_type", &self.infer_type.is_some())
            .finish()
    }
}

/// Operator name to inference rule.
#[derive(Debug, Default)]
pub struct OpRegistry {
    rules: HashMap<String, OpRule>,
}

impl OpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register(&mut registry);
        registry
    }

    /// Replaces any rule already registered under `name`.
    pub fn register(&mut self, name: &str, rule: OpRule) -> &mut Self {
        self.rules.insert(name.to_string(), rule);
        self
    }

    pub fn get(&self, name: &str) -> Option<&OpRule> {
        self.rules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Looks up the rule for a call whose callee is an `Op` node.
    pub fn rule_for(&self, call: &Call) -> Option<&OpRule> {
        match call.op.kind() {
            tessel_ir::ExprKind::Op(op) => self.get(&op.name),
            _ => None,
        }
    }
}
