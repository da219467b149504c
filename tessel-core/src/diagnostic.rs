#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use miette::Diagnostic;
use tessel_ir::Span;
use thiserror::Error;

use crate::error::BuildError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn display(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// A structured report against a source location.
#[derive(Clone, Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(tessel::ir))]
pub struct IrDiagnostic {
    pub severity: Severity,
    pub message: String,
    #[label]
    pub span: Span,
}

impl IrDiagnostic {
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span,
        }
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            span,
        }
    }
}

/// Collects reports raised while building or inferring.
///
/// Rendering is left to the caller; every collected report is a
/// `miette::Diagnostic`.
#[derive(Debug, Default)]
pub struct DiagnosticContext {
    reports: Vec<IrDiagnostic>,
}

impl DiagnosticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diag: IrDiagnostic) {
        tracing::debug!(severity = diag.severity.display(), message = %diag.message, "diagnostic");
        self.reports.push(diag);
    }

    /// Records `diag` and hands it back as the error that aborts the pass.
    pub fn emit_fatal(&mut self, diag: IrDiagnostic) -> BuildError {
        self.emit(diag.clone());
        BuildError::Fatal(diag)
    }

    pub fn reports(&self) -> &[IrDiagnostic] {
        &self.reports
    }

    pub fn has_errors(&self) -> bool {
        self.reports.iter().any(|d| d.severity == Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_ir::span;

    #[test]
    fn fatal_reports_are_recorded_and_returned() {
        let mut ctx = DiagnosticContext::new();
        ctx.emit(IrDiagnostic::warning(span(0, 1), "unused"));
        assert!(!ctx.has_errors());

        let err = ctx.emit_fatal(IrDiagnostic::error(span(4, 2), "bad operand"));
        assert!(matches!(err, BuildError::Fatal(ref d) if d.message == "bad operand"));
        assert_eq!(ctx.reports().len(), 2);
        assert!(ctx.has_errors());
    }
}
