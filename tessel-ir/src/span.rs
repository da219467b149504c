#![forbid(unsafe_code)]

use miette::SourceSpan;

pub type Span = SourceSpan;

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

/// Span for nodes synthesized during construction or rewriting.
pub fn dummy_span() -> Span {
    span(0, 0)
}
