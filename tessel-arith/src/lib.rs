#![forbid(unsafe_code)]

mod analyzer;
mod prover;

pub use analyzer::Analyzer;
pub use prover::Prover;
