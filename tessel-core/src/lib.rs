#![forbid(unsafe_code)]

mod block_builder;
mod diagnostic;
mod error;
mod name_table;
mod printer;
mod well_formed;
pub mod functor;
pub mod mutator;
pub mod mutator_base;
pub mod op;
pub mod visitor;

pub use block_builder::{BlockBuilder, BlockKind, BuilderConfig};
pub use diagnostic::{DiagnosticContext, IrDiagnostic, Severity};
pub use error::BuildError;
pub use functor::ExprFunctor;
pub use mutator::{ExprMutator, MutatorCtx};
pub use mutator_base::ExprMutatorBase;
pub use name_table::NameTable;
pub use op::{OpRegistry, OpRule};
pub use printer::{Printer, pretty};
pub use visitor::{ExprVisitor, post_order_visit};
pub use well_formed::{WellFormedChecker, WellFormedError, well_formed};
