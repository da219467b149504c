#![forbid(unsafe_code)]

pub mod expr;
pub mod prim;
pub mod span;
pub mod ty;

pub use expr::*;
pub use prim::*;
pub use span::*;
pub use ty::*;
