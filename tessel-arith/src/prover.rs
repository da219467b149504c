#![forbid(unsafe_code)]

use tessel_ir::PrimExpr;

/// Decides provable equality of dimension expressions.
///
/// `false` means "not proven", never "proven unequal".
pub trait Prover {
    fn can_prove_equal(&mut self, lhs: &PrimExpr, rhs: &PrimExpr) -> bool;
}
