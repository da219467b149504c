#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use tessel_ir::{PrimExpr, SymVar};

use crate::prover::Prover;

/// Factor of a monomial. Terms the normaliser cannot expand (division by a
/// non-constant, min/max of distinct operands) are kept as opaque atoms over
/// their canonicalised operands, so they still compare structurally.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Atom {
    Var(SymVar),
    Opaque(PrimExpr),
}

impl Atom {
    fn to_expr(&self) -> PrimExpr {
        match self {
            Atom::Var(v) => PrimExpr::Var(v.clone()),
            Atom::Opaque(e) => e.clone(),
        }
    }
}

/// Sum of monomials with non-zero coefficients. The empty monomial is the
/// constant term. Coefficient arithmetic is checked; an overflowing operation
/// yields `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Poly {
    terms: BTreeMap<Vec<Atom>, i64>,
}

impl Poly {
    fn constant(v: i64) -> Self {
        let mut p = Poly::default();
        if v != 0 {
            p.terms.insert(Vec::new(), v);
        }
        p
    }

    fn atom(a: Atom) -> Self {
        let mut p = Poly::default();
        p.terms.insert(vec![a], 1);
        p
    }

    fn add_term(&mut self, monomial: Vec<Atom>, coeff: i64) -> Option<()> {
        if coeff == 0 {
            return Some(());
        }
        let slot = self.terms.entry(monomial).or_insert(0);
        *slot = slot.checked_add(coeff)?;
        if *slot == 0 {
            self.terms.retain(|_, c| *c != 0);
        }
        Some(())
    }

    fn as_constant(&self) -> Option<i64> {
        match self.terms.len() {
            0 => Some(0),
            1 => self.terms.get(&Vec::new()).copied(),
            _ => None,
        }
    }

    fn add(mut self, rhs: &Poly) -> Option<Poly> {
        for (m, c) in &rhs.terms {
            self.add_term(m.clone(), *c)?;
        }
        Some(self)
    }

    fn scale(&self, k: i64) -> Option<Poly> {
        let mut out = Poly::default();
        for (m, c) in &self.terms {
            out.add_term(m.clone(), c.checked_mul(k)?)?;
        }
        Some(out)
    }

    fn mul(&self, rhs: &Poly) -> Option<Poly> {
        let mut out = Poly::default();
        for (ma, ca) in &self.terms {
            for (mb, cb) in &rhs.terms {
                let mut m = ma.clone();
                m.extend(mb.iter().cloned());
                m.sort();
                out.add_term(m, ca.checked_mul(*cb)?)?;
            }
        }
        Some(out)
    }

    fn divisible_by(&self, k: i64) -> bool {
        self.terms.values().all(|c| c.checked_rem(k) == Some(0))
    }

    fn exact_div(&self, k: i64) -> Option<Poly> {
        let mut out = Poly::default();
        for (m, c) in &self.terms {
            out.add_term(m.clone(), c.checked_div(k)?)?;
        }
        Some(out)
    }

    fn to_expr(&self) -> PrimExpr {
        let mut acc: Option<PrimExpr> = None;
        let mut constant = 0;
        for (monomial, coeff) in &self.terms {
            if monomial.is_empty() {
                constant = *coeff;
                continue;
            }
            let mut atoms = monomial.iter().map(Atom::to_expr);
            let Some(first) = atoms.next() else { continue };
            let product = atoms.fold(first, |lhs, rhs| lhs * rhs);
            let term = if *coeff == 1 { product } else { product * *coeff };
            acc = Some(match acc {
                Some(lhs) => lhs + term,
                None => term,
            });
        }
        match acc {
            Some(e) if constant == 0 => e,
            Some(e) => e + constant,
            None => PrimExpr::Int(constant),
        }
    }
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    let r = a.checked_rem(b)?;
    Some(if r != 0 && ((r < 0) != (b < 0)) { q - 1 } else { q })
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    Some(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
}

/// Canonicalising arithmetic analyzer.
///
/// Expressions are expanded into integer polynomials over symbolic variables.
/// Two expressions are provably equal when their difference normalises to
/// zero. An expression whose expansion overflows `i64` is left as written and
/// is only ever equal to itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct Analyzer;

impl Analyzer {
    pub fn new() -> Self {
        Analyzer
    }

    /// Rewrites `e` into canonical form: like terms combined, constants
    /// folded, constant term last.
    pub fn simplify(&self, e: &PrimExpr) -> PrimExpr {
        match self.to_poly(e) {
            Some(p) => p.to_expr(),
            None => e.clone(),
        }
    }

    fn to_poly(&self, e: &PrimExpr) -> Option<Poly> {
        Some(match e {
            PrimExpr::Int(v) => Poly::constant(*v),
            PrimExpr::Var(v) => Poly::atom(Atom::Var(v.clone())),
            PrimExpr::Add(a, b) => self.to_poly(a)?.add(&self.to_poly(b)?)?,
            PrimExpr::Sub(a, b) => self.to_poly(a)?.add(&self.to_poly(b)?.scale(-1)?)?,
            PrimExpr::Mul(a, b) => self.to_poly(a)?.mul(&self.to_poly(b)?)?,
            PrimExpr::FloorDiv(a, b) => {
                let (pa, pb) = (self.to_poly(a)?, self.to_poly(b)?);
                match (pa.as_constant(), pb.as_constant()) {
                    (Some(x), Some(y)) => match floor_div(x, y) {
                        Some(q) => Poly::constant(q),
                        None => opaque(pa.to_expr().floor_div(pb.to_expr())),
                    },
                    (_, Some(k)) if k != 0 && pa.divisible_by(k) => pa.exact_div(k)?,
                    _ => opaque(pa.to_expr().floor_div(pb.to_expr())),
                }
            }
            PrimExpr::FloorMod(a, b) => {
                let (pa, pb) = (self.to_poly(a)?, self.to_poly(b)?);
                match (pa.as_constant(), pb.as_constant()) {
                    (Some(x), Some(y)) => match floor_mod(x, y) {
                        Some(r) => Poly::constant(r),
                        None => opaque(pa.to_expr().floor_mod(pb.to_expr())),
                    },
                    (_, Some(k)) if k != 0 && pa.divisible_by(k) => Poly::default(),
                    _ => opaque(pa.to_expr().floor_mod(pb.to_expr())),
                }
            }
            PrimExpr::Min(a, b) => self.min_max(a, b, true)?,
            PrimExpr::Max(a, b) => self.min_max(a, b, false)?,
        })
    }

    fn min_max(&self, a: &PrimExpr, b: &PrimExpr, is_min: bool) -> Option<Poly> {
        let (pa, pb) = (self.to_poly(a)?, self.to_poly(b)?);
        if pa == pb {
            return Some(pa);
        }
        if let (Some(x), Some(y)) = (pa.as_constant(), pb.as_constant()) {
            return Some(Poly::constant(if is_min { x.min(y) } else { x.max(y) }));
        }
        // Operands are ordered so that min/max commute syntactically.
        let (mut lhs, mut rhs) = (pa.to_expr(), pb.to_expr());
        if rhs < lhs {
            std::mem::swap(&mut lhs, &mut rhs);
        }
        Some(opaque(if is_min { lhs.min(rhs) } else { lhs.max(rhs) }))
    }
}

fn opaque(e: PrimExpr) -> Poly {
    Poly::atom(Atom::Opaque(e))
}

impl Prover for Analyzer {
    fn can_prove_equal(&mut self, lhs: &PrimExpr, rhs: &PrimExpr) -> bool {
        if lhs == rhs {
            return true;
        }
        let diff = self
            .to_poly(lhs)
            .zip(self.to_poly(rhs))
            .and_then(|(l, r)| l.add(&r.scale(-1)?));
        match diff {
            Some(diff) if diff.terms.is_empty() => true,
            Some(diff) => {
                tracing::trace!(%lhs, %rhs, residual = %diff.to_expr(), "dimension equality not proven");
                false
            }
            None => {
                tracing::trace!(%lhs, %rhs, "dimension arithmetic overflowed");
                false
            }
        }
    }
}
