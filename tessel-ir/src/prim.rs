#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops;
use std::rc::Rc;

/// A symbolic dimension variable.
///
/// Identity is by allocation: two `SymVar`s built from the same name are
/// distinct variables, while clones of one `SymVar` compare equal.
#[derive(Clone)]
pub struct SymVar(Rc<str>);

impl SymVar {
    pub fn new(name: &str) -> Self {
        SymVar(Rc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    fn addr(&self) -> *const u8 {
        Rc::as_ptr(&self.0) as *const u8
    }
}

impl PartialEq for SymVar {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for SymVar {}

impl Hash for SymVar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

// Only meaningful within one process; used to keep canonical forms sorted.
impl PartialOrd for SymVar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SymVar {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name()
            .cmp(other.name())
            .then_with(|| self.addr().cmp(&other.addr()))
    }
}

impl fmt::Debug for SymVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SymVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Integer expression over symbolic dimensions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimExpr {
    Int(i64),
    Var(SymVar),
    Add(Box<PrimExpr>, Box<PrimExpr>),
    Sub(Box<PrimExpr>, Box<PrimExpr>),
    Mul(Box<PrimExpr>, Box<PrimExpr>),
    FloorDiv(Box<PrimExpr>, Box<PrimExpr>),
    FloorMod(Box<PrimExpr>, Box<PrimExpr>),
    Min(Box<PrimExpr>, Box<PrimExpr>),
    Max(Box<PrimExpr>, Box<PrimExpr>),
}

impl PrimExpr {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PrimExpr::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&SymVar> {
        match self {
            PrimExpr::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn floor_div(self, rhs: impl Into<PrimExpr>) -> PrimExpr {
        PrimExpr::FloorDiv(Box::new(self), Box::new(rhs.into()))
    }

    pub fn floor_mod(self, rhs: impl Into<PrimExpr>) -> PrimExpr {
        PrimExpr::FloorMod(Box::new(self), Box::new(rhs.into()))
    }

    pub fn min(self, rhs: impl Into<PrimExpr>) -> PrimExpr {
        PrimExpr::Min(Box::new(self), Box::new(rhs.into()))
    }

    pub fn max(self, rhs: impl Into<PrimExpr>) -> PrimExpr {
        PrimExpr::Max(Box::new(self), Box::new(rhs.into()))
    }

    /// Visit every symbolic variable, left to right.
    pub fn for_each_var(&self, f: &mut impl FnMut(&SymVar)) {
        match self {
            PrimExpr::Int(_) => {}
            PrimExpr::Var(v) => f(v),
            PrimExpr::Add(a, b)
            | PrimExpr::Sub(a, b)
            | PrimExpr::Mul(a, b)
            | PrimExpr::FloorDiv(a, b)
            | PrimExpr::FloorMod(a, b)
            | PrimExpr::Min(a, b)
            | PrimExpr::Max(a, b) => {
                a.for_each_var(f);
                b.for_each_var(f);
            }
        }
    }
}

impl From<i64> for PrimExpr {
    fn from(v: i64) -> Self {
        PrimExpr::Int(v)
    }
}

impl From<i32> for PrimExpr {
    fn from(v: i32) -> Self {
        PrimExpr::Int(i64::from(v))
    }
}

impl From<SymVar> for PrimExpr {
    fn from(v: SymVar) -> Self {
        PrimExpr::Var(v)
    }
}

impl From<&SymVar> for PrimExpr {
    fn from(v: &SymVar) -> Self {
        PrimExpr::Var(v.clone())
    }
}

impl<R: Into<PrimExpr>> ops::Add<R> for PrimExpr {
    type Output = PrimExpr;

    fn add(self, rhs: R) -> PrimExpr {
        PrimExpr::Add(Box::new(self), Box::new(rhs.into()))
    }
}

impl<R: Into<PrimExpr>> ops::Sub<R> for PrimExpr {
    type Output = PrimExpr;

    fn sub(self, rhs: R) -> PrimExpr {
        PrimExpr::Sub(Box::new(self), Box::new(rhs.into()))
    }
}

impl<R: Into<PrimExpr>> ops::Mul<R> for PrimExpr {
    type Output = PrimExpr;

    fn mul(self, rhs: R) -> PrimExpr {
        PrimExpr::Mul(Box::new(self), Box::new(rhs.into()))
    }
}

impl fmt::Display for PrimExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimExpr::Int(v) => write!(f, "{v}"),
            PrimExpr::Var(v) => write!(f, "{v}"),
            PrimExpr::Add(a, b) => write!(f, "({a} + {b})"),
            PrimExpr::Sub(a, b) => write!(f, "({a} - {b})"),
            PrimExpr::Mul(a, b) => write!(f, "({a} * {b})"),
            PrimExpr::FloorDiv(a, b) => write!(f, "floordiv({a}, {b})"),
            PrimExpr::FloorMod(a, b) => write!(f, "floormod({a}, {b})"),
            PrimExpr::Min(a, b) => write!(f, "min({a}, {b})"),
            PrimExpr::Max(a, b) => write!(f, "max({a}, {b})"),
        }
    }
}
