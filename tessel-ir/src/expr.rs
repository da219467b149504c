#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::prim::PrimExpr;
use crate::span::{Span, dummy_span};
use crate::ty::{DataType, Type};

/// Identity of a bound variable.
///
/// `Var` and `DataflowVar` share this identifier space. A rewritten variable
/// that only changes its annotations keeps its `Id`, so substitution maps are
/// keyed by it.
#[derive(Clone)]
pub struct Id(Rc<str>);

impl Id {
    pub fn new(name_hint: &str) -> Self {
        Id(Rc::from(name_hint))
    }

    pub fn name_hint(&self) -> &str {
        &self.0
    }

    fn addr(&self) -> *const u8 {
        Rc::as_ptr(&self.0) as *const u8
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Id {}

impl Hash for Id {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Constant {
    pub value: ConstValue,
    pub dtype: DataType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tuple {
    pub fields: Vec<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarNode {
    pub vid: Id,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShapeExpr {
    pub values: Vec<PrimExpr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExternFunc {
    pub global_symbol: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GlobalVar {
    pub name_hint: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub params: Vec<Var>,
    pub body: Expr,
    pub ret_type: Option<Type>,
}

pub type Attrs = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub op: Expr,
    pub args: Vec<Expr>,
    pub attrs: Attrs,
    pub type_args: Vec<Type>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SeqExpr {
    pub blocks: Vec<BindingBlock>,
    pub body: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct If {
    pub cond: Expr,
    pub true_branch: Expr,
    pub false_branch: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Op {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TupleGetItem {
    pub tuple: Expr,
    pub index: usize,
}

/// The closed expression grammar.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Constant(Constant),
    Tuple(Tuple),
    Var(VarNode),
    DataflowVar(VarNode),
    ShapeExpr(ShapeExpr),
    RuntimeDepShape,
    ExternFunc(ExternFunc),
    GlobalVar(GlobalVar),
    Function(Function),
    Call(Call),
    SeqExpr(SeqExpr),
    If(If),
    Op(Op),
    TupleGetItem(TupleGetItem),
}

impl ExprKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Constant(_) => "Constant",
            ExprKind::Tuple(_) => "Tuple",
            ExprKind::Var(_) => "Var",
            ExprKind::DataflowVar(_) => "DataflowVar",
            ExprKind::ShapeExpr(_) => "ShapeExpr",
            ExprKind::RuntimeDepShape => "RuntimeDepShape",
            ExprKind::ExternFunc(_) => "ExternFunc",
            ExprKind::GlobalVar(_) => "GlobalVar",
            ExprKind::Function(_) => "Function",
            ExprKind::Call(_) => "Call",
            ExprKind::SeqExpr(_) => "SeqExpr",
            ExprKind::If(_) => "If",
            ExprKind::Op(_) => "Op",
            ExprKind::TupleGetItem(_) => "TupleGetItem",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub span: Span,
    /// Inferred shape annotation, itself a shape-describing expression.
    pub shape: Option<Expr>,
    pub checked_type: Option<Type>,
}

/// A shared, immutable expression node.
///
/// Cloning is cheap. Annotation updates go through [`Expr::with_annotations`],
/// which copies the node instead of mutating it, so aliases never observe a
/// change.
#[derive(Clone)]
pub struct Expr(Rc<ExprNode>);

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self::with_parts(kind, dummy_span(), None, None)
    }

    pub fn with_parts(kind: ExprKind, span: Span, shape: Option<Expr>, checked_type: Option<Type>) -> Self {
        Expr(Rc::new(ExprNode {
            kind,
            span,
            shape,
            checked_type,
        }))
    }

    pub fn node(&self) -> &ExprNode {
        &self.0
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    pub fn kind_name(&self) -> &'static str {
        self.0.kind.name()
    }

    pub fn span(&self) -> Span {
        self.0.span
    }

    pub fn shape(&self) -> Option<&Expr> {
        self.0.shape.as_ref()
    }

    pub fn checked_type(&self) -> Option<&Type> {
        self.0.checked_type.as_ref()
    }

    /// Pointer identity.
    pub fn same_as(&self, other: &Expr) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn with_span(&self, span: Span) -> Expr {
        Self::with_parts(self.0.kind.clone(), span, self.0.shape.clone(), self.0.checked_type.clone())
    }

    /// Returns a copy carrying the given annotations, or `self` when they
    /// already match.
    pub fn with_annotations(&self, shape: Option<Expr>, checked_type: Option<Type>) -> Expr {
        let same_shape = match (self.shape(), shape.as_ref()) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        if same_shape && self.checked_type() == checked_type.as_ref() {
            return self.clone();
        }
        Self::with_parts(self.0.kind.clone(), self.0.span, shape, checked_type)
    }

    /// Whether this expression may appear as a call argument or tuple field
    /// in normal form. Operators and `RuntimeDepShape` are not values and
    /// must be bound first.
    pub fn is_atomic(&self) -> bool {
        match self.kind() {
            ExprKind::Var(_)
            | ExprKind::DataflowVar(_)
            | ExprKind::Constant(_)
            | ExprKind::ShapeExpr(_)
            | ExprKind::GlobalVar(_)
            | ExprKind::ExternFunc(_) => true,
            ExprKind::Tuple(t) => t.fields.iter().all(Expr::is_atomic),
            ExprKind::RuntimeDepShape
            | ExprKind::Op(_)
            | ExprKind::Function(_)
            | ExprKind::Call(_)
            | ExprKind::SeqExpr(_)
            | ExprKind::If(_)
            | ExprKind::TupleGetItem(_) => false,
        }
    }

    pub fn as_var(&self) -> Option<Var> {
        match self.kind() {
            ExprKind::Var(n) => Some(Var {
                vid: n.vid.clone(),
                is_dataflow: false,
                expr: self.clone(),
            }),
            ExprKind::DataflowVar(n) => Some(Var {
                vid: n.vid.clone(),
                is_dataflow: true,
                expr: self.clone(),
            }),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&Call> {
        match self.kind() {
            ExprKind::Call(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_shape_values(&self) -> Option<&[PrimExpr]> {
        match self.kind() {
            ExprKind::ShapeExpr(s) => Some(&s.values),
            _ => None,
        }
    }

    pub fn constant(value: ConstValue, dtype: DataType) -> Expr {
        Self::with_parts(
            ExprKind::Constant(Constant { value, dtype }),
            dummy_span(),
            Some(Expr::shape_expr(Vec::new())),
            Some(Type::tensor(0, dtype)),
        )
    }

    pub fn tuple(fields: Vec<Expr>) -> Expr {
        Self::new(ExprKind::Tuple(Tuple { fields }))
    }

    pub fn shape_expr(values: Vec<PrimExpr>) -> Expr {
        Self::with_parts(
            ExprKind::ShapeExpr(ShapeExpr { values }),
            dummy_span(),
            None,
            Some(Type::Shape),
        )
    }

    pub fn runtime_dep_shape() -> Expr {
        Self::with_parts(ExprKind::RuntimeDepShape, dummy_span(), None, Some(Type::Shape))
    }

    pub fn extern_func(global_symbol: &str) -> Expr {
        Self::new(ExprKind::ExternFunc(ExternFunc {
            global_symbol: global_symbol.to_string(),
        }))
    }

    pub fn global_var(name_hint: &str) -> Expr {
        Self::new(ExprKind::GlobalVar(GlobalVar {
            name_hint: name_hint.to_string(),
        }))
    }

    pub fn function(params: Vec<Var>, body: Expr, ret_type: Option<Type>) -> Expr {
        Self::new(ExprKind::Function(Function { params, body, ret_type }))
    }

    pub fn call(op: Expr, args: Vec<Expr>) -> Expr {
        Self::call_with(op, args, Attrs::new(), Vec::new())
    }

    pub fn call_with(op: Expr, args: Vec<Expr>, attrs: Attrs, type_args: Vec<Type>) -> Expr {
        Self::new(ExprKind::Call(Call {
            op,
            args,
            attrs,
            type_args,
        }))
    }

    pub fn seq(blocks: Vec<BindingBlock>, body: Expr) -> Expr {
        Self::new(ExprKind::SeqExpr(SeqExpr { blocks, body }))
    }

    pub fn if_then_else(cond: Expr, true_branch: Expr, false_branch: Expr) -> Expr {
        Self::new(ExprKind::If(If {
            cond,
            true_branch,
            false_branch,
        }))
    }

    pub fn op(name: &str) -> Expr {
        Self::new(ExprKind::Op(Op { name: name.to_string() }))
    }

    pub fn tuple_get_item(tuple: Expr, index: usize) -> Expr {
        Self::new(ExprKind::TupleGetItem(TupleGetItem { tuple, index }))
    }
}

/// Structural equality; spans are ignored.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
            || (self.0.kind == other.0.kind
                && self.0.shape == other.0.shape
                && self.0.checked_type == other.0.checked_type)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0.kind, f)
    }
}

/// A variable, either ordinary or dataflow-local, viewed as an expression.
#[derive(Clone, PartialEq)]
pub struct Var {
    vid: Id,
    is_dataflow: bool,
    expr: Expr,
}

impl Var {
    pub fn new(name_hint: &str, shape: Option<Expr>, checked_type: Option<Type>) -> Self {
        Self::from_id(Id::new(name_hint), false, shape, checked_type)
    }

    pub fn dataflow(name_hint: &str, shape: Option<Expr>, checked_type: Option<Type>) -> Self {
        Self::from_id(Id::new(name_hint), true, shape, checked_type)
    }

    pub fn from_id(vid: Id, is_dataflow: bool, shape: Option<Expr>, checked_type: Option<Type>) -> Self {
        let node = VarNode { vid: vid.clone() };
        let kind = if is_dataflow {
            ExprKind::DataflowVar(node)
        } else {
            ExprKind::Var(node)
        };
        Var {
            vid,
            is_dataflow,
            expr: Expr::with_parts(kind, dummy_span(), shape, checked_type),
        }
    }

    pub fn vid(&self) -> &Id {
        &self.vid
    }

    pub fn name_hint(&self) -> &str {
        self.vid.name_hint()
    }

    pub fn is_dataflow(&self) -> bool {
        self.is_dataflow
    }

    pub fn shape(&self) -> Option<&Expr> {
        self.expr.shape()
    }

    pub fn checked_type(&self) -> Option<&Type> {
        self.expr.checked_type()
    }

    pub fn span(&self) -> Span {
        self.expr.span()
    }

    pub fn as_expr(&self) -> &Expr {
        &self.expr
    }

    pub fn to_expr(&self) -> Expr {
        self.expr.clone()
    }

    pub fn same_as(&self, other: &Var) -> bool {
        self.expr.same_as(&other.expr)
    }

    pub fn with_span(&self, span: Span) -> Var {
        Var {
            vid: self.vid.clone(),
            is_dataflow: self.is_dataflow,
            expr: self.expr.with_span(span),
        }
    }

    /// Same identity and kind, new annotations.
    pub fn with_annotations(&self, shape: Option<Expr>, checked_type: Option<Type>) -> Var {
        Var {
            vid: self.vid.clone(),
            is_dataflow: self.is_dataflow,
            expr: self.expr.with_annotations(shape, checked_type),
        }
    }
}

impl From<Var> for Expr {
    fn from(var: Var) -> Expr {
        var.expr
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dataflow {
            write!(f, "DataflowVar({:?})", self.vid)
        } else {
            write!(f, "Var({:?})", self.vid)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VarBinding {
    pub var: Var,
    pub value: Expr,
}

impl VarBinding {
    pub fn new(var: Var, value: Expr) -> Self {
        Self { var, value }
    }
}

/// Binds `var` to `value` after matching `pattern` against the value's shape.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchShape {
    pub value: Expr,
    pub pattern: Vec<PrimExpr>,
    pub var: Var,
}

impl MatchShape {
    pub fn new(value: Expr, pattern: Vec<PrimExpr>, var: Var) -> Self {
        Self { value, pattern, var }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Binding {
    Var(VarBinding),
    MatchShape(MatchShape),
}

impl Binding {
    pub fn var(&self) -> &Var {
        match self {
            Binding::Var(b) => &b.var,
            Binding::MatchShape(b) => &b.var,
        }
    }

    pub fn value(&self) -> &Expr {
        match self {
            Binding::Var(b) => &b.value,
            Binding::MatchShape(b) => &b.value,
        }
    }
}

impl From<VarBinding> for Binding {
    fn from(b: VarBinding) -> Self {
        Binding::Var(b)
    }
}

impl From<MatchShape> for Binding {
    fn from(b: MatchShape) -> Self {
        Binding::MatchShape(b)
    }
}

/// A finished, ordered run of bindings. Dataflow blocks are pure regions.
#[derive(Clone, Debug, PartialEq)]
pub struct BindingBlock {
    pub bindings: Vec<Binding>,
    pub is_dataflow: bool,
}

impl BindingBlock {
    pub fn new(bindings: Vec<Binding>) -> Self {
        Self {
            bindings,
            is_dataflow: false,
        }
    }

    pub fn dataflow(bindings: Vec<Binding>) -> Self {
        Self {
            bindings,
            is_dataflow: true,
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::span;

    #[test]
    fn var_identity_survives_annotation_updates() {
        let x = Var::new("x", None, None);
        let typed = x.with_annotations(None, Some(Type::tensor(2, DataType::Float32)));
        assert_eq!(typed.vid(), x.vid());
        assert!(!typed.same_as(&x));
        assert_ne!(Var::new("x", None, None).vid(), x.vid());
    }

    #[test]
    fn with_annotations_returns_self_when_unchanged() {
        let s = Expr::shape_expr(vec![PrimExpr::from(2), PrimExpr::from(3)]);
        assert!(s.with_annotations(None, Some(Type::Shape)).same_as(&s));
        let untyped = s.with_annotations(None, None);
        assert!(!untyped.same_as(&s));
        assert_eq!(s.checked_type(), Some(&Type::Shape));
    }

    #[test]
    fn structural_equality_ignores_span() {
        let a = Expr::op("relax.add").with_span(span(3, 4));
        let b = Expr::op("relax.add");
        assert_eq!(a, b);
        assert!(!a.same_as(&b));
    }

    #[test]
    fn atomicity_follows_normal_form() {
        let x = Var::new("x", None, None);
        let call = Expr::call(Expr::op("relax.add"), vec![x.to_expr(), x.to_expr()]);
        assert!(x.as_expr().is_atomic());
        assert!(Expr::tuple(vec![x.to_expr(), Expr::global_var("f"), Expr::extern_func("g")]).is_atomic());
        assert!(!call.is_atomic());
        assert!(!Expr::tuple(vec![call]).is_atomic());
        assert!(!Expr::op("relax.add").is_atomic());
        assert!(!Expr::tuple(vec![Expr::runtime_dep_shape()]).is_atomic());
    }

    #[test]
    fn as_var_recovers_kind() {
        let lv = Var::dataflow("lv", None, None);
        let back = lv.to_expr().as_var().expect("variable node");
        assert!(back.is_dataflow());
        assert_eq!(back.vid(), lv.vid());
        assert!(Expr::op("relax.add").as_var().is_none());
    }
}
