use tessel_core::visitor::{ExprVisitor, walk_expr};
use tessel_core::{op, post_order_visit};
use tessel_ir::{
    BindingBlock, ConstValue, DataType, Expr, ExprKind, MatchShape, PrimExpr, SymVar, Type, Var, VarBinding,
};

/// Records every expression it enters, labelled by variable name, operator
/// name or node kind.
#[derive(Default)]
struct Trace(Vec<String>);

impl ExprVisitor for Trace {
    fn visit_expr(&mut self, expr: &Expr) {
        let label = match expr.kind() {
            ExprKind::Var(n) | ExprKind::DataflowVar(n) => n.vid.name_hint().to_string(),
            ExprKind::Op(op) => op.name.clone(),
            ExprKind::GlobalVar(g) => format!("@{}", g.name_hint),
            kind => kind.name().to_string(),
        };
        self.0.push(label);
        walk_expr(self, expr);
    }

    fn visit_plain_var_def(&mut self, var: &Var) {
        self.0.push(format!("def {}", var.name_hint()));
    }

    fn visit_dataflow_var_def(&mut self, var: &Var) {
        self.0.push(format!("def df {}", var.name_hint()));
    }
}

fn trace(expr: &Expr) -> Vec<String> {
    let mut t = Trace::default();
    t.visit_expr(expr);
    t.0
}

fn var(name: &str) -> Var {
    Var::new(name, None, None)
}

#[test]
fn leaves_have_no_children() {
    let leaves = [
        Expr::constant(ConstValue::Float(1.5), DataType::Float32),
        Expr::shape_expr(vec![PrimExpr::Int(2)]),
        Expr::runtime_dep_shape(),
        Expr::extern_func("vm.alloc"),
        Expr::global_var("main"),
        Expr::op("relax.add"),
        var("x").to_expr(),
        Var::dataflow("lv", None, None).to_expr(),
    ];
    for leaf in &leaves {
        assert_eq!(trace(leaf).len(), 1, "{}", leaf.kind_name());
    }
}

#[test]
fn tuple_fields_in_order() {
    let e = Expr::tuple(vec![var("a").to_expr(), var("b").to_expr(), var("c").to_expr()]);
    assert_eq!(trace(&e), ["Tuple", "a", "b", "c"]);
}

#[test]
fn call_operator_then_arguments() {
    let e = Expr::call(Expr::global_var("f"), vec![var("a").to_expr(), var("b").to_expr()]);
    assert_eq!(trace(&e), ["Call", "@f", "a", "b"]);
}

#[test]
fn if_condition_then_branches() {
    let e = Expr::if_then_else(var("c").to_expr(), var("t").to_expr(), var("f").to_expr());
    assert_eq!(trace(&e), ["If", "c", "t", "f"]);
}

#[test]
fn tuple_get_item_visits_its_tuple() {
    let e = Expr::tuple_get_item(var("t").to_expr(), 0);
    assert_eq!(trace(&e), ["TupleGetItem", "t"]);
}

#[test]
fn function_parameters_are_definitions() {
    let x = var("x");
    let e = Expr::function(vec![x.clone()], op::add(x.to_expr(), x.to_expr()), None);
    assert_eq!(trace(&e), ["Function", "def x", "Call", "relax.add", "x", "x"]);
}

#[test]
fn seq_blocks_then_body() {
    let x = var("x");
    let n = SymVar::new("n");
    let lv = Var::dataflow("lv", None, None);
    let gv = var("gv");
    let m = var("m");
    let blocks = vec![
        BindingBlock::dataflow(vec![
            VarBinding::new(lv.clone(), x.to_expr()).into(),
            VarBinding::new(gv.clone(), lv.to_expr()).into(),
        ]),
        BindingBlock::new(vec![MatchShape::new(gv.to_expr(), vec![PrimExpr::from(&n)], m.clone()).into()]),
    ];
    let e = Expr::seq(blocks, m.to_expr());
    assert_eq!(
        trace(&e),
        ["SeqExpr", "x", "def df lv", "lv", "def gv", "gv", "ShapeExpr", "def m", "m"]
    );
}

#[test]
fn post_order_follows_every_occurrence() {
    let x = var("x");
    let y = var("y");
    let inner = op::add(x.to_expr(), y.to_expr());
    let e = Expr::if_then_else(
        x.to_expr(),
        Expr::tuple(vec![inner.clone(), Expr::constant(ConstValue::Bool(true), DataType::Bool)]),
        Expr::tuple_get_item(inner, 0),
    );
    let mut seen = Vec::new();
    post_order_visit(&e, |sub| seen.push(sub.kind_name()));
    assert_eq!(
        seen,
        [
            "Var", "Op", "Var", "Var", "Call", "Constant", "Tuple", "Op", "Var", "Var", "Call", "TupleGetItem", "If"
        ]
    );
}

#[test]
fn var_def_walk_reaches_shape_annotations() {
    #[derive(Default)]
    struct Shapes(usize);

    impl ExprVisitor for Shapes {
        fn visit_shape_expr(&mut self, _expr: &Expr, _op: &tessel_ir::ShapeExpr) {
            self.0 += 1;
        }
    }

    let x = Var::new("x", Some(Expr::shape_expr(vec![PrimExpr::Int(3)])), Some(Type::tensor(1, DataType::Int32)));
    let mut v = Shapes::default();
    v.visit_expr(&Expr::function(vec![x.clone()], x.to_expr(), None));
    assert_eq!(v.0, 1);
}
