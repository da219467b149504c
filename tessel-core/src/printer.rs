#![forbid(unsafe_code)]

//! Human-readable text form, used in logs and test failure messages.

use std::fmt::Write;

use tessel_ir::{
    Binding, BindingBlock, Call, ConstValue, Constant, Expr, ExprKind, ExternFunc, Function, GlobalVar, If, Op, SeqExpr,
    ShapeExpr, Tuple, TupleGetItem, Var, VarNode,
};

use crate::functor::ExprFunctor;

const INDENT: &str = "  ";

/// Renders an expression. The forwarded argument is the indentation level
/// for multi-line nodes.
#[derive(Debug, Default)]
pub struct Printer;

impl Printer {
    fn var_def(&mut self, var: &Var) -> String {
        let mut out = var.name_hint().to_string();
        if let Some(ty) = var.checked_type() {
            let _ = write!(out, ": {ty}");
        }
        if let Some(shape) = var.shape() {
            let _ = write!(out, " {}", self.visit_expr(shape, 0));
        }
        out
    }

    fn list(&mut self, items: &[Expr], depth: usize) -> String {
        items
            .iter()
            .map(|e| self.visit_expr(e, depth))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn block(&mut self, block: &BindingBlock, depth: usize, out: &mut String) {
        let pad = INDENT.repeat(depth);
        if block.is_dataflow {
            let _ = writeln!(out, "{pad}with dataflow {{");
        }
        let inner = if block.is_dataflow { depth + 1 } else { depth };
        let inner_pad = INDENT.repeat(inner);
        for binding in &block.bindings {
            let line = match binding {
                Binding::Var(b) => format!("{} = {}", self.var_def(&b.var), self.visit_expr(&b.value, inner)),
                Binding::MatchShape(b) => {
                    let pattern = b.pattern.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ");
                    format!(
                        "{} = match_shape({}, ({pattern}))",
                        self.var_def(&b.var),
                        self.visit_expr(&b.value, inner)
                    )
                }
            };
            let _ = writeln!(out, "{inner_pad}{line}");
        }
        if block.is_dataflow {
            let _ = writeln!(out, "{pad}}}");
        }
    }

    /// `{ ... }` around a body; a `SeqExpr` body lays its blocks out as lines.
    fn braced(&mut self, body: &Expr, depth: usize) -> String {
        let mut out = String::from("{\n");
        let inner = depth + 1;
        let result = match body.kind() {
            ExprKind::SeqExpr(seq) => {
                for block in &seq.blocks {
                    self.block(block, inner, &mut out);
                }
                self.visit_expr(&seq.body, inner)
            }
            _ => self.visit_expr(body, inner),
        };
        let _ = writeln!(out, "{}{result}", INDENT.repeat(inner));
        let _ = write!(out, "{}}}", INDENT.repeat(depth));
        out
    }
}

impl ExprFunctor<usize> for Printer {
    type Output = String;

    fn visit_expr_default(&mut self, expr: &Expr, _depth: usize) -> String {
        format!("<{}>", expr.kind_name())
    }

    fn visit_constant(&mut self, _expr: &Expr, op: &Constant, _depth: usize) -> String {
        match op.value {
            ConstValue::Bool(b) => format!("{b}"),
            ConstValue::Int(i) => format!("{i}:{}", op.dtype),
            ConstValue::Float(x) => format!("{x:?}:{}", op.dtype),
        }
    }

    fn visit_tuple(&mut self, _expr: &Expr, op: &Tuple, depth: usize) -> String {
        format!("({})", self.list(&op.fields, depth))
    }

    fn visit_var(&mut self, _expr: &Expr, op: &VarNode, _depth: usize) -> String {
        op.vid.name_hint().to_string()
    }

    fn visit_dataflow_var(&mut self, _expr: &Expr, op: &VarNode, _depth: usize) -> String {
        op.vid.name_hint().to_string()
    }

    fn visit_shape_expr(&mut self, _expr: &Expr, op: &ShapeExpr, _depth: usize) -> String {
        let dims = op.values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
        format!("shape({dims})")
    }

    fn visit_runtime_dep_shape(&mut self, _expr: &Expr, _depth: usize) -> String {
        "runtime_dep_shape".to_string()
    }

    fn visit_extern_func(&mut self, _expr: &Expr, op: &ExternFunc, _depth: usize) -> String {
        format!("extern(\"{}\")", op.global_symbol)
    }

    fn visit_global_var(&mut self, _expr: &Expr, op: &GlobalVar, _depth: usize) -> String {
        format!("@{}", op.name_hint)
    }

    fn visit_function(&mut self, _expr: &Expr, op: &Function, depth: usize) -> String {
        let params = op.params.iter().map(|p| self.var_def(p)).collect::<Vec<_>>().join(", ");
        let ret = op.ret_type.as_ref().map(|t| format!(" -> {t}")).unwrap_or_default();
        format!("fn({params}){ret} {}", self.braced(&op.body, depth))
    }

    fn visit_call(&mut self, _expr: &Expr, op: &Call, depth: usize) -> String {
        let mut out = self.visit_expr(&op.op, depth);
        if !op.type_args.is_empty() {
            let tys = op.type_args.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ");
            let _ = write!(out, "[{tys}]");
        }
        let _ = write!(out, "({}", self.list(&op.args, depth));
        for (k, v) in &op.attrs {
            let _ = write!(out, ", {k}={v:?}");
        }
        out.push(')');
        out
    }

    fn visit_seq_expr(&mut self, expr: &Expr, _op: &SeqExpr, depth: usize) -> String {
        self.braced(expr, depth)
    }

    fn visit_if(&mut self, _expr: &Expr, op: &If, depth: usize) -> String {
        format!(
            "if {} {} else {}",
            self.visit_expr(&op.cond, depth),
            self.braced(&op.true_branch, depth),
            self.braced(&op.false_branch, depth)
        )
    }

    fn visit_op(&mut self, _expr: &Expr, op: &Op, _depth: usize) -> String {
        op.name.clone()
    }

    fn visit_tuple_get_item(&mut self, _expr: &Expr, op: &TupleGetItem, depth: usize) -> String {
        format!("{}[{}]", self.visit_expr(&op.tuple, depth), op.index)
    }
}

pub fn pretty(expr: &Expr) -> String {
    Printer.visit_expr(expr, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_builder::BlockBuilder;
    use crate::op::add;
    use tessel_ir::{DataType, PrimExpr, SymVar, Type};

    #[test]
    fn prints_a_built_function() {
        let n = SymVar::new("n");
        let x = Var::new(
            "x",
            Some(Expr::shape_expr(vec![PrimExpr::from(&n)])),
            Some(Type::tensor(1, DataType::Float32)),
        );
        let mut bb = BlockBuilder::new();
        bb.begin_dataflow_block();
        let lv = bb.emit(&add(x.to_expr(), x.to_expr()), None).expect("emit");
        let gv = bb.emit_output(lv.as_expr(), None).expect("output");
        let block = bb.end_block().expect("end");
        let func = Expr::function(vec![x], Expr::seq(vec![block], gv.to_expr()), None);

        let expected = "\
fn(x: Tensor[ndim=1, float32] shape(n)) {
  with dataflow {
    lv: Tensor[ndim=1, float32] shape(n) = relax.add(x, x)
    gv: Tensor[ndim=1, float32] shape(n) = lv
  }
  gv
}";
        assert_eq!(pretty(&func), expected);
    }

    #[test]
    fn prints_leaves_and_projections() {
        let t = Expr::tuple(vec![
            Expr::constant(ConstValue::Int(3), DataType::Int64),
            Expr::global_var("main"),
            Expr::runtime_dep_shape(),
        ]);
        assert_eq!(pretty(&Expr::tuple_get_item(t, 1)), "(3:int64, @main, runtime_dep_shape)[1]");
    }
}
