//! Shared helpers for integration tests
// Each test target uses a different subset of these builders.
#![allow(dead_code)]

use graph_infer::ir::RecordValue;
use graph_infer::lattice::ClassLike;
use graph_infer::{
    AbstractValue, Constant, DType, GraphId, GraphManager, InferenceEngine, NodeId, Primitive,
    ScalarValue,
};
use std::rc::Rc;

pub fn int(v: i64) -> AbstractValue {
    AbstractValue::constant(ScalarValue::Int(v), DType::INT64)
}

pub fn float(v: f64) -> AbstractValue {
    AbstractValue::constant(ScalarValue::Float(v), DType::FLOAT64)
}

pub fn string(s: &str) -> AbstractValue {
    AbstractValue::constant(ScalarValue::Str(s.to_string()), DType::Str)
}

pub fn engine(manager: GraphManager) -> Rc<InferenceEngine> {
    InferenceEngine::with_defaults(manager)
}

/// `name(x, y) = prim(x, y)`
pub fn binary_graph(m: &mut GraphManager, name: &str, prim: Primitive) -> GraphId {
    let g = m.add_graph(name, None);
    let x = m.add_parameter(g, "x");
    let y = m.add_parameter(g, "y");
    let out = m.apply_prim(g, prim, &[x, y]);
    m.set_output(g, out);
    g
}

/// A graph `name(params...)` whose output is built by `body`.
pub fn graph_with(
    m: &mut GraphManager,
    name: &str,
    parent: Option<GraphId>,
    params: &[&str],
    body: impl FnOnce(&mut GraphManager, GraphId, &[NodeId]) -> NodeId,
) -> GraphId {
    let g = m.add_graph(name, parent);
    let nodes: Vec<NodeId> = params.iter().map(|p| m.add_parameter(g, *p)).collect();
    let out = body(m, g, &nodes);
    m.set_output(g, out);
    g
}

/// `switch(cond, if_true, if_false)()` in graph `g`.
pub fn branch_call(
    m: &mut GraphManager,
    g: GraphId,
    cond: NodeId,
    if_true: GraphId,
    if_false: GraphId,
) -> NodeId {
    let t = m.graph_constant(if_true);
    let f = m.graph_constant(if_false);
    let chosen = m.apply_prim(g, Primitive::Switch, &[cond, t, f]);
    m.apply(g, vec![chosen])
}

/// ```text
/// fact(n) = switch(n <= 1, () -> 1, () -> n * fact(n - 1))()
/// ```
pub fn fact_graph(m: &mut GraphManager) -> GraphId {
    let fact = m.add_graph("fact", None);
    let n = m.add_parameter(fact, "n");

    let base = m.add_graph("fact_base", Some(fact));
    let one = m.constant(Constant::Int(1));
    m.set_output(base, one);

    let step = m.add_graph("fact_step", Some(fact));
    let one_again = m.constant(Constant::Int(1));
    let n_minus_one = m.apply_prim(step, Primitive::ScalarSub, &[n, one_again]);
    let fact_const = m.graph_constant(fact);
    let rec = m.apply(step, vec![fact_const, n_minus_one]);
    let product = m.apply_prim(step, Primitive::ScalarMul, &[n, rec]);
    m.set_output(step, product);

    let limit = m.constant(Constant::Int(1));
    let cond = m.apply_prim(fact, Primitive::ScalarLe, &[n, limit]);
    let out = branch_call(m, fact, cond, base, step);
    m.set_output(fact, out);
    fact
}

/// ```text
/// count(t) = switch(tuple_len(t) == 0, () -> 0, () -> count(tuple_tail(t)))()
/// ```
pub fn tuple_count_graph(m: &mut GraphManager) -> GraphId {
    let count = m.add_graph("count", None);
    let t = m.add_parameter(count, "t");

    let base = m.add_graph("count_base", Some(count));
    let zero = m.constant(Constant::Int(0));
    m.set_output(base, zero);

    let step = m.add_graph("count_step", Some(count));
    let tail = m.apply_prim(step, Primitive::TupleTail, &[t]);
    let count_const = m.graph_constant(count);
    let rec = m.apply(step, vec![count_const, tail]);
    m.set_output(step, rec);

    let len = m.apply_prim(count, Primitive::TupleLen, &[t]);
    let zero_again = m.constant(Constant::Int(0));
    let cond = m.apply_prim(count, Primitive::ScalarEq, &[len, zero_again]);
    let out = branch_call(m, count, cond, base, step);
    m.set_output(count, out);
    count
}

/// Class `Point{x: Int64, y: Int64}`, used as a constructor through `Constant::Type`.
pub fn point_class() -> AbstractValue {
    AbstractValue::Class(ClassLike::new(
        "Point",
        vec![
            ("x".to_string(), AbstractValue::int64()),
            ("y".to_string(), AbstractValue::int64()),
        ],
    ))
}

/// Record `Adder{k}` whose `__call__(self, x)` returns `x + self.k`.
pub fn adder_record(m: &mut GraphManager, k: i64) -> Constant {
    let call = graph_with(m, "Adder.__call__", None, &["self", "x"], |m, g, p| {
        let name = m.constant(Constant::Str("k".to_string()));
        let field = m.apply_prim(g, Primitive::GetAttr, &[p[0], name]);
        m.apply_prim(g, Primitive::ScalarAdd, &[p[1], field])
    });
    Constant::Record(
        RecordValue::new("Adder", vec![("k".to_string(), Constant::Int(k))])
            .with_method("__call__", call),
    )
}
