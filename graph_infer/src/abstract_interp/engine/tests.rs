use super::*;
use crate::lattice::{ScalarValue, Track};
use pretty_assertions::assert_eq;

fn engine(manager: GraphManager) -> Rc<InferenceEngine> {
    InferenceEngine::with_defaults(manager)
}

/// Drive `task` to completion on the engine's loop.
fn drive(
    engine: &Rc<InferenceEngine>,
    task: LocalBoxFuture<'static, InferResult<AbstractValue>>,
) -> InferResult<AbstractValue> {
    let out: Rc<RefCell<Option<AbstractValue>>> = Rc::default();
    let slot = out.clone();
    engine.inference_loop().schedule(async move {
        *slot.borrow_mut() = Some(task.await?);
        Ok(())
    });
    engine.inference_loop().run_forever();
    if let Some(err) = engine.inference_loop().take_errors().into_iter().next() {
        return Err(err);
    }
    let value = out.borrow_mut().take();
    value.ok_or_else(|| InferenceError::unresolved("task"))
}

/// `outer(x) = inner(x)` with `inner(y) = y`.
fn nested_call(m: &mut GraphManager) -> (GraphId, GraphId, NodeId) {
    let inner = m.add_graph("inner", None);
    let y = m.add_parameter(inner, "y");
    m.set_output(inner, y);

    let outer = m.add_graph("outer", None);
    let x = m.add_parameter(outer, "x");
    let f = m.graph_constant(inner);
    let call = m.apply(outer, vec![f, x]);
    m.set_output(outer, call);
    (outer, inner, call)
}

#[test]
fn test_reference_scopes_nodes() {
    let mut m = GraphManager::new();
    let outer = m.add_graph("outer", None);
    let x = m.add_parameter(outer, "x");
    let closure = m.add_graph("closure", Some(outer));
    let body = m.apply_prim(closure, Primitive::ScalarNeg, &[x]);
    let closure_const = m.graph_constant(closure);
    let outer_const = m.graph_constant(outer);
    let e = engine(m);

    let outer_ctx = Context::empty().add(outer, vec![AbstractValue::int64()]);
    let closure_ctx = outer_ctx.add(closure, vec![]);

    assert_eq!(e.reference(body, &closure_ctx).context, closure_ctx);
    assert_eq!(e.reference(x, &closure_ctx).context, outer_ctx);
    // A closure constant captures its parent's frame.
    assert_eq!(e.reference(closure_const, &closure_ctx).context, outer_ctx);
    assert!(e.reference(outer_const, &closure_ctx).context.is_empty());
}

#[test]
fn test_get_actual_ref_follows_reroutes() {
    let e = engine(GraphManager::new());
    let a = Reference::new(NodeId(0), Context::empty());
    let b = Reference::new(NodeId(1), Context::empty());
    let c = Reference::new(NodeId(2), Context::empty());

    assert_eq!(e.get_actual_ref(&a).unwrap(), a);
    e.reference_map.borrow_mut().insert(a.clone(), b.clone());
    e.reference_map.borrow_mut().insert(b.clone(), c.clone());
    assert_eq!(e.get_actual_ref(&a).unwrap(), c);
    assert_eq!(e.get_actual_ref(&b).unwrap(), c);
}

#[test]
fn test_get_actual_ref_detects_cycles() {
    let e = engine(GraphManager::new());
    let a = Reference::new(NodeId(0), Context::empty());
    let b = Reference::new(NodeId(1), Context::empty());
    e.reference_map.borrow_mut().insert(a.clone(), b.clone());
    e.reference_map.borrow_mut().insert(b, a.clone());

    let err = e.get_actual_ref(&a).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InternalConsistency(_)));
}

#[test]
fn test_inferrers_are_shared() {
    let e = engine(GraphManager::new());
    let add = FunctionVariant::primitive(Primitive::ScalarAdd);

    let first = e.get_inferrer_for(&add).unwrap();
    let second = e.get_inferrer_for(&add).unwrap();
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(first.name(), Primitive::ScalarAdd.name());
}

#[test]
fn test_tracked_callee_wraps_untracked_inferrer() {
    let e = engine(GraphManager::new());
    let tracked = FunctionVariant::Primitive {
        prim: Primitive::ScalarMul,
        tracking: Some(NodeId(7)),
    };

    let inferrer = e.get_inferrer_for(&tracked).unwrap();
    assert_eq!(
        inferrer.name(),
        format!("tracked({})", Primitive::ScalarMul.name())
    );
    // The untracked inferrer was built along the way.
    assert_eq!(e.constructors.borrow().len(), 2);
}

#[test]
fn test_rewrites_are_interned() {
    let mut m = GraphManager::new();
    let g = m.add_graph("g", None);
    let x = m.add_parameter(g, "x");
    let e = engine(m);

    let build = |m: &mut GraphManager| m.apply_prim(g, Primitive::ScalarNeg, &[x]);
    let first = e.rewrite_call(x, Rewrite::CallMethod, build);
    let count = e.manager().node_count();
    let second = e.rewrite_call(x, Rewrite::CallMethod, build);
    assert_eq!(first, second);
    assert_eq!(e.manager().node_count(), count);

    let other = e.rewrite_call(x, Rewrite::Constructor, build);
    assert_ne!(other, first);
}

#[test]
fn test_execute_function_value() {
    let e = engine(GraphManager::new());
    let add = AbstractValue::function(FunctionVariant::primitive(Primitive::ScalarAdd));

    let task = e.execute(&add, vec![AbstractValue::int64(), AbstractValue::int64()]);
    assert_eq!(drive(&e, task).unwrap(), AbstractValue::int64());
}

#[test]
fn test_execute_non_function() {
    let e = engine(GraphManager::new());
    let task = e.execute(&AbstractValue::int64(), vec![]);
    let err = drive(&e, task).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotCallable(_)));
}

#[test]
fn test_check_immediate_forces_literal() {
    let e = engine(GraphManager::new());
    let literal = AbstractValue::Scalar {
        value: Track::Known(ScalarValue::Int(3)),
        dtype: e.inference_loop().literal_dtype(DType::INT64, 0),
    };

    let dtype = e
        .check_immediate(&[literal.clone()], DType::is_number, "number")
        .unwrap();
    assert_eq!(dtype, DType::INT64);
    assert_eq!(
        e.concretize(&literal).unwrap(),
        AbstractValue::constant(ScalarValue::Int(3), DType::INT64)
    );
}

#[test]
fn test_check_immediate_binds_values_together() {
    let e = engine(GraphManager::new());
    let literal = AbstractValue::Scalar {
        value: Track::Known(ScalarValue::Int(3)),
        dtype: e.inference_loop().literal_dtype(DType::INT64, 0),
    };

    let dtype = e
        .check_immediate(
            &[literal, AbstractValue::float32()],
            DType::is_number,
            "number",
        )
        .unwrap();
    assert_eq!(dtype, DType::FLOAT32);
}

#[test]
fn test_check_immediate_rejects() {
    let e = engine(GraphManager::new());
    let err = e
        .check_immediate(&[AbstractValue::int64()], |d| *d == DType::Bool, "Bool")
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));

    let tuple = AbstractValue::Tuple(vec![]);
    assert!(e.check_immediate(&[tuple], DType::is_number, "number").is_err());
}

#[test]
fn test_concretize_uses_literal_defaults() {
    let e = engine(GraphManager::new());
    let value = AbstractValue::Tuple(vec![
        AbstractValue::Scalar {
            value: Track::Anything,
            dtype: e.inference_loop().literal_dtype(DType::FLOAT64, 1),
        },
        AbstractValue::int64(),
    ]);

    assert_eq!(
        e.concretize(&value).unwrap(),
        AbstractValue::Tuple(vec![AbstractValue::float64(), AbstractValue::int64()])
    );
}

#[test]
fn test_annotation_replaces_constant_value() {
    let mut m = GraphManager::new();
    let g = m.add_graph("annotated", None);
    let five = m.constant(Constant::Int(5));
    m.annotate(five, AbstractValue::float32());
    m.set_output(g, five);
    let e = engine(m);

    let (out, _) = e.run(g, &[], None).unwrap();
    assert_eq!(out, AbstractValue::float32());
}

#[test]
fn test_parameter_without_binding() {
    let mut m = GraphManager::new();
    let g = m.add_graph("g", None);
    let x = m.add_parameter(g, "x");
    let e = engine(m);

    let task = e.get_inferred(&Reference::new(x, Context::empty()));
    let err = drive(&e, task).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InternalConsistency(_)));
}

#[test]
fn test_specializations_count_distinct_contexts() {
    let mut m = GraphManager::new();
    let g = m.add_graph("g", None);
    let config = EngineConfig::default().with_max_specializations(2);
    let e = InferenceEngine::new(m, PrimitiveRegistry::default(), config);
    let int_ctx = Context::empty().add(g, vec![AbstractValue::int64()]);
    let float_ctx = Context::empty().add(g, vec![AbstractValue::float64()]);
    let bool_ctx = Context::empty().add(g, vec![AbstractValue::bool()]);

    e.note_specialization(&int_ctx, g).unwrap();
    e.note_specialization(&int_ctx, g).unwrap();
    e.note_specialization(&float_ctx, g).unwrap();
    assert_eq!(e.specialization_count(), 2);

    let err = e.note_specialization(&bool_ctx, g).unwrap_err();
    assert_eq!(err.kind, ErrorKind::FuelExhausted { limit: 2 });
    // Known contexts stay allowed after the limit.
    assert!(e.note_specialization(&float_ctx, g).is_ok());
}

#[test]
fn test_trace_records_call_site() {
    let mut m = GraphManager::new();
    let (outer, inner, call) = nested_call(&mut m);
    let e = engine(m);

    let (out, root) = e.run(outer, &[AbstractValue::int64()], None).unwrap();
    assert_eq!(out, AbstractValue::int64());

    let inner_ctx = Context::empty().add(inner, vec![AbstractValue::int64()]);
    assert_eq!(e.trace_ref(&inner_ctx), Some(Reference::new(call, root.clone())));
    assert_eq!(e.trace_ref(&root), None);
}

#[test]
fn test_call_sites_are_recorded_per_context() {
    let mut m = GraphManager::new();
    let (outer, inner, call) = nested_call(&mut m);
    let e = engine(m);

    let (_, root) = e.run(outer, &[AbstractValue::int64()], None).unwrap();
    assert_eq!(e.call_sites(&root), vec![Reference::new(call, root.clone())]);

    let inner_ctx = Context::empty().add(inner, vec![AbstractValue::int64()]);
    assert!(e.call_sites(&inner_ctx).is_empty());
}

#[test]
fn test_number_literals_are_scoped_to_their_use() {
    let mut m = GraphManager::new();
    let g = m.add_graph("g", None);
    let one = m.constant(Constant::Int(1));
    let pair = m.constant(Constant::Tuple(vec![Constant::Bool(true), Constant::Float(0.5)]));
    let name = m.constant(Constant::Str("x".to_string()));
    let e = engine(m);
    let ctx = Context::empty().add(g, vec![AbstractValue::int64()]);

    assert_eq!(e.reference(one, &ctx).context, ctx);
    assert_eq!(e.reference(pair, &ctx).context, ctx);
    assert!(e.reference(name, &ctx).context.is_empty());
}

#[test]
fn test_inferred_value_after_run() {
    let mut m = GraphManager::new();
    let (outer, _, call) = nested_call(&mut m);
    let e = engine(m);

    let (_, root) = e.run(outer, &[AbstractValue::float64()], None).unwrap();
    let value = e.inferred_value(&e.reference(call, &root)).unwrap().unwrap();
    assert_eq!(value, AbstractValue::float64());
    assert!(e
        .inferred_value(&Reference::new(call, Context::empty()))
        .is_none());
}
