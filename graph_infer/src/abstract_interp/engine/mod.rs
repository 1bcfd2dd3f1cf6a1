//! The inference engine.
//!
//! Inference is demand driven. Asking for the value of a [`Reference`] starts
//! its computation on the loop (at most once per reference); computing an
//! apply node asks for the callee and the arguments, which recursively asks
//! for more references. Recursive calls with a stable signature meet their
//! own pending return value and are resolved when the loop stalls.
//!
//! One engine serves one program: all caches, the reroute table and the
//! inferrer table live here, never in process-wide state.

use super::inferrers::{
    DummyInferrer, GraphInferrer, Inferrer, JInferrer, MacroInferrer, PartialInferrer,
    StandardInferrer, TrackedInferrer, VirtualInferrer,
};
use super::reference::{ArgRef, Context, EvaluationCache, Reference};
use super::scheduler::{priority, resolver, InferenceLoop, PendingId};
use crate::config::EngineConfig;
use crate::diagnostics::{
    emit_branches_joined, emit_rerouted, emit_specialization, DiagnosticsCollector,
};
use crate::error::{ErrorKind, InferResult, InferenceError};
use crate::ir::{Constant, GraphId, GraphManager, Node, NodeId, NodeKind, Primitive};
use crate::lattice::convert::{to_abstract, ConvertCx, ConverterTable, LiteralTypes};
use crate::lattice::ops::DTypeBinder;
use crate::lattice::{AbstractValue, DType, DTypeTrack, FunctionVariant, MergeMode};
use crate::tfuncs::PrimitiveRegistry;
use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use std::cell::{Ref, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, instrument, trace};

#[cfg(test)]
mod tests;

/// Call-site rewrites the engine performs itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Rewrite {
    /// `T(args)` → `partial(make_record, T)(args)`
    Constructor,
    /// `obj(args)` → `getattr(obj, "__call__")(args)`
    CallMethod,
    /// `partial(partial(f, a), b)(c)` → `f(a, b, c)`
    FlattenPartial,
}

/// Abstract interpreter for one program.
pub struct InferenceEngine {
    manager: RefCell<GraphManager>,
    lp: Rc<InferenceLoop>,
    cache: EvaluationCache,
    /// Rerouted call sites: original reference → replacement.
    reference_map: RefCell<HashMap<Reference, Reference>>,
    /// Nodes created by rewrites, so that a call site evaluated in many
    /// contexts is rewritten into one node.
    rewrites: RefCell<HashMap<(NodeId, Rewrite), NodeId>>,
    constructors: RefCell<HashMap<FunctionVariant, Rc<dyn Inferrer>>>,
    primitives: PrimitiveRegistry,
    converters: ConverterTable,
    /// Graph context → the call site that created it.
    trace: RefCell<HashMap<Context, Reference>>,
    /// Context → the function calls evaluated in it.
    call_sites: RefCell<HashMap<Context, Vec<Reference>>>,
    specializations: RefCell<HashSet<Context>>,
    config: EngineConfig,
}

impl fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("graphs", &self.manager.borrow().graph_count())
            .field("nodes", &self.manager.borrow().node_count())
            .field("cached_refs", &self.cache.len())
            .field("inferrers", &self.constructors.borrow().len())
            .field("config", &self.config)
            .finish()
    }
}

impl InferenceEngine {
    /// Creates an engine over `manager` with the given primitive table.
    ///
    /// The process-wide converter table is snapshotted here; converters
    /// registered later are not seen by this engine.
    pub fn new(
        manager: GraphManager,
        primitives: PrimitiveRegistry,
        config: EngineConfig,
    ) -> Rc<Self> {
        Rc::new(Self {
            manager: RefCell::new(manager),
            lp: Rc::new(InferenceLoop::new()),
            cache: EvaluationCache::new(),
            reference_map: RefCell::new(HashMap::new()),
            rewrites: RefCell::new(HashMap::new()),
            constructors: RefCell::new(HashMap::new()),
            primitives,
            converters: ConverterTable::snapshot(),
            trace: RefCell::new(HashMap::new()),
            call_sites: RefCell::new(HashMap::new()),
            specializations: RefCell::new(HashSet::new()),
            config,
        })
    }

    /// Creates an engine with the full primitive catalogue and default options.
    pub fn with_defaults(manager: GraphManager) -> Rc<Self> {
        Self::new(manager, PrimitiveRegistry::default(), EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn manager(&self) -> Ref<'_, GraphManager> {
        self.manager.borrow()
    }

    /// Mutate the graph arena. Must not be called while a borrow from
    /// [`manager`](Self::manager) is alive.
    pub fn with_manager_mut<R>(&self, f: impl FnOnce(&mut GraphManager) -> R) -> R {
        f(&mut self.manager.borrow_mut())
    }

    pub fn graph_name(&self, graph: GraphId) -> String {
        self.manager.borrow().graph_name(graph)
    }

    pub fn inference_loop(&self) -> &Rc<InferenceLoop> {
        &self.lp
    }

    pub fn cache(&self) -> &EvaluationCache {
        &self.cache
    }

    /// Infers `graph` called with `argspec`.
    ///
    /// Returns the concretized output and the root context. If `outspec` is
    /// given, the output must merge with it. The first error raised by any
    /// inference task is returned.
    #[instrument(skip(self, argspec, outspec), fields(graph = graph.0))]
    pub fn run(
        self: &Rc<Self>,
        graph: GraphId,
        argspec: &[AbstractValue],
        outspec: Option<&AbstractValue>,
    ) -> InferResult<(AbstractValue, Context)> {
        let _diagnostics = self.config.diagnostics.then(DiagnosticsCollector::scoped);
        let inferrer = self.get_inferrer_for(&FunctionVariant::Graph {
            graph,
            context: Context::empty(),
            tracking: None,
        })?;
        let root = Context::empty().add(graph, inferrer.normalize_args(argspec.to_vec())?);

        let output: Rc<RefCell<Option<AbstractValue>>> = Rc::default();
        let slot = output.clone();
        let engine = self.clone();
        let argrefs = argspec.iter().cloned().map(ArgRef::Virtual).collect();
        self.lp.schedule(async move {
            let value = engine
                .execute_inferrers(vec![inferrer], None, argrefs)
                .await?;
            *slot.borrow_mut() = Some(value);
            Ok(())
        });
        self.lp.run_forever();

        let errors = self.lp.take_errors();
        self.lp.clear_stalled_tasks();
        self.cache.drop_unsettled(&self.lp);
        if let Some(err) = errors.into_iter().next() {
            debug!(error = %err, "inference failed");
            return Err(err);
        }
        let out = output.borrow_mut().take();
        let out = out.ok_or_else(|| {
            InferenceError::unresolved(format!(
                "output of {} never resolved",
                self.graph_name(graph)
            ))
        })?;
        let out = self.concretize(&out)?;
        if let Some(expected) = outspec {
            self.abstract_merge(&[out.clone(), expected.clone()], MergeMode::Exact)?;
        }
        debug!(output = %out, "inference finished");
        Ok((out, root))
    }

    /// Reference to `node` in `context`, with the context filtered to the
    /// scope the node belongs to.
    ///
    /// Graph constants are scoped by their graph's parent: the closure they
    /// denote captures that frame. Numeric literals keep the whole context,
    /// so each use site gets its own dtype variable.
    pub fn reference(&self, node: NodeId, context: &Context) -> Reference {
        let manager = self.manager.borrow();
        let Some(n) = manager.node(node) else {
            return Reference::new(node, Context::empty());
        };
        if let NodeKind::Constant(c) = &n.kind {
            if c.holds_number() {
                return Reference::new(node, context.clone());
            }
        }
        let scope = match n.constant_graph() {
            Some(g) => manager.graph(g).and_then(|g| g.parent),
            None => n.graph,
        };
        Reference::new(node, context.filter(scope))
    }

    /// Owning graph and inputs of an apply node.
    pub(crate) fn apply_inputs(&self, node: NodeId) -> Option<(GraphId, Vec<NodeId>)> {
        let manager = self.manager.borrow();
        let node = manager.node(node)?;
        match &node.kind {
            NodeKind::Apply(inputs) => Some((node.graph?, inputs.clone())),
            _ => None,
        }
    }

    /// The node a call site was rewritten to, building it on first use.
    pub(crate) fn rewrite_call(
        &self,
        node: NodeId,
        rewrite: Rewrite,
        build: impl FnOnce(&mut GraphManager) -> NodeId,
    ) -> NodeId {
        if let Some(existing) = self.rewrites.borrow().get(&(node, rewrite)).copied() {
            return existing;
        }
        let created = self.with_manager_mut(build);
        self.rewrites.borrow_mut().insert((node, rewrite), created);
        created
    }

    /// Force the value of `reference`; used to bind parameters.
    pub fn set_value(&self, reference: Reference, value: AbstractValue) {
        self.cache.set_value(&self.lp, reference, value);
    }

    /// The value of `reference`, following reroutes.
    ///
    /// The computation is requested immediately; the returned future only
    /// waits for it.
    pub fn get_inferred(
        self: &Rc<Self>,
        reference: &Reference,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        let actual = match self.get_actual_ref(reference) {
            Ok(actual) => actual,
            Err(err) => return future::ready(Err(err)).boxed_local(),
        };
        let engine = self.clone();
        let pending = self
            .cache
            .get(&self.lp, actual, move |r| engine.compute_ref(r));
        let lp = self.lp.clone();
        async move { pending.await.map(|v| lp.deref_value(&v)) }.boxed_local()
    }

    /// Computes the value of `reference`. Called once per reference.
    pub fn compute_ref(
        self: Rc<Self>,
        reference: Reference,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        let node = self.manager.borrow().node(reference.node).cloned();
        trace!(reference = %reference, "computing reference");
        match node {
            None => future::ready(Err(InferenceError::internal(format!(
                "unknown node {}",
                reference.node.0
            ))))
            .boxed_local(),
            Some(Node {
                kind: NodeKind::Constant(constant),
                annotation,
                ..
            }) => {
                let result = match annotation {
                    Some(known) if !matches!(known, AbstractValue::Function(_)) => Ok(known),
                    _ => self.infer_constant(&reference, &constant),
                };
                future::ready(result).boxed_local()
            }
            Some(Node {
                kind: NodeKind::Apply(inputs),
                ..
            }) => self.infer_apply(reference, inputs),
            Some(Node {
                kind: NodeKind::Parameter { name },
                ..
            }) => future::ready(Err(InferenceError::internal(format!(
                "parameter '{}' has no value in {:?}",
                name, reference.context
            ))))
            .boxed_local(),
        }
    }

    /// Abstract value of a constant node.
    pub fn infer_constant(
        &self,
        reference: &Reference,
        constant: &Constant,
    ) -> InferResult<AbstractValue> {
        let literals: Option<&dyn LiteralTypes> = if self.config.literal_pendings {
            Some(&*self.lp)
        } else {
            None
        };
        let cx = ConvertCx {
            context: reference.context.clone(),
            node: Some(reference.node),
            literals,
            binder: &*self.lp,
            converters: &self.converters,
        };
        to_abstract(constant, &cx)
    }

    /// Infers an apply node: resolves the callee, then dispatches on its kind.
    pub fn infer_apply(
        self: Rc<Self>,
        reference: Reference,
        inputs: Vec<NodeId>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        async move {
            let result = self.clone().dispatch_apply(&reference, &inputs).await;
            result.map_err(|err| err.with_ref(reference))
        }
        .boxed_local()
    }

    async fn dispatch_apply(
        self: Rc<Self>,
        reference: &Reference,
        inputs: &[NodeId],
    ) -> InferResult<AbstractValue> {
        let Some((&callee, arg_nodes)) = inputs.split_first() else {
            return Err(InferenceError::internal("apply node without a callee"));
        };
        let fn_ref = self.reference(callee, &reference.context);
        let fn_value = self.get_inferred(&fn_ref).await?;

        match &fn_value {
            AbstractValue::Type(_) => {
                let graph = self.owning_graph(reference.node)?;
                let node = self.rewrite_call(reference.node, Rewrite::Constructor, |m| {
                    let partial = m.prim(Primitive::Partial);
                    let make_record = m.prim(Primitive::MakeRecord);
                    let ctor = m.apply(graph, vec![partial, make_record, callee]);
                    let mut call = vec![ctor];
                    call.extend_from_slice(arg_nodes);
                    m.apply(graph, call)
                });
                let target = self.reference(node, &reference.context);
                self.reroute(reference.clone(), target).await
            }
            AbstractValue::Error { reason } => Err(InferenceError::not_callable(format!(
                "an invalid value ({})",
                reason
            ))),
            AbstractValue::Class(_) | AbstractValue::Adt(_) => {
                let graph = self.owning_graph(reference.node)?;
                let node = self.rewrite_call(reference.node, Rewrite::CallMethod, |m| {
                    let name = m.constant(Constant::Str("__call__".to_string()));
                    let method = m.apply_prim(graph, Primitive::GetAttr, &[callee, name]);
                    let mut call = vec![method];
                    call.extend_from_slice(arg_nodes);
                    m.apply(graph, call)
                });
                let target = self.reference(node, &reference.context);
                self.reroute(reference.clone(), target).await
            }
            AbstractValue::Function(fns) => {
                let inferrers = fns
                    .iter()
                    .map(|f| self.get_inferrer_for(f))
                    .collect::<InferResult<Vec<_>>>()?;
                let argrefs = arg_nodes
                    .iter()
                    .map(|n| ArgRef::Node(self.reference(*n, &reference.context)))
                    .collect();
                self.record_call_site(reference);
                self.execute_inferrers(inferrers, Some(reference.clone()), argrefs)
                    .await
            }
            other => Err(InferenceError::not_callable(other.to_string())),
        }
    }

    fn owning_graph(&self, node: NodeId) -> InferResult<GraphId> {
        self.manager
            .borrow()
            .node(node)
            .and_then(|n| n.graph)
            .ok_or_else(|| InferenceError::internal(format!("node {} has no graph", node.0)))
    }

    /// Redirect `original` to `target` and return the target's value.
    pub fn reroute(
        self: &Rc<Self>,
        original: Reference,
        target: Reference,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        emit_rerouted(&original.to_string(), &target.to_string());
        self.reference_map
            .borrow_mut()
            .insert(original, target.clone());
        self.get_inferred(&target)
    }

    /// Follows the reroute chain from `reference` to its final replacement.
    pub fn get_actual_ref(&self, reference: &Reference) -> InferResult<Reference> {
        let map = self.reference_map.borrow();
        let mut current = reference;
        let mut seen = HashSet::new();
        while let Some(next) = map.get(current) {
            if !seen.insert(current) {
                return Err(InferenceError::internal(format!(
                    "reroute cycle through {}",
                    current
                )));
            }
            current = next;
        }
        Ok(current.clone())
    }

    /// The inferrer for a callee, built on first use and shared afterwards.
    ///
    /// Tracked callees get a [`TrackedInferrer`] of their own around the
    /// shared inferrer of the untracked callee.
    pub fn get_inferrer_for(&self, variant: &FunctionVariant) -> InferResult<Rc<dyn Inferrer>> {
        let cached = self.constructors.borrow().get(variant).cloned();
        if let Some(inferrer) = cached {
            return Ok(inferrer);
        }
        let inferrer: Rc<dyn Inferrer> = if variant.tracking().is_some() {
            Rc::new(TrackedInferrer::new(
                self.get_inferrer_for(&variant.untracked())?,
            ))
        } else {
            match variant {
                FunctionVariant::Primitive { prim, .. } => {
                    let rule = self.primitives.get(*prim).ok_or_else(|| {
                        InferenceError::internal(format!("no inference rule for {}", prim))
                    })?;
                    Rc::new(StandardInferrer::new(*prim, rule))
                }
                FunctionVariant::Graph { graph, context, .. } => Rc::new(
                    GraphInferrer::for_graph(*graph, context.clone(), self.parameter_names(*graph)?),
                ),
                FunctionVariant::MetaGraph { metagraph, .. } => {
                    let mg = self.manager.borrow().metagraph(*metagraph).ok_or_else(|| {
                        InferenceError::internal(format!("unknown metagraph {}", metagraph.0))
                    })?;
                    Rc::new(GraphInferrer::for_metagraph(mg))
                }
                FunctionVariant::Partial { func, args } => Rc::new(PartialInferrer::new(
                    self.get_inferrer_for(func)?,
                    args.clone(),
                )),
                FunctionVariant::JTransformed(inner) => Rc::new(JInferrer::new(
                    self.get_inferrer_for(inner)?,
                    (**inner).clone(),
                )),
                FunctionVariant::Macro(id) => {
                    let mac = self.manager.borrow().macro_(*id).ok_or_else(|| {
                        InferenceError::internal(format!("unknown macro {}", id.0))
                    })?;
                    Rc::new(MacroInferrer::new(mac))
                }
                FunctionVariant::Virtual { args, output } => {
                    Rc::new(VirtualInferrer::new(args.clone(), (**output).clone()))
                }
                FunctionVariant::Dummy => Rc::new(DummyInferrer::default()),
            }
        };
        trace!(inferrer = %inferrer.name(), "built inferrer");
        self.constructors
            .borrow_mut()
            .insert(variant.clone(), inferrer.clone());
        Ok(inferrer)
    }

    fn parameter_names(&self, graph: GraphId) -> InferResult<Vec<String>> {
        let manager = self.manager.borrow();
        let g = manager
            .graph(graph)
            .ok_or_else(|| InferenceError::internal(format!("unknown graph#{}", graph.0)))?;
        Ok(g.parameters
            .iter()
            .map(|p| match manager.node(*p).map(|n| &n.kind) {
                Some(NodeKind::Parameter { name }) => name.clone(),
                _ => String::new(),
            })
            .collect())
    }

    /// Calls a function value on known arguments. Used by higher-order
    /// primitives.
    pub fn execute(
        self: &Rc<Self>,
        func: &AbstractValue,
        args: Vec<AbstractValue>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        let inferrers = match func.as_functions() {
            Some(fns) => fns
                .iter()
                .map(|f| self.get_inferrer_for(f))
                .collect::<InferResult<Vec<_>>>(),
            None => Err(InferenceError::not_callable(func.to_string())),
        };
        match inferrers {
            Ok(inferrers) => self.execute_inferrers(
                inferrers,
                None,
                args.into_iter().map(ArgRef::Virtual).collect(),
            ),
            Err(err) => future::ready(Err(err)).boxed_local(),
        }
    }

    /// Runs the inferrers of every callee of a call site and joins them.
    ///
    /// If any inferrer reroutes the call, the call takes the value of the
    /// replacement instead; two different replacements are a defect.
    pub fn execute_inferrers(
        self: &Rc<Self>,
        inferrers: Vec<Rc<dyn Inferrer>>,
        outref: Option<Reference>,
        argrefs: Vec<ArgRef>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        let engine = self.clone();
        async move {
            let mut reroutes: Vec<Reference> = Vec::new();
            for inferrer in &inferrers {
                let target = inferrer
                    .clone()
                    .reroute(engine.clone(), outref.clone(), argrefs.clone())
                    .await?;
                if let Some(target) = target {
                    if !reroutes.contains(&target) {
                        reroutes.push(target);
                    }
                }
            }
            if reroutes.len() > 1 {
                return Err(InferenceError::internal(format!(
                    "{} different reroutes proposed for one call site",
                    reroutes.len()
                )));
            }
            if let Some(target) = reroutes.pop() {
                return match outref {
                    Some(original) => engine.reroute(original, target).await,
                    None => engine.get_inferred(&target).await,
                };
            }
            match inferrers.len() {
                0 => Err(InferenceError::internal("call site without callees")),
                1 => inferrers[0].clone().run(engine, outref, argrefs).await,
                _ => engine.join_branches(inferrers, outref, argrefs).await,
            }
        }
        .boxed_local()
    }

    /// Runs several inferrers concurrently and resolves to the join of their
    /// results.
    ///
    /// The join is a pending value the loop may force before every branch
    /// has finished (a recursive branch waits on the join itself). It is then
    /// forced to the broadened join of the finished branches; a branch that
    /// finishes later must not change it.
    async fn join_branches(
        self: Rc<Self>,
        inferrers: Vec<Rc<dyn Inferrer>>,
        outref: Option<Reference>,
        argrefs: Vec<ArgRef>,
    ) -> InferResult<AbstractValue> {
        let lp = self.lp.clone();
        let total = inferrers.len();
        let results: Rc<RefCell<Vec<AbstractValue>>> = Rc::default();

        let id = {
            let for_resolver = results.clone();
            let for_priority = results.clone();
            let binder = lp.clone();
            lp.create_pending(
                Some(resolver(move || {
                    let done = for_resolver.borrow();
                    if done.is_empty() {
                        return Err(InferenceError::unresolved(
                            "no branch of a polymorphic call finished",
                        ));
                    }
                    merge_all(&*binder, &done, MergeMode::Widen).map(|v| v.broaden())
                })),
                Some(priority(move || match for_priority.borrow().len() {
                    0 => i32::MIN,
                    n => i32::try_from(n).unwrap_or(i32::MAX),
                })),
            )
        };

        for inferrer in inferrers {
            let engine = self.clone();
            let outref = outref.clone();
            let argrefs = argrefs.clone();
            let results = results.clone();
            lp.spawn(async move {
                match inferrer.run(engine.clone(), outref, argrefs).await {
                    Ok(value) => engine.branch_finished(id, &results, total, value),
                    Err(err) => {
                        if !engine.lp.fail(id, err.clone()) {
                            engine.lp.push_error(err);
                        }
                    }
                }
            });
        }
        lp.pending(id).await
    }

    fn branch_finished(
        &self,
        id: PendingId,
        results: &RefCell<Vec<AbstractValue>>,
        total: usize,
        value: AbstractValue,
    ) {
        if self.lp.is_waiting(id) {
            results.borrow_mut().push(value);
            let done = results.borrow();
            if done.len() == total {
                match merge_all(&*self.lp, &done, MergeMode::Widen) {
                    Ok(joined) => {
                        emit_branches_joined(total, &joined.to_string());
                        self.lp.resolve(id, joined);
                    }
                    Err(err) => {
                        self.lp.fail(id, err);
                    }
                }
            }
            return;
        }
        if let Some(Ok(forced)) = self.lp.peek(id) {
            let check = forced.merge(&value, &*self.lp, MergeMode::Widen);
            let forced = self.lp.deref_value(&forced);
            match check {
                Ok(joined) if self.lp.deref_value(&joined) == forced => {}
                Ok(_) => self.lp.push_error(InferenceError::type_mismatch(
                    &forced,
                    &value,
                    "a late branch widens an already forced result",
                )),
                Err(err) => self.lp.push_error(err),
            }
        }
    }

    /// Values of `argrefs`, all requested before any is awaited.
    pub fn resolve_args(
        self: &Rc<Self>,
        argrefs: &[ArgRef],
    ) -> LocalBoxFuture<'static, InferResult<Vec<AbstractValue>>> {
        let requests: Vec<LocalBoxFuture<'static, InferResult<AbstractValue>>> = argrefs
            .iter()
            .map(|arg| match arg {
                ArgRef::Node(r) => self.get_inferred(r),
                ArgRef::Virtual(v) => future::ready(Ok(v.clone())).boxed_local(),
            })
            .collect();
        async move {
            let mut values = Vec::with_capacity(requests.len());
            for request in requests {
                values.push(request.await?);
            }
            Ok(values)
        }
        .boxed_local()
    }

    /// Join of `values`, binding pending dtypes along the way.
    pub fn abstract_merge(
        &self,
        values: &[AbstractValue],
        mode: MergeMode,
    ) -> InferResult<AbstractValue> {
        merge_all(&*self.lp, values, mode)
    }

    /// Unify two TYPE tracks.
    pub fn bind_dtypes(&self, a: &DTypeTrack, b: &DTypeTrack) -> InferResult<DTypeTrack> {
        self.lp.bind(a, b)
    }

    /// Binds the dtypes of `values`, forces the result now and checks it.
    ///
    /// Used where a decision cannot wait, such as the condition of a switch.
    pub fn check_immediate(
        &self,
        values: &[AbstractValue],
        predicate: fn(&DType) -> bool,
        expected: &str,
    ) -> InferResult<DType> {
        let mut joined: Option<DTypeTrack> = None;
        for value in values {
            let dtype = value.dtype().ok_or_else(|| {
                InferenceError::mismatch_text(expected, value.to_string(), "expected a scalar")
            })?;
            joined = Some(match joined {
                None => dtype,
                Some(prev) => self.lp.bind(&prev, &dtype)?,
            });
        }
        let track = joined
            .ok_or_else(|| InferenceError::internal("check_immediate without values"))?;
        let dtype = match self.lp.deref_track(&track) {
            DTypeTrack::Known(d) => d,
            DTypeTrack::Pending(id) => self.lp.force_type_var(id)?,
            DTypeTrack::Anything => {
                return Err(InferenceError::mismatch_text(
                    expected,
                    "?",
                    "the type must be known here",
                ))
            }
        };
        if predicate(&dtype) {
            Ok(dtype)
        } else {
            Err(InferenceError::mismatch_text(
                expected,
                dtype.to_string(),
                "unexpected type",
            ))
        }
    }

    /// `value` with every pending dtype forced.
    pub fn concretize(&self, value: &AbstractValue) -> InferResult<AbstractValue> {
        self.lp.concretize(value)
    }

    /// Concretized value of a reference computed by a previous run.
    pub fn inferred_value(&self, reference: &Reference) -> Option<InferResult<AbstractValue>> {
        let actual = self.get_actual_ref(reference).ok()?;
        self.cache
            .peek(&self.lp, &actual)
            .map(|result| result.and_then(|v| self.concretize(&v)))
    }

    /// The call site that created `context`.
    pub fn trace_ref(&self, context: &Context) -> Option<Reference> {
        self.trace.borrow().get(context).cloned()
    }

    pub(crate) fn record_trace(&self, context: &Context, call_site: &Reference) {
        self.trace
            .borrow_mut()
            .entry(context.clone())
            .or_insert_with(|| call_site.clone());
    }

    /// Function calls evaluated in `context`, in dispatch order.
    pub fn call_sites(&self, context: &Context) -> Vec<Reference> {
        self.call_sites
            .borrow()
            .get(context)
            .cloned()
            .unwrap_or_default()
    }

    fn record_call_site(&self, call_site: &Reference) {
        let mut sites = self.call_sites.borrow_mut();
        let entry = sites.entry(call_site.context.clone()).or_default();
        if !entry.contains(call_site) {
            entry.push(call_site.clone());
        }
    }

    /// Records a new graph context, enforcing the specialization limit.
    pub(crate) fn note_specialization(&self, context: &Context, graph: GraphId) -> InferResult<()> {
        if self.specializations.borrow().contains(context) {
            return Ok(());
        }
        let count = self.specializations.borrow().len();
        if let Some(limit) = self.config.max_specializations {
            if count >= limit {
                return Err(InferenceError::new(ErrorKind::FuelExhausted { limit }));
            }
        }
        self.specializations.borrow_mut().insert(context.clone());
        emit_specialization(&self.graph_name(graph), context.depth());
        Ok(())
    }

    /// Number of distinct graph contexts entered so far.
    pub fn specialization_count(&self) -> usize {
        self.specializations.borrow().len()
    }
}

fn merge_all(
    binder: &dyn DTypeBinder,
    values: &[AbstractValue],
    mode: MergeMode,
) -> InferResult<AbstractValue> {
    let Some((first, rest)) = values.split_first() else {
        return Err(InferenceError::internal("merge of no values"));
    };
    rest.iter()
        .try_fold(first.clone(), |acc, v| acc.merge(v, binder, mode))
}
