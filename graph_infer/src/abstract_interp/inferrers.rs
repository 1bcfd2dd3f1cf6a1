//! Inferrers: strategies computing the abstract result of a call.
//!
//! Every callee kind in [`FunctionVariant`] maps to one inferrer. The engine
//! builds them lazily and keeps one per variant for the lifetime of a run.
//!
//! | Inferrer | Result | Reroute |
//! |----------|--------|---------|
//! | [`StandardInferrer`] | fixed rule of a primitive | - |
//! | [`GraphInferrer`] | return node of a specialized graph | - |
//! | [`PartialInferrer`] | wrapped inferrer with bound arguments first | flattens nested `partial` |
//! | [`VirtualInferrer`] | declared output after checking arguments | - |
//! | [`TrackedInferrer`] | wrapped inferrer, own cache per call site | delegates |
//! | [`JInferrer`] | forward result and its backward function | - |
//! | [`MacroInferrer`] | never runs | macro expansion |
//! | [`DummyInferrer`] | always fails | - |

use super::engine::{InferenceEngine, Rewrite};
use super::reference::{ArgRef, Context, Reference};
use crate::error::{ErrorKind, InferResult, InferenceError};
use crate::ir::{GraphId, Macro, MetaGraph, Primitive};
use crate::lattice::ops::{reject_keywords, sensitivity_transform, MergeMode};
use crate::lattice::{AbstractValue, FunctionSet, FunctionVariant};
use crate::tfuncs::TransferRule;
use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

/// Results of one inferrer, keyed by normalized arguments.
#[derive(Debug, Default)]
pub struct InferrerCache {
    results: RefCell<HashMap<Vec<AbstractValue>, AbstractValue>>,
    calls: Cell<usize>,
}

impl InferrerCache {
    pub fn lookup(&self, args: &[AbstractValue]) -> Option<AbstractValue> {
        self.results.borrow().get(args).cloned()
    }

    pub fn store(&self, args: Vec<AbstractValue>, result: AbstractValue) {
        self.results.borrow_mut().insert(args, result);
    }

    /// Number of times the underlying computation actually ran.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    fn count_call(&self) {
        self.calls.set(self.calls.get() + 1);
    }

    pub fn len(&self) -> usize {
        self.results.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.borrow().is_empty()
    }
}

/// Computes the abstract result of calls to one callee.
pub trait Inferrer: fmt::Debug + 'static {
    fn name(&self) -> String;

    fn cache(&self) -> &InferrerCache;

    /// Validate and canonicalize resolved arguments before the cache lookup.
    fn normalize_args(&self, args: Vec<AbstractValue>) -> InferResult<Vec<AbstractValue>> {
        reject_keywords(&args)?;
        Ok(args)
    }

    /// A replacement call site for `outref`, if this callee rewrites calls.
    fn reroute(
        self: Rc<Self>,
        _engine: Rc<InferenceEngine>,
        _outref: Option<Reference>,
        _argrefs: Vec<ArgRef>,
    ) -> LocalBoxFuture<'static, InferResult<Option<Reference>>> {
        future::ready(Ok(None)).boxed_local()
    }

    /// Result for normalized arguments. Not memoized; see [`Inferrer::run`].
    fn infer(
        self: Rc<Self>,
        engine: Rc<InferenceEngine>,
        outref: Option<Reference>,
        args: Vec<AbstractValue>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>>;

    /// Resolve the arguments, normalize them and infer, memoized.
    fn run(
        self: Rc<Self>,
        engine: Rc<InferenceEngine>,
        outref: Option<Reference>,
        argrefs: Vec<ArgRef>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        async move {
            let args = engine.resolve_args(&argrefs).await?;
            let args = self.normalize_args(args)?;
            if let Some(hit) = self.cache().lookup(&args) {
                trace!(inferrer = %self.name(), "inferrer cache hit");
                return Ok(hit);
            }
            let result = self.clone().infer(engine, outref, args.clone()).await?;
            self.cache().store(args, result.clone());
            Ok(result)
        }
        .boxed_local()
    }

    /// Argument tuples this inferrer has produced a result for.
    fn cached_signatures(&self) -> Vec<Vec<AbstractValue>> {
        self.cache().results.borrow().keys().cloned().collect()
    }

    fn infer_count(&self) -> usize {
        self.cache().calls()
    }
}

/// Inferrer of a primitive: runs its transfer rule.
#[derive(Debug)]
pub struct StandardInferrer {
    prim: Primitive,
    rule: TransferRule,
    cache: InferrerCache,
}

impl StandardInferrer {
    pub fn new(prim: Primitive, rule: TransferRule) -> Self {
        Self {
            prim,
            rule,
            cache: InferrerCache::default(),
        }
    }
}

impl Inferrer for StandardInferrer {
    fn name(&self) -> String {
        self.prim.name().to_string()
    }

    fn cache(&self) -> &InferrerCache {
        &self.cache
    }

    fn infer(
        self: Rc<Self>,
        engine: Rc<InferenceEngine>,
        _outref: Option<Reference>,
        args: Vec<AbstractValue>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        self.cache.count_call();
        match self.rule {
            TransferRule::Sync(rule) => future::ready(rule(&engine, &args)).boxed_local(),
            TransferRule::Async(rule) => rule(engine, args),
        }
    }
}

/// Where a [`GraphInferrer`] gets its graph from.
#[derive(Debug)]
pub enum GraphSource {
    Graph(GraphId),
    MetaGraph(Rc<dyn MetaGraph>),
}

/// Inferrer of a graph or a graph family.
///
/// Each call enters a new context `context + (graph, args)`, binds the
/// parameters there and awaits the graph's return node. A recursive call with
/// the same signature lands on the same context and therefore on the same
/// pending return value.
#[derive(Debug)]
pub struct GraphInferrer {
    source: GraphSource,
    /// Closure context, filtered to the graph's parent.
    context: Context,
    /// Parameter names, for keyword binding. Empty for graph families.
    params: Vec<String>,
    graph_cache: RefCell<HashMap<Vec<AbstractValue>, GraphId>>,
    cache: InferrerCache,
}

impl GraphInferrer {
    pub fn for_graph(graph: GraphId, context: Context, params: Vec<String>) -> Self {
        Self {
            source: GraphSource::Graph(graph),
            context,
            params,
            graph_cache: RefCell::new(HashMap::new()),
            cache: InferrerCache::default(),
        }
    }

    pub fn for_metagraph(metagraph: Rc<dyn MetaGraph>) -> Self {
        Self {
            source: GraphSource::MetaGraph(metagraph),
            context: Context::empty(),
            params: Vec::new(),
            graph_cache: RefCell::new(HashMap::new()),
            cache: InferrerCache::default(),
        }
    }

    /// The graph to specialize for `args`, generating it for graph families.
    pub fn get_graph(&self, engine: &InferenceEngine, args: &[AbstractValue]) -> InferResult<GraphId> {
        match &self.source {
            GraphSource::Graph(g) => Ok(*g),
            GraphSource::MetaGraph(mg) => {
                let signature = mg.make_signature(args);
                if let Some(g) = self.graph_cache.borrow().get(&signature) {
                    return Ok(*g);
                }
                let graph =
                    engine.with_manager_mut(|manager| mg.generate_graph(&signature, manager))?;
                trace!(metagraph = mg.name(), graph = graph.0, "generated graph");
                self.graph_cache.borrow_mut().insert(signature, graph);
                Ok(graph)
            }
        }
    }

    fn bind_keywords(&self, args: Vec<AbstractValue>) -> InferResult<Vec<AbstractValue>> {
        let mut positional = Vec::new();
        let mut keywords: Vec<(String, AbstractValue)> = Vec::new();
        for arg in args {
            match arg {
                AbstractValue::KeywordArgument { name, value } => {
                    if keywords.iter().any(|(n, _)| *n == name) {
                        return Err(InferenceError::argument(format!(
                            "keyword argument '{}' given twice",
                            name
                        )));
                    }
                    keywords.push((name, *value));
                }
                other => positional.push(other),
            }
        }
        if keywords.is_empty() {
            return Ok(positional);
        }
        if positional.len() > self.params.len() {
            return Err(InferenceError::arity(self.params.len(), positional.len()));
        }
        let mut bound: Vec<Option<AbstractValue>> = positional.into_iter().map(Some).collect();
        bound.resize(self.params.len(), None);
        for (name, value) in keywords {
            let Some(index) = self.params.iter().position(|p| *p == name) else {
                return Err(InferenceError::argument(format!(
                    "unknown keyword argument '{}'",
                    name
                )));
            };
            if bound[index].is_some() {
                return Err(InferenceError::argument(format!(
                    "argument '{}' given both by position and by keyword",
                    name
                )));
            }
            bound[index] = Some(value);
        }
        bound
            .into_iter()
            .zip(&self.params)
            .map(|(value, name)| {
                value.ok_or_else(|| {
                    InferenceError::argument(format!("missing argument '{}'", name))
                })
            })
            .collect()
    }
}

impl Inferrer for GraphInferrer {
    fn name(&self) -> String {
        match &self.source {
            GraphSource::Graph(g) => format!("graph#{}", g.0),
            GraphSource::MetaGraph(mg) => mg.name().to_string(),
        }
    }

    fn cache(&self) -> &InferrerCache {
        &self.cache
    }

    /// Binds keyword arguments by parameter name and broadens every argument,
    /// so that literal constants do not over-specialize the graph.
    fn normalize_args(&self, args: Vec<AbstractValue>) -> InferResult<Vec<AbstractValue>> {
        match &self.source {
            GraphSource::Graph(_) => Ok(self
                .bind_keywords(args)?
                .iter()
                .map(AbstractValue::broaden)
                .collect()),
            GraphSource::MetaGraph(mg) => mg.normalize_args(args),
        }
    }

    fn infer(
        self: Rc<Self>,
        engine: Rc<InferenceEngine>,
        outref: Option<Reference>,
        args: Vec<AbstractValue>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        async move {
            self.cache.count_call();
            let graph = self.get_graph(&engine, &args)?;
            let (params, output) = {
                let manager = engine.manager();
                let g = manager.graph(graph).ok_or_else(|| {
                    InferenceError::internal(format!("unknown graph#{}", graph.0))
                })?;
                (g.parameters.clone(), g.return_)
            };
            if params.len() != args.len() {
                return Err(InferenceError::arity(params.len(), args.len()));
            }
            let output = output.ok_or_else(|| {
                InferenceError::internal(format!("{} has no output", engine.graph_name(graph)))
            })?;

            let context = self.context.add(graph, args.clone());
            engine.note_specialization(&context, graph)?;
            if let Some(call_site) = &outref {
                engine.record_trace(&context, call_site);
            }
            for (param, arg) in params.iter().zip(&args) {
                engine.set_value(Reference::new(*param, context.clone()), arg.clone());
            }
            let out = engine.reference(output, &context);
            engine
                .get_inferred(&out)
                .await
                .map_err(|err| err.with_call(graph, args))
        }
        .boxed_local()
    }
}

/// Inferrer of a partial application: bound arguments go first.
#[derive(Debug)]
pub struct PartialInferrer {
    inner: Rc<dyn Inferrer>,
    args: Vec<AbstractValue>,
    cache: InferrerCache,
}

impl PartialInferrer {
    pub fn new(inner: Rc<dyn Inferrer>, args: Vec<AbstractValue>) -> Self {
        Self {
            inner,
            args,
            cache: InferrerCache::default(),
        }
    }
}

fn is_partial_prim(value: &AbstractValue) -> bool {
    value.as_functions().is_some_and(|fns| {
        fns.len() == 1
            && fns.iter().all(|f| {
                matches!(
                    f,
                    FunctionVariant::Primitive {
                        prim: Primitive::Partial,
                        ..
                    }
                )
            })
    })
}

impl Inferrer for PartialInferrer {
    fn name(&self) -> String {
        format!("partial({})", self.inner.name())
    }

    fn cache(&self) -> &InferrerCache {
        &self.cache
    }

    fn normalize_args(&self, args: Vec<AbstractValue>) -> InferResult<Vec<AbstractValue>> {
        Ok(args)
    }

    /// Flattens `partial(partial(f, a), b)(c)` into `f(a, b, c)` when every
    /// step of the chain is a `partial` application in the caller's graph.
    fn reroute(
        self: Rc<Self>,
        engine: Rc<InferenceEngine>,
        outref: Option<Reference>,
        _argrefs: Vec<ArgRef>,
    ) -> LocalBoxFuture<'static, InferResult<Option<Reference>>> {
        async move {
            let Some(outref) = outref else {
                return Ok(None);
            };
            let Some((graph, inputs)) = engine.apply_inputs(outref.node) else {
                return Ok(None);
            };
            let Some((&first, rest)) = inputs.split_first() else {
                return Ok(None);
            };
            let mut callee = first;
            let mut args = rest.to_vec();
            let mut collapsed = 0usize;
            loop {
                // A callee may itself have been rerouted, e.g. by a macro.
                callee = engine
                    .get_actual_ref(&engine.reference(callee, &outref.context))?
                    .node;
                let Some((callee_graph, inner)) = engine.apply_inputs(callee) else {
                    break;
                };
                if callee_graph != graph || inner.len() < 2 {
                    break;
                }
                let head = engine.reference(inner[0], &outref.context);
                if !is_partial_prim(&engine.get_inferred(&head).await?) {
                    break;
                }
                let mut flattened = inner[2..].to_vec();
                flattened.extend(args);
                args = flattened;
                callee = inner[1];
                collapsed += 1;
            }
            if collapsed == 0 {
                return Ok(None);
            }
            let mut call = vec![callee];
            call.extend(args);
            let node = engine.rewrite_call(outref.node, Rewrite::FlattenPartial, |manager| {
                manager.apply(graph, call)
            });
            trace!(collapsed, "flattened partial application");
            Ok(Some(engine.reference(node, &outref.context)))
        }
        .boxed_local()
    }

    fn infer(
        self: Rc<Self>,
        engine: Rc<InferenceEngine>,
        outref: Option<Reference>,
        args: Vec<AbstractValue>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        self.cache.count_call();
        let argrefs = self
            .args
            .iter()
            .chain(&args)
            .cloned()
            .map(ArgRef::Virtual)
            .collect();
        self.inner.clone().run(engine, outref, argrefs)
    }
}

/// Inferrer of a callee with one declared signature.
#[derive(Debug)]
pub struct VirtualInferrer {
    args: Vec<AbstractValue>,
    output: AbstractValue,
    cache: InferrerCache,
}

impl VirtualInferrer {
    pub fn new(args: Vec<AbstractValue>, output: AbstractValue) -> Self {
        Self {
            args,
            output,
            cache: InferrerCache::default(),
        }
    }
}

impl Inferrer for VirtualInferrer {
    fn name(&self) -> String {
        "virtual".to_string()
    }

    fn cache(&self) -> &InferrerCache {
        &self.cache
    }

    fn infer(
        self: Rc<Self>,
        engine: Rc<InferenceEngine>,
        _outref: Option<Reference>,
        args: Vec<AbstractValue>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        self.cache.count_call();
        let checked = if args.len() != self.args.len() {
            Err(InferenceError::arity(self.args.len(), args.len()))
        } else {
            self.args
                .iter()
                .zip(&args)
                .try_for_each(|(expected, got)| {
                    engine
                        .abstract_merge(&[expected.clone(), got.clone()], MergeMode::Exact)
                        .map(|_| ())
                })
                .map(|()| self.output.clone())
        };
        future::ready(checked).boxed_local()
    }
}

/// Delegates to a generic inferrer but caches per call site.
#[derive(Debug)]
pub struct TrackedInferrer {
    inner: Rc<dyn Inferrer>,
    cache: InferrerCache,
}

impl TrackedInferrer {
    pub fn new(inner: Rc<dyn Inferrer>) -> Self {
        Self {
            inner,
            cache: InferrerCache::default(),
        }
    }
}

impl Inferrer for TrackedInferrer {
    fn name(&self) -> String {
        format!("tracked({})", self.inner.name())
    }

    fn cache(&self) -> &InferrerCache {
        &self.cache
    }

    fn reroute(
        self: Rc<Self>,
        engine: Rc<InferenceEngine>,
        outref: Option<Reference>,
        argrefs: Vec<ArgRef>,
    ) -> LocalBoxFuture<'static, InferResult<Option<Reference>>> {
        self.inner.clone().reroute(engine, outref, argrefs)
    }

    fn infer(
        self: Rc<Self>,
        engine: Rc<InferenceEngine>,
        outref: Option<Reference>,
        args: Vec<AbstractValue>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        let argrefs = args.into_iter().map(ArgRef::Virtual).collect();
        self.inner.clone().run(engine, outref, argrefs)
    }

    fn run(
        self: Rc<Self>,
        engine: Rc<InferenceEngine>,
        outref: Option<Reference>,
        argrefs: Vec<ArgRef>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        async move {
            let args = engine.resolve_args(&argrefs).await?;
            if let Some(hit) = self.cache.lookup(&args) {
                return Ok(hit);
            }
            self.cache.count_call();
            let virtual_args = args.iter().cloned().map(ArgRef::Virtual).collect();
            let result = self.inner.clone().run(engine, outref, virtual_args).await?;
            self.cache.store(args, result.clone());
            Ok(result)
        }
        .boxed_local()
    }
}

/// Tag a value with the J transform.
pub fn jtag(value: AbstractValue) -> AbstractValue {
    match value {
        AbstractValue::Function(fns) => AbstractValue::Function(
            fns.map(|f| FunctionVariant::JTransformed(Box::new(f.clone()))),
        ),
        other => AbstractValue::JTagged(Box::new(other)),
    }
}

/// Inferrer of `J(f)`: the forward result plus the backward function type.
#[derive(Debug)]
pub struct JInferrer {
    inner: Rc<dyn Inferrer>,
    function: FunctionVariant,
    cache: InferrerCache,
}

impl JInferrer {
    pub fn new(inner: Rc<dyn Inferrer>, function: FunctionVariant) -> Self {
        Self {
            inner,
            function,
            cache: InferrerCache::default(),
        }
    }
}

impl Inferrer for JInferrer {
    fn name(&self) -> String {
        format!("J({})", self.inner.name())
    }

    fn cache(&self) -> &InferrerCache {
        &self.cache
    }

    fn infer(
        self: Rc<Self>,
        engine: Rc<InferenceEngine>,
        _outref: Option<Reference>,
        args: Vec<AbstractValue>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        async move {
            self.cache.count_call();
            let untagged = args
                .iter()
                .map(|arg| match arg {
                    AbstractValue::JTagged(inner) => Ok(ArgRef::Virtual((**inner).clone())),
                    other => Err(InferenceError::mismatch_text(
                        "J-tagged value",
                        other.to_string(),
                        "arguments of a J-transformed function must be J-tagged",
                    )),
                })
                .collect::<InferResult<Vec<_>>>()?;
            let result = self.inner.clone().run(engine, None, untagged).await?;

            let mut backward_out = vec![sensitivity_transform(&AbstractValue::Function(
                FunctionSet::single(self.function.clone()),
            ))];
            backward_out.extend(args.iter().map(sensitivity_transform));
            let backward = FunctionVariant::Virtual {
                args: vec![sensitivity_transform(&result)],
                output: Box::new(AbstractValue::Tuple(backward_out)),
            };
            Ok(AbstractValue::Tuple(vec![
                jtag(result),
                AbstractValue::function(backward),
            ]))
        }
        .boxed_local()
    }
}

/// Inferrer of a macro: every call is rewritten by expansion.
#[derive(Debug)]
pub struct MacroInferrer {
    macro_: Rc<dyn Macro>,
    cache: InferrerCache,
}

impl MacroInferrer {
    pub fn new(macro_: Rc<dyn Macro>) -> Self {
        Self {
            macro_,
            cache: InferrerCache::default(),
        }
    }
}

impl Inferrer for MacroInferrer {
    fn name(&self) -> String {
        format!("macro {}", self.macro_.name())
    }

    fn cache(&self) -> &InferrerCache {
        &self.cache
    }

    fn reroute(
        self: Rc<Self>,
        engine: Rc<InferenceEngine>,
        outref: Option<Reference>,
        argrefs: Vec<ArgRef>,
    ) -> LocalBoxFuture<'static, InferResult<Option<Reference>>> {
        match outref {
            Some(outref) => self
                .macro_
                .expand(engine, outref, argrefs)
                .map(|expanded| expanded.map(Some))
                .boxed_local(),
            None => future::ready(Err(InferenceError::internal(format!(
                "macro {} called without a call site",
                self.macro_.name()
            ))))
            .boxed_local(),
        }
    }

    fn infer(
        self: Rc<Self>,
        _engine: Rc<InferenceEngine>,
        _outref: Option<Reference>,
        _args: Vec<AbstractValue>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        future::ready(Err(InferenceError::internal(format!(
            "macro {} must be expanded, not inferred",
            self.macro_.name()
        ))))
        .boxed_local()
    }
}

/// Placeholder callee.
#[derive(Debug, Default)]
pub struct DummyInferrer {
    cache: InferrerCache,
}

impl Inferrer for DummyInferrer {
    fn name(&self) -> String {
        "dummy".to_string()
    }

    fn cache(&self) -> &InferrerCache {
        &self.cache
    }

    fn run(
        self: Rc<Self>,
        _engine: Rc<InferenceEngine>,
        _outref: Option<Reference>,
        _argrefs: Vec<ArgRef>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        future::ready(Err(InferenceError::new(ErrorKind::DummyCall))).boxed_local()
    }

    fn infer(
        self: Rc<Self>,
        _engine: Rc<InferenceEngine>,
        _outref: Option<Reference>,
        _args: Vec<AbstractValue>,
    ) -> LocalBoxFuture<'static, InferResult<AbstractValue>> {
        future::ready(Err(InferenceError::new(ErrorKind::DummyCall))).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{DType, ScalarValue};

    fn kw(name: &str, v: AbstractValue) -> AbstractValue {
        AbstractValue::keyword(name, v)
    }

    fn inferrer(params: &[&str]) -> GraphInferrer {
        GraphInferrer::for_graph(
            GraphId(0),
            Context::empty(),
            params.iter().map(|p| p.to_string()).collect(),
        )
    }

    #[test]
    fn test_graph_normalize_broadens() {
        let inf = inferrer(&["x"]);
        let args = inf
            .normalize_args(vec![AbstractValue::constant(ScalarValue::Int(3), DType::INT64)])
            .unwrap();
        assert_eq!(args, vec![AbstractValue::int64()]);
    }

    #[test]
    fn test_graph_normalize_binds_keywords() {
        let inf = inferrer(&["x", "y"]);
        let args = inf
            .normalize_args(vec![AbstractValue::bool(), kw("y", AbstractValue::float64())])
            .unwrap();
        assert_eq!(args, vec![AbstractValue::bool(), AbstractValue::float64()]);

        let swapped = inf
            .normalize_args(vec![
                kw("y", AbstractValue::float64()),
                kw("x", AbstractValue::int64()),
            ])
            .unwrap();
        assert_eq!(swapped, vec![AbstractValue::int64(), AbstractValue::float64()]);
    }

    #[test]
    fn test_graph_normalize_keyword_errors() {
        let inf = inferrer(&["x", "y"]);
        let unknown = inf
            .normalize_args(vec![kw("z", AbstractValue::bool())])
            .unwrap_err();
        assert!(matches!(unknown.kind, ErrorKind::Argument(_)));

        let duplicate = inf
            .normalize_args(vec![AbstractValue::bool(), kw("x", AbstractValue::bool())])
            .unwrap_err();
        assert!(matches!(duplicate.kind, ErrorKind::Argument(_)));

        let missing = inf
            .normalize_args(vec![kw("y", AbstractValue::bool())])
            .unwrap_err();
        assert!(matches!(missing.kind, ErrorKind::Argument(ref m) if m.contains("'x'")));
    }

    #[test]
    fn test_default_normalize_rejects_keywords() {
        let inf = VirtualInferrer::new(vec![], AbstractValue::bool());
        let err = inf
            .normalize_args(vec![kw("a", AbstractValue::bool())])
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Argument(_)));
    }

    #[test]
    fn test_jtag() {
        let f = AbstractValue::function(FunctionVariant::primitive(Primitive::ScalarAdd));
        assert_eq!(
            jtag(f),
            AbstractValue::function(FunctionVariant::JTransformed(Box::new(
                FunctionVariant::primitive(Primitive::ScalarAdd)
            )))
        );
        assert_eq!(
            jtag(AbstractValue::int64()),
            AbstractValue::JTagged(Box::new(AbstractValue::int64()))
        );
    }

    #[test]
    fn test_inferrer_cache() {
        let cache = InferrerCache::default();
        assert!(cache.is_empty());
        cache.store(vec![AbstractValue::int64()], AbstractValue::bool());
        assert_eq!(
            cache.lookup(&[AbstractValue::int64()]),
            Some(AbstractValue::bool())
        );
        assert_eq!(cache.lookup(&[AbstractValue::float64()]), None);
        assert_eq!(cache.len(), 1);
    }
}
