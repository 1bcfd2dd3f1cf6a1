//! Contexts, references and the evaluation cache.
//!
//! A [`Context`] is an immutable chain of `(graph, argument key)` frames: the
//! closure environment of a specialization and its memoization key at once.
//! A [`Reference`] is a node evaluated under a context filtered to the node's
//! own graph, so that free-variable uses in nested closures share one entry.
//!
//! ```text
//! Context:  [fact(Int64)] <- [fb()]
//!   filter(fact) -> [fact(Int64)]
//!   filter(None) -> []
//! ```

use super::scheduler::{InferenceLoop, Pending, PendingId};
use crate::error::InferResult;
use crate::ir::{GraphId, NodeId};
use crate::lattice::AbstractValue;
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

struct Frame {
    parent: Context,
    graph: GraphId,
    argkey: Vec<AbstractValue>,
    hash: u64,
    depth: usize,
}

/// Chain of specializations, innermost last.
#[derive(Clone, Default)]
pub struct Context(Option<Rc<Frame>>);

impl Context {
    pub fn empty() -> Self {
        Context(None)
    }

    /// Extend with a frame for `graph` called with `argkey`.
    pub fn add(&self, graph: GraphId, argkey: Vec<AbstractValue>) -> Self {
        let mut hasher = DefaultHasher::new();
        self.hash_value().hash(&mut hasher);
        graph.hash(&mut hasher);
        argkey.hash(&mut hasher);
        Context(Some(Rc::new(Frame {
            parent: self.clone(),
            graph,
            argkey,
            hash: hasher.finish(),
            depth: self.depth() + 1,
        })))
    }

    /// The nearest enclosing frame for `graph`, or the empty context.
    pub fn filter(&self, graph: Option<GraphId>) -> Self {
        let mut current = self.clone();
        while let Some(frame) = &current.0 {
            if Some(frame.graph) == graph {
                break;
            }
            current = frame.parent.clone();
        }
        current
    }

    pub fn graph(&self) -> Option<GraphId> {
        self.0.as_ref().map(|f| f.graph)
    }

    pub fn argkey(&self) -> &[AbstractValue] {
        self.0.as_ref().map_or(&[], |f| f.argkey.as_slice())
    }

    pub fn parent(&self) -> Context {
        self.0
            .as_ref()
            .map_or_else(Context::empty, |f| f.parent.clone())
    }

    pub fn depth(&self) -> usize {
        self.0.as_ref().map_or(0, |f| f.depth)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    fn hash_value(&self) -> u64 {
        self.0.as_ref().map_or(0, |f| f.hash)
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                Rc::ptr_eq(a, b)
                    || (a.hash == b.hash
                        && a.graph == b.graph
                        && a.argkey == b.argkey
                        && a.parent == b.parent)
            }
            _ => false,
        }
    }
}

impl Eq for Context {}

impl Hash for Context {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_value());
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut frames = Vec::new();
        let mut current = self.clone();
        while let Some(frame) = current.0.clone() {
            let args: Vec<String> = frame.argkey.iter().map(|a| a.to_string()).collect();
            frames.push(format!("graph#{}({})", frame.graph.0, args.join(", ")));
            current = frame.parent.clone();
        }
        frames.reverse();
        write!(f, "Context[{}]", frames.join(" <- "))
    }
}

/// A node evaluated under a (filtered) context; the unit of memoization.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Reference {
    pub node: NodeId,
    pub context: Context,
}

impl Reference {
    pub fn new(node: NodeId, context: Context) -> Self {
        Self { node, context }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}@{}", self.node.0, self.context.depth())
    }
}

/// Argument of a call: a reference to evaluate, or a value already known.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgRef {
    Node(Reference),
    Virtual(AbstractValue),
}

impl ArgRef {
    pub fn as_node(&self) -> Option<&Reference> {
        match self {
            ArgRef::Node(r) => Some(r),
            ArgRef::Virtual(_) => None,
        }
    }
}

/// Memoized values of references.
///
/// Each reference maps to one pending value; the first request spawns its
/// computation and later requests await the same value.
#[derive(Debug, Default)]
pub struct EvaluationCache {
    entries: RefCell<HashMap<Reference, PendingId>>,
}

impl EvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value of `reference`, computing it with `compute` on first use.
    ///
    /// An error from `compute` is delivered to every awaiter.
    pub fn get<F>(&self, lp: &Rc<InferenceLoop>, reference: Reference, compute: F) -> Pending
    where
        F: FnOnce(Reference) -> LocalBoxFuture<'static, InferResult<AbstractValue>>,
    {
        if let Some(id) = self.entries.borrow().get(&reference).copied() {
            return lp.pending(id);
        }
        let id = lp.create_pending(None, None);
        self.entries.borrow_mut().insert(reference.clone(), id);
        let computation = compute(reference);
        let target = lp.clone();
        lp.spawn(async move {
            match computation.await {
                Ok(value) => target.resolve(id, value),
                Err(err) => target.fail(id, err),
            };
        });
        lp.pending(id)
    }

    /// Force `value` for `reference`. Used to bind a callee's parameters.
    ///
    /// A value already present is kept.
    pub fn set_value(&self, lp: &InferenceLoop, reference: Reference, value: AbstractValue) {
        let existing = self.entries.borrow().get(&reference).copied();
        match existing {
            Some(id) => {
                lp.resolve(id, value);
            }
            None => {
                let id = lp.create_resolved(value);
                self.entries.borrow_mut().insert(reference, id);
            }
        }
    }

    /// The settled value, if any, without scheduling anything.
    pub fn peek(&self, lp: &InferenceLoop, reference: &Reference) -> Option<InferResult<AbstractValue>> {
        let id = self.entries.borrow().get(reference).copied()?;
        lp.peek(id)
    }

    pub fn contains(&self, reference: &Reference) -> bool {
        self.entries.borrow().contains_key(reference)
    }

    /// Forget entries that never settled, so a later run recomputes them.
    pub fn drop_unsettled(&self, lp: &InferenceLoop) {
        self.entries.borrow_mut().retain(|_, id| !lp.is_waiting(*id));
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::lattice::{DType, ScalarValue};
    use std::cell::Cell;

    #[test]
    fn test_context_equality_is_structural() {
        let a = Context::empty().add(GraphId(1), vec![AbstractValue::int64()]);
        let b = Context::empty().add(GraphId(1), vec![AbstractValue::int64()]);
        let c = Context::empty().add(GraphId(1), vec![AbstractValue::float64()]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Context::empty());

        let mut map = HashMap::new();
        map.insert(a.clone(), 1);
        assert_eq!(map.get(&b), Some(&1));
    }

    #[test]
    fn test_context_filter() {
        let outer = Context::empty().add(GraphId(0), vec![AbstractValue::int64()]);
        let inner = outer.add(GraphId(5), vec![]);
        assert_eq!(inner.depth(), 2);
        assert_eq!(inner.filter(Some(GraphId(0))), outer);
        assert_eq!(inner.filter(Some(GraphId(5))), inner);
        assert_eq!(inner.filter(None), Context::empty());
        assert_eq!(inner.filter(Some(GraphId(9))), Context::empty());
        assert_eq!(inner.parent(), outer);
        assert_eq!(inner.graph(), Some(GraphId(5)));
    }

    #[test]
    fn test_cache_computes_once() {
        let lp = Rc::new(InferenceLoop::new());
        let cache = EvaluationCache::new();
        let calls = Rc::new(Cell::new(0));
        let r = Reference::new(NodeId(3), Context::empty());

        let mut pendings = Vec::new();
        for _ in 0..3 {
            let calls = calls.clone();
            pendings.push(cache.get(&lp, r.clone(), move |_| {
                calls.set(calls.get() + 1);
                Box::pin(async { Ok(AbstractValue::constant(ScalarValue::Int(1), DType::INT64)) })
            }));
        }
        let results = Rc::new(RefCell::new(Vec::new()));
        for p in pendings {
            let results = results.clone();
            lp.schedule(async move {
                results.borrow_mut().push(p.await?);
                Ok(())
            });
        }
        lp.run_forever();

        assert_eq!(calls.get(), 1);
        assert_eq!(results.borrow().len(), 3);
        assert!(cache.peek(&lp, &r).unwrap().is_ok());
    }

    #[test]
    fn test_cache_errors_reach_awaiters() {
        let lp = Rc::new(InferenceLoop::new());
        let cache = EvaluationCache::new();
        let r = Reference::new(NodeId(0), Context::empty());
        let p = cache.get(&lp, r.clone(), |_| {
            Box::pin(async { Err(InferenceError::argument("broken")) })
        });
        lp.schedule(async move {
            p.await?;
            Ok(())
        });
        lp.run_forever();
        assert_eq!(lp.take_errors().len(), 1);
        assert!(cache.peek(&lp, &r).unwrap().is_err());
    }

    #[test]
    fn test_set_value() {
        let lp = InferenceLoop::new();
        let cache = EvaluationCache::new();
        let r = Reference::new(NodeId(2), Context::empty().add(GraphId(0), vec![]));
        cache.set_value(&lp, r.clone(), AbstractValue::bool());
        cache.set_value(&lp, r.clone(), AbstractValue::int64());
        assert_eq!(cache.peek(&lp, &r).unwrap().unwrap(), AbstractValue::bool());
        assert_eq!(cache.len(), 1);
    }
}
