//! Cooperative inference loop.
//!
//! All inference work runs as tasks on one `LocalPool`. Tasks suspend only
//! when they await a [`Pending`] value. When no task can make progress the
//! loop forces the forceable pending value with the highest priority (ties
//! go to the most recent one), which is how recursive call sites reach a
//! fixpoint.
//!
//! The loop also owns the pending dtypes of numeric literals. They are kept
//! in a union-find table: binding two of them intersects their candidate
//! lists, binding one to a known dtype resolves its whole class.

use crate::diagnostics::{emit_error_collected, emit_literal_defaulted, emit_pending_forced};
use crate::error::{InferResult, InferenceError};
use crate::lattice::convert::LiteralTypes;
use crate::lattice::ops::{coerce_value, merge_known_dtypes, DTypeBinder};
use crate::lattice::{
    AbstractValue, DType, DTypeTrack, ScalarValue, Track, TypeVarId, NUMBER_TYPES,
};
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Poll, Waker};
use tracing::{instrument, trace};

/// Handle of a pending value owned by the loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PendingId(usize);

/// Computes a forced value from whatever constraints are known so far.
pub type Resolver = Rc<dyn Fn() -> InferResult<AbstractValue>>;
/// Priority of a forceable pending value, evaluated when the loop stalls.
pub type Priority = Rc<dyn Fn() -> i32>;

pub fn resolver(f: impl Fn() -> InferResult<AbstractValue> + 'static) -> Resolver {
    Rc::new(f)
}

pub fn priority(f: impl Fn() -> i32 + 'static) -> Priority {
    Rc::new(f)
}

enum SlotState {
    Waiting,
    Done(AbstractValue),
    Failed(InferenceError),
}

struct PendingSlot {
    state: SlotState,
    wakers: Vec<Waker>,
    resolver: Option<Resolver>,
    priority: Option<Priority>,
}

struct TypeVar {
    parent: usize,
    candidates: Vec<DType>,
    default: DType,
    priority: i32,
    resolved: Option<DType>,
}

#[derive(Default)]
struct TypeVarTable {
    vars: Vec<TypeVar>,
}

impl TypeVarTable {
    fn fresh(&mut self, candidates: &[DType], default: DType, priority: i32) -> TypeVarId {
        let id = self.vars.len();
        self.vars.push(TypeVar {
            parent: id,
            candidates: candidates.to_vec(),
            default,
            priority,
            resolved: None,
        });
        TypeVarId(id)
    }

    fn root(&mut self, id: TypeVarId) -> InferResult<usize> {
        if id.0 >= self.vars.len() {
            return Err(InferenceError::internal(format!(
                "unknown pending dtype 'T{}",
                id.0
            )));
        }
        let mut root = id.0;
        while self.vars[root].parent != root {
            root = self.vars[root].parent;
        }
        let mut cur = id.0;
        while self.vars[cur].parent != root {
            let next = self.vars[cur].parent;
            self.vars[cur].parent = root;
            cur = next;
        }
        Ok(root)
    }

    fn resolved(&mut self, id: TypeVarId) -> Option<DType> {
        let root = self.root(id).ok()?;
        self.vars[root].resolved
    }

    fn constrain(&mut self, id: TypeVarId, dtype: DType) -> InferResult<DType> {
        let root = self.root(id)?;
        let var = &mut self.vars[root];
        match var.resolved {
            Some(current) if current == dtype => Ok(dtype),
            Some(current) => Err(InferenceError::mismatch_text(
                current.to_string(),
                dtype.to_string(),
                "literal already resolved to a different type",
            )),
            None if var.candidates.contains(&dtype) => {
                var.resolved = Some(dtype);
                Ok(dtype)
            }
            None => Err(InferenceError::mismatch_text(
                format!("'T{}", root),
                dtype.to_string(),
                "not a legal type for this literal",
            )),
        }
    }

    fn union(&mut self, a: TypeVarId, b: TypeVarId) -> InferResult<DTypeTrack> {
        let ra = self.root(a)?;
        let rb = self.root(b)?;
        if ra == rb {
            return Ok(match self.vars[ra].resolved {
                Some(d) => DTypeTrack::Known(d),
                None => DTypeTrack::Pending(TypeVarId(ra)),
            });
        }
        match (self.vars[ra].resolved, self.vars[rb].resolved) {
            (Some(x), Some(y)) if x == y => return Ok(DTypeTrack::Known(x)),
            (Some(x), Some(y)) => {
                return Err(InferenceError::mismatch_text(
                    x.to_string(),
                    y.to_string(),
                    "incompatible literal types",
                ))
            }
            (Some(x), None) => return self.constrain(TypeVarId(rb), x).map(DTypeTrack::Known),
            (None, Some(y)) => return self.constrain(TypeVarId(ra), y).map(DTypeTrack::Known),
            (None, None) => {}
        }
        let candidates: Vec<DType> = self.vars[ra]
            .candidates
            .iter()
            .copied()
            .filter(|d| self.vars[rb].candidates.contains(d))
            .collect();
        let Some(first) = candidates.first().copied() else {
            return Err(InferenceError::mismatch_text(
                format!("'T{}", ra),
                format!("'T{}", rb),
                "literals have no common type",
            ));
        };
        let (high, low) = if self.vars[rb].priority > self.vars[ra].priority {
            (rb, ra)
        } else {
            (ra, rb)
        };
        let default = [self.vars[high].default, self.vars[low].default]
            .into_iter()
            .find(|d| candidates.contains(d))
            .unwrap_or(first);
        let priority = self.vars[high].priority;
        self.vars[rb].parent = ra;
        let var = &mut self.vars[ra];
        var.candidates = candidates;
        var.default = default;
        var.priority = priority;
        Ok(DTypeTrack::Pending(TypeVarId(ra)))
    }

    /// Resolve to the class default; `true` if the default was applied here.
    fn force(&mut self, id: TypeVarId) -> InferResult<(DType, bool)> {
        let root = self.root(id)?;
        let var = &mut self.vars[root];
        if let Some(d) = var.resolved {
            return Ok((d, false));
        }
        if !var.candidates.contains(&var.default) {
            return Err(InferenceError::unresolved(format!(
                "literal type 'T{}: default {} is not a legal candidate",
                root, var.default
            )));
        }
        var.resolved = Some(var.default);
        Ok((var.default, true))
    }
}

/// The single-threaded scheduler every inference task runs on.
pub struct InferenceLoop {
    pool: RefCell<LocalPool>,
    spawner: RefCell<LocalSpawner>,
    slots: RefCell<Vec<PendingSlot>>,
    vars: RefCell<TypeVarTable>,
    errors: RefCell<Vec<InferenceError>>,
}

impl fmt::Debug for InferenceLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceLoop")
            .field("pendings", &self.slots.borrow().len())
            .field("type_vars", &self.vars.borrow().vars.len())
            .field("errors", &self.errors.borrow().len())
            .finish()
    }
}

impl Default for InferenceLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceLoop {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool: RefCell::new(pool),
            spawner: RefCell::new(spawner),
            slots: RefCell::new(Vec::new()),
            vars: RefCell::new(TypeVarTable::default()),
            errors: RefCell::new(Vec::new()),
        }
    }

    /// Spawn a task; an error it returns is collected instead of propagated.
    pub fn schedule<F>(self: &Rc<Self>, task: F)
    where
        F: Future<Output = InferResult<()>> + 'static,
    {
        let lp = Rc::downgrade(self);
        self.spawn(async move {
            if let Err(err) = task.await {
                if let Some(lp) = lp.upgrade() {
                    lp.push_error(err);
                }
            }
        });
    }

    /// Spawn a task that handles its own errors.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + 'static,
    {
        let spawned = self.spawner.borrow().spawn_local(task);
        if let Err(err) = spawned {
            self.push_error(InferenceError::internal(format!(
                "could not spawn inference task: {}",
                err
            )));
        }
    }

    pub fn push_error(&self, err: InferenceError) {
        emit_error_collected(&err.to_string());
        self.errors.borrow_mut().push(err);
    }

    /// Collected errors, in the order they were raised.
    pub fn take_errors(&self) -> Vec<InferenceError> {
        std::mem::take(&mut *self.errors.borrow_mut())
    }

    /// Create a pending value. Without a resolver it is never forced and only
    /// settles through [`resolve`](Self::resolve) or [`fail`](Self::fail).
    pub fn create_pending(&self, resolver: Option<Resolver>, priority: Option<Priority>) -> PendingId {
        let mut slots = self.slots.borrow_mut();
        slots.push(PendingSlot {
            state: SlotState::Waiting,
            wakers: Vec::new(),
            resolver,
            priority,
        });
        PendingId(slots.len() - 1)
    }

    pub fn create_resolved(&self, value: AbstractValue) -> PendingId {
        let mut slots = self.slots.borrow_mut();
        slots.push(PendingSlot {
            state: SlotState::Done(value),
            wakers: Vec::new(),
            resolver: None,
            priority: None,
        });
        PendingId(slots.len() - 1)
    }

    /// A future for the pending value.
    pub fn pending(self: &Rc<Self>, id: PendingId) -> Pending {
        Pending {
            id,
            lp: self.clone(),
        }
    }

    /// Current state: `None` while waiting.
    pub fn peek(&self, id: PendingId) -> Option<InferResult<AbstractValue>> {
        match self.slots.borrow().get(id.0).map(|s| &s.state) {
            Some(SlotState::Done(v)) => Some(Ok(v.clone())),
            Some(SlotState::Failed(e)) => Some(Err(e.clone())),
            Some(SlotState::Waiting) => None,
            None => Some(Err(InferenceError::internal("unknown pending value"))),
        }
    }

    pub fn is_waiting(&self, id: PendingId) -> bool {
        matches!(
            self.slots.borrow().get(id.0).map(|s| &s.state),
            Some(SlotState::Waiting)
        )
    }

    /// Settle with a value. Returns `false` if it was already settled.
    pub fn resolve(&self, id: PendingId, value: AbstractValue) -> bool {
        self.settle(id, SlotState::Done(value))
    }

    /// Settle with an error. Returns `false` if it was already settled.
    pub fn fail(&self, id: PendingId, err: InferenceError) -> bool {
        self.settle(id, SlotState::Failed(err))
    }

    fn settle(&self, id: PendingId, state: SlotState) -> bool {
        let wakers = {
            let mut slots = self.slots.borrow_mut();
            let Some(slot) = slots.get_mut(id.0) else {
                return false;
            };
            if !matches!(slot.state, SlotState::Waiting) {
                return false;
            }
            slot.state = state;
            slot.resolver = None;
            slot.priority = None;
            std::mem::take(&mut slot.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// Drive every task until nothing runs and nothing can be forced.
    #[instrument(skip(self), name = "inference_loop")]
    pub fn run_forever(&self) {
        let mut forced = 0usize;
        loop {
            self.pool.borrow_mut().run_until_stalled();
            if !self.force_next() {
                break;
            }
            forced += 1;
        }
        trace!(forced, "inference loop drained");
    }

    /// Force the best forceable pending value. `false` if there is none.
    fn force_next(&self) -> bool {
        let candidates: Vec<(usize, Resolver, Option<Priority>)> = self
            .slots
            .borrow()
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match (&slot.state, &slot.resolver) {
                (SlotState::Waiting, Some(resolver)) => {
                    Some((i, resolver.clone(), slot.priority.clone()))
                }
                _ => None,
            })
            .collect();
        let best = candidates
            .into_iter()
            .map(|(i, resolver, priority)| (priority.map_or(0, |p| p()), i, resolver))
            .max_by_key(|(priority, i, _)| (*priority, *i));
        match best {
            None => false,
            Some((priority, i, resolver)) => {
                emit_pending_forced(priority);
                match resolver() {
                    Ok(value) => self.resolve(PendingId(i), value),
                    Err(err) => self.fail(PendingId(i), err),
                };
                true
            }
        }
    }

    /// Drop every task still suspended and detach waiting values from them.
    ///
    /// Called once a run has drained; remaining tasks can never progress and
    /// would otherwise keep the engine alive through reference cycles.
    pub fn clear_stalled_tasks(&self) {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        let stalled = std::mem::replace(&mut *self.pool.borrow_mut(), pool);
        *self.spawner.borrow_mut() = spawner;
        for slot in self.slots.borrow_mut().iter_mut() {
            if matches!(slot.state, SlotState::Waiting) {
                slot.wakers.clear();
                slot.resolver = None;
                slot.priority = None;
            }
        }
        drop(stalled);
    }

    /// A pending dtype choosing among `candidates`, defaulting to `default`.
    pub fn create_pending_from_list(
        &self,
        candidates: &[DType],
        default: DType,
        priority: i32,
    ) -> TypeVarId {
        self.vars.borrow_mut().fresh(candidates, default, priority)
    }

    pub fn resolved_dtype(&self, id: TypeVarId) -> Option<DType> {
        self.vars.borrow_mut().resolved(id)
    }

    /// Resolve a pending dtype now, to its class default if unconstrained.
    pub fn force_type_var(&self, id: TypeVarId) -> InferResult<DType> {
        let (dtype, defaulted) = self.vars.borrow_mut().force(id)?;
        if defaulted {
            emit_literal_defaulted(&dtype.to_string());
        }
        Ok(dtype)
    }

    /// Replace a resolved pending dtype by its value, or point it at its class root.
    pub fn deref_track(&self, track: &DTypeTrack) -> DTypeTrack {
        match track {
            DTypeTrack::Pending(id) => {
                let mut vars = self.vars.borrow_mut();
                match vars.root(*id) {
                    Ok(root) => match vars.vars[root].resolved {
                        Some(d) => DTypeTrack::Known(d),
                        None => DTypeTrack::Pending(TypeVarId(root)),
                    },
                    Err(_) => *track,
                }
            }
            other => *other,
        }
    }

    /// `value` with every resolved pending dtype substituted.
    pub fn deref_value(&self, value: &AbstractValue) -> AbstractValue {
        if !value.has_pending() {
            return value.clone();
        }
        let substituted = value.try_map_scalars(&mut |v: &Track<ScalarValue>, t: &DTypeTrack| {
            let dtype = self.deref_track(t);
            Ok(AbstractValue::Scalar {
                value: coerce_value(v, &dtype),
                dtype,
            })
        });
        substituted.unwrap_or_else(|_| value.clone())
    }

    /// `value` with every pending dtype forced.
    ///
    /// Known VALUEs follow their forced dtype, so an integer literal used as
    /// a float comes out as a float constant.
    pub fn concretize(&self, value: &AbstractValue) -> InferResult<AbstractValue> {
        value.try_map_scalars(&mut |v: &Track<ScalarValue>, t: &DTypeTrack| {
            let dtype = match t {
                DTypeTrack::Pending(id) => DTypeTrack::Known(self.force_type_var(*id)?),
                other => *other,
            };
            Ok(AbstractValue::Scalar {
                value: coerce_value(v, &dtype),
                dtype,
            })
        })
    }

    pub fn pending_count(&self) -> usize {
        self.slots.borrow().len()
    }
}

impl DTypeBinder for InferenceLoop {
    fn bind(&self, a: &DTypeTrack, b: &DTypeTrack) -> InferResult<DTypeTrack> {
        let a = self.deref_track(a);
        let b = self.deref_track(b);
        match (a, b) {
            (DTypeTrack::Pending(x), DTypeTrack::Pending(y)) => {
                self.vars.borrow_mut().union(x, y)
            }
            (DTypeTrack::Pending(x), DTypeTrack::Known(d))
            | (DTypeTrack::Known(d), DTypeTrack::Pending(x)) => self
                .vars
                .borrow_mut()
                .constrain(x, d)
                .map(DTypeTrack::Known),
            (DTypeTrack::Pending(_), DTypeTrack::Anything)
            | (DTypeTrack::Anything, DTypeTrack::Pending(_)) => Ok(DTypeTrack::Anything),
            (a, b) => merge_known_dtypes(&a, &b),
        }
    }
}

impl LiteralTypes for InferenceLoop {
    fn literal_dtype(&self, natural: DType, priority: i32) -> DTypeTrack {
        DTypeTrack::Pending(self.create_pending_from_list(&NUMBER_TYPES, natural, priority))
    }
}

/// Future of a pending value.
#[derive(Debug)]
pub struct Pending {
    id: PendingId,
    lp: Rc<InferenceLoop>,
}

impl Pending {
    pub fn id(&self) -> PendingId {
        self.id
    }
}

impl Future for Pending {
    type Output = InferResult<AbstractValue>;

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        let mut slots = self.lp.slots.borrow_mut();
        let Some(slot) = slots.get_mut(self.id.0) else {
            return Poll::Ready(Err(InferenceError::internal("unknown pending value")));
        };
        match &slot.state {
            SlotState::Done(v) => Poll::Ready(Ok(v.clone())),
            SlotState::Failed(e) => Poll::Ready(Err(e.clone())),
            SlotState::Waiting => {
                if !slot.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    slot.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
