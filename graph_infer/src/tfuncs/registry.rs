//! Registry of primitive transfer functions.
//!
//! The registry is the fixed constructor table handed to an engine: each
//! primitive maps to exactly one rule, looked up when a call site first
//! resolves to that primitive.

use crate::abstract_interp::engine::InferenceEngine;
use crate::error::InferResult;
use crate::ir::Primitive;
use crate::lattice::AbstractValue;
use futures::future::LocalBoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Transfer function computed from the arguments alone.
///
/// # Examples
/// ```text
/// scalar_add(Int64, Int64)       → Int64
/// scalar_lt(Float64(1), Float64(2)) → Bool(true)
/// ```
pub type SyncTransferFn = fn(&InferenceEngine, &[AbstractValue]) -> InferResult<AbstractValue>;

/// Transfer function that awaits further inference (higher-order primitives).
pub type AsyncTransferFn =
    fn(Rc<InferenceEngine>, Vec<AbstractValue>) -> LocalBoxFuture<'static, InferResult<AbstractValue>>;

#[derive(Clone, Copy)]
pub enum TransferRule {
    Sync(SyncTransferFn),
    Async(AsyncTransferFn),
}

impl fmt::Debug for TransferRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferRule::Sync(_) => f.write_str("TransferRule::Sync"),
            TransferRule::Async(_) => f.write_str("TransferRule::Async"),
        }
    }
}

/// Map from primitive to transfer rule.
#[derive(Debug, Clone)]
pub struct PrimitiveRegistry {
    rules: HashMap<Primitive, TransferRule>,
}

impl PrimitiveRegistry {
    /// An empty registry. See [`Default`] for the full catalogue.
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Registers `rule` for `prim`, replacing any previous rule.
    pub fn register(&mut self, prim: Primitive, rule: TransferRule) {
        self.rules.insert(prim, rule);
    }

    pub fn get(&self, prim: Primitive) -> Option<TransferRule> {
        self.rules.get(&prim).copied()
    }

    pub fn has(&self, prim: Primitive) -> bool {
        self.rules.contains_key(&prim)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for PrimitiveRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        super::register_all(&mut registry);
        registry
    }
}
