//! Error types for the inference engine.
//!
//! Every failure is an [`InferenceError`]: an [`ErrorKind`] plus a traceback
//! of the references and graph calls it unwound through, innermost first.

mod report;

pub use report::{ErrorReport, FrameReport};

use crate::abstract_interp::reference::Reference;
use crate::ir::GraphId;
use crate::lattice::AbstractValue;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type InferResult<T> = Result<T, InferenceError>;

/// What went wrong.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ErrorKind {
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("type mismatch between {left} and {right}: {reason}")]
    TypeMismatch {
        left: String,
        right: String,
        reason: String,
    },

    #[error("invalid arguments: {0}")]
    Argument(String),

    #[error("cannot call {0}")]
    NotCallable(String),

    #[error("trying to call a dummy function")]
    DummyCall,

    /// Defect signal: a malformed graph or an engine invariant was violated.
    #[error("internal consistency failure: {0}")]
    InternalConsistency(String),

    #[error("could not resolve {0}")]
    Unresolved(String),

    #[error("specialization limit of {limit} contexts exceeded")]
    FuelExhausted { limit: usize },
}

impl ErrorKind {
    /// Stable short name, used in reports.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Arity { .. } => "ArityError",
            ErrorKind::TypeMismatch { .. } => "TypeMismatch",
            ErrorKind::Argument(_) => "ArgumentError",
            ErrorKind::NotCallable(_) => "NotCallableError",
            ErrorKind::DummyCall => "DummyCallError",
            ErrorKind::InternalConsistency(_) => "InternalConsistencyError",
            ErrorKind::Unresolved(_) => "UnresolvedError",
            ErrorKind::FuelExhausted { .. } => "FuelExhaustedError",
        }
    }
}

/// One step of the chain an error unwound through.
#[derive(Clone, Debug, PartialEq)]
pub enum TracebackEntry {
    /// An apply node evaluated in a context.
    Reference(Reference),
    /// A graph specialization entered with these arguments.
    Call {
        graph: GraphId,
        args: Vec<AbstractValue>,
    },
}

/// An inference failure with its traceback.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}")]
pub struct InferenceError {
    pub kind: ErrorKind,
    pub traceback: Vec<TracebackEntry>,
}

impl InferenceError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            traceback: Vec::new(),
        }
    }

    pub fn arity(expected: usize, got: usize) -> Self {
        Self::new(ErrorKind::Arity { expected, got })
    }

    pub fn type_mismatch(
        left: &AbstractValue,
        right: &AbstractValue,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::TypeMismatch {
            left: left.to_string(),
            right: right.to_string(),
            reason: reason.into(),
        })
    }

    /// Mismatch between two things that are not abstract values (dtypes, tags).
    pub fn mismatch_text(
        left: impl Into<String>,
        right: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::TypeMismatch {
            left: left.into(),
            right: right.into(),
            reason: reason.into(),
        })
    }

    pub fn argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Argument(msg.into()))
    }

    pub fn not_callable(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotCallable(what.into()))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalConsistency(msg.into()))
    }

    pub fn unresolved(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unresolved(what.into()))
    }

    /// Append a reference to the traceback.
    pub fn with_ref(mut self, reference: Reference) -> Self {
        self.traceback.push(TracebackEntry::Reference(reference));
        self
    }

    /// Append a graph call to the traceback.
    pub fn with_call(mut self, graph: GraphId, args: Vec<AbstractValue>) -> Self {
        self.traceback.push(TracebackEntry::Call { graph, args });
        self
    }

    /// The innermost reference, if any.
    pub fn innermost_ref(&self) -> Option<&Reference> {
        self.traceback.iter().find_map(|entry| match entry {
            TracebackEntry::Reference(r) => Some(r),
            TracebackEntry::Call { .. } => None,
        })
    }
}
