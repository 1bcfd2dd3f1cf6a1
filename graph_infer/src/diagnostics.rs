//! Inference diagnostics.
//!
//! Optional record of the decisions the engine makes on its own: forcing a
//! stalled pending value, defaulting a numeric literal's dtype, joining the
//! results of several callees, rerouting a call site. Each event is also
//! logged through `tracing`; the collector keeps them for callers that want
//! to inspect a run programmatically.
//!
//! # Usage
//!
//! Collection is disabled by default:
//! - `DiagnosticsCollector::enable()` - start collecting
//! - `DiagnosticsCollector::disable()` - stop collecting
//! - `DiagnosticsCollector::take()` - retrieve and clear collected diagnostics

use std::cell::RefCell;
use tracing::{debug, trace};

/// Why a diagnostic was recorded.
#[derive(Clone, Debug, PartialEq)]
pub enum DiagnosticReason {
    /// The loop stalled and forced a pending value of this priority.
    PendingForced(i32),

    /// A numeric literal was given its default dtype.
    /// Contains the dtype name.
    LiteralDefaulted(String),

    /// Results of this many callees were joined at one call site.
    BranchesJoined(usize),

    /// A call site was redirected to another reference.
    Rerouted,

    /// A new graph specialization (context) was created.
    /// Contains the graph name.
    SpecializationCreated(String),

    /// An error was collected by the loop.
    ErrorCollected(String),
}

impl std::fmt::Display for DiagnosticReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticReason::PendingForced(priority) => {
                write!(f, "forced pending value with priority {}", priority)
            }
            DiagnosticReason::LiteralDefaulted(dtype) => {
                write!(f, "literal defaulted to {}", dtype)
            }
            DiagnosticReason::BranchesJoined(n) => {
                write!(f, "joined results of {} callees", n)
            }
            DiagnosticReason::Rerouted => write!(f, "call site rerouted"),
            DiagnosticReason::SpecializationCreated(name) => {
                write!(f, "new specialization of '{}'", name)
            }
            DiagnosticReason::ErrorCollected(msg) => write!(f, "error collected: {}", msg),
        }
    }
}

/// A single inference diagnostic.
#[derive(Clone, Debug)]
pub struct InferenceDiagnostic {
    pub reason: DiagnosticReason,
    /// Node or reference description, when one applies.
    pub context: Option<String>,
}

impl InferenceDiagnostic {
    pub fn new(reason: DiagnosticReason) -> Self {
        Self {
            reason,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl std::fmt::Display for InferenceDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "inference: {}", self.reason)?;
        if let Some(ctx) = &self.context {
            write!(f, " ({})", ctx)?;
        }
        Ok(())
    }
}

/// Guard returned by [`DiagnosticsCollector::scoped`].
#[derive(Debug)]
pub struct DiagnosticsScope {
    previous: bool,
}

impl Drop for DiagnosticsScope {
    fn drop(&mut self) {
        DIAGNOSTICS_ENABLED.with(|enabled| {
            *enabled.borrow_mut() = self.previous;
        });
    }
}

thread_local! {
    static DIAGNOSTICS_ENABLED: RefCell<bool> = const { RefCell::new(false) };
    static DIAGNOSTICS: RefCell<Vec<InferenceDiagnostic>> = const { RefCell::new(Vec::new()) };
}

/// Thread-local collector for inference diagnostics.
#[derive(Debug)]
pub struct DiagnosticsCollector;

impl DiagnosticsCollector {
    pub fn enable() {
        DIAGNOSTICS_ENABLED.with(|enabled| {
            *enabled.borrow_mut() = true;
        });
    }

    pub fn disable() {
        DIAGNOSTICS_ENABLED.with(|enabled| {
            *enabled.borrow_mut() = false;
        });
    }

    pub fn is_enabled() -> bool {
        DIAGNOSTICS_ENABLED.with(|enabled| *enabled.borrow())
    }

    /// Add a diagnostic to the collection (if enabled).
    pub fn emit(diagnostic: InferenceDiagnostic) {
        if Self::is_enabled() {
            DIAGNOSTICS.with(|diags| {
                diags.borrow_mut().push(diagnostic);
            });
        }
    }

    /// Take all collected diagnostics, clearing the collection.
    pub fn take() -> Vec<InferenceDiagnostic> {
        DIAGNOSTICS.with(|diags| std::mem::take(&mut *diags.borrow_mut()))
    }

    /// Enable collection until the returned guard is dropped, which puts
    /// back the state found on entry.
    pub fn scoped() -> DiagnosticsScope {
        let previous = Self::is_enabled();
        Self::enable();
        DiagnosticsScope { previous }
    }

    pub fn clear() {
        DIAGNOSTICS.with(|diags| {
            diags.borrow_mut().clear();
        });
    }

    pub fn count() -> usize {
        DIAGNOSTICS.with(|diags| diags.borrow().len())
    }
}

pub fn emit_pending_forced(priority: i32) {
    debug!(priority, "forcing stalled pending value");
    DiagnosticsCollector::emit(InferenceDiagnostic::new(DiagnosticReason::PendingForced(
        priority,
    )));
}

pub fn emit_literal_defaulted(dtype: &str) {
    trace!(dtype, "literal dtype defaulted");
    DiagnosticsCollector::emit(InferenceDiagnostic::new(
        DiagnosticReason::LiteralDefaulted(dtype.to_string()),
    ));
}

pub fn emit_branches_joined(count: usize, result: &str) {
    debug!(count, result, "joined callee results");
    DiagnosticsCollector::emit(
        InferenceDiagnostic::new(DiagnosticReason::BranchesJoined(count)).with_context(result),
    );
}

pub fn emit_rerouted(from: &str, to: &str) {
    debug!(from, to, "call site rerouted");
    DiagnosticsCollector::emit(
        InferenceDiagnostic::new(DiagnosticReason::Rerouted)
            .with_context(format!("{} -> {}", from, to)),
    );
}

pub fn emit_specialization(graph_name: &str, depth: usize) {
    trace!(graph = graph_name, depth, "new specialization");
    DiagnosticsCollector::emit(InferenceDiagnostic::new(
        DiagnosticReason::SpecializationCreated(graph_name.to_string()),
    ));
}

pub fn emit_error_collected(message: &str) {
    debug!(message, "error collected");
    DiagnosticsCollector::emit(InferenceDiagnostic::new(DiagnosticReason::ErrorCollected(
        message.to_string(),
    )));
}
