//! Graph Infer: abstract-interpretation inference for a graph IR.
//!
//! The engine assigns an abstract value (type, shape, constant-ness and call
//! targets) to every node of every call context of a program graph. It runs
//! as a demand-driven fixpoint on a single-threaded cooperative loop.
//!
//! ```text
//! InferenceEngine::run(graph, argspec)
//!        │
//!        ▼
//!   root Reference ──► compute_ref ──► infer_apply ──► Inferrer(s)
//!        ▲                                               │
//!        └──────────── EvaluationCache ◄─────────────────┘
//! ```
//!
//! Layout:
//! - [`ir`]: graphs, nodes, constants and the primitive catalogue
//! - [`lattice`]: abstract values, merge/broaden, conversion from constants
//! - [`abstract_interp`]: the loop, references, inferrers and the engine
//! - [`tfuncs`]: per-primitive inference rules
//! - [`error`], [`config`], [`diagnostics`]: ambient support

pub mod abstract_interp;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod ir;
pub mod lattice;
pub mod tfuncs;

pub use abstract_interp::engine::InferenceEngine;
pub use abstract_interp::reference::{ArgRef, Context, Reference};
pub use config::EngineConfig;
pub use error::{ErrorKind, InferResult, InferenceError};
pub use ir::{Constant, GraphId, GraphManager, NodeId, Primitive};
pub use lattice::{AbstractValue, DType, DTypeTrack, FunctionVariant, ScalarValue, Track};
