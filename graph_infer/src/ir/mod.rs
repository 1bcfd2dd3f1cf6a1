//! Graph IR interface consumed by the engine.
//!
//! Building and parsing graphs is the job of an outer pipeline; this module
//! only provides the arena the engine reads from and appends rewritten call
//! nodes to.

pub mod constant;
pub mod core;
pub mod prim;

pub use constant::{Constant, ExternalValue, RecordValue};
pub use core::{
    Graph, GraphId, GraphManager, Macro, MacroId, MetaGraph, MetaGraphId, Node, NodeId, NodeKind,
};
pub use prim::Primitive;
