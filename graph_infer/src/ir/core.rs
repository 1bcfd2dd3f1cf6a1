//! Graphs, nodes and the arena that owns them.
//!
//! Nodes are addressed by [`NodeId`] and never move. The engine appends new
//! apply nodes when it rewrites a call site but never mutates existing ones,
//! so references held by in-flight computations stay valid.

use super::constant::Constant;
use super::prim::Primitive;
use crate::abstract_interp::engine::InferenceEngine;
use crate::abstract_interp::reference::{ArgRef, Reference};
use crate::error::InferResult;
use crate::lattice::ops::reject_keywords;
use crate::lattice::AbstractValue;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetaGraphId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MacroId(pub u32);

#[derive(Clone, Debug)]
pub enum NodeKind {
    Constant(Constant),
    /// `inputs[0]` is the callee, the rest are arguments.
    Apply(Vec<NodeId>),
    Parameter { name: String },
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    /// Owning graph; `None` for constants.
    pub graph: Option<GraphId>,
    /// Abstract value attached by an earlier pipeline stage.
    pub annotation: Option<AbstractValue>,
    pub debug_name: Option<String>,
}

impl Node {
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, NodeKind::Constant(_))
    }

    pub fn is_apply(&self) -> bool {
        matches!(self.kind, NodeKind::Apply(_))
    }

    pub fn inputs(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Apply(inputs) => inputs,
            _ => &[],
        }
    }

    /// The graph this node refers to, if it is a graph constant.
    pub fn constant_graph(&self) -> Option<GraphId> {
        match &self.kind {
            NodeKind::Constant(Constant::Graph(g)) => Some(*g),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Graph {
    pub name: String,
    pub parameters: Vec<NodeId>,
    /// The `return_` apply node.
    pub return_: Option<NodeId>,
    /// Lexically enclosing graph, for closures.
    pub parent: Option<GraphId>,
}

/// A family of graphs generated on demand from an argument signature.
pub trait MetaGraph: fmt::Debug {
    fn name(&self) -> &str;

    /// Rejects keyword arguments and broadens the rest.
    fn normalize_args(&self, args: Vec<AbstractValue>) -> InferResult<Vec<AbstractValue>> {
        reject_keywords(&args)?;
        Ok(args.iter().map(AbstractValue::broaden).collect())
    }

    fn make_signature(&self, args: &[AbstractValue]) -> Vec<AbstractValue> {
        args.to_vec()
    }

    /// Build the specialized graph for `signature` into `manager`.
    fn generate_graph(
        &self,
        signature: &[AbstractValue],
        manager: &mut GraphManager,
    ) -> InferResult<GraphId>;
}

/// Expansion-time rewrite of a call site.
///
/// A macro never produces a value itself: it builds a replacement call and
/// returns a reference to it, and the engine reroutes the original call.
pub trait Macro: fmt::Debug {
    fn name(&self) -> &str;

    fn expand(
        &self,
        engine: Rc<InferenceEngine>,
        outref: Reference,
        argrefs: Vec<ArgRef>,
    ) -> LocalBoxFuture<'static, InferResult<Reference>>;
}

/// Arena of graphs and nodes.
#[derive(Debug, Default)]
pub struct GraphManager {
    graphs: Vec<Graph>,
    nodes: Vec<Node>,
    metagraphs: Vec<Rc<dyn MetaGraph>>,
    macros: Vec<Rc<dyn Macro>>,
}

impl GraphManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_graph(&mut self, name: impl Into<String>, parent: Option<GraphId>) -> GraphId {
        let id = GraphId(self.graphs.len() as u32);
        self.graphs.push(Graph {
            name: name.into(),
            parameters: Vec::new(),
            return_: None,
            parent,
        });
        id
    }

    fn push_node(&mut self, kind: NodeKind, graph: Option<GraphId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            graph,
            annotation: None,
            debug_name: None,
        });
        id
    }

    pub fn add_parameter(&mut self, graph: GraphId, name: impl Into<String>) -> NodeId {
        let name = name.into();
        let id = self.push_node(NodeKind::Parameter { name: name.clone() }, Some(graph));
        self.nodes[id.0 as usize].debug_name = Some(name);
        self.graphs[graph.0 as usize].parameters.push(id);
        id
    }

    pub fn constant(&mut self, value: Constant) -> NodeId {
        self.push_node(NodeKind::Constant(value), None)
    }

    pub fn prim(&mut self, prim: Primitive) -> NodeId {
        self.constant(Constant::Primitive(prim))
    }

    pub fn graph_constant(&mut self, graph: GraphId) -> NodeId {
        self.constant(Constant::Graph(graph))
    }

    pub fn apply(&mut self, graph: GraphId, inputs: Vec<NodeId>) -> NodeId {
        self.push_node(NodeKind::Apply(inputs), Some(graph))
    }

    /// Apply a primitive, creating its constant node.
    pub fn apply_prim(&mut self, graph: GraphId, prim: Primitive, args: &[NodeId]) -> NodeId {
        let callee = self.prim(prim);
        let mut inputs = Vec::with_capacity(args.len() + 1);
        inputs.push(callee);
        inputs.extend_from_slice(args);
        self.apply(graph, inputs)
    }

    /// Make `node` the output of `graph` through a `return_` call.
    pub fn set_output(&mut self, graph: GraphId, node: NodeId) -> NodeId {
        let ret = self.apply_prim(graph, Primitive::Return, &[node]);
        self.graphs[graph.0 as usize].return_ = Some(ret);
        ret
    }

    pub fn annotate(&mut self, node: NodeId, value: AbstractValue) {
        if let Some(n) = self.nodes.get_mut(node.0 as usize) {
            n.annotation = Some(value);
        }
    }

    pub fn set_debug_name(&mut self, node: NodeId, name: impl Into<String>) {
        if let Some(n) = self.nodes.get_mut(node.0 as usize) {
            n.debug_name = Some(name.into());
        }
    }

    pub fn add_metagraph(&mut self, metagraph: Rc<dyn MetaGraph>) -> MetaGraphId {
        let id = MetaGraphId(self.metagraphs.len() as u32);
        self.metagraphs.push(metagraph);
        id
    }

    pub fn add_macro(&mut self, mac: Rc<dyn Macro>) -> MacroId {
        let id = MacroId(self.macros.len() as u32);
        self.macros.push(mac);
        id
    }

    pub fn graph(&self, id: GraphId) -> Option<&Graph> {
        self.graphs.get(id.0 as usize)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    pub fn metagraph(&self, id: MetaGraphId) -> Option<Rc<dyn MetaGraph>> {
        self.metagraphs.get(id.0 as usize).cloned()
    }

    pub fn macro_(&self, id: MacroId) -> Option<Rc<dyn Macro>> {
        self.macros.get(id.0 as usize).cloned()
    }

    pub fn graph_name(&self, id: GraphId) -> String {
        self.graph(id)
            .map(|g| g.name.clone())
            .unwrap_or_else(|| format!("graph#{}", id.0))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }
}
