//! Serializable view of an error's traceback for external pretty-printers.

use super::{InferenceError, TracebackEntry};
use crate::ir::GraphManager;
use serde::{Deserialize, Serialize};

/// A flattened, serializable error report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
    pub frames: Vec<FrameReport>,
}

/// One traceback frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum FrameReport {
    Reference {
        node: u32,
        node_name: Option<String>,
        graph: Option<String>,
        context_depth: usize,
    },
    Call {
        graph: String,
        args: Vec<String>,
    },
}

impl ErrorReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl InferenceError {
    /// Build a report, resolving node and graph names through `manager`.
    pub fn report(&self, manager: &GraphManager) -> ErrorReport {
        let frames = self
            .traceback
            .iter()
            .map(|entry| match entry {
                TracebackEntry::Reference(r) => {
                    let node = manager.node(r.node);
                    FrameReport::Reference {
                        node: r.node.0,
                        node_name: node.and_then(|n| n.debug_name.clone()),
                        graph: node
                            .and_then(|n| n.graph)
                            .and_then(|g| manager.graph(g))
                            .map(|g| g.name.clone()),
                        context_depth: r.context.depth(),
                    }
                }
                TracebackEntry::Call { graph, args } => FrameReport::Call {
                    graph: manager
                        .graph(*graph)
                        .map(|g| g.name.clone())
                        .unwrap_or_else(|| format!("graph#{}", graph.0)),
                    args: args.iter().map(|a| a.to_string()).collect(),
                },
            })
            .collect();
        ErrorReport {
            kind: self.kind.name().to_string(),
            message: self.kind.to_string(),
            frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstract_interp::reference::{Context, Reference};
    use crate::ir::{Constant, Primitive};
    use crate::lattice::AbstractValue;

    #[test]
    fn test_report_names_frames() {
        let mut mng = GraphManager::new();
        let g = mng.add_graph("main", None);
        let five = mng.constant(Constant::Int(5));
        let call = mng.apply(g, vec![five]);
        mng.set_debug_name(call, "bad_call");
        let _ = mng.prim(Primitive::ScalarAdd);

        let err = InferenceError::not_callable("Int64(5)")
            .with_ref(Reference {
                node: call,
                context: Context::empty(),
            })
            .with_call(g, vec![AbstractValue::int64()]);
        let report = err.report(&mng);

        assert_eq!(report.kind, "NotCallableError");
        assert_eq!(
            report.frames[0],
            FrameReport::Reference {
                node: call.0,
                node_name: Some("bad_call".to_string()),
                graph: Some("main".to_string()),
                context_depth: 0,
            }
        );
        assert_eq!(
            report.frames[1],
            FrameReport::Call {
                graph: "main".to_string(),
                args: vec!["Int64".to_string()],
            }
        );

        let json = report.to_json().unwrap();
        let back: ErrorReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
