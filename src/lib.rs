//! flowtree - pipeline graph model and traversal engine for CI flows
//!
//! A declarative pipeline document is parsed into an intermediate form,
//! built into an immutable arena-backed node graph, and indexed into a
//! [`NodeTree`]. The tree answers the frontier queries a job execution
//! engine needs at every step: which node(s) run next after one finishes
//! (`next`), where to resume when a subtree is bypassed (`skip`), which
//! always-run tail steps follow (`post`), and which predecessors gate a
//! fan-in target (`prevs`). The core executes nothing itself; it only
//! models structure and computes order.

pub mod core;
pub mod doc;
pub mod error;

// Re-export commonly used types
pub use crate::core::{
    build, DockerOption, EnvMap, Graph, Node, NodeId, NodeKind, NodePath, NodeTree, Selector,
    TriggerFilter,
};
pub use crate::doc::{merge, parse, to_document, FlowYml, StepYml, SubflowYml, TriggerYml};
pub use crate::error::{DocumentError, GraphError};

/// Parse a document, build its graph and index it, in one call.
pub fn load(text: &str) -> Result<NodeTree, DocumentError> {
    let flow = crate::doc::parse(text)?;
    let graph = crate::core::build(&flow)?;
    Ok(NodeTree::new(graph))
}
