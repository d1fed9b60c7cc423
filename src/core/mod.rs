//! Core graph model and traversal engine
//!
//! This module owns the fundamental data structures of a pipeline: node
//! addresses, the node value type, the arena-backed graph built from a
//! parsed document, and the indexed tree that answers traversal queries.

pub mod graph;
pub mod node;
pub mod path;
pub mod tree;

pub use graph::{build, Graph};
pub use node::{DockerOption, EnvMap, Node, NodeId, NodeKind, Selector, TriggerFilter};
pub use path::NodePath;
pub use tree::NodeTree;
