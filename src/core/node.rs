//! Node value types for the pipeline tree

use crate::core::path::NodePath;
use crate::error::DocumentError;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Environment variables, in declaration order.
pub type EnvMap = IndexMap<String, String>;

pub(crate) fn is_false(value: &bool) -> bool {
    !*value
}

/// Index of a node inside its [`Graph`](crate::core::Graph) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Structural role of a node, decided once at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// The root of the tree.
    Flow,

    /// A group whose children are subflows meant to run concurrently.
    Parallel,

    /// One branch under a parallel group.
    Subflow,

    /// A regular step: a leaf action or a sequential grouping.
    Step,

    /// A tail step that runs after the ordinary nodes of its scope finish,
    /// regardless of their outcome.
    Post,
}

/// Agent capability requirements of a flow or subflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Selector {
    /// Tags an agent must carry to pick up work from this scope.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// Tags that disqualify an agent even when all required tags match.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude: BTreeSet<String>,
}

impl Selector {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.exclude.is_empty()
    }

    /// Whether an agent with the given tags satisfies this selector.
    pub fn matches(&self, agent_tags: &BTreeSet<String>) -> bool {
        self.tags.is_subset(agent_tags) && self.exclude.is_disjoint(agent_tags)
    }
}

/// A container attached to a node.
///
/// At most one container per node is the runtime (the execution sandbox);
/// sidecar containers may carry an explicit `command`, the runtime may not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DockerOption {
    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(default, skip_serializing_if = "EnvMap::is_empty")]
    pub environment: EnvMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub is_runtime: bool,
}

/// Branch/tag allow-list evaluated against incoming git events.
///
/// Patterns are regular expressions; an empty list allows everything.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerFilter {
    pub branches: Vec<String>,
    pub tags: Vec<String>,

    #[serde(skip)]
    branch_matchers: Vec<Regex>,

    #[serde(skip)]
    tag_matchers: Vec<Regex>,
}

impl TriggerFilter {
    /// Compile a filter, failing on any pattern that is not a valid regex.
    pub fn new(branches: Vec<String>, tags: Vec<String>) -> Result<Self, DocumentError> {
        let branch_matchers = compile_patterns(&branches)?;
        let tag_matchers = compile_patterns(&tags)?;
        Ok(Self {
            branches,
            tags,
            branch_matchers,
            tag_matchers,
        })
    }

    /// Whether a push to `branch` should trigger the flow.
    pub fn matches_branch(&self, branch: &str) -> bool {
        matches_any(&self.branch_matchers, branch)
    }

    /// Whether pushing `tag` should trigger the flow.
    pub fn matches_tag(&self, tag: &str) -> bool {
        matches_any(&self.tag_matchers, tag)
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, DocumentError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| DocumentError::InvalidTriggerPattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

fn matches_any(matchers: &[Regex], value: &str) -> bool {
    matchers.is_empty() || matchers.iter().any(|m| m.is_match(value))
}

/// A vertex in the pipeline tree.
///
/// Nodes live in a [`Graph`](crate::core::Graph) arena and reference each
/// other by [`NodeId`]; equality is by path only.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub path: NodePath,
    pub kind: NodeKind,

    /// Parent node, `None` for the root.
    pub parent: Option<NodeId>,

    /// Direct children in declaration order.
    pub children: Vec<NodeId>,

    /// Environment variables declared on this node.
    pub envs: EnvMap,

    /// Environment after inheriting every ancestor's variables; entries
    /// declared closer to this node win.
    pub merged_envs: EnvMap,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerFilter>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,

    /// Gating expression evaluated by the execution engine before dispatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Script dispatched before the main script body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,

    /// Main shell body of a leaf step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Reusable step implementation; leaf steps only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    /// Environment names published to the parent scope on success.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub exports: BTreeSet<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<usize>,

    pub allow_failure: bool,

    /// Containers for this node; at most one is the runtime.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dockers: Vec<DockerOption>,

    /// Position in the tree's ordered flattening; assigned when the tree
    /// index is built.
    pub(crate) order: usize,
}

impl Node {
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether this node runs after its scope's ordinary nodes finish.
    pub fn is_tail(&self) -> bool {
        self.kind == NodeKind::Post
    }

    pub fn has_plugin(&self) -> bool {
        self.plugin.is_some()
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    /// Look up an inherited environment variable.
    pub fn env(&self, name: &str) -> Option<&str> {
        self.merged_envs.get(name).map(String::as_str)
    }

    /// The runtime container, if any container is attached.
    pub fn runtime_docker(&self) -> Option<&DockerOption> {
        self.dockers.iter().find(|d| d.is_runtime)
    }

    /// Position in the tree's ordered flattening.
    pub fn order(&self) -> usize {
        self.order
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Node {}
