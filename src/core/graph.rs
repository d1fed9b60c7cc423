//! Arena-backed pipeline graph and its builder

use crate::core::node::{DockerOption, EnvMap, Node, NodeId, NodeKind, TriggerFilter};
use crate::core::path::{self, NodePath};
use crate::doc::parser;
use crate::doc::yml::{FlowYml, StepYml, SubflowYml};
use crate::error::DocumentError;
use std::collections::BTreeSet;
use std::collections::HashSet;
use tracing::debug;

/// An immutable pipeline tree.
///
/// All nodes live in one flat arena indexed by [`NodeId`]; parent and child
/// links are ids into that arena. The graph is produced by [`build`] in a
/// single pass and never mutated afterwards, so it is safe to share across
/// threads by reference.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Graph {
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> &Node {
        self.node(self.root)
    }

    /// The node behind an id issued by this graph.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// All nodes in arena order (root first, then depth-first insertion).
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Total number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Build a linked node graph from a parsed flow document.
///
/// Runs the document validations first, so it is safe to call with a
/// hand-assembled [`FlowYml`] as well as one returned by
/// [`parse`](crate::doc::parse).
pub fn build(flow: &FlowYml) -> Result<Graph, DocumentError> {
    parser::validate(flow)?;

    let mut builder = Builder::default();
    let root = builder.add_root(flow)?;

    for (index, step) in flow.steps.iter().enumerate() {
        builder.add_step(root, step, index + 1)?;
    }

    debug!(nodes = builder.nodes.len(), "built pipeline graph");
    Ok(Graph {
        nodes: builder.nodes,
        root,
    })
}

#[derive(Default)]
struct Builder {
    nodes: Vec<Node>,
    seen: HashSet<NodePath>,
}

impl Builder {
    fn add_root(&mut self, flow: &FlowYml) -> Result<NodeId, DocumentError> {
        let name = flow.effective_name();
        if !path::is_valid_name(name) {
            return Err(DocumentError::InvalidName(name.to_string()));
        }

        let trigger = flow
            .trigger
            .as_ref()
            .map(|t| TriggerFilter::new(t.branches.clone(), t.tags.clone()))
            .transpose()?;

        self.push(Node {
            id: NodeId(0),
            name: name.to_string(),
            path: NodePath::new([name])?,
            kind: NodeKind::Flow,
            parent: None,
            children: Vec::new(),
            envs: flow.envs.clone(),
            merged_envs: flow.envs.clone(),
            selector: flow.selector.clone(),
            trigger,
            cron: flow.cron.clone(),
            condition: flow.condition.clone(),
            before: None,
            script: None,
            plugin: None,
            exports: BTreeSet::new(),
            timeout: None,
            retries: None,
            allow_failure: false,
            dockers: normalize_dockers(&flow.docker, &flow.dockers),
            order: 0,
        })
    }

    fn add_step(
        &mut self,
        parent: NodeId,
        step: &StepYml,
        index: usize,
    ) -> Result<NodeId, DocumentError> {
        let name = step.effective_name(index);
        let parent_node = &self.nodes[parent.index()];
        let node_path = parent_node.path.child(&name)?;
        let merged_envs = merge_envs(&parent_node.merged_envs, &step.envs);

        let kind = if step.is_parallel() {
            NodeKind::Parallel
        } else if step.tail {
            NodeKind::Post
        } else {
            NodeKind::Step
        };

        let id = self.push(Node {
            id: NodeId(0),
            name,
            path: node_path,
            kind,
            parent: Some(parent),
            children: Vec::new(),
            envs: step.envs.clone(),
            merged_envs,
            selector: None,
            trigger: None,
            cron: None,
            condition: step.condition.clone(),
            before: step.before.clone(),
            script: step.script.clone(),
            plugin: step.plugin.clone(),
            exports: step.exports.iter().cloned().collect(),
            timeout: step.timeout,
            retries: step.retries,
            allow_failure: step.allow_failure,
            dockers: normalize_dockers(&step.docker, &step.dockers),
            order: 0,
        })?;
        self.nodes[parent.index()].children.push(id);

        if let Some(parallel) = &step.parallel {
            for (sub_name, sub) in parallel {
                self.add_subflow(id, sub_name, sub)?;
            }
        } else {
            for (child_index, child) in step.steps.iter().enumerate() {
                self.add_step(id, child, child_index + 1)?;
            }
        }

        Ok(id)
    }

    fn add_subflow(
        &mut self,
        parent: NodeId,
        name: &str,
        sub: &SubflowYml,
    ) -> Result<NodeId, DocumentError> {
        let parent_node = &self.nodes[parent.index()];
        let node_path = parent_node.path.child(name)?;
        let merged_envs = merge_envs(&parent_node.merged_envs, &sub.envs);

        let id = self.push(Node {
            id: NodeId(0),
            name: name.to_string(),
            path: node_path,
            kind: NodeKind::Subflow,
            parent: Some(parent),
            children: Vec::new(),
            envs: sub.envs.clone(),
            merged_envs,
            selector: sub.selector.clone(),
            trigger: None,
            cron: None,
            condition: sub.condition.clone(),
            before: None,
            script: None,
            plugin: None,
            exports: BTreeSet::new(),
            timeout: None,
            retries: None,
            allow_failure: false,
            dockers: normalize_dockers(&sub.docker, &sub.dockers),
            order: 0,
        })?;
        self.nodes[parent.index()].children.push(id);

        for (child_index, child) in sub.steps.iter().enumerate() {
            self.add_step(id, child, child_index + 1)?;
        }

        Ok(id)
    }

    fn push(&mut self, mut node: Node) -> Result<NodeId, DocumentError> {
        if !self.seen.insert(node.path.clone()) {
            return Err(DocumentError::DuplicateElement(node.path.to_string()));
        }

        let id = NodeId(self.nodes.len());
        node.id = id;
        self.nodes.push(node);
        Ok(id)
    }
}

fn merge_envs(parent: &EnvMap, own: &EnvMap) -> EnvMap {
    let mut merged = parent.clone();
    for (key, value) in own {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// A single `docker` section is implicitly the runtime container.
fn normalize_dockers(
    docker: &Option<DockerOption>,
    dockers: &[DockerOption],
) -> Vec<DockerOption> {
    if let Some(docker) = docker {
        let mut runtime = docker.clone();
        runtime.is_runtime = true;
        return vec![runtime];
    }
    dockers.to_vec()
}
