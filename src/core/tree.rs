//! Indexed, queryable view over a pipeline graph
//!
//! A [`NodeTree`] is built once from a [`Graph`] and is immutable afterwards;
//! concurrent readers need no synchronization. At run time the job execution
//! engine feeds it the path of a just-finished node and asks which node(s)
//! become runnable next (`next`, `skip`), which tail steps follow (`post`),
//! and which predecessors gate a target (`prevs`).

use crate::core::graph::Graph;
use crate::core::node::{Node, NodeId, NodeKind, Selector};
use crate::core::path::NodePath;
use crate::error::GraphError;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// The traversal engine over an immutable pipeline graph.
#[derive(Debug)]
pub struct NodeTree {
    graph: Graph,

    /// Path lookup into the arena.
    index: HashMap<NodePath, NodeId>,

    /// All nodes in execution-display order: depth-first, with every tail
    /// node placed after the ordinary subtrees of its scope.
    ordered: Vec<NodeId>,

    /// Tail nodes grouped into the layers they run in. The k-th tails of
    /// sibling subflows under one parallel group share a layer; every other
    /// tail is a layer of its own. Layers follow `ordered` positions.
    layers: Vec<Vec<NodeId>>,

    /// Layer index of each tail node.
    layer_of: HashMap<NodeId, usize>,

    /// Outgoing frontier transition per node, indexed by arena position.
    nexts: Vec<Vec<NodeId>>,

    /// Reverse of `nexts`.
    prevs: Vec<Vec<NodeId>>,

    /// Nodes with no outgoing transition.
    ends: Vec<NodeId>,

    /// Distinct selectors declared across the tree.
    selectors: Vec<Selector>,
}

impl NodeTree {
    /// Index a graph and precompute every traversal structure.
    pub fn new(mut graph: Graph) -> Self {
        let mut ordered = Vec::with_capacity(graph.len());
        flatten(&graph, graph.root_id(), &mut ordered);
        for (position, id) in ordered.iter().enumerate() {
            graph.node_mut(*id).order = position;
        }

        let index = graph.nodes().map(|n| (n.path.clone(), n.id)).collect();
        let (layers, layer_of) = build_layers(&graph, &ordered);

        let mut nexts = vec![Vec::new(); graph.len()];
        for id in &ordered {
            nexts[id.index()] = next_targets(&graph, &layers, &layer_of, *id);
        }

        let mut prevs = vec![Vec::new(); graph.len()];
        for (from, targets) in nexts.iter().enumerate() {
            for target in targets {
                prevs[target.index()].push(NodeId(from));
            }
        }
        for list in &mut prevs {
            list.sort_by_key(|id| graph.node(*id).order);
        }

        let ends: Vec<NodeId> = ordered
            .iter()
            .copied()
            .filter(|id| nexts[id.index()].is_empty())
            .collect();

        let mut selector_set: BTreeSet<Selector> =
            graph.nodes().filter_map(|n| n.selector.clone()).collect();
        if graph.root().selector.is_none() {
            selector_set.insert(Selector::default());
        }
        let selectors: Vec<Selector> = selector_set.into_iter().collect();

        debug!(
            nodes = graph.len(),
            layers = layers.len(),
            ends = ends.len(),
            "indexed node tree"
        );

        Self {
            graph,
            index,
            ordered,
            layers,
            layer_of,
            nexts,
            prevs,
            ends,
            selectors,
        }
    }

    pub fn root(&self) -> &Node {
        self.graph.root()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Look up a node by path.
    pub fn get(&self, path: &NodePath) -> Result<&Node, GraphError> {
        let id = self
            .index
            .get(path)
            .ok_or_else(|| GraphError::NotFound(path.to_string()))?;
        Ok(self.graph.node(*id))
    }

    /// The node(s) that become runnable once the node at `path` finishes.
    ///
    /// Descends into ordinary children first (all branches at once for a
    /// parallel group), then falls over to the following sibling, then to an
    /// ancestor's following sibling, and finally to the tail layer behind
    /// this node; an empty result marks a terminal node.
    pub fn next(&self, path: &NodePath) -> Result<Vec<&Node>, GraphError> {
        let node = self.get(path)?;
        Ok(self.resolve(&self.nexts[node.id.index()]))
    }

    /// Like [`next`](Self::next) but never descends into the node's own
    /// subtree; used when a whole subtree is bypassed.
    pub fn skip(&self, path: &NodePath) -> Result<Vec<&Node>, GraphError> {
        let node = self.get(path)?;

        if node.is_tail() {
            return Ok(self.resolve(&self.nexts[node.id.index()]));
        }

        let targets = match following_sibling(&self.graph, node.id) {
            Some(sibling) => vec![sibling],
            None => layer_behind(&self.graph, &self.layers, node.order),
        };
        Ok(self.resolve(&targets))
    }

    /// The tail layer that runs after the node at `path`.
    ///
    /// For a tail node this is the layer after its own; for any other node
    /// it is the first layer containing a member placed behind it in the
    /// ordered view. Empty when no tail work remains.
    pub fn post(&self, path: &NodePath) -> Result<Vec<&Node>, GraphError> {
        let node = self.get(path)?;

        let targets = if node.is_tail() {
            layer_after_own(&self.layers, &self.layer_of, node.id)
        } else {
            layer_behind(&self.graph, &self.layers, node.order)
        };
        Ok(self.resolve(&targets))
    }

    /// The nodes whose completion gates the given targets.
    ///
    /// With `include_all` the full predecessor set is returned, one entry
    /// per converging branch; otherwise only the predecessor placed last in
    /// the ordered view, as a single readiness witness.
    pub fn prevs(
        &self,
        paths: &[NodePath],
        include_all: bool,
    ) -> Result<Vec<&Node>, GraphError> {
        let mut ids: Vec<NodeId> = Vec::new();
        for path in paths {
            let node = self.get(path)?;
            for prev in &self.prevs[node.id.index()] {
                if !ids.contains(prev) {
                    ids.push(*prev);
                }
            }
        }

        ids.sort_by_key(|id| self.graph.node(*id).order);
        if !include_all {
            if let Some(last) = ids.pop() {
                ids = vec![last];
            }
        }
        Ok(self.resolve(&ids))
    }

    /// Terminal nodes: nothing runs after them.
    pub fn ends(&self) -> Vec<&Node> {
        self.resolve(&self.ends)
    }

    /// Distinct selectors declared across the tree. A root without a
    /// selector contributes the empty selector.
    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    /// All nodes in execution-display order, tail nodes after the ordinary
    /// nodes of their scope. Stable across calls.
    pub fn ordered(&self) -> Vec<&Node> {
        self.resolve(&self.ordered)
    }

    /// Total number of nodes, root included.
    pub fn num_of_nodes(&self) -> usize {
        self.graph.len()
    }

    fn resolve(&self, ids: &[NodeId]) -> Vec<&Node> {
        ids.iter().map(|id| self.graph.node(*id)).collect()
    }
}

/// Depth-first flattening with tail children after ordinary subtrees.
fn flatten(graph: &Graph, id: NodeId, out: &mut Vec<NodeId>) {
    out.push(id);

    let node = graph.node(id);
    for child in &node.children {
        if !graph.node(*child).is_tail() {
            flatten(graph, *child, out);
        }
    }
    for child in &node.children {
        if graph.node(*child).is_tail() {
            flatten(graph, *child, out);
        }
    }
}

/// Group tail nodes into run layers.
fn build_layers(
    graph: &Graph,
    ordered: &[NodeId],
) -> (Vec<Vec<NodeId>>, HashMap<NodeId, usize>) {
    let mut layers: Vec<Vec<NodeId>> = Vec::new();
    let mut layer_of: HashMap<NodeId, usize> = HashMap::new();
    // (parallel group, tail position within branch) -> layer
    let mut grouped: HashMap<(NodeId, usize), usize> = HashMap::new();

    for &id in ordered {
        let node = graph.node(id);
        if !node.is_tail() {
            continue;
        }
        let parent_id = match node.parent {
            Some(parent) => parent,
            None => continue,
        };
        let parent = graph.node(parent_id);

        let layer = match (parent.kind, parent.parent) {
            // the k-th tail of every branch under one parallel group runs
            // in the same layer
            (NodeKind::Subflow, Some(group)) => {
                let tail_position = parent
                    .children
                    .iter()
                    .filter(|c| graph.node(**c).is_tail())
                    .position(|c| *c == id)
                    .unwrap_or(0);

                match grouped.get(&(group, tail_position)) {
                    Some(&layer) => {
                        layers[layer].push(id);
                        layer
                    }
                    None => {
                        grouped.insert((group, tail_position), layers.len());
                        layers.push(vec![id]);
                        layers.len() - 1
                    }
                }
            }
            _ => {
                layers.push(vec![id]);
                layers.len() - 1
            }
        };
        layer_of.insert(id, layer);
    }

    (layers, layer_of)
}

/// Compute the outgoing frontier transition of one node.
fn next_targets(
    graph: &Graph,
    layers: &[Vec<NodeId>],
    layer_of: &HashMap<NodeId, usize>,
    id: NodeId,
) -> Vec<NodeId> {
    let node = graph.node(id);

    if node.is_tail() {
        return layer_after_own(layers, layer_of, id);
    }

    // fan-out: every branch of a parallel group starts at once
    if node.kind == NodeKind::Parallel {
        return node.children.clone();
    }

    if let Some(first) = node.children.iter().find(|c| !graph.node(**c).is_tail()) {
        return vec![*first];
    }

    if let Some(sibling) = following_sibling(graph, id) {
        return vec![sibling];
    }

    layer_behind(graph, layers, node.order)
}

/// The next ordinary sibling of this node or of its nearest ancestor.
///
/// Branches of a parallel group are concurrent, not sequential, so no
/// sibling is taken at subflow level: resolution continues from the group,
/// which is where all branches converge.
fn following_sibling(graph: &Graph, id: NodeId) -> Option<NodeId> {
    let mut current = id;
    loop {
        let node = graph.node(current);
        let parent = node.parent?;

        if node.kind != NodeKind::Subflow {
            let siblings = &graph.node(parent).children;
            if let Some(position) = siblings.iter().position(|c| *c == current) {
                let found = siblings[position + 1..]
                    .iter()
                    .find(|c| !graph.node(**c).is_tail());
                if let Some(sibling) = found {
                    return Some(*sibling);
                }
            }
        }

        current = parent;
    }
}

/// First tail layer with a member placed behind `order` in the ordered view.
fn layer_behind(graph: &Graph, layers: &[Vec<NodeId>], order: usize) -> Vec<NodeId> {
    layers
        .iter()
        .find(|layer| layer.iter().any(|id| graph.node(*id).order > order))
        .cloned()
        .unwrap_or_default()
}

/// The layer after the one a tail node belongs to.
fn layer_after_own(
    layers: &[Vec<NodeId>],
    layer_of: &HashMap<NodeId, usize>,
    id: NodeId,
) -> Vec<NodeId> {
    layer_of
        .get(&id)
        .and_then(|layer| layers.get(layer + 1))
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load;

    fn paths(nodes: &[&Node]) -> Vec<String> {
        nodes.iter().map(|n| n.path.to_string()).collect()
    }

    fn path(value: &str) -> NodePath {
        NodePath::parse(value).unwrap()
    }

    #[test]
    fn test_sequential_next_chain() {
        let tree = load(
            r#"
name: ci
steps:
  - name: A
    script: echo A
  - name: B
    script: echo B
  - name: C
    script: echo C
"#,
        )
        .unwrap();

        assert_eq!(paths(&tree.next(&path("ci")).unwrap()), ["ci/A"]);
        assert_eq!(paths(&tree.next(&path("ci/A")).unwrap()), ["ci/B"]);
        assert_eq!(paths(&tree.next(&path("ci/B")).unwrap()), ["ci/C"]);
        assert!(tree.next(&path("ci/C")).unwrap().is_empty());
    }

    #[test]
    fn test_next_descends_into_grouping_step() {
        let tree = load(
            r#"
name: ci
steps:
  - name: group
    steps:
      - script: echo one
      - script: echo two
  - name: after
    script: echo after
"#,
        )
        .unwrap();

        assert_eq!(paths(&tree.next(&path("ci/group")).unwrap()), ["ci/group/step-1"]);
        assert_eq!(
            paths(&tree.next(&path("ci/group/step-2")).unwrap()),
            ["ci/after"]
        );
        // skip bypasses the subtree entirely
        assert_eq!(paths(&tree.skip(&path("ci/group")).unwrap()), ["ci/after"]);
    }

    #[test]
    fn test_unknown_path_fails() {
        let tree = load("name: ci\nsteps:\n  - script: echo hi\n").unwrap();
        let missing = path("ci/nope");

        assert!(matches!(tree.get(&missing), Err(GraphError::NotFound(_))));
        assert!(matches!(tree.next(&missing), Err(GraphError::NotFound(_))));
        assert!(matches!(tree.skip(&missing), Err(GraphError::NotFound(_))));
        assert!(matches!(tree.post(&missing), Err(GraphError::NotFound(_))));
    }

    #[test]
    fn test_num_of_nodes_matches_distinct_paths() {
        let tree = load(
            r#"
name: ci
steps:
  - name: group
    steps:
      - script: echo one
  - script: echo two
"#,
        )
        .unwrap();

        let mut unique: std::collections::HashSet<String> = std::collections::HashSet::new();
        for node in tree.ordered() {
            unique.insert(node.path.to_string());
        }
        assert_eq!(tree.num_of_nodes(), unique.len());
        assert_eq!(tree.num_of_nodes(), 4);
    }

    #[test]
    fn test_ordered_places_tails_last_and_is_stable() {
        let tree = load(
            r#"
name: ci
steps:
  - name: cleanup
    tail: true
    script: ./cleanup.sh
  - name: build
    script: make
"#,
        )
        .unwrap();

        let first = paths(&tree.ordered());
        assert_eq!(first, ["ci", "ci/build", "ci/cleanup"]);
        assert_eq!(paths(&tree.ordered()), first);
    }

    #[test]
    fn test_ends_and_selectors() {
        let tree = load(
            r#"
name: ci
selector:
  tags: [linux]
steps:
  - name: build
    script: make
"#,
        )
        .unwrap();

        assert_eq!(paths(&tree.ends()), ["ci/build"]);
        assert_eq!(tree.selectors().len(), 1);
        assert!(tree.selectors()[0].tags.contains("linux"));
    }

    #[test]
    fn test_root_without_selector_contributes_default() {
        let tree = load("name: ci\nsteps:\n  - script: make\n").unwrap();
        assert_eq!(tree.selectors().len(), 1);
        assert!(tree.selectors()[0].is_empty());
    }
}
