//! Reconstructing documents from a built graph
//!
//! The writer inverts the parser: rebuilding a document from a graph, then
//! parsing and building it again, yields a structurally equivalent tree.
//! `merge` appends one document's steps onto another for the edit workflows.

use crate::core::graph::Graph;
use crate::core::node::{DockerOption, Node, NodeKind};
use crate::doc::parser;
use crate::doc::yml::{FlowYml, StepYml, SubflowYml, TriggerYml};
use crate::error::DocumentError;
use indexmap::IndexMap;

/// Serialize a graph back into document text.
pub fn to_document(graph: &Graph) -> Result<String, DocumentError> {
    let flow = flow_of(graph);
    serde_yaml::to_string(&flow).map_err(Into::into)
}

/// Append the secondary document's steps onto the primary's.
///
/// The combined document is re-validated, so a sibling-name collision
/// surfaces as [`DocumentError::DuplicateElement`]. Auto-named steps of the
/// secondary document are renumbered by their new positions.
pub fn merge(primary: &str, secondary: &str) -> Result<String, DocumentError> {
    let mut merged = parser::parse(primary)?;
    let other = parser::parse(secondary)?;

    merged.steps.extend(other.steps);
    parser::validate(&merged)?;

    serde_yaml::to_string(&merged).map_err(Into::into)
}

fn flow_of(graph: &Graph) -> FlowYml {
    let root = graph.root();
    FlowYml {
        name: Some(root.name.clone()),
        cron: root.cron.clone(),
        selector: root.selector.clone(),
        trigger: root.trigger.as_ref().map(|t| TriggerYml {
            branches: t.branches.clone(),
            tags: t.tags.clone(),
        }),
        envs: root.envs.clone(),
        condition: root.condition.clone(),
        docker: single_docker(root),
        dockers: docker_list(root),
        steps: steps_of(graph, root),
    }
}

fn steps_of(graph: &Graph, node: &Node) -> Vec<StepYml> {
    node.children
        .iter()
        .map(|child| step_of(graph, graph.node(*child)))
        .collect()
}

fn step_of(graph: &Graph, node: &Node) -> StepYml {
    if node.kind == NodeKind::Parallel {
        let mut parallel = IndexMap::new();
        for child in &node.children {
            let sub = graph.node(*child);
            parallel.insert(
                sub.name.clone(),
                SubflowYml {
                    selector: sub.selector.clone(),
                    envs: sub.envs.clone(),
                    condition: sub.condition.clone(),
                    docker: single_docker(sub),
                    dockers: docker_list(sub),
                    steps: steps_of(graph, sub),
                },
            );
        }
        return StepYml {
            parallel: Some(parallel),
            ..Default::default()
        };
    }

    StepYml {
        name: Some(node.name.clone()),
        envs: node.envs.clone(),
        condition: node.condition.clone(),
        before: node.before.clone(),
        script: node.script.clone(),
        plugin: node.plugin.clone(),
        exports: node.exports.iter().cloned().collect(),
        timeout: node.timeout,
        retries: node.retries,
        allow_failure: node.allow_failure,
        tail: node.kind == NodeKind::Post,
        docker: single_docker(node),
        dockers: docker_list(node),
        steps: steps_of(graph, node),
        parallel: None,
    }
}

fn single_docker(node: &Node) -> Option<DockerOption> {
    match node.dockers.as_slice() {
        [only] if only.is_runtime => Some(only.clone()),
        _ => None,
    }
}

fn docker_list(node: &Node) -> Vec<DockerOption> {
    match single_docker(node) {
        Some(_) => Vec::new(),
        None => node.dockers.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::build;
    use crate::doc::parse;
    use crate::error::DocumentError;

    fn rebuild(yaml: &str) -> (Graph, Graph) {
        let first = build(&parse(yaml).unwrap()).unwrap();
        let text = to_document(&first).unwrap();
        let second = build(&parse(&text).unwrap()).unwrap();
        (first, second)
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let (first, second) = rebuild(
            r#"
name: ci
envs:
  WORKSPACE: /ci
steps:
  - name: build
    envs:
      CC: clang
    script: make all
    exports: [VERSION]
  - script: make check
  - name: cleanup
    tail: true
    script: ./cleanup.sh
"#,
        );

        assert_eq!(first.len(), second.len());
        for (a, b) in first.nodes().zip(second.nodes()) {
            assert_eq!(a.path, b.path);
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.envs, b.envs);
            assert_eq!(a.exports, b.exports);
            assert_eq!(a.allow_failure, b.allow_failure);
            assert_eq!(a.script, b.script);
        }
    }

    #[test]
    fn test_round_trip_parallel_and_dockers() {
        let (first, second) = rebuild(
            r#"
name: ci
docker:
  image: ubuntu:22.04
steps:
  - parallel:
      ios:
        selector:
          tags: [mac]
        steps:
          - script: xcodebuild
      android:
        steps:
          - script: ./gradlew build
            dockers:
              - image: openjdk:17
                is_runtime: true
              - image: redis:7
                command: [redis-server]
  - name: publish
    script: ./publish.sh
"#,
        );

        assert_eq!(first.len(), second.len());
        for (a, b) in first.nodes().zip(second.nodes()) {
            assert_eq!(a.path, b.path);
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.dockers, b.dockers);
            assert_eq!(a.selector, b.selector);
        }
    }

    #[test]
    fn test_merge_appends_steps() {
        let primary = "name: ci\nsteps:\n  - name: build\n    script: make\n";
        let secondary = "name: extra\nsteps:\n  - name: deploy\n    script: ./deploy.sh\n";

        let merged = merge(primary, secondary).unwrap();
        let flow = parse(&merged).unwrap();

        assert_eq!(flow.effective_name(), "ci");
        assert_eq!(flow.steps.len(), 2);
        assert_eq!(flow.steps[1].name.as_deref(), Some("deploy"));
    }

    #[test]
    fn test_merge_rejects_name_collision() {
        let primary = "name: ci\nsteps:\n  - name: build\n    script: make\n";
        let secondary = "name: extra\nsteps:\n  - name: build\n    script: make again\n";

        assert!(matches!(
            merge(primary, secondary),
            Err(DocumentError::DuplicateElement(_))
        ));
    }

    #[test]
    fn test_written_document_keeps_trigger_and_cron() {
        let graph = build(
            &parse(
                r#"
name: ci
cron: "0 4 * * *"
trigger:
  branches: ["master"]
  tags: ["v.*"]
steps:
  - script: make
"#,
            )
            .unwrap(),
        )
        .unwrap();

        let text = to_document(&graph).unwrap();
        let flow = parse(&text).unwrap();

        assert_eq!(flow.cron.as_deref(), Some("0 4 * * *"));
        let trigger = flow.trigger.unwrap();
        assert_eq!(trigger.branches, vec!["master"]);
        assert_eq!(trigger.tags, vec!["v.*"]);
    }
}
