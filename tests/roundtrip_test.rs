//! Document round-trip and serialization integration tests

use flowtree::{build, load, merge, parse, to_document, DocumentError, NodeKind};
use std::collections::HashSet;

const FULL_FLOW: &str = r#"
name: ci
cron: "0 4 * * *"
selector:
  tags: [linux, docker]
trigger:
  branches: ["master", "release/.*"]
  tags: ["v.*"]
envs:
  WORKSPACE: /ci
  VERSION: "1"
docker:
  image: ubuntu:22.04
steps:
  - name: prepare
    envs:
      VERSION: "2"
    before: ./setup.sh
    script: make prepare
    exports: [GIT_SHA, VERSION]
    timeout: 3600
    retries: 2
  - parallel:
      unit:
        selector:
          tags: [fast]
        steps:
          - name: run
            script: make test
            allow_failure: true
      integration:
        steps:
          - name: run
            script: make integration
            dockers:
              - image: rust:1.79
                is_runtime: true
              - image: postgres:16
                command: [postgres]
                environment:
                  POSTGRES_PASSWORD: ci
  - name: package
    plugin: docker-push
  - name: notify
    tail: true
    script: ./notify.sh
"#;

#[test]
fn test_round_trip_preserves_tree() {
    let first = build(&parse(FULL_FLOW).unwrap()).unwrap();
    let text = to_document(&first).unwrap();
    let second = build(&parse(&text).unwrap()).unwrap();

    assert_eq!(first.len(), second.len());

    let first_paths: HashSet<String> = first.nodes().map(|n| n.path.to_string()).collect();
    let second_paths: HashSet<String> = second.nodes().map(|n| n.path.to_string()).collect();
    assert_eq!(first_paths, second_paths);

    for (a, b) in first.nodes().zip(second.nodes()) {
        assert_eq!(a.path, b.path);
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.envs, b.envs);
        assert_eq!(a.merged_envs, b.merged_envs);
        assert_eq!(a.dockers, b.dockers);
        assert_eq!(a.selector, b.selector);
        assert_eq!(a.exports, b.exports);
        assert_eq!(a.plugin, b.plugin);
        assert_eq!(a.script, b.script);
        assert_eq!(a.before, b.before);
        assert_eq!(a.timeout, b.timeout);
        assert_eq!(a.retries, b.retries);
        assert_eq!(a.allow_failure, b.allow_failure);
        assert_eq!(a.cron, b.cron);
    }
}

#[test]
fn test_round_trip_traversal_is_identical() {
    let first = load(FULL_FLOW).unwrap();
    let text = to_document(first.graph()).unwrap();
    let second = load(&text).unwrap();

    assert_eq!(first.num_of_nodes(), second.num_of_nodes());
    assert_eq!(first.selectors(), second.selectors());

    let first_order: Vec<String> = first.ordered().iter().map(|n| n.path.to_string()).collect();
    let second_order: Vec<String> = second.ordered().iter().map(|n| n.path.to_string()).collect();
    assert_eq!(first_order, second_order);

    for node in first.ordered() {
        let a: Vec<String> = first
            .next(&node.path)
            .unwrap()
            .iter()
            .map(|n| n.path.to_string())
            .collect();
        let b: Vec<String> = second
            .next(&node.path)
            .unwrap()
            .iter()
            .map(|n| n.path.to_string())
            .collect();
        assert_eq!(a, b, "next() diverged at {}", node.path);
    }
}

#[test]
fn test_path_uniqueness() {
    let tree = load(FULL_FLOW).unwrap();

    let unique: HashSet<String> = tree
        .ordered()
        .iter()
        .map(|n| n.path.to_string())
        .collect();
    assert_eq!(unique.len(), tree.num_of_nodes());
}

#[test]
fn test_default_root_name_round_trips() {
    let tree = load("steps:\n  - script: make\n").unwrap();
    assert_eq!(tree.root().name, "flow");

    let text = to_document(tree.graph()).unwrap();
    let again = load(&text).unwrap();
    assert_eq!(again.root().name, "flow");
    assert_eq!(again.num_of_nodes(), tree.num_of_nodes());
}

#[test]
fn test_nodes_serialize_to_json() {
    let tree = load(FULL_FLOW).unwrap();

    let json = serde_json::to_value(tree.root()).unwrap();
    assert_eq!(json["path"], "ci");
    assert_eq!(json["kind"], "flow");
    assert_eq!(json["envs"]["WORKSPACE"], "/ci");

    let parallel = tree
        .ordered()
        .into_iter()
        .find(|n| n.kind == NodeKind::Parallel)
        .unwrap();
    let json = serde_json::to_value(parallel).unwrap();
    assert_eq!(json["kind"], "parallel");
    assert_eq!(json["children"].as_array().unwrap().len(), 2);
}

#[test]
fn test_merge_then_load() {
    let primary = r#"
name: ci
steps:
  - name: build
    script: make
"#;
    let secondary = r#"
steps:
  - name: deploy
    script: ./deploy.sh
  - parallel:
      smoke:
        steps:
          - script: ./smoke.sh
"#;

    let merged = merge(primary, secondary).unwrap();
    let tree = load(&merged).unwrap();

    assert_eq!(tree.root().name, "ci");
    // root, build, deploy, parallel-3, smoke, smoke/step-1
    assert_eq!(tree.num_of_nodes(), 6);
    assert!(tree
        .ordered()
        .iter()
        .any(|n| n.path.to_string() == "ci/parallel-3/smoke/step-1"));
}

#[test]
fn test_merge_collision_keeps_error_type() {
    let primary = "name: ci\nsteps:\n  - name: build\n    script: make\n";
    let secondary = "steps:\n  - name: build\n    script: make\n";

    assert!(matches!(
        merge(primary, secondary),
        Err(DocumentError::DuplicateElement(_))
    ));
}
