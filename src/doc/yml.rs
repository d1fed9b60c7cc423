//! Document schema for pipeline flows
//!
//! These types mirror the YAML document shape one-to-one and serve as the
//! intermediate form between text and the built graph: `parse` produces a
//! validated [`FlowYml`], the graph builder consumes it, and the writer
//! reconstructs one from a graph for the edit/merge workflows.

use crate::core::node::{is_false, DockerOption, EnvMap, Selector};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Name given to a flow that does not declare one.
pub const DEFAULT_FLOW_NAME: &str = "flow";

/// Prefix for auto-generated step names.
pub const DEFAULT_STEP_PREFIX: &str = "step-";

/// Prefix for auto-generated parallel group names.
pub const DEFAULT_PARALLEL_PREFIX: &str = "parallel-";

/// Root document of a pipeline flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowYml {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerYml>,

    #[serde(default, skip_serializing_if = "EnvMap::is_empty")]
    pub envs: EnvMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerOption>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dockers: Vec<DockerOption>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepYml>,
}

impl FlowYml {
    /// The declared name, or the default.
    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_FLOW_NAME)
    }
}

/// Branch/tag allow-list patterns, root only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerYml {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// One step entry in a `steps` list.
///
/// A step is either a parallel group (only the `parallel` section set) or a
/// regular step; a regular step with nested `steps` is a sequential grouping
/// and cannot carry a plugin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepYml {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "EnvMap::is_empty")]
    pub envs: EnvMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<usize>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_failure: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub tail: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerOption>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dockers: Vec<DockerOption>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepYml>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<IndexMap<String, SubflowYml>>,
}

impl StepYml {
    /// Whether this entry declares a parallel group.
    pub fn is_parallel(&self) -> bool {
        self.parallel.is_some()
    }

    /// The resolved name for this step at the given 1-based sibling index.
    ///
    /// Parallel groups are always named from their index; regular steps use
    /// the declared name when present.
    pub fn effective_name(&self, index: usize) -> String {
        if self.is_parallel() {
            return format!("{}{}", DEFAULT_PARALLEL_PREFIX, index);
        }

        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}{}", DEFAULT_STEP_PREFIX, index),
        }
    }

    /// Whether any field other than the `parallel` section is set.
    pub fn has_step_fields(&self) -> bool {
        self.name.is_some()
            || !self.envs.is_empty()
            || self.condition.is_some()
            || self.before.is_some()
            || self.script.is_some()
            || self.plugin.is_some()
            || !self.exports.is_empty()
            || self.timeout.is_some()
            || self.retries.is_some()
            || self.allow_failure
            || self.tail
            || self.docker.is_some()
            || !self.dockers.is_empty()
            || !self.steps.is_empty()
    }
}

/// One branch of a parallel group, keyed by its name in the `parallel` map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubflowYml {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,

    #[serde(default, skip_serializing_if = "EnvMap::is_empty")]
    pub envs: EnvMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerOption>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dockers: Vec<DockerOption>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepYml>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_name_defaults() {
        let step = StepYml::default();
        assert_eq!(step.effective_name(1), "step-1");
        assert_eq!(step.effective_name(3), "step-3");

        let named = StepYml {
            name: Some("build".into()),
            ..Default::default()
        };
        assert_eq!(named.effective_name(1), "build");
    }

    #[test]
    fn test_parallel_name_ignores_index_name_conflict() {
        let step = StepYml {
            parallel: Some(IndexMap::new()),
            ..Default::default()
        };
        assert!(step.is_parallel());
        assert_eq!(step.effective_name(2), "parallel-2");
    }

    #[test]
    fn test_has_step_fields() {
        let mut step = StepYml::default();
        assert!(!step.has_step_fields());

        step.script = Some("make".into());
        assert!(step.has_step_fields());
    }

    #[test]
    fn test_flow_name_defaults() {
        let flow = FlowYml::default();
        assert_eq!(flow.effective_name(), "flow");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let result: Result<FlowYml, _> = serde_yaml::from_str("name: ci\nbogus: 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_step_decoding() {
        let yaml = r#"
name: build
envs:
  CC: clang
script: make all
exports: [VERSION]
allow_failure: true
"#;
        let step: StepYml = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.name.as_deref(), Some("build"));
        assert_eq!(step.envs.get("CC").map(String::as_str), Some("clang"));
        assert!(step.allow_failure);
        assert!(!step.tail);
    }
}
