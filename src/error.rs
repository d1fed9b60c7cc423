//! Error types for document parsing and graph traversal

use thiserror::Error;

/// Error raised while parsing or building a pipeline document.
///
/// Parsing and building are atomic: any of these errors means no graph was
/// produced. The caller is expected to reject the document and surface the
/// message to the user; nothing here is retryable.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// A flow, step or subflow name failed the node-name rules.
    #[error("invalid name '{0}'")]
    InvalidName(String),

    /// Two sibling steps resolved to the same name.
    #[error("duplicate name '{0}' among sibling steps")]
    DuplicateElement(String),

    /// A step declares a plugin but also nested steps.
    #[error("the plugin section is not allowed on the step '{0}' with sub steps")]
    PluginOnParent(String),

    /// A post step declares nested steps; post steps must be leaves.
    #[error("the tail flag is not allowed on the step '{0}' with sub steps")]
    TailOnParent(String),

    /// A parallel step carries step fields other than the parallel section.
    #[error("the parallel section must be the only field on step '{0}'")]
    ParallelSectionOnly(String),

    /// A parallel section with no subflows.
    #[error("the parallel section of step '{0}' must define at least one subflow")]
    EmptyParallel(String),

    /// Both `docker` and `dockers` declared on the same node.
    #[error("only one of 'docker' or 'dockers' is accepted on '{0}'")]
    DuplicateDockerSection(String),

    /// The runtime container carries an explicit command.
    #[error("the 'command' section cannot be applied to the runtime container")]
    RuntimeWithCommand,

    /// A `dockers` list without any entry marked `is_runtime`.
    #[error("'is_runtime' must be defined on one container")]
    MissingRuntimeFlag,

    /// A `dockers` list with more than one entry marked `is_runtime`.
    #[error("'is_runtime' can only be defined once")]
    MultipleRuntimeFlags,

    /// A node path built from an empty segment list.
    #[error("empty node path is not allowed")]
    InvalidPath,

    /// A node path deeper than the supported limit.
    #[error("node path over the depth limit of {0}")]
    PathTooDeep(usize),

    /// A trigger branch/tag pattern that does not compile as a regex.
    #[error("invalid trigger pattern '{pattern}': {source}")]
    InvalidTriggerPattern {
        pattern: String,
        source: regex::Error,
    },

    /// The document is not structurally valid YAML for the flow schema.
    #[error("malformed document: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Error raised by traversal queries on a built tree.
///
/// `NotFound` means the caller holds a path from a stale tree revision and
/// must resynchronize; the tree itself is still consistent.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The queried path is not present in the tree index.
    #[error("the node path '{0}' doesn't exist")]
    NotFound(String),
}
