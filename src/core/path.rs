//! Hierarchical node addresses

use crate::error::DocumentError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between path segments in the string form.
pub const PATH_SEPARATOR: char = '/';

/// Maximum number of segments in a path.
const MAX_DEPTH: usize = 10;

/// Maximum length of a single node name.
const MAX_NAME_LEN: usize = 100;

/// Characters that cannot appear in a node name.
const RESERVED: [char; 4] = ['*', ';', '.', PATH_SEPARATOR];

/// Check a single node name against the naming rules:
/// non-empty after trimming, at most 100 characters, and none of `* ; . /`.
pub fn is_valid_name(name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    !name.contains(&RESERVED[..])
}

/// The address of a node in a pipeline tree.
///
/// A path is an immutable, ordered sequence of name segments, e.g.
/// `flow/parallel-1/subflow-A/A`. Paths are the only stable node identifier
/// used across the engine; two paths are equal iff their segment sequences
/// are equal. The string form (segments joined by `/`) is usable as a map
/// key and is the serialized representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodePath {
    segments: Vec<String>,
}

impl NodePath {
    /// Build a path from one or more names or partial paths.
    ///
    /// Each input may itself contain `/`; it is split and every resulting
    /// segment is validated. Empty segments are dropped, so `"/flow"` and
    /// `"flow"` are the same path.
    pub fn new<I, S>(names_or_paths: I) -> Result<Self, DocumentError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut segments = Vec::new();
        for part in names_or_paths {
            for name in part.as_ref().split(PATH_SEPARATOR) {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                if !is_valid_name(name) {
                    return Err(DocumentError::InvalidName(name.to_string()));
                }
                segments.push(name.to_string());
            }
        }

        if segments.is_empty() {
            return Err(DocumentError::InvalidPath);
        }
        if segments.len() > MAX_DEPTH {
            return Err(DocumentError::PathTooDeep(MAX_DEPTH));
        }

        Ok(Self { segments })
    }

    /// Parse a path from its string form.
    pub fn parse(path: &str) -> Result<Self, DocumentError> {
        Self::new([path])
    }

    /// The path of a direct child of this node.
    pub fn child(&self, name: &str) -> Result<Self, DocumentError> {
        let name = name.trim();
        if !is_valid_name(name) {
            return Err(DocumentError::InvalidName(name.to_string()));
        }
        if self.segments.len() + 1 > MAX_DEPTH {
            return Err(DocumentError::PathTooDeep(MAX_DEPTH));
        }

        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    /// The last segment, i.e. the node's own name.
    pub fn name(&self) -> &str {
        self.segments.last().expect("path is never empty")
    }

    /// The parent path, or `None` for a root path.
    pub fn parent(&self) -> Option<NodePath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The root path (first segment only).
    pub fn root(&self) -> NodePath {
        Self {
            segments: vec![self.segments[0].clone()],
        }
    }

    /// Whether this path has a single segment.
    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The ordered segments of this path.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether this path is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        self.segments.len() < other.segments.len()
            && self.segments[..] == other.segments[..self.segments.len()]
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl TryFrom<String> for NodePath {
    type Error = DocumentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NodePath> for String {
    fn from(path: NodePath) -> Self {
        path.to_string()
    }
}
