//! Committed settings document.
//!
//! The document is a nested tree: branches are named sections, leaves are
//! [`SettingValue`]s. A [`KeyPath`] walks it segment by segment from the root,
//! so `settings-general-subfolder` addresses `root.settings.general.subfolder`.
//!
//! # Invariants
//!
//! 1. **Single location per key**: a key path resolves to at most one leaf.
//!    A leaf never has children; writing through a leaf is an error, not an
//!    implicit overwrite.
//!
//! 2. **Deterministic iteration**: branches are `BTreeMap`s, so
//!    [`SettingsDocument::leaves`] and JSON export are ordered by key. Nothing
//!    in the engine relies on this order for semantics (the modification
//!    registry uses its own declaration order).
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Missing key | Never written | `get` returns `None` |
//! | Leaf in path | `a-b` is a leaf, write `a-b-c` | `DocumentError::LeafInPath` |
//! | Branch at key | `a` is a section, write `a` | `DocumentError::BranchAtKey` |
//! | Bad JSON leaf | Object inside an array, etc. | `DocumentError::Unsupported` |

use core::fmt;
use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::key_path::KeyPath;
use crate::value::{SettingValue, UnsupportedValue};

/// Errors from document mutation and JSON import.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// An intermediate segment of the key is already a leaf value.
    LeafInPath { key: KeyPath, segment: String },
    /// The key addresses a section, not a leaf.
    BranchAtKey(KeyPath),
    /// A JSON value could not be represented.
    Unsupported { path: String, source: UnsupportedValue },
    /// The JSON root was not an object.
    RootNotObject,
    /// The namespace under which JSON is mounted is not a valid segment.
    InvalidNamespace(String),
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeafInPath { key, segment } => {
                write!(f, "cannot write '{key}': '{segment}' is a value, not a section")
            }
            Self::BranchAtKey(key) => write!(f, "'{key}' is a section, not a value"),
            Self::Unsupported { path, source } => write!(f, "{path}: {source}"),
            Self::RootNotObject => write!(f, "settings JSON root must be an object"),
            Self::InvalidNamespace(ns) => write!(f, "invalid document namespace '{ns}'"),
        }
    }
}

impl std::error::Error for DocumentError {}

#[derive(Clone, Debug, PartialEq)]
enum Node {
    Leaf(SettingValue),
    Branch(BTreeMap<String, Node>),
}

/// Nested key-value tree mirroring the persisted configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SettingsDocument {
    root: BTreeMap<String, Node>,
}

impl SettingsDocument {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a backend JSON object under `namespace`.
    ///
    /// ```
    /// # use subform_core::document::SettingsDocument;
    /// # use subform_core::key_path::KeyPath;
    /// # use subform_core::value::SettingValue;
    /// let json = serde_json::json!({ "general": { "subfolder": "current" } });
    /// let doc = SettingsDocument::from_json("settings", &json).unwrap();
    /// let key = KeyPath::parse("settings-general-subfolder").unwrap();
    /// assert_eq!(doc.get(&key), Some(&SettingValue::from("current")));
    /// ```
    pub fn from_json(namespace: &str, json: &Value) -> Result<Self, DocumentError> {
        let Value::Object(map) = json else {
            return Err(DocumentError::RootNotObject);
        };
        let ns = KeyPath::parse(namespace)
            .ok()
            .filter(|key| key.segments().count() == 1)
            .ok_or_else(|| DocumentError::InvalidNamespace(namespace.to_owned()))?;
        let mut root = BTreeMap::new();
        root.insert(
            ns.as_str().to_owned(),
            Node::Branch(branch_from_json(ns.as_str(), map)?),
        );
        Ok(Self { root })
    }

    /// Export the subtree under `namespace` as a JSON object.
    ///
    /// Returns an empty object when the namespace holds nothing.
    #[must_use]
    pub fn to_json(&self, namespace: &str) -> Value {
        match self.root.get(namespace) {
            Some(Node::Branch(children)) => branch_to_json(children),
            Some(Node::Leaf(value)) => value.to_json(),
            None => Value::Object(Map::new()),
        }
    }

    /// Look up a leaf value.
    #[must_use]
    pub fn get(&self, key: &KeyPath) -> Option<&SettingValue> {
        let mut segments = key.segments();
        let mut node = self.root.get(segments.next()?)?;
        for segment in segments {
            match node {
                Node::Branch(children) => node = children.get(segment)?,
                Node::Leaf(_) => return None,
            }
        }
        match node {
            Node::Leaf(value) => Some(value),
            Node::Branch(_) => None,
        }
    }

    /// Whether `key` holds a leaf value.
    #[must_use]
    pub fn contains(&self, key: &KeyPath) -> bool {
        self.get(key).is_some()
    }

    /// Write a leaf value, creating intermediate sections as needed.
    ///
    /// Returns the previous value at `key`, if any.
    pub fn set(
        &mut self,
        key: &KeyPath,
        value: SettingValue,
    ) -> Result<Option<SettingValue>, DocumentError> {
        let segments: Vec<&str> = key.segments().collect();
        let Some((last, parents)) = segments.split_last() else {
            return Ok(None);
        };
        let mut branch = &mut self.root;
        for segment in parents {
            let node = branch
                .entry((*segment).to_owned())
                .or_insert_with(|| Node::Branch(BTreeMap::new()));
            branch = match node {
                Node::Branch(children) => children,
                Node::Leaf(_) => {
                    return Err(DocumentError::LeafInPath {
                        key: key.clone(),
                        segment: (*segment).to_owned(),
                    });
                }
            };
        }
        match branch.get_mut(*last) {
            Some(Node::Branch(_)) => Err(DocumentError::BranchAtKey(key.clone())),
            Some(Node::Leaf(existing)) => Ok(Some(std::mem::replace(existing, value))),
            None => {
                branch.insert((*last).to_owned(), Node::Leaf(value));
                Ok(None)
            }
        }
    }

    /// Remove a leaf value. Empty sections left behind are kept.
    pub fn remove(&mut self, key: &KeyPath) -> Option<SettingValue> {
        let segments: Vec<&str> = key.segments().collect();
        let (last, parents) = segments.split_last()?;
        let mut branch = &mut self.root;
        for segment in parents {
            branch = match branch.get_mut(*segment)? {
                Node::Branch(children) => children,
                Node::Leaf(_) => return None,
            };
        }
        if !matches!(branch.get(*last)?, Node::Leaf(_)) {
            return None;
        }
        match branch.remove(*last) {
            Some(Node::Leaf(value)) => Some(value),
            _ => None,
        }
    }

    /// All leaves in key order.
    #[must_use]
    pub fn leaves(&self) -> Vec<(KeyPath, &SettingValue)> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        collect_leaves(&self.root, &mut prefix, &mut out);
        out
    }

    /// Number of leaf values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves().len()
    }

    /// Whether the document holds no leaf values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn collect_leaves<'a>(
    branch: &'a BTreeMap<String, Node>,
    prefix: &mut Vec<&'a str>,
    out: &mut Vec<(KeyPath, &'a SettingValue)>,
) {
    for (name, node) in branch {
        prefix.push(name);
        match node {
            Node::Leaf(value) => {
                // Segment names come from validated keys or JSON object keys;
                // JSON keys containing the separator are not addressable.
                if let Ok(key) = KeyPath::from_segments(prefix) {
                    out.push((key, value));
                }
            }
            Node::Branch(children) => collect_leaves(children, prefix, out),
        }
        prefix.pop();
    }
}

fn branch_from_json(
    path: &str,
    map: &Map<String, Value>,
) -> Result<BTreeMap<String, Node>, DocumentError> {
    let mut out = BTreeMap::new();
    for (name, value) in map {
        let child_path = format!("{path}.{name}");
        let node = match value {
            Value::Object(children) => Node::Branch(branch_from_json(&child_path, children)?),
            leaf => Node::Leaf(SettingValue::from_json(leaf).map_err(|source| {
                DocumentError::Unsupported {
                    path: child_path.clone(),
                    source,
                }
            })?),
        };
        out.insert(name.clone(), node);
    }
    Ok(out)
}

fn branch_to_json(branch: &BTreeMap<String, Node>) -> Value {
    let mut map = Map::new();
    for (name, node) in branch {
        let value = match node {
            Node::Leaf(value) => value.to_json(),
            Node::Branch(children) => branch_to_json(children),
        };
        map.insert(name.clone(), value);
    }
    Value::Object(map)
}
