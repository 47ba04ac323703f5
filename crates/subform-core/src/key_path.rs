//! Stable addresses for values inside the settings document.
//!
//! A [`KeyPath`] is the string key a control binds to, e.g.
//! `settings-general-subfolder`. Segments are separated by [`SEPARATOR`] and
//! walk the nested document from its root.
//!
//! # Design Invariants
//!
//! 1. **Identity is textual**: two key paths are equal iff their canonical
//!    strings are equal. Any two bindings constructed from the same string
//!    address the same value.
//!
//! 2. **No empty segments**: `a--b`, `-a` and `a-` are rejected at parse time,
//!    so every key path maps to exactly one tree location.
//!
//! 3. **Cheap to clone**: the canonical text is shared (`Arc<str>`), so key
//!    paths can be copied into requests, overlay entries and subscriptions
//!    freely and sent to a persistence worker thread.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Empty path | `""` | `KeyPathError::Empty` |
//! | Empty segment | `a--b` | `KeyPathError::EmptySegment` |
//! | Separator inside a segment | `from_segments(&["a-b"])` | `KeyPathError::SeparatorInSegment` |

use core::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Segment separator in the textual form of a key path.
pub const SEPARATOR: char = '-';

const SEPARATOR_STR: &str = "-";

/// Errors from key path construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPathError {
    /// The path text was empty.
    Empty,
    /// A segment between two separators was empty.
    EmptySegment { path: String, index: usize },
    /// A segment passed to [`KeyPath::from_segments`] contained the separator.
    SeparatorInSegment(String),
}

impl fmt::Display for KeyPathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "key path is empty"),
            Self::EmptySegment { path, index } => {
                write!(f, "key path '{path}' has an empty segment at index {index}")
            }
            Self::SeparatorInSegment(segment) => {
                write!(f, "segment '{segment}' contains the '{SEPARATOR}' separator")
            }
        }
    }
}

impl std::error::Error for KeyPathError {}

/// Address of one value inside the settings document.
///
/// ```
/// # use subform_core::key_path::KeyPath;
/// let key: KeyPath = "settings-general-subfolder".parse().unwrap();
/// assert_eq!(key.namespace(), "settings");
/// assert_eq!(key.field(), "subfolder");
/// assert_eq!(key.segments().count(), 3);
///
/// let built = KeyPath::from_segments(&["settings", "general", "subfolder"]).unwrap();
/// assert_eq!(built, key);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath {
    text: Arc<str>,
}

impl KeyPath {
    /// Parse a key path from its dashed text form.
    pub fn parse(text: &str) -> Result<Self, KeyPathError> {
        if text.is_empty() {
            return Err(KeyPathError::Empty);
        }
        if let Some(index) = text.split(SEPARATOR).position(str::is_empty) {
            return Err(KeyPathError::EmptySegment {
                path: text.to_owned(),
                index,
            });
        }
        Ok(Self { text: text.into() })
    }

    /// Build a key path from individual segments.
    pub fn from_segments(segments: &[&str]) -> Result<Self, KeyPathError> {
        if segments.is_empty() {
            return Err(KeyPathError::Empty);
        }
        for (index, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                return Err(KeyPathError::EmptySegment {
                    path: segments.join(SEPARATOR_STR),
                    index,
                });
            }
            if segment.contains(SEPARATOR) {
                return Err(KeyPathError::SeparatorInSegment((*segment).to_owned()));
            }
        }
        Ok(Self {
            text: segments.join(SEPARATOR_STR).into(),
        })
    }

    /// Key path from a literal declared in code.
    ///
    /// # Panics
    ///
    /// Panics if `text` is not a valid key path. Page declarations are static
    /// data, so a malformed literal is a programming error.
    #[must_use]
    pub fn from_static(text: &'static str) -> Self {
        match Self::parse(text) {
            Ok(key) => key,
            Err(err) => panic!("invalid key path literal: {err}"),
        }
    }

    /// Canonical dashed text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Iterate the segments from the document root.
    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.text.split(SEPARATOR)
    }

    /// First segment (e.g. `settings`, `subzero`).
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.segments().next().unwrap_or_default()
    }

    /// Last segment, the leaf field name.
    #[must_use]
    pub fn field(&self) -> &str {
        self.text.rsplit(SEPARATOR).next().unwrap_or_default()
    }

    /// Append a segment, returning a new key path.
    pub fn child(&self, segment: &str) -> Result<Self, KeyPathError> {
        let mut parts: Vec<&str> = self.segments().collect();
        parts.push(segment);
        Self::from_segments(&parts)
    }

    /// Whether `self` equals `prefix` or lies underneath it.
    #[must_use]
    pub fn starts_with(&self, prefix: &KeyPath) -> bool {
        let mut mine = self.segments();
        prefix.segments().all(|p| mine.next() == Some(p))
    }
}

impl FromStr for KeyPath {
    type Err = KeyPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for KeyPath {
    type Error = KeyPathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPath({})", self.text)
    }
}

impl Serialize for KeyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for KeyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_segments() {
        let key = KeyPath::parse("settings-general-hi_extension").unwrap();
        let segments: Vec<_> = key.segments().collect();
        assert_eq!(segments, vec!["settings", "general", "hi_extension"]);
        assert_eq!(key.namespace(), "settings");
        assert_eq!(key.field(), "hi_extension");
    }

    #[test]
    fn parse_single_segment() {
        let key = KeyPath::parse("flag").unwrap();
        assert_eq!(key.namespace(), "flag");
        assert_eq!(key.field(), "flag");
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(KeyPath::parse(""), Err(KeyPathError::Empty));
    }

    #[test]
    fn parse_rejects_empty_segments() {
        assert!(matches!(
            KeyPath::parse("settings--subfolder"),
            Err(KeyPathError::EmptySegment { index: 1, .. })
        ));
        assert!(KeyPath::parse("-settings").is_err());
        assert!(KeyPath::parse("settings-").is_err());
    }

    #[test]
    fn from_segments_matches_parse() {
        let a = KeyPath::from_segments(&["subzero", "remove_HI"]).unwrap();
        let b = KeyPath::parse("subzero-remove_HI").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "subzero-remove_HI");
    }

    #[test]
    fn from_segments_rejects_separator() {
        assert_eq!(
            KeyPath::from_segments(&["settings", "anti-captcha"]),
            Err(KeyPathError::SeparatorInSegment("anti-captcha".into()))
        );
    }

    #[test]
    fn from_segments_rejects_empty_list() {
        assert_eq!(KeyPath::from_segments(&[]), Err(KeyPathError::Empty));
    }

    #[test]
    #[should_panic(expected = "invalid key path literal")]
    fn from_static_panics_on_bad_literal() {
        let _ = KeyPath::from_static("bad--key");
    }

    #[test]
    fn child_appends_segment() {
        let base = KeyPath::parse("settings-subsync").unwrap();
        let key = base.child("debug").unwrap();
        assert_eq!(key.as_str(), "settings-subsync-debug");
        assert!(key.starts_with(&base));
        assert!(!base.starts_with(&key));
    }

    #[test]
    fn starts_with_respects_segment_boundaries() {
        let key = KeyPath::parse("settings-general_extra-x").unwrap();
        let prefix = KeyPath::parse("settings-general").unwrap();
        assert!(!key.starts_with(&prefix));
    }

    #[test]
    fn clones_compare_equal_and_hash_equal() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let a = KeyPath::parse("settings-general-skip_hashing").unwrap();
        let b = a.clone();
        let hash = |key: &KeyPath| {
            let mut h = DefaultHasher::new();
            key.hash(&mut h);
            h.finish()
        };
        assert_eq!(a, b);
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn serde_uses_text_form() {
        let key = KeyPath::parse("settings-general-chmod").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"settings-general-chmod\"");
        let back: KeyPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<KeyPath>("\"a--b\"").is_err());
    }

    #[test]
    fn debug_format() {
        let key = KeyPath::parse("settings-general-chmod").unwrap();
        assert_eq!(format!("{key:?}"), "KeyPath(settings-general-chmod)");
    }
}
