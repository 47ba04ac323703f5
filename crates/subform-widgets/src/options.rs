#![forbid(unsafe_code)]

//! Option lists for selector controls.
//!
//! Option content is data supplied by the page declaration: an ordered list of
//! `{value, label}` pairs. The engine only checks membership and keeps order.

use std::rc::Rc;

/// One selectable choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    /// Identifier written to the settings document.
    pub value: String,
    /// Human-readable label.
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Ordered, immutable set of options. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionSet {
    options: Rc<[SelectOption]>,
}

impl OptionSet {
    #[must_use]
    pub fn new(options: Vec<SelectOption>) -> Self {
        Self {
            options: options.into(),
        }
    }

    /// Build from `(value, label)` pairs.
    #[must_use]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        pairs
            .iter()
            .map(|(value, label)| SelectOption::new(*value, *label))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectOption> {
        self.options.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.options.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Whether `value` is one of the declared identifiers.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.options.iter().any(|option| option.value == value)
    }

    /// Label for `value`, if declared.
    #[must_use]
    pub fn label_of(&self, value: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|option| option.value == value)
            .map(|option| option.label.as_str())
    }

    /// Declared identifiers in order.
    #[must_use]
    pub fn values(&self) -> Vec<&str> {
        self.options.iter().map(|option| option.value.as_str()).collect()
    }
}

impl FromIterator<SelectOption> for OptionSet {
    fn from_iter<I: IntoIterator<Item = SelectOption>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_order() {
        let set = OptionSet::from_pairs(&[("hi", "hi"), ("cc", "cc"), ("sdh", "sdh")]);
        assert_eq!(set.len(), 3);
        assert!(set.contains("cc"));
        assert!(!set.contains("srt"));
        assert_eq!(set.label_of("sdh"), Some("sdh"));
        assert_eq!(set.values(), vec!["hi", "cc", "sdh"]);
    }

    #[test]
    fn empty_set() {
        let set = OptionSet::default();
        assert!(set.is_empty());
        assert_eq!(set.label_of("x"), None);
    }
}
