//! Named load/save value transforms.
//!
//! A binding may carry one load transform (stored value to display value) and
//! one save transform (display value to stored value). Both are pure: they read
//! at most the resolver view they are handed and never write.
//!
//! # Invariants
//!
//! 1. **Idempotent cycles**: a value produced by [`Transforms::save`] survives
//!    any number of display/save cycles without a user edit. The save
//!    direction never yields a value the load direction would substitute.
//!
//! 2. **Absent means `None` or `Null`**: the backend sends explicit nulls for
//!    unset options, so load transforms treat both alike.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Stored toggle is not boolean-like | `"maybe"` under a list-derived toggle | `TransformError::Unexpected`; pipeline falls back to the raw value |
//! | List key holds a non-list | Number under `subzero_mods` | `TransformError::NotAList`; pipeline falls back |

use core::fmt;

use crate::key_path::KeyPath;
use crate::resolve::Resolve;
use crate::value::SettingValue;

/// Malformed input to a transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The referenced list key holds something that is not a list.
    NotAList { key: KeyPath, kind: &'static str },
    /// The stored value has the wrong shape for the transform.
    Unexpected {
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAList { key, kind } => {
                write!(f, "'{key}' should hold a list, found {kind}")
            }
            Self::Unexpected { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
        }
    }
}

impl std::error::Error for TransformError {}

fn is_absent(value: Option<&SettingValue>) -> bool {
    value.is_none_or(SettingValue::is_null)
}

/// Stored-to-display transform.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadTransform {
    /// Substitute a value when nothing is stored.
    DefaultIfAbsent(SettingValue),
    /// Toggle derived from membership of `item` in the list at `list`.
    ///
    /// A value stored under the bound key itself wins over the list.
    ListContains { list: KeyPath, item: String },
    /// Choice derived from the first list item starting with `prefix`.
    ListItemWithPrefix { list: KeyPath, prefix: String },
}

impl LoadTransform {
    /// Apply to the value stored under the bound key.
    pub fn apply(
        &self,
        stored: Option<&SettingValue>,
        view: &dyn Resolve,
    ) -> Result<Option<SettingValue>, TransformError> {
        match self {
            Self::DefaultIfAbsent(default) => {
                if is_absent(stored) {
                    Ok(Some(default.clone()))
                } else {
                    Ok(stored.cloned())
                }
            }
            Self::ListContains { list, item } => {
                if let Some(value) = stored.filter(|v| !v.is_null()) {
                    return value
                        .coerce_bool()
                        .map(|b| Some(SettingValue::Bool(b)))
                        .ok_or(TransformError::Unexpected {
                            expected: "boolean",
                            found: value.kind(),
                        });
                }
                let items = read_list(list, view)?;
                Ok(Some(SettingValue::Bool(items.iter().any(|i| i == item))))
            }
            Self::ListItemWithPrefix { list, prefix } => {
                if let Some(value) = stored.filter(|v| !v.is_null()) {
                    return Ok(Some(value.clone()));
                }
                let items = read_list(list, view)?;
                Ok(items
                    .into_iter()
                    .find(|i| i.starts_with(prefix.as_str()))
                    .map(SettingValue::Text))
            }
        }
    }

    /// Keys this transform reads besides the bound key.
    #[must_use]
    pub fn dependencies(&self) -> Option<&KeyPath> {
        match self {
            Self::DefaultIfAbsent(_) => None,
            Self::ListContains { list, .. } | Self::ListItemWithPrefix { list, .. } => Some(list),
        }
    }
}

fn read_list(key: &KeyPath, view: &dyn Resolve) -> Result<Vec<String>, TransformError> {
    match view.resolve(key).value {
        None => Ok(Vec::new()),
        Some(value) => value.coerce_list().ok_or(TransformError::NotAList {
            key: key.clone(),
            kind: value.kind(),
        }),
    }
}

/// Display-to-stored transform. `SettingValue::Null` stands for "absent".
#[derive(Debug, Clone, PartialEq)]
pub enum SaveTransform {
    /// Replace an absent display value with a sentinel (e.g. `"None"`).
    AbsentAs(SettingValue),
    /// Store empty text or an empty list as null.
    EmptyAsAbsent,
    /// Trim surrounding whitespace from text.
    Trim,
}

impl SaveTransform {
    #[must_use]
    pub fn apply(&self, display: SettingValue) -> SettingValue {
        match (self, display) {
            (Self::AbsentAs(sentinel), SettingValue::Null) => sentinel.clone(),
            (Self::EmptyAsAbsent, SettingValue::Text(s)) if s.is_empty() => SettingValue::Null,
            (Self::EmptyAsAbsent, SettingValue::List(items)) if items.is_empty() => {
                SettingValue::Null
            }
            (Self::Trim, SettingValue::Text(s)) => SettingValue::Text(s.trim().to_owned()),
            (_, other) => other,
        }
    }
}

/// Result of a load pass: the value to display plus any recovered error.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    pub value: Option<SettingValue>,
    pub warning: Option<TransformError>,
}

/// Optional load and save transforms of one binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transforms {
    pub load: Option<LoadTransform>,
    pub save: Option<SaveTransform>,
}

impl Transforms {
    /// Run the load direction. Errors fall back to the raw stored value.
    #[must_use]
    pub fn load(&self, stored: Option<&SettingValue>, view: &dyn Resolve) -> Loaded {
        let Some(transform) = &self.load else {
            return Loaded {
                value: stored.cloned(),
                warning: None,
            };
        };
        match transform.apply(stored, view) {
            Ok(value) => Loaded {
                value,
                warning: None,
            },
            Err(err) => Loaded {
                value: stored.cloned(),
                warning: Some(err),
            },
        }
    }

    /// Run the save direction.
    ///
    /// A result the load direction would replace with its default is stored
    /// as that default, so the persisted value is what the control shows.
    #[must_use]
    pub fn save(&self, display: SettingValue) -> SettingValue {
        let stored = match &self.save {
            Some(transform) => transform.apply(display),
            None => display,
        };
        match &self.load {
            Some(LoadTransform::DefaultIfAbsent(default)) if stored.is_null() => default.clone(),
            _ => stored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SettingsDocument;
    use crate::resolve::Snapshot;
    use proptest::prelude::*;

    fn key(text: &str) -> KeyPath {
        KeyPath::parse(text).unwrap()
    }

    fn view_with_mods(mods: SettingValue) -> Snapshot {
        let mut doc = SettingsDocument::new();
        doc.set(&key("settings-general-subzero_mods"), mods).unwrap();
        Snapshot::of_document(doc)
    }

    fn empty_view() -> Snapshot {
        Snapshot::of_document(SettingsDocument::new())
    }

    #[test]
    fn default_if_absent_substitutes_for_none_and_null() {
        let t = LoadTransform::DefaultIfAbsent("3w".into());
        let view = empty_view();
        assert_eq!(t.apply(None, &view), Ok(Some("3w".into())));
        assert_eq!(t.apply(Some(&SettingValue::Null), &view), Ok(Some("3w".into())));
        assert_eq!(
            t.apply(Some(&SettingValue::from("1w")), &view),
            Ok(Some("1w".into()))
        );
    }

    #[test]
    fn list_contains_reads_membership() {
        let t = LoadTransform::ListContains {
            list: key("settings-general-subzero_mods"),
            item: "remove_HI".into(),
        };
        let view = view_with_mods(vec!["common".to_string(), "remove_HI".to_string()].into());
        assert_eq!(t.apply(None, &view), Ok(Some(SettingValue::Bool(true))));
        let view = view_with_mods(vec!["common".to_string()].into());
        assert_eq!(t.apply(None, &view), Ok(Some(SettingValue::Bool(false))));
    }

    #[test]
    fn list_contains_accepts_comma_text() {
        let t = LoadTransform::ListContains {
            list: key("settings-general-subzero_mods"),
            item: "OCR_fixes".into(),
        };
        let view = view_with_mods("remove_tags,OCR_fixes".into());
        assert_eq!(t.apply(None, &view), Ok(Some(SettingValue::Bool(true))));
    }

    #[test]
    fn list_contains_prefers_stored_value() {
        let t = LoadTransform::ListContains {
            list: key("settings-general-subzero_mods"),
            item: "common".into(),
        };
        let view = view_with_mods(vec!["common".to_string()].into());
        assert_eq!(
            t.apply(Some(&SettingValue::Bool(false)), &view),
            Ok(Some(SettingValue::Bool(false)))
        );
    }

    #[test]
    fn list_contains_rejects_non_list() {
        let t = LoadTransform::ListContains {
            list: key("settings-general-subzero_mods"),
            item: "common".into(),
        };
        let view = view_with_mods(SettingValue::Number(3.0));
        assert_eq!(
            t.apply(None, &view),
            Err(TransformError::NotAList {
                key: key("settings-general-subzero_mods"),
                kind: "number",
            })
        );
    }

    #[test]
    fn list_item_with_prefix_finds_parameter_token() {
        let t = LoadTransform::ListItemWithPrefix {
            list: key("settings-general-subzero_mods"),
            prefix: "color".into(),
        };
        let view = view_with_mods(
            vec!["common".to_string(), "color(name=yellow)".to_string()].into(),
        );
        assert_eq!(t.apply(None, &view), Ok(Some("color(name=yellow)".into())));
        assert_eq!(t.apply(None, &empty_view()), Ok(None));
    }

    #[test]
    fn pipeline_falls_back_on_error() {
        let transforms = Transforms {
            load: Some(LoadTransform::ListContains {
                list: key("settings-general-subzero_mods"),
                item: "common".into(),
            }),
            save: None,
        };
        let stored = SettingValue::from("maybe");
        let loaded = transforms.load(Some(&stored), &empty_view());
        assert_eq!(loaded.value, Some(stored));
        assert!(matches!(
            loaded.warning,
            Some(TransformError::Unexpected { expected: "boolean", .. })
        ));
    }

    #[test]
    fn save_absent_as_sentinel() {
        let t = SaveTransform::AbsentAs("None".into());
        assert_eq!(t.apply(SettingValue::Null), SettingValue::from("None"));
        assert_eq!(
            t.apply(SettingValue::from("anti-captcha")),
            SettingValue::from("anti-captcha")
        );
    }

    #[test]
    fn save_empty_as_absent_and_trim() {
        assert_eq!(
            SaveTransform::EmptyAsAbsent.apply(SettingValue::from("")),
            SettingValue::Null
        );
        assert_eq!(
            SaveTransform::EmptyAsAbsent.apply(SettingValue::List(vec![])),
            SettingValue::Null
        );
        assert_eq!(
            SaveTransform::Trim.apply(SettingValue::from("  /usr/bin/x  ")),
            SettingValue::from("/usr/bin/x")
        );
        assert_eq!(
            SaveTransform::Trim.apply(SettingValue::Bool(true)),
            SettingValue::Bool(true)
        );
    }

    #[test]
    fn cleared_default_field_stores_the_default() {
        let transforms = Transforms {
            load: Some(LoadTransform::DefaultIfAbsent("3w".into())),
            save: Some(SaveTransform::EmptyAsAbsent),
        };
        let view = empty_view();
        let cycle = |stored: &SettingValue| {
            let shown = transforms.load(Some(stored), &view).value.unwrap_or(SettingValue::Null);
            transforms.save(shown)
        };
        let first = cycle(&SettingValue::from(""));
        assert_eq!(first, SettingValue::from("3w"));
        assert_eq!(cycle(&first), first);
        assert_eq!(transforms.save(SettingValue::from("1w")), SettingValue::from("1w"));
    }

    fn arb_value() -> impl Strategy<Value = SettingValue> {
        prop_oneof![
            Just(SettingValue::Null),
            any::<bool>().prop_map(SettingValue::Bool),
            (-1000i64..1000).prop_map(SettingValue::from),
            "[ a-z0-9]{0,8}".prop_map(SettingValue::Text),
        ]
    }

    fn arb_save() -> impl Strategy<Value = SaveTransform> {
        prop_oneof![
            Just(SaveTransform::AbsentAs("None".into())),
            Just(SaveTransform::EmptyAsAbsent),
            Just(SaveTransform::Trim),
        ]
    }

    proptest! {
        #[test]
        fn save_is_idempotent(value in arb_value(), t in arb_save()) {
            let once = t.apply(value);
            let twice = t.apply(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn load_save_cycle_is_stable(value in arb_value(), t in arb_save()) {
            let transforms = Transforms {
                load: Some(LoadTransform::DefaultIfAbsent("3w".into())),
                save: Some(t),
            };
            let view = empty_view();
            let cycle = |stored: &SettingValue| {
                let shown = transforms.load(Some(stored), &view).value.unwrap_or(SettingValue::Null);
                transforms.save(shown)
            };
            let first = cycle(&value);
            prop_assert_eq!(cycle(&first), first);
        }
    }
}
