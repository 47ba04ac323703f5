#![forbid(unsafe_code)]

//! Ordered catalogue of subtitle text modifications.
//!
//! Each entry's state lives under its own key path like any other binding.
//! Until an entry key is written, its state is derived from the aggregated
//! list key (e.g. `settings-general-subzero_mods`), which is also what the
//! downstream post-processor reads.
//!
//! Export order always comes from the declaration list, never from the
//! document.

use subform_core::{KeyPath, LoadTransform, Resolve, SaveTransform, SettingValue, Transforms};
use subform_runtime::{SettingsStore, WriteReceipt};

/// How an entry is represented in the aggregated list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Listed by name when enabled.
    Flag,
    /// Listed as its parameter token (e.g. `color(name=white)`) when one is chosen.
    Parameter { prefix: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationEntry {
    pub name: String,
    pub key: KeyPath,
    pub kind: EntryKind,
}

impl ModificationEntry {
    /// Load transform that seeds this entry's control from the list.
    #[must_use]
    pub fn load_transform(&self, list: &KeyPath) -> LoadTransform {
        match &self.kind {
            EntryKind::Flag => LoadTransform::ListContains {
                list: list.clone(),
                item: self.name.clone(),
            },
            EntryKind::Parameter { prefix } => LoadTransform::ListItemWithPrefix {
                list: list.clone(),
                prefix: prefix.clone(),
            },
        }
    }

    /// Save transform paired with [`Self::load_transform`].
    ///
    /// A cleared parameter is stored as `""`: null under the entry key would
    /// read the list again and bring the old token back.
    #[must_use]
    pub fn save_transform(&self) -> Option<SaveTransform> {
        match self.kind {
            EntryKind::Flag => None,
            EntryKind::Parameter { .. } => Some(SaveTransform::AbsentAs(SettingValue::from(""))),
        }
    }

    /// Both transforms of this entry's control.
    #[must_use]
    pub fn transforms(&self, list: &KeyPath) -> Transforms {
        Transforms {
            load: Some(self.load_transform(list)),
            save: self.save_transform(),
        }
    }
}

/// Resolved state of one entry, as handed to the post-processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationState {
    pub name: String,
    pub enabled: bool,
    pub parameter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationRegistry {
    list_key: KeyPath,
    entries: Vec<ModificationEntry>,
}

impl ModificationRegistry {
    pub fn new(list_key: KeyPath) -> Self {
        Self {
            list_key,
            entries: Vec::new(),
        }
    }

    /// Append a toggle entry.
    #[must_use]
    pub fn flag(mut self, name: impl Into<String>, key: KeyPath) -> Self {
        self.entries.push(ModificationEntry {
            name: name.into(),
            key,
            kind: EntryKind::Flag,
        });
        self
    }

    /// Append an entry whose list token starts with `prefix`.
    #[must_use]
    pub fn parameter(
        mut self,
        name: impl Into<String>,
        key: KeyPath,
        prefix: impl Into<String>,
    ) -> Self {
        self.entries.push(ModificationEntry {
            name: name.into(),
            key,
            kind: EntryKind::Parameter {
                prefix: prefix.into(),
            },
        });
        self
    }

    #[must_use]
    pub fn list_key(&self) -> &KeyPath {
        &self.list_key
    }

    #[must_use]
    pub fn entries(&self) -> &[ModificationEntry] {
        &self.entries
    }

    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&ModificationEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Whether `key` is one of the entry keys.
    #[must_use]
    pub fn contains(&self, key: &KeyPath) -> bool {
        self.entries.iter().any(|e| &e.key == key)
    }

    fn loaded(&self, entry: &ModificationEntry, view: &dyn Resolve) -> Option<SettingValue> {
        let transforms = entry.transforms(&self.list_key);
        let stored = view.resolve(&entry.key);
        let loaded = transforms.load(stored.value(), view);
        if let Some(warning) = loaded.warning {
            tracing::warn!(key = %entry.key, %warning, "modification state unreadable; using raw value");
        }
        loaded.value
    }

    /// Current state of every entry, in declaration order.
    #[must_use]
    pub fn resolve(&self, view: &dyn Resolve) -> Vec<ModificationState> {
        self.entries
            .iter()
            .map(|entry| {
                let value = self.loaded(entry, view);
                match entry.kind {
                    EntryKind::Flag => ModificationState {
                        name: entry.name.clone(),
                        enabled: value.and_then(|v| v.coerce_bool()).unwrap_or(false),
                        parameter: None,
                    },
                    EntryKind::Parameter { .. } => {
                        let parameter = value
                            .filter(|v| !v.is_null())
                            .map(|v| v.coerce_text())
                            .filter(|v| !v.is_empty());
                        ModificationState {
                            name: entry.name.clone(),
                            enabled: parameter.is_some(),
                            parameter,
                        }
                    }
                }
            })
            .collect()
    }

    /// The aggregated list: enabled names, parameter tokens for parameter entries.
    #[must_use]
    pub fn export_list(&self, view: &dyn Resolve) -> Vec<String> {
        self.resolve(view)
            .into_iter()
            .filter(|state| state.enabled)
            .map(|state| state.parameter.unwrap_or(state.name))
            .collect()
    }

    /// Write the aggregated list when it differs from the current effective one.
    pub fn sync(&self, store: &SettingsStore) -> Option<WriteReceipt> {
        let exported = self.export_list(store);
        let current = store
            .resolve(&self.list_key)
            .value
            .and_then(|v| v.coerce_list())
            .unwrap_or_default();
        if current == exported {
            return None;
        }
        tracing::debug!(key = %self.list_key, entries = exported.len(), "modification list changed");
        Some(store.write(self.list_key.clone(), SettingValue::List(exported)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use subform_core::SettingsDocument;
    use subform_runtime::RecordingPersistence;

    fn key(text: &str) -> KeyPath {
        KeyPath::parse(text).unwrap()
    }

    fn registry() -> ModificationRegistry {
        ModificationRegistry::new(key("settings-general-subzero_mods"))
            .flag("remove_HI", key("subzero-remove_HI"))
            .flag("remove_tags", key("subzero-remove_tags"))
            .flag("OCR_fixes", key("subzero-OCR_fixes"))
            .flag("common", key("subzero-common"))
            .flag("fix_uppercase", key("subzero-fix_uppercase"))
            .parameter("color", key("subzero-color"), "color")
            .flag("reverse_rtl", key("subzero-reverse_rtl"))
    }

    fn store_with_mods(mods: &[&str]) -> (SettingsStore, RecordingPersistence) {
        let rec = RecordingPersistence::new();
        let store = SettingsStore::new(rec.clone());
        let mut doc = SettingsDocument::new();
        doc.set(
            &key("settings-general-subzero_mods"),
            SettingValue::List(mods.iter().map(|m| (*m).to_owned()).collect()),
        )
        .unwrap();
        store.replace_document(doc);
        (store, rec)
    }

    #[test]
    fn state_is_seeded_from_list() {
        let (store, _rec) = store_with_mods(&["common", "color(name=white)", "remove_HI"]);
        let states = registry().resolve(&store);
        let names: Vec<&str> = states.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "remove_HI",
                "remove_tags",
                "OCR_fixes",
                "common",
                "fix_uppercase",
                "color",
                "reverse_rtl"
            ]
        );
        assert!(states[0].enabled);
        assert!(!states[1].enabled);
        assert!(states[3].enabled);
        assert_eq!(states[5].parameter.as_deref(), Some("color(name=white)"));
    }

    #[test]
    fn export_uses_declaration_order() {
        let (store, _rec) = store_with_mods(&["reverse_rtl", "common", "remove_HI"]);
        assert_eq!(
            registry().export_list(&store),
            vec!["remove_HI", "common", "reverse_rtl"]
        );
    }

    #[test]
    fn entry_key_wins_over_list() {
        let (store, _rec) = store_with_mods(&["common"]);
        store.write(key("subzero-common"), false.into());
        store.write(key("subzero-color"), "color(name=yellow)".into());
        assert_eq!(registry().export_list(&store), vec!["color(name=yellow)"]);
    }

    #[test]
    fn sync_writes_only_on_change() {
        let (store, rec) = store_with_mods(&["common"]);
        let registry = registry();
        assert_eq!(registry.sync(&store), None);
        store.write(key("subzero-OCR_fixes"), true.into());
        rec.take_pending();
        let receipt = registry.sync(&store).unwrap();
        assert_eq!(receipt.key, key("settings-general-subzero_mods"));
        let pending = rec.take_pending();
        assert_eq!(
            pending[0].value,
            SettingValue::List(vec!["OCR_fixes".into(), "common".into()])
        );
        assert_eq!(registry.sync(&store), None);
    }

    #[test]
    fn cleared_parameter_is_dropped() {
        let (store, rec) = store_with_mods(&["common", "color(name=white)"]);
        let registry = registry();
        let entry = registry.entry("color").unwrap();
        let cleared = entry.transforms(registry.list_key()).save(SettingValue::Null);
        assert_eq!(cleared, SettingValue::from(""));
        store.write(entry.key.clone(), cleared);
        assert_eq!(registry.export_list(&store), vec!["common"]);
        rec.take_pending();
        registry.sync(&store).unwrap();
        assert_eq!(
            rec.take_pending()[0].value,
            SettingValue::List(vec!["common".into()])
        );
        let color = registry.resolve(&store).remove(5);
        assert!(!color.enabled);
        assert_eq!(color.parameter, None);
    }

    #[test]
    fn flags_keep_plain_saves() {
        let registry = registry();
        let entry = registry.entry("common").unwrap();
        assert_eq!(entry.save_transform(), None);
        assert_eq!(
            entry.transforms(registry.list_key()).save(SettingValue::Bool(false)),
            SettingValue::Bool(false)
        );
    }

    proptest! {
        #[test]
        fn export_order_ignores_toggle_order(order in Just((0usize..7).collect::<Vec<_>>()).prop_shuffle(), enabled in proptest::collection::vec(any::<bool>(), 7)) {
            let registry = registry();
            let (store, _rec) = store_with_mods(&[]);
            for index in order {
                let entry = &registry.entries()[index];
                let value = match entry.kind {
                    EntryKind::Flag => SettingValue::Bool(enabled[index]),
                    EntryKind::Parameter { .. } if enabled[index] => "color(name=red)".into(),
                    EntryKind::Parameter { .. } => "".into(),
                };
                store.write(entry.key.clone(), value);
                registry.sync(&store);
            }
            let expected: Vec<String> = registry
                .entries()
                .iter()
                .enumerate()
                .filter(|(i, _)| enabled[*i])
                .map(|(_, e)| match e.kind {
                    EntryKind::Flag => e.name.clone(),
                    EntryKind::Parameter { .. } => "color(name=red)".to_owned(),
                })
                .collect();
            prop_assert_eq!(registry.export_list(&store), expected.clone());
            let stored = store
                .resolve(registry.list_key())
                .value
                .and_then(|v| v.coerce_list())
                .unwrap_or_default();
            prop_assert_eq!(stored, expected);
        }
    }
}
