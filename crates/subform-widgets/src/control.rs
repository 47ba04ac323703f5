#![forbid(unsafe_code)]

//! Control bindings: toggle, text, password, slider and selector.
//!
//! A [`ControlSpec`] is the immutable binding descriptor of one control: the
//! key path it binds to, optional load/save transforms, an optional default,
//! and archetype constraints. It converts between stored values and
//! [`DisplayValue`]s in both directions; it never touches the store itself.
//!
//! # Coercion Rules
//!
//! | Archetype | Stored → display | Display → stored |
//! |-----------|------------------|------------------|
//! | Toggle | lenient bool, absent is `false` | `Bool` |
//! | Text / Password | text rendering, absent is `""` | `Text` |
//! | Slider | number clamped to `[min, max]`, absent is `min` | clamped `Number` |
//! | Select | declared identifier or unset | identifier, `Null` when cleared |
//! | Select (multi) | declared identifiers, unknown dropped | `List` |

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use subform_core::{
    KeyPath, LoadTransform, Resolve, SaveTransform, SettingValue, Source, TransformError,
    Transforms,
};

use crate::form::FormError;
use crate::options::OptionSet;

static CONTROL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a declared control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(u64);

impl ControlId {
    fn next() -> Self {
        Self(CONTROL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "control#{}", self.0)
    }
}

/// Control kind plus its constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum Archetype {
    Toggle,
    Text,
    /// Text whose value is sensitive: masked in views, redacted in logs.
    Password,
    Slider {
        min: f64,
        max: f64,
    },
    Select {
        options: OptionSet,
        clearable: bool,
        multi: bool,
    },
}

impl Archetype {
    /// Short name for diagnostics and views.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Toggle => "toggle",
            Self::Text => "text",
            Self::Password => "password",
            Self::Slider { .. } => "slider",
            Self::Select { multi: true, .. } => "multi-select",
            Self::Select { .. } => "select",
        }
    }

    fn expected_display(&self) -> &'static str {
        match self {
            Self::Toggle => "bool",
            Self::Text | Self::Password => "text",
            Self::Slider { .. } => "number",
            Self::Select { multi: true, .. } => "choices",
            Self::Select { .. } => "choice",
        }
    }
}

/// Value as a control presents it.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayValue {
    Bool(bool),
    Text(String),
    Number(f64),
    /// Single selection; `None` is the explicit unset state.
    Choice(Option<String>),
    Choices(Vec<String>),
}

impl DisplayValue {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
            Self::Number(_) => "number",
            Self::Choice(_) => "choice",
            Self::Choices(_) => "choices",
        }
    }
}

impl fmt::Display for DisplayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", if *b { "on" } else { "off" }),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Number(n) => write!(f, "{}", SettingValue::Number(*n)),
            Self::Choice(Some(v)) => f.write_str(v),
            Self::Choice(None) => f.write_str("(unset)"),
            Self::Choices(vs) => write!(f, "[{}]", vs.join(", ")),
        }
    }
}

/// Display value of a control together with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Presented {
    pub display: DisplayValue,
    pub source: Source,
    /// Load transform error recovered by falling back to the raw value.
    pub warning: Option<TransformError>,
}

/// Immutable binding descriptor of one control.
#[derive(Debug, Clone)]
pub struct ControlSpec {
    id: ControlId,
    key: KeyPath,
    label: String,
    description: Option<String>,
    placeholder: Option<String>,
    archetype: Archetype,
    transforms: Transforms,
    default_value: Option<SettingValue>,
}

impl ControlSpec {
    fn with_archetype(key: KeyPath, label: impl Into<String>, archetype: Archetype) -> Self {
        Self {
            id: ControlId::next(),
            key,
            label: label.into(),
            description: None,
            placeholder: None,
            archetype,
            transforms: Transforms::default(),
            default_value: None,
        }
    }

    pub fn toggle(key: KeyPath, label: impl Into<String>) -> Self {
        Self::with_archetype(key, label, Archetype::Toggle)
    }

    pub fn text(key: KeyPath, label: impl Into<String>) -> Self {
        Self::with_archetype(key, label, Archetype::Text)
    }

    pub fn password(key: KeyPath, label: impl Into<String>) -> Self {
        Self::with_archetype(key, label, Archetype::Password)
    }

    /// Slider over `[min, max]`. Bounds given in the wrong order are swapped.
    pub fn slider(key: KeyPath, label: impl Into<String>, min: f64, max: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self::with_archetype(key, label, Archetype::Slider { min, max })
    }

    pub fn select(key: KeyPath, label: impl Into<String>, options: OptionSet) -> Self {
        Self::with_archetype(
            key,
            label,
            Archetype::Select {
                options,
                clearable: false,
                multi: false,
            },
        )
    }

    pub fn multi_select(key: KeyPath, label: impl Into<String>, options: OptionSet) -> Self {
        Self::with_archetype(
            key,
            label,
            Archetype::Select {
                options,
                clearable: true,
                multi: true,
            },
        )
    }

    /// Allow a selector to be cleared back to unset.
    #[must_use]
    pub fn clearable(mut self) -> Self {
        if let Archetype::Select { clearable, .. } = &mut self.archetype {
            *clearable = true;
        }
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    #[must_use]
    pub fn on_load(mut self, transform: LoadTransform) -> Self {
        self.transforms.load = Some(transform);
        self
    }

    #[must_use]
    pub fn on_save(mut self, transform: SaveTransform) -> Self {
        self.transforms.save = Some(transform);
        self
    }

    /// Value shown when nothing is stored. Never written by itself.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<SettingValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> ControlId {
        self.id
    }

    #[must_use]
    pub fn key(&self) -> &KeyPath {
        &self.key
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }

    #[must_use]
    pub fn archetype(&self) -> &Archetype {
        &self.archetype
    }

    #[must_use]
    pub fn transforms(&self) -> &Transforms {
        &self.transforms
    }

    #[must_use]
    pub fn is_sensitive(&self) -> bool {
        matches!(self.archetype, Archetype::Password)
    }

    /// Current display value: resolve, apply the load transform, coerce.
    #[must_use]
    pub fn current_display(&self, view: &dyn Resolve) -> Presented {
        let resolution = view.resolve_or(&self.key, self.default_value.as_ref());
        let loaded = self.transforms.load(resolution.value(), view);
        let source = if resolution.is_absent() && loaded.value.is_some() {
            Source::Default
        } else {
            resolution.source
        };
        Presented {
            display: self.coerce(loaded.value.as_ref()),
            source,
            warning: loaded.warning,
        }
    }

    fn coerce(&self, value: Option<&SettingValue>) -> DisplayValue {
        match &self.archetype {
            Archetype::Toggle => {
                DisplayValue::Bool(value.and_then(SettingValue::coerce_bool).unwrap_or(false))
            }
            Archetype::Text | Archetype::Password => {
                DisplayValue::Text(value.map(SettingValue::coerce_text).unwrap_or_default())
            }
            Archetype::Slider { min, max } => DisplayValue::Number(
                value
                    .and_then(SettingValue::coerce_f64)
                    .unwrap_or(*min)
                    .clamp(*min, *max),
            ),
            Archetype::Select {
                options,
                multi: false,
                ..
            } => DisplayValue::Choice(
                value
                    .filter(|v| !v.is_null())
                    .map(SettingValue::coerce_text)
                    .filter(|v| options.contains(v)),
            ),
            Archetype::Select {
                options,
                multi: true,
                ..
            } => DisplayValue::Choices(
                value
                    .and_then(SettingValue::coerce_list)
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|v| options.contains(v))
                    .collect(),
            ),
        }
    }

    /// Check that `display` has the right shape and content for this control.
    pub fn validate(&self, display: &DisplayValue) -> Result<(), FormError> {
        let mismatch = || FormError::Mismatch {
            control: self.id,
            expected: self.archetype.expected_display(),
            found: display.kind(),
        };
        match (&self.archetype, display) {
            (Archetype::Toggle, DisplayValue::Bool(_))
            | (Archetype::Text | Archetype::Password, DisplayValue::Text(_)) => Ok(()),
            (Archetype::Slider { .. }, DisplayValue::Number(n)) if !n.is_nan() => Ok(()),
            (
                Archetype::Select {
                    options,
                    clearable,
                    multi: false,
                },
                DisplayValue::Choice(choice),
            ) => match choice {
                None if *clearable => Ok(()),
                None => Err(FormError::NotClearable(self.id)),
                Some(value) if options.contains(value) => Ok(()),
                Some(value) => Err(FormError::UnknownOption {
                    control: self.id,
                    value: value.clone(),
                }),
            },
            (
                Archetype::Select {
                    options,
                    multi: true,
                    ..
                },
                DisplayValue::Choices(values),
            ) => match values.iter().find(|v| !options.contains(v)) {
                Some(value) => Err(FormError::UnknownOption {
                    control: self.id,
                    value: value.clone(),
                }),
                None => Ok(()),
            },
            _ => Err(mismatch()),
        }
    }

    /// Stored value for a user change: validate, clamp, apply the save transform.
    pub fn stored_from_display(&self, display: &DisplayValue) -> Result<SettingValue, FormError> {
        self.validate(display)?;
        let raw = match (display, &self.archetype) {
            (DisplayValue::Bool(b), _) => SettingValue::Bool(*b),
            (DisplayValue::Text(s), _) => SettingValue::Text(s.clone()),
            (DisplayValue::Number(n), Archetype::Slider { min, max }) => {
                SettingValue::Number(n.clamp(*min, *max))
            }
            (DisplayValue::Number(n), _) => SettingValue::Number(*n),
            (DisplayValue::Choice(choice), _) => choice
                .clone()
                .map_or(SettingValue::Null, SettingValue::Text),
            (DisplayValue::Choices(values), _) => SettingValue::List(values.clone()),
        };
        Ok(self.transforms.save(raw))
    }

    /// Parse command-line style input into a display value for this control.
    ///
    /// Toggles accept `true/false/on/off/yes/no/1/0`; selectors accept an
    /// identifier, an empty string (unset) or, for multi, a comma list.
    pub fn parse_display(&self, input: &str) -> Result<DisplayValue, FormError> {
        let parse_error = || FormError::Parse {
            control: self.id,
            input: input.to_owned(),
        };
        let display = match &self.archetype {
            Archetype::Toggle => DisplayValue::Bool(
                SettingValue::from(input)
                    .coerce_bool()
                    .ok_or_else(parse_error)?,
            ),
            Archetype::Text | Archetype::Password => DisplayValue::Text(input.to_owned()),
            Archetype::Slider { .. } => DisplayValue::Number(
                SettingValue::from(input)
                    .coerce_f64()
                    .ok_or_else(parse_error)?,
            ),
            Archetype::Select { multi: false, .. } => {
                let trimmed = input.trim();
                DisplayValue::Choice((!trimmed.is_empty()).then(|| trimmed.to_owned()))
            }
            Archetype::Select { multi: true, .. } => DisplayValue::Choices(
                SettingValue::from(input).coerce_list().unwrap_or_default(),
            ),
        };
        self.validate(&display)?;
        Ok(display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use subform_core::{SettingsDocument, Snapshot};

    fn key(text: &str) -> KeyPath {
        KeyPath::parse(text).unwrap()
    }

    fn view(entries: &[(&str, SettingValue)]) -> Snapshot {
        let mut doc = SettingsDocument::new();
        for (k, v) in entries {
            doc.set(&key(k), v.clone()).unwrap();
        }
        Snapshot::of_document(doc)
    }

    fn folders() -> OptionSet {
        OptionSet::from_pairs(&[
            ("current", "AlongSide Media File"),
            ("relative", "Relative Path to Media File"),
            ("absolute", "Absolute Path"),
        ])
    }

    #[test]
    fn ids_are_unique() {
        let a = ControlSpec::toggle(key("a-b"), "A");
        let b = ControlSpec::toggle(key("a-b"), "A");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn toggle_absent_is_false_unless_default() {
        let v = view(&[]);
        let plain = ControlSpec::toggle(key("settings-general-debug"), "Debug");
        assert_eq!(plain.current_display(&v).display, DisplayValue::Bool(false));
        assert_eq!(plain.current_display(&v).source, Source::Absent);
        let defaulted = plain.clone().with_default(true);
        let shown = defaulted.current_display(&v);
        assert_eq!(shown.display, DisplayValue::Bool(true));
        assert_eq!(shown.source, Source::Default);
    }

    #[test]
    fn default_if_absent_transform_reports_default_source() {
        let control = ControlSpec::select(
            key("settings-general-adaptive_searching_delay"),
            "Delay",
            OptionSet::from_pairs(&[("1w", "1 week"), ("3w", "3 weeks")]),
        )
        .on_load(LoadTransform::DefaultIfAbsent("3w".into()));
        let shown = control.current_display(&view(&[]));
        assert_eq!(shown.display, DisplayValue::Choice(Some("3w".into())));
        assert_eq!(shown.source, Source::Default);
    }

    #[test]
    fn select_unknown_stored_value_is_unset() {
        let control = ControlSpec::select(key("settings-general-subfolder"), "Folder", folders());
        let v = view(&[("settings-general-subfolder", "elsewhere".into())]);
        assert_eq!(control.current_display(&v).display, DisplayValue::Choice(None));
    }

    #[test]
    fn clearable_select_saves_sentinel() {
        let control = ControlSpec::select(
            key("settings-general-anti_captcha_provider"),
            "Provider",
            OptionSet::from_pairs(&[("anti-captcha", "Anti-Captcha")]),
        )
        .clearable()
        .on_save(SaveTransform::AbsentAs("None".into()));
        assert_eq!(
            control.stored_from_display(&DisplayValue::Choice(None)),
            Ok(SettingValue::from("None"))
        );
        // "None" is not a declared option, so it displays as unset again.
        let v = view(&[("settings-general-anti_captcha_provider", "None".into())]);
        assert_eq!(control.current_display(&v).display, DisplayValue::Choice(None));
    }

    #[test]
    fn non_clearable_select_rejects_unset() {
        let control = ControlSpec::select(key("settings-general-subfolder"), "Folder", folders());
        assert_eq!(
            control.stored_from_display(&DisplayValue::Choice(None)),
            Err(FormError::NotClearable(control.id()))
        );
        assert!(matches!(
            control.stored_from_display(&DisplayValue::Choice(Some("nowhere".into()))),
            Err(FormError::UnknownOption { .. })
        ));
    }

    #[test]
    fn wrong_shape_is_mismatch() {
        let control = ControlSpec::toggle(key("settings-general-debug"), "Debug");
        assert_eq!(
            control.stored_from_display(&DisplayValue::Text("yes".into())),
            Err(FormError::Mismatch {
                control: control.id(),
                expected: "bool",
                found: "text",
            })
        );
    }

    #[test]
    fn multi_select_filters_unknown_stored_items() {
        let control = ControlSpec::multi_select(
            key("settings-general-enabled_providers"),
            "Providers",
            OptionSet::from_pairs(&[("opensubtitles", "OpenSubtitles"), ("podnapisi", "Podnapisi")]),
        );
        let v = view(&[(
            "settings-general-enabled_providers",
            vec!["podnapisi".to_string(), "gone".to_string()].into(),
        )]);
        assert_eq!(
            control.current_display(&v).display,
            DisplayValue::Choices(vec!["podnapisi".into()])
        );
    }

    #[test]
    fn password_is_sensitive() {
        let control = ControlSpec::password(key("settings-anticaptcha-anti_captcha_key"), "Key");
        assert!(control.is_sensitive());
        assert_eq!(control.archetype().name(), "password");
    }

    #[test]
    fn parse_display_per_archetype() {
        let toggle = ControlSpec::toggle(key("a-b"), "T");
        assert_eq!(toggle.parse_display("on"), Ok(DisplayValue::Bool(true)));
        assert!(matches!(toggle.parse_display("perhaps"), Err(FormError::Parse { .. })));

        let slider = ControlSpec::slider(key("a-c"), "S", 0.0, 30.0);
        assert_eq!(slider.parse_display("12"), Ok(DisplayValue::Number(12.0)));

        let select = ControlSpec::select(key("a-d"), "F", folders()).clearable();
        assert_eq!(select.parse_display(""), Ok(DisplayValue::Choice(None)));
        assert_eq!(
            select.parse_display("relative"),
            Ok(DisplayValue::Choice(Some("relative".into())))
        );
    }

    #[test]
    fn load_warning_falls_back_to_raw() {
        let control = ControlSpec::toggle(key("subzero-remove_HI"), "Remove HI").on_load(
            LoadTransform::ListContains {
                list: key("settings-general-subzero_mods"),
                item: "remove_HI".into(),
            },
        );
        let v = view(&[("settings-general-subzero_mods", 5u32.into())]);
        let shown = control.current_display(&v);
        assert!(shown.warning.is_some());
        assert_eq!(shown.display, DisplayValue::Bool(false));
    }

    proptest! {
        #[test]
        fn slider_clamps_and_round_trips(stored in -1000.0f64..1000.0, min in -50.0f64..0.0, max in 1.0f64..100.0) {
            let control = ControlSpec::slider(key("settings-general-days_to_upgrade_subs"), "Days", min, max);
            let v = view(&[("settings-general-days_to_upgrade_subs", SettingValue::Number(stored))]);
            let shown = control.current_display(&v).display;
            let DisplayValue::Number(n) = shown.clone() else {
                return Err(TestCaseError::fail("slider must display a number"));
            };
            prop_assert!(n >= min && n <= max);
            let saved = control.stored_from_display(&shown).unwrap();
            prop_assert_eq!(saved.clone(), SettingValue::Number(n));
            let again = view(&[("settings-general-days_to_upgrade_subs", saved)]);
            prop_assert_eq!(control.current_display(&again).display, shown);
        }
    }
}
