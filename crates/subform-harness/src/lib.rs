#![forbid(unsafe_code)]

//! Fixtures for driving the subtitles page end to end.
//!
//! [`Fixture`] wires a [`RecordingPersistence`], a [`SettingsStore`] and a
//! mounted [`Form`] for the subtitles page, so tests can edit controls,
//! answer commits and inspect the rendered view without boilerplate.

use subform::prelude::*;
use subform::subtitles;

/// Parse a key path literal.
///
/// # Panics
///
/// Panics on an invalid literal.
#[must_use]
pub fn key(text: &str) -> KeyPath {
    match KeyPath::parse(text) {
        Ok(key) => key,
        Err(err) => panic!("invalid key path in test: {err}"),
    }
}

/// Subtitles page mounted on a recording store.
pub struct Fixture {
    pub persistence: RecordingPersistence,
    pub store: SettingsStore,
    pub form: Form,
}

impl Fixture {
    /// Mount the page over `settings` (backend JSON, immediate commits).
    #[must_use]
    pub fn new(settings: serde_json::Value) -> Self {
        Self::with_config(StoreConfig::default(), settings)
    }

    /// Mount the page with an explicit store configuration.
    ///
    /// # Panics
    ///
    /// Panics when `settings` cannot be represented as a document.
    #[must_use]
    pub fn with_config(config: StoreConfig, settings: serde_json::Value) -> Self {
        let document = match SettingsDocument::from_json(&config.root_namespace, &settings) {
            Ok(document) => document,
            Err(err) => panic!("fixture settings rejected: {err}"),
        };
        let persistence = RecordingPersistence::new();
        let store = SettingsStore::with_config(config, persistence.clone());
        store.replace_document(document);
        let form = Form::mount(&store, subtitles::page()).with_registry(subtitles::modifications());
        tracing::debug!(controls = form.control_ids().len(), "fixture mounted");
        Self {
            persistence,
            store,
            form,
        }
    }

    /// Control bound to `text`.
    ///
    /// # Panics
    ///
    /// Panics when the page has no such control.
    #[must_use]
    pub fn control(&self, text: &str) -> ControlId {
        match self.form.control_for(&key(text)) {
            Some(id) => id,
            None => panic!("no control bound to {text}"),
        }
    }

    /// Change the control bound to `text`.
    pub fn change(&self, text: &str, display: DisplayValue) -> Result<(), FormError> {
        self.form.change(self.control(text), display).map(|_| ())
    }

    /// Answer every queued request with `decide` until the queue is empty.
    pub fn settle_with(&self, decide: impl Fn(&CommitRequest) -> CommitOutcome) -> Vec<Reconciled> {
        let mut reconciled = Vec::new();
        loop {
            let pending = self.persistence.take_pending();
            if pending.is_empty() {
                return reconciled;
            }
            for request in pending {
                let outcome = decide(&request);
                reconciled.push(self.form.apply_outcome(request.ticket, outcome));
            }
        }
    }

    /// Accept every queued request.
    pub fn settle(&self) -> Vec<Reconciled> {
        self.settle_with(|_| CommitOutcome::Success)
    }

    #[must_use]
    pub fn view(&self) -> FormView {
        self.form.render()
    }

    /// Displayed value of the control bound to `text`, if it is rendered.
    #[must_use]
    pub fn shown(&self, text: &str) -> Option<DisplayValue> {
        self.view().control(text).map(|view| view.display.clone())
    }

    /// Value in the committed document.
    #[must_use]
    pub fn committed(&self, text: &str) -> Option<SettingValue> {
        self.store.committed().get(&key(text)).cloned()
    }
}

/// Proptest strategies shared by the integration tests.
pub mod strategies {
    use proptest::prelude::*;
    use subform::SettingValue;

    /// Any storable value.
    pub fn setting_value() -> impl Strategy<Value = SettingValue> {
        prop_oneof![
            Just(SettingValue::Null),
            any::<bool>().prop_map(SettingValue::Bool),
            (-1000i64..1000).prop_map(SettingValue::from),
            "[a-z0-9 ]{0,12}".prop_map(SettingValue::Text),
            proptest::collection::vec("[a-z_]{1,8}", 0..4).prop_map(SettingValue::List),
        ]
    }

    /// How persistence answers one request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Answer {
        Accept,
        Reject,
        Hold,
    }

    pub fn answer() -> impl Strategy<Value = Answer> {
        prop_oneof![Just(Answer::Accept), Just(Answer::Reject), Just(Answer::Hold)]
    }
}
