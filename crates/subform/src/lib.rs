#![forbid(unsafe_code)]

//! subform: settings key-path binding and conditional visibility.
//!
//! This crate re-exports the engine crates and ships the declaration of the
//! subtitles settings page in [`subtitles`].
//!
//! ```ignore
//! use subform::prelude::*;
//!
//! let persistence = RecordingPersistence::new();
//! let store = SettingsStore::new(persistence.clone());
//! let form = Form::mount(&store, subform::subtitles::page())
//!     .with_registry(subform::subtitles::modifications());
//! println!("{}", form.render());
//! ```

pub mod subtitles;

pub use subform_core;
pub use subform_runtime;
pub use subform_widgets;

pub use subform_core::{
    DocumentError, KeyPath, KeyPathError, Resolve, SettingValue, SettingsDocument, Snapshot,
    Source,
};
pub use subform_runtime::{
    CommitMode, CommitOutcome, ConfigError, Persistence, RecordingPersistence, Reconciled,
    SettingsStore, StoreConfig,
};
pub use subform_widgets::{
    ControlSpec, DisplayValue, Form, FormError, FormNode, FormView, ModificationRegistry, Notice,
    OptionSet, Predicate,
};

/// Commonly used items.
pub mod prelude {
    pub use subform_core::{
        KeyPath, LoadTransform, Resolve, SaveTransform, SettingValue, SettingsDocument, Source,
    };
    pub use subform_runtime::{
        ChannelPersistence, CommitMode, CommitOutcome, CommitRequest, Persistence,
        RecordingPersistence, Reconciled, SettingsStore, StoreConfig,
    };
    pub use subform_widgets::{
        ControlId, ControlSpec, ControlView, DisplayValue, Form, FormError, FormNode, FormView,
        ModificationRegistry, MountState, Notice, OptionSet, Predicate, ViewNode,
    };
}
