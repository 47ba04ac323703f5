#![forbid(unsafe_code)]

//! Runtime for the subform settings engine.
//!
//! [`store::SettingsStore`] is the binding context every control talks to: it
//! resolves effective values, records edits in the pending overlay, hands them
//! to a [`persistence::Persistence`] collaborator, and reconciles outcomes.
//! Changes propagate through the single-threaded primitives in [`reactive`].

pub mod config;
pub mod persistence;
pub mod reactive;
pub mod store;

pub use config::{CommitMode, ConfigError, StoreConfig};
pub use persistence::{
    ChannelPersistence, CommitOutcome, CommitRequest, CommitResponse, OutcomeReceiver,
    Persistence, RecordingPersistence,
};
pub use store::{Reconciled, SettingsStore, WriteReceipt};
