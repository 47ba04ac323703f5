#![forbid(unsafe_code)]

//! Data layer of the subform settings engine.
//!
//! - [`key_path`]: stable addresses of values inside the settings document.
//! - [`value`]: the closed set of storable values.
//! - [`document`]: the committed, nested settings tree.
//! - [`overlay`]: uncommitted writes with their commit status.
//! - [`resolve`]: overlay-then-committed-then-default resolution over a
//!   consistent [`resolve::Snapshot`].
//! - [`transform`]: named load/save value transforms.
//!
//! Nothing in this crate performs I/O or notifies observers; change
//! propagation lives in `subform-runtime`.

pub mod document;
pub mod key_path;
pub mod overlay;
pub mod resolve;
pub mod transform;
pub mod value;

pub use document::{DocumentError, SettingsDocument};
pub use key_path::{KeyPath, KeyPathError};
pub use overlay::{CommitTicket, OverlayEntry, OverlayStatus, PendingOverlay};
pub use resolve::{Resolution, Resolve, Snapshot, Source};
pub use transform::{LoadTransform, Loaded, SaveTransform, TransformError, Transforms};
pub use value::{SettingValue, UnsupportedValue};
