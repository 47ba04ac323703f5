#![forbid(unsafe_code)]

//! Controls, conditional visibility and the form tree.
//!
//! - [`control`]: binding descriptors for toggles, text, password, sliders
//!   and selectors, plus display/stored conversion.
//! - [`visibility`]: predicates and the collapse-box state machine.
//! - [`form`]: declaring a page, mounting it on a store, rendering views and
//!   routing user input.
//! - [`modifications`]: the ordered subtitle modification catalogue.

pub mod control;
pub mod form;
pub mod modifications;
pub mod options;
pub mod visibility;

pub use control::{Archetype, ControlId, ControlSpec, DisplayValue, Presented};
pub use form::{
    BoxInfo, ControlView, Form, FormError, FormNode, FormView, Notice, ViewNode,
};
pub use modifications::{EntryKind, ModificationEntry, ModificationRegistry, ModificationState};
pub use options::{OptionSet, SelectOption};
pub use visibility::{CollapseBox, Evaluation, MountState, Predicate, PredicateError};
