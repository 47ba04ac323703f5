#![forbid(unsafe_code)]

//! Conditional visibility: predicates and the collapse-box state machine.
//!
//! A [`CollapseBox`] guards a subtree. It watches one key and evaluates a
//! [`Predicate`] over that key's effective value (overlay included, so an
//! unsaved edit flips visibility at once).
//!
//! # State Machine
//!
//! ```text
//!            initialize(v) / observe(v): predicate(v) == true
//!   ┌───────────┐ ─────────────────────────────────► ┌─────────┐
//!   │ Unmounted │                                    │ Mounted │
//!   └───────────┘ ◄───────────────────────────────── └─────────┘
//!                 observe(v): predicate(v) == false
//! ```
//!
//! `observe` reports a transition only when the result differs from the
//! current state; a repeated notification with an equivalent value is a no-op.
//! A predicate error counts as `true` (fail-open) and is logged.

use core::fmt;
use std::rc::Rc;

use subform_core::{KeyPath, SettingValue};

/// Error raised by a custom predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateError {
    pub message: String,
}

impl PredicateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for PredicateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "visibility predicate failed: {}", self.message)
    }
}

impl std::error::Error for PredicateError {}

type CustomPredicate = dyn Fn(Option<&SettingValue>) -> Result<bool, PredicateError>;

/// Pure rule from the watched key's effective value to visibility.
#[derive(Clone)]
pub enum Predicate {
    /// Present and truthy.
    Truthy,
    /// Equal to the given value.
    Equals(SettingValue),
    /// Not one of the given values. Absent compares as `Null`.
    NotIn(Vec<SettingValue>),
    /// Non-empty text that is none of the given strings. Absent is `false`.
    NonEmptyExcept(Vec<String>),
    /// Anything else.
    Custom(Rc<CustomPredicate>),
}

impl Predicate {
    /// Shorthand for [`Predicate::Equals`] on text.
    pub fn equals(value: impl Into<SettingValue>) -> Self {
        Self::Equals(value.into())
    }

    /// Wrap a fallible closure.
    pub fn custom(
        f: impl Fn(Option<&SettingValue>) -> Result<bool, PredicateError> + 'static,
    ) -> Self {
        Self::Custom(Rc::new(f))
    }

    pub fn evaluate(&self, value: Option<&SettingValue>) -> Result<bool, PredicateError> {
        match self {
            Self::Truthy => Ok(value.is_some_and(SettingValue::is_truthy)),
            Self::Equals(expected) => Ok(value == Some(expected)),
            Self::NotIn(excluded) => {
                let value = value.unwrap_or(&SettingValue::Null);
                Ok(!excluded.contains(value))
            }
            Self::NonEmptyExcept(excluded) => Ok(match value {
                Some(SettingValue::Text(text)) => {
                    !text.is_empty() && !excluded.iter().any(|e| e == text)
                }
                _ => false,
            }),
            Self::Custom(f) => f(value),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truthy => f.write_str("Truthy"),
            Self::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            Self::NotIn(vs) => f.debug_tuple("NotIn").field(vs).finish(),
            Self::NonEmptyExcept(vs) => f.debug_tuple("NonEmptyExcept").field(vs).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Mount state of a guarded subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountState {
    Mounted,
    Unmounted,
}

impl MountState {
    fn from_visible(visible: bool) -> Self {
        if visible { Self::Mounted } else { Self::Unmounted }
    }
}

/// Outcome of one predicate evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub visible: bool,
    /// Set when the predicate failed and visibility defaulted to `true`.
    pub error: Option<PredicateError>,
}

/// Visibility state machine of one guarded subtree.
#[derive(Debug, Clone)]
pub struct CollapseBox {
    key: KeyPath,
    predicate: Predicate,
    state: MountState,
    transitions: u64,
}

impl CollapseBox {
    /// New box, unmounted until initialized.
    pub fn new(key: KeyPath, predicate: Predicate) -> Self {
        Self {
            key,
            predicate,
            state: MountState::Unmounted,
            transitions: 0,
        }
    }

    #[must_use]
    pub fn key(&self) -> &KeyPath {
        &self.key
    }

    #[must_use]
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    #[must_use]
    pub fn state(&self) -> MountState {
        self.state
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.state == MountState::Mounted
    }

    /// Mount/unmount flips since creation (initialization excluded).
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Evaluate the predicate, failing open.
    #[must_use]
    pub fn evaluate(&self, value: Option<&SettingValue>) -> Evaluation {
        match self.predicate.evaluate(value) {
            Ok(visible) => Evaluation {
                visible,
                error: None,
            },
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "visibility predicate failed; showing subtree");
                Evaluation {
                    visible: true,
                    error: Some(err),
                }
            }
        }
    }

    /// Set the initial state (first render or ancestor mount). Not counted
    /// as a transition.
    pub fn initialize(&mut self, value: Option<&SettingValue>) -> Evaluation {
        let evaluation = self.evaluate(value);
        self.state = MountState::from_visible(evaluation.visible);
        evaluation
    }

    /// React to a change of the watched value. Returns the new state when it
    /// flipped.
    pub fn observe(&mut self, value: Option<&SettingValue>) -> (Option<MountState>, Evaluation) {
        let evaluation = self.evaluate(value);
        let next = MountState::from_visible(evaluation.visible);
        if next == self.state {
            return (None, evaluation);
        }
        self.state = next;
        self.transitions += 1;
        tracing::debug!(key = %self.key, state = ?next, "collapse box transition");
        (Some(next), evaluation)
    }
}
