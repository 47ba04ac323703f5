#![forbid(unsafe_code)]

//! Form tree: declaration, mounting, rendering and input routing.
//!
//! A page is declared as a tree of [`FormNode`]s. [`Form::mount`] flattens it
//! into a pre-order arena, evaluates every reachable [`CollapseBox`] once, and
//! subscribes each box to its watched key on the [`SettingsStore`]. From then
//! on visibility changes synchronously with store notifications.
//!
//! # Invariants
//!
//! 1. **Inert when hidden**: a node is active only if every enclosing collapse
//!    box is mounted. Inactive boxes ignore notifications; inactive controls
//!    reject input with [`FormError::Inert`].
//! 2. **Fresh on mount**: when a box mounts, drafts in its subtree are dropped
//!    and nested boxes are re-initialized from current state.
//! 3. **Store untouched by visibility**: unmounting discards presentation state
//!    only; hidden values stay in the store.
//! 4. **One snapshot per render**: [`Form::render`] resolves every control
//!    against a single [`subform_core::Snapshot`].
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Unknown control | Stale [`ControlId`] | `FormError::UnknownControl` |
//! | Hidden control | Ancestor box unmounted | `FormError::Inert` |
//! | Bad display value | Wrong shape, undeclared option | `FormError::Mismatch` / `UnknownOption` |
//! | Commit rejected | Persistence failure | [`Notice::CommitFailed`], control shows committed value |
//! | Transform error | Malformed stored value | [`Notice::TransformWarning`], raw value shown |
//! | Predicate error | Custom predicate failed | [`Notice::PredicateFailed`], subtree shown |

use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use subform_core::{CommitTicket, KeyPath, OverlayStatus, Resolve, SettingValue, Source};
use subform_runtime::reactive::BindingScope;
use subform_runtime::{CommitOutcome, OutcomeReceiver, Reconciled, SettingsStore, WriteReceipt};

use crate::control::{Archetype, ControlId, ControlSpec, DisplayValue};
use crate::modifications::ModificationRegistry;
use crate::options::OptionSet;
use crate::visibility::{CollapseBox, Evaluation, MountState, Predicate};

const MASK: &str = "********";

/// Errors from form input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// The control is inside an unmounted subtree.
    Inert(ControlId),
    /// No control with this id was declared on the form.
    UnknownControl(ControlId),
    /// No control on the form binds to this key.
    UnknownKey(KeyPath),
    /// The display value has the wrong shape for the control.
    Mismatch {
        control: ControlId,
        expected: &'static str,
        found: &'static str,
    },
    /// The selected identifier is not one of the declared options.
    UnknownOption { control: ControlId, value: String },
    /// The selector cannot be cleared.
    NotClearable(ControlId),
    /// Text input could not be read as a value for the control.
    Parse { control: ControlId, input: String },
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inert(id) => write!(f, "{id} is hidden and does not accept input"),
            Self::UnknownControl(id) => write!(f, "{id} is not on this form"),
            Self::UnknownKey(key) => write!(f, "no control binds to '{key}'"),
            Self::Mismatch {
                control,
                expected,
                found,
            } => write!(f, "{control} expects a {expected} value, got {found}"),
            Self::UnknownOption { control, value } => {
                write!(f, "'{value}' is not an option of {control}")
            }
            Self::NotClearable(id) => write!(f, "{id} requires a selection"),
            Self::Parse { control, input } => write!(f, "cannot read '{input}' for {control}"),
        }
    }
}

impl std::error::Error for FormError {}

/// Transient, user-facing message raised by the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    CommitFailed { key: KeyPath, reason: String },
    TransformWarning { key: KeyPath, message: String },
    PredicateFailed { key: KeyPath, message: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommitFailed { key, reason } => write!(f, "could not save {key}: {reason}"),
            Self::TransformWarning { key, message } => write!(f, "{key}: {message}"),
            Self::PredicateFailed { key, message } => write!(f, "{key}: {message}"),
        }
    }
}

/// Declarative page element.
#[derive(Debug, Clone)]
pub enum FormNode {
    Section {
        title: String,
        children: Vec<FormNode>,
    },
    Control(ControlSpec),
    /// Subtree shown only while `predicate` holds for the value at `key`.
    Collapse {
        key: KeyPath,
        predicate: Predicate,
        indent: bool,
        children: Vec<FormNode>,
    },
    Message(String),
    Link {
        label: String,
        url: String,
    },
    /// Static reference table (e.g. command placeholders).
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

impl FormNode {
    pub fn section(title: impl Into<String>, children: Vec<FormNode>) -> Self {
        Self::Section {
            title: title.into(),
            children,
        }
    }

    /// Indented conditional subtree.
    pub fn collapse(key: KeyPath, predicate: Predicate, children: Vec<FormNode>) -> Self {
        Self::Collapse {
            key,
            predicate,
            indent: true,
            children,
        }
    }

    /// Conditional subtree rendered at the parent's depth.
    pub fn collapse_flat(key: KeyPath, predicate: Predicate, children: Vec<FormNode>) -> Self {
        Self::Collapse {
            key,
            predicate,
            indent: false,
            children,
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::Message(text.into())
    }

    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Link {
            label: label.into(),
            url: url.into(),
        }
    }

    pub fn table(columns: &[&str], rows: Vec<Vec<String>>) -> Self {
        Self::Table {
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            rows,
        }
    }
}

impl From<ControlSpec> for FormNode {
    fn from(spec: ControlSpec) -> Self {
        Self::Control(spec)
    }
}

/// Rendered control.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlView {
    pub id: ControlId,
    pub key: KeyPath,
    pub label: String,
    pub description: Option<String>,
    pub placeholder: Option<String>,
    pub kind: &'static str,
    pub depth: usize,
    pub display: DisplayValue,
    pub source: Source,
    /// Display and draft are masked (password).
    pub masked: bool,
    pub draft: Option<DisplayValue>,
    pub failure: Option<String>,
    pub warning: Option<String>,
    pub options: Option<OptionSet>,
    pub bounds: Option<(f64, f64)>,
}

impl ControlView {
    /// The value is an unsaved edit.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.source == Source::Overlay
    }
}

/// One mounted element of a rendered form.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewNode {
    Section { depth: usize, title: String },
    Group { depth: usize, key: KeyPath, indent: bool },
    Control(ControlView),
    Message { depth: usize, text: String },
    Link { depth: usize, label: String, url: String },
    Table {
        depth: usize,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

/// Renderer-agnostic view model of the mounted form.
#[derive(Debug, Clone, PartialEq)]
pub struct FormView {
    pub revision: u64,
    pub nodes: Vec<ViewNode>,
}

impl FormView {
    pub fn controls(&self) -> impl Iterator<Item = &ControlView> {
        self.nodes.iter().filter_map(|node| match node {
            ViewNode::Control(view) => Some(view),
            _ => None,
        })
    }

    /// First rendered control bound to `key`.
    #[must_use]
    pub fn control(&self, key: &str) -> Option<&ControlView> {
        self.controls().find(|view| view.key.as_str() == key)
    }

    /// Whether any rendered control binds to `key`.
    #[must_use]
    pub fn shows(&self, key: &str) -> bool {
        self.control(key).is_some()
    }
}

impl fmt::Display for FormView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            match node {
                ViewNode::Section { depth, title } => {
                    writeln!(f, "{:indent$}== {title} ==", "", indent = depth * 2)?;
                }
                ViewNode::Group { .. } => {}
                ViewNode::Control(view) => {
                    write!(
                        f,
                        "{:indent$}{} [{}] = {}",
                        "",
                        view.label,
                        view.key,
                        view.display,
                        indent = view.depth * 2
                    )?;
                    if view.is_pending() {
                        f.write_str(" (unsaved)")?;
                    } else if view.source == Source::Default {
                        f.write_str(" (default)")?;
                    }
                    if let Some(reason) = &view.failure {
                        write!(f, " (save failed: {reason})")?;
                    }
                    writeln!(f)?;
                }
                ViewNode::Message { depth, text } => {
                    writeln!(f, "{:indent$}{text}", "", indent = depth * 2)?;
                }
                ViewNode::Link { depth, label, url } => {
                    writeln!(f, "{:indent$}{label} <{url}>", "", indent = depth * 2)?;
                }
                ViewNode::Table {
                    depth,
                    columns,
                    rows,
                } => {
                    writeln!(f, "{:indent$}{}", "", columns.join(" | "), indent = depth * 2)?;
                    for row in rows {
                        writeln!(f, "{:indent$}{}", "", row.join(" | "), indent = depth * 2)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Observable state of one collapse box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxInfo {
    pub key: KeyPath,
    pub state: MountState,
    pub transitions: u64,
    /// All enclosing boxes are mounted, so this one reacts to changes.
    pub active: bool,
    pub depth: usize,
}

#[derive(Debug)]
enum SlotKind {
    Section(String),
    Control(ControlSpec),
    Collapse { cbox: CollapseBox, indent: bool },
    Message(String),
    Link { label: String, url: String },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

#[derive(Debug)]
struct Slot {
    kind: SlotKind,
    /// Nearest enclosing collapse box.
    guard: Option<usize>,
    depth: usize,
    /// End (exclusive) of this node's subtree in pre-order.
    end: usize,
}

struct FormState {
    store: SettingsStore,
    slots: Vec<Slot>,
    controls: AHashMap<ControlId, usize>,
    drafts: AHashMap<ControlId, DisplayValue>,
    warned: AHashSet<ControlId>,
    notices: Vec<Notice>,
}

fn flatten(nodes: Vec<FormNode>, guard: Option<usize>, depth: usize, slots: &mut Vec<Slot>) {
    for node in nodes {
        let index = slots.len();
        let (kind, children, child_guard, child_depth) = match node {
            FormNode::Section { title, children } => {
                (SlotKind::Section(title), children, guard, depth + 1)
            }
            FormNode::Control(spec) => (SlotKind::Control(spec), Vec::new(), guard, depth),
            FormNode::Collapse {
                key,
                predicate,
                indent,
                children,
            } => (
                SlotKind::Collapse {
                    cbox: CollapseBox::new(key, predicate),
                    indent,
                },
                children,
                Some(index),
                if indent { depth + 1 } else { depth },
            ),
            FormNode::Message(text) => (SlotKind::Message(text), Vec::new(), guard, depth),
            FormNode::Link { label, url } => {
                (SlotKind::Link { label, url }, Vec::new(), guard, depth)
            }
            FormNode::Table { columns, rows } => {
                (SlotKind::Table { columns, rows }, Vec::new(), guard, depth)
            }
        };
        slots.push(Slot {
            kind,
            guard,
            depth,
            end: index + 1,
        });
        flatten(children, child_guard, child_depth, slots);
        slots[index].end = slots.len();
    }
}

impl FormState {
    fn is_active(&self, index: usize) -> bool {
        let mut guard = self.slots[index].guard;
        while let Some(g) = guard {
            match &self.slots[g].kind {
                SlotKind::Collapse { cbox, .. } if cbox.is_mounted() => guard = self.slots[g].guard,
                _ => return false,
            }
        }
        true
    }

    fn control(&self, id: ControlId) -> Result<(usize, &ControlSpec), FormError> {
        let index = *self
            .controls
            .get(&id)
            .ok_or(FormError::UnknownControl(id))?;
        match &self.slots[index].kind {
            SlotKind::Control(spec) => Ok((index, spec)),
            _ => Err(FormError::UnknownControl(id)),
        }
    }

    fn active_control(&self, id: ControlId) -> Result<&ControlSpec, FormError> {
        let (index, spec) = self.control(id)?;
        if self.is_active(index) {
            Ok(spec)
        } else {
            Err(FormError::Inert(id))
        }
    }

    fn note_evaluation(&mut self, key: &KeyPath, evaluation: Evaluation) {
        if let Some(err) = evaluation.error {
            self.notices.push(Notice::PredicateFailed {
                key: key.clone(),
                message: err.to_string(),
            });
        }
    }

    /// Initialize every reachable box in `start..end`, in pre-order.
    fn initialize_range(&mut self, start: usize, end: usize) {
        for index in start..end {
            let key = match &self.slots[index].kind {
                SlotKind::Collapse { cbox, .. } => cbox.key().clone(),
                _ => continue,
            };
            if !self.is_active(index) {
                continue;
            }
            let value = self.store.resolve(&key).value;
            if let SlotKind::Collapse { cbox, .. } = &mut self.slots[index].kind {
                let evaluation = cbox.initialize(value.as_ref());
                self.note_evaluation(&key, evaluation);
            }
        }
    }

    fn discard_drafts(&mut self, index: usize) {
        for slot in &self.slots[index + 1..self.slots[index].end] {
            if let SlotKind::Control(spec) = &slot.kind {
                self.drafts.remove(&spec.id());
                self.warned.remove(&spec.id());
            }
        }
    }

    fn on_watch(&mut self, index: usize, value: Option<&SettingValue>) {
        if !self.is_active(index) {
            return;
        }
        let SlotKind::Collapse { cbox, .. } = &mut self.slots[index].kind else {
            return;
        };
        let (flip, evaluation) = cbox.observe(value);
        let key = cbox.key().clone();
        self.note_evaluation(&key, evaluation);
        match flip {
            Some(MountState::Mounted) => {
                self.discard_drafts(index);
                self.initialize_range(index + 1, self.slots[index].end);
            }
            Some(MountState::Unmounted) => self.discard_drafts(index),
            None => {}
        }
    }
}

/// A mounted form bound to a settings store.
pub struct Form {
    state: Rc<RefCell<FormState>>,
    store: SettingsStore,
    registry: Option<ModificationRegistry>,
    _scope: BindingScope,
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Form")
            .field("nodes", &state.slots.len())
            .field("controls", &state.controls.len())
            .field("drafts", &state.drafts.len())
            .finish()
    }
}

impl Form {
    /// Mount `nodes` against `store`: evaluate visibility and subscribe.
    pub fn mount(store: &SettingsStore, nodes: Vec<FormNode>) -> Self {
        let _span = tracing::debug_span!("form.mount", nodes = nodes.len()).entered();
        let mut slots = Vec::new();
        flatten(nodes, None, 0, &mut slots);
        let controls = slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.kind {
                SlotKind::Control(spec) => Some((spec.id(), index)),
                _ => None,
            })
            .collect();
        let watched: Vec<(usize, KeyPath)> = slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.kind {
                SlotKind::Collapse { cbox, .. } => Some((index, cbox.key().clone())),
                _ => None,
            })
            .collect();
        let len = slots.len();
        let state = Rc::new(RefCell::new(FormState {
            store: store.clone(),
            slots,
            controls,
            drafts: AHashMap::new(),
            warned: AHashSet::new(),
            notices: Vec::new(),
        }));
        state.borrow_mut().initialize_range(0, len);

        let mut scope = BindingScope::new();
        for (index, key) in watched {
            let weak = Rc::downgrade(&state);
            scope.watch(store, &key, move |value| {
                if let Some(state) = weak.upgrade() {
                    state.borrow_mut().on_watch(index, value);
                }
            });
        }
        tracing::debug!(boxes = scope.len(), "form mounted");
        Self {
            state,
            store: store.clone(),
            registry: None,
            _scope: scope,
        }
    }

    /// Keep the registry's aggregated list in sync with its entry controls.
    #[must_use]
    pub fn with_registry(mut self, registry: ModificationRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> Option<&ModificationRegistry> {
        self.registry.as_ref()
    }

    /// Declared control ids, in declaration order.
    #[must_use]
    pub fn control_ids(&self) -> Vec<ControlId> {
        self.state
            .borrow()
            .slots
            .iter()
            .filter_map(|slot| match &slot.kind {
                SlotKind::Control(spec) => Some(spec.id()),
                _ => None,
            })
            .collect()
    }

    /// Descriptor of a declared control.
    #[must_use]
    pub fn control(&self, id: ControlId) -> Option<ControlSpec> {
        self.state
            .borrow()
            .control(id)
            .ok()
            .map(|(_, spec)| spec.clone())
    }

    /// First declared control bound to `key`.
    #[must_use]
    pub fn control_for(&self, key: &KeyPath) -> Option<ControlId> {
        self.controls_for(key).into_iter().next()
    }

    fn controls_for(&self, key: &KeyPath) -> Vec<ControlId> {
        self.state
            .borrow()
            .slots
            .iter()
            .filter_map(|slot| match &slot.kind {
                SlotKind::Control(spec) if spec.key() == key => Some(spec.id()),
                _ => None,
            })
            .collect()
    }

    /// Whether the control is currently mounted.
    pub fn is_visible(&self, id: ControlId) -> Result<bool, FormError> {
        let state = self.state.borrow();
        let (index, _) = state.control(id)?;
        Ok(state.is_active(index))
    }

    /// Current display value of a mounted control.
    pub fn display(&self, id: ControlId) -> Result<DisplayValue, FormError> {
        let state = self.state.borrow();
        let spec = state.active_control(id)?;
        Ok(spec.current_display(&self.store).display)
    }

    /// Record an in-progress edit without writing it.
    pub fn set_draft(&self, id: ControlId, display: DisplayValue) -> Result<(), FormError> {
        let mut state = self.state.borrow_mut();
        state.active_control(id)?.validate(&display)?;
        state.drafts.insert(id, display);
        Ok(())
    }

    #[must_use]
    pub fn draft(&self, id: ControlId) -> Option<DisplayValue> {
        self.state.borrow().drafts.get(&id).cloned()
    }

    /// Write the control's draft, if it has one.
    pub fn submit(&self, id: ControlId) -> Result<Option<WriteReceipt>, FormError> {
        let draft = {
            let state = self.state.borrow();
            state.active_control(id)?;
            state.drafts.get(&id).cloned()
        };
        match draft {
            Some(display) => self.change(id, display).map(Some),
            None => Ok(None),
        }
    }

    /// User change: save transform, overlay write, commit.
    pub fn change(&self, id: ControlId, display: DisplayValue) -> Result<WriteReceipt, FormError> {
        let (key, stored, sensitive) = {
            let state = self.state.borrow();
            let spec = state.active_control(id)?;
            let stored = spec.stored_from_display(&display)?;
            (spec.key().clone(), stored, spec.is_sensitive())
        };
        self.state.borrow_mut().drafts.remove(&id);
        let _span = tracing::debug_span!("form.change", control = %id, key = %key).entered();
        let receipt = if sensitive {
            self.store.write_sensitive(key.clone(), stored)
        } else {
            self.store.write(key.clone(), stored)
        };
        if let Some(registry) = &self.registry {
            if registry.contains(&key) {
                registry.sync(&self.store);
            }
        }
        Ok(receipt)
    }

    /// Change the first mounted control bound to `key`.
    pub fn change_key(&self, key: &KeyPath, display: DisplayValue) -> Result<WriteReceipt, FormError> {
        let id = self.visible_control_for(key)?;
        self.change(id, display)
    }

    /// Parse `input` for the first mounted control bound to `key` and change it.
    pub fn change_text(&self, key: &KeyPath, input: &str) -> Result<WriteReceipt, FormError> {
        let id = self.visible_control_for(key)?;
        let display = {
            let state = self.state.borrow();
            state.active_control(id)?.parse_display(input)?
        };
        self.change(id, display)
    }

    fn visible_control_for(&self, key: &KeyPath) -> Result<ControlId, FormError> {
        let candidates = self.controls_for(key);
        let Some(first) = candidates.first().copied() else {
            return Err(FormError::UnknownKey(key.clone()));
        };
        let state = self.state.borrow();
        Ok(candidates
            .into_iter()
            .find(|id| state.active_control(*id).is_ok())
            .unwrap_or(first))
    }

    /// Dispatch staged edits (deferred commit mode).
    pub fn save(&self) -> Vec<CommitTicket> {
        let _span = tracing::debug_span!("form.save").entered();
        self.store.save()
    }

    /// Drop the control's draft and pending store entry.
    pub fn revert(&self, id: ControlId) -> Result<bool, FormError> {
        let key = {
            let mut state = self.state.borrow_mut();
            let key = state.control(id)?.1.key().clone();
            state.drafts.remove(&id);
            key
        };
        Ok(self.store.revert(&key))
    }

    /// Reconcile a persistence outcome and raise a notice on failure.
    pub fn apply_outcome(&self, ticket: CommitTicket, outcome: CommitOutcome) -> Reconciled {
        let reconciled = self.store.apply_outcome(ticket, outcome);
        self.note_reconciled(&reconciled);
        reconciled
    }

    /// Apply every queued outcome without blocking.
    pub fn drain_outcomes(&self, outcomes: &OutcomeReceiver) -> Vec<Reconciled> {
        let reconciled = self.store.drain_outcomes(outcomes);
        for item in &reconciled {
            self.note_reconciled(item);
        }
        reconciled
    }

    fn note_reconciled(&self, reconciled: &Reconciled) {
        if let Reconciled::Failed { key, reason } = reconciled {
            self.state.borrow_mut().notices.push(Notice::CommitFailed {
                key: key.clone(),
                reason: reason.clone(),
            });
        }
    }

    /// Take the notices raised since the last call.
    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut self.state.borrow_mut().notices)
    }

    /// Collapse boxes in declaration order.
    #[must_use]
    pub fn collapse_boxes(&self) -> Vec<BoxInfo> {
        let state = self.state.borrow();
        state
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.kind {
                SlotKind::Collapse { cbox, .. } => Some(BoxInfo {
                    key: cbox.key().clone(),
                    state: cbox.state(),
                    transitions: cbox.transitions(),
                    active: state.is_active(index),
                    depth: slot.depth,
                }),
                _ => None,
            })
            .collect()
    }

    /// Render the mounted part of the form against one snapshot.
    #[must_use]
    pub fn render(&self) -> FormView {
        let snapshot = self.store.snapshot();
        let _span = tracing::debug_span!("form.render", revision = snapshot.revision()).entered();
        let mut state = self.state.borrow_mut();
        let mut nodes = Vec::new();
        let mut warnings: Vec<(ControlId, KeyPath, Option<String>)> = Vec::new();
        let mut index = 0;
        while index < state.slots.len() {
            let slot = &state.slots[index];
            let depth = slot.depth;
            match &slot.kind {
                SlotKind::Collapse { cbox, indent } => {
                    if !cbox.is_mounted() {
                        index = slot.end;
                        continue;
                    }
                    nodes.push(ViewNode::Group {
                        depth,
                        key: cbox.key().clone(),
                        indent: *indent,
                    });
                }
                SlotKind::Section(title) => nodes.push(ViewNode::Section {
                    depth,
                    title: title.clone(),
                }),
                SlotKind::Message(text) => nodes.push(ViewNode::Message {
                    depth,
                    text: text.clone(),
                }),
                SlotKind::Link { label, url } => nodes.push(ViewNode::Link {
                    depth,
                    label: label.clone(),
                    url: url.clone(),
                }),
                SlotKind::Table { columns, rows } => nodes.push(ViewNode::Table {
                    depth,
                    columns: columns.clone(),
                    rows: rows.clone(),
                }),
                SlotKind::Control(spec) => {
                    let presented = spec.current_display(&snapshot);
                    let warning = presented.warning.as_ref().map(ToString::to_string);
                    warnings.push((spec.id(), spec.key().clone(), warning.clone()));
                    let masked = spec.is_sensitive();
                    let mask = |display: DisplayValue| match display {
                        DisplayValue::Text(text) if masked && !text.is_empty() => {
                            DisplayValue::Text(MASK.to_owned())
                        }
                        other => other,
                    };
                    let failure = snapshot.overlay().entry(spec.key()).and_then(|entry| {
                        match &entry.status {
                            OverlayStatus::Failed { reason, .. } => Some(reason.clone()),
                            _ => None,
                        }
                    });
                    let (options, bounds) = match spec.archetype() {
                        Archetype::Select { options, .. } => (Some(options.clone()), None),
                        Archetype::Slider { min, max } => (None, Some((*min, *max))),
                        _ => (None, None),
                    };
                    nodes.push(ViewNode::Control(ControlView {
                        id: spec.id(),
                        key: spec.key().clone(),
                        label: spec.label().to_owned(),
                        description: spec.description().map(str::to_owned),
                        placeholder: spec.placeholder().map(str::to_owned),
                        kind: spec.archetype().name(),
                        depth,
                        display: mask(presented.display),
                        source: presented.source,
                        masked,
                        draft: state.drafts.get(&spec.id()).cloned().map(mask),
                        failure,
                        warning,
                        options,
                        bounds,
                    }));
                }
            }
            index += 1;
        }
        for (id, key, warning) in warnings {
            match warning {
                Some(message) => {
                    if state.warned.insert(id) {
                        tracing::warn!(key = %key, %message, "load transform failed; showing raw value");
                        state.notices.push(Notice::TransformWarning { key, message });
                    }
                }
                None => {
                    state.warned.remove(&id);
                }
            }
        }
        FormView {
            revision: snapshot.revision(),
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subform_core::{LoadTransform, SettingsDocument};
    use subform_runtime::RecordingPersistence;
    use tracing_test::traced_test;

    fn key(text: &str) -> KeyPath {
        KeyPath::parse(text).unwrap()
    }

    fn store_with(entries: &[(&str, SettingValue)]) -> (SettingsStore, RecordingPersistence) {
        let rec = RecordingPersistence::new();
        let store = SettingsStore::new(rec.clone());
        let mut doc = SettingsDocument::new();
        for (k, v) in entries {
            doc.set(&key(k), v.clone()).unwrap();
        }
        store.replace_document(doc);
        (store, rec)
    }

    /// Outer toggle guarding an inner toggle guarding a text field.
    fn nested_page() -> (Vec<FormNode>, ControlId, ControlId, ControlId) {
        let outer = ControlSpec::toggle(key("settings-general-use_postprocessing"), "Post-processing");
        let inner = ControlSpec::toggle(key("settings-general-use_postprocessing_threshold"), "Threshold");
        let text = ControlSpec::text(key("settings-general-postprocessing_cmd"), "Command");
        let ids = (outer.id(), inner.id(), text.id());
        let page = vec![FormNode::section(
            "Post-Processing",
            vec![
                outer.into(),
                FormNode::collapse(
                    key("settings-general-use_postprocessing"),
                    Predicate::Truthy,
                    vec![
                        inner.into(),
                        FormNode::collapse(
                            key("settings-general-use_postprocessing_threshold"),
                            Predicate::Truthy,
                            vec![text.into()],
                        ),
                    ],
                ),
            ],
        )];
        (page, ids.0, ids.1, ids.2)
    }

    #[test]
    fn initial_visibility_follows_committed_values() {
        let (store, _rec) = store_with(&[
            ("settings-general-use_postprocessing", true.into()),
            ("settings-general-use_postprocessing_threshold", false.into()),
        ]);
        let (page, _, inner, text) = nested_page();
        let form = Form::mount(&store, page);
        assert_eq!(form.is_visible(inner), Ok(true));
        assert_eq!(form.is_visible(text), Ok(false));
        let view = form.render();
        assert!(view.shows("settings-general-use_postprocessing_threshold"));
        assert!(!view.shows("settings-general-postprocessing_cmd"));
    }

    #[test]
    fn unsaved_edit_mounts_subtree() {
        let (store, _rec) = store_with(&[("settings-general-use_postprocessing", false.into())]);
        let (page, outer, inner, _) = nested_page();
        let form = Form::mount(&store, page);
        assert_eq!(form.is_visible(inner), Ok(false));
        form.change(outer, DisplayValue::Bool(true)).unwrap();
        assert_eq!(form.is_visible(inner), Ok(true));
        let boxes = form.collapse_boxes();
        assert_eq!(boxes[0].transitions, 1);
        assert_eq!(boxes[0].state, MountState::Mounted);
    }

    #[test]
    fn dropped_form_releases_store_watchers() {
        let (store, _rec) = store_with(&[("settings-general-use_postprocessing", true.into())]);
        let (page, _, _, _) = nested_page();
        let form = Form::mount(&store, page);
        assert_eq!(store.watcher_count(), 2);
        drop(form);
        store.replace_document(SettingsDocument::new());
        assert_eq!(store.watcher_count(), 0);
    }

    #[test]
    fn nested_box_is_inert_while_ancestor_hidden() {
        let (store, _rec) = store_with(&[
            ("settings-general-use_postprocessing", false.into()),
            ("settings-general-use_postprocessing_threshold", false.into()),
        ]);
        let (page, outer, _, text) = nested_page();
        let form = Form::mount(&store, page);
        store.write(key("settings-general-use_postprocessing_threshold"), true.into());
        let boxes = form.collapse_boxes();
        assert!(!boxes[1].active);
        assert_eq!(boxes[1].transitions, 0);
        assert_eq!(
            form.change(text, DisplayValue::Text("x".into())),
            Err(FormError::Inert(text))
        );
        // Mounting the ancestor initializes the nested box from current state.
        form.change(outer, DisplayValue::Bool(true)).unwrap();
        assert_eq!(form.is_visible(text), Ok(true));
        assert_eq!(form.collapse_boxes()[1].transitions, 0);
    }

    #[test]
    fn unmount_discards_drafts_but_keeps_store_values() {
        let (store, _rec) = store_with(&[
            ("settings-general-use_postprocessing", true.into()),
            ("settings-general-use_postprocessing_threshold", true.into()),
            ("settings-general-postprocessing_cmd", "echo {{subtitles}}".into()),
        ]);
        let (page, outer, _, text) = nested_page();
        let form = Form::mount(&store, page);
        form.set_draft(text, DisplayValue::Text("half-typed".into())).unwrap();
        assert!(form.draft(text).is_some());
        form.change(outer, DisplayValue::Bool(false)).unwrap();
        assert_eq!(form.draft(text), None);
        form.change(outer, DisplayValue::Bool(true)).unwrap();
        assert_eq!(form.draft(text), None);
        assert_eq!(
            form.display(text),
            Ok(DisplayValue::Text("echo {{subtitles}}".into()))
        );
    }

    #[test]
    fn submit_writes_draft() {
        let (store, rec) = store_with(&[]);
        let text = ControlSpec::text(key("settings-general-path_mappings"), "Mappings");
        let id = text.id();
        let form = Form::mount(&store, vec![text.into()]);
        assert_eq!(form.submit(id), Ok(None));
        form.set_draft(id, DisplayValue::Text("/a:/b".into())).unwrap();
        let receipt = form.submit(id).unwrap().unwrap();
        assert!(receipt.ticket.is_some());
        assert_eq!(rec.pending_len(), 1);
        assert_eq!(form.draft(id), None);
    }

    #[test]
    fn unknown_control_and_key() {
        let (store, _rec) = store_with(&[]);
        let stray = ControlSpec::toggle(key("a-b"), "x");
        let form = Form::mount(&store, vec![]);
        assert_eq!(
            form.change(stray.id(), DisplayValue::Bool(true)),
            Err(FormError::UnknownControl(stray.id()))
        );
        assert_eq!(
            form.change_key(&key("a-b"), DisplayValue::Bool(true)),
            Err(FormError::UnknownKey(key("a-b")))
        );
    }

    #[test]
    fn commit_failure_raises_notice_and_view_failure() {
        let (store, rec) = store_with(&[("settings-general-debug", false.into())]);
        let toggle = ControlSpec::toggle(key("settings-general-debug"), "Debug");
        let id = toggle.id();
        let form = Form::mount(&store, vec![toggle.into()]);
        form.change(id, DisplayValue::Bool(true)).unwrap();
        let request = rec.take_pending().remove(0);
        form.apply_outcome(request.ticket, CommitOutcome::Failure("HTTP 500".into()));
        let view = form.render();
        let control = view.control("settings-general-debug").unwrap();
        assert_eq!(control.display, DisplayValue::Bool(false));
        assert_eq!(control.failure.as_deref(), Some("HTTP 500"));
        assert_eq!(
            form.take_notices(),
            vec![Notice::CommitFailed {
                key: key("settings-general-debug"),
                reason: "HTTP 500".into(),
            }]
        );
        assert!(form.take_notices().is_empty());
    }

    #[test]
    fn password_is_masked_in_view() {
        let (store, rec) = store_with(&[]);
        let pw = ControlSpec::password(key("settings-deathbycaptcha-password"), "Password");
        let id = pw.id();
        let form = Form::mount(&store, vec![pw.into()]);
        form.change(id, DisplayValue::Text("s3cret".into())).unwrap();
        let view = form.render();
        let control = view.control("settings-deathbycaptcha-password").unwrap();
        assert!(control.masked);
        assert_eq!(control.display, DisplayValue::Text(MASK.into()));
        assert!(!view.to_string().contains("s3cret"));
        assert!(rec.pending()[0].sensitive);
    }

    #[traced_test]
    #[test]
    fn transform_warning_is_raised_once() {
        let (store, _rec) = store_with(&[("settings-general-subzero_mods", 3u32.into())]);
        let toggle = ControlSpec::toggle(key("subzero-common"), "Common fixes").on_load(
            LoadTransform::ListContains {
                list: key("settings-general-subzero_mods"),
                item: "common".into(),
            },
        );
        let form = Form::mount(&store, vec![toggle.into()]);
        let first = form.render();
        assert!(first.control("subzero-common").unwrap().warning.is_some());
        form.render();
        let notices = form.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(matches!(notices[0], Notice::TransformWarning { .. }));
        assert!(logs_contain("load transform failed"));
    }

    #[test]
    fn render_skips_hidden_subtrees_and_keeps_order() {
        let (store, _rec) = store_with(&[("settings-general-subfolder", "current".into())]);
        let folder = ControlSpec::select(
            key("settings-general-subfolder"),
            "Subtitle Folder",
            OptionSet::from_pairs(&[("current", "AlongSide"), ("relative", "Relative")]),
        );
        let custom = ControlSpec::text(key("settings-general-subfolder_custom"), "Custom Folder");
        let id = folder.id();
        let form = Form::mount(
            &store,
            vec![
                folder.into(),
                FormNode::collapse(
                    key("settings-general-subfolder"),
                    Predicate::NonEmptyExcept(vec!["current".into()]),
                    vec![custom.into()],
                ),
                FormNode::message("Choose the folder you wish to store/read the subtitles"),
            ],
        );
        assert_eq!(form.render().controls().count(), 1);
        form.change(id, DisplayValue::Choice(Some("relative".into())))
            .unwrap();
        let view = form.render();
        let keys: Vec<&str> = view.controls().map(|c| c.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["settings-general-subfolder", "settings-general-subfolder_custom"]
        );
        assert_eq!(view.control("settings-general-subfolder_custom").unwrap().depth, 1);
    }
}
