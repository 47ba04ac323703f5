#![forbid(unsafe_code)]

//! Persistence collaborator interface and adapters.
//!
//! The store hands every write to a [`Persistence`] implementation as a
//! [`CommitRequest`] and later receives the [`CommitOutcome`] through
//! [`SettingsStore::apply_outcome`](crate::store::SettingsStore::apply_outcome).
//! How long that takes, and whether it times out, is the collaborator's
//! business.
//!
//! Adapters:
//!
//! - [`RecordingPersistence`]: queues requests in memory. Callers (tests, the
//!   demo) decide each outcome and feed it back.
//! - [`ChannelPersistence`]: forwards requests to a worker thread over
//!   `std::sync::mpsc`; outcomes come back through an [`OutcomeReceiver`] that
//!   the event loop drains with
//!   [`SettingsStore::drain_outcomes`](crate::store::SettingsStore::drain_outcomes).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;

use subform_core::{CommitTicket, KeyPath, SettingValue};

/// One write handed to persistence.
#[derive(Clone, PartialEq)]
pub struct CommitRequest {
    pub ticket: CommitTicket,
    pub key: KeyPath,
    pub value: SettingValue,
    /// Value is a secret (password field); never printed.
    pub sensitive: bool,
}

impl fmt::Debug for CommitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("CommitRequest");
        s.field("ticket", &self.ticket).field("key", &self.key);
        if self.sensitive {
            s.field("value", &"<redacted>");
        } else {
            s.field("value", &self.value);
        }
        s.finish()
    }
}

/// Result of one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Success,
    /// Rejected, with a human-readable reason.
    Failure(String),
}

/// Outcome tagged with the ticket it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResponse {
    pub ticket: CommitTicket,
    pub outcome: CommitOutcome,
}

/// Sink for write requests.
pub trait Persistence {
    /// Start committing `request`. The outcome is delivered later.
    fn commit(&mut self, request: CommitRequest);

    /// Hint that `ticket` was superseded or reverted; its outcome will be
    /// ignored. Implementations may drop the work.
    fn cancel(&mut self, ticket: CommitTicket) {
        let _ = ticket;
    }
}

#[derive(Debug, Default)]
struct RecordingLog {
    pending: VecDeque<CommitRequest>,
    history: Vec<CommitRequest>,
    cancelled: Vec<CommitTicket>,
}

/// In-memory persistence that records requests for the caller to settle.
///
/// Clones share one log, so a test keeps a handle while the store owns
/// another.
#[derive(Clone, Debug, Default)]
pub struct RecordingPersistence {
    log: Rc<RefCell<RecordingLog>>,
}

impl RecordingPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests not yet taken.
    #[must_use]
    pub fn pending(&self) -> Vec<CommitRequest> {
        self.log.borrow().pending.iter().cloned().collect()
    }

    /// Remove and return all requests not yet taken, oldest first.
    pub fn take_pending(&self) -> Vec<CommitRequest> {
        self.log.borrow_mut().pending.drain(..).collect()
    }

    /// Every request ever received, in order.
    #[must_use]
    pub fn history(&self) -> Vec<CommitRequest> {
        self.log.borrow().history.clone()
    }

    /// Tickets reported as superseded or reverted.
    #[must_use]
    pub fn cancelled(&self) -> Vec<CommitTicket> {
        self.log.borrow().cancelled.clone()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.log.borrow().pending.len()
    }
}

impl Persistence for RecordingPersistence {
    fn commit(&mut self, request: CommitRequest) {
        let mut log = self.log.borrow_mut();
        log.history.push(request.clone());
        log.pending.push_back(request);
    }

    fn cancel(&mut self, ticket: CommitTicket) {
        let mut log = self.log.borrow_mut();
        log.pending.retain(|request| request.ticket != ticket);
        log.cancelled.push(ticket);
    }
}

enum WorkerMessage {
    Commit(CommitRequest),
    Cancel(CommitTicket),
}

/// Receiving end of a [`ChannelPersistence`] worker.
pub struct OutcomeReceiver {
    rx: mpsc::Receiver<CommitResponse>,
}

impl OutcomeReceiver {
    /// Next available response without blocking.
    #[must_use]
    pub fn try_recv(&self) -> Option<CommitResponse> {
        self.rx.try_recv().ok()
    }

    /// Block until a response arrives. `None` once the [`ChannelPersistence`]
    /// is dropped and the queue is empty.
    #[must_use]
    pub fn recv(&self) -> Option<CommitResponse> {
        self.rx.recv().ok()
    }
}

impl fmt::Debug for OutcomeReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutcomeReceiver").finish_non_exhaustive()
    }
}

/// Persistence that commits on a worker thread.
pub struct ChannelPersistence {
    tx: Option<mpsc::Sender<WorkerMessage>>,
    loopback: mpsc::Sender<CommitResponse>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ChannelPersistence {
    /// Spawn a worker that answers each request with `handler`.
    pub fn spawn<F>(mut handler: F) -> (Self, OutcomeReceiver)
    where
        F: FnMut(&CommitRequest) -> CommitOutcome + Send + 'static,
    {
        let (tx, worker_rx) = mpsc::channel::<WorkerMessage>();
        let (out_tx, out_rx) = mpsc::channel::<CommitResponse>();
        let worker_out = out_tx.clone();
        let worker = thread::spawn(move || {
            for message in worker_rx {
                match message {
                    WorkerMessage::Commit(request) => {
                        let outcome = handler(&request);
                        let response = CommitResponse {
                            ticket: request.ticket,
                            outcome,
                        };
                        if worker_out.send(response).is_err() {
                            break;
                        }
                    }
                    WorkerMessage::Cancel(ticket) => {
                        tracing::debug!(%ticket, "commit cancelled");
                    }
                }
            }
        });
        (
            Self {
                tx: Some(tx),
                loopback: out_tx,
                worker: Some(worker),
            },
            OutcomeReceiver { rx: out_rx },
        )
    }
}

impl Persistence for ChannelPersistence {
    fn commit(&mut self, request: CommitRequest) {
        let ticket = request.ticket;
        let sent = self
            .tx
            .as_ref()
            .is_some_and(|tx| tx.send(WorkerMessage::Commit(request)).is_ok());
        if !sent {
            tracing::warn!(%ticket, "persistence worker disconnected");
            let _ = self.loopback.send(CommitResponse {
                ticket,
                outcome: CommitOutcome::Failure("persistence worker disconnected".into()),
            });
        }
    }

    fn cancel(&mut self, ticket: CommitTicket) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(WorkerMessage::Cancel(ticket));
        }
    }
}

impl fmt::Debug for ChannelPersistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelPersistence")
            .field("connected", &self.tx.is_some())
            .finish()
    }
}

impl Drop for ChannelPersistence {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(ticket: u64, key: &str, value: SettingValue, sensitive: bool) -> CommitRequest {
        CommitRequest {
            ticket: CommitTicket::new(ticket),
            key: KeyPath::parse(key).unwrap(),
            value,
            sensitive,
        }
    }

    #[test]
    fn debug_redacts_sensitive_values() {
        let secret = request(1, "settings-anticaptcha-anti_captcha_key", "hunter2".into(), true);
        let text = format!("{secret:?}");
        assert!(text.contains("<redacted>"));
        assert!(!text.contains("hunter2"));

        let plain = request(2, "settings-general-chmod", "0640".into(), false);
        assert!(format!("{plain:?}").contains("0640"));
    }

    #[test]
    fn recording_queues_and_cancels() {
        let rec = RecordingPersistence::new();
        let mut sink = rec.clone();
        sink.commit(request(1, "a-b", true.into(), false));
        sink.commit(request(2, "a-c", false.into(), false));
        sink.cancel(CommitTicket::new(1));
        let pending = rec.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].ticket, CommitTicket::new(2));
        assert_eq!(rec.history().len(), 2);
        assert_eq!(rec.cancelled(), vec![CommitTicket::new(1)]);
        assert_eq!(rec.pending_len(), 0);
    }

    #[test]
    fn channel_worker_answers_in_order() {
        let (mut sink, outcomes) = ChannelPersistence::spawn(|req| {
            if req.key.field() == "bad" {
                CommitOutcome::Failure("rejected".into())
            } else {
                CommitOutcome::Success
            }
        });
        sink.commit(request(1, "a-good", true.into(), false));
        sink.commit(request(2, "a-bad", true.into(), false));
        let first = outcomes.recv().unwrap();
        let second = outcomes.recv().unwrap();
        assert_eq!(first.ticket, CommitTicket::new(1));
        assert_eq!(first.outcome, CommitOutcome::Success);
        assert_eq!(second.outcome, CommitOutcome::Failure("rejected".into()));
    }
}
