#![forbid(unsafe_code)]

//! Deferred notification scopes.
//!
//! While a [`BatchScope`] is alive on the current thread, observables update
//! their values immediately but queue their notifications. When the outermost
//! scope drops, queued notifications run in first-queued order, one per
//! observable.

use std::cell::RefCell;
use std::marker::PhantomData;

type Deferred = Box<dyn FnOnce()>;

#[derive(Default)]
struct BatchState {
    depth: usize,
    queued: Vec<(usize, Deferred)>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Queue `notify` under `id` if a batch is open. Returns `false` otherwise.
///
/// A second request for an `id` already queued is dropped; the queued
/// notification reads the value at flush time.
pub(crate) fn defer(id: usize, notify: impl FnOnce() + 'static) -> bool {
    BATCH.with(|state| {
        let mut state = state.borrow_mut();
        if state.depth == 0 {
            return false;
        }
        if !state.queued.iter().any(|(queued, _)| *queued == id) {
            state.queued.push((id, Box::new(notify)));
        }
        true
    })
}

/// Whether a batch is currently open on this thread.
#[must_use]
pub fn is_batching() -> bool {
    BATCH.with(|state| state.borrow().depth > 0)
}

/// RAII guard that defers observable notifications until dropped.
#[must_use = "notifications are flushed when the scope drops"]
pub struct BatchScope {
    _not_send: PhantomData<*const ()>,
}

impl BatchScope {
    /// Open a (possibly nested) batch.
    pub fn new() -> Self {
        BATCH.with(|state| state.borrow_mut().depth += 1);
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScope").finish()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let flushed = BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.depth = state.depth.saturating_sub(1);
            if state.depth == 0 {
                std::mem::take(&mut state.queued)
            } else {
                Vec::new()
            }
        });
        for (_, notify) in flushed {
            notify();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observable;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn batch_coalesces_notifications() {
        let obs = Observable::new(0);
        let hits = Rc::new(Cell::new(0));
        let last = Rc::new(Cell::new(0));
        let (h, l) = (Rc::clone(&hits), Rc::clone(&last));
        let _sub = obs.subscribe(move |v| {
            h.set(h.get() + 1);
            l.set(*v);
        });
        {
            let _batch = BatchScope::new();
            obs.set(1);
            obs.set(2);
            obs.set(3);
            assert_eq!(obs.get(), 3);
            assert_eq!(hits.get(), 0);
        }
        assert_eq!(hits.get(), 1);
        assert_eq!(last.get(), 3);
    }

    #[test]
    fn nested_scopes_flush_at_outermost() {
        let obs = Observable::new(0);
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = obs.subscribe(move |_| h.set(h.get() + 1));
        let outer = BatchScope::new();
        {
            let _inner = BatchScope::new();
            obs.set(1);
        }
        assert_eq!(hits.get(), 0);
        assert!(is_batching());
        drop(outer);
        assert_eq!(hits.get(), 1);
        assert!(!is_batching());
    }

    #[test]
    fn flush_preserves_first_queued_order() {
        let a = Observable::new(0);
        let b = Observable::new(0);
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        let oa = Rc::clone(&order);
        let _sa = a.subscribe(move |_| oa.borrow_mut().push('a'));
        let ob = Rc::clone(&order);
        let _sb = b.subscribe(move |_| ob.borrow_mut().push('b'));
        {
            let _batch = BatchScope::new();
            b.set(1);
            a.set(1);
            b.set(2);
        }
        assert_eq!(*order.borrow(), vec!['b', 'a']);
    }
}
