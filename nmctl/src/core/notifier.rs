//! Debounced state fan-out.
//!
//! Controllers call [`Notifier::mark_dirty`] after every mutation. The first
//! mark opens a window of [`ManagerConfig::debounce`]; marks arriving inside
//! it are absorbed. When the window closes the current snapshot is pushed to
//! every subscriber, unless it equals the last snapshot that subscriber got.
//!
//! A new subscriber receives the current snapshot straight away.
//!
//! Subscriber channels are bounded. A subscriber whose channel is full
//! misses that push and is marked behind; the latest snapshot is retried for
//! it once per window until it has room. One whose receiver is gone is
//! dropped.
//!
//! [`ManagerConfig::debounce`]: crate::ManagerConfig::debounce

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::models::NetworkState;
use crate::core::store::StateStore;

#[derive(Debug)]
struct Subscriber {
    tx: mpsc::Sender<NetworkState>,
    /// What this subscriber was last handed.
    seen: Option<NetworkState>,
    behind: bool,
}

impl Subscriber {
    fn new(tx: mpsc::Sender<NetworkState>) -> Self {
        Self {
            tx,
            seen: None,
            behind: false,
        }
    }

    /// Offers `state` unless the subscriber already has it. Returns false
    /// once the receiver is gone.
    fn offer(&mut self, state: &NetworkState) -> bool {
        if self.seen.as_ref() == Some(state) {
            self.behind = false;
            return true;
        }
        match self.tx.try_send(state.clone()) {
            Ok(()) => {
                self.seen = Some(state.clone());
                self.behind = false;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                if !self.behind {
                    debug!("Subscriber is behind, holding the latest update for it");
                }
                self.behind = true;
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Notifier {
    dirty: mpsc::Sender<()>,
    subscribers: Mutex<Vec<Subscriber>>,
    capacity: usize,
}

impl Notifier {
    /// Returns the notifier and the receiving half of its dirty channel,
    /// which [`Notifier::run`] consumes.
    pub(crate) fn new(capacity: usize) -> (Self, mpsc::Receiver<()>) {
        let (dirty, rx) = mpsc::channel(1);
        let notifier = Self {
            dirty,
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        };
        (notifier, rx)
    }

    /// Schedules a push. Never blocks; a pending mark already covers this one.
    pub(crate) fn mark_dirty(&self) {
        let _ = self.dirty.try_send(());
    }

    /// Registers a subscriber and hands it the current state as its first
    /// update.
    pub(crate) fn subscribe(&self, store: &StateStore) -> mpsc::Receiver<NetworkState> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut sub = Subscriber::new(tx);
        // Snapshot under the subscriber lock so no push can slip in between.
        let mut subs = self.lock();
        sub.offer(&store.snapshot());
        subs.push(sub);
        rx
    }

    /// Hands `state` to every subscriber that does not have it yet.
    fn publish(&self, state: &NetworkState) {
        self.lock().retain_mut(|sub| sub.offer(state));
    }

    fn any_behind(&self) -> bool {
        self.lock().iter().any(|sub| sub.behind)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The debounce loop. Returns when `cancel` fires or every sender of the
    /// dirty channel is gone.
    pub(crate) async fn run(
        self: Arc<Self>,
        mut dirty: mpsc::Receiver<()>,
        store: Arc<StateStore>,
        window: Duration,
        cancel: CancellationToken,
    ) {
        loop {
            let retry = self.any_behind();
            tokio::select! {
                _ = cancel.cancelled() => break,
                mark = dirty.recv() => if mark.is_none() { break },
                _ = tokio::time::sleep(window), if retry => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(window) => {}
            }
            while dirty.try_recv().is_ok() {}

            self.publish(&store.snapshot());
        }
        debug!("Notifier stopped");
    }
}
