//! The state store.
//!
//! A single lock around [`NetworkState`]. Controllers read what they need,
//! make their bus calls with the lock released, then take the lock again for
//! the short write. Nothing awaits while holding it.

use std::sync::{PoisonError, RwLock};

use crate::api::models::NetworkState;

#[derive(Debug, Default)]
pub(crate) struct StateStore {
    state: RwLock<NetworkState>,
}

impl StateStore {
    pub(crate) fn new(state: NetworkState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// A copy of the current state. Later updates do not affect it.
    pub(crate) fn snapshot(&self) -> NetworkState {
        self.read(NetworkState::clone)
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&NetworkState) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut NetworkState) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
