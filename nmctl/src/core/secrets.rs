//! Short-lived credential side tables.
//!
//! Two tables, both keyed by connection UUID:
//!
//! - one-time secrets: a password collected by a prompt that the user did not
//!   want saved. Handed out once, then gone.
//! - pending saves: credentials the user asked to keep, written to the
//!   profile once the connection comes up.
//!
//! Entries are cleared when the tracked connection reaches a terminal state
//! and at no other time.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Credentials to persist once a VPN activates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingSave {
    pub(crate) connection_path: String,
    pub(crate) username: String,
    /// Left unset when the reply carried no password.
    pub(crate) password: Option<String>,
}

#[derive(Debug, Default)]
struct Tables {
    one_time: HashMap<String, HashMap<String, String>>,
    pending_saves: HashMap<String, PendingSave>,
}

#[derive(Debug, Default)]
pub(crate) struct SecretCache {
    tables: Mutex<Tables>,
}

impl SecretCache {
    pub(crate) fn put_one_time(&self, uuid: &str, secrets: HashMap<String, String>) {
        self.lock().one_time.insert(uuid.to_string(), secrets);
    }

    /// Returns the cached secrets for `uuid` and forgets them.
    pub(crate) fn take_one_time(&self, uuid: &str) -> Option<HashMap<String, String>> {
        self.lock().one_time.remove(uuid)
    }

    pub(crate) fn record_pending_save(&self, uuid: &str, save: PendingSave) {
        self.lock().pending_saves.insert(uuid.to_string(), save);
    }

    /// The connection came up: drops the one-time secret and hands back the
    /// pending save, if any, for the caller to persist.
    pub(crate) fn on_activated(&self, uuid: &str) -> Option<PendingSave> {
        let mut tables = self.lock();
        tables.one_time.remove(uuid);
        tables.pending_saves.remove(uuid)
    }

    /// The connection failed or vanished: drops everything held for it.
    pub(crate) fn on_failed(&self, uuid: &str) {
        let mut tables = self.lock();
        tables.one_time.remove(uuid);
        tables.pending_saves.remove(uuid);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
