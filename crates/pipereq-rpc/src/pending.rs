use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use pipereq_frame::Response;
use tokio::sync::oneshot;

use crate::error::{Result, RpcError};

/// What a registered request eventually receives.
pub type Outcome = std::result::Result<Response, RpcError>;

struct Entry {
    deadline: Option<Instant>,
    timeout: Duration,
    tx: oneshot::Sender<Outcome>,
}

/// Requests sent on a pipe and still waiting for their response.
///
/// Keyed by correlation id. Every entry is removed exactly once: by
/// [`resolve`](Self::resolve), by the deadline [`sweep`](Self::sweep), or
/// by [`fail_all`](Self::fail_all) when the pipe goes away.
#[derive(Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<String, Entry>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `id`. The returned receiver yields the outcome.
    ///
    /// `timeout` of `None` means the entry only leaves through `resolve`
    /// or `fail_all`.
    pub fn register(
        &self,
        id: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<oneshot::Receiver<Outcome>> {
        let id = id.into();
        let mut entries = self.lock();
        if entries.contains_key(&id) {
            return Err(RpcError::DuplicateRequestId(id));
        }

        let (tx, rx) = oneshot::channel();
        entries.insert(
            id,
            Entry {
                // a timeout past the end of the clock means no deadline
                deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
                timeout: timeout.unwrap_or_default(),
                tx,
            },
        );
        Ok(rx)
    }

    /// Deliver `response` to whoever registered its id.
    ///
    /// Returns `false` for ids that are unknown or already settled.
    pub fn resolve(&self, response: Response) -> bool {
        let Some(entry) = self.lock().remove(&response.id) else {
            tracing::debug!(id = %response.id, "response for unknown request id ignored");
            return false;
        };
        // Receiver may already be gone if the caller stopped waiting.
        let _ = entry.tx.send(Ok(response));
        true
    }

    /// Stop tracking `id` without delivering anything.
    pub fn remove(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Fail every entry whose deadline is at or before `now`.
    ///
    /// Returns how many entries expired.
    pub fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<(String, Entry)> = {
            let mut entries = self.lock();
            let ids: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| entry.deadline.is_some_and(|d| d <= now))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        for (id, entry) in &expired {
            tracing::warn!(%id, timeout = ?entry.timeout, "request timed out");
        }
        let count = expired.len();
        for (_, entry) in expired {
            let _ = entry.tx.send(Err(RpcError::Timeout(entry.timeout)));
        }
        count
    }

    /// Fail every entry with `RpcError::Disconnected`.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<Entry> = self.lock().drain().map(|(_, entry)| entry).collect();
        let count = drained.len();
        if count > 0 {
            tracing::debug!(count, reason, "failing pending requests");
        }
        for entry in drained {
            let _ = entry.tx.send(Err(RpcError::Disconnected(reason.to_string())));
        }
        count
    }

    /// Number of requests in flight.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A poisoned map is still structurally valid; keep serving.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for PendingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTable")
            .field("in_flight", &self.len())
            .finish()
    }
}
