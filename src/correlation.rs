//! Matching responses to outstanding actions by ActionID

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::{
    error::{AmiError, AmiResult},
    message::AmiMessage,
};

/// Completion callback for one action.
///
/// Invoked exactly once with the response (`Ok` for `Response: Success`) or
/// the reason the action failed. Runs on the connection task, so it must not
/// block.
pub type ActionCallback = Box<dyn FnOnce(AmiResult<AmiMessage>) + Send + 'static>;

struct PendingRequest {
    callback: ActionCallback,
    timer: AbortHandle,
}

type PendingMap = HashMap<String, PendingRequest>;

/// ActionID → pending callback with its expiry timer.
///
/// Every entry leaves the table through exactly one of resolve, expire, reject
/// or fail_all. The entry is removed under the lock before its callback runs,
/// so whichever path comes second finds nothing and does nothing.
#[derive(Clone, Default)]
pub(crate) struct CorrelationTable {
    entries: Arc<Mutex<PendingMap>>,
}

impl CorrelationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingMap> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a callback and arm its expiry timer. Must run inside a tokio runtime.
    ///
    /// Returns `false` (after failing the new callback with
    /// [`AmiError::DuplicateActionId`]) when the identifier is already pending.
    pub(crate) fn register(&self, action_id: String, callback: ActionCallback, ttl: Duration) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(&action_id) {
            drop(entries);
            warn!("[PENDING] ActionID {} is already pending", action_id);
            callback(Err(AmiError::DuplicateActionId { action_id }));
            return false;
        }

        let table = self.clone();
        let id = action_id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            table.expire(&id, ttl);
        })
        .abort_handle();

        entries.insert(action_id, PendingRequest { callback, timer });
        debug!("[PENDING] Registered, {} pending", entries.len());
        true
    }

    /// Deliver a message to the pending request named by its ActionID.
    ///
    /// Returns `false` when the message has no ActionID or nothing is pending
    /// under it.
    pub(crate) fn resolve(&self, message: &AmiMessage) -> bool {
        let Some(action_id) = message.action_id() else {
            return false;
        };
        let Some(pending) = self
            .lock()
            .remove(action_id)
        else {
            return false;
        };
        pending
            .timer
            .abort();

        let outcome = if message.is_success() {
            Ok(message.clone())
        } else {
            Err(AmiError::ActionFailed {
                action_id: action_id.to_string(),
                message: message
                    .message()
                    .unwrap_or_default()
                    .to_string(),
            })
        };
        debug!(
            "[PENDING] Resolved {} (success={})",
            action_id,
            outcome.is_ok()
        );
        (pending.callback)(outcome);
        true
    }

    /// Timer path: fail the entry with a timeout if it is still pending.
    fn expire(&self, action_id: &str, ttl: Duration) {
        let Some(pending) = self
            .lock()
            .remove(action_id)
        else {
            return;
        };
        warn!(
            "[PENDING] No response for {} within {}ms",
            action_id,
            ttl.as_millis()
        );
        (pending.callback)(Err(AmiError::ActionTimeout {
            action_id: action_id.to_string(),
            ttl_ms: ttl.as_millis() as u64,
        }));
    }

    /// Fail one entry with the given error. Returns `false` if it was not pending.
    pub(crate) fn reject(&self, action_id: &str, error: AmiError) -> bool {
        let Some(pending) = self
            .lock()
            .remove(action_id)
        else {
            return false;
        };
        pending
            .timer
            .abort();
        (pending.callback)(Err(error));
        true
    }

    /// Fail every pending entry with the given error, returning how many there were.
    pub(crate) fn fail_all(&self, error: AmiError) -> usize {
        let drained: Vec<_> = self
            .lock()
            .drain()
            .collect();
        let count = drained.len();
        for (_, pending) in drained {
            pending
                .timer
                .abort();
            (pending.callback)(Err(error.clone()));
        }
        if count > 0 {
            debug!("[PENDING] Failed {} pending requests: {}", count, error);
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.lock()
            .len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, action_id: &str) -> bool {
        self.lock()
            .contains_key(action_id)
    }
}

impl std::fmt::Debug for CorrelationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationTable")
            .field("pending", &self.len())
            .finish()
    }
}
