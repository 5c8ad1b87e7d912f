// Environment Handoff Channel
//
// Save/restore discipline around a named process-wide slot. Every `set`
// goes through a `HandoffScope` whose drop puts the prior value back, so the
// slot is restored on normal return, error, timeout and unwinding alike.

use std::sync::Arc;
use tracing::debug;

use crate::domain::PredictionRequest;
use crate::port::EnvStore;

/// Captured slot value; `None` means the slot was unset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffSnapshot(Option<String>);

impl HandoffSnapshot {
    pub fn was_absent(&self) -> bool {
        self.0.is_none()
    }

    pub fn value(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

pub struct HandoffChannel {
    store: Arc<dyn EnvStore>,
    key: String,
}

impl HandoffChannel {
    pub fn new(store: Arc<dyn EnvStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn snapshot(&self) -> HandoffSnapshot {
        HandoffSnapshot(self.store.get(&self.key))
    }

    /// Store the canonical JSON of `request`, overwriting any value.
    /// Returns the serialized payload.
    pub fn set(&self, request: &PredictionRequest) -> Result<String, serde_json::Error> {
        let payload = request.to_canonical_json()?;
        self.store.set(&self.key, &payload);
        Ok(payload)
    }

    pub fn restore(&self, snapshot: &HandoffSnapshot) {
        match snapshot.value() {
            Some(prev) => self.store.set(&self.key, prev),
            None => self.store.remove(&self.key),
        }
        debug!(key = %self.key, was_absent = snapshot.was_absent(), "Handoff slot restored");
    }

    /// Snapshot, then set. The returned scope restores the snapshot when dropped.
    ///
    /// Serialization happens before the slot is touched, so a failure here
    /// leaves the slot as it was.
    pub fn enter(&self, request: &PredictionRequest) -> Result<HandoffScope<'_>, serde_json::Error> {
        let payload = request.to_canonical_json()?;
        let snapshot = self.snapshot();
        self.store.set(&self.key, &payload);
        debug!(key = %self.key, bytes = payload.len(), "Handoff slot set");

        Ok(HandoffScope {
            channel: self,
            snapshot,
            payload,
        })
    }
}

/// Scoped acquisition of the handoff slot
pub struct HandoffScope<'a> {
    channel: &'a HandoffChannel,
    snapshot: HandoffSnapshot,
    payload: String,
}

impl HandoffScope<'_> {
    pub fn payload_json(&self) -> &str {
        &self.payload
    }

    pub fn snapshot(&self) -> &HandoffSnapshot {
        &self.snapshot
    }
}

impl Drop for HandoffScope<'_> {
    fn drop(&mut self) {
        self.channel.restore(&self.snapshot);
    }
}
