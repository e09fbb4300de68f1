//! Snapshot persistence seam used for auto-save and auto-recovery.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::Tick;
use crate::world::WorldSnapshot;

/// Failures raised by snapshot stores.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("snapshot backend error: {0}")]
    Backend(String),
}

/// Durable home for world snapshots, keyed by world identity and tick.
pub trait SnapshotStore: Send {
    /// Stores a full snapshot of the world `identity` taken at `tick`.
    fn save(
        &mut self,
        identity: &str,
        tick: Tick,
        snapshot: &WorldSnapshot,
    ) -> Result<(), SnapshotError>;

    /// Returns the snapshot with the highest tick recorded for `identity`.
    fn latest(&self, identity: &str) -> Result<Option<WorldSnapshot>, SnapshotError>;
}

/// No-op store: saves vanish and nothing is ever recovered.
#[derive(Debug, Default)]
pub struct NullStore;

impl SnapshotStore for NullStore {
    fn save(&mut self, _: &str, _: Tick, _: &WorldSnapshot) -> Result<(), SnapshotError> {
        Ok(())
    }

    fn latest(&self, _: &str) -> Result<Option<WorldSnapshot>, SnapshotError> {
        Ok(None)
    }
}

/// In-process store holding serialized snapshots. Clones share the same
/// backing map, so a test can keep a handle after moving one into a world.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<BTreeMap<String, BTreeMap<Tick, String>>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks stored for `identity`, ascending.
    pub fn ticks(&self, identity: &str) -> Result<Vec<Tick>, SnapshotError> {
        let guard = self.lock()?;
        Ok(guard
            .get(identity)
            .map(|entries| entries.keys().copied().collect())
            .unwrap_or_default())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, BTreeMap<Tick, String>>>, SnapshotError>
    {
        self.inner
            .lock()
            .map_err(|_| SnapshotError::Backend("memory store lock poisoned".to_owned()))
    }
}

impl SnapshotStore for MemoryStore {
    fn save(
        &mut self,
        identity: &str,
        tick: Tick,
        snapshot: &WorldSnapshot,
    ) -> Result<(), SnapshotError> {
        let encoded = serde_json::to_string(snapshot)?;
        self.lock()?
            .entry(identity.to_owned())
            .or_default()
            .insert(tick, encoded);
        Ok(())
    }

    fn latest(&self, identity: &str) -> Result<Option<WorldSnapshot>, SnapshotError> {
        let guard = self.lock()?;
        let Some((_, encoded)) = guard
            .get(identity)
            .and_then(|entries| entries.last_key_value())
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(encoded)?))
    }
}
