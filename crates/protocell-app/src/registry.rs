use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Active sessions and when they connected. Shared by every connection
/// handler; sessions themselves never read it.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<SessionId, Instant>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock().insert(id, Instant::now());
        id
    }

    /// Removes `id`, returning how long it was connected.
    pub fn deregister(&self, id: SessionId) -> Option<Duration> {
        self.lock()
            .remove(&id)
            .map(|connected_at| connected_at.elapsed())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Instant>> {
        // Entries are plain data, so a poisoned map is still consistent.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_deregister_track_active_sessions() {
        let registry = SessionRegistry::new();
        let first = registry.register();
        let second = registry.register();
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);

        assert!(registry.deregister(first).is_some());
        assert!(registry.deregister(first).is_none());
        assert_eq!(registry.len(), 1);
        registry.deregister(second);
        assert!(registry.is_empty());
    }

    #[test]
    fn ids_render_for_logs() {
        assert_eq!(SessionId::new(7).to_string(), "session-7");
    }
}
