use crate::{SessionId, SessionRecord, SessionStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// # in-memory session store
/// Because there is no external
/// persistence, this session store is ephemeral and will be cleared
/// on server restart.
///
/// Clones of a memory store share the same sessions.
///
/// # ***READ THIS BEFORE USING IN A PRODUCTION DEPLOYMENT***
///
/// Storing sessions only in memory brings the following problems:
///
/// 1. All sessions must fit in available memory (important for high load services)
/// 2. Sessions stored in memory are cleared only if they are destroyed, or garbage collected by
///    [`SessionStore::gc`]. Run a [`Reaper`](crate::Reaper) to avoid accumulating sessions until OOM
/// 3. All sessions will be lost on shutdown
/// 4. If the service is clustered particular session will be stored only on a single instance.
///    This might be solved by using load balancers with sticky sessions.
///    Unfortunately, this solution brings additional complexity especially if the connection is
///    using secure transport since the load balancer has to perform SSL termination to understand
///    where should it forward packets to
///
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    session_map: Arc<RwLock<HashMap<SessionId, SessionRecord>>>,
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn read(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        Ok(self.session_map.read().get(id).cloned())
    }

    async fn write(&self, record: &SessionRecord) -> Result<()> {
        self.session_map
            .write()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> Result<()> {
        self.session_map.write().remove(id);
        Ok(())
    }

    async fn gc(&self, idle_expiration: Duration, absolute_expiration: Duration) -> Result<usize> {
        log::trace!("Cleaning up memory store...");
        let now = Utc::now();
        let mut session_map = self.session_map.write();
        let initial_len = session_map.len();
        session_map
            .retain(|_, record| !record.is_expired(now, idle_expiration, absolute_expiration));
        let deleted = initial_len - session_map.len();
        log::trace!("Deleted {deleted} expired sessions");
        Ok(deleted)
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the number of sessions in the memory store.
    pub fn len(&self) -> usize {
        self.session_map.read().len()
    }

    /// Returns true if the memory store is empty.
    pub fn is_empty(&self) -> bool {
        self.session_map.read().is_empty()
    }

    /// Deletes all sessions.
    pub fn clear(&self) {
        self.session_map.write().clear();
    }

    /// Call `f` on each session in the store.
    /// The store is locked for reading while `f` runs.
    pub fn for_each(&self, f: impl FnMut(&SessionRecord)) {
        self.session_map.read().values().for_each(f);
    }
}
