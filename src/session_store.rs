use crate::{SessionId, SessionRecord};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;

/// This is the backend-facing interface of the session manager.
/// It defines simple [CRUD]-methods on sessions, plus garbage collection.
///
/// The session id is expected to be the primary key, uniquely identifying a session.
/// Implementations are shared between all concurrent requests and the [`Reaper`](crate::Reaper),
/// so every method must be safe to call concurrently with every other method.
/// Concurrent writes of the same session may be resolved with "last write wins".
///
/// [CRUD]: https://en.wikipedia.org/wiki/Create,_read,_update_and_delete
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Read the session with the given `id`.
    /// Returns `Ok(None)` if there is no such session.
    async fn read(&self, id: &SessionId) -> Result<Option<SessionRecord>>;

    /// Write the session, replacing any session with the same id.
    async fn write(&self, record: &SessionRecord) -> Result<()>;

    /// Delete the session with the given `id`.
    /// Deleting a session that does not exist is not an error.
    async fn destroy(&self, id: &SessionId) -> Result<()>;

    /// Delete all sessions that were idle for longer than `idle_expiration`,
    /// or were created longer than `absolute_expiration` ago.
    /// Returns the number of deleted sessions.
    async fn gc(&self, idle_expiration: Duration, absolute_expiration: Duration) -> Result<usize>;
}

#[async_trait]
impl<Store: SessionStore + ?Sized> SessionStore for Arc<Store> {
    async fn read(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        self.as_ref().read(id).await
    }

    async fn write(&self, record: &SessionRecord) -> Result<()> {
        self.as_ref().write(record).await
    }

    async fn destroy(&self, id: &SessionId) -> Result<()> {
        self.as_ref().destroy(id).await
    }

    async fn gc(&self, idle_expiration: Duration, absolute_expiration: Duration) -> Result<usize> {
        self.as_ref().gc(idle_expiration, absolute_expiration).await
    }
}
