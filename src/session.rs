use crate::csrf::{generate_csrf_token, CSRF_TOKEN_KEY};
use crate::{Error, Result, TokenGenerator};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// The conventional session key under which the id of a logged-in user is stored.
pub const USER_ID_KEY: &str = "user_id";

/// A session id.
///
/// It is the value of the session cookie and the key of the session in the session store.
/// Its [`Debug`] implementation prints only a fingerprint, so ids do not leak into logs.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a cookie value as a session id.
    pub fn from_cookie_value(cookie_value: impl Into<String>) -> Self {
        Self(cookie_value.into())
    }

    /// The id as it is sent in the session cookie.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A short hash of the id, suitable for logging.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(self.0.as_bytes());
        hex::encode(&hash.as_bytes()[..8])
    }
}

impl Debug for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionId({})", self.fingerprint())
    }
}

/// The persisted representation of a session, as it is exchanged with a [`SessionStore`](crate::SessionStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The id of the session.
    pub id: SessionId,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last used by a request.
    pub last_activity_at: DateTime<Utc>,
    /// Arbitrary session values. Always contains the CSRF token under [`CSRF_TOKEN_KEY`].
    #[serde(default)]
    pub data: HashMap<String, Value>,
}

impl SessionRecord {
    /// Create a record with both timestamps set to `now` and only the CSRF token as data.
    pub fn new(id: SessionId, csrf_token: String, now: DateTime<Utc>) -> Self {
        let mut data = HashMap::new();
        data.insert(CSRF_TOKEN_KEY.to_owned(), Value::String(csrf_token));
        Self {
            id,
            created_at: now,
            last_activity_at: now,
            data,
        }
    }

    /// The CSRF token stored in this record.
    pub fn csrf_token(&self) -> Option<&str> {
        self.data.get(CSRF_TOKEN_KEY).and_then(Value::as_str)
    }

    /// Returns true if the record has been idle for longer than `idle_expiration`,
    /// or was created longer than `absolute_expiration` ago.
    pub fn is_expired(
        &self,
        now: DateTime<Utc>,
        idle_expiration: Duration,
        absolute_expiration: Duration,
    ) -> bool {
        now - self.last_activity_at > idle_expiration
            || now - self.created_at > absolute_expiration
    }
}

/// A session with a client, as seen by the handler of a single request.
///
/// This is a cheap handle: clones refer to the same session.
/// Every accessor takes the session's own lock, so a session can be shared with helper tasks
/// spawned by the handler.
/// Changes become visible to other requests only once the [`SessionManager`](crate::SessionManager)
/// writes the session back to the store after the handler returns.
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    generator: Arc<dyn TokenGenerator>,
}

#[derive(Debug)]
struct SessionState {
    record: SessionRecord,
    status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionStatus {
    /// The session was created for this request and is not in the store yet.
    Fresh,
    /// The session was loaded from the store under `stored_id`.
    /// The current id differs from `stored_id` if the session was renewed.
    Stored { stored_id: SessionId },
    /// The session was marked for destruction.
    Destroyed { stored_id: Option<SessionId> },
}

/// What the session manager has to do with a session after the handler returned.
#[derive(Debug)]
pub(crate) enum Commit {
    /// Write the record and destroy `stale_id`, the id the session was stored under before it was renewed.
    Write {
        record: SessionRecord,
        stale_id: Option<SessionId>,
    },
    /// Destroy the session if it was ever stored, and delete the client's cookie.
    Destroy { stored_id: Option<SessionId> },
}

impl Session {
    /// Create a fresh session with a newly generated id and CSRF token.
    pub(crate) fn fresh(generator: Arc<dyn TokenGenerator>, now: DateTime<Utc>) -> Self {
        let record = SessionRecord::new(
            SessionId::from_cookie_value(generator.generate()),
            generate_csrf_token(generator.as_ref()),
            now,
        );
        Self {
            state: Arc::new(Mutex::new(SessionState {
                record,
                status: SessionStatus::Fresh,
            })),
            generator,
        }
    }

    /// Create a session from a record loaded from the session store.
    pub(crate) fn from_store(record: SessionRecord, generator: Arc<dyn TokenGenerator>) -> Self {
        let stored_id = record.id.clone();
        Self {
            state: Arc::new(Mutex::new(SessionState {
                record,
                status: SessionStatus::Stored { stored_id },
            })),
            generator,
        }
    }

    /// The current id of this session.
    pub fn id(&self) -> SessionId {
        self.state.lock().record.id.clone()
    }

    /// The CSRF token of this session, to be embedded in forms or sent back in the CSRF header.
    pub fn csrf_token(&self) -> Option<String> {
        self.state.lock().record.csrf_token().map(str::to_owned)
    }

    /// When this session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.state.lock().record.created_at
    }

    /// When this session was last used by a request.
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.state.lock().record.last_activity_at
    }

    /// Returns true if this session was created for the current request.
    pub fn is_fresh(&self) -> bool {
        self.state.lock().status == SessionStatus::Fresh
    }

    /// Returns true if this session is marked for destruction.
    pub fn is_destroyed(&self) -> bool {
        matches!(self.state.lock().status, SessionStatus::Destroyed { .. })
    }

    /// The id of the logged-in user, if one was stored under [`USER_ID_KEY`].
    pub fn user_id(&self) -> Option<String> {
        self.get(USER_ID_KEY)
    }

    /// Get the value stored under `key`, converted to `T`.
    /// Returns `None` if there is no such value, or it cannot be converted to `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key)?;
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(error) => {
                log::debug!("Session value {key:?} has an unexpected type: {error}");
                None
            }
        }
    }

    /// Get the raw value stored under `key`.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.state.lock().record.data.get(key).cloned()
    }

    /// Returns true if a value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().record.data.contains_key(key)
    }

    /// The keys of all values in this session, including the reserved CSRF key.
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().record.data.keys().cloned().collect()
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Example
    ///
    /// ```
    /// # use jot_session::{Session, SessionManager, MemoryStore, SessionConfig};
    /// # fn main() -> jot_session::Result {
    /// # let manager = SessionManager::new(MemoryStore::new(), SessionConfig::default());
    /// let session: Session = manager.new_session();
    /// session.put("empire", "Andromeda")?;
    /// assert_eq!(session.get::<String>("empire").as_deref(), Some("Andromeda"));
    /// assert!(session.put("csrf_token", "forged").is_err());
    /// # Ok(()) }
    /// ```
    pub fn put<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result {
        let key = key.into();
        if key == CSRF_TOKEN_KEY {
            return Err(Error::ReservedKey(key));
        }
        let value = serde_json::to_value(value)?;
        self.state.lock().record.data.insert(key, value);
        Ok(())
    }

    /// Remove the value stored under `key` and return it.
    /// The CSRF token cannot be removed, attempting to do so returns `None`.
    pub fn delete(&self, key: &str) -> Option<Value> {
        if key == CSRF_TOKEN_KEY {
            return None;
        }
        self.state.lock().record.data.remove(key)
    }

    /// Migrate this session to a new id and a new CSRF token, keeping its data.
    ///
    /// Call this after a privilege change such as a login, so a session id that was known
    /// before the change cannot be used afterwards.
    /// The previous id is destroyed in the store when the session is committed.
    pub fn renew_id(&self) {
        let mut state = self.state.lock();
        if matches!(state.status, SessionStatus::Destroyed { .. }) {
            log::debug!("Not renewing the id of a destroyed session");
            return;
        }
        state.record.id = SessionId::from_cookie_value(self.generator.generate());
        let csrf_token = generate_csrf_token(self.generator.as_ref());
        state
            .record
            .data
            .insert(CSRF_TOKEN_KEY.to_owned(), Value::String(csrf_token));
    }

    /// Mark this session for destruction, e.g. on logout.
    /// All values are removed, and the client's session cookie is deleted when the request completes.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        let stored_id = match &state.status {
            SessionStatus::Fresh => None,
            SessionStatus::Stored { stored_id } => Some(stored_id.clone()),
            SessionStatus::Destroyed { .. } => return,
        };
        state.record.data.retain(|key, _| key == CSRF_TOKEN_KEY);
        state.status = SessionStatus::Destroyed { stored_id };
    }

    /// The id under which this session is currently stored, if any.
    pub(crate) fn stored_id(&self) -> Option<SessionId> {
        match &self.state.lock().status {
            SessionStatus::Fresh => None,
            SessionStatus::Stored { stored_id } => Some(stored_id.clone()),
            SessionStatus::Destroyed { stored_id } => stored_id.clone(),
        }
    }

    /// A copy of the current state of this session.
    pub fn snapshot(&self) -> SessionRecord {
        self.state.lock().record.clone()
    }

    /// Refresh the activity timestamp and decide how to persist this session.
    /// After this call, the session counts as stored under its current id.
    pub(crate) fn prepare_commit(&self, now: DateTime<Utc>) -> Commit {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let stale_id = match &state.status {
            SessionStatus::Destroyed { stored_id } => {
                return Commit::Destroy {
                    stored_id: stored_id.clone(),
                }
            }
            SessionStatus::Stored { stored_id } if *stored_id != state.record.id => {
                Some(stored_id.clone())
            }
            SessionStatus::Stored { .. } | SessionStatus::Fresh => None,
        };
        state.record.last_activity_at = now;
        state.status = SessionStatus::Stored {
            stored_id: state.record.id.clone(),
        };
        Commit::Write {
            record: state.record.clone(),
            stale_id,
        }
    }
}

/// Access to the session that the [`SessionManager`](crate::SessionManager) attached to a request.
pub trait RequestSessionExt {
    /// The session of this request.
    ///
    /// Returns [`Error::SessionMissing`] if the request did not pass through a session manager.
    fn session(&self) -> Result<Session>;
}

impl<Body> RequestSessionExt for http::Request<Body> {
    fn session(&self) -> Result<Session> {
        self.extensions().session()
    }
}

impl RequestSessionExt for http::request::Parts {
    fn session(&self) -> Result<Session> {
        self.extensions.session()
    }
}

impl RequestSessionExt for http::Extensions {
    fn session(&self) -> Result<Session> {
        self.get::<Session>().cloned().ok_or(Error::SessionMissing)
    }
}
