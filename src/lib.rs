//! Server-side HTTP sessions with CSRF protection, and signed identity tokens.
//!
//! This crate provides two complementary ways to recognise returning visitors:
//!
//! * A [`SessionManager`] that keeps per-visitor state in a pluggable [`SessionStore`],
//!   addressed by an opaque random id carried in a cookie.
//!   It wraps any tower [`Service`](tower::Service) and takes care of loading, validating,
//!   persisting and expiring sessions, as well as of CSRF protection for state-changing requests.
//! * A [`TokenFactory`] for compact, signed and time-limited identity [tokens](Token) that can be
//!   verified without any lookup, carried in a cookie or as a bearer credential.
//!   An [`Authenticator`] resolves them into application users.
//!
//! # Sessions
//!
//! Each session has an id, a creation and a last-activity timestamp, and a map of values.
//! A session is invalid once it has been idle for longer than
//! [`idle_expiration`](SessionConfig::idle_expiration), or is older than
//! [`absolute_expiration`](SessionConfig::absolute_expiration).
//! A [`Reaper`] evicts such sessions from the store in the background.
//!
//! Handlers access the session of their request through [`RequestSessionExt`].
//! Changes are written back to the store after the handler returns.
//! Concurrent requests of the same session are not serialised: the last write wins.
//!
//! # Security
//!
//! * Session ids and CSRF tokens consist of 32 alphanumeric characters drawn from a
//!   cryptographically secure generator, i.e. more than 190 bits of entropy.
//! * The session cookie is `HttpOnly`, `Secure` and `SameSite=Lax` by default.
//!   Responses carry `Vary: Cookie` and `Cache-Control: no-cache="Set-Cookie"`.
//! * `POST`, `PUT`, `PATCH` and `DELETE` requests must echo the session's CSRF token, compared
//!   in constant time. Call [`Session::renew_id`] after a login to prevent session fixation.
//! * Identity tokens are signed with HMAC-SHA256 under a key derived from a shared secret.
//!   Invalid, expired and tampered tokens all degrade to the anonymous user.
//! * Session ids never appear in logs, only their [fingerprint](SessionId::fingerprint).
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use http_body_util::Full;
//! use jot_session::{MemoryStore, RequestSessionExt, SessionConfig, SessionManager};
//! use std::convert::Infallible;
//! use tower::{service_fn, ServiceExt};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let manager = SessionManager::new(MemoryStore::new(), SessionConfig::default());
//!
//! let service = manager.handle(service_fn(|request: Request<Full<Bytes>>| async move {
//!     let session = request.session().expect("wrapped by the session manager");
//!     let visits = session.get::<u32>("visits").unwrap_or(0) + 1;
//!     session.put("visits", visits).expect("u32 is serialisable");
//!     Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(format!("visit {visits}")))))
//! }));
//!
//! let response = service
//!     .oneshot(Request::new(Full::new(Bytes::new())))
//!     .await
//!     .unwrap();
//! assert!(response.headers().contains_key(http::header::SET_COOKIE));
//! assert_eq!(manager.store().len(), 1);
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(
    future_incompatible,
    missing_debug_implementations,
    nonstandard_style,
    missing_docs,
    unreachable_pub,
    missing_copy_implementations,
    unused_qualifications
)]

mod config;
mod cookies;
mod csrf;
mod error;
mod guard;
mod identity;
mod manager;
mod memory_store;
mod reaper;
mod session;
mod session_store;
mod token;
mod token_generator;

pub use config::{SessionConfig, TokenConfig};
pub use cookie::SameSite;
pub use csrf::{generate_csrf_token, requires_csrf, verify_csrf_token, CSRF_TOKEN_KEY};
pub use error::Error;
pub use guard::{ResponseGuard, SessionCookieIssued};
pub use identity::{Authenticator, UserDirectory};
pub use manager::{SessionManager, SessionService};
pub use memory_store::MemoryStore;
pub use reaper::Reaper;
pub use session::{RequestSessionExt, Session, SessionId, SessionRecord, USER_ID_KEY};
pub use session_store::SessionStore;
pub use token::{Token, TokenFactory};
pub use token_generator::{RandomTokenGenerator, SequentialTokenGenerator, TokenGenerator};

/// A result with this crate's [`Error`], and a default return type of ()
pub type Result<T = ()> = std::result::Result<T, Error>;
