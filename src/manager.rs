use crate::cookies::{append_set_cookie, expires_at, get_cookie, to_header_value};
use crate::csrf::{extract_csrf_token, requires_csrf, verify_csrf_token};
use crate::session::Commit;
use crate::{
    RandomTokenGenerator, Reaper, ResponseGuard, Result, Session, SessionConfig,
    SessionCookieIssued, SessionId, SessionStore, TokenGenerator, USER_ID_KEY,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cookie::{Cookie, CookieBuilder};
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use http_body::Body;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{BoxError, Layer, Service};

/// Orchestrates the session lifecycle of requests.
///
/// For every request passing through a service created by [`SessionManager::handle`]
/// (or by using the manager as a tower [`Layer`]), the manager
///
/// 1. resolves the session from the session cookie, or creates a fresh one,
/// 2. rejects `POST`, `PUT`, `PATCH` and `DELETE` requests without a matching CSRF token
///    with `403 Forbidden`,
/// 3. attaches the session to the request extensions
///    (see [`RequestSessionExt`](crate::RequestSessionExt)) and calls the wrapped service,
/// 4. writes the session back to the store, whether the wrapped service succeeded or not,
/// 5. sets the session cookie on the response through a [`ResponseGuard`].
///
/// Store failures never reach the client: they are logged, and the request proceeds with a fresh
/// session or without persisting it.
///
/// Clones of a manager share the same store and configuration.
#[derive(Debug)]
pub struct SessionManager<Store> {
    store: Arc<Store>,
    config: Arc<SessionConfig>,
    generator: Arc<dyn TokenGenerator>,
}

impl<Store> Clone for SessionManager<Store> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            generator: Arc::clone(&self.generator),
        }
    }
}

impl<Store: SessionStore> SessionManager<Store> {
    /// Create a new session manager with the given store and configuration.
    pub fn new(store: Store, config: SessionConfig) -> Self {
        Self::new_with_generator(store, config, RandomTokenGenerator::<32>)
    }

    /// Create a new session manager that uses `generator` for session ids and CSRF tokens.
    pub fn new_with_generator(
        store: Store,
        config: SessionConfig,
        generator: impl TokenGenerator + 'static,
    ) -> Self {
        Self {
            store: Arc::new(store),
            config: Arc::new(config),
            generator: Arc::new(generator),
        }
    }

    /// The session store of this manager.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The configuration of this manager.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Wrap `next` with the session lifecycle.
    pub fn handle<S>(&self, next: S) -> SessionService<S, Store> {
        SessionService {
            inner: next,
            manager: self.clone(),
        }
    }

    /// Spawn a [`Reaper`] that sweeps the store every
    /// [`cleanup_interval`](SessionConfig::cleanup_interval).
    ///
    /// Fails if the configuration does not [validate](SessionConfig::validate).
    pub fn spawn_reaper(&self) -> Result<Reaper> {
        self.config.validate()?;
        Reaper::spawn(
            Arc::clone(&self.store),
            self.config.cleanup_interval(),
            self.config.idle_expiration(),
            self.config.absolute_expiration(),
        )
    }

    /// Create a fresh session that is not stored yet.
    pub fn new_session(&self) -> Session {
        Session::fresh(Arc::clone(&self.generator), Utc::now())
    }

    /// Resolve the session of a request from its session cookie.
    ///
    /// Returns a fresh session if there is no cookie, the store does not know the session,
    /// reading from the store fails, or the stored session is expired or lacks a CSRF token.
    /// Rejected sessions are destroyed on a best-effort basis.
    pub async fn load(&self, headers: &HeaderMap) -> Session {
        let now = Utc::now();
        let Some(cookie_value) = get_cookie(headers, &self.config.cookie_name) else {
            return Session::fresh(Arc::clone(&self.generator), now);
        };
        let id = SessionId::from_cookie_value(cookie_value);

        match self.store.read(&id).await {
            Ok(Some(record)) => {
                let rejection = if record.is_expired(
                    now,
                    self.config.idle_expiration(),
                    self.config.absolute_expiration(),
                ) {
                    "is expired"
                } else if record.csrf_token().map_or(true, str::is_empty) {
                    "has no CSRF token"
                } else {
                    return Session::from_store(record, Arc::clone(&self.generator));
                };
                log::debug!("Session {id:?} {rejection}, starting a fresh session");
                if let Err(error) = self.store.destroy(&id).await {
                    log::warn!("Failed to destroy rejected session {id:?}: {error:#}");
                }
            }
            Ok(None) => log::debug!("Session {id:?} is unknown, starting a fresh session"),
            Err(error) => {
                log::warn!("Failed to read session {id:?}, starting a fresh session: {error:#}")
            }
        }
        Session::fresh(Arc::clone(&self.generator), now)
    }

    /// Write `session` back to the store and return the session cookie for the response.
    ///
    /// The activity timestamp is refreshed, and the store entry of an id the session was renewed
    /// away from is destroyed. Destroyed sessions are removed from the store and get a cookie that
    /// deletes the client's session cookie.
    /// Store failures are logged and do not prevent the cookie from being returned.
    pub async fn commit(&self, session: &Session) -> Option<HeaderValue> {
        let now = Utc::now();
        match session.prepare_commit(now) {
            Commit::Write { record, stale_id } => {
                if let Some(stale_id) = stale_id {
                    if let Err(error) = self.store.destroy(&stale_id).await {
                        log::warn!("Failed to destroy renewed session {stale_id:?}: {error:#}");
                    }
                }
                if let Err(error) = self.store.write(&record).await {
                    log::error!("Failed to write session {:?}: {error:#}", record.id);
                }
                self.session_cookie(&record.id, now)
            }
            Commit::Destroy { stored_id } => {
                if let Some(stored_id) = stored_id {
                    if let Err(error) = self.store.destroy(&stored_id).await {
                        log::error!("Failed to destroy session {stored_id:?}: {error:#}");
                    }
                }
                self.removal_cookie()
            }
        }
    }

    /// Create and store a new session for the logged-in user `user_id`,
    /// and set its cookie on `response`.
    ///
    /// This is meant for login flows. Within a handler wrapped by this manager, the response is
    /// marked with [`SessionCookieIssued::Created`], so the new session's cookie replaces the
    /// cookie of the request's session.
    pub async fn create_session<ResBody>(
        &self,
        response: &mut Response<ResBody>,
        user_id: &str,
    ) -> Result<SessionId> {
        let now = Utc::now();
        let session = Session::fresh(Arc::clone(&self.generator), now);
        session.put(USER_ID_KEY, user_id)?;
        let record = session.snapshot();
        self.store.write(&record).await?;

        append_set_cookie(response.headers_mut(), &self.cookie(&record.id, now))?;
        response
            .extensions_mut()
            .insert(SessionCookieIssued::Created(record.id.clone()));
        log::debug!("Created session {:?} for a login", record.id);
        Ok(record.id)
    }

    /// Destroy the session `id` and delete the client's session cookie via `response`.
    ///
    /// Within a handler wrapped by this manager, the response is marked with
    /// [`SessionCookieIssued::Deleted`]; if `id` is the request's own session, the manager does not
    /// write it back afterwards.
    pub async fn delete_session<ResBody>(
        &self,
        response: &mut Response<ResBody>,
        id: &SessionId,
    ) -> Result {
        self.store.destroy(id).await?;
        append_set_cookie(response.headers_mut(), &self.removal())?;
        response
            .extensions_mut()
            .insert(SessionCookieIssued::Deleted(id.clone()));
        log::debug!("Deleted session {id:?}");
        Ok(())
    }

    /// Destroy the stored entry of a session whose cookie the handler replaced with its own.
    async fn discard(&self, session: &Session) {
        if let Some(stored_id) = session.stored_id() {
            if let Err(error) = self.store.destroy(&stored_id).await {
                log::warn!("Failed to destroy replaced session {stored_id:?}: {error:#}");
            }
        }
    }

    fn builder<'a>(&'a self, value: &'a str) -> CookieBuilder<'a> {
        let mut builder = Cookie::build((self.config.cookie_name.as_str(), value))
            .path(self.config.cookie_path.as_str())
            .http_only(self.config.cookie_http_only)
            .secure(self.config.cookie_secure)
            .same_site(self.config.cookie_same_site);
        if let Some(domain) = &self.config.cookie_domain {
            builder = builder.domain(domain.as_str());
        }
        builder
    }

    fn cookie<'a>(&'a self, id: &'a SessionId, now: DateTime<Utc>) -> Cookie<'a> {
        let idle_expiration = self.config.idle_expiration();
        let expires = now.checked_add_signed(idle_expiration).and_then(expires_at);
        self.builder(id.as_str())
            .expires(expires)
            .max_age(cookie::time::Duration::seconds(idle_expiration.num_seconds()))
            .build()
    }

    fn session_cookie(&self, id: &SessionId, now: DateTime<Utc>) -> Option<HeaderValue> {
        to_header_value(&self.cookie(id, now))
            .map_err(|error| log::error!("Failed to render the session cookie: {error}"))
            .ok()
    }

    fn removal(&self) -> Cookie<'_> {
        let mut cookie = self.builder("").build();
        cookie.make_removal();
        cookie
    }

    fn removal_cookie(&self) -> Option<HeaderValue> {
        to_header_value(&self.removal())
            .map_err(|error| log::error!("Failed to render the session removal cookie: {error}"))
            .ok()
    }

    fn guard(&self, set_cookie: Option<HeaderValue>) -> ResponseGuard {
        ResponseGuard::new(self.config.cookie_name.clone(), set_cookie)
    }
}

impl<S, Store: SessionStore> Layer<S> for SessionManager<Store> {
    type Service = SessionService<S, Store>;

    fn layer(&self, inner: S) -> Self::Service {
        self.handle(inner)
    }
}

/// The service produced by [`SessionManager::handle`].
#[derive(Debug)]
pub struct SessionService<S, Store> {
    inner: S,
    manager: SessionManager<Store>,
}

impl<S: Clone, Store> Clone for SessionService<S, Store> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            manager: self.manager.clone(),
        }
    }
}

impl<S, Store, ReqBody, ResBody> Service<Request<ReqBody>> for SessionService<S, Store>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
    Store: SessionStore,
    ReqBody: Body + From<Bytes> + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: Into<BoxError>,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let manager = self.manager.clone();
        // The ready service must be the one that is called, so keep it and leave a clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let session = manager.load(request.headers()).await;

            let mut request = if requires_csrf(request.method()) {
                let config = manager.config();
                let verified = match extract_csrf_token(
                    request,
                    &config.csrf_header,
                    &config.csrf_form_field,
                    config.max_form_bytes,
                )
                .await
                {
                    Ok((request, supplied)) => verify_csrf_token(
                        session.csrf_token().as_deref(),
                        supplied.as_deref(),
                    )
                    .then_some(request),
                    Err(error) => {
                        log::debug!("Failed to read the request body for a CSRF token: {error}");
                        None
                    }
                };
                match verified {
                    Some(request) => request,
                    None => {
                        log::warn!(
                            "Rejecting request without a valid CSRF token for session {:?}",
                            session.id()
                        );
                        let set_cookie = manager.commit(&session).await;
                        let mut response = Response::new(ResBody::default());
                        *response.status_mut() = StatusCode::FORBIDDEN;
                        manager.guard(set_cookie).apply(&mut response);
                        return Ok(response);
                    }
                }
            } else {
                request
            };

            request.extensions_mut().insert(session.clone());
            let result = inner.call(request).await;

            let issued = match &result {
                Ok(response) => response.extensions().get::<SessionCookieIssued>().cloned(),
                Err(_) => None,
            };
            let set_cookie = match issued {
                // The handler's session replaces the request's session at the client.
                Some(SessionCookieIssued::Created(_)) => {
                    manager.discard(&session).await;
                    None
                }
                Some(SessionCookieIssued::Deleted(id)) if id == session.id() => None,
                _ => manager.commit(&session).await,
            };

            result.map(|mut response| {
                manager.guard(set_cookie).apply(&mut response);
                response
            })
        })
    }
}
