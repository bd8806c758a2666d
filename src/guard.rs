use crate::cookies::is_set_cookie_named;
use crate::SessionId;
use http::header::{CACHE_CONTROL, SET_COOKIE, VARY};
use http::{HeaderValue, Response};

/// Marks a response whose handler issued a session cookie itself,
/// through [`SessionManager::create_session`](crate::SessionManager::create_session) or
/// [`SessionManager::delete_session`](crate::SessionManager::delete_session).
///
/// The [`ResponseGuard`] keeps the handler's cookie for such responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCookieIssued {
    /// A session was created and its cookie set.
    Created(SessionId),
    /// A session was destroyed and its cookie deleted.
    Deleted(SessionId),
}

/// Writes the session cookie and the cache headers into a response, exactly once.
///
/// A tower response carries its complete head before the first body byte is polled,
/// so applying the guard before the response leaves the session service is equivalent to
/// writing the cookie at the first attempt to send headers or body.
/// [`ResponseGuard::apply`] consumes the guard, so it cannot run twice.
///
/// Every response gets `Vary: Cookie` and `Cache-Control: no-cache="Set-Cookie"`,
/// so shared caches never replay one visitor's session cookie to another.
/// Every response carries at most one `Set-Cookie` header for the session cookie:
/// session cookies written by the handler are replaced with the guard's cookie,
/// unless the response is marked with [`SessionCookieIssued`].
#[derive(Debug)]
#[must_use]
pub struct ResponseGuard {
    cookie_name: String,
    set_cookie: Option<HeaderValue>,
}

impl ResponseGuard {
    /// Create a guard that writes `set_cookie` as the session cookie named `cookie_name`.
    pub fn new(cookie_name: impl Into<String>, set_cookie: Option<HeaderValue>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            set_cookie,
        }
    }

    /// Write the session cookie and cache headers into `response`.
    pub fn apply<ResBody>(self, response: &mut Response<ResBody>) {
        let issued_by_handler = response.extensions().get::<SessionCookieIssued>().is_some();
        let headers = response.headers_mut();
        headers.append(VARY, HeaderValue::from_static("Cookie"));
        headers.append(CACHE_CONTROL, HeaderValue::from_static(r#"no-cache="Set-Cookie""#));

        let (mut session_cookies, other_cookies): (Vec<_>, Vec<_>) = headers
            .get_all(SET_COOKIE)
            .iter()
            .cloned()
            .partition(|value| is_set_cookie_named(value, &self.cookie_name));

        let session_cookie = if issued_by_handler {
            session_cookies.pop().or(self.set_cookie)
        } else {
            self.set_cookie.or_else(|| session_cookies.pop())
        };
        if !session_cookies.is_empty() {
            log::debug!(
                "Dropping {} superfluous session cookies from the response",
                session_cookies.len()
            );
        }

        headers.remove(SET_COOKIE);
        for value in other_cookies {
            headers.append(SET_COOKIE, value);
        }
        if let Some(value) = session_cookie {
            headers.append(SET_COOKIE, value);
        }
    }
}
