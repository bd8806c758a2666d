//! Glue between the `cookie` crate and `http` header maps.

use crate::Result;
use chrono::{DateTime, Utc};
use cookie::time::OffsetDateTime;
use cookie::Cookie;
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};

/// Find the value of the cookie `name` in the `Cookie` headers of a request.
/// If the cookie is sent multiple times, the first occurrence wins. Empty values count as absent.
pub(crate) fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .flatten()
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value_trimmed().to_owned())
        .filter(|value| !value.is_empty())
}

/// Returns true if the `Set-Cookie` header value sets the cookie `name`.
pub(crate) fn is_set_cookie_named(value: &HeaderValue, name: &str) -> bool {
    value
        .to_str()
        .ok()
        .and_then(|value| Cookie::parse(value).ok())
        .map_or(false, |cookie| cookie.name() == name)
}

/// Render `cookie` as a `Set-Cookie` header value.
pub(crate) fn to_header_value(cookie: &Cookie<'_>) -> Result<HeaderValue> {
    Ok(HeaderValue::try_from(cookie.to_string())?)
}

/// Append `cookie` to the `Set-Cookie` headers of a response.
pub(crate) fn append_set_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) -> Result {
    headers.append(SET_COOKIE, to_header_value(cookie)?);
    Ok(())
}

/// Convert a point in time for the `Expires` attribute.
/// Returns `None` if it is not representable, in which case the cookie relies on `Max-Age`.
pub(crate) fn expires_at(at: DateTime<Utc>) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(at.timestamp()).ok()
}
