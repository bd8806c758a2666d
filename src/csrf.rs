//! Cross-site request forgery protection.
//!
//! Every session carries a random CSRF token from its creation on.
//! State-changing requests must echo that token in a header or a form field.

use crate::TokenGenerator;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request};
use http_body::Body;
use http_body_util::{BodyExt, Limited};
use subtle::ConstantTimeEq;
use tower::BoxError;

/// The reserved session key under which the CSRF token is stored.
pub const CSRF_TOKEN_KEY: &str = "csrf_token";

/// Generate a new CSRF token.
pub fn generate_csrf_token(generator: &dyn TokenGenerator) -> String {
    generator.generate()
}

/// Returns true if requests with this method must carry a valid CSRF token.
///
/// ```
/// use http::Method;
/// use jot_session::requires_csrf;
///
/// assert!(requires_csrf(&Method::POST));
/// assert!(requires_csrf(&Method::DELETE));
/// assert!(!requires_csrf(&Method::GET));
/// assert!(!requires_csrf(&Method::HEAD));
/// ```
pub fn requires_csrf(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Compare the token stored in the session with the token supplied by the client in constant time.
/// Missing or empty tokens never verify.
pub fn verify_csrf_token(expected: Option<&str>, supplied: Option<&str>) -> bool {
    match (expected, supplied) {
        (Some(expected), Some(supplied)) if !expected.is_empty() => {
            expected.as_bytes().ct_eq(supplied.as_bytes()).into()
        }
        _ => false,
    }
}

/// Find the CSRF token supplied with a request.
///
/// The header `header_name` is preferred. Otherwise, url-encoded form bodies of up to
/// `max_form_bytes` are buffered and searched for `form_field`, and the request is rebuilt
/// with the buffered body so the handler can still read it.
pub(crate) async fn extract_csrf_token<ReqBody>(
    request: Request<ReqBody>,
    header_name: &str,
    form_field: &str,
    max_form_bytes: usize,
) -> Result<(Request<ReqBody>, Option<String>), BoxError>
where
    ReqBody: Body + From<Bytes>,
    ReqBody::Error: Into<BoxError>,
{
    if let Some(token) = request
        .headers()
        .get(header_name)
        .and_then(|value| value.to_str().ok())
    {
        let token = token.trim().to_owned();
        return Ok((request, Some(token)));
    }

    if !is_form_urlencoded(&request) {
        return Ok((request, None));
    }

    let (parts, body) = request.into_parts();
    let bytes = Limited::new(body, max_form_bytes)
        .collect()
        .await?
        .to_bytes();
    let token = url::form_urlencoded::parse(&bytes)
        .find(|(key, _)| key == form_field)
        .map(|(_, value)| value.into_owned());
    Ok((Request::from_parts(parts, ReqBody::from(bytes)), token))
}

fn is_form_urlencoded<ReqBody>(request: &Request<ReqBody>) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map_or(false, |mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}
