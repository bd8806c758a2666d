use crate::{Error, Result};
use chrono::Duration;
use cookie::SameSite;
use serde::{Deserialize, Serialize};

/// Configuration of the [`SessionManager`](crate::SessionManager).
///
/// All fields have sensible defaults, so a deployment usually only overrides the cookie domain:
///
/// ```
/// use jot_session::SessionConfig;
///
/// let config = SessionConfig {
///     cookie_domain: Some("example.com".to_owned()),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// assert_eq!(config.idle_expiration(), chrono::Duration::hours(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the session cookie.
    pub cookie_name: String,
    /// `Domain` attribute of the session cookie. If `None`, the cookie is host-only.
    pub cookie_domain: Option<String>,
    /// `Path` attribute of the session cookie.
    pub cookie_path: String,
    /// Whether the session cookie carries the `Secure` attribute.
    pub cookie_secure: bool,
    /// Whether the session cookie carries the `HttpOnly` attribute.
    pub cookie_http_only: bool,
    /// `SameSite` attribute of the session cookie, one of `"Strict"`, `"Lax"` or `"None"`.
    #[serde(with = "same_site")]
    pub cookie_same_site: SameSite,
    /// Maximum time between two requests of a session before it becomes invalid, in seconds.
    pub idle_expiration_secs: u64,
    /// Maximum age of a session regardless of activity, in seconds.
    pub absolute_expiration_secs: u64,
    /// Interval between two sweeps of the [`Reaper`](crate::Reaper), in seconds.
    pub cleanup_interval_secs: u64,
    /// Request header that carries the CSRF token.
    pub csrf_header: String,
    /// Form field that carries the CSRF token in url-encoded form submissions.
    pub csrf_form_field: String,
    /// Maximum size of a url-encoded form body that is buffered to look for the CSRF token.
    pub max_form_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session".to_owned(),
            cookie_domain: None,
            cookie_path: "/".to_owned(),
            cookie_secure: true,
            cookie_http_only: true,
            cookie_same_site: SameSite::Lax,
            idle_expiration_secs: 2 * 60 * 60,
            absolute_expiration_secs: 24 * 60 * 60,
            cleanup_interval_secs: 60,
            csrf_header: "X-XSRF-Token".to_owned(),
            csrf_form_field: "csrf_token".to_owned(),
            max_form_bytes: 2 * 1024 * 1024,
        }
    }
}

impl SessionConfig {
    /// Check that the configuration is consistent.
    pub fn validate(&self) -> Result {
        if self.cookie_name.is_empty() {
            return Err(Error::InvalidConfig("cookie_name must not be empty"));
        }
        if http::HeaderName::from_bytes(self.csrf_header.as_bytes()).is_err() {
            return Err(Error::InvalidConfig("csrf_header must be a valid header name"));
        }
        if self.csrf_form_field.is_empty() {
            return Err(Error::InvalidConfig("csrf_form_field must not be empty"));
        }
        if self.idle_expiration_secs == 0 || self.absolute_expiration_secs == 0 {
            return Err(Error::InvalidConfig("expiration windows must not be zero"));
        }
        if self.absolute_expiration_secs > MAX_LIFETIME_SECS {
            return Err(Error::InvalidConfig(
                "absolute_expiration_secs must not exceed ten years",
            ));
        }
        if self.idle_expiration_secs > self.absolute_expiration_secs {
            return Err(Error::InvalidConfig(
                "idle_expiration_secs must not exceed absolute_expiration_secs",
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(Error::InvalidConfig("cleanup_interval_secs must not be zero"));
        }
        Ok(())
    }

    /// The idle expiration window.
    pub fn idle_expiration(&self) -> Duration {
        duration_from_secs(self.idle_expiration_secs)
    }

    /// The absolute expiration window.
    pub fn absolute_expiration(&self) -> Duration {
        duration_from_secs(self.absolute_expiration_secs)
    }

    /// The interval between two reaper sweeps.
    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Configuration of the [`TokenFactory`](crate::TokenFactory).
///
/// The signing secret is not part of this struct, it is handed to
/// [`TokenFactory::new`](crate::TokenFactory::new) directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Name of the cookie that carries the identity token.
    pub cookie_name: String,
    /// Whether the token cookie carries the `Secure` attribute.
    pub cookie_secure: bool,
    /// Lifetime of tokens issued on login, in seconds.
    pub ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            cookie_name: "jot".to_owned(),
            cookie_secure: true,
            ttl_secs: 30 * 24 * 60 * 60,
        }
    }
}

impl TokenConfig {
    /// Check that the configuration is consistent.
    pub fn validate(&self) -> Result {
        if self.cookie_name.is_empty() {
            return Err(Error::InvalidConfig("cookie_name must not be empty"));
        }
        if self.ttl_secs == 0 || self.ttl_secs > MAX_LIFETIME_SECS {
            return Err(Error::InvalidConfig(
                "ttl_secs must be positive and must not exceed ten years",
            ));
        }
        Ok(())
    }

    /// The lifetime of tokens issued on login.
    pub fn ttl(&self) -> Duration {
        duration_from_secs(self.ttl_secs)
    }
}

/// Upper bound for expiration windows and token lifetimes.
const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn duration_from_secs(secs: u64) -> Duration {
    // chrono stores milliseconds in an i64, larger values would panic.
    const MAX_SECS: i64 = i64::MAX / 1000;
    Duration::seconds(i64::try_from(secs).unwrap_or(MAX_SECS).min(MAX_SECS))
}

/// Serialises [`SameSite`] by its attribute value.
mod same_site {
    use cookie::SameSite;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        same_site: &SameSite,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(same_site)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<SameSite, D::Error> {
        let value = String::deserialize(deserializer)?;
        match value.to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            _ => Err(D::Error::unknown_variant(&value, &["Strict", "Lax", "None"])),
        }
    }
}
