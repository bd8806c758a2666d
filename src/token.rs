//! Signed, time-limited identity tokens.
//!
//! A token asserts a user id until an expiry time, and can be verified without a database lookup.
//! Its textual form is `<user_id>.<expires_at_unix>.<hex_signature>`, where the signature is
//! HMAC-SHA256 of `<user_id>.<expires_at_unix>`.
//!
//! Malformed, expired and tampered tokens are not errors.
//! They parse into a [`Token`] that is not [valid](Token::is_valid), which callers treat
//! like the absence of a token.

use crate::config::TokenConfig;
use crate::cookies::{append_set_cookie, get_cookie};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use cookie::{Cookie, CookieBuilder, SameSite};
use hmac::{Hmac, Mac};
use http::header::AUTHORIZATION;
use http::HeaderMap;
use sha2::Sha256;
use std::fmt::{Debug, Display, Formatter};

type HmacSha256 = Hmac<Sha256>;

const KEY_DERIVATION_CONTEXT: &str = "jot-session identity token signing key v1";

/// An identity token.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    user_id: String,
    expires_at: DateTime<Utc>,
    signature: String,
    valid: bool,
}

impl Token {
    fn invalid() -> Self {
        Self {
            user_id: String::new(),
            expires_at: DateTime::<Utc>::default(),
            signature: String::new(),
            valid: false,
        }
    }

    /// Returns true if the token was issued by this server and is not expired.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The user id asserted by the token.
    /// Only trust it if the token [is valid](Self::is_valid), or use [`Self::valid_user_id`].
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The user id, if the token is valid.
    pub fn valid_user_id(&self) -> Option<&str> {
        self.valid.then_some(self.user_id.as_str())
    }

    /// When the token expires.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// The hex-encoded signature of the token.
    pub fn signature(&self) -> &str {
        &self.signature
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.user_id,
            self.expires_at.timestamp(),
            self.signature
        )
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

/// The key used to sign tokens. Never printed.
#[derive(Clone)]
struct SigningKey([u8; 32]);

impl Debug for SigningKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

/// Creates and verifies identity [tokens](Token).
///
/// # Example
///
/// ```
/// use jot_session::{TokenConfig, TokenFactory};
///
/// let factory = TokenFactory::new(b"a long and random shared secret", TokenConfig::default());
/// let token = factory.issue("42", chrono::Duration::hours(1));
///
/// let parsed = factory.parse(&token.to_string());
/// assert!(parsed.is_valid());
/// assert_eq!(parsed.valid_user_id(), Some("42"));
///
/// assert!(!factory.parse("42.1700000000.deadbeef").is_valid());
/// assert!(!factory.parse("garbage").is_valid());
/// ```
#[derive(Debug, Clone)]
pub struct TokenFactory {
    key: SigningKey,
    config: TokenConfig,
}

impl TokenFactory {
    /// Create a token factory.
    /// The signing key is derived from `secret` once, and the secret itself is not kept.
    pub fn new(secret: impl AsRef<[u8]>, config: TokenConfig) -> Self {
        Self {
            key: SigningKey(blake3::derive_key(KEY_DERIVATION_CONTEXT, secret.as_ref())),
            config,
        }
    }

    /// The configuration of this factory.
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issue a token for `user_id` that expires `ttl` from now.
    /// Lifetimes beyond the representable range expire at the latest representable time.
    pub fn issue(&self, user_id: impl Into<String>, ttl: Duration) -> Token {
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.issue_until(user_id, expires_at)
    }

    /// Issue a token for `user_id` that expires at `expires_at`.
    /// Sub-second precision of `expires_at` is dropped.
    pub fn issue_until(&self, user_id: impl Into<String>, expires_at: DateTime<Utc>) -> Token {
        let user_id = user_id.into();
        let expires_at_unix = expires_at.timestamp();
        let signature = hex::encode(self.mac(&user_id, expires_at_unix).finalize().into_bytes());
        Token {
            user_id,
            expires_at: DateTime::<Utc>::from_timestamp(expires_at_unix, 0).unwrap_or(expires_at),
            signature,
            valid: true,
        }
    }

    /// Parse and verify a token.
    pub fn parse(&self, raw: &str) -> Token {
        self.parse_at(raw, Utc::now())
    }

    /// Parse and verify a token, treating `now` as the current time.
    pub fn parse_at(&self, raw: &str, now: DateTime<Utc>) -> Token {
        let mut fields = raw.trim().rsplitn(3, '.');
        let (Some(signature), Some(expires_at), Some(user_id)) =
            (fields.next(), fields.next(), fields.next())
        else {
            log::trace!("Rejecting token with missing fields");
            return Token::invalid();
        };
        if user_id.is_empty() || !is_lower_hex(signature) {
            return Token::invalid();
        }
        // Only the canonical rendering is signed, so `+1`, `01` and `-0` are different tokens.
        let Some(expires_at_unix) = expires_at
            .parse::<i64>()
            .ok()
            .filter(|parsed| parsed.to_string() == expires_at)
        else {
            return Token::invalid();
        };
        let Some(expires_at) = DateTime::<Utc>::from_timestamp(expires_at_unix, 0) else {
            return Token::invalid();
        };

        let mut token = Token {
            user_id: user_id.to_owned(),
            expires_at,
            signature: signature.to_owned(),
            valid: false,
        };
        let signature_matches = hex::decode(signature).map_or(false, |signature| {
            self.mac(user_id, expires_at_unix)
                .verify_slice(&signature)
                .is_ok()
        });
        if !signature_matches {
            log::debug!("Rejecting token with a bad signature");
        } else if expires_at <= now {
            log::trace!("Rejecting expired token");
        } else {
            token.valid = true;
        }
        token
    }

    /// Find the raw token sent with a request.
    ///
    /// An `Authorization: Bearer` header takes precedence over the token cookie.
    /// Only the preferred source is consulted, even if its token turns out to be invalid.
    pub fn locate(&self, headers: &HeaderMap) -> Option<String> {
        if let Some(authorization) = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
        {
            if let Some((scheme, token)) = authorization.trim().split_once(' ') {
                if scheme.eq_ignore_ascii_case("Bearer") {
                    let token = token.trim();
                    return (!token.is_empty()).then(|| token.to_owned());
                }
            }
        }
        get_cookie(headers, &self.config.cookie_name)
    }

    /// Locate and parse the token sent with a request.
    /// If there is none, the returned token is invalid.
    pub fn authenticate(&self, headers: &HeaderMap) -> Token {
        match self.locate(headers) {
            Some(raw) => self.parse(&raw),
            None => Token::invalid(),
        }
    }

    /// Append a cookie carrying `token` to the response headers.
    pub fn set_cookie(&self, headers: &mut HeaderMap, token: &Token) -> Result {
        let remaining = (token.expires_at - Utc::now()).num_seconds().max(0);
        let cookie = self
            .cookie(token.to_string())
            .max_age(cookie::time::Duration::seconds(remaining))
            .build();
        append_set_cookie(headers, &cookie)
    }

    /// Append a cookie that deletes the token cookie at the client, e.g. on logout.
    pub fn revoke(&self, headers: &mut HeaderMap) -> Result {
        let mut cookie = self.cookie(String::new()).build();
        cookie.make_removal();
        append_set_cookie(headers, &cookie)
    }

    fn cookie(&self, value: String) -> CookieBuilder<'_> {
        Cookie::build((self.config.cookie_name.as_str(), value))
            .path("/")
            .http_only(true)
            .secure(self.config.cookie_secure)
            .same_site(SameSite::Lax)
    }

    fn mac(&self, user_id: &str, expires_at_unix: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.key.0).expect("HMAC accepts keys of any size");
        mac.update(user_id.as_bytes());
        mac.update(b".");
        mac.update(expires_at_unix.to_string().as_bytes());
        mac
    }
}

/// Signatures are emitted in lower case only, so any other spelling is a different token.
fn is_lower_hex(text: &str) -> bool {
    !text.is_empty()
        && text
            .bytes()
            .all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'))
}
