/// All errors that can occur in this crate.
///
/// Note that invalid, expired or tampered identity tokens are not errors.
/// They are represented as a [`Token`](crate::Token) whose [`is_valid`](crate::Token::is_valid) is false.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error occurred in the session store.
    #[error("session store error: {0}")]
    SessionStore(#[from] anyhow::Error),

    /// A handler asked for the request's session, but none was attached.
    /// This means the handler is not wrapped by a [`SessionManager`](crate::SessionManager),
    /// which is a programming error rather than a runtime condition.
    #[error("no session is attached to the request, the handler is not wrapped by the session manager")]
    SessionMissing,

    /// The given key is reserved for internal session bookkeeping and cannot be modified.
    #[error("the session key {0:?} is reserved")]
    ReservedKey(String),

    /// A session value could not be converted to or from its stored representation.
    #[error("failed to encode session value: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A cookie could not be rendered as a header value, e.g. because of a control character.
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// The configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

mod expect_impl_error {
    trait ExpectImplError: std::error::Error + Send + Sync {}

    impl ExpectImplError for super::Error {}
}
