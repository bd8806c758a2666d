use crate::{Result, Token, TokenFactory};
use async_trait::async_trait;
use http::{Request, Response};
use std::sync::Arc;

/// Looks up users by the id asserted in an identity token.
///
/// This is implemented by the application's user persistence.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// The user type. Its default value represents the anonymous user.
    type User: Clone + Default + Send + Sync + 'static;

    /// Find the user with the given id.
    /// Returns `Ok(None)` if there is no such user.
    async fn find_user(&self, user_id: &str) -> anyhow::Result<Option<Self::User>>;
}

/// The user resolved for a request, cached in the request extensions.
#[derive(Debug, Clone)]
struct ResolvedUser<User>(User);

/// Resolves the user of a request from its identity token, and handles the token cookie on
/// login and logout.
#[derive(Debug)]
pub struct Authenticator<Directory> {
    tokens: Arc<TokenFactory>,
    directory: Directory,
}

impl<Directory: Clone> Clone for Authenticator<Directory> {
    fn clone(&self) -> Self {
        Self {
            tokens: Arc::clone(&self.tokens),
            directory: self.directory.clone(),
        }
    }
}

impl<Directory: UserDirectory> Authenticator<Directory> {
    /// Create an authenticator that verifies tokens with `tokens` and looks users up in `directory`.
    pub fn new(tokens: Arc<TokenFactory>, directory: Directory) -> Self {
        Self { tokens, directory }
    }

    /// The token factory of this authenticator.
    pub fn tokens(&self) -> &TokenFactory {
        &self.tokens
    }

    /// The user directory of this authenticator.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// The user of this request.
    ///
    /// Returns the anonymous (default) user if the request carries no valid token,
    /// if the user does not exist, or if the directory lookup fails.
    /// The result is cached in the request extensions, so repeated calls for the same request
    /// return the same user without further lookups.
    pub async fn get_user<Body>(&self, request: &mut Request<Body>) -> Directory::User {
        let cached = request.extensions().get::<ResolvedUser<Directory::User>>();
        if let Some(ResolvedUser(user)) = cached {
            return user.clone();
        }

        let user = self.resolve(&self.tokens.authenticate(request.headers())).await;
        request.extensions_mut().insert(ResolvedUser(user.clone()));
        user
    }

    /// The user asserted by `token`, or the anonymous user.
    pub async fn resolve(&self, token: &Token) -> Directory::User {
        let Some(user_id) = token.valid_user_id() else {
            return Default::default();
        };
        match self.directory.find_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                log::debug!("Token refers to an unknown user");
                Default::default()
            }
            Err(error) => {
                log::warn!("Failed to look up the user of a valid token: {error:#}");
                Default::default()
            }
        }
    }

    /// Issue a token for `user_id` with the configured lifetime and set it as a cookie on `response`.
    pub fn login<ResBody>(
        &self,
        response: &mut Response<ResBody>,
        user_id: &str,
    ) -> Result<Token> {
        let token = self.tokens.issue(user_id, self.tokens.config().ttl());
        self.tokens.set_cookie(response.headers_mut(), &token)?;
        Ok(token)
    }

    /// Delete the token cookie at the client.
    pub fn logout<ResBody>(&self, response: &mut Response<ResBody>) -> Result {
        self.tokens.revoke(response.headers_mut())
    }
}
