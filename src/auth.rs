//! Access-token collaborator consumed by the listener multiplexer.
//!
//! Token acquisition (OAuth flows, storage) lives outside this crate; a
//! [`TokenProvider`] only has to hand out the current token for a scope and,
//! optionally, force a refresh.

use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::AuthError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    /// Id of the user the token belongs to; topics are suffixed with it.
    pub user_id: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<SystemTime>,
}

impl AccessToken {
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            user_id: user_id.into(),
            scopes: Vec::new(),
            expires_at: None,
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_expiry(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && self.expires_at.is_none_or(|at| at > SystemTime::now())
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current token able to listen to topics requiring `scope`.
    async fn access_token(&self, scope: Option<&str>) -> Result<AccessToken, AuthError>;

    fn supports_refresh(&self) -> bool {
        false
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Hands out one fixed token. Scopes are only checked when the token lists any.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self, scope: Option<&str>) -> Result<AccessToken, AuthError> {
        if let Some(scope) = scope {
            if !self.token.scopes.is_empty() && !self.token.has_scope(scope) {
                return Err(AuthError::InvalidToken { scope: Some(scope.to_string()) });
            }
        }
        Ok(self.token.clone())
    }
}
