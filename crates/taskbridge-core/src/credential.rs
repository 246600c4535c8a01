//! Access-credential resolution for a source user.
//!
//! The short-lived access token is cached under `access-token:{userId}` with
//! the provider-declared TTL. The long-lived refresh token lives under
//! `refresh-token:{userId}` without TTL and is never expired by the bridge.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::store::KvStore;

/// A usable bearer credential for one source user.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub user_id: String,
}

impl Credential {
    /// Value for the outbound `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[must_use]
pub fn access_token_key(user_id: &str) -> String {
    format!("access-token:{user_id}")
}

#[must_use]
pub fn refresh_token_key(user_id: &str) -> String {
    format!("refresh-token:{user_id}")
}

/// Successful token-endpoint response.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Token exchange failures.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The identity provider answered with a non-success status.
    #[error("token endpoint rejected refresh (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("token endpoint unreachable: {0}")]
    Transport(String),

    #[error("token endpoint returned an undecodable body: {0}")]
    Decode(String),
}

/// Refresh-token grant against an identity provider.
pub trait TokenExchange: Send + Sync {
    /// Trade a refresh token for a fresh access token.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError`] when the exchange does not yield a grant.
    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ExchangeError>;
}

impl<T: TokenExchange + ?Sized> TokenExchange for &T {
    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ExchangeError> {
        (**self).refresh(refresh_token)
    }
}

impl<T: TokenExchange + ?Sized> TokenExchange for std::sync::Arc<T> {
    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ExchangeError> {
        (**self).refresh(refresh_token)
    }
}

/// OAuth 2.0 `refresh_token` grant over HTTPS.
pub struct OAuthTokenExchange {
    agent: ureq::Agent,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl OAuthTokenExchange {
    #[must_use]
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl TokenExchange for OAuthTokenExchange {
    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ExchangeError> {
        let response = self.agent.post(&self.token_url).send_form(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]);

        match response {
            Ok(response) => response
                .into_json::<TokenGrant>()
                .map_err(|err| ExchangeError::Decode(err.to_string())),
            Err(ureq::Error::Status(status, response)) => Err(ExchangeError::Rejected {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => {
                Err(ExchangeError::Transport(transport.to_string()))
            }
        }
    }
}

/// Resolves the credential for an event's user, refreshing lazily.
pub struct CredentialProvider<S, X> {
    kv: S,
    exchange: X,
}

impl<S: KvStore, X: TokenExchange> CredentialProvider<S, X> {
    pub const fn new(kv: S, exchange: X) -> Self {
        Self { kv, exchange }
    }

    /// Resolve a credential for `user_id`.
    ///
    /// `Ok(None)` means the user has not authorized the bridge (no refresh
    /// token) or the provider refused the refresh; the caller drops the event.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the token endpoint
    /// cannot be reached at all.
    pub fn resolve(&self, user_id: &str) -> Result<Option<Credential>, SyncError> {
        if let Some(access_token) = self.kv.get(&access_token_key(user_id))? {
            debug!(user = user_id, "access token cache hit");
            return Ok(Some(Credential {
                access_token,
                user_id: user_id.to_string(),
            }));
        }

        let Some(refresh_token) = self.kv.get(&refresh_token_key(user_id))? else {
            debug!(user = user_id, "no refresh token stored");
            return Ok(None);
        };

        let grant = match self.exchange.refresh(&refresh_token) {
            Ok(grant) => grant,
            Err(ExchangeError::Rejected { status, body }) => {
                warn!(user = user_id, status, body = %body, "refresh token exchange rejected");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let ttl = Duration::from_secs(grant.expires_in);
        if let Err(err) = self
            .kv
            .put(&access_token_key(user_id), &grant.access_token, Some(ttl))
        {
            warn!(user = user_id, error = %err, "failed to cache access token");
        }

        info!(user = user_id, expires_in = grant.expires_in, "obtained access token from refresh token");
        Ok(Some(Credential {
            access_token: grant.access_token,
            user_id: user_id.to_string(),
        }))
    }
}
