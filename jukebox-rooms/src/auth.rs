use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

use crate::PrimaryKey;

/// An authenticated identity acting on the system.
///
/// Identities are issued elsewhere. This layer only consumes them, so the
/// type carries just enough to authorize operations and label events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub user_id: PrimaryKey,
    pub display_name: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// The credential is unknown, expired, or malformed
    #[error("invalid credentials")]
    InvalidCredentials,
    /// The provider itself could not be reached
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Represents a type that can resolve a credential into an [Identity].
/// Credential issuance and validation rules live behind this boundary.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    async fn authenticate(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// An [IdentityProvider] backed by a fixed token table, used by tests and
/// single-process deployments.
#[derive(Debug, Default)]
pub struct TokenIdentityProvider {
    tokens: DashMap<String, Identity>,
}

impl TokenIdentityProvider {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a credential for the given identity.
    pub fn insert(&self, token: impl ToString, identity: Identity) {
        self.tokens.insert(token.to_string(), identity);
    }
}

#[async_trait]
impl IdentityProvider for TokenIdentityProvider {
    async fn authenticate(&self, credential: &str) -> Result<Identity, AuthError> {
        self.tokens
            .get(credential)
            .map(|i| i.clone())
            .ok_or(AuthError::InvalidCredentials)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn resolves_known_tokens_only() {
        let provider = TokenIdentityProvider::new();

        provider.insert(
            "abc",
            Identity {
                user_id: 1,
                display_name: "john".to_string(),
            },
        );

        let identity = provider.authenticate("abc").await.unwrap();
        assert_eq!(identity.user_id, 1);

        assert!(matches!(
            provider.authenticate("xyz").await,
            Err(AuthError::InvalidCredentials)
        ));
    }
}
