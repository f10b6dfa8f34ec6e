use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use beacon_core::config::{AuthConfig, AuthMode, TokenEntry};
use beacon_core::types::{CapabilitySet, Identity, Principal};
use tracing::{debug, info};

use crate::error::{AuthError, Result};
use crate::signed::SignedTokenOracle;

/// Resolves a bearer credential to the principal behind it.
///
/// Implementations must tolerate many concurrent calls. The gateway never
/// holds its registry lock across `verify`.
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn verify(&self, credential: &str) -> Result<Identity>;
}

/// Opaque tokens mapped to identities by a fixed table from config.
pub struct StaticTokenOracle {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenOracle {
    pub fn new() -> Self {
        Self {
            tokens: HashMap::new(),
        }
    }

    pub fn from_entries(entries: &[TokenEntry]) -> Self {
        let mut oracle = Self::new();
        for entry in entries {
            let mut principal = Principal::new(&entry.principal_id, &entry.username);
            principal.display_name = entry.display_name.clone();
            principal.role = entry.role.clone();
            let caps: CapabilitySet = entry.capabilities.iter().cloned().collect();
            oracle.insert(&entry.token, Identity::new(principal, caps));
        }
        oracle
    }

    /// Register a token. A later insert for the same token replaces the earlier one.
    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.insert(token, identity);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Default for StaticTokenOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionOracle for StaticTokenOracle {
    fn name(&self) -> &str {
        "static-token"
    }

    async fn verify(&self, credential: &str) -> Result<Identity> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        match self.tokens.get(credential) {
            Some(identity) => {
                debug!(principal = %identity.principal, "token accepted");
                Ok(identity.clone())
            }
            None => Err(AuthError::InvalidCredential("unknown token".to_string())),
        }
    }
}

/// Build the oracle selected by `auth.mode`.
pub fn from_config(config: &AuthConfig) -> Result<Arc<dyn PermissionOracle>> {
    match config.mode {
        AuthMode::Token => {
            let oracle = StaticTokenOracle::from_entries(&config.tokens);
            info!(tokens = oracle.len(), "permission oracle: static token table");
            Ok(Arc::new(oracle))
        }
        AuthMode::Signed => {
            let secret = config
                .secret
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    AuthError::Misconfigured("auth.mode = \"signed\" requires auth.secret".into())
                })?;
            info!("permission oracle: HMAC-signed tokens");
            Ok(Arc::new(SignedTokenOracle::new(secret.as_bytes())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(token: &str, caps: &[&str]) -> TokenEntry {
        TokenEntry {
            token: token.to_string(),
            principal_id: "u-1".to_string(),
            username: "alice".to_string(),
            display_name: Some("Alice".to_string()),
            role: Some("manager".to_string()),
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn known_token_resolves_identity() {
        let oracle = StaticTokenOracle::from_entries(&[entry("t-1", &["audit.view"])]);
        let identity = oracle.verify("t-1").await.unwrap();
        assert_eq!(identity.principal.username, "alice");
        assert_eq!(identity.principal.display_name.as_deref(), Some("Alice"));
        assert!(identity.capabilities.contains("audit.view"));
    }

    #[tokio::test]
    async fn unknown_and_empty_tokens_are_rejected() {
        let oracle = StaticTokenOracle::from_entries(&[entry("t-1", &[])]);
        assert!(matches!(
            oracle.verify("nope").await,
            Err(AuthError::InvalidCredential(_))
        ));
        assert_eq!(oracle.verify("").await, Err(AuthError::MissingCredential));
    }

    #[test]
    fn signed_mode_without_secret_is_misconfigured() {
        let config = AuthConfig {
            mode: AuthMode::Signed,
            tokens: Vec::new(),
            secret: None,
        };
        assert!(matches!(
            from_config(&config).map(|_| ()),
            Err(AuthError::Misconfigured(_))
        ));
    }

    #[test]
    fn token_mode_builds_table_oracle() {
        let config = AuthConfig {
            mode: AuthMode::Token,
            tokens: vec![entry("t-1", &[])],
            secret: None,
        };
        let oracle = from_config(&config).unwrap();
        assert_eq!(oracle.name(), "static-token");
    }
}
