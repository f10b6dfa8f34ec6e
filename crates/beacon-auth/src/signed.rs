//! HMAC-SHA256 signed bearer tokens.
//!
//! Token layout: `<hex(claims JSON)>.<hex(HMAC-SHA256(secret, first segment))>`.
//! The issuing side (the REST layer's login endpoint) shares the secret; the
//! gateway only verifies.

use async_trait::async_trait;
use beacon_core::types::{CapabilitySet, Identity, Principal};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{AuthError, Result};
use crate::oracle::PermissionOracle;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried inside a signed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal id.
    pub sub: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Expiry as unix seconds. Tokens without `exp` never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl TokenClaims {
    fn into_identity(self) -> Identity {
        let mut principal = Principal::new(self.sub, self.username);
        if let Some(name) = self.name {
            principal = principal.with_display_name(name);
        }
        if let Some(role) = self.role {
            principal = principal.with_role(role);
        }
        let caps: CapabilitySet = self.capabilities.into_iter().collect();
        Identity::new(principal, caps)
    }
}

pub struct SignedTokenOracle {
    secret: Vec<u8>,
}

impl SignedTokenOracle {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| AuthError::Misconfigured("invalid HMAC key length".to_string()))
    }

    /// Sign `claims` into a token string.
    pub fn issue(&self, claims: &TokenClaims) -> Result<String> {
        let json = serde_json::to_vec(claims)
            .map_err(|e| AuthError::InvalidCredential(e.to_string()))?;
        let body = hex::encode(json);
        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{body}.{sig}"))
    }

    /// Check the signature and expiry, returning the embedded claims.
    pub fn decode(&self, token: &str) -> Result<TokenClaims> {
        let (body, sig_hex) = token
            .split_once('.')
            .ok_or_else(|| AuthError::InvalidCredential("malformed token".to_string()))?;

        let sig = hex::decode(sig_hex)
            .map_err(|_| AuthError::InvalidCredential("signature is not valid hex".to_string()))?;
        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        mac.verify_slice(&sig)
            .map_err(|_| AuthError::InvalidCredential("signature mismatch".to_string()))?;

        let json = hex::decode(body)
            .map_err(|_| AuthError::InvalidCredential("claims are not valid hex".to_string()))?;
        let claims: TokenClaims = serde_json::from_slice(&json)
            .map_err(|e| AuthError::InvalidCredential(format!("bad claims: {e}")))?;

        if let Some(exp) = claims.exp {
            if exp <= Utc::now().timestamp() {
                return Err(AuthError::Expired);
            }
        }
        Ok(claims)
    }
}

#[async_trait]
impl PermissionOracle for SignedTokenOracle {
    fn name(&self) -> &str {
        "signed-token"
    }

    async fn verify(&self, credential: &str) -> Result<Identity> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        self.decode(credential).map(TokenClaims::into_identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: Option<i64>) -> TokenClaims {
        TokenClaims {
            sub: "u-42".into(),
            username: "bob".into(),
            name: None,
            role: Some("auditor".into()),
            capabilities: vec!["audit.view".into()],
            exp,
        }
    }

    #[tokio::test]
    async fn issued_token_verifies() {
        let oracle = SignedTokenOracle::new(b"secret");
        let token = oracle.issue(&claims(None)).unwrap();
        let identity = oracle.verify(&token).await.unwrap();
        assert_eq!(identity.principal.id, "u-42");
        assert_eq!(identity.principal.role.as_deref(), Some("auditor"));
        assert!(identity.capabilities.contains("audit.view"));
    }

    #[tokio::test]
    async fn other_secret_is_rejected() {
        let token = SignedTokenOracle::new(b"secret").issue(&claims(None)).unwrap();
        let err = SignedTokenOracle::new(b"other").verify(&token).await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredential("signature mismatch".into()));
    }

    #[tokio::test]
    async fn tampered_claims_are_rejected() {
        let oracle = SignedTokenOracle::new(b"secret");
        let token = oracle.issue(&claims(None)).unwrap();
        let (_, sig) = token.split_once('.').unwrap();
        let mut forged = claims(None);
        forged.capabilities.push("users.manage".into());
        let forged_body = hex::encode(serde_json::to_vec(&forged).unwrap());
        let result = oracle.verify(&format!("{forged_body}.{sig}")).await;
        assert!(matches!(result, Err(AuthError::InvalidCredential(_))));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let oracle = SignedTokenOracle::new(b"secret");
        let past = Utc::now().timestamp() - 60;
        let token = oracle.issue(&claims(Some(past))).unwrap();
        assert_eq!(oracle.verify(&token).await.unwrap_err(), AuthError::Expired);

        let future = Utc::now().timestamp() + 3600;
        let token = oracle.issue(&claims(Some(future))).unwrap();
        assert!(oracle.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn garbage_is_rejected() {
        let oracle = SignedTokenOracle::new(b"secret");
        for token in ["", "abc", "zz.zz", "."] {
            assert!(oracle.verify(token).await.is_err(), "{token:?} accepted");
        }
    }
}
