//! Session token generation and validation.
//!
//! Session tokens are stateless: an opaque signed string encoding the user
//! id, machine id, and expiration. No server-side session table exists;
//! tokens are validated lazily, on demand.

use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of checking a session token's signature and expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenValidation {
    /// Whether the token is valid right now.
    pub is_valid: bool,
    /// Whether the token failed specifically because it expired.
    pub is_expired: bool,
    /// User id encoded in the token, when the signature checks out.
    pub user_id: Option<String>,
    /// Token expiration, when the signature checks out.
    pub expires_at: Option<DateTime<Utc>>,
    /// Human-readable failure reason.
    pub failure_reason: Option<String>,
}

impl TokenValidation {
    /// Build a valid outcome.
    pub fn valid(user_id: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            is_valid: true,
            is_expired: false,
            user_id: Some(user_id.into()),
            expires_at: Some(expires_at),
            failure_reason: None,
        }
    }

    /// Build an expired outcome.
    pub fn expired(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            is_expired: true,
            user_id: None,
            expires_at: None,
            failure_reason: Some(reason.into()),
        }
    }

    /// Build an invalid (non-expiry) outcome.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            is_expired: false,
            user_id: None,
            expires_at: None,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Contract for issuing and checking signed session tokens.
///
/// Implementations must be side-effect-free with respect to process state:
/// N concurrent validations of the same token yield N independent,
/// consistent results.
#[async_trait]
pub trait SessionTokenProvider: Send + Sync {
    /// Mint a signed token for the given user and machine, expiring at
    /// `expires_at`.
    async fn generate_token(
        &self,
        user_id: &str,
        machine_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String>;

    /// Check a token's signature, machine binding, and expiry.
    async fn validate_token(&self, token: &str, machine_id: &str) -> Result<TokenValidation>;
}

/// JWT claims embedded in a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    /// Subject (user id)
    sub: String,
    /// Machine identifier the token was issued for
    mid: String,
    /// Expiration time
    exp: i64,
    /// Issued at
    iat: i64,
    /// JWT ID
    jti: String,
    /// Issuer
    iss: String,
}

/// HMAC-signed JWT implementation of [`SessionTokenProvider`].
pub struct JwtSessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
}

impl JwtSessionTokens {
    /// Create a provider signing with an HMAC-SHA256 secret.
    pub fn new_hmac(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            issuer: issuer.into(),
        }
    }
}

#[async_trait]
impl SessionTokenProvider for JwtSessionTokens {
    async fn generate_token(
        &self,
        user_id: &str,
        machine_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String> {
        let claims = SessionClaims {
            sub: user_id.to_string(),
            mid: machine_id.to_string(),
            exp: expires_at.timestamp(),
            iat: Utc::now().timestamp(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?;
        Ok(token)
    }

    async fn validate_token(&self, token: &str, machine_id: &str) -> Result<TokenValidation> {
        // Expiry is checked manually below so that an expired token is
        // distinguishable from a tampered one.
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp"]);

        let claims = match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(err) => {
                return Ok(TokenValidation::invalid(format!("invalid token: {err}")));
            }
        };

        if claims.mid != machine_id {
            return Ok(TokenValidation::invalid(
                "token was issued for a different machine",
            ));
        }

        let expires_at = match Utc.timestamp_opt(claims.exp, 0).single() {
            Some(ts) => ts,
            None => {
                return Ok(TokenValidation::invalid(
                    "token carries an unreadable expiration",
                ));
            }
        };

        if expires_at <= Utc::now() {
            return Ok(TokenValidation::expired("session expired"));
        }

        Ok(TokenValidation::valid(claims.sub, expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn provider() -> JwtSessionTokens {
        JwtSessionTokens::new_hmac(b"test-secret", "silent-auth-tests")
    }

    #[tokio::test]
    async fn round_trip_resolves_user_and_expiry() {
        let tokens = provider();
        let expires_at = Utc::now() + ChronoDuration::hours(1);
        let token = tokens.generate_token("u1", "M1", expires_at).await.unwrap();

        let validation = tokens.validate_token(&token, "M1").await.unwrap();
        assert!(validation.is_valid);
        assert_eq!(validation.user_id.as_deref(), Some("u1"));
        assert_eq!(
            validation.expires_at.unwrap().timestamp(),
            expires_at.timestamp()
        );
    }

    #[tokio::test]
    async fn machine_mismatch_is_invalid_not_expired() {
        let tokens = provider();
        let token = tokens
            .generate_token("u1", "M1", Utc::now() + ChronoDuration::hours(1))
            .await
            .unwrap();

        let validation = tokens.validate_token(&token, "M2").await.unwrap();
        assert!(!validation.is_valid);
        assert!(!validation.is_expired);
        assert!(validation.failure_reason.unwrap().contains("machine"));
    }

    #[tokio::test]
    async fn expired_token_is_flagged_as_expired() {
        let tokens = provider();
        let token = tokens
            .generate_token("u1", "M1", Utc::now() - ChronoDuration::minutes(5))
            .await
            .unwrap();

        let validation = tokens.validate_token(&token, "M1").await.unwrap();
        assert!(!validation.is_valid);
        assert!(validation.is_expired);
    }

    #[tokio::test]
    async fn tampered_token_is_invalid() {
        let tokens = provider();
        let token = tokens
            .generate_token("u1", "M1", Utc::now() + ChronoDuration::hours(1))
            .await
            .unwrap();

        let mut tampered = token.clone();
        tampered.pop();
        let validation = tokens.validate_token(&tampered, "M1").await.unwrap();
        assert!(!validation.is_valid);
        assert!(!validation.is_expired);
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let tokens = provider();
        let other = JwtSessionTokens::new_hmac(b"other-secret", "silent-auth-tests");
        let token = tokens
            .generate_token("u1", "M1", Utc::now() + ChronoDuration::hours(1))
            .await
            .unwrap();

        let validation = other.validate_token(&token, "M1").await.unwrap();
        assert!(!validation.is_valid);
    }
}
