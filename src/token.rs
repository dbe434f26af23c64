use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session lifetime, counted from issuance.
pub const TOKEN_TTL_HOURS: i64 = 10;

/// Claims
///
/// The identity claim carried inside every session token. Never persisted and
/// never mutated after issuance; the client simply discards it on logout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    /// Issued At (iat), unix seconds.
    pub iat: i64,
    /// Expiration Time (exp), unix seconds. Optional on the way in so that a
    /// token without an expiry can still be decoded and then refused by the
    /// session validator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issuer (iss).
    pub iss: String,
}

impl Claims {
    /// True while `now` is strictly before the expiry. A claim without an
    /// expiry is never live.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.exp.is_some_and(|exp| now.timestamp() < exp)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signature does not match")]
    InvalidSignature,
    #[error("token is malformed")]
    Malformed,
    #[error("token encoding failed: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

/// TokenCodec
///
/// Signs and verifies session tokens (HS256 JWT) with the process-wide secret.
/// Built once at startup and shared read-only, so `issue` and `decode` can run
/// from any number of requests at once without coordination.
///
/// The codec reports what a token says; it does not enforce expiry. That is the
/// session validator's job, which keeps expired claims inspectable.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    validation: Validation,
}

/// CodecState
///
/// The shared handle stored in the application state.
pub type CodecState = Arc<TokenCodec>;

impl TokenCodec {
    pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by the session validator, not here.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            validation,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Issues a token for `username`, valid for ten hours from now.
    pub fn issue(&self, username: &str) -> Result<String, TokenError> {
        self.issue_at(username, Utc::now())
    }

    /// Issues a token as if the current time were `now`.
    pub fn issue_at(&self, username: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            username: username.to_string(),
            iat: now.timestamp(),
            exp: Some((now + Duration::hours(TOKEN_TTL_HOURS)).timestamp()),
            iss: self.issuer.clone(),
        };
        self.sign(&claims)
    }

    /// Signs an arbitrary claim set.
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }

    /// Verifies the integrity tag and parses the claim.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })
    }
}
