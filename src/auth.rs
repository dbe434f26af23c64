use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{DateTime, Utc};

use crate::{
    error::AuthError,
    token::{CodecState, TokenCodec},
};

/// The only accepted credential scheme. Case-sensitive.
pub const BEARER_SCHEME: &str = "Bearer";

/// authenticate
///
/// The session gate: turns the raw `Authorization` header value into the
/// authenticated username, or the reason it cannot.
///
/// 1. absent or empty → `MissingCredential`
/// 2. anything but `Bearer <token>` with a single separating space → `BadCredentialFormat`
/// 3. token fails to decode or verify → `InvalidCredential`
/// 4. expiry missing or reached → `CredentialExpired`
pub fn authenticate(raw: Option<&str>, codec: &TokenCodec) -> Result<String, AuthError> {
    authenticate_at(raw, codec, Utc::now())
}

/// `authenticate` against an explicit clock.
pub fn authenticate_at(
    raw: Option<&str>,
    codec: &TokenCodec,
    now: DateTime<Utc>,
) -> Result<String, AuthError> {
    let raw = raw
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::MissingCredential)?;

    let (scheme, token) = raw
        .split_once(' ')
        .ok_or(AuthError::BadCredentialFormat)?;
    if scheme != BEARER_SCHEME || token.contains(' ') {
        return Err(AuthError::BadCredentialFormat);
    }

    let claims = codec.decode(token).map_err(|e| {
        tracing::debug!("rejecting token: {}", e);
        AuthError::InvalidCredential
    })?;

    if !claims.is_live_at(now) {
        return Err(AuthError::CredentialExpired);
    }

    Ok(claims.username)
}

/// AuthUser Extractor Result
///
/// The authenticated identity of a request: just the username from the token.
/// Handlers that need the actor's tier resolve it through `AuthService`, so a
/// role change takes effect on the next request rather than at the next login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub username: String,
}

/// AuthUser Extractor Implementation
///
/// Reuses the identity the session middleware already attached to the request
/// when there is one; otherwise validates the `Authorization` header itself.
///
/// Rejection: `AuthError`, rendered as 401 with a JSON error body.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    CodecState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let codec = CodecState::from_ref(state);

        let result = match parts.headers.get(header::AUTHORIZATION) {
            None => authenticate(None, &codec),
            Some(value) => match value.to_str() {
                Ok(raw) => authenticate(Some(raw), &codec),
                // Opaque (non-visible-ASCII) bytes cannot be a bearer token.
                Err(_) => Err(AuthError::BadCredentialFormat),
            },
        };

        match result {
            Ok(username) => Ok(AuthUser { username }),
            Err(e) => {
                tracing::debug!(uri = %parts.uri, "authentication failed: {}", e.code());
                Err(e)
            }
        }
    }
}
