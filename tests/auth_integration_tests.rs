use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, Method, Request, StatusCode, Uri, header, request::Parts},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use yanblog::{
    AppState, Argon2Verifier, MemoryRepository,
    auth::AuthUser,
    config::AppConfig,
    error::AuthError,
    token::{Claims, TokenCodec},
};

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

fn create_app_state() -> AppState {
    let config = AppConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };
    AppState::new(
        Arc::new(MemoryRepository::new()),
        Arc::new(Argon2Verifier),
        config,
    )
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn parts_with_authorization(value: &str) -> Parts {
    let mut parts = get_request_parts(Method::GET, "/api/v1/me".parse().unwrap());
    parts
        .headers
        .insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    parts
}

async fn extract(parts: &mut Parts, state: &AppState) -> Result<AuthUser, AuthError> {
    AuthUser::from_request_parts(parts, state).await
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_token() {
    let state = create_app_state();
    let token = state.codec.issue("admin").unwrap();

    let mut parts = parts_with_authorization(&format!("Bearer {token}"));
    let user = extract(&mut parts, &state).await.unwrap();

    assert_eq!(user.username, "admin");
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let state = create_app_state();
    let mut parts = get_request_parts(Method::GET, "/api/v1/me".parse().unwrap());

    let rejection = extract(&mut parts, &state).await.unwrap_err();
    assert_eq!(rejection, AuthError::MissingCredential);
    assert_eq!(rejection.into_response().status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_wrong_scheme() {
    let state = create_app_state();
    let mut parts = parts_with_authorization("Basic abc123");

    assert_eq!(
        extract(&mut parts, &state).await,
        Err(AuthError::BadCredentialFormat)
    );
}

#[tokio::test]
async fn test_auth_failure_with_empty_bearer_token() {
    let state = create_app_state();
    let mut parts = parts_with_authorization("Bearer ");

    let result = extract(&mut parts, &state).await;
    assert!(matches!(
        result,
        Err(AuthError::InvalidCredential) | Err(AuthError::BadCredentialFormat)
    ));
}

#[tokio::test]
async fn test_auth_failure_with_foreign_signature() {
    let state = create_app_state();
    let foreign = TokenCodec::new("some-other-secret", "yanblog");
    let token = foreign.issue("admin").unwrap();

    let mut parts = parts_with_authorization(&format!("Bearer {token}"));
    assert_eq!(
        extract(&mut parts, &state).await,
        Err(AuthError::InvalidCredential)
    );
}

#[tokio::test]
async fn test_auth_failure_with_swapped_payload() {
    let state = create_app_state();
    let reader = state.codec.issue("reader").unwrap();
    let admin = state.codec.issue("admin").unwrap();

    // Claims of one token carried under the signature of another.
    let reader_parts: Vec<&str> = reader.split('.').collect();
    let admin_payload = admin.split('.').nth(1).unwrap();
    let forged = format!("{}.{}.{}", reader_parts[0], admin_payload, reader_parts[2]);

    let mut parts = parts_with_authorization(&format!("Bearer {forged}"));
    assert_eq!(
        extract(&mut parts, &state).await,
        Err(AuthError::InvalidCredential)
    );
}

#[tokio::test]
async fn test_auth_failure_with_garbage_token() {
    let state = create_app_state();
    let mut parts = parts_with_authorization("Bearer not.a.token");

    assert_eq!(
        extract(&mut parts, &state).await,
        Err(AuthError::InvalidCredential)
    );
}

#[tokio::test]
async fn test_auth_failure_with_expired_token() {
    let state = create_app_state();
    // Issued eleven hours ago: one hour past its ten-hour window.
    let token = state
        .codec
        .issue_at("admin", Utc::now() - Duration::hours(11))
        .unwrap();

    // The codec still reads the claim...
    let claims = state.codec.decode(&token).unwrap();
    assert_eq!(claims.username, "admin");

    // ...but the session gate refuses it.
    let mut parts = parts_with_authorization(&format!("Bearer {token}"));
    let rejection = extract(&mut parts, &state).await.unwrap_err();
    assert_eq!(rejection, AuthError::CredentialExpired);
    assert_eq!(rejection.into_response().status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_without_expiry_claim() {
    let state = create_app_state();
    let token = state
        .codec
        .sign(&Claims {
            username: "admin".to_string(),
            iat: Utc::now().timestamp(),
            exp: None,
            iss: "yanblog".to_string(),
        })
        .unwrap();

    let mut parts = parts_with_authorization(&format!("Bearer {token}"));
    assert_eq!(
        extract(&mut parts, &state).await,
        Err(AuthError::CredentialExpired)
    );
}

#[tokio::test]
async fn test_auth_reuses_identity_attached_by_middleware() {
    let state = create_app_state();
    let mut parts = get_request_parts(Method::GET, "/api/v1/me".parse().unwrap());
    parts.extensions.insert(AuthUser {
        username: "already-validated".to_string(),
    });

    let user = extract(&mut parts, &state).await.unwrap();
    assert_eq!(user.username, "already-validated");
}
