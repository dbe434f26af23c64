use crate::{
    error::AuthError,
    models::{LoginResponse, Role, User},
    password::CredentialState,
    policy::DenyReason,
    repository::RepositoryState,
    token::{CodecState, TokenError},
};

/// AuthService
///
/// Glue between the user lookup, credential verification and token
/// collaborators. Holds no session state of its own: logging out is the client
/// dropping its token.
#[derive(Clone)]
pub struct AuthService {
    repo: RepositoryState,
    credentials: CredentialState,
    codec: CodecState,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error(transparent)]
    Denied(#[from] AuthError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl AuthService {
    pub fn new(repo: RepositoryState, credentials: CredentialState, codec: CodecState) -> Self {
        Self {
            repo,
            credentials,
            codec,
        }
    }

    /// login
    ///
    /// Checks the credentials and issues a session token. Only super-admins
    /// and admins may open a session here; normal users are refused at the door.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, LoginError> {
        let user = self
            .repo
            .find_by_username(username)
            .await
            .ok_or(AuthError::UserNotFound)?;

        if !self.credentials.verify(password, &user.password_hash) {
            return Err(AuthError::PasswordWrong.into());
        }

        if user.role == Role::NormalUser {
            return Err(AuthError::NoRight(DenyReason::NoRight).into());
        }

        let token = self.codec.issue(&user.username)?;
        tracing::info!(username = %user.username, role = %user.role, "session issued");

        Ok(LoginResponse {
            token,
            username: user.username,
            role: user.role,
        })
    }

    /// Resolves an authenticated username to its current account. The account
    /// may have been deleted since the token was issued.
    pub async fn actor(&self, username: &str) -> Result<User, AuthError> {
        self.repo
            .find_by_username(username)
            .await
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn role_of(&self, username: &str) -> Option<Role> {
        self.repo.role_of(username).await
    }
}
