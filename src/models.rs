use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use utoipa::ToSchema;
use validator::Validate;

// --- Role Hierarchy ---

/// Role
///
/// The three account tiers. The wire and storage representation is the tier
/// number (1, 2, 3); any other number is rejected when it crosses into the
/// application, so the policy engine only ever sees these three variants.
///
/// Ordering follows the tier number: `SuperAdmin < Admin < NormalUser`, i.e. a
/// "smaller" role is a more privileged one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum Role {
    SuperAdmin = 1,
    Admin = 2,
    NormalUser = 3,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::SuperAdmin, Role::Admin, Role::NormalUser];

    /// The tier number used on the wire and in the `users.role` column.
    pub fn tier(self) -> i16 {
        self as i16
    }
}

/// InvalidRole
///
/// Raised when an integer outside {1, 2, 3} is offered as a role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid role value {0}, expected 1, 2 or 3")]
pub struct InvalidRole(pub i16);

impl TryFrom<i16> for Role {
    type Error = InvalidRole;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Role::SuperAdmin),
            2 => Ok(Role::Admin),
            3 => Ok(Role::NormalUser),
            other => Err(InvalidRole(other)),
        }
    }
}

impl From<Role> for i16 {
    fn from(role: Role) -> i16 {
        role.tier()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::SuperAdmin => "super-admin",
            Role::Admin => "admin",
            Role::NormalUser => "user",
        };
        f.write_str(name)
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The account record owned by the storage layer. Carries the password hash,
/// so it never leaves the server as-is; handlers respond with `UserView`.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    // Unique and case-sensitive.
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// UserView
///
/// Public projection of an account (GET /users, GET /me, create/edit responses).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct UserView {
    pub id: i64,
    pub username: String,
    #[ts(type = "1 | 2 | 3")]
    #[schema(value_type = i16, example = 2)]
    pub role: Role,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// NewUser
///
/// Insert payload handed to the repository once the password has been hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// UserChanges
///
/// Full update applied by `Repository::update_user`. `role` is always the
/// effective role granted by the policy, never the raw request value.
#[derive(Debug, Clone)]
pub struct UserChanges {
    pub username: String,
    pub role: Role,
    // None leaves the stored hash untouched.
    pub password_hash: Option<String>,
}

/// UserQuery
///
/// Listing/search filter. `min_visible` is the visibility floor handed out by
/// the policy; only accounts with `role >= min_visible` are returned.
#[derive(Debug, Clone)]
pub struct UserQuery {
    pub min_visible: Role,
    pub keyword: Option<String>,
    pub role: Option<Role>,
}

impl UserQuery {
    pub fn visible_from(min_visible: Role) -> Self {
        Self {
            min_visible,
            keyword: None,
            role: None,
        }
    }

    /// In-process version of the predicate the SQL query applies.
    pub fn matches(&self, user: &User) -> bool {
        if user.role < self.min_visible {
            return false;
        }
        if let Some(role) = self.role {
            if user.role != role {
                return false;
            }
        }
        match &self.keyword {
            Some(keyword) => user
                .username
                .to_lowercase()
                .contains(&keyword.to_lowercase()),
            None => true,
        }
    }
}

// --- Request Payloads (Input Schemas) ---

/// LoginRequest
///
/// Input payload for POST /api/v1/login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    #[schema(example = "admin")]
    pub username: String,
    pub password: String,
}

/// CreateUserRequest
///
/// Input payload for POST /api/v1/user/add. `role` is the requested tier of
/// the new account; the policy decides whether the actor may grant it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct CreateUserRequest {
    #[validate(length(min = 4, max = 12, message = "username must be 4-12 characters"))]
    pub username: String,
    #[validate(length(min = 6, max = 20, message = "password must be 6-20 characters"))]
    pub password: String,
    #[ts(type = "1 | 2 | 3")]
    #[schema(value_type = i16, example = 3)]
    pub role: Role,
}

/// EditUserRequest
///
/// Input payload for PUT /api/v1/user/{id}. An absent `role` keeps the target's
/// current tier; an absent or empty `password` keeps the current password.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct EditUserRequest {
    #[validate(length(min = 4, max = 12, message = "username must be 4-12 characters"))]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "1 | 2 | 3 | null")]
    #[schema(value_type = Option<i16>)]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    #[validate(length(min = 6, max = 20, message = "password must be 6-20 characters"))]
    pub password: Option<String>,
}

impl EditUserRequest {
    /// Treats an empty password field the same as an absent one.
    pub fn normalized(mut self) -> Self {
        if self.password.as_deref().is_some_and(str::is_empty) {
            self.password = None;
        }
        self
    }
}

// --- Output Schemas ---

/// LoginResponse
///
/// Output of a successful login. Never carries the password or its hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    #[ts(type = "1 | 2")]
    #[schema(value_type = i16, example = 1)]
    pub role: Role,
}

/// UserList
///
/// Output of GET /users and GET /users/search.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserList {
    pub data: Vec<UserView>,
    pub total: i64,
}
