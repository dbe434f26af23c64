use crate::{
    models::{NewUser, Role, User, UserChanges, UserQuery},
    password::{CredentialVerifier, PasswordError},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, query_builder::QueryBuilder};
use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};
use tokio::sync::RwLock;

/// Repository Trait
///
/// The account storage collaborator. It doubles as the user lookup interface
/// of the auth core (`find_by_username`, `find_by_id`, `role_of`).
///
/// Implementations log their own storage errors and report them as "nothing
/// found" (`None`, `false`, empty list); callers never retry.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Lookup ---
    async fn find_by_username(&self, username: &str) -> Option<User>;
    async fn find_by_id(&self, id: i64) -> Option<User>;

    async fn role_of(&self, username: &str) -> Option<Role> {
        self.find_by_username(username).await.map(|user| user.role)
    }

    // --- Listing ---
    // Applies the visibility floor, keyword and role filters of `query`.
    async fn list_users(&self, query: &UserQuery) -> Vec<User>;
    async fn count_users(&self) -> Result<i64, RepositoryError>;

    // --- Mutations ---
    // Conflict when the username is already held by another account.
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError>;
    // Ok(None) when the account does not exist.
    async fn update_user(
        &self,
        id: i64,
        changes: UserChanges,
    ) -> Result<Option<User>, RepositoryError>;
    async fn delete_user(&self, id: i64) -> bool;
}

/// RepositoryError
///
/// Failures of the mutating and counting calls, where "nothing happened" is
/// not a safe answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("username is already taken")]
    Conflict,
    #[error("account storage is unavailable")]
    Unavailable,
}

impl RepositoryError {
    fn from_sqlx(op: &str, err: sqlx::Error) -> Self {
        if err
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation())
        {
            return RepositoryError::Conflict;
        }
        tracing::error!("{} error: {:?}", op, err);
        RepositoryError::Unavailable
    }
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// bootstrap_super_admin
///
/// Creates the very first account as a super-admin when the account table is
/// empty. Returns the created account, or `None` when accounts already exist
/// or the table could not be counted. Once created it is an ordinary account
/// as far as the policy is concerned.
pub async fn bootstrap_super_admin(
    repo: &dyn Repository,
    credentials: &dyn CredentialVerifier,
    username: &str,
    password: &str,
) -> Result<Option<User>, PasswordError> {
    match repo.count_users().await {
        Ok(0) => {}
        Ok(_) => return Ok(None),
        Err(e) => {
            tracing::error!("skipping super-admin bootstrap: {}", e);
            return Ok(None);
        }
    }

    let password_hash = credentials.hash(password)?;
    let created = repo
        .create_user(NewUser {
            username: username.to_string(),
            password_hash,
            role: Role::SuperAdmin,
        })
        .await;

    match created {
        Ok(user) => {
            tracing::warn!(
                username = %user.username,
                "created default super-admin account; change its password"
            );
            Ok(Some(user))
        }
        Err(e) => {
            tracing::error!("failed to create default super-admin account: {}", e);
            Ok(None)
        }
    }
}

// --- Postgres ---

/// Raw `users` row. The role column is converted into `Role` on the way out,
/// refusing rows that hold anything but 1, 2 or 3.
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    role: i16,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> Option<User> {
        match Role::try_from(self.role) {
            Ok(role) => Some(User {
                id: self.id,
                username: self.username,
                password_hash: self.password_hash,
                role,
                created_at: self.created_at,
                updated_at: self.updated_at,
            }),
            Err(e) => {
                tracing::error!(id = self.id, "rejecting account row: {}", e);
                None
            }
        }
    }
}

const USER_COLUMNS: &str = "id, username, password_hash, role, created_at, updated_at";

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations under `migrations/`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn fetch_one_where(&self, clause: &str, bind: QueryValue<'_>) -> Option<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause}");
        let query = sqlx::query_as::<_, UserRow>(&sql);
        let query = match bind {
            QueryValue::Id(id) => query.bind(id),
            QueryValue::Name(name) => query.bind(name),
        };
        query
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("user lookup error: {:?}", e);
                None
            })
            .and_then(UserRow::into_user)
    }
}

enum QueryValue<'a> {
    Id(i64),
    Name(&'a str),
}

/// Escapes LIKE wildcards so a keyword only ever matches literally.
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_by_username(&self, username: &str) -> Option<User> {
        self.fetch_one_where("username = $1", QueryValue::Name(username))
            .await
    }

    async fn find_by_id(&self, id: i64) -> Option<User> {
        self.fetch_one_where("id = $1", QueryValue::Id(id)).await
    }

    /// list_users
    ///
    /// Builds the filter with QueryBuilder so every value stays a bound parameter.
    async fn list_users(&self, query: &UserQuery) -> Vec<User> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE role >= "));
        builder.push_bind(query.min_visible.tier());

        if let Some(keyword) = query.keyword.as_deref().filter(|k| !k.is_empty()) {
            builder.push(" AND LOWER(username) LIKE ");
            builder.push_bind(like_pattern(keyword));
        }

        if let Some(role) = query.role {
            builder.push(" AND role = ");
            builder.push_bind(role.tier());
        }

        builder.push(" ORDER BY id ASC");

        match builder
            .build_query_as::<UserRow>()
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows.into_iter().filter_map(UserRow::into_user).collect(),
            Err(e) => {
                tracing::error!("list_users error: {:?}", e);
                vec![]
            }
        }
    }

    async fn count_users(&self) -> Result<i64, RepositoryError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_sqlx("count_users", e))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let sql = format!(
            "INSERT INTO users (username, password_hash, role, created_at, updated_at) \
             VALUES ($1, $2, $3, NOW(), NOW()) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role.tier())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_sqlx("create_user", e))?;
        row.into_user().ok_or(RepositoryError::Unavailable)
    }

    /// update_user
    ///
    /// COALESCE keeps the stored hash when no new password was supplied.
    async fn update_user(
        &self,
        id: i64,
        changes: UserChanges,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!(
            "UPDATE users SET username = $2, role = $3, \
             password_hash = COALESCE($4, password_hash), updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(&changes.username)
            .bind(changes.role.tier())
            .bind(changes.password_hash.as_deref())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_sqlx("update_user", e))?;
        match row {
            Some(row) => row.into_user().map(Some).ok_or(RepositoryError::Unavailable),
            None => Ok(None),
        }
    }

    async fn delete_user(&self, id: i64) -> bool {
        match sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_user error: {:?}", e);
                false
            }
        }
    }
}

// --- In-memory ---

/// MemoryRepository
///
/// A process-local `Repository` used by the test suites and for running the
/// server locally without a database. Enforces the same username uniqueness
/// as the `users` table: the check and the insert happen under one write lock.
#[derive(Default)]
pub struct MemoryRepository {
    users: RwLock<Vec<User>>,
    next_id: AtomicI64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an account directly, bypassing every policy check.
    pub async fn seed(&self, username: &str, password_hash: &str, role: Role) -> User {
        let mut users = self.users.write().await;
        self.push(&mut users, username, password_hash, role)
    }

    fn push(&self, users: &mut Vec<User>, username: &str, password_hash: &str, role: Role) -> User {
        let now = Utc::now();
        let user = User {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        user
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_by_username(&self, username: &str) -> Option<User> {
        self.users
            .read()
            .await
            .iter()
            .find(|u| u.username == username)
            .cloned()
    }

    async fn find_by_id(&self, id: i64) -> Option<User> {
        self.users.read().await.iter().find(|u| u.id == id).cloned()
    }

    async fn list_users(&self, query: &UserQuery) -> Vec<User> {
        self.users
            .read()
            .await
            .iter()
            .filter(|u| query.matches(u))
            .cloned()
            .collect()
    }

    async fn count_users(&self) -> Result<i64, RepositoryError> {
        Ok(self.users.read().await.len() as i64)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.username == user.username) {
            return Err(RepositoryError::Conflict);
        }
        Ok(self.push(&mut users, &user.username, &user.password_hash, user.role))
    }

    async fn update_user(
        &self,
        id: i64,
        changes: UserChanges,
    ) -> Result<Option<User>, RepositoryError> {
        let mut users = self.users.write().await;
        if users
            .iter()
            .any(|u| u.id != id && u.username == changes.username)
        {
            return Err(RepositoryError::Conflict);
        }
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        user.username = changes.username;
        user.role = changes.role;
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: i64) -> bool {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|u| u.id != id);
        users.len() != before
    }
}
