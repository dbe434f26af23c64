use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, AuthError},
    models::{
        CreateUserRequest, EditUserRequest, LoginRequest, LoginResponse, NewUser, Role, User,
        UserChanges, UserList, UserQuery, UserView,
    },
    policy::{self, Action, Decision, Grant},
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::Deserialize;
use validator::Validate;

// --- Filter Structs ---

/// UserSearchFilter
///
/// Query parameters of GET /users/search.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserSearchFilter {
    /// Case-insensitive substring of the username.
    pub keyword: Option<String>,
    /// Exact tier to match (1, 2 or 3). `0` or absent means any tier.
    pub role: Option<i16>,
}

impl UserSearchFilter {
    fn role_filter(&self) -> Result<Option<Role>, ApiError> {
        match self.role {
            None | Some(0) => Ok(None),
            Some(value) => Role::try_from(value)
                .map(Some)
                .map_err(|e| ApiError::Validation(e.to_string())),
        }
    }
}

// --- Helpers ---

/// Resolves the authenticated username to its current account.
async fn resolve_actor(state: &AppState, user: &AuthUser) -> Result<User, ApiError> {
    Ok(state.auth().actor(&user.username).await?)
}

/// Turns a policy decision into the grant, logging denials.
fn enforce(actor: &User, decision: Decision) -> Result<Grant, ApiError> {
    decision.into_result().map_err(|reason| {
        tracing::info!(actor = %actor.username, role = %actor.role, "denied: {}", reason.code());
        ApiError::from(reason)
    })
}

// Extractors are taken as `Result<_, Rejection>` so malformed input is
// reported through `ApiError` like everything else.

// --- Handlers ---

/// login
///
/// [Public Route] Exchanges a username and password for a session token.
/// Only super-admins and admins may log in here.
#[utoipa::path(
    post,
    path = "/api/v1/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 401, description = "Unknown user or wrong password"),
        (status = 403, description = "Account tier may not log in")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(payload) = payload?;
    let response = state
        .auth()
        .login(&payload.username, &payload.password)
        .await?;
    Ok(Json(response))
}

/// get_me
///
/// [Authenticated Route] The caller's own account.
#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Current account", body = UserView),
        (status = 401, description = "Missing, invalid or expired credential")
    )
)]
pub async fn get_me(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserView>, ApiError> {
    let actor = resolve_actor(&state, &user).await?;
    Ok(Json(actor.into()))
}

/// add_user
///
/// [Authenticated Route] Creates an account. Super-admins may create admins and
/// normal users; admins only normal users; nobody creates a super-admin.
#[utoipa::path(
    post,
    path = "/api/v1/user/add",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created", body = UserView),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Policy denial"),
        (status = 409, description = "Username taken")
    )
)]
pub async fn add_user(
    user: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let Json(payload) = payload?;
    let actor = resolve_actor(&state, &user).await?;

    let grant = enforce(
        &actor,
        policy::authorize(
            actor.role,
            None,
            Action::CreateUser { role: payload.role },
            false,
        ),
    )?;
    let Grant::Create { role } = grant else {
        return Err(ApiError::Internal);
    };

    payload.validate()?;

    if state.repo.find_by_username(&payload.username).await.is_some() {
        return Err(ApiError::UsernameTaken);
    }

    let password_hash = state.credentials.hash(&payload.password).map_err(|e| {
        tracing::error!("add_user: {}", e);
        ApiError::Internal
    })?;

    // The unique constraint still wins a race between the check above and the insert.
    let created = state
        .repo
        .create_user(NewUser {
            username: payload.username,
            password_hash,
            role,
        })
        .await?;

    tracing::info!(
        actor = %actor.username,
        username = %created.username,
        role = %created.role,
        "account created"
    );
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// get_users
///
/// [Authenticated Route] Lists every account the caller's tier may see.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses((status = 200, description = "Visible accounts", body = UserList))
)]
pub async fn get_users(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserList>, ApiError> {
    let actor = resolve_actor(&state, &user).await?;
    let Grant::View { min_visible } = enforce(
        &actor,
        policy::authorize(actor.role, None, Action::ListUsers, false),
    )?
    else {
        return Err(ApiError::Internal);
    };

    let users = state
        .repo
        .list_users(&UserQuery::visible_from(min_visible))
        .await;
    Ok(Json(user_list(users)))
}

/// search_users
///
/// [Authenticated Route] Like `get_users`, narrowed by keyword and tier.
#[utoipa::path(
    get,
    path = "/api/v1/users/search",
    params(UserSearchFilter),
    responses(
        (status = 200, description = "Matching visible accounts", body = UserList),
        (status = 400, description = "Invalid role filter")
    )
)]
pub async fn search_users(
    user: AuthUser,
    State(state): State<AppState>,
    filter: Result<Query<UserSearchFilter>, QueryRejection>,
) -> Result<Json<UserList>, ApiError> {
    let Query(filter) = filter?;
    let role = filter.role_filter()?;
    let actor = resolve_actor(&state, &user).await?;
    let Grant::View { min_visible } = enforce(
        &actor,
        policy::authorize(actor.role, None, Action::SearchUsers, false),
    )?
    else {
        return Err(ApiError::Internal);
    };

    let query = UserQuery {
        min_visible,
        keyword: filter.keyword.filter(|k| !k.trim().is_empty()),
        role,
    };
    let users = state.repo.list_users(&query).await;
    Ok(Json(user_list(users)))
}

fn user_list(users: Vec<User>) -> UserList {
    let data: Vec<UserView> = users.into_iter().map(UserView::from).collect();
    UserList {
        total: data.len() as i64,
        data,
    }
}

/// edit_user
///
/// [Authenticated Route] Renames an account, changes its tier and optionally its
/// password. The persisted tier is whatever the policy grants, which may differ
/// from the requested one.
#[utoipa::path(
    put,
    path = "/api/v1/user/{id}",
    params(("id" = i64, Path, description = "Account ID")),
    request_body = EditUserRequest,
    responses(
        (status = 200, description = "Account updated", body = UserView),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Policy denial"),
        (status = 404, description = "Account not found"),
        (status = 409, description = "Username taken")
    )
)]
pub async fn edit_user(
    user: AuthUser,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<EditUserRequest>, JsonRejection>,
) -> Result<Json<UserView>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let payload = payload.normalized();
    let actor = resolve_actor(&state, &user).await?;
    let target = state.repo.find_by_id(id).await;

    let requested = payload
        .role
        .or(target.as_ref().map(|t| t.role))
        .unwrap_or(Role::NormalUser);
    let decision = policy::authorize(
        actor.role,
        target.as_ref().map(|t| t.role),
        Action::EditUser {
            new_role: requested,
        },
        actor.id == id,
    );
    let Grant::Edit { role, coerced } = enforce(&actor, decision)? else {
        return Err(ApiError::Internal);
    };
    if coerced {
        tracing::debug!(target_id = id, requested = %requested, applied = %role, "role kept");
    }

    payload.validate()?;

    if state
        .repo
        .find_by_username(&payload.username)
        .await
        .is_some_and(|other| other.id != id)
    {
        return Err(ApiError::UsernameTaken);
    }

    let password_hash = payload
        .password
        .as_deref()
        .map(|password| state.credentials.hash(password))
        .transpose()
        .map_err(|e| {
            tracing::error!("edit_user: {}", e);
            ApiError::Internal
        })?;

    let updated = state
        .repo
        .update_user(
            id,
            UserChanges {
                username: payload.username,
                role,
                password_hash,
            },
        )
        .await?
        .ok_or(ApiError::Auth(AuthError::TargetNotFound))?;

    tracing::info!(actor = %actor.username, target_id = id, "account updated");
    Ok(Json(updated.into()))
}

/// delete_user
///
/// [Authenticated Route] Removes an account.
#[utoipa::path(
    delete,
    path = "/api/v1/user/{id}",
    params(("id" = i64, Path, description = "Account ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Policy denial"),
        (status = 404, description = "Account not found")
    )
)]
pub async fn delete_user(
    user: AuthUser,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    let actor = resolve_actor(&state, &user).await?;
    let target = state.repo.find_by_id(id).await;

    enforce(
        &actor,
        policy::authorize(
            actor.role,
            target.map(|t| t.role),
            Action::DeleteUser,
            actor.id == id,
        ),
    )?;

    // The account may have vanished between the lookup and the delete.
    if state.repo.delete_user(id).await {
        tracing::info!(actor = %actor.username, target_id = id, "account deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AuthError::TargetNotFound.into())
    }
}
