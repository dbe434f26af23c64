use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// User administration, nested under `/api/v1`. Every handler receives the
/// `AuthUser` attached by the session gate and resolves the actor's current
/// tier itself before consulting the role policy.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // The caller's own account.
        .route("/me", get(handlers::get_me))
        // POST /user/add
        // Creates an account of the requested tier, if the caller may grant it.
        .route("/user/add", post(handlers::add_user))
        // GET /users
        // Lists the accounts visible to the caller's tier.
        .route("/users", get(handlers::get_users))
        // GET /users/search?keyword=...&role=...
        // Same visibility floor as /users, narrowed by username keyword and tier.
        .route("/users/search", get(handlers::search_users))
        // PUT/DELETE /user/{id}
        // Edit or remove an account. Target resolution happens before the policy check.
        .route(
            "/user/{id}",
            put(handlers::edit_user).delete(handlers::delete_user),
        )
}
