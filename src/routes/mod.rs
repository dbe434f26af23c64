/// Router Module Index
///
/// Splits the routes by access level. The session gate is applied to the
/// authenticated router as a whole in `create_router`, so a handler cannot be
/// exposed without it by accident.

/// Routes reachable without a session: liveness and login.
pub mod public;

/// Routes behind the session gate. Role checks happen inside the handlers,
/// through the role policy.
pub mod authenticated;
