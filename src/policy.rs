//! Role policy for user administration.
//!
//! A pure decision function over (actor tier, target tier, action, is-self).
//! Nothing here touches storage: callers resolve the actor and the target
//! first, ask for a [`Decision`], and then apply exactly what the returned
//! [`Grant`] says.

use serde::Serialize;
use std::fmt;

use crate::models::Role;

/// A user administration request, as seen by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create an account holding `role`.
    CreateUser { role: Role },
    ListUsers,
    SearchUsers,
    /// Edit an account; `new_role` is the tier the caller asked for (the
    /// target's current tier when the request did not mention one).
    EditUser { new_role: Role },
    DeleteUser,
}

/// What an allowed action may actually do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Create { role: Role },
    /// Listing and search: only accounts with `role >= min_visible` may be
    /// returned.
    View { min_visible: Role },
    /// `role` is the effective role to persist. `coerced` is set when it
    /// differs from the requested one; that is a silent override, not an error.
    Edit { role: Role, coerced: bool },
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NoRight,
    NoRightToPromote,
    NoRightToDemotePeerApex,
    NoRightToCreateApex,
    NoRightToCreateNonUser,
    CannotDeleteSelf,
    TargetNotFound,
}

impl DenyReason {
    pub fn code(self) -> &'static str {
        match self {
            DenyReason::NoRight => "no_right",
            DenyReason::NoRightToPromote => "no_right_to_promote",
            DenyReason::NoRightToDemotePeerApex => "no_right_to_demote_peer_apex",
            DenyReason::NoRightToCreateApex => "no_right_to_create_apex",
            DenyReason::NoRightToCreateNonUser => "no_right_to_create_non_user",
            DenyReason::CannotDeleteSelf => "cannot_delete_self",
            DenyReason::TargetNotFound => "target_not_found",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DenyReason::NoRight => "insufficient role",
            DenyReason::NoRightToPromote => "no account may be promoted to super-admin",
            DenyReason::NoRightToDemotePeerApex => {
                "a super-admin's role can only be changed by that account"
            }
            DenyReason::NoRightToCreateApex => "super-admin accounts cannot be created",
            DenyReason::NoRightToCreateNonUser => "admins may only create normal users",
            DenyReason::CannotDeleteSelf => "a super-admin cannot delete itself",
            DenyReason::TargetNotFound => "target account not found",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow(Grant),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    pub fn into_result(self) -> Result<Grant, DenyReason> {
        match self {
            Decision::Allow(grant) => Ok(grant),
            Decision::Deny(reason) => Err(reason),
        }
    }
}

/// Decides whether `actor` may perform `action` on an account of tier
/// `target`. `target` is `None` when the target could not be resolved, which
/// only matters for edits and deletes. `is_self` is true when actor and target
/// are the same account.
pub fn authorize(actor: Role, target: Option<Role>, action: Action, is_self: bool) -> Decision {
    match action {
        Action::CreateUser { role } => authorize_create(actor, role),
        Action::ListUsers | Action::SearchUsers => Decision::Allow(Grant::View {
            min_visible: min_visible_role(actor),
        }),
        Action::EditUser { new_role } => match target {
            Some(target) => authorize_edit(actor, target, new_role, is_self),
            None => Decision::Deny(DenyReason::TargetNotFound),
        },
        Action::DeleteUser => match target {
            Some(target) => authorize_delete(actor, target, is_self),
            None => Decision::Deny(DenyReason::TargetNotFound),
        },
    }
}

/// Lowest tier number a caller at `actor` may see in listings: super-admins
/// see everyone, admins see admins and normal users, normal users see only
/// normal users.
pub fn min_visible_role(actor: Role) -> Role {
    actor
}

fn authorize_create(actor: Role, requested: Role) -> Decision {
    match (actor, requested) {
        (Role::SuperAdmin, Role::SuperAdmin) => Decision::Deny(DenyReason::NoRightToCreateApex),
        (Role::SuperAdmin, role) => Decision::Allow(Grant::Create { role }),
        (Role::Admin, Role::NormalUser) => Decision::Allow(Grant::Create {
            role: Role::NormalUser,
        }),
        (Role::Admin, _) => Decision::Deny(DenyReason::NoRightToCreateNonUser),
        (Role::NormalUser, _) => Decision::Deny(DenyReason::NoRight),
    }
}

fn authorize_edit(actor: Role, target: Role, new_role: Role, is_self: bool) -> Decision {
    // Nobody is ever promoted to the apex tier.
    if new_role == Role::SuperAdmin && target != Role::SuperAdmin {
        return Decision::Deny(DenyReason::NoRightToPromote);
    }
    // An apex account's role belongs to that account alone.
    if target == Role::SuperAdmin && !is_self && new_role != Role::SuperAdmin {
        return Decision::Deny(DenyReason::NoRightToDemotePeerApex);
    }
    // An apex actor cannot strip its own apex status.
    if actor == Role::SuperAdmin && is_self {
        return keep_role(Role::SuperAdmin, new_role);
    }

    match actor {
        Role::SuperAdmin => Decision::Allow(Grant::Edit {
            role: new_role,
            coerced: false,
        }),
        Role::Admin => match target {
            Role::SuperAdmin => Decision::Deny(DenyReason::NoRight),
            Role::Admin if !is_self => Decision::Deny(DenyReason::NoRight),
            // TODO: confirm with product whether an admin's role change should
            // be rejected instead of dropped.
            _ => keep_role(target, new_role),
        },
        Role::NormalUser if is_self => keep_role(target, new_role),
        Role::NormalUser => Decision::Deny(DenyReason::NoRight),
    }
}

fn keep_role(role: Role, requested: Role) -> Decision {
    Decision::Allow(Grant::Edit {
        role,
        coerced: requested != role,
    })
}

fn authorize_delete(actor: Role, target: Role, is_self: bool) -> Decision {
    match actor {
        Role::SuperAdmin if is_self => Decision::Deny(DenyReason::CannotDeleteSelf),
        Role::SuperAdmin => Decision::Allow(Grant::Delete),
        Role::Admin if target == Role::NormalUser => Decision::Allow(Grant::Delete),
        Role::Admin | Role::NormalUser => Decision::Deny(DenyReason::NoRight),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Role::*;

    fn edit(actor: Role, target: Role, new_role: Role, is_self: bool) -> Decision {
        authorize(actor, Some(target), Action::EditUser { new_role }, is_self)
    }

    #[test]
    fn apex_self_edit_keeps_apex() {
        assert_eq!(
            edit(SuperAdmin, SuperAdmin, Admin, true),
            Decision::Allow(Grant::Edit {
                role: SuperAdmin,
                coerced: true
            })
        );
    }

    #[test]
    fn nobody_promotes_to_apex() {
        for actor in Role::ALL {
            for target in [Admin, NormalUser] {
                assert_eq!(
                    edit(actor, target, SuperAdmin, actor == target),
                    Decision::Deny(DenyReason::NoRightToPromote)
                );
            }
        }
    }

    #[test]
    fn peer_apex_cannot_be_demoted() {
        assert_eq!(
            edit(SuperAdmin, SuperAdmin, NormalUser, false),
            Decision::Deny(DenyReason::NoRightToDemotePeerApex)
        );
        // Renaming a peer apex without touching the role is fine.
        assert!(edit(SuperAdmin, SuperAdmin, SuperAdmin, false).is_allowed());
    }

    #[test]
    fn admin_role_changes_are_dropped() {
        assert_eq!(
            edit(Admin, NormalUser, Admin, false),
            Decision::Allow(Grant::Edit {
                role: NormalUser,
                coerced: true
            })
        );
        assert_eq!(
            edit(Admin, Admin, NormalUser, true),
            Decision::Allow(Grant::Edit {
                role: Admin,
                coerced: true
            })
        );
        assert_eq!(
            edit(Admin, Admin, Admin, false),
            Decision::Deny(DenyReason::NoRight)
        );
    }

    #[test]
    fn normal_user_edits_only_itself() {
        assert_eq!(
            edit(NormalUser, NormalUser, Admin, true),
            Decision::Allow(Grant::Edit {
                role: NormalUser,
                coerced: true
            })
        );
        assert_eq!(
            edit(NormalUser, NormalUser, NormalUser, false),
            Decision::Deny(DenyReason::NoRight)
        );
    }

    #[test]
    fn create_matrix() {
        let create = |actor, role| authorize(actor, None, Action::CreateUser { role }, false);

        assert_eq!(
            create(SuperAdmin, SuperAdmin),
            Decision::Deny(DenyReason::NoRightToCreateApex)
        );
        assert!(create(SuperAdmin, Admin).is_allowed());
        assert!(create(SuperAdmin, NormalUser).is_allowed());
        assert_eq!(
            create(Admin, Admin),
            Decision::Deny(DenyReason::NoRightToCreateNonUser)
        );
        assert!(create(Admin, NormalUser).is_allowed());
        for role in Role::ALL {
            assert_eq!(create(NormalUser, role), Decision::Deny(DenyReason::NoRight));
        }
    }

    #[test]
    fn delete_matrix() {
        let delete = |actor, target, is_self| {
            authorize(actor, Some(target), Action::DeleteUser, is_self)
        };

        assert_eq!(
            delete(SuperAdmin, SuperAdmin, true),
            Decision::Deny(DenyReason::CannotDeleteSelf)
        );
        assert!(delete(SuperAdmin, SuperAdmin, false).is_allowed());
        assert!(delete(SuperAdmin, Admin, false).is_allowed());
        assert_eq!(delete(Admin, Admin, false), Decision::Deny(DenyReason::NoRight));
        assert!(delete(Admin, NormalUser, false).is_allowed());
        assert_eq!(
            delete(NormalUser, NormalUser, true),
            Decision::Deny(DenyReason::NoRight)
        );
    }

    #[test]
    fn missing_target_is_reported() {
        assert_eq!(
            authorize(SuperAdmin, None, Action::DeleteUser, false),
            Decision::Deny(DenyReason::TargetNotFound)
        );
    }

    #[test]
    fn visibility_floor_follows_tier() {
        assert_eq!(
            authorize(Admin, None, Action::ListUsers, false),
            Decision::Allow(Grant::View { min_visible: Admin })
        );
        assert_eq!(
            authorize(NormalUser, None, Action::SearchUsers, false),
            Decision::Allow(Grant::View {
                min_visible: NormalUser
            })
        );
    }
}
