use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::model::{Id, Member, Role};
use crate::store::traits::MemberStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageOrganization,
    ManageMembers,
    ManageInvitations,
    ManageApiKeys,
    ManageRateLimits,
    ManageBilling,
    ManageCourses,
    ManageThemes,
    ViewCourses,
    ViewBilling,
}

impl Permission {
    pub const ALL: [Permission; 10] = [
        Permission::ManageOrganization,
        Permission::ManageMembers,
        Permission::ManageInvitations,
        Permission::ManageApiKeys,
        Permission::ManageRateLimits,
        Permission::ManageBilling,
        Permission::ManageCourses,
        Permission::ManageThemes,
        Permission::ViewCourses,
        Permission::ViewBilling,
    ];
}

impl Role {
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Owner => &Permission::ALL,
            Role::Admin => &[
                ManageMembers,
                ManageInvitations,
                ManageApiKeys,
                ManageRateLimits,
                ManageCourses,
                ManageThemes,
                ViewCourses,
                ViewBilling,
            ],
            Role::Member => &[ViewCourses],
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

/// Load the caller's membership. Non-members get NotFound so the
/// organization's existence is not revealed.
pub async fn require_member<S: MemberStore + ?Sized>(
    store: &S,
    organization_id: &Id,
    user_id: &str,
) -> AppResult<Member> {
    store
        .get_member(organization_id, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Organization not found"))
}

pub async fn require_permission<S: MemberStore + ?Sized>(
    store: &S,
    organization_id: &Id,
    user_id: &str,
    permission: Permission,
) -> AppResult<Member> {
    let member = require_member(store, organization_id, user_id).await?;
    if !member.role.has_permission(permission) {
        return Err(AppError::forbidden(format!(
            "Role '{}' lacks permission {:?}",
            member.role, permission
        )));
    }
    Ok(member)
}

/// Rules for `actor` changing `target` from its current role to `new_role`.
/// `owner_count` is the number of owners before the change.
pub fn check_role_change(
    actor: &Member,
    target: &Member,
    new_role: Role,
    owner_count: usize,
) -> AppResult<()> {
    if !actor.role.has_permission(Permission::ManageMembers) {
        return Err(AppError::forbidden("Not allowed to manage members"));
    }
    if (target.role == Role::Owner || new_role == Role::Owner) && actor.role != Role::Owner {
        return Err(AppError::forbidden("Only an owner can grant or revoke the owner role"));
    }
    if target.role == Role::Owner && new_role != Role::Owner && owner_count <= 1 {
        return Err(AppError::conflict(
            "Cannot demote the last owner of the organization",
        ));
    }
    Ok(())
}

/// Rules for `actor` removing `target`. Members may always leave, except the last owner.
pub fn check_member_removal(actor: &Member, target: &Member, owner_count: usize) -> AppResult<()> {
    let leaving = actor.user_id == target.user_id;

    if !leaving {
        if !actor.role.has_permission(Permission::ManageMembers) {
            return Err(AppError::forbidden("Not allowed to remove members"));
        }
        if target.role == Role::Owner && actor.role != Role::Owner {
            return Err(AppError::forbidden("Only an owner can remove an owner"));
        }
    }

    if target.role == Role::Owner && owner_count <= 1 {
        return Err(AppError::conflict(
            "Cannot remove the last owner of the organization",
        ));
    }
    Ok(())
}

pub fn count_owners(members: &[Member]) -> usize {
    members.iter().filter(|m| m.role == Role::Owner).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(user: &str, role: Role) -> Member {
        Member::new("org".to_string(), user.to_string(), None, role)
    }

    #[test]
    fn test_permission_table() {
        for permission in Permission::ALL {
            assert!(Role::Owner.has_permission(permission));
        }
        assert!(!Role::Admin.has_permission(Permission::ManageOrganization));
        assert!(!Role::Admin.has_permission(Permission::ManageBilling));
        assert!(Role::Admin.has_permission(Permission::ManageApiKeys));
        assert_eq!(Role::Member.permissions(), &[Permission::ViewCourses]);
    }

    #[test]
    fn test_admin_cannot_touch_owner() {
        let admin = member("admin", Role::Admin);
        let owner = member("owner", Role::Owner);

        let err = check_role_change(&admin, &owner, Role::Member, 2).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = check_member_removal(&admin, &owner, 2).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_admin_cannot_grant_owner() {
        let admin = member("admin", Role::Admin);
        let plain = member("plain", Role::Member);
        let err = check_role_change(&admin, &plain, Role::Owner, 1).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(check_role_change(&admin, &plain, Role::Admin, 1).is_ok());
    }

    #[test]
    fn test_last_owner_is_protected() {
        let owner = member("owner", Role::Owner);

        let err = check_role_change(&owner, &owner, Role::Admin, 1).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = check_member_removal(&owner, &owner, 1).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        assert!(check_member_removal(&owner, &owner, 2).is_ok());
    }

    #[test]
    fn test_member_can_leave() {
        let plain = member("plain", Role::Member);
        assert!(check_member_removal(&plain, &plain, 1).is_ok());

        let other = member("other", Role::Member);
        let err = check_member_removal(&plain, &other, 1).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
