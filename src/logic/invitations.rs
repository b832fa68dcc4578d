use chrono::Duration;

use crate::error::{AppError, AppResult};
use crate::logic::permissions::{require_permission, Permission};
use crate::logic::tokens::{generate_token, hash_secret};
use crate::model::{
    is_valid_email, normalize_email, CreatedInvitation, Id, Invitation, InvitationStatus, Member,
    NewInvitation, Role, UserContext,
};
use crate::store::traits::Store;

pub struct InvitationOperations;

impl InvitationOperations {
    pub async fn create<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        input: NewInvitation,
        ttl_hours: i64,
    ) -> AppResult<CreatedInvitation> {
        require_permission(
            store,
            organization_id,
            &user.user_id,
            Permission::ManageInvitations,
        )
        .await?;

        if input.role == Role::Owner {
            return Err(AppError::bad_request(
                "Invitations cannot grant the owner role",
            ));
        }

        let email = normalize_email(&input.email);
        if !is_valid_email(&email) {
            return Err(AppError::bad_request(format!("Invalid email '{}'", input.email)));
        }

        let members = store.list_members(organization_id).await?;
        if members
            .iter()
            .any(|m| m.email.as_deref().map(normalize_email).as_deref() == Some(email.as_str()))
        {
            return Err(AppError::conflict(format!(
                "{} is already a member of this organization",
                email
            )));
        }

        let now = chrono::Utc::now();
        let existing = store.list_invitations(organization_id).await?;
        if existing.iter().any(|inv| inv.email == email && inv.is_open_at(now)) {
            return Err(AppError::conflict(format!(
                "A pending invitation for {} already exists",
                email
            )));
        }

        let token = generate_token();
        let invitation = Invitation::new(
            organization_id.clone(),
            email,
            input.role,
            hash_secret(&token),
            user.user_id.clone(),
            now + Duration::hours(ttl_hours),
        );
        store.upsert_invitation(invitation.clone()).await?;

        log::info!(
            "Invitation {} to {} for {} created by {}",
            invitation.id,
            invitation.email,
            organization_id,
            user.user_id
        );
        Ok(CreatedInvitation { invitation, token })
    }

    /// Lists invitations, persisting `expired` for pending ones past their expiry
    pub async fn list<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
    ) -> AppResult<Vec<Invitation>> {
        require_permission(
            store,
            organization_id,
            &user.user_id,
            Permission::ManageInvitations,
        )
        .await?;

        let now = chrono::Utc::now();
        let mut invitations = store.list_invitations(organization_id).await?;
        for invitation in invitations.iter_mut() {
            if invitation.status == InvitationStatus::Pending && invitation.is_expired_at(now) {
                invitation.status = InvitationStatus::Expired;
                store.upsert_invitation(invitation.clone()).await?;
            }
        }
        Ok(invitations)
    }

    pub async fn revoke<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        invitation_id: &Id,
    ) -> AppResult<Invitation> {
        require_permission(
            store,
            organization_id,
            &user.user_id,
            Permission::ManageInvitations,
        )
        .await?;

        let mut invitation = store
            .get_invitation(invitation_id)
            .await?
            .filter(|inv| &inv.organization_id == organization_id)
            .ok_or_else(|| AppError::not_found("Invitation not found"))?;

        if invitation.status != InvitationStatus::Pending {
            return Err(AppError::conflict(format!(
                "Invitation is already {}",
                invitation.status.as_str()
            )));
        }

        invitation.status = InvitationStatus::Revoked;
        store.upsert_invitation(invitation.clone()).await?;
        Ok(invitation)
    }

    /// Redeem an invitation token for the calling user
    pub async fn accept<S: Store>(
        store: &S,
        user: &UserContext,
        token: &str,
    ) -> AppResult<Member> {
        let mut invitation = store
            .get_invitation_by_token_hash(&hash_secret(token.trim()))
            .await?
            .ok_or_else(|| AppError::not_found("Invitation not found"))?;

        if invitation.status != InvitationStatus::Pending {
            return Err(AppError::conflict(format!(
                "Invitation is already {}",
                invitation.status.as_str()
            )));
        }

        let now = chrono::Utc::now();
        if invitation.is_expired_at(now) {
            invitation.status = InvitationStatus::Expired;
            store.upsert_invitation(invitation).await?;
            return Err(AppError::bad_request("Invitation expired"));
        }

        if let Some(email) = &user.user_email {
            if normalize_email(email) != invitation.email {
                return Err(AppError::forbidden(
                    "Invitation was issued to a different email address",
                ));
            }
        }

        if store
            .get_member(&invitation.organization_id, &user.user_id)
            .await?
            .is_some()
        {
            return Err(AppError::conflict("Already a member of this organization"));
        }

        let member = Member::new(
            invitation.organization_id.clone(),
            user.user_id.clone(),
            Some(invitation.email.clone()),
            invitation.role,
        );
        store.upsert_member(member.clone()).await?;

        invitation.status = InvitationStatus::Accepted;
        invitation.accepted_at = Some(now);
        store.upsert_invitation(invitation).await?;

        Ok(member)
    }
}
