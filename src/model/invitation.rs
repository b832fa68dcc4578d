use crate::model::{generate_id, Id, Role, Timestamp};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Revoked,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Revoked => "revoked",
            InvitationStatus::Expired => "expired",
        }
    }
}

impl FromStr for InvitationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "revoked" => Ok(Self::Revoked),
            "expired" => Ok(Self::Expired),
            other => Err(anyhow::anyhow!("unknown invitation status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Id,
    pub organization_id: Id,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub invited_by: String,
    pub status: InvitationStatus,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
    pub accepted_at: Option<Timestamp>,
}

impl Invitation {
    pub fn new(
        organization_id: Id,
        email: String,
        role: Role,
        token_hash: String,
        invited_by: String,
        expires_at: Timestamp,
    ) -> Self {
        Self {
            id: generate_id(),
            organization_id,
            email,
            role,
            token_hash,
            invited_by,
            status: InvitationStatus::Pending,
            expires_at,
            created_at: chrono::Utc::now(),
            accepted_at: None,
        }
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }

    /// Pending and not yet past `expires_at`
    pub fn is_open_at(&self, now: Timestamp) -> bool {
        self.status == InvitationStatus::Pending && !self.is_expired_at(now)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvitation {
    pub email: String,
    #[serde(default = "default_invite_role")]
    pub role: Role,
}

fn default_invite_role() -> Role {
    Role::Member
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptInvitation {
    pub token: String,
}

/// Returned once on creation; the plaintext token is never stored
#[derive(Debug, Clone, Serialize)]
pub struct CreatedInvitation {
    #[serde(flatten)]
    pub invitation: Invitation,
    pub token: String,
}
