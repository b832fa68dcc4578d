use crate::model::{generate_id, Id, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub owner_id: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Organization {
    pub fn new(name: String, slug: String, owner_id: String) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: generate_id(),
            name,
            slug,
            owner_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input model for creating an organization
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    /// Derived from `name` when omitted
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrganizationUpdate {
    pub name: Option<String>,
    pub slug: Option<String>,
}

/// Membership role. Ordered: `Owner > Admin > Member`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(anyhow::anyhow!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub organization_id: Id,
    pub user_id: String,
    pub email: Option<String>,
    pub role: Role,
    pub joined_at: Timestamp,
}

impl Member {
    pub fn new(organization_id: Id, user_id: String, email: Option<String>, role: Role) -> Self {
        Self {
            organization_id,
            user_id,
            email,
            role,
            joined_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberRoleUpdate {
    pub role: Role,
}
