use crate::model::{generate_id, Id, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Id,
    pub organization_id: Id,
    pub name: String,
    /// First characters of the plaintext key, for display
    pub prefix: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub created_by: String,
    pub created_at: Timestamp,
    pub last_used_at: Option<Timestamp>,
    pub revoked_at: Option<Timestamp>,
}

impl ApiKey {
    pub fn new(
        organization_id: Id,
        name: String,
        prefix: String,
        key_hash: String,
        created_by: String,
    ) -> Self {
        Self {
            id: generate_id(),
            organization_id,
            name,
            prefix,
            key_hash,
            created_by,
            created_at: chrono::Utc::now(),
            last_used_at: None,
            revoked_at: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewApiKey {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedApiKey {
    #[serde(flatten)]
    pub api_key: ApiKey,
    pub key: String,
}
