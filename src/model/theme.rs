use crate::model::{generate_id, Id, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub id: Id,
    pub organization_id: Id,
    pub name: String,
    /// Free-form colours, fonts, logo urls
    pub settings: serde_json::Value,
    pub is_active: bool,
    pub created_at: Timestamp,
}

impl Theme {
    pub fn new(organization_id: Id, name: String, settings: serde_json::Value) -> Self {
        Self {
            id: generate_id(),
            organization_id,
            name,
            settings,
            is_active: false,
            created_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTheme {
    pub name: String,
    #[serde(default)]
    pub settings: serde_json::Value,
}
