use serde::{Deserialize, Serialize};

/// Caller identity forwarded by the identity proxy in request headers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
}

impl UserContext {
    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            user_email: None,
            user_name: None,
        }
    }

    pub fn with_details(user_id: String, email: Option<String>, name: Option<String>) -> Self {
        Self {
            user_id,
            user_email: email,
            user_name: name,
        }
    }

    /// Identity that owns the seeded demo organization
    pub fn system() -> Self {
        Self {
            user_id: "system".to_string(),
            user_email: Some("system@lms.internal".to_string()),
            user_name: Some("System".to_string()),
        }
    }
}
