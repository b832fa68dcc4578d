use crate::model::{Id, Timestamp};
use serde::{Deserialize, Serialize};

/// Stored per-organization limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub organization_id: Id,
    pub requests_per_minute: i64,
    pub requests_per_day: i64,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitUpdate {
    pub requests_per_minute: i64,
    pub requests_per_day: i64,
}

/// Limits in force for an organization: the stored row, or configured defaults
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveRateLimit {
    pub organization_id: Id,
    pub requests_per_minute: i64,
    pub requests_per_day: i64,
    pub is_default: bool,
    pub updated_at: Option<Timestamp>,
}

/// Request count of one API key in one minute window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub organization_id: Id,
    pub api_key_id: Id,
    pub window_start: Timestamp,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyUsage {
    pub api_key_id: Id,
    pub minute: i64,
    pub day: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub organization_id: Id,
    pub minute_window_start: Timestamp,
    pub day_window_start: Timestamp,
    pub minute: i64,
    pub day: i64,
    pub limits: EffectiveRateLimit,
    pub keys: Vec<KeyUsage>,
}
