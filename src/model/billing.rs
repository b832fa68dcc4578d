use crate::model::{generate_id, Id, Timestamp};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl Plan {
    pub const ALL: [Plan; 4] = [Plan::Free, Plan::Starter, Plan::Pro, Plan::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Starter => "starter",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }

    /// Credits granted at checkout and on every paid invoice
    pub fn monthly_credits(&self) -> i64 {
        match self {
            Plan::Free => 0,
            Plan::Starter => 100,
            Plan::Pro => 1_000,
            Plan::Enterprise => 10_000,
        }
    }
}

impl FromStr for Plan {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Plan::Free),
            "starter" => Ok(Plan::Starter),
            "pro" => Ok(Plan::Pro),
            "enterprise" => Ok(Plan::Enterprise),
            other => Err(anyhow::anyhow!("unknown plan '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "trialing" => Ok(Self::Trialing),
            "past_due" | "unpaid" => Ok(Self::PastDue),
            "canceled" | "cancelled" | "incomplete_expired" => Ok(Self::Canceled),
            other => Err(anyhow::anyhow!("unknown subscription status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub organization_id: Id,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    pub current_period_end: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Every organization starts on an active free plan
    pub fn free(organization_id: Id) -> Self {
        Self {
            organization_id,
            plan: Plan::Free,
            status: SubscriptionStatus::Active,
            provider_customer_id: None,
            provider_subscription_id: None,
            current_period_end: None,
            updated_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Id,
    pub organization_id: Id,
    /// Positive for grants, negative for consumption
    pub amount: i64,
    pub reason: String,
    pub reference: Option<String>,
    pub created_at: Timestamp,
}

impl CreditTransaction {
    pub fn new(organization_id: Id, amount: i64, reason: &str, reference: Option<String>) -> Self {
        Self {
            id: generate_id(),
            organization_id,
            amount,
            reason: reason.to_string(),
            reference,
            created_at: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditSummary {
    pub organization_id: Id,
    pub balance: i64,
    pub transactions: Vec<CreditTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditGrant {
    pub amount: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanInfo {
    pub plan: Plan,
    pub monthly_credits: i64,
}

/// Envelope of a payment provider event
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookReceipt {
    pub received: bool,
    pub handled: bool,
    pub duplicate: bool,
}

impl WebhookReceipt {
    pub fn handled(handled: bool) -> Self {
        Self {
            received: true,
            handled,
            duplicate: false,
        }
    }

    pub fn duplicate() -> Self {
        Self {
            received: true,
            handled: false,
            duplicate: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_status_aliases() {
        assert_eq!("unpaid".parse::<SubscriptionStatus>().unwrap(), SubscriptionStatus::PastDue);
        assert_eq!("cancelled".parse::<SubscriptionStatus>().unwrap(), SubscriptionStatus::Canceled);
        assert_eq!(
            serde_json::to_string(&SubscriptionStatus::PastDue).unwrap(),
            "\"past_due\""
        );
    }

    #[test]
    fn test_plan_credits_increase_with_tier() {
        assert!(Plan::Free.monthly_credits() < Plan::Starter.monthly_credits());
        assert!(Plan::Starter.monthly_credits() < Plan::Pro.monthly_credits());
        assert!(Plan::Pro.monthly_credits() < Plan::Enterprise.monthly_credits());
    }
}
