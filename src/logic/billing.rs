//! Subscriptions, organization credits and the payment provider webhook.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::logic::permissions::{require_permission, Permission};
use crate::logic::tokens::verify_signature;
use crate::model::{
    CreditGrant, CreditSummary, CreditTransaction, Id, Plan, PlanInfo, Subscription,
    SubscriptionStatus, Timestamp, UserContext, WebhookEvent, WebhookReceipt,
};
use crate::store::traits::Store;

pub const RECENT_TRANSACTIONS: i64 = 50;
pub const PLAN_GRANT_REASON: &str = "plan_grant";
pub const MANUAL_GRANT_REASON: &str = "manual_grant";

#[derive(Debug, Deserialize)]
struct CheckoutCompleted {
    organization_id: Id,
    plan: Plan,
    customer_id: Option<String>,
    subscription_id: Option<String>,
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionUpdated {
    subscription_id: String,
    status: String,
    plan: Option<Plan>,
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionRef {
    subscription_id: String,
}

fn parse_data<T: DeserializeOwned>(event: &WebhookEvent) -> AppResult<T> {
    serde_json::from_value(event.data.clone()).map_err(|e| {
        AppError::bad_request(format!("Invalid data for {}: {}", event.event_type, e))
    })
}

fn period_end(unix_secs: Option<i64>) -> Option<Timestamp> {
    unix_secs.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

pub struct BillingOperations;

impl BillingOperations {
    pub fn plans() -> Vec<PlanInfo> {
        Plan::ALL
            .iter()
            .map(|plan| PlanInfo {
                plan: *plan,
                monthly_credits: plan.monthly_credits(),
            })
            .collect()
    }

    pub async fn get_subscription<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
    ) -> AppResult<Subscription> {
        require_permission(store, organization_id, &user.user_id, Permission::ViewBilling)
            .await?;
        Ok(store
            .get_subscription(organization_id)
            .await?
            .unwrap_or_else(|| Subscription::free(organization_id.clone())))
    }

    pub async fn credit_summary<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
    ) -> AppResult<CreditSummary> {
        require_permission(store, organization_id, &user.user_id, Permission::ViewBilling)
            .await?;
        Ok(CreditSummary {
            organization_id: organization_id.clone(),
            balance: store.get_credit_balance(organization_id).await?,
            transactions: store
                .list_credit_transactions(organization_id, RECENT_TRANSACTIONS)
                .await?,
        })
    }

    pub async fn grant_credits<S: Store>(
        store: &S,
        user: &UserContext,
        organization_id: &Id,
        grant: CreditGrant,
    ) -> AppResult<CreditSummary> {
        require_permission(store, organization_id, &user.user_id, Permission::ManageBilling)
            .await?;
        if grant.amount <= 0 {
            return Err(AppError::bad_request("Grant amount must be positive"));
        }
        let balance = store.get_credit_balance(organization_id).await?;
        if balance.checked_add(grant.amount).is_none() {
            return Err(AppError::bad_request("Grant would overflow the credit balance"));
        }

        let reason = grant
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| MANUAL_GRANT_REASON.to_string());
        let transaction = CreditTransaction::new(
            organization_id.clone(),
            grant.amount,
            &reason,
            Some(user.user_id.clone()),
        );
        store.apply_credit_transaction(transaction).await?;
        log::info!(
            "{} credits granted to {} by {}",
            grant.amount,
            organization_id,
            user.user_id
        );

        Self::credit_summary(store, user, organization_id).await
    }

    /// Verify and apply a signed provider event. `secret` is the configured
    /// webhook secret; without one the endpoint does not exist.
    pub async fn handle_webhook<S: Store>(
        store: &S,
        secret: Option<&str>,
        signature: Option<&str>,
        payload: &[u8],
    ) -> AppResult<WebhookReceipt> {
        let secret = secret
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::not_found("Not found"))?;
        let signature = signature.ok_or_else(|| AppError::unauthorized("Missing signature"))?;
        if !verify_signature(payload, secret, signature) {
            log::warn!("Rejected webhook with invalid signature");
            return Err(AppError::unauthorized("Invalid signature"));
        }

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| AppError::bad_request(format!("Invalid webhook payload: {}", e)))?;

        if !store.record_webhook_event(&event.id, &event.event_type).await? {
            log::info!("Webhook event {} already processed", event.id);
            return Ok(WebhookReceipt::duplicate());
        }

        // A failed event is not processed; the provider's retry must apply it
        let handled = match Self::apply_event(store, &event).await {
            Ok(handled) => handled,
            Err(e) => {
                store.forget_webhook_event(&event.id).await?;
                log::warn!("Webhook event {} ({}) failed: {}", event.id, event.event_type, e);
                return Err(e);
            }
        };
        log::info!(
            "Webhook event {} ({}) handled={}",
            event.id,
            event.event_type,
            handled
        );
        Ok(WebhookReceipt::handled(handled))
    }

    async fn apply_event<S: Store>(store: &S, event: &WebhookEvent) -> AppResult<bool> {
        match event.event_type.as_str() {
            "checkout.session.completed" => {
                let data: CheckoutCompleted = parse_data(event)?;
                if store.get_organization(&data.organization_id).await?.is_none() {
                    log::warn!(
                        "Checkout {} for unknown organization {}",
                        event.id,
                        data.organization_id
                    );
                    return Ok(false);
                }
                let mut subscription = store
                    .get_subscription(&data.organization_id)
                    .await?
                    .unwrap_or_else(|| Subscription::free(data.organization_id.clone()));
                subscription.plan = data.plan;
                subscription.status = SubscriptionStatus::Active;
                subscription.provider_customer_id =
                    data.customer_id.or(subscription.provider_customer_id);
                subscription.provider_subscription_id =
                    data.subscription_id.or(subscription.provider_subscription_id);
                subscription.current_period_end = period_end(data.current_period_end);
                subscription.updated_at = Utc::now();
                store.upsert_subscription(subscription.clone()).await?;
                Self::grant_plan_credits(store, &subscription, &event.id).await?;
                Ok(true)
            }
            "customer.subscription.updated" => {
                let data: SubscriptionUpdated = parse_data(event)?;
                let Some(mut subscription) =
                    Self::find_subscription(store, event, &data.subscription_id).await?
                else {
                    return Ok(false);
                };
                subscription.status = data
                    .status
                    .parse()
                    .map_err(|e: anyhow::Error| AppError::bad_request(e.to_string()))?;
                if let Some(plan) = data.plan {
                    subscription.plan = plan;
                }
                if data.current_period_end.is_some() {
                    subscription.current_period_end = period_end(data.current_period_end);
                }
                subscription.updated_at = Utc::now();
                store.upsert_subscription(subscription).await?;
                Ok(true)
            }
            "customer.subscription.deleted" => {
                let data: SubscriptionRef = parse_data(event)?;
                let Some(mut subscription) =
                    Self::find_subscription(store, event, &data.subscription_id).await?
                else {
                    return Ok(false);
                };
                subscription.status = SubscriptionStatus::Canceled;
                subscription.plan = Plan::Free;
                subscription.current_period_end = None;
                subscription.updated_at = Utc::now();
                store.upsert_subscription(subscription).await?;
                Ok(true)
            }
            "invoice.paid" => {
                let data: SubscriptionRef = parse_data(event)?;
                let Some(mut subscription) =
                    Self::find_subscription(store, event, &data.subscription_id).await?
                else {
                    return Ok(false);
                };
                subscription.status = SubscriptionStatus::Active;
                subscription.updated_at = Utc::now();
                store.upsert_subscription(subscription.clone()).await?;
                Self::grant_plan_credits(store, &subscription, &event.id).await?;
                Ok(true)
            }
            "invoice.payment_failed" => {
                let data: SubscriptionRef = parse_data(event)?;
                let Some(mut subscription) =
                    Self::find_subscription(store, event, &data.subscription_id).await?
                else {
                    return Ok(false);
                };
                subscription.status = SubscriptionStatus::PastDue;
                subscription.updated_at = Utc::now();
                store.upsert_subscription(subscription).await?;
                Ok(true)
            }
            other => {
                log::debug!("Ignoring webhook event type {}", other);
                Ok(false)
            }
        }
    }

    async fn find_subscription<S: Store>(
        store: &S,
        event: &WebhookEvent,
        provider_subscription_id: &str,
    ) -> AppResult<Option<Subscription>> {
        let subscription = store
            .get_subscription_by_provider_id(provider_subscription_id)
            .await?;
        if subscription.is_none() {
            log::warn!(
                "Webhook event {} ({}) references unknown subscription {}",
                event.id,
                event.event_type,
                provider_subscription_id
            );
        }
        Ok(subscription)
    }

    async fn grant_plan_credits<S: Store>(
        store: &S,
        subscription: &Subscription,
        event_id: &str,
    ) -> AppResult<()> {
        let credits = subscription.plan.monthly_credits();
        if credits == 0 {
            return Ok(());
        }
        store
            .apply_credit_transaction(CreditTransaction::new(
                subscription.organization_id.clone(),
                credits,
                PLAN_GRANT_REASON,
                Some(event_id.to_string()),
            ))
            .await?;
        log::info!(
            "Granted {} {} plan credits to {}",
            credits,
            subscription.plan.as_str(),
            subscription.organization_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::tokens::sign_payload;
    use crate::logic::OrganizationOperations;
    use crate::model::{Member, NewOrganization, Role};
    use crate::store::traits::{BillingStore, MemberStore};
    use crate::store::MemoryStore;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    async fn setup() -> (MemoryStore, Id, UserContext) {
        let store = MemoryStore::new();
        let owner = UserContext::new("ada".into());
        let org = OrganizationOperations::create(
            &store,
            &owner,
            NewOrganization {
                name: "Acme".into(),
                slug: None,
            },
        )
        .await
        .unwrap();
        (store, org.id, owner)
    }

    async fn deliver(store: &MemoryStore, body: serde_json::Value) -> AppResult<WebhookReceipt> {
        let payload = serde_json::to_vec(&body).unwrap();
        let signature = format!("sha256={}", sign_payload(&payload, SECRET));
        BillingOperations::handle_webhook(store, Some(SECRET), Some(&signature), &payload).await
    }

    fn checkout(event_id: &str, org_id: &str) -> serde_json::Value {
        json!({
            "id": event_id,
            "type": "checkout.session.completed",
            "data": {
                "organization_id": org_id,
                "plan": "starter",
                "customer_id": "cus_1",
                "subscription_id": "sub_1",
                "current_period_end": 1767225600
            }
        })
    }

    #[tokio::test]
    async fn test_signature_checks() {
        let (store, _, _) = setup().await;
        let payload = br#"{"id":"evt_1","type":"invoice.paid","data":{}}"#;

        let err = BillingOperations::handle_webhook(&store, None, Some("sha256=00"), payload)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = BillingOperations::handle_webhook(&store, Some(SECRET), None, payload)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let forged = format!("sha256={}", sign_payload(payload, "other"));
        let err = BillingOperations::handle_webhook(&store, Some(SECRET), Some(&forged), payload)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_checkout_activates_plan_once() {
        let (store, org_id, _) = setup().await;

        let receipt = deliver(&store, checkout("evt_1", &org_id)).await.unwrap();
        assert_eq!(receipt, WebhookReceipt::handled(true));

        let subscription = store.get_subscription(&org_id).await.unwrap().unwrap();
        assert_eq!(subscription.plan, Plan::Starter);
        assert_eq!(subscription.status, SubscriptionStatus::Active);
        assert_eq!(subscription.provider_subscription_id.as_deref(), Some("sub_1"));
        assert!(subscription.current_period_end.is_some());
        assert_eq!(store.get_credit_balance(&org_id).await.unwrap(), 100);

        let receipt = deliver(&store, checkout("evt_1", &org_id)).await.unwrap();
        assert_eq!(receipt, WebhookReceipt::duplicate());
        assert_eq!(store.get_credit_balance(&org_id).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let (store, org_id, _) = setup().await;
        deliver(&store, checkout("evt_1", &org_id)).await.unwrap();

        let paid = json!({"id": "evt_2", "type": "invoice.paid", "data": {"subscription_id": "sub_1"}});
        deliver(&store, paid).await.unwrap();
        assert_eq!(store.get_credit_balance(&org_id).await.unwrap(), 200);

        let failed = json!({"id": "evt_3", "type": "invoice.payment_failed", "data": {"subscription_id": "sub_1"}});
        deliver(&store, failed).await.unwrap();
        let subscription = store.get_subscription(&org_id).await.unwrap().unwrap();
        assert_eq!(subscription.status, SubscriptionStatus::PastDue);

        let updated = json!({
            "id": "evt_4",
            "type": "customer.subscription.updated",
            "data": {"subscription_id": "sub_1", "status": "active", "plan": "pro"}
        });
        deliver(&store, updated).await.unwrap();
        let subscription = store.get_subscription(&org_id).await.unwrap().unwrap();
        assert_eq!(subscription.plan, Plan::Pro);
        assert_eq!(subscription.status, SubscriptionStatus::Active);

        let deleted = json!({"id": "evt_5", "type": "customer.subscription.deleted", "data": {"subscription_id": "sub_1"}});
        deliver(&store, deleted).await.unwrap();
        let subscription = store.get_subscription(&org_id).await.unwrap().unwrap();
        assert_eq!(subscription.plan, Plan::Free);
        assert_eq!(subscription.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn test_unhandled_events() {
        let (store, _, _) = setup().await;
        let unknown_type = json!({"id": "evt_9", "type": "charge.refunded", "data": {}});
        assert_eq!(deliver(&store, unknown_type).await.unwrap(), WebhookReceipt::handled(false));

        let unknown_sub = json!({"id": "evt_10", "type": "invoice.paid", "data": {"subscription_id": "sub_missing"}});
        assert_eq!(deliver(&store, unknown_sub).await.unwrap(), WebhookReceipt::handled(false));
    }

    #[tokio::test]
    async fn test_grants_need_owner() {
        let (store, org_id, owner) = setup().await;
        store
            .upsert_member(Member::new(org_id.clone(), "adm".into(), None, Role::Admin))
            .await
            .unwrap();
        let admin = UserContext::new("adm".into());

        let err = BillingOperations::grant_credits(
            &store,
            &admin,
            &org_id,
            CreditGrant { amount: 5, reason: None },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let summary = BillingOperations::grant_credits(
            &store,
            &owner,
            &org_id,
            CreditGrant { amount: 5, reason: None },
        )
        .await
        .unwrap();
        assert_eq!(summary.balance, 5);
        assert_eq!(summary.transactions[0].reason, MANUAL_GRANT_REASON);

        // Admins may still look
        let summary = BillingOperations::credit_summary(&store, &admin, &org_id).await.unwrap();
        assert_eq!(summary.balance, 5);
    }

    #[tokio::test]
    async fn test_failed_event_is_applied_on_retry() {
        let (store, org_id, _) = setup().await;
        let broken = json!({
            "id": "evt_7",
            "type": "checkout.session.completed",
            "data": {"plan": "starter", "subscription_id": "sub_7"}
        });
        let err = deliver(&store, broken).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let receipt = deliver(&store, checkout("evt_7", &org_id)).await.unwrap();
        assert_eq!(receipt, WebhookReceipt::handled(true));
        assert_eq!(store.get_credit_balance(&org_id).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_unknown_subscription_status_is_rejected() {
        let (store, org_id, _) = setup().await;
        deliver(&store, checkout("evt_1", &org_id)).await.unwrap();

        let updated = json!({
            "id": "evt_2",
            "type": "customer.subscription.updated",
            "data": {"subscription_id": "sub_1", "status": "paused_forever"}
        });
        let err = deliver(&store, updated.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let subscription = store.get_subscription(&org_id).await.unwrap().unwrap();
        assert_eq!(subscription.status, SubscriptionStatus::Active);

        // Not marked as processed
        assert!(deliver(&store, updated).await.is_err());
    }

    #[tokio::test]
    async fn test_grant_overflow_rejected() {
        let (store, org_id, owner) = setup().await;
        BillingOperations::grant_credits(
            &store,
            &owner,
            &org_id,
            CreditGrant { amount: i64::MAX, reason: None },
        )
        .await
        .unwrap();

        let err = BillingOperations::grant_credits(
            &store,
            &owner,
            &org_id,
            CreditGrant { amount: i64::MAX, reason: None },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(store.get_credit_balance(&org_id).await.unwrap(), i64::MAX);
    }
}
