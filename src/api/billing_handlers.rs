use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
};

use crate::api::extract::{Path, RequestJson};
use crate::api::handlers::AppState;
use crate::api::user_extractor::extract_header_value;
use crate::error::AppResult;
use crate::logic::BillingOperations;
use crate::model::{
    CreditGrant, CreditSummary, Id, PlanInfo, Subscription, UserContext, WebhookReceipt,
};
use crate::store::traits::Store;

/// GET /billing/plans
pub async fn list_plans() -> Json<Vec<PlanInfo>> {
    Json(BillingOperations::plans())
}

/// GET /organizations/:org_id/billing/subscription
pub async fn get_subscription<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Subscription>> {
    Ok(Json(
        BillingOperations::get_subscription(&state.store, &user, &org_id).await?,
    ))
}

/// GET /organizations/:org_id/billing/credits
pub async fn get_credits<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<CreditSummary>> {
    Ok(Json(
        BillingOperations::credit_summary(&state.store, &user, &org_id).await?,
    ))
}

/// POST /organizations/:org_id/billing/credits
pub async fn grant_credits<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(grant): RequestJson<CreditGrant>,
) -> AppResult<Json<CreditSummary>> {
    Ok(Json(
        BillingOperations::grant_credits(&state.store, &user, &org_id, grant).await?,
    ))
}

/// POST /webhooks/payments
///
/// Unauthenticated; trust comes from the `X-Signature` HMAC over the raw body.
pub async fn payment_webhook<S: Store>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookReceipt>> {
    let signature = extract_header_value(&headers, "x-signature");
    let receipt = BillingOperations::handle_webhook(
        &state.store,
        state.config.billing.webhook_secret.as_deref(),
        signature.as_deref(),
        &body,
    )
    .await?;
    Ok(Json(receipt))
}
