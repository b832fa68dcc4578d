use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};

use crate::api::extract::{Path, RequestJson};
use crate::api::handlers::AppState;
use crate::error::AppResult;
use crate::logic::{
    ApiKeyOperations, InvitationOperations, OrganizationOperations, RateLimitOperations,
};
use crate::model::{
    AcceptInvitation, ApiKey, CreatedApiKey, CreatedInvitation, EffectiveRateLimit, Id,
    Invitation, Member, MemberRoleUpdate, NewApiKey, NewInvitation, NewOrganization, Organization,
    OrganizationUpdate, RateLimitUpdate, UsageSummary, UserContext,
};
use crate::store::traits::Store;

// Organizations

/// POST /organizations
pub async fn create_organization<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(input): RequestJson<NewOrganization>,
) -> AppResult<(StatusCode, Json<Organization>)> {
    let organization = OrganizationOperations::create(&state.store, &user, input).await?;
    Ok((StatusCode::CREATED, Json(organization)))
}

/// GET /organizations
pub async fn list_organizations<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Vec<Organization>>> {
    Ok(Json(
        OrganizationOperations::list_for_user(&state.store, &user).await?,
    ))
}

/// GET /organizations/:org_id
pub async fn get_organization<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Organization>> {
    Ok(Json(
        OrganizationOperations::get(&state.store, &user, &org_id).await?,
    ))
}

/// PATCH /organizations/:org_id
pub async fn update_organization<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(update): RequestJson<OrganizationUpdate>,
) -> AppResult<Json<Organization>> {
    Ok(Json(
        OrganizationOperations::update(&state.store, &user, &org_id, update).await?,
    ))
}

/// DELETE /organizations/:org_id
pub async fn delete_organization<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<StatusCode> {
    OrganizationOperations::delete(&state.store, &user, &org_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Members

/// GET /organizations/:org_id/members
pub async fn list_members<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Vec<Member>>> {
    Ok(Json(
        OrganizationOperations::list_members(&state.store, &user, &org_id).await?,
    ))
}

/// PATCH /organizations/:org_id/members/:user_id
pub async fn update_member_role<S: Store>(
    Path((org_id, member_id)): Path<(Id, String)>,
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(update): RequestJson<MemberRoleUpdate>,
) -> AppResult<Json<Member>> {
    Ok(Json(
        OrganizationOperations::change_role(&state.store, &user, &org_id, &member_id, update.role)
            .await?,
    ))
}

/// DELETE /organizations/:org_id/members/:user_id
pub async fn remove_member<S: Store>(
    Path((org_id, member_id)): Path<(Id, String)>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<StatusCode> {
    OrganizationOperations::remove_member(&state.store, &user, &org_id, &member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Invitations

/// POST /organizations/:org_id/invitations
pub async fn create_invitation<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(input): RequestJson<NewInvitation>,
) -> AppResult<(StatusCode, Json<CreatedInvitation>)> {
    let created = InvitationOperations::create(
        &state.store,
        &user,
        &org_id,
        input,
        state.config.invitations.ttl_hours,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /organizations/:org_id/invitations
pub async fn list_invitations<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Vec<Invitation>>> {
    Ok(Json(
        InvitationOperations::list(&state.store, &user, &org_id).await?,
    ))
}

/// DELETE /organizations/:org_id/invitations/:invitation_id
pub async fn revoke_invitation<S: Store>(
    Path((org_id, invitation_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Invitation>> {
    Ok(Json(
        InvitationOperations::revoke(&state.store, &user, &org_id, &invitation_id).await?,
    ))
}

/// POST /invitations/accept
pub async fn accept_invitation<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(input): RequestJson<AcceptInvitation>,
) -> AppResult<Json<Member>> {
    Ok(Json(
        InvitationOperations::accept(&state.store, &user, &input.token).await?,
    ))
}

// API keys

/// POST /organizations/:org_id/api-keys
pub async fn create_api_key<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(input): RequestJson<NewApiKey>,
) -> AppResult<(StatusCode, Json<CreatedApiKey>)> {
    let created = ApiKeyOperations::create(&state.store, &user, &org_id, input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /organizations/:org_id/api-keys
pub async fn list_api_keys<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Vec<ApiKey>>> {
    Ok(Json(
        ApiKeyOperations::list(&state.store, &user, &org_id).await?,
    ))
}

/// DELETE /organizations/:org_id/api-keys/:key_id
pub async fn revoke_api_key<S: Store>(
    Path((org_id, key_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<ApiKey>> {
    Ok(Json(
        ApiKeyOperations::revoke(&state.store, &user, &org_id, &key_id).await?,
    ))
}

// Rate limits

/// GET /organizations/:org_id/rate-limits
pub async fn get_rate_limits<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<EffectiveRateLimit>> {
    Ok(Json(
        RateLimitOperations::get(&state.store, &user, &org_id, &state.config.rate_limit).await?,
    ))
}

/// PUT /organizations/:org_id/rate-limits
pub async fn put_rate_limits<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(update): RequestJson<RateLimitUpdate>,
) -> AppResult<Json<EffectiveRateLimit>> {
    Ok(Json(
        RateLimitOperations::update(&state.store, &user, &org_id, update).await?,
    ))
}

/// DELETE /organizations/:org_id/rate-limits
pub async fn reset_rate_limits<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<EffectiveRateLimit>> {
    Ok(Json(
        RateLimitOperations::reset(&state.store, &user, &org_id, &state.config.rate_limit)
            .await?,
    ))
}

/// GET /organizations/:org_id/rate-limits/usage
pub async fn get_usage<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<UsageSummary>> {
    Ok(Json(
        RateLimitOperations::usage(&state.store, &user, &org_id, &state.config.rate_limit)
            .await?,
    ))
}
