use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};

use crate::api::extract::{Path, RequestJson};
use crate::api::handlers::AppState;
use crate::error::AppResult;
use crate::logic::ThemeOperations;
use crate::model::{Id, NewTheme, Theme, UserContext};
use crate::store::traits::Store;

/// POST /organizations/:org_id/themes
pub async fn create_theme<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(input): RequestJson<NewTheme>,
) -> AppResult<(StatusCode, Json<Theme>)> {
    let theme = ThemeOperations::create(&state.store, &user, &org_id, input).await?;
    Ok((StatusCode::CREATED, Json(theme)))
}

/// GET /organizations/:org_id/themes
pub async fn list_themes<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Vec<Theme>>> {
    Ok(Json(ThemeOperations::list(&state.store, &user, &org_id).await?))
}

/// POST /organizations/:org_id/themes/:theme_id/activate
pub async fn activate_theme<S: Store>(
    Path((org_id, theme_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Theme>> {
    Ok(Json(
        ThemeOperations::activate(&state.store, &user, &org_id, &theme_id).await?,
    ))
}

/// DELETE /organizations/:org_id/themes/:theme_id
pub async fn delete_theme<S: Store>(
    Path((org_id, theme_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<StatusCode> {
    ThemeOperations::delete(&state.store, &user, &org_id, &theme_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
