//! Routes that do not carry a user identity: API-key access under `/v1`
//! and certificate verification.

use axum::{
    extract::State,
    response::Json,
};
use serde::Serialize;

use crate::api::api_key_extractor::ApiKeyAuth;
use crate::api::extract::Path;
use crate::api::handlers::AppState;
use crate::error::AppResult;
use crate::logic::{CertificateOperations, CourseOperations};
use crate::model::{CertificateVerification, Course, EffectiveRateLimit, Id};
use crate::store::traits::Store;

#[derive(Debug, Serialize)]
pub struct PublishedCourses {
    pub organization_id: Id,
    pub courses: Vec<Course>,
}

#[derive(Debug, Serialize)]
pub struct KeyInfo {
    pub api_key_id: Id,
    pub organization_id: Id,
    pub name: String,
    pub limits: EffectiveRateLimit,
}

/// GET /v1/courses
pub async fn list_published_courses<S: Store>(
    State(state): State<AppState<S>>,
    auth: ApiKeyAuth,
) -> AppResult<Json<PublishedCourses>> {
    let organization_id = auth.api_key.organization_id;
    let courses = CourseOperations::list_published(&state.store, &organization_id).await?;
    Ok(Json(PublishedCourses {
        organization_id,
        courses,
    }))
}

/// GET /v1/me
pub async fn whoami(auth: ApiKeyAuth) -> Json<KeyInfo> {
    Json(KeyInfo {
        api_key_id: auth.api_key.id,
        organization_id: auth.api_key.organization_id,
        name: auth.api_key.name,
        limits: auth.limits,
    })
}

/// GET /certificates/verify/:code
pub async fn verify_certificate<S: Store>(
    Path(code): Path<String>,
    State(state): State<AppState<S>>,
) -> AppResult<Json<CertificateVerification>> {
    Ok(Json(CertificateOperations::verify(&state.store, &code).await?))
}
