use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
};

use crate::api::extract::{optional_json, Path, RequestJson};
use crate::api::handlers::AppState;
use crate::error::AppResult;
use crate::logic::{CertificateOperations, CourseOperations, EnrollmentOperations};
use crate::model::{
    Certificate, Course, CourseUpdate, EnrollRequest, Enrollment, Id, NewCourse, ProgressUpdate,
    UserContext,
};
use crate::store::traits::Store;

/// POST /organizations/:org_id/courses
pub async fn create_course<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(input): RequestJson<NewCourse>,
) -> AppResult<(StatusCode, Json<Course>)> {
    let course = CourseOperations::create(&state.store, &user, &org_id, input).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /organizations/:org_id/courses
pub async fn list_courses<S: Store>(
    Path(org_id): Path<Id>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Vec<Course>>> {
    Ok(Json(
        CourseOperations::list(&state.store, &user, &org_id).await?,
    ))
}

/// GET /organizations/:org_id/courses/:course_id
pub async fn get_course<S: Store>(
    Path((org_id, course_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Course>> {
    Ok(Json(
        CourseOperations::get(&state.store, &user, &org_id, &course_id).await?,
    ))
}

/// PATCH /organizations/:org_id/courses/:course_id
pub async fn update_course<S: Store>(
    Path((org_id, course_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(update): RequestJson<CourseUpdate>,
) -> AppResult<Json<Course>> {
    Ok(Json(
        CourseOperations::update(&state.store, &user, &org_id, &course_id, update).await?,
    ))
}

/// DELETE /organizations/:org_id/courses/:course_id
pub async fn delete_course<S: Store>(
    Path((org_id, course_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<StatusCode> {
    CourseOperations::delete(&state.store, &user, &org_id, &course_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Enrollments

/// POST /organizations/:org_id/courses/:course_id/enrollments
///
/// The body may be empty; `{"user_id": ...}` enrolls another member.
pub async fn enroll<S: Store>(
    Path((org_id, course_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
    user: UserContext,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Enrollment>)> {
    let request: EnrollRequest = optional_json(&body)?;
    let enrollment =
        EnrollmentOperations::enroll(&state.store, &user, &org_id, &course_id, request).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// GET /organizations/:org_id/courses/:course_id/enrollments
pub async fn list_course_enrollments<S: Store>(
    Path((org_id, course_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Vec<Enrollment>>> {
    Ok(Json(
        EnrollmentOperations::list_for_course(&state.store, &user, &org_id, &course_id).await?,
    ))
}

/// PUT /organizations/:org_id/enrollments/:enrollment_id/progress
pub async fn update_progress<S: Store>(
    Path((org_id, enrollment_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
    user: UserContext,
    RequestJson(update): RequestJson<ProgressUpdate>,
) -> AppResult<Json<Enrollment>> {
    Ok(Json(
        EnrollmentOperations::update_progress(
            &state.store,
            &user,
            &org_id,
            &enrollment_id,
            update.progress,
        )
        .await?,
    ))
}

/// POST /organizations/:org_id/enrollments/:enrollment_id/withdraw
pub async fn withdraw<S: Store>(
    Path((org_id, enrollment_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Enrollment>> {
    Ok(Json(
        EnrollmentOperations::withdraw(&state.store, &user, &org_id, &enrollment_id).await?,
    ))
}

/// POST /organizations/:org_id/enrollments/:enrollment_id/certificate
pub async fn issue_certificate<S: Store>(
    Path((org_id, enrollment_id)): Path<(Id, Id)>,
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Certificate>> {
    Ok(Json(
        CertificateOperations::issue(&state.store, &user, &org_id, &enrollment_id).await?,
    ))
}

// The caller's own records

/// GET /me/enrollments
pub async fn my_enrollments<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Vec<Enrollment>>> {
    Ok(Json(
        EnrollmentOperations::list_mine(&state.store, &user).await?,
    ))
}

/// GET /me/certificates
pub async fn my_certificates<S: Store>(
    State(state): State<AppState<S>>,
    user: UserContext,
) -> AppResult<Json<Vec<Certificate>>> {
    Ok(Json(
        CertificateOperations::list_mine(&state.store, &user).await?,
    ))
}
