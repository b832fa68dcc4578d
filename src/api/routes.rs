use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};

use crate::api::handlers::AppState;
use crate::api::{
    billing_handlers, course_handlers, handlers, organization_handlers, public_handlers,
    theme_handlers,
};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Organizations
        .route(
            "/organizations",
            post(organization_handlers::create_organization::<S>)
                .get(organization_handlers::list_organizations::<S>),
        )
        .route(
            "/organizations/:org_id",
            get(organization_handlers::get_organization::<S>)
                .patch(organization_handlers::update_organization::<S>)
                .delete(organization_handlers::delete_organization::<S>),
        )
        // Members
        .route(
            "/organizations/:org_id/members",
            get(organization_handlers::list_members::<S>),
        )
        .route(
            "/organizations/:org_id/members/:user_id",
            patch(organization_handlers::update_member_role::<S>)
                .delete(organization_handlers::remove_member::<S>),
        )
        // Invitations
        .route(
            "/organizations/:org_id/invitations",
            post(organization_handlers::create_invitation::<S>)
                .get(organization_handlers::list_invitations::<S>),
        )
        .route(
            "/organizations/:org_id/invitations/:invitation_id",
            delete(organization_handlers::revoke_invitation::<S>),
        )
        .route(
            "/invitations/accept",
            post(organization_handlers::accept_invitation::<S>),
        )
        // API keys
        .route(
            "/organizations/:org_id/api-keys",
            post(organization_handlers::create_api_key::<S>)
                .get(organization_handlers::list_api_keys::<S>),
        )
        .route(
            "/organizations/:org_id/api-keys/:key_id",
            delete(organization_handlers::revoke_api_key::<S>),
        )
        // Rate limits
        .route(
            "/organizations/:org_id/rate-limits",
            get(organization_handlers::get_rate_limits::<S>)
                .put(organization_handlers::put_rate_limits::<S>)
                .delete(organization_handlers::reset_rate_limits::<S>),
        )
        .route(
            "/organizations/:org_id/rate-limits/usage",
            get(organization_handlers::get_usage::<S>),
        )
        // Courses
        .route(
            "/organizations/:org_id/courses",
            post(course_handlers::create_course::<S>).get(course_handlers::list_courses::<S>),
        )
        .route(
            "/organizations/:org_id/courses/:course_id",
            get(course_handlers::get_course::<S>)
                .patch(course_handlers::update_course::<S>)
                .delete(course_handlers::delete_course::<S>),
        )
        // Enrollments and certificates
        .route(
            "/organizations/:org_id/courses/:course_id/enrollments",
            post(course_handlers::enroll::<S>)
                .get(course_handlers::list_course_enrollments::<S>),
        )
        .route(
            "/organizations/:org_id/enrollments/:enrollment_id/progress",
            put(course_handlers::update_progress::<S>),
        )
        .route(
            "/organizations/:org_id/enrollments/:enrollment_id/withdraw",
            post(course_handlers::withdraw::<S>),
        )
        .route(
            "/organizations/:org_id/enrollments/:enrollment_id/certificate",
            post(course_handlers::issue_certificate::<S>),
        )
        .route("/me/enrollments", get(course_handlers::my_enrollments::<S>))
        .route("/me/certificates", get(course_handlers::my_certificates::<S>))
        .route(
            "/certificates/verify/:code",
            get(public_handlers::verify_certificate::<S>),
        )
        // Billing
        .route("/billing/plans", get(billing_handlers::list_plans))
        .route(
            "/organizations/:org_id/billing/subscription",
            get(billing_handlers::get_subscription::<S>),
        )
        .route(
            "/organizations/:org_id/billing/credits",
            get(billing_handlers::get_credits::<S>).post(billing_handlers::grant_credits::<S>),
        )
        .route(
            "/webhooks/payments",
            post(billing_handlers::payment_webhook::<S>),
        )
        // Themes
        .route(
            "/organizations/:org_id/themes",
            post(theme_handlers::create_theme::<S>).get(theme_handlers::list_themes::<S>),
        )
        .route(
            "/organizations/:org_id/themes/:theme_id",
            delete(theme_handlers::delete_theme::<S>),
        )
        .route(
            "/organizations/:org_id/themes/:theme_id/activate",
            post(theme_handlers::activate_theme::<S>),
        )
        // API-key access
        .route(
            "/v1/courses",
            get(public_handlers::list_published_courses::<S>),
        )
        .route("/v1/me", get(public_handlers::whoami))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::logic::tokens::sign_payload;
    use crate::store::MemoryStore;

    const SECRET: &str = "whsec_router";

    fn app() -> Router {
        let mut config = AppConfig::default();
        config.billing.webhook_secret = Some(SECRET.to_string());
        config.rate_limit.requests_per_minute = 2;
        crate::build_app(MemoryStore::new(), config)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request
                .header("x-user-id", user)
                .header("x-user-email", format!("{}@example.com", user));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn send_raw(app: &Router, method: &str, uri: &str, user: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", user)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn create_org(app: &Router, owner: &str, name: &str) -> String {
        let (status, org) = send(app, "POST", "/organizations", Some(owner), Some(json!({"name": name}))).await;
        assert_eq!(status, StatusCode::CREATED);
        org["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_user_routes_require_identity() {
        let (status, body) = send(&app(), "GET", "/organizations", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_json_bad_requests() {
        let app = app();

        let (status, body) = send(&app, "POST", "/organizations", Some("ada"), Some(json!({"nam": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("name"));

        let (status, body) = send_raw(&app, "POST", "/organizations", "ada", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_enroll_rejects_malformed_body() {
        let app = app();
        let org_id = create_org(&app, "ada", "Acme").await;
        let (status, course) = send(
            &app,
            "POST",
            &format!("/organizations/{}/courses", org_id),
            Some("ada"),
            Some(json!({"title": "Rust 101"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let course_path = format!("/organizations/{}/courses/{}", org_id, course["id"].as_str().unwrap());
        let (status, _) = send(&app, "PATCH", &course_path, Some("ada"), Some(json!({"status": "published"}))).await;
        assert_eq!(status, StatusCode::OK);
        let enroll_path = format!("{}/enrollments", course_path);

        let (status, body) = send(&app, "POST", &enroll_path, Some("ada"), Some(json!({"user_id": 42}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        let (status, body) = send(&app, "POST", &enroll_path, Some("ada"), Some(json!({"user": "bob"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (_, enrollments) = send(&app, "GET", &enroll_path, Some("ada"), None).await;
        assert!(enrollments.as_array().unwrap().is_empty());

        // No body at all enrolls the caller
        let (status, enrollment) = send(&app, "POST", &enroll_path, Some("ada"), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(enrollment["user_id"], "ada");
    }

    #[tokio::test]
    async fn test_invitation_flow() {
        let app = app();
        let org_id = create_org(&app, "ada", "Acme").await;

        let (status, invitation) = send(
            &app,
            "POST",
            &format!("/organizations/{}/invitations", org_id),
            Some("ada"),
            Some(json!({"email": "Bob@Example.com", "role": "admin"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(invitation.get("token_hash").is_none());
        let token = invitation["token"].as_str().unwrap().to_string();

        let (status, _) = send(&app, "POST", "/invitations/accept", Some("bob"), Some(json!({"token": token}))).await;
        assert_eq!(status, StatusCode::OK);

        let (_, members) = send(&app, "GET", &format!("/organizations/{}/members", org_id), Some("bob"), None).await;
        assert_eq!(members.as_array().unwrap().len(), 2);

        // Outsiders do not learn the organization exists
        let (status, _) = send(&app, "GET", &format!("/organizations/{}", org_id), Some("eve"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_key_access_is_rate_limited() {
        let app = app();
        let org_id = create_org(&app, "ada", "Acme").await;

        let (status, created) = send(
            &app,
            "POST",
            &format!("/organizations/{}/api-keys", org_id),
            Some("ada"),
            Some(json!({"name": "ci"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let key = created["key"].as_str().unwrap().to_string();

        let request = |key: &str| {
            Request::builder()
                .uri("/v1/courses")
                .header(header::AUTHORIZATION, format!("Bearer {}", key))
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(request("lk_wrong")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        for _ in 0..2 {
            let response = app.clone().oneshot(request(&key)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app.clone().oneshot(request(&key)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_webhook_grants_credits_for_enrollment() {
        let app = app();
        let org_id = create_org(&app, "ada", "Acme").await;

        let (_, course) = send(
            &app,
            "POST",
            &format!("/organizations/{}/courses", org_id),
            Some("ada"),
            Some(json!({"title": "Rust basics", "credit_cost": 30})),
        )
        .await;
        let course_id = course["id"].as_str().unwrap().to_string();
        send(
            &app,
            "PATCH",
            &format!("/organizations/{}/courses/{}", org_id, course_id),
            Some("ada"),
            Some(json!({"status": "published"})),
        )
        .await;

        let enroll_uri = format!("/organizations/{}/courses/{}/enrollments", org_id, course_id);
        let (status, _) = send(&app, "POST", &enroll_uri, Some("ada"), None).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

        let payload = json!({
            "id": "evt_checkout",
            "type": "checkout.session.completed",
            "data": {"organization_id": org_id, "plan": "starter", "customer_id": "cus_1", "subscription_id": "sub_1"}
        })
        .to_string();
        let webhook = |signature: String| {
            Request::builder()
                .method("POST")
                .uri("/webhooks/payments")
                .header("x-signature", signature)
                .body(Body::from(payload.clone()))
                .unwrap()
        };

        let response = app.clone().oneshot(webhook("sha256=deadbeef".into())).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let signature = format!("sha256={}", sign_payload(payload.as_bytes(), SECRET));
        let response = app.clone().oneshot(webhook(signature)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, enrollment) = send(&app, "POST", &enroll_uri, Some("ada"), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(enrollment["status"], "active");

        let (_, credits) = send(&app, "GET", &format!("/organizations/{}/billing/credits", org_id), Some("ada"), None).await;
        assert_eq!(credits["balance"], 70);
    }
}
