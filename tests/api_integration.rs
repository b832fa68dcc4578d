use lms_api::config::AppConfig;
use lms_api::{build_app, MemoryStore};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

// Test client wrapper for making API calls as a given user
struct TestClient {
    client: Client,
    base_url: String,
    user_id: String,
}

impl TestClient {
    fn new(base_url: String, user_id: &str) -> Self {
        Self {
            client: Client::new(),
            base_url,
            user_id: user_id.to_string(),
        }
    }

    fn as_user(&self, user_id: &str) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            user_id: user_id.to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-User-Id", &self.user_id)
            .header("X-User-Email", format!("{}@example.com", self.user_id))
    }

    async fn post(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.request(reqwest::Method::POST, path).json(&json).send().await
    }

    async fn put(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.request(reqwest::Method::PUT, path).json(&json).send().await
    }

    async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.request(reqwest::Method::GET, path).send().await
    }

    async fn delete(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.request(reqwest::Method::DELETE, path).send().await
    }

    async fn patch(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.request(reqwest::Method::PATCH, path).json(&json).send().await
    }
}

/// Expect `status` and return the JSON body (Null for empty bodies)
async fn expect(response: reqwest::Response, status: StatusCode, step: &str) -> Value {
    let actual = response.status();
    let text = response.text().await.unwrap_or_default();
    assert_eq!(actual, status, "{}: unexpected response {}", step, text);
    if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).expect("response is not JSON")
    }
}

/// Uses `TEST_API_BASE_URL` when set, otherwise serves the app over a memory store on an ephemeral port
async fn base_url() -> String {
    if let Ok(url) = std::env::var("TEST_API_BASE_URL") {
        return url;
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let app = build_app(MemoryStore::new(), AppConfig::default());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", address)
}

#[tokio::test]
async fn test_academy_workflow() {
    let owner = TestClient::new(base_url().await, "owner-1");
    let learner = owner.as_user("learner-1");

    expect(owner.get("/health").await.unwrap(), StatusCode::OK, "health").await;

    // 1. Organization
    let org = expect(
        owner
            .post("/organizations", json!({"name": "Integration Academy"}))
            .await
            .unwrap(),
        StatusCode::CREATED,
        "create organization",
    )
    .await;
    let org_id = org["id"].as_str().unwrap().to_string();
    let org_path = format!("/organizations/{}", org_id);

    // 2. Invite and accept
    let invitation = expect(
        owner
            .post(
                &format!("{}/invitations", org_path),
                json!({"email": "learner-1@example.com"}),
            )
            .await
            .unwrap(),
        StatusCode::CREATED,
        "create invitation",
    )
    .await;
    let member = expect(
        learner
            .post("/invitations/accept", json!({"token": invitation["token"]}))
            .await
            .unwrap(),
        StatusCode::OK,
        "accept invitation",
    )
    .await;
    assert_eq!(member["role"], "member");

    // Members cannot manage courses
    expect(
        learner
            .post(&format!("{}/courses", org_path), json!({"title": "Sneaky"}))
            .await
            .unwrap(),
        StatusCode::FORBIDDEN,
        "member creates course",
    )
    .await;

    // 3. Course
    let course = expect(
        owner
            .post(
                &format!("{}/courses", org_path),
                json!({"title": "Systems Thinking", "credit_cost": 15}),
            )
            .await
            .unwrap(),
        StatusCode::CREATED,
        "create course",
    )
    .await;
    let course_id = course["id"].as_str().unwrap().to_string();
    let course_path = format!("{}/courses/{}", org_path, course_id);

    let listed = expect(
        learner.get(&format!("{}/courses", org_path)).await.unwrap(),
        StatusCode::OK,
        "member lists drafts",
    )
    .await;
    assert!(listed.as_array().unwrap().is_empty());

    expect(
        owner.patch(&course_path, json!({"status": "published"})).await.unwrap(),
        StatusCode::OK,
        "publish course",
    )
    .await;

    // 4. Credits and enrollment
    let enroll_path = format!("{}/enrollments", course_path);
    expect(
        learner.post(&enroll_path, json!({})).await.unwrap(),
        StatusCode::PAYMENT_REQUIRED,
        "enroll without credits",
    )
    .await;

    let credits = expect(
        owner
            .post(&format!("{}/billing/credits", org_path), json!({"amount": 20}))
            .await
            .unwrap(),
        StatusCode::OK,
        "grant credits",
    )
    .await;
    assert_eq!(credits["balance"], 20);

    let enrollment = expect(
        learner.post(&enroll_path, json!({})).await.unwrap(),
        StatusCode::CREATED,
        "enroll",
    )
    .await;
    let enrollment_path = format!(
        "{}/enrollments/{}",
        org_path,
        enrollment["id"].as_str().unwrap()
    );
    expect(
        learner.post(&enroll_path, json!({})).await.unwrap(),
        StatusCode::CONFLICT,
        "enroll twice",
    )
    .await;

    // 5. Progress, completion and certificate
    expect(
        learner
            .put(&format!("{}/progress", enrollment_path), json!({"progress": 60}))
            .await
            .unwrap(),
        StatusCode::OK,
        "progress 60",
    )
    .await;
    expect(
        learner
            .put(&format!("{}/progress", enrollment_path), json!({"progress": 10}))
            .await
            .unwrap(),
        StatusCode::BAD_REQUEST,
        "progress backwards",
    )
    .await;
    let completed = expect(
        learner
            .put(&format!("{}/progress", enrollment_path), json!({"progress": 100}))
            .await
            .unwrap(),
        StatusCode::OK,
        "complete",
    )
    .await;
    assert_eq!(completed["status"], "completed");

    let certificate = expect(
        learner
            .post(&format!("{}/certificate", enrollment_path), json!({}))
            .await
            .unwrap(),
        StatusCode::OK,
        "issue certificate",
    )
    .await;
    let code = certificate["verification_code"].as_str().unwrap().to_string();

    let verification = expect(
        owner
            .as_user("anyone")
            .get(&format!("/certificates/verify/{}", code))
            .await
            .unwrap(),
        StatusCode::OK,
        "verify certificate",
    )
    .await;
    assert_eq!(verification["course_title"], "Systems Thinking");
    assert_eq!(verification["organization_name"], "Integration Academy");

    // 6. Themes
    let theme = expect(
        owner
            .post(&format!("{}/themes", org_path), json!({"name": "Brand"}))
            .await
            .unwrap(),
        StatusCode::CREATED,
        "create theme",
    )
    .await;
    let theme_path = format!("{}/themes/{}", org_path, theme["id"].as_str().unwrap());
    expect(
        owner.post(&format!("{}/activate", theme_path), json!({})).await.unwrap(),
        StatusCode::OK,
        "activate theme",
    )
    .await;
    expect(
        owner.delete(&theme_path).await.unwrap(),
        StatusCode::CONFLICT,
        "delete active theme",
    )
    .await;

    // 7. Rate limit configuration
    let limits = expect(
        owner.get(&format!("{}/rate-limits", org_path)).await.unwrap(),
        StatusCode::OK,
        "default rate limits",
    )
    .await;
    assert_eq!(limits["is_default"], true);
    expect(
        owner
            .put(
                &format!("{}/rate-limits", org_path),
                json!({"requests_per_minute": 100, "requests_per_day": 50}),
            )
            .await
            .unwrap(),
        StatusCode::BAD_REQUEST,
        "invalid rate limits",
    )
    .await;

    // 8. Teardown
    expect(
        learner.delete(&org_path).await.unwrap(),
        StatusCode::FORBIDDEN,
        "member deletes organization",
    )
    .await;
    expect(
        owner.delete(&org_path).await.unwrap(),
        StatusCode::NO_CONTENT,
        "delete organization",
    )
    .await;
}
