//! Integration tests for the Taskforge backend.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::auth::TokenKeys;
use crate::config::{Config, OwnershipPolicy};
use crate::db::{init_database, Repository};
use crate::mail::RecordingMailer;
use crate::notify::NotificationHub;
use crate::{create_router, AppState};

const PASSWORD: &str = "s3cure-pass";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    repo: Arc<Repository>,
    mailer: Arc<RecordingMailer>,
    notifications: Arc<NotificationHub>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_policy(OwnershipPolicy::Conceal).await
    }

    async fn with_policy(ownership_policy: OwnershipPolicy) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool, ownership_policy));

        let config = Config {
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            ownership_policy,
            ..Config::default()
        };

        let mailer = Arc::new(RecordingMailer::default());
        let notifications = Arc::new(NotificationHub::new());

        let state = AppState {
            repo: repo.clone(),
            tokens: Arc::new(TokenKeys::new(b"test-secret", 1)),
            mailer: mailer.clone(),
            notifications: notifications.clone(),
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            repo,
            mailer,
            notifications,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut request = self.client.request(method, self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request.send().await.unwrap();
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str, token: &str) -> (u16, Value) {
        self.send(Method::GET, path, Some(token), None).await
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> (u16, Value) {
        self.send(Method::POST, path, Some(token), Some(body)).await
    }

    async fn register(&self, email: &str, is_manager: bool) -> (u16, Value) {
        self.send(
            Method::POST,
            "/api/accounts/register",
            None,
            Some(json!({
                "first_name": "Test",
                "last_name": "User",
                "email": email,
                "password": PASSWORD,
                "password2": PASSWORD,
                "is_manager": is_manager
            })),
        )
        .await
    }

    async fn verify(&self, email: &str, code: &str) -> (u16, Value) {
        self.send(
            Method::POST,
            "/api/accounts/verify-email",
            None,
            Some(json!({ "email": email, "code": code })),
        )
        .await
    }

    async fn login(&self, email: &str, password: &str) -> (u16, Value) {
        self.send(
            Method::POST,
            "/api/accounts/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// Register, verify and log in. Returns (user id, access token).
    async fn signup(&self, email: &str, is_manager: bool) -> (String, String) {
        let (status, body) = self.register(email, is_manager).await;
        assert_eq!(status, 201, "register failed: {}", body);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let code = self.mailer.last_code_for(email).unwrap();
        let (status, _) = self.verify(email, &code).await;
        assert_eq!(status, 200);

        let (status, body) = self.login(email, PASSWORD).await;
        assert_eq!(status, 200, "login failed: {}", body);
        let token = body["data"]["access_token"].as_str().unwrap().to_string();

        (id, token)
    }

    async fn create_project(&self, token: &str, name: &str) -> String {
        let (status, body) = self
            .post(
                "/api/projects",
                token,
                json!({
                    "name": name,
                    "scope": "Customers place orders. Staff ship them.",
                    "deadline": (Utc::now() + Duration::days(30)).to_rfc3339()
                }),
            )
            .await;
        assert_eq!(status, 201, "create project failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn add_developers(&self, token: &str, project_id: &str, developer_ids: &[&str]) {
        let (status, body) = self
            .post(
                &format!("/api/projects/{}/developers", project_id),
                token,
                json!({ "developer_ids": developer_ids }),
            )
            .await;
        assert_eq!(status, 200, "add developers failed: {}", body);
    }

    async fn create_task(&self, token: &str, project_id: &str, developer_ids: &[&str]) -> String {
        let (status, body) = self
            .post(
                &format!("/api/projects/{}/tasks", project_id),
                token,
                json!({ "title": "Build checkout", "developer_ids": developer_ids }),
            )
            .await;
        assert_eq!(status, 201, "create task failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn transition(&self, token: &str, task_id: &str, action: &str) -> (u16, Value) {
        self.send(
            Method::POST,
            &format!("/api/tasks/{}/{}", task_id, action),
            Some(token),
            None,
        )
        .await
    }

    /// Overwrite the four task timestamps directly in storage.
    async fn set_task_times(
        &self,
        task_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        manager_start: Option<DateTime<Utc>>,
        manager_end: Option<DateTime<Utc>>,
    ) {
        sqlx::query(
            "UPDATE tasks SET start_time = ?, end_time = ?, manager_start_time = ?, manager_end_time = ? WHERE id = ?",
        )
        .bind(start)
        .bind(end)
        .bind(manager_start)
        .bind(manager_end)
        .bind(task_id)
        .execute(self.repo.pool())
        .await
        .unwrap();
    }

    /// One manager, one developer, a shared project and a task assigned to the developer.
    async fn with_assigned_task(&self) -> Setup {
        let (_, manager) = self.signup("manager@example.com", true).await;
        let (developer_id, developer) = self.signup("dev@example.com", false).await;
        let project_id = self.create_project(&manager, "Storefront").await;
        self.add_developers(&manager, &project_id, &[&developer_id])
            .await;
        let task_id = self
            .create_task(&manager, &project_id, &[&developer_id])
            .await;
        Setup {
            manager,
            developer_id,
            developer,
            project_id,
            task_id,
        }
    }
}

struct Setup {
    manager: String,
    developer_id: String,
    developer: String,
    project_id: String,
    task_id: String,
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_registration_and_verification() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture.register("new@example.com", false).await;
    assert_eq!(status, 201);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["is_active"], false);
    assert_eq!(body["data"]["role"], "developer");
    assert!(body["data"].get("password_hash").is_none());

    // Six-character code expiring in ten minutes
    let code = fixture.mailer.last_code_for("new@example.com").unwrap();
    assert_eq!(code.len(), 6);
    let expiry: DateTime<Utc> =
        sqlx::query_scalar("SELECT verification_code_expiry FROM users WHERE email = ?")
            .bind("new@example.com")
            .fetch_one(fixture.repo.pool())
            .await
            .unwrap();
    let remaining = expiry - Utc::now();
    assert!(remaining > Duration::minutes(9) && remaining <= Duration::minutes(10));

    // Inactive accounts cannot log in
    let (status, body) = fixture.login("new@example.com", PASSWORD).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "ACCOUNT_INACTIVE");

    let (status, body) = fixture.verify("new@example.com", "zzzzzz").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "INVALID_CODE");

    let (status, _) = fixture.verify("missing@example.com", &code).await;
    assert_eq!(status, 404);

    let (status, _) = fixture.verify("new@example.com", &code).await;
    assert_eq!(status, 200);

    let stored: Option<String> =
        sqlx::query_scalar("SELECT verification_code FROM users WHERE email = ?")
            .bind("new@example.com")
            .fetch_one(fixture.repo.pool())
            .await
            .unwrap();
    assert!(stored.is_none());

    // Login is case-insensitive on email
    let (status, body) = fixture.login("NEW@example.com", PASSWORD).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["token_type"], "Bearer");
    let token = body["data"]["access_token"].as_str().unwrap();

    let (status, body) = fixture.get("/api/accounts/me", token).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["email"], "new@example.com");
    assert_eq!(body["data"]["is_active"], true);
}

#[tokio::test]
async fn test_expired_verification_code() {
    let fixture = TestFixture::new().await;

    fixture.register("late@example.com", false).await;
    let code = fixture.mailer.last_code_for("late@example.com").unwrap();

    sqlx::query("UPDATE users SET verification_code_expiry = ? WHERE email = ?")
        .bind(Utc::now() - Duration::minutes(1))
        .bind("late@example.com")
        .execute(fixture.repo.pool())
        .await
        .unwrap();

    let (status, body) = fixture.verify("late@example.com", &code).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VERIFICATION_EXPIRED");

    // Still inactive
    let (status, body) = fixture.login("late@example.com", PASSWORD).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "ACCOUNT_INACTIVE");
}

#[tokio::test]
async fn test_registration_validation() {
    let fixture = TestFixture::new().await;

    let register = |body: Value| {
        fixture.send(Method::POST, "/api/accounts/register", None, Some(body))
    };

    let (status, body) = register(json!({
        "first_name": "A", "last_name": "B", "email": "a@example.com",
        "password": PASSWORD, "password2": "different-pass"
    }))
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["message"], "Passwords do not match.");

    let (status, _) = register(json!({
        "first_name": "A", "last_name": "B", "email": "a@example.com",
        "password": "12345678", "password2": "12345678"
    }))
    .await;
    assert_eq!(status, 400);

    let (status, _) = register(json!({
        "first_name": "A", "last_name": "B", "email": "not-an-email",
        "password": PASSWORD, "password2": PASSWORD
    }))
    .await;
    assert_eq!(status, 400);

    let (status, _) = fixture.register("taken@example.com", false).await;
    assert_eq!(status, 201);
    let (status, body) = fixture.register("TAKEN@example.com", true).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "EMAIL_TAKEN");
}

#[tokio::test]
async fn test_registration_rolls_back_when_mail_fails() {
    let fixture = TestFixture::new().await;

    fixture.mailer.set_failing(true);
    let (status, body) = fixture.register("retry@example.com", false).await;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["code"], "MAIL_FAILED");

    fixture.mailer.set_failing(false);
    let (status, _) = fixture.register("retry@example.com", false).await;
    assert_eq!(status, 201);
}

#[tokio::test]
async fn test_password_reset() {
    let fixture = TestFixture::new().await;
    fixture.signup("forgot@example.com", false).await;

    let (status, _) = fixture
        .send(
            Method::POST,
            "/api/accounts/password-reset-request",
            None,
            Some(json!({ "email": "nobody@example.com" })),
        )
        .await;
    assert_eq!(status, 400);

    let (status, _) = fixture
        .send(
            Method::POST,
            "/api/accounts/password-reset-request",
            None,
            Some(json!({ "email": "forgot@example.com" })),
        )
        .await;
    assert_eq!(status, 200);
    let code = fixture.mailer.last_code_for("forgot@example.com").unwrap();

    let reset = |reset_code: &str| {
        fixture.send(
            Method::POST,
            "/api/accounts/password-reset",
            None,
            Some(json!({
                "email": "forgot@example.com",
                "reset_code": reset_code,
                "new_password": "brand-new-pass"
            })),
        )
    };

    let (status, body) = reset("wrong1").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "INVALID_CODE");

    let (status, _) = reset(&code).await;
    assert_eq!(status, 200);

    let (status, _) = fixture.login("forgot@example.com", PASSWORD).await;
    assert_eq!(status, 401);
    let (status, _) = fixture.login("forgot@example.com", "brand-new-pass").await;
    assert_eq!(status, 200);

    // The code is single use
    let (status, _) = reset(&code).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .send(Method::GET, "/api/projects", None, None)
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = fixture.get("/api/projects", "not-a-token").await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_delete_me() {
    let fixture = TestFixture::new().await;
    let (_, token) = fixture.signup("leaving@example.com", false).await;

    let (status, _) = fixture
        .send(Method::DELETE, "/api/accounts/me", Some(&token), None)
        .await;
    assert_eq!(status, 200);

    let (status, _) = fixture.get("/api/accounts/me", &token).await;
    assert_eq!(status, 401);
    let (status, _) = fixture.login("leaving@example.com", PASSWORD).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_project_crud() {
    let fixture = TestFixture::new().await;
    let (manager_id, manager) = fixture.signup("manager@example.com", true).await;
    let (_, developer) = fixture.signup("dev@example.com", false).await;

    let deadline = (Utc::now() + Duration::days(7)).to_rfc3339();

    // Role gate
    let (status, body) = fixture
        .post(
            "/api/projects",
            &developer,
            json!({ "name": "X", "scope": "Y", "deadline": deadline }),
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = fixture
        .post(
            "/api/projects",
            &manager,
            json!({
                "name": "X", "scope": "Y",
                "deadline": (Utc::now() - Duration::days(1)).to_rfc3339()
            }),
        )
        .await;
    assert_eq!(status, 400);

    let project_id = fixture.create_project(&manager, "Storefront").await;

    let (status, body) = fixture
        .get(&format!("/api/projects/{}", project_id), &manager)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["manager_id"], manager_id.as_str());
    assert_eq!(
        body["data"]["functional_requirements"][0],
        "The system shall support: Customers place orders"
    );
    assert_eq!(
        body["data"]["non_functional_requirements"]
            .as_array()
            .unwrap()
            .len(),
        3
    );

    let (status, body) = fixture
        .send(
            Method::PUT,
            &format!("/api/projects/{}", project_id),
            Some(&manager),
            Some(json!({ "name": "Storefront v2" })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["name"], "Storefront v2");
    assert_eq!(body["data"]["scope"], "Customers place orders. Staff ship them.");

    let (status, body) = fixture.get("/api/projects", &manager).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Not assigned yet
    let (status, body) = fixture.get("/api/projects", &developer).await;
    assert_eq!(status, 200);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = fixture
        .send(
            Method::DELETE,
            &format!("/api/projects/{}", project_id),
            Some(&manager),
            None,
        )
        .await;
    assert_eq!(status, 200);

    let (status, _) = fixture
        .get(&format!("/api/projects/{}", project_id), &manager)
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_foreign_projects_are_concealed() {
    let fixture = TestFixture::new().await;
    let (_, owner) = fixture.signup("owner@example.com", true).await;
    let (_, other) = fixture.signup("other@example.com", true).await;
    let project_id = fixture.create_project(&owner, "Private").await;

    let (status, body) = fixture
        .get(&format!("/api/projects/{}", project_id), &other)
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = fixture
        .send(
            Method::DELETE,
            &format!("/api/projects/{}", project_id),
            Some(&other),
            None,
        )
        .await;
    assert_eq!(status, 404);

    let (status, body) = fixture
        .send(
            Method::PUT,
            &format!("/api/projects/{}", project_id),
            Some(&other),
            Some(json!({ "name": "Taken over" })),
        )
        .await;
    assert_eq!(status, 404, "{}", body);

    // Still there, unchanged
    let (status, body) = fixture
        .get(&format!("/api/projects/{}", project_id), &owner)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["name"], "Private");
}

#[tokio::test]
async fn test_foreign_projects_are_forbidden_when_revealed() {
    let fixture = TestFixture::with_policy(OwnershipPolicy::Reveal).await;
    let (_, owner) = fixture.signup("owner@example.com", true).await;
    let (_, other) = fixture.signup("other@example.com", true).await;
    let project_id = fixture.create_project(&owner, "Private").await;

    let (status, body) = fixture
        .send(
            Method::PUT,
            &format!("/api/projects/{}", project_id),
            Some(&other),
            Some(json!({ "name": "Mine now" })),
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = fixture
        .send(
            Method::DELETE,
            &format!("/api/projects/{}", project_id),
            Some(&other),
            None,
        )
        .await;
    assert_eq!(status, 403);

    let (_, body) = fixture
        .get(&format!("/api/projects/{}", project_id), &owner)
        .await;
    assert_eq!(body["data"]["name"], "Private");

    let (status, _) = fixture
        .get("/api/projects/does-not-exist", &other)
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_project_developers_and_requirements() {
    let fixture = TestFixture::new().await;
    let (manager_id, manager) = fixture.signup("manager@example.com", true).await;
    let (developer_id, developer) = fixture.signup("dev@example.com", false).await;
    let project_id = fixture.create_project(&manager, "Storefront").await;

    // Only developer accounts can be assigned
    let (status, _) = fixture
        .post(
            &format!("/api/projects/{}/developers", project_id),
            &manager,
            json!({ "developer_ids": [manager_id] }),
        )
        .await;
    assert_eq!(status, 400);

    fixture
        .add_developers(&manager, &project_id, &[&developer_id])
        .await;

    let (status, body) = fixture.get("/api/projects", &developer).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["id"], project_id.as_str());

    let (status, body) = fixture
        .get(&format!("/api/projects/{}/developers", project_id), &developer)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["email"], "dev@example.com");

    // Developers can read but not edit
    let (status, _) = fixture
        .send(
            Method::PUT,
            &format!("/api/projects/{}/requirements", project_id),
            Some(&developer),
            Some(json!({ "functional_requirements": ["x"] })),
        )
        .await;
    assert_eq!(status, 403);

    let (status, body) = fixture
        .send(
            Method::PUT,
            &format!("/api/projects/{}/requirements", project_id),
            Some(&manager),
            Some(json!({ "functional_requirements": ["Orders can be refunded"] })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        body["data"]["edited_functional_requirements"],
        json!(["Orders can be refunded"])
    );
    assert!(body["data"].get("edited_non_functional_requirements").is_none());

    let (status, body) = fixture
        .post(
            &format!("/api/projects/{}/requirements/accept", project_id),
            &manager,
            json!({}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        body["data"]["edited_functional_requirements"],
        body["data"]["functional_requirements"]
    );

    let (status, body) = fixture
        .send(
            Method::DELETE,
            &format!("/api/projects/{}/developers/{}", project_id, developer_id),
            Some(&manager),
            None,
        )
        .await;
    assert_eq!(status, 200);
    assert!(body["data"]["developer_ids"].as_array().unwrap().is_empty());

    let (status, _) = fixture
        .get(&format!("/api/projects/{}", project_id), &developer)
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_task_crud() {
    let fixture = TestFixture::new().await;
    let (_, manager) = fixture.signup("manager@example.com", true).await;
    let (developer_id, developer) = fixture.signup("dev@example.com", false).await;
    let (outsider_id, _) = fixture.signup("outsider@example.com", false).await;
    let project_id = fixture.create_project(&manager, "Storefront").await;
    fixture
        .add_developers(&manager, &project_id, &[&developer_id])
        .await;

    // Assignees must be on the project
    let (status, _) = fixture
        .post(
            &format!("/api/projects/{}/tasks", project_id),
            &manager,
            json!({ "title": "T", "developer_ids": [outsider_id] }),
        )
        .await;
    assert_eq!(status, 400);

    // Inverted window
    let now = Utc::now();
    let (status, _) = fixture
        .post(
            &format!("/api/projects/{}/tasks", project_id),
            &manager,
            json!({
                "title": "T",
                "manager_start_time": now.to_rfc3339(),
                "manager_end_time": (now - Duration::hours(1)).to_rfc3339()
            }),
        )
        .await;
    assert_eq!(status, 400);

    let unassigned = fixture.create_task(&manager, &project_id, &[]).await;
    let (status, body) = fixture
        .get(&format!("/api/tasks/{}", unassigned), &manager)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "not_started");
    assert_eq!(body["data"]["display_status"], "pending");

    // Developers cannot see tasks they are not assigned to
    let (status, _) = fixture
        .get(&format!("/api/tasks/{}", unassigned), &developer)
        .await;
    assert_eq!(status, 404);

    let (status, body) = fixture
        .post(
            &format!("/api/tasks/{}/developers", unassigned),
            &manager,
            json!({ "developer_ids": [developer_id] }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["display_status"], "not_started");

    let (status, body) = fixture.get("/api/tasks", &developer).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = fixture
        .get(&format!("/api/projects/{}/tasks", project_id), &developer)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["id"], unassigned.as_str());

    // A manager edit of the status stamps start_time the first time
    let (status, body) = fixture
        .send(
            Method::PUT,
            &format!("/api/tasks/{}", unassigned),
            Some(&manager),
            Some(json!({ "title": "Renamed", "status": "in_progress" })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["title"], "Renamed");
    assert_eq!(body["data"]["status"], "in_progress");
    assert!(body["data"]["start_time"].is_string());

    let (status, body) = fixture
        .send(
            Method::DELETE,
            &format!("/api/tasks/{}/developers", unassigned),
            Some(&manager),
            Some(json!({ "developer_ids": [developer_id] })),
        )
        .await;
    assert_eq!(status, 200);
    assert!(body["data"]["developer_ids"].as_array().unwrap().is_empty());

    let (status, _) = fixture
        .send(
            Method::DELETE,
            &format!("/api/tasks/{}", unassigned),
            Some(&manager),
            None,
        )
        .await;
    assert_eq!(status, 200);
    let (status, _) = fixture
        .get(&format!("/api/tasks/{}", unassigned), &manager)
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_task_lifecycle() {
    let fixture = TestFixture::new().await;
    let setup = fixture.with_assigned_task().await;
    let task = setup.task_id.as_str();

    let (status, body) = fixture.transition(&setup.developer, task, "complete").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "TASK_NOT_STARTED");
    assert_eq!(body["error"]["message"], "Task is not in progress.");

    let (status, body) = fixture.transition(&setup.developer, task, "start").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["message"], "Task is now in progress.");
    assert_eq!(body["data"]["task"]["status"], "in_progress");
    let started_at = body["data"]["task"]["start_time"].clone();
    assert!(started_at.is_string());

    let (status, body) = fixture.transition(&setup.developer, task, "start").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "TASK_ALREADY_STARTED");

    let (status, body) = fixture.transition(&setup.developer, task, "restart").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "TASK_NOT_COMPLETED");

    let (status, body) = fixture.transition(&setup.developer, task, "complete").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["task"]["status"], "completed");
    assert_eq!(body["data"]["task"]["start_time"], started_at);
    assert!(body["data"]["task"]["end_time"].is_string());
    assert!(body["data"]["task"]["actual_time_spent_seconds"].is_i64());

    let (status, body) = fixture.transition(&setup.developer, task, "complete").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "TASK_ALREADY_COMPLETED");
    assert_eq!(body["error"]["message"], "Task is not in progress.");

    // The project manager may restart
    let (status, body) = fixture.transition(&setup.manager, task, "restart").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["task"]["status"], "in_progress");
    assert_eq!(body["data"]["task"]["display_status"], "reassigned");
    assert!(body["data"]["task"]["end_time"].is_null());
    assert_eq!(body["data"]["task"]["restart_count"], 1);

    let (status, body) = fixture.get("/api/metrics/me", &setup.developer).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["developer_id"], setup.developer_id.as_str());
    assert_eq!(body["data"]["tasks_completed"], 1);
    assert_eq!(body["data"]["tasks_reassigned"], 1);
}

#[tokio::test]
async fn test_concurrent_completes_have_one_winner() {
    let fixture = TestFixture::new().await;
    let setup = fixture.with_assigned_task().await;

    let (status, _) = fixture
        .transition(&setup.developer, &setup.task_id, "start")
        .await;
    assert_eq!(status, 200);

    let attempts = (0..6).map(|_| fixture.transition(&setup.developer, &setup.task_id, "complete"));
    let results = join_all(attempts).await;

    let winners = results.iter().filter(|(status, _)| *status == 200).count();
    assert_eq!(winners, 1, "responses: {:?}", results);

    for (status, body) in results.iter().filter(|(status, _)| *status != 200) {
        assert_eq!(*status, 400, "unexpected response: {}", body);
        let code = body["error"]["code"].as_str().unwrap();
        assert!(
            code == "TASK_ALREADY_COMPLETED" || code == "TASK_STATE_CHANGED",
            "unexpected code: {}",
            code
        );
    }

    let (_, body) = fixture.get("/api/metrics/me", &setup.developer).await;
    assert_eq!(body["data"]["tasks_completed"], 1);

    let (_, body) = fixture
        .get(&format!("/api/tasks/{}", setup.task_id), &setup.manager)
        .await;
    assert_eq!(body["data"]["status"], "completed");
}

#[tokio::test]
async fn test_lifecycle_visibility() {
    let fixture = TestFixture::new().await;
    let setup = fixture.with_assigned_task().await;
    let (_, stranger) = fixture.signup("stranger@example.com", false).await;

    // Only assignees start or complete
    let (status, _) = fixture
        .transition(&setup.manager, &setup.task_id, "start")
        .await;
    assert_eq!(status, 404);

    let (status, _) = fixture.transition(&stranger, &setup.task_id, "start").await;
    assert_eq!(status, 404);

    let (status, _) = fixture.transition(&setup.developer, "no-such-task", "start").await;
    assert_eq!(status, 404);

    // Failed attempts leave the task untouched
    let (_, body) = fixture
        .get(&format!("/api/tasks/{}", setup.task_id), &setup.manager)
        .await;
    assert_eq!(body["data"]["status"], "not_started");
    assert!(body["data"]["start_time"].is_null());
}

#[tokio::test]
async fn test_review_reports_late_delivery() {
    let fixture = TestFixture::new().await;
    let setup = fixture.with_assigned_task().await;

    fixture
        .transition(&setup.developer, &setup.task_id, "start")
        .await;
    fixture
        .transition(&setup.developer, &setup.task_id, "complete")
        .await;

    let t0 = Utc::now() - Duration::days(1);
    fixture
        .set_task_times(
            &setup.task_id,
            t0,
            t0 + Duration::hours(3),
            Some(t0),
            Some(t0 + Duration::hours(2)),
        )
        .await;

    let review_path = format!("/api/tasks/{}/review", setup.task_id);

    let (status, _) = fixture.get(&review_path, &setup.developer).await;
    assert_eq!(status, 403);

    let (status, body) = fixture.get(&review_path, &setup.manager).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["delivery_status"], "late");
    assert_eq!(body["data"]["time_taken"], "0 days, 3 hours, 0 minutes");
    assert_eq!(body["data"]["allocated_time"], "0 days, 2 hours, 0 minutes");
    assert_eq!(body["data"]["time_difference"], "0 days, 1 hours, 0 minutes");

    let (_, body) = fixture.get("/api/metrics/me", &setup.developer).await;
    assert_eq!(body["data"]["average_completion_time"], 5400.0);
    assert_eq!(body["data"]["total_delivery_time"], 10800);
    assert_eq!(body["data"]["total_allocated_time"], 7200);
    assert_eq!(body["data"]["tasks_completed"], 1);
}

#[tokio::test]
async fn test_review_requires_complete_data() {
    let fixture = TestFixture::new().await;
    let setup = fixture.with_assigned_task().await;
    let review_path = format!("/api/tasks/{}/review", setup.task_id);

    let (status, body) = fixture.get(&review_path, &setup.manager).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "TASK_NOT_COMPLETED");

    fixture
        .transition(&setup.developer, &setup.task_id, "start")
        .await;
    fixture
        .transition(&setup.developer, &setup.task_id, "complete")
        .await;

    // No manager window was set
    let (status, body) = fixture.get(&review_path, &setup.manager).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("manager_start_time"));
}

#[tokio::test]
async fn test_developer_ratings() {
    let fixture = TestFixture::new().await;
    let setup = fixture.with_assigned_task().await;
    let second = fixture
        .create_task(&setup.manager, &setup.project_id, &[&setup.developer_id])
        .await;

    let t0 = Utc::now() - Duration::days(2);
    for (task_id, hours) in [(setup.task_id.as_str(), 1), (second.as_str(), 3)] {
        fixture.transition(&setup.developer, task_id, "start").await;
        fixture
            .transition(&setup.developer, task_id, "complete")
            .await;
        fixture
            .set_task_times(
                task_id,
                t0,
                t0 + Duration::hours(hours),
                Some(t0),
                Some(t0 + Duration::hours(2)),
            )
            .await;
    }

    let (status, _) = fixture
        .get("/api/metrics/developers", &setup.developer)
        .await;
    assert_eq!(status, 403);

    let (status, body) = fixture
        .get("/api/metrics/developers", &setup.manager)
        .await;
    assert_eq!(status, 200);
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["developer"], "dev@example.com");
    assert_eq!(rows[0]["tasks_completed"], 2);
    assert_eq!(rows[0]["tasks_reassigned"], 0);
    assert_eq!(rows[0]["average_completion_time"], "2 hours, 0 minutes");
    assert_eq!(rows[0]["average_delivery_status"], "on time");
    assert_eq!(rows[0]["rating"], 4.5);

    // Another manager sees nobody
    let (_, other) = fixture.signup("other@example.com", true).await;
    let (_, body) = fixture.get("/api/metrics/developers", &other).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_assignment_notifies_developer() {
    let fixture = TestFixture::new().await;
    let (_, manager) = fixture.signup("manager@example.com", true).await;
    let (developer_id, _) = fixture.signup("dev@example.com", false).await;
    let project_id = fixture.create_project(&manager, "Storefront").await;

    let mut inbox = fixture.notifications.subscribe(&developer_id);
    fixture
        .add_developers(&manager, &project_id, &[&developer_id])
        .await;

    let notification =
        tokio::time::timeout(tokio::time::Duration::from_secs(2), inbox.recv())
            .await
            .expect("no notification within timeout")
            .unwrap();
    assert_eq!(notification.recipient_id, developer_id);
    assert!(notification.message.contains("Storefront"));

    // Re-adding is not a new assignment
    fixture
        .add_developers(&manager, &project_id, &[&developer_id])
        .await;
    assert!(inbox.try_recv().is_err());
}

#[tokio::test]
async fn test_todos_are_private() {
    let fixture = TestFixture::new().await;
    let (_, owner) = fixture.signup("owner@example.com", false).await;
    let (_, other) = fixture.signup("other@example.com", false).await;

    let (status, body) = fixture
        .post("/api/todos", &owner, json!({ "title": "Write tests" }))
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["data"]["completed"], false);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = fixture
        .post("/api/todos", &owner, json!({ "title": "  " }))
        .await;
    assert_eq!(status, 400);

    let (status, body) = fixture
        .send(
            Method::PUT,
            &format!("/api/todos/{}", id),
            Some(&owner),
            Some(json!({ "completed": true })),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["completed"], true);
    assert_eq!(body["data"]["title"], "Write tests");

    let (status, _) = fixture.get(&format!("/api/todos/{}", id), &other).await;
    assert_eq!(status, 404);
    let (_, body) = fixture.get("/api/todos", &other).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (_, body) = fixture.get("/api/todos", &owner).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = fixture
        .send(Method::DELETE, &format!("/api/todos/{}", id), Some(&other), None)
        .await;
    assert_eq!(status, 404);
    let (status, _) = fixture
        .send(Method::DELETE, &format!("/api/todos/{}", id), Some(&owner), None)
        .await;
    assert_eq!(status, 200);
}
