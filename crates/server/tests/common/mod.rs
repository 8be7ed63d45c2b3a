//! Common test utilities for API testing.
//!
//! This module provides a test fixture that builds the full router in-process
//! over a temporary database, so API tests need no running server.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use assetlog_core::config::{AuthConfig, DatabaseConfig, HistoryConfig, ServerConfig};
use assetlog_core::{
    create_audit_system, create_authenticator, AuditStore, AuthMethod, Config, HistoryService,
    SqliteAuditStore, SqliteHistoryStore,
};

/// Re-export fixtures for test convenience
pub use assetlog_core::testing::fixtures;

/// Secret used when a fixture runs with JWT auth.
pub const JWT_SECRET: &str = "test-secret-test-secret-test-sec";

/// Key used when a fixture runs with API key auth.
pub const API_KEY: &str = "test-api-key";

/// Test fixture for in-process API testing.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_history_creation() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/histories", json!({
///         "category": "CCTV", "branch": "BJM", "parent_id": "CAM-01"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Temporary directory holding the test database
    pub temp_dir: TempDir,
    /// Value sent as `Authorization` on every request, if any
    authorization: Option<String>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a fixture with authentication disabled.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            auth: AuthConfig {
                method: test_config.auth_method,
                api_key: Some(API_KEY.to_string()),
                jwt_secret: Some(JWT_SECRET.to_string()),
                jwt_issuer: None,
            },
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: db_path.clone(),
                timeout_ms: 5000,
            },
            history: HistoryConfig {
                delete_window_hours: test_config.delete_window_hours,
            },
        };

        let authenticator = Arc::from(
            create_authenticator(&config.auth).expect("Failed to create authenticator"),
        );

        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );
        let history_store = Arc::new(
            SqliteHistoryStore::new(&db_path).expect("Failed to create history store"),
        );

        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let history = HistoryService::new(history_store).with_audit(audit_handle);

        let state = Arc::new(assetlog_server::state::AppState::new(
            config,
            authenticator,
            history,
            audit_store,
        ));
        let router = assetlog_server::api::create_router(state);

        Self {
            router,
            temp_dir,
            authorization: None,
        }
    }

    /// Send every following request with `Authorization: Bearer <token>`.
    pub fn with_bearer(mut self, token: &str) -> Self {
        self.authorization = Some(format!("Bearer {}", token));
        self
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Create a ticket through the API and return its JSON.
    pub async fn create_history(&self, branch: &str, category: &str, parent_id: &str) -> Value {
        let response = self
            .post(
                "/api/v1/histories",
                json!({
                    "category": category,
                    "branch": branch,
                    "parent_id": parent_id,
                    "parent_name": format!("{} unit", parent_id),
                    "status": "down",
                    "problem": "no video signal",
                    "created_by": "Ari Setiawan",
                    "created_by_id": "u-ari"
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body
    }

    /// Edit a ticket using the fence from `current`.
    pub async fn edit_history(&self, current: &Value, complete_status: i32, by: &str) -> TestResponse {
        let id = current["id"].as_str().expect("history id");
        self.put(
            &format!("/api/v1/histories/{}", id),
            json!({
                "branch": current["branch"],
                "updated_at": current["updated_at"],
                "status": "down",
                "problem": "no video signal",
                "problem_resolve": format!("moved to {}", complete_status),
                "complete_status": complete_status,
                "updated_by": by,
                "updated_by_id": format!("u-{}", by.to_lowercase().replace(' ', "-"))
            }),
        )
        .await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        if let Some(ref authorization) = self.authorization {
            request_builder = request_builder.header("Authorization", authorization);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub auth_method: AuthMethod,
    pub delete_window_hours: u32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            auth_method: AuthMethod::None,
            delete_window_hours: 24,
        }
    }
}

impl TestConfig {
    /// Create config with JWT authentication.
    pub fn with_jwt() -> Self {
        Self {
            auth_method: AuthMethod::Jwt,
            ..Default::default()
        }
    }

    /// Create config with API key authentication.
    pub fn with_api_key() -> Self {
        Self {
            auth_method: AuthMethod::ApiKey,
            ..Default::default()
        }
    }
}

/// Sign a token for `sub` with the fixture secret.
pub fn jwt_token(sub: &str, name: &str, roles: &[&str]) -> String {
    let claims = json!({
        "sub": sub,
        "name": name,
        "roles": roles,
        "exp": chrono::Utc::now().timestamp() + 600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign token")
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
