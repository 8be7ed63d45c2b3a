//! History API tests.
//!
//! Exercise the HTTP surface in-process:
//! - CRUD with branch upper-casing and the edit fence
//! - Status mapping (400, 403, 404, 409)
//! - Listings, summary and reports
//! - Role checks under JWT authentication

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use common::{jwt_token, TestConfig, TestFixture, API_KEY};

#[tokio::test]
async fn test_create_and_get_history() {
    let fixture = TestFixture::new().await;

    let created = fixture.create_history("bjm", "cctv", "CAM-01").await;
    assert_json_path!(created, "branch", json!("BJM"));
    assert_json_path!(created, "category", json!("CCTV"));
    assert_json_path!(created, "complete_status", json!(0));
    assert_json_path!(created, "created_by_id", json!("u-ari"));
    assert_json_path!(created, "tag", json!([]));
    assert_eq!(created["updates"].as_array().unwrap().len(), 1);

    let id = created["id"].as_str().unwrap();
    let response = fixture.get(&format!("/api/v1/histories/{}?branch=bjm", id)).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body, created);

    let wrong_branch = fixture.get(&format!("/api/v1/histories/{}?branch=SMD", id)).await;
    assert_status!(wrong_branch, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_requires_branch() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/histories",
            json!({ "category": "CCTV", "branch": " ", "parent_id": "CAM-01" }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("branch"));
}

#[tokio::test]
async fn test_create_rejects_unknown_stage() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/histories",
            json!({
                "category": "CCTV",
                "branch": "BJM",
                "parent_id": "CAM-01",
                "complete_status": 42
            }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("complete_status"));
}

#[tokio::test]
async fn test_edit_rejects_unknown_stage() {
    let fixture = TestFixture::new().await;
    let created = fixture.create_history("BJM", "CCTV", "CAM-01").await;

    let response = fixture
        .put(
            &format!("/api/v1/histories/{}", created["id"].as_str().unwrap()),
            json!({
                "branch": "BJM",
                "updated_at": created["updated_at"],
                "complete_status": 42,
                "updated_by": "Budi",
                "updated_by_id": "u-budi"
            }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());

    // The ticket is untouched and the fence still holds.
    let response = fixture.edit_history(&created, 3, "Budi").await;
    assert_status!(response, StatusCode::OK);
}

#[tokio::test]
async fn test_edit_fence() {
    let fixture = TestFixture::new().await;
    let created = fixture.create_history("BJM", "CCTV", "CAM-01").await;

    let first = fixture.edit_history(&created, 2, "Budi Santoso").await;
    assert_status!(first, StatusCode::OK);
    assert_json_path!(first.body, "complete_status", json!(2));
    assert_json_path!(first.body, "updated_by_id", json!("u-budi-santoso"));
    assert_eq!(first.body["updates"].as_array().unwrap().len(), 2);

    // Same fence again: the ticket moved on.
    let stale = fixture.edit_history(&created, 0, "Citra").await;
    assert_status!(stale, StatusCode::CONFLICT);
    assert!(stale.body["error"]
        .as_str()
        .unwrap()
        .contains("re-fetch and retry"));

    let retried = fixture.edit_history(&first.body, 0, "Citra").await;
    assert_status!(retried, StatusCode::OK);
    assert_eq!(retried.body["updates"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_closed_history_is_immutable() {
    let fixture = TestFixture::new().await;
    let created = fixture.create_history("BJM", "CCTV", "CAM-01").await;

    let closed = fixture.edit_history(&created, 3, "Budi").await;
    assert_status!(closed, StatusCode::OK);

    let reopened = fixture.edit_history(&closed.body, 0, "Budi").await;
    assert_status!(reopened, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_edit_with_wrong_branch_is_fenced() {
    let fixture = TestFixture::new().await;
    let mut created = fixture.create_history("BJM", "CCTV", "CAM-01").await;
    created["branch"] = json!("SMD");

    let response = fixture.edit_history(&created, 2, "Budi").await;
    assert_status!(response, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_history() {
    let fixture = TestFixture::new().await;
    let created = fixture.create_history("BJM", "CCTV", "CAM-01").await;
    let id = created["id"].as_str().unwrap();

    let wrong_branch = fixture
        .delete(&format!("/api/v1/histories/{}?branch=SMD", id))
        .await;
    assert_status!(wrong_branch, StatusCode::NOT_FOUND);

    let response = fixture
        .delete(&format!("/api/v1/histories/{}?branch=BJM", id))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "id", json!(id));

    let gone = fixture.get(&format!("/api/v1/histories/{}", id)).await;
    assert_status!(gone, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_outside_window() {
    let fixture = TestFixture::with_config(TestConfig {
        delete_window_hours: 0,
        ..Default::default()
    })
    .await;
    let created = fixture.create_history("BJM", "CCTV", "CAM-01").await;
    let id = created["id"].as_str().unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let response = fixture
        .delete(&format!("/api/v1/histories/{}?branch=BJM", id))
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_image() {
    let fixture = TestFixture::new().await;
    let created = fixture.create_history("BJM", "CCTV", "CAM-01").await;
    let id = created["id"].as_str().unwrap();

    let response = fixture
        .put(
            &format!("/api/v1/histories/{}/image", id),
            json!({ "branch": "BJM", "image": "uploads/cam-01.jpg" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "image", json!("uploads/cam-01.jpg"));
    assert_json_path!(response.body, "updated_at", created["updated_at"].clone());

    let missing_image = fixture
        .put(
            &format!("/api/v1/histories/{}/image", id),
            json!({ "branch": "BJM", "image": "" }),
        )
        .await;
    assert_status!(missing_image, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_histories_filters() {
    let fixture = TestFixture::new().await;
    let cam = fixture.create_history("BJM", "CCTV", "CAM-01").await;
    fixture.create_history("BJM", "UPS", "UPS-01").await;
    fixture.create_history("SMD", "CCTV", "CAM-09").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let parked = fixture.edit_history(&cam, 2, "Budi").await;
    assert_status!(parked, StatusCode::OK);

    let all = fixture.get("/api/v1/histories").await;
    assert_status!(all, StatusCode::OK);
    assert_json_path!(all.body, "count", json!(3));

    let bjm_cctv = fixture
        .get("/api/v1/histories?branch=bjm&category=cctv")
        .await;
    assert_json_path!(bjm_cctv.body, "count", json!(1));

    let pending = fixture.get("/api/v1/histories?complete_status=2,1").await;
    assert_json_path!(pending.body, "count", json!(1));
    assert_eq!(pending.body["histories"][0]["id"], cam["id"]);

    let limited = fixture.get("/api/v1/histories?limit=2").await;
    assert_json_path!(limited.body, "count", json!(2));
    // Most recently updated first
    assert_eq!(limited.body["histories"][0]["id"], cam["id"]);

    let bad = fixture.get("/api/v1/histories?complete_status=7").await;
    assert_status!(bad, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_for_parent_and_user() {
    let fixture = TestFixture::new().await;
    let first = fixture.create_history("BJM", "CCTV", "CAM-01").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = fixture.create_history("BJM", "CCTV", "CAM-01").await;
    fixture.create_history("BJM", "CCTV", "CAM-02").await;

    let by_parent = fixture.get("/api/v1/histories/parent/CAM-01").await;
    assert_status!(by_parent, StatusCode::OK);
    assert_json_path!(by_parent.body, "count", json!(2));
    assert_eq!(by_parent.body["histories"][0]["id"], second["id"]);

    let edited = fixture.edit_history(&first, 2, "Budi").await;
    assert_status!(edited, StatusCode::OK);

    let by_budi = fixture.get("/api/v1/histories/user/u-budi").await;
    assert_json_path!(by_budi.body, "count", json!(1));
    assert_eq!(by_budi.body["histories"][0]["id"], first["id"]);

    let by_ari = fixture.get("/api/v1/histories/user/u-ari?branch=BJM").await;
    assert_json_path!(by_ari.body, "count", json!(3));
}

#[tokio::test]
async fn test_summary() {
    let fixture = TestFixture::new().await;
    fixture.create_history("BJM", "CCTV", "CAM-01").await;
    fixture.create_history("BJM", "UPS", "UPS-01").await;
    fixture.create_history("SMD", "CCTV", "CAM-09").await;

    let response = fixture
        .get("/api/v1/histories/summary?complete_status=0")
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "total", json!(3));
    assert_json_path!(response.body, "label", json!("Progress"));
    assert_eq!(response.body["branches"][0]["branch"], "BJM");
    assert_eq!(response.body["branches"][0]["count"], 2);

    let one_branch = fixture
        .get("/api/v1/histories/summary?complete_status=0&branch=smd")
        .await;
    assert_json_path!(one_branch.body, "total", json!(1));

    let missing = fixture.get("/api/v1/histories/summary").await;
    assert_status!(missing, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reports() {
    let fixture = TestFixture::new().await;

    // Opened by Ari Setiawan, parked by Ari C, closed by Budi.
    let cam = fixture.create_history("BJM", "CCTV", "CAM-01").await;
    let parked = fixture.edit_history(&cam, 2, "Ari C").await;
    let closed = fixture.edit_history(&parked.body, 3, "Budi").await;
    assert_status!(closed, StatusCode::OK);

    fixture.create_history("BJM", "UPS", "UPS-01").await;

    let period = fixture.get("/api/v1/reports/period?branch=BJM").await;
    assert_status!(period, StatusCode::OK);
    assert_eq!(period.body["complete"].as_array().unwrap().len(), 1);
    assert_eq!(period.body["progress"].as_array().unwrap().len(), 1);
    assert_eq!(period.body["pending"].as_array().unwrap().len(), 0);
    assert_json_path!(period.body["complete"][0], "contributors", json!("Ari > Budi"));
    assert!(period.body["complete"][0]["elapsed_secs"].is_null());

    let monthly = fixture.get("/api/v1/reports/monthly").await;
    assert_status!(monthly, StatusCode::OK);
    assert!(monthly.body["complete"][0]["elapsed_secs"].as_i64().unwrap() >= 0);

    let vendor = fixture.get("/api/v1/reports/vendor").await;
    assert_status!(vendor, StatusCode::OK);
    assert_eq!(vendor.body["complete"].as_array().unwrap().len(), 0);
    assert_eq!(vendor.body["progress"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_audit_records_mutations() {
    let fixture = TestFixture::new().await;
    let created = fixture.create_history("BJM", "CCTV", "CAM-01").await;
    let id = created["id"].as_str().unwrap();

    // The audit writer runs in the background.
    let mut total = 0;
    for _ in 0..50 {
        let response = fixture
            .get(&format!("/api/v1/audit?history_id={}", id))
            .await;
        assert_status!(response, StatusCode::OK);
        total = response.body["total"].as_i64().unwrap();
        if total > 0 {
            assert_json_path!(response.body["events"][0], "event_type", json!("history_created"));
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key()).await;

    // Health needs no credentials.
    let health = fixture.get("/api/v1/health").await;
    assert_status!(health, StatusCode::OK);
    assert_json_path!(health.body, "status", json!("ok"));

    let (status, text) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("assetlog_histories_by_stage"));
}

#[tokio::test]
async fn test_api_key_required() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key()).await;
    let response = fixture.get("/api/v1/histories").await;
    assert_status!(response, StatusCode::UNAUTHORIZED);

    let fixture = fixture.with_bearer(API_KEY);
    let response = fixture.get("/api/v1/histories").await;
    assert_status!(response, StatusCode::OK);
}

#[tokio::test]
async fn test_jwt_identity_is_recorded() {
    let fixture = TestFixture::with_config(TestConfig::with_jwt())
        .await
        .with_bearer(&jwt_token("u-dewi", "Dewi Lestari", &["technician"]));

    // Claimed creator is ignored once authentication is on.
    let created = fixture.create_history("BJM", "CCTV", "CAM-01").await;
    assert_json_path!(created, "created_by_id", json!("u-dewi"));
    assert_json_path!(created, "created_by", json!("Dewi Lestari"));
}

#[tokio::test]
async fn test_delete_requires_admin_role() {
    let technician = TestFixture::with_config(TestConfig::with_jwt())
        .await
        .with_bearer(&jwt_token("u-dewi", "Dewi Lestari", &["technician"]));
    let created = technician.create_history("BJM", "CCTV", "CAM-01").await;
    let path = format!("/api/v1/histories/{}?branch=BJM", created["id"].as_str().unwrap());

    let forbidden = technician.delete(&path).await;
    assert_status!(forbidden, StatusCode::FORBIDDEN);

    let admin = technician.with_bearer(&jwt_token("u-admin", "Admin", &["admin"]));
    let response = admin.delete(&path).await;
    assert_status!(response, StatusCode::OK);
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let fixture = TestFixture::with_config(TestConfig::with_jwt()).await;
    let claims = json!({ "sub": "u-dewi", "exp": chrono::Utc::now().timestamp() - 3600 });
    let expired = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(common::JWT_SECRET.as_bytes()),
    )
    .unwrap();

    let fixture = fixture.with_bearer(&expired);
    let response = fixture.get("/api/v1/histories").await;
    assert_status!(response, StatusCode::UNAUTHORIZED);
}
