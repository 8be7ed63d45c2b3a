//! History lifecycle integration tests.
//!
//! These tests drive the history service against a file-backed store:
//! - Optimistic fence under concurrent editors
//! - Terminal stages refusing edits
//! - Report buckets built from real edit history
//! - Audit events reaching the audit store

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use assetlog_core::{
    create_audit_system, AuditFilter, AuditStore, CompleteStatus, FilterSpec, HistoryError,
    HistoryService, SqliteAuditStore, SqliteHistoryStore,
    testing::fixtures,
};

/// Test helper wiring a service to on-disk stores.
struct TestHarness {
    service: HistoryService,
    audit_store: Arc<SqliteAuditStore>,
    writer: tokio::task::JoinHandle<()>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("assetlog.db");

        let store = Arc::new(
            SqliteHistoryStore::new(&db_path).expect("Failed to create history store"),
        );
        let audit_store = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );
        let (audit, writer) =
            create_audit_system(Arc::clone(&audit_store) as Arc<dyn AuditStore>, 64);

        let service = HistoryService::new(store).with_audit(audit);

        Self {
            service,
            audit_store,
            writer: tokio::spawn(writer.run()),
            _temp_dir: temp_dir,
        }
    }

    /// Drop the service (and its audit handle) and wait for pending audit writes.
    async fn finish(self) -> (Arc<SqliteAuditStore>, TempDir) {
        drop(self.service);
        tokio::time::timeout(Duration::from_secs(5), self.writer)
            .await
            .expect("audit writer did not stop")
            .expect("audit writer panicked");
        (self.audit_store, self._temp_dir)
    }
}

#[tokio::test]
async fn test_concurrent_editors_share_one_fence() {
    let harness = TestHarness::new();
    let record = harness
        .service
        .create(fixtures::create_request("BJM", "CCTV", "CAM-01"))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..6 {
        let service = harness.service.clone();
        let id = record.id.clone();
        let fence = record.updated_at;
        tasks.push(tokio::spawn(async move {
            let mut edit = fixtures::edit(CompleteStatus::Progress);
            edit.problem_resolve = format!("attempt {}", i);
            service.edit(&id, edit, "BJM", fence).await
        }));
    }

    let mut successes = 0;
    let mut fenced = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(HistoryError::Fenced { .. }) => fenced += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(fenced, 5);

    // A loser re-fetches and retries with the fresh fence.
    let current = harness.service.get(&record.id, "BJM").await.unwrap();
    assert_eq!(current.updates.len(), 2);
    let retried = harness
        .service
        .edit(
            &record.id,
            fixtures::edit(CompleteStatus::Pending),
            "BJM",
            current.updated_at,
        )
        .await
        .unwrap();
    assert_eq!(retried.updates.len(), 3);

    harness.finish().await;
}

#[tokio::test]
async fn test_closed_ticket_refuses_edits() {
    let harness = TestHarness::new();
    let record = harness
        .service
        .create(fixtures::create_request("SMD", "UPS", "UPS-07"))
        .await
        .unwrap();

    let closed = harness
        .service
        .edit(
            &record.id,
            fixtures::edit(CompleteStatus::Info),
            "SMD",
            record.updated_at,
        )
        .await
        .unwrap();

    let result = harness
        .service
        .edit(
            &record.id,
            fixtures::edit(CompleteStatus::Progress),
            "SMD",
            closed.updated_at,
        )
        .await;
    assert!(matches!(result, Err(HistoryError::Fenced { .. })));

    let stored = harness.service.get(&record.id, "").await.unwrap();
    assert_eq!(stored.complete_status, CompleteStatus::Info);
    assert_eq!(stored, closed);

    harness.finish().await;
}

#[tokio::test]
async fn test_period_report_from_edit_history() {
    let harness = TestHarness::new();
    let service = &harness.service;

    // Opened by "Ari Setiawan", parked by "Ari C", closed by "Budi".
    let record = service
        .create(fixtures::create_request("BJM", "CCTV", "CAM-01"))
        .await
        .unwrap();
    let mut parked = fixtures::edit(CompleteStatus::Pending);
    parked.updated_by = "Ari C".to_string();
    let parked = service
        .edit(&record.id, parked, "BJM", record.updated_at)
        .await
        .unwrap();
    let mut closing = fixtures::edit(CompleteStatus::Complete);
    closing.updated_by = "Budi".to_string();
    service
        .edit(&record.id, closing, "BJM", parked.updated_at)
        .await
        .unwrap();

    // A maintenance ticket never shows up in period reports.
    let mut maintenance = fixtures::create_request("BJM", "CCTV", "CAM-02");
    maintenance.status = "MAINTENANCE".to_string();
    service.create(maintenance).await.unwrap();

    let report = service
        .period_report(FilterSpec::new().with_branch("bjm"), None)
        .await
        .unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report.complete.len(), 1);
    assert_eq!(report.complete[0].contributors, "Ari > Budi");
    assert_eq!(report.complete[0].history.id, record.id);

    // Cut off before anything happened: nothing to report.
    let before = record.created_at - chrono::Duration::seconds(1);
    let early = service
        .period_report(FilterSpec::new(), Some(before))
        .await
        .unwrap();
    assert!(early.is_empty());

    harness.finish().await;
}

#[tokio::test]
async fn test_delete_window() {
    let harness = TestHarness::new();
    let record = harness
        .service
        .create(fixtures::create_request("BJM", "CCTV", "CAM-01"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let expired = harness
        .service
        .delete(&record.id, "BJM", chrono::Duration::zero(), "admin")
        .await;
    assert!(matches!(expired, Err(HistoryError::NotFound(_))));

    harness
        .service
        .delete(&record.id, "BJM", chrono::Duration::hours(24), "admin")
        .await
        .unwrap();
    let gone = harness.service.get(&record.id, "").await;
    assert!(matches!(gone, Err(HistoryError::NotFound(_))));

    harness.finish().await;
}

#[tokio::test]
async fn test_mutations_are_audited() {
    let harness = TestHarness::new();
    let record = harness
        .service
        .create(fixtures::create_request("BJM", "CCTV", "CAM-01"))
        .await
        .unwrap();
    harness
        .service
        .edit(
            &record.id,
            fixtures::edit(CompleteStatus::Complete),
            "BJM",
            record.updated_at,
        )
        .await
        .unwrap();

    let history_id = record.id.clone();
    let (audit_store, _temp_dir) = harness.finish().await;

    let records = audit_store
        .query(&AuditFilter::new().with_history_id(history_id))
        .unwrap();
    assert_eq!(records.len(), 2);
    let mut types: Vec<_> = records.iter().map(|r| r.event_type.as_str()).collect();
    types.sort();
    assert_eq!(types, vec!["history_created", "history_edited"]);

    let by_budi = audit_store
        .count(&AuditFilter::new().with_user_id("u-budi"))
        .unwrap();
    assert_eq!(by_budi, 1);
}
