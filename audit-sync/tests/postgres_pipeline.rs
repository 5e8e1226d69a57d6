use std::collections::HashSet;
use std::time::Duration;

use audit_sync::pipeline::Pipeline;
use audit_sync::sink::memory::MemorySink;
use audit_sync::store::SourceStore;
use audit_sync::test_utils::database::{source_store, spawn_source_database};
use audit_sync::test_utils::test_sink_wrapper::TestSinkWrapper;
use audit_sync::types::Operation;
use chrono::{Duration as ChronoDuration, Utc};
use config::shared::{DocumentIdPolicy, PipelineConfig, ReclaimPolicy};
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn audit_rows_are_written_once_claimed() {
    init_test_tracing();
    let database = spawn_source_database().await;
    let now = Utc::now();

    let mut ids = Vec::new();
    for i in 0..25 {
        let id = database
            .insert_audit_log(
                "orders",
                "INSERT",
                None,
                Some(&format!(r#"{{"id": {i}}}"#)),
                now - ChronoDuration::seconds(100 - i),
            )
            .await;
        ids.push(id);
    }

    let store = source_store(&database, ReclaimPolicy::CreatedAt);
    let sink = TestSinkWrapper::wrap(MemorySink::new());
    let config = PipelineConfig {
        batch_size: 4,
        workers: 3,
        poll_interval_ms: 20,
        document_id_policy: DocumentIdPolicy::SourceId,
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::new(config, store, sink.clone());

    let written = sink.wait_for_records(25).await;
    pipeline.start().await.unwrap();
    written.notified().await;

    pipeline.shutdown_and_wait().await.unwrap();

    let records = sink.records().await;
    assert_eq!(records.len(), 25);
    assert!(records.iter().all(|r| r.operation == Operation::Insert));
    assert!(records.iter().all(|r| r.old_data.is_none()));

    let document_ids: HashSet<String> = records
        .iter()
        .filter_map(|r| r.document_id.clone())
        .collect();
    let expected: HashSet<String> = ids.iter().map(|id| id.to_string()).collect();
    assert_eq!(document_ids, expected);

    assert_eq!(database.count_claimed().await, 25);
}

#[tokio::test(flavor = "multi_thread")]
async fn stores_on_one_table_never_share_a_row() {
    init_test_tracing();
    let database = spawn_source_database().await;
    let now = Utc::now();

    for i in 0..60 {
        database
            .insert_audit_log(
                "users",
                "UPDATE",
                Some(r#"{"v": 1}"#),
                Some(r#"{"v": 2}"#),
                now - ChronoDuration::milliseconds(i),
            )
            .await;
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = source_store(&database, ReclaimPolicy::CreatedAt);
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            loop {
                let batch = store.claim_batch(7).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                ids.extend(batch.into_iter().map(|record| record.id));
            }
            ids
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id), "row {id} was claimed twice");
        }
    }

    assert_eq!(seen.len(), 60);
}

#[tokio::test(flavor = "multi_thread")]
async fn reclaim_returns_rows_to_the_claimable_pool() {
    init_test_tracing();
    let database = spawn_source_database().await;

    let id = database
        .insert_audit_log(
            "users",
            "DELETE",
            Some(r#"{"id": 1}"#),
            None,
            Utc::now() - ChronoDuration::minutes(30),
        )
        .await;

    let store = source_store(&database, ReclaimPolicy::ClaimedAt);
    let claimed = store.claim_batch(10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert!(store.claim_batch(10).await.unwrap().is_empty());

    // Claimed just now, so a ten minute age leaves it alone.
    assert_eq!(
        store.reclaim_stale(Duration::from_secs(600)).await.unwrap(),
        0
    );

    assert_eq!(store.reclaim_stale(Duration::ZERO).await.unwrap(), 1);

    let row = database.get_audit_log(id).await;
    assert!(!row.claimed);
    assert!(row.claimed_at.is_none());

    let reclaimed = store.claim_batch(10).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, id);
    assert_eq!(reclaimed[0].operation, Operation::Delete);
}
