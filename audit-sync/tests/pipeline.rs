use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use audit_sync::error::SyncResult;
use audit_sync::pipeline::Pipeline;
use audit_sync::sink::memory::MemorySink;
use audit_sync::store::SourceStore;
use audit_sync::store::memory::MemorySourceStore;
use audit_sync::test_utils::notify::TimedNotify;
use audit_sync::test_utils::test_sink_wrapper::TestSinkWrapper;
use audit_sync::test_utils::test_store_wrapper::TestStoreWrapper;
use audit_sync::types::{Batch, Operation};
use chrono::{DateTime, TimeZone, Utc};
use config::shared::{DocumentIdPolicy, PipelineConfig, ReclaimPolicy};
use telemetry::init_test_tracing;
use tokio::sync::{Notify, Semaphore};
use tokio::time::sleep;

fn pipeline_config(batch_size: usize, workers: u16, queue_capacity: usize) -> PipelineConfig {
    PipelineConfig {
        batch_size,
        workers,
        queue_capacity: Some(queue_capacity),
        poll_interval_ms: 10,
        ..PipelineConfig::default()
    }
}

fn at_second(second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap()
}

/// Store whose claims wait until [`GatedStore::open`] is called.
#[derive(Clone)]
struct GatedStore {
    store: MemorySourceStore,
    gate: Arc<Semaphore>,
    claim_started: Arc<Notify>,
}

impl GatedStore {
    fn wrap(store: MemorySourceStore) -> Self {
        Self {
            store,
            gate: Arc::new(Semaphore::new(0)),
            claim_started: Arc::new(Notify::new()),
        }
    }

    fn claim_started(&self) -> TimedNotify {
        TimedNotify::new(self.claim_started.clone())
    }

    fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

impl SourceStore for GatedStore {
    async fn claim_batch(&self, limit: usize) -> SyncResult<Batch> {
        self.claim_started.notify_one();
        let _permit = self.gate.acquire().await;

        self.store.claim_batch(limit).await
    }

    async fn reclaim_stale(&self, age: Duration) -> SyncResult<u64> {
        self.store.reclaim_stale(age).await
    }
}

async fn insert_records(store: &MemorySourceStore, count: u32) -> Vec<i64> {
    let mut ids = Vec::new();
    for i in 0..count {
        let after = format!(r#"{{"n":{i}}}"#);
        let id = store
            .insert(
                "orders",
                Operation::Insert,
                None,
                Some(&after),
                at_second(i),
            )
            .await;
        ids.push(id);
    }

    ids
}

#[tokio::test(flavor = "multi_thread")]
async fn records_flow_from_store_to_sink_in_claim_order() {
    init_test_tracing();

    let store = MemorySourceStore::new(ReclaimPolicy::CreatedAt);
    // Inserted out of creation order to check that claims follow `created_at`.
    store
        .insert(
            "users",
            Operation::Update,
            Some(r#"{"name":"a"}"#),
            Some(r#"{"name":"b"}"#),
            at_second(2),
        )
        .await;
    store
        .insert(
            "users",
            Operation::Insert,
            None,
            Some(r#"{"name":"a"}"#),
            at_second(1),
        )
        .await;
    store
        .insert(
            "users",
            Operation::Delete,
            Some(r#"{"name":"b"}"#),
            None,
            at_second(3),
        )
        .await;

    let sink = TestSinkWrapper::wrap(MemorySink::new());
    let mut pipeline = Pipeline::new(pipeline_config(2, 1, 1), store.clone(), sink.clone());

    let written = sink.wait_for_records(3).await;
    pipeline.start().await.unwrap();
    written.notified().await;

    pipeline.shutdown_and_wait().await.unwrap();

    let records = sink.records().await;
    let operations: Vec<Operation> = records.iter().map(|r| r.operation).collect();
    assert_eq!(
        operations,
        vec![Operation::Insert, Operation::Update, Operation::Delete]
    );

    let update = &records[1];
    assert_eq!(update.table_name, "users");
    assert_eq!(update.old_data.as_deref(), Some(r#"{"name":"a"}"#));
    assert_eq!(update.new_data.as_deref(), Some(r#"{"name":"b"}"#));
    assert_eq!(update.timestamp, at_second(2));
    assert_eq!(update.document_id, None);

    assert_eq!(records[0].old_data, None);
    assert_eq!(records[2].new_data, None);

    // 3 records in batches of at most 2.
    assert_eq!(sink.activity().await.completed_writes, 2);
    assert_eq!(store.claimed_count().await, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn full_queue_stops_claiming() {
    init_test_tracing();

    let store = MemorySourceStore::new(ReclaimPolicy::CreatedAt);
    insert_records(&store, 8).await;

    let store = TestStoreWrapper::wrap(store);
    let sink = TestSinkWrapper::wrap(MemorySink::new());
    sink.block();

    let mut pipeline = Pipeline::new(pipeline_config(1, 2, 2), store.clone(), sink.clone());

    // 2 batches held by workers, 2 queued and 1 held by the poller.
    let claimed = store.wait_for_claimed_records(5).await;
    pipeline.start().await.unwrap();
    claimed.notified().await;

    sleep(Duration::from_millis(300)).await;
    assert_eq!(store.activity().await.claimed_records, 5);
    assert_eq!(store.get_inner().claimed_count().await, 5);
    assert_eq!(sink.activity().await.started_writes, 2);
    assert!(sink.records().await.is_empty());

    let written = sink.wait_for_records(8).await;
    sink.unblock();
    written.notified().await;

    pipeline.shutdown_and_wait().await.unwrap();

    assert_eq!(store.activity().await.claimed_records, 8);
    assert_eq!(sink.records().await.len(), 8);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_drains_queued_batches_and_keeps_undispatched_claims() {
    init_test_tracing();

    let store = MemorySourceStore::new(ReclaimPolicy::CreatedAt);
    insert_records(&store, 6).await;

    let store = TestStoreWrapper::wrap(store);
    let sink = TestSinkWrapper::wrap(MemorySink::new());
    sink.block();

    let mut pipeline = Pipeline::new(pipeline_config(1, 1, 2), store.clone(), sink.clone());

    // 1 batch held by the worker, 2 queued and 1 held by the poller.
    let claimed = store.wait_for_claimed_records(4).await;
    let started = sink.wait_for_started_writes(1).await;
    pipeline.start().await.unwrap();
    claimed.notified().await;
    started.notified().await;

    pipeline.shutdown();
    sleep(Duration::from_millis(200)).await;
    sink.unblock();

    pipeline.wait().await.unwrap();

    // The batch the poller held when shutdown arrived is never written.
    assert_eq!(sink.records().await.len(), 3);
    assert_eq!(store.activity().await.claimed_records, 4);
    assert_eq!(store.get_inner().claimed_count().await, 4);

    let unclaimed = store
        .get_inner()
        .records()
        .await
        .into_iter()
        .filter(|record| !record.claimed)
        .count();
    assert_eq!(unclaimed, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_claims_are_retried_after_poll_interval() {
    init_test_tracing();

    let store = MemorySourceStore::new(ReclaimPolicy::CreatedAt);
    insert_records(&store, 3).await;

    let store = TestStoreWrapper::wrap(store);
    store.set_fail_claims(true).await;
    let sink = TestSinkWrapper::wrap(MemorySink::new());

    let mut pipeline = Pipeline::new(pipeline_config(10, 2, 2), store.clone(), sink.clone());

    let failed = store.wait_for_failed_claims(3).await;
    pipeline.start().await.unwrap();
    failed.notified().await;

    assert!(sink.records().await.is_empty());

    let written = sink.wait_for_records(3).await;
    store.set_fail_claims(false).await;
    written.notified().await;

    pipeline.shutdown_and_wait().await.unwrap();

    assert_eq!(sink.records().await.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_write_is_delivered_after_reclaim() {
    init_test_tracing();

    let store = MemorySourceStore::new(ReclaimPolicy::ClaimedAt);
    let ids = insert_records(&store, 4).await;

    let store = TestStoreWrapper::wrap(store);
    let sink = TestSinkWrapper::wrap(MemorySink::new());
    sink.fail_next_writes(1).await;

    let config = PipelineConfig {
        reclaim_interval_ms: 50,
        reclaim_age_ms: 1,
        document_id_policy: DocumentIdPolicy::SourceId,
        ..pipeline_config(2, 1, 1)
    };
    let mut pipeline = Pipeline::new(config, store.clone(), sink.clone());

    let failed = sink.wait_for_failed_writes(1).await;
    let reclaimed = store
        .notify_on(|activity| activity.reclaimed_records >= 2)
        .await;
    let written = sink.wait_for_records(4).await;
    pipeline.start().await.unwrap();
    failed.notified().await;
    reclaimed.notified().await;
    written.notified().await;

    pipeline.shutdown_and_wait().await.unwrap();

    // Delivery is at least once, rows written before the reclaim may show up again.
    let delivered: BTreeSet<String> = sink
        .records()
        .await
        .into_iter()
        .filter_map(|record| record.document_id)
        .collect();
    let expected: BTreeSet<String> = ids.iter().map(|id| id.to_string()).collect();
    assert_eq!(delivered, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn source_id_policy_sets_document_ids() {
    init_test_tracing();

    let store = MemorySourceStore::new(ReclaimPolicy::CreatedAt);
    let ids = insert_records(&store, 2).await;

    let sink = TestSinkWrapper::wrap(MemorySink::new());
    let config = PipelineConfig {
        document_id_policy: DocumentIdPolicy::SourceId,
        ..pipeline_config(5, 1, 1)
    };
    let mut pipeline = Pipeline::new(config, store, sink.clone());

    let written = sink.wait_for_records(2).await;
    pipeline.start().await.unwrap();
    written.notified().await;

    pipeline.shutdown_and_wait().await.unwrap();

    let document_ids: Vec<Option<String>> = sink
        .records()
        .await
        .into_iter()
        .map(|record| record.document_id)
        .collect();
    assert_eq!(
        document_ids,
        ids.iter()
            .map(|id| Some(id.to_string()))
            .collect::<Vec<_>>()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn start_rejects_invalid_config() {
    init_test_tracing();

    let store = MemorySourceStore::new(ReclaimPolicy::CreatedAt);
    let sink = MemorySink::new();
    let config = PipelineConfig {
        workers: 0,
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::new(config, store, sink);

    let err = pipeline.start().await.unwrap_err();

    assert_eq!(err.kind(), audit_sync::error::ErrorKind::ConfigError);
}

#[tokio::test(flavor = "multi_thread")]
async fn wait_without_start_returns_immediately() {
    init_test_tracing();

    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        MemorySourceStore::new(ReclaimPolicy::CreatedAt),
        MemorySink::new(),
    );

    pipeline.wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn claim_in_flight_at_shutdown_is_still_written() {
    init_test_tracing();

    // Repeated because the shutdown and the queue send race inside the poller.
    for _ in 0..20 {
        let memory_store = MemorySourceStore::new(ReclaimPolicy::CreatedAt);
        insert_records(&memory_store, 3).await;

        let store = GatedStore::wrap(memory_store.clone());
        let sink = TestSinkWrapper::wrap(MemorySink::new());
        let mut pipeline = Pipeline::new(pipeline_config(10, 2, 5), store.clone(), sink.clone());

        let claim_started = store.claim_started();
        pipeline.start().await.unwrap();
        claim_started.notified().await;

        pipeline.shutdown();
        store.open();

        pipeline.wait().await.unwrap();

        assert_eq!(memory_store.claimed_count().await, 3);
        assert_eq!(sink.records().await.len(), 3);
    }
}
