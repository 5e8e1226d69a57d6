use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use config::shared::ReclaimPolicy;
use tokio::sync::Mutex;

use crate::error::{ErrorKind, SyncResult};
use crate::store::SourceStore;
use crate::sync_error;
use crate::types::{Batch, ChangeRecord, Operation};

#[derive(Debug)]
struct Inner {
    records: BTreeMap<i64, ChangeRecord>,
    next_id: i64,
}

/// In-memory [`SourceStore`] for tests and local runs.
///
/// A claim or reclaim runs entirely under one lock, which gives the same exclusivity as the row
/// locks of the Postgres store.
#[derive(Debug, Clone)]
pub struct MemorySourceStore {
    inner: Arc<Mutex<Inner>>,
    reclaim_policy: ReclaimPolicy,
}

impl MemorySourceStore {
    pub fn new(reclaim_policy: ReclaimPolicy) -> Self {
        let inner = Inner {
            records: BTreeMap::new(),
            next_id: 1,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
            reclaim_policy,
        }
    }

    /// Appends an unclaimed record and returns its id.
    pub async fn insert(
        &self,
        table_name: &str,
        operation: Operation,
        before: Option<&str>,
        after: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> i64 {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id;
        inner.next_id += 1;

        inner.records.insert(
            id,
            ChangeRecord {
                id,
                table_name: table_name.to_string(),
                operation,
                before: before.map(str::to_owned),
                after: after.map(str::to_owned),
                user_id: "system".to_string(),
                created_at,
                claimed: false,
                claimed_at: None,
            },
        );

        id
    }

    pub async fn get(&self, id: i64) -> Option<ChangeRecord> {
        let inner = self.inner.lock().await;
        inner.records.get(&id).cloned()
    }

    pub async fn records(&self) -> Vec<ChangeRecord> {
        let inner = self.inner.lock().await;
        inner.records.values().cloned().collect()
    }

    pub async fn claimed_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.records.values().filter(|r| r.claimed).count()
    }
}

impl SourceStore for MemorySourceStore {
    async fn claim_batch(&self, limit: usize) -> SyncResult<Batch> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();

        let mut candidates: Vec<(DateTime<Utc>, i64)> = inner
            .records
            .values()
            .filter(|record| !record.claimed)
            .map(|record| (record.created_at, record.id))
            .collect();
        candidates.sort();
        candidates.truncate(limit);

        let mut batch = Vec::with_capacity(candidates.len());
        for (_, id) in candidates {
            let record = inner.records.get_mut(&id).ok_or_else(|| {
                sync_error!(
                    ErrorKind::InvalidState,
                    "Claimed record vanished from the memory store",
                    format!("record {id}")
                )
            })?;
            record.claimed = true;
            record.claimed_at = Some(now);
            batch.push(record.clone());
        }

        Ok(batch)
    }

    async fn reclaim_stale(&self, age: Duration) -> SyncResult<u64> {
        let mut inner = self.inner.lock().await;
        let age = chrono::Duration::from_std(age).map_err(|err| {
            sync_error!(
                ErrorKind::ConfigError,
                "Reclaim age is out of range",
                err.to_string()
            )
        })?;
        let threshold = Utc::now() - age;

        let mut reclaimed = 0;
        for record in inner.records.values_mut().filter(|r| r.claimed) {
            let reference = match self.reclaim_policy {
                ReclaimPolicy::CreatedAt => record.created_at,
                ReclaimPolicy::ClaimedAt => record.claimed_at.unwrap_or(record.created_at),
            };

            if reference <= threshold {
                record.claimed = false;
                record.claimed_at = None;
                reclaimed += 1;
            }
        }

        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Duration as ChronoDuration;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn claims_oldest_first_and_leaves_the_rest() {
        let store = MemorySourceStore::new(ReclaimPolicy::CreatedAt);
        let now = Utc::now();
        let third = store
            .insert("t", Operation::Insert, None, Some("{}"), now)
            .await;
        let first = store
            .insert(
                "t",
                Operation::Insert,
                None,
                Some("{}"),
                now - ChronoDuration::seconds(2),
            )
            .await;
        let second = store
            .insert(
                "t",
                Operation::Delete,
                Some("{}"),
                None,
                now - ChronoDuration::seconds(1),
            )
            .await;

        let batch = store.claim_batch(2).await.unwrap();
        let ids: Vec<i64> = batch.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert!(batch.iter().all(|r| r.claimed && r.claimed_at.is_some()));
        assert!(!store.get(third).await.unwrap().claimed);

        let batch = store.claim_batch(2).await.unwrap();
        assert_eq!(batch.iter().map(|r| r.id).collect::<Vec<_>>(), vec![third]);

        assert!(store.claim_batch(2).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ties_on_creation_time_are_broken_by_id() {
        let store = MemorySourceStore::new(ReclaimPolicy::CreatedAt);
        let now = Utc::now();
        let a = store.insert("t", Operation::Insert, None, None, now).await;
        let b = store.insert("t", Operation::Insert, None, None, now).await;

        let batch = store.claim_batch(10).await.unwrap();

        assert_eq!(batch.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a, b]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_claims_are_disjoint() {
        let store = MemorySourceStore::new(ReclaimPolicy::CreatedAt);
        for _ in 0..100 {
            store
                .insert("t", Operation::Insert, None, None, Utc::now())
                .await;
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                loop {
                    let batch = store.claim_batch(3).await.unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    ids.extend(batch.into_iter().map(|r| r.id));
                }
                ids
            }));
        }

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            let ids = handle.await.unwrap();
            total += ids.len();
            seen.extend(ids);
        }

        assert_eq!(total, 100);
        assert_eq!(seen.len(), 100);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reclaim_respects_age_and_policy() {
        let created_at = Utc::now() - ChronoDuration::minutes(30);

        let store = MemorySourceStore::new(ReclaimPolicy::CreatedAt);
        let id = store
            .insert("t", Operation::Update, None, None, created_at)
            .await;
        store.claim_batch(1).await.unwrap();

        assert_eq!(
            store.reclaim_stale(Duration::from_secs(3600)).await.unwrap(),
            0
        );
        assert_eq!(
            store.reclaim_stale(Duration::from_secs(600)).await.unwrap(),
            1
        );
        let record = store.get(id).await.unwrap();
        assert!(!record.claimed);
        assert!(record.claimed_at.is_none());

        let store = MemorySourceStore::new(ReclaimPolicy::ClaimedAt);
        store
            .insert("t", Operation::Update, None, None, created_at)
            .await;
        store.claim_batch(1).await.unwrap();

        assert_eq!(
            store.reclaim_stale(Duration::from_secs(600)).await.unwrap(),
            0
        );
        assert_eq!(store.reclaim_stale(Duration::ZERO).await.unwrap(), 1);
    }
}
