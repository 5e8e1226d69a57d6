use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::error::{ErrorKind, SyncResult};
use crate::store::SourceStore;
use crate::sync_error;
use crate::test_utils::notify::TimedNotify;
use crate::types::Batch;

/// What a [`TestStoreWrapper`] observed so far.
#[derive(Debug, Clone, Default)]
pub struct StoreActivity {
    /// Every call to `claim_batch`, failed ones included.
    pub claim_calls: u64,
    /// Claims that returned at least one record.
    pub claimed_batches: u64,
    pub claimed_records: u64,
    pub failed_claims: u64,
    pub reclaim_calls: u64,
    pub reclaimed_records: u64,
}

type ActivityCondition = Box<dyn Fn(&StoreActivity) -> bool + Send + Sync>;

struct Inner {
    activity: StoreActivity,
    fail_claims: bool,
    conditions: Vec<(ActivityCondition, Arc<Notify>)>,
}

impl Inner {
    fn check_conditions(&mut self) {
        let activity = &self.activity;
        self.conditions.retain(|(condition, notify)| {
            let satisfied = condition(activity);
            if satisfied {
                notify.notify_one();
            }
            !satisfied
        });
    }
}

/// Store wrapper that counts claims and reclaims and can fail claims on demand.
#[derive(Clone)]
pub struct TestStoreWrapper<S> {
    store: S,
    inner: Arc<Mutex<Inner>>,
}

impl<S> TestStoreWrapper<S> {
    pub fn wrap(store: S) -> Self {
        let inner = Inner {
            activity: StoreActivity::default(),
            fail_claims: false,
            conditions: Vec::new(),
        };

        Self {
            store,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn get_inner(&self) -> &S {
        &self.store
    }

    pub async fn activity(&self) -> StoreActivity {
        self.inner.lock().await.activity.clone()
    }

    /// Makes every claim fail without reaching the wrapped store while `fail` is set.
    pub async fn set_fail_claims(&self, fail: bool) {
        self.inner.lock().await.fail_claims = fail;
    }

    pub async fn notify_on<F>(&self, condition: F) -> TimedNotify
    where
        F: Fn(&StoreActivity) -> bool + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().await;
        inner.conditions.push((Box::new(condition), notify.clone()));
        inner.check_conditions();

        TimedNotify::new(notify)
    }

    pub async fn wait_for_claimed_records(&self, count: u64) -> TimedNotify {
        self.notify_on(move |activity| activity.claimed_records >= count)
            .await
    }

    pub async fn wait_for_failed_claims(&self, count: u64) -> TimedNotify {
        self.notify_on(move |activity| activity.failed_claims >= count)
            .await
    }

    pub async fn wait_for_reclaims(&self, count: u64) -> TimedNotify {
        self.notify_on(move |activity| activity.reclaim_calls >= count)
            .await
    }
}

impl<S> SourceStore for TestStoreWrapper<S>
where
    S: SourceStore + Send + Sync,
{
    async fn claim_batch(&self, limit: usize) -> SyncResult<Batch> {
        let fail = {
            let mut inner = self.inner.lock().await;
            inner.activity.claim_calls += 1;
            inner.fail_claims
        };

        let result = if fail {
            Err(sync_error!(
                ErrorKind::SourceConnectionFailed,
                "Injected claim failure"
            ))
        } else {
            self.store.claim_batch(limit).await
        };

        let mut inner = self.inner.lock().await;
        match &result {
            Ok(batch) if !batch.is_empty() => {
                inner.activity.claimed_batches += 1;
                inner.activity.claimed_records += batch.len() as u64;
            }
            Ok(_) => {}
            Err(_) => inner.activity.failed_claims += 1,
        }
        inner.check_conditions();

        result
    }

    async fn reclaim_stale(&self, age: Duration) -> SyncResult<u64> {
        let result = self.store.reclaim_stale(age).await;

        let mut inner = self.inner.lock().await;
        inner.activity.reclaim_calls += 1;
        if let Ok(reclaimed) = &result {
            inner.activity.reclaimed_records += reclaimed;
        }
        inner.check_conditions();

        result
    }
}
