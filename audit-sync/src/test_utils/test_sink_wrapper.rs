use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, watch};

use crate::error::{ErrorKind, SyncResult};
use crate::sink::Sink;
use crate::sync_error;
use crate::test_utils::notify::TimedNotify;
use crate::types::IndexedRecord;

/// What a [`TestSinkWrapper`] observed so far.
#[derive(Debug, Clone, Default)]
pub struct SinkActivity {
    /// Records of every successful write, in completion order.
    pub records: Vec<IndexedRecord>,
    /// Bulk writes that entered the sink, including blocked and failed ones.
    pub started_writes: u64,
    pub completed_writes: u64,
    pub failed_writes: u64,
}

type ActivityCondition = Box<dyn Fn(&SinkActivity) -> bool + Send + Sync>;

struct Inner {
    activity: SinkActivity,
    failures_left: u64,
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

/// Sink wrapper that records writes and can fail or hold them on demand.
#[derive(Clone)]
pub struct TestSinkWrapper<K> {
    sink: K,
    inner: Arc<Mutex<Inner>>,
    blocked: Arc<watch::Sender<bool>>,
}

impl<K> fmt::Debug for TestSinkWrapper<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSinkWrapper")
            .field("blocked", &*self.blocked.borrow())
            .finish()
    }
}

impl<K> TestSinkWrapper<K> {
    pub fn wrap(sink: K) -> Self {
        let inner = Inner {
            activity: SinkActivity::default(),
            failures_left: 0,
            conditions: Vec::new(),
        };
        let (blocked, _) = watch::channel(false);

        Self {
            sink,
            inner: Arc::new(Mutex::new(inner)),
            blocked: Arc::new(blocked),
        }
    }

    pub async fn activity(&self) -> SinkActivity {
        self.inner.lock().await.activity.clone()
    }

    pub async fn records(&self) -> Vec<IndexedRecord> {
        self.inner.lock().await.activity.records.clone()
    }

    /// Makes the next `count` writes fail without reaching the wrapped sink.
    pub async fn fail_next_writes(&self, count: u64) {
        self.inner.lock().await.failures_left = count;
    }

    /// Holds every write, including those already waiting, until [`TestSinkWrapper::unblock`].
    pub fn block(&self) {
        self.blocked.send_replace(true);
    }

    pub fn unblock(&self) {
        self.blocked.send_replace(false);
    }

    /// Returns a notification fired once `condition` holds on the sink activity.
    pub async fn notify_on<F>(&self, condition: F) -> TimedNotify
    where
        F: Fn(&SinkActivity) -> bool + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().await;
        inner.conditions.push((Box::new(condition), notify.clone()));

        // The condition may already hold.
        inner.check_conditions();

        TimedNotify::new(notify)
    }

    pub async fn wait_for_records(&self, count: usize) -> TimedNotify {
        self.notify_on(move |activity| activity.records.len() >= count)
            .await
    }

    pub async fn wait_for_started_writes(&self, count: u64) -> TimedNotify {
        self.notify_on(move |activity| activity.started_writes >= count)
            .await
    }

    pub async fn wait_for_failed_writes(&self, count: u64) -> TimedNotify {
        self.notify_on(move |activity| activity.failed_writes >= count)
            .await
    }
}

impl<K> Sink for TestSinkWrapper<K>
where
    K: Sink + Send + Sync,
{
    fn name() -> &'static str {
        K::name()
    }

    async fn bulk_write(&self, records: Vec<IndexedRecord>) -> SyncResult<()> {
        {
            let mut inner = self.inner.lock().await;
            inner.activity.started_writes += 1;
            inner.check_conditions();
        }

        let mut blocked = self.blocked.subscribe();
        let _ = blocked.wait_for(|blocked| !*blocked).await;

        let fail = {
            let mut inner = self.inner.lock().await;
            if inner.failures_left > 0 {
                inner.failures_left -= 1;
                inner.activity.failed_writes += 1;
                inner.check_conditions();
                true
            } else {
                false
            }
        };

        if fail {
            return Err(sync_error!(
                ErrorKind::SinkRequestFailed,
                "Injected sink failure"
            ));
        }

        let result = self.sink.bulk_write(records.clone()).await;

        let mut inner = self.inner.lock().await;
        match &result {
            Ok(()) => {
                inner.activity.records.extend(records);
                inner.activity.completed_writes += 1;
            }
            Err(_) => inner.activity.failed_writes += 1,
        }
        inner.check_conditions();

        result
    }
}
