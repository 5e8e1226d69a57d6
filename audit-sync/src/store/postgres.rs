use std::time::Duration;

use config::shared::ReclaimPolicy;
use postgres::audit_log::{AuditLogRow, claim_audit_logs, reclaim_audit_logs};
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::store::SourceStore;
use crate::sync_error;
use crate::types::{Batch, ChangeRecord};

impl TryFrom<AuditLogRow> for ChangeRecord {
    type Error = SyncError;

    fn try_from(row: AuditLogRow) -> Result<Self, Self::Error> {
        Ok(ChangeRecord {
            id: row.id,
            table_name: row.table_name,
            operation: row.operation.parse()?,
            before: row.old_data,
            after: row.new_data,
            user_id: row.user_id,
            created_at: row.created_at,
            claimed: row.claimed,
            claimed_at: row.claimed_at,
        })
    }
}

/// [`SourceStore`] backed by the `public.audit_log` table.
///
/// Claims use `FOR UPDATE SKIP LOCKED`, so any number of stores, in this process or others, can
/// claim from the same table.
#[derive(Debug, Clone)]
pub struct PostgresSourceStore {
    pool: PgPool,
    reclaim_policy: ReclaimPolicy,
}

impl PostgresSourceStore {
    pub fn new(pool: PgPool, reclaim_policy: ReclaimPolicy) -> Self {
        Self {
            pool,
            reclaim_policy,
        }
    }
}

impl SourceStore for PostgresSourceStore {
    async fn claim_batch(&self, limit: usize) -> SyncResult<Batch> {
        let limit = i64::try_from(limit).map_err(|err| {
            sync_error!(
                ErrorKind::ConfigError,
                "Claim limit does not fit a bigint",
                err.to_string()
            )
        })?;

        let rows = claim_audit_logs(&self.pool, limit).await?;

        let mut batch = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match ChangeRecord::try_from(row) {
                Ok(record) => batch.push(record),
                // The row stays claimed and returns after the reclaim age, like a failed write.
                Err(err) => warn!(id, error = %err, "skipping audit record that cannot be decoded"),
            }
        }

        debug!(claimed = batch.len(), "claimed audit records");

        Ok(batch)
    }

    async fn reclaim_stale(&self, age: Duration) -> SyncResult<u64> {
        let reclaimed = reclaim_audit_logs(&self.pool, self.reclaim_policy, age).await?;

        Ok(reclaimed)
    }
}
