use std::time::Duration;

use chrono::{DateTime, Utc};
use config::shared::ReclaimPolicy;
use sqlx::{PgPool, prelude::FromRow};

/// A row of `public.audit_log` as returned by the claim statement.
///
/// Payloads are selected as text so they can be forwarded to the sink without being parsed.
#[derive(Debug, Clone, FromRow)]
pub struct AuditLogRow {
    pub id: i64,
    pub table_name: String,
    pub operation: String,
    pub old_data: Option<String>,
    pub new_data: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub claimed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Claims up to `limit` unclaimed rows, oldest first.
///
/// Rows locked by a concurrent claim are skipped, so concurrent callers never receive the
/// same row. The returned rows are sorted by `(created_at, id)`.
pub async fn claim_audit_logs(pool: &PgPool, limit: i64) -> sqlx::Result<Vec<AuditLogRow>> {
    let mut tx = pool.begin().await?;

    let mut rows = sqlx::query_as::<_, AuditLogRow>(
        r#"
        update public.audit_log
        set claimed = true, claimed_at = now()
        where id in (
            select id from public.audit_log
            where not claimed
            order by created_at, id
            limit $1
            for update skip locked
        )
        returning id, table_name, operation, old_data::text as old_data,
            new_data::text as new_data, user_id, created_at, claimed, claimed_at
        "#,
    )
    .bind(limit)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    // `returning` does not preserve the order of the subquery.
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    Ok(rows)
}

/// Returns claimed rows older than `age` to the unclaimed pool.
///
/// The age is measured against the database clock on the column selected by `policy`.
pub async fn reclaim_audit_logs(
    pool: &PgPool,
    policy: ReclaimPolicy,
    age: Duration,
) -> sqlx::Result<u64> {
    let query = match policy {
        ReclaimPolicy::CreatedAt => {
            r#"
            update public.audit_log
            set claimed = false, claimed_at = null
            where claimed and created_at <= now() - make_interval(secs => $1)
            "#
        }
        ReclaimPolicy::ClaimedAt => {
            r#"
            update public.audit_log
            set claimed = false, claimed_at = null
            where claimed and coalesce(claimed_at, created_at) <= now() - make_interval(secs => $1)
            "#
        }
    };

    let result = sqlx::query(query)
        .bind(age.as_secs_f64())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
