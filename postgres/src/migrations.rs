use config::shared::{AUDIT_SYNC_MIGRATION_OPTIONS, IntoConnectOptions, PgConnectionConfig};
use sqlx::{Executor, postgres::PgPoolOptions};
use tracing::info;

/// Runs the audit table migrations against the source database.
///
/// The `_sqlx_migrations` bookkeeping table is kept in the `audit_sync` schema so that only
/// the audit table itself lives in `public`.
pub async fn apply_audit_sync_migrations(
    connection_config: &PgConnectionConfig,
) -> Result<(), sqlx::Error> {
    let options = connection_config.with_db(Some(&AUDIT_SYNC_MIGRATION_OPTIONS));

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("create schema if not exists audit_sync;").await?;
                conn.execute("set search_path = 'audit_sync';").await?;

                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    info!("applying audit sync migrations");

    let migrator = sqlx::migrate!("./migrations");
    migrator.run(&pool).await?;

    info!("audit sync migrations successfully applied");

    Ok(())
}
