use std::time::Duration;

use config::shared::{AUDIT_SYNC_SOURCE_OPTIONS, IntoConnectOptions, PgConnectionConfig};
use sqlx::{PgPool, postgres::PgPoolOptions};

/// Connects to the database holding the audit table.
///
/// The pool is opened eagerly so that an unreachable server fails here rather than on the
/// first claim.
pub async fn connect_to_source_database(
    config: &PgConnectionConfig,
    max_connections: u32,
    max_lifetime: Duration,
) -> Result<PgPool, sqlx::Error> {
    let options = config.with_db(Some(&AUDIT_SYNC_SOURCE_OPTIONS));

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .max_lifetime(max_lifetime)
        .connect_with(options)
        .await?;

    Ok(pool)
}
