use chrono::{DateTime, Utc};
use config::shared::{IntoConnectOptions, PgConnectionConfig, TlsConfig};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

use crate::audit_log::AuditLogRow;
use crate::migrations::apply_audit_sync_migrations;

/// Builds a connection config for a uniquely named database on the test server.
///
/// The server is read from `TESTS_DATABASE_HOST`, `TESTS_DATABASE_PORT`,
/// `TESTS_DATABASE_USERNAME` and the optional `TESTS_DATABASE_PASSWORD`.
pub fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(Into::into),
        tls: TlsConfig::disabled(),
    }
}

/// Creates a new Postgres database and returns a connection pool to it.
///
/// # Panics
/// Panics if connection or database creation fails.
pub async fn create_pg_database(config: &PgConnectionConfig) -> PgPool {
    let mut connection = PgConnection::connect_with(&config.without_db(None))
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"create database "{}";"#, config.name))
        .await
        .expect("Failed to create database");

    PgPool::connect_with(config.with_db(None))
        .await
        .expect("Failed to connect to Postgres")
}

/// Terminates all connections to a database and drops it.
///
/// Errors are printed and otherwise ignored so cleanup never fails a test.
pub async fn drop_pg_database(config: &PgConnectionConfig) {
    let mut connection = match PgConnection::connect_with(&config.without_db(None)).await {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("warning: failed to connect to Postgres for cleanup: {e}");
            return;
        }
    };

    if let Err(e) = connection
        .execute(&*format!(
            r#"
            select pg_terminate_backend(pg_stat_activity.pid)
            from pg_stat_activity
            where pg_stat_activity.datname = '{}'
            and pid <> pg_backend_pid();"#,
            config.name
        ))
        .await
    {
        eprintln!(
            "warning: failed to terminate connections for database {}: {}",
            config.name, e
        );
    }

    if let Err(e) = connection
        .execute(&*format!(r#"drop database if exists "{}";"#, config.name))
        .await
    {
        eprintln!("warning: failed to drop database {}: {}", config.name, e);
    }
}

/// A throwaway database with the audit table migrated, dropped when this value is dropped.
///
/// Dropping blocks the current thread, so it must happen on a multi-threaded runtime.
pub struct PgDatabase {
    pub config: PgConnectionConfig,
    pub pool: PgPool,
}

impl PgDatabase {
    pub async fn new() -> Self {
        let config = local_pg_connection_config();
        let pool = create_pg_database(&config).await;
        apply_audit_sync_migrations(&config)
            .await
            .expect("Failed to apply migrations");

        Self { config, pool }
    }

    /// Inserts an audit row and returns its id.
    pub async fn insert_audit_log(
        &self,
        table_name: &str,
        operation: &str,
        old_data: Option<&str>,
        new_data: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> i64 {
        sqlx::query_scalar(
            r#"
            insert into public.audit_log (table_name, operation, old_data, new_data, user_id, created_at)
            values ($1, $2, $3::jsonb, $4::jsonb, 'test_user', $5)
            returning id
            "#,
        )
        .bind(table_name)
        .bind(operation)
        .bind(old_data)
        .bind(new_data)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to insert audit log")
    }

    pub async fn get_audit_log(&self, id: i64) -> AuditLogRow {
        sqlx::query_as::<_, AuditLogRow>(
            r#"
            select id, table_name, operation, old_data::text as old_data,
                new_data::text as new_data, user_id, created_at, claimed, claimed_at
            from public.audit_log
            where id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to fetch audit log")
    }

    pub async fn count_claimed(&self) -> i64 {
        sqlx::query_scalar("select count(*) from public.audit_log where claimed")
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count claimed audit logs")
    }
}

impl Drop for PgDatabase {
    fn drop(&mut self) {
        let config = self.config.clone();
        let pool = self.pool.clone();
        tokio::task::block_in_place(move || {
            tokio::runtime::Handle::current().block_on(async move {
                pool.close().await;
                drop_pg_database(&config).await;
            });
        });
    }
}
