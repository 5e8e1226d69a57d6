pub use postgres::test_utils::PgDatabase;

use crate::store::postgres::PostgresSourceStore;
use config::shared::ReclaimPolicy;

/// Creates a uniquely named database on the `TESTS_DATABASE_*` server with the audit table
/// migrated. The database is dropped with the returned value.
pub async fn spawn_source_database() -> PgDatabase {
    PgDatabase::new().await
}

/// Returns a store claiming from `database`.
pub fn source_store(database: &PgDatabase, reclaim_policy: ReclaimPolicy) -> PostgresSourceStore {
    PostgresSourceStore::new(database.pool.clone(), reclaim_policy)
}
