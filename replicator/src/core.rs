use audit_sync::pipeline::Pipeline;
use audit_sync::sink::Sink;
use audit_sync::sink::elasticsearch::ElasticsearchSink;
use audit_sync::sink::memory::MemorySink;
use audit_sync::store::SourceStore;
use audit_sync::store::postgres::PostgresSourceStore;
use config::shared::{
    PgConnectionConfig, PipelineConfig, ReplicatorConfig, SinkConfig, SourceConfig,
};
use postgres::connect_to_source_database;
use postgres::migrations::apply_audit_sync_migrations;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use crate::error::{ReplicatorError, ReplicatorResult};

/// Connects to the source and the sink, then runs the pipeline until a shutdown signal arrives.
pub async fn start_replicator_with_config(
    replicator_config: ReplicatorConfig,
) -> ReplicatorResult<()> {
    info!("starting audit replicator");

    log_config(&replicator_config);

    let source = &replicator_config.source;
    if source.run_migrations {
        apply_audit_sync_migrations(&source.connection)
            .await
            .map_err(ReplicatorError::migration)?;
    } else {
        info!("audit table migrations disabled, skipping");
    }

    let pool = connect_to_source_database(
        &source.connection,
        source.max_connections,
        source.max_lifetime(),
    )
    .await
    .map_err(|err| ReplicatorError::Sync(err.into()))?;
    let store = PostgresSourceStore::new(pool, replicator_config.pipeline.reclaim_policy);

    // Each sink gets its own pipeline type, so dispatch stays static.
    match &replicator_config.sink {
        SinkConfig::Memory => {
            let pipeline = Pipeline::new(replicator_config.pipeline, store, MemorySink::new());
            start_pipeline(pipeline).await?;
        }
        SinkConfig::Elasticsearch(config) => {
            let sink = ElasticsearchSink::connect(config).await?;

            let pipeline = Pipeline::new(replicator_config.pipeline, store, sink);
            start_pipeline(pipeline).await?;
        }
    }

    info!("audit replicator completed");

    Ok(())
}

fn log_config(config: &ReplicatorConfig) {
    log_source_config(&config.source);
    log_sink_config(&config.sink);
    log_pipeline_config(&config.pipeline);
}

fn log_source_config(config: &SourceConfig) {
    log_pg_connection_config(&config.connection);
    debug!(
        max_connections = config.max_connections,
        max_lifetime_secs = config.max_lifetime_secs,
        run_migrations = config.run_migrations,
        "source pool config"
    );
}

fn log_pg_connection_config(config: &PgConnectionConfig) {
    debug!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = ?config.username,
        tls_enabled = config.tls.enabled,
        "source postgres connection config",
    );
}

fn log_sink_config(config: &SinkConfig) {
    match config {
        SinkConfig::Memory => {
            debug!("using memory sink config");
        }
        SinkConfig::Elasticsearch(config) => {
            debug!(
                url = config.url,
                index = config.index,
                username = ?config.username,
                request_timeout_ms = config.request_timeout_ms,
                "using elasticsearch sink config"
            );
        }
    }
}

fn log_pipeline_config(config: &PipelineConfig) {
    debug!(
        batch_size = config.batch_size,
        workers = config.workers,
        queue_capacity = config.queue_capacity(),
        poll_interval_ms = config.poll_interval_ms,
        reclaim_interval_ms = config.reclaim_interval_ms,
        reclaim_age_ms = config.reclaim_age_ms,
        reclaim_policy = ?config.reclaim_policy,
        document_id_policy = ?config.document_id_policy,
        "pipeline config"
    );
}

/// Starts the pipeline and shuts it down on SIGINT or SIGTERM.
///
/// Batches already queued are written before this returns.
#[tracing::instrument(skip(pipeline))]
async fn start_pipeline<S, K>(mut pipeline: Pipeline<S, K>) -> ReplicatorResult<()>
where
    S: SourceStore + Clone + Send + Sync + 'static,
    K: Sink + Clone + Send + Sync + 'static,
{
    pipeline.start().await?;

    let shutdown_tx = pipeline.shutdown_tx();
    let mut sigterm = signal(SignalKind::terminate())?;
    let shutdown_handle = tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!(error = %err, "failed to listen for sigint, shutting down pipeline");
                } else {
                    info!("sigint (ctrl+c) received, shutting down pipeline");
                }
            }
            _ = sigterm.recv() => {
                info!("sigterm received, shutting down pipeline");
            }
        }

        shutdown_tx.shutdown();
    });

    let result = pipeline.wait().await;

    // The pipeline may stop on its own after a failure, the listener is not needed then.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    result?;

    Ok(())
}
