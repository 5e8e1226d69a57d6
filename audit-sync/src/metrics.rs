//! Metric names of the audit sync pipeline.

/// Label for the index a batch was written to.
pub const INDEX_LABEL: &str = "index";

/// Label for error kind in metrics.
pub const ERROR_KIND_LABEL: &str = "error_kind";

// Claims

/// Counter of audit records claimed from the source.
pub const AUDIT_SYNC_RECORDS_CLAIMED_TOTAL: &str = "audit_sync_records_claimed_total";

/// Counter of failed claim attempts.
pub const AUDIT_SYNC_CLAIM_FAILURES_TOTAL: &str = "audit_sync_claim_failures_total";

/// Counter of batches pushed onto the dispatch queue.
pub const AUDIT_SYNC_BATCHES_DISPATCHED_TOTAL: &str = "audit_sync_batches_dispatched_total";

// Writes

/// Counter of records accepted by the sink.
pub const AUDIT_SYNC_RECORDS_INDEXED_TOTAL: &str = "audit_sync_records_indexed_total";

/// Counter of failed bulk writes.
pub const AUDIT_SYNC_BULK_WRITE_FAILURES_TOTAL: &str = "audit_sync_bulk_write_failures_total";

/// Gauge of batches currently being written by workers.
pub const AUDIT_SYNC_BATCHES_IN_FLIGHT: &str = "audit_sync_batches_in_flight";

// Reclaims

/// Counter of claimed records returned to the unclaimed pool.
pub const AUDIT_SYNC_RECORDS_RECLAIMED_TOTAL: &str = "audit_sync_records_reclaimed_total";

/// Counter of failed reclaim attempts.
pub const AUDIT_SYNC_RECLAIM_FAILURES_TOTAL: &str = "audit_sync_reclaim_failures_total";

// Sinks

/// Counter of documents accepted by Elasticsearch, labelled by daily index.
pub const AUDIT_SYNC_ELASTICSEARCH_DOCUMENTS_TOTAL: &str =
    "audit_sync_elasticsearch_documents_total";
