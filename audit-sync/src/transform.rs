use config::shared::DocumentIdPolicy;

use crate::types::{ChangeRecord, IndexedRecord};

/// Maps a stored record to the document written to the sink.
///
/// Empty payloads are dropped so the document omits the field.
pub fn transform(record: &ChangeRecord, document_id_policy: DocumentIdPolicy) -> IndexedRecord {
    let document_id = match document_id_policy {
        DocumentIdPolicy::None => None,
        DocumentIdPolicy::SourceId => Some(record.id.to_string()),
    };

    IndexedRecord {
        document_id,
        table_name: record.table_name.clone(),
        operation: record.operation,
        old_data: non_empty(record.before.as_deref()),
        new_data: non_empty(record.after.as_deref()),
        user_id: record.user_id.clone(),
        timestamp: record.created_at,
    }
}

pub fn transform_batch(
    records: &[ChangeRecord],
    document_id_policy: DocumentIdPolicy,
) -> Vec<IndexedRecord> {
    records
        .iter()
        .map(|record| transform(record, document_id_policy))
        .collect()
}

fn non_empty(payload: Option<&str>) -> Option<String> {
    payload
        .filter(|payload| !payload.trim().is_empty())
        .map(str::to_owned)
}
