use std::time::Duration;

use chrono::{NaiveDate, Utc};
use config::shared::ElasticsearchConfig;
use metrics::counter;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{Level, debug, info};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::metrics::{AUDIT_SYNC_ELASTICSEARCH_DOCUMENTS_TOTAL, INDEX_LABEL};
use crate::sink::Sink;
use crate::types::IndexedRecord;

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Server-side timeout sent with every bulk request.
const BULK_TIMEOUT: &str = "30s";

/// Longest response body copied into an error detail.
const MAX_ERROR_BODY_LEN: usize = 1024;

#[derive(Serialize)]
struct BulkAction<'a> {
    index: BulkActionMeta<'a>,
}

#[derive(Serialize)]
struct BulkActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
}

/// Returns the daily index for `date`, e.g. `pg_audit_logs-2024.03.09`.
pub fn daily_index_name(base: &str, date: NaiveDate) -> String {
    format!("{base}-{}", date.format("%Y.%m.%d"))
}

/// Encodes records as a `_bulk` body of action and document line pairs.
///
/// Every line, the last one included, ends with a newline.
pub fn encode_bulk_body(index: &str, records: &[IndexedRecord]) -> SyncResult<String> {
    let mut body = String::new();
    for record in records {
        let action = BulkAction {
            index: BulkActionMeta {
                index,
                id: record.document_id.as_deref(),
            },
        };
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(record)?);
        body.push('\n');
    }

    Ok(body)
}

/// Writes audit documents to daily Elasticsearch indices through the `_bulk` API.
#[derive(Debug, Clone)]
pub struct ElasticsearchSink {
    client: reqwest::Client,
    url: String,
    index: String,
    username: Option<String>,
    password: Option<SecretString>,
}

impl ElasticsearchSink {
    /// Builds the sink without contacting the cluster.
    pub fn new(config: &ElasticsearchConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Builds the sink and checks that the cluster answers.
    pub async fn connect(config: &ElasticsearchConfig) -> SyncResult<Self> {
        let sink = Self::new(config)?;
        sink.ping().await?;

        info!(url = %sink.url, index = %sink.index, "connected to elasticsearch");

        Ok(sink)
    }

    /// Requests the cluster root and fails unless it answers with a success status.
    pub async fn ping(&self) -> SyncResult<()> {
        let request = self.authenticated(self.client.get(format!("{}/", self.url)));
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                ErrorKind::SinkConnectionFailed,
                "Elasticsearch ping failed",
                format!("status {status}: {}", truncate(&body))
            );
        }

        Ok(())
    }

    /// Returns the index written to today.
    pub fn current_index(&self) -> String {
        daily_index_name(&self.index, Utc::now().date_naive())
    }

    fn authenticated(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(
                username,
                self.password.as_ref().map(|p| p.expose_secret().to_owned()),
            ),
            None => request,
        }
    }
}

impl Sink for ElasticsearchSink {
    fn name() -> &'static str {
        "elasticsearch"
    }

    async fn bulk_write(&self, records: Vec<IndexedRecord>) -> SyncResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let index = self.current_index();
        let body = encode_bulk_body(&index, &records)?;

        let request = self
            .client
            .post(format!("{}/_bulk", self.url))
            .query(&[("refresh", "false"), ("timeout", BULK_TIMEOUT)])
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body);
        let response = self.authenticated(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let response_body = response.text().await.unwrap_or_default();
            bail!(
                ErrorKind::SinkRejected,
                "Elasticsearch bulk request failed",
                format!("status {status}: {}", truncate(&response_body))
            );
        }

        counter!(
            AUDIT_SYNC_ELASTICSEARCH_DOCUMENTS_TOTAL,
            INDEX_LABEL => index.clone()
        )
        .increment(records.len() as u64);
        info!(
            index = %index,
            batch_size = records.len(),
            "bulk write to elasticsearch succeeded"
        );

        if tracing::enabled!(Level::DEBUG) {
            for (position, record) in records.iter().enumerate() {
                let document = serde_json::to_string(record)?;
                debug!(index = %index, position, document, "audit record indexed");
            }
        }

        Ok(())
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY_LEN) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
