//! Downstream delivery of transformed batches.
//!
//! A bulletin is delivered as one [`DocumentBatch`]. Each accepted batch goes
//! out in two encodings:
//!
//! | Sink | Output |
//! |------|--------|
//! | [`CsvSink`] | one CSV object per bulletin date in the object store |
//! | [`SqliteRecordStore`] | keyed JSON documents upserted into SQLite |
//!
//! Both writes are idempotent: the CSV key and every record `id` are derived
//! from the bulletin's content, so a document reprocessed after a lost ledger
//! update overwrites its previous output instead of duplicating it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::PipelineError;
use crate::ledger::normalize_link;
use crate::models::{format_date, DocumentBatch, TransformedRecord, RECORD_COLUMNS};
use crate::storage::ObjectStore;

#[async_trait]
pub trait RecordSink: Send + Sync {
    fn name(&self) -> &str;

    /// Delivers one document's records. Must be safe to repeat.
    async fn deliver(&self, batch: &DocumentBatch) -> Result<(), PipelineError>;
}

/// Encodes records as CSV with a header row, in canonical column order.
pub fn to_csv(records: &[TransformedRecord]) -> anyhow::Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(RECORD_COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(String::from_utf8(bytes)?)
}

/// Object key of a batch's CSV, keyed by the bulletin date.
///
/// Undated bulletins are keyed by a short hash of their normalized link.
pub fn csv_key(prefix: &str, batch: &DocumentBatch) -> String {
    let name = match batch.date {
        Some(ref d) => format!("bulletin_{}.csv", format_date(d)),
        None => {
            let digest = Sha256::digest(normalize_link(&batch.link).as_bytes());
            format!(
                "bulletin_undated_{}_{}.csv",
                format_date(&batch.ingested_on),
                &hex::encode(digest)[..12]
            )
        }
    };
    if prefix.is_empty() {
        name
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), name)
    }
}

/// Deterministic document id for upserts.
///
/// `row` is the record's position within its bulletin, so repeated item lines
/// stay distinct. Undated bulletins are keyed by their link so they cannot
/// overwrite each other.
pub fn record_id(record: &TransformedRecord, link: &str, row: usize) -> String {
    let mut hasher = Sha256::new();
    match record.date {
        Some(ref d) => hasher.update(format_date(d).as_bytes()),
        None => {
            hasher.update(b"undated:");
            hasher.update(normalize_link(link).as_bytes());
        }
    }
    hasher.update(b"|");
    hasher.update(record.category.as_deref().unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(record.item.as_bytes());
    hasher.update(b"|");
    hasher.update(record.page.to_le_bytes());
    hasher.update(b"|");
    hasher.update((row as u64).to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Keyed documents for the document store, one per record.
pub fn to_documents(batch: &DocumentBatch) -> Vec<serde_json::Value> {
    batch
        .records
        .iter()
        .enumerate()
        .map(|(row, r)| {
            json!({
                "id": record_id(r, &batch.link, row),
                "category": r.category,
                "date": r.date.as_ref().map(format_date),
                "item": r.item,
                "average": r.average,
                "range_min": r.range_min,
                "range_max": r.range_max,
                "page": r.page,
                "ingested_on": format_date(&r.ingested_on),
                "source_link": normalize_link(&batch.link),
            })
        })
        .collect()
}

/// Writes each batch as a CSV object.
pub struct CsvSink {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl CsvSink {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl RecordSink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    async fn deliver(&self, batch: &DocumentBatch) -> Result<(), PipelineError> {
        let body = to_csv(&batch.records)
            .map_err(|e| PipelineError::Sink(format!("encoding CSV: {:#}", e)))?;
        let key = csv_key(&self.prefix, batch);
        self.store
            .put(&key, body.into_bytes())
            .await
            .map_err(|e| PipelineError::Sink(format!("writing {}: {:#}", key, e)))?;
        debug!(key = %key, rows = batch.records.len(), "wrote CSV");
        Ok(())
    }
}

/// Upserts keyed documents into the `price_records` table.
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RecordSink for SqliteRecordStore {
    fn name(&self) -> &str {
        "document_store"
    }

    async fn deliver(&self, batch: &DocumentBatch) -> Result<(), PipelineError> {
        let sink_err = |e: sqlx::Error| PipelineError::Sink(format!("document store: {}", e));
        let mut tx = self.pool.begin().await.map_err(sink_err)?;

        for doc in to_documents(batch) {
            sqlx::query(
                r#"
                INSERT INTO price_records (id, category, date, item, average, range_min, range_max, page, ingested_on, source_link, body_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    category = excluded.category,
                    date = excluded.date,
                    item = excluded.item,
                    average = excluded.average,
                    range_min = excluded.range_min,
                    range_max = excluded.range_max,
                    page = excluded.page,
                    ingested_on = excluded.ingested_on,
                    source_link = excluded.source_link,
                    body_json = excluded.body_json
                "#,
            )
            .bind(doc["id"].as_str())
            .bind(doc["category"].as_str())
            .bind(doc["date"].as_str())
            .bind(doc["item"].as_str())
            .bind(doc["average"].as_str())
            .bind(doc["range_min"].as_i64())
            .bind(doc["range_max"].as_i64())
            .bind(doc["page"].as_i64())
            .bind(doc["ingested_on"].as_str())
            .bind(doc["source_link"].as_str())
            .bind(doc.to_string())
            .execute(&mut *tx)
            .await
            .map_err(sink_err)?;
        }

        tx.commit().await.map_err(sink_err)?;
        Ok(())
    }
}

/// Delivers to every inner sink in order; the first failure fails the batch.
pub struct FanoutSink {
    sinks: Vec<Box<dyn RecordSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Box<dyn RecordSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl RecordSink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn deliver(&self, batch: &DocumentBatch) -> Result<(), PipelineError> {
        for sink in &self.sinks {
            sink.deliver(batch).await.map_err(|e| match e {
                PipelineError::Sink(msg) => PipelineError::Sink(format!("{}: {}", sink.name(), msg)),
                other => other,
            })?;
        }
        Ok(())
    }
}
