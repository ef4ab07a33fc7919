//! Run orchestration.
//!
//! Coordinates one ingestion run: links → ledger filter → first-page read →
//! template gate → parse → transform → sink delivery → ledger update.
//!
//! Each document is isolated. Whatever goes wrong between reading a bulletin
//! and delivering its records becomes a [`DocumentOutcome::Failed`] value,
//! the link stays out of the ledger (so the next run retries it), and the run
//! moves on. Only discovery and ledger I/O can fail the run as a whole.
//!
//! The ledger is read once before the first document and persisted once after
//! the last, so a run that dies midway leaves the previous ledger intact and
//! every document it had delivered is simply delivered again next time (sinks
//! are idempotent).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::discover;
use crate::error::{ErrorKind, PipelineError};
use crate::extract;
use crate::fetch::{build_client, DocumentReader, HttpPdfReader};
use crate::ledger::{normalize_link, LedgerHandle};
use crate::migrate::migrate_pool;
use crate::models::{DocumentBatch, RawPage};
use crate::parser::Patterns;
use crate::progress::{NoProgress, ProgressMode, RunProgressEvent, RunProgressReporter};
use crate::retry::RetryPolicy;
use crate::sink::{to_csv, CsvSink, FanoutSink, RecordSink, SqliteRecordStore};
use crate::storage::open_store;
use crate::template;
use crate::transform::{transform, TransformOptions};

/// What happened to one link during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DocumentOutcome {
    Ingested { records: usize },
    TemplateMismatch,
    AlreadyProcessed,
    /// Not attempted because the run's document limit was reached.
    Deferred,
    Failed { kind: ErrorKind, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub link: String,
    #[serde(flatten)]
    pub outcome: DocumentOutcome,
}

/// Aggregated result of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub discovered: usize,
    pub already_processed: usize,
    pub ingested: usize,
    pub template_mismatch: usize,
    pub failed: usize,
    pub deferred: usize,
    pub records: usize,
    pub documents: Vec<DocumentReport>,
}

impl RunReport {
    fn push(&mut self, link: &str, outcome: DocumentOutcome) {
        match &outcome {
            DocumentOutcome::Ingested { records } => {
                self.ingested += 1;
                self.records += records;
            }
            DocumentOutcome::TemplateMismatch => self.template_mismatch += 1,
            DocumentOutcome::AlreadyProcessed => self.already_processed += 1,
            DocumentOutcome::Deferred => self.deferred += 1,
            DocumentOutcome::Failed { .. } => self.failed += 1,
        }
        self.documents.push(DocumentReport {
            link: link.to_string(),
            outcome,
        });
    }

    /// True when no document failed.
    pub fn ok(&self) -> bool {
        self.failed == 0
    }
}

pub struct Pipeline {
    patterns: Patterns,
    marker: String,
    page_number: u32,
    range_separator: String,
    reader: Arc<dyn DocumentReader>,
    sink: Arc<dyn RecordSink>,
    ledger: LedgerHandle,
    sink_retry: RetryPolicy,
    limit: Option<usize>,
    progress: Box<dyn RunProgressReporter>,
}

impl Pipeline {
    /// Compiles the configured patterns and wires the components together.
    /// Sink delivery is not retried until [`Pipeline::with_sink_retry`].
    pub fn new(
        config: &Config,
        reader: Arc<dyn DocumentReader>,
        sink: Arc<dyn RecordSink>,
        ledger: LedgerHandle,
    ) -> Result<Self> {
        Ok(Self {
            patterns: Patterns::from_config(&config.patterns)?,
            marker: config.template.marker.clone(),
            page_number: config.template.page_number,
            range_separator: config.patterns.range_separator.clone(),
            reader,
            sink,
            ledger,
            sink_retry: RetryPolicy::none(),
            limit: None,
            progress: Box::new(NoProgress),
        })
    }

    pub fn with_sink_retry(mut self, retry: RetryPolicy) -> Self {
        self.sink_retry = retry;
        self
    }

    /// Caps the number of new documents attempted; the rest are deferred.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn RunProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Runs the pipeline over `links`, stamping records with `ingested_on`.
    pub async fn run(
        &self,
        links: &[String],
        ingested_on: NaiveDate,
    ) -> Result<RunReport, PipelineError> {
        let mut ledger = self.ledger.read().await?;
        info!(entries = ledger.len(), key = self.ledger.key(), "loaded ledger");

        let options = TransformOptions {
            ingested_on,
            page_number: self.page_number,
            date_formats: self
                .patterns
                .date_formats()
                .into_iter()
                .map(str::to_string)
                .collect(),
            range_separator: self.range_separator.clone(),
        };

        let mut report = RunReport {
            discovered: links.len(),
            ..Default::default()
        };
        let mut attempted = 0usize;
        // Normalized links already tried this run, whatever their outcome.
        let mut seen: HashSet<String> = HashSet::new();

        for (i, link) in links.iter().enumerate() {
            let outcome = if ledger.contains(link) || seen.contains(&normalize_link(link)) {
                DocumentOutcome::AlreadyProcessed
            } else if self.limit.is_some_and(|max| attempted >= max) {
                DocumentOutcome::Deferred
            } else {
                attempted += 1;
                seen.insert(normalize_link(link));
                match self.process(link, &options).await {
                    Ok(outcome) => {
                        ledger.add(link);
                        outcome
                    }
                    Err(e) => {
                        warn!(link = %link, kind = %e.kind(), error = %e, "document failed; will retry next run");
                        DocumentOutcome::Failed {
                            kind: e.kind(),
                            reason: e.to_string(),
                        }
                    }
                }
            };

            self.progress.report(RunProgressEvent::Document {
                n: i + 1,
                total: links.len(),
                link,
                outcome: &outcome,
            });
            report.push(link, outcome);
        }

        self.ledger.persist(&ledger).await?;
        info!(
            ingested = report.ingested,
            mismatched = report.template_mismatch,
            failed = report.failed,
            records = report.records,
            "run complete"
        );
        Ok(report)
    }

    /// One document, read through delivery. `Ok` means the link may be ledgered.
    async fn process(
        &self,
        link: &str,
        options: &TransformOptions,
    ) -> Result<DocumentOutcome, PipelineError> {
        let page = self.reader.read_first_page(link).await?;

        if !template::matches(&page.lines, &self.marker) {
            info!(link, "template marker absent; skipping");
            return Ok(DocumentOutcome::TemplateMismatch);
        }

        let parsed = self.patterns.parse_page(&page);
        let records = transform(&parsed, options)?;
        let count = records.len();

        if count > 0 {
            let batch = DocumentBatch {
                link: link.to_string(),
                date: records.first().and_then(|r| r.date),
                ingested_on: options.ingested_on,
                records,
            };
            self.sink_retry
                .run("sink", || self.sink.deliver(&batch))
                .await?;
        }

        info!(link, records = count, "ingested bulletin");
        Ok(DocumentOutcome::Ingested { records: count })
    }
}

/// Collects the run's links: the given list file, or the source page.
pub async fn collect_links(
    config: &Config,
    client: &reqwest::Client,
    links_file: Option<&Path>,
    progress: &dyn RunProgressReporter,
) -> Result<Vec<String>, PipelineError> {
    match links_file {
        Some(path) => {
            progress.report(RunProgressEvent::Discovering {
                source: &path.display().to_string(),
            });
            discover::load_link_list(path)
        }
        None => {
            progress.report(RunProgressEvent::Discovering {
                source: &config.source.url,
            });
            discover::discover(client, &config.source.url).await
        }
    }
}

/// Builds the production components from `config` and runs once.
pub async fn execute(
    config: &Config,
    links_file: Option<&Path>,
    limit: Option<usize>,
    progress: ProgressMode,
) -> Result<RunReport> {
    let run_id = Uuid::new_v4();
    async {
        let reporter = progress.reporter();
        let client = build_client(&config.http)?;
        let links = collect_links(config, &client, links_file, reporter.as_ref()).await?;

        let store = open_store(config)?;
        let ledger = LedgerHandle::new(store.clone(), config.storage.ledger_key.clone());

        let pool = db::connect(config).await?;
        migrate_pool(&pool).await?;
        let sinks: Vec<Box<dyn RecordSink>> = vec![
            Box::new(CsvSink::new(store, config.storage.csv_prefix.clone())),
            Box::new(SqliteRecordStore::new(pool.clone())),
        ];
        let sink = FanoutSink::new(sinks);

        let retry = RetryPolicy::from_config(&config.http);
        let reader = HttpPdfReader::new(client, retry);
        let pipeline = Pipeline::new(config, Arc::new(reader), Arc::new(sink), ledger)?
            .with_sink_retry(retry)
            .with_limit(limit)
            .with_progress(reporter);

        let report = pipeline
            .run(&links, chrono::Local::now().date_naive())
            .await;
        pool.close().await;
        Ok::<_, anyhow::Error>(report?)
    }
    .instrument(info_span!("run", run_id = %run_id))
    .await
}

/// `bulletin sync`: one run with a stdout summary.
pub async fn run_sync(
    config: &Config,
    links_file: Option<PathBuf>,
    dry_run: bool,
    limit: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    if dry_run {
        return plan(config, links_file.as_deref(), limit, progress).await;
    }

    let report = execute(config, links_file.as_deref(), limit, progress).await?;

    println!("sync");
    println!("  discovered: {}", report.discovered);
    println!("  already processed: {}", report.already_processed);
    println!("  ingested: {}", report.ingested);
    println!("  skipped (template mismatch): {}", report.template_mismatch);
    println!("  failed: {}", report.failed);
    if report.deferred > 0 {
        println!("  deferred (limit): {}", report.deferred);
    }
    println!("  records: {}", report.records);
    for doc in &report.documents {
        if let DocumentOutcome::Failed { kind, reason } = &doc.outcome {
            println!("  ! {} [{}] {}", doc.link, kind, reason);
        }
    }
    if report.ok() {
        println!("ok");
    }
    Ok(())
}

/// Dry run: lists the links a real run would attempt. Reads nothing but the
/// source and the ledger, writes nothing.
async fn plan(
    config: &Config,
    links_file: Option<&Path>,
    limit: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    let reporter = progress.reporter();
    let client = build_client(&config.http)?;
    let links = collect_links(config, &client, links_file, reporter.as_ref()).await?;

    let store = open_store(config)?;
    let ledger = LedgerHandle::new(store, config.storage.ledger_key.clone())
        .read()
        .await?;

    let mut seen = HashSet::new();
    let mut pending: Vec<&String> = links
        .iter()
        .filter(|l| !ledger.contains(l) && seen.insert(normalize_link(l)))
        .collect();
    let already = links.iter().filter(|l| ledger.contains(l)).count();
    if let Some(max) = limit {
        pending.truncate(max);
    }

    println!("sync (dry-run)");
    println!("  discovered: {}", links.len());
    println!("  already processed: {}", already);
    println!("  would process: {}", pending.len());
    for link in pending {
        println!("  + {}", link);
    }
    Ok(())
}

/// `bulletin parse <PDF>`: offline run over one local file. Prints the
/// transformed records as CSV on stdout; touches neither ledger nor sinks.
pub fn run_parse(config: &Config, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read PDF: {}", path.display()))?;
    let text = extract::first_page_text(&bytes)
        .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
    let page = RawPage::from_text(&text);

    if !template::matches(&page.lines, &config.template.marker) {
        bail!(
            "{} does not carry the template marker {:?}",
            path.display(),
            config.template.marker
        );
    }

    let patterns = Patterns::from_config(&config.patterns)?;
    let options = TransformOptions {
        ingested_on: chrono::Local::now().date_naive(),
        page_number: config.template.page_number,
        date_formats: patterns
            .date_formats()
            .into_iter()
            .map(str::to_string)
            .collect(),
        range_separator: config.patterns.range_separator.clone(),
    };
    let records = transform(&patterns.parse_page(&page), &options)?;
    print!("{}", to_csv(&records)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_outcomes() {
        let mut report = RunReport::default();
        report.push("a", DocumentOutcome::Ingested { records: 3 });
        report.push("b", DocumentOutcome::Ingested { records: 0 });
        report.push("c", DocumentOutcome::TemplateMismatch);
        report.push("d", DocumentOutcome::AlreadyProcessed);
        assert_eq!(report.ingested, 2);
        assert_eq!(report.records, 3);
        assert_eq!(report.template_mismatch, 1);
        assert_eq!(report.already_processed, 1);
        assert!(report.ok());

        report.push(
            "e",
            DocumentOutcome::Failed {
                kind: ErrorKind::Fetch,
                reason: "HTTP 503".into(),
            },
        );
        assert!(!report.ok());
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let doc = DocumentReport {
            link: "https://s/a.pdf".into(),
            outcome: DocumentOutcome::Failed {
                kind: ErrorKind::Sink,
                reason: "down".into(),
            },
        };
        let v = serde_json::to_value(&doc).unwrap();
        assert_eq!(v["outcome"], "failed");
        assert_eq!(v["kind"], "sink");
        assert_eq!(v["link"], "https://s/a.pdf");
    }
}
