//! Processed-document ledger.
//!
//! The ledger is the set of bulletin links that have already been ingested
//! (or deliberately skipped). It is read once when a run starts and written
//! once when it ends, as newline-delimited UTF-8 text in the configured
//! [`ObjectStore`].
//!
//! Links are compared in normalized form: everything after the first `.pdf`
//! is dropped, which strips stray characters that the source markup sometimes
//! appends (`report.pdf%20%20` → `report.pdf`).

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::error::PipelineError;
use crate::storage::{open_store, ObjectStore};

const PDF_SUFFIX: &str = ".pdf";

/// Normalizes a document link. Idempotent.
pub fn normalize_link(link: &str) -> String {
    let link = link.trim();
    match link.find(PDF_SUFFIX) {
        Some(pos) => format!("{}{}", &link[..pos], PDF_SUFFIX),
        None => link.to_string(),
    }
}

/// Set of normalized links already handled by a previous run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedLedger {
    entries: HashSet<String>,
}

impl ProcessedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses persisted ledger text. Blank lines are ignored and every entry
    /// is normalized, so ledgers written by older runs load cleanly.
    pub fn load(raw_text: &str) -> Self {
        let entries = raw_text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(normalize_link)
            .collect();
        Self { entries }
    }

    pub fn contains(&self, link: &str) -> bool {
        self.entries.contains(&normalize_link(link))
    }

    /// Inserts the normalized link. Returns `false` if it was already present.
    pub fn add(&mut self, link: &str) -> bool {
        self.entries.insert(normalize_link(link))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in sorted order.
    pub fn entries(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.entries.iter().map(String::as_str).collect();
        v.sort_unstable();
        v
    }

    /// One entry per line. Sorted so successive ledgers diff cleanly.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for entry in self.entries() {
            out.push_str(entry);
            out.push('\n');
        }
        out
    }
}

/// Location of the persisted ledger: an object store plus a key.
#[derive(Clone)]
pub struct LedgerHandle {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl LedgerHandle {
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Loads the ledger. A missing object means nothing was processed yet.
    pub async fn read(&self) -> Result<ProcessedLedger, PipelineError> {
        let bytes = self.store.get(&self.key).await.map_err(|e| {
            PipelineError::Ledger(format!("reading {}: {:#}", self.describe(), e))
        })?;
        match bytes {
            Some(b) => {
                let text = String::from_utf8(b).map_err(|e| {
                    PipelineError::Ledger(format!("{} is not UTF-8: {}", self.describe(), e))
                })?;
                Ok(ProcessedLedger::load(&text))
            }
            None => Ok(ProcessedLedger::new()),
        }
    }

    pub async fn persist(&self, ledger: &ProcessedLedger) -> Result<(), PipelineError> {
        self.store
            .put(&self.key, ledger.serialize().into_bytes())
            .await
            .map_err(|e| PipelineError::Ledger(format!("writing {}: {:#}", self.describe(), e)))
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.store.describe(), self.key)
    }
}

/// `bulletin ledger`: prints the current entries, one per line.
pub async fn run_ledger(config: &Config) -> anyhow::Result<()> {
    let handle = LedgerHandle::new(open_store(config)?, config.storage.ledger_key.clone());
    let ledger = handle.read().await?;
    for entry in ledger.entries() {
        println!("{}", entry);
    }
    eprintln!("{} processed", ledger.len());
    Ok(())
}
