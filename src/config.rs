//! TOML configuration.
//!
//! Every setting has a default matching the one bulletin template this crate
//! was built for, so a config file only needs the sections it changes. The
//! line-classification grammars live under `[patterns]` so a layout revision
//! is a config edit rather than a code change.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub template: TemplateConfig,
    #[serde(default)]
    pub patterns: PatternsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Page listing the published bulletins.
    #[serde(default = "default_source_url")]
    pub url: String,
    /// Pre-seeded link list used by manual runs.
    #[serde(default = "default_links_file")]
    pub links_file: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_source_url(),
            links_file: default_links_file(),
        }
    }
}

fn default_source_url() -> String {
    "https://www.harti.gov.lk/index.php/en/market-information/data-food-commodities-bulletin"
        .to_string()
}
fn default_links_file() -> PathBuf {
    PathBuf::from("pdf_links.txt")
}

#[derive(Debug, Deserialize, Clone)]
pub struct TemplateConfig {
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default = "default_page_number")]
    pub page_number: u32,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            page_number: default_page_number(),
        }
    }
}

fn default_marker() -> String {
    "(Wholesale Prices of Rice & Subsidiary Food Crops)".to_string()
}
fn default_page_number() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatternsConfig {
    /// Category header phrases, matched literally at the start of a line.
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    /// Item line regex with three groups: name, range, average.
    #[serde(default = "default_item_pattern")]
    pub item: String,
    /// Date patterns, tried in order.
    #[serde(default = "default_date_patterns")]
    pub dates: Vec<DatePatternConfig>,
    /// Number of leading lines searched for the bulletin date.
    #[serde(default = "default_date_window")]
    pub date_window: usize,
    #[serde(default = "default_range_separator")]
    pub range_separator: String,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            item: default_item_pattern(),
            dates: default_date_patterns(),
            date_window: default_date_window(),
            range_separator: default_range_separator(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DatePatternConfig {
    pub regex: String,
    /// chrono format string used to parse a match.
    pub format: String,
}

fn default_categories() -> Vec<String> {
    [
        "Rice (Rs/kg)",
        "Imported Rice",
        "Dried Chillies (Rs/Kg)",
        "Onion (Rs/Kg)",
        "Big Onion",
        "Potatoes (Rs/Kg)",
        "Pulses (Rs/Kg)",
        "Consumption Item(Rs/Kg)",
        "Eggs (Rs/Egg)",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_item_pattern() -> String {
    r"^([a-zA-Z\s\(\)]*\d*)\s(\d+\.\d{2}\s-\s\d+\.\d{2})\s(\d+\.\d{2})".to_string()
}

fn default_date_patterns() -> Vec<DatePatternConfig> {
    [
        (r"\d{4}\.\d{2}\.\d{2}", "%Y.%m.%d"),
        (r"\d{2}\.\d{2}\.\d{4}", "%d.%m.%Y"),
        (r"\d{4}-\d{2}-\d{2}", "%Y-%m-%d"),
        (r"\d{2}-\d{2}-\d{4}", "%d-%m-%Y"),
        (r"\d{4}/\d{2}/\d{2}", "%Y/%m/%d"),
        (r"\d{2}/\d{2}/\d{4}", "%d/%m/%Y"),
    ]
    .iter()
    .map(|(regex, format)| DatePatternConfig {
        regex: regex.to_string(),
        format: format.to_string(),
    })
    .collect()
}

fn default_date_window() -> usize {
    7
}
fn default_range_separator() -> String {
    " - ".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory for the `local` backend.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default = "default_ledger_key")]
    pub ledger_key: String,
    #[serde(default = "default_csv_prefix")]
    pub csv_prefix: String,
    #[serde(default)]
    pub s3: Option<S3StorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            root: default_storage_root(),
            ledger_key: default_ledger_key(),
            csv_prefix: default_csv_prefix(),
            s3: None,
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data")
}
fn default_ledger_key() -> String {
    "processed_pdfs.txt".to_string()
}
fn default_csv_prefix() -> String {
    "csv/".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3StorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/records.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7071".to_string()
}

impl Config {
    /// All-defaults config for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.source.url.trim().is_empty() {
        bail!("source.url must not be empty");
    }

    if config.template.marker.is_empty() {
        bail!("template.marker must not be empty");
    }
    if config.template.page_number == 0 {
        bail!("template.page_number must be >= 1");
    }

    if config.patterns.date_window == 0 {
        bail!("patterns.date_window must be >= 1");
    }
    if config.patterns.categories.is_empty() {
        bail!("patterns.categories must list at least one header phrase");
    }
    if let Some(i) = config.patterns.categories.iter().position(|c| c.trim().is_empty()) {
        bail!("patterns.categories[{}] must not be blank", i);
    }
    if config.patterns.dates.is_empty() {
        bail!("patterns.dates must list at least one date pattern");
    }
    if config.patterns.range_separator.is_empty() {
        bail!("patterns.range_separator must not be empty");
    }

    if config.storage.ledger_key.trim().is_empty() {
        bail!("storage.ledger_key must not be empty");
    }
    if config.storage.backend == StorageBackend::S3 && config.storage.s3.is_none() {
        bail!("storage.backend = \"s3\" requires a [storage.s3] section");
    }

    if config.http.timeout_secs == 0 {
        bail!("http.timeout_secs must be > 0");
    }

    Ok(())
}
