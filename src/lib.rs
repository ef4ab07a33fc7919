//! # Bulletin Ingest
//!
//! Idempotent ingestion of daily commodity price bulletins published as PDFs.
//!
//! Each run discovers bulletin links, skips those already recorded in the
//! processed ledger, reads page 1 of every new bulletin, checks it against the
//! known template, classifies its text lines into price records, normalizes
//! them, and delivers them downstream. A bulletin enters the ledger only once
//! its records have been accepted, so a failure is retried by the next run.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────┐   ┌──────────┐   ┌────────┐   ┌───────────┐
//! │ discover │──▶│ ledger │──▶│  fetch   │──▶│ parser │──▶│ transform │
//! │ page/list│   │ filter │   │ page 1   │   │ lines  │   │ records   │
//! └──────────┘   └────────┘   └──────────┘   └────────┘   └─────┬─────┘
//!                                                               ▼
//!                                        ┌────────────┐   ┌──────────┐
//!                                        │ CSV object │◀──│   sink   │
//!                                        │ SQLite rows│   └──────────┘
//!                                        └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`discover`] | Bulletin link discovery |
//! | [`ledger`] | Processed-document ledger |
//! | [`template`] | Template marker gate |
//! | [`parser`] | Line classification and record extraction |
//! | [`transform`] | Record normalization |
//! | [`fetch`] | Document reader (HTTP + PDF) |
//! | [`extract`] | PDF page-1 text extraction |
//! | [`retry`] | Exponential backoff |
//! | [`storage`] | Object store for the ledger and CSV output |
//! | [`s3`] | S3-compatible object store |
//! | [`sink`] | CSV and document-store delivery |
//! | [`pipeline`] | Run orchestration |
//! | [`progress`] | Run progress on stderr |
//! | [`server`] | HTTP trigger |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod discover;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod ledger;
pub mod migrate;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod s3;
pub mod server;
pub mod sink;
pub mod storage;
pub mod template;
pub mod transform;
