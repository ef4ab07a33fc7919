//! Run progress on stderr.
//!
//! `bulletin sync` reports where links come from and, per bulletin, what
//! happened to it. Progress goes to stderr so the stdout summary stays
//! parseable for scripts.

use std::io::Write;

use crate::pipeline::DocumentOutcome;

#[derive(Clone, Copy, Debug)]
pub enum RunProgressEvent<'a> {
    /// Links are being collected from a source page or list file.
    Discovering { source: &'a str },
    /// Bulletin `n` of `total` has been handled.
    Document {
        n: usize,
        total: usize,
        link: &'a str,
        outcome: &'a DocumentOutcome,
    },
}

pub trait RunProgressReporter: Send + Sync {
    fn report(&self, event: RunProgressEvent<'_>);
}

/// Short status for one outcome, e.g. `ingested 52 records` or `failed (fetch)`.
fn describe_outcome(outcome: &DocumentOutcome) -> String {
    match outcome {
        DocumentOutcome::Ingested { records: 1 } => "ingested 1 record".to_string(),
        DocumentOutcome::Ingested { records } => format!("ingested {} records", records),
        DocumentOutcome::TemplateMismatch => "skipped (template mismatch)".to_string(),
        DocumentOutcome::AlreadyProcessed => "already processed".to_string(),
        DocumentOutcome::Deferred => "deferred (limit)".to_string(),
        DocumentOutcome::Failed { kind, .. } => format!("failed ({})", kind),
    }
}

fn human_line(event: &RunProgressEvent<'_>) -> String {
    match event {
        RunProgressEvent::Discovering { source } => format!("sync  discovering {}", source),
        RunProgressEvent::Document {
            n,
            total,
            link,
            outcome,
        } => {
            let width = total.to_string().len();
            format!(
                "sync  [{:>width$}/{}] {}  {}",
                n,
                total,
                describe_outcome(outcome),
                link,
                width = width
            )
        }
    }
}

fn json_line(event: &RunProgressEvent<'_>) -> serde_json::Value {
    match event {
        RunProgressEvent::Discovering { source } => serde_json::json!({
            "event": "discovering",
            "source": source,
        }),
        RunProgressEvent::Document {
            n,
            total,
            link,
            outcome,
        } => {
            let mut obj = serde_json::json!({
                "event": "document",
                "n": n,
                "total": total,
                "link": link,
            });
            if let (Some(map), Ok(serde_json::Value::Object(fields))) =
                (obj.as_object_mut(), serde_json::to_value(outcome))
            {
                map.extend(fields);
            }
            obj
        }
    }
}

/// Human-friendly lines: `sync  [ 3/40] ingested 52 records  <link>`.
pub struct StderrProgress;

impl RunProgressReporter for StderrProgress {
    fn report(&self, event: RunProgressEvent<'_>) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", human_line(&event));
        let _ = stderr.flush();
    }
}

/// One JSON object per line, with the outcome fields flattened in.
pub struct JsonProgress;

impl RunProgressReporter for JsonProgress {
    fn report(&self, event: RunProgressEvent<'_>) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", json_line(&event));
        let _ = stderr.flush();
    }
}

pub struct NoProgress;

impl RunProgressReporter for NoProgress {
    fn report(&self, _event: RunProgressEvent<'_>) {}
}

/// `--progress` values.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn RunProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn human_line_names_outcome_and_link() {
        let outcome = DocumentOutcome::Ingested { records: 52 };
        let line = human_line(&RunProgressEvent::Document {
            n: 3,
            total: 40,
            link: "https://s/daily_24-02-2024.pdf",
            outcome: &outcome,
        });
        assert_eq!(
            line,
            "sync  [ 3/40] ingested 52 records  https://s/daily_24-02-2024.pdf"
        );

        let failed = DocumentOutcome::Failed {
            kind: ErrorKind::Fetch,
            reason: "HTTP 404".to_string(),
        };
        let line = human_line(&RunProgressEvent::Document {
            n: 1,
            total: 1,
            link: "https://s/gone.pdf",
            outcome: &failed,
        });
        assert!(line.contains("failed (fetch)"), "{line}");
    }

    #[test]
    fn json_line_flattens_outcome() {
        let outcome = DocumentOutcome::Failed {
            kind: ErrorKind::Sink,
            reason: "document store: locked".to_string(),
        };
        let value = json_line(&RunProgressEvent::Document {
            n: 2,
            total: 5,
            link: "https://s/a.pdf",
            outcome: &outcome,
        });
        assert_eq!(value["event"], "document");
        assert_eq!(value["n"], 2);
        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["kind"], "sink");
        assert_eq!(value["reason"], "document store: locked");
    }

    #[test]
    fn template_mismatch_reads_as_skip() {
        assert_eq!(
            describe_outcome(&DocumentOutcome::TemplateMismatch),
            "skipped (template mismatch)"
        );
        assert_eq!(
            describe_outcome(&DocumentOutcome::Ingested { records: 1 }),
            "ingested 1 record"
        );
    }
}
