//! Core data models flowing through the ingestion pipeline.
//!
//! Text comes in as a [`RawPage`], the parser turns it into
//! [`PriceRecord`]s, and the transformer produces [`TransformedRecord`]s that
//! are grouped per bulletin into a [`DocumentBatch`] for the sinks.

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

/// Text lines of a document's first page, in rendered order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPage {
    pub lines: Vec<String>,
}

impl RawPage {
    /// Splits extracted text on `\n`. Blank lines are kept so line indices
    /// match the rendered page.
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.split('\n').map(|l| l.trim_end_matches('\r').to_string()).collect(),
        }
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// True when no line carries any non-whitespace text.
    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }
}

/// One item line of a bulletin, as parsed from text.
///
/// `category` is carried from the most recent header line; it is `None` only
/// when no header preceded the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRecord {
    pub date: Option<String>,
    pub category: Option<String>,
    pub item: String,
    /// Price range as printed, e.g. `"120.00 - 150.00"`.
    pub range: String,
    pub average: String,
}

/// A normalized price record in canonical column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformedRecord {
    #[serde(serialize_with = "serialize_date")]
    pub ingested_on: NaiveDate,
    #[serde(serialize_with = "serialize_opt_date")]
    pub date: Option<NaiveDate>,
    pub category: Option<String>,
    pub item: String,
    pub average: String,
    pub range_min: i64,
    pub range_max: i64,
    pub page: u32,
}

/// Column headers matching the field order of [`TransformedRecord`].
pub const RECORD_COLUMNS: [&str; 8] = [
    "ingested_on",
    "date",
    "category",
    "item",
    "average",
    "range_min",
    "range_max",
    "page",
];

/// The transformed output of one bulletin, handed to a sink as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentBatch {
    pub link: String,
    pub date: Option<NaiveDate>,
    pub ingested_on: NaiveDate,
    pub records: Vec<TransformedRecord>,
}

pub(crate) fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn serialize_date<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_date(date))
}

fn serialize_opt_date<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
    match date {
        Some(d) => s.serialize_str(&format_date(d)),
        None => s.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_text_keeps_blank_lines_and_strips_cr() {
        let page = RawPage::from_text("a\r\n\nb");
        assert_eq!(page.lines, vec!["a", "", "b"]);
        assert!(!page.is_blank());
        assert!(RawPage::from_text(" \n\t\n").is_blank());
    }
}
