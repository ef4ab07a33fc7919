//! Normalization of parsed records.
//!
//! Pure functions: the ingestion date is passed in rather than read from the
//! clock so a run stamps every record with the same value.

use chrono::NaiveDate;

use crate::error::PipelineError;
use crate::models::{PriceRecord, TransformedRecord};

/// Settings that are constant for one run.
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub ingested_on: NaiveDate,
    pub page_number: u32,
    /// chrono formats tried in order when parsing the bulletin date.
    pub date_formats: Vec<String>,
    pub range_separator: String,
}

/// Parses `s` with the first format that accepts it.
pub fn parse_date<S: AsRef<str>>(s: &str, formats: &[S]) -> Option<NaiveDate> {
    let s = s.trim();
    formats
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f.as_ref()).ok())
}

/// Splits a printed range into `(min, max)`.
///
/// Each side is parsed as a decimal and truncated to an integer. Missing or
/// non-numeric sides become `0`; this never fails.
pub fn split_range(range: &str, separator: &str) -> (i64, i64) {
    let mut parts = range.splitn(2, separator);
    let min = parts.next().map(coerce_number).unwrap_or(0);
    let max = parts.next().map(coerce_number).unwrap_or(0);
    (min, max)
}

fn coerce_number(s: &str) -> i64 {
    match s.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v.trunc() as i64,
        _ => 0,
    }
}

/// Transforms one document's records.
///
/// Fails only when the batch mixes bulletin dates, which the parser never
/// produces for a single page.
pub fn transform(
    records: &[PriceRecord],
    options: &TransformOptions,
) -> Result<Vec<TransformedRecord>, PipelineError> {
    if let Some(first) = records.first() {
        if let Some(other) = records.iter().find(|r| r.date != first.date) {
            return Err(PipelineError::TransformationPrecondition(format!(
                "records of one document carry different dates ({:?} vs {:?})",
                first.date, other.date
            )));
        }
    }

    let date = records
        .first()
        .and_then(|r| r.date.as_deref())
        .and_then(|d| parse_date(d, &options.date_formats));

    Ok(records
        .iter()
        .map(|r| {
            let (range_min, range_max) = split_range(&r.range, &options.range_separator);
            TransformedRecord {
                ingested_on: options.ingested_on,
                date,
                category: r.category.clone(),
                item: r.item.clone(),
                average: r.average.clone(),
                range_min,
                range_max,
                page: options.page_number,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMATS: [&str; 6] = [
        "%Y.%m.%d",
        "%d.%m.%Y",
        "%Y-%m-%d",
        "%d-%m-%Y",
        "%Y/%m/%d",
        "%d/%m/%Y",
    ];

    fn options() -> TransformOptions {
        TransformOptions {
            ingested_on: NaiveDate::from_ymd_opt(2024, 2, 26).unwrap(),
            page_number: 1,
            date_formats: FORMATS.iter().map(|s| s.to_string()).collect(),
            range_separator: " - ".to_string(),
        }
    }

    fn record(date: Option<&str>, range: &str) -> PriceRecord {
        PriceRecord {
            date: date.map(str::to_string),
            category: Some("Rice (Rs/kg)".to_string()),
            item: "White Rice".to_string(),
            range: range.to_string(),
            average: "135.00".to_string(),
        }
    }

    #[test]
    fn parses_all_accepted_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 24);
        for s in [
            "2024.02.24",
            "24.02.2024",
            "2024-02-24",
            "24-02-2024",
            "2024/02/24",
            "24/02/2024",
        ] {
            assert_eq!(parse_date(s, &FORMATS), expected, "{}", s);
        }
        assert_eq!(parse_date("24 Feb 2024", &FORMATS), None);
        assert_eq!(parse_date("31.02.2024", &FORMATS), None);
    }

    #[test]
    fn split_range_numeric() {
        assert_eq!(split_range("120.00 - 150.00", " - "), (120, 150));
        assert_eq!(split_range("120.75 - 150.20", " - "), (120, 150));
    }

    #[test]
    fn split_range_coerces_garbage_to_zero() {
        assert_eq!(split_range("abc", " - "), (0, 0));
        assert_eq!(split_range("120.00 - n/a", " - "), (120, 0));
        assert_eq!(split_range("", " - "), (0, 0));
        assert_eq!(split_range("120.00-150.00", " - "), (0, 0));
    }

    #[test]
    fn transform_shapes_record() {
        let out = transform(&[record(Some("24.02.2024"), "120.00 - 150.00")], &options()).unwrap();
        assert_eq!(
            out,
            vec![TransformedRecord {
                ingested_on: NaiveDate::from_ymd_opt(2024, 2, 26).unwrap(),
                date: NaiveDate::from_ymd_opt(2024, 2, 24),
                category: Some("Rice (Rs/kg)".to_string()),
                item: "White Rice".to_string(),
                average: "135.00".to_string(),
                range_min: 120,
                range_max: 150,
                page: 1,
            }]
        );
    }

    #[test]
    fn null_or_unparseable_date_stays_unset() {
        let out = transform(&[record(None, "1.00 - 2.00")], &options()).unwrap();
        assert_eq!(out[0].date, None);
        let out = transform(&[record(Some("99.99.9999"), "1.00 - 2.00")], &options()).unwrap();
        assert_eq!(out[0].date, None);
    }

    #[test]
    fn empty_batch_is_fine() {
        assert!(transform(&[], &options()).unwrap().is_empty());
    }

    #[test]
    fn mixed_dates_violate_precondition() {
        let err = transform(
            &[
                record(Some("24.02.2024"), "1.00 - 2.00"),
                record(Some("25.02.2024"), "1.00 - 2.00"),
            ],
            &options(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::TransformationPrecondition(_)));
    }
}
