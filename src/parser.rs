//! Line classification engine.
//!
//! A bulletin's first page is a loose stream of text lines: page furniture,
//! category headers such as `Rice (Rs/kg)`, and item lines such as
//! `White Rice 120.00 - 150.00 135.00`. The parser makes one pass over the
//! lines, carrying the most recent header as the category of each item that
//! follows it.
//!
//! Header detection always takes precedence over item detection: a line is
//! tested against the category pattern first and the item pattern second.
//!
//! The bulletin date is taken from a bounded window of leading lines
//! ([`Patterns::extract_date`]) and attached to every record of the page.

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::PatternsConfig;
use crate::models::{PriceRecord, RawPage};

/// One accepted textual date layout.
#[derive(Debug, Clone)]
pub struct DatePattern {
    pub regex: Regex,
    /// chrono format that parses a string matched by `regex`.
    pub format: String,
}

/// Compiled line grammars for one template revision.
#[derive(Debug, Clone)]
pub struct Patterns {
    category: Regex,
    item: Regex,
    dates: Vec<DatePattern>,
    date_window: usize,
}

/// Classification of a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Header(String),
    Item {
        item: String,
        range: String,
        average: String,
    },
    Noise,
}

impl Patterns {
    pub fn from_config(config: &PatternsConfig) -> Result<Self> {
        let alternation = config
            .categories
            .iter()
            .map(|phrase| regex::escape(phrase))
            .collect::<Vec<_>>()
            .join("|");
        let category = Regex::new(&format!("^(?:{})", alternation))
            .context("Failed to compile category header pattern")?;

        let item = Regex::new(&config.item)
            .with_context(|| format!("Failed to compile item pattern: {}", config.item))?;
        if item.captures_len() < 4 {
            anyhow::bail!(
                "item pattern must have three capture groups (name, range, average): {}",
                config.item
            );
        }

        let dates = config
            .dates
            .iter()
            .map(|d| {
                Ok(DatePattern {
                    regex: Regex::new(&d.regex)
                        .with_context(|| format!("Failed to compile date pattern: {}", d.regex))?,
                    format: d.format.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            category,
            item,
            dates,
            date_window: config.date_window,
        })
    }

    /// chrono formats of the date patterns, in match order.
    pub fn date_formats(&self) -> Vec<&str> {
        self.dates.iter().map(|d| d.format.as_str()).collect()
    }

    /// Classifies one line. `line` is trimmed before matching.
    pub fn classify_line(&self, line: &str) -> LineKind {
        let line = line.trim();
        if line.is_empty() {
            return LineKind::Blank;
        }

        if let Some(m) = self.category.find(line) {
            return LineKind::Header(m.as_str().to_string());
        }

        if let Some(caps) = self.item.captures(line) {
            let group = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();
            return LineKind::Item {
                item: group(1).trim().to_string(),
                range: group(2).to_string(),
                average: group(3).to_string(),
            };
        }

        LineKind::Noise
    }

    /// Finds the bulletin date in the first `date_window` lines.
    ///
    /// Lines are scanned in order and, within a line, patterns in configured
    /// order; the first hit wins.
    pub fn extract_date<S: AsRef<str>>(&self, lines: &[S]) -> Option<String> {
        lines.iter().take(self.date_window).find_map(|line| {
            self.dates
                .iter()
                .find_map(|p| p.regex.find(line.as_ref()))
                .map(|m| m.as_str().to_string())
        })
    }

    /// Parses every price record on the page.
    pub fn parse_page(&self, page: &RawPage) -> Vec<PriceRecord> {
        let date = self.extract_date(&page.lines);
        let mut records = Vec::new();
        let mut current_category: Option<String> = None;

        for line in &page.lines {
            current_category = self.step(line, current_category, date.as_deref(), &mut records);
        }

        records
    }

    /// Advances the carried category by one line, pushing a record for item lines.
    fn step(
        &self,
        line: &str,
        current_category: Option<String>,
        date: Option<&str>,
        records: &mut Vec<PriceRecord>,
    ) -> Option<String> {
        match self.classify_line(line) {
            LineKind::Header(phrase) => Some(phrase),
            LineKind::Item {
                item,
                range,
                average,
            } => {
                records.push(PriceRecord {
                    date: date.map(str::to_string),
                    category: current_category.clone(),
                    item,
                    range,
                    average,
                });
                current_category
            }
            LineKind::Blank | LineKind::Noise => current_category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Patterns {
        Patterns::from_config(&PatternsConfig::default()).unwrap()
    }

    #[test]
    fn header_then_item_carries_category() {
        let page = RawPage::from_lines(["Rice (Rs/kg)", "White Rice 120.00 - 150.00 135.00"]);
        let records = patterns().parse_page(&page);
        assert_eq!(
            records,
            vec![PriceRecord {
                date: None,
                category: Some("Rice (Rs/kg)".to_string()),
                item: "White Rice".to_string(),
                range: "120.00 - 150.00".to_string(),
                average: "135.00".to_string(),
            }]
        );
    }

    #[test]
    fn item_without_header_has_null_category() {
        let page = RawPage::from_lines(["Samba 210.00 - 230.00 220.00"]);
        let records = patterns().parse_page(&page);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, None);
        assert_eq!(records[0].item, "Samba");
    }

    #[test]
    fn later_header_replaces_earlier() {
        let page = RawPage::from_lines([
            "Rice (Rs/kg)",
            "Nadu 180.00 - 190.00 185.00",
            "",
            "Big Onion",
            "Red Onion (Local) 300.00 - 320.00 310.00",
            "Page 1 of 4",
        ]);
        let records = patterns().parse_page(&page);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].category.as_deref(), Some("Rice (Rs/kg)"));
        assert_eq!(records[1].category.as_deref(), Some("Big Onion"));
        assert_eq!(records[1].item, "Red Onion (Local)");
    }

    #[test]
    fn header_precedence_over_item() {
        // Starts with a header phrase and also has the item shape.
        let p = patterns();
        assert_eq!(
            p.classify_line("Imported Rice 120.00 - 150.00 135.00"),
            LineKind::Header("Imported Rice".to_string())
        );
        let page = RawPage::from_lines(["Imported Rice 120.00 - 150.00 135.00"]);
        assert!(p.parse_page(&page).is_empty());
    }

    #[test]
    fn category_pattern_is_anchored_for_every_phrase() {
        let p = patterns();
        assert_eq!(p.classify_line("Local Big Onion notes"), LineKind::Noise);
        assert_eq!(
            p.classify_line("   Eggs (Rs/Egg)  "),
            LineKind::Header("Eggs (Rs/Egg)".to_string())
        );
    }

    #[test]
    fn noise_and_blank_lines_are_ignored() {
        let p = patterns();
        assert_eq!(p.classify_line("   "), LineKind::Blank);
        assert_eq!(p.classify_line("Hector Kobbekaduwa Agrarian Research"), LineKind::Noise);
        assert_eq!(p.classify_line("White Rice 120 - 150 135"), LineKind::Noise);
    }

    #[test]
    fn item_name_may_end_in_digits() {
        match patterns().classify_line("Red Onion 2 400.00 - 450.00 425.00") {
            LineKind::Item { item, range, average } => {
                assert_eq!(item, "Red Onion 2");
                assert_eq!(range, "400.00 - 450.00");
                assert_eq!(average, "425.00");
            }
            other => panic!("expected item, got {:?}", other),
        }
    }

    #[test]
    fn date_found_inside_window() {
        let mut lines: Vec<String> = (0..10).map(|i| format!("line {}", i)).collect();
        lines[6] = "Date: 24.02.2024".to_string();
        assert_eq!(patterns().extract_date(&lines).as_deref(), Some("24.02.2024"));
    }

    #[test]
    fn date_outside_window_is_ignored() {
        let mut lines: Vec<String> = (0..10).map(|i| format!("line {}", i)).collect();
        lines[7] = "Date: 24.02.2024".to_string();
        assert_eq!(patterns().extract_date(&lines), None);
    }

    #[test]
    fn first_line_then_first_pattern_wins() {
        let lines = [
            "no date here",
            "issued 2024/02/25 for 24.02.2024",
            "2024.01.01",
        ];
        // Line 1 is the first line with a date; within it DD.MM.YYYY is
        // listed before YYYY/MM/DD.
        assert_eq!(patterns().extract_date(&lines).as_deref(), Some("24.02.2024"));
    }

    #[test]
    fn short_pages_do_not_fail_date_scan() {
        let lines = ["only", "two lines"];
        assert_eq!(patterns().extract_date(&lines), None);
    }

    #[test]
    fn every_record_shares_the_document_date() {
        let page = RawPage::from_lines([
            "HARTI",
            "2024-03-01",
            "Rice (Rs/kg)",
            "Nadu 180.00 - 190.00 185.00",
            "Samba 200.00 - 210.00 205.00",
        ]);
        let records = patterns().parse_page(&page);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.date.as_deref() == Some("2024-03-01")));
    }

    #[test]
    fn item_pattern_needs_three_groups() {
        let cfg = PatternsConfig {
            item: r"^(\w+)\s(\d+)".to_string(),
            ..PatternsConfig::default()
        };
        assert!(Patterns::from_config(&cfg).is_err());
    }
}
