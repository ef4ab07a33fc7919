//! Template gate run before parsing.

/// True iff `marker` appears verbatim inside any line.
pub fn matches<S: AsRef<str>>(lines: &[S], marker: &str) -> bool {
    lines.iter().any(|line| line.as_ref().contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "(Wholesale Prices of Rice & Subsidiary Food Crops)";

    #[test]
    fn finds_marker_as_substring() {
        let lines = [
            "HARTI Daily Food Commodities Bulletin",
            "Pettah (Wholesale Prices of Rice & Subsidiary Food Crops) 24.02.2024",
        ];
        assert!(matches(&lines, MARKER));
    }

    #[test]
    fn marker_must_be_verbatim() {
        let lines = ["(Retail Prices of Rice & Subsidiary Food Crops)"];
        assert!(!matches(&lines, MARKER));
        let split = ["(Wholesale Prices of Rice &", "Subsidiary Food Crops)"];
        assert!(!matches(&split, MARKER));
        let empty: [&str; 0] = [];
        assert!(!matches(&empty, MARKER));
    }
}
