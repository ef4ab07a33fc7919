//! Bulletin link discovery.
//!
//! Two ways to obtain the links of a run:
//!
//! - [`discover`] scans the published source page for anchors pointing at PDFs;
//! - [`load_link_list`] reads a pre-seeded list file for manual backfills.
//!
//! Both return links in encounter order without deduplication; the ledger
//! decides what is new.

use std::path::Path;

use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::error::PipelineError;

/// Substring that marks an anchor target as a bulletin.
pub const PDF_MARKER: &str = ".pdf";

/// Extracts bulletin links from page markup.
///
/// Keeps every `<a href>` whose target contains `.pdf`, resolved against
/// `base_url`, in document order.
pub fn discover_links(markup: &str, base_url: &str) -> Result<Vec<String>, PipelineError> {
    let base = Url::parse(base_url)
        .map_err(|e| PipelineError::Discovery(format!("invalid source URL '{}': {}", base_url, e)))?;
    let anchors = Selector::parse("a[href]")
        .map_err(|e| PipelineError::Discovery(format!("anchor selector: {:?}", e)))?;

    let document = Html::parse_document(markup);
    let mut links = Vec::new();
    for element in document.select(&anchors) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if !href.contains(PDF_MARKER) {
            continue;
        }
        match base.join(href.trim()) {
            Ok(resolved) => links.push(resolved.to_string()),
            Err(e) => debug!(href, error = %e, "skipping unresolvable link"),
        }
    }
    Ok(links)
}

/// Fetches the source page and extracts its bulletin links.
pub async fn discover(
    client: &reqwest::Client,
    source_url: &str,
) -> Result<Vec<String>, PipelineError> {
    let resp = client
        .get(source_url)
        .send()
        .await
        .map_err(|e| PipelineError::Discovery(format!("fetching {}: {}", source_url, e)))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(PipelineError::Discovery(format!(
            "source page {} returned HTTP {}",
            source_url, status
        )));
    }

    // Relative targets resolve against the final URL after redirects.
    let base = resp.url().to_string();
    let markup = resp
        .text()
        .await
        .map_err(|e| PipelineError::Discovery(format!("reading {}: {}", source_url, e)))?;

    let links = discover_links(&markup, &base)?;
    info!(source = source_url, found = links.len(), "discovered bulletin links");
    Ok(links)
}

/// Reads a link list: one link per line, blank lines ignored.
pub fn load_link_list(path: &Path) -> Result<Vec<String>, PipelineError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Discovery(format!("reading link list {}: {}", path.display(), e))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const BASE: &str = "https://www.harti.gov.lk/index.php/en/market-information/data-food-commodities-bulletin";

    #[test]
    fn keeps_only_pdf_links_in_order() {
        let html = r#"
            <html><body>
              <a href="/images/download/bulletin/2024/daily_24-02-2024.pdf">24 Feb</a>
              <a href="/index.php/en/contact">Contact</a>
              <a href="https://cdn.example.org/daily_23-02-2024.pdf%20%20">23 Feb</a>
              <a>no target</a>
              <a href="files/weekly.PDF">Weekly</a>
            </body></html>"#;
        let links = discover_links(html, BASE).unwrap();
        assert_eq!(
            links,
            vec![
                "https://www.harti.gov.lk/images/download/bulletin/2024/daily_24-02-2024.pdf",
                "https://cdn.example.org/daily_23-02-2024.pdf%20%20",
            ]
        );
    }

    #[test]
    fn resolves_relative_targets_against_base() {
        let html = r#"<a href="reports/a.pdf">a</a>"#;
        let links = discover_links(html, "https://site.test/en/bulletins/").unwrap();
        assert_eq!(links, vec!["https://site.test/en/bulletins/reports/a.pdf"]);
    }

    #[test]
    fn duplicates_are_preserved() {
        let html = r#"<a href="/a.pdf">1</a><a href="/a.pdf">2</a>"#;
        assert_eq!(discover_links(html, "https://site.test/").unwrap().len(), 2);
    }

    #[test]
    fn invalid_base_is_a_discovery_failure() {
        let err = discover_links("<a href=\"a.pdf\">a</a>", "not a url").unwrap_err();
        assert!(matches!(err, PipelineError::Discovery(_)));
    }

    #[test]
    fn link_list_skips_blank_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pdf_links.txt");
        fs::write(&path, "https://s/a.pdf\n\n  https://s/b.pdf  \n").unwrap();
        assert_eq!(
            load_link_list(&path).unwrap(),
            vec!["https://s/a.pdf", "https://s/b.pdf"]
        );
    }

    #[test]
    fn missing_link_list_is_a_discovery_failure() {
        let err = load_link_list(Path::new("/nonexistent/pdf_links.txt")).unwrap_err();
        assert!(matches!(err, PipelineError::Discovery(_)));
    }
}
