//! First-page text extraction from PDF bytes.
//!
//! Only page 1 of a bulletin carries the price table this crate reads, so the
//! remaining pages are rendered by `pdf-extract` but discarded.

/// Extraction error. The pipeline maps it to a per-document parse failure.
#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    NoPages,
    EmptyFirstPage,
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::NoPages => write!(f, "PDF has no pages"),
            ExtractError::EmptyFirstPage => write!(f, "first page has no extractable text"),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Returns the text of page 1.
pub fn first_page_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let first = pages.into_iter().next().ok_or(ExtractError::NoPages)?;
    if first.trim().is_empty() {
        return Err(ExtractError::EmptyFirstPage);
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pdf_returns_error() {
        let err = first_page_text(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn html_error_page_is_not_a_pdf() {
        let err = first_page_text(b"<html><body>404 Not Found</body></html>").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }
}
