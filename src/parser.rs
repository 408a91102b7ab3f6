//! Page-level text extraction for uploaded documents.
//!
//! The parser receives the raw payload already fetched into memory and turns
//! it into an ordered sequence of page units. Extraction is CPU-bound and has
//! no side effects; anything that is not a well-formed, text-extractable PDF
//! is reported as a [`ParseError`].

use thiserror::Error;

/// MIME type accepted by the ingestion pipeline.
pub const MIME_PDF: &str = "application/pdf";

/// Errors raised while extracting page text from a payload.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The upload declared a content type the parser cannot extract.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    /// The payload is not a well-formed document of the declared type.
    #[error("PDF extraction failed: {0}")]
    Extraction(String),
    /// Extraction succeeded but produced no usable text on any page.
    #[error("document contains no extractable text")]
    EmptyDocument,
}

/// One page worth of extracted text, order-preserving within its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUnit {
    /// 0-based page index within the source document.
    pub page_index: usize,
    /// Raw text extracted from the page.
    pub text: String,
}

/// Extract ordered page units from an in-memory payload.
///
/// Fails when the declared content type is unsupported, when the bytes are
/// not a well-formed PDF, or when no page yields any non-whitespace text.
pub fn parse_document(bytes: &[u8], content_type: &str) -> Result<Vec<PageUnit>, ParseError> {
    if content_type != MIME_PDF {
        return Err(ParseError::UnsupportedContentType(content_type.to_string()));
    }

    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|err| ParseError::Extraction(err.to_string()))?;

    let units: Vec<PageUnit> = pages
        .into_iter()
        .enumerate()
        .map(|(page_index, text)| PageUnit { page_index, text })
        .collect();

    if units.iter().all(|unit| unit.text.trim().is_empty()) {
        return Err(ParseError::EmptyDocument);
    }

    tracing::debug!(pages = units.len(), "Extracted page units");
    Ok(units)
}
