//! Thin adapters around lopdf: input sniffing, loading and serialization.

use crate::error::TransformError;
use lopdf::Document;

/// How far into the file the `%PDF-` header may appear.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Check that `bytes` look like a PDF file.
pub fn ensure_pdf(bytes: &[u8]) -> Result<(), TransformError> {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    if window.windows(5).any(|w| w == b"%PDF-") {
        Ok(())
    } else {
        Err(TransformError::InvalidInputType)
    }
}

/// Parse `bytes` into a document.
///
/// lopdf opens files encrypted with an empty user password on its own.
/// Anything still encrypted afterwards needs a password we do not have.
pub(crate) fn load_document(bytes: &[u8]) -> Result<Document, TransformError> {
    let doc = Document::load_mem(bytes).map_err(|e| TransformError::LoadError(e.to_string()))?;

    if doc.is_encrypted() {
        return Err(TransformError::LoadError(
            "document is password protected".to_string(),
        ));
    }

    if doc.encryption_state.is_some() {
        log::debug!("Opened encrypted document with empty user password");
    }
    Ok(doc)
}

/// Write the finished document to bytes.
///
/// `expected_pages` is re-checked against the page tree; a mismatch means
/// the pipeline itself is broken.
pub(crate) fn serialize(
    mut doc: Document,
    expected_pages: usize,
    compress: bool,
) -> Result<Vec<u8>, TransformError> {
    let actual = doc.get_pages().len();
    if actual != expected_pages {
        let msg = format!(
            "page tree holds {} pages, expected {}",
            actual, expected_pages
        );
        log::error!("Output invariant broken: {}", msg);
        return Err(TransformError::SerializeError(msg));
    }

    doc.prune_objects();
    if compress {
        doc.compress();
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| {
        log::error!(
            "Failed to write {} page document ({} objects): {}",
            expected_pages,
            doc.objects.len(),
            e
        );
        TransformError::SerializeError(e.to_string())
    })?;
    Ok(bytes)
}
