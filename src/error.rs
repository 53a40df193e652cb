//! Error types for the page-normalization pipeline.

use std::fmt;
use thiserror::Error;

/// Which defensive ceiling an input ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeLimit {
    InputBytes,
    Pages,
}

impl fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeLimit::InputBytes => write!(f, "bytes"),
            SizeLimit::Pages => write!(f, "pages"),
        }
    }
}

/// Fatal errors. Any of these stops the pipeline and no output is produced.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Input is not a PDF file")]
    InvalidInputType,

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Failed to load PDF: {0}")]
    LoadError(String),

    #[error("Document contains a dynamic (XFA) form; print it to a static PDF first")]
    UnsupportedFormKind,

    #[error("Failed to flatten form fields: {0}")]
    FormFlattenError(String),

    #[error("Input too large: {actual} {limit} (maximum is {max})")]
    TooLarge {
        limit: SizeLimit,
        actual: usize,
        max: usize,
    },

    #[error("Failed to save PDF: {0}")]
    SerializeError(String),

    #[error("Processing was cancelled")]
    Cancelled,
}

/// Why a single source page could not be embedded. Never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbedFailure {
    #[error("page object is missing or not a dictionary")]
    MissingPage,

    #[error("page has no content stream")]
    MissingContent,

    #[error("page content stream is empty")]
    EmptyContent,

    #[error("content stream could not be decoded: {0}")]
    UndecodableContent(String),

    #[error("page box has zero area ({width} x {height})")]
    ZeroArea { width: f32, height: f32 },
}

/// A per-page embedding failure. The affected output page is left blank.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedWarning {
    /// Zero-based index of the source page.
    pub page_index: usize,
    pub reason: EmbedFailure,
}

impl fmt::Display for EmbedWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} left blank: {}", self.page_index + 1, self.reason)
    }
}
