//! A5 Booklet PDF Library
//!
//! Core logic for normalizing PDFs for booklet printing. Shared between CLI
//! and WASM targets.
//!
//! Every page is re-embedded, scaled to fit and centered, on a fixed target
//! page size (A5 by default). Interactive AcroForm fields are flattened into
//! page content first, and blank pages are appended until the page count is a
//! multiple of 4.
//!
//! A page whose content cannot be embedded is left blank and reported as a
//! warning; it never aborts the document.

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub mod error;
pub mod forms;
pub mod geometry;
pub mod loader;
pub mod padding;
mod resources;
pub mod source;
mod transcode;

pub use error::{EmbedFailure, EmbedWarning, SizeLimit, TransformError};
pub use forms::{flatten_forms, inspect_form, FlattenReport, FormKind};
pub use geometry::{fit_centered, PageSize, Placement, A5_HEIGHT, A5_WIDTH};
pub use loader::ensure_pdf;
pub use padding::{pages_to_add, pages_to_add_for, BOOKLET_PAGE_MULTIPLE};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use transcode::{transcode_pages, OutputDocument};

/// Options for PDF normalization
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Output page width in points
    pub target_width: f32,
    /// Output page height in points
    pub target_height: f32,
    /// Pad the page count up to a multiple of this
    pub page_multiple: usize,
    /// Compress PDF streams (reduces file size)
    pub compress_streams: bool,
    /// Largest accepted input, in bytes
    pub max_input_bytes: usize,
    /// Largest accepted page count
    pub max_pages: usize,
    /// Prepare pages on a thread pool (native targets only)
    pub parallel: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            target_width: A5_WIDTH,
            target_height: A5_HEIGHT,
            page_multiple: BOOKLET_PAGE_MULTIPLE,
            compress_streams: true,
            max_input_bytes: 256 * 1024 * 1024,
            max_pages: 10_000,
            parallel: true,
        }
    }
}

impl TransformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_size(mut self, width: f32, height: f32) -> Self {
        self.target_width = width;
        self.target_height = height;
        self
    }

    pub fn page_multiple(mut self, multiple: usize) -> Self {
        self.page_multiple = multiple;
        self
    }

    pub fn compress_streams(mut self, compress: bool) -> Self {
        self.compress_streams = compress;
        self
    }

    pub fn max_input_bytes(mut self, max: usize) -> Self {
        self.max_input_bytes = max;
        self
    }

    pub fn max_pages(mut self, max: usize) -> Self {
        self.max_pages = max;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<(), TransformError> {
        let valid = |v: f32| v.is_finite() && v > 0.0;
        if !valid(self.target_width) || !valid(self.target_height) {
            return Err(TransformError::InvalidOptions(format!(
                "target page size must be positive, got {} x {}",
                self.target_width, self.target_height
            )));
        }
        if self.page_multiple == 0 {
            return Err(TransformError::InvalidOptions(
                "page multiple must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of a successful normalization
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// The finished PDF
    pub bytes: Vec<u8>,
    /// Pages in the source document
    pub original_page_count: usize,
    /// Blank pages appended for padding
    pub added_page_count: usize,
    /// Pages left blank because their content could not be embedded
    pub warnings: Vec<EmbedWarning>,
}

impl TransformOutput {
    pub fn total_page_count(&self) -> usize {
        self.original_page_count + self.added_page_count
    }
}

/// Cooperative cancellation flag, shared between the caller and a running
/// transform. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), TransformError> {
        if self.is_cancelled() {
            Err(TransformError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loading,
    FormChecking,
    Flattening,
    Transcoding,
    Padding,
    Serializing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loading => "loading",
            Stage::FormChecking => "form check",
            Stage::Flattening => "form flattening",
            Stage::Transcoding => "transcoding",
            Stage::Padding => "padding",
            Stage::Serializing => "serializing",
        };
        f.write_str(name)
    }
}

/// Normalize a PDF from bytes
pub fn transform(input: &[u8], options: &TransformOptions) -> Result<TransformOutput, TransformError> {
    transform_with_cancel(input, options, &CancelToken::new())
}

/// Normalize a PDF from bytes, stopping early once `cancel` is set.
pub fn transform_with_cancel(
    input: &[u8],
    options: &TransformOptions,
    cancel: &CancelToken,
) -> Result<TransformOutput, TransformError> {
    options.validate()?;

    if input.len() > options.max_input_bytes {
        return Err(TransformError::TooLarge {
            limit: SizeLimit::InputBytes,
            actual: input.len(),
            max: options.max_input_bytes,
        });
    }

    cancel.check()?;
    log::debug!("Stage: {}", Stage::Loading);
    let mut doc = loader::load_document(input)?;

    let page_ids = source::page_ids(&doc);
    let original_page_count = page_ids.len();
    if original_page_count > options.max_pages {
        return Err(TransformError::TooLarge {
            limit: SizeLimit::Pages,
            actual: original_page_count,
            max: options.max_pages,
        });
    }

    cancel.check()?;
    log::debug!("Stage: {}", Stage::FormChecking);
    match inspect_form(&doc) {
        FormKind::Xfa => return Err(TransformError::UnsupportedFormKind),
        FormKind::AcroForm => {
            log::debug!("Stage: {}", Stage::Flattening);
            flatten_forms(&mut doc)?;
        }
        FormKind::None => {}
    }

    cancel.check()?;
    log::debug!("Stage: {}", Stage::Transcoding);
    let source = &doc;
    let mut output = OutputDocument::new(options.target_width, options.target_height);
    let warnings = transcode_pages(source, &page_ids, &mut output, options.parallel, cancel)?;

    cancel.check()?;
    log::debug!("Stage: {}", Stage::Padding);
    let added_page_count = pages_to_add_for(original_page_count, options.page_multiple);
    output.append_blank_pages(added_page_count);

    log::debug!("Stage: {} ({} pages)", Stage::Serializing, output.page_count());
    let total = original_page_count + added_page_count;
    let bytes = loader::serialize(output.finish(), total, options.compress_streams)?;

    log::info!(
        "Normalized {} pages, added {} blank pages ({} total, {} left blank)",
        original_page_count,
        added_page_count,
        total,
        warnings.len()
    );

    Ok(TransformOutput {
        bytes,
        original_page_count,
        added_page_count,
        warnings,
    })
}

/// Suffix added to the input file stem to name the output.
pub const OUTPUT_SUFFIX: &str = "_A5_mod";

/// Derive the download/output file name: `report.pdf` becomes `report_A5_mod.pdf`.
pub fn output_file_name(input_name: &str) -> String {
    let name = input_name.trim();
    let stem = match name.len().checked_sub(4) {
        Some(i) if name.get(i..).is_some_and(|ext| ext.eq_ignore_ascii_case(".pdf")) => &name[..i],
        _ => name,
    };
    let stem = if stem.is_empty() { "document" } else { stem };
    format!("{}{}.pdf", stem, OUTPUT_SUFFIX)
}

#[cfg(not(target_arch = "wasm32"))]
pub mod file_ops {
    use super::*;
    use std::path::{Path, PathBuf};

    /// Normalize a PDF from file path to file path
    pub fn transform_pdf_file(
        input_path: &Path,
        output_path: &Path,
        options: &TransformOptions,
    ) -> Result<TransformOutput, TransformError> {
        let input = std::fs::read(input_path)
            .map_err(|e| TransformError::LoadError(format!("{:?}: {}", input_path, e)))?;
        ensure_pdf(&input)?;

        let result = transform(&input, options)?;

        std::fs::write(output_path, &result.bytes)
            .map_err(|e| TransformError::SerializeError(format!("{:?}: {}", output_path, e)))?;

        Ok(result)
    }

    /// Default output path: next to the input, named by [`output_file_name`].
    pub fn default_output_path(input_path: &Path) -> PathBuf {
        let name = input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        input_path.with_file_name(output_file_name(&name))
    }
}
