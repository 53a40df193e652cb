//! WebAssembly bindings for the A5 booklet normalizer

use crate::{ensure_pdf, transform, TransformOptions, A5_HEIGHT, A5_WIDTH};
use std::sync::atomic::{AtomicBool, Ordering};
use wasm_bindgen::prelude::*;

static READY: AtomicBool = AtomicBool::new(false);

/// Forwards `log` records to the browser console.
struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let msg = JsValue::from_str(&format!("[{}] {}", record.level(), record.args()));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&msg),
            log::Level::Warn => web_sys::console::warn_1(&msg),
            _ => web_sys::console::log_1(&msg),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Initialize panic hook and console logging
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
    READY.store(true, Ordering::Release);
}

/// Whether the module has been initialized and can process documents
#[wasm_bindgen]
pub fn is_ready() -> bool {
    READY.load(Ordering::Acquire)
}

fn options_from(
    target_width: Option<f32>,
    target_height: Option<f32>,
    page_multiple: Option<u32>,
) -> TransformOptions {
    TransformOptions::new()
        .page_size(
            target_width.unwrap_or(A5_WIDTH),
            target_height.unwrap_or(A5_HEIGHT),
        )
        .page_multiple(page_multiple.unwrap_or(4) as usize)
}

/// Normalize a PDF to A5 pages padded to a multiple of 4
///
/// # Arguments
/// * `pdf_bytes` - The input PDF file as a byte array
/// * `target_width` - Output page width in points (default: A5)
/// * `target_height` - Output page height in points (default: A5)
/// * `page_multiple` - Pad the page count to a multiple of this (default: 4)
///
/// # Returns
/// The normalized PDF as a byte array, or throws an error
#[wasm_bindgen]
pub fn transform_pdf(
    pdf_bytes: &[u8],
    target_width: Option<f32>,
    target_height: Option<f32>,
    page_multiple: Option<u32>,
) -> Result<js_sys::Uint8Array, JsError> {
    ensure_pdf(pdf_bytes).map_err(|e| JsError::new(&e.to_string()))?;
    let options = options_from(target_width, target_height, page_multiple);

    let result = transform(pdf_bytes, &options).map_err(|e| JsError::new(&e.to_string()))?;

    Ok(js_sys::Uint8Array::from(&result.bytes[..]))
}

/// Normalize a PDF with page counts and warnings
///
/// # Returns
/// A `TransformResultJs` object containing the normalized PDF and statistics
#[wasm_bindgen]
pub fn transform_pdf_with_info(
    pdf_bytes: &[u8],
    target_width: Option<f32>,
    target_height: Option<f32>,
    page_multiple: Option<u32>,
) -> Result<TransformResultJs, JsError> {
    ensure_pdf(pdf_bytes).map_err(|e| JsError::new(&e.to_string()))?;
    let options = options_from(target_width, target_height, page_multiple);

    let result = transform(pdf_bytes, &options).map_err(|e| JsError::new(&e.to_string()))?;

    let warnings: Vec<WarningJson> = result
        .warnings
        .iter()
        .map(|w| WarningJson {
            page: w.page_index + 1,
            message: w.reason.to_string(),
        })
        .collect();
    let warnings_json = serde_json::to_string(&warnings).unwrap_or_else(|_| "[]".to_string());

    Ok(TransformResultJs {
        original_page_count: result.original_page_count,
        added_page_count: result.added_page_count,
        pdf_bytes: result.bytes,
        warnings_json,
    })
}

/// Name for the downloaded file, e.g. `report.pdf` -> `report_A5_mod.pdf`
#[wasm_bindgen]
pub fn output_file_name(input_name: &str) -> String {
    crate::output_file_name(input_name)
}

#[derive(serde::Serialize)]
struct WarningJson {
    page: usize,
    message: String,
}

/// Result of PDF normalization with statistics
#[wasm_bindgen]
pub struct TransformResultJs {
    pdf_bytes: Vec<u8>,
    original_page_count: usize,
    added_page_count: usize,
    warnings_json: String,
}

#[wasm_bindgen]
impl TransformResultJs {
    /// Get the normalized PDF bytes
    #[wasm_bindgen(getter)]
    pub fn pdf_bytes(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(&self.pdf_bytes[..])
    }

    /// Get the number of pages in the source document
    #[wasm_bindgen(getter)]
    pub fn original_page_count(&self) -> usize {
        self.original_page_count
    }

    /// Get the number of blank pages appended
    #[wasm_bindgen(getter)]
    pub fn added_page_count(&self) -> usize {
        self.added_page_count
    }

    /// Get the total number of pages in the output
    #[wasm_bindgen(getter)]
    pub fn total_page_count(&self) -> usize {
        self.original_page_count + self.added_page_count
    }

    /// Get pages that were left blank, as a JSON array of `{page, message}`
    #[wasm_bindgen(getter)]
    pub fn warnings_json(&self) -> String {
        self.warnings_json.clone()
    }
}
