//! Read-only access to source pages: inherited attributes, visible box and
//! decoded content streams.

use crate::error::EmbedFailure;
use crate::geometry::{normalize_rotation, PageBox};
use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::Read;

/// Deepest `/Parent` chain (and reference chain) followed before giving up.
const MAX_DEPTH: usize = 32;

/// Resolve a reference to get the actual object
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    let mut current = obj;
    for _ in 0..MAX_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            _ => return Some(current),
        }
    }
    None
}

/// Look up a page attribute, walking up the page tree for inheritable keys
/// (`Resources`, `MediaBox`, `CropBox`, `Rotate`).
pub fn inherited<'a>(
    doc: &'a Document,
    page_dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    let mut dict = page_dict;
    for _ in 0..MAX_DEPTH {
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent_id).ok()?;
    }
    None
}

/// Geometry of a source page as it is displayed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Visible area in default user space (CropBox clipped to MediaBox).
    pub view: PageBox,
    /// Clockwise rotation, one of 0, 90, 180, 270.
    pub rotate: u16,
}

impl PageGeometry {
    /// Intrinsic (width, height) of the page as displayed, after rotation.
    pub fn displayed_size(&self) -> (f32, f32) {
        match self.rotate {
            90 | 270 => (self.view.height(), self.view.width()),
            _ => (self.view.width(), self.view.height()),
        }
    }
}

/// US Letter, used when a page carries no usable MediaBox at all.
const FALLBACK_MEDIA_BOX: PageBox = PageBox {
    llx: 0.0,
    lly: 0.0,
    urx: 612.0,
    ury: 792.0,
};

/// Visible box and rotation of a page, with inherited attributes resolved.
pub fn page_geometry(doc: &Document, page_dict: &Dictionary) -> PageGeometry {
    let media_box = inherited(doc, page_dict, b"MediaBox")
        .and_then(PageBox::from_object)
        .unwrap_or_else(|| {
            log::debug!("Page has no usable MediaBox, assuming US Letter");
            FALLBACK_MEDIA_BOX
        });

    let view = inherited(doc, page_dict, b"CropBox")
        .and_then(PageBox::from_object)
        .and_then(|crop| crop.intersect(&media_box))
        .unwrap_or(media_box);

    let rotate = inherited(doc, page_dict, b"Rotate")
        .and_then(|r| r.as_i64().ok())
        .map(normalize_rotation)
        .unwrap_or(0);

    PageGeometry { view, rotate }
}

/// Filter names of a stream, in application order.
fn stream_filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![n.clone()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|f| match f {
                Object::Name(n) => Some(n.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode a stream's content.
///
/// Plain `FlateDecode` is inflated directly; every other filter chain is
/// handed to lopdf. Corrupt data is an error, never passed through.
pub(crate) fn decode_stream(stream: &Stream) -> Result<Vec<u8>, String> {
    let filters = stream_filters(stream);
    let has_params = stream.dict.has(b"DecodeParms");

    match filters.as_slice() {
        [] => Ok(stream.content.clone()),
        [only] if only.as_slice() == b"FlateDecode" && !has_params => {
            let mut decoder = ZlibDecoder::new(&stream.content[..]);
            let mut decoded = Vec::new();
            decoder
                .read_to_end(&mut decoded)
                .map_err(|e| format!("FlateDecode: {}", e))?;
            Ok(decoded)
        }
        _ => stream.decompressed_content().map_err(|e| e.to_string()),
    }
}

/// Concatenated, decoded content of a page's `/Contents` entry.
pub(crate) fn page_content(doc: &Document, page_dict: &Dictionary) -> Result<Vec<u8>, EmbedFailure> {
    let contents = page_dict
        .get(b"Contents")
        .map_err(|_| EmbedFailure::MissingContent)?;
    let contents = resolve(doc, contents).ok_or(EmbedFailure::MissingContent)?;

    let data = match contents {
        Object::Stream(stream) => {
            decode_stream(stream).map_err(EmbedFailure::UndecodableContent)?
        }
        Object::Array(parts) => {
            let mut combined = Vec::new();
            for part in parts {
                let stream = resolve(doc, part)
                    .and_then(|obj| obj.as_stream().ok())
                    .ok_or_else(|| {
                        EmbedFailure::UndecodableContent(
                            "contents array entry is not a stream".to_string(),
                        )
                    })?;
                let data = decode_stream(stream).map_err(EmbedFailure::UndecodableContent)?;
                combined.extend(data);
                combined.push(b'\n');
            }
            combined
        }
        Object::Null => return Err(EmbedFailure::MissingContent),
        _ => {
            return Err(EmbedFailure::UndecodableContent(
                "contents is not a stream".to_string(),
            ))
        }
    };

    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(EmbedFailure::EmptyContent);
    }
    Ok(data)
}

/// All page object IDs in document order.
pub(crate) fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().values().copied().collect()
}
