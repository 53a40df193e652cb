//! Interactive form detection and flattening.
//!
//! Dynamic XFA forms are rejected. AcroForm widgets are baked into their
//! page's content: the normal appearance stream of every visible widget is
//! drawn at the widget's `/Rect`, then the widget annotation and the
//! document's `/AcroForm` entry are removed.

use crate::error::TransformError;
use crate::geometry::{Matrix, PageBox};
use crate::source::{inherited, resolve};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Annotation flag bit 2: do not display.
const ANNOT_FLAG_HIDDEN: i64 = 1 << 1;

/// The kind of interactive form a document carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    None,
    AcroForm,
    Xfa,
}

/// Counts from a flatten pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlattenReport {
    /// Widgets whose appearance was drawn into the page.
    pub flattened: usize,
    /// Hidden widgets that were removed without drawing.
    pub hidden: usize,
    /// Widgets without a usable appearance; removed without drawing.
    pub skipped: usize,
}

fn root_id(doc: &Document) -> Option<ObjectId> {
    doc.trailer.get(b"Root").ok()?.as_reference().ok()
}

fn acroform(doc: &Document) -> Option<&Dictionary> {
    let catalog = doc.get_dictionary(root_id(doc)?).ok()?;
    resolve(doc, catalog.get(b"AcroForm").ok()?)?.as_dict().ok()
}

/// Whether an annotation dictionary is a form widget.
pub(crate) fn is_widget(annot: &Dictionary) -> bool {
    annot
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map(|s| s == b"Widget")
        .unwrap_or(false)
}

/// Whether any page carries a widget annotation, with or without `/Fields`.
fn has_widgets(doc: &Document) -> bool {
    doc.get_pages().values().any(|&page_id| {
        doc.get_dictionary(page_id)
            .ok()
            .and_then(|page| page.get(b"Annots").ok())
            .and_then(|annots| resolve(doc, annots))
            .and_then(|annots| annots.as_array().ok())
            .map(|annots| {
                annots.iter().any(|a| {
                    resolve(doc, a)
                        .and_then(|a| a.as_dict().ok())
                        .is_some_and(is_widget)
                })
            })
            .unwrap_or(false)
    })
}

/// Classify the document's form.
///
/// Widgets count as an AcroForm even when `/Fields` is empty or the
/// `/AcroForm` entry is missing, so they get flattened rather than lost.
pub fn inspect_form(doc: &Document) -> FormKind {
    let needs_rendering = root_id(doc)
        .and_then(|id| doc.get_dictionary(id).ok())
        .and_then(|catalog| catalog.get(b"NeedsRendering").ok())
        .and_then(|v| v.as_bool().ok())
        .unwrap_or(false);
    if needs_rendering {
        return FormKind::Xfa;
    }

    if let Some(form) = acroform(doc) {
        let has_xfa = form
            .get(b"XFA")
            .ok()
            .and_then(|x| resolve(doc, x))
            .map(|x| !matches!(x, Object::Null))
            .unwrap_or(false);
        if has_xfa {
            return FormKind::Xfa;
        }

        let has_fields = form
            .get(b"Fields")
            .ok()
            .and_then(|f| resolve(doc, f))
            .and_then(|f| f.as_array().ok())
            .map(|fields| !fields.is_empty())
            .unwrap_or(false);
        if has_fields {
            return FormKind::AcroForm;
        }
    }

    if has_widgets(doc) {
        FormKind::AcroForm
    } else {
        FormKind::None
    }
}

/// What to do with one entry of a page's `/Annots`.
enum AnnotAction {
    Keep,
    DropHidden,
    DropSkipped,
    Draw { appearance: ObjectId, matrix: Matrix },
}

/// Pick the normal appearance stream of a widget.
fn normal_appearance(doc: &Document, widget: &Dictionary) -> Option<ObjectId> {
    let ap = resolve(doc, widget.get(b"AP").ok()?)?.as_dict().ok()?;
    let normal = ap.get(b"N").ok()?;

    let by_state = |states: &Dictionary| -> Option<ObjectId> {
        let state = widget.get(b"AS").ok()?.as_name().ok()?;
        states.get(state).ok()?.as_reference().ok()
    };

    let id = match normal {
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Stream(_) => *id,
            Object::Dictionary(states) => by_state(states)?,
            _ => return None,
        },
        Object::Dictionary(states) => by_state(states)?,
        _ => return None,
    };

    doc.get_object(id).ok()?.as_stream().ok()?;
    Some(id)
}

/// Matrix placing an appearance stream into `rect`: the stream's BBox,
/// transformed by its own `/Matrix`, is fitted onto the rectangle.
fn appearance_matrix(appearance: &Stream, rect: &PageBox) -> Option<Matrix> {
    let bbox = PageBox::from_object(appearance.dict.get(b"BBox").ok()?)?;
    let form_matrix = appearance
        .dict
        .get(b"Matrix")
        .ok()
        .and_then(Matrix::from_object)
        .unwrap_or_else(Matrix::identity);

    let transformed = bbox.transformed(&form_matrix);
    let sx = if transformed.width() > 0.0 {
        rect.width() / transformed.width()
    } else {
        1.0
    };
    let sy = if transformed.height() > 0.0 {
        rect.height() / transformed.height()
    } else {
        1.0
    };

    Some(
        Matrix::translate(-transformed.llx, -transformed.lly)
            .concat(&Matrix::scale(sx, sy))
            .concat(&Matrix::translate(rect.llx, rect.lly)),
    )
}

fn classify(doc: &Document, annot: &Object, page_number: usize) -> Result<AnnotAction, TransformError> {
    let Some(dict) = resolve(doc, annot).and_then(|a| a.as_dict().ok()) else {
        return Ok(AnnotAction::Keep);
    };

    if !is_widget(dict) {
        return Ok(AnnotAction::Keep);
    }

    let flags = dict.get(b"F").and_then(Object::as_i64).unwrap_or(0);
    if flags & ANNOT_FLAG_HIDDEN != 0 {
        return Ok(AnnotAction::DropHidden);
    }

    let rect = dict
        .get(b"Rect")
        .ok()
        .and_then(|r| resolve(doc, r))
        .and_then(PageBox::from_object)
        .ok_or_else(|| {
            TransformError::FormFlattenError(format!(
                "widget on page {} has no valid /Rect",
                page_number
            ))
        })?;

    let placed = normal_appearance(doc, dict).and_then(|id| {
        let stream = doc.get_object(id).ok()?.as_stream().ok()?;
        appearance_matrix(stream, &rect).map(|matrix| (id, matrix))
    });

    Ok(match placed {
        Some((appearance, matrix)) => AnnotAction::Draw { appearance, matrix },
        None => {
            let name = dict
                .get(b"T")
                .ok()
                .and_then(|t| t.as_str().ok())
                .map(|t| String::from_utf8_lossy(t).into_owned())
                .unwrap_or_default();
            log::warn!(
                "Form field '{}' on page {} has no appearance; dropped",
                name,
                page_number
            );
            AnnotAction::DropSkipped
        }
    })
}

/// Pick an XObject name not yet present in `xobjects`.
fn unique_name(xobjects: &Dictionary, counter: &mut usize) -> String {
    loop {
        *counter += 1;
        let name = format!("FlatAp{}", counter);
        if !xobjects.has(name.as_bytes()) {
            return name;
        }
    }
}

/// Owned copy of a page's effective resource dictionary (inherited or direct).
fn owned_resources(doc: &Document, page_dict: &Dictionary) -> Dictionary {
    inherited(doc, page_dict, b"Resources")
        .and_then(|r| r.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

/// Flatten the widgets of one page. `page_number` is 1-based, for messages.
fn flatten_page(
    doc: &mut Document,
    page_id: ObjectId,
    page_number: usize,
    report: &mut FlattenReport,
) -> Result<(), TransformError> {
    let page_error = |msg: &str| {
        TransformError::FormFlattenError(format!("page {}: {}", page_number, msg))
    };

    let page_dict = doc
        .get_dictionary(page_id)
        .map_err(|_| page_error("page object is missing"))?;

    let annots = match page_dict.get(b"Annots").ok().map(|a| resolve(doc, a)) {
        None | Some(None) | Some(Some(Object::Null)) => return Ok(()),
        Some(Some(Object::Array(arr))) => arr.clone(),
        Some(Some(_)) => return Err(page_error("/Annots is not an array")),
    };

    let mut kept = Vec::new();
    let mut draws = Vec::new();
    for annot in annots.iter() {
        match classify(doc, annot, page_number)? {
            AnnotAction::Keep => kept.push(annot.clone()),
            AnnotAction::DropHidden => report.hidden += 1,
            AnnotAction::DropSkipped => report.skipped += 1,
            AnnotAction::Draw { appearance, matrix } => draws.push((appearance, matrix)),
        }
    }

    if kept.len() == annots.len() {
        return Ok(());
    }

    if !draws.is_empty() {
        let mut resources = owned_resources(doc, page_dict);
        let mut xobjects = resources
            .get(b"XObject")
            .ok()
            .and_then(|x| resolve(doc, x))
            .and_then(|x| x.as_dict().ok())
            .cloned()
            .unwrap_or_default();

        let mut ops = String::from("Q\n");
        let mut counter = 0;
        for (appearance, matrix) in &draws {
            let name = unique_name(&xobjects, &mut counter);
            xobjects.set(name.as_bytes(), Object::Reference(*appearance));
            ops.push_str(&format!("q {} cm /{} Do Q\n", matrix.to_operands(), name));
        }
        resources.set("XObject", xobjects);

        let mut contents = vec![];
        match page_dict.get(b"Contents").ok() {
            Some(Object::Array(parts)) => contents.extend(parts.iter().cloned()),
            Some(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(parts)) => contents.extend(parts.iter().cloned()),
                _ => contents.push(Object::Reference(*id)),
            },
            _ => {}
        }

        for (appearance, _) in &draws {
            if let Ok(Object::Stream(stream)) = doc.get_object_mut(*appearance) {
                stream.dict.set("Type", "XObject");
                stream.dict.set("Subtype", "Form");
            }
        }

        // Keep the page's own graphics state from leaking into the widgets.
        let open = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let close = doc.add_object(Stream::new(Dictionary::new(), ops.into_bytes()));
        contents.insert(0, Object::Reference(open));
        contents.push(Object::Reference(close));

        let page = doc
            .get_dictionary_mut(page_id)
            .map_err(|_| page_error("page object is missing"))?;
        page.set("Resources", resources);
        page.set("Contents", contents);
        report.flattened += draws.len();
    }

    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|_| page_error("page object is missing"))?;
    if kept.is_empty() {
        page.remove(b"Annots");
    } else {
        page.set("Annots", kept);
    }
    Ok(())
}

/// Bake every AcroForm widget into page content and drop the form.
///
/// Widgets without an appearance are dropped with a warning; structural
/// damage (non-array `/Annots`, widget without `/Rect`) fails the whole call.
pub fn flatten_forms(doc: &mut Document) -> Result<FlattenReport, TransformError> {
    let needs_appearances = acroform(doc)
        .and_then(|f| f.get(b"NeedAppearances").ok())
        .and_then(|v| v.as_bool().ok())
        .unwrap_or(false);
    if needs_appearances {
        log::warn!("Form requests regenerated appearances; using the stored ones");
    }

    let mut report = FlattenReport::default();
    let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
    for (index, page_id) in page_ids.into_iter().enumerate() {
        flatten_page(doc, page_id, index + 1, &mut report)?;
    }

    if let Some(root) = root_id(doc) {
        if let Ok(catalog) = doc.get_dictionary_mut(root) {
            catalog.remove(b"AcroForm");
        }
    }

    log::debug!(
        "Flattened {} form fields ({} hidden, {} without appearance)",
        report.flattened,
        report.hidden,
        report.skipped
    );
    Ok(report)
}
