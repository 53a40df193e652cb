//! Page transcoding: every source page becomes one target-sized output page
//! showing the source content scaled to fit and centered.
//!
//! Work happens in two passes. Preparation (decode content, compute geometry)
//! only reads the source document and may run in parallel; results land in
//! index-ordered slots. Writing into the output document is sequential.

use crate::error::{EmbedFailure, EmbedWarning, TransformError};
use crate::forms::is_widget;
use crate::geometry::{extract_number, fit_centered, placement_matrix, Matrix, PageBox, Placement};
use crate::resources::{import_object, ImportCache};
use crate::source::{inherited, page_content, page_geometry, resolve};
use crate::CancelToken;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;

/// XObject name under which a page's embedded source content is drawn.
const SOURCE_XOBJECT: &str = "SrcPage";

/// A source page that is ready to be drawn.
#[derive(Debug, Clone)]
pub(crate) struct PreparedPage {
    pub view: PageBox,
    pub placement: Placement,
    pub matrix: Matrix,
    pub content: Vec<u8>,
    /// Raw (unimported) `Resources` entry of the source page.
    pub resources: Option<Object>,
    /// Raw transparency `Group` entry of the source page.
    pub group: Option<Object>,
    /// Raw entries of the source page's `/Annots`.
    pub annots: Vec<Object>,
}

/// Read one source page and work out where it goes on the target page.
pub(crate) fn prepare_page(
    source: &Document,
    page_id: ObjectId,
    target_width: f32,
    target_height: f32,
) -> Result<PreparedPage, EmbedFailure> {
    let page_dict = source
        .get_dictionary(page_id)
        .map_err(|_| EmbedFailure::MissingPage)?;

    let geometry = page_geometry(source, page_dict);
    let (width, height) = geometry.displayed_size();
    let placement = fit_centered(width, height, target_width, target_height)
        .ok_or(EmbedFailure::ZeroArea { width, height })?;

    let content = page_content(source, page_dict)?;

    let annots = page_dict
        .get(b"Annots")
        .ok()
        .and_then(|a| resolve(source, a))
        .and_then(|a| a.as_array().ok())
        .cloned()
        .unwrap_or_default();

    Ok(PreparedPage {
        view: geometry.view,
        placement,
        matrix: placement_matrix(&geometry.view, geometry.rotate, &placement),
        content,
        resources: inherited(source, page_dict, b"Resources").cloned(),
        group: page_dict.get(b"Group").ok().cloned(),
        annots,
    })
}

/// Map an annotation's `/Rect` and `/QuadPoints` onto the output page.
fn place_annotation(annot: &mut Dictionary, matrix: &Matrix) {
    if let Some(rect) = annot.get(b"Rect").ok().and_then(PageBox::from_object) {
        annot.set("Rect", rect.transformed(matrix).to_object());
    }

    let quad_points = match annot.get(b"QuadPoints") {
        Ok(Object::Array(points)) => {
            let numbers: Vec<f32> = points.iter().filter_map(extract_number).collect();
            if numbers.len() == points.len() && numbers.len() % 2 == 0 {
                Some(
                    numbers
                        .chunks(2)
                        .flat_map(|p| {
                            let (x, y) = matrix.transform_point(p[0], p[1]);
                            [Object::Real(x), Object::Real(y)]
                        })
                        .collect::<Vec<_>>(),
                )
            } else {
                None
            }
        }
        _ => None,
    };
    if let Some(points) = quad_points {
        annot.set("QuadPoints", points);
    }
}

/// The document being built. Every page it holds has the target size.
pub(crate) struct OutputDocument {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    width: f32,
    height: f32,
    imported: ImportCache,
    placed_annots: HashSet<ObjectId>,
}

impl OutputDocument {
    pub fn new(width: f32, height: f32) -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        OutputDocument {
            doc,
            pages_id,
            kids: Vec::new(),
            width,
            height,
            imported: ImportCache::new(),
            placed_annots: HashSet::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Reserve one output page ID per source page. References to a source
    /// page imported later (annotation `/P`, link destinations) resolve to
    /// its output page.
    pub fn reserve_pages(&mut self, source_pages: &[ObjectId]) -> Vec<ObjectId> {
        source_pages
            .iter()
            .map(|source_id| {
                let page_id = self.doc.new_object_id();
                self.imported.insert(*source_id, page_id);
                page_id
            })
            .collect()
    }

    /// Write a blank target-sized page at `page_id` and append it to the tree.
    pub fn append_page_at(&mut self, page_id: ObjectId) {
        let page = dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => PageBox::new(0.0, 0.0, self.width, self.height).to_object(),
            "Resources" => Dictionary::new()
        };
        self.doc.objects.insert(page_id, Object::Dictionary(page));
        self.kids.push(page_id);
    }

    /// Append a blank target-sized page and return its ID.
    pub fn append_page(&mut self) -> ObjectId {
        let page_id = self.doc.new_object_id();
        self.append_page_at(page_id);
        page_id
    }

    pub fn append_blank_pages(&mut self, count: usize) {
        for _ in 0..count {
            self.append_page();
        }
    }

    /// Embed a prepared source page as a form XObject and draw it on `page_id`.
    pub fn draw_page(
        &mut self,
        page_id: ObjectId,
        source: &Document,
        prepared: PreparedPage,
    ) -> Result<(), EmbedFailure> {
        let mut form = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => prepared.view.to_object()
        };
        if let Some(resources) = &prepared.resources {
            let resources = import_object(&mut self.doc, source, resources, &mut self.imported);
            form.set("Resources", resources);
        }
        if let Some(group) = &prepared.group {
            let group = import_object(&mut self.doc, source, group, &mut self.imported);
            form.set("Group", group);
        }
        let form_id = self.doc.add_object(Stream::new(form, prepared.content));

        let ops = format!(
            "q {} cm /{} Do Q\n",
            prepared.matrix.to_operands(),
            SOURCE_XOBJECT
        );
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), ops.into_bytes()));
        let annots = self.import_annotations(source, &prepared.annots, &prepared.matrix);

        let page = self
            .doc
            .get_dictionary_mut(page_id)
            .map_err(|_| EmbedFailure::MissingPage)?;
        page.set(
            "Resources",
            dictionary! { "XObject" => dictionary! { SOURCE_XOBJECT => form_id } },
        );
        page.set("Contents", content_id);
        if !annots.is_empty() {
            page.set("Annots", annots);
        }
        Ok(())
    }

    /// Copy a page's annotations, form widgets excepted, with their geometry
    /// mapped through the page's placement `matrix`.
    fn import_annotations(
        &mut self,
        source: &Document,
        annots: &[Object],
        matrix: &Matrix,
    ) -> Vec<Object> {
        let mut placed = Vec::new();
        for annot in annots {
            let Some(dict) = resolve(source, annot).and_then(|a| a.as_dict().ok()) else {
                continue;
            };
            if is_widget(dict) {
                continue;
            }

            let id = match import_object(&mut self.doc, source, annot, &mut self.imported) {
                Object::Reference(id) => id,
                Object::Dictionary(copy) => self.doc.add_object(copy),
                _ => continue,
            };
            if self.placed_annots.insert(id) {
                if let Ok(copy) = self.doc.get_dictionary_mut(id) {
                    place_annotation(copy, matrix);
                }
            }
            placed.push(Object::Reference(id));
        }
        placed
    }

    /// Close the page tree and catalog. The result is ready for serialization.
    pub fn finish(self) -> Document {
        let OutputDocument {
            mut doc,
            pages_id,
            kids,
            ..
        } = self;

        let count = kids.len() as i64;
        let kids: Vec<Object> = kids.into_iter().map(Object::Reference).collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }
}

/// Per-page preparation step, shared by every worker.
type PrepareFn<'a> = dyn Fn(ObjectId) -> Result<PreparedPage, EmbedFailure> + Sync + 'a;

/// Prepare every page, in parallel when allowed. Slot `i` holds page `i`;
/// `None` means cancellation was observed before the page was reached.
#[cfg(not(target_arch = "wasm32"))]
fn prepare_all(
    page_ids: &[ObjectId],
    parallel: bool,
    cancel: &CancelToken,
    prepare: &PrepareFn<'_>,
) -> Vec<Option<Result<PreparedPage, EmbedFailure>>> {
    use rayon::prelude::*;

    let run = |page_id: &ObjectId| {
        if cancel.is_cancelled() {
            return None;
        }
        Some(prepare(*page_id))
    };

    if parallel {
        page_ids.par_iter().map(run).collect()
    } else {
        page_ids.iter().map(run).collect()
    }
}

#[cfg(target_arch = "wasm32")]
fn prepare_all(
    page_ids: &[ObjectId],
    _parallel: bool,
    cancel: &CancelToken,
    prepare: &PrepareFn<'_>,
) -> Vec<Option<Result<PreparedPage, EmbedFailure>>> {
    page_ids
        .iter()
        .map(|page_id| {
            if cancel.is_cancelled() {
                return None;
            }
            Some(prepare(*page_id))
        })
        .collect()
}

/// Produce exactly one output page per source page, in source order.
///
/// Per-page failures leave the output page blank and are returned as
/// warnings; only cancellation aborts.
pub(crate) fn transcode_pages(
    source: &Document,
    page_ids: &[ObjectId],
    output: &mut OutputDocument,
    parallel: bool,
    cancel: &CancelToken,
) -> Result<Vec<EmbedWarning>, TransformError> {
    let (width, height) = (output.width, output.height);
    let prepare = |page_id: ObjectId| prepare_page(source, page_id, width, height);
    transcode_with(source, page_ids, output, parallel, cancel, &prepare)
}

fn transcode_with(
    source: &Document,
    page_ids: &[ObjectId],
    output: &mut OutputDocument,
    parallel: bool,
    cancel: &CancelToken,
    prepare: &PrepareFn<'_>,
) -> Result<Vec<EmbedWarning>, TransformError> {
    let slots = prepare_all(page_ids, parallel, cancel, prepare);
    let output_ids = output.reserve_pages(page_ids);
    let mut warnings = Vec::new();

    for (index, (slot, page_id)) in slots.into_iter().zip(output_ids).enumerate() {
        if cancel.is_cancelled() {
            return Err(TransformError::Cancelled);
        }
        let prepared = slot.ok_or(TransformError::Cancelled)?;

        // The page exists before anything can fail, so count and order hold.
        output.append_page_at(page_id);

        let outcome = prepared.and_then(|p| {
            log::debug!(
                "Page {}: scale {:.4} at ({:.2}, {:.2})",
                index + 1,
                p.placement.scale,
                p.placement.x,
                p.placement.y
            );
            output.draw_page(page_id, source, p)
        });

        if let Err(reason) = outcome {
            let warning = EmbedWarning {
                page_index: index,
                reason,
            };
            log::warn!("{}", warning);
            warnings.push(warning);
        }
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{A5_HEIGHT, A5_WIDTH};

    fn source_with_page(page: Dictionary) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(page);
        (doc, page_id)
    }

    #[test]
    fn prepared_page_is_centered() {
        let mut doc = Document::with_version("1.7");
        let content = doc.add_object(Stream::new(Dictionary::new(), b"0 0 m 10 10 l S".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 842.into(), 595.into()],
            "Contents" => content
        });

        let prepared = prepare_page(&doc, page_id, A5_WIDTH, A5_HEIGHT).unwrap();
        assert!((prepared.placement.scale - A5_WIDTH / 842.0).abs() < 1e-4);
        assert!(prepared.placement.y > 0.0);
        assert_eq!(prepared.content, b"0 0 m 10 10 l S");
        assert!(prepared.resources.is_none());
    }

    #[test]
    fn zero_area_page_fails_before_content() {
        let (doc, page_id) = source_with_page(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 0.into(), 500.into()]
        });
        let err = prepare_page(&doc, page_id, A5_WIDTH, A5_HEIGHT).unwrap_err();
        assert!(matches!(err, EmbedFailure::ZeroArea { .. }));
    }

    #[test]
    fn missing_page_object() {
        let doc = Document::with_version("1.7");
        let err = prepare_page(&doc, (7, 0), A5_WIDTH, A5_HEIGHT).unwrap_err();
        assert_eq!(err, EmbedFailure::MissingPage);
    }

    #[test]
    fn output_pages_share_target_size() {
        let mut output = OutputDocument::new(A5_WIDTH, A5_HEIGHT);
        output.append_blank_pages(3);
        assert_eq!(output.page_count(), 3);

        let doc = output.finish();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 3);
        for page_id in pages.values() {
            let page = doc.get_dictionary(*page_id).unwrap();
            let media_box = PageBox::from_object(page.get(b"MediaBox").unwrap()).unwrap();
            assert_eq!(media_box, PageBox::new(0.0, 0.0, A5_WIDTH, A5_HEIGHT));
            assert!(!page.has(b"Contents"));
        }
    }

    #[test]
    fn failed_page_stays_blank_and_in_order() {
        let mut doc = Document::with_version("1.7");
        let good = doc.add_object(Stream::new(Dictionary::new(), b"0 0 m".to_vec()));
        let ok_page = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
            "Contents" => good
        });
        let empty_page = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()]
        });

        let mut output = OutputDocument::new(A5_WIDTH, A5_HEIGHT);
        let warnings = transcode_pages(
            &doc,
            &[empty_page, ok_page],
            &mut output,
            false,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].page_index, 0);
        assert_eq!(warnings[0].reason, EmbedFailure::MissingContent);

        let out = output.finish();
        let pages: Vec<ObjectId> = out.get_pages().values().copied().collect();
        assert!(!out.get_dictionary(pages[0]).unwrap().has(b"Contents"));
        assert!(out.get_dictionary(pages[1]).unwrap().has(b"Contents"));
    }

    #[test]
    fn cancelled_before_start() {
        let (doc, page_id) = source_with_page(dictionary! { "Type" => "Page" });
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut output = OutputDocument::new(A5_WIDTH, A5_HEIGHT);
        let result = transcode_pages(&doc, &[page_id], &mut output, true, &cancel);
        assert!(matches!(result, Err(TransformError::Cancelled)));
    }
    fn marked_source(pages: usize) -> (Document, Vec<ObjectId>) {
        let mut doc = Document::with_version("1.7");
        let ids = (0..pages)
            .map(|i| {
                let content = doc.add_object(Stream::new(
                    Dictionary::new(),
                    format!("% page {}", i).into_bytes(),
                ));
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
                    "Contents" => content
                })
            })
            .collect();
        (doc, ids)
    }

    #[test]
    fn cancelled_during_preparation() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (doc, page_ids) = marked_source(8);
        for parallel in [false, true] {
            let cancel = CancelToken::new();
            let prepared = AtomicUsize::new(0);
            let prepare = |page_id: ObjectId| {
                if prepared.fetch_add(1, Ordering::SeqCst) == 2 {
                    cancel.cancel();
                }
                prepare_page(&doc, page_id, A5_WIDTH, A5_HEIGHT)
            };

            let mut output = OutputDocument::new(A5_WIDTH, A5_HEIGHT);
            let result = transcode_with(&doc, &page_ids, &mut output, parallel, &cancel, &prepare);
            assert!(matches!(result, Err(TransformError::Cancelled)));
            if !parallel {
                // Pages after the cancelling one are never prepared.
                assert_eq!(prepared.load(Ordering::SeqCst), 3);
            }
        }
    }

    #[test]
    fn annotations_follow_the_page() {
        let (mut doc, page_ids) = marked_source(2);
        let link = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => vec![0.into(), 0.into(), 50.into(), 50.into()],
            "P" => page_ids[0],
            "Dest" => Object::Array(vec![
                Object::Reference(page_ids[1]),
                Object::Name(b"Fit".to_vec())
            ])
        });
        let widget = doc.add_object(dictionary! {
            "Subtype" => "Widget",
            "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()]
        });
        doc.get_dictionary_mut(page_ids[0])
            .unwrap()
            .set("Annots", vec![link.into(), widget.into()]);

        let mut output = OutputDocument::new(A5_WIDTH, A5_HEIGHT);
        let warnings =
            transcode_pages(&doc, &page_ids, &mut output, false, &CancelToken::new()).unwrap();
        assert!(warnings.is_empty());

        let out = output.finish();
        let out_pages: Vec<ObjectId> = out.get_pages().values().copied().collect();
        let first = out.get_dictionary(out_pages[0]).unwrap();
        let annots = first.get(b"Annots").unwrap().as_array().unwrap();
        assert_eq!(annots.len(), 1);

        let copy = out
            .get_dictionary(annots[0].as_reference().unwrap())
            .unwrap();
        assert_eq!(copy.get(b"P").unwrap().as_reference().unwrap(), out_pages[0]);
        let dest = copy.get(b"Dest").unwrap().as_array().unwrap();
        assert_eq!(dest[0].as_reference().unwrap(), out_pages[1]);

        // A 100pt square page is scaled to the A5 width and centered vertically.
        let scale = A5_WIDTH / 100.0;
        let rect = PageBox::from_object(copy.get(b"Rect").unwrap()).unwrap();
        assert!((rect.width() - 50.0 * scale).abs() < 0.01);
        assert!(rect.llx.abs() < 0.01);
        assert!((rect.lly - (A5_HEIGHT - A5_WIDTH) / 2.0).abs() < 0.01);

        let second = out.get_dictionary(out_pages[1]).unwrap();
        assert!(!second.has(b"Annots"));
    }
}
