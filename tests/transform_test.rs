use a5_booklet_pdf::geometry::PageBox;
use a5_booklet_pdf::{
    ensure_pdf, pages_to_add, transform, transform_with_cancel, CancelToken, EmbedFailure,
    SizeLimit, TransformError, TransformOptions, A5_HEIGHT, A5_WIDTH,
};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

enum Content {
    Marker(usize),
    Corrupt,
    Missing,
}

struct SourcePage {
    width: f32,
    height: f32,
    rotate: i64,
    content: Content,
}

fn page(width: f32, height: f32, content: Content) -> SourcePage {
    SourcePage {
        width,
        height,
        rotate: 0,
        content,
    }
}

fn marked_pages(count: usize) -> Vec<SourcePage> {
    (0..count)
        .map(|i| page(595.28, 841.89, Content::Marker(i)))
        .collect()
}

/// Build a document in memory. `catalog_extra` entries are merged into the catalog.
fn build_document(pages: &[SourcePage], catalog_extra: Dictionary) -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for source_page in pages {
        let mut dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(source_page.width), Object::Real(source_page.height)]
        };
        if source_page.rotate != 0 {
            dict.set("Rotate", source_page.rotate);
        }
        match source_page.content {
            Content::Marker(n) => {
                let ops = format!("% marker-{}\n0 0 m 100 100 l S", n);
                let id = doc.add_object(Stream::new(Dictionary::new(), ops.into_bytes()));
                dict.set("Contents", id);
            }
            Content::Corrupt => {
                let id = doc.add_object(Stream::new(
                    dictionary! { "Filter" => "FlateDecode" },
                    b"definitely not deflate data".to_vec(),
                ));
                dict.set("Contents", id);
            }
            Content::Missing => {}
        }
        kids.push(Object::Reference(doc.add_object(dict)));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count
        }),
    );

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id
    };
    for (k, v) in catalog_extra.iter() {
        catalog.set(k.clone(), v.clone());
    }
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);
    doc
}

fn save(doc: &mut Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to save fixture");
    bytes
}

fn build_pdf(pages: &[SourcePage], catalog_extra: Dictionary) -> Vec<u8> {
    save(&mut build_document(pages, catalog_extra))
}

/// Encrypt a document of marked pages with RC4/128; an empty
/// `user_password` means anyone can open it.
fn encrypted_pdf(pages: usize, user_password: &str) -> Vec<u8> {
    let mut doc = build_document(&marked_pages(pages), Dictionary::new());
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(vec![1u8; 16], StringFormat::Literal),
            Object::String(vec![2u8; 16], StringFormat::Literal),
        ]),
    );
    let version = lopdf::EncryptionVersion::V2 {
        document: &doc,
        owner_password: "owner",
        user_password,
        key_length: 128,
        permissions: lopdf::Permissions::all(),
    };
    let state = lopdf::EncryptionState::try_from(version).expect("encryption state");
    doc.encrypt(&state).expect("encrypt fixture");
    save(&mut doc)
}

fn uncompressed() -> TransformOptions {
    TransformOptions::new().compress_streams(false)
}

fn output_pages(bytes: &[u8]) -> (Document, Vec<ObjectId>) {
    let doc = Document::load_mem(bytes).expect("Output should be a valid PDF");
    let ids = doc.get_pages().values().copied().collect();
    (doc, ids)
}

/// The embedded source form drawn on an output page, if any.
fn source_form(doc: &Document, page_id: ObjectId) -> Option<&Stream> {
    let page = doc.get_dictionary(page_id).ok()?;
    let xobjects = page
        .get(b"Resources")
        .ok()?
        .as_dict()
        .ok()?
        .get(b"XObject")
        .ok()?
        .as_dict()
        .ok()?;
    let id = xobjects.get(b"SrcPage").ok()?.as_reference().ok()?;
    doc.get_object(id).ok()?.as_stream().ok()
}

fn marker(doc: &Document, page_id: ObjectId) -> Option<String> {
    let form = source_form(doc, page_id)?;
    let text = String::from_utf8_lossy(&form.content).into_owned();
    text.lines()
        .find_map(|l| l.strip_prefix("% "))
        .map(str::to_string)
}

/// Operands of the `cm` that places the source form on an output page.
fn placement_operands(doc: &Document, page_id: ObjectId) -> Vec<f32> {
    let page = doc.get_dictionary(page_id).unwrap();
    let content_id = page.get(b"Contents").unwrap().as_reference().unwrap();
    let stream = doc.get_object(content_id).unwrap().as_stream().unwrap();
    let text = String::from_utf8_lossy(&stream.content).into_owned();
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let cm = tokens.iter().position(|t| *t == "cm").expect("cm operator");
    tokens[cm - 6..cm]
        .iter()
        .map(|t| t.parse::<f32>().unwrap())
        .collect()
}

fn media_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let page = doc.get_dictionary(page_id).unwrap();
    PageBox::from_object(page.get(b"MediaBox").unwrap()).unwrap()
}

#[test]
fn test_page_count_padding() {
    for n in [1, 2, 3, 4, 5, 6, 7, 8] {
        let input = build_pdf(&marked_pages(n), Dictionary::new());
        let result = transform(&input, &TransformOptions::default()).expect("transform");

        assert_eq!(result.original_page_count, n);
        assert_eq!(result.added_page_count, pages_to_add(n));
        assert_eq!(result.total_page_count() % 4, 0);

        let (_, ids) = output_pages(&result.bytes);
        assert_eq!(ids.len(), n + pages_to_add(n));
    }
}

#[test]
fn test_mixed_orientations_share_target_size() {
    let mut rotated = page(595.0, 842.0, Content::Marker(2));
    rotated.rotate = 90;
    let pages = vec![
        page(595.0, 842.0, Content::Marker(0)),
        page(842.0, 595.0, Content::Marker(1)),
        rotated,
        page(200.0, 200.0, Content::Marker(3)),
        page(1200.0, 300.0, Content::Marker(4)),
    ];
    let input = build_pdf(&pages, Dictionary::new());
    let result = transform(&input, &uncompressed()).unwrap();
    assert_eq!(result.total_page_count(), 8);

    let (doc, ids) = output_pages(&result.bytes);
    let target = PageBox::new(0.0, 0.0, A5_WIDTH, A5_HEIGHT);
    for id in &ids {
        assert_eq!(media_box(&doc, *id), target);
        assert!(!doc.get_dictionary(*id).unwrap().has(b"Rotate"));
    }
}

#[test]
fn test_order_is_preserved_and_padding_is_blank() {
    let input = build_pdf(&marked_pages(6), Dictionary::new());
    let result = transform(&input, &uncompressed()).unwrap();
    let (doc, ids) = output_pages(&result.bytes);
    assert_eq!(ids.len(), 8);

    for (i, id) in ids.iter().take(6).enumerate() {
        assert_eq!(marker(&doc, *id), Some(format!("marker-{}", i)));
    }
    for id in &ids[6..] {
        assert!(source_form(&doc, *id).is_none());
        assert!(!doc.get_dictionary(*id).unwrap().has(b"Contents"));
    }
}

#[test]
fn test_landscape_page_is_scaled_and_centered() {
    let input = build_pdf(&[page(842.0, 595.0, Content::Marker(0))], Dictionary::new());
    let result = transform(&input, &uncompressed()).unwrap();
    let (doc, ids) = output_pages(&result.bytes);

    let ops = placement_operands(&doc, ids[0]);
    let scale = (A5_WIDTH / 842.0).min(A5_HEIGHT / 595.0);
    let expected_y = (A5_HEIGHT - 595.0 * scale) / 2.0;

    assert!((ops[0] - scale).abs() < 1e-3);
    assert!(ops[1].abs() < 1e-6 && ops[2].abs() < 1e-6);
    assert!((ops[3] - scale).abs() < 1e-3);
    assert!(ops[4].abs() < 1e-2);
    assert!((ops[5] - expected_y).abs() < 1e-2);
    assert!(expected_y > 0.0);

    let form = source_form(&doc, ids[0]).unwrap();
    let bbox = PageBox::from_object(form.dict.get(b"BBox").unwrap()).unwrap();
    assert_eq!(bbox, PageBox::new(0.0, 0.0, 842.0, 595.0));
}

#[test]
fn test_corrupt_page_is_left_blank() {
    let pages = vec![
        page(595.0, 842.0, Content::Marker(0)),
        page(595.0, 842.0, Content::Corrupt),
        page(595.0, 842.0, Content::Marker(2)),
    ];
    let input = build_pdf(&pages, Dictionary::new());
    let result = transform(&input, &uncompressed()).expect("corrupt page must not abort");

    assert_eq!(result.original_page_count, 3);
    assert_eq!(result.added_page_count, 1);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].page_index, 1);
    assert!(matches!(
        result.warnings[0].reason,
        EmbedFailure::UndecodableContent(_)
    ));

    let (doc, ids) = output_pages(&result.bytes);
    assert_eq!(ids.len(), 4);
    assert_eq!(marker(&doc, ids[0]).as_deref(), Some("marker-0"));
    assert!(source_form(&doc, ids[1]).is_none());
    assert_eq!(marker(&doc, ids[2]).as_deref(), Some("marker-2"));
    assert_eq!(media_box(&doc, ids[1]), PageBox::new(0.0, 0.0, A5_WIDTH, A5_HEIGHT));
}

#[test]
fn test_zero_area_and_missing_content_pages() {
    let pages = vec![
        page(0.0, 842.0, Content::Marker(0)),
        page(595.0, 842.0, Content::Missing),
    ];
    let input = build_pdf(&pages, Dictionary::new());
    let result = transform(&input, &TransformOptions::default()).unwrap();

    assert_eq!(result.total_page_count(), 4);
    let reasons: Vec<_> = result.warnings.iter().map(|w| w.reason.clone()).collect();
    assert!(matches!(reasons[0], EmbedFailure::ZeroArea { .. }));
    assert_eq!(reasons[1], EmbedFailure::MissingContent);
}

#[test]
fn test_xfa_form_is_rejected() {
    let xfa = dictionary! {
        "AcroForm" => dictionary! {
            "Fields" => Vec::<Object>::new(),
            "XFA" => Object::string_literal("<xdp:xdp/>")
        }
    };
    let input = build_pdf(&marked_pages(2), xfa);
    let err = transform(&input, &TransformOptions::default()).unwrap_err();
    assert!(matches!(err, TransformError::UnsupportedFormKind));
}

#[test]
fn test_acroform_is_flattened_into_output() {
    // Build a one-page document whose page carries a filled-in text field.
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let appearance = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 100.into(), 20.into()]
        },
        b"% field-value\n0 0 100 20 re S".to_vec(),
    ));
    let widget = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Tx",
        "T" => Object::string_literal("name"),
        "V" => Object::string_literal("Ada"),
        "Rect" => vec![100.into(), 600.into(), 300.into(), 640.into()],
        "AP" => dictionary! { "N" => appearance }
    });
    let content = doc.add_object(Stream::new(Dictionary::new(), b"% marker-0\n0 0 m".to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        "Contents" => content,
        "Annots" => vec![widget.into()]
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1
        }),
    );
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => dictionary! { "Fields" => vec![widget.into()] }
    });
    doc.trailer.set("Root", catalog);
    let mut input = Vec::new();
    doc.save_to(&mut input).unwrap();

    let result = transform(&input, &uncompressed()).unwrap();
    assert!(result.warnings.is_empty());

    let (out, ids) = output_pages(&result.bytes);
    let form = source_form(&out, ids[0]).unwrap();
    let text = String::from_utf8_lossy(&form.content).into_owned();
    assert!(text.contains("marker-0"));
    assert!(text.contains("/FlatAp1 Do"));

    let resources = form.dict.get(b"Resources").unwrap().as_dict().unwrap();
    let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
    let flat_id = xobjects.get(b"FlatAp1").unwrap().as_reference().unwrap();
    let flat = out.get_object(flat_id).unwrap().as_stream().unwrap();
    assert!(String::from_utf8_lossy(&flat.content).contains("field-value"));

    let out_catalog = out.catalog().unwrap();
    assert!(!out_catalog.has(b"AcroForm"));
    assert!(!out.get_dictionary(ids[0]).unwrap().has(b"Annots"));
}

#[test]
fn test_conformant_document_gets_no_padding() {
    let pages: Vec<_> = (0..8)
        .map(|i| page(A5_WIDTH, A5_HEIGHT, Content::Marker(i)))
        .collect();
    let input = build_pdf(&pages, Dictionary::new());
    let result = transform(&input, &uncompressed()).unwrap();

    assert_eq!(result.added_page_count, 0);
    assert_eq!(result.total_page_count(), 8);

    let (doc, ids) = output_pages(&result.bytes);
    let ops = placement_operands(&doc, ids[0]);
    assert!((ops[0] - 1.0).abs() < 1e-4);
    assert!(ops[4].abs() < 1e-2 && ops[5].abs() < 1e-2);
}

#[test]
fn test_zero_page_document() {
    let input = build_pdf(&[], Dictionary::new());
    let result = transform(&input, &TransformOptions::default()).unwrap();
    assert_eq!(result.original_page_count, 0);
    assert_eq!(result.added_page_count, 0);

    let (_, ids) = output_pages(&result.bytes);
    assert!(ids.is_empty());
}

#[test]
fn test_custom_size_and_multiple() {
    let input = build_pdf(&marked_pages(3), Dictionary::new());
    let options = TransformOptions::new().page_size(300.0, 400.0).page_multiple(8);
    let result = transform(&input, &options).unwrap();
    assert_eq!(result.added_page_count, 5);

    let (doc, ids) = output_pages(&result.bytes);
    assert_eq!(ids.len(), 8);
    assert_eq!(media_box(&doc, ids[7]), PageBox::new(0.0, 0.0, 300.0, 400.0));
}

#[test]
fn test_sequential_and_parallel_agree() {
    let input = build_pdf(&marked_pages(9), Dictionary::new());
    let parallel = transform(&input, &uncompressed().parallel(true)).unwrap();
    let sequential = transform(&input, &uncompressed().parallel(false)).unwrap();

    let (pdoc, pids) = output_pages(&parallel.bytes);
    let (sdoc, sids) = output_pages(&sequential.bytes);
    assert_eq!(pids.len(), sids.len());
    for (p, s) in pids.iter().zip(sids.iter()) {
        assert_eq!(marker(&pdoc, *p), marker(&sdoc, *s));
    }
}

#[test]
fn test_limits_and_bad_input() {
    let input = build_pdf(&marked_pages(3), Dictionary::new());
    let err = transform(&input, &TransformOptions::new().max_pages(2)).unwrap_err();
    assert!(matches!(
        err,
        TransformError::TooLarge {
            limit: SizeLimit::Pages,
            actual: 3,
            max: 2
        }
    ));

    assert!(matches!(
        ensure_pdf(b"<html>not a pdf</html>"),
        Err(TransformError::InvalidInputType)
    ));

    let err = transform(b"%PDF-1.4\n%%EOF garbage", &TransformOptions::default()).unwrap_err();
    assert!(matches!(err, TransformError::LoadError(_)));
}

#[test]
fn test_cancelled_transform_produces_nothing() {
    let input = build_pdf(&marked_pages(4), Dictionary::new());
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = transform_with_cancel(&input, &TransformOptions::default(), &cancel).unwrap_err();
    assert!(matches!(err, TransformError::Cancelled));
}

#[test]
fn test_empty_password_encryption_is_opened() {
    let input = encrypted_pdf(3, "");
    let result = transform(&input, &uncompressed()).expect("empty user password opens");
    assert_eq!(result.original_page_count, 3);
    assert_eq!(result.total_page_count(), 4);

    let (doc, ids) = output_pages(&result.bytes);
    assert!(!doc.trailer.has(b"Encrypt"));
    for (i, id) in ids.iter().take(3).enumerate() {
        assert_eq!(marker(&doc, *id), Some(format!("marker-{}", i)));
    }
}

#[test]
fn test_password_protected_document_is_rejected() {
    let input = encrypted_pdf(2, "secret");
    let err = transform(&input, &TransformOptions::default()).unwrap_err();
    assert!(
        matches!(err, TransformError::LoadError(ref msg) if msg.contains("password")),
        "{}",
        err
    );
}

#[test]
fn test_long_resource_reference_chain() {
    const LINKS: usize = 60_000;
    // Enough stack for lopdf to parse the input; the import itself must not
    // need stack proportional to the chain.
    let worker = std::thread::Builder::new()
        .stack_size(8 * 1024 * 1024)
        .spawn(|| {
            let mut doc = build_document(&marked_pages(1), Dictionary::new());
            let mut next = doc.add_object(dictionary! { "Type" => "End" });
            for _ in 0..LINKS {
                next = doc.add_object(dictionary! { "Next" => next });
            }
            let page_id = *doc.get_pages().values().next().unwrap();
            doc.get_dictionary_mut(page_id).unwrap().set(
                "Resources",
                dictionary! { "Properties" => dictionary! { "P0" => next } },
            );
            let input = save(&mut doc);
            transform(&input, &TransformOptions::default())
        })
        .unwrap();

    let result = worker.join().expect("transform thread").unwrap();
    assert_eq!(result.original_page_count, 1);
    assert_eq!(result.total_page_count(), 4);
    assert!(result.warnings.is_empty());
}
