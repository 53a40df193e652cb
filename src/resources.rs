//! Deep copy of objects from a source document into the output document.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;

/// Maps source object IDs to their copies in the output document. Shared
/// across pages so fonts and images used on many pages are imported once.
/// Seeding it with `source page -> output page` makes page references
/// (annotation `/P`, link destinations) land on the output pages.
pub(crate) type ImportCache = HashMap<ObjectId, ObjectId>;

/// Deepest direct (inline) nesting copied; anything below becomes `null`.
const MAX_NESTING: usize = 256;

/// Copy `obj` into `output`, following references.
///
/// References to missing objects become `null`. Referenced objects are
/// copied from a work list rather than by recursion, so reference chains of
/// any length cost heap, not stack. Cycles terminate because an output ID is
/// reserved before the referenced object is copied.
pub(crate) fn import_object(
    output: &mut Document,
    source: &Document,
    obj: &Object,
    cache: &mut ImportCache,
) -> Object {
    let mut pending = Vec::new();
    let copied = copy_direct(output, source, obj, cache, &mut pending, 0);

    while let Some((source_id, new_id)) = pending.pop() {
        let copy = match source.get_object(source_id) {
            Ok(referenced) => copy_direct(output, source, referenced, cache, &mut pending, 0),
            Err(_) => Object::Null,
        };
        output.objects.insert(new_id, copy);
    }

    copied
}

/// Copy the direct part of `obj`. Each reference not seen before gets a
/// reserved output ID and is queued on `pending`.
fn copy_direct(
    output: &mut Document,
    source: &Document,
    obj: &Object,
    cache: &mut ImportCache,
    pending: &mut Vec<(ObjectId, ObjectId)>,
    depth: usize,
) -> Object {
    if depth > MAX_NESTING {
        log::debug!("Object nesting deeper than {} imported as null", MAX_NESTING);
        return Object::Null;
    }

    match obj {
        Object::Reference(id) => {
            if let Some(&new_id) = cache.get(id) {
                return Object::Reference(new_id);
            }
            if source.get_object(*id).is_err() {
                log::debug!("Dangling reference {:?} imported as null", id);
                return Object::Null;
            }

            let new_id = output.new_object_id();
            cache.insert(*id, new_id);
            pending.push((*id, new_id));
            Object::Reference(new_id)
        }
        Object::Dictionary(dict) => Object::Dictionary(copy_dictionary(
            output, source, dict, cache, pending, depth,
        )),
        Object::Array(arr) => Object::Array(
            arr.iter()
                .map(|item| copy_direct(output, source, item, cache, pending, depth + 1))
                .collect(),
        ),
        Object::Stream(stream) => {
            let dict = copy_dictionary(output, source, &stream.dict, cache, pending, depth);
            let mut copy = Stream::new(dict, stream.content.clone());
            copy.allows_compression = stream.allows_compression;
            Object::Stream(copy)
        }
        _ => obj.clone(),
    }
}

fn copy_dictionary(
    output: &mut Document,
    source: &Document,
    dict: &Dictionary,
    cache: &mut ImportCache,
    pending: &mut Vec<(ObjectId, ObjectId)>,
    depth: usize,
) -> Dictionary {
    let mut new_dict = Dictionary::new();
    for (key, value) in dict.iter() {
        // Page-tree links would drag the whole source document along.
        if key.as_slice() == b"Parent" {
            continue;
        }
        let value = copy_direct(output, source, value, cache, pending, depth + 1);
        new_dict.set(key.clone(), value);
    }
    new_dict
}
