//! Blank-page padding for booklet printing.

/// Saddle-stitched booklets are folded from sheets carrying 4 pages each.
pub const BOOKLET_PAGE_MULTIPLE: usize = 4;

/// Number of blank pages to append so that `n` becomes a multiple of 4.
pub fn pages_to_add(n: usize) -> usize {
    pages_to_add_for(n, BOOKLET_PAGE_MULTIPLE)
}

/// Number of blank pages to append so that `n` becomes a multiple of `multiple`.
///
/// A `multiple` of 0 or 1 never requires padding.
pub fn pages_to_add_for(n: usize, multiple: usize) -> usize {
    if multiple <= 1 {
        return 0;
    }
    (multiple - n % multiple) % multiple
}
