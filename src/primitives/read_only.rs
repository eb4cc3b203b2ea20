//! Read-only sections: which parts of an edit are allowed.

use crate::model::edit::TextRange;
use crate::model::segment_tree::SegmentCollection;

/// Decides where text may be inserted and which parts of a range may be
/// removed.
pub trait ReadOnlySectionProvider {
    /// Whether text may be inserted at `offset`.
    fn can_insert(&self, offset: usize) -> bool;

    /// The parts of `range` that may be removed, left to right and
    /// non-overlapping. A zero-length range yields itself when insertion is
    /// allowed there, and nothing otherwise.
    fn deletable_segments(&self, range: TextRange) -> Vec<TextRange>;
}

/// Every segment of the collection is read-only.
///
/// Insertion is refused only strictly inside a segment; both boundaries stay
/// editable. Overlapping segments are unioned and zero-length segments
/// protect nothing.
impl<T> ReadOnlySectionProvider for SegmentCollection<T> {
    fn can_insert(&self, offset: usize) -> bool {
        !self
            .find_containing(offset)
            .iter()
            .any(|s| s.start < offset && offset < s.end())
    }

    fn deletable_segments(&self, range: TextRange) -> Vec<TextRange> {
        if range.is_empty() {
            return if self.can_insert(range.offset) {
                vec![range]
            } else {
                Vec::new()
            };
        }
        let mut result = Vec::new();
        let mut readonly_until = range.offset;
        for segment in self.find_overlapping(range) {
            if segment.length == 0 {
                continue;
            }
            if segment.start > readonly_until {
                result.push(TextRange::new(
                    readonly_until,
                    segment.start - readonly_until,
                ));
            }
            readonly_until = readonly_until.max(segment.end());
        }
        if readonly_until < range.end() {
            result.push(TextRange::new(readonly_until, range.end() - readonly_until));
        }
        result
    }
}

/// Nothing is read-only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoReadOnlySections;

impl ReadOnlySectionProvider for NoReadOnlySections {
    fn can_insert(&self, _offset: usize) -> bool {
        true
    }

    fn deletable_segments(&self, range: TextRange) -> Vec<TextRange> {
        vec![range]
    }
}

/// The whole document is read-only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FullyReadOnly;

impl ReadOnlySectionProvider for FullyReadOnly {
    fn can_insert(&self, _offset: usize) -> bool {
        false
    }

    fn deletable_segments(&self, _range: TextRange) -> Vec<TextRange> {
        Vec::new()
    }
}
