use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::model::anchor::AnchorMovement;

/// A half-open character range `[offset, offset + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TextRange {
    pub offset: usize,
    pub length: usize,
}

impl TextRange {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// Zero-length range at `offset`.
    pub fn empty(offset: usize) -> Self {
        Self { offset, length: 0 }
    }

    /// Saturates at `usize::MAX`.
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.length)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// True when `offset` lies inside the range, end inclusive.
    pub fn contains(&self, offset: usize) -> bool {
        self.offset <= offset && offset <= self.end()
    }

    /// Strict overlap: ranges that only touch do not overlap.
    pub fn overlaps(&self, other: &TextRange) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }

    pub fn to_range(&self) -> Range<usize> {
        self.offset..self.end()
    }
}

impl From<Range<usize>> for TextRange {
    fn from(range: Range<usize>) -> Self {
        Self {
            offset: range.start,
            length: range.end.saturating_sub(range.start),
        }
    }
}

/// Length-only description of an edit: at `offset`, `removal_length`
/// characters were replaced by `insertion_length` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OffsetChange {
    pub offset: usize,
    pub removal_length: usize,
    pub insertion_length: usize,
}

impl OffsetChange {
    pub fn new(offset: usize, removal_length: usize, insertion_length: usize) -> Self {
        Self {
            offset,
            removal_length,
            insertion_length,
        }
    }

    pub fn insertion(offset: usize, length: usize) -> Self {
        Self::new(offset, 0, length)
    }

    pub fn removal(offset: usize, length: usize) -> Self {
        Self::new(offset, length, 0)
    }

    pub fn removal_end(&self) -> usize {
        self.offset + self.removal_length
    }

    /// Net change in document length.
    pub fn delta(&self) -> isize {
        self.insertion_length as isize - self.removal_length as isize
    }

    /// Maps an offset from before the change to after it.
    ///
    /// Offsets before the change stay put, offsets at or after the end of the
    /// removed text shift by [`OffsetChange::delta`]. An offset inside the
    /// removed text, or exactly at a pure insertion, lands at the start or the
    /// end of the inserted text depending on `movement`. An offset exactly at
    /// the start of a non-empty removal stays before the inserted text.
    pub fn new_offset(&self, old: usize, movement: AnchorMovement) -> usize {
        if !(self.removal_length == 0 && old == self.offset) {
            if old <= self.offset {
                return old;
            }
            if old >= self.removal_end() {
                return old + self.insertion_length - self.removal_length;
            }
        }
        match movement {
            AnchorMovement::BeforeInsertion => self.offset,
            AnchorMovement::AfterInsertion => self.offset + self.insertion_length,
        }
    }

    /// True when `old` lies strictly inside the removed text.
    pub fn is_removed(&self, old: usize) -> bool {
        self.offset < old && old < self.removal_end()
    }
}

/// One atomic `replace` as recorded by the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChange {
    pub offset: usize,
    pub removed_text: String,
    pub inserted_text: String,
    pub removal_length: usize,
    pub insertion_length: usize,
    /// Document version after the change was applied.
    pub version: u64,
}

impl DocumentChange {
    pub fn new(offset: usize, removed_text: String, inserted_text: String, version: u64) -> Self {
        Self {
            offset,
            removal_length: removed_text.chars().count(),
            insertion_length: inserted_text.chars().count(),
            removed_text,
            inserted_text,
            version,
        }
    }

    pub fn offset_change(&self) -> OffsetChange {
        OffsetChange::new(self.offset, self.removal_length, self.insertion_length)
    }

    /// The change that undoes this one.
    pub fn inverse(&self) -> Self {
        Self {
            offset: self.offset,
            removed_text: self.inserted_text.clone(),
            inserted_text: self.removed_text.clone(),
            removal_length: self.insertion_length,
            insertion_length: self.removal_length,
            version: self.version,
        }
    }
}
