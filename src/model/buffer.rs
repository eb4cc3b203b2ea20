//! Character storage backed by a rope.
//!
//! Offsets and lengths count `char`s. Edits, slices and lookups cost
//! O(log n + edit size) regardless of where in the document they happen.

use ropey::iter::Chars;
use ropey::Rope;

use crate::error::{DocumentError, Result};

/// The record produced by [`TextBuffer::replace`], after the rope has been
/// mutated and before any dependent structure is updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferChange {
    pub offset: usize,
    pub removed_text: String,
    pub inserted_length: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    rope: Rope,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    pub fn len(&self) -> usize {
        self.rope.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks that `[offset, offset + length)` lies inside the buffer.
    pub fn check_range(&self, offset: usize, length: usize) -> Result<()> {
        let len = self.len();
        match offset.checked_add(length) {
            Some(end) if end <= len => Ok(()),
            _ => Err(DocumentError::out_of_range(offset, length, len)),
        }
    }

    pub fn slice(&self, offset: usize, length: usize) -> Result<String> {
        self.check_range(offset, length)?;
        Ok(self.rope.slice(offset..offset + length).to_string())
    }

    pub fn char_at(&self, offset: usize) -> Result<char> {
        self.check_range(offset, 1)?;
        Ok(self.rope.char(offset))
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Iterates characters starting at `offset`, which must be `<= len()`.
    pub(crate) fn chars_at(&self, offset: usize) -> Chars<'_> {
        self.rope.chars_at(offset.min(self.len()))
    }

    pub(crate) fn rope(&self) -> &Rope {
        &self.rope
    }

    /// Replaces `length` characters at `offset` with `text`.
    pub fn replace(&mut self, offset: usize, length: usize, text: &str) -> Result<BufferChange> {
        self.check_range(offset, length)?;
        let removed_text = self.rope.slice(offset..offset + length).to_string();
        if length > 0 {
            self.rope.remove(offset..offset + length);
        }
        if !text.is_empty() {
            self.rope.insert(offset, text);
        }
        Ok(BufferChange {
            offset,
            removed_text,
            inserted_length: text.chars().count(),
        })
    }
}
