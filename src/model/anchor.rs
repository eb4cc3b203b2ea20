//! Anchor handles.
//!
//! A [`TextAnchor`] names a tracked position inside one [`Document`]. The
//! document only keeps a weak reference to the handle's liveness token, so an
//! anchor whose every clone was dropped is reclaimed on the next sweep.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::anchor_tree::AnchorKey;
use crate::model::document::{Document, DocumentId};
use crate::model::edit::TextRange;

/// Where an anchor ends up when text is inserted exactly at its offset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMovement {
    /// Stay in front of the inserted text.
    BeforeInsertion,
    /// Move behind the inserted text.
    #[default]
    AfterInsertion,
}

/// Handle to an anchor. Clones share one liveness token.
///
/// Handles are `!Send`: they belong to the thread that owns the document.
#[derive(Clone)]
pub struct TextAnchor {
    pub(crate) document: DocumentId,
    pub(crate) key: AnchorKey,
    // Only held: the tree watches it through a `Weak`.
    #[allow(dead_code)]
    pub(crate) token: Rc<()>,
}

impl TextAnchor {
    pub fn document_id(&self) -> DocumentId {
        self.document
    }
}

impl fmt::Debug for TextAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextAnchor")
            .field("document", &self.document)
            .field("slot", &self.key.slot)
            .field("generation", &self.key.generation)
            .finish()
    }
}

impl PartialEq for TextAnchor {
    fn eq(&self, other: &Self) -> bool {
        self.document == other.document && self.key == other.key
    }
}

impl Eq for TextAnchor {}

impl Hash for TextAnchor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.document.hash(state);
        self.key.hash(state);
    }
}

/// A range whose ends are two anchors. Offset and length are re-derived from
/// the anchors on every query, so the range follows edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorSegment {
    pub start: TextAnchor,
    pub end: TextAnchor,
}

impl AnchorSegment {
    pub fn new(start: TextAnchor, end: TextAnchor) -> Self {
        Self { start, end }
    }

    /// Creates both anchors. The start uses `AfterInsertion` and the end
    /// `BeforeInsertion`, so typing at either boundary does not grow the range.
    pub fn create(document: &mut Document, offset: usize, length: usize) -> Result<Self> {
        document.check_range(offset, length)?;
        let start = document.create_anchor_with(offset, AnchorMovement::AfterInsertion, false)?;
        let end =
            document.create_anchor_with(offset + length, AnchorMovement::BeforeInsertion, false)?;
        Ok(Self { start, end })
    }

    pub fn offset(&self, document: &Document) -> Result<usize> {
        document.anchor_offset(&self.start)
    }

    pub fn end_offset(&self, document: &Document) -> Result<usize> {
        document.anchor_offset(&self.end)
    }

    /// Never negative: an end that moved before the start yields 0.
    pub fn length(&self, document: &Document) -> Result<usize> {
        Ok(self.range(document)?.length)
    }

    pub fn range(&self, document: &Document) -> Result<TextRange> {
        let start = self.offset(document)?;
        let end = self.end_offset(document)?;
        Ok(TextRange::new(start, end.saturating_sub(start)))
    }
}
