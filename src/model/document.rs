//! The document: text plus everything that tracks positions in it.
//!
//! All mutation goes through [`Document::replace`]. Each call is applied to
//! the buffer first and then offered to the line index, the anchors and every
//! registered segment collection, in that order. Changes are collected while
//! an update scope is open and delivered to listeners as one [`ChangeBatch`]
//! when the outermost scope closes.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::DocumentConfig;
use crate::error::{DocumentError, Result};
use crate::model::anchor::{AnchorMovement, TextAnchor};
use crate::model::anchor_tree::{AnchorKey, AnchorTree};
use crate::model::buffer::TextBuffer;
use crate::model::edit::{DocumentChange, OffsetChange, TextRange};
use crate::model::line_index::{Line, LineIndex, TextLocation};
use crate::model::segment_tree::{SegmentCollection, SegmentId, TrackedSegments};
use crate::model::snapshot::TextSnapshot;
use crate::primitives::read_only::{NoReadOnlySections, ReadOnlySectionProvider};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique document identity; handles remember the document they
/// were created by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Everything that changed during one outermost update scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatch {
    /// Changes in the order they were applied.
    pub changes: Vec<DocumentChange>,
    pub old_version: u64,
    pub new_version: u64,
    pub old_line_count: usize,
    pub new_line_count: usize,
}

/// Typed handle to a segment collection registered with a document.
pub struct SegmentCollectionHandle<T> {
    document: DocumentId,
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for SegmentCollectionHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SegmentCollectionHandle<T> {}

impl<T> PartialEq for SegmentCollectionHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.document == other.document && self.index == other.index
    }
}

impl<T> Eq for SegmentCollectionHandle<T> {}

impl<T> fmt::Debug for SegmentCollectionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentCollectionHandle")
            .field("document", &self.document)
            .field("index", &self.index)
            .finish()
    }
}

type Listener = Box<dyn FnMut(&ChangeBatch)>;

pub struct Document {
    id: DocumentId,
    config: DocumentConfig,
    buffer: TextBuffer,
    lines: LineIndex,
    anchors: AnchorTree,
    collections: Vec<Option<Box<dyn TrackedSegments>>>,
    read_only: Option<usize>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    update_depth: usize,
    pending: Vec<DocumentChange>,
    batch_start_version: u64,
    batch_start_line_count: usize,
    version: u64,
    edits_since_sweep: usize,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("len", &self.len())
            .field("line_count", &self.line_count())
            .field("version", &self.version)
            .field("anchors", &self.anchors.len())
            .field("collections", &self.collections.iter().flatten().count())
            .field("update_depth", &self.update_depth)
            .finish()
    }
}

// ---
// Construction and text access
// ---

impl Document {
    pub fn new() -> Self {
        Self::with_config(DocumentConfig::default())
    }

    pub fn with_config(config: DocumentConfig) -> Self {
        Self {
            id: DocumentId::next(),
            config,
            buffer: TextBuffer::new(),
            lines: LineIndex::new(),
            anchors: AnchorTree::new(),
            collections: Vec::new(),
            read_only: None,
            listeners: Vec::new(),
            next_listener: 0,
            update_depth: 0,
            pending: Vec::new(),
            batch_start_version: 0,
            batch_start_line_count: 1,
            version: 0,
            edits_since_sweep: 0,
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::from_text_with_config(text, DocumentConfig::default())
    }

    pub fn from_text_with_config(text: &str, config: DocumentConfig) -> Self {
        let mut document = Self::with_config(config);
        document.buffer = TextBuffer::from_text(text);
        document.lines = LineIndex::from_text(text);
        document
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Incremented by every `replace`.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn text(&self) -> String {
        self.buffer.text()
    }

    pub fn slice(&self, offset: usize, length: usize) -> Result<String> {
        self.buffer.slice(offset, length)
    }

    pub fn char_at(&self, offset: usize) -> Result<char> {
        self.buffer.char_at(offset)
    }

    /// Fails with `OutOfRange` unless `[offset, offset + length)` is inside
    /// the document.
    pub fn check_range(&self, offset: usize, length: usize) -> Result<()> {
        self.buffer.check_range(offset, length)
    }

    pub fn line_count(&self) -> usize {
        self.lines.line_count()
    }

    pub fn line(&self, number: usize) -> Result<Line> {
        self.lines.line(number)
    }

    pub fn line_at(&self, offset: usize) -> Result<Line> {
        self.lines.line_at(offset)
    }

    pub fn lines(&self) -> impl Iterator<Item = Line> + '_ {
        self.lines.lines()
    }

    /// Text of a line without its terminator.
    pub fn line_text(&self, number: usize) -> Result<String> {
        let line = self.line(number)?;
        self.slice(line.offset, line.length)
    }

    pub fn location(&self, offset: usize) -> Result<TextLocation> {
        self.lines.location(offset)
    }

    pub fn offset_of(&self, location: TextLocation) -> Result<usize> {
        self.lines.offset_of(location)
    }

    /// Immutable copy of the current text. Not available inside an update
    /// scope, where the text may be half way through a group of edits.
    pub fn snapshot(&self) -> Result<TextSnapshot> {
        if self.update_depth > 0 {
            return Err(DocumentError::UpdateInProgress);
        }
        Ok(TextSnapshot::new(self.buffer.rope().clone(), self.version))
    }
}

// ---
// Editing and update scopes
// ---

/// Guard returned by [`Document::begin_update`]. Derefs to the document; the
/// outermost guard delivers the collected changes when it is dropped, on every
/// exit path.
pub struct UpdateScope<'a> {
    document: &'a mut Document,
}

impl Deref for UpdateScope<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        self.document
    }
}

impl DerefMut for UpdateScope<'_> {
    fn deref_mut(&mut self) -> &mut Document {
        self.document
    }
}

impl Drop for UpdateScope<'_> {
    fn drop(&mut self) {
        self.document.end_update();
    }
}

impl Document {
    /// Opens an update scope. Scopes nest; listeners hear about the changes
    /// once, when the outermost scope closes.
    pub fn begin_update(&mut self) -> UpdateScope<'_> {
        if self.update_depth == 0 {
            self.batch_start_version = self.version;
            self.batch_start_line_count = self.line_count();
        }
        self.update_depth += 1;
        UpdateScope { document: self }
    }

    pub fn is_in_update(&self) -> bool {
        self.update_depth > 0
    }

    fn end_update(&mut self) {
        self.update_depth = self.update_depth.saturating_sub(1);
        if self.update_depth > 0 || self.pending.is_empty() {
            return;
        }
        let batch = ChangeBatch {
            changes: std::mem::take(&mut self.pending),
            old_version: self.batch_start_version,
            new_version: self.version,
            old_line_count: self.batch_start_line_count,
            new_line_count: self.line_count(),
        };
        tracing::debug!(
            "update scope closed: {} changes, version {} -> {}, {} listeners",
            batch.changes.len(),
            batch.old_version,
            batch.new_version,
            self.listeners.len()
        );
        for (_, listener) in self.listeners.iter_mut() {
            listener(&batch);
        }
    }

    /// Registers a callback that receives one batch per outermost update
    /// scope that changed the text.
    pub fn add_listener(&mut self, listener: impl FnMut(&ChangeBatch) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    /// Replaces `length` characters at `offset` with `text` as one atomic
    /// change. Outside an update scope, listeners are notified right away.
    pub fn replace(&mut self, offset: usize, length: usize, text: &str) -> Result<DocumentChange> {
        self.check_range(offset, length)?;
        let mut scope = self.begin_update();
        let result = scope.apply_replace(offset, length, text);
        drop(scope);
        result
    }

    pub fn insert(&mut self, offset: usize, text: &str) -> Result<DocumentChange> {
        self.replace(offset, 0, text)
    }

    pub fn remove(&mut self, offset: usize, length: usize) -> Result<DocumentChange> {
        self.replace(offset, length, "")
    }

    fn apply_replace(&mut self, offset: usize, length: usize, text: &str) -> Result<DocumentChange> {
        let buffer_change = self.buffer.replace(offset, length, text)?;
        let change = OffsetChange::new(offset, length, buffer_change.inserted_length);

        self.lines.apply(&self.buffer, &change);
        self.anchors.apply(&change);
        for collection in self.collections.iter_mut().flatten() {
            collection.update_offsets(&change);
        }

        self.version += 1;
        let record = DocumentChange::new(
            offset,
            buffer_change.removed_text,
            text.to_string(),
            self.version,
        );
        tracing::trace!(
            "replace offset={} removed={} inserted={} version={} lines={}",
            offset,
            record.removal_length,
            record.insertion_length,
            self.version,
            self.line_count()
        );
        self.pending.push(record.clone());
        self.after_edit();
        Ok(record)
    }

    fn after_edit(&mut self) {
        let interval = self.config.anchor_sweep_interval;
        if interval > 0 {
            self.edits_since_sweep += 1;
            if self.edits_since_sweep >= interval {
                self.edits_since_sweep = 0;
                self.anchors.purge();
            }
        }
        if self.config.verify_invariants {
            if let Err(e) = self.check_invariants() {
                panic!("document invariant violated after edit: {e}");
            }
        }
    }

    /// Verifies every index against the text.
    pub fn check_invariants(&self) -> Result<(), String> {
        self.lines.check_invariants()?;
        if self.lines.text_length() != self.buffer.len() {
            return Err(format!(
                "line index covers {} characters, buffer holds {}",
                self.lines.text_length(),
                self.buffer.len()
            ));
        }
        self.anchors.check_invariants()?;
        for collection in self.collections.iter().flatten() {
            collection.check_invariants()?;
        }
        Ok(())
    }
}

// ---
// Anchors
// ---

impl Document {
    fn anchor_key(&self, anchor: &TextAnchor) -> Result<AnchorKey> {
        if anchor.document != self.id {
            return Err(DocumentError::ForeignHandle);
        }
        Ok(anchor.key)
    }

    /// Creates an anchor with the configured default movement and
    /// survive-deletion flag.
    pub fn create_anchor(&mut self, offset: usize) -> Result<TextAnchor> {
        self.create_anchor_with(
            offset,
            self.config.default_movement,
            self.config.default_survive_deletion,
        )
    }

    pub fn create_anchor_with(
        &mut self,
        offset: usize,
        movement: AnchorMovement,
        survive_deletion: bool,
    ) -> Result<TextAnchor> {
        self.check_range(offset, 0)?;
        let (key, token) = self.anchors.create(offset, movement, survive_deletion);
        Ok(TextAnchor {
            document: self.id,
            key,
            token,
        })
    }

    pub fn anchor_offset(&self, anchor: &TextAnchor) -> Result<usize> {
        self.anchors.offset(self.anchor_key(anchor)?)
    }

    pub fn anchor_location(&self, anchor: &TextAnchor) -> Result<TextLocation> {
        self.location(self.anchor_offset(anchor)?)
    }

    /// Whether the anchor's text was removed. Does not fail for deleted
    /// anchors, only for foreign or released ones.
    pub fn is_anchor_deleted(&self, anchor: &TextAnchor) -> Result<bool> {
        self.anchors.is_deleted(self.anchor_key(anchor)?)
    }

    pub fn anchor_movement(&self, anchor: &TextAnchor) -> Result<AnchorMovement> {
        self.anchors.movement(self.anchor_key(anchor)?)
    }

    pub fn set_anchor_movement(
        &mut self,
        anchor: &TextAnchor,
        movement: AnchorMovement,
    ) -> Result<()> {
        let key = self.anchor_key(anchor)?;
        self.anchors.set_movement(key, movement)
    }

    pub fn anchor_survives_deletion(&self, anchor: &TextAnchor) -> Result<bool> {
        self.anchors.survive_deletion(self.anchor_key(anchor)?)
    }

    pub fn set_anchor_survive_deletion(&mut self, anchor: &TextAnchor, survive: bool) -> Result<()> {
        let key = self.anchor_key(anchor)?;
        self.anchors.set_survive_deletion(key, survive)
    }

    /// Stops tracking an anchor. Every clone of the handle becomes invalid.
    pub fn release_anchor(&mut self, anchor: TextAnchor) -> Result<()> {
        let key = self.anchor_key(&anchor)?;
        self.anchors.release(key)
    }

    /// Reclaims anchors whose handles were all dropped. Returns how many were
    /// reclaimed.
    pub fn purge_anchors(&mut self) -> usize {
        self.edits_since_sweep = 0;
        self.anchors.purge()
    }

    /// Number of anchors currently tracked, including ones whose handles were
    /// dropped but not yet reclaimed.
    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }
}

// ---
// Segment collections
// ---

impl Document {
    /// Registers a new, empty segment collection that follows every edit.
    pub fn create_segment_collection<T: 'static>(&mut self) -> SegmentCollectionHandle<T> {
        self.collections
            .push(Some(Box::new(SegmentCollection::<T>::new())));
        SegmentCollectionHandle {
            document: self.id,
            index: self.collections.len() - 1,
            _marker: PhantomData,
        }
    }

    fn tracked(&self, document: DocumentId, index: usize) -> Result<&dyn TrackedSegments> {
        if document != self.id {
            return Err(DocumentError::ForeignHandle);
        }
        self.collections
            .get(index)
            .and_then(|c| c.as_deref())
            .ok_or(DocumentError::ForeignHandle)
    }

    pub fn segments<T: 'static>(
        &self,
        handle: &SegmentCollectionHandle<T>,
    ) -> Result<&SegmentCollection<T>> {
        let tracked = self.tracked(handle.document, handle.index)?;
        tracked
            .as_any()
            .downcast_ref::<SegmentCollection<T>>()
            .ok_or(DocumentError::ForeignHandle)
    }

    pub fn segments_mut<T: 'static>(
        &mut self,
        handle: &SegmentCollectionHandle<T>,
    ) -> Result<&mut SegmentCollection<T>> {
        if handle.document != self.id {
            return Err(DocumentError::ForeignHandle);
        }
        self.collections
            .get_mut(handle.index)
            .and_then(|c| c.as_deref_mut())
            .and_then(|c| c.as_any_mut().downcast_mut::<SegmentCollection<T>>())
            .ok_or(DocumentError::ForeignHandle)
    }

    /// Adds a segment after checking that it lies inside the document.
    pub fn add_segment<T: 'static>(
        &mut self,
        handle: &SegmentCollectionHandle<T>,
        offset: usize,
        length: usize,
        value: T,
    ) -> Result<SegmentId> {
        self.check_range(offset, length)?;
        Ok(self.segments_mut(handle)?.add(offset, length, value))
    }

    /// Unregisters a collection and hands it back. It no longer follows edits.
    pub fn remove_segment_collection<T: 'static>(
        &mut self,
        handle: SegmentCollectionHandle<T>,
    ) -> Result<SegmentCollection<T>> {
        self.segments(&handle)?;
        let boxed = self.collections[handle.index]
            .take()
            .ok_or(DocumentError::ForeignHandle)?;
        if self.read_only == Some(handle.index) {
            self.read_only = None;
        }
        let any: Box<dyn Any> = boxed.into_any();
        any.downcast::<SegmentCollection<T>>()
            .map(|collection| *collection)
            .map_err(|_| DocumentError::ForeignHandle)
    }
}

// ---
// Read-only sections
// ---

impl Document {
    /// Makes every segment of a registered collection read-only for
    /// [`Document::replace_checked`] and [`Document::replace_clipped`].
    /// `None` makes the whole document editable again.
    pub fn set_read_only_sections<T: 'static>(
        &mut self,
        handle: Option<&SegmentCollectionHandle<T>>,
    ) -> Result<()> {
        self.read_only = match handle {
            Some(handle) => {
                self.segments(handle)?;
                Some(handle.index)
            }
            None => None,
        };
        Ok(())
    }

    /// The provider consulted by the checked edit operations.
    pub fn read_only_sections(&self) -> &dyn ReadOnlySectionProvider {
        match self
            .read_only
            .and_then(|index| self.tracked(self.id, index).ok())
        {
            Some(tracked) => tracked.read_only_view(),
            None => &NoReadOnlySections,
        }
    }

    pub fn can_insert(&self, offset: usize) -> Result<bool> {
        self.check_range(offset, 0)?;
        Ok(self.read_only_sections().can_insert(offset))
    }

    pub fn deletable_segments(&self, range: TextRange) -> Result<Vec<TextRange>> {
        self.check_range(range.offset, range.length)?;
        Ok(self.read_only_sections().deletable_segments(range))
    }

    fn allows(provider: &dyn ReadOnlySectionProvider, range: TextRange, text: &str) -> bool {
        provider.deletable_segments(range) == [range]
            && (text.is_empty() || provider.can_insert(range.offset))
    }

    /// Like [`Document::replace`], but fails with `InvalidEditWhileReadOnly`
    /// when any part of the edit touches a read-only section.
    pub fn replace_checked(
        &mut self,
        offset: usize,
        length: usize,
        text: &str,
    ) -> Result<DocumentChange> {
        self.check_range(offset, length)?;
        let allowed = Self::allows(self.read_only_sections(), TextRange::new(offset, length), text);
        self.finish_checked(allowed, offset, length, text)
    }

    /// [`Document::replace_checked`] against an explicit provider.
    pub fn replace_checked_with(
        &mut self,
        offset: usize,
        length: usize,
        text: &str,
        provider: &dyn ReadOnlySectionProvider,
    ) -> Result<DocumentChange> {
        self.check_range(offset, length)?;
        let allowed = Self::allows(provider, TextRange::new(offset, length), text);
        self.finish_checked(allowed, offset, length, text)
    }

    fn finish_checked(
        &mut self,
        allowed: bool,
        offset: usize,
        length: usize,
        text: &str,
    ) -> Result<DocumentChange> {
        if !allowed {
            tracing::warn!("rejected edit at {}+{}: read-only section", offset, length);
            return Err(DocumentError::InvalidEditWhileReadOnly { offset, length });
        }
        self.replace(offset, length, text)
    }

    /// Removes every editable part of `range` and puts `text` in place of the
    /// last one, all inside one update scope. Returns the parts that were
    /// edited; fails with `InvalidEditWhileReadOnly` if there are none.
    pub fn replace_clipped(&mut self, range: TextRange, text: &str) -> Result<Vec<TextRange>> {
        self.check_range(range.offset, range.length)?;
        let pieces = self.deletable_segments(range)?;
        self.apply_clipped(range, pieces, text)
    }

    /// [`Document::replace_clipped`] against an explicit provider.
    pub fn replace_clipped_with(
        &mut self,
        range: TextRange,
        text: &str,
        provider: &dyn ReadOnlySectionProvider,
    ) -> Result<Vec<TextRange>> {
        self.check_range(range.offset, range.length)?;
        let pieces = provider.deletable_segments(range);
        self.apply_clipped(range, pieces, text)
    }

    fn apply_clipped(
        &mut self,
        range: TextRange,
        pieces: Vec<TextRange>,
        text: &str,
    ) -> Result<Vec<TextRange>> {
        if pieces.is_empty() {
            tracing::warn!(
                "rejected edit at {}+{}: fully read-only",
                range.offset,
                range.length
            );
            return Err(DocumentError::InvalidEditWhileReadOnly {
                offset: range.offset,
                length: range.length,
            });
        }
        let mut scope = self.begin_update();
        for (k, piece) in pieces.iter().enumerate().rev() {
            let replacement = if k + 1 == pieces.len() { text } else { "" };
            scope.apply_replace(piece.offset, piece.length, replacement)?;
        }
        Ok(pieces)
    }
}
