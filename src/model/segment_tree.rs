//! Segment collections: an interval tree over document ranges.
//!
//! Segments are nodes of an [`ArenaTree`] ordered by start offset. Each node
//! stores the distance from the previous segment's start and its own length.
//! The subtree summary carries the subtree's total span and the furthest end
//! any segment in it reaches, both relative to the subtree origin, so overlap
//! queries can skip whole subtrees that end before the query starts.

use std::any::Any;
use std::cmp::max;

use crate::model::arena_tree::{ArenaTree, Item, NodeId, Summary};
use crate::model::edit::{OffsetChange, TextRange};
use crate::primitives::read_only::ReadOnlySectionProvider;

#[derive(Debug, Clone)]
struct SegmentNode<T> {
    /// Distance from the previous segment's start.
    node_length: usize,
    segment_length: usize,
    value: T,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SegmentSummary {
    span: usize,
    max_end: usize,
}

impl Summary for SegmentSummary {
    fn combine(self, right: Self) -> Self {
        Self {
            span: self.span + right.span,
            max_end: max(self.max_end, self.span + right.max_end),
        }
    }
}

impl<T> Item for SegmentNode<T> {
    type Summary = SegmentSummary;

    fn summary(&self) -> SegmentSummary {
        SegmentSummary {
            span: self.node_length,
            max_end: self.node_length + self.segment_length,
        }
    }
}

/// Identifies a segment inside its collection. Stays valid until the segment
/// is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(NodeId);

/// A segment as seen from outside the tree.
#[derive(Debug, PartialEq)]
pub struct Segment<'a, T> {
    pub id: SegmentId,
    pub start: usize,
    pub length: usize,
    pub value: &'a T,
}

impl<T> Clone for Segment<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Segment<'_, T> {}

impl<T> Segment<'_, T> {
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn range(&self) -> TextRange {
        TextRange::new(self.start, self.length)
    }
}

#[derive(Debug, Clone)]
pub struct SegmentCollection<T> {
    tree: ArenaTree<SegmentNode<T>>,
}

impl<T> Default for SegmentCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SegmentCollection<T> {
    pub fn new() -> Self {
        Self {
            tree: ArenaTree::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
    }

    fn node_length(&self, node: NodeId) -> usize {
        self.tree.get(node).map_or(0, |n| n.node_length)
    }

    fn start_of(&self, node: NodeId) -> usize {
        self.tree.summary_before(node).span + self.node_length(node)
    }

    fn segment(&self, node: NodeId, start: usize) -> Option<Segment<'_, T>> {
        let n = self.tree.get(node)?;
        Some(Segment {
            id: SegmentId(node),
            start,
            length: n.segment_length,
            value: &n.value,
        })
    }

    /// First node whose start satisfies `pred`, for a predicate that is false
    /// then true along the sequence. Returns the node and its start.
    fn first_where(&self, pred: impl Fn(usize) -> bool) -> Option<(NodeId, usize)> {
        let mut current = self.tree.root();
        let mut base = 0;
        let mut found = None;
        while let Some(node) = current {
            let start =
                base + self.tree.summary_of(self.tree.left(node)).span + self.node_length(node);
            if pred(start) {
                found = Some((node, start));
                current = self.tree.left(node);
            } else {
                base = start;
                current = self.tree.right(node);
            }
        }
        found
    }

    /// Makes room for a segment starting at `start`, after every segment
    /// starting at or before it. Returns the node to insert before and the
    /// new node's distance from its predecessor.
    fn make_room(&mut self, start: usize) -> (Option<NodeId>, usize) {
        match self.first_where(|s| s > start) {
            Some((next, next_start)) => {
                let gap = next_start - start;
                let before = self.node_length(next) - gap;
                self.tree.modify(next, |n| n.node_length = gap);
                (Some(next), before)
            }
            None => (None, start - self.tree.total().span),
        }
    }

    /// Moves an existing node to a new range without changing its id.
    fn rethread(&mut self, node: NodeId, start: usize, length: usize) {
        self.release_distance(node);
        self.tree.detach(node);
        let (next, node_length) = self.make_room(start);
        self.tree.modify(node, |n| {
            n.node_length = node_length;
            n.segment_length = length;
        });
        self.tree.attach_before(next, node);
    }

    /// Adds a segment; it goes after existing segments with the same start.
    pub fn add(&mut self, start: usize, length: usize, value: T) -> SegmentId {
        let (next, node_length) = self.make_room(start);
        let node = self.tree.insert_before(
            next,
            SegmentNode {
                node_length,
                segment_length: length,
                value,
            },
        );
        SegmentId(node)
    }

    /// Hands a node's distance to its successor, keeping every other start.
    fn release_distance(&mut self, node: NodeId) {
        let length = self.node_length(node);
        if let Some(next) = self.tree.next(node) {
            self.tree.modify(next, |n| n.node_length += length);
        }
    }

    pub fn remove(&mut self, id: SegmentId) -> Option<T> {
        if !self.tree.contains(id.0) {
            return None;
        }
        self.release_distance(id.0);
        self.tree.remove(id.0).map(|n| n.value)
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.tree.contains(id.0)
    }

    pub fn get(&self, id: SegmentId) -> Option<Segment<'_, T>> {
        if !self.tree.contains(id.0) {
            return None;
        }
        self.segment(id.0, self.start_of(id.0))
    }

    pub fn value(&self, id: SegmentId) -> Option<&T> {
        self.tree.get(id.0).map(|n| &n.value)
    }

    pub fn value_mut(&mut self, id: SegmentId) -> Option<&mut T> {
        self.tree.get_mut(id.0).map(|n| &mut n.value)
    }

    pub fn range(&self, id: SegmentId) -> Option<TextRange> {
        self.get(id).map(|s| s.range())
    }

    /// Moves a segment to a new range, keeping its id.
    pub fn set_range(&mut self, id: SegmentId, start: usize, length: usize) -> bool {
        if !self.tree.contains(id.0) {
            return false;
        }
        self.rethread(id.0, start, length);
        true
    }

    pub fn first(&self) -> Option<Segment<'_, T>> {
        let node = self.tree.first()?;
        self.segment(node, self.start_of(node))
    }

    pub fn last(&self) -> Option<Segment<'_, T>> {
        let node = self.tree.last()?;
        self.segment(node, self.start_of(node))
    }

    pub fn next(&self, id: SegmentId) -> Option<Segment<'_, T>> {
        let next = self.tree.next(id.0)?;
        let start = self.start_of(id.0) + self.node_length(next);
        self.segment(next, start)
    }

    pub fn previous(&self, id: SegmentId) -> Option<Segment<'_, T>> {
        let prev = self.tree.prev(id.0)?;
        let start = self.start_of(id.0) - self.node_length(id.0);
        self.segment(prev, start)
    }

    /// All segments in start order.
    pub fn iter(&self) -> impl Iterator<Item = Segment<'_, T>> + '_ {
        let mut start = 0;
        self.tree.iter().map(move |(node, n)| {
            start += n.node_length;
            Segment {
                id: SegmentId(node),
                start,
                length: n.segment_length,
                value: &n.value,
            }
        })
    }

    /// Segments with `start < range.end() && end > range.offset`, in start order.
    pub fn find_overlapping(&self, range: TextRange) -> Vec<Segment<'_, T>> {
        let mut out = Vec::new();
        self.collect(self.tree.root(), 0, &mut out, &|start: usize, end: usize| {
            (start < range.end(), end > range.offset)
        });
        out
    }

    /// Segments with `start <= offset <= end`, in start order.
    pub fn find_containing(&self, offset: usize) -> Vec<Segment<'_, T>> {
        let mut out = Vec::new();
        self.collect(self.tree.root(), 0, &mut out, &|start: usize, end: usize| {
            (start <= offset, end >= offset)
        });
        out
    }

    /// First segment starting at or after `offset`.
    pub fn find_first_after(&self, offset: usize) -> Option<Segment<'_, T>> {
        let (node, start) = self.first_where(|s| s >= offset)?;
        self.segment(node, start)
    }

    /// Last segment starting at or before `offset`.
    pub fn find_first_before(&self, offset: usize) -> Option<Segment<'_, T>> {
        let mut current = self.tree.root();
        let mut base = 0;
        let mut found = None;
        while let Some(node) = current {
            let start =
                base + self.tree.summary_of(self.tree.left(node)).span + self.node_length(node);
            if start <= offset {
                found = Some((node, start));
                base = start;
                current = self.tree.right(node);
            } else {
                current = self.tree.left(node);
            }
        }
        let (node, start) = found?;
        self.segment(node, start)
    }

    /// In-order walk with pruning. `test(start, end)` returns whether the
    /// start bound and the end bound hold; the start bound must be monotone
    /// (once false, false for every later segment) and the end bound is
    /// checked against subtree `max_end` to skip subtrees.
    fn collect<'a>(
        &'a self,
        node: Option<NodeId>,
        base: usize,
        out: &mut Vec<Segment<'a, T>>,
        test: &dyn Fn(usize, usize) -> (bool, bool),
    ) -> bool {
        let Some(node) = node else {
            return true;
        };
        let summary = self.tree.subtree_summary(node);
        if !test(base, base + summary.max_end).1 {
            // No segment in this subtree reaches far enough. The start bound
            // may still hold for later subtrees.
            return true;
        }
        let left = self.tree.left(node);
        if !self.collect(left, base, out, test) {
            return false;
        }
        let start = base + self.tree.summary_of(left).span + self.node_length(node);
        let length = self.tree.get(node).map_or(0, |n| n.segment_length);
        let (starts_ok, ends_ok) = test(start, start + length);
        if !starts_ok {
            return false;
        }
        if ends_ok {
            if let Some(segment) = self.segment(node, start) {
                out.push(segment);
            }
        }
        self.collect(self.tree.right(node), start, out, test)
    }

    /// Adjusts every segment for an edit.
    ///
    /// A pure insertion strictly inside a segment grows it; at a segment's
    /// start it moves the segment; at its end it leaves the segment alone. A
    /// removal that cuts a segment's tail truncates it, and one that runs into
    /// a segment from the front moves the segment's start to the end of the
    /// replaced text.
    pub fn update_offsets(&mut self, change: &OffsetChange) {
        if self.tree.is_empty() {
            return;
        }
        let offset = change.offset;
        if change.removal_length == 0 {
            let inserted = change.insertion_length;
            if inserted == 0 {
                return;
            }
            let growing: Vec<NodeId> = self
                .find_containing(offset)
                .into_iter()
                .filter(|s| s.start < offset && offset < s.end())
                .map(|s| s.id.0)
                .collect();
            for node in growing {
                self.tree.modify(node, |n| n.segment_length += inserted);
            }
            if let Some((node, _)) = self.first_where(|s| s >= offset) {
                self.tree.modify(node, |n| n.node_length += inserted);
            }
            return;
        }

        let removal_end = change.removal_end();
        let touched: Vec<NodeId> = {
            let mut out = Vec::new();
            self.collect(self.tree.root(), 0, &mut out, &|start: usize, end: usize| {
                (start <= removal_end, end >= offset)
            });
            out.into_iter().map(|s| s.id.0).collect()
        };
        for node in touched {
            let start = self.start_of(node);
            let length = self.tree.get(node).map_or(0, |n| n.segment_length);
            let end = start + length;
            if start <= offset {
                let new_length = if end >= removal_end {
                    length + change.insertion_length - change.removal_length
                } else {
                    offset - start
                };
                self.tree.modify(node, |n| n.segment_length = new_length);
            } else {
                self.rethread(node, removal_end, end.saturating_sub(removal_end));
            }
        }
        if let Some((node, _)) = self.first_where(|s| s > offset) {
            self.tree.modify(node, |n| {
                n.node_length = (n.node_length + change.insertion_length)
                    .saturating_sub(change.removal_length);
            });
        }
        tracing::trace!(
            "segments: replaced {}+{} with {}, {} segments",
            offset,
            change.removal_length,
            change.insertion_length,
            self.len()
        );
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        self.tree.check_invariants()
    }
}

/// Type-erased view of a collection registered with a document.
pub(crate) trait TrackedSegments: Any {
    fn update_offsets(&mut self, change: &OffsetChange);
    fn read_only_view(&self) -> &dyn ReadOnlySectionProvider;
    fn check_invariants(&self) -> Result<(), String>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: 'static> TrackedSegments for SegmentCollection<T> {
    fn update_offsets(&mut self, change: &OffsetChange) {
        SegmentCollection::update_offsets(self, change);
    }

    fn read_only_view(&self) -> &dyn ReadOnlySectionProvider {
        self
    }

    fn check_invariants(&self) -> Result<(), String> {
        SegmentCollection::check_invariants(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
