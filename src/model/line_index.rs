//! Offset ↔ line mapping.
//!
//! Lines are kept in an [`ArenaTree`] in document order. Each node stores the
//! line's total length (content plus terminator) and its terminator length; the
//! cached subtree summary holds `(length, line count)`, so both directions of
//! the lookup are a single O(log lines) descent. Line numbers are ranks and are
//! never stored.
//!
//! Recognized terminators are `\r\n`, `\n` and `\r`. The last line never has a
//! terminator, and an empty document has exactly one empty line.

use serde::{Deserialize, Serialize};

use crate::error::{DocumentError, Result};
use crate::model::arena_tree::{ArenaTree, Item, NodeId, Summary};
use crate::model::buffer::TextBuffer;
use crate::model::edit::{OffsetChange, TextRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineNode {
    total_length: usize,
    delimiter_length: usize,
}

impl LineNode {
    fn new(total_length: usize, delimiter_length: usize) -> Self {
        Self {
            total_length,
            delimiter_length,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct LineSummary {
    length: usize,
    lines: usize,
}

impl Summary for LineSummary {
    fn combine(self, right: Self) -> Self {
        Self {
            length: self.length + right.length,
            lines: self.lines + right.lines,
        }
    }
}

impl Item for LineNode {
    type Summary = LineSummary;

    fn summary(&self) -> LineSummary {
        LineSummary {
            length: self.total_length,
            lines: 1,
        }
    }
}

/// A line of the document, computed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    /// 1-based line number.
    pub number: usize,
    /// Offset of the first character of the line.
    pub offset: usize,
    /// Length without the terminator.
    pub length: usize,
    /// 0 for the last line, 1 for `\n` or `\r`, 2 for `\r\n`.
    pub delimiter_length: usize,
}

impl Line {
    pub fn total_length(&self) -> usize {
        self.length + self.delimiter_length
    }

    /// Offset just past the line content, before the terminator.
    pub fn end_offset(&self) -> usize {
        self.offset + self.length
    }

    /// Content range, terminator excluded.
    pub fn range(&self) -> TextRange {
        TextRange::new(self.offset, self.length)
    }
}

/// A 1-based `(line, column)` position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TextLocation {
    pub line: usize,
    pub column: usize,
}

impl TextLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone)]
pub struct LineIndex {
    tree: ArenaTree<LineNode>,
}

impl Default for LineIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl LineIndex {
    /// Index of an empty document.
    pub fn new() -> Self {
        let mut tree = ArenaTree::new();
        tree.push_back(LineNode::new(0, 0));
        Self { tree }
    }

    pub fn from_text(text: &str) -> Self {
        let mut index = Self::new();
        index.rebuild(text);
        index
    }

    /// Discards the index and rescans `text` from scratch.
    pub fn rebuild(&mut self, text: &str) {
        self.tree.clear();
        for line in scan_lines(text.chars(), text.chars().count(), true) {
            self.tree.push_back(line);
        }
    }

    pub fn line_count(&self) -> usize {
        self.tree.total().lines
    }

    /// Sum of all line lengths, which equals the document length.
    pub fn text_length(&self) -> usize {
        self.tree.total().length
    }

    fn make_line(&self, id: NodeId, offset: usize, number: usize) -> Line {
        let node = self.tree.get(id).copied().unwrap_or(LineNode::new(0, 0));
        Line {
            number,
            offset,
            length: node.total_length - node.delimiter_length,
            delimiter_length: node.delimiter_length,
        }
    }

    /// Finds the node holding `offset`; offsets at or past the end map to the
    /// last line. Returns `(node, line offset, line number)`.
    fn locate(&self, offset: usize) -> Option<(NodeId, usize, usize)> {
        if offset >= self.text_length() {
            let last = self.tree.last()?;
            let before = self.tree.summary_before(last);
            return Some((last, before.length, before.lines + 1));
        }
        let mut node = self.tree.root()?;
        let mut remaining = offset;
        let mut line_offset = 0;
        let mut lines_before = 0;
        loop {
            let left = self.tree.summary_of(self.tree.left(node));
            let total = self.tree.get(node)?.total_length;
            if remaining < left.length {
                node = self.tree.left(node)?;
            } else if remaining < left.length + total {
                return Some((
                    node,
                    line_offset + left.length,
                    lines_before + left.lines + 1,
                ));
            } else {
                remaining -= left.length + total;
                line_offset += left.length + total;
                lines_before += left.lines + 1;
                node = self.tree.right(node)?;
            }
        }
    }

    fn locate_line(&self, number: usize) -> Option<(NodeId, usize)> {
        if number == 0 || number > self.line_count() {
            return None;
        }
        let mut node = self.tree.root()?;
        let mut rank = number - 1;
        let mut line_offset = 0;
        loop {
            let left = self.tree.summary_of(self.tree.left(node));
            if rank < left.lines {
                node = self.tree.left(node)?;
            } else if rank == left.lines {
                return Some((node, line_offset + left.length));
            } else {
                rank -= left.lines + 1;
                line_offset += left.length + self.tree.get(node)?.total_length;
                node = self.tree.right(node)?;
            }
        }
    }

    /// Line by 1-based number.
    pub fn line(&self, number: usize) -> Result<Line> {
        self.locate_line(number)
            .map(|(id, offset)| self.make_line(id, offset, number))
            .ok_or(DocumentError::LineOutOfRange {
                line: number,
                line_count: self.line_count(),
            })
    }

    /// Line containing `offset`; the document end belongs to the last line.
    pub fn line_at(&self, offset: usize) -> Result<Line> {
        let length = self.text_length();
        if offset > length {
            return Err(DocumentError::out_of_range(offset, 0, length));
        }
        self.locate(offset)
            .map(|(id, line_offset, number)| self.make_line(id, line_offset, number))
            .ok_or(DocumentError::out_of_range(offset, 0, length))
    }

    pub fn location(&self, offset: usize) -> Result<TextLocation> {
        let line = self.line_at(offset)?;
        Ok(TextLocation::new(line.number, offset - line.offset + 1))
    }

    /// Offset of a location. Columns past the line content clamp to its end.
    pub fn offset_of(&self, location: TextLocation) -> Result<usize> {
        let line = self.line(location.line)?;
        if location.column <= 1 {
            return Ok(line.offset);
        }
        Ok(line.offset + (location.column - 1).min(line.length))
    }

    pub fn lines(&self) -> impl Iterator<Item = Line> + '_ {
        let mut offset = 0;
        self.tree.iter().enumerate().map(move |(k, (_, node))| {
            let line = Line {
                number: k + 1,
                offset,
                length: node.total_length - node.delimiter_length,
                delimiter_length: node.delimiter_length,
            };
            offset += node.total_length;
            line
        })
    }

    /// Updates the index for an edit already applied to `buffer`.
    ///
    /// Only the lines touched by the edit are rescanned, plus the previous
    /// line when the edit starts at a line start (its `\r` may pair with a new
    /// `\n`). Everything after the edit keeps its nodes.
    pub(crate) fn apply(&mut self, buffer: &TextBuffer, change: &OffsetChange) {
        let Some((mut first, mut region_start, _)) = self.locate(change.offset) else {
            self.rebuild(&buffer.text());
            return;
        };
        if region_start == change.offset && region_start > 0 {
            if let Some(prev) = self.tree.prev(first) {
                region_start -= self.tree.get(prev).map_or(0, |n| n.total_length);
                first = prev;
            }
        }
        let Some((last, last_offset, _)) = self.locate(change.removal_end()) else {
            self.rebuild(&buffer.text());
            return;
        };
        let old_region_end = last_offset + self.tree.get(last).map_or(0, |n| n.total_length);

        let after = self.tree.next(last);
        let new_region_end = old_region_end + change.insertion_length - change.removal_length;
        // The empty tail line is rescanned only when the old region held it.
        let reaches_end = after.is_none();
        let scanned = scan_lines(
            buffer.chars_at(region_start),
            new_region_end - region_start,
            reaches_end,
        );

        let mut old_nodes = vec![first];
        let mut current = first;
        while current != last {
            match self.tree.next(current) {
                Some(next) => {
                    old_nodes.push(next);
                    current = next;
                }
                None => break,
            }
        }

        tracing::trace!(
            "line index: offset={} removed={} inserted={} rescanned {} -> {} lines",
            change.offset,
            change.removal_length,
            change.insertion_length,
            old_nodes.len(),
            scanned.len()
        );

        let reused = old_nodes.len().min(scanned.len());
        for (id, line) in old_nodes.iter().zip(scanned.iter()).take(reused) {
            self.tree.modify(*id, |node| *node = *line);
        }
        for line in scanned.iter().skip(reused) {
            self.tree.insert_before(after, *line);
        }
        for id in old_nodes.iter().skip(reused) {
            self.tree.remove(*id);
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        self.tree.check_invariants()?;
        let count = self.tree.len();
        if count == 0 {
            return Err("line index has no lines".to_string());
        }
        for (k, (_, node)) in self.tree.iter().enumerate() {
            let is_last = k + 1 == count;
            if is_last && node.delimiter_length != 0 {
                return Err(format!("last line {} has a terminator", k + 1));
            }
            if !is_last && !(1..=2).contains(&node.delimiter_length) {
                return Err(format!("line {} has no terminator", k + 1));
            }
            if node.total_length < node.delimiter_length {
                return Err(format!("line {} is shorter than its terminator", k + 1));
            }
        }
        Ok(())
    }
}

/// Splits the next `length` characters into lines. When `keep_tail` is false
/// the (empty) remainder after the final terminator is dropped.
fn scan_lines(chars: impl Iterator<Item = char>, length: usize, keep_tail: bool) -> Vec<LineNode> {
    let mut lines = Vec::new();
    let mut chars = chars.take(length).peekable();
    let mut current = 0;
    while let Some(c) = chars.next() {
        current += 1;
        match c {
            '\n' => {
                lines.push(LineNode::new(current, 1));
                current = 0;
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    current += 1;
                    lines.push(LineNode::new(current, 2));
                } else {
                    lines.push(LineNode::new(current, 1));
                }
                current = 0;
            }
            _ => {}
        }
    }
    if keep_tail || current > 0 {
        lines.push(LineNode::new(current, 0));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference split: (content length, terminator length) per line.
    fn naive_lines(text: &str) -> Vec<(usize, usize)> {
        scan_lines(text.chars(), text.chars().count(), true)
            .into_iter()
            .map(|n| (n.total_length - n.delimiter_length, n.delimiter_length))
            .collect()
    }

    fn shape(index: &LineIndex) -> Vec<(usize, usize)> {
        index
            .lines()
            .map(|l| (l.length, l.delimiter_length))
            .collect()
    }

    fn edit(text: &mut String, index: &mut LineIndex, offset: usize, remove: usize, insert: &str) {
        let mut buffer = TextBuffer::from_text(text);
        buffer.replace(offset, remove, insert).unwrap();
        index.apply(&buffer, &OffsetChange::new(offset, remove, insert.chars().count()));
        *text = buffer.text();
        index.check_invariants().unwrap();
    }

    #[test]
    fn test_empty_document_has_one_line() {
        let index = LineIndex::new();
        assert_eq!(index.line_count(), 1);
        let line = index.line(1).unwrap();
        assert_eq!((line.offset, line.length, line.delimiter_length), (0, 0, 0));
        assert_eq!(index.line_at(0).unwrap().number, 1);
    }

    #[test]
    fn test_terminator_kinds() {
        let index = LineIndex::from_text("a\r\nbb\ncc\rd");
        assert_eq!(shape(&index), vec![(1, 2), (2, 1), (2, 1), (1, 0)]);
        assert_eq!(index.line(3).unwrap().offset, 6);
        assert_eq!(index.line_at(3).unwrap().number, 2);
        assert_eq!(index.line_at(2).unwrap().number, 1);
        assert_eq!(index.line_at(10).unwrap().number, 4);
        assert!(index.line_at(11).is_err());
        assert_eq!(
            index.line(5),
            Err(DocumentError::LineOutOfRange {
                line: 5,
                line_count: 4
            })
        );
        assert!(index.line(0).is_err());
    }

    #[test]
    fn test_trailing_terminator_creates_empty_last_line() {
        let index = LineIndex::from_text("abc\n");
        assert_eq!(shape(&index), vec![(3, 1), (0, 0)]);
        assert_eq!(index.line_at(4).unwrap().number, 2);
    }

    #[test]
    fn test_insert_terminator_splits_line() {
        let mut text = "hello world".to_string();
        let mut index = LineIndex::from_text(&text);
        edit(&mut text, &mut index, 5, 0, "\n");
        assert_eq!(shape(&index), naive_lines(&text));
        assert_eq!(index.line(2).unwrap().offset, 6);
    }

    #[test]
    fn test_remove_terminators_merges_lines() {
        let mut text = "a\nb\nc\nd".to_string();
        let mut index = LineIndex::from_text(&text);
        edit(&mut text, &mut index, 1, 4, "");
        assert_eq!(text, "a\nd");
        assert_eq!(shape(&index), naive_lines(&text));
    }

    #[test]
    fn test_joining_lines_keeps_single_empty_tail() {
        let mut text = "x\ny\n".to_string();
        let mut index = LineIndex::from_text(&text);
        edit(&mut text, &mut index, 1, 1, "");
        assert_eq!(text, "xy\n");
        assert_eq!(shape(&index), vec![(2, 1), (0, 0)]);
        assert!(index.line(3).is_err());

        let mut text = "\r\r".to_string();
        let mut index = LineIndex::from_text(&text);
        edit(&mut text, &mut index, 0, 1, "");
        assert_eq!(shape(&index), vec![(0, 1), (0, 0)]);
    }

    #[test]
    fn test_crlf_pairing_across_edits() {
        let mut text = "ab\rcd".to_string();
        let mut index = LineIndex::from_text(&text);
        // A new "\n" right after a lone "\r" joins it into one terminator.
        edit(&mut text, &mut index, 3, 0, "\n");
        assert_eq!(shape(&index), vec![(2, 2), (2, 0)]);
        // Inserting between "\r" and "\n" splits the pair again.
        edit(&mut text, &mut index, 3, 0, "x");
        assert_eq!(shape(&index), naive_lines(&text));
        assert_eq!(index.line_count(), 3);
        // Removing the character between them rejoins it.
        edit(&mut text, &mut index, 3, 1, "");
        assert_eq!(shape(&index), vec![(2, 2), (2, 0)]);
    }

    #[test]
    fn test_location_round_trip() {
        let index = LineIndex::from_text("one\ntwo\r\nthree");
        assert_eq!(index.location(5).unwrap(), TextLocation::new(2, 2));
        assert_eq!(index.offset_of(TextLocation::new(2, 2)).unwrap(), 5);
        assert_eq!(index.offset_of(TextLocation::new(2, 99)).unwrap(), 7);
        assert_eq!(index.offset_of(TextLocation::new(3, 0)).unwrap(), 9);
        assert!(index.offset_of(TextLocation::new(4, 1)).is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_text() -> impl Strategy<Value = String> {
            (
                prop::collection::vec(prop_oneof![Just('a'), Just('b'), Just('\r'), Just('\n')], 0..12),
                prop_oneof![Just(""), Just("\n"), Just("\r"), Just("\r\n")],
            )
                .prop_map(|(chars, tail)| chars.into_iter().chain(tail.chars()).collect())
        }

        proptest! {
            #[test]
            fn prop_matches_naive_split(
                initial in arb_text(),
                edits in prop::collection::vec((0..64usize, 0..6usize, arb_text()), 1..30)
            ) {
                let mut text = initial;
                let mut index = LineIndex::from_text(&text);
                for (offset, remove, insert) in edits {
                    let len = text.chars().count();
                    let offset = offset % (len + 1);
                    let remove = remove.min(len - offset);
                    edit(&mut text, &mut index, offset, remove, &insert);
                    prop_assert_eq!(shape(&index), naive_lines(&text));
                }
                let len = text.chars().count();
                for offset in 0..=len {
                    let line = index.line_at(offset).unwrap();
                    prop_assert!(line.offset <= offset);
                    prop_assert!(offset < line.offset + line.total_length() || offset == len);
                }
            }
        }
    }
}
