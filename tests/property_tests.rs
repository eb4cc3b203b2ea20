// Property tests - documents against a plain string model

mod common;

use common::checked_document;
use fresh_document::{AnchorMovement, Document, OffsetChange, TextRange};
use proptest::prelude::*;

fn arb_text() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(
            prop_oneof![Just('a'), Just('é'), Just(' '), Just('\r'), Just('\n')],
            0..10,
        ),
        prop_oneof![Just(""), Just("\n"), Just("\r"), Just("\r\n")],
    )
        .prop_map(|(chars, tail)| chars.into_iter().chain(tail.chars()).collect())
}

fn arb_edits() -> impl Strategy<Value = Vec<(usize, usize, String)>> {
    prop::collection::vec((0..64usize, 0..8usize, arb_text()), 1..25)
}

/// Replaces chars `[offset, offset + length)` of `text`.
fn model_replace(text: &mut String, offset: usize, length: usize, insert: &str) {
    let mut chars: Vec<char> = text.chars().collect();
    chars.splice(offset..offset + length, insert.chars());
    *text = chars.into_iter().collect();
}

fn clamp_edit(doc: &Document, offset: usize, length: usize) -> (usize, usize) {
    let offset = offset % (doc.len() + 1);
    (offset, length.min(doc.len() - offset))
}

proptest! {
    #[test]
    fn prop_document_matches_string(initial in arb_text(), edits in arb_edits()) {
        let mut doc = checked_document(&initial);
        let mut model = initial;
        for (offset, length, insert) in edits {
            let (offset, length) = clamp_edit(&doc, offset, length);
            doc.replace(offset, length, &insert).unwrap();
            model_replace(&mut model, offset, length, &insert);
            prop_assert_eq!(doc.text(), model.clone());
            prop_assert_eq!(doc.slice(offset, insert.chars().count()).unwrap(), insert);
        }
    }

    #[test]
    fn prop_line_at_contains_offset(initial in arb_text(), edits in arb_edits()) {
        let mut doc = checked_document(&initial);
        for (offset, length, insert) in edits {
            let (offset, length) = clamp_edit(&doc, offset, length);
            doc.replace(offset, length, &insert).unwrap();
        }
        let lines: Vec<_> = doc.lines().collect();
        prop_assert_eq!(lines.len(), doc.line_count());
        for offset in 0..=doc.len() {
            let line = doc.line_at(offset).unwrap();
            prop_assert!(line.offset <= offset);
            prop_assert!(
                offset < line.offset + line.total_length()
                    || (offset == doc.len() && line.number == doc.line_count())
            );
            prop_assert_eq!(lines[line.number - 1], line);
        }
    }

    #[test]
    fn prop_anchor_shifts_by_edits_before_it(
        text in "[a-z]{20,40}",
        at in 0..20usize,
        edits in arb_edits()
    ) {
        let mut doc = checked_document(&text);
        let anchor = doc.create_anchor_with(at, AnchorMovement::AfterInsertion, false).unwrap();
        for (offset, length, insert) in edits {
            let position = doc.anchor_offset(&anchor).unwrap();
            let (offset, length) = clamp_edit(&doc, offset, length);
            let inserted = insert.chars().count();
            doc.replace(offset, length, &insert).unwrap();
            let change = OffsetChange::new(offset, length, inserted);
            if change.is_removed(position) {
                prop_assert!(doc.is_anchor_deleted(&anchor).unwrap());
                return Ok(());
            }
            let expected = if offset > position {
                position
            } else if offset + length < position {
                position + inserted - length
            } else {
                change.new_offset(position, AnchorMovement::AfterInsertion)
            };
            prop_assert_eq!(doc.anchor_offset(&anchor).unwrap(), expected);
        }
    }

    #[test]
    fn prop_segments_match_brute_force(
        text in "[a-z]{40,60}",
        ranges in prop::collection::vec((0..30usize, 0..10usize), 1..12),
        edits in arb_edits(),
        query in (0..60usize, 0..20usize)
    ) {
        let mut doc = checked_document(&text);
        let handle = doc.create_segment_collection::<usize>();
        for (k, (start, length)) in ranges.iter().enumerate() {
            doc.add_segment(&handle, *start, *length, k).unwrap();
        }
        for (offset, length, insert) in edits {
            let (offset, length) = clamp_edit(&doc, offset, length);
            doc.replace(offset, length, &insert).unwrap();
        }
        let segments = doc.segments(&handle).unwrap();
        let query = TextRange::new(query.0, query.1);
        let mut expected: Vec<usize> = segments
            .iter()
            .filter(|s| s.start < query.end() && s.end() > query.offset)
            .map(|s| *s.value)
            .collect();
        let mut found: Vec<usize> = segments
            .find_overlapping(query)
            .iter()
            .map(|s| *s.value)
            .collect();
        expected.sort_unstable();
        found.sort_unstable();
        prop_assert_eq!(found, expected);
        for segment in segments.iter() {
            prop_assert!(segment.end() <= doc.len());
        }
    }
}
