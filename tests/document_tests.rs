// Integration tests - documents with anchors, segments and read-only sections

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::checked_document;
use common::tracing::init_tracing_from_env;
use fresh_document::{
    AnchorMovement, AnchorSegment, ChangeBatch, Document, DocumentError, FullyReadOnly,
    NoReadOnlySections, TextLocation, TextRange,
};

fn record_batches(document: &mut Document) -> Rc<RefCell<Vec<ChangeBatch>>> {
    let batches = Rc::new(RefCell::new(Vec::new()));
    let sink = batches.clone();
    document.add_listener(move |batch| sink.borrow_mut().push(batch.clone()));
    batches
}

#[test]
fn test_joining_lines_before_trailing_newline() {
    let mut doc = checked_document("x\ny\n");
    doc.remove(1, 1).unwrap();
    assert_eq!(doc.text(), "xy\n");
    assert_eq!(doc.line_count(), 2);
    assert!(doc.line(3).is_err());
    assert_eq!(doc.line_at(3).unwrap().number, 2);
}

#[test]
fn test_line_queries_follow_edits() {
    init_tracing_from_env();
    let mut doc = checked_document("first\r\nsecond\rthird\n");
    assert_eq!(doc.line_count(), 4);
    assert_eq!(doc.line(1).unwrap().delimiter_length, 2);
    assert_eq!(doc.line(2).unwrap().delimiter_length, 1);
    assert_eq!(doc.line_text(3).unwrap(), "third");
    assert_eq!(doc.line(4).unwrap().length, 0);

    // Joining "\r" and "\n" turns two terminators into one.
    doc.remove(7, 6).unwrap();
    assert_eq!(doc.text(), "first\r\n\rthird\n");
    doc.insert(8, "\n").unwrap();
    assert_eq!(doc.text(), "first\r\n\r\nthird\n");
    assert_eq!(doc.line_count(), 4);
    assert_eq!(doc.line(2).unwrap().delimiter_length, 2);

    assert_eq!(doc.line_at(0).unwrap().number, 1);
    assert_eq!(doc.line_at(doc.len()).unwrap().number, 4);
    assert!(matches!(
        doc.line(5),
        Err(DocumentError::LineOutOfRange {
            line: 5,
            line_count: 4
        })
    ));
}

#[test]
fn test_locations_round_trip() {
    let doc = checked_document("ab\ncdé\n\nf");
    for offset in 0..=doc.len() {
        let location = doc.location(offset).unwrap();
        assert_eq!(doc.offset_of(location).unwrap(), offset);
    }
    assert_eq!(doc.location(5).unwrap(), TextLocation::new(2, 3));
    assert_eq!(doc.offset_of(TextLocation::new(2, 99)).unwrap(), 6);
}

#[test]
fn test_replace_then_slice_returns_inserted_text() {
    let mut doc = checked_document("the quick brown fox");
    doc.replace(4, 5, "slow\nred").unwrap();
    assert_eq!(doc.slice(4, 8).unwrap(), "slow\nred");
    assert_eq!(doc.line_count(), 2);
}

#[test]
fn test_positional_errors_are_recoverable() {
    let mut doc = checked_document("abc");
    assert!(matches!(
        doc.insert(4, "x"),
        Err(DocumentError::OutOfRange {
            offset: 4,
            length: 0,
            document_length: 3
        })
    ));
    assert!(doc.create_anchor(9).is_err());
    assert!(doc.char_at(3).is_err());
    doc.insert(3, "d").unwrap();
    assert_eq!(doc.text(), "abcd");
}

#[test]
fn test_anchor_movement_at_insertion_point() {
    let mut doc = checked_document("hello world");
    let before = doc
        .create_anchor_with(5, AnchorMovement::BeforeInsertion, false)
        .unwrap();
    let after = doc
        .create_anchor_with(5, AnchorMovement::AfterInsertion, false)
        .unwrap();
    doc.insert(5, ",").unwrap();
    assert_eq!(doc.anchor_offset(&before).unwrap(), 5);
    assert_eq!(doc.anchor_offset(&after).unwrap(), 6);

    doc.set_anchor_movement(&before, AnchorMovement::AfterInsertion)
        .unwrap();
    doc.insert(5, "!").unwrap();
    assert_eq!(doc.anchor_offset(&before).unwrap(), 6);
    assert_eq!(doc.anchor_offset(&after).unwrap(), 7);
}

#[test]
fn test_anchor_survive_deletion_collapses() {
    let mut doc = checked_document("0123456789");
    let plain = doc.create_anchor(4).unwrap();
    let sticky = doc
        .create_anchor_with(6, AnchorMovement::AfterInsertion, true)
        .unwrap();
    let edge = doc.create_anchor(8).unwrap();

    doc.replace(2, 6, "ab").unwrap();
    assert_eq!(doc.anchor_offset(&plain), Err(DocumentError::AnchorDeleted));
    assert_eq!(doc.anchor_offset(&sticky).unwrap(), 4);
    assert_eq!(doc.anchor_offset(&edge).unwrap(), 4);
    assert!(doc.anchor_survives_deletion(&sticky).unwrap());
}

#[test]
fn test_anchor_segment_does_not_grow_at_boundaries() {
    let mut doc = checked_document("let value = 1;");
    let segment = AnchorSegment::create(&mut doc, 4, 5).unwrap();
    doc.insert(4, "_").unwrap();
    doc.insert(10, "_").unwrap();
    assert_eq!(doc.text(), "let _value_ = 1;");
    assert_eq!(segment.range(&doc).unwrap(), TextRange::new(5, 5));
    doc.insert(7, "xx").unwrap();
    assert_eq!(segment.length(&doc).unwrap(), 7);
}

#[test]
fn test_released_and_dropped_anchors() {
    let mut doc = checked_document("abcdef");
    let anchor = doc.create_anchor(3).unwrap();
    let copy = anchor.clone();
    assert_eq!(copy, anchor);
    doc.release_anchor(anchor).unwrap();
    assert_eq!(doc.anchor_offset(&copy), Err(DocumentError::ForeignHandle));

    for offset in 0..4 {
        drop(doc.create_anchor(offset).unwrap());
    }
    assert_eq!(doc.anchor_count(), 4);
    assert_eq!(doc.purge_anchors(), 4);
    assert_eq!(doc.anchor_count(), 0);
}

#[test]
fn test_handles_are_bound_to_their_document() {
    let mut first = checked_document("abc");
    let mut second = checked_document("abc");
    let anchor = first.create_anchor(1).unwrap();
    assert_eq!(anchor.document_id(), first.id());
    assert_ne!(first.id(), second.id());
    assert_eq!(
        second.anchor_offset(&anchor),
        Err(DocumentError::ForeignHandle)
    );

    let handle = first.create_segment_collection::<u32>();
    assert!(matches!(
        second.segments(&handle),
        Err(DocumentError::ForeignHandle)
    ));
    assert!(second.add_segment(&handle, 0, 1, 7).is_err());
}

#[test]
fn test_segment_collections_track_edits() {
    let mut doc = checked_document("one two three four");
    let bookmarks = doc.create_segment_collection::<&'static str>();
    let two = doc.add_segment(&bookmarks, 4, 3, "two").unwrap();
    let three = doc.add_segment(&bookmarks, 8, 5, "three").unwrap();
    let folds = doc.create_segment_collection::<usize>();
    doc.add_segment(&folds, 0, 18, 0).unwrap();

    doc.insert(0, ">> ").unwrap();
    doc.remove(10, 4).unwrap();

    let segments = doc.segments(&bookmarks).unwrap();
    assert_eq!(segments.range(two), Some(TextRange::new(7, 3)));
    assert_eq!(segments.range(three), Some(TextRange::new(10, 2)));
    let found: Vec<_> = segments
        .find_overlapping(TextRange::new(9, 2))
        .iter()
        .map(|s| *s.value)
        .collect();
    assert_eq!(found, vec!["two", "three"]);

    let fold = doc.segments(&folds).unwrap().first().unwrap();
    assert_eq!(fold.range(), TextRange::new(3, 14));
    assert_eq!(doc.text(), ">> one twoee four");
}

#[test]
fn test_checked_edits_against_read_only_sections() {
    init_tracing_from_env();
    let mut doc = checked_document("header\nbody\nfooter");
    let protected = doc.create_segment_collection::<()>();
    doc.add_segment(&protected, 0, 7, ()).unwrap();
    doc.add_segment(&protected, 12, 6, ()).unwrap();
    doc.set_read_only_sections(Some(&protected)).unwrap();

    assert!(doc.can_insert(7).unwrap());
    assert!(!doc.can_insert(3).unwrap());
    assert_eq!(
        doc.deletable_segments(TextRange::new(5, 10)).unwrap(),
        vec![TextRange::new(7, 5)]
    );

    assert_eq!(
        doc.replace_checked(6, 2, ""),
        Err(DocumentError::InvalidEditWhileReadOnly {
            offset: 6,
            length: 2
        })
    );
    doc.replace_checked(7, 4, "main").unwrap();
    assert_eq!(doc.text(), "header\nmain\nfooter");

    // The same edit passes once the sections are cleared.
    doc.set_read_only_sections::<()>(None).unwrap();
    doc.replace_checked(0, 6, "HEAD").unwrap();
    assert_eq!(doc.text(), "HEAD\nmain\nfooter");

    assert!(doc
        .replace_checked_with(0, 1, "", &FullyReadOnly)
        .is_err());
    doc.replace_checked_with(0, 1, "h", &NoReadOnlySections)
        .unwrap();
    assert_eq!(doc.text(), "hEAD\nmain\nfooter");
}

#[test]
fn test_read_only_queries_reject_out_of_range() {
    let mut doc = checked_document("abc");
    assert!(matches!(
        doc.deletable_segments(TextRange::new(10, 5)),
        Err(DocumentError::OutOfRange { offset: 10, .. })
    ));
    assert!(doc.can_insert(99).is_err());
    assert!(doc.can_insert(3).unwrap());

    let protected = doc.create_segment_collection::<()>();
    doc.add_segment(&protected, 0, 2, ()).unwrap();
    doc.set_read_only_sections(Some(&protected)).unwrap();
    assert!(doc
        .deletable_segments(TextRange::new(usize::MAX, 2))
        .is_err());
    assert!(doc
        .replace_clipped(TextRange::new(usize::MAX, 2), "")
        .is_err());
}

#[test]
fn test_paste_over_read_only_is_clipped() {
    let mut doc = checked_document("aaaa[lock]bbbb");
    let protected = doc.create_segment_collection::<()>();
    doc.add_segment(&protected, 4, 6, ()).unwrap();
    doc.set_read_only_sections(Some(&protected)).unwrap();
    let batches = record_batches(&mut doc);

    let pieces = doc.replace_clipped(TextRange::new(1, 12), "XY").unwrap();
    assert_eq!(pieces, vec![TextRange::new(1, 3), TextRange::new(10, 3)]);
    assert_eq!(doc.text(), "a[lock]XYb");
    assert_eq!(batches.borrow().len(), 1);
    assert_eq!(
        doc.segments(&protected).unwrap().first().unwrap().range(),
        TextRange::new(1, 6)
    );

    assert!(matches!(
        doc.replace_clipped(TextRange::new(2, 3), "z"),
        Err(DocumentError::InvalidEditWhileReadOnly { .. })
    ));
    assert_eq!(batches.borrow().len(), 1);
}

#[test]
fn test_removing_read_only_collection_unprotects() {
    let mut doc = checked_document("locked");
    let protected = doc.create_segment_collection::<()>();
    doc.add_segment(&protected, 0, 6, ()).unwrap();
    doc.set_read_only_sections(Some(&protected)).unwrap();
    assert!(doc.replace_checked(1, 1, "").is_err());

    let collection = doc.remove_segment_collection(protected).unwrap();
    assert_eq!(collection.len(), 1);
    doc.replace_checked(1, 1, "").unwrap();
    assert_eq!(doc.text(), "lcked");
}

#[test]
fn test_update_scope_batches_changes() {
    let mut doc = checked_document("a");
    let batches = record_batches(&mut doc);
    {
        let mut scope = doc.begin_update();
        scope.insert(1, "\nb").unwrap();
        scope.insert(3, "\nc").unwrap();
        assert!(scope.is_in_update());
        assert_eq!(
            scope.snapshot().unwrap_err(),
            DocumentError::UpdateInProgress
        );
    }
    doc.insert(0, ">").unwrap();

    let batches = batches.borrow();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].changes.len(), 2);
    assert_eq!(batches[0].old_line_count, 1);
    assert_eq!(batches[0].new_line_count, 3);
    assert_eq!((batches[0].old_version, batches[0].new_version), (0, 2));
    assert_eq!(batches[1].changes[0].inserted_text, ">");
}

fn edit_then_fail(doc: &mut Document) -> Result<(), DocumentError> {
    let mut scope = doc.begin_update();
    scope.insert(0, "x")?;
    scope.insert(100, "y")?;
    scope.insert(0, "z")?;
    Ok(())
}

#[test]
fn test_error_exit_still_notifies() {
    let mut doc = checked_document("abc");
    let batches = record_batches(&mut doc);
    assert!(edit_then_fail(&mut doc).is_err());
    assert!(!doc.is_in_update());
    assert_eq!(doc.text(), "xabc");
    assert_eq!(batches.borrow().len(), 1);
    assert_eq!(batches.borrow()[0].changes.len(), 1);
}

#[test]
fn test_changes_can_be_undone_from_batches() {
    let mut doc = checked_document("hello world");
    let batches = record_batches(&mut doc);
    {
        let mut scope = doc.begin_update();
        scope.replace(0, 5, "goodbye").unwrap();
        scope.remove(7, 6).unwrap();
    }
    assert_eq!(doc.text(), "goodbye");

    let undo: Vec<_> = batches.borrow()[0]
        .changes
        .iter()
        .rev()
        .map(|change| change.inverse())
        .collect();
    for change in undo {
        doc.replace(change.offset, change.removal_length, &change.inserted_text)
            .unwrap();
    }
    assert_eq!(doc.text(), "hello world");
}

#[test]
fn test_snapshot_is_independent_of_later_edits() {
    let mut doc = checked_document("abc");
    let snapshot = doc.snapshot().unwrap();
    doc.insert(3, "def").unwrap();
    assert_eq!(snapshot.text(), "abc");
    assert_eq!(snapshot.version(), 0);

    let handle = std::thread::spawn(move || snapshot.len());
    assert_eq!(handle.join().unwrap(), 3);
    assert_eq!(doc.snapshot().unwrap().version(), 1);
}
