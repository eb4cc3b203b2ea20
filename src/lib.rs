//! Text document engine: a rope-backed buffer with an incrementally
//! maintained line index, position anchors that follow edits, segment
//! collections with interval queries, read-only sections and highlight
//! merging.

pub mod config;
pub mod error;
pub mod model;
pub mod primitives;

pub use config::{ConfigError, DocumentConfig};
pub use error::{DocumentError, Result};
pub use model::anchor::{AnchorMovement, AnchorSegment, TextAnchor};
pub use model::document::{
    ChangeBatch, Document, DocumentId, ListenerId, SegmentCollectionHandle, UpdateScope,
};
pub use model::edit::{DocumentChange, OffsetChange, TextRange};
pub use model::line_index::{Line, TextLocation};
pub use model::segment_tree::{Segment, SegmentCollection, SegmentId};
pub use model::snapshot::TextSnapshot;
pub use primitives::highlight_merge::{
    ColorSet, HighlightMerger, HighlightedLine, HighlightedSection,
};
pub use primitives::read_only::{FullyReadOnly, NoReadOnlySections, ReadOnlySectionProvider};
