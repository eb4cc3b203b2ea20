//! Core data model for documents
//!
//! The text lives in a rope; lines, anchors and segments are kept in
//! offset-indexed trees that are updated incrementally on every edit.

pub mod anchor;
pub(crate) mod anchor_tree;
pub(crate) mod arena_tree;
pub mod buffer;
pub mod document;
pub mod edit;
pub mod line_index;
pub mod segment_tree;
pub mod snapshot;
