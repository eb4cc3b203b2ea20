//! Primitives layered on top of the document model
//!
//! Read-only section providers and highlight merging.

pub mod highlight_merge;
pub mod read_only;
