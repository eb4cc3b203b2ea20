//! Error types returned by the document engine.

use thiserror::Error;

/// Errors returned by positional and structural document operations.
///
/// All of these are recoverable: the document is left unchanged when one is
/// returned. Tree corruption is not represented here because it is a bug, and
/// is reported by panicking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// An offset or length reaches outside `[0, document_length]`.
    #[error("range {offset}+{length} is outside the document (length {document_length})")]
    OutOfRange {
        offset: usize,
        length: usize,
        document_length: usize,
    },

    /// A line number outside `1..=line_count`.
    #[error("line {line} does not exist (document has {line_count} lines)")]
    LineOutOfRange { line: usize, line_count: usize },

    /// The edit touches a read-only section.
    #[error("edit at {offset}+{length} touches a read-only section")]
    InvalidEditWhileReadOnly { offset: usize, length: usize },

    /// The anchor's text was removed and it was not allowed to survive.
    #[error("anchor was deleted")]
    AnchorDeleted,

    /// The handle belongs to another document, or was released.
    #[error("handle does not belong to this document")]
    ForeignHandle,

    /// Two highlighted lines cover different lengths, or spans do not form a partition.
    #[error("highlight layers do not line up (base length {base}, additional length {additional})")]
    InconsistentMerge { base: usize, additional: usize },

    /// A snapshot was requested while an update scope is open.
    #[error("document is inside an update scope")]
    UpdateInProgress,
}

impl DocumentError {
    pub(crate) fn out_of_range(offset: usize, length: usize, document_length: usize) -> Self {
        Self::OutOfRange {
            offset,
            length,
            document_length,
        }
    }
}

pub type Result<T, E = DocumentError> = std::result::Result<T, E>;
