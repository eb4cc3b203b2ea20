// Shared helpers for integration tests

pub mod tracing;

use fresh_document::{Document, DocumentConfig};

/// Document that checks every tree invariant after each edit.
pub fn checked_document(text: &str) -> Document {
    Document::from_text_with_config(
        text,
        DocumentConfig {
            verify_invariants: true,
            ..DocumentConfig::default()
        },
    )
}
