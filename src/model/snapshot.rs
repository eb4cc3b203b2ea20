use ropey::Rope;

use crate::error::{DocumentError, Result};

/// Immutable copy of the document text at one version.
///
/// Cloning is cheap (the rope shares its chunks), and snapshots can be sent
/// to other threads, e.g. for background highlighting.
#[derive(Debug, Clone)]
pub struct TextSnapshot {
    rope: Rope,
    version: u64,
}

impl TextSnapshot {
    pub(crate) fn new(rope: Rope, version: u64) -> Self {
        Self { rope, version }
    }

    /// Document version the snapshot was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.rope.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn slice(&self, offset: usize, length: usize) -> Result<String> {
        match offset.checked_add(length) {
            Some(end) if end <= self.len() => Ok(self.rope.slice(offset..end).to_string()),
            _ => Err(DocumentError::out_of_range(offset, length, self.len())),
        }
    }

    pub fn char_at(&self, offset: usize) -> Result<char> {
        self.rope
            .get_char(offset)
            .ok_or(DocumentError::out_of_range(offset, 1, self.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_snapshot_is_send_and_sync() {
        assert_send_sync::<TextSnapshot>();
    }

    #[test]
    fn test_snapshot_reads() {
        let snapshot = TextSnapshot::new(Rope::from_str("héllo"), 3);
        assert_eq!(snapshot.version(), 3);
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot.slice(1, 3).unwrap(), "éll");
        assert_eq!(snapshot.char_at(4).unwrap(), 'o');
        assert!(snapshot.char_at(5).is_err());
        assert!(snapshot.slice(4, 2).is_err());
    }
}
