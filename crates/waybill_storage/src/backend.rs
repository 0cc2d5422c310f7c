//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte log holding the local store's journal.
///
/// # Invariants
///
/// - `append` returns the offset of the first written byte
/// - bytes at an offset never change until `truncate` or `rewrite`
/// - after `sync` returns, every appended byte survives process termination
/// - `rewrite` either installs the new contents completely or leaves the
///   old contents untouched
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not
    /// fully inside the backend, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Reads the whole log.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        self.read_at(0, size as usize)
    }

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Makes every appended byte durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be forced to stable storage.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes (the offset of the next append).
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Cuts the log back to `new_size` bytes.
    ///
    /// Used to drop a torn frame left behind by a crash mid-append.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::InvalidTruncate`] if `new_size` is
    /// larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the entire contents with `contents`.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement could not be made durable. On
    /// error the previous contents are still in place.
    fn rewrite(&mut self, contents: &[u8]) -> StorageResult<()>;
}
