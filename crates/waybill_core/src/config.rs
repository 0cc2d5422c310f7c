//! Store configuration.

/// Configuration for a [`crate::LocalStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Sync the journal before a commit becomes visible.
    ///
    /// Turning this off trades durability of the last few commits for
    /// speed; only tests should do that.
    pub sync_on_commit: bool,
    /// Rewrite the journal as a single snapshot frame after this many
    /// committed frames. `None` disables automatic compaction.
    pub compact_after_frames: Option<u64>,
}

impl StoreConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sync_on_commit: true,
            compact_after_frames: Some(1_000),
        }
    }

    /// Sets whether commits are synced.
    #[must_use]
    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Sets the automatic compaction threshold.
    #[must_use]
    pub fn with_compact_after_frames(mut self, frames: Option<u64>) -> Self {
        self.compact_after_frames = frames;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_durable() {
        let config = StoreConfig::default();
        assert!(config.sync_on_commit);
        assert_eq!(config.compact_after_frames, Some(1_000));
    }

    #[test]
    fn builder_overrides() {
        let config = StoreConfig::new()
            .with_sync_on_commit(false)
            .with_compact_after_frames(None);
        assert!(!config.sync_on_commit);
        assert!(config.compact_after_frames.is_none());
    }
}
