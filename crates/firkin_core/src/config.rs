//! Store configuration.

use crate::error::{StoreError, StoreResult};

/// When appended bytes are forced to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Fsync after every append. Durable up to the last acknowledged write.
    EveryWrite,
    /// Fsync only when a segment seals (rotation, compaction, close). A
    /// crash may lose writes buffered by the OS since the last seal.
    OnRotation,
}

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the store already exists.
    pub error_if_exists: bool,

    /// Maximum size of the active segment before rotation.
    pub max_segment_size: u64,

    /// Durability policy for appends.
    pub flush_policy: FlushPolicy,

    /// Maximum number of pooled read handles (minimum 2).
    pub descriptor_pool_size: usize,

    /// Sealed-segment count at which `needs_compaction` reports true.
    pub compaction_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            max_segment_size: 64 * 1024 * 1024, // 64 MB
            flush_policy: FlushPolicy::EveryWrite,
            descriptor_pool_size: 64,
            compaction_threshold: 4,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if the store exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets the maximum active-segment size before rotation.
    #[must_use]
    pub const fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets the durability policy for appends.
    #[must_use]
    pub const fn flush_policy(mut self, policy: FlushPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    /// Sets the read-handle pool capacity.
    #[must_use]
    pub const fn descriptor_pool_size(mut self, size: usize) -> Self {
        self.descriptor_pool_size = size;
        self
    }

    /// Sets the sealed-segment count that triggers `needs_compaction`.
    #[must_use]
    pub const fn compaction_threshold(mut self, count: usize) -> Self {
        self.compaction_threshold = count;
        self
    }

    /// Checks the configuration for values the engine cannot honor.
    pub(crate) fn validate(&self) -> StoreResult<()> {
        if self.max_segment_size == 0 {
            return Err(StoreError::invalid_config("max_segment_size must be > 0"));
        }
        // One slot for the pinned active segment, one for everything else.
        if self.descriptor_pool_size < 2 {
            return Err(StoreError::invalid_config(
                "descriptor_pool_size must be at least 2",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(!config.error_if_exists);
        assert_eq!(config.flush_policy, FlushPolicy::EveryWrite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .create_if_missing(false)
            .flush_policy(FlushPolicy::OnRotation)
            .max_segment_size(1024)
            .compaction_threshold(2);

        assert!(!config.create_if_missing);
        assert_eq!(config.flush_policy, FlushPolicy::OnRotation);
        assert_eq!(config.max_segment_size, 1024);
        assert_eq!(config.compaction_threshold, 2);
    }

    #[test]
    fn validation_rejects_tiny_pool() {
        let config = Config::new().descriptor_pool_size(1);
        assert!(matches!(
            config.validate(),
            Err(StoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn validation_rejects_zero_segment_size() {
        let config = Config::new().max_segment_size(0);
        assert!(config.validate().is_err());
    }
}
