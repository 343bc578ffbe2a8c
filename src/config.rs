// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Storage configuration builder.

/// Storage configuration builder.
///
/// Mirrors the fields a deployment would traditionally pass via a config file:
/// the metadata row capacity per block, whether ACL filtering is active, and the
/// capacities of the in-process caches.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Soft ceiling on an encoded block's payload size, in bytes.
    pub max_block_size: usize,

    /// Number of consecutive docnos held by one metadata block.
    pub metadata_block_size: u32,

    /// Whether access-control-list filtering is enabled for this storage instance.
    ///
    /// Disabling it when no document ever carries an ACL saves a per-document
    /// `UserAclBlock`/`AclBlock` lookup on every query.
    pub acl_enabled: bool,

    /// Maximum length, in bytes, of a dictionary key that may be cached in-process
    /// (longer keys still round-trip correctly, just always go to the `KvStore`).
    pub max_cached_key_len: usize,

    /// Capacity, in entries, of the [`crate::cache::MetaDataBlockCache`].
    pub metadata_cache_capacity: u64,

    /// Capacity, in entries, of the [`crate::cache::DocumentFrequencyCache`].
    pub df_cache_capacity: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_block_size: crate::block::MAX_BLOCK_SIZE,
            metadata_block_size: crate::block::metadata::BLOCK_SIZE,
            acl_enabled: false,
            max_cached_key_len: 256,
            metadata_cache_capacity: 10_000,
            df_cache_capacity: 100_000,
        }
    }
}

impl StorageConfig {
    /// Initializes a new config with the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the soft ceiling on an encoded block's payload size.
    ///
    /// Defaults to 1024 bytes.
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0.
    #[must_use]
    pub fn max_block_size(mut self, size: usize) -> Self {
        assert!(size > 0, "max_block_size must be non-zero");
        self.max_block_size = size;
        self
    }

    /// Enables or disables access-control-list filtering.
    ///
    /// Defaults to disabled.
    #[must_use]
    pub fn acl_enabled(mut self, enabled: bool) -> Self {
        self.acl_enabled = enabled;
        self
    }

    /// Sets the maximum dictionary key length eligible for in-process caching.
    ///
    /// Defaults to 256 bytes.
    #[must_use]
    pub fn max_cached_key_len(mut self, len: usize) -> Self {
        self.max_cached_key_len = len;
        self
    }

    /// Sets the capacity of the metadata block cache.
    ///
    /// Defaults to 10,000 blocks.
    #[must_use]
    pub fn metadata_cache_capacity(mut self, capacity: u64) -> Self {
        self.metadata_cache_capacity = capacity;
        self
    }

    /// Sets the capacity of the document frequency cache.
    ///
    /// Defaults to 100,000 entries.
    #[must_use]
    pub fn df_cache_capacity(mut self, capacity: u64) -> Self {
        self.df_cache_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = StorageConfig::new().acl_enabled(true).max_block_size(2048);
        assert!(config.acl_enabled);
        assert_eq!(config.max_block_size, 2048);
        assert_eq!(config.metadata_cache_capacity, 10_000);
    }

    #[test]
    #[should_panic(expected = "max_block_size must be non-zero")]
    fn rejects_zero_block_size() {
        let _ = StorageConfig::new().max_block_size(0);
    }
}
