// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Thin [`quick_cache`] wrappers for the two hot lookup structures that benefit from
//! caching: decoded [`crate::block::metadata::MetaDataBlock`]s and per-term document
//! frequencies.

use quick_cache::sync::{Cache as QuickCache, DefaultLifecycle};
use quick_cache::Weighter;
use std::sync::Arc;

use crate::block::metadata::MetaDataBlock;
use crate::keys::Index;

#[derive(Clone, Copy)]
struct UnitWeighter;

impl<K, V> Weighter<K, V> for UnitWeighter {
    fn weight(&self, _key: &K, _val: &V) -> u64 {
        1
    }
}

fn build<K: std::hash::Hash + Eq + Clone, V: Clone>(
    capacity: u64,
) -> QuickCache<K, V, UnitWeighter, rustc_hash::FxBuildHasher> {
    // Keys here are small integer ids, so an FxHash-style hasher beats SipHash.
    #[allow(clippy::expect_used)]
    let opts = quick_cache::OptionsBuilder::new()
        .weight_capacity(capacity)
        .estimated_items_capacity(capacity as usize)
        .build()
        .expect("cache options should be valid");

    QuickCache::with_options(opts, UnitWeighter, rustc_hash::FxBuildHasher, DefaultLifecycle::default())
}

/// Caches decoded [`MetaDataBlock`]s by block id, avoiding a re-decode of the same
/// 1024-row block on every metadata read in a hot restriction evaluation loop.
pub struct MetaDataBlockCache {
    inner: QuickCache<Index, Arc<MetaDataBlock>, UnitWeighter, rustc_hash::FxBuildHasher>,
}

impl MetaDataBlockCache {
    /// Creates a cache holding up to `capacity` decoded blocks.
    #[must_use]
    pub fn with_capacity(capacity: u64) -> Self {
        Self { inner: build(capacity) }
    }

    /// Looks up a cached block by id.
    #[must_use]
    pub fn get(&self, block_id: Index) -> Option<Arc<MetaDataBlock>> {
        self.inner.get(&block_id)
    }

    /// Inserts a decoded block, keyed by its id.
    pub fn insert(&self, block_id: Index, block: Arc<MetaDataBlock>) {
        self.inner.insert(block_id, block);
    }

    /// Drops a cached entry, e.g. after the block has been rewritten.
    pub fn invalidate(&self, block_id: Index) {
        self.inner.remove(&block_id);
    }
}

/// Caches a term's document frequency (df) — the count of documents containing it —
/// keyed by `(typeno, termno)`. Recomputing df requires a full scan of the term's
/// `DocListBlock`s, so this is checked before falling back to that scan.
pub struct DocumentFrequencyCache {
    inner: QuickCache<(Index, Index), u64, UnitWeighter, rustc_hash::FxBuildHasher>,
}

impl DocumentFrequencyCache {
    /// Creates a cache holding up to `capacity` `(typeno, termno) -> df` entries.
    #[must_use]
    pub fn with_capacity(capacity: u64) -> Self {
        Self { inner: build(capacity) }
    }

    /// Looks up a cached document frequency.
    #[must_use]
    pub fn get(&self, typeno: Index, termno: Index) -> Option<u64> {
        self.inner.get(&(typeno, termno))
    }

    /// Inserts a document frequency.
    pub fn insert(&self, typeno: Index, termno: Index, df: u64) {
        self.inner.insert((typeno, termno), df);
    }

    /// Drops a cached entry, e.g. after a posting has been inserted or deleted.
    pub fn invalidate(&self, typeno: Index, termno: Index) {
        self.inner.remove(&(typeno, termno));
    }
}
