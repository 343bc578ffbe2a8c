// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Document-frequency reads: a thin layer over [`crate::cache::DocumentFrequencyCache`],
//! the in-memory mirror of the `DocFrequency` key family, that falls back to the
//! key family itself on a cache miss.

use crate::cache::DocumentFrequencyCache;
use crate::error::Result;
use crate::keys::{unpack_counter, GlobalCounter, Index};
use crate::kv::{KvBatch, KvStore};
use crate::store::keyspace::doc_frequency_key;

/// Reads `df(typeno, termno)`, consulting `cache` first and falling back to the
/// backing store on a miss. Cache-fills the value read from the store.
pub fn get<S: KvStore>(kv: &S, cache: &DocumentFrequencyCache, typeno: Index, termno: Index) -> Result<GlobalCounter> {
    if let Some(v) = cache.get(typeno, termno) {
        return Ok(v);
    }
    let df = match kv.get(&doc_frequency_key(typeno, termno))? {
        Some(bytes) => unpack_counter(&bytes)?,
        None => 0,
    };
    cache.insert(typeno, termno, df);
    Ok(df)
}

/// Stages an absolute df write (used by the commit pipeline after computing a
/// term's new document frequency from its merged `DocListBlock`s).
pub fn set<B: KvBatch>(batch: &mut B, typeno: Index, termno: Index, df: GlobalCounter) {
    batch.put(&doc_frequency_key(typeno, termno), &crate::keys::pack_counter(df));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;

    #[test]
    fn reads_default_zero_and_caches_after_store_read() {
        let kv = MemoryKv::new();
        let cache = DocumentFrequencyCache::with_capacity(8);
        assert_eq!(get(&kv, &cache, 1, 2).unwrap(), 0);
        assert_eq!(cache.get(1, 2), Some(0));
    }

    #[test]
    fn set_then_get_round_trips_through_store_when_cache_invalidated() {
        let kv = MemoryKv::new();
        let cache = DocumentFrequencyCache::with_capacity(8);
        let mut batch = kv.batch();
        set(&mut batch, 1, 2, 9);
        batch.commit().unwrap();
        cache.invalidate(1, 2);
        assert_eq!(get(&kv, &cache, 1, 2).unwrap(), 9);
    }
}
