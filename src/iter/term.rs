// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The term iterator: cursors a `(typeno, termno)`'s `PosinfoBlock` family with
//! the adaptive seeking strategy from `original_source`'s `posinfoIterator.cpp` —
//! a near-hit probe within the block already loaded, a follow-block probe for
//! targets just past it, and a random seek otherwise. Block-read counters mirror
//! that source's `Statistics::PosinfoBlockReadBlock*` tallies.

use super::{Position, PostingIterator};
use crate::block::posting::PosinfoBlock;
use crate::block::Block;
use crate::error::Result;
use crate::keys::{GlobalCounter, Index};
use crate::kv::KvStore;
use crate::store::block_cursor;
use crate::store::handle::StorageHandle;
use crate::store::keyspace::posinfo_prefix;

/// Block-read counters accumulated across a term iterator's lifetime, broken down
/// by which seek strategy produced the read (diagnostics and tests).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeekCounters {
    /// Answer found within the block already loaded.
    pub same_block: u64,
    /// Answer found by probing the immediately following block.
    pub follow_block: u64,
    /// Follow-block probe ran out of blocks.
    pub follow_block_miss: u64,
    /// Answer found by an unguided (random) seek.
    pub random_seek: u64,
    /// Random seek found no block at or after the target.
    pub random_seek_miss: u64,
}

/// Iterates the postings of one `(typeno, termno)` pair.
pub struct TermIterator<'h, S: KvStore> {
    handle: &'h StorageHandle<S>,
    typeno: Index,
    termno: Index,
    prefix: Vec<u8>,
    featureid: String,
    block: Option<PosinfoBlock>,
    docno_start: Index,
    docno_end: Index,
    docno: Index,
    positions: Vec<Position>,
    posno: Position,
    counters: SeekCounters,
}

impl<'h, S: KvStore> TermIterator<'h, S> {
    /// Creates a term iterator over `typeno`/`termno`, positioned before the first
    /// document.
    #[must_use]
    pub fn new(handle: &'h StorageHandle<S>, typeno: Index, termno: Index) -> Self {
        Self {
            handle,
            typeno,
            termno,
            prefix: posinfo_prefix(typeno, termno),
            featureid: format!("{typeno}.{termno}"),
            block: None,
            docno_start: 0,
            docno_end: 0,
            docno: 0,
            positions: Vec::new(),
            posno: 0,
            counters: SeekCounters::default(),
        }
    }

    /// Seek-strategy counters accumulated so far.
    #[must_use]
    pub fn counters(&self) -> SeekCounters {
        self.counters
    }

    fn clear(&mut self) -> Index {
        self.block = None;
        self.docno_start = 0;
        self.docno_end = 0;
        self.positions.clear();
        self.posno = 0;
        self.docno = 0;
        0
    }

    fn adopt(&mut self, block: PosinfoBlock) {
        self.docno_start = block.records().first().map(|r| r.docno).unwrap_or(0);
        self.docno_end = block.id();
        self.block = Some(block);
    }

    fn settle(&mut self, target: Index) -> Index {
        match self.block.as_ref().and_then(|b| b.record_at_or_after(target)) {
            Some(rec) => {
                self.docno = rec.docno;
                self.positions = rec.positions.clone();
                self.posno = 0;
                self.docno
            }
            None => self.clear(),
        }
    }

    fn random_seek(&mut self, target: Index) -> Result<Index> {
        match block_cursor::seek_ge(self.handle.kv(), &self.prefix, target, PosinfoBlock::decode)? {
            Some(block) => {
                self.adopt(block);
                self.counters.random_seek += 1;
                Ok(self.settle(target))
            }
            None => {
                self.counters.random_seek_miss += 1;
                Ok(self.clear())
            }
        }
    }

    /// Follows the block chain forward, mirroring `posinfoIterator.cpp`'s
    /// `loadNext`/`isFollowBlockAddress` loop: as long as each probed block still
    /// looks like it could plausibly hold `target`, keep following; otherwise fall
    /// back to a random seek.
    fn follow_block(&mut self, target: Index) -> Result<Index> {
        loop {
            let next_id = self.docno_end.saturating_add(1);
            match block_cursor::seek_ge(self.handle.kv(), &self.prefix, next_id, PosinfoBlock::decode)? {
                Some(block) => {
                    self.counters.follow_block += 1;
                    let id = block.id();
                    let plausible = id >= target || block.is_follow_block_candidate(target);
                    self.adopt(block);
                    if id >= target {
                        return Ok(self.settle(target));
                    }
                    if !plausible {
                        return self.random_seek(target);
                    }
                }
                None => {
                    self.counters.follow_block_miss += 1;
                    return Ok(self.clear());
                }
            }
        }
    }
}

impl<'h, S: KvStore> PostingIterator for TermIterator<'h, S> {
    fn skip_doc(&mut self, target: Index) -> Result<Index> {
        if self.docno != 0 && self.docno == target {
            return Ok(self.docno);
        }
        if self.block.is_none() {
            return self.random_seek(target);
        }
        if self.docno_start <= target && self.docno_end >= target {
            self.counters.same_block += 1;
            return Ok(self.settle(target));
        }
        if target > self.docno_end && self.docno_end + (self.docno_end - self.docno_start) > target {
            return self.follow_block(target);
        }
        self.random_seek(target)
    }

    fn skip_pos(&mut self, pos: Position) -> Result<Position> {
        if self.docno == 0 {
            return Ok(0);
        }
        match self.positions.iter().find(|&&p| p >= pos) {
            Some(&p) => {
                self.posno = p;
                Ok(p)
            }
            None => {
                self.posno = 0;
                Ok(0)
            }
        }
    }

    fn docno(&self) -> Index {
        self.docno
    }

    fn posno(&self) -> Position {
        self.posno
    }

    fn frequency(&self) -> usize {
        self.positions.len()
    }

    fn document_frequency(&self) -> Result<GlobalCounter> {
        self.handle.document_frequency(self.typeno, self.termno)
    }

    fn featureid(&self) -> &str {
        &self.featureid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::posting::PostingRecord;
    use crate::config::StorageConfig;
    use crate::kv::memory::MemoryKv;
    use crate::store::keyspace::doc_frequency_key;

    fn seeded_handle() -> StorageHandle<MemoryKv> {
        let kv = MemoryKv::new();
        let mut batch = kv.batch();
        let mut docno = 0;
        for group in 0..5u32 {
            let records: Vec<_> = (1..=7u32)
                .map(|i| {
                    docno = group * 7 + i;
                    PostingRecord { docno, positions: vec![1, docno as u16 % 50 + 2] }
                })
                .collect();
            let block = PosinfoBlock::from_records(records).unwrap();
            block_cursor::store(&mut batch, &posinfo_prefix(1, 10), &block).unwrap();
        }
        batch.put(&doc_frequency_key(1, 10), &crate::keys::pack_counter(35));
        batch.commit().unwrap();
        StorageHandle::open(kv, StorageConfig::new()).unwrap()
    }

    #[test]
    fn skip_doc_finds_exact_and_missing_documents() {
        let handle = seeded_handle();
        let mut iter = TermIterator::new(&handle, 1, 10);
        assert_eq!(iter.skip_doc(1).unwrap(), 1);
        assert_eq!(iter.skip_doc(20).unwrap(), 20);
        assert_eq!(iter.skip_doc(36).unwrap(), 0);
    }

    #[test]
    fn repeated_skip_doc_same_target_is_a_cache_hit() {
        let handle = seeded_handle();
        let mut iter = TermIterator::new(&handle, 1, 10);
        assert_eq!(iter.skip_doc(5).unwrap(), 5);
        assert_eq!(iter.skip_doc(5).unwrap(), 5);
        assert_eq!(iter.counters().same_block + iter.counters().random_seek, 1);
    }

    #[test]
    fn skip_pos_and_frequency_reflect_current_document() {
        let handle = seeded_handle();
        let mut iter = TermIterator::new(&handle, 1, 10);
        iter.skip_doc(3).unwrap();
        assert_eq!(iter.frequency(), 2);
        assert_eq!(iter.skip_pos(2).unwrap(), iter.posno());
        assert!(iter.posno() >= 2);
    }

    #[test]
    fn document_frequency_reads_through_the_shared_cache() {
        let handle = seeded_handle();
        let iter = TermIterator::new(&handle, 1, 10);
        assert_eq!(iter.document_frequency().unwrap(), 35);
    }

    #[test]
    fn unknown_term_has_no_postings() {
        let handle = seeded_handle();
        let mut iter = TermIterator::new(&handle, 1, 999);
        assert_eq!(iter.skip_doc(1).unwrap(), 0);
        assert_eq!(iter.document_frequency().unwrap(), 0);
    }
}
