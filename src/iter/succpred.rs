// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Succ/Pred: the position immediately after or before a match of the wrapped
//! iterator. Grounded in `original_source`'s `IteratorSucc`
//! (`postingIteratorSucc.hpp`) and `IteratorPred` (`postingIteratorPred.hpp`):
//! both delegate `skipDoc` entirely to the origin and only adjust `skipPos`.

use super::{build_featureid, Position, PostingIterator};
use crate::error::Result;
use crate::keys::{GlobalCounter, Index};

/// One past every position the wrapped iterator matches.
pub struct SuccIterator<'a> {
    origin: Box<dyn PostingIterator + 'a>,
    featureid: String,
}

impl<'a> SuccIterator<'a> {
    /// Wraps `origin` as its successor iterator.
    #[must_use]
    pub fn new(origin: Box<dyn PostingIterator + 'a>) -> Self {
        let featureid = build_featureid([origin.featureid()], 0, '>');
        Self { origin, featureid }
    }
}

impl<'a> PostingIterator for SuccIterator<'a> {
    fn skip_doc(&mut self, docno: Index) -> Result<Index> {
        self.origin.skip_doc(docno)
    }

    fn skip_pos(&mut self, pos: Position) -> Result<Position> {
        let hit = self.origin.skip_pos(pos)?;
        Ok(if hit == 0 { 0 } else { hit.saturating_add(1) })
    }

    fn docno(&self) -> Index {
        self.origin.docno()
    }

    fn posno(&self) -> Position {
        self.origin.posno()
    }

    fn frequency(&self) -> usize {
        self.origin.frequency()
    }

    fn document_frequency(&self) -> Result<GlobalCounter> {
        self.origin.document_frequency()
    }

    fn featureid(&self) -> &str {
        &self.featureid
    }
}

/// One before every position the wrapped iterator matches.
pub struct PredIterator<'a> {
    origin: Box<dyn PostingIterator + 'a>,
    featureid: String,
}

impl<'a> PredIterator<'a> {
    /// Wraps `origin` as its predecessor iterator.
    #[must_use]
    pub fn new(origin: Box<dyn PostingIterator + 'a>) -> Self {
        let featureid = build_featureid([origin.featureid()], 0, '<');
        Self { origin, featureid }
    }
}

impl<'a> PostingIterator for PredIterator<'a> {
    fn skip_doc(&mut self, docno: Index) -> Result<Index> {
        self.origin.skip_doc(docno)
    }

    fn skip_pos(&mut self, pos: Position) -> Result<Position> {
        let Some(next) = pos.checked_add(1) else {
            return Ok(0);
        };
        let hit = self.origin.skip_pos(next)?;
        Ok(if hit == 0 { 0 } else { hit - 1 })
    }

    fn docno(&self) -> Index {
        self.origin.docno()
    }

    fn posno(&self) -> Position {
        self.origin.posno()
    }

    fn frequency(&self) -> usize {
        self.origin.frequency()
    }

    fn document_frequency(&self) -> Result<GlobalCounter> {
        self.origin.document_frequency()
    }

    fn featureid(&self) -> &str {
        &self.featureid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::posting::{PosinfoBlock, PostingRecord};
    use crate::config::StorageConfig;
    use crate::iter::term::TermIterator;
    use crate::kv::memory::MemoryKv;
    use crate::kv::KvStore;
    use crate::store::block_cursor;
    use crate::store::handle::StorageHandle;
    use crate::store::keyspace::posinfo_prefix;

    fn handle_with_term() -> StorageHandle<MemoryKv> {
        let kv = MemoryKv::new();
        let mut batch = kv.batch();
        let block = PosinfoBlock::from_records(vec![PostingRecord { docno: 3, positions: vec![5, 9] }]).unwrap();
        block_cursor::store(&mut batch, &posinfo_prefix(1, 1), &block).unwrap();
        batch.commit().unwrap();
        StorageHandle::open(kv, StorageConfig::new()).unwrap()
    }

    #[test]
    fn succ_reports_one_past_the_match() {
        let handle = handle_with_term();
        let origin: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 1));
        let mut succ = SuccIterator::new(origin);
        assert_eq!(succ.skip_doc(1).unwrap(), 3);
        assert_eq!(succ.skip_pos(1).unwrap(), 6);
        assert_eq!(succ.skip_pos(7).unwrap(), 10);
    }

    #[test]
    fn pred_reports_one_before_the_match() {
        let handle = handle_with_term();
        let origin: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 1));
        let mut pred = PredIterator::new(origin);
        assert_eq!(pred.skip_doc(1).unwrap(), 3);
        assert_eq!(pred.skip_pos(1).unwrap(), 4);
        assert_eq!(pred.skip_pos(5).unwrap(), 8);
    }
}
