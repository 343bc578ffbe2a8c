// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Difference(pos, neg): positions of `pos` that have no overlap in `neg` at the
//! same position. Grounded in `original_source`'s `IteratorDifference`
//! (`iteratorDifference.hpp`): `skipDoc` delegates entirely to the positive
//! argument, and `neg` is only consulted when the positive argument is on a
//! document `neg` might also cover.

use super::{build_featureid, Position, PostingIterator};
use crate::error::Result;
use crate::keys::{GlobalCounter, Index};

/// `pos.skipDoc`, filtered at `skipPos` time by positions `neg` also occupies.
pub struct DifferenceIterator<'a> {
    positive: Box<dyn PostingIterator + 'a>,
    negative: Box<dyn PostingIterator + 'a>,
    docno: Index,
    docno_neg: Index,
    posno: Position,
    featureid: String,
}

impl<'a> DifferenceIterator<'a> {
    /// Builds `positive` minus `negative`.
    #[must_use]
    pub fn new(positive: Box<dyn PostingIterator + 'a>, negative: Box<dyn PostingIterator + 'a>) -> Self {
        let featureid = build_featureid([positive.featureid(), negative.featureid()], 0, '-');
        Self { positive, negative, docno: 0, docno_neg: 0, posno: 0, featureid }
    }
}

impl<'a> PostingIterator for DifferenceIterator<'a> {
    fn skip_doc(&mut self, docno: Index) -> Result<Index> {
        if self.docno == docno && docno != 0 {
            return Ok(self.docno);
        }
        self.docno = self.positive.skip_doc(docno)?;
        self.posno = 0;
        self.docno_neg = if self.docno != 0 { self.negative.skip_doc(self.docno)? } else { 0 };
        Ok(self.docno)
    }

    fn skip_pos(&mut self, pos: Position) -> Result<Position> {
        if self.docno == 0 {
            return Ok(0);
        }
        let mut target = pos;
        loop {
            let hit = self.positive.skip_pos(target)?;
            if hit == 0 {
                self.posno = 0;
                return Ok(0);
            }
            let blocked = self.docno_neg == self.docno && self.negative.skip_pos(hit)? == hit;
            if !blocked {
                self.posno = hit;
                return Ok(hit);
            }
            if hit == Position::MAX {
                self.posno = 0;
                return Ok(0);
            }
            target = hit + 1;
        }
    }

    fn docno(&self) -> Index {
        self.docno
    }

    fn posno(&self) -> Position {
        self.posno
    }

    fn frequency(&self) -> usize {
        self.positive.frequency()
    }

    fn document_frequency(&self) -> Result<GlobalCounter> {
        self.positive.document_frequency()
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

    fn handle_with_terms() -> StorageHandle<MemoryKv> {
        let kv = MemoryKv::new();
        let mut batch = kv.batch();
        let mk = |entries: &[(u32, &[u16])]| {
            PosinfoBlock::from_records(entries.iter().map(|(d, p)| PostingRecord { docno: *d, positions: p.to_vec() }).collect()).unwrap()
        };
        block_cursor::store(&mut batch, &posinfo_prefix(1, 1), &mk(&[(2, &[1, 5]), (4, &[2])])).unwrap();
        block_cursor::store(&mut batch, &posinfo_prefix(1, 2), &mk(&[(2, &[5])])).unwrap();
        batch.commit().unwrap();
        StorageHandle::open(kv, StorageConfig::new()).unwrap()
    }

    #[test]
    fn excludes_positions_present_in_negative_argument() {
        let handle = handle_with_terms();
        let pos: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 1));
        let neg: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 2));
        let mut iter = DifferenceIterator::new(pos, neg);
        assert_eq!(iter.skip_doc(1).unwrap(), 2);
        assert_eq!(iter.skip_pos(1).unwrap(), 1);
        assert_eq!(iter.skip_doc(3).unwrap(), 4);
        assert_eq!(iter.skip_pos(1).unwrap(), 2);
    }

    #[test]
    fn follows_positive_docs_even_when_negative_is_absent() {
        let handle = handle_with_terms();
        let pos: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 1));
        let neg: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 999));
        let mut iter = DifferenceIterator::new(pos, neg);
        assert_eq!(iter.skip_doc(1).unwrap(), 2);
        assert_eq!(iter.skip_pos(1).unwrap(), 1);
    }
}
