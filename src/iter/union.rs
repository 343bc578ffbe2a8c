// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Union: the disjunction of every argument. Grounded in `original_source`'s
//! `IteratorUnion` (`postingIteratorUnion.cpp`) — track which arguments landed on
//! the current docno ("selected") and restrict `skipPos` to just those.

use super::{build_featureid, Position, PostingIterator};
use crate::error::Result;
use crate::keys::{GlobalCounter, Index};

/// First doc in any argument; `skipPos` is the minimum `skipPos` over the
/// arguments that matched the current doc.
pub struct UnionIterator<'a> {
    args: Vec<Box<dyn PostingIterator + 'a>>,
    selected: Vec<usize>,
    docno: Index,
    posno: Position,
    featureid: String,
}

impl<'a> UnionIterator<'a> {
    /// Builds a union of `args`.
    #[must_use]
    pub fn new(args: Vec<Box<dyn PostingIterator + 'a>>) -> Self {
        let featureid = build_featureid(args.iter().map(|a| a.featureid()), 0, 'U');
        Self { args, selected: Vec::new(), docno: 0, posno: 0, featureid }
    }
}

impl<'a> PostingIterator for UnionIterator<'a> {
    fn skip_doc(&mut self, docno: Index) -> Result<Index> {
        if self.docno == docno && docno != 0 {
            return Ok(self.docno);
        }
        self.selected.clear();
        let mut minimum = 0;
        for (idx, arg) in self.args.iter_mut().enumerate() {
            let hit = arg.skip_doc(docno)?;
            if hit == 0 {
                continue;
            }
            match minimum {
                0 => {
                    minimum = hit;
                    self.selected = vec![idx];
                }
                m if hit < m => {
                    minimum = hit;
                    self.selected = vec![idx];
                }
                m if hit == m => self.selected.push(idx),
                _ => {}
            }
        }
        self.docno = minimum;
        self.posno = 0;
        Ok(minimum)
    }

    fn skip_pos(&mut self, pos: Position) -> Result<Position> {
        if self.docno == 0 {
            return Ok(0);
        }
        let mut best = 0;
        for &idx in &self.selected {
            let hit = self.args[idx].skip_pos(pos)?;
            if hit != 0 && (best == 0 || hit < best) {
                best = hit;
            }
        }
        self.posno = best;
        Ok(best)
    }

    fn docno(&self) -> Index {
        self.docno
    }

    fn posno(&self) -> Position {
        self.posno
    }

    fn frequency(&self) -> usize {
        self.selected.iter().map(|&idx| self.args[idx].frequency()).sum()
    }

    fn document_frequency(&self) -> Result<GlobalCounter> {
        let mut max = 0;
        for arg in &self.args {
            max = max.max(arg.document_frequency()?);
        }
        Ok(max)
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
        block_cursor::store(&mut batch, &posinfo_prefix(1, 1), &mk(&[(2, &[3]), (9, &[1])])).unwrap();
        block_cursor::store(&mut batch, &posinfo_prefix(1, 2), &mk(&[(2, &[1]), (5, &[4])])).unwrap();
        batch.commit().unwrap();
        StorageHandle::open(kv, StorageConfig::new()).unwrap()
    }

    #[test]
    fn finds_lowest_doc_across_arguments_and_takes_min_pos() {
        let handle = handle_with_terms();
        let a: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 1));
        let b: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 2));
        let mut iter = UnionIterator::new(vec![a, b]);
        assert_eq!(iter.skip_doc(1).unwrap(), 2);
        assert_eq!(iter.skip_pos(1).unwrap(), 1);
        assert_eq!(iter.skip_doc(3).unwrap(), 5);
        assert_eq!(iter.skip_doc(6).unwrap(), 9);
        assert_eq!(iter.skip_doc(10).unwrap(), 0);
    }

    #[test]
    fn document_frequency_is_the_maximum() {
        let handle = handle_with_terms();
        let a: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 1));
        let b: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 2));
        let iter = UnionIterator::new(vec![a, b]);
        assert_eq!(iter.document_frequency().unwrap(), 0);
    }
}
