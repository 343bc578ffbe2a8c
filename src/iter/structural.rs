// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Structural joins: `sequence_struct`, `within_struct`/`within` and
//! `inrange_struct`/`inrange`. Grounded directly in `original_source`'s
//! `IteratorStructSequence` (`postingIteratorStructSequence.cpp`) and
//! `IteratorStructWithin` (`postingIteratorStructWithin.cpp`): both track an
//! optional `cut` feature that, if present inside the matched window, forces the
//! search to continue past it rather than accept the match.

use super::{build_featureid, Position, PostingIterator};
use crate::error::Result;
use crate::keys::{GlobalCounter, Index};

fn cut_blocks_window(cut: &mut Option<Box<dyn PostingIterator + '_>>, docno_cut: Index, docno: Index, from: Position, to: Position) -> Result<bool> {
    let Some(cut) = cut else { return Ok(false) };
    if docno_cut != docno {
        return Ok(false);
    }
    let pos = cut.skip_pos(from)?;
    Ok(pos != 0 && pos <= to)
}

fn document_frequency_min(args: &[Box<dyn PostingIterator + '_>]) -> Result<GlobalCounter> {
    let mut min = None;
    for arg in args {
        let df = arg.document_frequency()?;
        min = Some(min.map_or(df, |m: GlobalCounter| m.min(df)));
    }
    Ok(min.unwrap_or(0))
}

/// All arguments occur, in order, at strictly ascending positions within a window
/// of `|range|` positions, with no `cut` element inside that window.
pub struct SequenceStruct<'a> {
    args: Vec<Box<dyn PostingIterator + 'a>>,
    cut: Option<Box<dyn PostingIterator + 'a>>,
    range: i64,
    docno: Index,
    docno_cut: Index,
    posno: Position,
    length: usize,
    featureid: String,
}

impl<'a> SequenceStruct<'a> {
    /// Builds a sequence join: `args` must occur, in the given order, within a
    /// window of `range` positions (`range == 0` means unbounded), with no `cut`
    /// occurrence in between.
    #[must_use]
    pub fn new(args: Vec<Box<dyn PostingIterator + 'a>>, cut: Option<Box<dyn PostingIterator + 'a>>, range: i64) -> Self {
        let parts: Vec<&str> = args.iter().map(|a| a.featureid()).chain(cut.iter().map(|c| c.featureid())).collect();
        let featureid = build_featureid(parts, range, 'S');
        Self { args, cut, range, docno: 0, docno_cut: 0, posno: 0, length: 0, featureid }
    }
}

impl<'a> PostingIterator for SequenceStruct<'a> {
    fn skip_doc(&mut self, docno: Index) -> Result<Index> {
        if self.docno == docno && self.docno != 0 {
            return Ok(self.docno);
        }
        self.docno = super::intersect::first_all_match_docno(&mut self.args, docno)?;
        self.docno_cut = match (&mut self.cut, self.docno) {
            (Some(cut), d) if d != 0 => {
                if cut.skip_doc(d)? == d {
                    d
                } else {
                    0
                }
            }
            _ => 0,
        };
        self.posno = 0;
        Ok(self.docno)
    }

    fn skip_pos(&mut self, pos: Position) -> Result<Position> {
        if self.args.is_empty() || self.docno == 0 {
            return Ok(0);
        }
        let rangenum = self.range.unsigned_abs() as i64;
        let mut pos_iter = pos;
        loop {
            let Some((first, rest)) = self.args.split_first_mut() else {
                self.posno = 0;
                return Ok(0);
            };
            let min_pos = first.skip_pos(pos_iter)?;
            if min_pos == 0 {
                self.posno = 0;
                return Ok(0);
            }
            let mut max_pos = min_pos;
            let mut broke_early = false;
            for arg in rest {
                let next = arg.skip_pos(max_pos + 1)?;
                if next == 0 {
                    self.posno = 0;
                    return Ok(0);
                }
                max_pos = next;
                if i64::from(max_pos - min_pos) > rangenum {
                    pos_iter = (i64::from(max_pos) - rangenum).max(0) as Position;
                    broke_early = true;
                    break;
                }
            }
            if broke_early {
                continue;
            }
            if cut_blocks_window(&mut self.cut, self.docno_cut, self.docno, min_pos, max_pos)? {
                pos_iter = self.cut.as_mut().unwrap().posno() + 1;
                continue;
            }
            self.length = (max_pos - min_pos) as usize + 1;
            self.posno = if self.range >= 0 { min_pos } else { max_pos };
            return Ok(self.posno);
        }
    }

    fn docno(&self) -> Index {
        self.docno
    }

    fn posno(&self) -> Position {
        self.posno
    }

    fn length(&self) -> usize {
        self.length.max(1)
    }

    fn frequency(&self) -> usize {
        self.args.iter().map(|a| a.frequency()).min().unwrap_or(0)
    }

    fn document_frequency(&self) -> Result<GlobalCounter> {
        document_frequency_min(&self.args)
    }

    fn featureid(&self) -> &str {
        &self.featureid
    }
}

/// `within_struct`/`within`/`inrange_struct`/`inrange`: all arguments occur within
/// a window of `|range|` positions in any order. `strict` requires distinct
/// positions per argument (`within*`); `inrange*` allows duplicates. An optional
/// `cut` (present for the `*_struct` variants) forces the search past any window
/// it falls inside.
pub struct WithinStruct<'a> {
    args: Vec<Box<dyn PostingIterator + 'a>>,
    cut: Option<Box<dyn PostingIterator + 'a>>,
    range: i64,
    strict: bool,
    docno: Index,
    docno_cut: Index,
    posno: Position,
    length: usize,
    featureid: String,
}

impl<'a> WithinStruct<'a> {
    /// Builds a within/inrange join. `strict` selects `within` semantics (distinct
    /// positions) over `inrange` (duplicates allowed).
    #[must_use]
    pub fn new(args: Vec<Box<dyn PostingIterator + 'a>>, cut: Option<Box<dyn PostingIterator + 'a>>, range: i64, strict: bool) -> Self {
        let op = if strict { 'W' } else { 'N' };
        let parts: Vec<&str> = args.iter().map(|a| a.featureid()).chain(cut.iter().map(|c| c.featureid())).collect();
        let featureid = build_featureid(parts, range, op);
        Self { args, cut, range, strict, docno: 0, docno_cut: 0, posno: 0, length: 0, featureid }
    }

    fn skip_pos_positive(&mut self, start: Position) -> Result<Position> {
        let rangenum = self.range;
        let mut pos_iter = start;
        'outer: loop {
            let Some((first, rest)) = self.args.split_first_mut() else {
                return Ok(0);
            };
            let mut min_pos = first.skip_pos(pos_iter)?;
            if min_pos == 0 {
                return Ok(0);
            }
            let mut max_pos = min_pos;
            let mut taken = vec![min_pos];
            for arg in rest {
                let mut next = arg.skip_pos(pos_iter)?;
                loop {
                    if next == 0 {
                        return Ok(0);
                    }
                    if self.strict && taken.contains(&next) {
                        next = arg.skip_pos(next + 1)?;
                        continue;
                    }
                    break;
                }
                taken.push(next);
                min_pos = min_pos.min(next);
                max_pos = max_pos.max(next);
                if i64::from(max_pos - min_pos) > rangenum {
                    pos_iter = (i64::from(max_pos) - rangenum).max(0) as Position;
                    continue 'outer;
                }
            }
            if cut_blocks_window(&mut self.cut, self.docno_cut, self.docno, min_pos, max_pos)? {
                pos_iter = self.cut.as_mut().unwrap().posno() + 1;
                continue;
            }
            self.length = (max_pos - min_pos) as usize + 1;
            return Ok(min_pos);
        }
    }

    fn skip_pos_negative(&mut self, start: Position) -> Result<Position> {
        let rangenum = self.range.unsigned_abs() as i64;
        let mut pos_iter = (i64::from(start) - rangenum).max(1) as Position;
        'outer: loop {
            let Some((first, rest)) = self.args.split_first_mut() else {
                return Ok(0);
            };
            let mut min_pos = first.skip_pos(pos_iter)?;
            if min_pos == 0 {
                return Ok(0);
            }
            let mut max_pos = min_pos;
            let mut taken = vec![min_pos];
            for arg in rest {
                let mut next = arg.skip_pos(pos_iter)?;
                loop {
                    if next == 0 {
                        return Ok(0);
                    }
                    if self.strict && taken.contains(&next) {
                        next = arg.skip_pos(next + 1)?;
                        continue;
                    }
                    break;
                }
                taken.push(next);
                min_pos = min_pos.min(next);
                max_pos = max_pos.max(next);
                if i64::from(max_pos - min_pos) > rangenum {
                    pos_iter = (i64::from(max_pos) + rangenum + 1).min(i64::from(Position::MAX)) as Position;
                    continue 'outer;
                }
            }
            if max_pos < start {
                pos_iter = min_pos + 1;
                continue;
            }
            if cut_blocks_window(&mut self.cut, self.docno_cut, self.docno, min_pos, max_pos)? {
                pos_iter = self.cut.as_mut().unwrap().posno() + 1;
                continue;
            }
            self.length = (max_pos - min_pos) as usize + 1;
            return Ok(max_pos);
        }
    }
}

impl<'a> PostingIterator for WithinStruct<'a> {
    fn skip_doc(&mut self, docno: Index) -> Result<Index> {
        if self.docno == docno && self.docno != 0 {
            return Ok(self.docno);
        }
        self.docno = super::intersect::first_all_match_docno(&mut self.args, docno)?;
        self.docno_cut = match (&mut self.cut, self.docno) {
            (Some(cut), d) if d != 0 => {
                if cut.skip_doc(d)? == d {
                    d
                } else {
                    0
                }
            }
            _ => 0,
        };
        self.posno = 0;
        Ok(self.docno)
    }

    fn skip_pos(&mut self, pos: Position) -> Result<Position> {
        if self.args.is_empty() || self.docno == 0 {
            return Ok(0);
        }
        let result = if self.range >= 0 { self.skip_pos_positive(pos)? } else { self.skip_pos_negative(pos)? };
        self.posno = result;
        Ok(result)
    }

    fn docno(&self) -> Index {
        self.docno
    }

    fn posno(&self) -> Position {
        self.posno
    }

    fn length(&self) -> usize {
        self.length.max(1)
    }

    fn frequency(&self) -> usize {
        self.args.iter().map(|a| a.frequency()).min().unwrap_or(0)
    }

    fn document_frequency(&self) -> Result<GlobalCounter> {
        document_frequency_min(&self.args)
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

    fn handle_with(entries: &[(Index, Index, &[(u32, &[u16])])]) -> StorageHandle<MemoryKv> {
        let kv = MemoryKv::new();
        let mut batch = kv.batch();
        for (typeno, termno, records) in entries {
            let block = PosinfoBlock::from_records(
                records.iter().map(|(d, p)| PostingRecord { docno: *d, positions: p.to_vec() }).collect(),
            )
            .unwrap();
            block_cursor::store(&mut batch, &posinfo_prefix(*typeno, *termno), &block).unwrap();
        }
        batch.commit().unwrap();
        StorageHandle::open(kv, StorageConfig::new()).unwrap()
    }

    #[test]
    fn sequence_matches_ascending_adjacent_positions() {
        let handle = handle_with(&[(1, 1, &[(5, &[1, 10])]), (1, 2, &[(5, &[2, 20])])]);
        let a: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 1));
        let b: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 2));
        let mut seq = SequenceStruct::new(vec![a, b], None, 3);
        assert_eq!(seq.skip_doc(1).unwrap(), 5);
        assert_eq!(seq.skip_pos(1).unwrap(), 1);
        assert_eq!(seq.length(), 2);
    }

    #[test]
    fn sequence_rejects_window_too_wide() {
        let handle = handle_with(&[(1, 1, &[(5, &[1])]), (1, 2, &[(5, &[20])])]);
        let a: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 1));
        let b: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 2));
        let mut seq = SequenceStruct::new(vec![a, b], None, 3);
        assert_eq!(seq.skip_doc(1).unwrap(), 5);
        assert_eq!(seq.skip_pos(1).unwrap(), 0);
    }

    #[test]
    fn within_matches_any_order_inside_window() {
        let handle = handle_with(&[(1, 1, &[(5, &[10])]), (1, 2, &[(5, &[8])])]);
        let a: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 1));
        let b: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 2));
        let mut within = WithinStruct::new(vec![a, b], None, 3, true);
        assert_eq!(within.skip_doc(1).unwrap(), 5);
        assert_eq!(within.skip_pos(1).unwrap(), 8);
    }

    #[test]
    fn cut_forces_search_past_blocked_window() {
        let handle = handle_with(&[
            (1, 1, &[(5, &[1])]),
            (1, 2, &[(5, &[2])]),
            (1, 3, &[(5, &[1, 2, 3])]),
        ]);
        let a: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 1));
        let b: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 2));
        let cut: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 3));
        let mut seq = SequenceStruct::new(vec![a, b], Some(cut), 1);
        assert_eq!(seq.skip_doc(1).unwrap(), 5);
        assert_eq!(seq.skip_pos(1).unwrap(), 0);
    }

    #[test]
    fn inrange_allows_duplicate_positions() {
        let handle = handle_with(&[(1, 1, &[(5, &[3])]), (1, 2, &[(5, &[3])])]);
        let a: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 1));
        let b: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, 1, 2));
        let mut inrange = WithinStruct::new(vec![a, b], None, 2, false);
        assert_eq!(inrange.skip_doc(1).unwrap(), 5);
        assert_eq!(inrange.skip_pos(1).unwrap(), 3);
    }
}
