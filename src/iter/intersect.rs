// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Intersect: the conjunction of every argument. Grounded in
//! `original_source`'s `getFirstAllMatchDocno` helper (`postingIteratorHelpers.cpp`),
//! shared there by intersect, contains and the structural joins: repeatedly probe
//! every argument at the current candidate and re-seek the whole set to the
//! highest answer seen until all arguments agree.

use super::{build_featureid, Position, PostingIterator};
use crate::error::Result;
use crate::keys::{GlobalCounter, Index};

/// Advances every iterator in `args` to the first docno `>= start` on which they
/// all agree, or `0` if no such docno exists.
pub(crate) fn first_all_match_docno(args: &mut [Box<dyn PostingIterator + '_>], start: Index) -> Result<Index> {
    let mut candidate = start;
    loop {
        let Some((first, rest)) = args.split_first_mut() else {
            return Ok(0);
        };
        let mut target = first.skip_doc(candidate)?;
        if target == 0 {
            return Ok(0);
        }
        let mut agreed = true;
        for arg in rest {
            let hit = arg.skip_doc(target)?;
            if hit == 0 {
                return Ok(0);
            }
            if hit != target {
                agreed = false;
                target = hit;
                break;
            }
        }
        if agreed {
            return Ok(target);
        }
        candidate = target;
    }
}

/// First doc present in every argument; `skipPos` is the first position shared by
/// all of them at that doc.
pub struct IntersectIterator<'a> {
    args: Vec<Box<dyn PostingIterator + 'a>>,
    docno: Index,
    posno: Position,
    featureid: String,
}

impl<'a> IntersectIterator<'a> {
    /// Builds an intersection of `args`. The caller is expected to supply at
    /// least one argument; an empty set behaves as permanently empty.
    #[must_use]
    pub fn new(args: Vec<Box<dyn PostingIterator + 'a>>) -> Self {
        let featureid = build_featureid(args.iter().map(|a| a.featureid()), 0, 'I');
        Self { args, docno: 0, posno: 0, featureid }
    }
}

impl<'a> PostingIterator for IntersectIterator<'a> {
    fn skip_doc(&mut self, docno: Index) -> Result<Index> {
        if self.docno == docno && self.docno != 0 {
            return Ok(self.docno);
        }
        self.docno = first_all_match_docno(&mut self.args, docno)?;
        self.posno = 0;
        Ok(self.docno)
    }

    fn skip_pos(&mut self, pos: Position) -> Result<Position> {
        if self.docno == 0 || self.args.is_empty() {
            return Ok(0);
        }
        let mut target = pos;
        'outer: loop {
            let mut max_pos = 0;
            for arg in &mut self.args {
                let hit = arg.skip_pos(target)?;
                if hit == 0 {
                    self.posno = 0;
                    return Ok(0);
                }
                if hit != target {
                    target = hit;
                    continue 'outer;
                }
                max_pos = max_pos.max(hit);
            }
            self.posno = max_pos;
            return Ok(max_pos);
        }
    }

    fn docno(&self) -> Index {
        self.docno
    }

    fn posno(&self) -> Position {
        self.posno
    }

    fn frequency(&self) -> usize {
        self.args.iter().map(|a| a.frequency()).min().unwrap_or(0)
    }

    fn document_frequency(&self) -> Result<GlobalCounter> {
        let mut min = None;
        for arg in &self.args {
            let df = arg.document_frequency()?;
            min = Some(min.map_or(df, |m: GlobalCounter| m.min(df)));
        }
        Ok(min.unwrap_or(0))
    }

    fn featureid(&self) -> &str {
        &self.featureid
    }
}
