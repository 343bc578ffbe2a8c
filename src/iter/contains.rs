// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Contains: like intersect at the document level, but carries no positional
//! match — `skipPos` always reports `0`. Grounded in `original_source`'s
//! `IteratorContains` (`postingIteratorContains.cpp`), which reuses the same
//! all-arguments-agree loop as intersect and never implements `skipPos` at all.

use super::intersect::first_all_match_docno;
use super::{build_featureid, Position, PostingIterator};
use crate::error::Result;
use crate::keys::{GlobalCounter, Index};

/// First doc present in every argument; has no positional match.
pub struct ContainsIterator<'a> {
    args: Vec<Box<dyn PostingIterator + 'a>>,
    docno: Index,
    featureid: String,
}

impl<'a> ContainsIterator<'a> {
    /// Builds a `contains` join over `args`.
    #[must_use]
    pub fn new(args: Vec<Box<dyn PostingIterator + 'a>>) -> Self {
        let featureid = build_featureid(args.iter().map(|a| a.featureid()), 0, 'A');
        Self { args, docno: 0, featureid }
    }
}

impl<'a> PostingIterator for ContainsIterator<'a> {
    fn skip_doc(&mut self, docno: Index) -> Result<Index> {
        if self.docno == docno && self.docno != 0 {
            return Ok(self.docno);
        }
        self.docno = first_all_match_docno(&mut self.args, docno)?;
        Ok(self.docno)
    }

    fn skip_pos(&mut self, _pos: Position) -> Result<Position> {
        Ok(0)
    }

    fn docno(&self) -> Index {
        self.docno
    }

    fn posno(&self) -> Position {
        0
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
