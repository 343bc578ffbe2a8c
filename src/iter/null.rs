// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The null posting iterator: always empty. `iter::factory` returns this instead
//! of failing when a query names a type or term the dictionary has never seen.

use super::{Position, PostingIterator};
use crate::error::Result;
use crate::keys::{GlobalCounter, Index};

/// An iterator with no postings.
#[derive(Debug, Default)]
pub struct NullIterator {
    featureid: String,
}

impl NullIterator {
    /// Creates a null iterator with the given `featureid` (typically carrying the
    /// unresolved name, for diagnostics).
    #[must_use]
    pub fn new(featureid: impl Into<String>) -> Self {
        Self { featureid: featureid.into() }
    }
}

impl PostingIterator for NullIterator {
    fn skip_doc(&mut self, _docno: Index) -> Result<Index> {
        Ok(0)
    }

    fn skip_pos(&mut self, _pos: Position) -> Result<Position> {
        Ok(0)
    }

    fn docno(&self) -> Index {
        0
    }

    fn posno(&self) -> Position {
        0
    }

    fn frequency(&self) -> usize {
        0
    }

    fn document_frequency(&self) -> Result<GlobalCounter> {
        Ok(0)
    }

    fn featureid(&self) -> &str {
        &self.featureid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_reports_no_match() {
        let mut iter = NullIterator::new("missing");
        assert_eq!(iter.skip_doc(1).unwrap(), 0);
        assert_eq!(iter.skip_pos(1).unwrap(), 0);
        assert_eq!(iter.document_frequency().unwrap(), 0);
        assert_eq!(iter.featureid(), "missing");
    }
}
