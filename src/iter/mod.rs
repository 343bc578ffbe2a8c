// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Posting-iterator algebra: term-occurrence leaves and the boolean/
//! positional combinators built on top of them. Every iterator in this module,
//! leaf or join, exposes the same [`PostingIterator`] capability set so
//! `crate::query` can compose an arbitrary tree of them without caring which
//! concrete operator it is holding.

pub mod contains;
pub mod difference;
pub mod factory;
pub mod intersect;
pub mod null;
pub mod structural;
pub mod succpred;
pub mod term;
pub mod union;

use crate::block::posting::PositionType;
use crate::error::Result;
use crate::keys::{GlobalCounter, Index};

/// A position within a document. `0` means "no position"/"not yet advanced",
/// mirroring the `Index` convention of reserving `0` for "none" (`crate::keys::NONE`).
pub type Position = PositionType;

/// The capability set every posting iterator exposes.
pub trait PostingIterator {
    /// First docno `>= docno` where the iterator has a match, or `0` if exhausted.
    fn skip_doc(&mut self, docno: Index) -> Result<Index>;

    /// Like [`Self::skip_doc`] but may return a false-positive candidate that a
    /// later [`Self::skip_pos`] rejects. Operators with no cheaper candidate test
    /// than a full match just delegate to `skip_doc`.
    fn skip_doc_candidate(&mut self, docno: Index) -> Result<Index> {
        self.skip_doc(docno)
    }

    /// Within the current document, first position `>= pos`, or `0`.
    fn skip_pos(&mut self, pos: Position) -> Result<Position>;

    /// Current docno, `0` before the first [`Self::skip_doc`] call.
    fn docno(&self) -> Index;

    /// Current position, `0` before the first [`Self::skip_pos`] call.
    fn posno(&self) -> Position;

    /// Span, in positions, of the current match. `1` for a plain term occurrence.
    fn length(&self) -> usize {
        1
    }

    /// Number of occurrences contributing to the current document's match.
    fn frequency(&self) -> usize;

    /// Estimated (joins) or exact (leaves) document frequency.
    fn document_frequency(&self) -> Result<GlobalCounter>;

    /// Deterministic fingerprint of the iterator subtree: the cache key statistics
    /// and query evaluation use to recognize a repeated subexpression.
    fn featureid(&self) -> &str;
}

/// Builds a join operator's `featureid()`: argument ids joined by `=`, an
/// optional decimal `range` suffixed with `R`, then the single-letter operator tag.
pub(crate) fn build_featureid<'a>(parts: impl IntoIterator<Item = &'a str>, range: i64, op: char) -> String {
    let mut out = parts.into_iter().collect::<Vec<_>>().join("=");
    if range != 0 {
        out.push_str(&range.to_string());
        out.push('R');
    }
    out.push(op);
    out
}
