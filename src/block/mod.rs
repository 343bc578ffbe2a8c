// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Binary block formats: the frame every on-disk block shares (an `id` equal to the
//! largest element-id it contains, plus a bounded payload), and the merge/split policy
//! common to all of them.

pub mod boolean;
pub mod forward;
pub mod inverse_term;
pub mod merge;
pub mod metadata;
pub mod posting;

use crate::keys::Index;

/// Soft ceiling on an encoded block's payload size. Exceeding it on merge triggers a
/// split.
pub const MAX_BLOCK_SIZE: usize = 1024;

/// Number of consecutive documents one [`posting::DocIndexNode`] covers.
pub const DOC_INDEX_NODE_SIZE: usize = 7;

/// Sentinel byte terminating a [`posting::PosinfoBlock`]'s record area. Never a valid
/// varint lead byte (lead bytes occupy `0x00..=0x7F` and `0xC0..=0xFF`; this falls in
/// the continuation-only range `0x80..=0xBF`), so it cannot be confused with data.
pub const END_POSINFO_MARKER: u8 = 0x80;

/// Common frame every block kind implements: the element-id the block is keyed by,
/// and the invariant that it equals the largest element-id the block contains.
pub trait Block {
    /// The block's id — by convention, the largest element-id it contains.
    fn id(&self) -> Index;

    /// Whether the block currently holds any elements.
    fn is_empty(&self) -> bool;

    /// Approximate encoded payload size in bytes, used to decide whether a merge
    /// would exceed [`MAX_BLOCK_SIZE`].
    fn approx_encoded_len(&self) -> usize;
}
