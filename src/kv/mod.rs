// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The ordered key/value store this crate's storage layer is built on top of.
//!
//! Per the design's scope, the store itself (and its production binding, e.g. to
//! LevelDB) is an external collaborator: this module specifies the contract as
//! traits only. [`memory::MemoryKv`] is the one concrete implementation this crate
//! ships, and is a reference/test backend, not a production one.

pub mod memory;

use crate::error::Result;

/// An ordered byte-string key/value store with cursor iteration and atomic batches.
pub trait KvStore: Send + Sync {
    /// The cursor type returned by [`KvStore::cursor`].
    type Cursor<'a>: KvCursor
    where
        Self: 'a;

    /// The write-batch type returned by [`KvStore::batch`].
    type Batch: KvBatch;

    /// Point lookup. Returns `None` if the key is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Unconditional point write, applied immediately (outside any batch).
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Unconditional point delete, applied immediately (outside any batch).
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Opens a cursor over a consistent snapshot of the store taken at call time.
    fn cursor(&self) -> Self::Cursor<'_>;

    /// Opens an empty write batch. Writes staged in the batch are invisible until
    /// [`KvBatch::commit`] succeeds, and then apply all-or-nothing.
    fn batch(&self) -> Self::Batch;
}

/// A seeking, ordered read cursor over a `KvStore` snapshot.
pub trait KvCursor {
    /// Positions the cursor at the first key `>= key`. Returns whether a key was
    /// found.
    fn seek(&mut self, key: &[u8]) -> bool;

    /// Positions the cursor at the last key `<= key` (used for "block containing id"
    /// lookups via the block-id convention). Returns whether a key was found.
    fn seek_for_prev(&mut self, key: &[u8]) -> bool;

    /// Positions the cursor at the very last key with the given prefix.
    fn seek_to_last(&mut self, prefix: &[u8]) -> bool;

    /// Advances to the next key. Returns whether a key is now positioned.
    fn next(&mut self) -> bool;

    /// Whether the cursor is positioned on a valid entry.
    fn valid(&self) -> bool;

    /// The key at the current position. Panics if not [`KvCursor::valid`].
    fn key(&self) -> &[u8];

    /// The value at the current position. Panics if not [`KvCursor::valid`].
    fn value(&self) -> &[u8];
}

/// An atomic, all-or-nothing batch of writes.
pub trait KvBatch {
    /// Stages a put.
    fn put(&mut self, key: &[u8], value: &[u8]);

    /// Stages a delete.
    fn delete(&mut self, key: &[u8]);

    /// Applies every staged write atomically. On error, no staged write is visible.
    fn commit(self) -> Result<()>;
}
