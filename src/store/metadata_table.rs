// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The metadata table: the single [`MetaDataDescription`] schema record plus typed
//! per-document reads/writes against [`MetaDataBlock`]s, backed by
//! [`crate::cache::MetaDataBlockCache`]. Also implements the "alter table" schema
//! change: rewriting every block through a translation map when the schema changes.

use crate::block::metadata::{decode_description, encode_description, MetaDataBlock, MetaDataDescription};
use crate::block::Block;
use crate::cache::MetaDataBlockCache;
use crate::coding::Encode;
use crate::error::{Error, Result};
use crate::keys::Index;
use crate::kv::{KvBatch, KvCursor, KvStore};
use crate::store::block_cursor;
use crate::store::keyspace::{metadata_description_key, metadata_prefix};
use std::sync::Arc;

/// Loads the current metadata schema, if one has been written yet.
pub fn load_description<S: KvStore>(kv: &S) -> Result<Option<MetaDataDescription>> {
    match kv.get(&metadata_description_key())? {
        Some(bytes) => Ok(Some(decode_description(&bytes)?)),
        None => Ok(None),
    }
}

/// Stages the initial metadata schema write. Fails with
/// [`Error::ConfigMismatch`] if a schema is already present — use [`alter`] to
/// change an existing schema.
pub fn create_description<S: KvStore, B: KvBatch>(kv: &S, batch: &mut B, description: &MetaDataDescription) -> Result<()> {
    if load_description(kv)?.is_some() {
        return Err(Error::ConfigMismatch("metadata_table: schema already exists, use alter"));
    }
    batch.put(&metadata_description_key(), &encode_description(description));
    Ok(())
}

/// Loads the block covering `docno`, consulting `cache` first.
fn load_block<S: KvStore>(
    kv: &S,
    cache: &MetaDataBlockCache,
    description: &MetaDataDescription,
    docno: Index,
) -> Result<Arc<MetaDataBlock>> {
    let block_id = MetaDataBlock::block_id_for(docno);
    if let Some(block) = cache.get(block_id) {
        return Ok(block);
    }
    let block = block_cursor::seek_ge(kv, &metadata_prefix(), block_id, |id, buf| MetaDataBlock::decode(id, buf))?
        .filter(|b| b.id() == block_id)
        .map_or_else(|| MetaDataBlock::new_zeroed(block_id, description), |b| b);
    let block = Arc::new(block);
    cache.insert(block_id, Arc::clone(&block));
    Ok(block)
}

/// Reads `field` for `docno`.
pub fn get<S: KvStore>(
    kv: &S,
    cache: &MetaDataBlockCache,
    description: &MetaDataDescription,
    docno: Index,
    field: &str,
) -> Result<f64> {
    let block = load_block(kv, cache, description, docno)?;
    block.get(description, docno, field)
}

/// Stages a write of `field` for `docno` directly against the `KvStore`, bypassing
/// the shared [`MetaDataBlockCache`] entirely. The commit pipeline uses this (never
/// [`get`]/the cache) while a transaction is still pending, so a commit that later
/// fails never leaves an uncommitted block sitting in the shared cache — caches are
/// only invalidated once the surrounding commit actually succeeds. Returns the touched block id so
/// the caller can invalidate the cache once the batch actually commits.
pub fn set_uncached<B: KvBatch, S: KvStore>(
    kv: &S,
    batch: &mut B,
    description: &MetaDataDescription,
    docno: Index,
    field: &str,
    value: f64,
) -> Result<Index> {
    let block_id = MetaDataBlock::block_id_for(docno);
    let mut block = block_cursor::seek_ge(kv, &metadata_prefix(), block_id, |id, buf| MetaDataBlock::decode(id, buf))?
        .filter(|b| b.id() == block_id)
        .unwrap_or_else(|| MetaDataBlock::new_zeroed(block_id, description));
    block.set(description, docno, field, value)?;
    let bytes = block.encode_into_vec();
    batch.put(&block_cursor::block_key(&metadata_prefix(), block_id), &bytes);
    Ok(block_id)
}

/// Rewrites every stored metadata block from `old` to `new`'s layout and stages the
/// new schema write. Columns present in both schemas are preserved (typed
/// conversion per [`crate::block::metadata::MetaDataType`]); dropped columns are
/// discarded; new columns are zero-filled. Returns the ids of every block touched,
/// for cache invalidation after commit.
pub fn alter<S: KvStore, B: KvBatch>(
    kv: &S,
    batch: &mut B,
    old: &MetaDataDescription,
    new: &MetaDataDescription,
) -> Result<Vec<Index>> {
    let translation = old.translation_to(new);
    let mut cursor = kv.cursor();
    let prefix = metadata_prefix();
    let mut touched = Vec::new();
    if cursor.seek(&prefix) {
        while cursor.valid() && cursor.key().starts_with(&prefix) {
            let (id, _) = crate::varint::unpack(&cursor.key()[prefix.len()..])?;
            let id = id as Index;
            let block = MetaDataBlock::decode(id, cursor.value())?;
            let altered = block.alter(old, &translation, new);
            let bytes = altered.encode_into_vec();
            batch.put(&block_cursor::block_key(&prefix, id), &bytes);
            touched.push(id);
            if !cursor.next() {
                break;
            }
        }
    }
    batch.put(&metadata_description_key(), &encode_description(new));
    Ok(touched)
}
