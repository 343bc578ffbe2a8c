// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Block-family access: every block-keyed entity (`PosinfoBlock`, `DocListBlock`,
//! `ForwardIndexBlock`, `InverseTermBlock`, `AclBlock`/`UserAclBlock`) lives under a
//! `prefix ++ varint(block-id)` key, where `block-id` is the largest element-id the
//! block contains. This module implements the shared seek/iterate/store/delete
//! operations against that convention once, instead of once per block kind.

use crate::block::Block;
use crate::coding::Encode;
use crate::error::{Error, Result};
use crate::keys::Index;
use crate::kv::{KvBatch, KvCursor, KvStore};
use crate::varint;

/// Appends a block-id component to a family's key prefix.
#[must_use]
pub fn block_key(prefix: &[u8], block_id: Index) -> Vec<u8> {
    let mut out = prefix.to_vec();
    varint::pack_into(u64::from(block_id), &mut out);
    out
}

fn block_id_suffix(prefix: &[u8], key: &[u8]) -> Result<Index> {
    if !key.starts_with(prefix) {
        return Err(Error::CorruptData("block_cursor: key outside expected family"));
    }
    let (id, _) = varint::unpack(&key[prefix.len()..])?;
    Ok(id as Index)
}

/// Finds the first block in `prefix`'s family with `id >= target`, decoding it with
/// `decode` if found.
pub fn seek_ge<S: KvStore, B>(kv: &S, prefix: &[u8], target: Index, decode: impl Fn(Index, &[u8]) -> Result<B>) -> Result<Option<B>> {
    let mut cursor = kv.cursor();
    if !cursor.seek(&block_key(prefix, target)) || !cursor.key().starts_with(prefix) {
        return Ok(None);
    }
    let id = block_id_suffix(prefix, cursor.key())?;
    Ok(Some(decode(id, cursor.value())?))
}

/// Finds the last (highest id) block in `prefix`'s family, decoding it with `decode`
/// if the family is non-empty.
pub fn last<S: KvStore, B>(kv: &S, prefix: &[u8], decode: impl Fn(Index, &[u8]) -> Result<B>) -> Result<Option<B>> {
    let mut cursor = kv.cursor();
    if !cursor.seek_to_last(prefix) {
        return Ok(None);
    }
    let id = block_id_suffix(prefix, cursor.key())?;
    Ok(Some(decode(id, cursor.value())?))
}

/// Loads every block in `prefix`'s family, ascending by id.
pub fn collect_all<S: KvStore, B>(kv: &S, prefix: &[u8], decode: impl Fn(Index, &[u8]) -> Result<B>) -> Result<Vec<B>> {
    let mut out = Vec::new();
    let mut cursor = kv.cursor();
    if !cursor.seek(prefix) {
        return Ok(out);
    }
    while cursor.valid() && cursor.key().starts_with(prefix) {
        let id = block_id_suffix(prefix, cursor.key())?;
        out.push(decode(id, cursor.value())?);
        if !cursor.next() {
            break;
        }
    }
    Ok(out)
}

/// Queues a block for storage under `prefix`'s family, keyed by its own id.
pub fn store<Batch: KvBatch, B: Block + Encode>(batch: &mut Batch, prefix: &[u8], block: &B) -> Result<()> {
    let key = block_key(prefix, block.id());
    let bytes = block.encode_into_vec();
    batch.put(&key, &bytes);
    Ok(())
}

/// Queues a block for deletion from `prefix`'s family by its id.
pub fn delete<Batch: KvBatch>(batch: &mut Batch, prefix: &[u8], block_id: Index) {
    batch.delete(&block_key(prefix, block_id));
}

/// Replaces the entire `prefix` family with `blocks` — deletes every block currently
/// stored (per `existing_ids`) and re-stores the new set. Used after a
/// [`crate::block::merge::merge`] pass has computed the replacement run.
pub fn replace_family<Batch: KvBatch, B: Block + Encode>(
    batch: &mut Batch,
    prefix: &[u8],
    existing_ids: &[Index],
    blocks: &[B],
) -> Result<()> {
    for &id in existing_ids {
        delete(batch, prefix, id);
    }
    for block in blocks {
        store(batch, prefix, block)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::boolean::BooleanBlock;
    use crate::kv::memory::MemoryKv;

    fn decode(id: Index, buf: &[u8]) -> Result<BooleanBlock> {
        BooleanBlock::decode(id, buf)
    }

    #[test]
    fn stores_seeks_and_lists_a_block_family() {
        let kv = MemoryKv::new();
        let prefix = vec![99u8];
        let a = BooleanBlock::from_elements(&[1, 2, 3]).unwrap();
        let b = BooleanBlock::from_elements(&[10, 11]).unwrap();

        let mut batch = kv.batch();
        store(&mut batch, &prefix, &a).unwrap();
        store(&mut batch, &prefix, &b).unwrap();
        batch.commit().unwrap();

        let found = seek_ge(&kv, &prefix, 2, decode).unwrap().unwrap();
        assert_eq!(found.id(), 3);
        let via_block_trait = crate::block::Block::id(&found);
        assert_eq!(via_block_trait, 3);

        let found_next_family = seek_ge(&kv, &prefix, 5, decode).unwrap().unwrap();
        assert_eq!(found_next_family.id(), 11);

        let last_block = last(&kv, &prefix, decode).unwrap().unwrap();
        assert_eq!(last_block.id(), 11);

        let all = collect_all(&kv, &prefix, decode).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn returns_none_for_empty_family() {
        let kv = MemoryKv::new();
        let prefix = vec![99u8];
        assert!(seek_ge::<_, BooleanBlock>(&kv, &prefix, 1, decode).unwrap().is_none());
        assert!(last::<_, BooleanBlock>(&kv, &prefix, decode).unwrap().is_none());
    }
}
