// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The storage handle: owns the `KvStore`, the configuration, the shared read
//! caches, and the commit mutex that serializes transactions. Iterators and
//! transactions borrow this handle rather than holding back-pointers into each
//! other.

use crate::block::metadata::MetaDataDescription;
use crate::cache::{DocumentFrequencyCache, MetaDataBlockCache};
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::keys::Index;
use crate::kv::{KvBatch, KvStore};
use crate::store::{df_cache, dictionary, keyspace, metadata_table};
use std::sync::{Mutex, RwLock};

/// Ties together the backing `KvStore`, configuration and in-process caches. A
/// single handle may be shared by many concurrent readers; [`StorageHandle::commit_lock`]
/// serializes writers — multiple writers serialize on a single commit mutex.
pub struct StorageHandle<S: KvStore> {
    kv: S,
    config: StorageConfig,
    metadata_cache: MetaDataBlockCache,
    df_cache: DocumentFrequencyCache,
    metadata_description: RwLock<Option<MetaDataDescription>>,
    commit_lock: Mutex<()>,
}

impl<S: KvStore> StorageHandle<S> {
    /// Opens a storage handle over `kv` with the given configuration, loading any
    /// previously-committed metadata schema.
    pub fn open(kv: S, config: StorageConfig) -> Result<Self> {
        let metadata_cache = MetaDataBlockCache::with_capacity(config.metadata_cache_capacity);
        let df_cache = DocumentFrequencyCache::with_capacity(config.df_cache_capacity);
        let description = metadata_table::load_description(&kv)?;
        log::debug!(
            "opened storage handle (acl_enabled={}, metadata schema present={})",
            config.acl_enabled,
            description.is_some()
        );
        Ok(Self {
            kv,
            config,
            metadata_cache,
            df_cache,
            metadata_description: RwLock::new(description),
            commit_lock: Mutex::new(()),
        })
    }

    /// The backing `KvStore`.
    pub fn kv(&self) -> &S {
        &self.kv
    }

    /// The active configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// The shared metadata-block cache.
    pub fn metadata_cache(&self) -> &MetaDataBlockCache {
        &self.metadata_cache
    }

    /// The shared document-frequency cache.
    pub fn df_cache(&self) -> &DocumentFrequencyCache {
        &self.df_cache
    }

    /// The commit mutex: held for the duration of a transaction's commit.
    pub fn commit_lock(&self) -> &Mutex<()> {
        &self.commit_lock
    }

    /// The current metadata schema, if one has been created.
    pub fn metadata_description(&self) -> Option<MetaDataDescription> {
        self.metadata_description.read().expect("lock poisoned").clone()
    }

    /// Replaces the cached metadata schema after a successful create/alter commit.
    pub(crate) fn set_metadata_description(&self, description: MetaDataDescription) {
        *self.metadata_description.write().expect("lock poisoned") = Some(description);
    }

    /// Looks up a committed term-type id, or `0` if the name is unknown.
    pub fn lookup_term_type(&self, name: &str) -> Result<Index> {
        let lowered = name.to_lowercase();
        Ok(dictionary::lookup(&self.kv, &keyspace::term_type_key(&lowered))?.unwrap_or(0))
    }

    /// Looks up a committed term-value id, or `0` if the name is unknown.
    pub fn lookup_term_value(&self, name: &str) -> Result<Index> {
        Ok(dictionary::lookup(&self.kv, &keyspace::term_value_key(name))?.unwrap_or(0))
    }

    /// Looks up a committed docno for a document id, or `0` if unknown.
    pub fn lookup_doc_id(&self, docid: &str) -> Result<Index> {
        Ok(dictionary::lookup(&self.kv, &keyspace::doc_id_key(docid))?.unwrap_or(0))
    }

    /// Looks up a committed userno, or `0` if unknown.
    pub fn lookup_user_name(&self, name: &str) -> Result<Index> {
        Ok(dictionary::lookup(&self.kv, &keyspace::user_name_key(name))?.unwrap_or(0))
    }

    /// Looks up a committed attribno, or `0` if unknown.
    pub fn lookup_attribute_key(&self, name: &str) -> Result<Index> {
        let lowered = name.to_lowercase();
        Ok(dictionary::lookup(&self.kv, &keyspace::attribute_key_key(&lowered))?.unwrap_or(0))
    }

    /// Reads `df(typeno, termno)`, consulting the shared cache first.
    pub fn document_frequency(&self, typeno: Index, termno: Index) -> Result<crate::keys::GlobalCounter> {
        df_cache::get(&self.kv, &self.df_cache, typeno, termno)
    }

    /// Reads the current total document count.
    pub fn nof_docs(&self) -> Result<crate::keys::GlobalCounter> {
        crate::store::variables::nof_docs(&self.kv)
    }

    /// Whether `userno` may access `docno`, consulting the `AclBlock` for `docno`.
    /// Always `true` if ACL filtering is disabled in the active config.
    pub fn acl_allows(&self, docno: Index, userno: Index) -> Result<bool> {
        if !self.config.acl_enabled {
            return Ok(true);
        }
        let prefix = keyspace::acl_prefix(docno);
        let block = crate::store::block_cursor::seek_ge(&self.kv, &prefix, userno, |id, buf| {
            crate::block::boolean::BooleanBlock::decode(id, buf)
        })?;
        Ok(block.is_some_and(|b| b.contains(userno)))
    }

    /// Reads a document's value for `field`, or `None` if the schema has no such
    /// column. Consults the shared [`MetaDataBlockCache`].
    pub fn metadata_value(&self, docno: Index, field: &str) -> Result<Option<f64>> {
        let Some(description) = self.metadata_description() else {
            return Ok(None);
        };
        if description.field(field).is_none() {
            return Ok(None);
        }
        Ok(Some(metadata_table::get(&self.kv, &self.metadata_cache, &description, docno, field)?))
    }

    /// Reads the string attribute `attribute_name` of `docno`, or `None` if unset.
    pub fn attribute(&self, docno: Index, attribute_name: &str) -> Result<Option<String>> {
        let attribno = self.lookup_attribute_key(attribute_name)?;
        if attribno == 0 {
            return Ok(None);
        }
        match self.kv.get(&keyspace::doc_attribute_key(docno, attribno))? {
            Some(bytes) => Ok(Some(
                String::from_utf8(bytes).map_err(|_| Error::CorruptData("DocAttribute: value not UTF-8"))?,
            )),
            None => Ok(None),
        }
    }

    /// Rebuilds a term's `PosinfoBlock`/`DocListBlock` families and `DocFrequency`
    /// entry from a complete, authoritative `(docno -> positions)` set, discarding
    /// whatever is currently stored rather than merging into it.
    ///
    /// This is the replace-all rebuild path from `DESIGN.md`'s Open Questions
    /// (the historical `getWriteBatchReplace`): an operational helper for
    /// reindexing, never called from [`crate::txn::pipeline::StorageTransaction::commit`],
    /// which always merges via [`crate::block::merge::merge`].
    pub fn rebuild_term_postings(&self, typeno: Index, termno: Index, postings: std::collections::BTreeMap<Index, Vec<crate::block::posting::PositionType>>) -> Result<()> {
        use crate::block::boolean::BooleanBlock;
        use crate::block::merge::replace;
        use crate::block::posting::{PosinfoBlock, PostingRecord};
        use crate::block::Block;

        let posting_prefix = keyspace::posinfo_prefix(typeno, termno);
        let existing_ids: Vec<Index> = crate::store::block_cursor::collect_all(&self.kv, &posting_prefix, PosinfoBlock::decode)?
            .iter()
            .map(Block::id)
            .collect();

        let docnos: Vec<Index> = postings.keys().copied().collect();
        let records: Vec<PostingRecord> = postings.into_iter().map(|(docno, positions)| PostingRecord { docno, positions }).collect();
        let new_df = records.len() as u64;
        let rebuilt_postings: Vec<PosinfoBlock> = replace(records)?;

        let doclist_prefix = keyspace::doclist_prefix(typeno, termno);
        let existing_doclist_ids: Vec<Index> = crate::store::block_cursor::collect_all(&self.kv, &doclist_prefix, BooleanBlock::decode)?
            .iter()
            .map(Block::id)
            .collect();
        let rebuilt_doclist: Vec<BooleanBlock> = replace(docnos)?;

        let mut batch = self.kv.batch();
        crate::store::block_cursor::replace_family(&mut batch, &posting_prefix, &existing_ids, &rebuilt_postings)?;
        crate::store::block_cursor::replace_family(&mut batch, &doclist_prefix, &existing_doclist_ids, &rebuilt_doclist)?;
        df_cache::set(&mut batch, typeno, termno, new_df);
        batch.commit()?;

        self.df_cache.invalidate(typeno, termno);
        log::debug!("rebuilt postings for (typeno={typeno}, termno={termno}): df={new_df}");
        Ok(())
    }

    /// Reads the forward-index term string at `position` in `(type_name, docno)`,
    /// or `None` if nothing occupies that exact position.
    pub fn forward_term_at(&self, type_name: &str, docno: Index, position: crate::block::posting::PositionType) -> Result<Option<String>> {
        let typeno = self.lookup_term_type(type_name)?;
        if typeno == 0 {
            return Ok(None);
        }
        let prefix = keyspace::forward_index_prefix(typeno, docno);
        let block = crate::store::block_cursor::seek_ge(&self.kv, &prefix, Index::from(position), crate::block::forward::ForwardIndexBlock::decode)?;
        Ok(block
            .and_then(|b| b.entry_at_or_after(Index::from(position)).cloned())
            .filter(|e| e.position == Index::from(position))
            .map(|e| e.term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;

    #[test]
    fn unknown_names_look_up_to_zero() {
        let handle = StorageHandle::open(MemoryKv::new(), StorageConfig::new()).unwrap();
        assert_eq!(handle.lookup_term_type("word").unwrap(), 0);
        assert_eq!(handle.nof_docs().unwrap(), 0);
    }

    #[test]
    fn acl_disabled_always_allows() {
        let handle = StorageHandle::open(MemoryKv::new(), StorageConfig::new()).unwrap();
        assert!(handle.acl_allows(1, 999).unwrap());
    }

    #[test]
    fn metadata_value_is_none_without_a_schema() {
        let handle = StorageHandle::open(MemoryKv::new(), StorageConfig::new()).unwrap();
        assert_eq!(handle.metadata_value(1, "year").unwrap(), None);
    }

    #[test]
    fn attribute_round_trips_through_a_transaction() {
        use crate::txn::pipeline::StorageTransaction;
        let handle = StorageHandle::open(MemoryKv::new(), StorageConfig::new()).unwrap();
        let mut txn = StorageTransaction::begin(&handle);
        let docno = txn.insert_document("d1").unwrap();
        txn.set_attribute(docno, "title", Some("hello".to_owned())).unwrap();
        txn.commit().unwrap();

        assert_eq!(handle.attribute(docno, "title").unwrap(), Some("hello".to_owned()));
        assert_eq!(handle.attribute(docno, "missing").unwrap(), None);
    }

    #[test]
    fn rebuild_term_postings_replaces_existing_blocks_and_df() {
        use crate::txn::pipeline::StorageTransaction;
        let handle = StorageHandle::open(MemoryKv::new(), StorageConfig::new()).unwrap();
        let mut txn = StorageTransaction::begin(&handle);
        let d1 = txn.insert_document("d1").unwrap();
        let d2 = txn.insert_document("d2").unwrap();
        txn.add_term("word", "a", d1, 1).unwrap();
        txn.add_term("word", "a", d2, 1).unwrap();
        txn.commit().unwrap();

        let typeno = handle.lookup_term_type("word").unwrap();
        let termno = handle.lookup_term_value("a").unwrap();
        assert_eq!(handle.document_frequency(typeno, termno).unwrap(), 2);

        let mut rebuilt = std::collections::BTreeMap::new();
        rebuilt.insert(d1, vec![5u16]);
        handle.rebuild_term_postings(typeno, termno, rebuilt).unwrap();

        assert_eq!(handle.document_frequency(typeno, termno).unwrap(), 1);
        let prefix = keyspace::posinfo_prefix(typeno, termno);
        let blocks = crate::store::block_cursor::collect_all(&handle.kv, &prefix, crate::block::posting::PosinfoBlock::decode).unwrap();
        let all_docnos: Vec<Index> = blocks.iter().flat_map(|b| b.records().iter().map(|r| r.docno)).collect();
        assert_eq!(all_docnos, vec![d1]);
    }

    #[test]
    fn forward_term_at_reads_back_an_indexed_position() {
        use crate::txn::pipeline::StorageTransaction;
        let handle = StorageHandle::open(MemoryKv::new(), StorageConfig::new()).unwrap();
        let mut txn = StorageTransaction::begin(&handle);
        let docno = txn.insert_document("d1").unwrap();
        txn.add_term("word", "hello", docno, 1).unwrap();
        txn.commit().unwrap();

        assert_eq!(handle.forward_term_at("word", docno, 1).unwrap(), Some("hello".to_owned()));
        assert_eq!(handle.forward_term_at("word", docno, 2).unwrap(), None);
    }
}
