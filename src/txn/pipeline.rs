// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `StorageTransaction`: the commit/rollback pipeline. A transaction is either
//! pending, committed, or rolled back; dropping a pending transaction rolls it
//! back. Commit acquires the storage handle's commit mutex, stages every write
//! into one KV batch, and only touches the shared caches once that batch has
//! actually committed, so a failed commit leaves both the store and the caches
//! untouched.

use crate::block::boolean::BooleanBlock;
use crate::block::forward::{ForwardEntry, ForwardIndexBlock};
use crate::block::inverse_term::{InverseTermBlock, InverseTermEntry, InverseTermRecord};
use crate::block::merge::{self, Mergeable};
use crate::block::posting::{PositionType, PosinfoBlock, PostingRecord};
use crate::block::Block;
use crate::error::{Error, Result};
use crate::keys::{variable_names, Index};
use crate::kv::{KvBatch, KvStore};
use crate::stats::{MessageBuilder, PeerMessage};
use crate::store::block_cursor;
use crate::store::dictionary;
use crate::store::handle::StorageHandle;
use crate::store::keyspace;
use crate::store::metadata_table;
use crate::txn::maps::TransactionMaps;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};

/// Lifecycle state of a [`StorageTransaction`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TxnState {
    Pending,
    Committed,
    RolledBack,
}

/// A pending (or just-resolved) unit of work against a [`StorageHandle`]. Holds its
/// staging maps exclusively; commits serialize against other transactions via the
/// handle's commit mutex.
pub struct StorageTransaction<'a, S: KvStore> {
    handle: &'a StorageHandle<S>,
    maps: TransactionMaps,
    state: TxnState,
}

impl<'a, S: KvStore> StorageTransaction<'a, S> {
    /// Begins a new pending transaction against `handle`.
    #[must_use]
    pub fn begin(handle: &'a StorageHandle<S>) -> Self {
        Self { handle, maps: TransactionMaps::new(), state: TxnState::Pending }
    }

    fn require_pending(&self) -> Result<()> {
        if self.state != TxnState::Pending {
            return Err(Error::TransactionState("operation attempted on a transaction that is no longer pending"));
        }
        Ok(())
    }

    /// Resolves (or allocates a provisional id for) a term type name. Lowercased,
    /// since term types are case-insensitive.
    pub fn term_type_id(&mut self, name: &str) -> Result<Index> {
        self.require_pending()?;
        let lowered = name.to_lowercase();
        self.maps.term_types.resolve(self.handle.kv(), |n| keyspace::term_type_key(n), &lowered)
    }

    /// Resolves (or allocates a provisional id for) a term value. Case-sensitive.
    pub fn term_value_id(&mut self, name: &str) -> Result<Index> {
        self.require_pending()?;
        self.maps.term_values.resolve(self.handle.kv(), keyspace::term_value_key, name)
    }

    /// Resolves (or allocates a provisional id for) a document id.
    pub fn doc_id(&mut self, docid: &str) -> Result<Index> {
        self.require_pending()?;
        self.maps.doc_ids.resolve(self.handle.kv(), keyspace::doc_id_key, docid)
    }

    /// Resolves (or allocates a provisional id for) a user name.
    pub fn user_name_id(&mut self, name: &str) -> Result<Index> {
        self.require_pending()?;
        self.maps.user_names.resolve(self.handle.kv(), keyspace::user_name_key, name)
    }

    /// Resolves (or allocates a provisional id for) an attribute key. Lowercased,
    /// since attribute keys are case-insensitive.
    pub fn attribute_key_id(&mut self, name: &str) -> Result<Index> {
        self.require_pending()?;
        let lowered = name.to_lowercase();
        self.maps.attribute_keys.resolve(self.handle.kv(), |n| keyspace::attribute_key_key(n), &lowered)
    }

    /// Introduces `docid` as a new document, returning its (possibly provisional)
    /// docno.
    pub fn insert_document(&mut self, docid: &str) -> Result<Index> {
        self.require_pending()?;
        let docno = self.doc_id(docid)?;
        self.maps.mark_new_document(docno);
        Ok(docno)
    }

    /// Stages one term occurrence of `(type_name, term_value)` at `position` in
    /// `docno`.
    pub fn add_term(&mut self, type_name: &str, term_value: &str, docno: Index, position: PositionType) -> Result<()> {
        self.require_pending()?;
        let typeno = self.term_type_id(type_name)?;
        let termno = self.term_value_id(term_value)?;
        self.maps.add_posting(typeno, termno, docno, position);
        self.maps.add_forward_term(typeno, docno, position, term_value.to_owned());
        Ok(())
    }

    /// Stages an attribute write (or deletion, with `value = None`).
    pub fn set_attribute(&mut self, docno: Index, attribute_name: &str, value: Option<String>) -> Result<()> {
        self.require_pending()?;
        let attribno = self.attribute_key_id(attribute_name)?;
        self.maps.set_attribute(docno, attribno, value);
        Ok(())
    }

    /// Stages a metadata column write.
    pub fn set_metadata(&mut self, docno: Index, field: &str, value: f64) -> Result<()> {
        self.require_pending()?;
        self.maps.set_metadata(docno, field, value);
        Ok(())
    }

    /// Stages an ACL grant for `username` on `docno`.
    pub fn grant_acl(&mut self, docno: Index, username: &str) -> Result<()> {
        self.require_pending()?;
        let userno = self.user_name_id(username)?;
        self.maps.grant_acl(docno, userno);
        Ok(())
    }

    /// Stages an ACL revocation for `username` on `docno`.
    pub fn revoke_acl(&mut self, docno: Index, username: &str) -> Result<()> {
        self.require_pending()?;
        let userno = self.user_name_id(username)?;
        self.maps.revoke_acl(docno, userno);
        Ok(())
    }

    /// Stages an explicit document-frequency adjustment.
    pub fn adjust_df(&mut self, type_name: &str, term_value: &str, delta: i64) -> Result<()> {
        self.require_pending()?;
        let typeno = self.term_type_id(type_name)?;
        let termno = self.term_value_id(term_value)?;
        self.maps.adjust_df(typeno, termno, delta);
        Ok(())
    }

    /// Schedules full deletion of `docno`, known by `docid`.
    pub fn delete_document(&mut self, docno: Index, docid: &str) -> Result<()> {
        self.require_pending()?;
        self.maps.delete_document(docno, docid);
        Ok(())
    }

    /// Schedules deletion of just `type_name`'s postings for `docno`, preserving
    /// entries of other types (`deleteDocSearchIndexType`).
    pub fn delete_document_search_index_type(&mut self, docno: Index, type_name: &str) -> Result<()> {
        self.require_pending()?;
        let typeno = self.term_type_id(type_name)?;
        self.maps.delete_document_search_index_type(docno, typeno);
        Ok(())
    }

    /// Rolls back the transaction, discarding its staged maps. A no-op against the
    /// `KvStore` — nothing reaches it until [`Self::commit`].
    pub fn rollback(mut self) -> Result<()> {
        self.require_pending()?;
        self.state = TxnState::RolledBack;
        Ok(())
    }

    /// Commits the transaction (steps 1-10 below). On success, returns the peer
    /// statistics message for this commit (empty if nothing changed that peers
    /// care about) — publishing it is the caller's responsibility, and must only
    /// happen once this call has returned `Ok`. On failure, the `KvStore` and
    /// every shared cache are left exactly as they were before the call, and the
    /// transaction's staged maps are untouched: it is still pending, and the
    /// caller may fix whatever caused the failure and call `commit` again.
    pub fn commit(&mut self) -> Result<PeerMessage> {
        self.require_pending()?;
        // Step 1: acquire the commit lock (held for the remainder of this call).
        let _guard = self.handle.commit_lock().lock().expect("commit lock poisoned");

        match self.commit_locked() {
            Ok(report) => {
                self.state = TxnState::Committed;
                self.maps = TransactionMaps::default();
                Ok(report)
            }
            Err(e) => {
                log::warn!("transaction commit failed, on-disk state unchanged, transaction remains pending: {e}");
                Err(e)
            }
        }
    }

    fn commit_locked(&mut self) -> Result<PeerMessage> {
        let kv = self.handle.kv();

        // Step 2: open a KV batch.
        let mut batch = kv.batch();

        // Step 3: assign ids via KeyMap write-batches. Works against a clone of the
        // staged maps rather than consuming `self.maps` directly, so that a failure
        // anywhere below leaves the original staged maps on `self` untouched and
        // the transaction retryable.
        let maps = self.maps.clone();
        let type_map = dictionary::commit_allocations(
            kv,
            &mut batch,
            variable_names::TYPE_NO,
            keyspace::term_type_key,
            Some(keyspace::term_type_inv_key),
            maps.term_types.clone().into_pending(),
        )?;
        let term_map = dictionary::commit_allocations(
            kv,
            &mut batch,
            variable_names::TERM_NO,
            keyspace::term_value_key,
            Some(keyspace::term_value_inv_key),
            maps.term_values.clone().into_pending(),
        )?;
        let doc_map = dictionary::commit_allocations(
            kv,
            &mut batch,
            variable_names::DOC_NO,
            keyspace::doc_id_key,
            None::<fn(Index) -> Vec<u8>>,
            maps.doc_ids.clone().into_pending(),
        )?;
        let user_map = dictionary::commit_allocations(
            kv,
            &mut batch,
            variable_names::USER_NO,
            keyspace::user_name_key,
            None::<fn(Index) -> Vec<u8>>,
            maps.user_names.clone().into_pending(),
        )?;
        let attrib_map = dictionary::commit_allocations(
            kv,
            &mut batch,
            variable_names::ATTRIB_NO,
            keyspace::attribute_key_key,
            None::<fn(Index) -> Vec<u8>>,
            maps.attribute_keys.clone().into_pending(),
        )?;

        // Step 4: rewrite provisional ids throughout the staged structures.
        let maps = maps.rewrite(&type_map, &term_map, &doc_map, &user_map, &attrib_map)?;

        // Resolve full/partial doc deletions up front: reading each deleted
        // document's InverseTermBlock tells us which (typeno, termno) postings and
        // df entries it contributed, which full/partial deletion must undo.
        let mut term_removed_docs: FxHashMap<(Index, Index), FxHashSet<Index>> = FxHashMap::default();
        let mut docnos_to_delete: FxHashSet<Index> = FxHashSet::default();
        for (docno, _) in maps.deletes() {
            docnos_to_delete.insert(*docno);
            if let Some(record) = read_inverse_term_record(kv, *docno)? {
                for e in &record.entries {
                    term_removed_docs.entry((e.typeno, e.termno)).or_default().insert(*docno);
                }
            }
        }
        let mut partial_removed: FxHashMap<Index, FxHashSet<Index>> = FxHashMap::default();
        for (docno, typeno) in maps.partial_deletes() {
            if docnos_to_delete.contains(docno) {
                continue; // already fully deleted above
            }
            if let Some(record) = read_inverse_term_record(kv, *docno)? {
                for e in &record.entries {
                    if e.typeno == *typeno {
                        term_removed_docs.entry((e.typeno, e.termno)).or_default().insert(*docno);
                    }
                }
            }
            partial_removed.entry(*typeno).or_default().insert(*docno);
        }

        // Step 5: flush attributes then metadata.
        for ((docno, attribno), value) in maps.attributes() {
            let key = keyspace::doc_attribute_key(*docno, *attribno);
            match value {
                Some(v) => batch.put(&key, v.as_bytes()),
                None => batch.delete(&key),
            }
        }
        let mut touched_metadata_blocks: Vec<Index> = Vec::new();
        if !maps.metadata().is_empty() {
            let description = self
                .handle
                .metadata_description()
                .ok_or(Error::ConfigMismatch("commit: metadata write staged but no schema has been created"))?;
            for ((docno, field), value) in maps.metadata() {
                let block_id = metadata_table::set_uncached(kv, &mut batch, &description, *docno, field, *value)?;
                touched_metadata_blocks.push(block_id);
            }
        }

        // Step 6: flush the inverted index (postings + parallel doclist + df +
        // inverse-term updates) and accumulate the peer statistics message.
        let mut message = PeerMessage::new();
        let mut touched_terms: BTreeSet<(Index, Index)> = maps.postings().keys().copied().collect();
        touched_terms.extend(term_removed_docs.keys().copied());
        for (typeno, termno) in touched_terms {
            let empty = BTreeMap::new();
            let new_positions = maps.postings().get(&(typeno, termno)).unwrap_or(&empty);
            let removed = term_removed_docs.get(&(typeno, termno)).cloned().unwrap_or_default();
            let (old_df, new_df) = merge_postings(kv, &mut batch, typeno, termno, new_positions, &removed)?;
            if old_df != new_df {
                crate::store::df_cache::set(&mut batch, typeno, termno, new_df);
                let increment = new_df as i64 - old_df as i64;
                message.add_df_change(typeno, termno, increment, old_df == 0);
            }
        }

        // Per-document inverse-term bookkeeping: new postings contribute fresh
        // entries, full deletions drop the record entirely, partial (per-type)
        // deletions drop just that type's entries and keep the rest.
        let mut new_inverse_by_doc: BTreeMap<Index, Vec<InverseTermEntry>> = BTreeMap::new();
        for (&(typeno, termno), by_doc) in maps.postings() {
            for (&docno, positions) in by_doc {
                if positions.is_empty() {
                    continue;
                }
                new_inverse_by_doc.entry(docno).or_default().push(InverseTermEntry {
                    typeno,
                    termno,
                    ff: positions.len() as u32,
                    firstpos: Index::from(positions[0]),
                });
            }
        }
        for (&typeno, docnos) in &partial_removed {
            for &docno in docnos {
                if new_inverse_by_doc.contains_key(&docno) {
                    continue;
                }
                if let Some(existing) = read_inverse_term_record(kv, docno)? {
                    let remaining: Vec<_> = existing.entries.into_iter().filter(|e| e.typeno != typeno).collect();
                    new_inverse_by_doc.insert(docno, remaining);
                }
            }
        }
        write_inverse_term_records(kv, &mut batch, new_inverse_by_doc, &docnos_to_delete)?;

        // Step 7: flush the forward index then the ACL maps.
        for (&(typeno, docno), positions) in maps.forward() {
            if docnos_to_delete.contains(&docno) {
                continue;
            }
            merge_forward(kv, &mut batch, typeno, docno, positions)?;
        }
        for docno in &docnos_to_delete {
            delete_forward_family_for_doc(kv, &mut batch, *docno)?;
            let existing_users = read_acl_users(kv, *docno)?;
            for &userno in &existing_users {
                apply_boolean_delta(kv, &mut batch, &keyspace::user_acl_prefix(userno), &[], &[*docno])?;
            }
            delete_family(kv, &mut batch, &keyspace::acl_prefix(*docno))?;
        }
        for (&docno, users) in maps.acl_grants() {
            apply_boolean_delta(kv, &mut batch, &keyspace::acl_prefix(docno), users, &[])?;
            for &userno in users {
                apply_boolean_delta(kv, &mut batch, &keyspace::user_acl_prefix(userno), &[docno], &[])?;
            }
        }
        for (&docno, users) in maps.acl_revokes() {
            apply_boolean_delta(kv, &mut batch, &keyspace::acl_prefix(docno), &[], users)?;
            for &userno in users {
                apply_boolean_delta(kv, &mut batch, &keyspace::user_acl_prefix(userno), &[], &[docno])?;
            }
        }

        // Step 8: flush explicit df adjustments, distinct from the implicit ones
        // derived above from posting changes.
        for (&(typeno, termno), &delta) in maps.explicit_df() {
            if delta == 0 {
                continue;
            }
            let current = self.handle.document_frequency(typeno, termno)?;
            let updated = (current as i64 + delta).max(0) as u64;
            crate::store::df_cache::set(&mut batch, typeno, termno, updated);
            message.add_df_change(typeno, termno, delta, current == 0);
        }

        // Step 9: write Variable counters (NofDocs adjusted by new - deleted).
        for (_, docid) in maps.deletes() {
            batch.delete(&keyspace::doc_id_key(docid));
        }
        let delta = maps.new_docs().len() as i64 - docnos_to_delete.len() as i64;
        if delta != 0 {
            let current = self.handle.nof_docs()?;
            let updated = (current as i64 + delta).max(0) as u64;
            crate::store::variables::set(&mut batch, variable_names::NOF_DOCS, updated);
            message.set_nof_documents_inserted_change(delta);
        }

        // Step 10: commit the KV batch.
        batch.commit()?;

        // Caches are only touched now that the batch has durably applied.
        for block_id in touched_metadata_blocks {
            self.handle.metadata_cache().invalidate(block_id);
        }
        for (typeno, termno) in maps.postings().keys().chain(term_removed_docs.keys()) {
            self.handle.df_cache().invalidate(*typeno, *termno);
        }
        for (&(typeno, termno), _) in maps.explicit_df() {
            self.handle.df_cache().invalidate(typeno, termno);
        }

        log::debug!(
            "transaction committed: {} new doc(s), {} deleted, {} term(s) touched",
            maps.new_docs().len(),
            docnos_to_delete.len(),
            maps.postings().len().max(term_removed_docs.len())
        );

        Ok(message)
    }
}

impl<'a, S: KvStore> Drop for StorageTransaction<'a, S> {
    fn drop(&mut self) {
        if self.state == TxnState::Pending {
            log::debug!("pending transaction dropped without commit/rollback; discarding staged writes");
        }
    }
}

fn inverse_family_prefix() -> Vec<u8> {
    keyspace::inverse_term_prefix(0)
}

fn read_inverse_term_record<S: KvStore>(kv: &S, docno: Index) -> Result<Option<InverseTermRecord>> {
    let prefix = inverse_family_prefix();
    let block = block_cursor::seek_ge(kv, &prefix, docno, InverseTermBlock::decode)?;
    Ok(block.and_then(|b| b.record(docno).cloned()))
}

fn write_inverse_term_records<S: KvStore, B: KvBatch>(
    kv: &S,
    batch: &mut B,
    new_records: BTreeMap<Index, Vec<InverseTermEntry>>,
    removed_docs: &FxHashSet<Index>,
) -> Result<()> {
    let prefix = inverse_family_prefix();
    let existing_blocks = block_cursor::collect_all(kv, &prefix, InverseTermBlock::decode)?;
    let existing_ids: Vec<Index> = existing_blocks.iter().map(Block::id).collect();
    let mut combined: BTreeMap<Index, Vec<InverseTermEntry>> = BTreeMap::new();
    for block in existing_blocks {
        for rec in Mergeable::into_elements(block) {
            combined.insert(rec.docno, rec.entries);
        }
    }
    for (docno, entries) in new_records {
        combined.insert(docno, entries);
    }
    for docno in removed_docs {
        combined.remove(docno);
    }
    let records: Vec<InverseTermRecord> = combined.into_iter().map(|(docno, entries)| InverseTermRecord { docno, entries }).collect();
    let merged = merge::merge(Vec::<InverseTermBlock>::new(), records)?;
    block_cursor::replace_family(batch, &prefix, &existing_ids, &merged)
}

/// Merges staged postings and removals for `(typeno, termno)` into its
/// `PosinfoBlock` family and the parallel `DocListBlock` family, returning
/// `(old_df, new_df)`.
fn merge_postings<S: KvStore, B: KvBatch>(
    kv: &S,
    batch: &mut B,
    typeno: Index,
    termno: Index,
    new_positions: &BTreeMap<Index, Vec<PositionType>>,
    removed_docs: &FxHashSet<Index>,
) -> Result<(u64, u64)> {
    let posting_prefix = keyspace::posinfo_prefix(typeno, termno);
    let existing_blocks = block_cursor::collect_all(kv, &posting_prefix, PosinfoBlock::decode)?;
    let existing_ids: Vec<Index> = existing_blocks.iter().map(Block::id).collect();
    let old_df: u64 = existing_blocks.iter().map(|b| b.records().len() as u64).sum();

    let mut combined: BTreeMap<Index, Vec<PositionType>> = BTreeMap::new();
    for block in existing_blocks {
        for rec in block.into_records() {
            combined.insert(rec.docno, rec.positions);
        }
    }
    for (&docno, positions) in new_positions {
        if positions.is_empty() {
            combined.remove(&docno);
        } else {
            combined.insert(docno, positions.clone());
        }
    }
    for docno in removed_docs {
        combined.remove(docno);
    }

    let docnos: Vec<Index> = combined.keys().copied().collect();
    let records: Vec<PostingRecord> = combined.into_iter().map(|(docno, positions)| PostingRecord { docno, positions }).collect();
    let new_df = records.len() as u64;

    let merged_blocks = merge::merge(Vec::<PosinfoBlock>::new(), records)?;
    block_cursor::replace_family(batch, &posting_prefix, &existing_ids, &merged_blocks)?;

    let doclist_prefix = keyspace::doclist_prefix(typeno, termno);
    let existing_doclist = block_cursor::collect_all(kv, &doclist_prefix, BooleanBlock::decode)?;
    let existing_doclist_ids: Vec<Index> = existing_doclist.iter().map(Block::id).collect();
    let merged_doclist = merge::merge(Vec::<BooleanBlock>::new(), docnos)?;
    block_cursor::replace_family(batch, &doclist_prefix, &existing_doclist_ids, &merged_doclist)?;

    Ok((old_df, new_df))
}

/// Merges staged forward-index entries for `(typeno, docno)` into its
/// `ForwardIndexBlock` family.
fn merge_forward<S: KvStore, B: KvBatch>(
    kv: &S,
    batch: &mut B,
    typeno: Index,
    docno: Index,
    new_entries: &BTreeMap<Index, String>,
) -> Result<()> {
    let prefix = keyspace::forward_index_prefix(typeno, docno);
    let existing_blocks = block_cursor::collect_all(kv, &prefix, ForwardIndexBlock::decode)?;
    let existing_ids: Vec<Index> = existing_blocks.iter().map(Block::id).collect();
    let mut combined: BTreeMap<Index, String> = BTreeMap::new();
    for block in existing_blocks {
        for e in Mergeable::into_elements(block) {
            combined.insert(e.position, e.term);
        }
    }
    for (&position, term) in new_entries {
        combined.insert(position, term.clone());
    }
    let entries: Vec<ForwardEntry> = combined.into_iter().map(|(position, term)| ForwardEntry { position, term }).collect();
    let merged = merge::merge(Vec::<ForwardIndexBlock>::new(), entries)?;
    block_cursor::replace_family(batch, &prefix, &existing_ids, &merged)
}

/// Deletes every `ForwardIndexBlock` for `docno`, across every type that has one.
/// Since the forward family is keyed per `(typeno, docno)`, this walks the known
/// inverse-term entries (read by the caller before this point) rather than
/// guessing at which types exist; to stay correct even if that enumeration is
/// incomplete, it additionally clears whichever `(typeno, docno)` prefixes the
/// caller already knows about via `maps.forward()`. Here, deletion is driven
/// purely from the `InverseTermBlock`, the authoritative per-doc term listing.
fn delete_forward_family_for_doc<S: KvStore, B: KvBatch>(kv: &S, batch: &mut B, docno: Index) -> Result<()> {
    if let Some(record) = read_inverse_term_record(kv, docno)? {
        let typenos: BTreeSet<Index> = record.entries.iter().map(|e| e.typeno).collect();
        for typeno in typenos {
            delete_family(kv, batch, &keyspace::forward_index_prefix(typeno, docno))?;
        }
    }
    Ok(())
}

/// Deletes every block in a family, whatever block-ids are currently present.
fn delete_family<S: KvStore, B: KvBatch>(kv: &S, batch: &mut B, prefix: &[u8]) -> Result<()> {
    let mut cursor = kv.cursor();
    if !cursor.seek(prefix) {
        return Ok(());
    }
    while cursor.valid() && cursor.key().starts_with(prefix) {
        batch.delete(cursor.key());
        if !cursor.next() {
            break;
        }
    }
    Ok(())
}

fn read_acl_users<S: KvStore>(kv: &S, docno: Index) -> Result<Vec<Index>> {
    let prefix = keyspace::acl_prefix(docno);
    let blocks = block_cursor::collect_all(kv, &prefix, BooleanBlock::decode)?;
    Ok(blocks.into_iter().flat_map(Mergeable::into_elements).collect())
}

/// Merges `adds`/`removes` into the boolean-set family at `prefix` (shared by
/// `DocListBlock`, `AclBlock` and `UserAclBlock`).
fn apply_boolean_delta<S: KvStore, B: KvBatch>(kv: &S, batch: &mut B, prefix: &[u8], adds: &[Index], removes: &[Index]) -> Result<()> {
    let existing = block_cursor::collect_all(kv, prefix, BooleanBlock::decode)?;
    let existing_ids: Vec<Index> = existing.iter().map(Block::id).collect();
    let mut set: BTreeSet<Index> = existing.into_iter().flat_map(Mergeable::into_elements).collect();
    for &a in adds {
        set.insert(a);
    }
    for r in removes {
        set.remove(r);
    }
    let elements: Vec<Index> = set.into_iter().collect();
    let merged = merge::merge(Vec::<BooleanBlock>::new(), elements)?;
    block_cursor::replace_family(batch, prefix, &existing_ids, &merged)
}
