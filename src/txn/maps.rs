// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `TransactionMaps`: the per-transaction staging area. Every mutating operation
//! a caller performs against a pending transaction lands here
//! first, keyed by whatever ids are known at the time — which may be provisional
//! ([`crate::store::dictionary::ProvisionalAllocator`]) if the transaction is the
//! one introducing a new type, term, document, user or attribute name. The commit
//! pipeline (`crate::txn::pipeline`) rewrites every provisional id to a permanent
//! one before any of this reaches the `KvStore`.

use crate::block::posting::PositionType;
use crate::keys::Index;
use crate::store::dictionary::ProvisionalAllocator;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// One document's staged insertion: positions are accumulated per `(typeno,
/// termno)` and flushed as a whole at commit.
#[derive(Default, Clone)]
pub struct TransactionMaps {
    /// Dictionary allocators for the four id spaces a transaction may extend, plus
    /// attribute names.
    pub term_types: ProvisionalAllocator,
    pub term_values: ProvisionalAllocator,
    pub doc_ids: ProvisionalAllocator,
    pub user_names: ProvisionalAllocator,
    pub attribute_keys: ProvisionalAllocator,

    /// `(typeno, termno) -> (docno -> positions)`. Ascending `BTreeMap` keys keep
    /// the per-term posting staged in docno order, matching what the block merge
    /// pass expects.
    postings: FxHashMap<(Index, Index), BTreeMap<Index, Vec<PositionType>>>,

    /// `(typeno, docno) -> (position -> term string)`.
    forward: FxHashMap<(Index, Index), BTreeMap<Index, String>>,

    /// `(docno, attribno) -> Some(value)` to set, `None` to delete.
    attributes: FxHashMap<(Index, Index), Option<String>>,

    /// `(docno, field name) -> value`.
    metadata: FxHashMap<(Index, String), f64>,

    /// `docno -> usernos` granted access.
    acl_grants: FxHashMap<Index, Vec<Index>>,
    /// `docno -> usernos` revoked access.
    acl_revokes: FxHashMap<Index, Vec<Index>>,

    /// `(typeno, termno) -> signed delta`, distinct from the implicit df changes
    /// the commit pipeline derives from posting inserts/deletes.
    explicit_df: FxHashMap<(Index, Index), i64>,

    /// `(docno, docid)` pairs scheduled for full deletion. The docid string is
    /// carried alongside the docno because removing the `DocId` dictionary entry
    /// needs the original name, which nothing else in the staged maps retains.
    deletes: Vec<(Index, String)>,
    /// `(docno, typeno)` scheduled for single-type deletion
    /// (`deleteDocSearchIndexType`).
    partial_deletes: Vec<(Index, Index)>,

    /// Docnos newly inserted by this transaction (for the `NofDocs` adjustment).
    new_docs: Vec<Index>,
}

impl TransactionMaps {
    /// Creates an empty staging area.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `docno` is a fresh document introduced by this transaction.
    pub fn mark_new_document(&mut self, docno: Index) {
        self.new_docs.push(docno);
    }

    /// Stages a term occurrence: `typeno`/`termno` may be provisional.
    pub fn add_posting(&mut self, typeno: Index, termno: Index, docno: Index, position: PositionType) {
        self.postings
            .entry((typeno, termno))
            .or_default()
            .entry(docno)
            .or_default()
            .push(position);
        self.forward
            .entry((typeno, docno))
            .or_default()
            .insert(Index::from(position), String::new()); // term text filled by add_forward_term
    }

    /// Stages the forward-index term string for a position already staged via
    /// [`Self::add_posting`].
    pub fn add_forward_term(&mut self, typeno: Index, docno: Index, position: PositionType, term: String) {
        self.forward.entry((typeno, docno)).or_default().insert(Index::from(position), term);
    }

    /// Stages an attribute value (or `None` to delete it at commit).
    pub fn set_attribute(&mut self, docno: Index, attribno: Index, value: Option<String>) {
        self.attributes.insert((docno, attribno), value);
    }

    /// Stages a metadata column write.
    pub fn set_metadata(&mut self, docno: Index, field: &str, value: f64) {
        self.metadata.insert((docno, field.to_owned()), value);
    }

    /// Stages an ACL grant.
    pub fn grant_acl(&mut self, docno: Index, userno: Index) {
        self.acl_grants.entry(docno).or_default().push(userno);
    }

    /// Stages an ACL revocation.
    pub fn revoke_acl(&mut self, docno: Index, userno: Index) {
        self.acl_revokes.entry(docno).or_default().push(userno);
    }

    /// Stages an explicit document-frequency adjustment, independent of any
    /// postings staged in the same transaction.
    pub fn adjust_df(&mut self, typeno: Index, termno: Index, delta: i64) {
        *self.explicit_df.entry((typeno, termno)).or_insert(0) += delta;
    }

    /// Schedules full deletion of `docno`, originally known by `docid`.
    pub fn delete_document(&mut self, docno: Index, docid: &str) {
        self.deletes.push((docno, docid.to_owned()));
    }

    /// Schedules deletion of just `typeno`'s postings for `docno`
    /// (`deleteDocSearchIndexType`).
    pub fn delete_document_search_index_type(&mut self, docno: Index, typeno: Index) {
        self.partial_deletes.push((docno, typeno));
    }

    /// Whether any dictionary allocator produced provisional ids this transaction.
    #[must_use]
    pub fn needs_dictionary_rewrite(&self) -> bool {
        !self.term_types.is_empty()
            || !self.term_values.is_empty()
            || !self.doc_ids.is_empty()
            || !self.user_names.is_empty()
            || !self.attribute_keys.is_empty()
    }

    pub(crate) fn postings(&self) -> &FxHashMap<(Index, Index), BTreeMap<Index, Vec<PositionType>>> {
        &self.postings
    }

    pub(crate) fn forward(&self) -> &FxHashMap<(Index, Index), BTreeMap<Index, String>> {
        &self.forward
    }

    pub(crate) fn attributes(&self) -> &FxHashMap<(Index, Index), Option<String>> {
        &self.attributes
    }

    pub(crate) fn metadata(&self) -> &FxHashMap<(Index, String), f64> {
        &self.metadata
    }

    pub(crate) fn acl_grants(&self) -> &FxHashMap<Index, Vec<Index>> {
        &self.acl_grants
    }

    pub(crate) fn acl_revokes(&self) -> &FxHashMap<Index, Vec<Index>> {
        &self.acl_revokes
    }

    pub(crate) fn explicit_df(&self) -> &FxHashMap<(Index, Index), i64> {
        &self.explicit_df
    }

    pub(crate) fn deletes(&self) -> &[(Index, String)] {
        &self.deletes
    }

    pub(crate) fn partial_deletes(&self) -> &[(Index, Index)] {
        &self.partial_deletes
    }

    pub(crate) fn new_docs(&self) -> &[Index] {
        &self.new_docs
    }

    /// Rewrites every provisional id held anywhere in the staged maps through the
    /// given per-dictionary rewrite maps. Consumes `self` and returns a fresh
    /// `TransactionMaps` with only permanent ids.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn rewrite(
        self,
        type_map: &rustc_hash::FxHashMap<Index, Index>,
        term_map: &rustc_hash::FxHashMap<Index, Index>,
        doc_map: &rustc_hash::FxHashMap<Index, Index>,
        user_map: &rustc_hash::FxHashMap<Index, Index>,
        attrib_map: &rustc_hash::FxHashMap<Index, Index>,
    ) -> crate::error::Result<Self> {
        use crate::store::dictionary::rewrite_id;

        let mut out = Self::new();
        for ((typeno, termno), by_doc) in self.postings {
            let typeno = rewrite_id(typeno, type_map)?;
            let termno = rewrite_id(termno, term_map)?;
            let mut rewritten = BTreeMap::new();
            for (docno, positions) in by_doc {
                rewritten.insert(rewrite_id(docno, doc_map)?, positions);
            }
            out.postings.insert((typeno, termno), rewritten);
        }
        for ((typeno, docno), by_pos) in self.forward {
            let typeno = rewrite_id(typeno, type_map)?;
            let docno = rewrite_id(docno, doc_map)?;
            out.forward.insert((typeno, docno), by_pos);
        }
        for ((docno, attribno), value) in self.attributes {
            out.attributes.insert((rewrite_id(docno, doc_map)?, rewrite_id(attribno, attrib_map)?), value);
        }
        for ((docno, field), value) in self.metadata {
            out.metadata.insert((rewrite_id(docno, doc_map)?, field), value);
        }
        for (docno, users) in self.acl_grants {
            let users = users.into_iter().map(|u| rewrite_id(u, user_map)).collect::<crate::error::Result<_>>()?;
            out.acl_grants.insert(rewrite_id(docno, doc_map)?, users);
        }
        for (docno, users) in self.acl_revokes {
            let users = users.into_iter().map(|u| rewrite_id(u, user_map)).collect::<crate::error::Result<_>>()?;
            out.acl_revokes.insert(rewrite_id(docno, doc_map)?, users);
        }
        for ((typeno, termno), delta) in self.explicit_df {
            out.explicit_df.insert((rewrite_id(typeno, type_map)?, rewrite_id(termno, term_map)?), delta);
        }
        for (docno, docid) in self.deletes {
            out.deletes.push((rewrite_id(docno, doc_map)?, docid));
        }
        for (docno, typeno) in self.partial_deletes {
            out.partial_deletes.push((rewrite_id(docno, doc_map)?, rewrite_id(typeno, type_map)?));
        }
        for docno in self.new_docs {
            out.new_docs.push(rewrite_id(docno, doc_map)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_posting_and_forward_entries() {
        let mut maps = TransactionMaps::new();
        maps.add_posting(1, 10, 5, 2);
        maps.add_forward_term(1, 5, 2, "hello".into());
        assert_eq!(maps.postings().get(&(1, 10)).unwrap().get(&5).unwrap(), &vec![2]);
        assert_eq!(maps.forward().get(&(1, 5)).unwrap().get(&2).unwrap(), "hello");
    }

    #[test]
    fn rewrite_maps_provisional_ids_through_permanent_map() {
        let mut maps = TransactionMaps::new();
        let provisional_type = crate::keys::UNKNOWN_VALUE_HANDLE_START;
        let provisional_term = crate::keys::UNKNOWN_VALUE_HANDLE_START + 1;
        let provisional_doc = crate::keys::UNKNOWN_VALUE_HANDLE_START + 2;
        maps.add_posting(provisional_type, provisional_term, provisional_doc, 1);
        maps.mark_new_document(provisional_doc);

        let mut type_map = rustc_hash::FxHashMap::default();
        type_map.insert(provisional_type, 1);
        let mut term_map = rustc_hash::FxHashMap::default();
        term_map.insert(provisional_term, 7);
        let mut doc_map = rustc_hash::FxHashMap::default();
        doc_map.insert(provisional_doc, 3);

        let rewritten = maps
            .rewrite(&type_map, &term_map, &doc_map, &rustc_hash::FxHashMap::default(), &rustc_hash::FxHashMap::default())
            .unwrap();
        assert_eq!(rewritten.postings().get(&(1, 7)).unwrap().get(&3).unwrap(), &vec![1]);
        assert_eq!(rewritten.new_docs(), &[3]);
    }

    #[test]
    fn rewrite_fails_when_provisional_id_missing_from_map() {
        let mut maps = TransactionMaps::new();
        maps.delete_document(crate::keys::UNKNOWN_VALUE_HANDLE_START + 99, "doc-x");
        let empty = rustc_hash::FxHashMap::default();
        assert!(maps.rewrite(&empty, &empty, &empty, &empty, &empty).is_err());
    }
}
