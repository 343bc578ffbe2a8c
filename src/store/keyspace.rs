// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Typed key builders for every entity in the data model. Each function returns the
//! full `KvStore` key except for the block-keyed families, which return the key
//! *prefix* shared by every block in that family — [`super::block_cursor::BlockCursor`]
//! appends the trailing block-id component itself.

use crate::keys::{pack_key, pack_name_key, Index, KeyPrefix};

/// `(typeno, docno)` key prefix for a document's `ForwardIndexBlock` family.
#[must_use]
pub fn forward_index_prefix(typeno: Index, docno: Index) -> Vec<u8> {
    pack_key(KeyPrefix::ForwardIndex, &[typeno, docno])
}

/// `(typeno, termno)` key prefix for a term's `PosinfoBlock` family.
#[must_use]
pub fn posinfo_prefix(typeno: Index, termno: Index) -> Vec<u8> {
    pack_key(KeyPrefix::PosinfoBlock, &[typeno, termno])
}

/// `(typeno, termno)` key prefix for a term's `DocListBlock` family.
#[must_use]
pub fn doclist_prefix(typeno: Index, termno: Index) -> Vec<u8> {
    pack_key(KeyPrefix::DocListBlock, &[typeno, termno])
}

/// `(docno,)` key prefix for a document's `InverseTermBlock` family.
#[must_use]
pub fn inverse_term_prefix(docno_bucket: Index) -> Vec<u8> {
    pack_key(KeyPrefix::InverseTerm, &[docno_bucket])
}

/// `(userno,)` key prefix for a user's `UserAclBlock` family.
#[must_use]
pub fn user_acl_prefix(userno: Index) -> Vec<u8> {
    pack_key(KeyPrefix::UserAclBlock, &[userno])
}

/// `(docno,)` key prefix for a document's `AclBlock` family.
#[must_use]
pub fn acl_prefix(docno: Index) -> Vec<u8> {
    pack_key(KeyPrefix::AclBlock, &[docno])
}

/// Key prefix for the `MetaDataBlock` family (not namespaced beyond the tag: all
/// documents share one metadata table).
#[must_use]
pub fn metadata_prefix() -> Vec<u8> {
    vec![KeyPrefix::DocMetaData as u8]
}

/// Key for the metadata schema record.
#[must_use]
pub fn metadata_description_key() -> Vec<u8> {
    vec![KeyPrefix::MetaDataDescr as u8]
}

/// Key for a term type's dictionary entry, `name -> typeno`.
#[must_use]
pub fn term_type_key(name: &str) -> Vec<u8> {
    pack_name_key(KeyPrefix::TermType, name)
}

/// Key for a term value's dictionary entry, `name -> termno`.
#[must_use]
pub fn term_value_key(name: &str) -> Vec<u8> {
    pack_name_key(KeyPrefix::TermValue, name)
}

/// Key for the inverse term-type dictionary entry, `typeno -> name`.
#[must_use]
pub fn term_type_inv_key(typeno: Index) -> Vec<u8> {
    pack_key(KeyPrefix::TermTypeInv, &[typeno])
}

/// Key for the inverse term-value dictionary entry, `termno -> name`.
#[must_use]
pub fn term_value_inv_key(termno: Index) -> Vec<u8> {
    pack_key(KeyPrefix::TermValueInv, &[termno])
}

/// Key for a document id's dictionary entry, `docid -> docno`.
#[must_use]
pub fn doc_id_key(docid: &str) -> Vec<u8> {
    pack_name_key(KeyPrefix::DocId, docid)
}

/// Key for a user name's dictionary entry, `name -> userno`.
#[must_use]
pub fn user_name_key(name: &str) -> Vec<u8> {
    pack_name_key(KeyPrefix::UserName, name)
}

/// Key for an attribute name's dictionary entry, `name -> attribno`.
#[must_use]
pub fn attribute_key_key(name: &str) -> Vec<u8> {
    pack_name_key(KeyPrefix::AttributeKey, name)
}

/// Key for a document attribute value, `(docno, attribno) -> string`.
#[must_use]
pub fn doc_attribute_key(docno: Index, attribno: Index) -> Vec<u8> {
    pack_key(KeyPrefix::DocAttribute, &[docno, attribno])
}

/// Key for a named global counter/variable.
#[must_use]
pub fn variable_key(name: &str) -> Vec<u8> {
    pack_name_key(KeyPrefix::Variable, name)
}

/// Key for a term's document-frequency record, `(typeno, termno) -> df`.
#[must_use]
pub fn doc_frequency_key(typeno: Index, termno: Index) -> Vec<u8> {
    pack_key(KeyPrefix::DocFrequency, &[typeno, termno])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_prefixes_are_distinguishable_from_name_keys() {
        let prefix = posinfo_prefix(1, 2);
        let name = term_value_key("hello");
        assert_ne!(prefix[0], name[0]);
    }
}
