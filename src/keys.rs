// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `KvStore` key space: the 32-bit `Index`/64-bit `GlobalCounter` id types, the
//! single-byte prefix tags and the packed-key builders/parsers used by every
//! durable entity named in the data model.
//!
//! Every multi-component key is `prefix_byte ++ varint(c1) ++ varint(c2) ++ ...`.
//! [`crate::varint`] is order-preserving (see its module docs), so a concatenation of
//! varints sorts the same way the component tuple does: this is what lets
//! [`crate::store::block_cursor::BlockCursor`] do `seek(block-id >= target)` range
//! scans directly against the backing `KvStore`.

use crate::coding::DecodeError;
use crate::varint;
use std::fmt;

/// A 32-bit positive identifier: typeno, termno, docno, userno, attribno, block-id.
/// `0` is reserved to mean "none"/"unknown".
pub type Index = u32;

/// `Index` value reserved to mean "no document"/"unset".
pub const NONE: Index = 0;

/// Provisional ids allocated within a pending transaction start above this value, so
/// they can never collide with a permanently committed id (permanent ids are assigned
/// from a monotonically increasing counter starting at 1, and are rewritten to replace
/// provisional ids at commit time — see [`crate::store::dictionary`]).
pub const UNKNOWN_VALUE_HANDLE_START: Index = 1 << 30;

/// A 64-bit monotonically increasing counter (document-frequency values, the global
/// id allocator).
pub type GlobalCounter = u64;

/// Single-byte key-space prefix tags (`KvStore` key's first byte).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum KeyPrefix {
    /// `(TermTypePrefix, lowercase-name) -> typeno`
    TermType = 1,
    /// `(TermValuePrefix, name) -> termno`
    TermValue = 2,
    /// `(DocIdPrefix, docid) -> docno`
    DocId = 3,
    /// `(ForwardIndexPrefix, typeno, docno, block-id) -> forward block`
    ForwardIndex = 4,
    /// `(VariablePrefix, name) -> packed Index`
    Variable = 5,
    /// `(DocMetaDataPrefix, block-id) -> metadata block`
    DocMetaData = 6,
    /// `(DocAttributePrefix, docno, attribno) -> string`
    DocAttribute = 7,
    /// `(UserNamePrefix, username) -> userno`
    UserName = 8,
    /// `(DocFrequencyPrefix, typeno, termno) -> packed GlobalCounter`
    DocFrequency = 9,
    /// `(PosinfoBlockPrefix, typeno, termno, block-id) -> posting block`
    PosinfoBlock = 10,
    /// `(InverseTermPrefix, docno) -> serialized `(typeno,termno,ff,firstpos)` list`
    InverseTerm = 11,
    /// `(UserAclBlockPrefix, userno, block-id) -> boolean set block of docs`
    UserAclBlock = 12,
    /// `(AclBlockPrefix, docno, block-id) -> boolean set block of users`
    AclBlock = 13,
    /// `(DocListBlockPrefix, typeno, termno, block-id) -> boolean set block`
    DocListBlock = 14,
    /// `(MetaDataDescrPrefix,) -> serialized schema`
    MetaDataDescr = 15,
    /// `(AttributeKeyPrefix, lowercase-name) -> attribno`
    AttributeKey = 16,
    /// `(TermTypeInvPrefix, typeno) -> name`
    TermTypeInv = 17,
    /// `(TermValueInvPrefix, termno) -> name`
    TermValueInv = 18,
}

impl TryFrom<u8> for KeyPrefix {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        Ok(match value {
            1 => Self::TermType,
            2 => Self::TermValue,
            3 => Self::DocId,
            4 => Self::ForwardIndex,
            5 => Self::Variable,
            6 => Self::DocMetaData,
            7 => Self::DocAttribute,
            8 => Self::UserName,
            9 => Self::DocFrequency,
            10 => Self::PosinfoBlock,
            11 => Self::InverseTerm,
            12 => Self::UserAclBlock,
            13 => Self::AclBlock,
            14 => Self::DocListBlock,
            15 => Self::MetaDataDescr,
            16 => Self::AttributeKey,
            17 => Self::TermTypeInv,
            18 => Self::TermValueInv,
            _ => return Err(DecodeError::InvalidTag(("KeyPrefix", u64::from(value)))),
        })
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Names of the counters held in the `Variable` key family.
pub mod variable_names {
    pub const TERM_NO: &str = "TermNo";
    pub const TYPE_NO: &str = "TypeNo";
    pub const DOC_NO: &str = "DocNo";
    pub const USER_NO: &str = "UserNo";
    pub const ATTRIB_NO: &str = "AttribNo";
    pub const NOF_DOCS: &str = "NofDocs";
}

/// Builds a key from a prefix tag and a sequence of order-preserving integer
/// components (e.g. `(PosinfoBlockPrefix, typeno, termno, block-id)`).
#[must_use]
pub fn pack_key(prefix: KeyPrefix, components: &[Index]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + components.len() * 2);
    out.push(prefix as u8);
    for &c in components {
        varint::pack_into(u64::from(c), &mut out);
    }
    out
}

/// Builds a key from a prefix tag and a string component (dictionary lookups).
#[must_use]
pub fn pack_name_key(prefix: KeyPrefix, name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + name.len());
    out.push(prefix as u8);
    out.extend_from_slice(name.as_bytes());
    out
}

/// Parses the leading prefix tag off a raw `KvStore` key.
pub fn parse_prefix(key: &[u8]) -> Result<KeyPrefix, DecodeError> {
    let &tag = key.first().ok_or(DecodeError::InvalidHeader("empty key"))?;
    KeyPrefix::try_from(tag)
}

/// Parses the integer components following the prefix byte of a key built with
/// [`pack_key`].
pub fn parse_components(key: &[u8], count: usize) -> Result<Vec<Index>, DecodeError> {
    let mut rest = &key[1..];
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let (v, consumed) = varint::unpack(rest)?;
        out.push(v as Index);
        rest = &rest[consumed..];
    }
    Ok(out)
}

/// Encodes a [`GlobalCounter`] value stored as a `Variable`/`DocFrequency` value.
#[must_use]
pub fn pack_counter(v: GlobalCounter) -> Vec<u8> {
    varint::pack(v)
}

/// Decodes a [`GlobalCounter`] value previously encoded with [`pack_counter`].
pub fn unpack_counter(buf: &[u8]) -> Result<GlobalCounter, DecodeError> {
    let (v, _) = varint::unpack(buf)?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ordering_matches_component_tuple_ordering() {
        let a = pack_key(KeyPrefix::PosinfoBlock, &[1, 1, 50]);
        let b = pack_key(KeyPrefix::PosinfoBlock, &[1, 1, 4000]);
        let c = pack_key(KeyPrefix::PosinfoBlock, &[1, 2, 1]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn round_trips_components() {
        let key = pack_key(KeyPrefix::ForwardIndex, &[7, 1234, 999_999]);
        assert_eq!(parse_prefix(&key).unwrap(), KeyPrefix::ForwardIndex);
        assert_eq!(parse_components(&key, 3).unwrap(), vec![7, 1234, 999_999]);
    }
}
