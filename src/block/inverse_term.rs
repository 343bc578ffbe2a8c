// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `InverseTermBlock`: per-document concatenation of `(typeno, termno, ff,
//! firstpos)` tuples — the reverse lookup from a document to every term
//! occurring in it, used to delete a document's postings without re-scanning
//! the forward index.

use super::merge::Mergeable;
use super::Block;
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::error::{Error, Result};
use crate::keys::Index;
use crate::varint;
use std::io::{Read, Write};

/// One `(typeno, termno, ff, firstpos)` tuple describing a term's occurrence in a
/// single document.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InverseTermEntry {
    /// Feature type number.
    pub typeno: Index,
    /// Term value number.
    pub termno: Index,
    /// Feature frequency in the document.
    pub ff: u32,
    /// First occurrence position in the document.
    pub firstpos: Index,
}

/// One document's worth of inverse-term entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InverseTermRecord {
    /// Document number.
    pub docno: Index,
    /// Entries for this document, in insertion order.
    pub entries: Vec<InverseTermEntry>,
}

/// A block of per-document inverse-term records, keyed by the largest docno it
/// contains.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct InverseTermBlock {
    id: Index,
    records: Vec<InverseTermRecord>,
}

impl InverseTermBlock {
    /// Builds a block from records sorted ascending by docno.
    pub fn from_records(records: Vec<InverseTermRecord>) -> Result<Self> {
        for w in records.windows(2) {
            if w[0].docno >= w[1].docno {
                return Err(Error::CorruptData("InverseTermBlock: docnos not strictly ascending"));
            }
        }
        let id = records.last().map(|r| r.docno).unwrap_or(0);
        Ok(Self { id, records })
    }

    /// The records held by this block.
    #[must_use]
    pub fn records(&self) -> &[InverseTermRecord] {
        &self.records
    }

    /// The record for `docno`, if this block holds one.
    #[must_use]
    pub fn record(&self, docno: Index) -> Option<&InverseTermRecord> {
        self.records.iter().find(|r| r.docno == docno)
    }
}

impl Block for InverseTermBlock {
    fn id(&self) -> Index {
        self.id
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn approx_encoded_len(&self) -> usize {
        self.records.iter().map(|r| 4 + r.entries.len() * 16).sum()
    }
}

impl Encode for InverseTermBlock {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        let mut buf = Vec::new();
        varint::pack_into(self.records.len() as u64, &mut buf);
        for r in &self.records {
            let relative_docno = u64::from(self.id - r.docno);
            varint::pack_into(relative_docno, &mut buf);
            varint::pack_into(r.entries.len() as u64, &mut buf);
            for e in &r.entries {
                varint::pack_into(u64::from(e.typeno), &mut buf);
                varint::pack_into(u64::from(e.termno), &mut buf);
                varint::pack_into(u64::from(e.ff), &mut buf);
                varint::pack_into(u64::from(e.firstpos), &mut buf);
            }
        }
        writer.write_all(&buf)?;
        Ok(())
    }
}

impl InverseTermBlock {
    /// Decodes a block given the id stored in its `KvStore` key and its value bytes.
    pub fn decode(id: Index, buf: &[u8]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(buf);
        let nof_records = varint::unpack_from(&mut cursor)? as usize;
        let mut records = Vec::with_capacity(nof_records);
        for _ in 0..nof_records {
            let relative_docno = varint::unpack_from(&mut cursor)?;
            let docno = id
                .checked_sub(relative_docno as Index)
                .ok_or(DecodeError::InvalidTag(("InverseTermBlock relative_docno", relative_docno)))?;
            let nof_entries = varint::unpack_from(&mut cursor)? as usize;
            let mut entries = Vec::with_capacity(nof_entries);
            for _ in 0..nof_entries {
                let typeno = varint::unpack_from(&mut cursor)? as Index;
                let termno = varint::unpack_from(&mut cursor)? as Index;
                let ff = varint::unpack_from(&mut cursor)? as u32;
                let firstpos = varint::unpack_from(&mut cursor)? as Index;
                entries.push(InverseTermEntry { typeno, termno, ff, firstpos });
            }
            records.push(InverseTermRecord { docno, entries });
        }
        Ok(Self { id, records })
    }
}

impl Decode for InverseTermBlock {
    fn decode_from<R: Read>(_reader: &mut R) -> std::result::Result<Self, DecodeError> {
        Err(DecodeError::InvalidHeader(
            "InverseTermBlock::decode_from requires the block id from the KvStore key; use InverseTermBlock::decode",
        ))
    }
}

impl Mergeable for InverseTermBlock {
    type Element = InverseTermRecord;

    fn element_id(element: &Self::Element) -> Index {
        element.docno
    }

    fn element_len(element: &Self::Element) -> usize {
        4 + element.entries.len() * 16
    }

    fn from_elements(elements: Vec<Self::Element>) -> Result<Self> {
        InverseTermBlock::from_records(elements)
    }

    fn into_elements(self) -> Vec<Self::Element> {
        self.records
    }
}
