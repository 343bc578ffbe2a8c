// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `PosinfoBlock`: `(docno -> position-list)` pairs for a fixed `(typeno, termno)`.

use super::merge::Mergeable;
use super::{Block, DOC_INDEX_NODE_SIZE, END_POSINFO_MARKER};
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::error::{Error, Result};
use crate::keys::Index;
use crate::varint;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Position type on the wire: absolute 16-bit offsets, per the documented 65535
/// maximum position per document.
pub type PositionType = u16;

/// The maximum position a document's term occurrence may be recorded at.
pub const MAX_POSITION: PositionType = PositionType::MAX;

/// One `(docno, positions)` posting record. `positions` is strictly ascending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostingRecord {
    /// Document number.
    pub docno: Index,
    /// Ascending term occurrence positions within the document.
    pub positions: Vec<PositionType>,
}

impl PostingRecord {
    /// Feature frequency: number of occurrences in the document.
    #[must_use]
    pub fn frequency(&self) -> usize {
        self.positions.len()
    }
}

/// A lookup-acceleration entry covering up to [`DOC_INDEX_NODE_SIZE`] consecutive
/// documents: the docno of the first one, and the byte offset of each record (within
/// the block's record area) that the group covers. `u16::MAX` marks an absent slot in
/// a group's tail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocIndexNode {
    /// Docno of the first record this node covers.
    pub base: Index,
    /// Byte offsets of up to [`DOC_INDEX_NODE_SIZE`] records, relative to the start of
    /// the record area. `u16::MAX` marks an unused trailing slot.
    pub offsets: [u16; DOC_INDEX_NODE_SIZE],
}

/// A block of term occurrence positions, keyed by the largest docno it contains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PosinfoBlock {
    id: Index,
    /// Ascending by docno; invariant maintained by every constructor/mutator.
    records: Vec<PostingRecord>,
    doc_index: Vec<DocIndexNode>,
}

impl PosinfoBlock {
    /// Builds a block from records sorted ascending by docno. The block id is the
    /// last record's docno.
    pub fn from_records(records: Vec<PostingRecord>) -> Result<Self> {
        for w in records.windows(2) {
            if w[0].docno >= w[1].docno {
                return Err(Error::CorruptData("PosinfoBlock: docnos not strictly ascending"));
            }
        }
        for r in &records {
            for w in r.positions.windows(2) {
                if w[0] >= w[1] {
                    return Err(Error::CorruptData("PosinfoBlock: positions not strictly ascending"));
                }
            }
        }
        let id = records.last().map(|r| r.docno).unwrap_or(0);
        let doc_index = build_doc_index(&records);
        Ok(Self { id, records, doc_index })
    }

    /// The records held by this block, ascending by docno.
    #[must_use]
    pub fn records(&self) -> &[PostingRecord] {
        &self.records
    }

    /// Consumes the block, returning its records.
    #[must_use]
    pub fn into_records(self) -> Vec<PostingRecord> {
        self.records
    }

    /// First docno `>= docno` that has a posting in this block, or `0`.
    #[must_use]
    pub fn skip_doc(&self, docno: Index) -> Index {
        self.find(docno).map(|r| self.records[r].docno).unwrap_or(0)
    }

    /// The record for `skip_doc(docno)`, if any.
    #[must_use]
    pub fn record_at_or_after(&self, docno: Index) -> Option<&PostingRecord> {
        self.find(docno).map(|i| &self.records[i])
    }

    /// Finds the index of the first record with `docno >= target`, using the
    /// doc-index nodes to skip groups before falling back to a linear scan of at most
    /// [`DOC_INDEX_NODE_SIZE`] records.
    fn find(&self, target: Index) -> Option<usize> {
        if self.records.is_empty() {
            return None;
        }
        // Binary search over node bases for the last node with base <= target.
        let node_idx = match self.doc_index.binary_search_by(|n| n.base.cmp(&target)) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        };
        let start = node_idx * super::DOC_INDEX_NODE_SIZE;
        for i in start..self.records.len() {
            if self.records[i].docno >= target {
                return Some(i);
            }
        }
        None
    }

    /// Whether `docno` could plausibly be addressed by the *next* block rather than
    /// this one (cheap heuristic used to decide between a near-hit probe and a
    /// random seek in the term iterator).
    #[must_use]
    pub fn is_follow_block_candidate(&self, docno: Index) -> bool {
        if docno <= self.id {
            return false;
        }
        let typical_span = if self.records.len() > 1 {
            self.id - self.records[0].docno
        } else {
            1
        }
        .max(1);
        docno < self.id + typical_span - (typical_span >> 4)
    }
}

impl Block for PosinfoBlock {
    fn id(&self) -> Index {
        self.id
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn approx_encoded_len(&self) -> usize {
        self.records
            .iter()
            .map(|r| 2 + r.positions.len() * 2 + 4)
            .sum::<usize>()
            + self.doc_index.len() * (2 + DOC_INDEX_NODE_SIZE * 2)
            + 8
    }
}

/// Builds the in-memory doc-index used by [`PosinfoBlock::find`], which only needs
/// each group's `base` docno (byte offsets matter solely for the encoded form and are
/// recomputed exactly in [`PosinfoBlock::encode_body`]).
fn build_doc_index(records: &[PostingRecord]) -> Vec<DocIndexNode> {
    records
        .chunks(DOC_INDEX_NODE_SIZE)
        .map(|chunk| DocIndexNode { base: chunk[0].docno, offsets: [u16::MAX; DOC_INDEX_NODE_SIZE] })
        .collect()
}

impl Encode for PosinfoBlock {
    // NOTE: the doc-index header needs byte offsets into a record area that's only
    // known once encoded, so this builds through an intermediate buffer rather than
    // streaming directly to `writer`.
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        writer.write_all(&self.encode_body())?;
        Ok(())
    }
}

impl PosinfoBlock {
    fn encode_body(&self) -> Vec<u8> {
        // Record area first, so offsets recorded in the doc-index are exact.
        let mut record_area = Vec::new();
        let mut real_offsets: Vec<u16> = Vec::with_capacity(self.records.len());
        for r in &self.records {
            real_offsets.push(u16::try_from(record_area.len()).unwrap_or(u16::MAX));
            let relative_docno = u64::from(self.id - r.docno);
            varint::pack_into(relative_docno, &mut record_area);
            varint::pack_into(r.positions.len() as u64, &mut record_area);
            for &p in &r.positions {
                record_area.write_u16::<BigEndian>(p).expect("Vec write cannot fail");
            }
        }
        record_area.push(END_POSINFO_MARKER);

        let mut nodes: Vec<DocIndexNode> = Vec::new();
        for (chunk_idx, chunk) in self.records.chunks(super::DOC_INDEX_NODE_SIZE).enumerate() {
            let mut offsets = [u16::MAX; super::DOC_INDEX_NODE_SIZE];
            for i in 0..chunk.len() {
                offsets[i] = real_offsets[chunk_idx * super::DOC_INDEX_NODE_SIZE + i];
            }
            nodes.push(DocIndexNode { base: chunk[0].docno, offsets });
        }

        let mut out = Vec::new();
        varint::pack_into(nodes.len() as u64, &mut out);
        for n in &nodes {
            varint::pack_into(u64::from(n.base), &mut out);
            for &o in &n.offsets {
                out.write_u16::<BigEndian>(o).expect("Vec write cannot fail");
            }
        }
        varint::pack_into(record_area.len() as u64, &mut out);
        out.extend_from_slice(&record_area);
        out
    }

    /// Decodes a block given the id stored in its `KvStore` key and its value bytes.
    pub fn decode(id: Index, buf: &[u8]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(buf);
        let nof_nodes = varint::unpack_from(&mut cursor)? as usize;
        let mut doc_index = Vec::with_capacity(nof_nodes);
        for _ in 0..nof_nodes {
            let base = varint::unpack_from(&mut cursor)? as Index;
            let mut offsets = [0u16; super::DOC_INDEX_NODE_SIZE];
            for o in &mut offsets {
                *o = cursor.read_u16::<BigEndian>()?;
            }
            doc_index.push(DocIndexNode { base, offsets });
        }
        let record_area_len = varint::unpack_from(&mut cursor)? as usize;
        let start = cursor.position() as usize;
        let record_area = &buf[start..start + record_area_len];

        let mut records = Vec::new();
        let mut rest = record_area;
        while let Some(&lead) = rest.first() {
            if lead == super::END_POSINFO_MARKER {
                break;
            }
            let (relative_docno, n1) = varint::unpack(rest)?;
            rest = &rest[n1..];
            let (ff, n2) = varint::unpack(rest)?;
            rest = &rest[n2..];
            let mut positions = Vec::with_capacity(ff as usize);
            for _ in 0..ff {
                let mut b = [0u8; 2];
                b.copy_from_slice(&rest[..2]);
                positions.push(u16::from_be_bytes(b));
                rest = &rest[2..];
            }
            let docno = id
                .checked_sub(relative_docno as Index)
                .ok_or(DecodeError::InvalidTag(("PosinfoBlock relative_docno", relative_docno)))?;
            records.push(PostingRecord { docno, positions });
        }

        Ok(Self { id, records, doc_index })
    }
}

impl Decode for PosinfoBlock {
    fn decode_from<R: Read>(_reader: &mut R) -> std::result::Result<Self, DecodeError> {
        Err(DecodeError::InvalidHeader(
            "PosinfoBlock::decode_from requires the block id from the KvStore key; use PosinfoBlock::decode",
        ))
    }
}

impl Mergeable for PosinfoBlock {
    type Element = PostingRecord;

    fn element_id(element: &Self::Element) -> Index {
        element.docno
    }

    fn element_len(element: &Self::Element) -> usize {
        4 + element.positions.len() * 2
    }

    fn from_elements(elements: Vec<Self::Element>) -> Result<Self> {
        PosinfoBlock::from_records(elements)
    }

    fn into_elements(self) -> Vec<Self::Element> {
        self.into_records()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(docno: Index, positions: &[u16]) -> PostingRecord {
        PostingRecord { docno, positions: positions.to_vec() }
    }

    #[test]
    fn round_trips_through_bytes() {
        let block = PosinfoBlock::from_records(vec![
            rec(1, &[1, 4]),
            rec(2, &[2]),
            rec(10, &[1, 2, 3]),
        ])
        .unwrap();
        assert_eq!(block.id(), 10);

        let bytes = block.encode_body();
        let decoded = PosinfoBlock::decode(10, &bytes).unwrap();
        assert_eq!(decoded.records(), block.records());
    }

    #[test]
    fn skip_doc_is_monotonic_and_exact() {
        let block = PosinfoBlock::from_records(vec![rec(1, &[1]), rec(5, &[2]), rec(9, &[3])]).unwrap();
        assert_eq!(block.skip_doc(0), 1);
        assert_eq!(block.skip_doc(2), 5);
        assert_eq!(block.skip_doc(9), 9);
        assert_eq!(block.skip_doc(10), 0);
    }

    #[test]
    fn rejects_non_ascending_docnos() {
        let err = PosinfoBlock::from_records(vec![rec(5, &[1]), rec(3, &[1])]);
        assert!(err.is_err());
    }

    #[test]
    fn doc_index_spans_groups_of_seven() {
        let records: Vec<_> = (1..=20u32).map(|d| rec(d, &[1])).collect();
        let block = PosinfoBlock::from_records(records).unwrap();
        let bytes = block.encode_body();
        let decoded = PosinfoBlock::decode(20, &bytes).unwrap();
        assert_eq!(decoded.doc_index.len(), 3); // ceil(20/7)
        assert_eq!(decoded.skip_doc(15), 15);
    }
}
