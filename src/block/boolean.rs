// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `BooleanBlock`: a compressed sparse integer set encoded as an ascending list of
//! disjoint `[from, to]` ranges. Backs `DocListBlock`, `AclBlock` and `UserAclBlock`.

use super::merge::Mergeable;
use super::Block;
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::error::{Error, Result};
use crate::keys::Index;
use crate::varint;
use std::io::{Read, Write};

/// A half-open-free, inclusive `[from, to]` range of element-ids.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Range {
    /// First element-id in the range (inclusive).
    pub from: Index,
    /// Last element-id in the range (inclusive).
    pub to: Index,
}

/// A block holding a sparse set of element-ids as disjoint, ascending ranges.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BooleanBlock {
    id: Index,
    ranges: Vec<Range>,
}

impl BooleanBlock {
    /// Builds a block from an ascending, deduplicated list of element-ids.
    pub fn from_elements(elements: &[Index]) -> Result<Self> {
        for w in elements.windows(2) {
            if w[0] >= w[1] {
                return Err(Error::CorruptData("BooleanBlock: elements not strictly ascending"));
            }
        }
        let mut ranges: Vec<Range> = Vec::new();
        for &e in elements {
            match ranges.last_mut() {
                Some(r) if r.to + 1 == e => r.to = e,
                _ => ranges.push(Range { from: e, to: e }),
            }
        }
        let id = ranges.last().map(|r| r.to).unwrap_or(0);
        Ok(Self { id, ranges })
    }

    /// Builds a block directly from disjoint, ascending ranges.
    pub fn from_ranges(ranges: Vec<Range>) -> Result<Self> {
        for w in ranges.windows(2) {
            if w[0].to >= w[1].from {
                return Err(Error::CorruptData("BooleanBlock: ranges not disjoint/ascending"));
            }
        }
        let id = ranges.last().map(|r| r.to).unwrap_or(0);
        Ok(Self { id, ranges })
    }

    /// The ranges held by this block.
    #[must_use]
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Whether `element` is a member of the set.
    #[must_use]
    pub fn contains(&self, element: Index) -> bool {
        self.ranges
            .binary_search_by(|r| {
                if element < r.from {
                    std::cmp::Ordering::Greater
                } else if element > r.to {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// First element `>= target` that is a member of the set, or `0`.
    #[must_use]
    pub fn skip(&self, target: Index) -> Index {
        for r in &self.ranges {
            if r.to >= target {
                return target.max(r.from);
            }
        }
        0
    }

    /// Total number of elements represented (sum of range spans).
    #[must_use]
    pub fn count(&self) -> u64 {
        self.ranges.iter().map(|r| u64::from(r.to - r.from + 1)).sum()
    }

    /// Expands the block back into an explicit, ascending list of elements.
    #[must_use]
    pub fn to_elements(&self) -> Vec<Index> {
        self.ranges.iter().flat_map(|r| r.from..=r.to).collect()
    }
}

impl Block for BooleanBlock {
    fn id(&self) -> Index {
        self.id
    }

    fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    fn approx_encoded_len(&self) -> usize {
        self.ranges.len() * 8 + 4
    }
}

impl Encode for BooleanBlock {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        let mut buf = Vec::new();
        varint::pack_into(self.ranges.len() as u64, &mut buf);
        let mut prev_to: Index = 0;
        for (i, r) in self.ranges.iter().enumerate() {
            let from_delta = if i == 0 { r.from } else { r.from - prev_to - 1 };
            varint::pack_into(u64::from(from_delta), &mut buf);
            varint::pack_into(u64::from(r.to - r.from), &mut buf);
            prev_to = r.to;
        }
        writer.write_all(&buf)?;
        Ok(())
    }
}

impl BooleanBlock {
    /// Decodes a block given the id stored in its `KvStore` key and its value bytes.
    pub fn decode(id: Index, buf: &[u8]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(buf);
        let nof_ranges = varint::unpack_from(&mut cursor)? as usize;
        let mut ranges = Vec::with_capacity(nof_ranges);
        let mut prev_to: Index = 0;
        for i in 0..nof_ranges {
            let from_delta = varint::unpack_from(&mut cursor)? as Index;
            let span = varint::unpack_from(&mut cursor)? as Index;
            let from = if i == 0 { from_delta } else { prev_to + 1 + from_delta };
            let to = from + span;
            ranges.push(Range { from, to });
            prev_to = to;
        }
        Ok(Self { id, ranges })
    }
}

impl Decode for BooleanBlock {
    fn decode_from<R: Read>(_reader: &mut R) -> std::result::Result<Self, DecodeError> {
        Err(DecodeError::InvalidHeader(
            "BooleanBlock::decode_from requires the block id from the KvStore key; use BooleanBlock::decode",
        ))
    }
}

impl Mergeable for BooleanBlock {
    type Element = Index;

    fn element_id(element: &Self::Element) -> Index {
        *element
    }

    fn element_len(_element: &Self::Element) -> usize {
        // A single element costs at most a two-varint (from_delta, span) pair.
        8
    }

    fn from_elements(elements: Vec<Self::Element>) -> Result<Self> {
        BooleanBlock::from_elements(&elements)
    }

    fn into_elements(self) -> Vec<Self::Element> {
        self.to_elements()
    }
}
