// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `ForwardIndexBlock`: `(position -> term-string)` pairs for a fixed `(typeno,
//! docno)`. Blocks partition the document's positions in ascending order.

use super::merge::Mergeable;
use super::Block;
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::error::{Error, Result};
use crate::keys::Index;
use crate::varint;
use std::io::{Read, Write};

/// One `(position, term)` entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardEntry {
    /// Position within the document.
    pub position: Index,
    /// The term string occupying that position.
    pub term: String,
}

/// A block of forward-index entries, keyed by the largest position it contains.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ForwardIndexBlock {
    id: Index,
    entries: Vec<ForwardEntry>,
}

impl ForwardIndexBlock {
    /// Builds a block from entries sorted ascending by position.
    pub fn from_entries(entries: Vec<ForwardEntry>) -> Result<Self> {
        for w in entries.windows(2) {
            if w[0].position >= w[1].position {
                return Err(Error::CorruptData("ForwardIndexBlock: positions not strictly ascending"));
            }
        }
        let id = entries.last().map(|e| e.position).unwrap_or(0);
        Ok(Self { id, entries })
    }

    /// The entries held by this block.
    #[must_use]
    pub fn entries(&self) -> &[ForwardEntry] {
        &self.entries
    }

    /// The term at or after `position`, if any.
    #[must_use]
    pub fn entry_at_or_after(&self, position: Index) -> Option<&ForwardEntry> {
        self.entries.iter().find(|e| e.position >= position)
    }
}

impl Block for ForwardIndexBlock {
    fn id(&self) -> Index {
        self.id
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn approx_encoded_len(&self) -> usize {
        self.entries.iter().map(|e| e.term.len() + 6).sum()
    }
}

impl Encode for ForwardIndexBlock {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        let mut buf = Vec::new();
        varint::pack_into(self.entries.len() as u64, &mut buf);
        for e in &self.entries {
            let relative_pos = u64::from(self.id - e.position);
            varint::pack_into(relative_pos, &mut buf);
            varint::pack_into(e.term.len() as u64, &mut buf);
            buf.extend_from_slice(e.term.as_bytes());
        }
        writer.write_all(&buf)?;
        Ok(())
    }
}

impl ForwardIndexBlock {
    /// Decodes a block given the id stored in its `KvStore` key and its value bytes.
    pub fn decode(id: Index, buf: &[u8]) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(buf);
        let nof_entries = varint::unpack_from(&mut cursor)? as usize;
        let mut entries = Vec::with_capacity(nof_entries);
        for _ in 0..nof_entries {
            let relative_pos = varint::unpack_from(&mut cursor)?;
            let len = varint::unpack_from(&mut cursor)? as usize;
            let start = cursor.position() as usize;
            let end = start + len;
            let term = std::str::from_utf8(&buf[start..end])
                .map_err(|_| DecodeError::InvalidHeader("ForwardIndexBlock: term not UTF-8"))?
                .to_owned();
            cursor.set_position(end as u64);
            let position = id
                .checked_sub(relative_pos as Index)
                .ok_or(DecodeError::InvalidTag(("ForwardIndexBlock relative_pos", relative_pos)))?;
            entries.push(ForwardEntry { position, term });
        }
        Ok(Self { id, entries })
    }
}

impl Decode for ForwardIndexBlock {
    fn decode_from<R: Read>(_reader: &mut R) -> std::result::Result<Self, DecodeError> {
        Err(DecodeError::InvalidHeader(
            "ForwardIndexBlock::decode_from requires the block id from the KvStore key; use ForwardIndexBlock::decode",
        ))
    }
}

impl Mergeable for ForwardIndexBlock {
    type Element = ForwardEntry;

    fn element_id(element: &Self::Element) -> Index {
        element.position
    }

    fn element_len(element: &Self::Element) -> usize {
        element.term.len() + 6
    }

    fn from_elements(elements: Vec<Self::Element>) -> Result<Self> {
        ForwardIndexBlock::from_entries(elements)
    }

    fn into_elements(self) -> Vec<Self::Element> {
        self.entries
    }
}
