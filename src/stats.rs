// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Statistics peer messages: an opaque, framed binary message a commit emits
//! to tell peer nodes about document-count and document-frequency changes. The
//! actual peer-message transport and the wider statistics subsystem are
//! external collaborators; this module only implements the message framing the
//! commit pipeline needs to produce and that a peer would need to parse.
//!
//! Two modes: *initialization* (a full df-table dump with `is_new = true` for every
//! entry) and *update* (only the deltas a single commit produced). Both use the
//! same wire format — the header carries the doc-count change, the body a
//! length-prefixed sequence of df-change records.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::keys::Index;
use crate::varint;
use std::io::{Read, Write};

/// One term's document-frequency change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DfChange {
    /// Feature type number.
    pub typeno: Index,
    /// Term value number.
    pub termno: Index,
    /// Signed change in document frequency.
    pub increment: i64,
    /// Whether this is the term's first appearance (initialization mode, or a
    /// brand-new term in update mode).
    pub is_new: bool,
}

/// Builds one framed peer message for a single commit (or a full-table dump).
pub trait MessageBuilder {
    /// Records the net change in total document count.
    fn set_nof_documents_inserted_change(&mut self, delta: i64);

    /// Records one term's document-frequency change.
    fn add_df_change(&mut self, typeno: Index, termno: Index, increment: i64, is_new: bool);

    /// Whether any change has been recorded yet.
    fn is_empty(&self) -> bool;
}

/// Reads back a message produced by a [`MessageBuilder`] implementation.
pub trait MessageViewer {
    /// The net change in total document count.
    fn nof_documents_inserted_change(&self) -> i64;

    /// The df changes carried by this message, in encounter order.
    fn df_changes(&self) -> &[DfChange];
}

/// A framed peer message: `varint(zigzag(doc_count_delta)) ++ varint(nof_changes)
/// ++ { varint(typeno) varint(termno) varint(zigzag(increment)) u8(is_new) }*`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerMessage {
    nof_documents_inserted_change: i64,
    df_changes: Vec<DfChange>,
}

impl PeerMessage {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageBuilder for PeerMessage {
    fn set_nof_documents_inserted_change(&mut self, delta: i64) {
        self.nof_documents_inserted_change = delta;
    }

    fn add_df_change(&mut self, typeno: Index, termno: Index, increment: i64, is_new: bool) {
        self.df_changes.push(DfChange { typeno, termno, increment, is_new });
    }

    fn is_empty(&self) -> bool {
        self.nof_documents_inserted_change == 0 && self.df_changes.is_empty()
    }
}

impl MessageViewer for PeerMessage {
    fn nof_documents_inserted_change(&self) -> i64 {
        self.nof_documents_inserted_change
    }

    fn df_changes(&self) -> &[DfChange] {
        &self.df_changes
    }
}

fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

impl Encode for PeerMessage {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        let mut buf = Vec::new();
        varint::pack_into(zigzag_encode(self.nof_documents_inserted_change), &mut buf);
        varint::pack_into(self.df_changes.len() as u64, &mut buf);
        for c in &self.df_changes {
            varint::pack_into(u64::from(c.typeno), &mut buf);
            varint::pack_into(u64::from(c.termno), &mut buf);
            varint::pack_into(zigzag_encode(c.increment), &mut buf);
            buf.push(u8::from(c.is_new));
        }
        writer.write_all(&buf)?;
        Ok(())
    }
}

impl Decode for PeerMessage {
    fn decode_from<R: Read>(reader: &mut R) -> std::result::Result<Self, DecodeError> {
        let nof_documents_inserted_change = zigzag_decode(varint::unpack_from(reader)?);
        let nof_changes = varint::unpack_from(reader)?;
        let mut df_changes = Vec::with_capacity(nof_changes as usize);
        for _ in 0..nof_changes {
            let typeno = varint::unpack_from(reader)? as Index;
            let termno = varint::unpack_from(reader)? as Index;
            let increment = zigzag_decode(varint::unpack_from(reader)?);
            let mut is_new = [0u8; 1];
            reader.read_exact(&mut is_new)?;
            df_changes.push(DfChange { typeno, termno, increment, is_new: is_new[0] != 0 });
        }
        Ok(Self { nof_documents_inserted_change, df_changes })
    }
}

/// Builds an initialization-mode message broadcasting the full df table: every
/// `(typeno, termno, df)` triple with `is_new = true`.
pub fn build_initialization_message(entries: impl IntoIterator<Item = (Index, Index, u64)>, nof_docs: u64) -> PeerMessage {
    let mut msg = PeerMessage::new();
    msg.set_nof_documents_inserted_change(nof_docs as i64);
    for (typeno, termno, df) in entries {
        msg.add_df_change(typeno, termno, df as i64, true);
    }
    msg
}
