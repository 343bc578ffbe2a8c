// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `MetaDataBlock`: fixed-width typed columns over a run of [`BLOCK_SIZE`] docnos,
//! plus the [`MetaDataDescription`] schema describing the columns and their byte
//! layout within a record. Schema changes ("alter table") go through a translation
//! map that copies each surviving column's bytes into the new row layout.

use super::Block;
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::error::{Error, Result};
use crate::keys::Index;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Number of consecutive docnos held by one [`MetaDataBlock`].
pub const BLOCK_SIZE: Index = 1024;

/// The scalar type of one metadata column.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MetaDataType {
    /// Signed 8-bit.
    Int8,
    /// Unsigned 8-bit.
    UInt8,
    /// Signed 16-bit.
    Int16,
    /// Unsigned 16-bit.
    UInt16,
    /// Signed 32-bit.
    Int32,
    /// Unsigned 32-bit.
    UInt32,
    /// IEEE-754 binary16.
    Float16,
    /// IEEE-754 binary32.
    Float32,
}

impl MetaDataType {
    /// Size of one value of this type, in bytes.
    #[must_use]
    pub fn byte_size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
        }
    }

    /// Single-character wire tag, used by [`MetaDataDescription`]'s encoding.
    fn tag(self) -> u8 {
        match self {
            Self::Int8 => b'b',
            Self::UInt8 => b'B',
            Self::Int16 => b'h',
            Self::UInt16 => b'H',
            Self::Int32 => b'i',
            Self::UInt32 => b'I',
            Self::Float16 => b'e',
            Self::Float32 => b'f',
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            b'b' => Self::Int8,
            b'B' => Self::UInt8,
            b'h' => Self::Int16,
            b'H' => Self::UInt16,
            b'i' => Self::Int32,
            b'I' => Self::UInt32,
            b'e' => Self::Float16,
            b'f' => Self::Float32,
            _ => return Err(Error::CorruptData("MetaDataType: unknown wire tag")),
        })
    }

    fn write(self, value: f64, out: &mut Vec<u8>) {
        match self {
            Self::Int8 => out.push(value as i8 as u8),
            Self::UInt8 => out.push(value as u8),
            Self::Int16 => out.write_i16::<BigEndian>(value as i16).expect("Vec write cannot fail"),
            Self::UInt16 => out.write_u16::<BigEndian>(value as u16).expect("Vec write cannot fail"),
            Self::Int32 => out.write_i32::<BigEndian>(value as i32).expect("Vec write cannot fail"),
            Self::UInt32 => out.write_u32::<BigEndian>(value as u32).expect("Vec write cannot fail"),
            Self::Float16 => out
                .write_u16::<BigEndian>(half::f16::from_f64(value).to_bits())
                .expect("Vec write cannot fail"),
            Self::Float32 => out.write_f32::<BigEndian>(value as f32).expect("Vec write cannot fail"),
        }
    }

    fn read(self, mut buf: &[u8]) -> std::result::Result<f64, DecodeError> {
        Ok(match self {
            Self::Int8 => buf.read_i8()? as f64,
            Self::UInt8 => buf.read_u8()? as f64,
            Self::Int16 => buf.read_i16::<BigEndian>()? as f64,
            Self::UInt16 => buf.read_u16::<BigEndian>()? as f64,
            Self::Int32 => buf.read_i32::<BigEndian>()? as f64,
            Self::UInt32 => buf.read_u32::<BigEndian>()? as f64,
            Self::Float16 => half::f16::from_bits(buf.read_u16::<BigEndian>()?).to_f64(),
            Self::Float32 => buf.read_f32::<BigEndian>()? as f64,
        })
    }
}

/// A named, typed column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaDataField {
    /// Column name, unique within the description.
    pub name: String,
    /// Column scalar type.
    pub datatype: MetaDataType,
}

/// The schema of a metadata table: an ordered list of fixed-width columns and their
/// byte offsets within one record.
#[derive(Clone, Debug, Default)]
pub struct MetaDataDescription {
    fields: Vec<MetaDataField>,
    offsets: Vec<usize>,
    record_size: usize,
}

impl MetaDataDescription {
    /// Builds a description from an ordered list of fields.
    pub fn new(fields: Vec<MetaDataField>) -> Result<Self> {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0usize;
        for f in &fields {
            if !seen.insert(f.name.clone()) {
                return Err(Error::InvalidArgument("MetaDataDescription: duplicate column name"));
            }
            offsets.push(offset);
            offset += f.datatype.byte_size();
        }
        Ok(Self { fields, offsets, record_size: offset })
    }

    /// The columns, in record order.
    #[must_use]
    pub fn fields(&self) -> &[MetaDataField] {
        &self.fields
    }

    /// Size in bytes of one fixed-width record under this description.
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Index and byte offset of the named column, if present.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<(usize, usize, MetaDataType)> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| (i, self.offsets[i], self.fields[i].datatype))
    }

    /// Builds a translation map from `self` to `new`: for each of `new`'s columns,
    /// either the `(old_offset, old_type)` to copy from, or `None` to zero-fill. Used
    /// by an "alter table" rewrite of every stored [`MetaDataBlock`].
    #[must_use]
    pub fn translation_to(&self, new: &Self) -> Vec<Option<(usize, MetaDataType)>> {
        new.fields
            .iter()
            .map(|f| self.field(&f.name).map(|(_, off, ty)| (off, ty)))
            .collect()
    }
}

/// A block of fixed-width metadata records for [`BLOCK_SIZE`] consecutive docnos.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaDataBlock {
    id: Index,
    /// Concatenated fixed-width records, `description.record_size()` bytes each, in
    /// ascending docno order.
    rows: Vec<u8>,
}

impl MetaDataBlock {
    /// First docno in this block's range, given the block's id.
    #[must_use]
    pub fn base_docno(id: Index) -> Index {
        ((id - 1) / BLOCK_SIZE) * BLOCK_SIZE + 1
    }

    /// The block id that would hold `docno`.
    #[must_use]
    pub fn block_id_for(docno: Index) -> Index {
        ((docno - 1) / BLOCK_SIZE + 1) * BLOCK_SIZE
    }

    /// Builds a zero-filled block for the [`BLOCK_SIZE`]-row range ending at `id`.
    #[must_use]
    pub fn new_zeroed(id: Index, description: &MetaDataDescription) -> Self {
        Self { id, rows: vec![0u8; description.record_size() * BLOCK_SIZE as usize] }
    }

    /// Reads the value of `field` for `docno` out of this block.
    pub fn get(&self, description: &MetaDataDescription, docno: Index, field: &str) -> Result<f64> {
        let (_, off, ty) = description
            .field(field)
            .ok_or(Error::InvalidArgument("MetaDataBlock: unknown field"))?;
        let row = self.row_offset(docno, description);
        Ok(ty.read(&self.rows[row + off..])?)
    }

    /// Writes the value of `field` for `docno` into this block.
    pub fn set(&mut self, description: &MetaDataDescription, docno: Index, field: &str, value: f64) -> Result<()> {
        let (_, off, ty) = description
            .field(field)
            .ok_or(Error::InvalidArgument("MetaDataBlock: unknown field"))?;
        let row = self.row_offset(docno, description);
        let mut encoded = Vec::with_capacity(ty.byte_size());
        ty.write(value, &mut encoded);
        self.rows[row + off..row + off + encoded.len()].copy_from_slice(&encoded);
        Ok(())
    }

    fn row_offset(&self, docno: Index, description: &MetaDataDescription) -> usize {
        let base = Self::base_docno(self.id);
        ((docno - base) as usize) * description.record_size()
    }

    /// Rewrites this block's rows under a new description, following a translation
    /// map produced by [`MetaDataDescription::translation_to`].
    #[must_use]
    pub fn alter(&self, old: &MetaDataDescription, translation: &[Option<(usize, MetaDataType)>], new: &MetaDataDescription) -> Self {
        let nof_rows = BLOCK_SIZE as usize;
        let mut rows = vec![0u8; new.record_size() * nof_rows];
        for r in 0..nof_rows {
            let old_row = &self.rows[r * old.record_size()..(r + 1) * old.record_size()];
            let new_row = &mut rows[r * new.record_size()..(r + 1) * new.record_size()];
            for (field, slot) in new.fields.iter().zip(translation.iter()) {
                let (_, new_off, new_ty) = new.field(&field.name).expect("field from new's own schema");
                if let Some((old_off, old_ty)) = slot {
                    let value = old_ty.read(&old_row[*old_off..]).expect("in-memory row is well-formed");
                    let mut encoded = Vec::with_capacity(new_ty.byte_size());
                    new_ty.write(value, &mut encoded);
                    new_row[new_off..new_off + encoded.len()].copy_from_slice(&encoded);
                }
            }
        }
        Self { id: self.id, rows }
    }
}

impl Block for MetaDataBlock {
    fn id(&self) -> Index {
        self.id
    }

    fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn approx_encoded_len(&self) -> usize {
        self.rows.len()
    }
}

impl Encode for MetaDataBlock {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        writer.write_all(&self.rows)?;
        Ok(())
    }
}

impl MetaDataBlock {
    /// Decodes a block given the id stored in its `KvStore` key and its raw row bytes.
    #[must_use]
    pub fn decode(id: Index, buf: &[u8]) -> Self {
        Self { id, rows: buf.to_vec() }
    }
}

impl Decode for MetaDataBlock {
    fn decode_from<R: Read>(_reader: &mut R) -> std::result::Result<Self, DecodeError> {
        Err(DecodeError::InvalidHeader(
            "MetaDataBlock::decode_from requires the block id from the KvStore key; use MetaDataBlock::decode",
        ))
    }
}

/// Serializes a [`MetaDataDescription`] to bytes, for storage in the keyspace's
/// schema record.
#[must_use]
pub fn encode_description(description: &MetaDataDescription) -> Vec<u8> {
    let mut out = Vec::new();
    for f in &description.fields {
        out.push(f.datatype.tag());
        out.push(u8::try_from(f.name.len()).unwrap_or(255));
        out.extend_from_slice(f.name.as_bytes());
    }
    out
}

/// Deserializes a [`MetaDataDescription`] previously written by [`encode_description`].
pub fn decode_description(buf: &[u8]) -> Result<MetaDataDescription> {
    let mut fields = Vec::new();
    let mut rest = buf;
    while let Some(&tag) = rest.first() {
        let datatype = MetaDataType::from_tag(tag)?;
        let len = rest[1] as usize;
        let name = std::str::from_utf8(&rest[2..2 + len])
            .map_err(|_| Error::CorruptData("MetaDataDescription: field name not UTF-8"))?
            .to_owned();
        fields.push(MetaDataField { name, datatype });
        rest = &rest[2 + len..];
    }
    MetaDataDescription::new(fields)
}
