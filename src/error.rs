// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};

/// Errors that can occur anywhere in the storage and query-evaluation core.
///
/// Variants correspond 1:1 to the error kinds named in the design: block framing
/// violations, id/position overflow, schema mismatches, missing lookups, illegal
/// transaction state transitions, backend failures and malformed query programs.
#[derive(Debug)]
pub enum Error {
    /// Block framing violation, inconsistent block id, unknown key prefix, varint
    /// truncation, or a missing provisional id at dictionary-rewrite time.
    CorruptData(&'static str),

    /// A docno, position, block-id or metadata value exceeded its documented limit.
    OutOfRange(&'static str),

    /// The metadata schema disagrees with an existing description, or reopening
    /// storage was attempted with incompatible options.
    ConfigMismatch(&'static str),

    /// A lookup found no key (distinct from a dictionary's default-0 return).
    NotFound,

    /// Commit after rollback, rollback after commit, double commit, or a mutation
    /// attempted on a transaction that is no longer pending.
    TransactionState(&'static str),

    /// The underlying `KvStore` returned an error.
    Backend(Box<dyn std::error::Error + Send + Sync>),

    /// Unknown function/operator name, bad cardinality/range, or a malformed query
    /// evaluation program.
    InvalidArgument(&'static str),

    /// I/O error while encoding/decoding a block or message.
    Io(std::io::Error),

    /// Serialization failed.
    Encode(EncodeError),

    /// Deserialization failed.
    Decode(DecodeError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CorruptData(msg) => write!(f, "corrupt data: {msg}"),
            Self::OutOfRange(msg) => write!(f, "out of range: {msg}"),
            Self::ConfigMismatch(msg) => write!(f, "config mismatch: {msg}"),
            Self::NotFound => write!(f, "not found"),
            Self::TransactionState(msg) => write!(f, "invalid transaction state: {msg}"),
            Self::Backend(e) => write!(f, "backend failure: {e}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend(e) => Some(e.as_ref()),
            Self::Io(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
