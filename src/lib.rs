// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Storage and retrieval core of a structured search engine.
//!
//! This crate implements an inverted-index store backed by a generic ordered
//! key/value database (the [`kv`] module's `KvStore` trait), a companion forward
//! index, per-document metadata, attributes and access-control lists, a
//! transactional writer path, and a query-execution core made of posting-list
//! iterators, a weighted-accumulator ranker, and a small plug-in contract for
//! weighting functions and summarizers.
//!
//! ##### NOTE
//!
//! > This crate does not ship a production `KvStore` binding. [`kv::memory::MemoryKv`]
//! > is an in-memory reference implementation used by this crate's own tests; a real
//! > deployment would bind [`kv::KvStore`] against something like LevelDB, which is
//! > out of this crate's scope (see `DESIGN.md`).
//!
//! ##### About
//!
//! The hard parts this crate covers:
//!
//! - the binary block formats and block map that encode postings, positions,
//!   forward terms, ACLs and metadata ([`block`], [`store`]);
//! - the transaction pipeline that accepts per-document updates, resolves keys,
//!   merges new blocks into existing ones, and commits atomically ([`txn`]);
//! - the posting-iterator algebra — term iterator, union, intersect, difference,
//!   structural/within/sequence, contains, successor/predecessor — with
//!   document-frequency estimation ([`iter`]);
//! - the query evaluation core: accumulator-based ranking, metadata
//!   restrictions, and the summarizer/weighting plug-in contract ([`query`]).
//!
//! # Example usage
//!
//! ```
//! use search_storage::config::StorageConfig;
//! use search_storage::kv::memory::MemoryKv;
//! use search_storage::store::handle::StorageHandle;
//! use search_storage::txn::pipeline::StorageTransaction;
//!
//! let handle = StorageHandle::open(MemoryKv::new(), StorageConfig::new())?;
//!
//! let mut txn = StorageTransaction::begin(&handle);
//! let docno = txn.insert_document("d1")?;
//! txn.add_term("word", "a", docno, 1)?;
//! txn.add_term("word", "b", docno, 2)?;
//! txn.commit()?;
//!
//! assert_eq!(handle.nof_docs()?, 1);
//! # Ok::<(), search_storage::error::Error>(())
//! ```

pub mod block;
pub mod cache;
pub mod coding;
pub mod config;
pub mod error;
pub mod iter;
pub mod keys;
pub mod kv;
pub mod query;
pub mod stats;
pub mod store;
pub mod txn;
pub mod varint;

pub use error::{Error, Result};
