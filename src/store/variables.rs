// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The `Variable` key family: a handful of named 32-bit counters (`TermNo`,
//! `TypeNo`, `DocNo`, `UserNo`, `AttribNo`, `NofDocs`) that back the permanent id
//! allocators and the total document count. Reads are lock-free; the commit
//! pipeline is the only writer and does so inside its KV batch.

use crate::error::Result;
use crate::keys::{pack_counter, unpack_counter, variable_names, GlobalCounter};
use crate::kv::{KvBatch, KvStore};
use crate::store::keyspace::variable_key;

/// Reads a named counter, defaulting to `0` if never written.
pub fn get<S: KvStore>(kv: &S, name: &str) -> Result<GlobalCounter> {
    match kv.get(&variable_key(name))? {
        Some(bytes) => unpack_counter(&bytes).map_err(Into::into),
        None => Ok(0),
    }
}

/// Stages a named counter write in `batch`.
pub fn set<B: KvBatch>(batch: &mut B, name: &str, value: GlobalCounter) {
    batch.put(&variable_key(name), &pack_counter(value));
}

/// Reads the permanent-id allocator counter for one of the four dictionaries
/// (`TermNo`, `TypeNo`, `DocNo`, `UserNo`) or `AttribNo`, returning the next value to
/// hand out and the value to persist back.
pub fn next_id<S: KvStore>(kv: &S, counter_name: &str) -> Result<u32> {
    let current = get(kv, counter_name)?;
    Ok(current as u32 + 1)
}

/// Reads the current document count (`NofDocs`).
pub fn nof_docs<S: KvStore>(kv: &S) -> Result<GlobalCounter> {
    get(kv, variable_names::NOF_DOCS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;

    #[test]
    fn defaults_to_zero_and_round_trips() {
        let kv = MemoryKv::new();
        assert_eq!(get(&kv, variable_names::NOF_DOCS).unwrap(), 0);

        let mut batch = kv.batch();
        set(&mut batch, variable_names::NOF_DOCS, 42);
        batch.commit().unwrap();

        assert_eq!(nof_docs(&kv).unwrap(), 42);
    }

    #[test]
    fn next_id_increments_from_current() {
        let kv = MemoryKv::new();
        assert_eq!(next_id(&kv, variable_names::TERM_NO).unwrap(), 1);

        let mut batch = kv.batch();
        set(&mut batch, variable_names::TERM_NO, 5);
        batch.commit().unwrap();

        assert_eq!(next_id(&kv, variable_names::TERM_NO).unwrap(), 6);
    }
}
