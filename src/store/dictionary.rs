// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! String-to-id dictionaries (`KeyMap`) and their inverses (`KeyMapInv`): term type,
//! term value, document id, user name and attribute name all follow this pattern.
//!
//! A name introduced mid-transaction is given a *provisional* id —
//! [`crate::keys::UNKNOWN_VALUE_HANDLE_START`] plus an offset local to that
//! transaction — so postings being built up can reference it immediately without a
//! round trip to the backing `KvStore`. At commit, [`ProvisionalAllocator::into_pending`]
//! hands the pending names to the commit pipeline, which allocates real, globally
//! unique ids from the permanent counter and rewrites every provisional reference
//! (see `crate::txn::pipeline`).

use crate::error::Result;
use crate::keys::{Index, UNKNOWN_VALUE_HANDLE_START};
use crate::kv::{KvBatch, KvStore};
use rustc_hash::FxHashMap;

/// Looks up a name's committed id, if one is already stored.
pub fn lookup<S: KvStore>(kv: &S, key: &[u8]) -> Result<Option<Index>> {
    match kv.get(key)? {
        Some(bytes) => {
            let (v, _) = crate::varint::unpack(&bytes)?;
            Ok(Some(v as Index))
        }
        None => Ok(None),
    }
}

/// Looks up an id's committed name, if one is already stored.
pub fn lookup_inverse<S: KvStore>(kv: &S, key: &[u8]) -> Result<Option<String>> {
    match kv.get(key)? {
        Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        None => Ok(None),
    }
}

/// Per-transaction allocator of provisional ids for one dictionary (e.g. term
/// values). Provisional ids are only ever meaningful within the transaction that
/// created them; the commit pipeline rewrites them to permanent ids before anything
/// reaches the `KvStore`.
#[derive(Default, Clone)]
pub struct ProvisionalAllocator {
    assigned: FxHashMap<String, Index>,
    next_offset: Index,
}

impl ProvisionalAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `name` to an id: a committed id if [`lookup`] already found one, the
    /// provisional id already assigned within this transaction, or a freshly
    /// allocated provisional id.
    pub fn resolve<S: KvStore>(&mut self, kv: &S, key_of: impl Fn(&str) -> Vec<u8>, name: &str) -> Result<Index> {
        if let Some(id) = self.assigned.get(name) {
            return Ok(*id);
        }
        if let Some(id) = lookup(kv, &key_of(name))? {
            return Ok(id);
        }
        let id = UNKNOWN_VALUE_HANDLE_START
            .checked_add(self.next_offset)
            .ok_or(crate::error::Error::OutOfRange("ProvisionalAllocator: exhausted provisional id space"))?;
        self.next_offset += 1;
        self.assigned.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Whether any provisional ids were allocated (no-op transactions skip the
    /// dictionary-rewrite step entirely).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    /// Consumes the allocator, returning `(name, provisional_id)` pairs needing a
    /// permanent id at commit time.
    #[must_use]
    pub fn into_pending(self) -> Vec<(String, Index)> {
        self.assigned.into_iter().collect()
    }
}

/// Assigns permanent ids to `pending` names (provisional id -> name pairs collected
/// by [`ProvisionalAllocator::into_pending`]), writing the forward `name -> id`
/// entry (and, if `inv_key_of` is given, the inverse `id -> name` entry used for
/// dumps and statistics) into `batch`, and stages the updated counter variable.
///
/// Names are assigned ids in a stable (sorted) order so that repeated commits of
/// the same staged names are deterministic, which matters for tests that assert on
/// allocated ids. Returns the provisional -> permanent rewrite map.
pub fn commit_allocations<S: KvStore, B: KvBatch>(
    kv: &S,
    batch: &mut B,
    counter_name: &str,
    key_of: impl Fn(&str) -> Vec<u8>,
    inv_key_of: Option<impl Fn(Index) -> Vec<u8>>,
    mut pending: Vec<(String, Index)>,
) -> Result<FxHashMap<Index, Index>> {
    let mut rewrite = FxHashMap::default();
    if pending.is_empty() {
        return Ok(rewrite);
    }
    pending.sort_by(|a, b| a.0.cmp(&b.0));

    let mut next = crate::store::variables::next_id(kv, counter_name)?;
    for (name, provisional) in pending {
        let permanent = next;
        next += 1;
        batch.put(&key_of(&name), &crate::keys::pack_counter(u64::from(permanent)));
        if let Some(inv) = inv_key_of.as_ref() {
            batch.put(&inv(permanent), name.as_bytes());
        }
        rewrite.insert(provisional, permanent);
    }
    crate::store::variables::set(batch, counter_name, u64::from(next - 1));
    Ok(rewrite)
}

/// Rewrites a provisional id through `rewrite_map`, passing permanent ids through
/// unchanged. Fails with [`crate::error::Error::CorruptData`] if `id` is
/// provisional (`>= UNKNOWN_VALUE_HANDLE_START`) but missing from the map — this
/// would mean a staged structure referenced a name the allocator never saw.
pub fn rewrite_id(id: Index, rewrite_map: &FxHashMap<Index, Index>) -> Result<Index> {
    if id < UNKNOWN_VALUE_HANDLE_START {
        return Ok(id);
    }
    rewrite_map
        .get(&id)
        .copied()
        .ok_or(crate::error::Error::CorruptData("dictionary: provisional id missing from rewrite map at commit"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;
    use crate::store::keyspace::term_value_key;

    #[test]
    fn resolves_committed_names_without_provisional_allocation() {
        let kv = MemoryKv::new();
        kv.put(&term_value_key("hello"), &crate::keys::pack_counter(7)).unwrap();

        let mut allocator = ProvisionalAllocator::new();
        let id = allocator.resolve(&kv, term_value_key, "hello").unwrap();
        assert_eq!(id, 7);
        assert!(allocator.is_empty());
    }

    #[test]
    fn allocates_distinct_provisional_ids_for_new_names() {
        let kv = MemoryKv::new();
        let mut allocator = ProvisionalAllocator::new();
        let a = allocator.resolve(&kv, term_value_key, "new-a").unwrap();
        let b = allocator.resolve(&kv, term_value_key, "new-b").unwrap();
        let a_again = allocator.resolve(&kv, term_value_key, "new-a").unwrap();

        assert!(a >= UNKNOWN_VALUE_HANDLE_START);
        assert!(b >= UNKNOWN_VALUE_HANDLE_START);
        assert_ne!(a, b);
        assert_eq!(a, a_again);
        assert_eq!(allocator.into_pending().len(), 2);
    }

    #[test]
    fn commit_allocations_assigns_permanent_ids_and_updates_counter() {
        let kv = MemoryKv::new();
        let mut allocator = ProvisionalAllocator::new();
        let a = allocator.resolve(&kv, term_value_key, "alpha").unwrap();
        let b = allocator.resolve(&kv, term_value_key, "beta").unwrap();

        let mut batch = kv.batch();
        let rewrite = commit_allocations(
            &kv,
            &mut batch,
            crate::keys::variable_names::TERM_NO,
            term_value_key,
            None::<fn(Index) -> Vec<u8>>,
            allocator.into_pending(),
        )
        .unwrap();
        batch.commit().unwrap();

        let permanent_a = rewrite_id(a, &rewrite).unwrap();
        let permanent_b = rewrite_id(b, &rewrite).unwrap();
        assert_ne!(permanent_a, permanent_b);
        assert!(permanent_a < UNKNOWN_VALUE_HANDLE_START);
        assert!(permanent_b < UNKNOWN_VALUE_HANDLE_START);

        assert_eq!(lookup(&kv, &term_value_key("alpha")).unwrap(), Some(permanent_a));
        assert_eq!(
            crate::store::variables::get(&kv, crate::keys::variable_names::TERM_NO).unwrap(),
            u64::from(permanent_a.max(permanent_b))
        );
    }

    #[test]
    fn rewrite_id_passes_permanent_ids_through() {
        let map = FxHashMap::default();
        assert_eq!(rewrite_id(42, &map).unwrap(), 42);
    }

    #[test]
    fn rewrite_id_fails_on_missing_provisional() {
        let map = FxHashMap::default();
        assert!(rewrite_id(UNKNOWN_VALUE_HANDLE_START + 1, &map).is_err());
    }
}
