// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An in-memory `KvStore` backed by a `BTreeMap`. This is a reference/test
//! implementation used by this crate's own unit and integration tests — the
//! production binding (e.g. LevelDB) is an external collaborator out of scope here.

use super::{KvBatch, KvCursor, KvStore};
use crate::error::Result;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// `BTreeMap`-backed `KvStore`. Cheap to construct; intended for tests and examples.
#[derive(Default)]
pub struct MemoryKv {
    inner: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKv {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    for i in (0..upper.len()).rev() {
        if upper[i] != 0xFF {
            upper[i] += 1;
            upper.truncate(i + 1);
            return Some(upper);
        }
    }
    None
}

impl KvStore for MemoryKv {
    type Cursor<'a> = MemoryCursor;
    type Batch = MemoryBatch;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().expect("lock poisoned").get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner
            .write()
            .expect("lock poisoned")
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.write().expect("lock poisoned").remove(key);
        Ok(())
    }

    fn cursor(&self) -> Self::Cursor<'_> {
        MemoryCursor {
            snapshot: self.inner.read().expect("lock poisoned").clone(),
            current: None,
        }
    }

    fn batch(&self) -> Self::Batch {
        MemoryBatch {
            store: Arc::clone(&self.inner),
            ops: Vec::new(),
        }
    }
}

/// A snapshot cursor over a [`MemoryKv`] taken at construction time.
pub struct MemoryCursor {
    snapshot: BTreeMap<Vec<u8>, Vec<u8>>,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl KvCursor for MemoryCursor {
    fn seek(&mut self, key: &[u8]) -> bool {
        self.current = self
            .snapshot
            .range(key.to_vec()..)
            .next()
            .map(|(k, v)| (k.clone(), v.clone()));
        self.valid()
    }

    fn seek_for_prev(&mut self, key: &[u8]) -> bool {
        self.current = self
            .snapshot
            .range(..=key.to_vec())
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone()));
        self.valid()
    }

    fn seek_to_last(&mut self, prefix: &[u8]) -> bool {
        self.current = match prefix_upper_bound(prefix) {
            Some(upper) => self
                .snapshot
                .range(prefix.to_vec()..upper)
                .next_back()
                .map(|(k, v)| (k.clone(), v.clone())),
            None => self
                .snapshot
                .range(prefix.to_vec()..)
                .next_back()
                .map(|(k, v)| (k.clone(), v.clone())),
        };
        self.valid()
    }

    fn next(&mut self) -> bool {
        let Some((key, _)) = &self.current else {
            return false;
        };
        let mut upper = key.clone();
        upper.push(0);
        self.current = self
            .snapshot
            .range(upper..)
            .next()
            .map(|(k, v)| (k.clone(), v.clone()));
        self.valid()
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        &self.current.as_ref().expect("cursor not valid").0
    }

    fn value(&self) -> &[u8] {
        &self.current.as_ref().expect("cursor not valid").1
    }
}

/// An atomic batch of writes against a [`MemoryKv`].
pub struct MemoryBatch {
    store: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    ops: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

impl KvBatch for MemoryBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.ops.push((key.to_vec(), Some(value.to_vec())));
    }

    fn delete(&mut self, key: &[u8]) {
        self.ops.push((key.to_vec(), None));
    }

    fn commit(self) -> Result<()> {
        let mut guard = self.store.write().expect("lock poisoned");
        for (key, value) in self.ops {
            match value {
                Some(v) => {
                    guard.insert(key, v);
                }
                None => {
                    guard.remove(&key);
                }
            }
        }
        Ok(())
    }
}
