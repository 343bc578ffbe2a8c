// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Candidate selection and bounded top-K ranking: walks a selection
//! iterator's candidates in ascending docno order, keeps only those passing the
//! metadata restriction and ACL check, scores the survivors, and retains the
//! top `max_nof_ranks` starting at `min_rank` — a paging window over the ranked
//! list, not a limit on how many candidates are scored. Grounded in
//! `original_source`'s `accumulator.cpp`/`WeightedAccumulatedData` bounded
//! ranker, expressed here with a `BinaryHeap<Reverse<_>>` rather than a hand-rolled
//! fixed-size array.

use crate::error::Result;
use crate::iter::PostingIterator;
use crate::keys::Index;
use crate::kv::KvStore;
use crate::query::restriction::Restriction;
use crate::store::handle::StorageHandle;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// One ranked result: a document and its accumulated weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ranked {
    pub docno: Index,
    pub weight: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Entry {
    weight: f64,
    docno: Index,
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.weight.total_cmp(&other.weight).then_with(|| self.docno.cmp(&other.docno))
    }
}

/// Selects, filters, scores and ranks candidates.
#[derive(Clone, Copy, Debug)]
pub struct Accumulator {
    min_rank: usize,
    max_nof_ranks: usize,
}

impl Accumulator {
    /// Builds an accumulator returning results `[min_rank, min_rank + max_nof_ranks)`
    /// of the full ranked list. `max_nof_ranks == 0` means "unbounded".
    #[must_use]
    pub fn new(min_rank: usize, max_nof_ranks: usize) -> Self {
        Self { min_rank, max_nof_ranks }
    }

    /// Runs the selection/restriction/ACL/scoring pipeline. `select` yields
    /// candidate docnos in ascending order (typically a union of the query's
    /// term/join iterators); `userno` is `None` to skip ACL filtering (e.g. when
    /// the active config has it disabled) or `Some` to require
    /// [`StorageHandle::acl_allows`]; `score` computes each surviving candidate's
    /// weight.
    pub fn run<S: KvStore>(
        &self,
        handle: &StorageHandle<S>,
        mut select: Box<dyn PostingIterator>,
        restriction: &Restriction,
        userno: Option<Index>,
        mut score: impl FnMut(Index) -> Result<f64>,
    ) -> Result<Vec<Ranked>> {
        let capacity = if self.max_nof_ranks == 0 { usize::MAX } else { self.min_rank + self.max_nof_ranks };
        let mut heap: BinaryHeap<Reverse<Entry>> = BinaryHeap::new();

        let mut docno = select.skip_doc(1)?;
        while docno != 0 {
            if restriction.is_empty() || restriction.matches(handle, docno)? {
                let allowed = match userno {
                    Some(user) => handle.acl_allows(docno, user)?,
                    None => true,
                };
                if allowed {
                    let weight = score(docno)?;
                    heap.push(Reverse(Entry { weight, docno }));
                    if capacity != usize::MAX && heap.len() > capacity {
                        heap.pop();
                    }
                }
            }
            docno = select.skip_doc(docno.saturating_add(1))?;
        }

        let mut ranked: Vec<Entry> = heap.into_iter().map(|Reverse(e)| e).collect();
        ranked.sort_by(|a, b| b.weight.total_cmp(&a.weight).then_with(|| a.docno.cmp(&b.docno)));

        let page = ranked
            .into_iter()
            .skip(self.min_rank)
            .take(if self.max_nof_ranks == 0 { usize::MAX } else { self.max_nof_ranks })
            .map(|e| Ranked { docno: e.docno, weight: e.weight })
            .collect();
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::iter::factory;
    use crate::kv::memory::MemoryKv;
    use crate::txn::pipeline::StorageTransaction;

    fn seeded_handle() -> StorageHandle<MemoryKv> {
        let kv = MemoryKv::new();
        let handle = StorageHandle::open(kv, StorageConfig::new()).unwrap();
        let mut txn = StorageTransaction::begin(&handle);
        for i in 1..=5u32 {
            let docno = txn.insert_document(&format!("d{i}")).unwrap();
            txn.add_term("word", "a", docno, 1).unwrap();
        }
        txn.commit().unwrap();
        handle
    }

    #[test]
    fn ranks_by_descending_weight_and_pages_the_result() {
        let handle = seeded_handle();
        let select = factory::term_iterator(&handle, "word", "a").unwrap();
        let accumulator = Accumulator::new(0, 2);
        let restriction = Restriction::default();
        let results = accumulator
            .run(&handle, select, &restriction, None, |docno| Ok(f64::from(docno)))
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].docno, 5);
        assert_eq!(results[1].docno, 4);
    }

    #[test]
    fn min_rank_pages_past_the_top_results() {
        let handle = seeded_handle();
        let select = factory::term_iterator(&handle, "word", "a").unwrap();
        let accumulator = Accumulator::new(2, 2);
        let restriction = Restriction::default();
        let results = accumulator
            .run(&handle, select, &restriction, None, |docno| Ok(f64::from(docno)))
            .unwrap();
        assert_eq!(results.iter().map(|r| r.docno).collect::<Vec<_>>(), vec![3, 2]);
    }

    #[test]
    fn acl_filtering_excludes_unauthorized_documents() {
        let kv = MemoryKv::new();
        let handle = StorageHandle::open(kv, StorageConfig::new().acl_enabled(true)).unwrap();
        let mut txn = StorageTransaction::begin(&handle);
        let docno = txn.insert_document("d1").unwrap();
        txn.add_term("word", "a", docno, 1).unwrap();
        txn.grant_acl(docno, "reader").unwrap();
        txn.commit().unwrap();

        let select = factory::term_iterator(&handle, "word", "a").unwrap();
        let accumulator = Accumulator::new(0, 10);
        let restriction = Restriction::default();
        let other_user = handle.lookup_user_name("intruder").unwrap_or(999);
        let results = accumulator.run(&handle, select, &restriction, Some(other_user), |_| Ok(1.0)).unwrap();
        assert!(results.is_empty());
    }
}
