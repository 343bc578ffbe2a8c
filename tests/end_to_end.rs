// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! End-to-end scenarios: single-document term intersection, a within-with-cut
//! structural join, a metadata restriction, BM25 weighting, a commit forced to
//! fail partway through, and an ACL-scoped query.

use search_storage::block::metadata::{MetaDataDescription, MetaDataField, MetaDataType};
use search_storage::config::StorageConfig;
use search_storage::error::{Error, Result};
use search_storage::iter::structural::WithinStruct;
use search_storage::iter::term::TermIterator;
use search_storage::iter::PostingIterator;
use search_storage::kv::memory::MemoryKv;
use search_storage::kv::{KvBatch, KvCursor, KvStore};
use search_storage::query::accumulator::Accumulator;
use search_storage::query::restriction::{Clause, CompareOp, Restriction};
use search_storage::query::weighting::{Bm25, WeightingFunction};
use search_storage::store::handle::StorageHandle;
use search_storage::store::metadata_table;
use search_storage::txn::pipeline::StorageTransaction;

/// Scenario 1: single document, two terms, intersected.
#[test]
fn scenario_single_document_intersect() {
    let handle = StorageHandle::open(MemoryKv::new(), StorageConfig::new()).unwrap();
    let mut txn = StorageTransaction::begin(&handle);
    let docno = txn.insert_document("d1").unwrap();
    txn.add_term("word", "a", docno, 1).unwrap();
    txn.add_term("word", "a", docno, 4).unwrap();
    txn.add_term("word", "b", docno, 2).unwrap();
    txn.commit().unwrap();

    let typeno = handle.lookup_term_type("word").unwrap();
    let a_termno = handle.lookup_term_value("a").unwrap();
    let b_termno = handle.lookup_term_value("b").unwrap();

    let a: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, typeno, a_termno));
    let b: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, typeno, b_termno));
    let mut intersect = search_storage::iter::intersect::IntersectIterator::new(vec![a, b]);

    assert_eq!(intersect.skip_doc(1).unwrap(), 1);
    // "a" and "b" never occupy the same position in this document, so the
    // intersection's own positional match (the first position shared by all
    // arguments) is empty even though both terms are present in the document.
    assert_eq!(intersect.skip_pos(0).unwrap(), 0);

    assert_eq!(handle.document_frequency(typeno, a_termno).unwrap(), 1);
    assert_eq!(handle.document_frequency(typeno, b_termno).unwrap(), 1);
}

/// Scenario 2: `within_struct` with a `cut` feature excludes the document where
/// the cut term falls inside the matched window.
#[test]
fn scenario_within_with_cut() {
    let handle = StorageHandle::open(MemoryKv::new(), StorageConfig::new()).unwrap();
    let mut txn = StorageTransaction::begin(&handle);
    let d1 = txn.insert_document("d1").unwrap();
    txn.add_term("word", "a", d1, 1).unwrap();
    txn.add_term("word", "x", d1, 2).unwrap();
    txn.add_term("word", "b", d1, 3).unwrap();
    let d2 = txn.insert_document("d2").unwrap();
    txn.add_term("word", "a", d2, 1).unwrap();
    txn.add_term("word", "b", d2, 2).unwrap();
    txn.commit().unwrap();

    let typeno = handle.lookup_term_type("word").unwrap();
    let a_termno = handle.lookup_term_value("a").unwrap();
    let b_termno = handle.lookup_term_value("b").unwrap();
    let x_termno = handle.lookup_term_value("x").unwrap();

    let build = |handle: &StorageHandle<MemoryKv>| -> WithinStruct<'_> {
        let a: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(handle, typeno, a_termno));
        let b: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(handle, typeno, b_termno));
        let cut: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(handle, typeno, x_termno));
        WithinStruct::new(vec![a, b], Some(cut), 5, true)
    };

    let mut within_d1 = build(&handle);
    assert_eq!(within_d1.skip_doc(d1).unwrap(), d1);
    assert_eq!(within_d1.skip_pos(1).unwrap(), 0, "the cut term inside the window must block the match");

    let mut within_d2 = build(&handle);
    assert_eq!(within_d2.skip_doc(d2).unwrap(), d2);
    assert_eq!(within_d2.skip_pos(1).unwrap(), 1, "no cut term present, the window matches");
}

fn seeded_metadata_handle() -> (StorageHandle<MemoryKv>, u32, u32, u32) {
    let handle = StorageHandle::open(MemoryKv::new(), StorageConfig::new()).unwrap();
    let description = MetaDataDescription::new(vec![MetaDataField { name: "year".into(), datatype: MetaDataType::Int32 }]).unwrap();
    {
        let kv = handle.kv();
        let mut batch = kv.batch();
        metadata_table::create_description(kv, &mut batch, &description).unwrap();
        batch.commit().unwrap();
    }
    handle.set_metadata_description(description);

    let mut txn = StorageTransaction::begin(&handle);
    let d1 = txn.insert_document("d1").unwrap();
    txn.add_term("word", "a", d1, 1).unwrap();
    txn.set_metadata(d1, "year", 2020.0).unwrap();
    let d2 = txn.insert_document("d2").unwrap();
    txn.add_term("word", "a", d2, 1).unwrap();
    txn.set_metadata(d2, "year", 2023.0).unwrap();
    let d3 = txn.insert_document("d3").unwrap();
    txn.add_term("word", "a", d3, 1).unwrap();
    txn.set_metadata(d3, "year", 2023.0).unwrap();
    txn.commit().unwrap();
    (handle, d1, d2, d3)
}

/// Scenario 3: a `year >= 2023` metadata restriction selects only the matching
/// documents out of a selection iterator over `term(word, "a")`.
#[test]
fn scenario_metadata_restriction() {
    let (handle, d1, d2, d3) = seeded_metadata_handle();
    let restriction = Restriction::new(vec![vec![Clause { column: "year".into(), op: CompareOp::Ge, constant: 2023.0 }]]);

    let typeno = handle.lookup_term_type("word").unwrap();
    let termno = handle.lookup_term_value("a").unwrap();
    let select: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, typeno, termno));

    let accumulator = Accumulator::new(0, 10);
    let results = accumulator.run(&handle, select, &restriction, None, |_| Ok(1.0)).unwrap();
    let matched: Vec<u32> = results.iter().map(|r| r.docno).collect();

    assert!(!matched.contains(&d1));
    assert!(matched.contains(&d2));
    assert!(matched.contains(&d3));
}

/// Scenario 4: BM25 matches the closed-form reference computation within 1e-9.
#[test]
fn scenario_bm25_matches_reference_formula() {
    let handle = StorageHandle::open(MemoryKv::new(), StorageConfig::new()).unwrap();
    let description = MetaDataDescription::new(vec![MetaDataField { name: "doclen".into(), datatype: MetaDataType::Int32 }]).unwrap();
    {
        let kv = handle.kv();
        let mut batch = kv.batch();
        metadata_table::create_description(kv, &mut batch, &description).unwrap();
        batch.commit().unwrap();
    }
    handle.set_metadata_description(description);

    let mut txn = StorageTransaction::begin(&handle);
    let mut target = 0;
    for i in 0..100u32 {
        let docno = txn.insert_document(&format!("d{i}")).unwrap();
        if i < 10 {
            txn.add_term("word", "a", docno, 1).unwrap();
        }
        if i == 0 {
            txn.add_term("word", "a", docno, 2).unwrap();
            target = docno;
        }
    }
    txn.commit().unwrap();
    {
        let kv = handle.kv();
        let description = handle.metadata_description().unwrap();
        let mut batch = kv.batch();
        metadata_table::set_uncached(kv, &mut batch, &description, target, "doclen", 10.0).unwrap();
        batch.commit().unwrap();
    }

    let typeno = handle.lookup_term_type("word").unwrap();
    let termno = handle.lookup_term_value("a").unwrap();
    let mut feature: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, typeno, termno));
    feature.skip_doc(target).unwrap();
    let mut features = vec![feature];

    let weighting = Bm25 { k1: 1.5, b: 0.75, avgdoclen: 10.0, doclen_field: "doclen".to_owned() };
    let got = weighting.weight(&handle, target, &mut features).unwrap();

    let n = 100.0_f64;
    let df = 10.0_f64;
    let tf = 2.0_f64;
    let expected_idf = ((n - df + 0.5) / (df + 0.5)).ln();
    let expected = expected_idf * (tf * 2.5) / (tf + 1.5 * (1.0 - 0.75 + 0.75));
    assert!((got - expected).abs() < 1e-9, "got {got}, expected {expected}");
}

/// A `KvStore` wrapping [`MemoryKv`] whose batch commit can be made to fail on
/// demand, for exercising the atomic-commit-failure guarantee without a real
/// backend.
struct FaultyKv {
    inner: MemoryKv,
    fail_next_commit: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl FaultyKv {
    fn new() -> Self {
        Self { inner: MemoryKv::new(), fail_next_commit: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)) }
    }

    fn arm_failure(&self) {
        self.fail_next_commit.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

struct FaultyBatch {
    inner: <MemoryKv as KvStore>::Batch,
    fail_next_commit: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl KvBatch for FaultyBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.inner.put(key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.inner.delete(key);
    }

    fn commit(self) -> Result<()> {
        if self.fail_next_commit.swap(false, std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::Backend(Box::new(std::io::Error::other("injected commit failure"))));
        }
        self.inner.commit()
    }
}

impl KvStore for FaultyKv {
    type Cursor<'a> = <MemoryKv as KvStore>::Cursor<'a>;
    type Batch = FaultyBatch;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.delete(key)
    }

    fn cursor(&self) -> Self::Cursor<'_> {
        self.inner.cursor()
    }

    fn batch(&self) -> Self::Batch {
        FaultyBatch { inner: self.inner.batch(), fail_next_commit: std::sync::Arc::clone(&self.fail_next_commit) }
    }
}

/// Scenario 5: a failure injected in the final `KvStore` batch commit leaves
/// `NofDocs` and every block unchanged.
#[test]
fn scenario_commit_atomicity_under_failure() {
    let kv = FaultyKv::new();
    let handle = StorageHandle::open(kv, StorageConfig::new()).unwrap();
    assert_eq!(handle.nof_docs().unwrap(), 0);

    handle.kv().arm_failure();
    let mut txn = StorageTransaction::begin(&handle);
    for i in 0..1000u32 {
        let docno = txn.insert_document(&format!("d{i}")).unwrap();
        txn.add_term("word", "a", docno, 1).unwrap();
    }
    let result = txn.commit();
    assert!(result.is_err());

    assert_eq!(handle.nof_docs().unwrap(), 0);
    assert_eq!(handle.lookup_doc_id("d0").unwrap(), 0);
    assert_eq!(handle.lookup_term_type("word").unwrap(), 0);

    // The transaction's staged documents and terms survive the failed commit, so
    // retrying the same transaction (without re-staging anything) succeeds.
    txn.commit().unwrap();
    assert_eq!(handle.nof_docs().unwrap(), 1000);
    assert!(handle.lookup_doc_id("d0").unwrap() != 0);
    assert!(handle.lookup_term_type("word").unwrap() != 0);
}

/// Scenario 6: ACL-scoped query returns only the documents the querying user
/// can access.
#[test]
fn scenario_acl_scoped_query() {
    let handle = StorageHandle::open(MemoryKv::new(), StorageConfig::new().acl_enabled(true)).unwrap();
    let mut txn = StorageTransaction::begin(&handle);
    let mut docs = Vec::new();
    for i in 1..=5u32 {
        let docno = txn.insert_document(&format!("d{i}")).unwrap();
        txn.add_term("word", "z", docno, 1).unwrap();
        docs.push(docno);
    }
    txn.grant_acl(docs[0], "u1").unwrap();
    txn.grant_acl(docs[1], "u1").unwrap();
    txn.grant_acl(docs[1], "u2").unwrap();
    txn.grant_acl(docs[4], "u2").unwrap();
    txn.commit().unwrap();

    let typeno = handle.lookup_term_type("word").unwrap();
    let termno = handle.lookup_term_value("z").unwrap();
    let select: Box<dyn PostingIterator + '_> = Box::new(TermIterator::new(&handle, typeno, termno));

    let u2 = handle.lookup_user_name("u2").unwrap();
    let accumulator = Accumulator::new(0, 10);
    let results = accumulator.run(&handle, select, &Restriction::default(), Some(u2), |_| Ok(1.0)).unwrap();
    let matched: Vec<u32> = results.iter().map(|r| r.docno).collect();

    assert_eq!(matched.len(), 2);
    assert!(matched.contains(&docs[1]));
    assert!(matched.contains(&docs[4]));
}
