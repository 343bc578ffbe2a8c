// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Weighting-function contract: a named, numerically-parameterized
//! per-document scoring function attached to one or more feature sets. Grounded in
//! `original_source`'s `weighting_standard.cpp` function registry (`Bm25`,
//! `Bm25pff`, `Constant`, `TermFrequency`, `Metadata`, `Formula`) and
//! `weightingBM25.cpp`/`weightingBM25pff.hpp` for the two IDF-based formulas.
//!
//! A function is handed its bound feature iterators already `skip_doc`'d to the
//! current candidate by [`super::accumulator::Accumulator`]; an iterator whose
//! `docno()` doesn't equal the candidate simply contributes nothing for that call.

use crate::error::Result;
use crate::iter::PostingIterator;
use crate::keys::{GlobalCounter, Index};
use crate::kv::KvStore;
use crate::store::handle::StorageHandle;

/// Per-document weighting contract. Implementations must return a non-negative
/// value.
pub trait WeightingFunction<S: KvStore> {
    /// Computes this function's contribution for `docno`, given the posting
    /// iterators bound to it via `WITH <set>`.
    fn weight(&self, handle: &StorageHandle<S>, docno: Index, features: &mut [Box<dyn PostingIterator + '_>]) -> Result<f64>;
}

fn idf(df: GlobalCounter, nof_docs: GlobalCounter) -> f64 {
    ((nof_docs as f64 - df as f64 + 0.5) / (df as f64 + 0.5)).ln()
}

/// BM25: parameters `k1, b, avgdoclen, doclen_field`.
#[derive(Clone, Debug)]
pub struct Bm25 {
    pub k1: f64,
    pub b: f64,
    pub avgdoclen: f64,
    pub doclen_field: String,
}

impl<S: KvStore> WeightingFunction<S> for Bm25 {
    fn weight(&self, handle: &StorageHandle<S>, docno: Index, features: &mut [Box<dyn PostingIterator + '_>]) -> Result<f64> {
        let nof_docs = handle.nof_docs()?;
        let doclen = handle.metadata_value(docno, &self.doclen_field)?.unwrap_or(self.avgdoclen);
        let relative_doclen = if self.avgdoclen > 0.0 { doclen / self.avgdoclen } else { 1.0 };
        let mut total = 0.0;
        for feature in features.iter_mut() {
            if feature.docno() != docno {
                continue;
            }
            let tf = feature.frequency() as f64;
            if tf == 0.0 {
                continue;
            }
            let df = feature.document_frequency()?;
            if df == 0 {
                continue;
            }
            let numerator = tf * (self.k1 + 1.0);
            let denominator = tf + self.k1 * (1.0 - self.b + self.b * relative_doclen);
            total += idf(df, nof_docs) * numerator / denominator;
        }
        Ok(total.max(0.0))
    }
}

/// BM25pff: BM25 plus a proximity bonus and a title bonus. A
/// simplified but faithful rendition of `original_source`'s
/// `WeightingFunctionContextBM25pff::call`: proximity weight accrues to any
/// window of `windowsize` consecutive positions that holds hits from at least
/// `cardinality` distinct bound features whose `df <= maxdf * N`, weighted
/// inversely by the window's span; a title bonus of `titleinc` per hit is added
/// for any position at or before `title_maxpos`, normalized by `title_size` if
/// nonzero.
#[derive(Clone, Debug)]
pub struct Bm25pff {
    pub k1: f64,
    pub b: f64,
    pub avgdoclen: f64,
    pub doclen_field: String,
    pub windowsize: u32,
    pub cardinality: usize,
    pub maxdf: f64,
    pub titleinc: f64,
    pub title_maxpos_field: String,
    pub title_size_field: String,
}

impl<S: KvStore> WeightingFunction<S> for Bm25pff {
    fn weight(&self, handle: &StorageHandle<S>, docno: Index, features: &mut [Box<dyn PostingIterator + '_>]) -> Result<f64> {
        let base = Bm25 {
            k1: self.k1,
            b: self.b,
            avgdoclen: self.avgdoclen,
            doclen_field: self.doclen_field.clone(),
        }
        .weight(handle, docno, features)?;

        let nof_docs = handle.nof_docs()?;
        let mut events: Vec<(Index, usize)> = Vec::new();
        for (idx, feature) in features.iter_mut().enumerate() {
            if feature.docno() != docno {
                continue;
            }
            let df = feature.document_frequency()?;
            if nof_docs > 0 && (df as f64) > self.maxdf * nof_docs as f64 {
                continue;
            }
            let mut pos = feature.skip_pos(0)?;
            while pos != 0 {
                events.push((Index::from(pos), idx));
                pos = feature.skip_pos(pos + 1)?;
            }
        }
        events.sort_unstable();

        let mut proximity_bonus = 0.0;
        for i in 0..events.len() {
            let start = events[i].0;
            let mut distinct = rustc_hash::FxHashSet::default();
            distinct.insert(events[i].1);
            let mut end = start;
            for &(pos, idx) in &events[i + 1..] {
                if pos > start + self.windowsize {
                    break;
                }
                distinct.insert(idx);
                end = pos;
            }
            if distinct.len() >= self.cardinality.max(1) {
                let span = end.saturating_sub(start).max(1);
                proximity_bonus += 1.0 / f64::from(span);
            }
        }

        let mut title_bonus = 0.0;
        if self.titleinc > 0.0 {
            let title_maxpos = handle.metadata_value(docno, &self.title_maxpos_field)?.unwrap_or(0.0);
            if title_maxpos > 0.0 {
                for feature in features.iter_mut() {
                    if feature.docno() != docno {
                        continue;
                    }
                    let mut pos = feature.skip_pos(0)?;
                    while pos != 0 {
                        if f64::from(pos) <= title_maxpos {
                            title_bonus += self.titleinc;
                        }
                        pos = feature.skip_pos(pos + 1)?;
                    }
                }
                let title_size = handle.metadata_value(docno, &self.title_size_field)?.unwrap_or(0.0);
                if title_size > 0.0 {
                    title_bonus /= title_size;
                }
            }
        }

        Ok((base + proximity_bonus + title_bonus).max(0.0))
    }
}

/// A fixed scalar, ignoring every bound feature.
#[derive(Clone, Copy, Debug)]
pub struct Constant {
    pub value: f64,
}

impl<S: KvStore> WeightingFunction<S> for Constant {
    fn weight(&self, _handle: &StorageHandle<S>, _docno: Index, _features: &mut [Box<dyn PostingIterator + '_>]) -> Result<f64> {
        Ok(self.value.max(0.0))
    }
}

/// Sum of `frequency()` across every bound feature landing on the candidate.
#[derive(Clone, Copy, Debug, Default)]
pub struct TermFrequency;

impl<S: KvStore> WeightingFunction<S> for TermFrequency {
    fn weight(&self, _handle: &StorageHandle<S>, docno: Index, features: &mut [Box<dyn PostingIterator + '_>]) -> Result<f64> {
        Ok(features.iter().filter(|f| f.docno() == docno).map(|f| f.frequency() as f64).sum())
    }
}

/// A single metadata column's value, read directly (no feature iterators used).
#[derive(Clone, Debug)]
pub struct Metadata {
    pub field: String,
}

impl<S: KvStore> WeightingFunction<S> for Metadata {
    fn weight(&self, handle: &StorageHandle<S>, docno: Index, _features: &mut [Box<dyn PostingIterator + '_>]) -> Result<f64> {
        Ok(handle.metadata_value(docno, &self.field)?.unwrap_or(0.0).max(0.0))
    }
}

/// One term of a [`Formula`] combination.
#[derive(Clone, Debug)]
pub enum FormulaTerm {
    /// `coefficient * sum(frequency() over bound features landing on the doc)`.
    FeatureFrequency { coefficient: f64 },
    /// `coefficient * metadata[field]` (0 if the column is unset or absent).
    Metadata { coefficient: f64, field: String },
    /// A fixed additive term.
    Constant(f64),
}

/// A linear combination of feature-frequency, metadata and constant terms —
/// a straightforward per-feature or per-metadata-column combinator.
#[derive(Clone, Debug, Default)]
pub struct Formula {
    pub terms: Vec<FormulaTerm>,
}

impl<S: KvStore> WeightingFunction<S> for Formula {
    fn weight(&self, handle: &StorageHandle<S>, docno: Index, features: &mut [Box<dyn PostingIterator + '_>]) -> Result<f64> {
        let mut total = 0.0;
        for term in &self.terms {
            total += match term {
                FormulaTerm::FeatureFrequency { coefficient } => {
                    coefficient * features.iter().filter(|f| f.docno() == docno).map(|f| f.frequency() as f64).sum::<f64>()
                }
                FormulaTerm::Metadata { coefficient, field } => coefficient * handle.metadata_value(docno, field)?.unwrap_or(0.0),
                FormulaTerm::Constant(c) => *c,
            };
        }
        Ok(total.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::metadata::{MetaDataField, MetaDataType};
    use crate::config::StorageConfig;
    use crate::kv::memory::MemoryKv;
    use crate::store::metadata_table;
    use crate::txn::pipeline::StorageTransaction;

    fn handle_with_docs(n: u32, df: u32) -> (StorageHandle<MemoryKv>, Index) {
        let kv = MemoryKv::new();
        let handle = StorageHandle::open(kv, StorageConfig::new()).unwrap();
        let mut txn = StorageTransaction::begin(&handle);
        let mut target_docno = 0;
        for i in 0..n {
            let docno = txn.insert_document(&format!("d{i}")).unwrap();
            if i < df {
                txn.add_term("word", "a", docno, 1).unwrap();
            }
            if i == 0 {
                target_docno = docno;
            }
        }
        txn.commit().unwrap();
        (handle, target_docno)
    }

    #[test]
    fn bm25_matches_the_closed_form_reference_computation() {
        let (handle, docno) = handle_with_docs(100, 10);
        let description = crate::block::metadata::MetaDataDescription::new(vec![MetaDataField {
            name: "doclen".into(),
            datatype: MetaDataType::Int32,
        }])
        .unwrap();
        let kv = handle.kv();
        let mut batch = kv.batch();
        metadata_table::create_description(kv, &mut batch, &description).unwrap();
        metadata_table::set_uncached(kv, &mut batch, &description, docno, "doclen", 10.0).unwrap();
        batch.commit().unwrap();
        handle.set_metadata_description(description);

        let typeno = handle.lookup_term_type("word").unwrap();
        let termno = handle.lookup_term_value("a").unwrap();
        let mut iter: Box<dyn PostingIterator + '_> = Box::new(crate::iter::term::TermIterator::new(&handle, typeno, termno));
        iter.skip_doc(docno).unwrap();
        let mut features = vec![iter];

        let weighting = Bm25 { k1: 1.5, b: 0.75, avgdoclen: 10.0, doclen_field: "doclen".to_owned() };
        let got = weighting.weight(&handle, docno, &mut features).unwrap();

        let n = 100u64;
        let df = 10u64;
        let tf = 1.0;
        let expected_idf = ((n as f64 - df as f64 + 0.5) / (df as f64 + 0.5)).ln();
        let expected = expected_idf * (tf * 2.5) / (tf + 1.5 * (1.0 - 0.75 + 0.75));
        assert!((got - expected).abs() < 1e-9, "got {got}, expected {expected}");
    }

    #[test]
    fn constant_ignores_features_and_clamps_negative_to_zero() {
        let (handle, docno) = handle_with_docs(1, 0);
        let mut features: Vec<Box<dyn PostingIterator>> = Vec::new();
        assert_eq!(Constant { value: 3.0 }.weight(&handle, docno, &mut features).unwrap(), 3.0);
        assert_eq!(Constant { value: -1.0 }.weight(&handle, docno, &mut features).unwrap(), 0.0);
    }

    #[test]
    fn term_frequency_sums_bound_feature_frequencies() {
        let (handle, docno) = handle_with_docs(5, 5);
        let typeno = handle.lookup_term_type("word").unwrap();
        let termno = handle.lookup_term_value("a").unwrap();
        let mut iter: Box<dyn PostingIterator + '_> = Box::new(crate::iter::term::TermIterator::new(&handle, typeno, termno));
        iter.skip_doc(docno).unwrap();
        let mut features = vec![iter];
        assert_eq!(TermFrequency.weight(&handle, docno, &mut features).unwrap(), 1.0);
    }

    #[test]
    fn metadata_weighting_reads_the_named_column() {
        let (handle, docno) = handle_with_docs(1, 0);
        let description = crate::block::metadata::MetaDataDescription::new(vec![MetaDataField {
            name: "score".into(),
            datatype: MetaDataType::Float32,
        }])
        .unwrap();
        let kv = handle.kv();
        let mut batch = kv.batch();
        metadata_table::create_description(kv, &mut batch, &description).unwrap();
        metadata_table::set_uncached(kv, &mut batch, &description, docno, "score", 4.5).unwrap();
        batch.commit().unwrap();
        handle.set_metadata_description(description);

        let mut features: Vec<Box<dyn PostingIterator>> = Vec::new();
        let got = Metadata { field: "score".to_owned() }.weight(&handle, docno, &mut features).unwrap();
        assert!((got - 4.5).abs() < 1e-6);
    }

    #[test]
    fn formula_combines_terms_linearly() {
        let (handle, docno) = handle_with_docs(1, 0);
        let formula = Formula {
            terms: vec![FormulaTerm::Constant(1.5), FormulaTerm::Constant(2.5)],
        };
        let mut features: Vec<Box<dyn PostingIterator>> = Vec::new();
        assert_eq!(formula.weight(&handle, docno, &mut features).unwrap(), 4.0);
    }
}
