// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Summarizer contract: per-result summary fields, computed from a
//! document's attributes, metadata, or matched feature positions. Grounded in
//! `original_source`'s `summarizerMetaData.cpp`, `summarizerMatchVariables.cpp`
//! and `summarizerAccumulateVariable.cpp`.

use crate::error::Result;
use crate::iter::PostingIterator;
use crate::keys::Index;
use crate::kv::KvStore;
use crate::store::handle::StorageHandle;

/// One named piece of a result's summary, mirroring `original_source`'s
/// `SummaryElement`: a name, a formatted value, a weight (used to rank multiple
/// elements of the same name), and an index disambiguating repeats.
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryElement {
    pub name: String,
    pub value: String,
    pub weight: f64,
    pub index: usize,
}

/// Produces zero or more [`SummaryElement`]s for a ranked result.
pub trait SummarizerFunction<S: KvStore> {
    fn summarize(&self, handle: &StorageHandle<S>, docno: Index, features: &mut [Box<dyn PostingIterator + '_>]) -> Result<Vec<SummaryElement>>;
}

/// Emits a document attribute verbatim, under `name`.
#[derive(Clone, Debug)]
pub struct Attribute {
    pub name: String,
    pub attribute_name: String,
}

impl<S: KvStore> SummarizerFunction<S> for Attribute {
    fn summarize(&self, handle: &StorageHandle<S>, docno: Index, _features: &mut [Box<dyn PostingIterator + '_>]) -> Result<Vec<SummaryElement>> {
        Ok(match handle.attribute(docno, &self.attribute_name)? {
            Some(value) => vec![SummaryElement { name: self.name.clone(), value, weight: 1.0, index: 0 }],
            None => Vec::new(),
        })
    }
}

/// Emits a metadata column's value, formatted with Rust's default `f64` display.
#[derive(Clone, Debug)]
pub struct MetaData {
    pub name: String,
    pub field: String,
}

impl<S: KvStore> SummarizerFunction<S> for MetaData {
    fn summarize(&self, handle: &StorageHandle<S>, docno: Index, _features: &mut [Box<dyn PostingIterator + '_>]) -> Result<Vec<SummaryElement>> {
        Ok(match handle.metadata_value(docno, &self.field)? {
            Some(value) => vec![SummaryElement { name: self.name.clone(), value: value.to_string(), weight: value, index: 0 }],
            None => Vec::new(),
        })
    }
}

/// Reads the forward-index term string at every matched position of every bound
/// feature landing on the candidate, one [`SummaryElement`] per position. Grounded
/// in `SummarizerFunctionContextMatchVariables::getSummary`'s per-hit loop.
#[derive(Clone, Debug)]
pub struct MatchVariables {
    pub name: String,
    pub type_name: String,
}

impl<S: KvStore> SummarizerFunction<S> for MatchVariables {
    fn summarize(&self, handle: &StorageHandle<S>, docno: Index, features: &mut [Box<dyn PostingIterator + '_>]) -> Result<Vec<SummaryElement>> {
        let mut out = Vec::new();
        for feature in features.iter_mut() {
            if feature.docno() != docno {
                continue;
            }
            let mut pos = feature.skip_pos(0)?;
            while pos != 0 {
                if let Some(term) = handle.forward_term_at(&self.type_name, docno, pos)? {
                    out.push(SummaryElement {
                        name: self.name.clone(),
                        value: term,
                        weight: 1.0,
                        index: out.len(),
                    });
                }
                pos = feature.skip_pos(pos + 1)?;
            }
        }
        Ok(out)
    }
}

/// Accumulates a weight per matched position across bound features (the product
/// of each contributing feature's per-occurrence weight, here simply `1.0` per
/// occurrence since features carry no scalar weight of their own at this layer),
/// keeping only the top `max_elements` by weight. Grounded in
/// `SummarizerFunctionContextAccumulateVariable::getSummary`'s bounded ranker.
#[derive(Clone, Debug)]
pub struct AccumulateVariable {
    pub name: String,
    pub type_name: String,
    pub max_elements: usize,
}

impl<S: KvStore> SummarizerFunction<S> for AccumulateVariable {
    fn summarize(&self, handle: &StorageHandle<S>, docno: Index, features: &mut [Box<dyn PostingIterator + '_>]) -> Result<Vec<SummaryElement>> {
        let mut by_position: std::collections::BTreeMap<crate::iter::Position, f64> = std::collections::BTreeMap::new();
        for feature in features.iter_mut() {
            if feature.docno() != docno {
                continue;
            }
            let mut pos = feature.skip_pos(0)?;
            while pos != 0 {
                *by_position.entry(pos).or_insert(0.0) += 1.0;
                pos = feature.skip_pos(pos + 1)?;
            }
        }

        let mut ranked: Vec<(crate::iter::Position, f64)> = by_position.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(self.max_elements);

        let mut out = Vec::with_capacity(ranked.len());
        for (index, (pos, weight)) in ranked.into_iter().enumerate() {
            if let Some(term) = handle.forward_term_at(&self.type_name, docno, pos)? {
                out.push(SummaryElement { name: self.name.clone(), value: term, weight, index });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::kv::memory::MemoryKv;
    use crate::txn::pipeline::StorageTransaction;

    fn seeded_handle() -> (StorageHandle<MemoryKv>, Index) {
        let kv = MemoryKv::new();
        let handle = StorageHandle::open(kv, StorageConfig::new()).unwrap();
        let mut txn = StorageTransaction::begin(&handle);
        let docno = txn.insert_document("d1").unwrap();
        txn.set_attribute(docno, "title", Some("hello world".to_owned())).unwrap();
        txn.add_term("word", "hello", docno, 1).unwrap();
        txn.add_term("word", "world", docno, 2).unwrap();
        txn.commit().unwrap();
        (handle, docno)
    }

    #[test]
    fn attribute_summarizer_emits_the_stored_value() {
        let (handle, docno) = seeded_handle();
        let summarizer = Attribute { name: "title".into(), attribute_name: "title".into() };
        let mut features: Vec<Box<dyn PostingIterator>> = Vec::new();
        let result = summarizer.summarize(&handle, docno, &mut features).unwrap();
        assert_eq!(result, vec![SummaryElement { name: "title".into(), value: "hello world".into(), weight: 1.0, index: 0 }]);
    }

    #[test]
    fn attribute_summarizer_is_empty_when_unset() {
        let (handle, docno) = seeded_handle();
        let summarizer = Attribute { name: "abstract".into(), attribute_name: "abstract".into() };
        let mut features: Vec<Box<dyn PostingIterator>> = Vec::new();
        assert!(summarizer.summarize(&handle, docno, &mut features).unwrap().is_empty());
    }

    #[test]
    fn match_variables_reads_forward_terms_at_every_hit_position() {
        let (handle, docno) = seeded_handle();
        let typeno = handle.lookup_term_type("word").unwrap();
        let termno = handle.lookup_term_value("hello").unwrap();
        let mut iter: Box<dyn PostingIterator + '_> = Box::new(crate::iter::term::TermIterator::new(&handle, typeno, termno));
        iter.skip_doc(docno).unwrap();
        let mut features = vec![iter];

        let summarizer = MatchVariables { name: "match".into(), type_name: "word".into() };
        let result = summarizer.summarize(&handle, docno, &mut features).unwrap();
        assert_eq!(result, vec![SummaryElement { name: "match".into(), value: "hello".into(), weight: 1.0, index: 0 }]);
    }

    #[test]
    fn accumulate_variable_truncates_to_the_configured_maximum() {
        let (handle, docno) = seeded_handle();
        let typeno = handle.lookup_term_type("word").unwrap();
        let hello = handle.lookup_term_value("hello").unwrap();
        let world = handle.lookup_term_value("world").unwrap();
        let mut hello_iter: Box<dyn PostingIterator + '_> = Box::new(crate::iter::term::TermIterator::new(&handle, typeno, hello));
        hello_iter.skip_doc(docno).unwrap();
        let mut world_iter: Box<dyn PostingIterator + '_> = Box::new(crate::iter::term::TermIterator::new(&handle, typeno, world));
        world_iter.skip_doc(docno).unwrap();
        let mut features = vec![hello_iter, world_iter];

        let summarizer = AccumulateVariable { name: "acc".into(), type_name: "word".into(), max_elements: 1 };
        let result = summarizer.summarize(&handle, docno, &mut features).unwrap();
        assert_eq!(result.len(), 1);
    }
}
