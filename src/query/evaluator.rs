// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Ties the evaluation program ([`super::program`]), the posting-iterator
//! algebra ([`crate::iter`]), the accumulator ([`super::accumulator`]) and the
//! weighting/summarizer plug-in contracts ([`super::weighting`],
//! [`super::summarizer`]) into a four-step execution: build feature-set
//! iterators, compile the metadata restriction and ACL filter, accumulate a
//! bounded top-K ranking, then summarize the page of results that survives.

use super::accumulator::{Accumulator, Ranked};
use super::program::{EvalDecl, ParamValue, Program, SummarizeDecl, TermDecl, TermValueSpec};
use super::restriction::Restriction;
use super::summarizer::{AccumulateVariable, Attribute, MetaData, MatchVariables, SummarizerFunction, SummaryElement};
use super::weighting::{Bm25, Bm25pff, Constant, Formula, FormulaTerm, Metadata, TermFrequency, WeightingFunction};
use crate::error::{Error, Result};
use crate::iter::factory::{self, JoinOp};
use crate::iter::union::UnionIterator;
use crate::iter::PostingIterator;
use crate::keys::Index;
use crate::kv::KvStore;
use crate::store::dictionary;
use crate::store::handle::StorageHandle;
use crate::store::keyspace;

/// One ranked-and-summarized query result.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluatedResult {
    pub docno: Index,
    pub weight: f64,
    pub summary: Vec<SummaryElement>,
}

/// Compiles and runs one [`Program`] against a [`StorageHandle`].
pub struct QueryEvaluator<'h, S: KvStore> {
    handle: &'h StorageHandle<S>,
    program: Program,
}

impl<'h, S: KvStore> QueryEvaluator<'h, S> {
    /// Binds a parsed program to a storage handle.
    #[must_use]
    pub fn new(handle: &'h StorageHandle<S>, program: Program) -> Self {
        Self { handle, program }
    }

    fn term_value_name(&self, decl: &TermDecl) -> Result<String> {
        match &decl.value {
            TermValueSpec::Literal(name) => Ok(name.clone()),
            TermValueSpec::Id(termno) => dictionary::lookup_inverse(self.handle.kv(), &keyspace::term_value_inv_key(*termno))?
                .ok_or(Error::InvalidArgument("query program: TERM id has no inverse dictionary entry")),
        }
    }

    fn set_decls(&self, set_name: &str) -> Vec<&TermDecl> {
        self.program.terms.iter().filter(|t| t.set == set_name).collect()
    }

    /// Builds one fresh [`TermIterator`](crate::iter::term::TermIterator) (or
    /// [`NullIterator`](crate::iter::null::NullIterator)) per `TERM` declaration
    /// in `set_name`, in declaration order.
    fn build_set_iterators(&self, set_name: &str) -> Result<Vec<Box<dyn PostingIterator + 'h>>> {
        self.set_decls(set_name)
            .into_iter()
            .map(|decl| {
                let value = self.term_value_name(decl)?;
                factory::term_iterator(self.handle, &decl.type_name, &value)
            })
            .collect()
    }

    /// A feature set's iterators combined by union, the grammar's implicit
    /// semantics for "the set of documents/positions this named feature set
    /// matches".
    fn build_set_union(&self, set_name: &str) -> Result<Box<dyn PostingIterator + 'h>> {
        let mut leaves = self.build_set_iterators(set_name)?;
        if leaves.is_empty() {
            return Err(Error::InvalidArgument("query program: referenced feature set has no TERM declarations"));
        }
        if leaves.len() == 1 {
            return Ok(leaves.pop().expect("checked len == 1"));
        }
        Ok(factory::create_result_iterator(JoinOp::Union, leaves, None, 0, 0)?)
    }

    fn selection_iterator(&self) -> Result<Box<dyn PostingIterator + 'h>> {
        if self.program.select_sets.is_empty() {
            return Err(Error::InvalidArgument("query program: no SELECT sets declared"));
        }
        let mut unions: Vec<Box<dyn PostingIterator + 'h>> =
            self.program.select_sets.iter().map(|set| self.build_set_union(set)).collect::<Result<_>>()?;
        if unions.len() == 1 {
            return Ok(unions.pop().expect("checked len == 1"));
        }
        Ok(Box::new(UnionIterator::new(unions)))
    }

    /// Every restrict set must have a hit at the candidate docno — restriction
    /// sets only ever reject candidates, never select them.
    fn passes_restrict_sets(&self, restrict_iterators: &mut [Box<dyn PostingIterator + 'h>], docno: Index) -> Result<bool> {
        for iterator in restrict_iterators.iter_mut() {
            if iterator.skip_doc(docno)? != docno {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn named_number(params: &[(String, ParamValue)], name: &str, default: f64) -> f64 {
        params.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).and_then(|(_, v)| v.as_number()).unwrap_or(default)
    }

    fn named_name(params: &[(String, ParamValue)], name: &str) -> Option<String> {
        params.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).and_then(|(_, v)| v.as_name()).map(str::to_owned)
    }

    /// Builds the concrete weighting function named by `decl.name`: one
    /// of `BM25`, `BM25pff`, `Constant`, `TermFrequency`, `Metadata`, `Formula`,
    /// matched case-insensitively.
    fn build_weighting(decl: &EvalDecl) -> Result<Box<dyn WeightingFunction<S>>> {
        let num = |name: &str, default: f64| Self::named_number(&decl.params, name, default);
        let text = |name: &str| Self::named_name(&decl.params, name).unwrap_or_default();

        match decl.name.to_lowercase().as_str() {
            "bm25" => Ok(Box::new(Bm25 { k1: num("k1", 1.2), b: num("b", 0.75), avgdoclen: num("avgdoclen", 0.0), doclen_field: text("doclen") })),
            "bm25pff" => Ok(Box::new(Bm25pff {
                k1: num("k1", 1.2),
                b: num("b", 0.75),
                avgdoclen: num("avgdoclen", 0.0),
                doclen_field: text("doclen"),
                windowsize: num("windowsize", 20.0) as u32,
                cardinality: num("cardinality", 2.0) as usize,
                maxdf: num("maxdf", 0.5),
                titleinc: num("titleinc", 0.0),
                title_maxpos_field: text("title_maxpos"),
                title_size_field: text("title_size"),
            })),
            "constant" => Ok(Box::new(Constant { value: num("value", 1.0) })),
            "termfrequency" => Ok(Box::new(TermFrequency)),
            "metadata" => Ok(Box::new(Metadata { field: text("field") })),
            "formula" => {
                let mut terms = Vec::new();
                let mut i = 1usize;
                loop {
                    let coef_key = format!("freq{i}");
                    let meta_field_key = format!("meta{i}_field");
                    let meta_coef_key = format!("meta{i}_coef");
                    let const_key = format!("const{i}");
                    let mut found = false;
                    if let Some(coef) = decl.params.iter().find(|(n, _)| n == &coef_key).and_then(|(_, v)| v.as_number()) {
                        terms.push(FormulaTerm::FeatureFrequency { coefficient: coef });
                        found = true;
                    }
                    if let Some(field) = decl.params.iter().find(|(n, _)| n == &meta_field_key).and_then(|(_, v)| v.as_name()) {
                        let coef = decl.params.iter().find(|(n, _)| n == &meta_coef_key).and_then(|(_, v)| v.as_number()).unwrap_or(1.0);
                        terms.push(FormulaTerm::Metadata { coefficient: coef, field: field.to_owned() });
                        found = true;
                    }
                    if let Some(c) = decl.params.iter().find(|(n, _)| n == &const_key).and_then(|(_, v)| v.as_number()) {
                        terms.push(FormulaTerm::Constant(c));
                        found = true;
                    }
                    if !found {
                        break;
                    }
                    i += 1;
                }
                Ok(Box::new(Formula { terms }))
            }
            _ => Err(Error::InvalidArgument("query program: unknown EVAL function name")),
        }
    }

    /// Builds the concrete summarizer named by `decl.name`: one of
    /// `Attribute`, `MetaData`, `MatchVariables`, `AccumulateVariable`.
    fn build_summarizer(decl: &SummarizeDecl) -> Result<Box<dyn SummarizerFunction<S>>> {
        let text = |name: &str| Self::named_name(&decl.params, name).unwrap_or_default();
        let num = |name: &str, default: f64| Self::named_number(&decl.params, name, default);

        match decl.name.to_lowercase().as_str() {
            "attribute" => Ok(Box::new(Attribute { name: decl.attribute.clone(), attribute_name: text("attribute") })),
            "metadata" => Ok(Box::new(MetaData { name: decl.attribute.clone(), field: text("field") })),
            "matchvariables" => Ok(Box::new(MatchVariables { name: decl.attribute.clone(), type_name: text("type") })),
            "accumulatevariable" => Ok(Box::new(AccumulateVariable {
                name: decl.attribute.clone(),
                type_name: text("type"),
                max_elements: num("max", 3.0) as usize,
            })),
            _ => Err(Error::InvalidArgument("query program: unknown SUMMARIZE function name")),
        }
    }

    /// Runs the program: builds the selection iterator and the
    /// restrict-set filters, accumulates a ranked top-`[min_rank, min_rank+max_nof_ranks)`
    /// page subject to `restriction` and `userno`'s ACL, then runs every
    /// declared summarizer against each surviving result.
    pub fn evaluate(&self, restriction: &Restriction, userno: Option<Index>, min_rank: usize, max_nof_ranks: usize) -> Result<Vec<EvaluatedResult>> {
        log::debug!(
            "evaluating query program ({} select set(s), {} restrict set(s), {} weighting function(s))",
            self.program.select_sets.len(),
            self.program.restrict_sets.len(),
            self.program.evals.len()
        );

        let select = self.selection_iterator()?;
        let mut restrict_iterators: Vec<Box<dyn PostingIterator + 'h>> =
            self.program.restrict_sets.iter().map(|set| self.build_set_union(set)).collect::<Result<_>>()?;

        let mut weightings = Vec::with_capacity(self.program.evals.len());
        for decl in &self.program.evals {
            let function = Self::build_weighting(decl)?;
            let features = decl
                .with_sets
                .iter()
                .map(|set| self.build_set_iterators(set))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .flatten()
                .collect::<Vec<_>>();
            weightings.push((function, features));
        }

        let accumulator = Accumulator::new(min_rank, max_nof_ranks);
        let ranked: Vec<Ranked> = accumulator.run(self.handle, select, restriction, userno, |docno| {
            if !self.passes_restrict_sets(&mut restrict_iterators, docno)? {
                return Ok(f64::NEG_INFINITY);
            }
            let mut total = 0.0;
            for (function, features) in &mut weightings {
                for feature in features.iter_mut() {
                    feature.skip_doc(docno)?;
                }
                total += function.weight(self.handle, docno, features)?;
            }
            Ok(total)
        })?;
        // Candidates a restrict set rejected were scored as -inf; drop them here
        // rather than inside the accumulator, which has no notion of rejection.
        let ranked: Vec<Ranked> = ranked.into_iter().filter(|r| r.weight.is_finite()).collect();

        let mut summarizers = Vec::with_capacity(self.program.summarizers.len());
        for decl in &self.program.summarizers {
            let function = Self::build_summarizer(decl)?;
            summarizers.push((decl, function));
        }

        let mut results = Vec::with_capacity(ranked.len());
        for r in ranked {
            let mut summary = Vec::new();
            for (decl, function) in &summarizers {
                let mut features: Vec<Box<dyn PostingIterator + 'h>> = Vec::new();
                // Feature-set parameters (named anything; distinguished by
                // resolving to a declared TERM set) are bound for this result.
                for (_, value) in &decl.params {
                    if let Some(set_name) = value.as_name() {
                        if self.program.terms.iter().any(|t| t.set == set_name) {
                            features.extend(self.build_set_iterators(set_name)?);
                        }
                    }
                }
                for feature in features.iter_mut() {
                    feature.skip_doc(r.docno)?;
                }
                summary.extend(function.summarize(self.handle, r.docno, &mut features)?);
            }
            results.push(EvaluatedResult { docno: r.docno, weight: r.weight, summary });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::kv::memory::MemoryKv;
    use crate::query::program::Program;
    use crate::txn::pipeline::StorageTransaction;

    fn seeded_handle() -> StorageHandle<MemoryKv> {
        let handle = StorageHandle::open(MemoryKv::new(), StorageConfig::new()).unwrap();
        let mut txn = StorageTransaction::begin(&handle);
        let d1 = txn.insert_document("d1").unwrap();
        txn.add_term("word", "hello", d1, 1).unwrap();
        txn.set_attribute(d1, "title", Some("hello doc".to_owned())).unwrap();
        let d2 = txn.insert_document("d2").unwrap();
        txn.add_term("word", "hello", d2, 1).unwrap();
        txn.add_term("word", "hello", d2, 4).unwrap();
        txn.set_attribute(d2, "title", Some("hello hello".to_owned())).unwrap();
        txn.commit().unwrap();
        handle
    }

    #[test]
    fn evaluates_a_constant_weighted_query_with_an_attribute_summary() {
        let handle = seeded_handle();
        let program = Program::parse(
            r#"
                TERM sel "hello" : word ;
                SELECT sel ;
                EVAL Constant(value=1) WITH sel ;
                SUMMARIZE title = Attribute(attribute=title) ;
            "#,
        )
        .unwrap();
        let evaluator = QueryEvaluator::new(&handle, program);
        let restriction = Restriction::default();
        let results = evaluator.evaluate(&restriction, None, 0, 10).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| (r.weight - 1.0).abs() < 1e-9));
        assert!(results.iter().all(|r| r.summary.iter().any(|s| s.name == "title")));
    }

    #[test]
    fn term_frequency_weighting_ranks_repeated_hits_first() {
        let handle = seeded_handle();
        let program = Program::parse(
            r#"
                TERM sel "hello" : word ;
                SELECT sel ;
                EVAL TermFrequency() WITH sel ;
            "#,
        )
        .unwrap();
        let evaluator = QueryEvaluator::new(&handle, program);
        let restriction = Restriction::default();
        let results = evaluator.evaluate(&restriction, None, 0, 10).unwrap();
        assert_eq!(results[0].docno, handle.lookup_doc_id("d2").unwrap());
        assert!((results[0].weight - 2.0).abs() < 1e-9);
        assert!((results[1].weight - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_select_set_is_rejected() {
        let handle = seeded_handle();
        let program = Program::parse("SELECT missing ;").unwrap();
        let evaluator = QueryEvaluator::new(&handle, program);
        assert!(evaluator.evaluate(&Restriction::default(), None, 0, 10).is_err());
    }

    #[test]
    fn restrict_set_rejects_documents_without_a_hit() {
        let handle = seeded_handle();
        let mut txn = StorageTransaction::begin(&handle);
        let d1 = handle.lookup_doc_id("d1").unwrap();
        txn.add_term("word", "special", d1, 9).unwrap();
        txn.commit().unwrap();

        let program = Program::parse(
            r#"
                TERM sel "hello" : word ;
                TERM tag "special" : word ;
                SELECT sel ;
                RESTRICT tag ;
                EVAL Constant(value=1) WITH sel ;
            "#,
        )
        .unwrap();
        let evaluator = QueryEvaluator::new(&handle, program);
        let results = evaluator.evaluate(&Restriction::default(), None, 0, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].docno, d1);
    }
}
