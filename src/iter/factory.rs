// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Builds posting iterators from a query's evaluation-program AST. Grounded in
//! `original_source`'s `PostingJoinOperatorInterface::createResultIterator`
//! family (`postingIteratorIntersect.hpp`, `postingIteratorStructWithin.cpp`,
//! `postingIteratorSucc.hpp`, and siblings): every join operator validates the
//! `cardinality` argument before building, and an unknown term type or value
//! resolves to [`NullIterator`] rather than an error so a query naming a term
//! the dictionary has never seen simply matches nothing.

use super::contains::ContainsIterator;
use super::difference::DifferenceIterator;
use super::intersect::IntersectIterator;
use super::null::NullIterator;
use super::structural::{SequenceStruct, WithinStruct};
use super::succpred::{PredIterator, SuccIterator};
use super::term::TermIterator;
use super::union::UnionIterator;
use super::PostingIterator;
use crate::error::{Error, Result};
use crate::store::handle::StorageHandle;
use crate::kv::KvStore;

/// A join operator named in a query's evaluation program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOp {
    Union,
    Intersect,
    Contains,
    Difference,
    Sequence,
    SequenceStruct,
    Within,
    WithinStruct,
    InRange,
    InRangeStruct,
    Succ,
    Pred,
}

/// Builds a [`TermIterator`] for `(type_name, term_value)`, or a [`NullIterator`]
/// if either name is absent from the dictionary.
pub fn term_iterator<'h, S: KvStore>(
    handle: &'h StorageHandle<S>,
    type_name: &str,
    term_value: &str,
) -> Result<Box<dyn PostingIterator + 'h>> {
    let typeno = handle.lookup_term_type(type_name)?;
    let termno = handle.lookup_term_value(term_value)?;
    if typeno == 0 || termno == 0 {
        return Ok(Box::new(NullIterator::new(format!("{type_name}:{term_value}"))));
    }
    Ok(Box::new(TermIterator::new(handle, typeno, termno)))
}

/// Builds the result iterator for `op` over `args` (plus `cut` for the
/// `*_struct` variants), honoring `range` and `cardinality` the way each
/// operator's `createResultIterator` does in `original_source`. Operators that
/// don't accept a nonzero cardinality reject it with [`Error::InvalidArgument`],
/// mirroring every `PostingJoin*::createResultIterator` read from the pack: none
/// of intersect, contains, within, inrange, within_struct, or inrange_struct
/// ever honor a restricted match count.
pub fn create_result_iterator<'a>(
    op: JoinOp,
    mut args: Vec<Box<dyn PostingIterator + 'a>>,
    cut: Option<Box<dyn PostingIterator + 'a>>,
    range: i64,
    cardinality: usize,
) -> Result<Box<dyn PostingIterator + 'a>> {
    let reject_cardinality = |cardinality: usize| -> Result<()> {
        if cardinality != 0 {
            return Err(Error::InvalidArgument("this join operator does not support a restricted cardinality"));
        }
        Ok(())
    };
    let require_args = |args: &[Box<dyn PostingIterator + 'a>], min: usize| -> Result<()> {
        if args.len() < min {
            return Err(Error::InvalidArgument("too few arguments"));
        }
        Ok(())
    };

    match op {
        JoinOp::Union => {
            require_args(&args, 1)?;
            Ok(Box::new(UnionIterator::new(args)))
        }
        JoinOp::Intersect => {
            reject_cardinality(cardinality)?;
            require_args(&args, 1)?;
            if range != 0 {
                return Err(Error::InvalidArgument("intersect takes no range argument"));
            }
            Ok(Box::new(IntersectIterator::new(args)))
        }
        JoinOp::Contains => {
            reject_cardinality(cardinality)?;
            require_args(&args, 1)?;
            Ok(Box::new(ContainsIterator::new(args)))
        }
        JoinOp::Difference => {
            reject_cardinality(cardinality)?;
            if args.len() != 2 {
                return Err(Error::InvalidArgument("difference takes exactly two arguments"));
            }
            let negative = args.pop().expect("checked len == 2");
            let positive = args.pop().expect("checked len == 2");
            Ok(Box::new(DifferenceIterator::new(positive, negative)))
        }
        JoinOp::Sequence | JoinOp::SequenceStruct => {
            reject_cardinality(cardinality)?;
            require_args(&args, 2)?;
            Ok(Box::new(SequenceStruct::new(args, cut, range)))
        }
        JoinOp::Within | JoinOp::WithinStruct => {
            reject_cardinality(cardinality)?;
            require_args(&args, 2)?;
            Ok(Box::new(WithinStruct::new(args, cut, range, true)))
        }
        JoinOp::InRange | JoinOp::InRangeStruct => {
            reject_cardinality(cardinality)?;
            require_args(&args, 2)?;
            Ok(Box::new(WithinStruct::new(args, cut, range, false)))
        }
        JoinOp::Succ => {
            reject_cardinality(cardinality)?;
            if args.len() != 1 {
                return Err(Error::InvalidArgument("succ takes exactly one argument"));
            }
            Ok(Box::new(SuccIterator::new(args.pop().expect("checked len == 1"))))
        }
        JoinOp::Pred => {
            reject_cardinality(cardinality)?;
            if args.len() != 1 {
                return Err(Error::InvalidArgument("pred takes exactly one argument"));
            }
            Ok(Box::new(PredIterator::new(args.pop().expect("checked len == 1"))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::posting::{PosinfoBlock, PostingRecord};
    use crate::config::StorageConfig;
    use crate::kv::memory::MemoryKv;
    use crate::store::block_cursor;
    use crate::store::keyspace::posinfo_prefix;

    fn handle_with_term() -> StorageHandle<MemoryKv> {
        let kv = MemoryKv::new();
        let mut batch = kv.batch();
        let block = PosinfoBlock::from_records(vec![PostingRecord { docno: 2, positions: vec![1] }]).unwrap();
        block_cursor::store(&mut batch, &posinfo_prefix(1, 1), &block).unwrap();
        batch.commit().unwrap();
        StorageHandle::open(kv, StorageConfig::new()).unwrap()
    }

    #[test]
    fn unknown_term_name_resolves_to_a_null_iterator() {
        let handle = handle_with_term();
        let mut iter = term_iterator(&handle, "missing_type", "missing_term").unwrap();
        assert_eq!(iter.skip_doc(1).unwrap(), 0);
    }

    #[test]
    fn intersect_rejects_a_nonzero_cardinality() {
        let a: Box<dyn PostingIterator + '_> = Box::new(NullIterator::new("a"));
        let b: Box<dyn PostingIterator + '_> = Box::new(NullIterator::new("b"));
        let result = create_result_iterator(JoinOp::Intersect, vec![a, b], None, 0, 2);
        assert!(result.is_err());
    }

    #[test]
    fn union_accepts_a_single_argument() {
        let a: Box<dyn PostingIterator + '_> = Box::new(NullIterator::new("a"));
        let iter = create_result_iterator(JoinOp::Union, vec![a], None, 0, 0).unwrap();
        assert_eq!(iter.featureid(), "aU");
    }
}
