// Copyright (c) 2024-present, structured-search-storage contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Metadata restrictions: a disjunctive-normal-form predicate over
//! metadata columns — an AND of groups, each group an OR of clauses. A document
//! matches a restriction only if every group has at least one satisfied clause.
//! Floating-point columns compare with a small epsilon scaled to the column's
//! storage width, since `Float16`/`Float32` round-trip through
//! [`crate::block::metadata::MetaDataType`] before comparison.

use crate::block::metadata::MetaDataType;
use crate::error::{Error, Result};
use crate::keys::Index;
use crate::kv::KvStore;
use crate::store::handle::StorageHandle;

/// A clause's relational operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl CompareOp {
    fn matches(self, lhs: f64, rhs: f64, epsilon: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs - epsilon,
            Self::Le => lhs <= rhs + epsilon,
            Self::Eq => (lhs - rhs).abs() <= epsilon,
            Self::Ge => lhs >= rhs - epsilon,
            Self::Gt => lhs > rhs + epsilon,
        }
    }
}

/// One `column OP constant` test.
#[derive(Clone, Debug)]
pub struct Clause {
    pub column: String,
    pub op: CompareOp,
    pub constant: f64,
}

/// An AND-of-ORs metadata restriction. An empty group list matches every
/// document (no restriction). An empty group (no clauses) never matches, since
/// "at least one clause in the group" is vacuously false.
#[derive(Clone, Debug, Default)]
pub struct Restriction {
    groups: Vec<Vec<Clause>>,
}

fn epsilon_for(datatype: MetaDataType) -> f64 {
    match datatype {
        MetaDataType::Float16 => 1e-3,
        MetaDataType::Float32 => 1e-6,
        _ => 0.0,
    }
}

impl Restriction {
    /// Builds a restriction from its AND-of-OR groups.
    #[must_use]
    pub fn new(groups: Vec<Vec<Clause>>) -> Self {
        Self { groups }
    }

    /// Whether this restriction has no groups at all (matches unconditionally).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Tests `docno` against every group, short-circuiting on the first
    /// unsatisfied group. Clauses naming a column absent from the active schema
    /// are rejected with [`Error::InvalidArgument`] rather than silently skipped,
    /// since a restriction naming a nonexistent field is almost always a query bug.
    pub fn matches<S: KvStore>(&self, handle: &StorageHandle<S>, docno: Index) -> Result<bool> {
        for group in &self.groups {
            if group.is_empty() {
                return Ok(false);
            }
            let mut satisfied = false;
            for clause in group {
                let description = handle
                    .metadata_description()
                    .ok_or(Error::InvalidArgument("restriction references a metadata column but no schema is defined"))?;
                let (_, _, datatype) = description
                    .field(&clause.column)
                    .ok_or(Error::InvalidArgument("restriction references an unknown metadata column"))?;
                let value = handle.metadata_value(docno, &clause.column)?.unwrap_or(0.0);
                if clause.op.matches(value, clause.constant, epsilon_for(datatype)) {
                    satisfied = true;
                    break;
                }
            }
            if !satisfied {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
