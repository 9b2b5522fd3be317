//! Join/predicate rendering of an eligibility request for direct cursor scans.

use crate::domain::QueryDescriptor;

use super::clause::{FilterClause, clauses_for};

pub const CATEGORY_ALIAS: &str = "cat";
pub const ARTIFACT_ALIAS: &str = "artifact";
pub const PROTECTION_ALIAS: &str = "protection";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinTarget {
    /// Category membership row for the given category.
    CategoryMembership { category_id: u64 },
    /// Meta row for the given key.
    Meta { meta_key: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub alias: &'static str,
    pub target: JoinTarget,
}

/// Row predicate over the scanned item and its joined rows.
///
/// Joined-row predicates follow SQL NULL semantics: a comparison against a row the left join
/// did not find is never true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    ContentTypeEq(String),
    StatusIn(Vec<String>),
    AuthorEq(u64),
    /// The left join under `alias` produced no row.
    JoinedRowMissing { alias: &'static str },
    /// The row joined under `alias` has a meta value different from `value`.
    JoinedValueNe { alias: &'static str, value: String },
    AnyOf(Vec<Predicate>),
}

/// Explicit joins plus conjunctive predicates, equivalent to the structured args of the
/// same descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanFragment {
    pub joins: Vec<Join>,
    pub predicates: Vec<Predicate>,
}

pub fn build_scan_fragment(descriptor: &QueryDescriptor) -> ScanFragment {
    let mut fragment = ScanFragment::default();

    for clause in clauses_for(descriptor) {
        match clause {
            FilterClause::ContentType(content_type) => {
                fragment.predicates.push(Predicate::ContentTypeEq(content_type));
            }
            FilterClause::Status(statuses) => {
                fragment.predicates.push(Predicate::StatusIn(statuses));
            }
            FilterClause::Category(category_id) => fragment.joins.push(Join {
                kind: JoinKind::Inner,
                alias: CATEGORY_ALIAS,
                target: JoinTarget::CategoryMembership { category_id },
            }),
            FilterClause::Author(author_id) => {
                fragment.predicates.push(Predicate::AuthorEq(author_id));
            }
            FilterClause::ArtifactAbsent { meta_key } => {
                fragment.joins.push(Join {
                    kind: JoinKind::Left,
                    alias: ARTIFACT_ALIAS,
                    target: JoinTarget::Meta { meta_key },
                });
                fragment.predicates.push(Predicate::JoinedRowMissing {
                    alias: ARTIFACT_ALIAS,
                });
            }
            FilterClause::NotProtected { meta_key, sentinel } => {
                fragment.joins.push(Join {
                    kind: JoinKind::Left,
                    alias: PROTECTION_ALIAS,
                    target: JoinTarget::Meta { meta_key },
                });
                fragment.predicates.push(Predicate::AnyOf(vec![
                    Predicate::JoinedRowMissing {
                        alias: PROTECTION_ALIAS,
                    },
                    Predicate::JoinedValueNe {
                        alias: PROTECTION_ALIAS,
                        value: sentinel.to_string(),
                    },
                ]));
            }
        }
    }

    fragment
}
