//! Structured (ORM-style) rendering of an eligibility request.

use serde::Serialize;

use crate::domain::QueryDescriptor;

use super::clause::{FilterClause, clauses_for};

/// Comparison applied to a single meta key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "compare", content = "value")]
pub enum MetaCompare {
    NotExists,
    /// The key exists and its value differs from the operand.
    NotEquals(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetaCondition {
    pub key: String,
    #[serde(flatten)]
    pub compare: MetaCompare,
}

/// Boolean tree of meta conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaQuery {
    Condition(MetaCondition),
    And(Vec<MetaQuery>),
    Or(Vec<MetaQuery>),
}

impl MetaQuery {
    fn condition(key: &str, compare: MetaCompare) -> Self {
        MetaQuery::Condition(MetaCondition {
            key: key.to_string(),
            compare,
        })
    }

    /// Evaluate against an item's meta, where `lookup` returns the stored value of a key.
    pub fn matches<'a>(&self, lookup: &impl Fn(&str) -> Option<&'a str>) -> bool {
        match self {
            MetaQuery::Condition(condition) => match &condition.compare {
                MetaCompare::NotExists => lookup(&condition.key).is_none(),
                MetaCompare::NotEquals(operand) => {
                    lookup(&condition.key).is_some_and(|value| value != operand)
                }
            },
            MetaQuery::And(children) => children.iter().all(|child| child.matches(lookup)),
            MetaQuery::Or(children) => children.iter().any(|child| child.matches(lookup)),
        }
    }
}

/// Filter description for a count-style read.
///
/// Only ids are ever needed, so related meta/term prefetching is always switched off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredArgs {
    pub content_type: String,
    pub statuses: Vec<String>,
    pub category_id: Option<u64>,
    pub author_id: Option<u64>,
    pub meta_query: Option<MetaQuery>,
    pub ids_only: bool,
    pub prefetch_meta: bool,
    pub prefetch_terms: bool,
}

pub fn build_structured_args(descriptor: &QueryDescriptor) -> StructuredArgs {
    let mut args = StructuredArgs {
        content_type: String::new(),
        statuses: Vec::new(),
        category_id: None,
        author_id: None,
        meta_query: None,
        ids_only: true,
        prefetch_meta: false,
        prefetch_terms: false,
    };
    let mut meta = Vec::new();

    for clause in clauses_for(descriptor) {
        match clause {
            FilterClause::ContentType(content_type) => args.content_type = content_type,
            FilterClause::Status(statuses) => args.statuses = statuses,
            FilterClause::Category(category_id) => args.category_id = Some(category_id),
            FilterClause::Author(author_id) => args.author_id = Some(author_id),
            FilterClause::ArtifactAbsent { meta_key } => {
                meta.push(MetaQuery::condition(meta_key, MetaCompare::NotExists));
            }
            FilterClause::NotProtected { meta_key, sentinel } => {
                meta.push(MetaQuery::Or(vec![
                    MetaQuery::condition(meta_key, MetaCompare::NotExists),
                    MetaQuery::condition(meta_key, MetaCompare::NotEquals(sentinel.to_string())),
                ]));
            }
        }
    }

    if !meta.is_empty() {
        args.meta_query = Some(MetaQuery::And(meta));
    }

    args
}
