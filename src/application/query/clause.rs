//! Closed set of filter clauses shared by both query renderings.

use crate::domain::QueryDescriptor;
use crate::domain::types::PROTECTED_SENTINEL;

/// One eligibility filter.
///
/// [`build_structured_args`](super::build_structured_args) and
/// [`build_scan_fragment`](super::build_scan_fragment) both match exhaustively on this enum, so
/// adding a variant forces both renderings to handle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterClause {
    ContentType(String),
    Status(Vec<String>),
    Category(u64),
    Author(u64),
    /// The artifact meta key must not exist on the item.
    ArtifactAbsent { meta_key: &'static str },
    /// The protection meta key is missing or holds something other than `sentinel`.
    NotProtected {
        meta_key: &'static str,
        sentinel: &'static str,
    },
}

/// Expand a descriptor into its filter clauses, in a fixed order.
pub fn clauses_for(descriptor: &QueryDescriptor) -> Vec<FilterClause> {
    let mut clauses = vec![
        FilterClause::ContentType(descriptor.content_type().to_string()),
        FilterClause::Status(descriptor.status().statuses()),
    ];

    if let Some(category_id) = descriptor.category_id() {
        clauses.push(FilterClause::Category(category_id));
    }

    if let Some(author_id) = descriptor.author_id() {
        clauses.push(FilterClause::Author(author_id));
    }

    let workflow = descriptor.workflow();
    if !descriptor.allow_recompute() {
        clauses.push(FilterClause::ArtifactAbsent {
            meta_key: workflow.artifact_meta_key(),
        });
    }

    if !descriptor.allow_override_protected() {
        clauses.push(FilterClause::NotProtected {
            meta_key: workflow.protection_meta_key(),
            sentinel: PROTECTED_SENTINEL,
        });
    }

    clauses
}
