//! Query construction: one descriptor, two equivalent renderings.
//!
//! - [`StructuredArgs`] drives count-style reads.
//! - [`ScanFragment`] drives cursor-paginated scans.
//!
//! Both are produced from the same [`FilterClause`] list.

mod clause;
mod fragment;
mod structured;

pub use clause::{FilterClause, clauses_for};
pub use fragment::{
    ARTIFACT_ALIAS, CATEGORY_ALIAS, Join, JoinKind, JoinTarget, PROTECTION_ALIAS, Predicate,
    ScanFragment, build_scan_fragment,
};
pub use structured::{
    MetaCompare, MetaCondition, MetaQuery, StructuredArgs, build_structured_args,
};
