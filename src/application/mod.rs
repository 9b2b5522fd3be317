//! Application services layer.

pub mod batch;
pub mod eligibility;
pub mod error;
pub mod query;
pub mod repos;
