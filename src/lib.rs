//! Eligibility resolution with a two-tier result cache.
//!
//! Callers describe a request with a [`domain::QueryDescriptor`] and resolve it through
//! [`application::eligibility::EligibilityService`], which checks the cache, renders the
//! descriptor into structured args or a scan fragment, and walks the corpus in adaptive batches.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
