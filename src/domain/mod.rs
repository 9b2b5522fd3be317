//! Domain layer types and invariants.

pub mod descriptor;
pub mod types;

pub use descriptor::{QueryDescriptor, SettingsProvider};
pub use types::{ItemId, StatusFilter, Workflow};
