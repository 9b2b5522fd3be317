//! Shared domain enumerations and constants for eligibility filters.

use serde::{Deserialize, Serialize};

/// Content type used when a request leaves the type blank.
pub const DEFAULT_CONTENT_TYPE: &str = "post";

/// Status sentinel that expands to [`VIEWABLE_STATUSES`].
pub const ANY_STATUS: &str = "any";

/// Statuses an `any` request expands to.
pub const VIEWABLE_STATUSES: [&str; 5] = ["published", "private", "draft", "pending", "future"];

/// Meta value marking an item as protected from regeneration.
pub const PROTECTED_SENTINEL: &str = "1";

/// Identifier of a content item.
pub type ItemId = i64;

/// Artifact pipelines an eligibility request can target.
///
/// Each workflow owns one artifact meta key (present once the artifact was generated) and one
/// protection meta key (set to [`PROTECTED_SENTINEL`] when editors locked the item).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    Summary,
    Metadata,
}

impl Workflow {
    pub fn as_str(self) -> &'static str {
        match self {
            Workflow::Summary => "summary",
            Workflow::Metadata => "metadata",
        }
    }

    pub fn artifact_meta_key(self) -> &'static str {
        match self {
            Workflow::Summary => "_eligo_summary",
            Workflow::Metadata => "_eligo_metadata",
        }
    }

    pub fn protection_meta_key(self) -> &'static str {
        match self {
            Workflow::Summary => "_eligo_summary_protected",
            Workflow::Metadata => "_eligo_metadata_protected",
        }
    }
}

impl TryFrom<&str> for Workflow {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "summary" => Ok(Workflow::Summary),
            "metadata" => Ok(Workflow::Metadata),
            _ => Err(()),
        }
    }
}

/// Status filter of a request: one concrete status or every viewable one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StatusFilter {
    Any,
    Only(String),
}

impl StatusFilter {
    /// Parse a raw status token. Blank input and `any` select every viewable status.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(ANY_STATUS) {
            StatusFilter::Any
        } else {
            StatusFilter::Only(trimmed.to_string())
        }
    }

    /// Canonical token, as hashed into cache keys.
    pub fn as_str(&self) -> &str {
        match self {
            StatusFilter::Any => ANY_STATUS,
            StatusFilter::Only(status) => status.as_str(),
        }
    }

    /// Concrete statuses this filter admits.
    pub fn statuses(&self) -> Vec<String> {
        match self {
            StatusFilter::Any => VIEWABLE_STATUSES.iter().map(|s| s.to_string()).collect(),
            StatusFilter::Only(status) => vec![status.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_expands_to_viewable_statuses() {
        let statuses = StatusFilter::parse("any").statuses();
        assert_eq!(
            statuses,
            vec!["published", "private", "draft", "pending", "future"]
        );
    }

    #[test]
    fn blank_status_means_any() {
        assert_eq!(StatusFilter::parse("  "), StatusFilter::Any);
        assert_eq!(StatusFilter::parse("ANY"), StatusFilter::Any);
    }

    #[test]
    fn single_status_is_trimmed() {
        let filter = StatusFilter::parse(" draft ");
        assert_eq!(filter, StatusFilter::Only("draft".to_string()));
        assert_eq!(filter.statuses(), vec!["draft"]);
        assert_eq!(filter.as_str(), "draft");
    }

    #[test]
    fn workflows_use_distinct_meta_keys() {
        assert_ne!(
            Workflow::Summary.artifact_meta_key(),
            Workflow::Metadata.artifact_meta_key()
        );
        assert_ne!(
            Workflow::Summary.protection_meta_key(),
            Workflow::Metadata.protection_meta_key()
        );
        assert_eq!(Workflow::try_from("metadata"), Ok(Workflow::Metadata));
        assert!(Workflow::try_from("other").is_err());
    }
}
