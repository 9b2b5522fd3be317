//! Eligibility request descriptor.

use super::types::{DEFAULT_CONTENT_TYPE, StatusFilter, Workflow};

/// Source of default filter values (content type, status) owned by the host's settings store.
pub trait SettingsProvider: Send + Sync {
    fn default_content_type(&self) -> String;

    fn default_status(&self) -> String;
}

/// Immutable description of a single eligibility request.
///
/// Two descriptors with equal fields always resolve to the same cache key and, for a fixed
/// corpus snapshot and cache version, the same result set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryDescriptor {
    content_type: String,
    status: StatusFilter,
    category_id: Option<u64>,
    author_id: Option<u64>,
    workflow: Workflow,
    allow_recompute: bool,
    allow_override_protected: bool,
}

impl QueryDescriptor {
    /// Start a request for `content_type` with every viewable status and both safety filters on.
    pub fn new(content_type: impl Into<String>, workflow: Workflow) -> Self {
        let content_type = content_type.into();
        let trimmed = content_type.trim();
        let content_type = if trimmed.is_empty() {
            DEFAULT_CONTENT_TYPE.to_string()
        } else {
            trimmed.to_string()
        };

        Self {
            content_type,
            status: StatusFilter::Any,
            category_id: None,
            author_id: None,
            workflow,
            allow_recompute: false,
            allow_override_protected: false,
        }
    }

    /// Start a request from the host's configured defaults.
    pub fn from_settings(settings: &dyn SettingsProvider, workflow: Workflow) -> Self {
        Self::new(settings.default_content_type(), workflow).with_status(&settings.default_status())
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = StatusFilter::parse(status);
        self
    }

    pub fn with_category(mut self, category_id: u64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_author(mut self, author_id: u64) -> Self {
        self.author_id = Some(author_id);
        self
    }

    /// Include items that already carry the workflow's artifact.
    pub fn allowing_recompute(mut self, allow: bool) -> Self {
        self.allow_recompute = allow;
        self
    }

    /// Include items editors flagged as protected for the workflow.
    pub fn allowing_protected_override(mut self, allow: bool) -> Self {
        self.allow_override_protected = allow;
        self
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn status(&self) -> &StatusFilter {
        &self.status
    }

    pub fn category_id(&self) -> Option<u64> {
        self.category_id
    }

    pub fn author_id(&self) -> Option<u64> {
        self.author_id
    }

    pub fn workflow(&self) -> Workflow {
        self.workflow
    }

    pub fn allow_recompute(&self) -> bool {
        self.allow_recompute
    }

    pub fn allow_override_protected(&self) -> bool {
        self.allow_override_protected
    }
}
