//! Tag Reader
//!
//! Typed access to a resource's raw tag set. This is the only place that
//! interprets tag keys and values.

use super::types::Tag;

pub const COMPONENT_TAG: &str = "Component";
pub const DEPLOYMENT_IDENTIFIER_TAG: &str = "DeploymentIdentifier";
pub const DEPENDENCIES_TAG: &str = "Dependencies";
pub const TIER_TAG: &str = "Tier";
pub const PRIVATE_TIER: &str = "private";

/// Read-only view over an optional tag set.
#[derive(Debug, Clone, Copy)]
pub struct TagReader<'a> {
    tags: Option<&'a [Tag]>,
}

impl<'a> TagReader<'a> {
    pub fn new(tags: Option<&'a [Tag]>) -> Self {
        Self { tags }
    }

    /// Value of `key`, or the empty string.
    pub fn value_of(&self, key: &str) -> String {
        self.value_of_or(key, "")
    }

    /// Value of `key`, or `default` when the tag set is absent or the key
    /// is missing.
    pub fn value_of_or(&self, key: &str, default: &str) -> String {
        self.tags
            .and_then(|tags| tags.iter().find(|tag| tag.key == key))
            .map(|tag| tag.value.clone())
            .unwrap_or_else(|| default.to_string())
    }

    /// Comma-separated values of `key`, trimmed, with empty segments dropped.
    pub fn values_of(&self, key: &str) -> Vec<String> {
        split_and_strip(&self.value_of(key))
    }
}

/// Splits on commas, trims whitespace and drops empty segments.
///
/// Shared with configuration parsing so lists behave the same everywhere.
pub fn split_and_strip(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}
