//! Editor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mutation::{Limits, Mutation, DEFAULT_MAX_COMPONENTS, DEFAULT_MAX_ROWS};

/// Default time a save waits for in-flight uploads.
pub const DEFAULT_UPLOAD_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Which successful mutations mark the session dirty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyPolicy {
    /// Every successful mutation marks the session dirty.
    #[default]
    AllMutations,
    /// Duplicate and reorder leave the dirty flag alone, as the first
    /// checkout builder did.
    Observed,
}

impl DirtyPolicy {
    /// Parse `all` or `observed`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" | "all_mutations" => Some(Self::AllMutations),
            "observed" => Some(Self::Observed),
            _ => None,
        }
    }

    /// Whether applying `mutation` should mark the session dirty.
    #[must_use]
    pub fn marks_dirty(self, mutation: &Mutation) -> bool {
        match self {
            Self::AllMutations => true,
            Self::Observed => !matches!(
                mutation,
                Mutation::Duplicate { .. } | Mutation::Reorder { .. }
            ),
        }
    }
}

/// Settings for one editing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorConfig {
    /// How long a save waits for uploads before failing.
    pub upload_wait_timeout: Duration,
    /// Dirty tracking policy.
    pub dirty_policy: DirtyPolicy,
    /// Maximum components per page.
    pub max_components: usize,
    /// Maximum rows per page.
    pub max_rows: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            upload_wait_timeout: DEFAULT_UPLOAD_WAIT_TIMEOUT,
            dirty_policy: DirtyPolicy::default(),
            max_components: DEFAULT_MAX_COMPONENTS,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

impl EditorConfig {
    /// Read configuration from `CHECKOUT_*` environment variables.
    ///
    /// - `CHECKOUT_UPLOAD_TIMEOUT_MS` (default 30000)
    /// - `CHECKOUT_DIRTY_POLICY`: `all` or `observed` (default `all`)
    /// - `CHECKOUT_MAX_COMPONENTS` (default 500)
    /// - `CHECKOUT_MAX_ROWS` (default 50)
    ///
    /// Unparseable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let upload_wait_timeout = lookup("CHECKOUT_UPLOAD_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .map_or(defaults.upload_wait_timeout, Duration::from_millis);
        let dirty_policy = lookup("CHECKOUT_DIRTY_POLICY")
            .and_then(|v| DirtyPolicy::parse(&v))
            .unwrap_or(defaults.dirty_policy);
        let max_components = lookup("CHECKOUT_MAX_COMPONENTS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_components);
        let max_rows = lookup("CHECKOUT_MAX_ROWS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_rows);
        Self {
            upload_wait_timeout,
            dirty_policy,
            max_components,
            max_rows,
        }
    }

    /// Size limits for the mutation engine.
    #[must_use]
    pub fn limits(&self) -> Limits {
        Limits {
            max_components: self.max_components,
            max_rows: self.max_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.upload_wait_timeout, Duration::from_secs(30));
        assert_eq!(config.dirty_policy, DirtyPolicy::AllMutations);
        assert_eq!(config.limits(), Limits::default());
    }

    #[test]
    fn test_from_lookup_reads_values() {
        let vars: HashMap<&str, &str> = [
            ("CHECKOUT_UPLOAD_TIMEOUT_MS", "1500"),
            ("CHECKOUT_DIRTY_POLICY", "observed"),
            ("CHECKOUT_MAX_COMPONENTS", "10"),
            ("CHECKOUT_MAX_ROWS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let config = EditorConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()));
        assert_eq!(config.upload_wait_timeout, Duration::from_millis(1500));
        assert_eq!(config.dirty_policy, DirtyPolicy::Observed);
        assert_eq!(config.max_components, 10);
        assert_eq!(config.max_rows, DEFAULT_MAX_ROWS);
    }

    #[test]
    fn test_observed_policy_skips_duplicate_and_reorder() {
        let duplicate = Mutation::Duplicate { id: "a".into() };
        let remove = Mutation::Remove { id: "a".into() };
        assert!(DirtyPolicy::AllMutations.marks_dirty(&duplicate));
        assert!(!DirtyPolicy::Observed.marks_dirty(&duplicate));
        assert!(DirtyPolicy::Observed.marks_dirty(&remove));
        assert_eq!(DirtyPolicy::parse("ALL"), Some(DirtyPolicy::AllMutations));
        assert_eq!(DirtyPolicy::parse("sometimes"), None);
    }
}
