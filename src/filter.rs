//! Unit eligibility filtering for instrumentation
//!
//! Agent arguments are a comma-separated list of unit-name prefixes:
//! `--include app::,app::render`. A unit is eligible when its name starts with
//! **every** listed prefix, so successive prefixes narrow the selection. An
//! empty list accepts every unit.
//!
//! Some namespaces are never instrumented, whatever the arguments say: the
//! agent itself and the standard library crates.

use anyhow::{bail, Result};

/// Namespaces that are never eligible for instrumentation
pub const EXCLUDED_PREFIXES: &[&str] = &["type_pollution::", "std::", "core::", "alloc::"];

/// Decides which executable units may be instrumented
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFilter {
    /// All of these must prefix the unit name (empty = any unit)
    required: Vec<String>,
}

impl UnitFilter {
    /// Create a filter that accepts every unit outside the excluded namespaces
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse agent arguments like "app::,app::render"
    ///
    /// Empty items are ignored; `None` or an empty string accepts every unit.
    pub fn from_args(args: Option<&str>) -> Result<Self> {
        let Some(args) = args else {
            return Ok(Self::all());
        };

        let mut required = Vec::new();
        for part in args.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if part.chars().any(|c| c.is_whitespace() || c.is_control()) {
                bail!(
                    "Invalid unit prefix: {:?}. Prefixes cannot contain whitespace",
                    part
                );
            }
            required.push(part.to_string());
        }

        Ok(Self { required })
    }

    /// Prefixes a unit must start with
    pub fn prefixes(&self) -> &[String] {
        &self.required
    }

    /// Check if a unit may be instrumented
    pub fn accepts(&self, unit: &str) -> bool {
        if EXCLUDED_PREFIXES.iter().any(|prefix| unit.starts_with(prefix)) {
            return false;
        }
        self.required.iter().all(|prefix| unit.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_all_accepts_everything() {
        let filter = UnitFilter::all();
        assert!(filter.accepts("app::render"));
        assert!(filter.accepts("anything"));
    }

    #[test]
    fn test_filter_none_args() {
        let filter = UnitFilter::from_args(None).unwrap();
        assert_eq!(filter, UnitFilter::all());
    }

    #[test]
    fn test_filter_single_prefix() {
        let filter = UnitFilter::from_args(Some("app::")).unwrap();
        assert!(filter.accepts("app::render"));
        assert!(!filter.accepts("lib::render"));
    }

    #[test]
    fn test_filter_prefixes_narrow() {
        let filter = UnitFilter::from_args(Some("app::,app::render")).unwrap();
        assert!(filter.accepts("app::render::circle"));
        assert!(!filter.accepts("app::layout"));
    }

    #[test]
    fn test_filter_disjoint_prefixes_accept_nothing() {
        let filter = UnitFilter::from_args(Some("app::,lib::")).unwrap();
        assert!(!filter.accepts("app::render"));
        assert!(!filter.accepts("lib::render"));
    }

    #[test]
    fn test_excluded_namespaces() {
        let filter = UnitFilter::all();
        assert!(!filter.accepts("type_pollution::recorder"));
        assert!(!filter.accepts("std::any"));
        assert!(!filter.accepts("core::any"));
        assert!(!filter.accepts("alloc::vec"));

        let explicit = UnitFilter::from_args(Some("std::")).unwrap();
        assert!(!explicit.accepts("std::io"));
    }

    #[test]
    fn test_filter_whitespace_handling() {
        let filter = UnitFilter::from_args(Some(" app:: , ,")).unwrap();
        assert_eq!(filter.prefixes(), &["app::".to_string()]);
    }

    #[test]
    fn test_filter_empty_args() {
        let filter = UnitFilter::from_args(Some("")).unwrap();
        assert!(filter.prefixes().is_empty());
        assert!(filter.accepts("app::render"));
    }

    #[test]
    fn test_invalid_prefix() {
        assert!(UnitFilter::from_args(Some("app render")).is_err());
        assert!(UnitFilter::from_args(Some("app\u{7}")).is_err());
    }

    #[test]
    fn test_filter_debug() {
        let filter = UnitFilter::all();
        let debug_str = format!("{:?}", filter);
        assert!(debug_str.contains("UnitFilter"));
    }
}
