//! Per-destination HTML rendering preference
//!
//! The normalizer asks a [`HtmlPreference`] once per message whether the
//! destination can render HTML. Lookups may fail; callers treat a failure as
//! "disabled".

use std::collections::BTreeSet;

use crate::errors::AppResult;

/// Lookup of the "HTML rendering enabled" flag for a destination
pub trait HtmlPreference: Send + Sync {
    /// Whether `destination` accepts HTML bodies
    fn is_html_enabled(&self, destination: &str) -> AppResult<bool>;
}

/// Static preference set loaded from configuration
///
/// `*` enables HTML for every destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfiguredHtmlPreference {
    all: bool,
    destinations: BTreeSet<String>,
}

impl ConfiguredHtmlPreference {
    /// Parse a comma-separated destination list
    pub fn parse(raw: &str) -> Self {
        let mut pref = Self::default();
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if item == "*" {
                pref.all = true;
            } else {
                pref.destinations.insert(item.to_owned());
            }
        }
        pref
    }
}

impl HtmlPreference for ConfiguredHtmlPreference {
    fn is_html_enabled(&self, destination: &str) -> AppResult<bool> {
        Ok(self.all || self.destinations.contains(destination))
    }
}
