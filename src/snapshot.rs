//! Immutable, ordered copies of the registry
//!
//! A [`Snapshot`] is what reports are built from. It owns plain copies of every
//! site's statistics, so it can be read, rendered or serialized without
//! touching the live registry.

use serde::{Deserialize, Serialize};

use crate::sampler::StackFrame;
use crate::site::{CallSite, ObservedType};

/// Point-in-time copy of one site's statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSnapshot {
    pub site: CallSite,
    /// Number of type checks recorded at this site
    pub update_count: u64,
    /// Distinct observed types, in first-seen order
    pub seen_types: Vec<ObservedType>,
    /// Distinct compact traces, in first-seen order
    pub top_stack_traces: Vec<String>,
    /// Full captures, in capture order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub full_stack_frames: Vec<Vec<StackFrame>>,
}

impl SiteSnapshot {
    /// Number of distinct types seen at this site
    pub fn pollution(&self) -> usize {
        self.seen_types.len()
    }
}

/// Ordered list of site snapshots, most-checked site first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: Vec<SiteSnapshot>,
}

impl Snapshot {
    /// Order entries by update count (descending), then by site
    pub fn from_unordered(mut entries: Vec<SiteSnapshot>) -> Self {
        entries.sort_by(|a, b| {
            b.update_count
                .cmp(&a.update_count)
                .then_with(|| a.site.cmp(&b.site))
        });
        Self { entries }
    }

    pub fn entries(&self) -> &[SiteSnapshot] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SiteSnapshot> {
        self.entries.iter()
    }

    /// Snapshot entry for `site`, if present
    pub fn get(&self, site: &CallSite) -> Option<&SiteSnapshot> {
        self.entries.iter().find(|entry| &entry.site == site)
    }

    /// Sum of update counts over all sites
    pub fn total_updates(&self) -> u64 {
        self.entries.iter().map(|entry| entry.update_count).sum()
    }
}

impl IntoIterator for Snapshot {
    type Item = SiteSnapshot;
    type IntoIter = std::vec::IntoIter<SiteSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a SiteSnapshot;
    type IntoIter = std::slice::Iter<'a, SiteSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
