//! # Per-call-site accounting of running tasks.
//!
//! Every admitted task is attributed to the `file:line` of the `run_*` call
//! that launched it. The resulting histogram answers "what is still running
//! and where was it started" during a shutdown that refuses to finish.
//!
//! Entries are removed as soon as their count returns to zero, so an idle
//! coordinator reports an empty map.

use std::collections::HashMap;
use std::panic::Location;

use dashmap::{mapref::entry::Entry, DashMap};

/// Source location of a `run_*` caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Site {
    file: &'static str,
    line: u32,
}

impl Site {
    /// Captures the location of the caller of the enclosing `#[track_caller]` chain.
    #[track_caller]
    pub(crate) fn here() -> Self {
        let loc = Location::caller();
        Self {
            file: loc.file(),
            line: loc.line(),
        }
    }

    pub(crate) fn label(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

/// Histogram of currently running tasks keyed by launch site.
///
/// Kept outside the coordinator's lock: the map does not participate in the
/// drain protocol, so each entry only needs to be individually consistent.
pub(crate) struct SiteMap {
    sites: DashMap<Site, usize>,
}

impl SiteMap {
    pub(crate) fn new() -> Self {
        Self {
            sites: DashMap::new(),
        }
    }

    pub(crate) fn incr(&self, site: Site) {
        *self.sites.entry(site).or_insert(0) += 1;
    }

    /// Decrements the entry for `site`, dropping it at zero.
    pub(crate) fn decr(&self, site: Site) {
        if let Entry::Occupied(mut entry) = self.sites.entry(site) {
            let count = entry.get_mut();
            *count = count.saturating_sub(1);
            if *count == 0 {
                entry.remove();
            }
        }
    }

    /// Snapshot as `"file:line" -> count`.
    pub(crate) fn snapshot(&self) -> HashMap<String, usize> {
        self.sites
            .iter()
            .map(|kv| (kv.key().label(), *kv.value()))
            .collect()
    }
}
