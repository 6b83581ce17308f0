//! Modification-time tracking for watch mode.
//!
//! [`WatchState`] remembers the last modification time observed for every
//! input a generation pass reads: the config file, both layout files, each
//! asset and each table-of-contents page. The regeneration loop asks it
//! whether an input changed since the last successful step and records the
//! new time once that step succeeds.
//!
//! ## Change Rule
//!
//! An input has changed when no time was ever recorded for it, or when the
//! current time differs from the recorded one. Equality rather than "newer
//! than": restoring an older file (`git checkout`, backup restore) or a clock
//! jump backwards must still trigger a rebuild.
//!
//! A failed stat is passed in as `None` and always counts as changed, so the
//! caller attempts the rebuild and surfaces the read error there.
//!
//! Entries are never removed. Pages or assets dropped from the config leave
//! orphaned entries that are simply never queried again.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Something whose modification time is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tracked<'a> {
    Config,
    PageLayout,
    IndexLayout,
    /// A table-of-contents page, keyed by its configured file path.
    Page(&'a str),
    /// An asset, keyed by its configured path.
    Asset(&'a str),
}

impl fmt::Display for Tracked<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tracked::Config => write!(f, "config"),
            Tracked::PageLayout => write!(f, "page layout"),
            Tracked::IndexLayout => write!(f, "index layout"),
            Tracked::Page(file) => write!(f, "page {file}"),
            Tracked::Asset(path) => write!(f, "asset {path}"),
        }
    }
}

/// Last-seen modification times, owned by the regeneration loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchState {
    config: Option<SystemTime>,
    page_layout: Option<SystemTime>,
    index_layout: Option<SystemTime>,
    pages: HashMap<String, SystemTime>,
    assets: HashMap<String, SystemTime>,
}

impl WatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `target` changed since it was last recorded.
    ///
    /// `current` is the time from a fresh stat, or `None` if the stat failed.
    pub fn has_changed(&self, target: Tracked<'_>, current: Option<SystemTime>) -> bool {
        match (self.recorded(target), current) {
            (Some(previous), Some(current)) => previous != current,
            _ => true,
        }
    }

    /// Remember `modified` as the last-seen time of `target`.
    pub fn record(&mut self, target: Tracked<'_>, modified: SystemTime) {
        match target {
            Tracked::Config => self.config = Some(modified),
            Tracked::PageLayout => self.page_layout = Some(modified),
            Tracked::IndexLayout => self.index_layout = Some(modified),
            Tracked::Page(file) => {
                self.pages.insert(file.to_string(), modified);
            }
            Tracked::Asset(path) => {
                self.assets.insert(path.to_string(), modified);
            }
        }
    }

    /// The recorded time of `target`, if any.
    pub fn recorded(&self, target: Tracked<'_>) -> Option<SystemTime> {
        match target {
            Tracked::Config => self.config,
            Tracked::PageLayout => self.page_layout,
            Tracked::IndexLayout => self.index_layout,
            Tracked::Page(file) => self.pages.get(file).copied(),
            Tracked::Asset(path) => self.assets.get(path).copied(),
        }
    }

    /// Number of pages and assets with a recorded time.
    pub fn tracked_files(&self) -> usize {
        self.pages.len() + self.assets.len()
    }
}

/// Modification time of `path`, or `None` if it can't be stat'ed.
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
