//! Page ↔ tab identity registry.
//!
//! Maps host page handles to logical tab ids and back. The two maps are kept
//! as exact inverses: every mutation removes stale links on both sides before
//! inserting new ones.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;

use crate::host::PageHandle;

use super::protocol::TabId;

/// Bookkeeping for one registered page.
#[derive(Debug, Clone)]
pub struct PageEntry {
    pub tab_id: TabId,
    pub referrer: String,
    pub history_length: i64,
    pub last_activity: Instant,
    /// URL reported by the last `bye`, if any.
    pub last_url: Option<String>,
    /// Set by `bye`, cleared by the next `hello`.
    pub departed: bool,
}

/// Serializable view of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub page: PageHandle,
    pub tab_id: TabId,
    pub departed: bool,
}

/// Outcome of a liveness touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    Touched,
    /// The page is bound, but to a different tab id than the one reported.
    Mismatch { bound: TabId },
    UnknownPage,
}

#[derive(Debug)]
pub struct PageRegistry {
    pages: HashMap<PageHandle, PageEntry>,
    tabs: HashMap<TabId, PageHandle>,
    next_id: u64,
}

impl Default for PageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRegistry {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            tabs: HashMap::new(),
            next_id: 1,
        }
    }

    /// Register `page`, trusting `tab_id` when the script supplied one.
    pub fn hello(
        &mut self,
        page: PageHandle,
        tab_id: Option<TabId>,
        referrer: &str,
        history_length: i64,
    ) -> TabId {
        let tab_id = match tab_id {
            Some(id) => {
                // Keep fresh allocations clear of ids handed out by scripts.
                self.next_id = self.next_id.max(id.0.saturating_add(1));
                id
            }
            // Hosts reuse page handles, so a bare hello is always a new tab.
            None => self.allocate(),
        };

        self.unlink_page(page);
        if let Some(previous) = self.tabs.get(&tab_id).copied() {
            if previous != page {
                tracing::debug!("{} now served by {}, replacing {}", tab_id, page, previous);
                self.pages.remove(&previous);
            }
        }

        self.pages.insert(
            page,
            PageEntry {
                tab_id,
                referrer: referrer.to_string(),
                history_length,
                last_activity: Instant::now(),
                last_url: None,
                departed: false,
            },
        );
        self.tabs.insert(tab_id, page);
        tab_id
    }

    /// Record that `page` navigated away or is closing. The binding stays.
    pub fn bye(&mut self, page: PageHandle, url: &str, history_length: i64) -> bool {
        match self.pages.get_mut(&page) {
            Some(entry) => {
                entry.last_url = Some(url.to_string());
                entry.history_length = history_length;
                entry.departed = true;
                entry.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Update liveness for `page`. Identity bindings are never changed here.
    pub fn touch(&mut self, page: PageHandle, tab_id: TabId) -> TouchOutcome {
        match self.pages.get_mut(&page) {
            Some(entry) if entry.tab_id == tab_id => {
                entry.last_activity = Instant::now();
                TouchOutcome::Touched
            }
            Some(entry) => {
                entry.last_activity = Instant::now();
                TouchOutcome::Mismatch {
                    bound: entry.tab_id,
                }
            }
            None => TouchOutcome::UnknownPage,
        }
    }

    /// Remove `page` entirely, returning the tab id it was bound to.
    pub fn close(&mut self, page: PageHandle) -> Option<TabId> {
        let entry = self.pages.remove(&page)?;
        self.tabs.remove(&entry.tab_id);
        Some(entry.tab_id)
    }

    pub fn page_to_tab_id(&self, page: PageHandle) -> Option<TabId> {
        self.pages.get(&page).map(|entry| entry.tab_id)
    }

    pub fn tab_id_to_page(&self, tab_id: TabId) -> Option<PageHandle> {
        self.tabs.get(&tab_id).copied()
    }

    pub fn entry(&self, page: PageHandle) -> Option<&PageEntry> {
        self.pages.get(&page)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// All registered pages, ordered by tab id.
    pub fn summaries(&self) -> Vec<PageSummary> {
        let mut summaries: Vec<PageSummary> = self
            .pages
            .iter()
            .map(|(page, entry)| PageSummary {
                page: *page,
                tab_id: entry.tab_id,
                departed: entry.departed,
            })
            .collect();
        summaries.sort_by_key(|s| s.tab_id);
        summaries
    }

    /// Next free id at or after `next_id`, wrapping past `u64::MAX` to 1.
    fn allocate(&mut self) -> TabId {
        let start = self.next_id.max(1);
        // Only `tabs.len()` ids are taken, so one more candidate is always free.
        let id = std::iter::successors(Some(start), |&id| Some(following(id)))
            .take(self.tabs.len() + 1)
            .map(TabId)
            .find(|id| !self.tabs.contains_key(id))
            .unwrap_or(TabId(start));
        self.next_id = following(id.0);
        id
    }

    fn unlink_page(&mut self, page: PageHandle) {
        if let Some(old) = self.pages.remove(&page) {
            if self.tabs.get(&old.tab_id) == Some(&page) {
                self.tabs.remove(&old.tab_id);
            }
        }
    }
}

fn following(id: u64) -> u64 {
    id.checked_add(1).unwrap_or(1)
}
