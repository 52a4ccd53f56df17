//! Candidate list reported by the host IME.
//!
//! The host owns paging: it tells us the full candidate set, where the
//! visible page starts, how many entries a page holds and which entry is
//! selected. This module only stores that state and answers page-relative
//! queries with the clamping the host's numbers require.

use serde::Serialize;
use std::ops::Range;

/// Decoded candidate payload, before validation against the invariants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCandidateList {
    pub style: u32,
    pub items: Vec<String>,
    pub selection: u32,
    pub page_start: u32,
    pub page_size: u32,
}

/// Half-open page range `[page_start, min(page_start + page_size, len))`.
///
/// `page_start` past `len` yields an empty range at `len`; the host may
/// report a page size larger than what remains on the last page.
pub fn page_range(page_start: usize, page_size: usize, len: usize) -> Range<usize> {
    let start = page_start.min(len);
    let end = start.saturating_add(page_size).min(len);
    start..end
}

/// Current candidate list with host-supplied paging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CandidateListState {
    items: Vec<String>,
    page_size: usize,
    page_start: usize,
    selection: usize,
}

impl CandidateListState {
    /// Create an empty candidate list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list from a decoded payload.
    ///
    /// `page_start` and `selection` are clamped so that, for a non-empty
    /// list, `page_start <= selection < items.len()`.
    pub fn on_candidates_changed(&mut self, raw: &RawCandidateList) {
        self.items = raw.items.clone();
        self.page_size = raw.page_size as usize;

        if self.items.is_empty() {
            self.page_start = 0;
            self.selection = 0;
            return;
        }

        let last = self.items.len() - 1;
        self.page_start = (raw.page_start as usize).min(last);
        self.selection = (raw.selection as usize).clamp(self.page_start, last);
        if self.page_start != raw.page_start as usize || self.selection != raw.selection as usize {
            tracing::debug!(
                page_start = raw.page_start,
                selection = raw.selection,
                len = self.items.len(),
                "clamped candidate paging"
            );
        }
    }

    /// Clear the candidate list.
    pub fn clear(&mut self) {
        self.items.clear();
        self.page_size = 0;
        self.page_start = 0;
        self.selection = 0;
    }

    /// Every candidate for the current conversion unit.
    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of candidates per page, as reported by the host.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Index of the first candidate on the visible page.
    pub fn page_start(&self) -> usize {
        self.page_start
    }

    /// Selected candidate index, `None` when the list is empty.
    pub fn selection(&self) -> Option<usize> {
        (!self.items.is_empty()).then_some(self.selection)
    }

    pub fn selected_item(&self) -> Option<&str> {
        self.selection()
            .and_then(|index| self.items.get(index))
            .map(String::as_str)
    }

    /// Visible page as a range into `items()`.
    pub fn page_slice(&self) -> Range<usize> {
        page_range(self.page_start, self.page_size, self.items.len())
    }

    /// Candidates on the visible page.
    pub fn page_items(&self) -> &[String] {
        &self.items[self.page_slice()]
    }

    /// Visible candidates labelled from 1, the way selection keys number them.
    pub fn page_entries(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.page_items()
            .iter()
            .enumerate()
            .map(|(offset, item)| (offset + 1, item.as_str()))
    }

    /// Selection relative to the visible page, if it is on it.
    pub fn selection_in_page(&self) -> Option<usize> {
        let selection = self.selection()?;
        let page = self.page_slice();
        page.contains(&selection).then(|| selection - page.start)
    }

    /// Zero-based page index, when paging is meaningful.
    pub fn current_page(&self) -> Option<usize> {
        (self.page_size > 0 && !self.items.is_empty()).then(|| self.page_start / self.page_size)
    }

    /// Number of pages, zero when empty or when the host reports no page size.
    pub fn num_pages(&self) -> usize {
        if self.page_size == 0 {
            0
        } else {
            self.items.len().div_ceil(self.page_size)
        }
    }
}
