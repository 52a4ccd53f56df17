//! Read-only view handed to the presentation layer.
//!
//! A renderer polls once per frame: [`ImeBridge::take_changes`] says what moved
//! since the previous poll (possibly several host notifications folded
//! together) and [`ImeBridge::snapshot`] hands out a copy of the state.
//!
//! [`ImeBridge::take_changes`]: crate::bridge::ImeBridge::take_changes
//! [`ImeBridge::snapshot`]: crate::bridge::ImeBridge::snapshot

use bitflags::bitflags;
use serde::Serialize;

use crate::candidate::CandidateListState;
use crate::composition::CompositionState;
use crate::result::ResultSnapshot;

bitflags! {
    /// Parts of the bridge state touched since the last poll.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct Changes: u8 {
        const COMPOSITION = 0b0001;
        const CANDIDATES = 0b0010;
        const RESULT = 0b0100;
        const ENABLED = 0b1000;
    }
}

/// Copy of everything the presentation layer reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImeSnapshot {
    pub enabled: bool,
    pub composition: CompositionState,
    pub candidates: CandidateListState,
    pub last_result: ResultSnapshot,
}

impl ImeSnapshot {
    /// Whether there is anything to draw. Stale state while disabled does not count.
    pub fn has_visible_state(&self) -> bool {
        self.enabled && (!self.composition.is_empty() || !self.candidates.is_empty())
    }

    /// Page indicator such as `2/3`, only when there is more than one page.
    pub fn page_indicator(&self) -> Option<String> {
        let total = self.candidates.num_pages();
        let current = self.candidates.current_page()?;
        (total > 1).then(|| format!("{}/{}", current + 1, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::RawCandidateList;

    #[test]
    fn test_default_is_invisible() {
        let snapshot = ImeSnapshot::default();
        assert!(!snapshot.has_visible_state());
        assert!(snapshot.page_indicator().is_none());
    }

    #[test]
    fn test_page_indicator() {
        let mut candidates = CandidateListState::new();
        candidates.on_candidates_changed(&RawCandidateList {
            items: (0..12).map(|i| i.to_string()).collect(),
            page_start: 5,
            page_size: 5,
            selection: 5,
            style: 0,
        });
        let snapshot = ImeSnapshot {
            enabled: true,
            candidates,
            ..ImeSnapshot::default()
        };
        assert!(snapshot.has_visible_state());
        assert_eq!(snapshot.page_indicator().as_deref(), Some("2/3"));
    }

    #[test]
    fn test_changes_accumulate() {
        let mut changes = Changes::empty();
        changes |= Changes::COMPOSITION;
        changes |= Changes::CANDIDATES;
        assert!(changes.contains(Changes::COMPOSITION | Changes::CANDIDATES));
        assert!(!changes.contains(Changes::RESULT));
    }
}
