//! Normalized view: one page's grid after schema validation.

use super::grid::PeriodInfo;
use super::schedule::BreakSession;
use crate::error::ParseError;
use crate::types::{Identifier, Slot, ViewKind};
use indexmap::IndexSet;
use serde::Serialize;
use std::collections::BTreeMap;

/// Half of a schedule entry as seen from one page.
///
/// A class page names the teacher, a teacher page names the class; the other
/// half is the page's own identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryFragment {
    pub subject: String,
    /// `None` for activities with no counterpart, such as homeroom.
    pub counterpart: Option<Identifier>,
    pub substitute: bool,
}

impl EntryFragment {
    /// Subject text with case and whitespace differences erased.
    pub fn subject_key(&self) -> String {
        normalize_subject(&self.subject)
    }

    /// Human-readable reading of this fragment, for diagnostics.
    pub fn reading(&self) -> String {
        match &self.counterpart {
            Some(counterpart) => format!("{} @ {}", self.subject, counterpart.as_str()),
            None => self.subject.clone(),
        }
    }
}

/// Case-folds and strips whitespace so cosmetic differences compare equal.
pub fn normalize_subject(subject: &str) -> String {
    subject
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Slot → fragments for a single identifier's page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedView {
    pub identifier: Identifier,
    pub kind: ViewKind,
    /// Only slots with at least one fragment are present.
    pub slots: BTreeMap<Slot, Vec<EntryFragment>>,
    pub periods: Vec<PeriodInfo>,
    pub breaks: Vec<PeriodInfo>,
    pub break_sessions: Vec<BreakSession>,
    pub last_update: Option<String>,
    pub warnings: Vec<ParseError>,
}

impl NormalizedView {
    pub fn fragments_at(&self, slot: &Slot) -> &[EntryFragment] {
        self.slots.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct counterpart identifiers named anywhere on the page, in first-seen order.
    pub fn counterparts(&self) -> IndexSet<Identifier> {
        self.slots
            .values()
            .flatten()
            .filter_map(|fragment| fragment.counterpart.clone())
            .collect()
    }

    pub fn fragment_count(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_normalization_ignores_case_and_spacing() {
        assert_eq!(normalize_subject(" Eng lish "), normalize_subject("english"));
        assert_ne!(normalize_subject("數學"), normalize_subject("物理"));
    }
}
