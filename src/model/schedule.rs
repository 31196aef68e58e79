//! Reconciled schedule: the product handed to callers.

use super::grid::PeriodInfo;
use crate::types::{ClassId, Identifier, Slot, TeacherId, ViewKind};
use serde::Serialize;
use std::fmt;

/// One lesson: who teaches which class what, and when.
///
/// Always carries both the class and the teacher, whichever page the request
/// started from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ScheduleEntry {
    pub slot: Slot,
    pub class: ClassId,
    pub teacher: TeacherId,
    pub subject: String,
    pub substitute: bool,
}

impl ScheduleEntry {
    /// The identifier on the other side of this entry from `own`.
    pub fn counterpart_of(&self, own: &Identifier) -> Identifier {
        match own {
            Identifier::Class(_) => Identifier::Teacher(self.teacher.clone()),
            Identifier::Teacher(_) => Identifier::Class(self.class.clone()),
        }
    }

    pub fn involves(&self, id: &Identifier) -> bool {
        match id {
            Identifier::Class(class) => &self.class == class,
            Identifier::Teacher(teacher) => &self.teacher == teacher,
        }
    }
}

/// A cell that names no counterpart (homeroom, self-study, assemblies).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandaloneActivity {
    pub slot: Slot,
    pub subject: String,
}

/// A course held in a break row (lunch), outside the period numbering.
///
/// Break rows have no slot, so these sessions are reported as the requested
/// page lists them and are not cross-checked against counterpart pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakSession {
    pub weekday: u8,
    /// 1-based position of the break row in `breaks`.
    pub break_number: usize,
    pub label: String,
    pub subject: String,
    pub counterpart: Option<Identifier>,
    pub substitute: bool,
}

/// What kind of disagreement the two views of a slot have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionKind {
    /// Both pages list the lesson but name different subjects.
    SubjectMismatch,
    /// One page lists the lesson and the other does not.
    CounterpartMissing,
    /// The counterpart page could not be fetched, parsed or validated.
    CounterpartUnavailable,
}

impl fmt::Display for ContradictionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContradictionKind::SubjectMismatch => write!(f, "subject mismatch"),
            ContradictionKind::CounterpartMissing => write!(f, "counterpart missing"),
            ContradictionKind::CounterpartUnavailable => write!(f, "counterpart unavailable"),
        }
    }
}

/// A recorded disagreement between the requested page and a counterpart page.
///
/// Both readings are kept verbatim; the entry emitted for the slot shows only
/// the one the authority policy picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contradiction {
    pub slot: Slot,
    pub kind: ContradictionKind,
    pub counterpart: Identifier,
    /// What the requested identifier's page says, if anything.
    pub requested_reading: Option<String>,
    /// What the counterpart page says, if anything.
    pub counterpart_reading: Option<String>,
    /// Which view's subject was displayed on the emitted entry.
    pub displayed: ViewKind,
    pub detail: String,
}

impl fmt::Display for Contradiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} with {}: {}",
            self.slot, self.kind, self.counterpart, self.detail
        )
    }
}

/// The complete, immutable schedule for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub identifier: Identifier,
    /// Sorted by slot, then class, then teacher.
    #[serde(rename = "slots")]
    pub entries: Vec<ScheduleEntry>,
    pub activities: Vec<StandaloneActivity>,
    pub contradictions: Vec<Contradiction>,
    pub periods: Vec<PeriodInfo>,
    pub breaks: Vec<PeriodInfo>,
    pub break_sessions: Vec<BreakSession>,
    pub last_update: Option<String>,
    /// Cell-level parse warnings from the requested page.
    pub warnings: Vec<String>,
}

impl Schedule {
    pub fn entries_at(&self, slot: &Slot) -> impl Iterator<Item = &ScheduleEntry> {
        let slot = *slot;
        self.entries.iter().filter(move |e| e.slot == slot)
    }

    pub fn contradictions_at(&self, slot: &Slot) -> impl Iterator<Item = &Contradiction> {
        let slot = *slot;
        self.contradictions.iter().filter(move |c| c.slot == slot)
    }

    /// Entries shared with one counterpart.
    pub fn entries_with(&self, counterpart: &Identifier) -> impl Iterator<Item = &ScheduleEntry> {
        let counterpart = counterpart.clone();
        self.entries
            .iter()
            .filter(move |e| e.involves(&counterpart))
    }

    pub fn is_clean(&self) -> bool {
        self.contradictions.is_empty()
    }

    /// The break row with 1-based position `number`.
    pub fn break_row(&self, number: usize) -> Option<&PeriodInfo> {
        number.checked_sub(1).and_then(|i| self.breaks.get(i))
    }

    pub fn period(&self, number: u8) -> Option<&PeriodInfo> {
        self.periods
            .iter()
            .find(|p| p.number == usize::from(number))
    }
}
