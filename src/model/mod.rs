//! Timetable data model, from raw page cells to the reconciled schedule.

pub mod grid;
pub mod schedule;
pub mod view;

pub use grid::{PeriodInfo, RawCell, RawCoord, RawGrid, RawLink};
pub use schedule::{
    BreakSession, Contradiction, ContradictionKind, Schedule, ScheduleEntry, StandaloneActivity,
};
pub use view::{normalize_subject, EntryFragment, NormalizedView};
