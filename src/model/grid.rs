//! Raw grid: what the page says, before any schema is applied.

use crate::error::ParseError;
use chrono::NaiveTime;
use serde::Serialize;
use std::collections::BTreeMap;

/// A hyperlink inside a cell, pointing at a counterpart page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawLink {
    pub label: String,
    pub href: String,
}

/// The unparsed content of one timetable cell.
///
/// An empty cell is an explicitly empty `RawCell`, never an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawCell {
    /// Text paragraphs that carry no link, usually the subject name.
    pub subject_lines: Vec<String>,
    /// Links to the counterpart page(s).
    pub links: Vec<RawLink>,
}

impl RawCell {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.subject_lines.is_empty() && self.links.is_empty()
    }
}

/// Raw grid coordinate as read from the page, 1-based and not yet validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RawCoord {
    pub weekday: usize,
    pub period: usize,
}

/// One numbered row of the grid: its label and time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodInfo {
    /// 1-based period number; 0 for rows outside the numbering (breaks).
    pub number: usize,
    pub label: String,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
}

/// Weekday × period → cell content for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawGrid {
    pub cells: BTreeMap<RawCoord, RawCell>,
    pub periods: Vec<PeriodInfo>,
    /// Rows recognised as breaks (lunch) and kept out of the numbering.
    pub breaks: Vec<PeriodInfo>,
    /// Cells of break rows. `period` here is the 1-based position of the
    /// row in [`RawGrid::breaks`], not a teaching period.
    pub break_cells: BTreeMap<RawCoord, RawCell>,
    pub last_update: Option<String>,
    /// Per-cell problems that did not prevent producing the grid.
    pub warnings: Vec<ParseError>,
}

impl RawGrid {
    pub fn cell(&self, weekday: usize, period: usize) -> Option<&RawCell> {
        self.cells.get(&RawCoord { weekday, period })
    }

    pub fn break_cell(&self, weekday: usize, break_number: usize) -> Option<&RawCell> {
        self.break_cells.get(&RawCoord {
            weekday,
            period: break_number,
        })
    }

    pub fn non_empty_cells(&self) -> impl Iterator<Item = (&RawCoord, &RawCell)> {
        self.cells.iter().filter(|(_, cell)| !cell.is_empty())
    }
}
