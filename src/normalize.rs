//! View normalization: applies the timetable schema to a parsed grid.
//!
//! Coordinates become bounded [`Slot`]s, link labels become typed
//! identifiers in the counterpart namespace, and multi-course cells are split
//! into one [`EntryFragment`] per course.

use crate::model::{BreakSession, EntryFragment, NormalizedView, RawCell, RawGrid};
use crate::parsing::clean_text;
use crate::types::{weekday_name, Identifier, Slot, SlotBounds, ValidationError, ViewKind};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// `(代)`, `(代課)` and `(調)` in ASCII or full-width parentheses.
static SUBSTITUTE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[（(]\s*(?:代課|代|調)\s*[)）]").expect("substitute marker regex is valid")
});

static DIGIT_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("digit run regex is valid"));

/// Converts `grid`, fetched for `identifier`, into a [`NormalizedView`].
///
/// Any schema violation on the page rejects the whole view: a grid that does
/// not fit the bounds is not silently truncated.
pub fn normalize(
    grid: &RawGrid,
    identifier: &Identifier,
    kind: ViewKind,
    bounds: &SlotBounds,
) -> Result<NormalizedView, ValidationError> {
    if identifier.kind() != kind {
        return Err(ValidationError::KindMismatch {
            grid: identifier.kind(),
            requested: kind,
        });
    }

    let mut slots: BTreeMap<Slot, Vec<EntryFragment>> = BTreeMap::new();
    for (coord, cell) in &grid.cells {
        if cell.is_empty() {
            continue;
        }
        let slot = Slot::new(coord.weekday, coord.period, bounds)?;
        let location = format!("{} {}", identifier, slot);
        let fragments = split_cell(cell, kind.counterpart(), &location)?;

        let entry = slots.entry(slot).or_default();
        for fragment in fragments {
            if !entry.contains(&fragment) {
                entry.push(fragment);
            }
        }
    }

    let mut break_sessions = Vec::new();
    for (coord, cell) in &grid.break_cells {
        if cell.is_empty() {
            continue;
        }
        let weekday = bounds.weekday(coord.weekday)?;
        let label = coord
            .period
            .checked_sub(1)
            .and_then(|i| grid.breaks.get(i))
            .map(|row| row.label.clone())
            .unwrap_or_default();
        let location = format!("{} {} {}", identifier, label, weekday_name(weekday));
        for fragment in split_cell(cell, kind.counterpart(), &location)? {
            break_sessions.push(BreakSession {
                weekday,
                break_number: coord.period,
                label: label.clone(),
                subject: fragment.subject,
                counterpart: fragment.counterpart,
                substitute: fragment.substitute,
            });
        }
    }

    // Empty day columns past the bounds are layout, not data.
    let dropped = grid
        .cells
        .iter()
        .filter(|(coord, cell)| {
            cell.is_empty() && Slot::new(coord.weekday, coord.period, bounds).is_err()
        })
        .count();
    if dropped > 0 {
        debug!("Ignored {} empty cells outside {}", dropped, identifier);
    }

    for warning in &grid.warnings {
        warn!("{}: {}", identifier, warning);
    }

    Ok(NormalizedView {
        identifier: identifier.clone(),
        kind,
        slots,
        periods: grid.periods.clone(),
        breaks: grid.breaks.clone(),
        break_sessions,
        last_update: grid.last_update.clone(),
        warnings: grid.warnings.clone(),
    })
}

/// Splits one non-empty cell into fragments.
///
/// With one subject line per link the lines pair with links in order. In
/// every other shape the whole subject text applies to each link.
fn split_cell(
    cell: &RawCell,
    counterpart_kind: ViewKind,
    location: &str,
) -> Result<Vec<EntryFragment>, ValidationError> {
    let lines: Vec<(String, bool)> = cell
        .subject_lines
        .iter()
        .map(|line| strip_marker(line))
        .filter(|(line, _)| !line.is_empty())
        .collect();
    let labels: Vec<(String, bool)> = cell
        .links
        .iter()
        .map(|link| strip_marker(&link.label))
        .collect();

    let empty_subject = || ValidationError::EmptyRequiredField {
        field: "subject",
        location: location.to_string(),
    };

    if lines.is_empty() {
        return Err(empty_subject());
    }
    if labels.is_empty() {
        return Ok(vec![EntryFragment {
            subject: join_subjects(&lines),
            counterpart: None,
            substitute: lines.iter().any(|(_, marked)| *marked),
        }]);
    }

    let counterparts = labels
        .iter()
        .map(|(label, marked)| Ok((parse_counterpart(label, counterpart_kind)?, *marked)))
        .collect::<Result<Vec<_>, ValidationError>>()?;

    let fragments = if lines.len() == counterparts.len() && lines.len() > 1 {
        lines
            .into_iter()
            .zip(counterparts)
            .map(|((subject, line_marked), (counterpart, link_marked))| EntryFragment {
                subject,
                counterpart: Some(counterpart),
                substitute: line_marked || link_marked,
            })
            .collect()
    } else {
        // A marker on the shared subject covers every session in the cell.
        let subject = join_subjects(&lines);
        let shared_marked = lines.iter().any(|(_, marked)| *marked);
        counterparts
            .into_iter()
            .map(|(counterpart, link_marked)| EntryFragment {
                subject: subject.clone(),
                counterpart: Some(counterpart),
                substitute: shared_marked || link_marked,
            })
            .collect()
    };
    Ok(fragments)
}

/// Removes substitute markers, reporting whether `text` carried one.
fn strip_marker(text: &str) -> (String, bool) {
    let marked = SUBSTITUTE_MARKER.is_match(text);
    (clean_text(&SUBSTITUTE_MARKER.replace_all(text, " ")), marked)
}

fn join_subjects(lines: &[(String, bool)]) -> String {
    lines
        .iter()
        .map(|(line, _)| line.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Class links are sometimes labelled with the grade ("高一 101"); the class
/// code is then the digit run inside the label.
fn parse_counterpart(label: &str, kind: ViewKind) -> Result<Identifier, ValidationError> {
    match Identifier::parse(label, kind) {
        Ok(id) => Ok(id),
        Err(err) if kind == ViewKind::ClassView => DIGIT_RUN
            .find(label)
            .and_then(|digits| Identifier::parse(digits.as_str(), kind).ok())
            .ok_or(err),
        Err(err) => Err(err),
    }
}
