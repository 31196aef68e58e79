//! Locating the timetable table and laying its cells onto weekday × period.
//!
//! Source pages are exported from a word processor: the grid is one `<table>`
//! among layout tables, decorated with border-only cells, and may merge cells
//! with `rowspan`/`colspan`. The first column labels the period, an optional
//! second column carries its time range, and the remaining columns are days.

use super::cell::{element_text, parse_cell};
use crate::constants::LUNCH_BREAK_LABEL;
use crate::error::ParseError;
use crate::model::{PeriodInfo, RawCell, RawCoord, RawGrid};
use crate::types::Identifier;
use chrono::NaiveTime;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("table selector is valid"));
static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("tr selector is valid"));
static CENTERED_PARAGRAPH: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"p[align="center"], p.MsoNormal"#).expect("paragraph selector is valid")
});

static PERIOD_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(第\s*[一二三四五六七八九十\d]+\s*節|\d{1,2})$").expect("period label regex is valid")
});
static TIME_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}):?(\d{2})\s*[｜|~～\-－]\s*(\d{1,2}):?(\d{2})")
        .expect("time range regex is valid")
});
static WEEKDAY_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:星期|週|周|禮拜)?([一二三四五六日天])$|^(?i)(mon|tue|wed|thu|fri|sat|sun)")
        .expect("weekday label regex is valid")
});
static LAST_UPDATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{2,4}[/\-.]\d{1,2}[/\-.]\d{1,2}(?:\s+\d{1,2}:\d{2}(?::\d{2})?)?")
        .expect("last update regex is valid")
});

/// Cap on merged-cell spans; anything larger is a broken attribute.
const MAX_SPAN: usize = 16;

/// Parses a timetable page into a [`RawGrid`].
///
/// Fails only when no table on the page looks like a timetable. Problems with
/// individual cells are recorded in [`RawGrid::warnings`] and the cell is kept
/// as empty.
pub fn parse(markup: &str, identifier: &Identifier) -> Result<RawGrid, ParseError> {
    let document = Html::parse_document(markup);

    let layout = document
        .select(&TABLE_SELECTOR)
        .map(lay_out_table)
        .enumerate()
        .filter(|(_, rows)| rows.iter().any(|row| classify(row) == RowKind::Period))
        // Most period rows wins; the earlier table wins a tie.
        .max_by_key(|(index, rows)| {
            let periods = rows.iter().filter(|r| classify(r) == RowKind::Period).count();
            (periods, std::cmp::Reverse(*index))
        });

    let rows = match layout {
        Some((_, rows)) => rows,
        None => {
            return Err(ParseError::StructureNotFound {
                identifier: identifier.to_string(),
                reason: "no table with period rows".to_string(),
            })
        }
    };

    let mut grid = build_grid(&rows);
    if grid.periods.is_empty() {
        return Err(ParseError::StructureNotFound {
            identifier: identifier.to_string(),
            reason: "table has only break rows".to_string(),
        });
    }
    grid.last_update = find_last_update(&document);

    debug!(
        "Parsed grid for {}: {} periods, {} breaks, {} non-empty cells, {} warnings",
        identifier,
        grid.periods.len(),
        grid.breaks.len(),
        grid.non_empty_cells().count(),
        grid.warnings.len()
    );
    Ok(grid)
}

/// One cell after span expansion. Span copies share the source cell.
#[derive(Clone)]
struct LaidOutCell<'a> {
    element: ElementRef<'a>,
    text: String,
}

/// Rows of `table` (not of nested tables) with rowspan/colspan expanded.
fn lay_out_table(table: ElementRef<'_>) -> Vec<Vec<LaidOutCell<'_>>> {
    let mut rows = Vec::new();
    // Per column: the cell carried down by a rowspan and how many rows remain.
    let mut carried: Vec<Option<(LaidOutCell<'_>, usize)>> = Vec::new();

    for tr in table.select(&ROW_SELECTOR).filter(|tr| owned_by(*tr, table)) {
        let mut row: Vec<LaidOutCell<'_>> = Vec::new();
        let mut column = 0;

        for td in tr
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| matches!(el.value().name(), "td" | "th"))
            .filter(|el| !is_border_cell(*el))
        {
            while let Some(cell) = take_carried(column, &mut carried) {
                row.push(cell);
                column += 1;
            }

            let rowspan = span(td, "rowspan");
            let colspan = span(td, "colspan");
            let cell = LaidOutCell {
                element: td,
                text: element_text(td),
            };
            for _ in 0..colspan {
                if rowspan > 1 {
                    if carried.len() <= column {
                        carried.resize(column + 1, None);
                    }
                    carried[column] = Some((cell.clone(), rowspan - 1));
                }
                row.push(cell.clone());
                column += 1;
            }
        }
        while let Some(cell) = take_carried(column, &mut carried) {
            row.push(cell);
            column += 1;
        }

        rows.push(row);
    }
    rows
}

fn take_carried<'a>(
    column: usize,
    carried: &mut [Option<(LaidOutCell<'a>, usize)>],
) -> Option<LaidOutCell<'a>> {
    let slot = carried.get_mut(column)?;
    let (cell, remaining) = slot.as_mut()?;
    let cell = cell.clone();
    *remaining -= 1;
    if *remaining == 0 {
        *slot = None;
    }
    Some(cell)
}

fn owned_by(tr: ElementRef<'_>, table: ElementRef<'_>) -> bool {
    tr.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")
        .is_some_and(|nearest| nearest.id() == table.id())
}

/// Word exports pad the grid with cells that only draw a border.
fn is_border_cell(td: ElementRef<'_>) -> bool {
    td.value()
        .attr("style")
        .is_some_and(|style| style.contains("border"))
}

fn span(td: ElementRef<'_>, attr: &str) -> usize {
    td.value()
        .attr(attr)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_SPAN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Header,
    Period,
    Break,
    Other,
}

fn classify(row: &[LaidOutCell<'_>]) -> RowKind {
    let Some(first) = row.first() else {
        return RowKind::Other;
    };
    if first.text.contains(LUNCH_BREAK_LABEL) {
        return RowKind::Break;
    }
    let has_time = row.get(1).is_some_and(|c| TIME_RANGE.is_match(&c.text))
        || TIME_RANGE.is_match(&first.text);
    if PERIOD_LABEL.is_match(&first.text) || has_time {
        return RowKind::Period;
    }
    let weekday_labels = row
        .iter()
        .filter(|c| weekday_number(&c.text).is_some())
        .count();
    if weekday_labels >= 2 {
        return RowKind::Header;
    }
    RowKind::Other
}

/// Monday = 1 ... Sunday = 7.
fn weekday_number(label: &str) -> Option<usize> {
    let caps = WEEKDAY_LABEL.captures(label.trim())?;
    let key = caps.get(1).or_else(|| caps.get(2))?.as_str().to_lowercase();
    let number = match key.as_str() {
        "一" | "mon" => 1,
        "二" | "tue" => 2,
        "三" | "wed" => 3,
        "四" | "thu" => 4,
        "五" | "fri" => 5,
        "六" | "sat" => 6,
        "日" | "天" | "sun" => 7,
        _ => return None,
    };
    Some(number)
}

/// Day columns as (layout column, weekday number).
fn day_columns(rows: &[Vec<LaidOutCell<'_>>]) -> Vec<(usize, usize)> {
    if let Some(header) = rows.iter().find(|r| classify(r) == RowKind::Header) {
        return header
            .iter()
            .enumerate()
            .filter_map(|(column, cell)| weekday_number(&cell.text).map(|day| (column, day)))
            .collect();
    }

    // No header: days start right after the label and optional time column.
    let period_rows: Vec<&Vec<LaidOutCell<'_>>> = rows
        .iter()
        .filter(|r| classify(r) == RowKind::Period)
        .collect();
    let has_time_column = period_rows
        .iter()
        .any(|r| r.get(1).is_some_and(|c| TIME_RANGE.is_match(&c.text)));
    let first_day = if has_time_column { 2 } else { 1 };
    let width = period_rows.iter().map(|r| r.len()).max().unwrap_or(0);
    (first_day..width)
        .map(|column| (column, column - first_day + 1))
        .collect()
}

fn build_grid(rows: &[Vec<LaidOutCell<'_>>]) -> RawGrid {
    let mut grid = RawGrid::default();
    let columns = day_columns(rows);

    for (row_index, row) in rows.iter().enumerate() {
        match classify(row) {
            RowKind::Break => {
                grid.breaks.push(period_info(row, 0));
                let number = grid.breaks.len();
                let cells = read_day_cells(row, row_index, &columns, &mut grid.warnings);
                grid.break_cells.extend(cells.into_iter().map(|(weekday, cell)| {
                    (RawCoord { weekday, period: number }, cell)
                }));
            }
            RowKind::Period => {
                grid.periods.push(period_info(row, grid.periods.len() + 1));
                let period = grid.periods.len();
                let cells = read_day_cells(row, row_index, &columns, &mut grid.warnings);
                grid.cells.extend(
                    cells
                        .into_iter()
                        .map(|(weekday, cell)| (RawCoord { weekday, period }, cell)),
                );
            }
            RowKind::Header | RowKind::Other => {
                debug!("Skipping non-period row {}", row_index + 1);
            }
        }
    }
    grid
}

/// Parses the day columns of one row into (weekday, cell) pairs.
fn read_day_cells(
    row: &[LaidOutCell<'_>],
    row_index: usize,
    columns: &[(usize, usize)],
    warnings: &mut Vec<ParseError>,
) -> Vec<(usize, RawCell)> {
    let mut cells = Vec::with_capacity(columns.len());
    for &(column, weekday) in columns {
        let Some(laid_out) = row.get(column) else {
            warnings.push(ParseError::CellMalformed {
                row: row_index + 1,
                column: column + 1,
                reason: "row ends before this day column".to_string(),
            });
            cells.push((weekday, RawCell::empty()));
            continue;
        };
        let (cell, problems) = parse_cell(laid_out.element);
        warnings.extend(problems.into_iter().map(|reason| ParseError::CellMalformed {
            row: row_index + 1,
            column: column + 1,
            reason,
        }));
        cells.push((weekday, cell));
    }
    cells
}

fn period_info(row: &[LaidOutCell<'_>], number: usize) -> PeriodInfo {
    let label = row.first().map(|c| c.text.clone()).unwrap_or_default();
    let times = row
        .iter()
        .take(2)
        .find_map(|c| parse_time_range(&c.text));
    let (start, end) = match times {
        Some((start, end)) => (Some(start), Some(end)),
        None => (None, None),
    };
    PeriodInfo {
        number,
        label,
        start,
        end,
    }
}

/// Parses "0810｜0900" or "08:10-09:00".
pub fn parse_time_range(text: &str) -> Option<(NaiveTime, NaiveTime)> {
    let caps = TIME_RANGE.captures(text)?;
    let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let start = NaiveTime::from_hms_opt(field(1)?, field(2)?, 0)?;
    let end = NaiveTime::from_hms_opt(field(3)?, field(4)?, 0)?;
    Some((start, end))
}

fn find_last_update(document: &Html) -> Option<String> {
    document
        .select(&CENTERED_PARAGRAPH)
        .map(element_text)
        .find_map(|text| LAST_UPDATE.find(&text).map(|m| m.as_str().to_string()))
}
