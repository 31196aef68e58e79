// src/formatting.rs
//! Rendering of a reconciled schedule: a Markdown table for the terminal and
//! an iCalendar feed of weekly recurring events.

use crate::model::{BreakSession, PeriodInfo, Schedule, ScheduleEntry};
use crate::types::{weekday_name, Identifier, Slot, SlotBounds};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use log::debug;
use std::fmt::Write;

const WEEKDAY_HEADERS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Renders `schedule` as a period × weekday table followed by activities
/// and contradictions.
///
/// Slots with a contradiction are marked `!`, substitute sessions `*`.
pub fn render_schedule(schedule: &Schedule, bounds: &SlotBounds) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Timetable for {}", schedule.identifier);
    if let Some(updated) = &schedule.last_update {
        let _ = writeln!(out, "\nLast updated: {}", updated);
    }
    out.push('\n');

    let days = usize::from(bounds.days);
    let _ = write!(out, "| Period |");
    for name in WEEKDAY_HEADERS.iter().take(days) {
        let _ = write!(out, " {} |", name);
    }
    out.push('\n');
    out.push_str("|---|");
    out.push_str(&"---|".repeat(days));
    out.push('\n');

    for period in 1..=bounds.periods {
        let _ = write!(out, "| {} |", period_label(schedule, period));
        for weekday in 1..=days {
            let cell = Slot::new(weekday, usize::from(period), bounds)
                .map(|slot| render_cell(schedule, &slot))
                .unwrap_or_default();
            let _ = write!(out, " {} |", escape(&cell));
        }
        out.push('\n');
    }

    if !schedule.breaks.is_empty() {
        out.push('\n');
        for (index, row) in schedule.breaks.iter().enumerate() {
            let _ = match (row.start, row.end) {
                (Some(start), Some(end)) => writeln!(
                    out,
                    "{}: {}–{}",
                    row.label,
                    start.format("%H:%M"),
                    end.format("%H:%M")
                ),
                _ => writeln!(out, "{}", row.label),
            };
            for session in schedule
                .break_sessions
                .iter()
                .filter(|s| s.break_number == index + 1)
            {
                let _ = writeln!(
                    out,
                    "- {} {}",
                    weekday_name(session.weekday),
                    describe_session(session)
                );
            }
        }
    }

    if !schedule.activities.is_empty() {
        let _ = writeln!(out, "\n## Activities\n");
        for activity in &schedule.activities {
            let _ = writeln!(out, "- {} {}", activity.slot, activity.subject);
        }
    }

    if !schedule.contradictions.is_empty() {
        let _ = writeln!(out, "\n## Contradictions\n");
        for contradiction in &schedule.contradictions {
            let _ = writeln!(out, "- {}", contradiction);
        }
    }

    if !schedule.warnings.is_empty() {
        let _ = writeln!(out, "\n## Parse warnings\n");
        for warning in &schedule.warnings {
            let _ = writeln!(out, "- {}", warning);
        }
    }

    out
}

fn period_label(schedule: &Schedule, period: u8) -> String {
    match schedule.period(period) {
        Some(info) => match (info.start, info.end) {
            (Some(start), Some(end)) => format!(
                "{} {}–{}",
                info.label,
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
            _ => info.label.clone(),
        },
        None => period.to_string(),
    }
}

fn render_cell(schedule: &Schedule, slot: &Slot) -> String {
    let mut parts: Vec<String> = schedule
        .entries_at(slot)
        .map(|entry| describe(entry, &schedule.identifier))
        .collect();
    parts.extend(
        schedule
            .activities
            .iter()
            .filter(|a| a.slot == *slot)
            .map(|a| a.subject.clone()),
    );

    let mut cell = parts.join(" / ");
    if schedule.contradictions_at(slot).next().is_some() {
        cell.push_str(" !");
    }
    cell
}

fn describe(entry: &ScheduleEntry, own: &Identifier) -> String {
    let marker = if entry.substitute { "*" } else { "" };
    format!(
        "{}{} ({})",
        entry.subject,
        marker,
        entry.counterpart_of(own).as_str()
    )
}

fn describe_session(session: &BreakSession) -> String {
    let marker = if session.substitute { "*" } else { "" };
    match &session.counterpart {
        Some(counterpart) => format!("{}{} ({})", session.subject, marker, counterpart.as_str()),
        None => format!("{}{}", session.subject, marker),
    }
}

fn escape(text: &str) -> String {
    text.replace('|', "\\|")
}

const ICS_WEEKDAYS: [&str; 7] = ["MO", "TU", "WE", "TH", "FR", "SA", "SU"];
/// Content lines longer than this many octets are folded.
const ICS_LINE_LIMIT: usize = 75;

/// When and where the exported events recur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarOptions {
    /// Monday of the first week of events.
    pub first_week: NaiveDate,
    /// Number of weekly occurrences of each event.
    pub weeks: u32,
    pub location: Option<String>,
    /// Stamped on every event as `DTSTAMP`.
    pub generated_at: NaiveDateTime,
}

impl CalendarOptions {
    /// Events from the week containing `now` to the end of its semester.
    ///
    /// The autumn semester (August onwards) runs to 1 February, the spring
    /// semester to 1 July.
    pub fn for_semester(now: NaiveDateTime) -> Self {
        let today = now.date();
        let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
        let end = if today.month() >= 8 {
            NaiveDate::from_ymd_opt(today.year() + 1, 2, 1)
        } else {
            NaiveDate::from_ymd_opt(today.year(), 7, 1)
        };
        let weeks = end
            .map(|end| (end - monday).num_days() / 7 + 1)
            .and_then(|weeks| u32::try_from(weeks).ok())
            .unwrap_or(1)
            .max(1);
        Self {
            first_week: monday,
            weeks,
            location: None,
            generated_at: now,
        }
    }
}

/// One timed occurrence in the first week.
struct CalendarEvent {
    weekday: u8,
    start: NaiveDateTime,
    end: NaiveDateTime,
    summary: String,
    description: String,
}

/// Renders `schedule` as an iCalendar (RFC 5545) document.
///
/// Every entry, activity and break session becomes a weekly event repeating
/// `options.weeks` times. Items whose period has no published time range are
/// left out.
pub fn render_ics(schedule: &Schedule, options: &CalendarOptions) -> String {
    let events = calendar_events(schedule, options.first_week);
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:-//school-timetable//{}//EN", escape_ics(schedule.identifier.as_str())),
        "CALSCALE:GREGORIAN".to_string(),
        format!("X-WR-CALNAME:{}", escape_ics(&schedule.identifier.to_string())),
    ];

    for (index, event) in events.iter().enumerate() {
        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!(
            "UID:{}-{}@school-timetable",
            schedule.identifier.as_str(),
            index + 1
        ));
        lines.push(format!("DTSTAMP:{}", ics_time(&options.generated_at)));
        lines.push(format!("DTSTART:{}", ics_time(&event.start)));
        lines.push(format!("DTEND:{}", ics_time(&event.end)));
        lines.push(format!(
            "RRULE:FREQ=WEEKLY;COUNT={};BYDAY={};WKST=MO",
            options.weeks,
            ICS_WEEKDAYS[usize::from(event.weekday.saturating_sub(1)) % ICS_WEEKDAYS.len()]
        ));
        lines.push(format!("SUMMARY:{}", escape_ics(&event.summary)));
        if !event.description.is_empty() {
            lines.push(format!("DESCRIPTION:{}", escape_ics(&event.description)));
        }
        if let Some(location) = &options.location {
            lines.push(format!("LOCATION:{}", escape_ics(location)));
        }
        lines.push("END:VEVENT".to_string());
    }
    lines.push("END:VCALENDAR".to_string());

    let mut out = String::new();
    for line in &lines {
        out.push_str(&fold_line(line));
        out.push_str("\r\n");
    }
    out
}

fn calendar_events(schedule: &Schedule, first_week: NaiveDate) -> Vec<CalendarEvent> {
    let at = |weekday: u8, period: Option<&PeriodInfo>| {
        let period = period?;
        let day = first_week + Duration::days(i64::from(weekday) - 1);
        Some((day.and_time(period.start?), day.and_time(period.end?)))
    };

    let mut events = Vec::new();
    let mut untimed = 0;
    for entry in &schedule.entries {
        let slot = entry.slot;
        let Some((start, end)) = at(slot.weekday(), schedule.period(slot.period())) else {
            untimed += 1;
            continue;
        };
        let counterpart = entry.counterpart_of(&schedule.identifier);
        let mut description = format!("With {}", counterpart.as_str());
        if entry.substitute {
            description.push_str("\nSubstitute session");
        }
        events.push(CalendarEvent {
            weekday: entry.slot.weekday(),
            start,
            end,
            summary: entry.subject.clone(),
            description,
        });
    }
    for activity in &schedule.activities {
        let slot = activity.slot;
        let Some((start, end)) = at(slot.weekday(), schedule.period(slot.period())) else {
            untimed += 1;
            continue;
        };
        events.push(CalendarEvent {
            weekday: activity.slot.weekday(),
            start,
            end,
            summary: activity.subject.clone(),
            description: String::new(),
        });
    }
    for session in &schedule.break_sessions {
        let Some((start, end)) = at(session.weekday, schedule.break_row(session.break_number)) else {
            untimed += 1;
            continue;
        };
        let description = match &session.counterpart {
            Some(counterpart) => format!("{}, with {}", session.label, counterpart.as_str()),
            None => session.label.clone(),
        };
        events.push(CalendarEvent {
            weekday: session.weekday,
            start,
            end,
            summary: session.subject.clone(),
            description,
        });
    }

    if untimed > 0 {
        debug!(
            "{}: {} items without period times left out of the calendar",
            schedule.identifier, untimed
        );
    }
    events.sort_by_key(|event| event.start);
    events
}

fn ics_time(time: &NaiveDateTime) -> String {
    time.format("%Y%m%dT%H%M%S").to_string()
}

fn escape_ics(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

/// Splits a content line into chunks of at most 75 octets, never inside a
/// UTF-8 sequence. Continuation lines start with a space.
fn fold_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + line.len() / ICS_LINE_LIMIT * 3);
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        // Continuation lines spend one octet on the leading space.
        if width + len > ICS_LINE_LIMIT {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(ch);
        width += len;
    }
    out
}
