// tests/common/mod.rs
//! Shared fixtures for the integration tests: timetable page markup in the
//! shape the school publishes, and an in-memory page source that counts
//! fetches.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use school_timetable::{FetchError, Identifier, PageSource, ViewKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const PERIOD_LABELS: [&str; 8] = [
    "第一節", "第二節", "第三節", "第四節", "第五節", "第六節", "第七節", "第八節",
];
const PERIOD_TIMES: [&str; 8] = [
    "0810｜0900",
    "0910｜1000",
    "1010｜1100",
    "1110｜1200",
    "1310｜1400",
    "1410｜1500",
    "1510｜1600",
    "1610｜1700",
];
const WEEKDAYS: [&str; 5] = ["星期一", "星期二", "星期三", "星期四", "星期五"];

pub fn class(code: &str) -> Identifier {
    Identifier::parse(code, ViewKind::ClassView).unwrap()
}

pub fn teacher(name: &str) -> Identifier {
    Identifier::parse(name, ViewKind::TeacherView).unwrap()
}

/// Builds one timetable page, Monday to Friday, eight periods.
#[derive(Default, Clone)]
pub struct TimetablePage {
    /// (weekday, period) -> cell body markup
    cells: BTreeMap<(usize, usize), String>,
    /// weekday -> lunch row cell body markup
    lunch: BTreeMap<usize, String>,
}

impl TimetablePage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A lesson whose cell links to the counterpart page.
    pub fn lesson(mut self, weekday: usize, period: usize, subject: &str, counterpart: &str) -> Self {
        self.cells.insert(
            (weekday, period),
            format!(
                r#"<p align="center">{}</p><p align="center"><a href="{}.html">{}</a></p>"#,
                subject, counterpart, counterpart
            ),
        );
        self
    }

    /// A cell with no counterpart link (homeroom, assemblies).
    pub fn activity(mut self, weekday: usize, period: usize, subject: &str) -> Self {
        self.cells.insert(
            (weekday, period),
            format!(r#"<p align="center">{}</p>"#, subject),
        );
        self
    }

    /// A course held in the lunch row.
    pub fn lunch(mut self, weekday: usize, subject: &str, counterpart: &str) -> Self {
        self.lunch.insert(
            weekday,
            format!(
                r#"<p align="center">{}</p><p align="center"><a href="{}.html">{}</a></p>"#,
                subject, counterpart, counterpart
            ),
        );
        self
    }

    /// Arbitrary cell markup.
    pub fn raw(mut self, weekday: usize, period: usize, markup: &str) -> Self {
        self.cells.insert((weekday, period), markup.to_string());
        self
    }

    pub fn render(&self) -> String {
        let mut rows = String::from("<tr><td></td><td></td>");
        for day in WEEKDAYS {
            rows.push_str(&format!("<td>{}</td>", day));
        }
        rows.push_str("</tr>\n");

        for (index, (label, time)) in PERIOD_LABELS.iter().zip(PERIOD_TIMES).enumerate() {
            let period = index + 1;
            rows.push_str(&format!("<tr><td>{}</td><td>{}</td>", label, time));
            for weekday in 1..=WEEKDAYS.len() {
                let body = self
                    .cells
                    .get(&(weekday, period))
                    .map(String::as_str)
                    .unwrap_or("&nbsp;");
                rows.push_str(&format!("<td>{}</td>", body));
            }
            rows.push_str("</tr>\n");
            if period == 4 {
                rows.push_str("<tr><td>午休</td><td>1200｜1300</td>");
                for weekday in 1..=WEEKDAYS.len() {
                    let body = self.lunch.get(&weekday).map(String::as_str).unwrap_or("");
                    rows.push_str(&format!("<td>{}</td>", body));
                }
                rows.push_str("</tr>\n");
            }
        }

        format!(
            r#"<html><head><meta charset="utf-8"></head><body>
<p class="MsoNormal" align="center">更新日期：2024/09/02 08:00</p>
<table border="1" cellspacing="0">
{}</table>
</body></html>"#,
            rows
        )
    }
}

enum Page {
    Markup(String),
    Failing(FetchError),
}

/// An in-memory [`PageSource`] that records how often each page is fetched.
#[derive(Default)]
pub struct FakeSite {
    pages: Mutex<HashMap<Identifier, Page>>,
    fetches: Mutex<HashMap<Identifier, usize>>,
    latency: Duration,
    index_refreshes: AtomicUsize,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long first, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn page(self, identifier: Identifier, page: &TimetablePage) -> Self {
        self.set_page(identifier, page);
        self
    }

    pub fn markup(self, identifier: Identifier, markup: &str) -> Self {
        self.pages
            .lock()
            .insert(identifier, Page::Markup(markup.to_string()));
        self
    }

    pub fn failing(self, identifier: Identifier, error: FetchError) -> Self {
        self.pages.lock().insert(identifier, Page::Failing(error));
        self
    }

    /// Replaces a page after the site was built, as a republish would.
    pub fn set_page(&self, identifier: Identifier, page: &TimetablePage) {
        self.pages
            .lock()
            .insert(identifier, Page::Markup(page.render()));
    }

    pub fn fetches(&self, identifier: &Identifier) -> usize {
        self.fetches.lock().get(identifier).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().values().sum()
    }

    pub fn index_refreshes(&self) -> usize {
        self.index_refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for FakeSite {
    async fn fetch(&self, identifier: &Identifier) -> Result<String, FetchError> {
        *self.fetches.lock().entry(identifier.clone()).or_insert(0) += 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.pages.lock().get(identifier) {
            Some(Page::Markup(markup)) => Ok(markup.clone()),
            Some(Page::Failing(error)) => Err(error.clone()),
            None => Err(FetchError::NotFound {
                identifier: identifier.to_string(),
                reason: "not listed in the directory".to_string(),
            }),
        }
    }

    fn refresh_index(&self) {
        self.index_refreshes.fetch_add(1, Ordering::SeqCst);
    }
}
