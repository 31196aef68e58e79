// src/api/directory.rs
//! The school's index pages: which page belongs to which class or teacher.
//!
//! Index pages are tables grouped under category headings (a row holding a
//! `<span>` and no link), with one link per class or teacher below each
//! heading. Names that appear under more than one heading are ambiguous and
//! never resolved.

use crate::error::FetchError;
use crate::parsing::clean_text;
use crate::types::{Identifier, ViewKind};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("tr selector is valid"));
static SPAN_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span").expect("span selector is valid"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("link selector is valid"));
static CJK_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[一-龥]+").expect("CJK regex is valid"));

/// Teacher links without a Chinese name carry a three-character code prefix.
const TEACHER_CODE_PREFIX_CHARS: usize = 3;

/// One link on an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub category: String,
    pub href: String,
}

#[derive(Debug, Clone)]
enum Listing {
    Unique(DirectoryEntry),
    Ambiguous(Vec<String>),
}

/// Identifier → page lookup built from both index pages.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    classes: HashMap<String, Listing>,
    teachers: HashMap<String, Listing>,
}

impl Directory {
    pub fn from_pages(class_index: &str, teacher_index: &str) -> Self {
        let mut directory = Self::default();
        for entry in parse_index(class_index, ViewKind::ClassView) {
            insert(&mut directory.classes, entry);
        }
        for entry in parse_index(teacher_index, ViewKind::TeacherView) {
            insert(&mut directory.teachers, entry);
        }
        debug!(
            "Directory loaded: {} classes, {} teachers",
            directory.classes.len(),
            directory.teachers.len()
        );
        directory
    }

    pub fn len(&self) -> usize {
        self.classes.len() + self.teachers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds the page for `identifier`, trying each alias group that
    /// contains a teacher's name when the name itself is not listed.
    pub fn resolve(
        &self,
        identifier: &Identifier,
        aliases: &[Vec<String>],
    ) -> Result<&DirectoryEntry, FetchError> {
        let (listings, index) = match identifier.kind() {
            ViewKind::ClassView => (&self.classes, "class index"),
            ViewKind::TeacherView => (&self.teachers, "teacher index"),
        };

        let mut candidates = vec![identifier.as_str().to_string()];
        if identifier.kind() == ViewKind::TeacherView {
            candidates.extend(
                aliases
                    .iter()
                    .filter(|group| group.iter().any(|name| name == identifier.as_str()))
                    .flatten()
                    .filter(|name| name.as_str() != identifier.as_str())
                    .cloned(),
            );
        }

        let mut ambiguity = None;
        for name in &candidates {
            match listings.get(name) {
                Some(Listing::Unique(entry)) => {
                    if name != identifier.as_str() {
                        debug!("Resolved {} through alias {}", identifier, name);
                    }
                    return Ok(entry);
                }
                Some(Listing::Ambiguous(categories)) => {
                    ambiguity.get_or_insert_with(|| {
                        format!(
                            "'{}' is listed under several categories: {}",
                            name,
                            categories.join(", ")
                        )
                    });
                }
                None => {}
            }
        }

        Err(FetchError::NotFound {
            identifier: identifier.to_string(),
            reason: ambiguity.unwrap_or_else(|| format!("not listed in the {}", index)),
        })
    }
}

fn insert(listings: &mut HashMap<String, Listing>, entry: DirectoryEntry) {
    match listings.get_mut(&entry.name) {
        None => {
            listings.insert(entry.name.clone(), Listing::Unique(entry));
        }
        Some(Listing::Unique(existing)) if existing.href == entry.href => {}
        Some(listing) => {
            let mut categories = match listing {
                Listing::Unique(existing) => vec![existing.category.clone()],
                Listing::Ambiguous(categories) => std::mem::take(categories),
            };
            categories.push(entry.category);
            *listing = Listing::Ambiguous(categories);
        }
    }
}

/// Reads every entry of one index page. Labels that do not form a valid
/// identifier of `kind` are skipped.
pub fn parse_index(markup: &str, kind: ViewKind) -> Vec<DirectoryEntry> {
    let document = Html::parse_document(markup);
    let mut entries = Vec::new();
    let mut category: Option<String> = None;

    for tr in document.select(&ROW_SELECTOR) {
        if is_category_row(tr) {
            category = tr
                .select(&SPAN_SELECTOR)
                .next()
                .map(|span| clean_text(&span.text().collect::<String>()));
            continue;
        }
        let Some(current) = category.as_ref() else {
            continue;
        };

        for a in tr.select(&LINK_SELECTOR) {
            let href = a.value().attr("href").map(str::trim).unwrap_or("");
            let label: String = a.text().collect();
            let name = match kind {
                ViewKind::ClassView => Some(clean_text(&label)),
                ViewKind::TeacherView => teacher_name(&label),
            };
            let parsed = name
                .as_deref()
                .and_then(|name| Identifier::parse(name, kind).ok());
            match parsed {
                Some(id) if !href.is_empty() => entries.push(DirectoryEntry {
                    name: id.as_str().to_string(),
                    category: current.clone(),
                    href: href.to_string(),
                }),
                _ => debug!("Skipping index link '{}' ({})", label.trim(), href),
            }
        }
    }
    entries
}

fn is_category_row(tr: ElementRef<'_>) -> bool {
    tr.select(&SPAN_SELECTOR).next().is_some() && tr.select(&LINK_SELECTOR).next().is_none()
}

/// The first run of Chinese characters, or the label minus its code prefix.
fn teacher_name(label: &str) -> Option<String> {
    if let Some(run) = CJK_RUN.find(label) {
        return Some(run.as_str().to_string());
    }
    let compact: String = label.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.chars().count() > TEACHER_CODE_PREFIX_CHARS {
        Some(compact.chars().skip(TEACHER_CODE_PREFIX_CHARS).collect())
    } else {
        None
    }
}
