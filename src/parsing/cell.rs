//! Reading a single `<td>` into a [`RawCell`].

use crate::model::{RawCell, RawLink};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Node, Selector};

static P_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("p selector is valid"));
static A_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("a selector is valid"));

/// Collapses layout whitespace (including non-breaking spaces) and trims.
pub fn clean_text(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Full visible text of an element, cleaned.
pub fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
}

/// Parses a cell. Returns the cell plus any per-cell problems worth reporting.
///
/// Source pages put each course line in its own `<p>`; paragraphs holding an
/// `<a>` name the counterpart, the rest are subject text. Cells without
/// paragraphs fall back to reading lines (split at `<br>`) and links directly.
pub fn parse_cell(td: ElementRef<'_>) -> (RawCell, Vec<String>) {
    let mut cell = RawCell::empty();
    let mut problems = Vec::new();

    let paragraphs: Vec<ElementRef<'_>> = td.select(&P_SELECTOR).collect();
    if paragraphs.is_empty() {
        collect_links(td, &mut cell, &mut problems);
        cell.subject_lines = lines_outside_links(td);
        return (cell, problems);
    }

    for p in paragraphs {
        if p.select(&A_SELECTOR).next().is_some() {
            collect_links(p, &mut cell, &mut problems);
        } else {
            let line = element_text(p);
            if !line.is_empty() {
                cell.subject_lines.push(line);
            }
        }
    }

    (cell, problems)
}

fn collect_links(scope: ElementRef<'_>, cell: &mut RawCell, problems: &mut Vec<String>) {
    for a in scope.select(&A_SELECTOR) {
        let label = element_text(a);
        let href = a.value().attr("href").map(str::trim).unwrap_or("");
        match (label.is_empty(), href.is_empty()) {
            (false, false) => cell.links.push(RawLink {
                label,
                href: href.to_string(),
            }),
            (false, true) => problems.push(format!("link '{}' has no href", label)),
            // An anchor with no text is an empty bookmark, not content.
            (true, _) => {}
        }
    }
}

/// Text lines of `element`, split at `<br>`, skipping text inside links.
fn lines_outside_links(element: ElementRef<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    walk_text(element, &mut current, &mut lines);
    lines.push(current);
    lines
        .iter()
        .map(|line| clean_text(line))
        .filter(|line| !line.is_empty())
        .collect()
}

fn walk_text(element: ElementRef<'_>, current: &mut String, lines: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => current.push_str(&text[..]),
            Node::Element(el) if el.name() == "a" => {}
            Node::Element(el) if el.name() == "br" => lines.push(std::mem::take(current)),
            Node::Element(_) => {
                if let Some(inner) = ElementRef::wrap(child) {
                    walk_text(inner, current, lines);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first_td(html: &str) -> (Html, Selector) {
        (
            Html::parse_fragment(&format!("<table><tr>{}</tr></table>", html)),
            Selector::parse("td").unwrap(),
        )
    }

    #[test]
    fn paragraphs_split_subject_and_links() {
        let (doc, td) = first_td(
            r#"<td><p>數學</p><p><a href="TA01.html">王 大明</a></p></td>"#,
        );
        let (cell, problems) = parse_cell(doc.select(&td).next().unwrap());
        assert!(problems.is_empty());
        assert_eq!(cell.subject_lines, vec!["數學"]);
        assert_eq!(cell.links.len(), 1);
        assert_eq!(cell.links[0].label, "王 大明");
        assert_eq!(cell.links[0].href, "TA01.html");
    }

    #[test]
    fn bare_cell_reads_lines_and_links() {
        let (doc, td) = first_td(r#"<td>English<br>Conversation <a href="TB02.html">Tim</a></td>"#);
        let (cell, _) = parse_cell(doc.select(&td).next().unwrap());
        assert_eq!(cell.subject_lines, vec!["English", "Conversation"]);
        assert_eq!(cell.links[0].label, "Tim");
    }

    #[test]
    fn empty_cell_is_explicitly_empty() {
        let (doc, td) = first_td("<td>&nbsp;</td>");
        let (cell, problems) = parse_cell(doc.select(&td).next().unwrap());
        assert!(cell.is_empty());
        assert!(problems.is_empty());
    }

    #[test]
    fn link_without_href_is_reported() {
        let (doc, td) = first_td(r#"<td><p>化學</p><p><a>李四</a></p></td>"#);
        let (cell, problems) = parse_cell(doc.select(&td).next().unwrap());
        assert!(cell.links.is_empty());
        assert_eq!(problems.len(), 1);
    }
}
