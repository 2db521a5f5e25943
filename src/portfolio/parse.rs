use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use super::{ContentOrigin, PortfolioContent, Section};

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile whitespace regex"));

/// Elements whose text never belongs to the visible page.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Visible text of an element, skipping script-like descendants.
fn element_text(element: ElementRef) -> String {
    let mut parts: Vec<&str> = Vec::new();
    collect_text(element, &mut parts);
    collapse_whitespace(&parts.join(" "))
}

fn collect_text<'a>(element: ElementRef<'a>, parts: &mut Vec<&'a str>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => parts.push(&**text),
            Node::Element(el) => {
                if SKIPPED_ELEMENTS.contains(&el.name()) {
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, parts);
                }
            }
            _ => {}
        }
    }
}

fn section_selector(section: Section) -> Option<Selector> {
    let mut selectors: Vec<String> = section
        .anchors()
        .iter()
        .map(|anchor| format!("#{anchor}"))
        .collect();
    selectors.push(format!("[data-section=\"{}\"]", section.name()));

    match Selector::parse(&selectors.join(", ")) {
        Ok(selector) => Some(selector),
        Err(err) => {
            log::error!("invalid selector for section {section}: {err:?}");
            None
        }
    }
}

/// Extract portfolio sections from page markup.
///
/// A section without a matching anchor gets an empty string. When no anchor
/// matches at all, the whole page text is used as the about section.
pub fn parse_portfolio(html: &str) -> PortfolioContent {
    let document = Html::parse_document(html);

    let mut sections = BTreeMap::new();
    for section in Section::ALL {
        let text = section_selector(section)
            .and_then(|selector| document.select(&selector).next().map(element_text))
            .unwrap_or_default();

        if text.is_empty() {
            log::debug!("section {section}: no content found");
        }
        sections.insert(section, text);
    }

    let full_text = match Selector::parse("body") {
        Ok(body) => document
            .select(&body)
            .next()
            .map(element_text)
            .unwrap_or_else(|| element_text(document.root_element())),
        Err(_) => element_text(document.root_element()),
    };

    let mut content = PortfolioContent::new(sections, full_text, ContentOrigin::Remote);

    if content.is_blank() && !content.full_text.is_empty() {
        log::warn!("no section anchors matched, using full page text as about section");
        let mut sections = BTreeMap::new();
        sections.insert(Section::About, content.full_text.clone());
        content = PortfolioContent::new(sections, content.full_text, ContentOrigin::Remote);
    }

    content
}
