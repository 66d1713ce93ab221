// src/extract/pagination.rs
// =============================================================================
// How many pages does this document have?
//
// 1. An explicit "Page X of Y" in the markup or the rendered text: Y wins.
// 2. Otherwise every number that sits next to a page parameter, in an href
//    or onclick ("...&page=7") or as the text of a paging link ("<a
//    href='?page=7'>7</a>"), plus the numbers of a "« 1 2 3 »" pager bar,
//    and we take the largest.
// 3. Otherwise nothing; the caller falls back to its default bound.
//
// Numbers above the plausibility cap are ignored so a stray "page=99999"
// cannot make us synthesize a hundred thousand URLs.
// =============================================================================

use crate::normalize::normalize;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde::Serialize;
use url::Url;

static PAGE_OF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)page\s+(\d+)\s+of\s+(\d+)").expect("page-of pattern is valid"));

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+)\b").expect("number pattern is valid"));

const PAGER_ARROWS: [char; 2] = ['«', '»'];

// Elements whose text can be a page number in a paging bar
const PAGER_TAGS: [&str; 5] = ["a", "span", "div", "li", "button"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationKind {
    /// "Page X of Y" was found
    ExplicitTotal,
    /// Largest page number seen in paging links
    InferredFromLinks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationHint {
    pub max_page: u32,
    pub kind: PaginationKind,
}

pub(super) fn page_number_pattern(page_param: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"[&?]{}=(\d+)", regex::escape(page_param)))
}

pub(super) fn infer(
    document: &Html,
    raw_html: &str,
    page_numbers: &Regex,
    page_param: &str,
    max_plausible: u32,
) -> Option<PaginationHint> {
    let plausible = |n: u32| (1..=max_plausible).contains(&n);

    if let Some(total) = explicit_total(document, raw_html, plausible) {
        return Some(PaginationHint {
            max_page: total,
            kind: PaginationKind::ExplicitTotal,
        });
    }

    let marker = format!("{}=", page_param);
    let mut highest: Option<u32> = None;
    let mut observe = |n: u32| {
        if plausible(n) {
            highest = Some(highest.map_or(n, |h| h.max(n)));
        }
    };

    for element in document.root_element().descendants().filter_map(ElementRef::wrap) {
        let el = element.value();
        let onclick = el.attr("onclick").unwrap_or("");
        let href = el.attr("href").unwrap_or("");

        for text in [onclick, href] {
            for captures in page_numbers.captures_iter(text) {
                if let Some(n) = captures.get(1).and_then(|m| m.as_str().parse().ok()) {
                    observe(n);
                }
            }
        }

        if PAGER_TAGS.contains(&el.name()) && (onclick.contains(&marker) || href.contains(&marker)) {
            let label: String = element.text().collect();
            if let Ok(n) = label.trim().parse::<u32>() {
                observe(n);
            }
        }
    }

    for n in arrow_bar_numbers(document) {
        observe(n);
    }

    highest.map(|max_page| PaginationHint {
        max_page,
        kind: PaginationKind::InferredFromLinks,
    })
}

// First plausible "Page X of Y"; an implausible match earlier in the page
// (a script, a template) does not hide the real one.
fn explicit_total(document: &Html, raw_html: &str, plausible: impl Fn(u32) -> bool) -> Option<u32> {
    let parse = |text: &str| {
        PAGE_OF
            .captures_iter(text)
            .filter_map(|c| c.get(2).and_then(|m| m.as_str().parse::<u32>().ok()))
            .find(|n| plausible(*n))
    };

    parse(raw_html).or_else(|| {
        // Markup such as "Page <b>3</b> of 7" only reads right as text
        let text = document.root_element().text().collect::<Vec<_>>().join(" ");
        parse(&text)
    })
}

// Numbers in the element around the first text that carries « or ».
fn arrow_bar_numbers(document: &Html) -> Vec<u32> {
    let arrows = document
        .root_element()
        .descendants()
        .find(|node| node.value().as_text().is_some_and(|t| t.contains(&PAGER_ARROWS[..])));

    let Some(bar) = arrows.and_then(|node| node.parent()).and_then(ElementRef::wrap) else {
        return Vec::new();
    };
    let text: String = bar.text().collect::<Vec<_>>().join(" ");
    NUMBER
        .captures_iter(&text)
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()))
        .collect()
}

/// The same URL with `page` set to every value in 1..=max_page.
pub fn pagination_siblings(url: &Url, max_page: u32, page_param: &str) -> Vec<String> {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != page_param)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut clean = url.clone();
    clean.set_fragment(None);
    clean.set_query(None);

    (1..=max_page)
        .map(|page| {
            let mut sibling = clean.clone();
            sibling
                .query_pairs_mut()
                .extend_pairs(kept.iter())
                .append_pair(page_param, &page.to_string());
            normalize(sibling.as_str())
        })
        .collect()
}
