// src/extract/mod.rs
// =============================================================================
// Content extraction: everything the crawler learns from one HTML page.
//
// One pass over every element collects:
// - outbound links (href / src / action)
// - absolute URLs on our host hidden in any attribute or inline script
// - navigation helper calls in onclick handlers and scripts
// - document identifiers (docId=NNN)
// then the pagination bound is inferred and one synthetic URL is built per
// (identifier, page).
//
// A page never fails as a whole. If a pattern cannot be built the
// corresponding sub-pass is skipped with a warning and the rest still runs.
//
// scraper's Html is not Send, so extraction is synchronous and the parsed
// document never outlives this call.
// =============================================================================

mod docid;
mod links;
mod pagination;

pub use docid::{has_id_and_page, synthesize};
pub use pagination::{pagination_siblings, PaginationHint};

use crate::error::ArchiveError;
use crate::normalize::DomainFilter;
use docid::{is_numeric, IdPatterns};
use links::{host_url_pattern, push_host_urls, push_link, push_nav_calls, LINK_ATTRIBUTES};
use regex::Regex;
use scraper::{ElementRef, Html};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};
use url::Url;

pub const ID_PARAM: &str = "docId";
pub const PAGE_PARAM: &str = "page";

/// What one page yielded. All URLs are normalized and in scope.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageExtraction {
    pub links: BTreeSet<String>,
    pub doc_ids: BTreeSet<String>,
    pub pagination: Option<PaginationHint>,
    pub synthetic: BTreeSet<String>,
}

impl PageExtraction {
    /// Every discovered URL, literal links first.
    pub fn all_urls(&self) -> impl Iterator<Item = &String> {
        self.links.iter().chain(self.synthetic.iter())
    }
}

#[derive(Debug, Clone)]
pub struct Extractor {
    filter: DomainFilter,
    id_param: String,
    page_param: String,
    default_max_page: u32,
    max_plausible_page: u32,
    // None when the pattern could not be built; that sub-pass is skipped
    host_urls: Option<Regex>,
    ids: Option<IdPatterns>,
    page_numbers: Option<Regex>,
}

impl Extractor {
    pub fn new(allowed_host: &str, default_max_page: u32, max_plausible_page: u32) -> Self {
        Self::with_params(allowed_host, ID_PARAM, PAGE_PARAM, default_max_page, max_plausible_page)
    }

    pub fn with_params(
        allowed_host: &str,
        id_param: &str,
        page_param: &str,
        default_max_page: u32,
        max_plausible_page: u32,
    ) -> Self {
        let filter = DomainFilter::new(allowed_host);

        let host_urls = sub_pass("host URL scan", host_url_pattern(filter.allowed_host()));
        let ids = sub_pass("document id scan", IdPatterns::new(id_param));
        let page_numbers = sub_pass(
            "pagination inference",
            pagination::page_number_pattern(page_param),
        );

        Self {
            filter,
            id_param: id_param.to_string(),
            page_param: page_param.to_string(),
            default_max_page,
            max_plausible_page,
            host_urls,
            ids,
            page_numbers,
        }
    }

    pub fn filter(&self) -> &DomainFilter {
        &self.filter
    }

    pub fn page_param(&self) -> &str {
        &self.page_param
    }

    pub fn extract(&self, base: &Url, html: &str) -> PageExtraction {
        let document = Html::parse_document(html);
        let mut found = PageExtraction::default();

        for element in document.root_element().descendants().filter_map(ElementRef::wrap) {
            for (name, value) in element.value().attrs() {
                self.scan_attribute(base, name, value, &mut found);
            }

            if element.value().name() == "script" {
                let script: String = element.text().collect();
                self.scan_text(base, &script, &mut found);
            }
        }

        found.pagination = self.page_numbers.as_ref().and_then(|pattern| {
            pagination::infer(&document, html, pattern, &self.page_param, self.max_plausible_page)
        });

        if !found.doc_ids.is_empty() {
            let max_page = found
                .pagination
                .map_or(self.default_max_page, |hint| hint.max_page);
            found.synthetic = synthesize(base, &found.doc_ids, max_page, &self.id_param, &self.page_param)
                .into_iter()
                .filter(|url| self.filter.in_scope(url))
                .collect();
        }

        debug!(
            "{}: {} links, {} ids, {} synthetic, pagination {:?}",
            base,
            found.links.len(),
            found.doc_ids.len(),
            found.synthetic.len(),
            found.pagination
        );
        found
    }

    fn scan_attribute(&self, base: &Url, name: &str, value: &str, found: &mut PageExtraction) {
        if LINK_ATTRIBUTES.contains(&name) {
            push_link(base, value, &self.filter, &mut found.links);
        }

        if name.starts_with("on") {
            push_nav_calls(base, value, &self.filter, &mut found.links);
        }

        if let Some(pattern) = &self.host_urls {
            if contains_ignore_case(value, self.filter.allowed_host()) {
                push_host_urls(value, pattern, &self.filter, &mut found.links);
            }
        }

        // <div docid="445">, <tr data-docid="445">
        let bare_name = name.strip_prefix("data-").unwrap_or(name);
        if bare_name.eq_ignore_ascii_case(&self.id_param) && is_numeric(value) {
            found.doc_ids.insert(value.trim().to_string());
        }

        if let Some(ids) = &self.ids {
            if contains_ignore_case(value, &self.id_param) {
                ids.push_ids(value, &mut found.doc_ids);
                for query in ids.query_strings(value) {
                    push_link(base, query, &self.filter, &mut found.links);
                }
            }
        }
    }

    fn scan_text(&self, base: &Url, text: &str, found: &mut PageExtraction) {
        if let Some(pattern) = &self.host_urls {
            push_host_urls(text, pattern, &self.filter, &mut found.links);
        }
        push_nav_calls(base, text, &self.filter, &mut found.links);
        if let Some(ids) = &self.ids {
            ids.push_ids(text, &mut found.doc_ids);
        }
    }

    /// True for URLs whose query carries both a document id and a page number.
    pub fn is_important(&self, url: &str) -> bool {
        has_id_and_page(url, &self.id_param, &self.page_param)
    }

    /// Important URLs among everything a page yielded.
    pub fn important_links(&self, found: &PageExtraction) -> BTreeSet<String> {
        found
            .all_urls()
            .filter(|url| self.is_important(url))
            .cloned()
            .collect()
    }
}

// A sub-pass whose pattern cannot be built is switched off, not fatal
fn sub_pass<T>(name: &str, built: Result<T, regex::Error>) -> Option<T> {
    match built {
        Ok(pass) => Some(pass),
        Err(e) => {
            let error = ArchiveError::Extraction(format!("{} disabled: {}", name, e));
            warn!("{}", error);
            None
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}
