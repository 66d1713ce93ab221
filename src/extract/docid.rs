// src/extract/docid.rs
// =============================================================================
// Document identifiers and the synthetic URLs built from them.
//
// The archived site shows each logical document through a query like
//   ?mode=ETM&model=9923&docId=445&page=3
// but most per-page URLs are never linked from an <a> tag. Pages mention
// the identifier in attributes or onclick handlers, so we collect every
// distinct id and generate one URL per (id, page) ourselves.
// =============================================================================

use crate::normalize::normalize;
use regex::Regex;
use std::collections::BTreeSet;
use url::Url;

#[derive(Debug, Clone)]
pub(super) struct IdPatterns {
    // "?docId=5", "&docId=5", "ajaxHref('docId=5"
    mention: Regex,
    // a relative query string carrying an id: "?mode=ETM&docId=5&x=y"
    query_string: Regex,
}

impl IdPatterns {
    pub(super) fn new(id_param: &str) -> Result<Self, regex::Error> {
        let id = regex::escape(id_param);
        Ok(Self {
            mention: Regex::new(&format!(
                r#"(?i)(?:[?&]|ajaxHref\s*\(\s*['"])\s*{}=(\d+)"#,
                id
            ))?,
            query_string: Regex::new(&format!(r#"(?i)\?[^\s"'<>)]*{}=\d+[^\s"'<>)]*"#, id))?,
        })
    }

    // Every id value mentioned in `text`
    pub(super) fn push_ids(&self, text: &str, out: &mut BTreeSet<String>) {
        for captures in self.mention.captures_iter(text) {
            if let Some(id) = captures.get(1) {
                out.insert(id.as_str().to_string());
            }
        }
    }

    // Relative query strings that carry an id, e.g. inside data-* attributes
    pub(super) fn query_strings<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.query_string.find_iter(text).map(|m| m.as_str()).collect()
    }
}

pub(super) fn is_numeric(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// One canonical URL per (identifier, page) for pages 1..=max_page.
///
/// Every other query parameter of `base` is kept as-is; any id or page
/// already on `base` is replaced.
pub fn synthesize(
    base: &Url,
    ids: &BTreeSet<String>,
    max_page: u32,
    id_param: &str,
    page_param: &str,
) -> BTreeSet<String> {
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| !key.eq_ignore_ascii_case(id_param) && key != page_param)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut clean = base.clone();
    clean.set_fragment(None);
    clean.set_query(None);

    let mut urls = BTreeSet::new();
    for id in ids {
        for page in 1..=max_page {
            let mut url = clean.clone();
            url.query_pairs_mut()
                .extend_pairs(kept.iter())
                .append_pair(id_param, id)
                .append_pair(page_param, &page.to_string());
            urls.insert(normalize(url.as_str()));
        }
    }
    urls
}

/// True when a URL's query carries both an identifier and a page number.
pub fn has_id_and_page(url: &str, id_param: &str, page_param: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let mut has_id = false;
    let mut has_page = false;
    for (key, value) in parsed.query_pairs() {
        if value.trim().is_empty() {
            continue;
        }
        if key == id_param {
            has_id = true;
        } else if key == page_param {
            has_page = true;
        }
    }
    has_id && has_page
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mentions() {
        let patterns = IdPatterns::new("docId").unwrap();
        let mut found = BTreeSet::new();
        patterns.push_ids("ajaxHref('?mode=ETM&docId=12&page=1')", &mut found);
        patterns.push_ids("/view?docid=34", &mut found);
        patterns.push_ids("ajaxHref(\"docId=56\")", &mut found);
        patterns.push_ids("mydocId=99 xdocId=7", &mut found);
        assert_eq!(found, ids(&["12", "34", "56"]));
    }

    #[test]
    fn test_query_strings() {
        let patterns = IdPatterns::new("docId").unwrap();
        let found = patterns.query_strings(r#"{"next": "?mode=ETM&docId=8&page=2", "other": "?mode=x"}"#);
        assert_eq!(found, vec!["?mode=ETM&docId=8&page=2"]);
    }

    #[test]
    fn test_synthesize_one_url_per_page() {
        let base = Url::parse("https://example.com/?mode=ETM&model=9923#frag").unwrap();
        let urls = synthesize(&base, &ids(&["42"]), 10, "docId", "page");
        assert_eq!(urls.len(), 10);
        for page in 1..=10 {
            let expected = format!("https://example.com/?mode=ETM&model=9923&docId=42&page={}", page);
            assert!(urls.contains(&expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_synthesize_replaces_existing_id_and_page() {
        let base = Url::parse("https://example.com/?docid=1&mode=ETM&page=4").unwrap();
        let urls = synthesize(&base, &ids(&["7", "8"]), 2, "docId", "page");
        let expected = ids(&[
            "https://example.com/?mode=ETM&docId=7&page=1",
            "https://example.com/?mode=ETM&docId=7&page=2",
            "https://example.com/?mode=ETM&docId=8&page=1",
            "https://example.com/?mode=ETM&docId=8&page=2",
        ]);
        assert_eq!(urls, expected);
    }

    #[test]
    fn test_has_id_and_page() {
        assert!(has_id_and_page("https://example.com/?docId=1&page=2", "docId", "page"));
        assert!(!has_id_and_page("https://example.com/?docId=1", "docId", "page"));
        assert!(!has_id_and_page("https://example.com/?docId=1&page=", "docId", "page"));
        assert!(!has_id_and_page("https://example.com/?mydocId=1&page=2", "docId", "page"));
        assert!(!has_id_and_page("not a url", "docId", "page"));
    }

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric("445"));
        assert!(is_numeric(" 7 "));
        assert!(!is_numeric(""));
        assert!(!is_numeric("4a"));
    }
}
