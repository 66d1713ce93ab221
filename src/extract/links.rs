// src/extract/links.rs
// =============================================================================
// Turning raw attribute values and script text into canonical in-scope URLs.
//
// Three sources of links:
// - href / src / action attributes (resolved against the page URL)
// - absolute URLs on the allowed host found anywhere in attribute values or
//   inline scripts, e.g. data-url="https://site/x" or var u = "https://site/y"
// - navigation helpers in onclick handlers:
//     ajaxHref('?mode=ETM&docId=5')
//     location.href = '/catalog'
//     window.location('https://site/z')
// =============================================================================

use crate::normalize::{normalize, DomainFilter};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use url::Url;

static NAV_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:ajaxHref|location\.href|window\.location)\s*[=(]\s*['"]([^'"]+)['"]"#)
        .expect("navigation pattern is valid")
});

// Attributes whose value is itself a link
pub(super) const LINK_ATTRIBUTES: [&str; 3] = ["href", "src", "action"];

// Resolves a possibly-relative reference against the page URL
//
// Returns None for fragments, empty values and non-navigational schemes.
pub(super) fn resolve(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty()
        || raw.starts_with('#')
        || raw.starts_with("javascript:")
        || raw.starts_with("mailto:")
        || raw.starts_with("tel:")
        || raw.starts_with("data:")
    {
        return None;
    }
    base.join(raw).ok()
}

// Resolve, scope-check and normalize in one step
pub(super) fn push_link(base: &Url, raw: &str, filter: &DomainFilter, out: &mut BTreeSet<String>) {
    if let Some(url) = resolve(base, raw) {
        if filter.in_scope_url(&url) {
            out.insert(normalize(url.as_str()));
        }
    }
}

// Absolute URLs on the allowed host inside free text
pub(super) fn push_host_urls(
    text: &str,
    host_urls: &Regex,
    filter: &DomainFilter,
    out: &mut BTreeSet<String>,
) {
    for found in host_urls.find_iter(text) {
        let candidate = normalize(found.as_str());
        if filter.in_scope(&candidate) {
            out.insert(candidate);
        }
    }
}

// URL arguments of navigation helper calls, resolved against the page
pub(super) fn push_nav_calls(base: &Url, text: &str, filter: &DomainFilter, out: &mut BTreeSet<String>) {
    for captures in NAV_CALL.captures_iter(text) {
        if let Some(arg) = captures.get(1) {
            push_link(base, arg.as_str(), filter, out);
        }
    }
}

// Builds the "absolute URL on our host (or a subdomain)" pattern. The host
// must end at a delimiter so "example.community" is not "example.com".
pub(super) fn host_url_pattern(allowed_host: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r#"(?i)https?://(?:[a-z0-9-]+\.)*{}(?:[:/?#][^\s"'<>)]*|\b)"#,
        regex::escape(allowed_host)
    ))
}
