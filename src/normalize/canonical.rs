// src/normalize/canonical.rs
// =============================================================================
// normalize(url) -> canonical url
//
// - drops the #fragment
// - drops query parameters whose values are all empty or whitespace
//   (so "?a=1&page=" and "?a=1&page" both become "?a=1")
// - groups repeated keys in first-seen order and re-encodes the query
//   with form-urlencoding
//
// Unparseable input falls back to stripping the fragment and any dangling
// "?", "&", "=" or trailing "page" marker. Both paths are idempotent.
// =============================================================================

use url::form_urlencoded;
use url::Url;

pub fn normalize(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(url) => normalize_parsed(url),
        Err(_) => fallback_strip(raw),
    }
}

fn normalize_parsed(mut url: Url) -> String {
    url.set_fragment(None);

    let params = clean_query(&url);
    url.set_query(None);

    if params.is_empty() {
        return url.to_string();
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, values) in &params {
        for value in values {
            serializer.append_pair(key, value);
        }
    }
    format!("{}?{}", url, serializer.finish())
}

// (key, non-empty values) in first-seen key order. A blank page value is
// dropped like any other, so "?page=" collapses to the pageless URL.
fn clean_query(url: &Url) -> Vec<(String, Vec<String>)> {
    let mut params: Vec<(String, Vec<String>)> = Vec::new();

    for (key, value) in url.query_pairs() {
        if value.trim().is_empty() {
            continue;
        }
        match params.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value.into_owned()),
            None => params.push((key.into_owned(), vec![value.into_owned()])),
        }
    }
    params
}

fn fallback_strip(raw: &str) -> String {
    let mut current = raw.split('#').next().unwrap_or("").to_string();
    loop {
        let mut next = current.trim_end_matches(['=', '&', '?']).to_string();
        for marker in ["&page", "?page"] {
            if let Some(stripped) = next.strip_suffix(marker) {
                next = stripped.to_string();
            }
        }
        let next = next.trim_end_matches(['&', '?']).to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}
