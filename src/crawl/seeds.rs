// src/crawl/seeds.rs
// =============================================================================
// Where a crawl run starts.
//
// Three sources, in this order:
// - a paged template: "https://site/?mode=list&page=" + n for n in start..=end
// - explicit URLs
// - a JSON file of URLs, optionally sliced by [start, end) index
// Everything is normalized and de-duplicated keeping first-seen order.
// With no seeds at all the crawl starts at the origin root.
// =============================================================================

use crate::error::{ArchiveError, Result};
use crate::normalize::normalize;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use url::Url;

// Above this many JSON seeds a single run gets long; slicing helps
const LARGE_SEED_FILE: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct SeedSources {
    pub template: Option<String>,
    pub start_page: u32,
    pub end_page: u32,
    pub extra: Vec<String>,
    pub json_file: Option<PathBuf>,
    pub json_start: usize,
    pub json_end: Option<usize>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedEntry {
    Url(String),
    Object { url: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedFile {
    List(Vec<SeedEntry>),
    Wrapped { urls: Vec<SeedEntry> },
    Single { url: String },
}

impl SeedSources {
    pub fn collect(&self, origin: &Url) -> Result<Vec<String>> {
        let mut raw: Vec<String> = Vec::new();

        if let Some(template) = self.template.as_deref().filter(|t| !t.is_empty()) {
            raw.extend((self.start_page..=self.end_page).map(|page| format!("{}{}", template, page)));
        }
        raw.extend(self.extra.iter().cloned());
        if let Some(path) = &self.json_file {
            raw.extend(self.read_json(path)?);
        }

        let mut seen = HashSet::new();
        let mut seeds: Vec<String> = raw
            .iter()
            .map(|url| normalize(url))
            .filter(|url| seen.insert(url.clone()))
            .collect();

        if seeds.is_empty() {
            seeds.push(normalize(origin.as_str()));
        }
        Ok(seeds)
    }

    fn read_json(&self, path: &Path) -> Result<Vec<String>> {
        let text = fs::read_to_string(path)
            .map_err(|e| ArchiveError::Config(format!("seed file {}: {}", path.display(), e)))?;
        let parsed: SeedFile = serde_json::from_str(&text)
            .map_err(|e| ArchiveError::Config(format!("seed file {}: {}", path.display(), e)))?;

        let urls: Vec<String> = match parsed {
            SeedFile::List(entries) | SeedFile::Wrapped { urls: entries } => entries
                .into_iter()
                .map(|entry| match entry {
                    SeedEntry::Url(url) | SeedEntry::Object { url } => url,
                })
                .filter(|url| !url.trim().is_empty())
                .collect(),
            SeedFile::Single { url } => vec![url],
        };

        let total = urls.len();
        let end = self.json_end.unwrap_or(total).min(total);
        let start = self.json_start.min(end);
        let slice = urls[start..end].to_vec();

        info!("{} seed URLs from {} (index {}..{} of {})", slice.len(), path.display(), start, end, total);
        if slice.len() > LARGE_SEED_FILE {
            warn!(
                "{} seeds in one run, consider --json-start-index/--json-end-index",
                slice.len()
            );
        }
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn origin() -> Url {
        Url::parse("https://example.com").unwrap()
    }

    #[test]
    fn test_default_is_origin_root() {
        let seeds = SeedSources::default().collect(&origin()).unwrap();
        assert_eq!(seeds, vec!["https://example.com/"]);
    }

    #[test]
    fn test_template_and_extra_are_normalized_and_deduplicated() {
        let sources = SeedSources {
            template: Some("https://example.com/?mode=list&page=".into()),
            start_page: 1,
            end_page: 3,
            extra: vec![
                "https://example.com/?mode=list&page=2#top".into(),
                "https://example.com/about".into(),
            ],
            ..Default::default()
        };
        assert_eq!(
            sources.collect(&origin()).unwrap(),
            vec![
                "https://example.com/?mode=list&page=1",
                "https://example.com/?mode=list&page=2",
                "https://example.com/?mode=list&page=3",
                "https://example.com/about",
            ]
        );
    }

    #[test]
    fn test_json_file_formats_and_slicing() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("list.json");
        fs::write(&list, r#"["https://example.com/a", {"url": "https://example.com/b"}, "https://example.com/c"]"#)
            .unwrap();

        let sources = SeedSources {
            json_file: Some(list),
            json_start: 1,
            json_end: Some(3),
            ..Default::default()
        };
        assert_eq!(
            sources.collect(&origin()).unwrap(),
            vec!["https://example.com/b", "https://example.com/c"]
        );

        let wrapped = dir.path().join("wrapped.json");
        fs::write(&wrapped, r#"{"urls": [{"url": "https://example.com/x"}], "count": 1}"#).unwrap();
        let sources = SeedSources {
            json_file: Some(wrapped),
            ..Default::default()
        };
        assert_eq!(sources.collect(&origin()).unwrap(), vec!["https://example.com/x"]);
    }

    #[test]
    fn test_out_of_range_slice_is_empty_then_defaults() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("list.json");
        fs::write(&list, r#"["https://example.com/a"]"#).unwrap();
        let sources = SeedSources {
            json_file: Some(list),
            json_start: 5,
            ..Default::default()
        };
        assert_eq!(sources.collect(&origin()).unwrap(), vec!["https://example.com/"]);
    }

    #[test]
    fn test_missing_seed_file_is_config_error() {
        let sources = SeedSources {
            json_file: Some(PathBuf::from("/definitely/not/here.json")),
            ..Default::default()
        };
        assert!(matches!(sources.collect(&origin()), Err(ArchiveError::Config(_))));
    }
}
