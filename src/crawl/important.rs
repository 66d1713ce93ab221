// src/crawl/important.rs
// =============================================================================
// The important-link side file: every canonical URL that carries both a
// document id and a page number, shared across crawl runs.
//
// A merge is one critical section: re-read the file, union, write a sorted
// array to a temp file in the same directory, rename it over the original.
// Another process may have appended since we last looked, so the disk state
// is always re-read rather than trusted from memory.
//
// The section is guarded by an async mutex and the file work runs on the
// blocking pool, so crawl workers waiting for it never stall the runtime.
//
// Accepted on load: ["url", ...]  or  {"urls": ["url" | {"url": "..."}, ...]}
// =============================================================================

use crate::error::{ArchiveError, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Deserialize)]
#[serde(untagged)]
enum LinkEntry {
    Url(String),
    Object { url: String },
}

impl LinkEntry {
    fn into_url(self) -> String {
        match self {
            LinkEntry::Url(url) | LinkEntry::Object { url } => url,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LinkFile {
    List(Vec<LinkEntry>),
    Wrapped { urls: Vec<LinkEntry> },
}

pub struct ImportantLinks {
    path: PathBuf,
    // What this process already knows is on disk; only used to count additions
    known: Mutex<BTreeSet<String>>,
}

impl ImportantLinks {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let known = load(&path)?;
        debug!("{} important links in {}", known.len(), path.display());
        Ok(Self {
            path,
            known: Mutex::new(known),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn known(&self) -> usize {
        self.known.lock().await.len()
    }

    /// Merges `urls` into the file and returns the ones that were not there
    /// before.
    pub async fn merge<'a, I>(&self, urls: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut known = self.known.lock().await;
        let fresh: BTreeSet<String> = urls
            .into_iter()
            .filter(|url| !known.contains(*url))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return Ok(fresh);
        }

        let path = self.path.clone();
        let additions = fresh.clone();
        let current = blocking(move || {
            let mut current = load(&path)?;
            current.extend(additions);
            write_atomic(&path, &current)?;
            Ok(current)
        })
        .await?;

        known.extend(current);
        Ok(fresh)
    }

    /// Replaces the whole file with `urls`.
    pub async fn replace(&self, urls: &BTreeSet<String>) -> Result<()> {
        let mut known = self.known.lock().await;
        let path = self.path.clone();
        let written = urls.clone();
        *known = blocking(move || write_atomic(&path, &written).map(|()| written)).await?;
        Ok(())
    }
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ArchiveError::Storage(format!("important-link file task: {}", e)))?
}

/// Reads the side file. A missing or empty file is an empty set.
pub fn load(path: &Path) -> Result<BTreeSet<String>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(e.into()),
    };
    if text.trim().is_empty() {
        return Ok(BTreeSet::new());
    }

    let parsed: LinkFile = serde_json::from_str(&text)
        .map_err(|e| ArchiveError::Storage(format!("{}: {}", path.display(), e)))?;
    let entries = match parsed {
        LinkFile::List(entries) | LinkFile::Wrapped { urls: entries } => entries,
    };
    Ok(entries.into_iter().map(LinkEntry::into_url).collect())
}

fn write_atomic(path: &Path, urls: &BTreeSet<String>) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let sorted: Vec<&String> = urls.iter().collect();
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, &sorted)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ArchiveError::Storage(e.to_string()))?;
    Ok(())
}
