// src/cache/store.rs
// =============================================================================
// Content-addressable response store.
//
// Writes are "complete replace" per key:
// 1. body goes to a temp file in the cache dir, then is renamed to <key>.bin
// 2. metadata goes to a temp file, then is renamed to <key>.json
//
// An entry only counts as present when both files exist, and the metadata is
// always renamed last, so a reader never sees metadata without its body.
// Concurrent writers of the same key need no lock: the last rename wins and
// both writers stored an equivalent response.
// =============================================================================

use crate::cache::HeaderList;
use crate::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const BODY_EXT: &str = "bin";
const META_EXT: &str = "json";

/// A stored response: status, headers and raw body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

// Shape of <key>.json
#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    url: String,
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    headers: HeaderList,
}

fn default_status() -> u16 {
    200
}

/// The cache key for a request: hex sha256 of "<METHOD> <URL>".
///
/// Every reader and writer of the store goes through this function.
pub fn cache_key(method: &str, url: &str) -> String {
    let digest = Sha256::digest(format!("{} {}", method, url).as_bytes());
    hex::encode(digest)
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    // Opens (and creates if needed) a cache directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            ArchiveError::Storage(format!("cannot create cache dir {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn paths(&self, method: &str, url: &str) -> (PathBuf, PathBuf) {
        let key = cache_key(method, url);
        (
            self.dir.join(format!("{}.{}", key, BODY_EXT)),
            self.dir.join(format!("{}.{}", key, META_EXT)),
        )
    }

    pub fn contains(&self, method: &str, url: &str) -> bool {
        let (body_path, meta_path) = self.paths(method, url);
        body_path.is_file() && meta_path.is_file()
    }

    /// Reads an entry. Returns `Ok(None)` if either artifact is missing.
    pub fn get(&self, method: &str, url: &str) -> Result<Option<CachedResponse>> {
        let (body_path, meta_path) = self.paths(method, url);

        let meta_text = match fs::read_to_string(&meta_path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let body = match fs::read(&body_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let meta: CacheMeta = serde_json::from_str(&meta_text).map_err(|e| {
            ArchiveError::Storage(format!("corrupt metadata {}: {}", meta_path.display(), e))
        })?;

        Ok(Some(CachedResponse {
            status: meta.status,
            headers: meta.headers,
            body,
        }))
    }

    /// Stores (or replaces) the entry for `(method, url)`.
    pub fn put(
        &self,
        method: &str,
        url: &str,
        status: u16,
        headers: &HeaderList,
        body: &[u8],
    ) -> Result<()> {
        let (body_path, meta_path) = self.paths(method, url);

        let meta = CacheMeta {
            url: url.to_string(),
            status,
            headers: headers.clone(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)?;

        // Body first, metadata last
        self.write_atomic(&body_path, body)?;
        self.write_atomic(&meta_path, &meta_json)?;

        debug!("cached {} {} ({} bytes, status {})", method, url, body.len(), status);
        Ok(())
    }

    // Number of stored bodies, as reported by /_cache_stats
    pub fn count(&self) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(BODY_EXT) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(target).map_err(|e| {
            ArchiveError::Storage(format!("cannot commit {}: {}", target.display(), e.error))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn html_headers() -> HeaderList {
        let mut headers = HeaderList::new();
        headers.push("Content-Type", "text/html; charset=windows-1251");
        headers.push("Set-Cookie", "a=1");
        headers
    }

    #[test]
    fn test_cache_key_is_stable() {
        // sha256("GET https://example.com/")
        assert_eq!(
            cache_key("GET", "https://example.com/"),
            cache_key("GET", "https://example.com/")
        );
        assert_ne!(
            cache_key("GET", "https://example.com/"),
            cache_key("HEAD", "https://example.com/")
        );
        assert_eq!(cache_key("GET", "x").len(), 64);
    }

    #[test]
    fn test_put_then_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let body = vec![0u8, 159, 146, 150, b'<', b'p'];

        store
            .put("GET", "https://example.com/?a=1", 200, &html_headers(), &body)
            .unwrap();

        let cached = store.get("GET", "https://example.com/?a=1").unwrap().unwrap();
        assert_eq!(cached.body, body);
        assert_eq!(cached.status, 200);
        assert_eq!(cached.headers, html_headers());
        assert!(store.contains("GET", "https://example.com/?a=1"));
    }

    #[test]
    fn test_missing_entry_is_none() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        assert!(store.get("GET", "https://example.com/nothing").unwrap().is_none());
        assert!(!store.contains("GET", "https://example.com/nothing"));
    }

    #[test]
    fn test_body_without_metadata_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let url = "https://example.com/half";
        store.put("GET", url, 200, &HeaderList::new(), b"body").unwrap();

        let key = cache_key("GET", url);
        fs::remove_file(dir.path().join(format!("{}.json", key))).unwrap();

        assert!(store.get("GET", url).unwrap().is_none());
        assert!(!store.contains("GET", url));
    }

    #[test]
    fn test_overwrite_replaces_entry() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let url = "https://example.com/page";
        store.put("GET", url, 500, &HeaderList::new(), b"old").unwrap();
        store.put("GET", url, 200, &html_headers(), b"new").unwrap();

        let cached = store.get("GET", url).unwrap().unwrap();
        assert_eq!(cached.body, b"new");
        assert_eq!(cached.status, 200);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_metadata_layout() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let url = "https://example.com/meta";
        store.put("GET", url, 404, &html_headers(), b"").unwrap();

        let key = cache_key("GET", url);
        let text = fs::read_to_string(dir.path().join(format!("{}.json", key))).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["url"], url);
        assert_eq!(value["status"], 404);
        assert_eq!(value["headers"]["Set-Cookie"], "a=1");
    }

    #[test]
    fn test_status_defaults_to_200() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        let url = "https://example.com/legacy";
        let key = cache_key("GET", url);
        fs::write(dir.path().join(format!("{}.bin", key)), b"hi").unwrap();
        fs::write(
            dir.path().join(format!("{}.json", key)),
            format!(r#"{{"url": "{}", "headers": {{}}}}"#, url),
        )
        .unwrap();

        let cached = store.get("GET", url).unwrap().unwrap();
        assert_eq!(cached.status, 200);
        assert_eq!(cached.body, b"hi");
    }
}
