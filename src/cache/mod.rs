// src/cache/mod.rs
// =============================================================================
// The on-disk response cache shared by the proxy, the viewer and the crawler.
//
// Every entry is two files named after sha256("<METHOD> <URL>"):
// - <key>.bin  the raw (identity-encoded) body
// - <key>.json {url, status, headers}
//
// The key function is the one thing every component must agree on. If the
// proxy and the crawler hashed differently the cache would silently split.
// =============================================================================

mod headers;
mod store;

pub use headers::HeaderList;
pub use store::{CacheStore, CachedResponse};
