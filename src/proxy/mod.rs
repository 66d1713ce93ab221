// src/proxy/mod.rs
// =============================================================================
// The fetch gateway: a caching reverse proxy in front of the archived site.
//
// Submodules:
// - gateway: cache lookup, live fallback and response rendering
// - rewrite: content-type checks, charset handling, absolute URL rewriting
// - server: the axum routes (/_cache_stats and everything else)
//
// The same gateway runs in two modes. With live fallback it is the crawl
// proxy; without it, it is the read-only offline viewer.
// =============================================================================

mod gateway;
mod rewrite;
mod server;

pub use gateway::{CacheStats, Gateway, GatewayResponse};
pub use rewrite::{decode_text, is_html};
pub use server::serve;
