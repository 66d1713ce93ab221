// src/normalize/mod.rs
// =============================================================================
// URL canonicalization and the single-domain scope check.
//
// A canonical URL is the unit of deduplication for the crawler and the input
// to the cache key, so everything that enqueues or looks up a URL goes
// through normalize() first.
// =============================================================================

mod canonical;
mod domain;

pub use canonical::normalize;
pub use domain::DomainFilter;
