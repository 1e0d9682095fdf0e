//! Time-windowed cache for the rendered home feed.
//!
//! The feed body for each requested page is rendered once and then served
//! to every visitor until the entry is older than the configured TTL (20
//! seconds by default). Writes never invalidate it; only expiry, capacity
//! eviction or an explicit [`PageCache::clear`] do.
//!
//! ```toml
//! [cache]
//! enabled = true
//! index_ttl_seconds = 20
//! capacity = 64
//! ```

mod config;
mod store;

pub use config::CacheConfig;
pub use store::PageCache;
