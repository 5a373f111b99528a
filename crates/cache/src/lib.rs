//! Content-addressed fragment cache for SignalSight.
//!
//! Stores rendered prompt fragments keyed by
//! `(kind, parameters, content hash)` so that identical content always
//! resolves to the same entry, with TTL-based staleness and oldest-first
//! size eviction. The cache knows nothing about trading or conversations.
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | [`ContentCache::get_by_exact_key`] | Confirm a hit for content the caller already has |
//! | [`ContentCache::find_by_parameters`] | "Do I have anything for this pair/date?" without rendering first |
//! | [`ContentCache::put`] | Idempotent insert, triggers size-bound eviction |
//! | [`ContentCache::invalidate`] | Drop a class of fragments by parameter prefix |
//! | [`ContentCache::clear`] / [`ContentCache::stats`] | Operator controls |

pub mod content_cache;
pub mod key;
pub mod stats;

pub use content_cache::{CacheSettings, CachedFragment, ContentCache};
pub use key::{FragmentKey, FragmentKind, FragmentParams, content_hash};
pub use stats::{CacheStats, EntrySummary};
