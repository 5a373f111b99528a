//! Cache reporting types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::key::FragmentKind;

/// Point-in-time cache statistics. Derived on request, never stored.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Live entries after the lazy sweep.
    pub entries: usize,
    /// Live entries per fragment kind.
    pub entries_by_kind: BTreeMap<FragmentKind, usize>,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses); 0.0 before any lookup.
    pub hit_rate: f64,
    /// Sum of `estimated_tokens` over all hits.
    pub tokens_saved: u64,
    /// Entries removed by the size bound.
    pub evictions: u64,
    /// Entries removed by TTL.
    pub expirations: u64,
    /// Entries removed by prefix invalidation.
    pub invalidations: u64,
    pub last_cleanup: Option<DateTime<Utc>>,
}

/// Running counters kept under the cache lock.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub tokens_saved: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
}

impl Counters {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Operator listing row: everything about an entry except its content.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub key: String,
    pub kind: FragmentKind,
    pub estimated_tokens: usize,
    pub created_at: DateTime<Utc>,
    #[serde(with = "secs")]
    pub age: Duration,
}

mod secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}
