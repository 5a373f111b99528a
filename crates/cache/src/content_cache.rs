//! The content cache — a single-process, best-effort memoization layer
//! for prompt fragments.
//!
//! Entries are keyed by `(kind, parameters, content hash)` and bounded two
//! ways: entries older than `max_age` are never served (purged lazily on
//! lookup, on `stats()`, or by the periodic sweeper), and inserting past
//! `max_entries` evicts oldest-by-insertion entries.
//!
//! Every operation is total. Misses and empty invalidations are normal
//! outcomes, not errors. All state sits behind one mutex because eviction
//! mutates the global entry count that every caller observes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use signalsight_core::token;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::key::{FragmentKey, FragmentKind, FragmentParams};
use crate::stats::{CacheStats, Counters, EntrySummary};

const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Size and age bounds.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Maximum live entries. Zero is treated as one.
    pub max_entries: usize,
    /// Entries older than this are invalid.
    pub max_age: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 100,
            max_age: Duration::from_secs(30 * 60),
        }
    }
}

/// A fragment served from the cache.
#[derive(Debug, Clone)]
pub struct CachedFragment {
    pub key: FragmentKey,
    pub content: Arc<str>,
    pub estimated_tokens: usize,
    pub created_at: DateTime<Utc>,
}

struct Entry {
    content: Arc<str>,
    estimated_tokens: usize,
    /// Monotonic insertion time, drives TTL.
    inserted: Instant,
    /// Wall-clock insertion time, for reporting.
    created_at: DateTime<Utc>,
    /// Tiebreak for entries inserted within the same clock tick.
    seq: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant, max_age: Duration) -> bool {
        now.saturating_duration_since(self.inserted) > max_age
    }

    fn age_order(&self) -> (Instant, u64) {
        (self.inserted, self.seq)
    }

    fn to_fragment(&self, key: FragmentKey) -> CachedFragment {
        CachedFragment {
            key,
            content: Arc::clone(&self.content),
            estimated_tokens: self.estimated_tokens,
            created_at: self.created_at,
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<FragmentKey, Entry>,
    next_seq: u64,
    counters: Counters,
    last_cleanup: Option<DateTime<Utc>>,
}

/// Bounded, content-addressed fragment store.
///
/// Construct one per composition root and inject it; there is no global
/// instance.
pub struct ContentCache {
    settings: CacheSettings,
    inner: Mutex<Inner>,
}

impl ContentCache {
    pub fn new(mut settings: CacheSettings) -> Self {
        settings.max_entries = settings.max_entries.max(1);
        Self {
            settings,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheSettings::default())
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Derive the exact key `put` would use for this content.
    pub fn key_for(kind: FragmentKind, params: &FragmentParams, content: &str) -> FragmentKey {
        FragmentKey::new(kind, params.clone(), content)
    }

    /// O(1) lookup by exact key. Expired entries are purged and reported as a miss.
    pub fn get_by_exact_key(&self, key: &FragmentKey) -> Option<CachedFragment> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(now, self.settings.max_age),
            None => {
                inner.counters.misses += 1;
                trace!(key = %key, "Cache miss");
                return None;
            }
        };

        if expired {
            inner.entries.remove(key);
            inner.counters.expirations += 1;
            inner.counters.misses += 1;
            debug!(key = %key, "Cache entry expired on lookup");
            return None;
        }

        let entry = &inner.entries[key];
        inner.counters.hits += 1;
        inner.counters.tokens_saved += entry.estimated_tokens as u64;
        debug!(key = %key, tokens = entry.estimated_tokens, "Cache hit");
        Some(entry.to_fragment(key.clone()))
    }

    /// Find any live entry for `(kind, params)` regardless of content hash.
    ///
    /// When several versions exist (different content for the same
    /// parameters), the most recently inserted one wins.
    pub fn find_by_parameters(
        &self,
        kind: FragmentKind,
        params: &FragmentParams,
    ) -> Option<CachedFragment> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        Self::purge_expired(inner, now, self.settings.max_age);

        let found = inner
            .entries
            .iter()
            .filter(|(k, _)| k.kind == kind && k.params == *params)
            .max_by_key(|(_, e)| e.age_order())
            .map(|(k, e)| e.to_fragment(k.clone()));

        match &found {
            Some(fragment) => {
                inner.counters.hits += 1;
                inner.counters.tokens_saved += fragment.estimated_tokens as u64;
                debug!(key = %fragment.key, "Cache hit by parameters");
            }
            None => {
                inner.counters.misses += 1;
                trace!(kind = %kind, params = %params, "Cache miss by parameters");
            }
        }
        found
    }

    /// Store content and return its key.
    ///
    /// Idempotent: identical `(kind, params, content)` maps to the same key and
    /// leaves a live entry untouched (its age is not refreshed). An expired
    /// entry under the same key is replaced.
    pub fn put(&self, kind: FragmentKind, params: &FragmentParams, content: &str) -> FragmentKey {
        let key = Self::key_for(kind, params, content);
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(existing) = inner.entries.get(&key) {
            if !existing.is_expired(now, self.settings.max_age) {
                trace!(key = %key, "Put of identical content, keeping existing entry");
                return key;
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let estimated_tokens = token::estimate_tokens(content);
        inner.entries.insert(
            key.clone(),
            Entry {
                content: Arc::from(content),
                estimated_tokens,
                inserted: now,
                created_at: Utc::now(),
                seq,
            },
        );
        debug!(key = %key, tokens = estimated_tokens, "Cached fragment");

        self.enforce_bound(inner, now);
        key
    }

    /// Remove every entry of `kind` whose parameters start with `prefix`.
    /// Returns how many live entries were removed.
    pub fn invalidate(&self, kind: FragmentKind, prefix: &FragmentParams) -> usize {
        let now = Instant::now();
        let max_age = self.settings.max_age;
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let mut removed = 0usize;
        let mut expired = 0u64;
        inner.entries.retain(|key, entry| {
            if key.kind != kind || !key.params.starts_with(prefix) {
                return true;
            }
            if entry.is_expired(now, max_age) {
                expired += 1;
            } else {
                removed += 1;
            }
            false
        });
        inner.counters.invalidations += removed as u64;
        inner.counters.expirations += expired;

        info!(kind = %kind, prefix = %prefix, removed, "Invalidated cached fragments");
        removed
    }

    /// Drop all entries and reset statistics.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.counters = Counters::default();
        inner.last_cleanup = None;
        info!(dropped, "Cleared fragment cache");
    }

    /// Purge expired entries now. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        Self::purge_expired(&mut inner, now, self.settings.max_age)
    }

    /// Lazy sweep, then a statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        Self::purge_expired(inner, now, self.settings.max_age);

        let mut entries_by_kind = BTreeMap::new();
        for key in inner.entries.keys() {
            *entries_by_kind.entry(key.kind).or_insert(0) += 1;
        }

        let c = &inner.counters;
        CacheStats {
            entries: inner.entries.len(),
            entries_by_kind,
            hits: c.hits,
            misses: c.misses,
            hit_rate: c.hit_rate(),
            tokens_saved: c.tokens_saved,
            evictions: c.evictions,
            expirations: c.expirations,
            invalidations: c.invalidations,
            last_cleanup: inner.last_cleanup,
        }
    }

    /// Live entry count (expired entries are not counted, nor purged).
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.lock();
        inner
            .entries
            .values()
            .filter(|e| !e.is_expired(now, self.settings.max_age))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entries, oldest first, optionally filtered by kind.
    pub fn entries(&self, kind: Option<FragmentKind>) -> Vec<EntrySummary> {
        let now = Instant::now();
        let inner = self.inner.lock();
        let mut live: Vec<(&FragmentKey, &Entry)> = inner
            .entries
            .iter()
            .filter(|(k, e)| {
                kind.is_none_or(|kind| k.kind == kind) && !e.is_expired(now, self.settings.max_age)
            })
            .collect();
        live.sort_by_key(|(_, e)| e.age_order());

        live.into_iter()
            .map(|(k, e)| EntrySummary {
                key: k.to_string(),
                kind: k.kind,
                estimated_tokens: e.estimated_tokens,
                created_at: e.created_at,
                age: now.saturating_duration_since(e.inserted),
            })
            .collect()
    }

    /// Run `sweep_expired` every `period` until the cache is dropped.
    ///
    /// The task holds only a weak reference, so it never keeps the cache alive.
    /// Periods under one second are raised to one second.
    pub fn spawn_sweeper(cache: &Arc<ContentCache>, period: Duration) -> tokio::task::JoinHandle<()> {
        let weak: Weak<ContentCache> = Arc::downgrade(cache);
        let period = period.max(MIN_SWEEP_PERIOD);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                interval.tick().await;
                let Some(cache) = weak.upgrade() else {
                    debug!("Fragment cache dropped, stopping sweeper");
                    break;
                };
                let removed = cache.sweep_expired();
                if removed > 0 {
                    debug!(removed, "Periodic sweep purged expired fragments");
                }
            }
        })
    }

    // ── Internals (caller holds the lock) ───────────────────────────────

    fn purge_expired(inner: &mut Inner, now: Instant, max_age: Duration) -> usize {
        let before = inner.entries.len();
        inner.entries.retain(|_, e| !e.is_expired(now, max_age));
        let removed = before - inner.entries.len();
        inner.counters.expirations += removed as u64;
        inner.last_cleanup = Some(Utc::now());
        removed
    }

    fn enforce_bound(&self, inner: &mut Inner, now: Instant) {
        if inner.entries.len() <= self.settings.max_entries {
            return;
        }
        Self::purge_expired(inner, now, self.settings.max_age);

        while inner.entries.len() > self.settings.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.age_order())
                .map(|(k, _)| k.clone());
            // The map is non-empty here, so `oldest` is always `Some`.
            let Some(key) = oldest else { break };
            inner.entries.remove(&key);
            inner.counters.evictions += 1;
            debug!(key = %key, "Evicted oldest fragment");
        }
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}
