//! Memoized strategy evaluations.
//!
//! Evaluating every strategy on a large cluster is the most expensive thing a
//! request can do, and users tend to expand the same handful of clusters. The
//! cache maps a cluster id to its ranked strategy list:
//!
//! - an entry is only served for the member set it was computed on; a virtual
//!   id names different accounts depending on which strategy produced it, so
//!   a member mismatch is a miss;
//! - entries expire after a TTL (default one hour);
//! - at capacity (default 100) expired entries are dropped first, then the
//!   least recently used entry is evicted;
//! - all access goes through one lock, including the background
//!   [`Precomputer`], which only ever writes through [`StrategyCache::put`].
//!
//! A miss is never an error: callers recompute through
//! [`StrategyCache::compute_and_cache`].

mod precompute;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::expansion::{EvaluationContext, ExpansionEvaluator, ScoredStrategy};
use crate::id::ClusterId;
use crate::snapshot::Snapshot;

pub use precompute::{PrecomputeRequest, Precomputer, ServiceStatus};

/// Shared, immutable ranked list.
pub type RankedStrategies = Arc<[ScoredStrategy]>;

/// Cache sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries.
    pub capacity: usize,
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl_secs: 3600,
        }
    }
}

impl CacheConfig {
    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// The cache seam used by the request path.
///
/// `members` is always the sorted member list of the cluster. Tests and
/// cache-less deployments use [`NoopCache`].
pub trait StrategyCache: Send + Sync {
    /// Cached ranking for `id` over `members`, refreshing its recency.
    fn get(&self, id: &ClusterId, members: &[u32]) -> Option<RankedStrategies>;

    /// Store a ranking, returning the shared list.
    fn put(
        &self,
        id: ClusterId,
        members: &[u32],
        ranked: Vec<ScoredStrategy>,
        computation_ms: f64,
    ) -> RankedStrategies;

    /// Whether a fresh entry for `id` over `members` exists, without touching
    /// recency or stats.
    fn contains(&self, id: &ClusterId, members: &[u32]) -> bool;

    /// Drop one entry.
    fn invalidate(&self, id: &ClusterId);

    /// Drop every entry.
    fn invalidate_all(&self);

    /// Cached ranking for `id`, evaluating and storing it on a miss.
    fn compute_and_cache(
        &self,
        id: &ClusterId,
        members: &[u32],
        snapshot: &Snapshot,
        evaluator: &ExpansionEvaluator,
    ) -> RankedStrategies {
        if let Some(hit) = self.get(id, members) {
            return hit;
        }
        let start = Instant::now();
        let ctx = EvaluationContext::from_snapshot(snapshot, members);
        let ranked = evaluator.evaluate(&ctx);
        let computation_ms = start.elapsed().as_secs_f64() * 1000.0;
        log::debug!(
            "evaluated {id} ({} members): {} strategies in {computation_ms:.1}ms",
            members.len(),
            ranked.len()
        );
        self.put(id.clone(), members, ranked, computation_ms)
    }
}

/// A cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl StrategyCache for NoopCache {
    fn get(&self, _id: &ClusterId, _members: &[u32]) -> Option<RankedStrategies> {
        None
    }

    fn put(
        &self,
        _id: ClusterId,
        _members: &[u32],
        ranked: Vec<ScoredStrategy>,
        _computation_ms: f64,
    ) -> RankedStrategies {
        ranked.into()
    }

    fn contains(&self, _id: &ClusterId, _members: &[u32]) -> bool {
        false
    }

    fn invalidate(&self, _id: &ClusterId) {}

    fn invalidate_all(&self) {}
}

/// A stored ranking.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Ranked strategies, best first.
    pub ranked: RankedStrategies,
    /// Sorted members of the cluster when it was evaluated.
    pub members: Arc<[u32]>,
    /// When the evaluation finished.
    pub computed_at: Instant,
    /// How long the evaluation took.
    pub computation_ms: f64,
}

impl CacheEntry {
    /// Number of members the ranking was computed on.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// Counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that returned an entry.
    pub hits: u64,
    /// Lookups that found nothing usable (absent, expired, other members).
    pub misses: u64,
    /// Entries dropped for exceeding the TTL.
    pub expirations: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
    /// Current entry count.
    pub size: usize,
    /// Maximum entry count.
    pub capacity: usize,
}

#[derive(Debug)]
struct CacheState {
    /// `None` when the capacity is zero.
    entries: Option<LruCache<ClusterId, CacheEntry>>,
    stats: CacheStats,
}

enum Lookup {
    Missing,
    Expired,
    OtherMembers,
    Fresh,
}

/// LRU + TTL cache of strategy rankings.
#[derive(Debug)]
pub struct ExpansionCache {
    state: Mutex<CacheState>,
    capacity: usize,
    ttl: Duration,
}

impl Default for ExpansionCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ExpansionCache {
    /// Empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_ttl(config.capacity, config.ttl())
    }

    /// Empty cache with an explicit TTL. A zero capacity stores nothing.
    pub fn with_ttl(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: NonZeroUsize::new(capacity).map(LruCache::new),
                stats: CacheStats::default(),
            }),
            capacity,
            ttl,
        }
    }

    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            size: state.entries.as_ref().map_or(0, LruCache::len),
            capacity: self.capacity,
            ..state.stats
        }
    }

    /// Number of stored entries (expired ones included until touched).
    pub fn len(&self) -> usize {
        self.state.lock().entries.as_ref().map_or(0, LruCache::len)
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metadata of an entry, without refreshing recency.
    pub fn peek(&self, id: &ClusterId) -> Option<CacheEntry> {
        self.state.lock().entries.as_ref()?.peek(id).cloned()
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        entry.computed_at.elapsed() >= self.ttl
    }

    fn lookup(
        &self,
        entries: &LruCache<ClusterId, CacheEntry>,
        id: &ClusterId,
        members: &[u32],
    ) -> Lookup {
        match entries.peek(id) {
            None => Lookup::Missing,
            Some(entry) if self.is_expired(entry) => Lookup::Expired,
            Some(entry) if *entry.members != *members => Lookup::OtherMembers,
            Some(_) => Lookup::Fresh,
        }
    }
}

impl StrategyCache for ExpansionCache {
    fn get(&self, id: &ClusterId, members: &[u32]) -> Option<RankedStrategies> {
        let mut state = self.state.lock();
        let CacheState { entries, stats } = &mut *state;
        let Some(entries) = entries.as_mut() else {
            stats.misses += 1;
            return None;
        };

        match self.lookup(entries, id, members) {
            Lookup::Fresh => {
                stats.hits += 1;
                entries.get(id).map(|entry| Arc::clone(&entry.ranked))
            }
            Lookup::Missing => {
                stats.misses += 1;
                None
            }
            Lookup::Expired => {
                entries.pop(id);
                stats.expirations += 1;
                stats.misses += 1;
                log::debug!("cache entry for {id} expired");
                None
            }
            Lookup::OtherMembers => {
                stats.misses += 1;
                log::debug!("cache entry for {id} was computed on other members");
                None
            }
        }
    }

    fn put(
        &self,
        id: ClusterId,
        members: &[u32],
        ranked: Vec<ScoredStrategy>,
        computation_ms: f64,
    ) -> RankedStrategies {
        let ranked: RankedStrategies = ranked.into();
        let mut state = self.state.lock();
        let CacheState { entries, stats } = &mut *state;
        let Some(entries) = entries.as_mut() else {
            return ranked;
        };

        if !entries.contains(&id) && entries.len() >= entries.cap().get() {
            let expired: Vec<ClusterId> = entries
                .iter()
                .filter(|(_, entry)| self.is_expired(entry))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                entries.pop(key);
            }
            stats.expirations += expired.len() as u64;
        }

        let entry = CacheEntry {
            ranked: Arc::clone(&ranked),
            members: members.into(),
            computed_at: Instant::now(),
            computation_ms,
        };
        if let Some((evicted, _)) = entries.push(id.clone(), entry) {
            if evicted != id {
                stats.evictions += 1;
                log::debug!("evicted {evicted} from expansion cache");
            }
        }
        ranked
    }

    fn contains(&self, id: &ClusterId, members: &[u32]) -> bool {
        let state = self.state.lock();
        state
            .entries
            .as_ref()
            .is_some_and(|entries| matches!(self.lookup(entries, id, members), Lookup::Fresh))
    }

    fn invalidate(&self, id: &ClusterId) {
        if let Some(entries) = self.state.lock().entries.as_mut() {
            entries.pop(id);
        }
    }

    fn invalidate_all(&self) {
        let mut state = self.state.lock();
        let dropped = state.entries.as_ref().map_or(0, LruCache::len);
        if let Some(entries) = state.entries.as_mut() {
            entries.clear();
        }
        log::info!("expansion cache cleared ({dropped} entries)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::{Group, Partition, ScoreBreakdown, StrategyKind};

    fn ranked(tag: u32) -> Vec<ScoredStrategy> {
        vec![ScoredStrategy {
            kind: StrategyKind::Individuals,
            partition: Partition::new(vec![Group::new(vec![tag]), Group::new(vec![tag + 1])]),
            score: ScoreBreakdown {
                size_entropy: 1.0,
                collapse: 0.5,
                fragmentation: 0.0,
                edge_separation: 0.5,
                tag_coherence: 0.5,
                total: 0.5,
                reason: None,
                n_clusters: 2,
            },
            execution_ms: 0.1,
        }]
    }

    fn id(n: usize) -> ClusterId {
        ClusterId::node(n)
    }

    const M: &[u32] = &[0, 1];

    #[test]
    fn test_put_then_get_returns_same_list() {
        let cache = ExpansionCache::default();
        let stored = cache.put(id(1), M, ranked(7), 1.5);
        let hit = cache.get(&id(1), M).unwrap();
        assert!(Arc::ptr_eq(&stored, &hit));
        assert_eq!(&*hit, ranked(7).as_slice());
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.peek(&id(1)).unwrap().member_count(), 2);
    }

    #[test]
    fn test_miss_is_counted() {
        let cache = ExpansionCache::default();
        assert!(cache.get(&id(9), M).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ExpansionCache::with_ttl(2, Duration::from_secs(60));
        cache.put(id(1), M, ranked(1), 0.0);
        cache.put(id(2), M, ranked(2), 0.0);
        // Touch 1 so that 2 becomes least recently used.
        assert!(cache.get(&id(1), M).is_some());
        cache.put(id(3), M, ranked(3), 0.0);

        assert!(cache.contains(&id(1), M));
        assert!(!cache.contains(&id(2), M));
        assert!(cache.contains(&id(3), M));
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_full_cache_drops_expired_before_lru() {
        let cache = ExpansionCache::with_ttl(2, Duration::from_millis(50));
        cache.put(id(1), M, ranked(1), 0.0);
        std::thread::sleep(Duration::from_millis(80));
        cache.put(id(2), M, ranked(2), 0.0);
        // Expired 1 becomes most recently used, fresh 2 the LRU candidate.
        cache.state.lock().entries.as_mut().unwrap().promote(&id(1));
        cache.put(id(3), M, ranked(3), 0.0);

        assert!(cache.contains(&id(2), M));
        assert!(cache.contains(&id(3), M));
        let stats = cache.stats();
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.size, 2);
    }

    #[test]
    fn test_other_member_set_is_a_miss() {
        let cache = ExpansionCache::default();
        cache.put(id(1), &[0, 4, 8], ranked(1), 0.0);
        assert!(cache.get(&id(1), &[0, 1, 2]).is_none());
        assert!(!cache.contains(&id(1), &[0, 1, 2]));
        assert!(cache.contains(&id(1), &[0, 4, 8]));
        assert_eq!(cache.stats().misses, 1);

        // Recomputing for the new members replaces the entry.
        cache.put(id(1), &[0, 1, 2], ranked(5), 0.0);
        assert!(cache.get(&id(1), &[0, 4, 8]).is_none());
        assert_eq!(cache.get(&id(1), &[0, 1, 2]).unwrap()[0].partition.groups[0].members, vec![5]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = ExpansionCache::with_ttl(0, Duration::from_secs(60));
        let out = cache.put(id(1), M, ranked(1), 0.0);
        assert_eq!(out.len(), 1);
        assert!(cache.is_empty());
        assert!(cache.get(&id(1), M).is_none());
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = ExpansionCache::with_ttl(2, Duration::from_secs(60));
        cache.put(id(1), M, ranked(1), 0.0);
        cache.put(id(2), M, ranked(2), 0.0);
        cache.put(id(1), M, ranked(5), 0.0);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get(&id(1), M).unwrap()[0].partition.groups[0].members, vec![5]);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = ExpansionCache::with_ttl(4, Duration::ZERO);
        cache.put(id(1), M, ranked(1), 0.0);
        assert!(!cache.contains(&id(1), M));
        assert!(cache.get(&id(1), M).is_none());
        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_invalidate() {
        let cache = ExpansionCache::default();
        cache.put(id(1), M, ranked(1), 0.0);
        cache.put(id(2), M, ranked(2), 0.0);
        cache.invalidate(&id(1));
        assert!(!cache.contains(&id(1), M));
        assert!(cache.contains(&id(2), M));
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_noop_cache_never_stores() {
        let cache = NoopCache;
        let out = cache.put(id(1), M, ranked(1), 0.0);
        assert_eq!(out.len(), 1);
        assert!(cache.get(&id(1), M).is_none());
    }

    #[test]
    fn test_compute_and_cache() {
        let snapshot = crate::snapshot::fixtures::four_leaf_snapshot();
        let cache = ExpansionCache::default();
        let evaluator = ExpansionEvaluator::new();
        let members = snapshot.node_members(6);
        let first = cache.compute_and_cache(&id(6), &members, &snapshot, &evaluator);
        let second = cache.compute_and_cache(&id(6), &members, &snapshot, &evaluator);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().hits, 1);

        let fewer = &members[..members.len() - 1];
        let third = cache.compute_and_cache(&id(6), fewer, &snapshot, &evaluator);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(cache.peek(&id(6)).unwrap().member_count(), fewer.len());
    }

    #[test]
    fn test_config_from_json() {
        let config: CacheConfig = serde_json::from_str(r#"{"capacity": 5}"#).unwrap();
        assert_eq!(config.capacity, 5);
        assert_eq!(config.ttl(), Duration::from_secs(3600));
    }
}
