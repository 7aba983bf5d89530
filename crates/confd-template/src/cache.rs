//! Template cache: `(path → source, mtime)`, bounded by an eviction policy
//! (§4.2). A hit requires both a present entry and an unchanged `mtime`; a
//! miss leaves re-parsing to the caller.
//!
//! The cached value is the raw template *source*, not a compiled `Tera`
//! instance — each render builds its own `Tera` and binds a fresh function
//! set to it (see [`crate::renderer`]), so there is no mutable compiled
//! object shared across concurrent renders to race on.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

/// Eviction policy applied once the cache holds `max_size` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Evict the least-recently-used entry.
    Lru,
    /// Evict the least-frequently-used entry.
    Lfu,
    /// Evict the oldest-inserted entry.
    Fifo,
}

/// Running counters for cache effectiveness.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Entry {
    source: String,
    mtime: SystemTime,
    hit_count: u64,
    last_used_at: u64,
}

struct Inner {
    entries: HashMap<PathBuf, Entry>,
    insertion_order: VecDeque<PathBuf>,
    clock: u64,
    stats: CacheStats,
}

/// Cache of raw template sources keyed by path, guarded against staleness
/// by filesystem mtime.
pub struct TemplateCache {
    inner: RwLock<Inner>,
    enabled: bool,
    max_size: usize,
    policy: EvictionPolicy,
}

impl TemplateCache {
    pub fn new(enabled: bool, max_size: usize, policy: EvictionPolicy) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
                clock: 0,
                stats: CacheStats::default(),
            }),
            enabled,
            max_size,
            policy,
        }
    }

    /// Default bounded cache: enabled, 100 entries, LRU eviction.
    pub fn default_bounded() -> Self {
        Self::new(true, 100, EvictionPolicy::Lru)
    }

    /// Disabled cache: every `get` misses, `put` is a no-op.
    pub fn disabled() -> Self {
        Self::new(false, 0, EvictionPolicy::Lru)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Look up `path`'s cached source. Returns `None` on a cold entry, a
    /// stat failure, or an mtime mismatch; records a hit or a miss either
    /// way (a stat failure counts as a miss).
    pub fn get(&self, path: &Path) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let current_mtime = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => {
                self.inner.write().expect("cache lock poisoned").stats.misses += 1;
                return None;
            }
        };

        let mut inner = self.inner.write().expect("cache lock poisoned");
        inner.clock += 1;
        let clock = inner.clock;

        let hit = match inner.entries.get_mut(path) {
            Some(entry) if entry.mtime == current_mtime => {
                entry.hit_count += 1;
                entry.last_used_at = clock;
                Some(entry.source.clone())
            }
            _ => None,
        };

        if hit.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        hit
    }

    /// Store `source` for `path` under `mtime`, evicting per policy if the
    /// cache is at capacity. No-op when disabled.
    pub fn put(&self, path: &Path, source: &str, mtime: SystemTime) {
        if !self.enabled {
            return;
        }

        let mut inner = self.inner.write().expect("cache lock poisoned");
        inner.clock += 1;
        let clock = inner.clock;

        if !inner.entries.contains_key(path) && inner.entries.len() >= self.max_size {
            self.evict_one(&mut inner);
        }

        let is_new = !inner.entries.contains_key(path);
        inner.entries.insert(
            path.to_path_buf(),
            Entry {
                source: source.to_string(),
                mtime,
                hit_count: 0,
                last_used_at: clock,
            },
        );
        if is_new {
            inner.insertion_order.push_back(path.to_path_buf());
        }
    }

    fn evict_one(&self, inner: &mut Inner) {
        let victim = match self.policy {
            EvictionPolicy::Fifo => {
                while let Some(candidate) = inner.insertion_order.pop_front() {
                    if inner.entries.contains_key(&candidate) {
                        inner.insertion_order.push_front(candidate);
                        break;
                    }
                }
                inner.insertion_order.pop_front()
            }
            EvictionPolicy::Lru => inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used_at)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Lfu => inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.hit_count)
                .map(|(k, _)| k.clone()),
        };

        if let Some(path) = victim {
            inner.entries.remove(&path);
            inner.stats.evictions += 1;
        }
    }

    /// Remove every cached entry; used by reload (§4.13) and test hooks.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("cache lock poisoned");
        inner.entries.clear();
        inner.insertion_order.clear();
    }

    pub fn size(&self) -> usize {
        self.inner.read().expect("cache lock poisoned").entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.read().expect("cache lock poisoned").stats.clone()
    }
}
