//! The in-memory key/value store owned by a single Template Resource.
//!
//! A `Store` is never shared between resources: each resource's Backend
//! Fetcher purges and repopulates its own `Store` on every successful
//! fetch, and the resource's renders read back through the same `Store`.

use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory key/value store for one Template Resource.
///
/// Keys are normalized to always begin with `/`. `Store` is `Sync` so it can
/// be shared (via `Arc`) between the resource's fetcher and its renderer,
/// but the processor never overlaps a fetch and a render on the same
/// resource, so there is no concurrent-write/concurrent-read race in
/// practice.
#[derive(Debug, Default)]
pub struct Store {
    values: RwLock<BTreeMap<String, String>>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            values: RwLock::new(BTreeMap::new()),
        }
    }

    /// Replace the entire contents of the store atomically.
    ///
    /// Used by the Backend Fetcher after a successful fetch: the store ends
    /// up containing exactly the keys passed in, normalized, and nothing
    /// else.
    pub fn replace(&self, entries: impl IntoIterator<Item = (String, String)>) {
        let mut values = self.values.write().expect("store lock poisoned");
        values.clear();
        values.extend(entries);
    }

    /// Remove every key from the store.
    pub fn purge(&self) {
        self.values.write().expect("store lock poisoned").clear();
    }

    /// Get a single value by exact key.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().expect("store lock poisoned").get(key).cloned()
    }

    /// Check whether a key exists.
    pub fn exists(&self, key: &str) -> bool {
        self.values.read().expect("store lock poisoned").contains_key(key)
    }

    /// All key/value pairs whose key starts with `prefix`.
    pub fn get_all_values(&self, prefix: &str) -> Vec<(String, String)> {
        self.values
            .read()
            .expect("store lock poisoned")
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Child key names immediately beneath `dir` (one path segment deep, no
    /// leading slash, no trailing slash), deduplicated.
    pub fn list_dir(&self, dir: &str) -> Vec<String> {
        let dir = if dir.ends_with('/') {
            dir.to_string()
        } else {
            format!("{}/", dir)
        };
        let mut children: Vec<String> = self
            .values
            .read()
            .expect("store lock poisoned")
            .range(dir.clone()..)
            .take_while(|(k, _)| k.starts_with(&dir))
            .filter_map(|(k, _)| {
                let rest = &k[dir.len()..];
                rest.split('/').next().map(|s| s.to_string())
            })
            .filter(|s| !s.is_empty())
            .collect();
        children.dedup();
        children
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.values.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the whole store as a sorted vector of pairs.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.values
            .read()
            .expect("store lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Normalize a raw backend key against a resource prefix: strip the prefix,
/// ensure exactly one leading `/`.
///
/// `normalize("/env/production/apps/myapp/db/host", "/env/production/apps/myapp")
///     == "/db/host"`
pub fn normalize_key(full_key: &str, prefix: &str) -> String {
    let trimmed = full_key.strip_prefix(prefix).unwrap_or(full_key);
    format!("/{}", trimmed.trim_start_matches('/'))
}

/// Compose a global prefix and a resource prefix into the single
/// normalized prefix used to query the backend.
///
/// Both inputs are trimmed of surrounding `/`, joined under one leading
/// `/`; if both are empty the result is `/`.
pub fn compose_prefix(global: &str, resource: &str) -> String {
    let global = global.trim_matches('/');
    let resource = resource.trim_matches('/');
    match (global.is_empty(), resource.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{}", resource),
        (false, true) => format!("/{}", global),
        (false, false) => format!("/{}/{}", global, resource),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_prefix_both_empty_is_root() {
        assert_eq!(compose_prefix("", ""), "/");
    }

    #[test]
    fn compose_prefix_trims_slashes() {
        assert_eq!(compose_prefix("/x/", "/y"), "/x/y");
        assert_eq!(compose_prefix("x", "y"), "/x/y");
        assert_eq!(compose_prefix("/x", ""), "/x");
        assert_eq!(compose_prefix("", "y"), "/y");
    }

    #[test]
    fn compose_prefix_matrix_has_single_leading_slash_and_no_trailing() {
        let globals = ["", "/x", "x", "/x/"];
        let resources = ["", "/y", "y"];
        for g in globals {
            for r in resources {
                let p = compose_prefix(g, r);
                assert!(p.starts_with('/'));
                assert!(!p.starts_with("//"));
                if p != "/" {
                    assert!(!p.ends_with('/'));
                }
                assert!(!p.contains("//"));
            }
        }
    }

    #[test]
    fn normalize_key_strips_prefix_and_adds_slash() {
        assert_eq!(normalize_key("/foo/bar", "/foo"), "/bar");
        assert_eq!(normalize_key("/bar", "/"), "/bar");
    }

    #[test]
    fn replace_purges_stale_keys() {
        let store = Store::new();
        store.replace([("/a".to_string(), "1".to_string()), ("/b".to_string(), "2".to_string())]);
        assert_eq!(store.len(), 2);
        store.replace([("/a".to_string(), "1".to_string())]);
        assert_eq!(store.len(), 1);
        assert!(!store.exists("/b"));
    }

    #[test]
    fn list_dir_returns_immediate_children() {
        let store = Store::new();
        store.replace([
            ("/app/db/host".to_string(), "h".to_string()),
            ("/app/db/port".to_string(), "5432".to_string()),
            ("/app/cache/host".to_string(), "c".to_string()),
        ]);
        let mut children = store.list_dir("/app");
        children.sort();
        assert_eq!(children, vec!["cache".to_string(), "db".to_string()]);
    }
}
