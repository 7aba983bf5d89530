//! Client Cache (§4.1): one `StoreClient` per distinct backend-connection
//! equivalence class, shared by every resource whose `BackendConfig`
//! hashes the same.

use crate::error::Result;
use crate::store::StoreClient;
use confd_shared::BackendConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Constructs a concrete `StoreClient` for a given `BackendConfig`. Kept as
/// a trait object so `ClientCache` does not need to know about individual
/// backend drivers.
pub trait ClientFactory: Send + Sync {
    fn create(&self, cfg: &BackendConfig) -> Result<Arc<dyn StoreClient>>;
}

pub struct ClientCache {
    clients: RwLock<HashMap<String, Arc<dyn StoreClient>>>,
    factory: Arc<dyn ClientFactory>,
}

impl ClientCache {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// Look up (or create) the client for `cfg`'s equivalence class.
    /// Double-checked: a shared-read lookup first, then an exclusive
    /// re-check before invoking the factory, so concurrent misses on
    /// distinct hashes don't serialize against each other.
    pub fn get_or_create(&self, cfg: &BackendConfig) -> Result<Arc<dyn StoreClient>> {
        let hash = cfg.config_hash();

        if let Some(client) = self.clients.read().expect("client cache lock poisoned").get(&hash) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write().expect("client cache lock poisoned");
        if let Some(client) = clients.get(&hash) {
            return Ok(client.clone());
        }

        let client = self.factory.create(cfg)?;
        clients.insert(hash, client.clone());
        Ok(client)
    }

    /// Drop every cached client; used by tests and reconfiguration.
    pub fn clear(&self) {
        self.clients.write().expect("client cache lock poisoned").clear();
    }

    pub fn size(&self) -> usize {
        self.clients.read().expect("client cache lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StopSignal, StoreClient};
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient;

    #[async_trait]
    impl StoreClient for CountingClient {
        async fn get_values(&self, _keys: &[String]) -> Result<StdHashMap<String, String>> {
            Ok(StdHashMap::new())
        }
        async fn watch_prefix(&self, _p: &str, _k: &[String], last_index: u64, _stop: StopSignal) -> Result<u64> {
            Ok(last_index)
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct CountingFactory {
        calls: AtomicUsize,
    }

    impl ClientFactory for CountingFactory {
        fn create(&self, _cfg: &BackendConfig) -> Result<Arc<dyn StoreClient>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingClient))
        }
    }

    fn cfg(backend: &str) -> BackendConfig {
        BackendConfig {
            backend: backend.to_string(),
            nodes: vec![],
            scheme: None,
            username: None,
            password: None,
            auth_token: None,
            filters: vec![],
            dial_timeout_ms: None,
            read_timeout_ms: None,
            write_timeout_ms: None,
            max_retries: None,
            retry_backoff_ms: None,
            imds_ttl_ms: None,
        }
    }

    #[test]
    fn equivalent_configs_share_one_client() {
        let factory = Arc::new(CountingFactory { calls: AtomicUsize::new(0) });
        let cache = ClientCache::new(factory.clone());

        let mut a = cfg("file");
        a.dial_timeout_ms = Some(1);
        let mut b = cfg("file");
        b.dial_timeout_ms = Some(99999);

        cache.get_or_create(&a).unwrap();
        cache.get_or_create(&b).unwrap();

        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn distinct_configs_create_distinct_clients() {
        let factory = Arc::new(CountingFactory { calls: AtomicUsize::new(0) });
        let cache = ClientCache::new(factory.clone());

        cache.get_or_create(&cfg("file")).unwrap();
        cache.get_or_create(&cfg("env")).unwrap();

        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.size(), 2);
    }

    #[test]
    fn clear_empties_cache() {
        let factory = Arc::new(CountingFactory { calls: AtomicUsize::new(0) });
        let cache = ClientCache::new(factory);
        cache.get_or_create(&cfg("file")).unwrap();
        cache.clear();
        assert_eq!(cache.size(), 0);
    }
}
