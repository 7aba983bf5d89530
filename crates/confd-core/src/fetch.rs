//! Backend Fetcher (§4.5): pulls the resource's keys from its
//! `StoreClient` and repopulates its `Store`.

use crate::error::Result;
use crate::store::StoreClient;
use confd_shared::{normalize_key, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub struct BackendFetcher {
    client: Arc<dyn StoreClient>,
    store: Arc<Store>,
    prefix: String,
    backend_timeout: Duration,
    prefixed_keys: Vec<String>,
}

impl BackendFetcher {
    pub fn new(
        client: Arc<dyn StoreClient>,
        store: Arc<Store>,
        prefix: String,
        backend_timeout: Duration,
        prefixed_keys: Vec<String>,
    ) -> Self {
        Self {
            client,
            store,
            prefix,
            backend_timeout,
            prefixed_keys,
        }
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    /// Fetch the resource's keys and, on success, purge-and-repopulate its
    /// `Store`. On error the store is left untouched.
    pub async fn fetch_values(&self) -> Result<()> {
        let fetch = self.client.get_values(&self.prefixed_keys);

        let values = if self.backend_timeout.is_zero() {
            fetch.await?
        } else {
            match timeout(self.backend_timeout, fetch).await {
                Ok(result) => result?,
                Err(_) => return Err(crate::error::ConfdError::backend("GetValues timed out")),
            }
        };

        let normalized = values
            .into_iter()
            .map(|(k, v)| (normalize_key(&k, &self.prefix), v));
        self.store.replace(normalized);

        Ok(())
    }
}
