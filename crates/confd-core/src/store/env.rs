//! `env` backend driver: reads `CONFD_`-prefixed environment variables.
//!
//! `CONFD_DB_HOST=localhost` becomes key `/db/host`. Since the process
//! environment does not change after startup, `watch_prefix` simply blocks
//! until stopped — there is nothing to poll.

use crate::error::Result;
use crate::store::{StopSignal, StoreClient};
use async_trait::async_trait;
use std::collections::HashMap;

const ENV_PREFIX: &str = "CONFD_";

pub struct EnvStoreClient;

impl EnvStoreClient {
    pub fn new() -> Self {
        Self
    }

    fn snapshot() -> HashMap<String, String> {
        std::env::vars()
            .filter_map(|(name, value)| {
                let stripped = name.strip_prefix(ENV_PREFIX)?;
                let key = format!("/{}", stripped.to_lowercase().replace('_', "/"));
                Some((key, value))
            })
            .collect()
    }
}

impl Default for EnvStoreClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreClient for EnvStoreClient {
    async fn get_values(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        let all = Self::snapshot();
        Ok(all
            .into_iter()
            .filter(|(k, _)| keys.iter().any(|needle| k == needle || k.starts_with(needle.as_str())))
            .collect())
    }

    async fn watch_prefix(
        &self,
        _prefix: &str,
        _keys: &[String],
        last_index: u64,
        mut stop: StopSignal,
    ) -> Result<u64> {
        stop.cancelled().await;
        Ok(last_index)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for EnvStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EnvStoreClient")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_confd_prefixed_vars() {
        std::env::set_var("CONFD_TEST_ENV_DRIVER_HOST", "localhost");
        let client = EnvStoreClient::new();
        let values = client.get_values(&["/test/env/driver".to_string()]).await.unwrap();
        assert_eq!(values.get("/test/env/driver/host").map(String::as_str), Some("localhost"));
        std::env::remove_var("CONFD_TEST_ENV_DRIVER_HOST");
    }
}
