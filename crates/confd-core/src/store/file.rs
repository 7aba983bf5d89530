//! `file` backend driver: flattens a TOML/JSON/YAML key file on disk into
//! a key → value map. Requires no network protocol, so it exercises the
//! rest of the pipeline (fetcher, caches, processors) end-to-end.

use crate::error::{ConfdError, Result};
use crate::store::{StopSignal, StoreClient};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::time::{sleep, Duration};

/// How often a watcher polls the source file's mtime for changes.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct FileStoreClient {
    path: PathBuf,
}

impl FileStoreClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_flat(&self) -> Result<HashMap<String, String>> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| ConfdError::backend(format!("reading '{}': {}", self.path.display(), e)))?;

        let value: serde_json::Value = match self.path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ConfdError::backend(format!("parsing '{}' as JSON: {}", self.path.display(), e)))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| ConfdError::backend(format!("parsing '{}' as YAML: {}", self.path.display(), e)))?,
            _ => {
                let toml_value: toml::Value = toml::from_str(&content)
                    .map_err(|e| ConfdError::backend(format!("parsing '{}' as TOML: {}", self.path.display(), e)))?;
                serde_json::to_value(toml_value)
                    .map_err(|e| ConfdError::backend(format!("converting '{}': {}", self.path.display(), e)))?
            }
        };

        let mut flat = HashMap::new();
        flatten("", &value, &mut flat);
        Ok(flat)
    }

    fn mtime(&self) -> Option<std::time::SystemTime> {
        std::fs::metadata(&self.path).ok().and_then(|m| m.modified().ok())
    }
}

/// Recursively flatten a JSON-like value into `/a/b/c`-style keys.
fn flatten(prefix: &str, value: &serde_json::Value, out: &mut HashMap<String, String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let key = format!("{}/{}", prefix, k);
                flatten(&key, v, out);
            }
        }
        serde_json::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        serde_json::Value::Null => {}
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

#[async_trait]
impl StoreClient for FileStoreClient {
    async fn get_values(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        let path = self.path.clone();
        let flat = tokio::task::spawn_blocking(move || FileStoreClient::new(path).load_flat())
            .await
            .map_err(|e| ConfdError::backend(format!("file read task panicked: {}", e)))??;

        Ok(flat
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
        let baseline = self.mtime();
        loop {
            tokio::select! {
                _ = stop.cancelled() => return Ok(last_index),
                _ = sleep(POLL_INTERVAL) => {
                    if self.mtime() != baseline {
                        return Ok(last_index + 1);
                    }
                }
            }
        }
    }

    async fn health_check(&self) -> Result<()> {
        if Path::new(&self.path).exists() {
            Ok(())
        } else {
            Err(ConfdError::backend(format!("file '{}' does not exist", self.path.display())))
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flattens_nested_toml_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.toml");
        std::fs::write(&path, "[db]\nhost = \"localhost\"\nport = \"5432\"\n").unwrap();

        let client = FileStoreClient::new(&path);
        let values = client.get_values(&["/db".to_string()]).await.unwrap();
        assert_eq!(values.get("/db/host").map(String::as_str), Some("localhost"));
        assert_eq!(values.get("/db/port").map(String::as_str), Some("5432"));
    }

    #[tokio::test]
    async fn health_check_fails_for_missing_file() {
        let client = FileStoreClient::new("/nonexistent/path.toml");
        assert!(client.health_check().await.is_err());
    }
}
