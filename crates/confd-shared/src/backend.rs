//! Backend configuration and its connection-equivalence hash.
//!
//! Two `BackendConfig`s that differ only in operational fields (timeouts,
//! retry behavior, IMDS TTL) must hash identically so that reconfiguring
//! those fields does not spawn a second client for the same logical
//! connection (see spec.md §3, §4.1, §8).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque record describing how to reach a backend store.
///
/// Connection-relevant fields participate in [`BackendConfig::config_hash`];
/// operational fields (the `*_timeout_ms`, retry, and TTL fields) are
/// excluded on purpose.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// Backend tag: `consul`, `etcd`, `vault`, `redis`, `zookeeper`,
    /// `dynamodb`, `ssm`, `acm`, `secretsmanager`, `env`, `file`.
    pub backend: String,
    /// Endpoint strings (node addresses, file paths, …).
    pub nodes: Vec<String>,
    /// Connection scheme, e.g. `http`, `https`.
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Opaque auth token / client cert path / etc., backend-specific.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Optional key filter expressions, backend-specific.
    #[serde(default)]
    pub filters: Vec<String>,

    // --- operational fields: excluded from equivalence hashing ---
    #[serde(default)]
    pub dial_timeout_ms: Option<u64>,
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    #[serde(default)]
    pub write_timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_backoff_ms: Option<u64>,
    #[serde(default)]
    pub imds_ttl_ms: Option<u64>,
}

impl BackendConfig {
    /// SHA-256 of the connection-relevant fields, serialized in a fixed
    /// deterministic order, truncated to 8 bytes and hex-encoded.
    ///
    /// Two configs are equivalent (same client may be reused) iff this
    /// value matches.
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"backend=");
        hasher.update(self.backend.as_bytes());
        hasher.update(b"\0nodes=");
        for node in &self.nodes {
            hasher.update(node.as_bytes());
            hasher.update(b",");
        }
        hasher.update(b"\0scheme=");
        hasher.update(self.scheme.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\0username=");
        hasher.update(self.username.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\0password=");
        hasher.update(self.password.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\0auth_token=");
        hasher.update(self.auth_token.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\0filters=");
        for filter in &self.filters {
            hasher.update(filter.as_bytes());
            hasher.update(b",");
        }
        let digest = hasher.finalize();
        hex_encode(&digest[..8])
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{:02x}", b).expect("write to String never fails");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BackendConfig {
        BackendConfig {
            backend: "etcd".to_string(),
            nodes: vec!["http://127.0.0.1:2379".to_string()],
            scheme: Some("http".to_string()),
            username: None,
            password: None,
            auth_token: None,
            filters: vec![],
            dial_timeout_ms: Some(1000),
            read_timeout_ms: Some(2000),
            write_timeout_ms: Some(2000),
            max_retries: Some(3),
            retry_backoff_ms: Some(500),
            imds_ttl_ms: None,
        }
    }

    #[test]
    fn operational_fields_do_not_affect_hash() {
        let a = base();
        let mut b = base();
        b.dial_timeout_ms = Some(99_999);
        b.read_timeout_ms = Some(1);
        b.write_timeout_ms = Some(1);
        b.max_retries = Some(0);
        b.retry_backoff_ms = Some(0);
        b.imds_ttl_ms = Some(60_000);
        assert_eq!(a.config_hash(), b.config_hash());
    }

    #[test]
    fn connection_fields_change_the_hash() {
        let a = base();
        let mut by_backend = base();
        by_backend.backend = "consul".to_string();
        assert_ne!(a.config_hash(), by_backend.config_hash());

        let mut by_nodes = base();
        by_nodes.nodes = vec!["http://10.0.0.1:2379".to_string()];
        assert_ne!(a.config_hash(), by_nodes.config_hash());

        let mut by_scheme = base();
        by_scheme.scheme = Some("https".to_string());
        assert_ne!(a.config_hash(), by_scheme.config_hash());

        let mut by_auth = base();
        by_auth.username = Some("root".to_string());
        assert_ne!(a.config_hash(), by_auth.config_hash());
    }
}
