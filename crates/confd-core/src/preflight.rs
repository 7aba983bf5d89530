//! Preflight (§4.14): a one-shot diagnostic run — load the resource set,
//! health-check and probe every backend, and report missing keys as
//! warnings but backend errors as failures. Never writes a `dest`.

use crate::cache::{ClientCache, ClientFactory};
use crate::config::{load_resource_set, AppConfig};
use crate::error::{ConfdError, Result};
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct ResourcePreflight {
    pub dest: String,
    pub missing_keys: Vec<String>,
    pub backend_error: Option<String>,
}

impl ResourcePreflight {
    pub fn ok(&self) -> bool {
        self.backend_error.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    pub resources: Vec<ResourcePreflight>,
}

impl PreflightReport {
    /// Non-zero exit iff any resource hit a backend error. Missing keys
    /// alone do not fail preflight.
    pub fn success(&self) -> bool {
        self.resources.iter().all(|r| r.ok())
    }
}

/// Run preflight against every resource under `app.conf_d_dir()`.
pub async fn run_preflight(app: &AppConfig, client_cache: &ClientCache, factory: &dyn ClientFactory) -> Result<PreflightReport> {
    let _ = factory;
    let resources = load_resource_set(app)?;
    let mut report = PreflightReport::default();

    for resource in resources {
        let backend_cfg = resource
            .backend
            .clone()
            .or_else(|| app.global_backend.clone())
            .ok_or_else(|| ConfdError::configuration("backend", "no backend configured for resource and no global backend set"))?;

        let client = client_cache.get_or_create(&backend_cfg)?;

        let health = run_with_timeout(app.preflight_timeout, client.health_check()).await;
        if let Err(e) = health {
            report.resources.push(ResourcePreflight {
                dest: resource.dest.display().to_string(),
                missing_keys: Vec::new(),
                backend_error: Some(e.to_string()),
            });
            continue;
        }

        let keys = resource.prefixed_keys();
        match run_with_timeout(app.preflight_timeout, client.get_values(&keys)).await {
            Ok(values) => {
                let missing: Vec<String> = keys.into_iter().filter(|k| !values.contains_key(k)).collect();
                if !missing.is_empty() {
                    tracing::warn!(dest = %resource.dest.display(), ?missing, "preflight: keys missing from backend");
                }
                report.resources.push(ResourcePreflight {
                    dest: resource.dest.display().to_string(),
                    missing_keys: missing,
                    backend_error: None,
                });
            }
            Err(e) => {
                report.resources.push(ResourcePreflight {
                    dest: resource.dest.display().to_string(),
                    missing_keys: Vec::new(),
                    backend_error: Some(e.to_string()),
                });
            }
        }
    }

    Ok(report)
}

async fn run_with_timeout<T>(duration: Duration, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    if duration.is_zero() {
        return fut.await;
    }
    match timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ConfdError::backend("preflight check timed out")),
    }
}
