//! Process-wide configuration: where templates and resource files live,
//! the global backend and prefix, and scheduling parameters.

use crate::error::{ConfdError, Result};
use confd_shared::BackendConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
struct RawAppConfig {
    conf_dir: Option<String>,
    template_dir: Option<String>,
    #[serde(default)]
    prefix: String,
    interval: Option<u64>,
    watch: Option<bool>,
    batch_interval: Option<String>,
    backend_timeout: Option<String>,
    preflight_timeout: Option<String>,
    watch_error_backoff: Option<String>,
}

/// Process-wide settings loaded once at startup (§6, CLI surface
/// collaborator).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub conf_dir: PathBuf,
    pub template_dir: PathBuf,
    pub global_prefix: String,
    pub interval: Duration,
    pub watch: bool,
    pub batch_interval: Duration,
    pub backend_timeout: Duration,
    pub preflight_timeout: Duration,
    pub watch_error_backoff: Duration,
    pub global_backend: Option<BackendConfig>,
}

impl AppConfig {
    pub fn from_toml(source: &str) -> Result<Self> {
        let raw: RawAppConfig =
            toml::from_str(source).map_err(|e| ConfdError::configuration("<toml>", e.to_string()))?;

        let conf_dir = PathBuf::from(raw.conf_dir.unwrap_or_else(|| "/etc/confd".to_string()));
        let template_dir = raw
            .template_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| conf_dir.join("templates"));

        Ok(Self {
            conf_dir,
            template_dir,
            global_prefix: raw.prefix,
            interval: Duration::from_secs(raw.interval.unwrap_or(600)),
            watch: raw.watch.unwrap_or(false),
            batch_interval: super::resource::parse_duration_field(
                "batch_interval",
                raw.batch_interval.as_deref().or(Some("2s")),
            )?,
            backend_timeout: super::resource::parse_duration_field(
                "backend_timeout",
                raw.backend_timeout.as_deref().or(Some("10s")),
            )?,
            preflight_timeout: super::resource::parse_duration_field(
                "preflight_timeout",
                raw.preflight_timeout.as_deref().or(Some("5s")),
            )?,
            watch_error_backoff: super::resource::parse_duration_field(
                "watch_error_backoff",
                raw.watch_error_backoff.as_deref().or(Some("2s")),
            )?,
            global_backend: None,
        })
    }

    pub fn conf_d_dir(&self) -> PathBuf {
        self.conf_dir.join("conf.d")
    }

    pub fn default_for_dir(conf_dir: impl AsRef<Path>) -> Self {
        let conf_dir = conf_dir.as_ref().to_path_buf();
        Self {
            template_dir: conf_dir.join("templates"),
            conf_dir,
            global_prefix: String::new(),
            interval: Duration::from_secs(600),
            watch: false,
            batch_interval: Duration::from_secs(2),
            backend_timeout: Duration::from_secs(10),
            preflight_timeout: Duration::from_secs(5),
            watch_error_backoff: Duration::from_secs(2),
            global_backend: None,
        }
    }
}
