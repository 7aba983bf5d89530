//! Scans `<confDir>/conf.d/*.toml` into a validated resource set (§4.10
//! step 1: "Load resource set ... returns nil if no conf-dir; warn-not-fail").

use super::app::AppConfig;
use super::resource::ResourceConfig;
use crate::error::Result;
use std::path::Path;

/// Load every `*.toml` resource file under `app.conf_d_dir()`.
///
/// Returns an empty set (with a warning logged) if the directory does not
/// exist — a missing conf.d is not fatal, matching the Interval Processor's
/// "warn-not-fail" contract.
pub fn load_resource_set(app: &AppConfig) -> Result<Vec<ResourceConfig>> {
    let conf_d = app.conf_d_dir();
    if !conf_d.is_dir() {
        tracing::warn!(dir = %conf_d.display(), "conf.d directory not found; resource set is empty");
        return Ok(Vec::new());
    }

    let mut resources = Vec::new();
    for entry in walkdir::WalkDir::new(&conf_d).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| crate::error::ConfdError::configuration("<conf.d>", e.to_string()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        resources.push(load_one(path, app)?);
    }

    Ok(resources)
}

fn load_one(path: &Path, app: &AppConfig) -> Result<ResourceConfig> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| crate::error::ConfdError::configuration(path.display().to_string(), e.to_string()))?;
    ResourceConfig::from_toml(&source, &app.template_dir, &app.global_prefix)
}
