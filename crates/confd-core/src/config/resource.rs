//! One `[template]`/`[backend]` resource config file under
//! `<confDir>/conf.d/*.toml` (§6).

use crate::error::{ConfdError, Result};
use confd_shared::{compose_prefix, BackendConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const KNOWN_OUTPUT_FORMATS: &[&str] = &["json", "yaml", "yml", "toml", "xml"];
const KNOWN_BACKEND_TAGS: &[&str] = &[
    "consul",
    "etcd",
    "vault",
    "redis",
    "zookeeper",
    "dynamodb",
    "ssm",
    "acm",
    "secretsmanager",
    "env",
    "file",
];

#[derive(Debug, Deserialize)]
struct RawResourceFile {
    template: RawTemplate,
    backend: Option<RawBackend>,
}

#[derive(Debug, Deserialize)]
struct RawTemplate {
    src: Option<String>,
    dest: Option<String>,
    keys: Option<Vec<String>>,
    #[serde(default)]
    prefix: String,
    mode: Option<String>,
    owner: Option<String>,
    group: Option<String>,
    check_cmd: Option<String>,
    reload_cmd: Option<String>,
    output_format: Option<String>,
    min_reload_interval: Option<String>,
    debounce: Option<String>,
    check_cmd_timeout: Option<String>,
    reload_cmd_timeout: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBackend {
    backend: Option<String>,
    #[serde(default)]
    nodes: Vec<String>,
    scheme: Option<String>,
    username: Option<String>,
    password: Option<String>,
    auth_token: Option<String>,
    #[serde(default)]
    filters: Vec<String>,
    dial_timeout_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    retry_backoff_ms: Option<u64>,
    imds_ttl_ms: Option<u64>,
}

/// A fully validated Template Resource, ready to be driven through
/// [`crate::resource::TemplateResource::process`].
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub keys: Vec<String>,
    pub prefix: String,
    pub mode: Option<u32>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub check_cmd: Option<String>,
    pub reload_cmd: Option<String>,
    pub output_format: Option<String>,
    pub min_reload_interval: Duration,
    pub debounce: Duration,
    pub check_cmd_timeout: Duration,
    pub reload_cmd_timeout: Duration,
    pub backend: Option<BackendConfig>,
}

impl ResourceConfig {
    /// Parse and validate a resource file's TOML source.
    ///
    /// `template_dir` and `global_prefix` are needed to validate `src`
    /// exists and to compose the final `prefix`.
    pub fn from_toml(source: &str, template_dir: &Path, global_prefix: &str) -> Result<Self> {
        let raw: RawResourceFile = toml::from_str(source)
            .map_err(|e| ConfdError::configuration("<toml>", e.to_string()))?;

        let src_rel = raw
            .template
            .src
            .ok_or_else(|| ConfdError::configuration("src", "missing required field"))?;
        let dest_str = raw
            .template
            .dest
            .ok_or_else(|| ConfdError::configuration("dest", "missing required field"))?;
        let keys = raw
            .template
            .keys
            .ok_or_else(|| ConfdError::configuration("keys", "missing required field"))?;

        if keys.is_empty() {
            return Err(ConfdError::configuration("keys", "must be non-empty"));
        }
        for (i, key) in keys.iter().enumerate() {
            if key.is_empty() {
                return Err(ConfdError::configuration(format!("keys[{}]", i), "must not be empty"));
            }
        }

        let src = template_dir.join(&src_rel);
        if !src.is_file() {
            return Err(ConfdError::configuration(
                "src",
                format!("template file not found under template dir: {}", src_rel),
            ));
        }

        let dest = PathBuf::from(&dest_str);
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(ConfdError::configuration(
                    "dest",
                    format!("destination directory does not exist: {}", parent.display()),
                ));
            }
        }

        let mode = match raw.template.mode {
            Some(ref m) => Some(
                u32::from_str_radix(m.trim_start_matches("0o"), 8)
                    .map_err(|_| ConfdError::configuration("mode", format!("not valid octal: {}", m)))?,
            ),
            None => None,
        };

        let output_format = match raw.template.output_format {
            Some(fmt) => {
                if !KNOWN_OUTPUT_FORMATS.contains(&fmt.as_str()) {
                    return Err(ConfdError::configuration("output_format", format!("unknown format: {}", fmt)));
                }
                Some(fmt)
            }
            None => None,
        };

        let min_reload_interval = parse_duration_field("min_reload_interval", raw.template.min_reload_interval.as_deref())?;
        let debounce = parse_duration_field("debounce", raw.template.debounce.as_deref())?;
        let check_cmd_timeout = parse_duration_field("check_cmd_timeout", raw.template.check_cmd_timeout.as_deref())?;
        let reload_cmd_timeout = parse_duration_field("reload_cmd_timeout", raw.template.reload_cmd_timeout.as_deref())?;

        let prefix = compose_prefix(global_prefix, &raw.template.prefix);

        let backend = match raw.backend {
            Some(b) => Some(validate_backend(b)?),
            None => None,
        };

        Ok(Self {
            src,
            dest,
            keys,
            prefix,
            mode,
            owner: raw.template.owner,
            group: raw.template.group,
            check_cmd: raw.template.check_cmd,
            reload_cmd: raw.template.reload_cmd,
            output_format,
            min_reload_interval,
            debounce,
            check_cmd_timeout,
            reload_cmd_timeout,
            backend,
        })
    }

    /// `Prefix` prepended to each of `Keys` (§4.5).
    pub fn prefixed_keys(&self) -> Vec<String> {
        self.keys
            .iter()
            .map(|k| format!("{}/{}", self.prefix.trim_end_matches('/'), k.trim_start_matches('/')))
            .collect()
    }
}

fn validate_backend(raw: RawBackend) -> Result<BackendConfig> {
    let backend = raw
        .backend
        .ok_or_else(|| ConfdError::configuration("backend.backend", "missing required field"))?;

    if !KNOWN_BACKEND_TAGS.contains(&backend.as_str()) {
        return Err(ConfdError::configuration("backend.backend", format!("unknown backend tag: {}", backend)));
    }

    Ok(BackendConfig {
        backend,
        nodes: raw.nodes,
        scheme: raw.scheme,
        username: raw.username,
        password: raw.password,
        auth_token: raw.auth_token,
        filters: raw.filters,
        dial_timeout_ms: raw.dial_timeout_ms,
        read_timeout_ms: raw.read_timeout_ms,
        write_timeout_ms: raw.write_timeout_ms,
        max_retries: raw.max_retries,
        retry_backoff_ms: raw.retry_backoff_ms,
        imds_ttl_ms: raw.imds_ttl_ms,
    })
}

/// Parse a Go-style duration string (`"30s"`, `"2s"`, `"500ms"`, `"1m"`).
pub fn parse_duration_field(field: &str, value: Option<&str>) -> Result<Duration> {
    let value = match value {
        Some(v) => v,
        None => return Ok(Duration::ZERO),
    };

    let (number_part, unit) = value
        .find(|c: char| c.is_alphabetic())
        .map(|idx| value.split_at(idx))
        .ok_or_else(|| ConfdError::configuration(field, format!("invalid duration: {}", value)))?;

    let number: f64 = number_part
        .parse()
        .map_err(|_| ConfdError::configuration(field, format!("invalid duration: {}", value)))?;

    let millis = match unit {
        "ms" => number,
        "s" => number * 1000.0,
        "m" => number * 60_000.0,
        "h" => number * 3_600_000.0,
        other => return Err(ConfdError::configuration(field, format!("unknown duration unit: {}", other))),
    };

    Ok(Duration::from_millis(millis.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_template(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "foo = {{ getv(key=\"/foo\") }}").unwrap();
        path
    }

    #[test]
    fn missing_src_is_a_field_error() {
        let toml = r#"
            [template]
            dest = "/tmp/out"
            keys = ["a"]
        "#;
        let dir = tempfile::tempdir().unwrap();
        let err = ResourceConfig::from_toml(toml, dir.path(), "").unwrap_err();
        match err {
            ConfdError::Configuration { field, .. } => assert_eq!(field, "src"),
            _ => panic!("expected configuration error"),
        }
    }

    #[test]
    fn empty_key_reports_its_index() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "a.tmpl");
        let toml = r#"
            [template]
            src = "a.tmpl"
            dest = "/tmp/out"
            keys = ["a", ""]
        "#;
        let err = ResourceConfig::from_toml(toml, dir.path(), "").unwrap_err();
        match err {
            ConfdError::Configuration { field, .. } => assert_eq!(field, "keys[1]"),
            _ => panic!("expected configuration error"),
        }
    }

    #[test]
    fn unknown_backend_tag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "a.tmpl");
        let toml = r#"
            [template]
            src = "a.tmpl"
            dest = "/tmp/out"
            keys = ["a"]

            [backend]
            backend = "not-a-real-backend"
        "#;
        let err = ResourceConfig::from_toml(toml, dir.path(), "").unwrap_err();
        match err {
            ConfdError::Configuration { field, .. } => assert_eq!(field, "backend.backend"),
            _ => panic!("expected configuration error"),
        }
    }

    #[test]
    fn valid_resource_parses_and_composes_prefix() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "a.tmpl");
        let dest_dir = tempfile::tempdir().unwrap();
        let toml = format!(
            r#"
            [template]
            src = "a.tmpl"
            dest = "{}/out"
            keys = ["foo"]
            prefix = "apps/myapp"
            "#,
            dest_dir.path().display()
        );
        let cfg = ResourceConfig::from_toml(&toml, dir.path(), "env/production").unwrap();
        assert_eq!(cfg.prefix, "/env/production/apps/myapp");
        assert_eq!(cfg.prefixed_keys(), vec!["/env/production/apps/myapp/foo".to_string()]);
    }

    #[test]
    fn duration_parses_seconds_and_milliseconds() {
        assert_eq!(parse_duration_field("d", Some("2s")).unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration_field("d", Some("500ms")).unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration_field("d", None).unwrap(), Duration::ZERO);
    }
}
