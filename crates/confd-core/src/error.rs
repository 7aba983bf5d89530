//! Error taxonomy for the confd core (§7): configuration, backend,
//! rendering, staging/IO, validation, and command failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfdError {
    /// Malformed TOML, missing required field, invalid duration, unknown
    /// backend tag — raised at resource-set load time.
    #[error("configuration error in field '{field}': {message}")]
    Configuration { field: String, message: String },

    /// `GetValues` / `WatchPrefix` / `HealthCheck` failure. Transient by
    /// default; watcher loops retry after `watch_error_backoff`.
    #[error("backend error: {0}")]
    Backend(String),

    /// Template missing, parse error, execution error, or include
    /// cycle/depth/traversal.
    #[error("rendering error: {0}")]
    Rendering(#[from] confd_template::TemplateError),

    /// Create-temp, write, chmod, chown, or rename failure.
    #[error("staging error: {0}")]
    Staging(#[from] std::io::Error),

    /// The format validator rejected the staged bytes.
    #[error("{format} validation failed: {message}")]
    Validation { format: String, message: String },

    /// `check_cmd` failed; render aborts, `dest` left untouched.
    #[error("config check failed: {0}")]
    CheckFailed(String),

    /// `reload_cmd` failed; `dest` already swapped, `lastReloadTime` not
    /// advanced.
    #[error("reload failed: {0}")]
    ReloadFailed(String),

    /// A subprocess exceeded its configured timeout.
    #[error("command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),

    /// The parent context was cancelled while a subprocess was running.
    #[error("command cancelled")]
    CommandCancelled,

    /// A subprocess exited with a non-zero status.
    #[error("command exited with status {code}: {output}")]
    CommandFailed { code: i32, output: String },
}

impl ConfdError {
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub fn validation(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn check_failed(message: impl Into<String>) -> Self {
        Self::CheckFailed(message.into())
    }

    pub fn reload_failed(message: impl Into<String>) -> Self {
        Self::ReloadFailed(message.into())
    }

    pub fn command_failed(code: i32, output: impl Into<String>) -> Self {
        Self::CommandFailed {
            code,
            output: output.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfdError>;
