//! Template error types for confd-template.

use thiserror::Error;

/// Errors raised while rendering a resource's template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The source template file does not exist.
    #[error("template not found: {0}")]
    NotFound(String),

    /// Tera failed to parse or execute the template.
    #[error("template rendering failed in '{name}': {source}")]
    Render {
        name: String,
        #[source]
        source: tera::Error,
    },

    /// `include(name)` resolved outside the configured template directory.
    #[error("include '{0}' resolves outside template directory")]
    IncludeOutsideTemplateDir(String),

    /// A template transitively includes itself.
    #[error("cycle detected including '{0}'")]
    IncludeCycle(String),

    /// The include stack exceeded the maximum nesting depth.
    #[error("maximum include depth ({max}) exceeded including '{path}'")]
    IncludeDepthExceeded { path: String, max: usize },

    /// Filesystem I/O failure reading a template file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TemplateError>;
