//! confd-template — Tera-based rendering of resource templates.
//!
//! Owns the render pipeline described by the Template Resource state
//! machine's render step: the [`cache::TemplateCache`], the per-render
//! [`include::IncludeContext`], the store-backed [`functions`], and the
//! [`renderer::TemplateRenderer`] that ties them together.

pub mod cache;
pub mod error;
pub mod functions;
pub mod include;
pub mod renderer;

pub use cache::{CacheStats, EvictionPolicy, TemplateCache};
pub use error::{Result, TemplateError};
pub use include::{IncludeContext, MAX_INCLUDE_DEPTH};
pub use renderer::TemplateRenderer;
