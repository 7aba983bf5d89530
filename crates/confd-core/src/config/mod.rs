//! Configuration model: process-wide [`app::AppConfig`], per-resource
//! [`resource::ResourceConfig`], and the [`loader`] that scans `conf.d`.

pub mod app;
pub mod loader;
pub mod resource;

pub use app::AppConfig;
pub use loader::load_resource_set;
pub use resource::ResourceConfig;
