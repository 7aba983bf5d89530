//! confd-core — the config-rendering daemon's state machine, backend
//! drivers, and processors.
//!
//! A [`resource::TemplateResource`] drives one `src` template through
//! fetch → render → stage → validate → diff → swap → check → reload.
//! Three [`processor`] disciplines schedule that cycle across a resource
//! set: interval polling, per-resource backend watches, and batched
//! watches. [`cli`] wires the whole thing to a command-line surface.

pub mod cache;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod fetch;
pub mod preflight;
pub mod processor;
pub mod reload;
pub mod resource;
pub mod stage;
pub mod store;
pub mod validate;

pub use cache::{ClientCache, ClientFactory};
pub use config::{load_resource_set, AppConfig, ResourceConfig};
pub use error::{ConfdError, Result};
pub use preflight::{run_preflight, PreflightReport, ResourcePreflight};
pub use processor::{
    batch::BatchWatchProcessor, interval::IntervalProcessor, watch::WatchProcessor, FailureMode, ResourceBuildOptions,
};
pub use reload::{ReloadManager, ReloadSubscription};
pub use resource::{ProcessOutcome, TemplateResource};
pub use stage::StagerOptions;
pub use store::{env::EnvStoreClient, file::FileStoreClient, StopHandle, StopSignal, StoreClient};
