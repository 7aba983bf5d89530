//! Process-wide caches: the backend-connection [`client_cache`].

pub mod client_cache;

pub use client_cache::{ClientCache, ClientFactory};
