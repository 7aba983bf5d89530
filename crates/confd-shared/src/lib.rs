//! confd-shared — data types shared between `confd-template` and
//! `confd-core`: the per-resource [`Store`] and the backend-connection
//! equivalence model ([`BackendConfig`]).

pub mod backend;
pub mod store;

pub use backend::BackendConfig;
pub use store::{compose_prefix, normalize_key, Store};
