//! The `StoreClient` capability set (§6) and its concrete drivers.

pub mod env;
pub mod file;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::watch;

/// Cooperative stop signal passed into `watch_prefix`; cloned and handed to
/// every resource watcher so a reload or shutdown can unblock all of them
/// at once (§4.11).
#[derive(Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    /// Resolve once the paired [`StopHandle`] signals stop. A `StopSignal`
    /// that outlives its handle resolves immediately (closed channel reads
    /// as "stop").
    pub async fn cancelled(&mut self) {
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }

    pub fn is_set(&self) -> bool {
        *self.0.borrow()
    }
}

/// Owner-side handle for a [`StopSignal`].
pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    pub fn new() -> (Self, StopSignal) {
        let (tx, rx) = watch::channel(false);
        (Self(tx), StopSignal(rx))
    }

    pub fn stop(&self) {
        let _ = self.0.send(true);
    }
}

/// Capability set every backend driver implements (§6).
///
/// `GetValues`/`WatchPrefix`/`HealthCheck` take `&self` rather than a
/// context parameter: cancellation flows through `tokio::select!` at the
/// call site (parent cancellation) and through `StopSignal` (reload/stop)
/// for `watch_prefix` specifically, matching this crate's cooperative
/// cancellation model (§5).
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Fetch the current value of every key in `keys`. Keys absent from
    /// the backend are simply absent from the returned map.
    async fn get_values(&self, keys: &[String]) -> Result<HashMap<String, String>>;

    /// Block until a change under `prefix` affecting one of `keys` is
    /// observed, `stop` is signalled, or an error occurs. Returns a new
    /// opaque index `>= last_index`.
    async fn watch_prefix(
        &self,
        prefix: &str,
        keys: &[String],
        last_index: u64,
        stop: StopSignal,
    ) -> Result<u64>;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> Result<()>;

    /// Release any held resources (connections, file handles, …).
    async fn close(&self) -> Result<()>;
}
