//! Watch Processor (§4.11): one watcher task per resource, blocked on
//! `StoreClient::watch_prefix`, with an internal stop channel a reload
//! closes to respawn the whole set from disk.

use super::{build_resource_set, ResourceBuildOptions};
use crate::cache::ClientCache;
use crate::config::AppConfig;
use crate::error::Result;
use crate::reload::ReloadSubscription;
use crate::resource::TemplateResource;
use crate::store::{StopHandle, StopSignal};
use confd_template::TemplateCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

pub struct WatchProcessor {
    app: AppConfig,
    client_cache: Arc<ClientCache>,
    template_cache: Arc<TemplateCache>,
    options: ResourceBuildOptions,
}

impl WatchProcessor {
    pub fn new(app: AppConfig, client_cache: Arc<ClientCache>, template_cache: Arc<TemplateCache>, options: ResourceBuildOptions) -> Self {
        Self { app, client_cache, template_cache, options }
    }

    /// Run until `stop` fires. A reload closes the internal stop signal
    /// (unblocking every watcher at its next suspension point), waits for
    /// them to exit, reloads the resource set from disk, and re-spawns.
    pub async fn run(&self, mut stop: StopSignal, mut reload: ReloadSubscription) -> Result<()> {
        loop {
            if stop.is_set() {
                return Ok(());
            }

            let resources = build_resource_set(&self.app, &self.client_cache, &self.template_cache, &self.options)?;
            let (internal_handle, internal_signal) = StopHandle::new();
            let watch_error_backoff = self.app.watch_error_backoff;

            let tasks: Vec<_> = resources
                .into_iter()
                .map(|resource| {
                    let signal = internal_signal.clone();
                    tokio::spawn(run_resource_watcher(resource, signal, watch_error_backoff))
                })
                .collect();

            tokio::select! {
                _ = stop.cancelled() => {
                    internal_handle.stop();
                    for task in tasks {
                        let _ = task.await;
                    }
                    return Ok(());
                }
                _ = reload.changed() => {
                    internal_handle.stop();
                    for task in tasks {
                        let _ = task.await;
                    }
                    continue;
                }
            }
        }
    }
}

/// One resource's watcher: block on `watch_prefix`, collapse a burst of
/// changes within `debounce` into a single `process()`, repeat.
async fn run_resource_watcher(mut resource: TemplateResource, mut stop: StopSignal, watch_error_backoff: Duration) {
    let client = resource.client().clone();
    let prefix = resource.config().prefix.clone();
    let keys = resource.config().prefixed_keys();
    let debounce = resource.config().debounce;
    let dest = resource.config().dest.display().to_string();
    let mut last_index = 0u64;

    loop {
        if stop.is_set() {
            return;
        }

        match client.watch_prefix(&prefix, &keys, last_index, stop.clone()).await {
            Err(e) => {
                if stop.is_set() {
                    return;
                }
                tracing::error!(dest = %dest, error = %e, "watch error; backing off");
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = sleep(watch_error_backoff) => {}
                }
                continue;
            }
            Ok(index) => last_index = index,
        }

        if !debounce.is_zero() {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    result = client.watch_prefix(&prefix, &keys, last_index, stop.clone()) => {
                        match result {
                            Ok(index) => {
                                last_index = index;
                                continue;
                            }
                            Err(_) => break,
                        }
                    }
                    _ = sleep(debounce) => break,
                }
            }
        }

        if stop.is_set() {
            return;
        }
        if let Err(e) = resource.process(&mut stop).await {
            tracing::error!(dest = %dest, error = %e, "resource process failed");
        }
    }
}
