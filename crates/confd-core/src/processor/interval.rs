//! Interval Processor (§4.10): a single loop — load, process the whole
//! set once, then wait for the earliest of stop/reload/interval-elapsed.

use super::{build_resource_set, process_set, BatchProcessResult, FailureMode, ResourceBuildOptions};
use crate::cache::ClientCache;
use crate::config::AppConfig;
use crate::error::Result;
use crate::reload::ReloadSubscription;
use crate::store::StopSignal;
use confd_template::TemplateCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

pub struct IntervalProcessor {
    app: AppConfig,
    client_cache: Arc<ClientCache>,
    template_cache: Arc<TemplateCache>,
    options: ResourceBuildOptions,
    failure_mode: FailureMode,
    interval: Duration,
}

impl IntervalProcessor {
    pub fn new(
        app: AppConfig,
        client_cache: Arc<ClientCache>,
        template_cache: Arc<TemplateCache>,
        options: ResourceBuildOptions,
        failure_mode: FailureMode,
    ) -> Self {
        let interval = app.interval;
        Self {
            app,
            client_cache,
            template_cache,
            options,
            failure_mode,
            interval,
        }
    }

    /// Run until `stop` fires. Reloads discard the in-memory resource set
    /// and reread it from disk before the next cycle.
    pub async fn run(&self, mut stop: StopSignal, mut reload: ReloadSubscription) -> Result<()> {
        loop {
            if stop.is_set() {
                return Ok(());
            }

            let mut resources = super::build_resource_set(&self.app, &self.client_cache, &self.template_cache, &self.options)?;
            let outcome = process_set(&mut resources, self.failure_mode, &stop).await;
            log_cycle(&outcome);

            tokio::select! {
                _ = stop.cancelled() => return Ok(()),
                _ = reload.changed() => continue,
                _ = sleep(self.interval) => continue,
            }
        }
    }
}

fn log_cycle(outcome: &BatchProcessResult) {
    tracing::info!(
        total = outcome.total,
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        "interval cycle complete"
    );
}
