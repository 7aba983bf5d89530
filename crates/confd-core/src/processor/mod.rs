//! Processor subsystem (§4.10–§4.12): the three scheduling disciplines
//! that drive a resource set's `process()` cycle — Interval, Watch, and
//! BatchWatch.

pub mod batch;
pub mod interval;
pub mod watch;

use crate::cache::ClientCache;
use crate::config::{load_resource_set, AppConfig};
use crate::error::{ConfdError, Result};
use crate::resource::TemplateResource;
use crate::stage::StagerOptions;
use crate::store::StopSignal;
use confd_template::TemplateCache;
use std::sync::Arc;
use std::time::Duration;

/// Whether a processing cycle keeps going after one resource errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Log and aggregate every resource's error; always process the full set.
    #[default]
    BestEffort,
    /// Stop at the first resource error, leaving the rest of the set unprocessed.
    FailFast,
}

/// One resource's outcome within a processing cycle.
#[derive(Debug)]
pub struct ResourceResult {
    pub dest: String,
    pub result: crate::error::Result<crate::resource::ProcessOutcome>,
}

/// Aggregate result of running every resource in a set through one cycle.
#[derive(Debug, Default)]
pub struct BatchProcessResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ResourceResult>,
}

impl BatchProcessResult {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Run `process()` on each of `resources` in order, respecting
/// `failure_mode`. Resource order is preserved and each resource runs to
/// completion before the next starts (§5: "process() calls are serialized").
/// `stop` is cloned per resource and lets an in-flight `check_cmd`/
/// `reload_cmd` subprocess be cancelled (SIGKILL to its process group)
/// without aborting the rest of the cycle.
pub async fn process_set(resources: &mut [TemplateResource], failure_mode: FailureMode, stop: &StopSignal) -> BatchProcessResult {
    let mut out = BatchProcessResult {
        total: resources.len(),
        ..Default::default()
    };

    for resource in resources.iter_mut() {
        let dest = resource.config().dest.display().to_string();
        let result = resource.process(&mut stop.clone()).await;
        let failed = result.is_err();

        if failed {
            tracing::error!(dest = %dest, error = %result.as_ref().unwrap_err(), "resource process failed");
            out.failed += 1;
        } else {
            out.succeeded += 1;
        }

        out.results.push(ResourceResult { dest, result });

        if failed && failure_mode == FailureMode::FailFast {
            break;
        }
    }

    out
}

/// Run `process()` on exactly the resources at `indices`, in order. Used
/// by the Batch Watch Processor to sweep the deduplicated pending set on
/// timer fire (and to drain it synchronously on shutdown).
pub async fn process_indices(
    resources: &mut [TemplateResource],
    indices: &[usize],
    failure_mode: FailureMode,
    stop: &StopSignal,
) -> BatchProcessResult {
    let mut out = BatchProcessResult {
        total: indices.len(),
        ..Default::default()
    };

    for &idx in indices {
        let resource = &mut resources[idx];
        let dest = resource.config().dest.display().to_string();
        let result = resource.process(&mut stop.clone()).await;
        let failed = result.is_err();

        if failed {
            tracing::error!(dest = %dest, error = %result.as_ref().unwrap_err(), "resource process failed");
            out.failed += 1;
        } else {
            out.succeeded += 1;
        }

        out.results.push(ResourceResult { dest, result });

        if failed && failure_mode == FailureMode::FailFast {
            break;
        }
    }

    out
}

/// Backoff slept between failed watch/health iterations before retrying.
pub const DEFAULT_WATCH_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Shared construction options every processor passes down to each
/// [`TemplateResource`] it builds.
#[derive(Clone)]
pub struct ResourceBuildOptions {
    pub noop: bool,
    pub stager_options: StagerOptions,
}

/// Load the resource set from disk and build one [`TemplateResource`] per
/// entry, resolving each one's backend client through `client_cache`
/// (falling back to `app.global_backend`). Mirrors step 1 of the Interval
/// Processor loop: an absent conf-dir yields an empty, not erroring, set.
pub fn build_resource_set(
    app: &AppConfig,
    client_cache: &ClientCache,
    template_cache: &Arc<TemplateCache>,
    options: &ResourceBuildOptions,
) -> Result<Vec<TemplateResource>> {
    let configs = load_resource_set(app)?;
    let mut resources = Vec::with_capacity(configs.len());

    for config in configs {
        let backend_cfg = config
            .backend
            .clone()
            .or_else(|| app.global_backend.clone())
            .ok_or_else(|| {
                ConfdError::configuration("backend", format!("no backend configured for '{}'", config.dest.display()))
            })?;
        let client = client_cache.get_or_create(&backend_cfg)?;

        resources.push(TemplateResource::new(
            config,
            client,
            template_cache.clone(),
            app.backend_timeout,
            options.noop,
            options.stager_options.clone(),
        )?);
    }

    Ok(resources)
}
