//! Command-line surface (§4 "CLI surface (collaborator)"): wires
//! `AppConfig`, the `ClientCache`, and one of the three processors (or a
//! one-shot run) to `clap`.

use crate::cache::{ClientCache, ClientFactory};
use crate::config::AppConfig;
use crate::error::{ConfdError, Result};
use crate::processor::{BatchWatchProcessor, FailureMode, IntervalProcessor, ResourceBuildOptions, WatchProcessor};
use crate::reload::ReloadManager;
use crate::stage::StagerOptions;
use crate::store::{env::EnvStoreClient, file::FileStoreClient, StopHandle, StoreClient};
use clap::{Parser, Subcommand};
use confd_shared::BackendConfig;
use confd_template::TemplateCache;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "confd")]
#[command(about = "Renders configuration templates from a backend key/value store")]
#[command(version, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Base directory containing `conf.d/` and `templates/` (defaults to `/etc/confd`)
    #[arg(short = 'c', long, global = true)]
    pub conf_dir: Option<PathBuf>,

    /// Render and write, but skip `check_cmd`/`reload_cmd`
    #[arg(long, global = true)]
    pub sync_only: bool,

    /// Don't write anything; just report whether `dest` would change
    #[arg(long, global = true)]
    pub noop: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render every resource exactly once and exit.
    Onetime,
    /// Re-render the resource set on a fixed interval.
    Interval {
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Re-render resources as their backend keys change.
    Watch,
    /// Like `watch`, but coalesces concurrent changes into periodic batches.
    BatchWatch,
    /// One-shot backend connectivity and key-presence diagnostic.
    Preflight,
    /// Parse-check every resource's `output_format` without fetching or rendering.
    Validate,
}

pub fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

struct DefaultClientFactory;

impl ClientFactory for DefaultClientFactory {
    fn create(&self, cfg: &BackendConfig) -> Result<Arc<dyn StoreClient>> {
        match cfg.backend.as_str() {
            "file" => {
                let path = cfg
                    .nodes
                    .first()
                    .ok_or_else(|| ConfdError::configuration("backend.nodes", "'file' backend requires one path in nodes[0]"))?;
                Ok(Arc::new(FileStoreClient::new(path)))
            }
            "env" => Ok(Arc::new(EnvStoreClient::new())),
            other => Err(ConfdError::configuration(
                "backend.backend",
                format!("no client implementation registered for backend '{}' in this build", other),
            )),
        }
    }
}

/// Entry point for the `confd` binary.
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut app = match &cli.conf_dir {
        Some(dir) => AppConfig::default_for_dir(dir),
        None => AppConfig::default_for_dir("/etc/confd"),
    };
    if let Ok(source) = std::fs::read_to_string(app.conf_dir.join("confd.toml")) {
        app = AppConfig::from_toml(&source)?;
    }

    let client_cache = Arc::new(ClientCache::new(Arc::new(DefaultClientFactory)));
    let template_cache = Arc::new(TemplateCache::default_bounded());
    let options = ResourceBuildOptions {
        noop: cli.noop,
        stager_options: StagerOptions {
            noop: cli.sync_only,
            show_diff: true,
            ..StagerOptions::default()
        },
    };

    match cli.command {
        Commands::Onetime => {
            let mut resources = crate::processor::build_resource_set(&app, &client_cache, &template_cache, &options)?;
            let (stop_handle, stop_signal) = StopHandle::new();
            install_signal_handlers(stop_handle);
            let outcome = crate::processor::process_set(&mut resources, FailureMode::BestEffort, &stop_signal).await;
            if outcome.has_failures() {
                return Err(ConfdError::backend(format!("{} of {} resources failed", outcome.failed, outcome.total)));
            }
            Ok(())
        }
        Commands::Interval { seconds } => {
            if let Some(seconds) = seconds {
                app.interval = std::time::Duration::from_secs(seconds);
            }
            let reload_manager = ReloadManager::new(template_cache.clone());
            let reload_sub = reload_manager.subscribe();
            let (stop_handle, stop_signal) = StopHandle::new();
            install_signal_handlers(stop_handle);

            let processor = IntervalProcessor::new(app, client_cache, template_cache, options, FailureMode::BestEffort);
            processor.run(stop_signal, reload_sub).await
        }
        Commands::Watch => {
            let reload_manager = ReloadManager::new(template_cache.clone());
            let reload_sub = reload_manager.subscribe();
            let (stop_handle, stop_signal) = StopHandle::new();
            install_signal_handlers(stop_handle);

            let processor = WatchProcessor::new(app, client_cache, template_cache, options);
            processor.run(stop_signal, reload_sub).await
        }
        Commands::BatchWatch => {
            let reload_manager = ReloadManager::new(template_cache.clone());
            let reload_sub = reload_manager.subscribe();
            let (stop_handle, stop_signal) = StopHandle::new();
            install_signal_handlers(stop_handle);

            let processor = BatchWatchProcessor::new(app, client_cache, template_cache, options, FailureMode::BestEffort);
            processor.run(stop_signal, reload_sub).await
        }
        Commands::Preflight => {
            let report = crate::preflight::run_preflight(&app, &client_cache, &DefaultClientFactory).await?;
            for resource in &report.resources {
                if let Some(error) = &resource.backend_error {
                    tracing::error!(dest = %resource.dest, error = %error, "preflight failed");
                } else if !resource.missing_keys.is_empty() {
                    tracing::warn!(dest = %resource.dest, missing = ?resource.missing_keys, "preflight: keys missing");
                }
            }
            if report.success() {
                Ok(())
            } else {
                Err(ConfdError::backend("preflight reported backend errors"))
            }
        }
        Commands::Validate => {
            // Loads and field-validates every resource config (spec §6's
            // rules, enforced in `ResourceConfig::from_toml`) without
            // touching any backend or destination.
            let resources = crate::config::load_resource_set(&app)?;
            tracing::info!(count = resources.len(), "all resource configs are valid");
            Ok(())
        }
    }
}

/// Unix: translate SIGTERM/SIGINT into the cooperative [`StopHandle`].
/// Non-Unix builds rely on `Ctrl+C` alone via `tokio::signal::ctrl_c`.
fn install_signal_handlers(stop_handle: StopHandle) {
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        stop_handle.stop();
    });
}
