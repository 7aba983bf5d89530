//! Batch Watch Processor (§4.12): watchers push change events onto a
//! shared channel; a single coordinator deduplicates by dest and sweeps
//! the pending set on a batch timer, draining synchronously on shutdown.

use super::{build_resource_set, process_indices, FailureMode, ResourceBuildOptions};
use crate::cache::ClientCache;
use crate::config::AppConfig;
use crate::error::Result;
use crate::reload::ReloadSubscription;
use crate::store::{StopHandle, StopSignal, StoreClient};
use confd_template::TemplateCache;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

const CHANGE_CHANNEL_CAPACITY: usize = 100;

pub struct BatchWatchProcessor {
    app: AppConfig,
    client_cache: Arc<ClientCache>,
    template_cache: Arc<TemplateCache>,
    options: ResourceBuildOptions,
    failure_mode: FailureMode,
}

impl BatchWatchProcessor {
    pub fn new(
        app: AppConfig,
        client_cache: Arc<ClientCache>,
        template_cache: Arc<TemplateCache>,
        options: ResourceBuildOptions,
        failure_mode: FailureMode,
    ) -> Self {
        Self { app, client_cache, template_cache, options, failure_mode }
    }

    pub async fn run(&self, mut stop: StopSignal, mut reload: ReloadSubscription) -> Result<()> {
        loop {
            if stop.is_set() {
                return Ok(());
            }

            let mut resources = build_resource_set(&self.app, &self.client_cache, &self.template_cache, &self.options)?;
            let dest_index: HashMap<String, usize> = resources
                .iter()
                .enumerate()
                .map(|(i, r)| (r.config().dest.display().to_string(), i))
                .collect();

            let (internal_handle, internal_signal) = StopHandle::new();
            let (tx, mut rx) = mpsc::channel::<String>(CHANGE_CHANNEL_CAPACITY);
            let watch_error_backoff = self.app.watch_error_backoff;
            let batch_interval = self.app.batch_interval;

            let detectors: Vec<_> = resources
                .iter()
                .map(|r| {
                    (
                        r.client().clone(),
                        r.config().prefix.clone(),
                        r.config().prefixed_keys(),
                        r.config().dest.display().to_string(),
                    )
                })
                .map(|(client, prefix, keys, dest)| {
                    let signal = internal_signal.clone();
                    let tx = tx.clone();
                    tokio::spawn(run_detector(client, prefix, keys, dest, signal, tx, watch_error_backoff))
                })
                .collect();
            drop(tx);

            let mut pending: HashSet<String> = HashSet::new();
            let mut deadline: Option<Instant> = None;

            let reloaded = 'coordinator: loop {
                tokio::select! {
                    biased;

                    _ = stop.cancelled() => {
                        drain(&mut resources, &dest_index, &pending, self.failure_mode, &stop).await;
                        internal_handle.stop();
                        for d in detectors { let _ = d.await; }
                        return Ok(());
                    }
                    _ = reload.changed() => {
                        drain(&mut resources, &dest_index, &pending, self.failure_mode, &stop).await;
                        break 'coordinator true;
                    }
                    Some(dest) = rx.recv() => {
                        pending.insert(dest);
                        if deadline.is_none() {
                            deadline = Some(Instant::now() + batch_interval);
                        }
                    }
                    _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                        process_indices(&mut resources, &index_list(&dest_index, &pending), self.failure_mode, &stop).await;
                        pending.clear();
                        deadline = None;
                    }
                }
            };

            internal_handle.stop();
            for d in detectors {
                let _ = d.await;
            }

            if !reloaded {
                return Ok(());
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        sleep(deadline.saturating_duration_since(Instant::now())).await;
    } else {
        std::future::pending::<()>().await;
    }
}

fn index_list(dest_index: &HashMap<String, usize>, pending: &HashSet<String>) -> Vec<usize> {
    pending.iter().filter_map(|d| dest_index.get(d).copied()).collect()
}

async fn drain(
    resources: &mut [crate::resource::TemplateResource],
    dest_index: &HashMap<String, usize>,
    pending: &HashSet<String>,
    failure_mode: FailureMode,
    stop: &StopSignal,
) {
    if pending.is_empty() {
        return;
    }
    process_indices(resources, &index_list(dest_index, pending), failure_mode, stop).await;
}

async fn run_detector(
    client: Arc<dyn StoreClient>,
    prefix: String,
    keys: Vec<String>,
    dest: String,
    mut stop: StopSignal,
    tx: mpsc::Sender<String>,
    watch_error_backoff: Duration,
) {
    let mut last_index = 0u64;
    loop {
        if stop.is_set() {
            return;
        }
        match client.watch_prefix(&prefix, &keys, last_index, stop.clone()).await {
            Err(_) => {
                if stop.is_set() {
                    return;
                }
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = sleep(watch_error_backoff) => {}
                }
            }
            Ok(index) => {
                last_index = index;
                if tx.send(dest.clone()).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ClientFactory;
    use crate::stage::StagerOptions;
    use async_trait::async_trait;
    use confd_shared::BackendConfig;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct OneShotClient(AtomicU64);

    #[async_trait]
    impl StoreClient for OneShotClient {
        async fn get_values(&self, keys: &[String]) -> Result<StdHashMap<String, String>> {
            Ok(keys.iter().map(|k| (k.clone(), "v".to_string())).collect())
        }
        async fn watch_prefix(&self, _p: &str, _k: &[String], last_index: u64, mut stop: StopSignal) -> Result<u64> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(last_index + 1);
            }
            stop.cancelled().await;
            Err(crate::error::ConfdError::backend("stopped"))
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct StubFactory(Arc<OneShotClient>);
    impl ClientFactory for StubFactory {
        fn create(&self, _cfg: &BackendConfig) -> Result<Arc<dyn StoreClient>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn batch_sweep_renders_pending_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = AppConfig::default_for_dir(dir.path());
        app.batch_interval = Duration::from_millis(20);
        std::fs::create_dir_all(app.conf_d_dir()).unwrap();
        std::fs::create_dir_all(&app.template_dir).unwrap();
        std::fs::write(app.template_dir.join("a.tmpl"), "v = {{ getv(key=\"/a\") }}").unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("out.conf");
        std::fs::write(
            app.conf_d_dir().join("one.toml"),
            format!("[template]\nsrc = \"a.tmpl\"\ndest = \"{}\"\nkeys = [\"a\"]\n", dest.display()),
        )
        .unwrap();
        app.global_backend = Some(BackendConfig {
            backend: "file".to_string(),
            nodes: vec![],
            scheme: None,
            username: None,
            password: None,
            auth_token: None,
            filters: vec![],
            dial_timeout_ms: None,
            read_timeout_ms: None,
            write_timeout_ms: None,
            max_retries: None,
            retry_backoff_ms: None,
            imds_ttl_ms: None,
        });

        let client = Arc::new(OneShotClient(AtomicU64::new(0)));
        let client_cache = Arc::new(ClientCache::new(Arc::new(StubFactory(client))));
        let template_cache = Arc::new(TemplateCache::disabled());
        let reload_manager = crate::reload::ReloadManager::new(template_cache.clone());
        let reload_sub = reload_manager.subscribe();

        let processor = BatchWatchProcessor::new(
            app,
            client_cache,
            template_cache,
            ResourceBuildOptions { noop: false, stager_options: StagerOptions::default() },
            FailureMode::BestEffort,
        );

        let (stop_handle, stop_signal) = StopHandle::new();
        let run = tokio::spawn(async move { processor.run(stop_signal, reload_sub).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_handle.stop();
        run.await.unwrap().unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "v = v");
    }
}
