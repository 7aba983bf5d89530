//! Template Resource state machine (§4.9): fetch → render → stage →
//! validate → diff → swap → check → reload.

use crate::command::{CmdExecutor, CmdExecutorOptions};
use crate::config::ResourceConfig;
use crate::error::Result;
use crate::fetch::BackendFetcher;
use crate::stage::{FileStager, StagerOptions};
use crate::store::{StopSignal, StoreClient};
use crate::validate;
use confd_shared::Store;
use confd_template::TemplateRenderer;
use std::sync::Arc;

/// What `process()` actually did, for callers that need to log or branch
/// on the outcome (batch dedup, preflight, CLI one-shot output).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Rendered output was identical to `dest`; nothing written.
    NoChange,
    /// `dest` was updated (or would have been, under `noop`).
    Updated,
}

/// Drives one resource through a full fetch/render/stage/reload cycle.
/// Owns its `Store` (backend cache) and every stage component; the
/// `StoreClient` itself is shared (via [`crate::cache::ClientCache`])
/// across resources that point at the same backend.
pub struct TemplateResource {
    config: ResourceConfig,
    store: Arc<Store>,
    fetcher: BackendFetcher,
    renderer: TemplateRenderer,
    stager: FileStager,
    cmd_executor: CmdExecutor,
    noop: bool,
}

impl TemplateResource {
    pub fn new(
        config: ResourceConfig,
        client: Arc<dyn StoreClient>,
        template_cache: Arc<confd_template::TemplateCache>,
        backend_timeout: std::time::Duration,
        noop: bool,
        stager_options: StagerOptions,
    ) -> Result<Self> {
        let store = Arc::new(Store::new());
        let prefixed_keys = config.prefixed_keys();

        let fetcher = BackendFetcher::new(
            client,
            store.clone(),
            config.prefix.clone(),
            backend_timeout,
            prefixed_keys,
        );
        let renderer = TemplateRenderer::new(
            config.src.parent().unwrap_or_else(|| std::path::Path::new(".")).to_path_buf(),
            store.clone(),
            template_cache,
        );
        let cmd_executor = CmdExecutor::new(CmdExecutorOptions {
            check_cmd: config.check_cmd.clone(),
            reload_cmd: config.reload_cmd.clone(),
            check_cmd_timeout: config.check_cmd_timeout,
            reload_cmd_timeout: config.reload_cmd_timeout,
            min_reload_interval: config.min_reload_interval,
            sync_only: stager_options.noop,
        })?;

        Ok(Self {
            config,
            store,
            fetcher,
            renderer,
            stager: FileStager::new(stager_options),
            cmd_executor,
            noop,
        })
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        self.fetcher.client()
    }

    /// Run one full cycle. Returns [`ProcessOutcome::NoChange`] without
    /// touching the filesystem if the rendered output already matches
    /// `dest`. `stop` cancels an in-flight `check_cmd`/`reload_cmd`
    /// subprocess (SIGKILL to its process group) without affecting fetch,
    /// render, or stage.
    pub async fn process(&mut self, stop: &mut StopSignal) -> Result<ProcessOutcome> {
        self.fetcher.fetch_values().await?;

        let rendered = self.renderer.render(&self.config.src)?;

        self.stager.set_file_mode(&self.config.dest)?;
        let stage_path = self.stager.create_stage_file(&self.config.dest, &rendered)?;

        let validation = validate::validate_content(
            self.config.output_format.as_deref().unwrap_or(""),
            &rendered,
        );
        if let Err(e) = validation {
            let _ = std::fs::remove_file(&stage_path);
            return Err(e);
        }

        if !self.stager.is_config_changed(&stage_path, &self.config.dest)? {
            let _ = std::fs::remove_file(&stage_path);
            return Ok(ProcessOutcome::NoChange);
        }

        self.stager.show_diff_output(&stage_path, &self.config.dest)?;

        if self.noop {
            let _ = std::fs::remove_file(&stage_path);
            return Ok(ProcessOutcome::Updated);
        }

        let stage_str = stage_path.display().to_string();
        if let Err(e) = self.cmd_executor.execute_check(&stage_str, stop).await {
            let _ = std::fs::remove_file(&stage_path);
            return Err(e);
        }

        self.stager.sync_files(&stage_path, &self.config.dest)?;

        let dest_str = self.config.dest.display().to_string();
        self.cmd_executor.execute_reload(&stage_str, &dest_str, stop).await?;

        Ok(ProcessOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StopHandle, StopSignal};
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn no_stop() -> StopSignal {
        let (handle, signal) = StopHandle::new();
        std::mem::forget(handle);
        signal
    }

    struct StaticClient {
        values: HashMap<String, String>,
    }

    #[async_trait]
    impl StoreClient for StaticClient {
        async fn get_values(&self, _keys: &[String]) -> Result<HashMap<String, String>> {
            Ok(self.values.clone())
        }
        async fn watch_prefix(&self, _p: &str, _k: &[String], last_index: u64, _stop: StopSignal) -> Result<u64> {
            Ok(last_index)
        }
        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn write_resource(dir: &std::path::Path, tmpl_name: &str, dest: &std::path::Path) -> ResourceConfig {
        std::fs::write(dir.join(tmpl_name), "value = {{ getv(key=\"/foo\") }}").unwrap();
        let toml = format!(
            r#"
            [template]
            src = "{}"
            dest = "{}"
            keys = ["foo"]
            "#,
            tmpl_name,
            dest.display()
        );
        ResourceConfig::from_toml(&toml, dir, "").unwrap()
    }

    #[tokio::test]
    async fn process_writes_dest_on_first_run() {
        let tmpl_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("out.conf");
        let config = write_resource(tmpl_dir.path(), "a.tmpl", &dest);

        let mut values = HashMap::new();
        values.insert("/foo".to_string(), "bar".to_string());
        let client: Arc<dyn StoreClient> = Arc::new(StaticClient { values });

        let mut resource = TemplateResource::new(
            config,
            client,
            Arc::new(confd_template::TemplateCache::disabled()),
            std::time::Duration::from_secs(1),
            false,
            StagerOptions::default(),
        )
        .unwrap();

        let outcome = resource.process(&mut no_stop()).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Updated);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "value = bar");
    }

    #[tokio::test]
    async fn process_is_noop_when_unchanged() {
        let tmpl_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("out.conf");
        let config = write_resource(tmpl_dir.path(), "a.tmpl", &dest);

        let mut values = HashMap::new();
        values.insert("/foo".to_string(), "bar".to_string());
        let client: Arc<dyn StoreClient> = Arc::new(StaticClient { values });

        let mut resource = TemplateResource::new(
            config,
            client,
            Arc::new(confd_template::TemplateCache::disabled()),
            std::time::Duration::from_secs(1),
            false,
            StagerOptions::default(),
        )
        .unwrap();

        resource.process(&mut no_stop()).await.unwrap();
        let second = resource.process(&mut no_stop()).await.unwrap();
        assert_eq!(second, ProcessOutcome::NoChange);
    }

    #[tokio::test]
    async fn noop_mode_never_writes_dest() {
        let tmpl_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("out.conf");
        let config = write_resource(tmpl_dir.path(), "a.tmpl", &dest);

        let mut values = HashMap::new();
        values.insert("/foo".to_string(), "bar".to_string());
        let client: Arc<dyn StoreClient> = Arc::new(StaticClient { values });

        let mut resource = TemplateResource::new(
            config,
            client,
            Arc::new(confd_template::TemplateCache::disabled()),
            std::time::Duration::from_secs(1),
            true,
            StagerOptions::default(),
        )
        .unwrap();

        let outcome = resource.process(&mut no_stop()).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Updated);
        assert!(!dest.exists());
    }
}
