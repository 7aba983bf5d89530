//! The template renderer (§4.4): `render(src_path) → bytes`.
//!
//! A render constructs a fresh [`IncludeContext`], installs the full
//! function set on a fresh `Tera` instance (store-query functions, the
//! auxiliary helpers, then `include` last), and executes. Store queries
//! never go through the renderer directly — they close over the
//! per-resource `Store` inside the function set, so the renderer itself
//! never touches the backend.

use crate::cache::TemplateCache;
use crate::error::{Result, TemplateError};
use crate::functions::register_functions;
use crate::include::{resolve_include_path, IncludeContext, IncludeGuard};
use confd_shared::Store;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tera::{Function, Tera, Value};

const TOP_LEVEL_TEMPLATE_NAME: &str = "__root__";

/// Renders one template file against one resource's [`Store`].
pub struct TemplateRenderer {
    template_dir: PathBuf,
    store: Arc<Store>,
    cache: Arc<TemplateCache>,
}

impl TemplateRenderer {
    pub fn new(template_dir: PathBuf, store: Arc<Store>, cache: Arc<TemplateCache>) -> Self {
        Self {
            template_dir,
            store,
            cache,
        }
    }

    /// Render `src_path` (a file under `template_dir`) to bytes.
    pub fn render(&self, src_path: &Path) -> Result<Vec<u8>> {
        if !src_path.is_file() {
            return Err(TemplateError::NotFound(src_path.display().to_string()));
        }

        let source = self.load_source(src_path)?;
        let include_ctx = Arc::new(IncludeContext::new());

        self.render_source(&source, src_path, &include_ctx, &tera::Context::new())
    }

    /// Render `source` under a Tera name derived from `path`, with a fully
    /// populated function set (store queries, helpers, `include` last).
    /// `data` seeds the render's context — empty for the top-level render,
    /// built from `include(name, data)`'s `data` argument for a nested one.
    fn render_source(&self, source: &str, path: &Path, include_ctx: &Arc<IncludeContext>, data: &tera::Context) -> Result<Vec<u8>> {
        let mut tera = Tera::default();
        register_functions(&mut tera, self.store.clone());
        tera.register_function(
            "include",
            IncludeFunction {
                template_dir: self.template_dir.clone(),
                store: self.store.clone(),
                cache: self.cache.clone(),
                include_ctx: include_ctx.clone(),
            },
        );

        tera.add_raw_template(TOP_LEVEL_TEMPLATE_NAME, source)
            .map_err(|source| TemplateError::Render {
                name: path.display().to_string(),
                source,
            })?;

        let rendered = tera
            .render(TOP_LEVEL_TEMPLATE_NAME, data)
            .map_err(|source| TemplateError::Render {
                name: path.display().to_string(),
                source,
            })?;

        Ok(rendered.into_bytes())
    }

    /// Read `path`'s content, through the cache when the mtime matches.
    fn load_source(&self, path: &Path) -> Result<String> {
        if let Some(cached) = self.cache.get(path) {
            return Ok(cached);
        }

        tracing::debug!(path = %path.display(), "template cache miss; reading from disk");
        let content = fs::read_to_string(path)?;
        if let Ok(mtime) = fs::metadata(path).and_then(|m| m.modified()) {
            self.cache.put(path, &content, mtime);
        }
        Ok(content)
    }
}

/// `include(name, data?)` (§4.3). Installed last so nested renders see an
/// identical function set to the enclosing render, except for a fresh
/// `include` closing over the same [`IncludeContext`].
struct IncludeFunction {
    template_dir: PathBuf,
    store: Arc<Store>,
    cache: Arc<TemplateCache>,
    include_ctx: Arc<IncludeContext>,
}

impl Function for IncludeFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let name = args
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| tera::Error::msg("include() requires a 'name' argument"))?;

        let resolved = resolve_include_path(&self.template_dir, name).map_err(|e| tera::Error::msg(e.to_string()))?;
        let _guard = IncludeGuard::push(&self.include_ctx, resolved.clone()).map_err(|e| tera::Error::msg(e.to_string()))?;

        let data = match args.get("data") {
            Some(value) => tera::Context::from_value(value.clone())?,
            None => tera::Context::new(),
        };

        let renderer = TemplateRenderer::new(self.template_dir.clone(), self.store.clone(), self.cache.clone());
        let source = renderer
            .load_source(&resolved)
            .map_err(|e| tera::Error::msg(e.to_string()))?;

        let bytes = renderer
            .render_source(&source, &resolved, &self.include_ctx, &data)
            .map_err(|e| tera::Error::msg(e.to_string()))?;

        let text = String::from_utf8(bytes)
            .map_err(|e| tera::Error::msg(format!("include() output is not UTF-8: {}", e)))?;

        Ok(Value::String(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TemplateCache;

    fn renderer_in(dir: &Path, store: Arc<Store>) -> TemplateRenderer {
        TemplateRenderer::new(dir.to_path_buf(), store, Arc::new(TemplateCache::default_bounded()))
    }

    #[test]
    fn renders_plain_text_without_functions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tmpl");
        fs::write(&path, "hello world").unwrap();

        let renderer = renderer_in(dir.path(), Arc::new(Store::new()));
        let out = renderer.render(&path).unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn renders_getv_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tmpl");
        fs::write(&path, "foo = {{ getv(key=\"/foo\") }}").unwrap();

        let store = Store::new();
        store.replace([("/foo".to_string(), "bar".to_string())]);

        let renderer = renderer_in(dir.path(), Arc::new(store));
        let out = renderer.render(&path).unwrap();
        assert_eq!(out, b"foo = bar");
    }

    #[test]
    fn missing_source_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = renderer_in(dir.path(), Arc::new(Store::new()));
        let err = renderer.render(&dir.path().join("missing.tmpl")).unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(_)));
    }

    #[test]
    fn include_renders_nested_template() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("header.tmpl"), "HEADER").unwrap();
        let main_path = dir.path().join("main.tmpl");
        fs::write(&main_path, "{{ include(name=\"header.tmpl\") }}-BODY").unwrap();

        let renderer = renderer_in(dir.path(), Arc::new(Store::new()));
        let out = renderer.render(&main_path).unwrap();
        assert_eq!(out, b"HEADER-BODY");
    }

    #[test]
    fn include_passes_data_into_nested_context() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("header.tmpl"), "Hello {{ name }}").unwrap();
        let main_path = dir.path().join("main.tmpl");
        fs::write(&main_path, "{{ include(name=\"header.tmpl\", data={\"name\": \"world\"}) }}").unwrap();

        let renderer = renderer_in(dir.path(), Arc::new(Store::new()));
        let out = renderer.render(&main_path).unwrap();
        assert_eq!(out, b"Hello world");
    }

    #[test]
    fn include_self_cycle_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tmpl");
        fs::write(&path, "{{ include(name=\"a.tmpl\") }}").unwrap();

        let renderer = renderer_in(dir.path(), Arc::new(Store::new()));
        assert!(renderer.render(&path).is_err());
    }

    #[test]
    fn include_outside_template_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tmpl");
        fs::write(&path, "{{ include(name=\"../outside.tmpl\") }}").unwrap();

        let renderer = renderer_in(dir.path(), Arc::new(Store::new()));
        assert!(renderer.render(&path).is_err());
    }
}
