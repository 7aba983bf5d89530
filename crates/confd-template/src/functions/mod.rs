//! Store-backed template functions (§6, "Template extensions installed
//! into the user templating language").
//!
//! Every function here closes over the resource's [`confd_shared::Store`]
//! and is re-registered on a fresh `Tera` instance for each render (see
//! [`crate::renderer`]) — there is no engine-lifetime state to share.

pub mod helpers;

use confd_shared::Store;
use std::collections::HashMap;
use std::sync::Arc;
use tera::{Function, Tera, Value};

/// Register the store-query functions and the auxiliary helpers on `tera`.
/// `include` is registered separately, last, by the renderer (§4.4).
pub fn register_functions(tera: &mut Tera, store: Arc<Store>) {
    tera.register_function("getv", GetvFunction { store: store.clone() });
    tera.register_function("gets", GetsFunction { store: store.clone() });
    tera.register_function("getvs", GetvsFunction { store: store.clone() });
    tera.register_function("ls", LsFunction { store: store.clone() });
    tera.register_function("lsdir", LsFunction { store: store.clone() });
    tera.register_function("exists", ExistsFunction { store: store.clone() });
    tera.register_function("get", GetFunction { store: store.clone() });
    tera.register_function("getall", GetallFunction { store });

    helpers::register_helpers(tera);
}

fn required_key(args: &HashMap<String, Value>, fn_name: &str) -> tera::Result<String> {
    args.get("key")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| tera::Error::msg(format!("{}() requires a 'key' argument", fn_name)))
}

/// `getv(key [, default])` — the value at `key`, or `default` if given and
/// the key is absent; an error if absent and no default was given.
struct GetvFunction {
    store: Arc<Store>,
}

impl Function for GetvFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let key = required_key(args, "getv")?;
        match self.store.get(&key) {
            Some(v) => Ok(Value::String(v)),
            None => match args.get("default").and_then(|v| v.as_str()) {
                Some(default) => Ok(Value::String(default.to_string())),
                None => Err(tera::Error::msg(format!("key '{}' not found", key))),
            },
        }
    }
}

/// `gets(pattern)` — key/value objects whose key starts with `pattern`.
struct GetsFunction {
    store: Arc<Store>,
}

impl Function for GetsFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let pattern = required_key(args, "gets")?;
        let pairs = self.store.get_all_values(&pattern);
        if pairs.is_empty() {
            return Err(tera::Error::msg(format!("no keys matching '{}'", pattern)));
        }
        Ok(Value::Array(
            pairs
                .into_iter()
                .map(|(k, v)| {
                    let mut obj = tera::Map::new();
                    obj.insert("key".to_string(), Value::String(k));
                    obj.insert("value".to_string(), Value::String(v));
                    Value::Object(obj)
                })
                .collect(),
        ))
    }
}

/// `getvs(pattern)` — just the values whose key starts with `pattern`.
struct GetvsFunction {
    store: Arc<Store>,
}

impl Function for GetvsFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let pattern = required_key(args, "getvs")?;
        let pairs = self.store.get_all_values(&pattern);
        if pairs.is_empty() {
            return Err(tera::Error::msg(format!("no keys matching '{}'", pattern)));
        }
        Ok(Value::Array(pairs.into_iter().map(|(_, v)| Value::String(v)).collect()))
    }
}

/// `ls(dir)` / `lsdir(dir)` — immediate child key segments beneath `dir`.
///
/// The Store does not distinguish "directory" keys from leaf keys, so both
/// names resolve to the same listing.
struct LsFunction {
    store: Arc<Store>,
}

impl Function for LsFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let dir = required_key(args, "ls")?;
        let children = self.store.list_dir(&dir);
        Ok(Value::Array(children.into_iter().map(Value::String).collect()))
    }
}

/// `exists(key)` — whether `key` is present.
struct ExistsFunction {
    store: Arc<Store>,
}

impl Function for ExistsFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let key = required_key(args, "exists")?;
        Ok(Value::Bool(self.store.exists(&key)))
    }
}

/// `get(key)` — a single `{key, value}` object; errors if absent.
struct GetFunction {
    store: Arc<Store>,
}

impl Function for GetFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let key = required_key(args, "get")?;
        let value = self
            .store
            .get(&key)
            .ok_or_else(|| tera::Error::msg(format!("key '{}' not found", key)))?;
        let mut obj = tera::Map::new();
        obj.insert("key".to_string(), Value::String(key));
        obj.insert("value".to_string(), Value::String(value));
        Ok(Value::Object(obj))
    }
}

/// `getall(prefix)` — every key/value pair under `prefix` as a flat object.
struct GetallFunction {
    store: Arc<Store>,
}

impl Function for GetallFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let prefix = required_key(args, "getall")?;
        let pairs = self.store.get_all_values(&prefix);
        let mut obj = tera::Map::new();
        for (k, v) in pairs {
            obj.insert(k, Value::String(v));
        }
        Ok(Value::Object(obj))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(pairs: &[(&str, &str)]) -> Arc<Store> {
        let store = Store::new();
        store.replace(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        Arc::new(store)
    }

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), Value::String(v.to_string()))).collect()
    }

    #[test]
    fn getv_returns_value() {
        let f = GetvFunction { store: store_with(&[("/foo", "bar")]) };
        let result = f.call(&args(&[("key", "/foo")])).unwrap();
        assert_eq!(result, Value::String("bar".to_string()));
    }

    #[test]
    fn getv_missing_without_default_errors() {
        let f = GetvFunction { store: store_with(&[]) };
        assert!(f.call(&args(&[("key", "/missing")])).is_err());
    }

    #[test]
    fn getv_missing_with_default_returns_default() {
        let f = GetvFunction { store: store_with(&[]) };
        let result = f.call(&args(&[("key", "/missing"), ("default", "fallback")])).unwrap();
        assert_eq!(result, Value::String("fallback".to_string()));
    }

    #[test]
    fn exists_reflects_store_state() {
        let f = ExistsFunction { store: store_with(&[("/foo", "bar")]) };
        assert_eq!(f.call(&args(&[("key", "/foo")])).unwrap(), Value::Bool(true));
        assert_eq!(f.call(&args(&[("key", "/missing")])).unwrap(), Value::Bool(false));
    }

    #[test]
    fn getvs_collects_prefixed_values() {
        let f = GetvsFunction {
            store: store_with(&[("/app/a", "1"), ("/app/b", "2"), ("/other", "3")]),
        };
        let result = f.call(&args(&[("key", "/app")])).unwrap();
        match result {
            Value::Array(values) => {
                assert_eq!(values.len(), 2);
            }
            _ => panic!("expected array"),
        }
    }
}
