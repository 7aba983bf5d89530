//! Auxiliary template helpers that don't touch the Store (§6):
//! `seq`, `reverse`, `sortByLength`, `sortKVByLength`, `base64Encode`,
//! `base64Decode`, `unmarshalJsonObject`, `unmarshalJsonArray`,
//! `createMap`, `getenv`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;
use tera::{Function, Tera, Value};

pub fn register_helpers(tera: &mut Tera) {
    tera.register_function("seq", SeqFunction);
    tera.register_function("reverse", ReverseFunction);
    tera.register_function("sortByLength", SortByLengthFunction);
    tera.register_function("sortKVByLength", SortKvByLengthFunction);
    tera.register_function("base64Encode", Base64EncodeFunction);
    tera.register_function("base64Decode", Base64DecodeFunction);
    tera.register_function("unmarshalJsonObject", UnmarshalJsonObjectFunction);
    tera.register_function("unmarshalJsonArray", UnmarshalJsonArrayFunction);
    tera.register_function("createMap", CreateMapFunction);
    tera.register_function("getenv", GetenvFunction);
}

/// `seq(first, last)` — inclusive integer range, ascending or descending.
struct SeqFunction;

impl Function for SeqFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let first = args
            .get("first")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| tera::Error::msg("seq() requires integer 'first'"))?;
        let last = args
            .get("last")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| tera::Error::msg("seq() requires integer 'last'"))?;

        let values: Vec<Value> = if first <= last {
            (first..=last).map(Value::from).collect()
        } else {
            (last..=first).rev().map(Value::from).collect()
        };
        Ok(Value::Array(values))
    }
}

fn required_array<'a>(args: &'a HashMap<String, Value>, name: &str, fn_name: &str) -> tera::Result<&'a Vec<Value>> {
    args.get(name)
        .and_then(|v| v.as_array())
        .ok_or_else(|| tera::Error::msg(format!("{}() requires array '{}'", fn_name, name)))
}

/// `reverse(list)` — reverse a list.
struct ReverseFunction;

impl Function for ReverseFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let list = required_array(args, "list", "reverse")?;
        let mut reversed = list.clone();
        reversed.reverse();
        Ok(Value::Array(reversed))
    }
}

/// `sortByLength(list)` — sort a list of strings by ascending length.
struct SortByLengthFunction;

impl Function for SortByLengthFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let list = required_array(args, "list", "sortByLength")?;
        let mut sorted: Vec<Value> = list.clone();
        sorted.sort_by_key(|v| v.as_str().map(str::len).unwrap_or(0));
        Ok(Value::Array(sorted))
    }
}

/// `sortKVByLength(list)` — sort a list of `{key, value}` objects by
/// ascending `key` length.
struct SortKvByLengthFunction;

impl Function for SortKvByLengthFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let list = required_array(args, "list", "sortKVByLength")?;
        let mut sorted: Vec<Value> = list.clone();
        sorted.sort_by_key(|v| {
            v.get("key")
                .and_then(|k| k.as_str())
                .map(str::len)
                .unwrap_or(0)
        });
        Ok(Value::Array(sorted))
    }
}

fn required_str<'a>(args: &'a HashMap<String, Value>, name: &str, fn_name: &str) -> tera::Result<&'a str> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| tera::Error::msg(format!("{}() requires string '{}'", fn_name, name)))
}

/// `base64Encode(s)`.
struct Base64EncodeFunction;

impl Function for Base64EncodeFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let s = required_str(args, "s", "base64Encode")?;
        Ok(Value::String(BASE64.encode(s.as_bytes())))
    }
}

/// `base64Decode(s)`.
struct Base64DecodeFunction;

impl Function for Base64DecodeFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let s = required_str(args, "s", "base64Decode")?;
        let decoded = BASE64
            .decode(s)
            .map_err(|e| tera::Error::msg(format!("base64Decode() invalid input: {}", e)))?;
        let text = String::from_utf8(decoded)
            .map_err(|e| tera::Error::msg(format!("base64Decode() result is not UTF-8: {}", e)))?;
        Ok(Value::String(text))
    }
}

/// `unmarshalJsonObject(s)` — parse `s` as a JSON object.
struct UnmarshalJsonObjectFunction;

impl Function for UnmarshalJsonObjectFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let s = required_str(args, "s", "unmarshalJsonObject")?;
        let parsed: Value = serde_json::from_str(s)
            .map_err(|e| tera::Error::msg(format!("unmarshalJsonObject() invalid JSON: {}", e)))?;
        if !parsed.is_object() {
            return Err(tera::Error::msg("unmarshalJsonObject() input is not a JSON object"));
        }
        Ok(parsed)
    }
}

/// `unmarshalJsonArray(s)` — parse `s` as a JSON array.
struct UnmarshalJsonArrayFunction;

impl Function for UnmarshalJsonArrayFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let s = required_str(args, "s", "unmarshalJsonArray")?;
        let parsed: Value = serde_json::from_str(s)
            .map_err(|e| tera::Error::msg(format!("unmarshalJsonArray() invalid JSON: {}", e)))?;
        if !parsed.is_array() {
            return Err(tera::Error::msg("unmarshalJsonArray() input is not a JSON array"));
        }
        Ok(parsed)
    }
}

/// `createMap(k1=v1, k2=v2, …)` — build an object from the call's keyword
/// arguments directly; every argument becomes a key in the result.
struct CreateMapFunction;

impl Function for CreateMapFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let mut obj = tera::Map::new();
        for (k, v) in args {
            obj.insert(k.clone(), v.clone());
        }
        Ok(Value::Object(obj))
    }
}

/// `getenv(name [, default])`.
struct GetenvFunction;

impl Function for GetenvFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let name = required_str(args, "name", "getenv")?;
        match std::env::var(name) {
            Ok(value) => Ok(Value::String(value)),
            Err(_) => match args.get("default").and_then(|v| v.as_str()) {
                Some(default) => Ok(Value::String(default.to_string())),
                None => Ok(Value::String(String::new())),
            },
        }
    }
}
