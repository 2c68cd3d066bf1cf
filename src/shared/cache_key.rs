//! # Cache Keys
//!
//! Deterministic identity of a logical query, shared by the in-memory query
//! cache and the durable store.
//!
//! A key is rendered as the operation segments joined by `:` followed by the
//! parameters sorted by name, `name=value` joined by `&`:
//!
//! ```rust
//! use pattern_sync::shared::cache_key::CacheKey;
//!
//! let key = CacheKey::new(["patterns", "list"]).param("page", 1).build();
//! assert_eq!(key.as_str(), "patterns:list:page=1");
//! ```
//!
//! Values are rendered as JSON with sorted object keys, so `"1"` and `1` stay
//! distinct. Reserved characters (`%`, `:`, `=`, `&`) inside segments, names
//! and values are percent-escaped so distinct queries never render the same key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::shared::error::SyncResult;

/// Canonical cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Start a key from its operation segments
    pub fn new<I, S>(operation: I) -> CacheKeyBuilder
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        CacheKeyBuilder {
            operation: operation
                .into_iter()
                .map(|s| escape(s.as_ref()))
                .collect(),
            params: BTreeMap::new(),
        }
    }

    /// Build a key from an operation name and a serializable parameter struct
    ///
    /// Fields are sorted by name regardless of declaration order. A parameter
    /// value that does not serialize to an object is stored under `_`.
    pub fn from_params<P: Serialize>(operation: &str, params: &P) -> SyncResult<Self> {
        let mut builder = CacheKey::new(operation.split(':'));
        match serde_json::to_value(params)? {
            Value::Object(map) => {
                for (name, value) in map {
                    builder = builder.param(name, value);
                }
            }
            Value::Null => {}
            other => builder = builder.param("_", other),
        }
        Ok(builder.build())
    }

    /// Wrap an already rendered key, e.g. one read back from storage
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Rendered key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CacheKeyBuilder> for CacheKey {
    fn from(builder: CacheKeyBuilder) -> Self {
        builder.build()
    }
}

/// Builder collecting operation segments and parameters
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    operation: Vec<String>,
    params: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    /// Add a parameter; a later parameter with the same name replaces the earlier one
    pub fn param(mut self, name: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.params
            .insert(escape(name.as_ref()), render_value(&value.into()));
        self
    }

    /// Render the key
    pub fn build(self) -> CacheKey {
        let mut rendered = self.operation.join(":");
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            rendered.push(':');
            rendered.push_str(&params.join("&"));
        }
        CacheKey(rendered)
    }
}

fn render_value(value: &Value) -> String {
    escape(&canonical_json(value))
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, String> =
                map.iter().map(|(k, v)| (k, canonical_json(v))).collect();
            let body: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), v))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            '=' => out.push_str("%3D"),
            '&' => out.push_str("%26"),
            _ => out.push(c),
        }
    }
    out
}
