//! Query result caching contract.

use std::collections::HashMap;
use std::sync::RwLock;

use asupersync::{Cx, Outcome};

use crate::BoxFuture;
use crate::error::Error;
use crate::value::Value;

/// A key/value store for cached query results.
///
/// Failures are never fatal to the query that consults the cache: callers log them
/// and fall back to the adapter.
pub trait CacheStrategy: Send + Sync {
    /// Look up a cached value.
    fn get<'a>(&'a self, cx: &'a Cx, key: &'a str) -> BoxFuture<'a, Outcome<Option<Value>, Error>>;

    /// Store a value.
    fn add<'a>(&'a self, cx: &'a Cx, key: &'a str, value: Value) -> BoxFuture<'a, Outcome<(), Error>>;

    /// Drop every entry whose key starts with `prefix`.
    fn remove_prefix<'a>(&'a self, cx: &'a Cx, prefix: &'a str) -> BoxFuture<'a, Outcome<(), Error>>;
}

/// Process-local cache backed by a map.
#[derive(Debug, Default)]
pub struct MemoryCacheStrategy {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryCacheStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> Error {
    Error::configuration("cache lock poisoned")
}

impl CacheStrategy for MemoryCacheStrategy {
    fn get<'a>(&'a self, _cx: &'a Cx, key: &'a str) -> BoxFuture<'a, Outcome<Option<Value>, Error>> {
        Box::pin(async move {
            match self.entries.read() {
                Ok(entries) => Outcome::Ok(entries.get(key).cloned()),
                Err(_) => Outcome::Err(poisoned()),
            }
        })
    }

    fn add<'a>(&'a self, _cx: &'a Cx, key: &'a str, value: Value) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            match self.entries.write() {
                Ok(mut entries) => {
                    entries.insert(key.to_string(), value);
                    Outcome::Ok(())
                }
                Err(_) => Outcome::Err(poisoned()),
            }
        })
    }

    fn remove_prefix<'a>(&'a self, _cx: &'a Cx, prefix: &'a str) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            match self.entries.write() {
                Ok(mut entries) => {
                    entries.retain(|key, _| !key.starts_with(prefix));
                    Outcome::Ok(())
                }
                Err(_) => Outcome::Err(poisoned()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use serde_json::json;

    #[test]
    fn add_then_get() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let cache = MemoryCacheStrategy::new();
        rt.block_on(async {
            assert!(matches!(cache.get(&cx, "User:q").await, Outcome::Ok(None)));
            assert!(matches!(cache.add(&cx, "User:q", json!([1])).await, Outcome::Ok(())));
            match cache.get(&cx, "User:q").await {
                Outcome::Ok(Some(value)) => assert_eq!(value, json!([1])),
                _ => panic!("expected cached value"),
            }
            assert!(matches!(cache.remove_prefix(&cx, "User:").await, Outcome::Ok(())));
        });
        assert!(cache.is_empty());
    }
}
