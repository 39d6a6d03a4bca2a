//! Query result caching.

use asupersync::{Cx, Outcome};

use schemaorm_core::{BoxFuture, CachingMode, DataObject, Error, Value};

use crate::events::{DataEventArgs, DataEventListener, DataExecuteEventArgs, EventKind};
use crate::model::DataModel;

/// Serves query results from the configured cache strategy.
///
/// Models with `caching: always` cache every query; `conditional` models only cache
/// queries that opted in. Any save or remove drops the cached results of the model.
/// Cache failures are logged and never fail the operation.
pub struct CachingListener;

fn enabled(event: &DataExecuteEventArgs) -> bool {
    match event.model.schema().caching {
        CachingMode::Always => true,
        CachingMode::Conditional => event.cache,
        CachingMode::None => false,
    }
}

fn prefix(model: &DataModel) -> String {
    format!("/{}/", model.name())
}

fn cache_key(event: &DataExecuteEventArgs) -> Option<String> {
    let query = match serde_json::to_string(&event.query) {
        Ok(query) => query,
        Err(e) => {
            tracing::warn!(model = %event.model.name(), error = %e, "Query is not cacheable");
            return None;
        }
    };
    let mut key = format!("{}?query={query}", prefix(&event.model));
    if !event.expand.is_empty() {
        key.push_str("&expand=");
        key.push_str(&event.expand.join(","));
    }
    Some(key)
}

/// Rows of a cached value, if it has the shape of a result.
fn cached_rows(value: Value) -> Option<Vec<DataObject>> {
    let Value::Array(items) = value else {
        return None;
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Some(row),
            _ => None,
        })
        .collect()
}

impl CachingListener {
    fn invalidate<'a>(cx: &'a Cx, event: &'a DataEventArgs) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let prefix = prefix(&event.model);
            let cache = event.model.configuration().cache();
            if let Outcome::Err(e) = cache.remove_prefix(cx, &prefix).await {
                tracing::warn!(model = %event.model.name(), error = %e, "Cache invalidation failed");
            }
            Outcome::Ok(())
        })
    }
}

impl DataEventListener for CachingListener {
    fn subscribes(&self, kind: EventKind) -> bool {
        matches!(
            kind,
            EventKind::BeforeExecute
                | EventKind::AfterExecute
                | EventKind::AfterSave
                | EventKind::AfterRemove
        )
    }

    fn before_execute<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataExecuteEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            if event.result.is_some() || !enabled(event) {
                return Outcome::Ok(());
            }
            let Some(key) = cache_key(event) else {
                return Outcome::Ok(());
            };
            match event.model.configuration().cache().get(cx, &key).await {
                Outcome::Ok(Some(value)) => {
                    if let Some(rows) = cached_rows(value) {
                        tracing::trace!(model = %event.model.name(), key = %key, "Cache hit");
                        event.result = Some(rows);
                        event.cached = true;
                    }
                }
                Outcome::Ok(None) => {}
                Outcome::Err(e) => {
                    tracing::warn!(model = %event.model.name(), error = %e, "Cache lookup failed");
                }
                Outcome::Cancelled(reason) => return Outcome::Cancelled(reason),
                Outcome::Panicked(payload) => return Outcome::Panicked(payload),
            }
            Outcome::Ok(())
        })
    }

    fn after_execute<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataExecuteEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            if event.cached || !enabled(event) {
                return Outcome::Ok(());
            }
            let Some(rows) = &event.result else {
                return Outcome::Ok(());
            };
            let Some(key) = cache_key(event) else {
                return Outcome::Ok(());
            };
            let value = Value::Array(rows.iter().cloned().map(Value::Object).collect());
            if let Outcome::Err(e) = event.model.configuration().cache().add(cx, &key, value).await {
                tracing::warn!(model = %event.model.name(), error = %e, "Cache update failed");
            }
            Outcome::Ok(())
        })
    }

    fn after_save<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Self::invalidate(cx, event)
    }

    fn after_remove<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Self::invalidate(cx, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_arrays_of_objects_are_results() {
        let rows = cached_rows(json!([{"id": 1}, {"id": 2}])).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(cached_rows(json!([{"id": 1}, 2])).is_none());
        assert!(cached_rows(json!({"id": 1})).is_none());
        assert_eq!(cached_rows(json!([])).unwrap().len(), 0);
    }
}
