//! Event arguments and the listener contract.
//!
//! Every save, remove, query execution and migration runs through a pipeline of
//! listeners. A listener receives mutable event arguments and may change the target
//! object, narrow a query, provide a result, or abort the operation by resolving to
//! anything but `Outcome::Ok`.

use asupersync::{Cx, Outcome};

use schemaorm_core::{BoxFuture, DataObject, Error, MigrationDescriptor, Value};
use schemaorm_query::SelectQuery;

use crate::model::DataModel;

/// The state of the object an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataState {
    Insert = 1,
    Update = 2,
    Remove = 4,
}

impl DataState {
    /// Read a `$state` marker (`1`, `2`, `4` or the state name).
    pub fn parse(value: &Value) -> Option<DataState> {
        match value {
            Value::Number(n) => match n.as_u64()? {
                1 => Some(DataState::Insert),
                2 => Some(DataState::Update),
                4 => Some(DataState::Remove),
                _ => None,
            },
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "insert" => Some(DataState::Insert),
                "update" => Some(DataState::Update),
                "remove" | "delete" => Some(DataState::Remove),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Name of the object property that carries an explicit state.
pub const STATE_PROPERTY: &str = "$state";

/// Event kinds a listener may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeSave,
    AfterSave,
    BeforeRemove,
    AfterRemove,
    BeforeExecute,
    AfterExecute,
    BeforeUpgrade,
    AfterUpgrade,
}

/// Arguments of save and remove events.
#[derive(Debug)]
pub struct DataEventArgs {
    pub model: DataModel,
    /// The object being saved or removed.
    pub target: DataObject,
    pub state: DataState,
    /// True when the caller stated the state instead of letting it be inferred.
    pub explicit_state: bool,
    /// The stored row, when it was loaded (updates and removes).
    pub previous: Option<DataObject>,
    /// Permission checks are skipped.
    pub silent: bool,
}

/// Arguments of query execution events.
#[derive(Debug)]
pub struct DataExecuteEventArgs {
    pub model: DataModel,
    pub query: SelectQuery,
    /// The query opted in to conditional caching.
    pub cache: bool,
    /// Opaque metadata attached with `Queryable::data`.
    pub data: DataObject,
    /// Names of the expanded associations.
    pub expand: Vec<String>,
    pub silent: bool,
    /// Set by a listener to skip the adapter call.
    pub result: Option<Vec<DataObject>>,
    /// The result came from the cache.
    pub cached: bool,
}

/// Arguments of migration events.
#[derive(Debug)]
pub struct DataUpgradeEventArgs {
    pub model: DataModel,
    pub descriptor: MigrationDescriptor,
    /// The adapter applied the migration (false when the version was already stored).
    pub applied: bool,
}

fn done<'a>() -> BoxFuture<'a, Outcome<(), Error>> {
    Box::pin(async { Outcome::Ok(()) })
}

/// A participant in the event pipeline.
///
/// Every handler defaults to a no-op. `subscribes` tells the pipeline which events
/// the listener cares about; `after.execute` is only raised when some listener of
/// the pipeline subscribes to it.
pub trait DataEventListener: Send + Sync {
    fn subscribes(&self, _kind: EventKind) -> bool {
        true
    }

    fn before_save<'a>(
        &'a self,
        _cx: &'a Cx,
        _event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        done()
    }

    fn after_save<'a>(
        &'a self,
        _cx: &'a Cx,
        _event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        done()
    }

    fn before_remove<'a>(
        &'a self,
        _cx: &'a Cx,
        _event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        done()
    }

    fn after_remove<'a>(
        &'a self,
        _cx: &'a Cx,
        _event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        done()
    }

    fn before_execute<'a>(
        &'a self,
        _cx: &'a Cx,
        _event: &'a mut DataExecuteEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        done()
    }

    fn after_execute<'a>(
        &'a self,
        _cx: &'a Cx,
        _event: &'a mut DataExecuteEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        done()
    }

    fn before_upgrade<'a>(
        &'a self,
        _cx: &'a Cx,
        _event: &'a mut DataUpgradeEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        done()
    }

    fn after_upgrade<'a>(
        &'a self,
        _cx: &'a Cx,
        _event: &'a mut DataUpgradeEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        done()
    }
}
