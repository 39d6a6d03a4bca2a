//! The storage adapter contract.
//!
//! The data layer never talks to storage directly. Every statement, migration and
//! transaction goes through a `DataAdapter`, shared as `Arc<dyn DataAdapter>` by a
//! `DataContext`.

use asupersync::{Cx, Outcome};

use schemaorm_core::{
    BoxFuture, DataObject, Error, MigrationDescriptor, MigrationStatus, Value,
};

use crate::query::{QueryExpression, SelectQuery};

/// The result of executing a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Rows returned by a select.
    pub rows: Vec<DataObject>,
    /// Rows touched by an insert, update or delete.
    pub affected_rows: u64,
    /// Identity generated by an insert, when the adapter knows it.
    pub insert_id: Option<Value>,
}

impl QueryResult {
    pub fn rows(rows: Vec<DataObject>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn affected(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            ..Self::default()
        }
    }
}

/// A storage backend.
pub trait DataAdapter: Send + Sync {
    /// Execute a statement.
    fn execute<'a>(
        &'a self,
        cx: &'a Cx,
        query: &'a QueryExpression,
    ) -> BoxFuture<'a, Outcome<QueryResult, Error>>;

    /// Create or alter the storage of a model.
    fn migrate<'a>(
        &'a self,
        cx: &'a Cx,
        descriptor: &'a MigrationDescriptor,
    ) -> BoxFuture<'a, Outcome<MigrationStatus, Error>>;

    /// Run `work` inside a transaction: committed when it resolves to `Ok`, rolled
    /// back otherwise. Transactions may nest.
    fn execute_in_transaction<'a>(
        &'a self,
        cx: &'a Cx,
        work: BoxFuture<'a, Outcome<(), Error>>,
    ) -> BoxFuture<'a, Outcome<(), Error>>;

    /// Generate the next identity for a counter column, if the adapter manages
    /// identities itself.
    fn next_identity<'a>(
        &'a self,
        _cx: &'a Cx,
        _entity: &'a str,
        _field: &'a str,
    ) -> BoxFuture<'a, Outcome<Option<Value>, Error>> {
        Box::pin(async { Outcome::Ok(None) })
    }

    /// The identity generated by the last insert.
    fn last_identity<'a>(&'a self, _cx: &'a Cx) -> BoxFuture<'a, Outcome<Option<Value>, Error>> {
        Box::pin(async { Outcome::Ok(None) })
    }

    /// Create (or replace) a named view.
    fn create_view<'a>(
        &'a self,
        _cx: &'a Cx,
        _name: &'a str,
        _query: &'a SelectQuery,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async { Outcome::Ok(()) })
    }
}
