//! In-memory storage adapter for SchemaORM.
//!
//! `MemoryAdapter` evaluates query expressions against tables held in process
//! memory. It implements the whole `DataAdapter` contract (select with joins,
//! filters, grouping and paging; insert/update/delete; views; identity counters;
//! nested snapshot transactions) and records every call in a statement log so
//! tests can assert exactly which adapter calls happened.
//!
//! # Example
//!
//! ```ignore
//! let adapter = Arc::new(MemoryAdapter::new());
//! let context = DataContext::new(configuration, adapter.clone());
//! let users = context.model("User")?;
//! unwrap_outcome(users.save(&cx, user).await);
//! assert_eq!(adapter.rows("UserBase").len(), 1);
//! ```

mod eval;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use asupersync::{Cx, Outcome};

use schemaorm_core::value::{self, DataObject, Value};
use schemaorm_core::{
    BoxFuture, DataTypeKind, DataTypes, Error, MigrationDescriptor, MigrationStatus, Result,
};
use schemaorm_query::{DataAdapter, QueryExpression, QueryResult, SelectQuery};

use crate::eval::{Combo, Scope, Source};

/// An adapter call recorded in the statement log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Select { entity: String },
    Insert { entity: String },
    Update { entity: String },
    Delete { entity: String },
    Migrate { entity: String, version: String },
    CreateView { name: String },
    Begin,
    Commit,
    Rollback,
}

impl Statement {
    /// True for calls that read or write rows or schema.
    pub fn touches(&self, entity: &str) -> bool {
        match self {
            Statement::Select { entity: e }
            | Statement::Insert { entity: e }
            | Statement::Update { entity: e }
            | Statement::Delete { entity: e }
            | Statement::Migrate { entity: e, .. } => e == entity,
            Statement::CreateView { name } => name == entity,
            Statement::Begin | Statement::Commit | Statement::Rollback => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Table {
    rows: Vec<DataObject>,
    /// Auto-generated identity column.
    counter_column: Option<String>,
    counter: i64,
}

#[derive(Debug, Clone)]
struct Snapshot {
    rows: HashMap<String, (Vec<DataObject>, i64)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, Table>,
    views: HashMap<String, SelectQuery>,
    versions: HashMap<String, String>,
    last_insert_id: Option<Value>,
    snapshots: Vec<Snapshot>,
    log: Vec<Statement>,
}

impl MemoryState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            rows: self
                .tables
                .iter()
                .map(|(name, table)| (name.clone(), (table.rows.clone(), table.counter)))
                .collect(),
        }
    }

    /// Restore row data. Tables created after the snapshot keep their schema but
    /// lose their rows.
    fn restore(&mut self, snapshot: Snapshot) {
        let mut rows = snapshot.rows;
        for (name, table) in &mut self.tables {
            match rows.remove(name) {
                Some((saved, counter)) => {
                    table.rows = saved;
                    table.counter = counter;
                }
                None => {
                    table.rows.clear();
                    table.counter = 0;
                }
            }
        }
    }

    fn load(&self, name: &str, reference: &str, depth: usize) -> Result<Source> {
        if let Some(table) = self.tables.get(name) {
            return Ok(Source {
                name: name.to_string(),
                reference: reference.to_string(),
                rows: table.rows.clone(),
            });
        }
        if let Some(view) = self.views.get(name) {
            if depth > 16 {
                return Err(Error::adapter(format!("view `{name}` nests too deeply")));
            }
            let rows = self.select(view, depth + 1)?;
            return Ok(Source {
                name: name.to_string(),
                reference: reference.to_string(),
                rows,
            });
        }
        Err(Error::adapter(format!("entity `{name}` does not exist")))
    }

    fn select(&self, query: &SelectQuery, depth: usize) -> Result<Vec<DataObject>> {
        let main = self.load(&query.entity.name, query.entity.reference(), depth)?;
        let mut loader = |name: &str, reference: &str| self.load(name, reference, depth);
        eval::run_select(query, main, &mut loader)
    }

    fn table_mut(&mut self, entity: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(entity)
            .ok_or_else(|| Error::adapter(format!("table `{entity}` does not exist")))
    }

    fn matching(entity: &str, table: &Table, filter: Option<&schemaorm_query::Expr>) -> Result<Vec<bool>> {
        let source = [Source {
            name: entity.to_string(),
            reference: entity.to_string(),
            rows: table.rows.clone(),
        }];
        let mut result = Vec::with_capacity(table.rows.len());
        for index in 0..table.rows.len() {
            let combo: Combo = vec![Some(index)];
            let matched = match filter {
                Some(expr) => value::is_truthy(&eval::eval(
                    expr,
                    &Scope::Row {
                        sources: &source,
                        combo: &combo,
                    },
                )?),
                None => true,
            };
            result.push(matched);
        }
        Ok(result)
    }

    fn execute(&mut self, query: &QueryExpression) -> Result<QueryResult> {
        match query {
            QueryExpression::Select(select) => {
                self.log.push(Statement::Select {
                    entity: select.entity.name.clone(),
                });
                Ok(QueryResult::rows(self.select(select, 0)?))
            }
            QueryExpression::Insert(insert) => {
                self.log.push(Statement::Insert {
                    entity: insert.entity.clone(),
                });
                let table = self.table_mut(&insert.entity)?;
                let mut row = insert.values.clone();
                let mut insert_id = None;
                if let Some(column) = table.counter_column.clone() {
                    match row.get(&column).and_then(value::as_f64) {
                        Some(id) => table.counter = table.counter.max(id as i64),
                        None => {
                            table.counter += 1;
                            let id = Value::from(table.counter);
                            row.insert(column, id.clone());
                            insert_id = Some(id);
                        }
                    }
                }
                table.rows.push(row);
                if insert_id.is_some() {
                    self.last_insert_id.clone_from(&insert_id);
                }
                Ok(QueryResult {
                    rows: Vec::new(),
                    affected_rows: 1,
                    insert_id,
                })
            }
            QueryExpression::Update(update) => {
                self.log.push(Statement::Update {
                    entity: update.entity.clone(),
                });
                let table = self.table_mut(&update.entity)?;
                let matched = Self::matching(&update.entity, table, update.filter.as_ref())?;
                let mut affected = 0;
                for (row, hit) in table.rows.iter_mut().zip(matched) {
                    if hit {
                        for (key, value) in &update.values {
                            row.insert(key.clone(), value.clone());
                        }
                        affected += 1;
                    }
                }
                Ok(QueryResult::affected(affected))
            }
            QueryExpression::Delete(delete) => {
                self.log.push(Statement::Delete {
                    entity: delete.entity.clone(),
                });
                let table = self.table_mut(&delete.entity)?;
                let matched = Self::matching(&delete.entity, table, delete.filter.as_ref())?;
                let before = table.rows.len();
                let mut hits = matched.into_iter();
                table.rows.retain(|_| !hits.next().unwrap_or(false));
                Ok(QueryResult::affected((before - table.rows.len()) as u64))
            }
        }
    }
}

/// A `DataAdapter` that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    state: Mutex<MemoryState>,
    types: DataTypes,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of every row currently stored in a table.
    pub fn rows(&self, table: &str) -> Vec<DataObject> {
        self.state()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// True if a table exists.
    pub fn has_table(&self, table: &str) -> bool {
        self.state().tables.contains_key(table)
    }

    /// True if a view exists.
    pub fn has_view(&self, name: &str) -> bool {
        self.state().views.contains_key(name)
    }

    /// The version stored by the last migration of a table.
    pub fn version(&self, table: &str) -> Option<String> {
        self.state().versions.get(table).cloned()
    }

    /// Every recorded adapter call, oldest first.
    pub fn statements(&self) -> Vec<Statement> {
        self.state().log.clone()
    }

    /// Clear the statement log.
    pub fn clear_log(&self) {
        self.state().log.clear();
    }

    /// Insert rows directly, bypassing the data layer.
    pub fn seed(&self, table: &str, rows: Vec<DataObject>) -> Result<()> {
        let mut state = self.state();
        let table = state.table_mut(table)?;
        table.rows.extend(rows);
        Ok(())
    }

    fn apply_migration(&self, descriptor: &MigrationDescriptor) -> MigrationStatus {
        let mut state = self.state();
        state.log.push(Statement::Migrate {
            entity: descriptor.applies_to.clone(),
            version: descriptor.version.clone(),
        });
        if state.versions.get(&descriptor.applies_to) == Some(&descriptor.version) {
            return MigrationStatus::UNCHANGED;
        }
        let counter_column = descriptor
            .add
            .iter()
            .find(|f| {
                f.primary
                    && self
                        .types
                        .get(&f.type_name)
                        .is_some_and(|t| t.kind == DataTypeKind::Counter)
            })
            .map(|f| f.name.clone());
        let table = state.tables.entry(descriptor.applies_to.clone()).or_default();
        if counter_column.is_some() {
            table.counter_column = counter_column;
        }
        state
            .versions
            .insert(descriptor.applies_to.clone(), descriptor.version.clone());
        tracing::info!(
            table = %descriptor.applies_to,
            version = %descriptor.version,
            columns = descriptor.add.len(),
            indexes = descriptor.indexes.len(),
            "Memory table migrated"
        );
        MigrationStatus::APPLIED
    }
}

impl DataAdapter for MemoryAdapter {
    fn execute<'a>(
        &'a self,
        _cx: &'a Cx,
        query: &'a QueryExpression,
    ) -> BoxFuture<'a, Outcome<QueryResult, Error>> {
        Box::pin(async move {
            tracing::debug!(kind = query.kind(), entity = query.entity(), "Memory execute");
            let result = self.state().execute(query);
            match result {
                Ok(result) => Outcome::Ok(result),
                Err(e) => Outcome::Err(e),
            }
        })
    }

    fn migrate<'a>(
        &'a self,
        _cx: &'a Cx,
        descriptor: &'a MigrationDescriptor,
    ) -> BoxFuture<'a, Outcome<MigrationStatus, Error>> {
        Box::pin(async move { Outcome::Ok(self.apply_migration(descriptor)) })
    }

    fn execute_in_transaction<'a>(
        &'a self,
        _cx: &'a Cx,
        work: BoxFuture<'a, Outcome<(), Error>>,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            {
                let mut state = self.state();
                let snapshot = state.snapshot();
                state.snapshots.push(snapshot);
                state.log.push(Statement::Begin);
            }
            let outcome = work.await;
            let mut state = self.state();
            let snapshot = state.snapshots.pop();
            if matches!(outcome, Outcome::Ok(())) {
                state.log.push(Statement::Commit);
            } else {
                if let Some(snapshot) = snapshot {
                    state.restore(snapshot);
                }
                state.log.push(Statement::Rollback);
                tracing::debug!("Memory transaction rolled back");
            }
            outcome
        })
    }

    fn next_identity<'a>(
        &'a self,
        _cx: &'a Cx,
        entity: &'a str,
        field: &'a str,
    ) -> BoxFuture<'a, Outcome<Option<Value>, Error>> {
        Box::pin(async move {
            let mut state = self.state();
            let Some(table) = state.tables.get_mut(entity) else {
                return Outcome::Ok(None);
            };
            if table.counter_column.as_deref() != Some(field) {
                return Outcome::Ok(None);
            }
            table.counter += 1;
            Outcome::Ok(Some(Value::from(table.counter)))
        })
    }

    fn last_identity<'a>(&'a self, _cx: &'a Cx) -> BoxFuture<'a, Outcome<Option<Value>, Error>> {
        Box::pin(async move { Outcome::Ok(self.state().last_insert_id.clone()) })
    }

    fn create_view<'a>(
        &'a self,
        _cx: &'a Cx,
        name: &'a str,
        query: &'a SelectQuery,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let mut state = self.state();
            state.log.push(Statement::CreateView {
                name: name.to_string(),
            });
            state.views.insert(name.to_string(), query.clone());
            Outcome::Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use schemaorm_core::FieldSchema;
    use schemaorm_query::{DeleteQuery, Expr, InsertQuery, UpdateQuery};
    use serde_json::json;

    fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => panic!("unexpected error: {e}"),
            Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
            Outcome::Panicked(p) => panic!("panicked: {p:?}"),
        }
    }

    fn object(value: Value) -> DataObject {
        value.as_object().cloned().unwrap()
    }

    fn descriptor() -> MigrationDescriptor {
        MigrationDescriptor {
            applies_to: "UserBase".into(),
            model: "User".into(),
            version: "1.0".into(),
            description: String::new(),
            add: vec![
                FieldSchema::new("id", "Counter").primary(),
                FieldSchema::new("name", "Text"),
            ],
            indexes: Vec::new(),
        }
    }

    #[test]
    fn insert_generates_identity_and_updates() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let adapter = MemoryAdapter::new();

        rt.block_on(async {
            let status = unwrap_outcome(adapter.migrate(&cx, &descriptor()).await);
            assert!(status.applied);
            let again = unwrap_outcome(adapter.migrate(&cx, &descriptor()).await);
            assert!(!again.applied);

            let insert = QueryExpression::Insert(InsertQuery {
                entity: "UserBase".into(),
                values: object(json!({"name": "alice"})),
            });
            let result = unwrap_outcome(adapter.execute(&cx, &insert).await);
            assert_eq!(result.insert_id, Some(json!(1)));

            let update = QueryExpression::Update(UpdateQuery {
                entity: "UserBase".into(),
                values: object(json!({"name": "bob"})),
                filter: Some(Expr::field("id").eq(1)),
            });
            assert_eq!(unwrap_outcome(adapter.execute(&cx, &update).await).affected_rows, 1);
            assert_eq!(adapter.rows("UserBase")[0]["name"], json!("bob"));

            let next = unwrap_outcome(adapter.next_identity(&cx, "UserBase", "id").await);
            assert_eq!(next, Some(json!(2)));
        });
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let adapter = MemoryAdapter::new();

        rt.block_on(async {
            unwrap_outcome(adapter.migrate(&cx, &descriptor()).await);
            let insert = QueryExpression::Insert(InsertQuery {
                entity: "UserBase".into(),
                values: object(json!({"name": "alice"})),
            });
            let work: BoxFuture<'_, Outcome<(), Error>> = Box::pin(async {
                unwrap_outcome(adapter.execute(&cx, &insert).await);
                assert_eq!(adapter.rows("UserBase").len(), 1);
                Outcome::Err(Error::adapter("abort"))
            });
            let outcome = adapter.execute_in_transaction(&cx, work).await;
            assert!(matches!(outcome, Outcome::Err(_)));
        });
        assert!(adapter.rows("UserBase").is_empty());
        assert_eq!(adapter.statements().last(), Some(&Statement::Rollback));
    }

    #[test]
    fn views_and_deletes() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let adapter = MemoryAdapter::new();

        rt.block_on(async {
            unwrap_outcome(adapter.migrate(&cx, &descriptor()).await);
            adapter
                .seed(
                    "UserBase",
                    vec![object(json!({"id": 1, "name": "a"})), object(json!({"id": 2, "name": "b"}))],
                )
                .unwrap();
            let view = SelectQuery::new("UserBase");
            unwrap_outcome(adapter.create_view(&cx, "UserData", &view).await);
            let select = QueryExpression::Select(
                SelectQuery::new("UserData").filter(Expr::field("name").eq("b")),
            );
            let rows = unwrap_outcome(adapter.execute(&cx, &select).await).rows;
            assert_eq!(rows.len(), 1);

            let delete = QueryExpression::Delete(DeleteQuery {
                entity: "UserBase".into(),
                filter: Some(Expr::field("id").eq(1)),
            });
            assert_eq!(unwrap_outcome(adapter.execute(&cx, &delete).await).affected_rows, 1);
        });
        assert_eq!(adapter.rows("UserBase").len(), 1);
        assert!(adapter.has_view("UserData"));
    }
}
