use std::sync::atomic::{AtomicUsize, Ordering};

use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};
use serde_json::json;

use schemaorm::memory::Statement;
use schemaorm::prelude::*;
use schemaorm::core::{BoxFuture, ConstraintSchema};

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn expect_error<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => panic!("expected an error, got {other:?}"),
    }
}

fn object(value: serde_json::Value) -> DataObject {
    value.as_object().cloned().expect("object literal")
}

const CUSTOMER: &str = r#"{
    "name": "Customer",
    "fields": [
        {"name": "id", "type": "Counter", "primary": true},
        {"name": "name", "type": "Text", "nullable": false, "size": 40},
        {"name": "email", "type": "Text"},
        {"name": "status", "type": "Text", "value": "active"}
    ],
    "constraints": [{"type": "unique", "fields": ["email"]}]
}"#;

/// Rejects every save.
struct Reject;

impl DataEventListener for Reject {
    fn subscribes(&self, kind: EventKind) -> bool {
        kind == EventKind::BeforeSave
    }

    fn before_save<'a>(
        &'a self,
        _cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            Outcome::Err(Error::not_supported(event.model.name(), "saves are frozen"))
        })
    }
}

/// Counts saves and rejects objects marked as locked.
struct Gate {
    calls: Arc<AtomicUsize>,
}

impl DataEventListener for Gate {
    fn subscribes(&self, kind: EventKind) -> bool {
        kind == EventKind::BeforeSave
    }

    fn before_save<'a>(
        &'a self,
        _cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if event.target.get("locked") == Some(&json!(true)) {
                return Outcome::Err(Error::not_supported(event.model.name(), "object is locked"));
            }
            Outcome::Ok(())
        })
    }
}

fn context(extra: &[ModelSchema]) -> (DataContext, Arc<MemoryAdapter>) {
    let configuration = DataConfiguration::builder()
        .model_json(CUSTOMER)
        .expect("customer definition")
        .models(extra.iter().cloned())
        .listener("reject", Arc::new(Reject))
        .build();
    let adapter = Arc::new(MemoryAdapter::new());
    (DataContext::new(configuration, adapter.clone()), adapter)
}

#[test]
fn insert_assigns_key_and_default_values() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (context, adapter) = context(&[]);
    let customers = context.model("Customer").unwrap();

    rt.block_on(async {
        let saved = unwrap_outcome(
            customers
                .save(&cx, object(json!({"name": "Alice", "email": "alice@example.com"})))
                .await,
        );
        assert_eq!(saved["id"], json!(1));
        assert_eq!(saved["status"], json!("active"));

        let rows = adapter.rows("CustomerBase");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("Alice"));
        assert!(adapter.has_view("CustomerData"));

        let found = unwrap_outcome(customers.find(&cx, &object(json!({"id": 1}))).await)
            .expect("saved customer");
        assert_eq!(found["email"], json!("alice@example.com"));
    });
}

#[test]
fn state_is_inferred_from_the_stored_key() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (context, adapter) = context(&[]);
    let customers = context.model("Customer").unwrap();

    rt.block_on(async {
        unwrap_outcome(
            customers
                .save(&cx, object(json!({"name": "Alice", "email": "alice@example.com"})))
                .await,
        );

        // A stored key updates in place.
        unwrap_outcome(customers.save(&cx, object(json!({"id": 1, "name": "Alicia"}))).await);
        let rows = adapter.rows("CustomerBase");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("Alicia"));
        assert_eq!(rows[0]["email"], json!("alice@example.com"));

        // An unknown key inserts.
        unwrap_outcome(customers.save(&cx, object(json!({"id": 40, "name": "Bob"}))).await);
        assert_eq!(adapter.rows("CustomerBase").len(), 2);

        // An explicit update of an unknown key fails.
        let err = expect_error(customers.update(&cx, object(json!({"id": 41, "name": "Carol"}))).await);
        assert_eq!(err.code(), "ENOTFOUND");
        assert_eq!(adapter.rows("CustomerBase").len(), 2);
    });
}

#[test]
fn unique_constraint_rejects_duplicates() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (context, adapter) = context(&[]);
    let customers = context.model("Customer").unwrap();

    rt.block_on(async {
        unwrap_outcome(
            customers
                .save(&cx, object(json!({"name": "Alice", "email": "same@example.com"})))
                .await,
        );
        let err = expect_error(
            customers
                .save(&cx, object(json!({"name": "Alias", "email": "same@example.com"})))
                .await,
        );
        assert_eq!(err.code(), "EUNQ");
        assert_eq!(adapter.rows("CustomerBase").len(), 1);

        // Saving the owner of the value again is not a duplicate.
        unwrap_outcome(
            customers
                .save(&cx, object(json!({"id": 1, "email": "same@example.com"})))
                .await,
        );
    });
}

#[test]
fn unique_constraint_checks_only_complete_targets() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let seat = ModelSchema::new("Seat")
        .with_field(FieldSchema::new("id", "Counter").primary())
        .with_field(FieldSchema::new("row", "Text"))
        .with_field(FieldSchema::new("number", "Integer"))
        .with_constraint(ConstraintSchema::unique(["row", "number"]));
    let (context, adapter) = context(&[seat]);
    let seats = context.model("Seat").unwrap();

    rt.block_on(async {
        unwrap_outcome(seats.save(&cx, object(json!({"row": "A", "number": 1}))).await);
        unwrap_outcome(seats.save(&cx, object(json!({"row": "A", "number": 2}))).await);

        // Without a row the constraint is not checked.
        unwrap_outcome(seats.save(&cx, object(json!({"id": 2, "number": 1}))).await);
        assert_eq!(adapter.rows("SeatBase").len(), 2);

        let err = expect_error(
            seats
                .save(&cx, object(json!({"row": "A", "number": 1})))
                .await,
        );
        assert_eq!(err.code(), "EUNQ");
    });
}

#[test]
fn not_null_and_validation_errors() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (context, adapter) = context(&[]);
    let customers = context.model("Customer").unwrap();

    rt.block_on(async {
        let err = expect_error(customers.save(&cx, object(json!({"email": "x@example.com"}))).await);
        assert_eq!(err.code(), "ENULL");
        assert_eq!(err.field(), Some("name"));

        let err = expect_error(customers.save(&cx, object(json!({"name": "x".repeat(41)}))).await);
        assert_eq!(err.code(), "EVALIDATE");

        let err = expect_error(customers.save(&cx, object(json!({"name": null}))).await);
        assert_eq!(err.inner_code(), Some("EREQUIRED"));

        assert!(adapter.rows("CustomerBase").is_empty());
    });
}

#[test]
fn saves_after_an_abort_run_each_listener_once() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let calls = Arc::new(AtomicUsize::new(0));
    let configuration = DataConfiguration::builder()
        .model(
            ModelSchema::new("Archive")
                .with_field(FieldSchema::new("id", "Counter").primary())
                .with_field(FieldSchema::new("title", "Text"))
                .with_listener("gate"),
        )
        .listener("gate", Arc::new(Gate { calls: calls.clone() }))
        .build();
    let adapter = Arc::new(MemoryAdapter::new());
    let context = DataContext::new(configuration, adapter.clone());
    let archive = context.model("Archive").unwrap();

    rt.block_on(async {
        let err = expect_error(
            archive
                .save(&cx, object(json!({"title": "draft", "locked": true})))
                .await,
        );
        assert_eq!(err.code(), "ENOTSUP");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let saved = unwrap_outcome(archive.save(&cx, object(json!({"title": "minutes"}))).await);
        assert_eq!(saved["title"], json!("minutes"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(adapter.rows("ArchiveBase").len(), 1);
    });
}

#[test]
fn failing_listener_aborts_before_storage() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let frozen = ModelSchema::new("Archive")
        .with_field(FieldSchema::new("id", "Counter").primary())
        .with_field(FieldSchema::new("title", "Text"))
        .with_listener("reject");
    let (context, adapter) = context(&[frozen]);
    let archive = context.model("Archive").unwrap();

    rt.block_on(async {
        unwrap_outcome(archive.migrate(&cx).await);
        adapter.clear_log();

        let err = expect_error(archive.save(&cx, object(json!({"title": "minutes"}))).await);
        assert_eq!(err.code(), "ENOTSUP");
        assert!(
            !adapter
                .statements()
                .iter()
                .any(|s| matches!(s, Statement::Insert { .. }))
        );
        assert!(adapter.rows("ArchiveBase").is_empty());
    });
}

#[test]
fn batch_failure_rolls_back_the_batch() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (context, adapter) = context(&[]);
    let customers = context.model("Customer").unwrap();

    rt.block_on(async {
        let err = expect_error(
            customers
                .save_many(
                    &cx,
                    vec![
                        object(json!({"name": "Alice"})),
                        object(json!({"name": "Bob"})),
                        object(json!({"email": "nameless@example.com"})),
                    ],
                )
                .await,
        );
        assert_eq!(err.code(), "ENULL");
        assert!(adapter.rows("CustomerBase").is_empty());
    });
}

#[test]
fn remove_deletes_the_stored_row() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (context, adapter) = context(&[]);
    let customers = context.model("Customer").unwrap();

    rt.block_on(async {
        unwrap_outcome(customers.save(&cx, object(json!({"name": "Alice"}))).await);
        unwrap_outcome(customers.remove(&cx, object(json!({"id": 1}))).await);
        assert!(adapter.rows("CustomerBase").is_empty());

        let err = expect_error(customers.remove(&cx, object(json!({"id": 1}))).await);
        assert_eq!(err.code(), "ENOTFOUND");
        let err = expect_error(customers.remove(&cx, object(json!({"name": "Alice"}))).await);
        assert_eq!(err.code(), "EKEY");
    });
}

#[test]
fn derived_models_store_inherited_values_in_the_base() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let party = ModelSchema::new("Party")
        .with_field(FieldSchema::new("id", "Counter").primary())
        .with_field(FieldSchema::new("name", "Text"));
    let employee = ModelSchema::new("Employee")
        .inherits("Party")
        .with_field(FieldSchema::new("salary", "Number"));
    let (context, adapter) = context(&[party, employee]);
    let employees = context.model("Employee").unwrap();

    rt.block_on(async {
        let saved = unwrap_outcome(
            employees
                .save(&cx, object(json!({"name": "Ann", "salary": 1200})))
                .await,
        );
        assert_eq!(saved["id"], json!(1));

        let parties = adapter.rows("PartyBase");
        assert_eq!(parties.len(), 1);
        assert_eq!(parties[0]["name"], json!("Ann"));
        let own = adapter.rows("EmployeeBase");
        assert_eq!(own.len(), 1);
        assert_eq!(own[0]["id"], json!(1));
        assert!(own[0].get("name").is_none());

        let rows = unwrap_outcome(employees.where_("name").equal("Ann").get_items(&cx).await);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["salary"], json!(1200));
        assert_eq!(rows[0]["name"], json!("Ann"));

        unwrap_outcome(employees.remove(&cx, object(json!({"id": 1}))).await);
        assert!(adapter.rows("EmployeeBase").is_empty());
        assert!(adapter.rows("PartyBase").is_empty());
    });
}

#[test]
fn abstract_models_cannot_be_saved() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let thing = ModelSchema::new("Thing")
        .abstract_model()
        .with_field(FieldSchema::new("id", "Counter").primary());
    let (context, _adapter) = context(&[thing]);
    let things = context.model("Thing").unwrap();

    rt.block_on(async {
        let err = expect_error(things.save(&cx, object(json!({}))).await);
        assert_eq!(err.code(), "EABSTRACT");
    });
}
