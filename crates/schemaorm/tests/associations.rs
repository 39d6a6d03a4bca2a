use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};
use serde_json::json;

use schemaorm::prelude::*;

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

fn object(value: serde_json::Value) -> DataObject {
    value.as_object().cloned().expect("object literal")
}

fn context() -> (DataContext, Arc<MemoryAdapter>) {
    let configuration = DataConfiguration::builder()
        .model(
            ModelSchema::new("Person")
                .with_field(FieldSchema::new("id", "Counter").primary())
                .with_field(FieldSchema::new("name", "Text"))
                .with_field(FieldSchema::new("skills", "Text").many(true))
                .with_field(FieldSchema::new("groups", "Group").many(true)),
        )
        .model(
            ModelSchema::new("Group")
                .with_field(FieldSchema::new("id", "Counter").primary())
                .with_field(FieldSchema::new("title", "Text")),
        )
        .model(
            ModelSchema::new("Customer")
                .with_field(FieldSchema::new("id", "Counter").primary())
                .with_field(FieldSchema::new("name", "Text"))
                .with_field(FieldSchema::new("orders", "Order").many(true)),
        )
        .model(
            ModelSchema::new("Order")
                .with_field(FieldSchema::new("id", "Counter").primary())
                .with_field(FieldSchema::new("product", "Text"))
                .with_field(FieldSchema::new("customer", "Customer").expandable()),
        )
        .build();
    let adapter = Arc::new(MemoryAdapter::new());
    (DataContext::new(configuration, adapter.clone()), adapter)
}

fn sorted_text(values: &serde_json::Value) -> Vec<String> {
    let mut texts: Vec<String> = values
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|v| v.as_str().map(ToString::to_string))
        .collect();
    texts.sort();
    texts
}

#[test]
fn tags_are_linked_once() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (context, adapter) = context();
    let people = context.model("Person").unwrap();

    rt.block_on(async {
        let ann = unwrap_outcome(people.save(&cx, object(json!({"name": "Ann"}))).await);
        let skills = people.property(&ann, "skills").unwrap();
        assert_eq!(skills.kind(), AssociationKind::Tag);

        unwrap_outcome(skills.insert(&cx, vec![json!("rust"), json!("go")]).await);
        unwrap_outcome(skills.insert(&cx, vec![json!("rust"), json!("go")]).await);
        assert_eq!(adapter.rows("PersonSkills").len(), 2);

        let links = unwrap_outcome(skills.get_items(&cx).await);
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l["object"] == ann["id"]));

        unwrap_outcome(skills.remove(&cx, vec![json!("go")]).await);
        let links = adapter.rows("PersonSkills");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0]["value"], json!("rust"));

        unwrap_outcome(skills.remove_all(&cx).await);
        assert!(adapter.rows("PersonSkills").is_empty());
    });
}

#[test]
fn arrays_assigned_on_save_are_persisted() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (context, adapter) = context();
    let people = context.model("Person").unwrap();

    rt.block_on(async {
        let saved = unwrap_outcome(
            people
                .save(
                    &cx,
                    object(json!({
                        "name": "Ann",
                        "skills": ["sql", "rust"],
                        "groups": [{"title": "Admins"}]
                    })),
                )
                .await,
        );
        assert_eq!(adapter.rows("PersonSkills").len(), 2);
        // The group did not exist, so it was created before linking.
        let groups = adapter.rows("GroupBase");
        assert_eq!(groups.len(), 1);
        let links = adapter.rows("PersonGroups");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0]["parentId"], saved["id"]);
        assert_eq!(links[0]["valueId"], groups[0]["id"]);

        let rows = unwrap_outcome(
            people
                .where_("name")
                .equal("Ann")
                .expand(&["skills", "groups"])
                .get_items(&cx)
                .await,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(sorted_text(&rows[0]["skills"]), vec!["rust", "sql"]);
        assert_eq!(rows[0]["groups"][0]["title"], json!("Admins"));

        // Unlink through a removal marker.
        unwrap_outcome(
            people
                .save(
                    &cx,
                    object(json!({
                        "id": saved["id"],
                        "groups": [{"id": groups[0]["id"], "$state": 4}]
                    })),
                )
                .await,
        );
        assert!(adapter.rows("PersonGroups").is_empty());
        assert_eq!(adapter.rows("GroupBase").len(), 1);
    });
}

#[test]
fn selecting_a_collection_expands_it() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (context, _adapter) = context();
    let people = context.model("Person").unwrap();

    rt.block_on(async {
        unwrap_outcome(
            people
                .save(&cx, object(json!({"name": "Ann", "groups": [{"title": "Staff"}]})))
                .await,
        );
        let rows = unwrap_outcome(people.select(&["name", "groups"]).get_items(&cx).await);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("Ann"));
        assert_eq!(rows[0]["groups"][0]["title"], json!("Staff"));
        assert!(rows[0].get("id").is_none());
    });
}

#[test]
fn one_to_many_children_are_adopted() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (context, adapter) = context();
    let customers = context.model("Customer").unwrap();
    let orders = context.model("Order").unwrap();

    rt.block_on(async {
        let alice = unwrap_outcome(
            customers
                .save(
                    &cx,
                    object(json!({
                        "name": "Alice",
                        "orders": [{"product": "lamp"}, {"product": "desk"}]
                    })),
                )
                .await,
        );
        let stored = adapter.rows("OrderBase");
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|o| o["customer"] == alice["id"]));

        let association = customers.property(&alice, "orders").unwrap();
        assert_eq!(association.kind(), AssociationKind::HasMany);
        assert_eq!(unwrap_outcome(association.get_items(&cx).await).len(), 2);

        // Releasing a child clears its key but keeps the row.
        let first = stored[0]["id"].clone();
        unwrap_outcome(association.remove(&cx, vec![first]).await);
        assert_eq!(adapter.rows("OrderBase").len(), 2);
        assert_eq!(unwrap_outcome(association.get_items(&cx).await).len(), 1);

        let customer = unwrap_outcome(
            customers
                .where_("name")
                .equal("Alice")
                .expand(&["orders"])
                .first(&cx)
                .await,
        )
        .expect("customer");
        assert_eq!(customer["orders"].as_array().map(Vec::len), Some(1));

        let remaining = unwrap_outcome(orders.where_("customer/name").equal("Alice").count(&cx).await);
        assert_eq!(remaining, 1);
    });
}

#[test]
fn parents_are_resolved_and_expanded() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (context, adapter) = context();
    let orders = context.model("Order").unwrap();

    rt.block_on(async {
        // An associated object without a key is created on the fly.
        unwrap_outcome(
            orders
                .save(&cx, object(json!({"product": "lamp", "customer": {"name": "Zoe"}})))
                .await,
        );
        // The second save finds it by its values.
        unwrap_outcome(
            orders
                .save(&cx, object(json!({"product": "desk", "customer": {"name": "Zoe"}})))
                .await,
        );
        assert_eq!(adapter.rows("CustomerBase").len(), 1);

        let rows = unwrap_outcome(orders.as_queryable().order_by("product").get_items(&cx).await);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["product"], json!("desk"));
        assert_eq!(rows[0]["customer"]["name"], json!("Zoe"));

        let flat = unwrap_outcome(orders.as_queryable().flatten().get_items(&cx).await);
        assert!(flat[0]["customer"].is_number());

        let parent = orders.property(&rows[0], "customer").unwrap();
        assert_eq!(parent.kind(), AssociationKind::HasParent);
        let err = match parent.insert(&cx, vec![json!(1)]).await {
            Outcome::Err(e) => e,
            other => panic!("expected an error, got {other:?}"),
        };
        assert_eq!(err.code(), "ENOTSUP");
    });
}

#[test]
fn levels_bound_nested_expansion() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let configuration = DataConfiguration::builder()
        .model(
            ModelSchema::new("Country")
                .with_field(FieldSchema::new("id", "Counter").primary())
                .with_field(FieldSchema::new("name", "Text")),
        )
        .model(
            ModelSchema::new("Customer")
                .with_field(FieldSchema::new("id", "Counter").primary())
                .with_field(FieldSchema::new("name", "Text"))
                .with_field(FieldSchema::new("country", "Country").expandable()),
        )
        .model(
            ModelSchema::new("Order")
                .with_field(FieldSchema::new("id", "Counter").primary())
                .with_field(FieldSchema::new("product", "Text"))
                .with_field(FieldSchema::new("customer", "Customer").expandable()),
        )
        .build();
    let context = DataContext::new(configuration, Arc::new(MemoryAdapter::new()));
    let countries = context.model("Country").unwrap();
    let customers = context.model("Customer").unwrap();
    let orders = context.model("Order").unwrap();

    rt.block_on(async {
        let greece = unwrap_outcome(countries.save(&cx, object(json!({"name": "Greece"}))).await);
        let alice = unwrap_outcome(
            customers
                .save(&cx, object(json!({"name": "Alice", "country": greece["id"]})))
                .await,
        );
        unwrap_outcome(
            orders
                .save(&cx, object(json!({"product": "lamp", "customer": alice["id"]})))
                .await,
        );

        // One level by default: the customer is expanded, its country is not.
        let rows = unwrap_outcome(orders.as_queryable().get_items(&cx).await);
        assert_eq!(rows[0]["customer"]["name"], json!("Alice"));
        assert_eq!(rows[0]["customer"]["country"], greece["id"]);

        let rows = unwrap_outcome(orders.as_queryable().levels(2).get_items(&cx).await);
        assert_eq!(rows[0]["customer"]["country"]["name"], json!("Greece"));

        let rows = unwrap_outcome(orders.as_queryable().levels(0).get_items(&cx).await);
        assert_eq!(rows[0]["customer"], alice["id"]);
    });
}
