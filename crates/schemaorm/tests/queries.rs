use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};
use serde::Deserialize;
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

const CUSTOMER: &str = r#"{
    "name": "Customer",
    "fields": [
        {"name": "id", "type": "Counter", "primary": true},
        {"name": "name", "type": "Text"},
        {"name": "city", "type": "Text"}
    ],
    "views": [
        {"name": "summary", "fields": [{"name": "name"}, {"name": "city", "property": "town"}]}
    ]
}"#;

const ORDER: &str = r#"{
    "name": "Order",
    "fields": [
        {"name": "id", "type": "Counter", "primary": true},
        {"name": "product", "type": "Text"},
        {"name": "price", "type": "Number"},
        {"name": "customer", "type": "Customer"}
    ]
}"#;

/// Two customers with five orders between them.
async fn seeded(cx: &Cx) -> DataContext {
    let configuration = DataConfiguration::builder()
        .model_json(CUSTOMER)
        .expect("customer definition")
        .model_json(ORDER)
        .expect("order definition")
        .build();
    let context = DataContext::new(configuration, Arc::new(MemoryAdapter::new()));
    let customers = context.model("Customer").unwrap();
    let orders = context.model("Order").unwrap();
    unwrap_outcome(
        customers
            .save_many(
                cx,
                vec![
                    object(json!({"name": "Alice", "city": "Athens"})),
                    object(json!({"name": "Bob", "city": "Berlin"})),
                ],
            )
            .await,
    );
    let rows = [
        ("lamp", 40, 1),
        ("desk", 250, 1),
        ("chair", 90, 1),
        ("shelf", 120, 2),
        ("rug", 60, 2),
    ];
    let orders_rows = rows
        .iter()
        .map(|(product, price, customer)| {
            object(json!({"product": product, "price": price, "customer": customer}))
        })
        .collect();
    unwrap_outcome(orders.save_many(cx, orders_rows).await);
    context
}

#[test]
fn list_returns_a_page_and_the_total() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let context = seeded(&cx).await;
        let orders = context.model("Order").unwrap();

        let page = unwrap_outcome(
            orders
                .as_queryable()
                .order_by("price")
                .skip(1)
                .take(2)
                .list(&cx)
                .await,
        );
        assert_eq!(page.total, 5);
        assert_eq!(page.skip, 1);
        let products: Vec<_> = page.value.iter().map(|o| o["product"].clone()).collect();
        assert_eq!(products, vec![json!("rug"), json!("chair")]);

        // `all` ignores paging.
        let everything = unwrap_outcome(orders.as_queryable().take(2).all(&cx).await);
        assert_eq!(everything.len(), 5);
    });
}

#[test]
fn filters_combine_with_and_and_or() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let context = seeded(&cx).await;
        let orders = context.model("Order").unwrap();

        let either = orders
            .where_("product")
            .equal("lamp")
            .or("product")
            .equal("rug");
        assert_eq!(unwrap_outcome(either.count(&cx).await), 2);

        let range = orders
            .where_("price")
            .greater_or_equal(60)
            .and("price")
            .lower_than(200);
        assert_eq!(unwrap_outcome(range.count(&cx).await), 3);

        let prefixed = orders.where_("product").starts_with("ch");
        let found = unwrap_outcome(prefixed.first(&cx).await).expect("chair");
        assert_eq!(found["product"], json!("chair"));

        let cheap = orders.where_("price").between(40, 60);
        assert_eq!(unwrap_outcome(cheap.count(&cx).await), 2);
    });
}

#[test]
fn attribute_paths_join_each_association_once() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let context = seeded(&cx).await;
        let orders = context.model("Order").unwrap();

        let athens = orders
            .where_("customer/city")
            .equal("Athens")
            .and("customer/name")
            .equal("Alice");
        assert_eq!(athens.query().joins.len(), 1);
        assert_eq!(unwrap_outcome(athens.count(&cx).await), 3);

        let rows = unwrap_outcome(
            orders
                .select(&["product", "customer/name as buyer"])
                .where_("price")
                .greater_than(100)
                .order_by("product")
                .get_items(&cx)
                .await,
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["product"], json!("desk"));
        assert_eq!(rows[0]["buyer"], json!("Alice"));
        assert_eq!(rows[1]["buyer"], json!("Bob"));
        assert!(rows[0].get("price").is_none());
    });
}

#[test]
fn expansions_survive_a_projection_without_their_key() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let context = seeded(&cx).await;
        let orders = context.model("Order").unwrap();

        let rows = unwrap_outcome(
            orders
                .select(&["id", "product"])
                .expand(&["customer"])
                .order_by("product")
                .get_items(&cx)
                .await,
        );
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0]["product"], json!("chair"));
        assert_eq!(rows[0]["customer"]["name"], json!("Alice"));
        assert_eq!(rows[3]["product"], json!("rug"));
        assert_eq!(rows[3]["customer"]["name"], json!("Bob"));
        assert!(rows[0].get("price").is_none());
    });
}

#[test]
fn mappings_are_inferred_deterministically() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let context = seeded(&cx).await;
        let orders = context.model("Order").unwrap();
        let first = orders.infer_mapping("customer").unwrap().expect("association");
        let second = orders.infer_mapping("customer").unwrap().expect("association");
        assert_eq!(first, second);
        assert_eq!(first.parent_model, "Customer");
        assert_eq!(first.parent_field, "id");
        assert_eq!(first.child_model, "Order");
        assert_eq!(first.child_field, "customer");
        assert!(orders.infer_mapping("product").unwrap().is_none());
    });
}

#[test]
fn aggregates_and_values() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let context = seeded(&cx).await;
        let orders = context.model("Order").unwrap();
        let all = orders.as_queryable();

        assert_eq!(unwrap_outcome(all.max(&cx, "price").await), json!(250));
        assert_eq!(unwrap_outcome(all.min(&cx, "price").await), json!(40));
        let average = unwrap_outcome(all.average(&cx, "price").await);
        assert_eq!(average.as_f64(), Some(112.0));

        let bob = orders.where_("customer/name").equal("Bob");
        assert_eq!(unwrap_outcome(bob.max(&cx, "price").await), json!(120));

        let product = unwrap_outcome(
            orders
                .select(&["product"])
                .order_by_descending("price")
                .value(&cx)
                .await,
        );
        assert_eq!(product, json!("desk"));
    });
}

#[test]
fn search_and_named_views() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let context = seeded(&cx).await;
        let customers = context.model("Customer").unwrap();

        let found = unwrap_outcome(customers.search("berl").get_items(&cx).await);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], json!("Bob"));

        let summary = unwrap_outcome(
            customers
                .select(&["summary"])
                .order_by("name")
                .get_items(&cx)
                .await,
        );
        assert_eq!(summary[0], object(json!({"name": "Alice", "town": "Athens"})));
    });
}

#[derive(Debug, Deserialize, PartialEq)]
struct Product {
    product: String,
    price: f64,
}

#[test]
fn rows_deserialize_into_types() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let context = seeded(&cx).await;
        let orders = context.model("Order").unwrap();
        let items: Vec<Product> = unwrap_outcome(
            orders
                .select(&["product", "price"])
                .order_by("price")
                .take(1)
                .typed_items(&cx)
                .await,
        );
        assert_eq!(
            items,
            vec![Product {
                product: "lamp".to_string(),
                price: 40.0,
            }]
        );
    });
}

#[test]
fn unknown_attributes_fail_when_run() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let context = seeded(&cx).await;
        let orders = context.model("Order").unwrap();
        let broken = orders.where_("colour").equal("red");
        match broken.get_items(&cx).await {
            Outcome::Err(e) => assert_eq!(e.code(), "ECONFIG"),
            other => panic!("expected an error, got {other:?}"),
        }
    });
}
