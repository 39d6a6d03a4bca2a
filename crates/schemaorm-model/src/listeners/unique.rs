//! Unique constraint checks.

use asupersync::{Cx, Outcome};

use schemaorm_core::value::{self, Value};
use schemaorm_core::{BoxFuture, Error, try_outcome, try_result};
use schemaorm_query::Expr;

use crate::events::{DataEventArgs, DataEventListener, DataState, EventKind};

/// Rejects a save that would duplicate the values of a `unique` constraint.
///
/// A constraint is only checked when the target carries a value for every one of
/// its attributes. Stored values never complete a partial update.
pub struct UniqueConstraintListener;

impl DataEventListener for UniqueConstraintListener {
    fn subscribes(&self, kind: EventKind) -> bool {
        kind == EventKind::BeforeSave
    }

    fn before_save<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let model = &event.model;
            let schema = model.schema();
            if schema.unique_constraints().next().is_none() {
                return Outcome::Ok(());
            }
            let view = model.view_adapter();
            let key = try_result!(model.primary_key());
            'constraints: for constraint in schema.unique_constraints() {
                let mut query = model.silent(true).as_queryable().flatten();
                for name in &constraint.fields {
                    let attribute = try_result!(model.get_attribute(name));
                    let property = attribute.property_name();
                    let found = match event.target.get(property) {
                        Some(Value::Object(nested)) => match try_result!(model.infer_mapping(&attribute.name)) {
                            Some(mapping) => nested.get(&mapping.parent_field).cloned(),
                            None => None,
                        },
                        other => other.cloned(),
                    };
                    let Some(found) = found.filter(|v| !v.is_null()) else {
                        continue 'constraints;
                    };
                    query = query.filter(Expr::qualified(&view, &attribute.name).eq(found));
                }
                let Some(existing) = try_outcome!(query.first(cx).await) else {
                    continue;
                };
                if event.state == DataState::Update {
                    let own = try_result!(model.key_of(&event.target));
                    let same = match (own, value::get_present(&existing, &key.name)) {
                        (Some(own), Some(other)) => value::equals(&own, other),
                        _ => false,
                    };
                    if same {
                        continue;
                    }
                }
                tracing::debug!(
                    model = %model.name(),
                    fields = ?constraint.fields,
                    "Unique constraint violated"
                );
                return Outcome::Err(Error::UniqueConstraint {
                    model: model.name().to_string(),
                    fields: constraint.fields.clone(),
                });
            }
            Outcome::Ok(())
        })
    }
}
