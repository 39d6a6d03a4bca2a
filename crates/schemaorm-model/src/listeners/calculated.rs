//! Calculated attribute values.

use asupersync::{Cx, Outcome};

use schemaorm_core::{BoxFuture, Error, try_outcome, try_result};

use super::evaluate;
use crate::events::{DataEventArgs, DataEventListener, EventKind};

/// Overwrites attributes that declare a `calculation` on every save.
pub struct CalculatedValueListener;

impl DataEventListener for CalculatedValueListener {
    fn subscribes(&self, kind: EventKind) -> bool {
        kind == EventKind::BeforeSave
    }

    fn before_save<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let model = event.model.clone();
            let attributes = try_result!(model.attributes());
            for attribute in attributes.iter().filter(|a| a.is_owned_by(model.name())) {
                let Some(expression) = &attribute.calculation else {
                    continue;
                };
                let computed = try_outcome!(evaluate(cx, event, attribute, expression).await);
                event
                    .target
                    .insert(attribute.property_name().to_string(), computed);
            }
            Outcome::Ok(())
        })
    }
}
