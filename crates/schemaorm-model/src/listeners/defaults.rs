//! Default attribute values for inserts.

use asupersync::{Cx, Outcome};

use schemaorm_core::value;
use schemaorm_core::{BoxFuture, Error, try_outcome, try_result};

use super::evaluate;
use crate::events::{DataEventArgs, DataEventListener, DataState, EventKind};

/// Fills unset attributes of an inserted object from their `value` expressions.
pub struct DefaultValueListener;

impl DataEventListener for DefaultValueListener {
    fn subscribes(&self, kind: EventKind) -> bool {
        kind == EventKind::BeforeSave
    }

    fn before_save<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            if event.state != DataState::Insert {
                return Outcome::Ok(());
            }
            let attributes = try_result!(event.model.attributes());
            for attribute in attributes.iter() {
                let Some(expression) = &attribute.value else {
                    continue;
                };
                if !value::is_empty(event.target.get(attribute.property_name())) {
                    continue;
                }
                let computed = try_outcome!(evaluate(cx, event, attribute, expression).await);
                if !computed.is_null() {
                    event
                        .target
                        .insert(attribute.property_name().to_string(), computed);
                }
            }
            Outcome::Ok(())
        })
    }
}
