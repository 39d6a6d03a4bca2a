//! Not-null checks.

use asupersync::{Cx, Outcome};

use schemaorm_core::value;
use schemaorm_core::{BoxFuture, Error, try_result};

use crate::events::{DataEventArgs, DataEventListener, DataState, EventKind};

/// Last check of a save: a not-null attribute must have a value.
///
/// Inserts must provide every not-null attribute. Updates may omit one but never
/// set it to null.
pub struct NotNullListener;

impl DataEventListener for NotNullListener {
    fn subscribes(&self, kind: EventKind) -> bool {
        kind == EventKind::BeforeSave
    }

    fn before_save<'a>(
        &'a self,
        _cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let model = &event.model;
            let attributes = try_result!(model.attributes());
            for attribute in attributes.iter() {
                if attribute.nullable
                    || attribute.primary
                    || attribute.is_many()
                    || attribute.is_virtual()
                {
                    continue;
                }
                let found = event.target.get(attribute.property_name());
                let missing = match event.state {
                    DataState::Insert => value::is_empty(found),
                    _ => found.is_some_and(|v| v.is_null()),
                };
                if missing {
                    return Outcome::Err(Error::NotNull {
                        model: model.name().to_string(),
                        field: attribute.name.clone(),
                    });
                }
            }
            Outcome::Ok(())
        })
    }
}
