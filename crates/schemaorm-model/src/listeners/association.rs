//! Associated objects and collections carried by a saved object.

use asupersync::{Cx, Outcome};

use schemaorm_core::value::{self, Value};
use schemaorm_core::{BoxFuture, Error, try_outcome, try_result};

use crate::events::{DataEventArgs, DataEventListener, EventKind};

/// Resolves associated objects before a save and persists collections after it.
///
/// Before the save, an object assigned to a foreign-key attribute without its key
/// is looked up by its values and created when missing. After the save, arrays
/// assigned to collection attributes are linked to the saved object.
pub struct AssociationListener;

impl DataEventListener for AssociationListener {
    fn subscribes(&self, kind: EventKind) -> bool {
        matches!(kind, EventKind::BeforeSave | EventKind::AfterSave)
    }

    fn before_save<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let model = event.model.clone();
            let attributes = try_result!(model.attributes());
            for attribute in attributes.iter() {
                if attribute.is_many() || attribute.is_virtual() || attribute.nested {
                    continue;
                }
                let property = attribute.property_name();
                let Some(Value::Object(object)) = event.target.get(property) else {
                    continue;
                };
                let Some(mapping) = try_result!(model.infer_mapping(&attribute.name)) else {
                    continue;
                };
                if mapping.is_junction() || value::get_present(object, &mapping.parent_field).is_some() {
                    continue;
                }
                let object = object.clone();
                let parent = try_result!(model.sibling(&mapping.parent_model));
                let resolved = match try_outcome!(parent.silent(true).find(cx, &object).await) {
                    Some(found) => found,
                    None => {
                        tracing::debug!(
                            model = %model.name(),
                            attribute = %attribute.name,
                            parent = %parent.name(),
                            "Creating associated object"
                        );
                        try_outcome!(parent.save(cx, object).await)
                    }
                };
                event.target.insert(property.to_string(), Value::Object(resolved));
            }
            Outcome::Ok(())
        })
    }

    fn after_save<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let model = event.model.clone();
            let attributes = try_result!(model.attributes());
            for attribute in attributes
                .iter()
                .filter(|a| a.is_many() && a.is_owned_by(model.name()))
            {
                let property = attribute.property_name();
                let Some(Value::Array(items)) = event.target.get(property).cloned() else {
                    continue;
                };
                let association = try_result!(model.property(&event.target, &attribute.name));
                let saved = try_outcome!(association.persist(cx, items).await);
                event.target.insert(property.to_string(), Value::Array(saved));
            }
            Outcome::Ok(())
        })
    }
}
