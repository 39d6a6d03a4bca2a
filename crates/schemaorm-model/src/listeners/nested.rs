//! Embedded objects saved and removed with their owner.

use asupersync::{Cx, Outcome};

use schemaorm_core::value::{self, DataObject, Value};
use schemaorm_core::{
    AssociationMapping, BoxFuture, Error, FieldSchema, Result, try_outcome, try_result,
};
use schemaorm_query::Expr;

use crate::events::{DataEventArgs, DataEventListener, EventKind};
use crate::model::DataModel;

/// Persists embedded (`nested`) objects together with their owner.
///
/// A nested object whose key the owner stores is saved before the owner and
/// removed after it. A nested object that stores the owner's key (a virtual
/// one-to-one) is saved after the owner and removed before it.
pub struct NestedObjectListener;

/// Nested attributes of a model with their mappings.
fn nested_attributes(model: &DataModel) -> Result<Vec<(FieldSchema, AssociationMapping)>> {
    let mut nested = Vec::new();
    for attribute in model.attributes()?.iter() {
        if !attribute.nested || attribute.is_many() || model.is_primitive(&attribute.type_name) {
            continue;
        }
        if let Some(mapping) = model.infer_mapping(&attribute.name)? {
            if !mapping.is_junction() {
                nested.push((attribute.clone(), mapping));
            }
        }
    }
    Ok(nested)
}

impl DataEventListener for NestedObjectListener {
    fn subscribes(&self, kind: EventKind) -> bool {
        matches!(
            kind,
            EventKind::BeforeSave
                | EventKind::AfterSave
                | EventKind::BeforeRemove
                | EventKind::AfterRemove
        )
    }

    fn before_save<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let model = event.model.clone();
            for (attribute, mapping) in try_result!(nested_attributes(&model)) {
                if attribute.is_virtual() {
                    continue;
                }
                let property = attribute.property_name();
                let Some(Value::Object(object)) = event.target.get(property).cloned() else {
                    continue;
                };
                let parent = try_result!(model.sibling(&mapping.parent_model));
                let saved = try_outcome!(parent.save(cx, object).await);
                event.target.insert(property.to_string(), Value::Object(saved));
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
            for (attribute, mapping) in try_result!(nested_attributes(&model)) {
                if !attribute.is_virtual() {
                    continue;
                }
                let property = attribute.property_name();
                let Some(Value::Object(mut object)) = event.target.get(property).cloned() else {
                    continue;
                };
                let Some(key) = value::get_present(&event.target, &mapping.parent_field).cloned() else {
                    continue;
                };
                let child = try_result!(model.sibling(&mapping.child_model));
                if try_result!(child.key_of(&object)).is_none() {
                    // Replace the child already stored for this owner.
                    let existing = child
                        .silent(true)
                        .as_queryable()
                        .filter(
                            Expr::qualified(child.view_adapter(), &mapping.child_field)
                                .eq(key.clone()),
                        )
                        .flatten();
                    if let Some(existing) = try_outcome!(existing.first(cx).await) {
                        if let Some(existing_key) = try_result!(child.key_of(&existing)) {
                            let name = try_result!(child.primary_key()).property_name().to_string();
                            object.insert(name, existing_key);
                        }
                    }
                }
                object.insert(mapping.child_field.clone(), key);
                let saved = try_outcome!(child.save(cx, object).await);
                event.target.insert(property.to_string(), Value::Object(saved));
            }
            Outcome::Ok(())
        })
    }

    fn before_remove<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let model = event.model.clone();
            for (attribute, mapping) in try_result!(nested_attributes(&model)) {
                if !attribute.is_virtual() {
                    continue;
                }
                let Some(key) = event
                    .previous
                    .as_ref()
                    .and_then(|p| value::get_present(p, &mapping.parent_field))
                    .cloned()
                else {
                    continue;
                };
                let child = try_result!(model.sibling(&mapping.child_model));
                let children = try_outcome!(
                    child
                        .silent(true)
                        .as_queryable()
                        .filter(Expr::qualified(child.view_adapter(), &mapping.child_field).eq(key))
                        .flatten()
                        .all(cx)
                        .await
                );
                if !children.is_empty() {
                    tracing::debug!(
                        model = %model.name(),
                        attribute = %attribute.name,
                        count = children.len(),
                        "Removing nested objects"
                    );
                    try_outcome!(child.remove_many(cx, children).await);
                }
            }
            Outcome::Ok(())
        })
    }

    fn after_remove<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let model = event.model.clone();
            for (attribute, mapping) in try_result!(nested_attributes(&model)) {
                if attribute.is_virtual() {
                    continue;
                }
                let Some(key) = event
                    .previous
                    .as_ref()
                    .and_then(|p| value::get_present(p, &mapping.child_field))
                    .cloned()
                else {
                    continue;
                };
                let parent = try_result!(model.sibling(&mapping.parent_model));
                let mut lookup = DataObject::new();
                lookup.insert(mapping.parent_field.clone(), key);
                if try_outcome!(parent.silent(true).find(cx, &lookup).await).is_some() {
                    try_outcome!(parent.remove(cx, lookup).await);
                }
            }
            Outcome::Ok(())
        })
    }
}
