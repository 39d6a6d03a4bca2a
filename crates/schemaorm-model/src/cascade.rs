//! Referential actions on remove.
//!
//! Before an object is removed, every association that references its model is
//! visited in turn. Foreign-key dependents are refused, detached or removed
//! according to the association's cascade action; junction rows are refused or
//! deleted. The first failure stops the walk and the remove is not executed.

use asupersync::{Cx, Outcome};

use schemaorm_core::value::{self, DataObject, Value};
use schemaorm_core::{
    AssociationMapping, BoxFuture, CascadeAction, Error, Result, try_outcome, try_result,
};
use schemaorm_query::{DeleteQuery, Expr, QueryExpression};

use crate::association::junction_model;
use crate::model::DataModel;

/// An association that references a model, with the model and field declaring it.
#[derive(Debug, Clone)]
pub(crate) struct ReferenceMapping {
    pub owner: String,
    pub field: String,
    pub mapping: AssociationMapping,
}

impl DataModel {
    /// Associations declared directly by any model whose referenced side is this
    /// model. Inherited fields are not visited again for each descendant.
    pub(crate) fn reference_mappings(&self) -> Result<Vec<ReferenceMapping>> {
        let mut references: Vec<ReferenceMapping> = Vec::new();
        for name in self.configuration().model_names() {
            let Some(schema) = self.configuration().model_schema(&name) else {
                continue;
            };
            let owner = self.sibling(&name)?;
            for field in &schema.fields {
                let mapping = match owner.infer_mapping(&field.name) {
                    Ok(Some(mapping)) => mapping,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(
                            model = %name,
                            field = %field.name,
                            error = %e,
                            "Skipping unresolved association"
                        );
                        continue;
                    }
                };
                let references_self = mapping.parent_model.eq_ignore_ascii_case(self.name())
                    || (mapping.is_junction()
                        && mapping.child_model.eq_ignore_ascii_case(self.name()));
                if !references_self {
                    continue;
                }
                // The side that stores the key carries the cascade action.
                let stores_key = !mapping.is_junction()
                    && mapping.child_model.eq_ignore_ascii_case(&name)
                    && mapping.child_field == field.name;
                let reference = ReferenceMapping {
                    owner: name.clone(),
                    field: field.name.clone(),
                    mapping,
                };
                match references
                    .iter()
                    .position(|r| r.mapping.same_association(&reference.mapping))
                {
                    Some(index) if stores_key => references[index] = reference,
                    Some(_) => {}
                    None => references.push(reference),
                }
            }
        }
        Ok(references)
    }
}

/// Apply the referential actions for the removal of `previous`, the stored row of
/// an object of `model`.
pub(crate) fn cascade<'a>(
    cx: &'a Cx,
    model: &'a DataModel,
    previous: &'a DataObject,
) -> BoxFuture<'a, Outcome<(), Error>> {
    Box::pin(async move {
        for reference in try_result!(model.reference_mappings()) {
            if reference.mapping.is_junction() {
                try_outcome!(cascade_junction(cx, model, previous, &reference).await);
            } else {
                try_outcome!(cascade_association(cx, model, previous, &reference).await);
            }
        }
        Outcome::Ok(())
    })
}

fn cascade_association<'a>(
    cx: &'a Cx,
    model: &'a DataModel,
    previous: &'a DataObject,
    reference: &'a ReferenceMapping,
) -> BoxFuture<'a, Outcome<(), Error>> {
    Box::pin(async move {
        let mapping = &reference.mapping;
        let Some(key) = value::get_present(previous, &mapping.parent_field).cloned() else {
            return Outcome::Ok(());
        };
        let child = try_result!(model.sibling(&mapping.child_model));
        let dependents = child
            .silent(true)
            .as_queryable()
            .filter(Expr::qualified(child.view_adapter(), &mapping.child_field).eq(key))
            .flatten();
        let count = try_outcome!(dependents.count(cx).await);
        if count == 0 {
            return Outcome::Ok(());
        }
        match &mapping.cascade {
            CascadeAction::None => Outcome::Err(Error::ReferentialIntegrity {
                model: model.name().to_string(),
                child_model: child.name().to_string(),
                child_field: mapping.child_field.clone(),
            }),
            CascadeAction::Null | CascadeAction::Default => {
                let child_key = try_result!(child.primary_key());
                let field = try_result!(child.get_attribute(&mapping.child_field));
                let rows = try_outcome!(dependents.all(cx).await);
                let detached: Vec<DataObject> = rows
                    .iter()
                    .filter_map(|row| value::get_present(row, &child_key.name))
                    .map(|id| {
                        let mut object = DataObject::new();
                        object.insert(child_key.property_name().to_string(), id.clone());
                        object.insert(field.property_name().to_string(), Value::Null);
                        object
                    })
                    .collect();
                tracing::info!(
                    model = %model.name(),
                    child = %child.name(),
                    field = %mapping.child_field,
                    count,
                    "Detaching dependents"
                );
                try_outcome!(child.silent(true).update_many(cx, detached).await);
                Outcome::Ok(())
            }
            CascadeAction::Delete => {
                let rows = try_outcome!(dependents.all(cx).await);
                tracing::info!(
                    model = %model.name(),
                    child = %child.name(),
                    field = %mapping.child_field,
                    count,
                    "Removing dependents"
                );
                child.remove_many(cx, rows).await
            }
            CascadeAction::Other(action) => Outcome::Err(Error::CascadePolicy {
                model: reference.owner.clone(),
                field: reference.field.clone(),
                action: action.clone(),
            }),
        }
    })
}

fn cascade_junction<'a>(
    cx: &'a Cx,
    model: &'a DataModel,
    previous: &'a DataObject,
    reference: &'a ReferenceMapping,
) -> BoxFuture<'a, Outcome<(), Error>> {
    Box::pin(async move {
        let mapping = &reference.mapping;
        let (column, key_field) = if mapping.parent_model.eq_ignore_ascii_case(model.name()) {
            (mapping.object_field(), &mapping.parent_field)
        } else {
            (mapping.value_field(), &mapping.child_field)
        };
        let Some(key) = value::get_present(previous, key_field).cloned() else {
            return Outcome::Ok(());
        };
        let owner = try_result!(model.sibling(&reference.owner));
        let junction = try_result!(junction_model(&owner, mapping, &reference.field));
        try_outcome!(junction.migrate(cx).await);
        let count = try_outcome!(
            junction
                .silent(true)
                .as_queryable()
                .filter(Expr::qualified(junction.view_adapter(), column).eq(key.clone()))
                .count(cx)
                .await
        );
        if count == 0 {
            return Outcome::Ok(());
        }
        match &mapping.cascade {
            CascadeAction::None => Outcome::Err(Error::ReferentialIntegrity {
                model: model.name().to_string(),
                child_model: junction.name().to_string(),
                child_field: column.to_string(),
            }),
            CascadeAction::Null | CascadeAction::Default | CascadeAction::Delete => {
                tracing::info!(
                    model = %model.name(),
                    junction = %junction.name(),
                    count,
                    "Removing links"
                );
                let statement = QueryExpression::Delete(DeleteQuery {
                    entity: junction.source_adapter(),
                    filter: Some(Expr::field(column).eq(key)),
                });
                try_outcome!(model.adapter().execute(cx, &statement).await);
                Outcome::Ok(())
            }
            CascadeAction::Other(action) => Outcome::Err(Error::CascadePolicy {
                model: reference.owner.clone(),
                field: reference.field.clone(),
                action: action.clone(),
            }),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::DataConfiguration;
    use crate::context::DataContext;
    use schemaorm_core::{FieldSchema, ModelSchema};
    use schemaorm_memory::MemoryAdapter;
    use std::sync::Arc;

    fn context() -> DataContext {
        let configuration = DataConfiguration::builder()
            .model(
                ModelSchema::new("Customer")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("name", "Text"))
                    .with_field(FieldSchema::new("orders", "Order").many(true)),
            )
            .model(
                ModelSchema::new("Order")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("customer", "Customer")),
            )
            .model(
                ModelSchema::new("Tag")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("customers", "Customer").many(true)),
            )
            .build();
        DataContext::new(configuration, Arc::new(MemoryAdapter::new()))
    }

    #[test]
    fn both_sides_of_an_association_count_once() {
        let customer = context().model("Customer").unwrap();
        let references = customer.reference_mappings().unwrap();
        let associations: Vec<_> = references
            .iter()
            .filter(|r| !r.mapping.is_junction())
            .collect();
        assert_eq!(associations.len(), 1);
        assert_eq!(associations[0].mapping.child_model, "Order");
        assert_eq!(associations[0].mapping.child_field, "customer");
        assert_eq!(associations[0].owner, "Order");
    }

    #[test]
    fn junctions_reference_their_value_side() {
        let customer = context().model("Customer").unwrap();
        let references = customer.reference_mappings().unwrap();
        let junction = references
            .iter()
            .find(|r| r.mapping.is_junction())
            .expect("junction reference");
        assert_eq!(junction.owner, "Tag");
        assert_eq!(junction.mapping.child_model, "Customer");
    }

    #[test]
    fn unreferenced_models_have_no_references() {
        let order = context().model("Order").unwrap();
        assert!(order.reference_mappings().unwrap().is_empty());
    }
}
