//! Association mapping inference.
//!
//! Mappings are inferred from naming conventions, overlaid with the explicit
//! `mapping` block of the field, re-pointed to the current model when they name an
//! ancestor, and cached per (model, field) in the configuration.

use schemaorm_core::{
    AssociationMapping, CascadeAction, Error, FieldSchema, Result, inflection,
};

use crate::model::DataModel;

/// Link columns of a junction that stores values of a primitive attribute.
const TAG_OBJECT_FIELD: &str = "object";
const TAG_VALUE_FIELD: &str = "value";
/// Link columns of every other junction.
const LEGACY_OBJECT_FIELD: &str = "parentId";
const LEGACY_VALUE_FIELD: &str = "valueId";

impl DataModel {
    /// The association mapping of an attribute, or `None` for a plain value.
    ///
    /// Calling this twice returns structurally equal mappings; the first result is
    /// cached until a model definition is replaced.
    pub fn infer_mapping(&self, name: &str) -> Result<Option<AssociationMapping>> {
        let configuration = self.configuration();
        let attribute = self.get_attribute(name)?;
        if let Some(cached) = configuration.cached_mapping(self.name(), &attribute.name) {
            return Ok(cached);
        }
        let mapping = self.resolve_mapping(&attribute)?;
        configuration.cache_mapping(self.name(), &attribute.name, mapping.clone());
        Ok(mapping)
    }

    fn resolve_mapping(&self, attribute: &FieldSchema) -> Result<Option<AssociationMapping>> {
        let owner = attribute.model.as_deref().unwrap_or(self.name()).to_string();
        let Some(mut mapping) = self.convention_mapping(attribute, &owner)? else {
            return Ok(None);
        };
        if let Some(explicit) = &attribute.mapping {
            let inferred = mapping.association_type;
            mapping.merge(explicit)?;
            if mapping.association_type != inferred && !self.declares_many(&attribute.name) {
                tracing::warn!(
                    model = %self.name(),
                    field = %attribute.name,
                    "Explicit mapping overrides the association type inferred from the field name"
                );
            }
        }
        if mapping.is_junction() {
            let tag_convention = match &mapping.refers_to {
                Some(refers_to) => self
                    .attribute(refers_to)?
                    .is_some_and(|referred| self.is_primitive(&referred.type_name)),
                None => false,
            };
            let (object, value) = if tag_convention {
                (TAG_OBJECT_FIELD, TAG_VALUE_FIELD)
            } else {
                (LEGACY_OBJECT_FIELD, LEGACY_VALUE_FIELD)
            };
            if mapping.association_object_field.is_none() {
                mapping.association_object_field = Some(object.to_string());
            }
            if mapping.association_value_field.is_none() {
                mapping.association_value_field = Some(value.to_string());
            }
        }
        if !owner.eq_ignore_ascii_case(self.name()) {
            self.substitute_supertype(&mut mapping, attribute, &owner)?;
        }
        tracing::debug!(
            model = %self.name(),
            field = %attribute.name,
            kind = ?mapping.association_type,
            parent = %mapping.parent_model,
            child = %mapping.child_model,
            "Association mapping resolved"
        );
        Ok(Some(mapping))
    }

    /// True if the definition that declares `name` states its cardinality.
    fn declares_many(&self, name: &str) -> bool {
        if let Some(field) = self.field(name) {
            return field.many.is_some();
        }
        self.base()
            .ok()
            .flatten()
            .is_some_and(|base| base.declares_many(name))
    }

    fn convention_mapping(
        &self,
        attribute: &FieldSchema,
        owner: &str,
    ) -> Result<Option<AssociationMapping>> {
        if self.is_primitive(&attribute.type_name) {
            if !attribute.is_many() {
                return Ok(None);
            }
            let key = self.primary_key()?;
            let adapter = format!("{owner}{}", inflection::upper_first(&attribute.name));
            return Ok(Some(
                AssociationMapping::junction(
                    adapter,
                    owner,
                    key.name,
                    attribute.type_name.clone(),
                    TAG_VALUE_FIELD,
                )
                .cascade(CascadeAction::Delete)
                .refers_to(attribute.name.clone()),
            ));
        }

        let associated = self.context().model(&attribute.type_name).map_err(|_| {
            Error::AssociationShape {
                model: self.name().to_string(),
                field: attribute.name.clone(),
                message: format!("associated model `{}` is not defined", attribute.type_name),
            }
        })?;
        let associated_key = associated.primary_key()?.name;

        if attribute.is_virtual() {
            let reverse = self.reverse_fields(&associated, owner)?;
            let Some(reverse) = reverse.first() else {
                return Err(Error::AssociationShape {
                    model: self.name().to_string(),
                    field: attribute.name.clone(),
                    message: format!("`{}` has no field referencing `{owner}`", associated.name()),
                });
            };
            return Ok(Some(AssociationMapping::association(
                owner,
                self.primary_key()?.name,
                associated.name(),
                reverse.name.clone(),
            )));
        }

        if !attribute.is_many() {
            return Ok(Some(AssociationMapping::association(
                associated.name(),
                associated_key,
                owner,
                attribute.name.clone(),
            )));
        }

        let reverse = self.reverse_fields(&associated, owner)?;
        let singles: Vec<&FieldSchema> = reverse.iter().filter(|f| !f.is_many()).collect();
        if let [single] = singles.as_slice() {
            return Ok(Some(AssociationMapping::association(
                owner,
                self.primary_key()?.name,
                associated.name(),
                single.name.clone(),
            )));
        }

        // Collections on both sides share one junction, kept by the model whose
        // name sorts first. From the other side the associated model is the parent.
        let collections: Vec<&FieldSchema> = reverse.iter().filter(|f| f.is_many()).collect();
        if let [other] = collections.as_slice() {
            if associated.name().to_ascii_lowercase() < owner.to_ascii_lowercase() {
                let adapter = format!("{}{}", associated.name(), inflection::upper_first(&other.name));
                return Ok(Some(
                    AssociationMapping::junction(
                        adapter,
                        associated.name(),
                        associated_key,
                        owner,
                        self.primary_key()?.name,
                    )
                    .cascade(CascadeAction::Delete),
                ));
            }
        }

        let adapter = format!("{owner}{}", inflection::upper_first(&attribute.name));
        Ok(Some(
            AssociationMapping::junction(
                adapter,
                owner,
                self.primary_key()?.name,
                associated.name(),
                associated_key,
            )
            .cascade(CascadeAction::Delete),
        ))
    }

    /// Attributes of `associated` whose type is `owner` or this model.
    fn reverse_fields(&self, associated: &DataModel, owner: &str) -> Result<Vec<FieldSchema>> {
        Ok(associated
            .attributes()?
            .iter()
            .filter(|f| {
                f.type_name.eq_ignore_ascii_case(owner) || f.type_name.eq_ignore_ascii_case(self.name())
            })
            .cloned()
            .collect())
    }

    /// Re-point an inherited attribute's mapping to this model.
    ///
    /// Only the side holding the attribute moves: the child when the attribute
    /// stores the key or is the value side of a junction, the parent otherwise.
    /// The other side keeps naming the model it was declared against, which may
    /// itself be an ancestor.
    fn substitute_supertype(
        &self,
        mapping: &mut AssociationMapping,
        attribute: &FieldSchema,
        owner: &str,
    ) -> Result<()> {
        let child_side = if mapping.is_junction() {
            !mapping.parent_model.eq_ignore_ascii_case(owner)
                && mapping.child_model.eq_ignore_ascii_case(owner)
        } else {
            mapping.child_model.eq_ignore_ascii_case(owner) && mapping.child_field == attribute.name
        };
        if child_side {
            mapping.child_model = self.name().to_string();
        } else if mapping.parent_model.eq_ignore_ascii_case(owner) {
            mapping.parent_model = self.name().to_string();
        } else {
            return Err(Error::Mapping {
                model: self.name().to_string(),
                field: attribute.name.clone(),
                message: format!(
                    "cannot rebind an association between `{}` and `{}` inherited from `{owner}`",
                    mapping.parent_model, mapping.child_model
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::DataConfiguration;
    use crate::context::DataContext;
    use schemaorm_core::{AssociationType, FieldMappingSchema, ModelSchema};
    use schemaorm_memory::MemoryAdapter;
    use std::sync::Arc;

    fn context() -> DataContext {
        let configuration = DataConfiguration::builder()
            .model(
                ModelSchema::new("Party")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("name", "Text")),
            )
            .model(
                ModelSchema::new("Customer")
                    .inherits("Party")
                    .with_field(FieldSchema::new("orders", "Order"))
                    .with_field(FieldSchema::new("skills", "Text").many(true))
                    .with_field(FieldSchema::new("groups", "Group")),
            )
            .model(
                ModelSchema::new("Order")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("customer", "Customer")),
            )
            .model(
                ModelSchema::new("Group")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("title", "Text")),
            )
            .model(
                ModelSchema::new("Note")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("author", "Party").mapping(FieldMappingSchema {
                        cascade: Some("delete".into()),
                        ..FieldMappingSchema::default()
                    })),
            )
            .build();
        DataContext::new(configuration, Arc::new(MemoryAdapter::new()))
    }

    #[test]
    fn foreign_key_association() {
        let order = context().model("Order").unwrap();
        let mapping = order.infer_mapping("customer").unwrap().unwrap();
        assert_eq!(mapping.association_type, AssociationType::Association);
        assert_eq!(mapping.parent_model, "Customer");
        assert_eq!(mapping.parent_field, "id");
        assert_eq!(mapping.child_model, "Order");
        assert_eq!(mapping.child_field, "customer");
        assert_eq!(mapping.cascade, CascadeAction::None);
    }

    #[test]
    fn one_to_many_through_reverse_field() {
        let customer = context().model("Customer").unwrap();
        let mapping = customer.infer_mapping("orders").unwrap().unwrap();
        assert_eq!(mapping.parent_model, "Customer");
        assert_eq!(mapping.child_model, "Order");
        assert_eq!(mapping.child_field, "customer");
    }

    #[test]
    fn many_without_reverse_field_is_a_junction() {
        let customer = context().model("Customer").unwrap();
        let mapping = customer.infer_mapping("groups").unwrap().unwrap();
        assert!(mapping.is_junction());
        assert_eq!(mapping.association_adapter.as_deref(), Some("CustomerGroups"));
        assert_eq!(mapping.object_field(), "parentId");
        assert_eq!(mapping.value_field(), "valueId");
        assert_eq!(mapping.cascade, CascadeAction::Delete);
    }

    #[test]
    fn primitive_many_is_a_tag_junction() {
        let customer = context().model("Customer").unwrap();
        let mapping = customer.infer_mapping("skills").unwrap().unwrap();
        assert!(mapping.is_junction());
        assert_eq!(mapping.association_adapter.as_deref(), Some("CustomerSkills"));
        assert_eq!(mapping.child_model, "Text");
        assert_eq!(mapping.object_field(), "object");
        assert_eq!(mapping.value_field(), "value");
        assert!(customer.infer_mapping("name").unwrap().is_none());
    }

    #[test]
    fn explicit_mapping_wins() {
        let note = context().model("Note").unwrap();
        let mapping = note.infer_mapping("author").unwrap().unwrap();
        assert_eq!(mapping.cascade, CascadeAction::Delete);
        assert_eq!(mapping.parent_model, "Party");
    }

    #[test]
    fn mapping_inference_is_deterministic() {
        let context = context();
        let first = context.model("Customer").unwrap().infer_mapping("groups").unwrap();
        let second = context.model("Customer").unwrap().infer_mapping("groups").unwrap();
        assert_eq!(first, second);
    }

    fn people() -> DataContext {
        let configuration = DataConfiguration::builder()
            .model(
                ModelSchema::new("Person")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("name", "Text"))
                    .with_field(FieldSchema::new("parent", "Person"))
                    .with_field(FieldSchema::new("orders", "Order").many(true)),
            )
            .model(
                ModelSchema::new("Employee")
                    .inherits("Person")
                    .with_field(FieldSchema::new("manager", "Person")),
            )
            .model(
                ModelSchema::new("Order")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("customer", "Person")),
            )
            .build();
        DataContext::new(configuration, Arc::new(MemoryAdapter::new()))
    }

    #[test]
    fn own_attributes_of_derived_models_are_not_rebound() {
        let employee = people().model("Employee").unwrap();
        let mapping = employee.infer_mapping("manager").unwrap().unwrap();
        assert_eq!(mapping.parent_model, "Person");
        assert_eq!(mapping.child_model, "Employee");
        assert_eq!(mapping.child_field, "manager");
    }

    #[test]
    fn inherited_attributes_are_rebound_to_the_derived_model() {
        let context = people();
        let employee = context.model("Employee").unwrap();

        let parent = employee.infer_mapping("parent").unwrap().unwrap();
        assert_eq!(parent.parent_model, "Person");
        assert_eq!(parent.child_model, "Employee");
        assert_eq!(parent.child_field, "parent");

        let orders = employee.infer_mapping("orders").unwrap().unwrap();
        assert_eq!(orders.parent_model, "Employee");
        assert_eq!(orders.child_model, "Order");
        assert_eq!(orders.child_field, "customer");

        let declared = context.model("Person").unwrap().infer_mapping("parent").unwrap().unwrap();
        assert_eq!(declared.parent_model, "Person");
        assert_eq!(declared.child_model, "Person");
    }

    #[test]
    fn collections_on_both_sides_share_one_junction() {
        let configuration = DataConfiguration::builder()
            .model(
                ModelSchema::new("Student")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("courses", "Course").many(true)),
            )
            .model(
                ModelSchema::new("Course")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("students", "Student").many(true)),
            )
            .build();
        let context = DataContext::new(configuration, Arc::new(MemoryAdapter::new()));
        let from_student = context.model("Student").unwrap().infer_mapping("courses").unwrap().unwrap();
        let from_course = context.model("Course").unwrap().infer_mapping("students").unwrap().unwrap();

        assert!(from_student.is_junction());
        assert_eq!(from_student.association_adapter.as_deref(), Some("CourseStudents"));
        assert_eq!(from_student.parent_model, "Course");
        assert_eq!(from_student.child_model, "Student");
        assert!(from_student.same_association(&from_course));
    }

    #[test]
    fn missing_associated_model_is_a_shape_error() {
        let configuration = DataConfiguration::builder()
            .model(
                ModelSchema::new("Order")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("vendor", "Vendor")),
            )
            .build();
        let context = DataContext::new(configuration, Arc::new(MemoryAdapter::new()));
        let err = context
            .model("Order")
            .unwrap()
            .infer_mapping("vendor")
            .unwrap_err();
        assert_eq!(err.code(), "EJUNC");
    }
}
