//! Resolved association metadata.
//!
//! An `AssociationMapping` is the fully resolved form of a relationship between two
//! models: either a foreign key (`association`) or a link table (`junction`). It is
//! produced by the mapping resolver from naming conventions and merged with the
//! explicit `mapping` block of the field definition.

use std::fmt;

use crate::error::{Error, Result};
use crate::field::FieldMappingSchema;

/// The kind of association.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AssociationType {
    /// Foreign key: the child model stores the parent's key in `child_field`.
    #[default]
    Association,
    /// Many-to-many through a link model (`association_adapter`).
    Junction,
}

impl AssociationType {
    /// Parse the schema spelling (`"association"`, `"junction"`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "association" => Some(AssociationType::Association),
            "junction" => Some(AssociationType::Junction),
            _ => None,
        }
    }
}

/// What happens to dependents when a referenced row is removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum CascadeAction {
    /// Refuse the removal while dependents exist.
    #[default]
    None,
    /// Set the referencing field to null.
    Null,
    /// Same as `Null`; kept for schemas that spell it this way.
    Default,
    /// Remove dependents.
    Delete,
    /// An unrecognized value, rejected when the cascade actually runs.
    Other(String),
}

impl CascadeAction {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "none" | "" => CascadeAction::None,
            "null" => CascadeAction::Null,
            "default" => CascadeAction::Default,
            "delete" => CascadeAction::Delete,
            _ => CascadeAction::Other(value.to_string()),
        }
    }
}

impl fmt::Display for CascadeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeAction::None => f.write_str("none"),
            CascadeAction::Null => f.write_str("null"),
            CascadeAction::Default => f.write_str("default"),
            CascadeAction::Delete => f.write_str("delete"),
            CascadeAction::Other(value) => f.write_str(value),
        }
    }
}

/// A resolved association between two models.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AssociationMapping {
    pub association_type: AssociationType,
    /// The referenced (one) side.
    pub parent_model: String,
    /// Usually the primary key of `parent_model`.
    pub parent_field: String,
    /// The referencing (many) side. For tag junctions, the primitive value type.
    pub child_model: String,
    /// The foreign key field on `child_model`, or the value column of a tag junction.
    pub child_field: String,
    pub cascade: CascadeAction,
    /// Link model name of a junction.
    pub association_adapter: Option<String>,
    /// Link column holding the parent key.
    pub association_object_field: Option<String>,
    /// Link column holding the child key (or the tag value).
    pub association_value_field: Option<String>,
    /// Attribute of the owning model this junction stores values for.
    pub refers_to: Option<String>,
}

impl AssociationMapping {
    /// A foreign-key association.
    pub fn association(
        parent_model: impl Into<String>,
        parent_field: impl Into<String>,
        child_model: impl Into<String>,
        child_field: impl Into<String>,
    ) -> Self {
        Self {
            association_type: AssociationType::Association,
            parent_model: parent_model.into(),
            parent_field: parent_field.into(),
            child_model: child_model.into(),
            child_field: child_field.into(),
            ..Self::default()
        }
    }

    /// A junction through the given link model.
    pub fn junction(
        adapter: impl Into<String>,
        parent_model: impl Into<String>,
        parent_field: impl Into<String>,
        child_model: impl Into<String>,
        child_field: impl Into<String>,
    ) -> Self {
        Self {
            association_type: AssociationType::Junction,
            association_adapter: Some(adapter.into()),
            parent_model: parent_model.into(),
            parent_field: parent_field.into(),
            child_model: child_model.into(),
            child_field: child_field.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn cascade(mut self, action: CascadeAction) -> Self {
        self.cascade = action;
        self
    }

    #[must_use]
    pub fn refers_to(mut self, field: impl Into<String>) -> Self {
        self.refers_to = Some(field.into());
        self
    }

    #[must_use]
    pub fn link_fields(mut self, object: impl Into<String>, value: impl Into<String>) -> Self {
        self.association_object_field = Some(object.into());
        self.association_value_field = Some(value.into());
        self
    }

    pub fn is_junction(&self) -> bool {
        self.association_type == AssociationType::Junction
    }

    /// Link column holding the parent key (`parentId` when unset).
    pub fn object_field(&self) -> &str {
        self.association_object_field.as_deref().unwrap_or("parentId")
    }

    /// Link column holding the child key (`valueId` when unset).
    pub fn value_field(&self) -> &str {
        self.association_value_field.as_deref().unwrap_or("valueId")
    }

    /// Link model name, or an error naming the owning field when missing.
    pub fn adapter(&self, model: &str, field: &str) -> Result<&str> {
        self.association_adapter
            .as_deref()
            .ok_or_else(|| Error::AssociationShape {
                model: model.to_string(),
                field: field.to_string(),
                message: "junction has no association adapter".to_string(),
            })
    }

    /// Overlay an explicit mapping block. Present members win.
    pub fn merge(&mut self, explicit: &FieldMappingSchema) -> Result<()> {
        if let Some(kind) = &explicit.association_type {
            self.association_type = AssociationType::parse(kind).ok_or_else(|| {
                Error::configuration(format!("unknown association type `{kind}`"))
            })?;
        }
        let overlay = |target: &mut String, source: &Option<String>| {
            if let Some(value) = source {
                target.clone_from(value);
            }
        };
        overlay(&mut self.parent_model, &explicit.parent_model);
        overlay(&mut self.parent_field, &explicit.parent_field);
        overlay(&mut self.child_model, &explicit.child_model);
        overlay(&mut self.child_field, &explicit.child_field);
        if let Some(cascade) = &explicit.cascade {
            self.cascade = CascadeAction::parse(cascade);
        }
        if explicit.association_adapter.is_some() {
            self.association_adapter.clone_from(&explicit.association_adapter);
        }
        if explicit.association_object_field.is_some() {
            self.association_object_field
                .clone_from(&explicit.association_object_field);
        }
        if explicit.association_value_field.is_some() {
            self.association_value_field
                .clone_from(&explicit.association_value_field);
        }
        if explicit.refers_to.is_some() {
            self.refers_to.clone_from(&explicit.refers_to);
        }
        Ok(())
    }

    /// Structural identity used to de-duplicate expansions: same kind and the same
    /// parent/child model and field.
    pub fn same_association(&self, other: &AssociationMapping) -> bool {
        self.association_type == other.association_type
            && self.parent_model == other.parent_model
            && self.parent_field == other.parent_field
            && self.child_model == other.child_model
            && self.child_field == other.child_field
            && self.association_adapter == other.association_adapter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_members_override_inferred() {
        let mut mapping = AssociationMapping::association("Customer", "id", "Order", "customer");
        let explicit = FieldMappingSchema {
            cascade: Some("delete".to_string()),
            parent_field: Some("code".to_string()),
            ..FieldMappingSchema::default()
        };
        mapping.merge(&explicit).unwrap();
        assert_eq!(mapping.cascade, CascadeAction::Delete);
        assert_eq!(mapping.parent_field, "code");
        assert_eq!(mapping.child_field, "customer");
    }

    #[test]
    fn unknown_association_type_is_rejected() {
        let mut mapping = AssociationMapping::default();
        let explicit = FieldMappingSchema {
            association_type: Some("bridge".to_string()),
            ..FieldMappingSchema::default()
        };
        assert_eq!(mapping.merge(&explicit).unwrap_err().code(), "ECONFIG");
    }

    #[test]
    fn cascade_parsing_keeps_unknown_values() {
        assert_eq!(CascadeAction::parse("NULL"), CascadeAction::Null);
        assert_eq!(
            CascadeAction::parse("restrict"),
            CascadeAction::Other("restrict".to_string())
        );
    }

    #[test]
    fn junction_link_defaults() {
        let mapping = AssociationMapping::junction("PersonGroups", "Group", "id", "Person", "id");
        assert_eq!(mapping.object_field(), "parentId");
        assert_eq!(mapping.value_field(), "valueId");
        assert!(mapping.is_junction());
    }
}
