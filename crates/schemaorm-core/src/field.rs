//! Field definitions.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Cardinality of an attribute as seen from its owning model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Multiplicity {
    /// Embedded one-to-one whose foreign key lives on the child model.
    ZeroOrOne,
    /// A single value or a single referenced object.
    One,
    /// A collection.
    Many,
}

/// Explicit association configuration attached to a field.
///
/// Every member is optional; present members override the inferred mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMappingSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association_adapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association_object_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association_value_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refers_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cascade: Option<String>,
}

/// Data-driven validation rules of a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_message: Option<String>,
    /// Validate against another registered data type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Name of a custom validator registered in the configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    /// Message overriding every default message of this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_type() -> String {
    "Text".to_string()
}

/// A field as written in a model definition, and (once resolved) an attribute of a
/// model.
///
/// Resolution fills `model` with the name of the model whose storage owns the
/// attribute, `many` with the inferred cardinality and `multiplicity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type", default = "default_type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Object property name when it differs from the column name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub many: Option<bool>,
    #[serde(default)]
    pub nested: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default = "default_true")]
    pub editable: bool,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub expandable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// Default value expression, evaluated on insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Calculated value expression, evaluated on every save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<FieldMappingSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<FieldValidation>,
    /// Owning model, set when the field is resolved into an attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplicity: Option<Multiplicity>,
}

impl FieldSchema {
    /// Create a nullable field of the given type.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            title: None,
            description: None,
            property: None,
            nullable: true,
            primary: false,
            many: None,
            nested: false,
            readonly: false,
            editable: true,
            indexed: false,
            expandable: false,
            size: None,
            value: None,
            calculation: None,
            mapping: None,
            validation: None,
            model: None,
            multiplicity: None,
        }
    }

    /// Mark as the primary key.
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.nullable = false;
        self
    }

    /// Mark as not nullable.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set explicit cardinality.
    #[must_use]
    pub fn many(mut self, value: bool) -> Self {
        self.many = Some(value);
        self
    }

    /// Mark as an embedded object.
    #[must_use]
    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }

    /// Mark as read-only.
    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Mark as not editable on update.
    #[must_use]
    pub fn not_editable(mut self) -> Self {
        self.editable = false;
        self
    }

    /// Mark as indexed.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Auto-expand when selected.
    #[must_use]
    pub fn expandable(mut self) -> Self {
        self.expandable = true;
        self
    }

    /// Maximum text length.
    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Default value expression.
    #[must_use]
    pub fn value(mut self, expr: impl Into<Value>) -> Self {
        self.value = Some(expr.into());
        self
    }

    /// Calculated value expression.
    #[must_use]
    pub fn calculation(mut self, expr: impl Into<Value>) -> Self {
        self.calculation = Some(expr.into());
        self
    }

    /// Explicit association configuration.
    #[must_use]
    pub fn mapping(mut self, mapping: FieldMappingSchema) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Validation rules.
    #[must_use]
    pub fn validation(mut self, validation: FieldValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    /// The object property this field reads from (defaults to `name`).
    pub fn property_name(&self) -> &str {
        self.property.as_deref().unwrap_or(&self.name)
    }

    /// Resolved cardinality (`false` when not yet inferred).
    pub fn is_many(&self) -> bool {
        self.many.unwrap_or(false)
    }

    /// True for the embedded one-to-one whose key is stored on the child model.
    pub fn is_virtual(&self) -> bool {
        self.multiplicity == Some(Multiplicity::ZeroOrOne)
    }

    /// True when the field's owning model is `model`.
    pub fn is_owned_by(&self, model: &str) -> bool {
        self.model.as_deref() == Some(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_definition() {
        let field: FieldSchema = serde_json::from_str(
            r#"{"name":"customer","type":"Customer","nullable":false,"mapping":{"cascade":"delete","childField":"customer"}}"#,
        )
        .unwrap();
        assert_eq!(field.type_name, "Customer");
        assert!(!field.nullable);
        assert!(field.editable);
        assert_eq!(field.many, None);
        let mapping = field.mapping.unwrap();
        assert_eq!(mapping.cascade.as_deref(), Some("delete"));
        assert_eq!(mapping.child_field.as_deref(), Some("customer"));
    }

    #[test]
    fn builder_chain() {
        let field = FieldSchema::new("id", "Counter").primary();
        assert!(field.primary);
        assert!(!field.nullable);
        assert_eq!(field.property_name(), "id");
    }
}
