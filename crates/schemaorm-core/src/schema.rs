//! Model definitions.
//!
//! A `ModelSchema` is the declarative description of a model exactly as it is
//! written in a JSON definition file. Nothing here is resolved: inheritance,
//! cardinality and associations are computed later by `schemaorm-model`.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::field::FieldSchema;
use crate::value::DataObject;

/// Result caching policy of a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachingMode {
    /// Never cache.
    #[default]
    None,
    /// Cache every query.
    Always,
    /// Cache only queries that opted in with `cache(true)`.
    Conditional,
}

/// A model constraint. Only `unique` is interpreted by the data layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintSchema {
    #[serde(rename = "type")]
    pub constraint_type: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ConstraintSchema {
    /// A `unique` constraint over the given fields.
    pub fn unique<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            constraint_type: "unique".to_string(),
            fields: fields.into_iter().map(Into::into).collect(),
            description: None,
        }
    }

    pub fn is_unique(&self) -> bool {
        self.constraint_type.eq_ignore_ascii_case("unique")
    }
}

/// A field of a named view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}

/// A named projection of a model, selectable with `Queryable::select`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub fields: Vec<ViewField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Privilege bit set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivilegeMask(pub u32);

impl PrivilegeMask {
    pub const READ: PrivilegeMask = PrivilegeMask(1);
    pub const CREATE: PrivilegeMask = PrivilegeMask(2);
    pub const UPDATE: PrivilegeMask = PrivilegeMask(4);
    pub const DELETE: PrivilegeMask = PrivilegeMask(8);
    pub const EXECUTE: PrivilegeMask = PrivilegeMask(16);
    pub const ALL: PrivilegeMask = PrivilegeMask(31);

    /// True if every bit of `other` is set.
    pub const fn contains(self, other: PrivilegeMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Operation name used in permission errors.
    pub fn operation_name(self) -> &'static str {
        match self.0 {
            1 => "read",
            2 => "create",
            4 => "update",
            8 => "delete",
            16 => "execute",
            _ => "access",
        }
    }
}

/// Scope of a privilege.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeType {
    /// Applies to every object of the model.
    #[default]
    Global,
    /// Applies to objects matched by the privilege filter (e.g. `owner eq me()`).
    #[serde(rename = "self")]
    SelfScoped,
}

/// A privilege granted on a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivilegeSchema {
    pub mask: PrivilegeMask,
    #[serde(rename = "type", default)]
    pub privilege_type: PrivilegeType,
    /// User or group name; `*` grants everyone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl PrivilegeSchema {
    /// The privileges of a model that declares none.
    pub fn defaults() -> Vec<PrivilegeSchema> {
        vec![PrivilegeSchema {
            mask: PrivilegeMask::ALL,
            privilege_type: PrivilegeType::Global,
            account: Some("*".to_string()),
            filter: None,
        }]
    }
}

/// A custom listener registration. `type` names a listener registered in the
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListenerSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub listener_type: String,
    #[serde(default)]
    pub disabled: bool,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// The definition of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implements: Option<String>,
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub sealed: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub caching: CachingMode,
    /// Storage adapter (table) name; defaults to `<Name>Base`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Query adapter (view) name; defaults to `<Name>Data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub constraints: Vec<ConstraintSchema>,
    #[serde(default)]
    pub views: Vec<ViewSchema>,
    #[serde(default)]
    pub privileges: Vec<PrivilegeSchema>,
    #[serde(default)]
    pub seed: Vec<DataObject>,
    #[serde(default)]
    pub event_listeners: Vec<EventListenerSchema>,
}

impl ModelSchema {
    /// An empty, concrete model definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            version: default_version(),
            inherits: None,
            implements: None,
            is_abstract: false,
            sealed: false,
            hidden: false,
            caching: CachingMode::None,
            source: None,
            view: None,
            fields: Vec::new(),
            constraints: Vec::new(),
            views: Vec::new(),
            privileges: Vec::new(),
            seed: Vec::new(),
            event_listeners: Vec::new(),
        }
    }

    /// Parse a definition from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn inherits(mut self, base: impl Into<String>) -> Self {
        self.inherits = Some(base.into());
        self
    }

    #[must_use]
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements = Some(interface.into());
        self
    }

    #[must_use]
    pub fn abstract_model(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    #[must_use]
    pub fn caching(mut self, mode: CachingMode) -> Self {
        self.caching = mode;
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn with_constraint(mut self, constraint: ConstraintSchema) -> Self {
        self.constraints.push(constraint);
        self
    }

    #[must_use]
    pub fn with_privilege(mut self, privilege: PrivilegeSchema) -> Self {
        self.privileges.push(privilege);
        self
    }

    #[must_use]
    pub fn with_listener(mut self, listener_type: impl Into<String>) -> Self {
        self.event_listeners.push(EventListenerSchema {
            name: None,
            listener_type: listener_type.into(),
            disabled: false,
        });
        self
    }

    /// The storage adapter name.
    pub fn source_adapter(&self) -> String {
        self.source
            .clone()
            .unwrap_or_else(|| format!("{}Base", self.name))
    }

    /// The query adapter name.
    pub fn view_adapter(&self) -> String {
        self.view
            .clone()
            .unwrap_or_else(|| format!("{}Data", self.name))
    }

    /// An own field by name.
    pub fn own_field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// A view by name.
    pub fn view_named(&self, name: &str) -> Option<&ViewSchema> {
        self.views.iter().find(|v| v.name.eq_ignore_ascii_case(name))
    }

    /// Declared `unique` constraints.
    pub fn unique_constraints(&self) -> impl Iterator<Item = &ConstraintSchema> {
        self.constraints.iter().filter(|c| c.is_unique())
    }

    /// Declared privileges, or the open default set.
    pub fn effective_privileges(&self) -> Vec<PrivilegeSchema> {
        if self.privileges.is_empty() {
            PrivilegeSchema::defaults()
        } else {
            self.privileges.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_definition() {
        let schema = ModelSchema::from_json(
            r#"{
                "name": "Order",
                "version": "2.1",
                "inherits": "Thing",
                "caching": "conditional",
                "fields": [
                    {"name": "id", "type": "Counter", "primary": true},
                    {"name": "customer", "type": "Customer", "nullable": false}
                ],
                "constraints": [{"type": "unique", "fields": ["customer"]}],
                "privileges": [{"mask": 1, "type": "self", "filter": "customer eq me()"}],
                "eventListeners": [{"type": "audit"}]
            }"#,
        )
        .unwrap();
        assert_eq!(schema.version, "2.1");
        assert_eq!(schema.caching, CachingMode::Conditional);
        assert_eq!(schema.fields.len(), 2);
        assert_eq!(schema.unique_constraints().count(), 1);
        assert_eq!(schema.privileges[0].privilege_type, PrivilegeType::SelfScoped);
        assert_eq!(schema.event_listeners[0].listener_type, "audit");
        assert_eq!(schema.source_adapter(), "OrderBase");
        assert_eq!(schema.view_adapter(), "OrderData");
    }

    #[test]
    fn default_privileges_are_open() {
        let schema = ModelSchema::new("Thing");
        let privileges = schema.effective_privileges();
        assert_eq!(privileges.len(), 1);
        assert!(privileges[0].mask.contains(PrivilegeMask::DELETE));
        assert_eq!(privileges[0].account.as_deref(), Some("*"));
    }

    #[test]
    fn mask_contains() {
        let mask = PrivilegeMask(PrivilegeMask::READ.0 | PrivilegeMask::UPDATE.0);
        assert!(mask.contains(PrivilegeMask::READ));
        assert!(!mask.contains(PrivilegeMask::CREATE));
    }
}
