//! Association collections.
//!
//! `DataModel::property(object, attribute)` returns a `DataAssociation`: the related
//! objects of one object through one attribute. It can be queried like its related
//! model and, for collections, mutated. Junction and tag collections are backed by
//! a link model that is registered on first use.

use asupersync::{Cx, Outcome};

use schemaorm_core::value::{self, DataObject, Value};
use schemaorm_core::{
    AssociationMapping, BoxFuture, ConstraintSchema, Error, FieldSchema, ModelSchema, Result,
    try_outcome, try_result,
};
use schemaorm_query::{DeleteQuery, Expr, JoinExpression, QueryEntity, QueryExpression};

use crate::events::{DataState, STATE_PROPERTY};
use crate::model::DataModel;
use crate::queryable::Queryable;

/// The link model of a junction, registered from a fixed template when the
/// configuration does not define it.
pub(crate) fn junction_model(
    model: &DataModel,
    mapping: &AssociationMapping,
    field: &str,
) -> Result<DataModel> {
    let adapter = mapping.adapter(model.name(), field)?;
    let configuration = model.configuration();
    if configuration.model_schema(adapter).is_none() {
        let parent = model.sibling(&mapping.parent_model)?;
        let object_type = parent.get_attribute(&mapping.parent_field)?.type_name;
        let value_type = if model.is_primitive(&mapping.child_model) {
            mapping.child_model.clone()
        } else {
            model
                .sibling(&mapping.child_model)?
                .get_attribute(&mapping.child_field)?
                .type_name
        };
        let integer = |type_name: String| {
            if type_name == "Counter" {
                "Integer".to_string()
            } else {
                type_name
            }
        };
        let mut schema = ModelSchema::new(adapter)
            .hidden()
            .with_field(FieldSchema::new("id", "Counter").primary())
            .with_field(
                FieldSchema::new(mapping.object_field(), integer(object_type))
                    .not_null()
                    .indexed(),
            )
            .with_field(
                FieldSchema::new(mapping.value_field(), integer(value_type))
                    .not_null()
                    .indexed(),
            )
            .with_constraint(ConstraintSchema::unique([
                mapping.object_field(),
                mapping.value_field(),
            ]));
        schema.source = Some(adapter.to_string());
        schema.view = Some(adapter.to_string());
        configuration.ensure_model(schema);
        tracing::debug!(model = %model.name(), field = %field, junction = %adapter, "Junction model registered");
    }
    model.sibling(adapter)
}

/// How an association collection relates its owner to the related objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// Primitive values stored in a link model.
    Tag,
    /// Objects of another model linked through a link model.
    Junction,
    /// Objects of another model that store the owner's key.
    HasMany,
    /// The object whose key the owner stores.
    HasParent,
}

/// The related objects of one object through one attribute.
#[derive(Debug, Clone)]
pub struct DataAssociation {
    model: DataModel,
    object: DataObject,
    attribute: FieldSchema,
    mapping: AssociationMapping,
    kind: AssociationKind,
    /// The owner is the parent side of the mapping.
    parent_side: bool,
}

impl DataModel {
    /// The association collection of `object` through `attribute`.
    pub fn property(&self, object: &DataObject, attribute: &str) -> Result<DataAssociation> {
        let attribute = self.get_attribute(attribute)?;
        let mapping = self.infer_mapping(&attribute.name)?.ok_or_else(|| {
            Error::not_supported(
                self.name(),
                format!("attribute `{}` is not an association", attribute.name),
            )
        })?;
        let mut parent_side = mapping.parent_model.eq_ignore_ascii_case(self.name());
        let kind = if mapping.is_junction() {
            if parent_side && self.is_primitive(&mapping.child_model) {
                AssociationKind::Tag
            } else {
                AssociationKind::Junction
            }
        } else if parent_side && mapping.child_field != attribute.name {
            AssociationKind::HasMany
        } else {
            parent_side = false;
            AssociationKind::HasParent
        };
        Ok(DataAssociation {
            model: self.clone(),
            object: object.clone(),
            attribute,
            mapping,
            kind,
            parent_side,
        })
    }
}

impl DataAssociation {
    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    pub fn mapping(&self) -> &AssociationMapping {
        &self.mapping
    }

    /// The owner's value the association is keyed on.
    fn owner_key(&self) -> Result<Value> {
        let column = if self.parent_side {
            &self.mapping.parent_field
        } else {
            &self.mapping.child_field
        };
        let attribute = self.model.get_attribute(column)?;
        let key = match self.object.get(attribute.property_name()) {
            Some(Value::Object(nested)) => nested.get(&self.mapping.parent_field).cloned(),
            other => other.cloned(),
        };
        key.filter(|v| !v.is_null()).ok_or_else(|| Error::MissingKey {
            model: self.model.name().to_string(),
        })
    }

    fn junction(&self) -> Result<DataModel> {
        junction_model(&self.model, &self.mapping, &self.attribute.name)
    }

    /// Link columns as (owner side, related side).
    fn link_columns(&self) -> (&str, &str) {
        if self.parent_side {
            (self.mapping.object_field(), self.mapping.value_field())
        } else {
            (self.mapping.value_field(), self.mapping.object_field())
        }
    }

    /// The related model and the column of it the association refers to.
    fn related(&self) -> Result<(DataModel, String)> {
        let (name, field) = if self.parent_side {
            (&self.mapping.child_model, &self.mapping.child_field)
        } else {
            (&self.mapping.parent_model, &self.mapping.parent_field)
        };
        Ok((self.model.sibling(name)?, field.clone()))
    }

    /// A query over the related objects (or, for tags, over the link rows).
    pub fn queryable(&self) -> Result<Queryable> {
        let key = self.owner_key()?;
        match self.kind {
            AssociationKind::Tag => {
                let junction = self.junction()?;
                let view = junction.view_adapter();
                Ok(junction
                    .as_queryable()
                    .filter(Expr::qualified(view, self.mapping.object_field()).eq(key))
                    .flatten())
            }
            AssociationKind::Junction => {
                let junction = self.junction()?;
                let (related, related_field) = self.related()?;
                let (own_link, other_link) = self.link_columns();
                let link = junction.view_adapter();
                let view = related.view_adapter();
                let mut queryable = related.as_queryable();
                queryable.join(JoinExpression::inner(
                    QueryEntity::new(link.clone()),
                    Expr::qualified(&link, other_link).eq_expr(Expr::qualified(&view, related_field)),
                ));
                queryable.depend(junction.name());
                Ok(queryable.filter(Expr::qualified(link, own_link).eq(key)))
            }
            AssociationKind::HasMany | AssociationKind::HasParent => {
                let (related, related_field) = self.related()?;
                let view = related.view_adapter();
                Ok(related
                    .as_queryable()
                    .filter(Expr::qualified(view, related_field).eq(key)))
            }
        }
    }

    /// Every related object.
    pub fn get_items<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<Vec<DataObject>, Error>> {
        Box::pin(async move {
            let queryable = try_result!(self.queryable());
            queryable.all(cx).await
        })
    }

    /// Add items to the collection. Items already linked are skipped.
    ///
    /// Tag items are primitive values; junction and one-to-many items are objects
    /// or keys of the related model.
    pub fn insert<'a>(&'a self, cx: &'a Cx, items: Vec<Value>) -> BoxFuture<'a, Outcome<(), Error>> {
        self.mutate(cx, items, true)
    }

    /// Remove items from the collection. Related objects are unlinked, not removed.
    pub fn remove<'a>(&'a self, cx: &'a Cx, items: Vec<Value>) -> BoxFuture<'a, Outcome<(), Error>> {
        self.mutate(cx, items, false)
    }

    /// Unlink every related object.
    pub fn remove_all<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            match self.kind {
                AssociationKind::Tag | AssociationKind::Junction => {
                    let key = try_result!(self.owner_key());
                    let junction = try_result!(self.junction());
                    try_outcome!(junction.migrate(cx).await);
                    let (own_link, _) = self.link_columns();
                    let statement = QueryExpression::Delete(DeleteQuery {
                        entity: junction.source_adapter(),
                        filter: Some(Expr::field(own_link).eq(key)),
                    });
                    try_outcome!(self.model.adapter().execute(cx, &statement).await);
                    Outcome::Ok(())
                }
                _ => {
                    let items = try_outcome!(self.get_items(cx).await);
                    self.mutate(cx, items.into_iter().map(Value::Object).collect(), false)
                        .await
                }
            }
        })
    }

    fn mutate<'a>(
        &'a self,
        cx: &'a Cx,
        items: Vec<Value>,
        insert: bool,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let items: Vec<(Value, bool)> = items.into_iter().map(|item| (item, insert)).collect();
            let work = Box::pin(async move {
                try_outcome!(self.apply(cx, items).await);
                Outcome::Ok(())
            });
            self.model.adapter().execute_in_transaction(cx, work).await
        })
    }

    /// Persist an array assigned to the attribute on save. Objects marked with a
    /// `$state` of remove are unlinked; everything else is linked. Returns the
    /// resulting items.
    pub(crate) fn persist<'a>(
        &'a self,
        cx: &'a Cx,
        items: Vec<Value>,
    ) -> BoxFuture<'a, Outcome<Vec<Value>, Error>> {
        let items = items
            .into_iter()
            .map(|mut item| {
                let remove = match &mut item {
                    Value::Object(object) => {
                        object.remove(STATE_PROPERTY).as_ref().and_then(DataState::parse)
                            == Some(DataState::Remove)
                    }
                    _ => false,
                };
                (item, !remove)
            })
            .collect();
        self.apply(cx, items)
    }

    fn apply<'a>(
        &'a self,
        cx: &'a Cx,
        items: Vec<(Value, bool)>,
    ) -> BoxFuture<'a, Outcome<Vec<Value>, Error>> {
        Box::pin(async move {
            if self.kind == AssociationKind::HasParent {
                return Outcome::Err(Error::not_supported(
                    self.model.name(),
                    format!("`{}` refers to a single parent object", self.attribute.name),
                ));
            }
            let key = try_result!(self.owner_key());
            let junction = match self.kind {
                AssociationKind::Tag | AssociationKind::Junction => {
                    let junction = try_result!(self.junction());
                    try_outcome!(junction.migrate(cx).await);
                    Some(junction)
                }
                _ => None,
            };
            let mut results = Vec::new();
            for (item, insert) in items {
                let result = match &junction {
                    Some(junction) if insert => self.link(cx, junction, &key, item).await,
                    Some(junction) => self.unlink(cx, junction, &key, item).await,
                    None if insert => self.adopt(cx, &key, item).await,
                    None => self.release(cx, item).await,
                };
                if let Some(value) = try_outcome!(result) {
                    results.push(value);
                }
            }
            Outcome::Ok(results)
        })
    }

    /// The related key of a junction item, saving objects that have none.
    fn related_key<'a>(
        &'a self,
        cx: &'a Cx,
        item: &'a Value,
    ) -> BoxFuture<'a, Outcome<Option<Value>, Error>> {
        Box::pin(async move {
            if self.kind == AssociationKind::Tag {
                return Outcome::Ok(Some(item.clone()).filter(|v| !v.is_null()));
            }
            let (related, related_field) = try_result!(self.related());
            match item {
                Value::Object(object) => {
                    if let Some(key) = value::get_present(object, &related_field) {
                        return Outcome::Ok(Some(key.clone()));
                    }
                    let found = match try_outcome!(related.find(cx, object).await) {
                        Some(found) => found,
                        None => try_outcome!(related.save(cx, object.clone()).await),
                    };
                    Outcome::Ok(value::get_present(&found, &related_field).cloned())
                }
                Value::Null => Outcome::Ok(None),
                other => Outcome::Ok(Some(other.clone())),
            }
        })
    }

    /// Link an item unless the link already exists.
    fn link<'a>(
        &'a self,
        cx: &'a Cx,
        junction: &'a DataModel,
        key: &'a Value,
        item: Value,
    ) -> BoxFuture<'a, Outcome<Option<Value>, Error>> {
        Box::pin(async move {
            let Some(related) = try_outcome!(self.related_key(cx, &item).await) else {
                return Outcome::Ok(None);
            };
            let (own_link, other_link) = self.link_columns();
            let view = junction.view_adapter();
            let existing = junction
                .silent(true)
                .as_queryable()
                .filter(Expr::qualified(&view, own_link).eq(key.clone()))
                .filter(Expr::qualified(&view, other_link).eq(related.clone()))
                .flatten();
            if try_outcome!(existing.first(cx).await).is_some() {
                tracing::trace!(junction = %junction.name(), value = %related, "Already linked");
            } else {
                let mut link = DataObject::new();
                link.insert(own_link.to_string(), key.clone());
                link.insert(other_link.to_string(), related);
                try_outcome!(junction.silent(true).insert(cx, link).await);
            }
            Outcome::Ok(Some(item))
        })
    }

    fn unlink<'a>(
        &'a self,
        cx: &'a Cx,
        junction: &'a DataModel,
        key: &'a Value,
        item: Value,
    ) -> BoxFuture<'a, Outcome<Option<Value>, Error>> {
        Box::pin(async move {
            let related = match item {
                Value::Object(mut object) if self.kind == AssociationKind::Junction => {
                    let (_, related_field) = try_result!(self.related());
                    object.remove(&related_field)
                }
                other => Some(other),
            };
            let Some(related) = related.filter(|v| !v.is_null()) else {
                return Outcome::Ok(None);
            };
            let (own_link, other_link) = self.link_columns();
            let statement = QueryExpression::Delete(DeleteQuery {
                entity: junction.source_adapter(),
                filter: Some(
                    Expr::field(own_link)
                        .eq(key.clone())
                        .and(Expr::field(other_link).eq(related)),
                ),
            });
            try_outcome!(self.model.adapter().execute(cx, &statement).await);
            Outcome::Ok(None)
        })
    }

    /// Save a one-to-many child with its key pointing at the owner.
    fn adopt<'a>(
        &'a self,
        cx: &'a Cx,
        key: &'a Value,
        item: Value,
    ) -> BoxFuture<'a, Outcome<Option<Value>, Error>> {
        Box::pin(async move {
            let (child, child_field) = try_result!(self.related());
            let (mut object, state) = match item {
                Value::Object(object) => (object, None),
                Value::Null => return Outcome::Ok(None),
                scalar => {
                    let mut object = DataObject::new();
                    let name = try_result!(child.primary_key()).property_name().to_string();
                    object.insert(name, scalar);
                    (object, Some(DataState::Update))
                }
            };
            object.insert(child_field, key.clone());
            let saved = match state {
                Some(DataState::Update) => try_outcome!(child.update(cx, object).await),
                _ => try_outcome!(child.save(cx, object).await),
            };
            Outcome::Ok(Some(Value::Object(saved)))
        })
    }

    /// Detach a one-to-many child by clearing its key.
    fn release<'a>(&'a self, cx: &'a Cx, item: Value) -> BoxFuture<'a, Outcome<Option<Value>, Error>> {
        Box::pin(async move {
            let (child, child_field) = try_result!(self.related());
            let primary = try_result!(child.primary_key());
            let child_key = match item {
                Value::Object(object) => value::get_present(&object, primary.property_name()).cloned(),
                Value::Null => None,
                scalar => Some(scalar),
            };
            let Some(child_key) = child_key else {
                return Outcome::Ok(None);
            };
            let mut object = DataObject::new();
            object.insert(primary.property_name().to_string(), child_key);
            object.insert(child_field, Value::Null);
            try_outcome!(child.update(cx, object).await);
            Outcome::Ok(None)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::DataConfiguration;
    use crate::context::DataContext;
    use schemaorm_memory::MemoryAdapter;
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> DataContext {
        let configuration = DataConfiguration::builder()
            .model(
                ModelSchema::new("Person")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("skills", "Text").many(true))
                    .with_field(FieldSchema::new("groups", "Group"))
                    .with_field(FieldSchema::new("orders", "Order"))
                    .with_field(FieldSchema::new("manager", "Person")),
            )
            .model(
                ModelSchema::new("Group")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("title", "Text")),
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
    fn association_kinds() {
        let person = context().model("Person").unwrap();
        let object = json!({"id": 1}).as_object().cloned().unwrap();
        let kind = |name: &str| person.property(&object, name).unwrap().kind();
        assert_eq!(kind("skills"), AssociationKind::Tag);
        assert_eq!(kind("groups"), AssociationKind::Junction);
        assert_eq!(kind("orders"), AssociationKind::HasMany);
        assert_eq!(kind("manager"), AssociationKind::HasParent);
    }

    #[test]
    fn tag_junction_model_follows_template() {
        let person = context().model("Person").unwrap();
        let mapping = person.infer_mapping("skills").unwrap().unwrap();
        let junction = junction_model(&person, &mapping, "skills").unwrap();
        assert_eq!(junction.name(), "PersonSkills");
        assert_eq!(junction.source_adapter(), "PersonSkills");
        assert_eq!(junction.view_adapter(), "PersonSkills");
        assert!(junction.schema().hidden);
        let object = junction.get_attribute("object").unwrap();
        assert_eq!(object.type_name, "Integer");
        assert_eq!(junction.get_attribute("value").unwrap().type_name, "Text");
        let unique: Vec<_> = junction.schema().unique_constraints().collect();
        assert_eq!(unique[0].fields, vec!["object".to_string(), "value".to_string()]);
    }

    #[test]
    fn registered_junction_models_are_reused() {
        let context = context();
        let person = context.model("Person").unwrap();
        let mapping = person.infer_mapping("groups").unwrap().unwrap();
        junction_model(&person, &mapping, "groups").unwrap();
        let before = context.configuration().model_names().len();
        junction_model(&person, &mapping, "groups").unwrap();
        assert_eq!(context.configuration().model_names().len(), before);
    }

    #[test]
    fn owner_key_is_required() {
        let person = context().model("Person").unwrap();
        let association = person.property(&DataObject::new(), "skills").unwrap();
        assert_eq!(association.queryable().unwrap_err().code(), "EKEY");
    }
}
