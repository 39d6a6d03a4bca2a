//! Result expansion.
//!
//! After a query runs, every distinct expanded association is loaded with one extra
//! query per association (not per row) and attached to the rows under the
//! attribute name: a single object for the parent of a foreign key, a collection
//! for children and junction members.

use std::collections::HashMap;

use asupersync::{Cx, Outcome};

use schemaorm_core::value::{self, DataObject, Value};
use schemaorm_core::{AssociationMapping, BoxFuture, Error, FieldSchema, Result, try_outcome, try_result};
use schemaorm_query::Expr;

use crate::association;
use crate::model::DataModel;

/// Query options of one expanded association.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Attributes of the related objects; empty selects every column.
    pub select: Vec<String>,
    /// Ordering of the related objects, `(attribute, descending)`.
    pub order_by: Vec<(String, bool)>,
    /// Expansion depth of the related query; defaults to one less than the
    /// current depth.
    pub levels: Option<usize>,
    /// Maximum number of related objects per row.
    pub take: Option<usize>,
}

impl ExpandOptions {
    #[must_use]
    pub fn select(mut self, attributes: &[&str]) -> Self {
        self.select = attributes.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn order_by(mut self, attribute: impl Into<String>, descending: bool) -> Self {
        self.order_by.push((attribute.into(), descending));
        self
    }

    #[must_use]
    pub fn levels(mut self, levels: usize) -> Self {
        self.levels = Some(levels);
        self
    }

    #[must_use]
    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }
}

/// An association to expand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expand {
    pub name: String,
    pub options: ExpandOptions,
}

impl Expand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: ExpandOptions::default(),
        }
    }
}

/// How an expanded association relates rows of the current model to related rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// The current model stores the key of one parent.
    Parent,
    /// Child rows store the key of the current model.
    Children,
    /// Current model is the object side of a junction.
    JunctionChildren,
    /// Current model is the value side of a junction.
    JunctionParents,
}

fn shape(model: &DataModel, attribute: &FieldSchema, mapping: &AssociationMapping) -> Shape {
    let is_parent = mapping.parent_model.eq_ignore_ascii_case(model.name());
    if mapping.is_junction() {
        if is_parent {
            Shape::JunctionChildren
        } else {
            Shape::JunctionParents
        }
    } else if mapping.child_model.eq_ignore_ascii_case(model.name())
        && mapping.child_field == attribute.name
    {
        Shape::Parent
    } else {
        Shape::Children
    }
}

fn resolve(model: &DataModel, name: &str) -> Result<(FieldSchema, AssociationMapping)> {
    let attribute = model.get_attribute(name)?;
    let mapping = model.infer_mapping(&attribute.name)?.ok_or_else(|| {
        Error::model_configuration(
            model.name(),
            format!("attribute `{name}` of `{}` cannot be expanded", model.name()),
        )
    })?;
    Ok((attribute, mapping))
}

/// The column of the current rows an expansion reads its keys from.
pub(crate) fn expand_key(model: &DataModel, name: &str) -> Result<String> {
    let (attribute, mapping) = resolve(model, name)?;
    Ok(match shape(model, &attribute, &mapping) {
        Shape::Parent | Shape::JunctionParents => mapping.child_field,
        Shape::Children | Shape::JunctionChildren => mapping.parent_field,
    })
}

/// The property of the current rows an expansion writes the related objects to.
pub(crate) fn expand_property(model: &DataModel, name: &str) -> Result<String> {
    Ok(model.get_attribute(name)?.property_name().to_string())
}

/// Distinct non-null values of a column.
fn keys(rows: &[DataObject], column: &str) -> Vec<Value> {
    let mut seen = Vec::new();
    let mut keys = Vec::new();
    for row in rows {
        if let Some(key) = value::get_present(row, column) {
            let text = value::key_string(key);
            if !seen.contains(&text) {
                seen.push(text);
                keys.push(key.clone());
            }
        }
    }
    keys
}

fn index_by(rows: Vec<DataObject>, column: &str) -> HashMap<String, Vec<DataObject>> {
    let mut index: HashMap<String, Vec<DataObject>> = HashMap::new();
    for row in rows {
        if let Some(key) = value::get_present(&row, column) {
            index.entry(value::key_string(key)).or_default().push(row);
        }
    }
    index
}

/// Load objects of `related` whose `column` is one of `keys`.
fn related<'a>(
    cx: &'a Cx,
    model: &'a DataModel,
    related: &'a str,
    column: &'a str,
    keys: Vec<Value>,
    options: &'a ExpandOptions,
    levels: usize,
) -> BoxFuture<'a, Outcome<Vec<DataObject>, Error>> {
    Box::pin(async move {
        if keys.is_empty() {
            return Outcome::Ok(Vec::new());
        }
        let other = try_result!(model.sibling(related));
        let mut query = other
            .as_queryable()
            .filter(Expr::qualified(other.view_adapter(), column).in_list(keys))
            .levels(levels);
        if !options.select.is_empty() {
            let mut select: Vec<&str> = options.select.iter().map(String::as_str).collect();
            if !select.contains(&column) {
                select.push(column);
            }
            query = query.select(&select);
        }
        for (attribute, descending) in &options.order_by {
            query = if *descending {
                query.then_by_descending(attribute)
            } else {
                query.then_by(attribute)
            };
        }
        if levels == 0 {
            query = query.flatten();
        }
        query.all(cx).await
    })
}

/// Link rows of a junction whose `column` is one of `keys`.
fn links<'a>(
    cx: &'a Cx,
    model: &'a DataModel,
    attribute: &'a str,
    mapping: &'a AssociationMapping,
    column: &'a str,
    keys: Vec<Value>,
) -> BoxFuture<'a, Outcome<Vec<DataObject>, Error>> {
    Box::pin(async move {
        if keys.is_empty() {
            return Outcome::Ok(Vec::new());
        }
        let junction = try_result!(association::junction_model(model, mapping, attribute));
        let view = junction.view_adapter();
        junction
            .silent(true)
            .as_queryable()
            .filter(Expr::qualified(view, column).in_list(keys))
            .flatten()
            .all(cx)
            .await
    })
}

fn collection(mut items: Vec<DataObject>, take: Option<usize>) -> Value {
    if let Some(take) = take {
        items.truncate(take);
    }
    Value::Array(items.into_iter().map(Value::Object).collect())
}

/// Attach every distinct expanded association to `rows`.
pub(crate) fn apply<'a>(
    cx: &'a Cx,
    model: &'a DataModel,
    rows: &'a mut [DataObject],
    expands: &'a [Expand],
    levels: usize,
) -> BoxFuture<'a, Outcome<(), Error>> {
    Box::pin(async move {
        if levels == 0 {
            return Outcome::Ok(());
        }
        let mut seen: Vec<AssociationMapping> = Vec::new();
        for expand in expands {
            let (attribute, mapping) = try_result!(resolve(model, &expand.name));
            if seen.iter().any(|m| m.same_association(&mapping)) {
                continue;
            }
            seen.push(mapping.clone());
            let nested = expand.options.levels.unwrap_or(levels - 1);
            let options = &expand.options;
            let property = attribute.property_name().to_string();
            tracing::debug!(
                model = %model.name(),
                attribute = %attribute.name,
                levels = nested,
                "Expanding association"
            );

            match shape(model, &attribute, &mapping) {
                Shape::Parent => {
                    let found = try_outcome!(
                        related(
                            cx,
                            model,
                            &mapping.parent_model,
                            &mapping.parent_field,
                            keys(rows, &mapping.child_field),
                            options,
                            nested,
                        )
                        .await
                    );
                    let index = index_by(found, &mapping.parent_field);
                    for row in rows.iter_mut() {
                        let parent = value::get_present(row, &mapping.child_field)
                            .and_then(|key| index.get(&value::key_string(key)))
                            .and_then(|items| items.first())
                            .map_or(Value::Null, |item| Value::Object(item.clone()));
                        row.insert(property.clone(), parent);
                    }
                }
                Shape::Children => {
                    let found = try_outcome!(
                        related(
                            cx,
                            model,
                            &mapping.child_model,
                            &mapping.child_field,
                            keys(rows, &mapping.parent_field),
                            options,
                            nested,
                        )
                        .await
                    );
                    let index = index_by(found, &mapping.child_field);
                    for row in rows.iter_mut() {
                        let items = value::get_present(row, &mapping.parent_field)
                            .and_then(|key| index.get(&value::key_string(key)))
                            .cloned()
                            .unwrap_or_default();
                        let value = if attribute.is_many() {
                            collection(items, options.take)
                        } else {
                            items.into_iter().next().map_or(Value::Null, Value::Object)
                        };
                        row.insert(property.clone(), value);
                    }
                }
                Shape::JunctionChildren | Shape::JunctionParents => {
                    let parent_side = shape(model, &attribute, &mapping) == Shape::JunctionChildren;
                    let (own_key, own_link, other_link) = if parent_side {
                        (&mapping.parent_field, mapping.object_field(), mapping.value_field())
                    } else {
                        (&mapping.child_field, mapping.value_field(), mapping.object_field())
                    };
                    let link_rows = try_outcome!(
                        links(cx, model, &attribute.name, &mapping, own_link, keys(rows, own_key))
                            .await
                    );
                    let tag = parent_side && model.is_primitive(&mapping.child_model);
                    let others = if tag {
                        HashMap::new()
                    } else {
                        let (other_model, other_key) = if parent_side {
                            (&mapping.child_model, &mapping.child_field)
                        } else {
                            (&mapping.parent_model, &mapping.parent_field)
                        };
                        let found = try_outcome!(
                            related(
                                cx,
                                model,
                                other_model,
                                other_key,
                                keys(&link_rows, other_link),
                                options,
                                nested,
                            )
                            .await
                        );
                        index_by(found, other_key)
                    };
                    let link_index = index_by(link_rows, own_link);
                    for row in rows.iter_mut() {
                        let row_links = value::get_present(row, own_key)
                            .and_then(|key| link_index.get(&value::key_string(key)))
                            .cloned()
                            .unwrap_or_default();
                        let mut values = Vec::new();
                        for link in &row_links {
                            let Some(target) = value::get_present(link, other_link) else {
                                continue;
                            };
                            if tag {
                                values.push(target.clone());
                            } else if let Some(item) = others
                                .get(&value::key_string(target))
                                .and_then(|items| items.first())
                            {
                                values.push(Value::Object(item.clone()));
                            }
                        }
                        if let Some(take) = options.take {
                            values.truncate(take);
                        }
                        row.insert(property.clone(), Value::Array(values));
                    }
                }
            }
        }
        Outcome::Ok(())
    })
}
