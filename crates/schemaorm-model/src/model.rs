//! Data models.
//!
//! A `DataModel` is a resolved view of a `ModelSchema` inside a `DataContext`: it
//! knows the inheritance-merged attribute list, the primary key and the storage
//! names, and it is the entry point for queries, saves, removes and migrations.

use std::fmt;
use std::sync::{Arc, OnceLock};

use asupersync::{Cx, Outcome};

use schemaorm_core::value::{self, DataObject, Value};
use schemaorm_core::{
    BoxFuture, Error, FieldSchema, ModelSchema, Multiplicity, Result, inflection,
};
use schemaorm_query::{DataAdapter, Expr};

use crate::configuration::DataConfiguration;
use crate::context::DataContext;
use crate::events::DataState;
use crate::queryable::Queryable;

struct ModelInner {
    context: DataContext,
    schema: Arc<ModelSchema>,
    attributes: OnceLock<Arc<Vec<FieldSchema>>>,
}

/// A model of a data context.
///
/// Cloning is cheap and shares the memoized attribute list.
#[derive(Clone)]
pub struct DataModel {
    inner: Arc<ModelInner>,
    silent: bool,
}

impl fmt::Debug for DataModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataModel")
            .field("name", &self.name())
            .field("silent", &self.silent)
            .finish_non_exhaustive()
    }
}

impl DataModel {
    pub(crate) fn new(context: DataContext, schema: Arc<ModelSchema>) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                context,
                schema,
                attributes: OnceLock::new(),
            }),
            silent: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.schema.name
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.inner.schema
    }

    pub fn context(&self) -> &DataContext {
        &self.inner.context
    }

    pub fn configuration(&self) -> &DataConfiguration {
        self.inner.context.configuration()
    }

    pub fn adapter(&self) -> &Arc<dyn DataAdapter> {
        self.inner.context.adapter()
    }

    /// Storage adapter (table) name.
    pub fn source_adapter(&self) -> String {
        self.inner.schema.source_adapter()
    }

    /// Query adapter (view) name.
    pub fn view_adapter(&self) -> String {
        self.inner.schema.view_adapter()
    }

    /// A handle on the same model whose operations skip permission checks.
    #[must_use]
    pub fn silent(&self, silent: bool) -> DataModel {
        DataModel {
            inner: Arc::clone(&self.inner),
            silent,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// A sibling model of the same context, inheriting the silent flag.
    pub(crate) fn sibling(&self, name: &str) -> Result<DataModel> {
        Ok(self.context().model(name)?.silent(self.silent))
    }

    /// The model this model inherits from.
    pub fn base(&self) -> Result<Option<DataModel>> {
        match &self.inner.schema.inherits {
            None => Ok(None),
            Some(base) => {
                if base.eq_ignore_ascii_case(self.name()) {
                    return Err(Error::model_configuration(
                        self.name(),
                        "a model cannot inherit from itself",
                    ));
                }
                self.sibling(base).map(Some)
            }
        }
    }

    /// The base model that has storage of its own. Abstract bases are folded into
    /// the storage of their descendants.
    pub(crate) fn storage_base(&self) -> Result<Option<DataModel>> {
        Ok(self.base()?.filter(|base| !base.schema().is_abstract))
    }

    /// Names of every model this model inherits from, nearest first.
    pub fn ancestors(&self) -> Result<Vec<String>> {
        let configuration = self.configuration();
        let mut names = Vec::new();
        let mut next = self.inner.schema.inherits.clone();
        while let Some(name) = next {
            if name.eq_ignore_ascii_case(self.name())
                || names.iter().any(|n: &String| n.eq_ignore_ascii_case(&name))
            {
                return Err(Error::model_configuration(
                    self.name(),
                    format!("inheritance cycle through `{name}`"),
                ));
            }
            let schema = configuration.model_schema(&name).ok_or_else(|| {
                Error::model_configuration(self.name(), format!("base model `{name}` is not defined"))
            })?;
            names.push(schema.name.clone());
            next = schema.inherits.clone();
        }
        Ok(names)
    }

    /// True if `name` is this model or one of its ancestors.
    pub fn is_type_of(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(self.name())
            || self
                .ancestors()
                .is_ok_and(|ancestors| ancestors.iter().any(|a| a.eq_ignore_ascii_case(name)))
    }

    pub(crate) fn is_primitive(&self, type_name: &str) -> bool {
        self.configuration().types().is_primitive(type_name)
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// The inheritance-merged attribute list, computed once per model instance.
    ///
    /// Order: own fields, inherited non-primary fields, the inherited primary key
    /// (a `Counter` key becomes `Integer`), then fields of the implemented model.
    pub fn attributes(&self) -> Result<Arc<Vec<FieldSchema>>> {
        if let Some(attributes) = self.inner.attributes.get() {
            return Ok(Arc::clone(attributes));
        }
        let computed = Arc::new(self.compute_attributes()?);
        Ok(Arc::clone(self.inner.attributes.get_or_init(|| computed)))
    }

    fn compute_attributes(&self) -> Result<Vec<FieldSchema>> {
        // Fail early on cycles and undefined bases.
        self.ancestors()?;
        let settings = self.configuration().settings();
        let name = self.name().to_string();
        let mut attributes: Vec<FieldSchema> = Vec::new();

        for field in &self.inner.schema.fields {
            let mut attribute = field.clone();
            attribute.model = Some(name.clone());
            let primitive = self.is_primitive(&attribute.type_name);
            if attribute.many.is_none() {
                attribute.many = Some(
                    !primitive
                        && settings.infer_plural_many
                        && inflection::is_plural(&attribute.name),
                );
            }
            attribute.multiplicity = Some(if attribute.is_many() {
                Multiplicity::Many
            } else if attribute.nested && !primitive && self.child_holds_key(&attribute) {
                Multiplicity::ZeroOrOne
            } else {
                Multiplicity::One
            });
            attributes.push(attribute);
        }

        let own_primary = attributes.iter().any(|a| a.primary);
        if let Some(base) = self.base()? {
            let folded = base.schema().is_abstract;
            let inherited = base.attributes()?;
            let fresh = |attributes: &Vec<FieldSchema>, candidate: &FieldSchema| {
                attributes.iter().all(|a| a.name != candidate.name)
            };
            let mut extra = Vec::new();
            for attribute in inherited.iter().filter(|a| !a.primary) {
                if fresh(&attributes, attribute) {
                    let mut attribute = attribute.clone();
                    if folded {
                        attribute.model = Some(name.clone());
                    }
                    extra.push(attribute);
                }
            }
            attributes.extend(extra);
            if !own_primary {
                if let Some(key) = inherited.iter().find(|a| a.primary) {
                    if fresh(&attributes, key) {
                        let mut key = key.clone();
                        if !folded && key.type_name == "Counter" {
                            key.type_name = "Integer".to_string();
                        }
                        key.model = Some(name.clone());
                        attributes.push(key);
                    }
                }
            }
        }

        if let Some(interface) = &self.inner.schema.implements {
            let implemented = self.sibling(interface)?.attributes()?;
            let has_primary = attributes.iter().any(|a| a.primary);
            for attribute in implemented.iter() {
                if (attribute.primary && has_primary)
                    || attributes.iter().any(|a| a.name == attribute.name)
                {
                    continue;
                }
                let mut attribute = attribute.clone();
                attribute.model = Some(name.clone());
                attributes.push(attribute);
            }
        }
        Ok(attributes)
    }

    /// True when a nested field's model stores the key of this model under a
    /// unique constraint (an embedded one-to-one owned by the child).
    fn child_holds_key(&self, field: &FieldSchema) -> bool {
        let Some(child) = self.configuration().model_schema(&field.type_name) else {
            return false;
        };
        let Some(reverse) = child
            .fields
            .iter()
            .find(|f| f.type_name.eq_ignore_ascii_case(self.name()))
        else {
            return false;
        };
        child
            .unique_constraints()
            .any(|c| c.fields.len() == 1 && c.fields[0] == reverse.name)
    }

    /// An attribute by name or property name.
    pub fn attribute(&self, name: &str) -> Result<Option<FieldSchema>> {
        let attributes = self.attributes()?;
        Ok(attributes
            .iter()
            .find(|a| a.name == name)
            .or_else(|| attributes.iter().find(|a| a.property_name() == name))
            .cloned())
    }

    /// An attribute that must exist.
    pub fn get_attribute(&self, name: &str) -> Result<FieldSchema> {
        self.attribute(name)?.ok_or_else(|| {
            Error::model_configuration(
                self.name(),
                format!("attribute `{name}` does not exist in model `{}`", self.name()),
            )
        })
    }

    /// A field declared by this model's own definition.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.inner.schema.own_field(name)
    }

    /// The primary key attribute. Exactly one attribute must be primary.
    pub fn primary_key(&self) -> Result<FieldSchema> {
        let attributes = self.attributes()?;
        let mut keys = attributes.iter().filter(|a| a.primary);
        match (keys.next(), keys.next()) {
            (Some(key), None) => Ok(key.clone()),
            (None, _) => Err(Error::model_configuration(
                self.name(),
                format!("model `{}` has no primary key", self.name()),
            )),
            (Some(_), Some(_)) => Err(Error::model_configuration(
                self.name(),
                format!("model `{}` has more than one primary key", self.name()),
            )),
        }
    }

    /// The primary key value of an object, if it has one.
    pub fn key_of(&self, object: &DataObject) -> Result<Option<Value>> {
        let key = self.primary_key()?;
        Ok(value::get_present(object, key.property_name()).cloned())
    }

    // ========================================================================
    // Casting
    // ========================================================================

    /// True if an attribute can be written for `state`.
    ///
    /// A read-only attribute is only written when an expression produces its value:
    /// a `calculation` on update, a `value` or `calculation` on insert.
    pub fn is_castable(attribute: &FieldSchema, state: DataState) -> bool {
        let eligible = !attribute.readonly
            || match state {
                DataState::Update => attribute.calculation.is_some(),
                DataState::Insert => attribute.value.is_some() || attribute.calculation.is_some(),
                DataState::Remove => false,
            };
        eligible && (state != DataState::Update || attribute.editable)
    }

    /// Project an object onto the storage columns of this model.
    ///
    /// Only attributes stored by this model are kept. Collections and embedded
    /// one-to-one children are left out; an associated object is reduced to its key.
    pub fn cast(&self, object: &DataObject, state: DataState) -> Result<DataObject> {
        let mut values = DataObject::new();
        for attribute in self.attributes()?.iter() {
            if !attribute.is_owned_by(self.name())
                || attribute.is_many()
                || attribute.is_virtual()
                || !Self::is_castable(attribute, state)
            {
                continue;
            }
            let Some(value) = object.get(attribute.property_name()) else {
                continue;
            };
            let value = match value {
                Value::Object(nested) if !self.is_primitive(&attribute.type_name) => {
                    match self.infer_mapping(&attribute.name)? {
                        Some(mapping) if !mapping.is_junction() => nested
                            .get(&mapping.parent_field)
                            .cloned()
                            .unwrap_or(Value::Null),
                        _ => continue,
                    }
                }
                other => other.clone(),
            };
            values.insert(attribute.name.clone(), value);
        }
        Ok(values)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// A new query over this model's view.
    pub fn as_queryable(&self) -> Queryable {
        Queryable::new(self.clone())
    }

    /// Start a query filtered on `attribute`.
    pub fn where_(&self, attribute: &str) -> Queryable {
        self.as_queryable().where_(attribute)
    }

    /// Start a query with a projection.
    pub fn select(&self, attributes: &[&str]) -> Queryable {
        self.as_queryable().select(attributes)
    }

    /// Start a full-text query.
    pub fn search(&self, text: &str) -> Queryable {
        self.as_queryable().search(text)
    }

    /// Find one object by its primary key or, without one, by the other values it
    /// carries.
    pub fn find<'a>(
        &'a self,
        cx: &'a Cx,
        object: &'a DataObject,
    ) -> BoxFuture<'a, Outcome<Option<DataObject>, Error>> {
        Box::pin(async move {
            let view = self.view_adapter();
            let mut filter = None;
            if let Some(key) = schemaorm_core::try_result!(self.key_of(object)) {
                let name = schemaorm_core::try_result!(self.primary_key()).name;
                filter = Some(Expr::qualified(&view, name).eq(key));
            } else {
                let attributes = schemaorm_core::try_result!(self.attributes());
                for attribute in attributes.iter() {
                    if attribute.is_many() || !self.is_primitive(&attribute.type_name) {
                        continue;
                    }
                    if let Some(value) = object.get(attribute.property_name()) {
                        filter = Expr::and_option(
                            filter,
                            Some(Expr::qualified(&view, &attribute.name).eq(value.clone())),
                        );
                    }
                }
            }
            let Some(filter) = filter else {
                return Outcome::Ok(None);
            };
            self.as_queryable().filter(filter).first(cx).await
        })
    }

    /// Load the stored row with the given key, bypassing permission checks.
    pub(crate) fn load<'a>(
        &'a self,
        cx: &'a Cx,
        key: &'a Value,
    ) -> BoxFuture<'a, Outcome<Option<DataObject>, Error>> {
        Box::pin(async move {
            let name = schemaorm_core::try_result!(self.primary_key()).name;
            self.silent(true)
                .as_queryable()
                .filter(Expr::qualified(self.view_adapter(), name).eq(key.clone()))
                .flatten()
                .first(cx)
                .await
        })
    }
}
