//! Data configuration: the schema registry and the services models share.
//!
//! A `DataConfiguration` is cheap to clone; every clone shares the same registry,
//! mapping cache and migration cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use schemaorm_core::{
    AssociationMapping, CacheStrategy, DataObject, DataType, DataTypes, ExpressionEvaluator,
    FunctionEvaluator, MemoryCacheStrategy, ModelSchema, Result, Value,
};

use crate::events::DataEventListener;

/// A named custom attribute validator.
///
/// Receives the attribute value and the whole target object; returns a message when
/// the value is rejected.
pub type CustomValidator = Arc<dyn Fn(&Value, &DataObject) -> Option<String> + Send + Sync>;

/// Behavior switches of the data layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Expansion depth of a query that does not call `levels`.
    pub default_levels: usize,
    /// Infer `many` from a plural field name when the field does not declare it.
    pub infer_plural_many: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_levels: 1,
            infer_plural_many: true,
        }
    }
}

// ============================================================================
// Migration cache
// ============================================================================

/// Remembers which model versions were migrated by this process.
///
/// Shared by every context built from the same configuration. Concurrent first
/// migrations of one model may both reach the adapter; adapters treat a repeated
/// migration of the same version as a no-op.
#[derive(Debug, Default)]
pub struct MigrationCache {
    versions: RwLock<HashMap<String, String>>,
}

impl MigrationCache {
    /// True if `model` was migrated at `version`.
    pub fn is_current(&self, model: &str, version: &str) -> bool {
        self.versions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&model.to_ascii_lowercase())
            .is_some_and(|v| v == version)
    }

    pub fn mark(&self, model: &str, version: &str) {
        self.versions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model.to_ascii_lowercase(), version.to_string());
    }

    pub fn invalidate(&self, model: &str) {
        self.versions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&model.to_ascii_lowercase());
    }

    pub fn clear(&self) {
        self.versions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// ============================================================================
// Configuration
// ============================================================================

struct ConfigurationInner {
    models: RwLock<HashMap<String, Arc<ModelSchema>>>,
    types: DataTypes,
    evaluator: Arc<dyn ExpressionEvaluator>,
    cache: Arc<dyn CacheStrategy>,
    listeners: HashMap<String, Arc<dyn DataEventListener>>,
    validators: HashMap<String, CustomValidator>,
    settings: Settings,
    mappings: RwLock<HashMap<(String, String), Option<AssociationMapping>>>,
    migrations: MigrationCache,
}

/// Model definitions plus the services every model of a context uses.
#[derive(Clone)]
pub struct DataConfiguration {
    inner: Arc<ConfigurationInner>,
}

impl fmt::Debug for DataConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataConfiguration")
            .field("models", &self.model_names())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl DataConfiguration {
    pub fn builder() -> DataConfigurationBuilder {
        DataConfigurationBuilder::default()
    }

    /// Look up a model definition (case-insensitive).
    pub fn model_schema(&self, name: &str) -> Option<Arc<ModelSchema>> {
        self.inner
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key(name))
            .cloned()
    }

    /// Names of every registered model.
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|schema| schema.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Register or replace a model definition.
    ///
    /// Resolved mappings are dropped and the model will be migrated again.
    pub fn set_model(&self, schema: ModelSchema) {
        let name = schema.name.clone();
        self.inner
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key(&name), Arc::new(schema));
        self.inner
            .mappings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner.migrations.invalidate(&name);
        tracing::debug!(model = %name, "Model definition replaced");
    }

    /// Register a model definition unless one with the same name exists, returning
    /// the registered definition.
    pub fn ensure_model(&self, schema: ModelSchema) -> Arc<ModelSchema> {
        let mut models = self
            .inner
            .models
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        models
            .entry(key(&schema.name))
            .or_insert_with(|| Arc::new(schema))
            .clone()
    }

    pub fn types(&self) -> &DataTypes {
        &self.inner.types
    }

    pub fn evaluator(&self) -> &Arc<dyn ExpressionEvaluator> {
        &self.inner.evaluator
    }

    pub fn cache(&self) -> &Arc<dyn CacheStrategy> {
        &self.inner.cache
    }

    /// A custom listener registered under `name`.
    pub fn listener(&self, name: &str) -> Option<Arc<dyn DataEventListener>> {
        self.inner.listeners.get(name).cloned()
    }

    /// A custom validator registered under `name`.
    pub fn validator(&self, name: &str) -> Option<CustomValidator> {
        self.inner.validators.get(name).cloned()
    }

    pub fn settings(&self) -> Settings {
        self.inner.settings
    }

    pub fn migrations(&self) -> &MigrationCache {
        &self.inner.migrations
    }

    pub(crate) fn cached_mapping(
        &self,
        model: &str,
        field: &str,
    ) -> Option<Option<AssociationMapping>> {
        self.inner
            .mappings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(key(model), field.to_string()))
            .cloned()
    }

    pub(crate) fn cache_mapping(
        &self,
        model: &str,
        field: &str,
        mapping: Option<AssociationMapping>,
    ) {
        self.inner
            .mappings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((key(model), field.to_string()), mapping);
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for `DataConfiguration`.
#[derive(Default)]
pub struct DataConfigurationBuilder {
    models: Vec<ModelSchema>,
    types: Vec<DataType>,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    cache: Option<Arc<dyn CacheStrategy>>,
    listeners: HashMap<String, Arc<dyn DataEventListener>>,
    validators: HashMap<String, CustomValidator>,
    settings: Settings,
}

impl DataConfigurationBuilder {
    #[must_use]
    pub fn model(mut self, schema: ModelSchema) -> Self {
        self.models.push(schema);
        self
    }

    #[must_use]
    pub fn models<I: IntoIterator<Item = ModelSchema>>(mut self, schemas: I) -> Self {
        self.models.extend(schemas);
        self
    }

    /// Add a model definition written in JSON.
    pub fn model_json(self, json: &str) -> Result<Self> {
        Ok(self.model(ModelSchema::from_json(json)?))
    }

    /// Register (or replace) a primitive data type.
    #[must_use]
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.types.push(data_type);
        self
    }

    #[must_use]
    pub fn evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn CacheStrategy>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Register a listener that model definitions reference by `name`.
    #[must_use]
    pub fn listener(mut self, name: impl Into<String>, listener: Arc<dyn DataEventListener>) -> Self {
        self.listeners.insert(name.into(), listener);
        self
    }

    /// Register a validator that field definitions reference by `name`.
    #[must_use]
    pub fn validator<F>(mut self, name: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&Value, &DataObject) -> Option<String> + Send + Sync + 'static,
    {
        self.validators.insert(name.into(), Arc::new(validator));
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> DataConfiguration {
        let mut types = DataTypes::new();
        for data_type in self.types {
            types.register(data_type);
        }
        let models = self
            .models
            .into_iter()
            .map(|schema| (key(&schema.name), Arc::new(schema)))
            .collect();
        DataConfiguration {
            inner: Arc::new(ConfigurationInner {
                models: RwLock::new(models),
                types,
                evaluator: self
                    .evaluator
                    .unwrap_or_else(|| Arc::new(FunctionEvaluator)),
                cache: self
                    .cache
                    .unwrap_or_else(|| Arc::new(MemoryCacheStrategy::new())),
                listeners: self.listeners,
                validators: self.validators,
                settings: self.settings,
                mappings: RwLock::new(HashMap::new()),
                migrations: MigrationCache::default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemaorm_core::{DataTypeKind, FieldSchema};

    #[test]
    fn lookup_is_case_insensitive() {
        let configuration = DataConfiguration::builder()
            .model(ModelSchema::new("User").with_field(FieldSchema::new("id", "Counter").primary()))
            .build();
        assert!(configuration.model_schema("user").is_some());
        assert!(configuration.model_schema("USER").is_some());
        assert!(configuration.model_schema("Group").is_none());
    }

    #[test]
    fn set_model_invalidates_caches() {
        let configuration = DataConfiguration::builder()
            .model(ModelSchema::new("User"))
            .build();
        configuration.migrations().mark("User", "1.0");
        configuration.cache_mapping("User", "groups", None);
        configuration.set_model(ModelSchema::new("User").version("2.0"));
        assert!(!configuration.migrations().is_current("User", "1.0"));
        assert!(configuration.cached_mapping("User", "groups").is_none());
    }

    #[test]
    fn ensure_model_keeps_existing_definition() {
        let configuration = DataConfiguration::builder()
            .model(ModelSchema::new("Link").version("3.0"))
            .build();
        let schema = configuration.ensure_model(ModelSchema::new("Link"));
        assert_eq!(schema.version, "3.0");
    }

    #[test]
    fn custom_types_and_json_models() {
        let configuration = DataConfiguration::builder()
            .data_type(DataType::new("Money", DataTypeKind::Number))
            .model_json(r#"{"name": "Product", "fields": [{"name": "price", "type": "Money"}]}"#)
            .unwrap()
            .build();
        assert!(configuration.types().is_primitive("Money"));
        assert_eq!(configuration.model_names(), vec!["Product".to_string()]);
    }
}
