//! Data contexts.
//!
//! A context pairs a configuration with the storage adapter and the user on whose
//! behalf operations run. Models are always obtained from a context.

use std::fmt;
use std::sync::Arc;

use asupersync::{Cx, Outcome};

use schemaorm_core::{BoxFuture, Error, IdentityProvider, Result, Value};
use schemaorm_query::DataAdapter;

use crate::configuration::DataConfiguration;
use crate::model::DataModel;

/// Group whose members bypass privilege checks.
pub const ADMINISTRATORS: &str = "Administrators";

/// The user operations run for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUser {
    pub name: String,
    pub groups: Vec<String>,
}

impl DataUser {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
        }
    }

    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn is_member_of(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g.eq_ignore_ascii_case(group))
    }

    pub fn is_administrator(&self) -> bool {
        self.is_member_of(ADMINISTRATORS)
    }
}

/// A configuration bound to a storage adapter and an optional user.
#[derive(Clone)]
pub struct DataContext {
    configuration: DataConfiguration,
    adapter: Arc<dyn DataAdapter>,
    user: Option<DataUser>,
}

impl fmt::Debug for DataContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataContext")
            .field("configuration", &self.configuration)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl DataContext {
    pub fn new(configuration: DataConfiguration, adapter: Arc<dyn DataAdapter>) -> Self {
        Self {
            configuration,
            adapter,
            user: None,
        }
    }

    /// A copy of this context acting for `user`.
    #[must_use]
    pub fn with_user(&self, user: DataUser) -> Self {
        Self {
            user: Some(user),
            ..self.clone()
        }
    }

    pub fn configuration(&self) -> &DataConfiguration {
        &self.configuration
    }

    pub fn adapter(&self) -> &Arc<dyn DataAdapter> {
        &self.adapter
    }

    pub fn user(&self) -> Option<&DataUser> {
        self.user.as_ref()
    }

    /// The model named `name`.
    pub fn model(&self, name: &str) -> Result<DataModel> {
        let schema = self.configuration.model_schema(name).ok_or_else(|| {
            Error::model_configuration(name, format!("model `{name}` is not defined"))
        })?;
        Ok(DataModel::new(self.clone(), schema))
    }
}

impl IdentityProvider for DataContext {
    fn next_identity<'a>(
        &'a self,
        cx: &'a Cx,
        model: &'a str,
        field: &'a str,
    ) -> BoxFuture<'a, Outcome<Option<Value>, Error>> {
        Box::pin(async move {
            let Some(schema) = self.configuration.model_schema(model) else {
                return Outcome::Ok(None);
            };
            let source = schema.source_adapter();
            self.adapter.next_identity(cx, &source, field).await
        })
    }
}
