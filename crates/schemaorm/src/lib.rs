//! SchemaORM: schema-described data models for Rust.
//!
//! Models are declared as JSON-like definitions (fields, inheritance, associations,
//! constraints, privileges, listeners) rather than as Rust types. A
//! `DataConfiguration` holds the definitions, a `DataContext` binds them to a
//! storage adapter, and each `DataModel` offers attribute-path queries and a
//! listener-driven save/remove pipeline with association cascading.
//!
//! This crate is the facade: it re-exports the sub-crates so applications depend on
//! one crate and import from `schemaorm::prelude`.
//!
//! # Example
//!
//! ```ignore
//! use schemaorm::prelude::*;
//!
//! let configuration = DataConfiguration::builder()
//!     .model_json(r#"{"name": "Customer", "fields": [
//!         {"name": "id", "type": "Counter", "primary": true},
//!         {"name": "name", "type": "Text", "nullable": false}
//!     ]}"#)?
//!     .build();
//! let context = DataContext::new(configuration, Arc::new(MemoryAdapter::new()));
//! let customers = context.model("Customer")?;
//!
//! let saved = customers.save(&cx, object).await;
//! let page = customers.where_("name").starts_with("A").take(25).list(&cx).await;
//! ```
//!
//! # Crates
//!
//! - `schemaorm-core`: schema types, values, errors, data types, validators,
//!   expression evaluation and caching.
//! - `schemaorm-query`: query expressions and the `DataAdapter` contract.
//! - `schemaorm-model`: configuration, models, queryables, listeners and
//!   association collections.
//! - `schemaorm-memory` (feature `memory`, on by default): an in-memory adapter.

pub use schemaorm_core as core;
pub use schemaorm_model as model;
pub use schemaorm_query as query;

#[cfg(feature = "memory")]
pub use schemaorm_memory as memory;

pub use schemaorm_core::{
    AssociationMapping, AssociationType, CacheStrategy, CachingMode, CascadeAction, Cx,
    DataObject, DataType, DataTypes, Error, ExpressionEvaluator, FieldSchema, FunctionEvaluator,
    MemoryCacheStrategy, ModelSchema, Outcome, PrivilegeMask, PrivilegeSchema, PrivilegeType,
    Result, ValidationError, Value,
};
pub use schemaorm_model::{
    AssociationKind, DataAssociation, DataConfiguration, DataConfigurationBuilder, DataContext,
    DataEventArgs, DataEventListener, DataExecuteEventArgs, DataList, DataModel, DataState,
    DataUpgradeEventArgs, DataUser, EventKind, Expand, ExpandOptions, Queryable, Settings,
};
pub use schemaorm_query::{DataAdapter, Expr, QueryExpression, QueryResult, SelectQuery};

#[cfg(feature = "memory")]
pub use schemaorm_memory::MemoryAdapter;

/// Everything an application needs to define models and run operations.
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::{
        AssociationKind, CachingMode, Cx, DataAdapter, DataConfiguration, DataContext,
        DataEventArgs, DataEventListener, DataModel, DataObject, DataState, DataUser, Error,
        EventKind, ExpandOptions, Expr, FieldSchema, ModelSchema, Outcome, Queryable, Result,
        Value,
    };

    #[cfg(feature = "memory")]
    pub use crate::MemoryAdapter;
}
