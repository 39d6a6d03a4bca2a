//! Data models and persistence for SchemaORM.
//!
//! `schemaorm-model` is the **model layer**. It turns the schema definitions held by
//! a `DataConfiguration` into `DataModel`s bound to a storage adapter, resolves
//! association mappings and attribute paths into joins, and runs every save,
//! remove, query and migration through a pipeline of event listeners.
//!
//! # Role In The Architecture
//!
//! - **Configuration**: `DataConfiguration` owns model definitions, data types,
//!   registered listeners and validators, the cache strategy and the mapping and
//!   migration caches. `DataContext` binds it to an adapter and a user.
//! - **Models**: `DataModel` exposes attributes (own and inherited), primary keys,
//!   inferred `AssociationMapping`s and the persistence operations.
//! - **Queries**: `Queryable` composes filters, projections, ordering, paging and
//!   expansions over a model's view, resolving `a/b/c` attribute paths into joins.
//! - **Events**: each operation builds its own listener pipeline (state inference,
//!   defaults, calculated values, nested objects, associations, unique and
//!   not-null constraints, validation, permissions, cascades, caching).
//! - **Associations**: `DataAssociation` reads and mutates the collection behind a
//!   tag, junction or one-to-many attribute.
//!
//! # Example
//!
//! ```ignore
//! use schemaorm_model::{DataConfiguration, DataContext};
//!
//! let configuration = DataConfiguration::builder().model_json(CUSTOMER)?.build();
//! let context = DataContext::new(configuration, adapter);
//! let customers = context.model("Customer")?;
//! let saved = customers.save(&cx, customer).await;
//! let rows = customers.where_("address/city").equal("Athens").get_items(&cx).await;
//! ```

mod association;
mod cascade;
pub mod configuration;
pub mod context;
pub mod events;
mod expand;
pub mod listeners;
mod mapping;
mod migrate;
mod model;
mod persist;
mod pipeline;
mod queryable;
mod resolver;

pub use association::{AssociationKind, DataAssociation};
pub use configuration::{
    CustomValidator, DataConfiguration, DataConfigurationBuilder, MigrationCache, Settings,
};
pub use context::{ADMINISTRATORS, DataContext, DataUser};
pub use events::{
    DataEventArgs, DataEventListener, DataExecuteEventArgs, DataState, DataUpgradeEventArgs,
    EventKind, STATE_PROPERTY,
};
pub use expand::{Expand, ExpandOptions};
pub use model::DataModel;
pub use queryable::{DataList, Queryable};
