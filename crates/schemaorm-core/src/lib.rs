//! Core types and contracts for SchemaORM.
//!
//! `schemaorm-core` is the **foundation layer** of the workspace. It defines the
//! schema description format, the dynamic value representation and the shared
//! error type every other crate builds on.
//!
//! # Role In The Architecture
//!
//! - **Schema layer**: `ModelSchema` and `FieldSchema` describe models the way they
//!   are written in JSON definition files; `AssociationMapping` describes a resolved
//!   relationship between two models.
//! - **Data layer**: `DataObject` (a JSON object) is the unit of persistence and the
//!   shape of every query result row.
//! - **Services**: the `DataTypes` registry, the `ExpressionEvaluator` used for default
//!   and calculated values, the validators and the `CacheStrategy` contract.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync so every
//!   storage operation is cancel-correct and budget-aware.
//!
//! # Who Uses This Crate
//!
//! - `schemaorm-query` builds query expressions over these values.
//! - `schemaorm-model` resolves schemas into models, mappings and listeners.
//! - Adapter crates (`schemaorm-memory`) persist `DataObject`s.

use std::future::Future;
use std::pin::Pin;

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod cache;
pub mod error;
pub mod expression;
pub mod field;
pub mod inflection;
pub mod mapping;
pub mod migration;
pub mod schema;
pub mod types;
pub mod validate;
pub mod value;

pub use cache::{CacheStrategy, MemoryCacheStrategy};
pub use error::{Error, Result, ValidationError};
pub use expression::{EvaluationContext, ExpressionEvaluator, FunctionEvaluator, IdentityProvider};
pub use field::{FieldMappingSchema, FieldSchema, FieldValidation, Multiplicity};
pub use mapping::{AssociationMapping, AssociationType, CascadeAction};
pub use migration::{IndexDescriptor, MigrationDescriptor, MigrationStatus};
pub use schema::{
    CachingMode, ConstraintSchema, EventListenerSchema, ModelSchema, PrivilegeMask,
    PrivilegeSchema, PrivilegeType, ViewField, ViewSchema,
};
pub use types::{DataType, DataTypeKind, DataTypes};
pub use value::{DataObject, Value};

/// A boxed, sendable future.
///
/// Used at every seam that is dispatched dynamically (adapters, listeners,
/// evaluators) or that recurses (base-object saves, cascading removes).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Unwrap an `Outcome`, returning early from the enclosing function or async block
/// on anything but `Outcome::Ok`.
#[macro_export]
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            $crate::Outcome::Ok(value) => value,
            $crate::Outcome::Err(error) => return $crate::Outcome::Err(error),
            $crate::Outcome::Cancelled(reason) => return $crate::Outcome::Cancelled(reason),
            $crate::Outcome::Panicked(payload) => return $crate::Outcome::Panicked(payload),
        }
    };
}

/// Unwrap a `Result`, returning `Outcome::Err` from the enclosing function or async
/// block on failure.
#[macro_export]
macro_rules! try_result {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(error) => return $crate::Outcome::Err(error.into()),
        }
    };
}
