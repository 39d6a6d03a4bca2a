//! Built-in event listeners.
//!
//! Each listener handles one concern of the save, remove, execute or upgrade
//! pipelines. They are public so custom pipelines and tests can reuse them, but the
//! data layer builds its pipelines itself (see `Pipeline`).

mod association;
mod caching;
mod calculated;
mod defaults;
mod nested;
mod not_null;
mod permission;
mod referenced;
mod state;
mod unique;
mod upgrade;
mod validator;

pub use association::AssociationListener;
pub use caching::CachingListener;
pub use calculated::CalculatedValueListener;
pub use defaults::DefaultValueListener;
pub use nested::NestedObjectListener;
pub use not_null::NotNullListener;
pub use permission::PermissionListener;
pub use referenced::ReferencedObjectListener;
pub use state::StateListener;
pub use unique::UniqueConstraintListener;
pub use upgrade::{SeedListener, ViewListener};
pub use validator::DataValidatorListener;

use asupersync::{Cx, Outcome};

use schemaorm_core::{BoxFuture, EvaluationContext, Error, FieldSchema, Value};

use crate::events::DataEventArgs;

/// Evaluate a `value` or `calculation` expression of `attribute` for the target of
/// `event`.
fn evaluate<'a>(
    cx: &'a Cx,
    event: &'a DataEventArgs,
    attribute: &'a FieldSchema,
    expression: &'a Value,
) -> BoxFuture<'a, Outcome<Value, Error>> {
    Box::pin(async move {
        let model = &event.model;
        let context = EvaluationContext {
            model: model.name(),
            field: &attribute.name,
            target: &event.target,
            user: model.context().user().map(|u| u.name.as_str()),
            identity: Some(model.context()),
        };
        model
            .configuration()
            .evaluator()
            .evaluate(cx, expression, &context)
            .await
    })
}
