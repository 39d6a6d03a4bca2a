//! Upgrade listeners: view creation and seeding.

use asupersync::{Cx, Outcome};

use schemaorm_core::{BoxFuture, Error, try_outcome, try_result};

use crate::events::{DataEventListener, DataUpgradeEventArgs, EventKind};

/// Creates the view adapter of a model after its storage was migrated.
pub struct ViewListener;

impl DataEventListener for ViewListener {
    fn subscribes(&self, kind: EventKind) -> bool {
        kind == EventKind::AfterUpgrade
    }

    fn after_upgrade<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataUpgradeEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let model = &event.model;
            let view = model.view_adapter();
            if !event.applied || view == model.source_adapter() {
                return Outcome::Ok(());
            }
            let query = try_result!(model.view_query());
            tracing::debug!(model = %model.name(), view = %view, "Creating view");
            model.adapter().create_view(cx, &view, &query).await
        })
    }
}

/// Saves the seed objects of a model after its storage was created.
pub struct SeedListener;

impl DataEventListener for SeedListener {
    fn subscribes(&self, kind: EventKind) -> bool {
        kind == EventKind::AfterUpgrade
    }

    fn after_upgrade<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataUpgradeEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let seed = &event.model.schema().seed;
            if !event.applied || seed.is_empty() {
                return Outcome::Ok(());
            }
            tracing::info!(model = %event.model.name(), objects = seed.len(), "Seeding model");
            let model = event.model.silent(true);
            try_outcome!(model.insert_many(cx, seed.clone()).await);
            Outcome::Ok(())
        })
    }
}
