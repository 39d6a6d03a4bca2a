//! Referential actions on remove.

use asupersync::{Cx, Outcome};

use schemaorm_core::{BoxFuture, Error};

use crate::cascade::cascade;
use crate::events::{DataEventArgs, DataEventListener, EventKind};

/// Applies the referential actions of every association that references the
/// object being removed.
pub struct ReferencedObjectListener;

impl DataEventListener for ReferencedObjectListener {
    fn subscribes(&self, kind: EventKind) -> bool {
        kind == EventKind::BeforeRemove
    }

    fn before_remove<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let Some(previous) = &event.previous else {
                return Outcome::Ok(());
            };
            cascade(cx, &event.model, previous).await
        })
    }
}
