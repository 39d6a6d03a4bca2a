//! Insert/update state resolution.

use asupersync::{Cx, Outcome};

use schemaorm_core::{BoxFuture, Error, try_outcome, try_result};

use crate::events::{DataEventArgs, DataEventListener, DataState, EventKind};

/// Checks the state of an object before it is saved.
///
/// An update loads the stored row into `previous`. An inferred update whose key
/// does not exist yet becomes an insert; an explicit one fails.
pub struct StateListener;

impl DataEventListener for StateListener {
    fn subscribes(&self, kind: EventKind) -> bool {
        kind == EventKind::BeforeSave
    }

    fn before_save<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            if event.state != DataState::Update {
                return Outcome::Ok(());
            }
            let model = event.model.clone();
            let Some(key) = try_result!(model.key_of(&event.target)) else {
                return Outcome::Err(Error::MissingKey {
                    model: model.name().to_string(),
                });
            };
            match try_outcome!(model.load(cx, &key).await) {
                Some(previous) => event.previous = Some(previous),
                None if event.explicit_state => {
                    return Outcome::Err(Error::NotFound {
                        model: model.name().to_string(),
                    });
                }
                None => {
                    tracing::trace!(model = %model.name(), key = %key, "Key not stored, inserting");
                    event.state = DataState::Insert;
                }
            }
            Outcome::Ok(())
        })
    }
}
