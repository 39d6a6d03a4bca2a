//! Saving and removing objects.
//!
//! Every public entry point migrates the model, then runs its objects one at a
//! time inside a single adapter transaction: the first failure stops the batch and
//! rolls back everything the batch wrote.

use asupersync::{Cx, Outcome};
use tracing::Instrument;

use schemaorm_core::value::{self, DataObject};
use schemaorm_core::{BoxFuture, Error, try_outcome, try_result};
use schemaorm_query::{DeleteQuery, Expr, InsertQuery, QueryExpression, UpdateQuery};

use crate::events::{DataEventArgs, DataState, STATE_PROPERTY};
use crate::model::DataModel;
use crate::pipeline::Pipeline;

impl DataModel {
    /// Insert or update an object, depending on whether it carries a primary key
    /// or a `$state` marker. Returns the saved object with its key.
    pub fn save<'a>(
        &'a self,
        cx: &'a Cx,
        object: DataObject,
    ) -> BoxFuture<'a, Outcome<DataObject, Error>> {
        self.save_one(cx, object, None)
    }

    /// Save several objects in one transaction.
    pub fn save_many<'a>(
        &'a self,
        cx: &'a Cx,
        objects: Vec<DataObject>,
    ) -> BoxFuture<'a, Outcome<Vec<DataObject>, Error>> {
        self.save_all(cx, objects, None)
    }

    pub fn insert<'a>(
        &'a self,
        cx: &'a Cx,
        object: DataObject,
    ) -> BoxFuture<'a, Outcome<DataObject, Error>> {
        self.save_one(cx, object, Some(DataState::Insert))
    }

    pub fn insert_many<'a>(
        &'a self,
        cx: &'a Cx,
        objects: Vec<DataObject>,
    ) -> BoxFuture<'a, Outcome<Vec<DataObject>, Error>> {
        self.save_all(cx, objects, Some(DataState::Insert))
    }

    pub fn update<'a>(
        &'a self,
        cx: &'a Cx,
        object: DataObject,
    ) -> BoxFuture<'a, Outcome<DataObject, Error>> {
        self.save_one(cx, object, Some(DataState::Update))
    }

    pub fn update_many<'a>(
        &'a self,
        cx: &'a Cx,
        objects: Vec<DataObject>,
    ) -> BoxFuture<'a, Outcome<Vec<DataObject>, Error>> {
        self.save_all(cx, objects, Some(DataState::Update))
    }

    /// Remove an object identified by its primary key.
    pub fn remove<'a>(&'a self, cx: &'a Cx, object: DataObject) -> BoxFuture<'a, Outcome<(), Error>> {
        self.remove_many(cx, vec![object])
    }

    /// Remove several objects in one transaction.
    pub fn remove_many<'a>(
        &'a self,
        cx: &'a Cx,
        objects: Vec<DataObject>,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            try_outcome!(self.migrate(cx).await);
            let work = Box::pin(async move {
                for object in objects {
                    try_outcome!(self.remove_object(cx, object).await);
                }
                Outcome::Ok(())
            });
            self.adapter().execute_in_transaction(cx, work).await
        })
    }

    fn save_one<'a>(
        &'a self,
        cx: &'a Cx,
        object: DataObject,
        state: Option<DataState>,
    ) -> BoxFuture<'a, Outcome<DataObject, Error>> {
        Box::pin(async move {
            let mut saved = try_outcome!(self.save_all(cx, vec![object], state).await);
            Outcome::Ok(saved.pop().unwrap_or_default())
        })
    }

    fn save_all<'a>(
        &'a self,
        cx: &'a Cx,
        objects: Vec<DataObject>,
        state: Option<DataState>,
    ) -> BoxFuture<'a, Outcome<Vec<DataObject>, Error>> {
        Box::pin(async move {
            try_outcome!(self.migrate(cx).await);
            let mut results = Vec::with_capacity(objects.len());
            let saved = &mut results;
            let work = Box::pin(async move {
                for object in objects {
                    saved.push(try_outcome!(self.save_object(cx, object, state).await));
                }
                Outcome::Ok(())
            });
            try_outcome!(self.adapter().execute_in_transaction(cx, work).await);
            Outcome::Ok(results)
        })
    }

    /// Run the save pipeline for one object.
    pub(crate) fn save_object<'a>(
        &'a self,
        cx: &'a Cx,
        mut target: DataObject,
        state: Option<DataState>,
    ) -> BoxFuture<'a, Outcome<DataObject, Error>> {
        let span = tracing::debug_span!("save", model = %self.name(), state = ?state);
        Box::pin(async move {
            if self.schema().is_abstract {
                return Outcome::Err(Error::ModelState {
                    model: self.name().to_string(),
                });
            }
            let marker = target
                .remove(STATE_PROPERTY)
                .and_then(|marker| DataState::parse(&marker));
            let explicit = state.or(marker);
            let inferred = if try_result!(self.key_of(&target)).is_some() {
                DataState::Update
            } else {
                DataState::Insert
            };
            let mut event = DataEventArgs {
                model: self.clone(),
                target,
                state: explicit.unwrap_or(inferred),
                explicit_state: explicit.is_some(),
                previous: None,
                silent: self.is_silent(),
            };

            let before = try_result!(Pipeline::for_before_save(self));
            try_outcome!(before.before_save(cx, &mut event).await);

            if let Some(base) = try_result!(self.storage_base()) {
                let saved = try_outcome!(
                    base.save_object(cx, event.target.clone(), Some(event.state))
                        .await
                );
                for (name, value) in saved {
                    event.target.insert(name, value);
                }
            }

            let mut values = try_result!(self.cast(&event.target, event.state));
            let key = try_result!(self.primary_key());
            let source = self.source_adapter();
            let adapter = self.adapter();
            match event.state {
                DataState::Insert => {
                    if key.type_name == "Counter" && value::get_present(&values, &key.name).is_none() {
                        let next = try_outcome!(adapter.next_identity(cx, &source, &key.name).await);
                        if let Some(next) = next {
                            values.insert(key.name.clone(), next);
                        }
                    }
                    let provided = value::get_present(&values, &key.name).cloned();
                    let statement = QueryExpression::Insert(InsertQuery {
                        entity: source,
                        values,
                    });
                    let result = try_outcome!(adapter.execute(cx, &statement).await);
                    let identity = match provided.or(result.insert_id) {
                        Some(identity) => Some(identity),
                        None => try_outcome!(adapter.last_identity(cx).await),
                    };
                    if let Some(identity) = identity {
                        event.target.insert(key.property_name().to_string(), identity);
                    }
                }
                DataState::Update => {
                    let Some(key_value) = values
                        .remove(&key.name)
                        .filter(|v| !v.is_null())
                        .or_else(|| value::get_present(&event.target, key.property_name()).cloned())
                    else {
                        return Outcome::Err(Error::MissingKey {
                            model: self.name().to_string(),
                        });
                    };
                    if values.is_empty() {
                        tracing::debug!(model = %self.name(), "Nothing to update");
                    } else {
                        let statement = QueryExpression::Update(UpdateQuery {
                            entity: source,
                            values,
                            filter: Some(Expr::field(key.name.clone()).eq(key_value)),
                        });
                        try_outcome!(adapter.execute(cx, &statement).await);
                    }
                }
                DataState::Remove => {
                    return Outcome::Err(Error::not_supported(
                        self.name(),
                        "an object marked for removal cannot be saved",
                    ));
                }
            }

            let after = try_result!(Pipeline::for_after_save(self));
            try_outcome!(after.after_save(cx, &mut event).await);
            tracing::debug!(model = %self.name(), state = ?event.state, "Object saved");
            Outcome::Ok(event.target)
        }
        .instrument(span))
    }

    /// Run the remove pipeline for one object.
    pub(crate) fn remove_object<'a>(
        &'a self,
        cx: &'a Cx,
        target: DataObject,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        let span = tracing::debug_span!("remove", model = %self.name());
        Box::pin(async move {
            let key = try_result!(self.primary_key());
            let Some(key_value) = value::get_present(&target, key.property_name()).cloned() else {
                return Outcome::Err(Error::MissingKey {
                    model: self.name().to_string(),
                });
            };
            let Some(previous) = try_outcome!(self.load(cx, &key_value).await) else {
                return Outcome::Err(Error::NotFound {
                    model: self.name().to_string(),
                });
            };
            let mut event = DataEventArgs {
                model: self.clone(),
                target,
                state: DataState::Remove,
                explicit_state: true,
                previous: Some(previous),
                silent: self.is_silent(),
            };
            let before = try_result!(Pipeline::for_before_remove(self));
            try_outcome!(before.before_remove(cx, &mut event).await);

            let statement = QueryExpression::Delete(DeleteQuery {
                entity: self.source_adapter(),
                filter: Some(Expr::field(key.name.clone()).eq(key_value.clone())),
            });
            try_outcome!(self.adapter().execute(cx, &statement).await);
            if let Some(base) = try_result!(self.storage_base()) {
                let mut base_target = DataObject::new();
                base_target.insert(
                    try_result!(base.primary_key()).property_name().to_string(),
                    key_value,
                );
                try_outcome!(base.remove_object(cx, base_target).await);
            }

            let after = try_result!(Pipeline::for_after_remove(self));
            try_outcome!(after.after_remove(cx, &mut event).await);
            tracing::debug!(model = %self.name(), "Object removed");
            Outcome::Ok(())
        }
        .instrument(span))
    }
}
