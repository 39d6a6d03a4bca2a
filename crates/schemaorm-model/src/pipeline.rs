//! Per-call listener pipelines.
//!
//! Every save, remove, query execution and migration builds its own ordered list of
//! listeners: the built-in listeners of the event, followed by the custom listeners
//! the model declares in `eventListeners`. Nothing is registered on the model, so
//! concurrent operations on one model never see each other's listeners.
//!
//! A listener aborts the chain by resolving to anything but `Outcome::Ok`; the
//! remaining listeners are not invoked and the outcome reaches the caller as is.

use std::sync::Arc;

use asupersync::{Cx, Outcome};

use schemaorm_core::{BoxFuture, CachingMode, Error, Result, try_outcome};

use crate::events::{DataEventArgs, DataEventListener, DataExecuteEventArgs, DataUpgradeEventArgs, EventKind};
use crate::listeners::{
    AssociationListener, CachingListener, CalculatedValueListener, DataValidatorListener,
    DefaultValueListener, NestedObjectListener, NotNullListener, PermissionListener,
    ReferencedObjectListener, SeedListener, StateListener, UniqueConstraintListener, ViewListener,
};
use crate::model::DataModel;

/// An ordered list of listeners for one operation.
pub(crate) struct Pipeline {
    listeners: Vec<Arc<dyn DataEventListener>>,
}

impl Pipeline {
    fn build(model: &DataModel, built_in: Vec<Arc<dyn DataEventListener>>) -> Result<Self> {
        let mut listeners = built_in;
        for declared in &model.schema().event_listeners {
            if declared.disabled {
                continue;
            }
            let listener = model
                .configuration()
                .listener(&declared.listener_type)
                .ok_or_else(|| {
                    Error::model_configuration(
                        model.name(),
                        format!(
                            "listener `{}` of model `{}` is not registered",
                            declared.listener_type,
                            model.name()
                        ),
                    )
                })?;
            listeners.push(listener);
        }
        Ok(Self { listeners })
    }

    /// The caching listener, for models that cache results.
    fn caching(model: &DataModel, listeners: &mut Vec<Arc<dyn DataEventListener>>) {
        if model.schema().caching != CachingMode::None {
            listeners.push(Arc::new(CachingListener));
        }
    }

    pub(crate) fn for_before_save(model: &DataModel) -> Result<Self> {
        Self::build(
            model,
            vec![
                Arc::new(StateListener),
                Arc::new(DefaultValueListener),
                Arc::new(CalculatedValueListener),
                Arc::new(NestedObjectListener),
                Arc::new(AssociationListener),
                Arc::new(UniqueConstraintListener),
                Arc::new(DataValidatorListener),
                Arc::new(NotNullListener),
                Arc::new(PermissionListener),
            ],
        )
    }

    pub(crate) fn for_after_save(model: &DataModel) -> Result<Self> {
        let mut listeners: Vec<Arc<dyn DataEventListener>> =
            vec![Arc::new(AssociationListener), Arc::new(NestedObjectListener)];
        Self::caching(model, &mut listeners);
        Self::build(model, listeners)
    }

    pub(crate) fn for_before_remove(model: &DataModel) -> Result<Self> {
        Self::build(
            model,
            vec![
                Arc::new(NestedObjectListener),
                Arc::new(ReferencedObjectListener),
                Arc::new(PermissionListener),
            ],
        )
    }

    pub(crate) fn for_after_remove(model: &DataModel) -> Result<Self> {
        let mut listeners: Vec<Arc<dyn DataEventListener>> = vec![Arc::new(NestedObjectListener)];
        Self::caching(model, &mut listeners);
        Self::build(model, listeners)
    }

    pub(crate) fn for_execute(model: &DataModel) -> Result<Self> {
        let mut listeners: Vec<Arc<dyn DataEventListener>> = vec![Arc::new(PermissionListener)];
        Self::caching(model, &mut listeners);
        Self::build(model, listeners)
    }

    pub(crate) fn for_upgrade(model: &DataModel) -> Result<Self> {
        Self::build(model, vec![Arc::new(ViewListener), Arc::new(SeedListener)])
    }

    /// True if some listener handles `kind`.
    pub(crate) fn subscribes(&self, kind: EventKind) -> bool {
        self.listeners.iter().any(|l| l.subscribes(kind))
    }

    fn subscribed(&self, kind: EventKind) -> impl Iterator<Item = &Arc<dyn DataEventListener>> {
        self.listeners.iter().filter(move |l| l.subscribes(kind))
    }

    pub(crate) fn before_save<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            for listener in self.subscribed(EventKind::BeforeSave) {
                try_outcome!(listener.before_save(cx, event).await);
            }
            Outcome::Ok(())
        })
    }

    pub(crate) fn after_save<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            for listener in self.subscribed(EventKind::AfterSave) {
                try_outcome!(listener.after_save(cx, event).await);
            }
            Outcome::Ok(())
        })
    }

    pub(crate) fn before_remove<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            for listener in self.subscribed(EventKind::BeforeRemove) {
                try_outcome!(listener.before_remove(cx, event).await);
            }
            Outcome::Ok(())
        })
    }

    pub(crate) fn after_remove<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            for listener in self.subscribed(EventKind::AfterRemove) {
                try_outcome!(listener.after_remove(cx, event).await);
            }
            Outcome::Ok(())
        })
    }

    pub(crate) fn before_execute<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataExecuteEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            for listener in self.subscribed(EventKind::BeforeExecute) {
                try_outcome!(listener.before_execute(cx, event).await);
            }
            Outcome::Ok(())
        })
    }

    pub(crate) fn after_execute<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataExecuteEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            for listener in self.subscribed(EventKind::AfterExecute) {
                try_outcome!(listener.after_execute(cx, event).await);
            }
            Outcome::Ok(())
        })
    }

    pub(crate) fn before_upgrade<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataUpgradeEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            for listener in self.subscribed(EventKind::BeforeUpgrade) {
                try_outcome!(listener.before_upgrade(cx, event).await);
            }
            Outcome::Ok(())
        })
    }

    pub(crate) fn after_upgrade<'a>(
        &'a self,
        cx: &'a Cx,
        event: &'a mut DataUpgradeEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            for listener in self.subscribed(EventKind::AfterUpgrade) {
                try_outcome!(listener.after_upgrade(cx, event).await);
            }
            Outcome::Ok(())
        })
    }
}
