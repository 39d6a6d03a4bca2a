//! Model migration.
//!
//! A model is migrated at most once per version and configuration: before the
//! first query or save touches it, its storage base is migrated, then a migration
//! descriptor of its own storable columns is handed to the adapter inside a
//! transaction, surrounded by `before.upgrade`/`after.upgrade` events.

use asupersync::{Cx, Outcome};
use tracing::Instrument;

use schemaorm_core::{
    BoxFuture, Error, FieldSchema, MigrationDescriptor, Result, try_outcome, try_result,
};
use schemaorm_query::{Expr, JoinExpression, QueryEntity, QueryField, SelectQuery};

use crate::events::DataUpgradeEventArgs;
use crate::model::DataModel;
use crate::pipeline::Pipeline;

impl DataModel {
    /// The storable columns of this model. Foreign keys take the type of the key
    /// they reference.
    pub fn storage_fields(&self) -> Result<Vec<FieldSchema>> {
        let mut fields = Vec::new();
        for attribute in self.attributes()?.iter() {
            if !attribute.is_owned_by(self.name()) || attribute.is_many() || attribute.is_virtual()
            {
                continue;
            }
            let mut field = attribute.clone();
            if !self.is_primitive(&field.type_name) {
                if let Some(mapping) = self.infer_mapping(&field.name)? {
                    let parent = self.sibling(&mapping.parent_model)?;
                    field.type_name = parent.get_attribute(&mapping.parent_field)?.type_name;
                }
            }
            if !field.primary && field.type_name == "Counter" {
                field.type_name = "Integer".to_string();
            }
            fields.push(field);
        }
        Ok(fields)
    }

    /// The migration descriptor of the current version.
    pub fn migration_descriptor(&self) -> Result<MigrationDescriptor> {
        let schema = self.schema();
        let mut descriptor = MigrationDescriptor {
            applies_to: self.source_adapter(),
            model: self.name().to_string(),
            version: schema.version.clone(),
            description: schema.title.clone().unwrap_or_default(),
            add: Vec::new(),
            indexes: Vec::new(),
        };
        for field in self.storage_fields()? {
            let foreign_key = self
                .attribute(&field.name)?
                .is_some_and(|a| !self.is_primitive(&a.type_name));
            if field.indexed || foreign_key {
                descriptor.add_index(&field.name);
            }
            descriptor.add.push(field);
        }
        Ok(descriptor)
    }

    /// Create or upgrade the storage of this model.
    ///
    /// Sealed models are never migrated; abstract models have no storage.
    pub fn migrate<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>> {
        let span = tracing::debug_span!("migrate", model = %self.name());
        Box::pin(async move {
            let schema = self.schema();
            if schema.sealed {
                return Outcome::Ok(());
            }
            if schema.is_abstract {
                return Outcome::Err(Error::ModelState {
                    model: self.name().to_string(),
                });
            }
            let migrations = self.configuration().migrations();
            if migrations.is_current(self.name(), &schema.version) {
                return Outcome::Ok(());
            }
            if let Some(base) = try_result!(self.storage_base()) {
                try_outcome!(base.migrate(cx).await);
            }

            let descriptor = try_result!(self.migration_descriptor());
            let pipeline = try_result!(Pipeline::for_upgrade(self));
            let adapter = self.adapter();
            let pipeline = &pipeline;
            let work = Box::pin(async move {
                let mut event = DataUpgradeEventArgs {
                    model: self.clone(),
                    descriptor,
                    applied: false,
                };
                try_outcome!(pipeline.before_upgrade(cx, &mut event).await);
                let status = try_outcome!(adapter.migrate(cx, &event.descriptor).await);
                event.applied = status.applied;
                migrations.mark(self.name(), &event.model.schema().version);
                try_outcome!(pipeline.after_upgrade(cx, &mut event).await);
                tracing::info!(
                    model = %self.name(),
                    version = %event.descriptor.version,
                    applied = event.applied,
                    "Model migrated"
                );
                Outcome::Ok(())
            });
            let outcome = adapter.execute_in_transaction(cx, work).await;
            if !matches!(outcome, Outcome::Ok(())) {
                migrations.invalidate(self.name());
            }
            outcome
        }
        .instrument(span))
    }

    /// The select a view adapter is defined by: the storage of this model joined
    /// with the view of its storage base.
    pub(crate) fn view_query(&self) -> Result<SelectQuery> {
        let source = self.source_adapter();
        let Some(base) = self.storage_base()? else {
            return Ok(SelectQuery::new(source));
        };
        let base_view = base.view_adapter();
        let own = self.storage_fields()?;
        let mut fields: Vec<QueryField> = own
            .iter()
            .map(|f| QueryField::new(Expr::qualified(&source, &f.name)))
            .collect();
        for field in base.storage_view_fields()? {
            if own.iter().all(|f| f.name != field) {
                fields.push(QueryField::new(Expr::qualified(&base_view, field)));
            }
        }
        let key = self.primary_key()?.name;
        let base_key = base.primary_key()?.name;
        Ok(SelectQuery::new(source.clone())
            .select(fields)
            .join(JoinExpression::inner(
                QueryEntity::new(base_view.clone()),
                Expr::qualified(&source, key).eq_expr(Expr::qualified(base_view, base_key)),
            )))
    }

    /// Column names exposed by this model's view.
    fn storage_view_fields(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.storage_fields()?.into_iter().map(|f| f.name).collect();
        if let Some(base) = self.storage_base()? {
            for name in base.storage_view_fields()? {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::DataConfiguration;
    use crate::context::DataContext;
    use schemaorm_core::ModelSchema;
    use schemaorm_memory::MemoryAdapter;
    use std::sync::Arc;

    fn context() -> DataContext {
        let configuration = DataConfiguration::builder()
            .model(
                ModelSchema::new("Party")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("name", "Text").indexed()),
            )
            .model(
                ModelSchema::new("Customer")
                    .inherits("Party")
                    .with_field(FieldSchema::new("rating", "Integer"))
                    .with_field(FieldSchema::new("orders", "Order")),
            )
            .model(
                ModelSchema::new("Order")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("customer", "Customer")),
            )
            .build();
        DataContext::new(configuration, Arc::new(MemoryAdapter::new()))
    }

    #[test]
    fn descriptor_holds_own_columns_and_indexes() {
        let context = context();
        let order = context.model("Order").unwrap();
        let descriptor = order.migration_descriptor().unwrap();
        assert_eq!(descriptor.applies_to, "OrderBase");
        let customer = descriptor.add.iter().find(|f| f.name == "customer").unwrap();
        assert_eq!(customer.type_name, "Integer");
        assert_eq!(descriptor.indexes[0].columns, vec!["customer".to_string()]);

        let party = context.model("Party").unwrap().migration_descriptor().unwrap();
        assert_eq!(party.indexes.len(), 1);
    }

    #[test]
    fn derived_descriptor_skips_inherited_columns() {
        let customer = context().model("Customer").unwrap();
        let descriptor = customer.migration_descriptor().unwrap();
        let names: Vec<&str> = descriptor.add.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["rating", "id"]);
    }

    #[test]
    fn derived_view_joins_base_view() {
        let customer = context().model("Customer").unwrap();
        let query = customer.view_query().unwrap();
        assert_eq!(query.entity.name, "CustomerBase");
        assert_eq!(query.joins.len(), 1);
        assert_eq!(query.joins[0].entity.name, "PartyData");
        let names: Vec<Option<&str>> = query.fields.iter().map(QueryField::output_name).collect();
        assert_eq!(names, vec![Some("rating"), Some("id"), Some("name")]);
    }
}
