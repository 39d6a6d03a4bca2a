//! Privilege checks for reads and writes.

use asupersync::{Cx, Outcome};

use schemaorm_core::value::{self, DataObject, Value};
use schemaorm_core::{
    BoxFuture, Error, PrivilegeMask, PrivilegeSchema, PrivilegeType, Result, try_result,
};
use schemaorm_query::Expr;

use crate::context::DataUser;
use crate::events::{DataEventArgs, DataEventListener, DataExecuteEventArgs, DataState, EventKind};
use crate::model::DataModel;

/// Enforces the privileges of a model.
///
/// Writes without a granting privilege fail. Reads are narrowed instead: to the
/// rows a `self` privilege grants, or to nothing. Silent operations and members of
/// the administrators group are never checked.
pub struct PermissionListener;

/// The attribute a `self` privilege compares with the current user, parsed from
/// filters like `owner eq me()`.
fn self_attribute(privilege: &PrivilegeSchema) -> Result<&str> {
    let filter = privilege.filter.as_deref().unwrap_or_default();
    match filter.split_whitespace().collect::<Vec<_>>().as_slice() {
        [attribute, op, "me()" | "user()"] if op.eq_ignore_ascii_case("eq") => Ok(*attribute),
        _ => Err(Error::expression(filter, "unsupported privilege filter")),
    }
}

fn grants_account(privilege: &PrivilegeSchema, user: Option<&DataUser>) -> bool {
    match privilege.account.as_deref() {
        None | Some("*") => true,
        Some(account) => user.is_some_and(|u| {
            u.name.eq_ignore_ascii_case(account) || u.is_member_of(account)
        }),
    }
}

/// Privileges of `model` that include `mask`.
fn granted(model: &DataModel, mask: PrivilegeMask) -> Vec<PrivilegeSchema> {
    model
        .schema()
        .effective_privileges()
        .into_iter()
        .filter(|p| p.mask.contains(mask))
        .collect()
}

fn bypass(model: &DataModel, silent: bool) -> bool {
    silent || model.context().user().is_some_and(DataUser::is_administrator)
}

/// True if the user may perform `mask` on `object`.
fn allows(model: &DataModel, mask: PrivilegeMask, object: &DataObject) -> Result<bool> {
    let user = model.context().user();
    for privilege in granted(model, mask) {
        match privilege.privilege_type {
            PrivilegeType::Global => {
                if grants_account(&privilege, user) {
                    return Ok(true);
                }
            }
            PrivilegeType::SelfScoped => {
                let Some(user) = user else {
                    continue;
                };
                let attribute = model.get_attribute(self_attribute(&privilege)?)?;
                let owner = match object.get(attribute.property_name()) {
                    Some(Value::Object(nested)) => nested.get("name").cloned(),
                    other => other.cloned(),
                };
                if owner.is_some_and(|o| value::equals(&o, &Value::from(user.name.clone()))) {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

impl PermissionListener {
    fn check_write(event: &DataEventArgs) -> Result<()> {
        let model = &event.model;
        if bypass(model, event.silent) {
            return Ok(());
        }
        let (mask, object) = match event.state {
            DataState::Insert => (PrivilegeMask::CREATE, &event.target),
            DataState::Update => (
                PrivilegeMask::UPDATE,
                event.previous.as_ref().unwrap_or(&event.target),
            ),
            DataState::Remove => (
                PrivilegeMask::DELETE,
                event.previous.as_ref().unwrap_or(&event.target),
            ),
        };
        if allows(model, mask, object)? {
            return Ok(());
        }
        tracing::debug!(
            model = %model.name(),
            operation = mask.operation_name(),
            user = ?model.context().user().map(|u| &u.name),
            "Access denied"
        );
        Err(Error::Permission {
            model: model.name().to_string(),
            operation: mask.operation_name().to_string(),
        })
    }

    /// The filter a read is narrowed by, or `None` when every row is readable.
    fn read_filter(model: &DataModel) -> Result<Option<Expr>> {
        let user = model.context().user();
        let view = model.view_adapter();
        let mut filter: Option<Expr> = None;
        for privilege in granted(model, PrivilegeMask::READ) {
            match privilege.privilege_type {
                PrivilegeType::Global => {
                    if grants_account(&privilege, user) {
                        return Ok(None);
                    }
                }
                PrivilegeType::SelfScoped => {
                    let Some(user) = user else {
                        continue;
                    };
                    let attribute = model.get_attribute(self_attribute(&privilege)?)?;
                    let own = Expr::qualified(&view, attribute.name).eq(user.name.clone());
                    filter = Some(match filter {
                        Some(existing) => existing.or(own),
                        None => own,
                    });
                }
            }
        }
        Ok(Some(filter.unwrap_or(Expr::Literal(Value::Bool(false)))))
    }
}

impl DataEventListener for PermissionListener {
    fn subscribes(&self, kind: EventKind) -> bool {
        matches!(
            kind,
            EventKind::BeforeSave | EventKind::BeforeRemove | EventKind::BeforeExecute
        )
    }

    fn before_save<'a>(
        &'a self,
        _cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            try_result!(Self::check_write(event));
            Outcome::Ok(())
        })
    }

    fn before_remove<'a>(
        &'a self,
        _cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            try_result!(Self::check_write(event));
            Outcome::Ok(())
        })
    }

    fn before_execute<'a>(
        &'a self,
        _cx: &'a Cx,
        event: &'a mut DataExecuteEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            if bypass(&event.model, event.silent) {
                return Outcome::Ok(());
            }
            if let Some(narrow) = try_result!(Self::read_filter(&event.model)) {
                tracing::trace!(model = %event.model.name(), "Narrowing query to readable rows");
                event.query.filter = Expr::and_option(event.query.filter.take(), Some(narrow));
            }
            Outcome::Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::DataConfiguration;
    use crate::context::DataContext;
    use schemaorm_core::{FieldSchema, ModelSchema};
    use schemaorm_memory::MemoryAdapter;
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> DataContext {
        let configuration = DataConfiguration::builder()
            .model(
                ModelSchema::new("Note")
                    .with_field(FieldSchema::new("id", "Counter").primary())
                    .with_field(FieldSchema::new("owner", "Text"))
                    .with_privilege(PrivilegeSchema {
                        mask: PrivilegeMask::READ,
                        privilege_type: PrivilegeType::Global,
                        account: Some("Readers".to_string()),
                        filter: None,
                    })
                    .with_privilege(PrivilegeSchema {
                        mask: PrivilegeMask(PrivilegeMask::READ.0 | PrivilegeMask::UPDATE.0),
                        privilege_type: PrivilegeType::SelfScoped,
                        account: None,
                        filter: Some("owner eq me()".to_string()),
                    }),
            )
            .build();
        DataContext::new(configuration, Arc::new(MemoryAdapter::new()))
    }

    #[test]
    fn self_filters_are_parsed() {
        let privilege = PrivilegeSchema {
            mask: PrivilegeMask::READ,
            privilege_type: PrivilegeType::SelfScoped,
            account: None,
            filter: Some("owner eq user()".to_string()),
        };
        assert_eq!(self_attribute(&privilege).unwrap(), "owner");
        let broken = PrivilegeSchema {
            filter: Some("owner gt 1".to_string()),
            ..privilege
        };
        assert_eq!(self_attribute(&broken).unwrap_err().code(), "EEXPR");
    }

    #[test]
    fn group_grant_allows_every_row() {
        let context = context().with_user(DataUser::new("bob").group("Readers"));
        let note = context.model("Note").unwrap();
        assert!(PermissionListener::read_filter(&note).unwrap().is_none());
    }

    #[test]
    fn self_grant_narrows_reads() {
        let context = context().with_user(DataUser::new("alice"));
        let note = context.model("Note").unwrap();
        let filter = PermissionListener::read_filter(&note).unwrap().unwrap();
        assert_eq!(filter, Expr::qualified("NoteData", "owner").eq("alice"));
    }

    #[test]
    fn anonymous_reads_see_nothing() {
        let note = context().model("Note").unwrap();
        let filter = PermissionListener::read_filter(&note).unwrap().unwrap();
        assert_eq!(filter, Expr::Literal(Value::Bool(false)));
    }

    #[test]
    fn self_grant_checks_the_owner() {
        let context = context().with_user(DataUser::new("alice"));
        let note = context.model("Note").unwrap();
        let own = json!({"id": 1, "owner": "alice"}).as_object().cloned().unwrap();
        let other = json!({"id": 2, "owner": "carol"}).as_object().cloned().unwrap();
        assert!(allows(&note, PrivilegeMask::UPDATE, &own).unwrap());
        assert!(!allows(&note, PrivilegeMask::UPDATE, &other).unwrap());
        assert!(!allows(&note, PrivilegeMask::CREATE, &own).unwrap());
    }

    #[test]
    fn administrators_bypass_checks() {
        let context = context().with_user(DataUser::new("root").group("Administrators"));
        let note = context.model("Note").unwrap();
        assert!(bypass(&note, false));
    }
}
