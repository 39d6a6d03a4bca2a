//! Attribute validation against data types and validation rules.

use asupersync::{Cx, Outcome};

use schemaorm_core::validate::validate_attribute;
use schemaorm_core::{BoxFuture, Error, ValidationError, try_result};

use crate::events::{DataEventArgs, DataEventListener, EventKind};

/// Runs the data validators of every primitive attribute the target carries.
///
/// Rules come from the attribute's data type, size and `validation` block. A
/// `validation.validator` names a custom validator registered in the
/// configuration; it returns a message when the value is rejected.
pub struct DataValidatorListener;

impl DataEventListener for DataValidatorListener {
    fn subscribes(&self, kind: EventKind) -> bool {
        kind == EventKind::BeforeSave
    }

    fn before_save<'a>(
        &'a self,
        _cx: &'a Cx,
        event: &'a mut DataEventArgs,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let model = &event.model;
            let configuration = model.configuration();
            let attributes = try_result!(model.attributes());
            for attribute in attributes.iter() {
                if attribute.is_many()
                    || attribute.is_virtual()
                    || !model.is_primitive(&attribute.type_name)
                {
                    continue;
                }
                let Some(value) = event.target.get(attribute.property_name()) else {
                    continue;
                };
                if value.is_null() {
                    if !attribute.nullable && !attribute.primary {
                        return Outcome::Err(
                            ValidationError::new(
                                model.name(),
                                &attribute.name,
                                "EREQUIRED",
                                format!("{} is required", attribute.name),
                            )
                            .into(),
                        );
                    }
                    continue;
                }
                try_result!(validate_attribute(
                    model.name(),
                    attribute,
                    value,
                    configuration.types()
                ));

                let Some(name) = attribute.validation.as_ref().and_then(|v| v.validator.as_ref())
                else {
                    continue;
                };
                let Some(validator) = configuration.validator(name) else {
                    return Outcome::Err(Error::model_configuration(
                        model.name(),
                        format!("validator `{name}` of `{}` is not registered", attribute.name),
                    ));
                };
                if let Some(message) = validator(value, &event.target) {
                    let message = attribute
                        .validation
                        .as_ref()
                        .and_then(|v| v.message.clone())
                        .unwrap_or(message);
                    return Outcome::Err(
                        ValidationError::new(model.name(), &attribute.name, "ECUSTOM", message)
                            .into(),
                    );
                }
            }
            Outcome::Ok(())
        })
    }
}
