//! Error types shared by every SchemaORM crate.
//!
//! Each variant corresponds to one failure kind of the data layer and carries
//! enough structured context (model, field, code) for callers to build their own
//! messages. `Display` only renders a short default message.

/// Result alias used throughout the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A data validation failure for a single attribute (or the whole object).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    /// The model being validated.
    pub model: String,
    /// The attribute that failed, if the failure is attribute-scoped.
    pub field: Option<String>,
    /// Per-attribute code, e.g. `EREQUIRED`, `EMAXLEN`, `EPATTERN`.
    pub inner_code: String,
    /// Human readable default message.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error for an attribute.
    pub fn new(
        model: impl Into<String>,
        field: impl Into<String>,
        inner_code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            field: Some(field.into()),
            inner_code: inner_code.into(),
            message: message.into(),
        }
    }
}

/// The error type of the data layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Missing adapter/model/listener, malformed schema.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        model: Option<String>,
    },

    /// An association mapping could not be resolved or rebound.
    #[error("mapping error on {model}.{field}: {message}")]
    Mapping {
        model: String,
        field: String,
        message: String,
    },

    /// A row cannot be removed because dependents reference it (`cascade = none`).
    #[error("{model} object is referenced by {child_model}.{child_field}")]
    ReferentialIntegrity {
        model: String,
        child_model: String,
        child_field: String,
    },

    /// An association declares a cascade action that is not recognized.
    #[error("invalid cascade action `{action}` on {model}.{field}")]
    CascadePolicy {
        model: String,
        field: String,
        action: String,
    },

    /// A junction is misconfigured or its associated model is missing.
    #[error("invalid association {model}.{field}: {message}")]
    AssociationShape {
        model: String,
        field: String,
        message: String,
    },

    /// An operation was attempted against an abstract model.
    #[error("model {model} is abstract and cannot be instantiated")]
    ModelState { model: String },

    /// An attribute (or object) failed data validation.
    #[error(transparent)]
    Validation(Box<ValidationError>),

    /// A `unique` constraint would be violated.
    #[error("a {model} object with the same {fields:?} already exists")]
    UniqueConstraint { model: String, fields: Vec<String> },

    /// A not-null attribute has no value.
    #[error("{model}.{field} cannot be empty")]
    NotNull { model: String, field: String },

    /// The current user is not allowed to perform the operation.
    #[error("access denied: {operation} on {model}")]
    Permission { model: String, operation: String },

    /// The object addressed by an explicit update or lookup does not exist.
    #[error("{model} object not found")]
    NotFound { model: String },

    /// The object has no primary key value.
    #[error("{model} object primary key is missing")]
    MissingKey { model: String },

    /// An expression, attribute shape or association direction is not supported.
    #[error("not supported: {message}")]
    NotSupported {
        message: String,
        model: Option<String>,
    },

    /// An attribute or value expression is malformed.
    #[error("invalid expression `{expression}`: {message}")]
    Expression { expression: String, message: String },

    /// An error reported by the storage adapter.
    #[error("adapter error: {message}")]
    Adapter { message: String },
}

impl Error {
    /// Configuration error without model context.
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            model: None,
        }
    }

    /// Configuration error scoped to a model.
    pub fn model_configuration(model: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            model: Some(model.into()),
        }
    }

    /// Adapter error.
    pub fn adapter(message: impl Into<String>) -> Self {
        Error::Adapter {
            message: message.into(),
        }
    }

    /// Not-supported error scoped to a model.
    pub fn not_supported(model: impl Into<String>, message: impl Into<String>) -> Self {
        Error::NotSupported {
            message: message.into(),
            model: Some(model.into()),
        }
    }

    /// Expression error.
    pub fn expression(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Expression {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// The stable error code of this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Configuration { .. } => "ECONFIG",
            Error::Mapping { .. } => "EMAP",
            Error::ReferentialIntegrity { .. } => "EFKEY",
            Error::CascadePolicy { .. } => "EATTR",
            Error::AssociationShape { .. } => "EJUNC",
            Error::ModelState { .. } => "EABSTRACT",
            Error::Validation(_) => "EVALIDATE",
            Error::UniqueConstraint { .. } => "EUNQ",
            Error::NotNull { .. } => "ENULL",
            Error::Permission { .. } => "EACCESS",
            Error::NotFound { .. } => "ENOTFOUND",
            Error::MissingKey { .. } => "EKEY",
            Error::NotSupported { .. } => "ENOTSUP",
            Error::Expression { .. } => "EEXPR",
            Error::Adapter { .. } => "EDB",
        }
    }

    /// The model this error refers to, if known.
    pub fn model(&self) -> Option<&str> {
        match self {
            Error::Configuration { model, .. } | Error::NotSupported { model, .. } => {
                model.as_deref()
            }
            Error::Mapping { model, .. }
            | Error::ReferentialIntegrity { model, .. }
            | Error::CascadePolicy { model, .. }
            | Error::AssociationShape { model, .. }
            | Error::ModelState { model }
            | Error::UniqueConstraint { model, .. }
            | Error::NotNull { model, .. }
            | Error::Permission { model, .. }
            | Error::NotFound { model }
            | Error::MissingKey { model } => Some(model),
            Error::Validation(inner) => Some(&inner.model),
            Error::Expression { .. } | Error::Adapter { .. } => None,
        }
    }

    /// The attribute this error refers to, if known.
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Mapping { field, .. }
            | Error::CascadePolicy { field, .. }
            | Error::AssociationShape { field, .. }
            | Error::NotNull { field, .. } => Some(field),
            Error::ReferentialIntegrity { child_field, .. } => Some(child_field),
            Error::Validation(inner) => inner.field.as_deref(),
            _ => None,
        }
    }

    /// The per-attribute code of a validation error.
    pub fn inner_code(&self) -> Option<&str> {
        match self {
            Error::Validation(inner) => Some(&inner.inner_code),
            _ => None,
        }
    }
}

impl From<ValidationError> for Error {
    fn from(value: ValidationError) -> Self {
        Error::Validation(Box::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::configuration(format!("invalid definition: {value}"))
    }
}
