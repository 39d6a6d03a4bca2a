//! Primitive data types.
//!
//! A field whose `type` is registered here is a scalar column; any other type name
//! refers to a model. The registry also carries the validation hints the data
//! validator applies to every attribute of that type.

use std::collections::HashMap;

/// The storage family of a primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataTypeKind {
    /// Auto-generated integer identity.
    Counter,
    Integer,
    Number,
    Text,
    Boolean,
    Date,
    DateTime,
    Time,
    Guid,
    Json,
}

impl DataTypeKind {
    /// True for types whose values are strings.
    pub const fn is_text(self) -> bool {
        matches!(self, DataTypeKind::Text | DataTypeKind::Guid)
    }

    /// True for numeric types.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            DataTypeKind::Counter | DataTypeKind::Integer | DataTypeKind::Number
        )
    }
}

/// A registered primitive type.
#[derive(Debug, Clone, PartialEq)]
pub struct DataType {
    /// Type name as written in schemas (e.g. `"Text"`).
    pub name: String,
    /// Storage family.
    pub kind: DataTypeKind,
    /// Pattern every non-empty value must match.
    pub pattern: Option<String>,
    /// Message used when `pattern` does not match.
    pub pattern_message: Option<String>,
    /// Inclusive numeric lower bound.
    pub min_value: Option<f64>,
    /// Inclusive numeric upper bound.
    pub max_value: Option<f64>,
}

impl DataType {
    /// Create a type with no extra validation hints.
    pub fn new(name: impl Into<String>, kind: DataTypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            pattern: None,
            pattern_message: None,
            min_value: None,
            max_value: None,
        }
    }

    /// Require values to match a pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self.pattern_message = Some(message.into());
        self
    }

    /// Bound numeric values.
    #[must_use]
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }
}

/// Registry of primitive data types, keyed by name.
#[derive(Debug, Clone)]
pub struct DataTypes {
    types: HashMap<String, DataType>,
}

impl Default for DataTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl DataTypes {
    /// A registry with the built-in types.
    pub fn new() -> Self {
        let mut registry = Self {
            types: HashMap::new(),
        };
        for ty in [
            DataType::new("Counter", DataTypeKind::Counter),
            DataType::new("Integer", DataTypeKind::Integer),
            DataType::new("Short", DataTypeKind::Integer).range(-32768.0, 32767.0),
            DataType::new("Long", DataTypeKind::Integer),
            DataType::new("Number", DataTypeKind::Number),
            DataType::new("Float", DataTypeKind::Number),
            DataType::new("Decimal", DataTypeKind::Number),
            DataType::new("Text", DataTypeKind::Text),
            DataType::new("Note", DataTypeKind::Text),
            DataType::new("Duration", DataTypeKind::Text),
            DataType::new("Email", DataTypeKind::Text).pattern(
                r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$",
                "The value should be a valid email address",
            ),
            DataType::new("Url", DataTypeKind::Text).pattern(
                r"^https?://[^\s/$.?#].[^\s]*$",
                "The value should be a valid URL",
            ),
            DataType::new("Boolean", DataTypeKind::Boolean),
            DataType::new("Date", DataTypeKind::Date),
            DataType::new("DateTime", DataTypeKind::DateTime),
            DataType::new("Time", DataTypeKind::Time),
            DataType::new("Guid", DataTypeKind::Guid).pattern(
                r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
                "The value should be a valid unique identifier",
            ),
            DataType::new("Json", DataTypeKind::Json),
        ] {
            registry.register(ty);
        }
        registry
    }

    /// Register (or replace) a type.
    pub fn register(&mut self, data_type: DataType) {
        self.types.insert(data_type.name.clone(), data_type);
    }

    /// Look up a type by name.
    pub fn get(&self, name: &str) -> Option<&DataType> {
        self.types.get(name)
    }

    /// True if `name` is a registered primitive type.
    pub fn is_primitive(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Iterate over registered types.
    pub fn iter(&self) -> impl Iterator<Item = &DataType> {
        self.types.values()
    }
}
