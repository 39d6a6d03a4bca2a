//! Data-driven attribute validation.
//!
//! Rules come from three places: the registered data type of the attribute
//! (conformance, pattern, numeric range), `field.size` (maximum text length) and the
//! field's `validation` block. Named custom validators are resolved by the model
//! layer.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use regex::Regex;

use crate::error::ValidationError;
use crate::field::FieldSchema;
use crate::types::{DataType, DataTypeKind, DataTypes};
use crate::value::{self, Value};

/// Thread-safe regex cache for compiled patterns.
///
/// Patterns are compiled lazily on first use and cached for the lifetime of the
/// program.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        // Fast path: check if already cached
        {
            let cache = self
                .cache
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        self.cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Check if a string matches a regex pattern.
///
/// Returns `false` if the pattern is invalid (logs a warning).
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in validation, treating as non-match"
            );
            false
        }
    }
}

/// Validate a regex pattern. Returns an error message if the pattern is invalid.
pub fn validate_pattern(pattern: &str) -> Option<String> {
    match Regex::new(pattern) {
        Ok(_) => None,
        Err(e) => Some(format!("invalid regex pattern: {e}")),
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn conforms(kind: DataTypeKind, value: &Value) -> bool {
    match kind {
        DataTypeKind::Counter | DataTypeKind::Integer => match value {
            Value::Number(n) => n.as_i64().is_some() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        },
        DataTypeKind::Number => value::as_f64(value).is_some() && !value.is_boolean(),
        DataTypeKind::Text | DataTypeKind::Guid => value.is_string() || value.is_number(),
        DataTypeKind::Boolean => value.is_boolean(),
        DataTypeKind::Date => value.as_str().is_some_and(|s| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
                || chrono::DateTime::parse_from_rfc3339(s).is_ok()
        }),
        DataTypeKind::DateTime => value.as_str().is_some_and(|s| {
            chrono::DateTime::parse_from_rfc3339(s).is_ok()
                || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
                || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
                || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        }),
        DataTypeKind::Time => value.as_str().is_some_and(|s| {
            chrono::NaiveTime::parse_from_str(s, "%H:%M:%S").is_ok()
                || chrono::NaiveTime::parse_from_str(s, "%H:%M").is_ok()
        }),
        DataTypeKind::Json => true,
    }
}

struct Check<'a> {
    model: &'a str,
    field: &'a FieldSchema,
    message: Option<&'a str>,
}

impl Check<'_> {
    fn fail(&self, code: &str, default_message: String) -> ValidationError {
        let message = self
            .message
            .map_or(default_message, ToString::to_string);
        ValidationError::new(self.model, &self.field.name, code, message)
    }

    fn data_type(&self, data_type: &DataType, value: &Value) -> Result<(), ValidationError> {
        if !conforms(data_type.kind, value) {
            return Err(self.fail(
                "ETYPE",
                format!("The value of {} should be of type {}", self.field.name, data_type.name),
            ));
        }
        if let Some(pattern) = &data_type.pattern {
            if let Some(text) = text_of(value) {
                if !matches_pattern(&text, pattern) {
                    return Err(self.fail(
                        "EPATTERN",
                        data_type
                            .pattern_message
                            .clone()
                            .unwrap_or_else(|| "The value is in an invalid format".to_string()),
                    ));
                }
            }
        }
        self.range(data_type.min_value, data_type.max_value, value)
    }

    fn range(&self, min: Option<f64>, max: Option<f64>, value: &Value) -> Result<(), ValidationError> {
        let Some(number) = value::as_f64(value) else {
            return Ok(());
        };
        if min.is_some_and(|m| number < m) || max.is_some_and(|m| number > m) {
            let message = match (min, max) {
                (Some(lo), Some(hi)) => format!("The value should be between {lo} and {hi}"),
                (Some(lo), None) => format!("The value should be greater than or equal to {lo}"),
                (_, hi) => format!(
                    "The value should be lower than or equal to {}",
                    hi.unwrap_or(number)
                ),
            };
            return Err(self.fail("ERANGE", message));
        }
        Ok(())
    }
}

/// Validate a single non-null attribute value.
///
/// `null` values are not checked here; required-ness belongs to the not-null rules.
pub fn validate_attribute(
    model: &str,
    field: &FieldSchema,
    value: &Value,
    types: &DataTypes,
) -> Result<(), ValidationError> {
    if value.is_null() {
        return Ok(());
    }
    let rules = field.validation.as_ref();
    let check = Check {
        model,
        field,
        message: rules.and_then(|r| r.message.as_deref()),
    };

    if let Some(data_type) = types.get(&field.type_name) {
        check.data_type(data_type, value)?;
    }

    if let Some(size) = field.size {
        let is_text = types.get(&field.type_name).is_some_and(|t| t.kind.is_text());
        if let (true, Some(text)) = (is_text, value.as_str()) {
            if text.chars().count() > size {
                return Err(check.fail(
                    "EMAXLEN",
                    format!("The value exceeds the maximum length of {size}"),
                ));
            }
        }
    }

    let Some(rules) = rules else {
        return Ok(());
    };
    if let Some(type_name) = &rules.data_type {
        let data_type = types.get(type_name).ok_or_else(|| {
            check.fail("ETYPE", format!("Unknown validation type {type_name}"))
        })?;
        check.data_type(data_type, value)?;
    }
    if let Some(text) = text_of(value) {
        let length = text.chars().count();
        if let Some(min) = rules.min_length.filter(|min| length < *min) {
            return Err(check.fail(
                "EMINLEN",
                format!("The value should be at least {min} characters long"),
            ));
        }
        if let Some(max) = rules.max_length.filter(|max| length > *max) {
            return Err(check.fail(
                "EMAXLEN",
                format!("The value exceeds the maximum length of {max}"),
            ));
        }
        if let Some(pattern) = &rules.pattern {
            if !matches_pattern(&text, pattern) {
                return Err(check.fail(
                    "EPATTERN",
                    rules
                        .pattern_message
                        .clone()
                        .unwrap_or_else(|| "The value is in an invalid format".to_string()),
                ));
            }
        }
    }
    check.range(rules.min_value, rules.max_value, value)
}
