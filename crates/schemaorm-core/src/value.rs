//! Dynamic values.
//!
//! Models are described at runtime, so objects are plain JSON objects rather than
//! typed structs. These helpers give the rest of the workspace a consistent notion of
//! emptiness, equality and ordering over them.

use std::cmp::Ordering;

pub use serde_json::Value;

/// A single object: an insert/update payload, a query result row, an event target.
pub type DataObject = serde_json::Map<String, Value>;

/// True when the value is absent or JSON `null`.
pub fn is_empty(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Get a non-null attribute value from an object.
pub fn get_present<'a>(object: &'a DataObject, name: &str) -> Option<&'a Value> {
    object.get(name).filter(|v| !v.is_null())
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total ordering over values: `null < bool < number < string < array < object`.
///
/// Numbers compare numerically regardless of their integer/float representation.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return x.cmp(&y);
            }
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Loose equality used for key matching: numbers compare by value.
pub fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Ordering::Equal,
        _ => a == b,
    }
}

/// A canonical string for a key value, suitable as a hash-map key.
pub fn key_string(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.as_f64().map_or_else(|| n.to_string(), |f| {
                if f.fract() == 0.0 && f.abs() < 9.0e15 {
                    (f as i64).to_string()
                } else {
                    f.to_string()
                }
            }),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Interpret a value as `f64` where possible (numbers and numeric strings).
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Convert an `f64` back into a JSON number, preferring integers when exact.
pub fn from_f64(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

/// Truthiness used by filters: `null`, `false`, `0` and `""` are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_by_value() {
        assert!(equals(&json!(1), &json!(1.0)));
        assert_eq!(compare(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(key_string(&json!(3.0)), "3");
    }

    #[test]
    fn null_sorts_first() {
        assert_eq!(compare(&Value::Null, &json!("a")), Ordering::Less);
        assert_eq!(compare(&json!(true), &json!(0)), Ordering::Less);
    }

    #[test]
    fn emptiness() {
        let mut obj = DataObject::new();
        obj.insert("a".into(), Value::Null);
        assert!(is_empty(obj.get("a")));
        assert!(is_empty(obj.get("b")));
        assert!(get_present(&obj, "a").is_none());
    }
}
