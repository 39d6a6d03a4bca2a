//! Expression evaluation and select execution over in-memory rows.

use std::cmp::Ordering;
use std::collections::HashMap;

use schemaorm_core::value::{self, DataObject, Value};
use schemaorm_core::{Error, Result};
use schemaorm_query::{CompareOp, Expr, Func, JoinKind, SelectQuery};

/// Rows of one entity taking part in a select, addressed by `reference`.
#[derive(Debug)]
pub(crate) struct Source {
    pub name: String,
    pub reference: String,
    pub rows: Vec<DataObject>,
}

/// One row index per source; `None` is the null side of a left join.
pub(crate) type Combo = Vec<Option<usize>>;

pub(crate) enum Scope<'a> {
    Row {
        sources: &'a [Source],
        combo: &'a Combo,
    },
    Group {
        sources: &'a [Source],
        combos: &'a [&'a Combo],
    },
    Object(&'a DataObject),
}

fn source_index(sources: &[Source], entity: Option<&str>) -> usize {
    entity
        .and_then(|e| {
            sources
                .iter()
                .position(|s| s.reference == e)
                .or_else(|| sources.iter().position(|s| s.name == e))
        })
        .unwrap_or(0)
}

fn lookup(sources: &[Source], combo: &Combo, entity: Option<&str>, name: &str) -> Value {
    let index = source_index(sources, entity);
    combo
        .get(index)
        .copied()
        .flatten()
        .and_then(|row| sources[index].rows.get(row))
        .and_then(|row| row.get(name))
        .cloned()
        .unwrap_or(Value::Null)
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_datetime(value: &Value) -> Option<chrono::NaiveDateTime> {
    let s = value.as_str()?;
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn numeric(args: &[Value], index: usize) -> Option<f64> {
    args.get(index).and_then(value::as_f64)
}

fn arith(args: &[Value], op: impl Fn(f64, f64) -> Option<f64>) -> Value {
    match (numeric(args, 0), numeric(args, 1)) {
        (Some(a), Some(b)) => op(a, b).map_or(Value::Null, value::from_f64),
        _ => Value::Null,
    }
}

fn apply_scalar(func: &Func, args: &[Value]) -> Result<Value> {
    use chrono::{Datelike, Timelike};

    let first = args.first().cloned().unwrap_or(Value::Null);
    let date_part = |part: fn(&chrono::NaiveDateTime) -> i64| {
        parse_datetime(&first).map_or(Value::Null, |dt| Value::from(part(&dt)))
    };
    let value = match func {
        Func::Add => arith(args, |a, b| Some(a + b)),
        Func::Subtract => arith(args, |a, b| Some(a - b)),
        Func::Multiply => arith(args, |a, b| Some(a * b)),
        Func::Divide => arith(args, |a, b| (b != 0.0).then(|| a / b)),
        Func::Mod => arith(args, |a, b| (b != 0.0).then(|| a % b)),
        Func::BitAnd => match (numeric(args, 0), numeric(args, 1)) {
            (Some(a), Some(b)) => Value::from((a as i64) & (b as i64)),
            _ => Value::Null,
        },
        Func::Round => match numeric(args, 0) {
            Some(a) => {
                let digits = numeric(args, 1).unwrap_or(0.0) as i32;
                let factor = 10f64.powi(digits);
                value::from_f64((a * factor).round() / factor)
            }
            None => Value::Null,
        },
        Func::Floor => numeric(args, 0).map_or(Value::Null, |a| value::from_f64(a.floor())),
        Func::Ceil => numeric(args, 0).map_or(Value::Null, |a| value::from_f64(a.ceil())),
        Func::Substring => match text(&first) {
            Some(s) => {
                let start = numeric(args, 1).unwrap_or(0.0).max(0.0) as usize;
                let chars = s.chars().skip(start);
                Value::String(match numeric(args, 2) {
                    Some(len) => chars.take(len.max(0.0) as usize).collect(),
                    None => chars.collect(),
                })
            }
            None => Value::Null,
        },
        Func::IndexOf => match (text(&first), args.get(1).and_then(text)) {
            (Some(s), Some(needle)) => Value::from(
                s.find(&needle)
                    .map_or(-1, |byte| s[..byte].chars().count() as i64),
            ),
            _ => Value::Null,
        },
        Func::Concat => Value::String(args.iter().filter_map(text).collect()),
        Func::Trim => text(&first).map_or(Value::Null, |s| Value::String(s.trim().to_string())),
        Func::Length => text(&first).map_or(Value::Null, |s| Value::from(s.chars().count() as i64)),
        Func::ToLower => text(&first).map_or(Value::Null, |s| Value::String(s.to_lowercase())),
        Func::ToUpper => text(&first).map_or(Value::Null, |s| Value::String(s.to_uppercase())),
        Func::Date => parse_datetime(&first)
            .map_or(Value::Null, |dt| Value::String(dt.date().to_string())),
        Func::Year => date_part(|dt| i64::from(dt.year())),
        Func::Month => date_part(|dt| i64::from(dt.month())),
        Func::Day => date_part(|dt| i64::from(dt.day())),
        Func::Hours => date_part(|dt| i64::from(dt.hour())),
        Func::Minutes => date_part(|dt| i64::from(dt.minute())),
        Func::Seconds => date_part(|dt| i64::from(dt.second())),
        Func::Count | Func::Sum | Func::Avg | Func::Min | Func::Max => first.clone(),
        Func::Custom(name) => {
            return Err(Error::adapter(format!("unsupported function `{name}`")));
        }
    };
    Ok(value)
}

fn aggregate(func: &Func, values: Vec<Value>) -> Value {
    let present: Vec<Value> = values.into_iter().filter(|v| !v.is_null()).collect();
    match func {
        Func::Count => Value::from(present.len() as i64),
        Func::Sum => value::from_f64(present.iter().filter_map(value::as_f64).sum()),
        Func::Avg => {
            let numbers: Vec<f64> = present.iter().filter_map(value::as_f64).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                value::from_f64(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        Func::Min => present
            .into_iter()
            .min_by(value::compare)
            .unwrap_or(Value::Null),
        Func::Max => present
            .into_iter()
            .max_by(value::compare)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn contains_ci(haystack: &Value, needle: &Value, test: fn(&str, &str) -> bool) -> bool {
    match (text(haystack), text(needle)) {
        (Some(h), Some(n)) => test(&h.to_lowercase(), &n.to_lowercase()),
        _ => false,
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    match op {
        CompareOp::Eq => value::equals(left, right),
        CompareOp::Ne => !value::equals(left, right),
        CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le => {
            if left.is_null() || right.is_null() {
                return false;
            }
            let ord = value::compare(left, right);
            match op {
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Ge => ord != Ordering::Less,
                CompareOp::Lt => ord == Ordering::Less,
                _ => ord != Ordering::Greater,
            }
        }
        CompareOp::In => right
            .as_array()
            .is_some_and(|items| items.iter().any(|item| value::equals(left, item))),
        CompareOp::NotIn => !right
            .as_array()
            .is_some_and(|items| items.iter().any(|item| value::equals(left, item))),
        CompareOp::Contains => contains_ci(left, right, |h, n| h.contains(n)),
        CompareOp::StartsWith => contains_ci(left, right, |h, n| h.starts_with(n)),
        CompareOp::EndsWith => contains_ci(left, right, |h, n| h.ends_with(n)),
    }
}

pub(crate) fn eval(expr: &Expr, scope: &Scope<'_>) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Field { entity, name } => Ok(match scope {
            Scope::Row { sources, combo } => lookup(sources, combo, entity.as_deref(), name),
            Scope::Group { sources, combos } => combos
                .first()
                .map_or(Value::Null, |combo| lookup(sources, combo, entity.as_deref(), name)),
            Scope::Object(row) => row.get(name).cloned().unwrap_or(Value::Null),
        }),
        Expr::Compare { op, left, right } => {
            let l = eval(left, scope)?;
            let r = eval(right, scope)?;
            Ok(Value::Bool(compare(*op, &l, &r)))
        }
        Expr::And(items) => {
            for item in items {
                if !value::is_truthy(&eval(item, scope)?) {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Expr::Or(items) => {
            for item in items {
                if value::is_truthy(&eval(item, scope)?) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Expr::Not(inner) => Ok(Value::Bool(!value::is_truthy(&eval(inner, scope)?))),
        Expr::Call { func, args } => {
            if let (true, Scope::Group { sources, combos }) = (func.is_aggregate(), scope) {
                let mut values = Vec::with_capacity(combos.len());
                for combo in *combos {
                    let row = Scope::Row { sources, combo };
                    values.push(match args.first() {
                        Some(arg) => eval(arg, &row)?,
                        None => Value::Bool(true),
                    });
                }
                return Ok(aggregate(func, values));
            }
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, scope)?);
            }
            apply_scalar(func, &values)
        }
    }
}

fn group_key(values: &[Value]) -> String {
    serde_json::to_string(values).unwrap_or_default()
}

fn cmp_keys(a: &[(Value, bool)], b: &[(Value, bool)]) -> Ordering {
    for ((left, descending), (right, _)) in a.iter().zip(b.iter()) {
        let ord = value::compare(left, right);
        let ord = if *descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Evaluate a select over already loaded sources. `loader` resolves join entities.
pub(crate) fn run_select(
    query: &SelectQuery,
    main: Source,
    loader: &mut dyn FnMut(&str, &str) -> Result<Source>,
) -> Result<Vec<DataObject>> {
    let mut sources = vec![main];
    let mut combos: Vec<Combo> = (0..sources[0].rows.len()).map(|i| vec![Some(i)]).collect();

    for join in &query.joins {
        sources.push(loader(&join.entity.name, join.alias())?);
        let mut joined = Vec::with_capacity(combos.len());
        for combo in combos {
            let mut matched = false;
            let count = sources[sources.len() - 1].rows.len();
            for index in 0..count {
                let mut candidate = combo.clone();
                candidate.push(Some(index));
                let scope = Scope::Row {
                    sources: &sources,
                    combo: &candidate,
                };
                if value::is_truthy(&eval(&join.on, &scope)?) {
                    matched = true;
                    joined.push(candidate);
                }
            }
            if !matched && join.kind == JoinKind::Left {
                let mut candidate = combo;
                candidate.push(None);
                joined.push(candidate);
            }
        }
        combos = joined;
    }

    if let Some(filter) = query.effective_filter() {
        let mut kept = Vec::with_capacity(combos.len());
        for combo in combos {
            let scope = Scope::Row {
                sources: &sources,
                combo: &combo,
            };
            if value::is_truthy(&eval(&filter, &scope)?) {
                kept.push(combo);
            }
        }
        combos = kept;
    }

    let grouped = !query.group_by.is_empty() || query.fields.iter().any(|f| f.expr.has_aggregate());
    let mut rows = if grouped {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<&Combo>> = HashMap::new();
        for combo in &combos {
            let scope = Scope::Row {
                sources: &sources,
                combo,
            };
            let mut keys = Vec::with_capacity(query.group_by.len());
            for expr in &query.group_by {
                keys.push(eval(expr, &scope)?);
            }
            let key = group_key(&keys);
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(combo);
        }
        if order.is_empty() && query.group_by.is_empty() {
            order.push(String::new());
            groups.insert(String::new(), Vec::new());
        }
        let mut rows = Vec::with_capacity(order.len());
        for key in order {
            let members = groups.remove(&key).unwrap_or_default();
            let scope = Scope::Group {
                sources: &sources,
                combos: &members,
            };
            rows.push(project(query, &scope, &sources, members.first().copied())?);
        }
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let mut keys = Vec::with_capacity(query.order_by.len());
            for order in &query.order_by {
                keys.push((eval(&order.expr, &Scope::Object(&row))?, order.descending));
            }
            keyed.push((keys, row));
        }
        keyed.sort_by(|a, b| cmp_keys(&a.0, &b.0));
        keyed.into_iter().map(|(_, row)| row).collect::<Vec<_>>()
    } else {
        let mut keyed = Vec::with_capacity(combos.len());
        for combo in &combos {
            let scope = Scope::Row {
                sources: &sources,
                combo,
            };
            let mut keys = Vec::with_capacity(query.order_by.len());
            for order in &query.order_by {
                keys.push((eval(&order.expr, &scope)?, order.descending));
            }
            keyed.push((keys, combo));
        }
        keyed.sort_by(|a, b| cmp_keys(&a.0, &b.0));
        let mut rows = Vec::with_capacity(keyed.len());
        for (_, combo) in keyed {
            let scope = Scope::Row {
                sources: &sources,
                combo,
            };
            rows.push(project(query, &scope, &sources, Some(combo))?);
        }
        rows
    };

    if query.distinct {
        let mut seen = std::collections::HashSet::new();
        rows.retain(|row| seen.insert(serde_json::to_string(row).unwrap_or_default()));
    }

    Ok(rows
        .into_iter()
        .skip(query.skip)
        .take(query.take.unwrap_or(usize::MAX))
        .collect())
}

fn project(
    query: &SelectQuery,
    scope: &Scope<'_>,
    sources: &[Source],
    combo: Option<&Combo>,
) -> Result<DataObject> {
    if query.fields.is_empty() {
        return Ok(combo
            .and_then(|c| c.first().copied().flatten())
            .and_then(|i| sources[0].rows.get(i))
            .cloned()
            .unwrap_or_default());
    }
    let mut row = DataObject::new();
    for (index, field) in query.fields.iter().enumerate() {
        let name = field
            .output_name()
            .map_or_else(|| format!("field{index}"), ToString::to_string);
        row.insert(name, eval(&field.expr, scope)?);
    }
    Ok(row)
}
