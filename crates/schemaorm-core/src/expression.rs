//! Default and calculated value expressions.
//!
//! Field definitions carry `value` (default on insert) and `calculation` (on every
//! save) expressions. They are evaluated through the `ExpressionEvaluator` seam; the
//! built-in `FunctionEvaluator` understands literals and a small whitelist of
//! `fn:name(args)` calls.

use asupersync::{Cx, Outcome};
use rand::distr::{Alphanumeric, SampleString};

use crate::BoxFuture;
use crate::error::Error;
use crate::value::{DataObject, Value};

/// Source of adapter-generated identities for `fn:newid()`.
pub trait IdentityProvider: Send + Sync {
    fn next_identity<'a>(
        &'a self,
        cx: &'a Cx,
        model: &'a str,
        field: &'a str,
    ) -> BoxFuture<'a, Outcome<Option<Value>, Error>>;
}

/// What an expression can see while it is evaluated.
pub struct EvaluationContext<'a> {
    /// Model being saved.
    pub model: &'a str,
    /// Field being assigned.
    pub field: &'a str,
    /// The object being saved.
    pub target: &'a DataObject,
    /// Current user name.
    pub user: Option<&'a str>,
    /// Identity generator of the active adapter.
    pub identity: Option<&'a dyn IdentityProvider>,
}

impl std::fmt::Debug for EvaluationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("model", &self.model)
            .field("field", &self.field)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Evaluates `value`/`calculation` expressions.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate<'a>(
        &'a self,
        cx: &'a Cx,
        expression: &'a Value,
        context: &'a EvaluationContext<'a>,
    ) -> BoxFuture<'a, Outcome<Value, Error>>;
}

/// The built-in evaluator.
///
/// - JSON literals and plain strings evaluate to themselves;
/// - `fn:name(args)` calls a whitelisted function with JSON literal arguments;
/// - `javascript:` bodies are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct FunctionEvaluator;

const SYMBOLS: &[u8] = b"!@#$%^&*-_+=";

/// A parsed `fn:name(args)` call.
#[derive(Debug, PartialEq)]
struct FunctionCall {
    name: String,
    args: Vec<Value>,
}

fn parse_call(expression: &str) -> Result<Option<FunctionCall>, Error> {
    let Some(body) = expression.strip_prefix("fn:") else {
        return Ok(None);
    };
    let body = body.trim();
    let (Some(open), true) = (body.find('('), body.ends_with(')')) else {
        return Err(Error::expression(expression, "expected `fn:name(args)`"));
    };
    let name = body[..open].trim().to_string();
    let raw_args = body[open + 1..body.len() - 1].trim();
    let args = if raw_args.is_empty() {
        Vec::new()
    } else {
        serde_json::from_str::<Vec<Value>>(&format!("[{raw_args}]"))
            .map_err(|e| Error::expression(expression, format!("invalid arguments: {e}")))?
    };
    Ok(Some(FunctionCall { name, args }))
}

fn arg_usize(call: &FunctionCall, index: usize, default: usize) -> usize {
    call.args
        .get(index)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(default)
}

fn random_digits(len: usize) -> String {
    (0..len)
        .map(|_| char::from(b'0' + rand::random_range(0..10u8)))
        .collect()
}

fn random_password(len: usize) -> String {
    let mut rng = rand::rng();
    let mut password = Alphanumeric.sample_string(&mut rng, len.saturating_sub(1));
    if len > 0 {
        let symbol = SYMBOLS[rand::random_range(0..SYMBOLS.len())];
        password.insert(rand::random_range(0..=password.len()), char::from(symbol));
    }
    password
}

/// Evaluate every function that does not need the adapter.
fn call_sync(
    expression: &str,
    call: &FunctionCall,
    context: &EvaluationContext<'_>,
) -> Result<Value, Error> {
    let value = match call.name.as_str() {
        "now" => Value::String(chrono::Utc::now().to_rfc3339()),
        "today" => Value::String(chrono::Utc::now().date_naive().to_string()),
        "newGuid" => Value::String(uuid::Uuid::new_v4().to_string()),
        "user" | "me" => context
            .user
            .map_or(Value::Null, |u| Value::String(u.to_string())),
        "int" => {
            let min = call.args.first().and_then(Value::as_i64).unwrap_or(0);
            let max = call.args.get(1).and_then(Value::as_i64).unwrap_or(i64::from(i32::MAX));
            if min > max {
                return Err(Error::expression(expression, "min is greater than max"));
            }
            Value::from(rand::random_range(min..=max))
        }
        "numbers" => Value::String(random_digits(arg_usize(call, 0, 8))),
        "chars" => {
            let mut rng = rand::rng();
            Value::String(Alphanumeric.sample_string(&mut rng, arg_usize(call, 0, 8)))
        }
        "password" => Value::String(random_password(arg_usize(call, 0, 12))),
        "target" => {
            let field = call
                .args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| Error::expression(expression, "target() expects a field name"))?;
            context.target.get(field).cloned().unwrap_or(Value::Null)
        }
        other => {
            return Err(Error::expression(
                expression,
                format!("unknown function `{other}`"),
            ));
        }
    };
    Ok(value)
}

impl ExpressionEvaluator for FunctionEvaluator {
    fn evaluate<'a>(
        &'a self,
        cx: &'a Cx,
        expression: &'a Value,
        context: &'a EvaluationContext<'a>,
    ) -> BoxFuture<'a, Outcome<Value, Error>> {
        Box::pin(async move {
            let Value::String(text) = expression else {
                return Outcome::Ok(expression.clone());
            };
            if text.starts_with("javascript:") {
                return Outcome::Err(Error::not_supported(
                    context.model,
                    format!("javascript expressions are not supported ({})", context.field),
                ));
            }
            let Some(call) = crate::try_result!(parse_call(text)) else {
                return Outcome::Ok(expression.clone());
            };
            if call.name == "newid" {
                let Some(identity) = context.identity else {
                    return Outcome::Ok(Value::Null);
                };
                let next =
                    crate::try_outcome!(identity.next_identity(cx, context.model, context.field).await);
                return Outcome::Ok(next.unwrap_or(Value::Null));
            }
            let result = call_sync(text, &call, context);
            Outcome::Ok(crate::try_result!(result))
        })
    }
}
