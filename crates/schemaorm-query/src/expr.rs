//! Expression trees shared by filters, projections, ordering and grouping.

use serde::Serialize;

use schemaorm_core::Value;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
}

/// Functions applicable to expressions.
///
/// Aggregates (`Count`, `Sum`, `Avg`, `Min`, `Max`) collapse rows; every other
/// function is applied per row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Func {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    BitAnd,
    Round,
    Floor,
    Ceil,
    Substring,
    IndexOf,
    Concat,
    Trim,
    Length,
    ToLower,
    ToUpper,
    Date,
    Year,
    Month,
    Day,
    Hours,
    Minutes,
    Seconds,
    Count,
    Sum,
    Avg,
    Min,
    Max,
    /// A function the data layer does not know; passed through to the adapter.
    Custom(String),
}

impl Func {
    /// Map a function name as written in attribute expressions.
    pub fn parse(name: &str) -> Func {
        match name.to_ascii_lowercase().as_str() {
            "count" => Func::Count,
            "sum" => Func::Sum,
            "avg" | "average" => Func::Avg,
            "min" => Func::Min,
            "max" => Func::Max,
            "add" => Func::Add,
            "subtract" => Func::Subtract,
            "multiply" => Func::Multiply,
            "divide" => Func::Divide,
            "mod" => Func::Mod,
            "round" => Func::Round,
            "floor" => Func::Floor,
            "ceil" | "ceiling" => Func::Ceil,
            "substr" | "substring" => Func::Substring,
            "indexof" => Func::IndexOf,
            "concat" => Func::Concat,
            "trim" => Func::Trim,
            "length" => Func::Length,
            "tolower" | "lower" => Func::ToLower,
            "toupper" | "upper" => Func::ToUpper,
            "date" => Func::Date,
            "year" => Func::Year,
            "month" => Func::Month,
            "day" => Func::Day,
            "hour" | "hours" => Func::Hours,
            "minute" | "minutes" => Func::Minutes,
            "second" | "seconds" => Func::Seconds,
            _ => Func::Custom(name.to_string()),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Func::Count | Func::Sum | Func::Avg | Func::Min | Func::Max
        )
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    /// A column, optionally qualified by an entity name or join alias.
    Field {
        entity: Option<String>,
        name: String,
    },
    Literal(Value),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Call {
        func: Func,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Unqualified column.
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field {
            entity: None,
            name: name.into(),
        }
    }

    /// Column of a specific entity or join alias.
    pub fn qualified(entity: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Field {
            entity: Some(entity.into()),
            name: name.into(),
        }
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn call(func: Func, args: Vec<Expr>) -> Self {
        Expr::Call { func, args }
    }

    pub fn compare(self, op: CompareOp, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Eq, Expr::lit(value))
    }

    pub fn ne(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Ne, Expr::lit(value))
    }

    /// Membership in a list of values.
    pub fn in_list(self, values: Vec<Value>) -> Self {
        self.compare(CompareOp::In, Expr::Literal(Value::Array(values)))
    }

    /// Column equality between two entities (join condition).
    pub fn eq_expr(self, right: Expr) -> Self {
        self.compare(CompareOp::Eq, right)
    }

    /// Combine with `and`, flattening nested conjunctions.
    pub fn and(self, other: Expr) -> Self {
        match (self, other) {
            (Expr::And(mut left), Expr::And(right)) => {
                left.extend(right);
                Expr::And(left)
            }
            (Expr::And(mut left), right) => {
                left.push(right);
                Expr::And(left)
            }
            (left, right) => Expr::And(vec![left, right]),
        }
    }

    /// Combine with `or`, flattening nested disjunctions.
    pub fn or(self, other: Expr) -> Self {
        match (self, other) {
            (Expr::Or(mut left), Expr::Or(right)) => {
                left.extend(right);
                Expr::Or(left)
            }
            (Expr::Or(mut left), right) => {
                left.push(right);
                Expr::Or(left)
            }
            (left, right) => Expr::Or(vec![left, right]),
        }
    }

    /// Combine two optional filters with `and`.
    pub fn and_option(left: Option<Expr>, right: Option<Expr>) -> Option<Expr> {
        match (left, right) {
            (Some(l), Some(r)) => Some(l.and(r)),
            (l, r) => l.or(r),
        }
    }

    /// The column name of a plain field expression.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Expr::Field { name, .. } => Some(name),
            _ => None,
        }
    }

    /// True if the expression contains an aggregate call.
    pub fn has_aggregate(&self) -> bool {
        match self {
            Expr::Call { func, args } => func.is_aggregate() || args.iter().any(Expr::has_aggregate),
            Expr::Compare { left, right, .. } => left.has_aggregate() || right.has_aggregate(),
            Expr::And(items) | Expr::Or(items) => items.iter().any(Expr::has_aggregate),
            Expr::Not(inner) => inner.has_aggregate(),
            Expr::Field { .. } | Expr::Literal(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn and_flattens() {
        let expr = Expr::field("a")
            .eq(1)
            .and(Expr::field("b").eq(2))
            .and(Expr::field("c").eq(3));
        match expr {
            Expr::And(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn function_names() {
        assert_eq!(Func::parse("COUNT"), Func::Count);
        assert_eq!(Func::parse("average"), Func::Avg);
        assert_eq!(Func::parse("median"), Func::Custom("median".into()));
        assert!(Func::Max.is_aggregate());
        assert!(!Func::Round.is_aggregate());
    }

    #[test]
    fn aggregate_detection() {
        let expr = Expr::call(Func::Count, vec![Expr::field("id")]);
        assert!(expr.has_aggregate());
        assert!(!Expr::field("id").eq(json!(1)).has_aggregate());
    }
}
