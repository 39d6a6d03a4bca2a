//! The fluent filter-building state machine.
//!
//! `where_("price").multiply(2).greater_than(10).and("name").starts_with("a")` is
//! assembled in steps: `where_`/`and`/`or` open a pending left operand together with
//! the logical operator that will join the next comparison to the filter, transforms
//! rewrite the pending operand, and comparison terminals append a predicate.

use schemaorm_core::{Error, Result, Value};

use crate::expr::{CompareOp, Expr, Func};

/// How the next predicate joins the existing filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogicalOp {
    #[default]
    And,
    Or,
}

/// Pending state between `where_`/`and`/`or` and a comparison terminal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterBuilder {
    left: Option<Expr>,
    logical: LogicalOp,
}

fn no_operand() -> Error {
    Error::expression("", "a comparison requires a preceding where(), and() or or()")
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new left operand.
    pub fn start(&mut self, left: Expr, logical: LogicalOp) {
        self.left = Some(left);
        self.logical = logical;
    }

    /// The pending left operand, if any.
    pub fn pending(&self) -> Option<&Expr> {
        self.left.as_ref()
    }

    /// Clear the pending operand.
    pub fn reset(&mut self) {
        self.left = None;
        self.logical = LogicalOp::And;
    }

    /// Wrap the pending operand in a function call with literal arguments.
    pub fn transform(&mut self, func: Func, args: Vec<Value>) -> Result<()> {
        let left = self.left.take().ok_or_else(no_operand)?;
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(left);
        call_args.extend(args.into_iter().map(Expr::Literal));
        self.left = Some(Expr::call(func, call_args));
        Ok(())
    }

    /// Append `left <op> value` to `filter`.
    pub fn compare(&mut self, filter: &mut Option<Expr>, op: CompareOp, value: Value) -> Result<()> {
        let left = self.left.clone().ok_or_else(no_operand)?;
        self.append(filter, left.compare(op, Expr::Literal(value)));
        Ok(())
    }

    /// Append `not (left <op> value)` to `filter`.
    pub fn compare_not(
        &mut self,
        filter: &mut Option<Expr>,
        op: CompareOp,
        value: Value,
    ) -> Result<()> {
        let left = self.left.clone().ok_or_else(no_operand)?;
        self.append(
            filter,
            Expr::Not(Box::new(left.compare(op, Expr::Literal(value)))),
        );
        Ok(())
    }

    /// Append `left >= low and left <= high` as one predicate.
    pub fn between(&mut self, filter: &mut Option<Expr>, low: Value, high: Value) -> Result<()> {
        let left = self.left.clone().ok_or_else(no_operand)?;
        let predicate = Expr::And(vec![
            left.clone().compare(CompareOp::Ge, Expr::Literal(low)),
            left.compare(CompareOp::Le, Expr::Literal(high)),
        ]);
        self.append(filter, predicate);
        Ok(())
    }

    /// Append `func(left, arg) == result` (used by `bit` and `mod`).
    pub fn compare_call(
        &mut self,
        filter: &mut Option<Expr>,
        func: Func,
        arg: Value,
        result: Value,
    ) -> Result<()> {
        let left = self.left.clone().ok_or_else(no_operand)?;
        let call = Expr::call(func, vec![left, Expr::Literal(arg)]);
        self.append(filter, call.compare(CompareOp::Eq, Expr::Literal(result)));
        Ok(())
    }

    /// Append a finished predicate using the pending logical operator.
    pub fn append(&mut self, filter: &mut Option<Expr>, predicate: Expr) {
        *filter = Some(match filter.take() {
            None => predicate,
            Some(existing) => match self.logical {
                LogicalOp::And => existing.and(predicate),
                LogicalOp::Or => existing.or(predicate),
            },
        });
        // Further comparisons on the same operand narrow the filter.
        self.logical = LogicalOp::And;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn comparison_requires_operand() {
        let mut builder = FilterBuilder::new();
        let mut filter = None;
        let err = builder.compare(&mut filter, CompareOp::Eq, json!(1)).unwrap_err();
        assert_eq!(err.code(), "EEXPR");
    }

    #[test]
    fn and_or_chain() {
        let mut builder = FilterBuilder::new();
        let mut filter = None;
        builder.start(Expr::field("a"), LogicalOp::And);
        builder.compare(&mut filter, CompareOp::Eq, json!(1)).unwrap();
        builder.start(Expr::field("b"), LogicalOp::And);
        builder.compare(&mut filter, CompareOp::Gt, json!(2)).unwrap();
        builder.start(Expr::field("c"), LogicalOp::Or);
        builder.compare(&mut filter, CompareOp::Lt, json!(3)).unwrap();
        match filter {
            Some(Expr::Or(items)) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(&items[0], Expr::And(inner) if inner.len() == 2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn transforms_wrap_operand() {
        let mut builder = FilterBuilder::new();
        let mut filter = None;
        builder.start(Expr::field("price"), LogicalOp::And);
        builder.transform(Func::Multiply, vec![json!(2)]).unwrap();
        builder.compare(&mut filter, CompareOp::Gt, json!(10)).unwrap();
        let Some(Expr::Compare { left, .. }) = filter else {
            panic!("expected comparison");
        };
        assert!(matches!(*left, Expr::Call { func: Func::Multiply, .. }));
    }

    #[test]
    fn between_is_one_predicate() {
        let mut builder = FilterBuilder::new();
        let mut filter = None;
        builder.start(Expr::field("age"), LogicalOp::And);
        builder.between(&mut filter, json!(1), json!(5)).unwrap();
        assert!(matches!(filter, Some(Expr::And(ref items)) if items.len() == 2));
    }
}
