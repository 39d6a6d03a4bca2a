//! Query expressions consumed by storage adapters.
//!
//! A query expression is a plain data structure. The model layer composes it
//! (resolving attributes into joins), the caching listener serializes it into a
//! cache key, and the adapter evaluates it.

use serde::Serialize;

use schemaorm_core::DataObject;

use crate::expr::Expr;

/// The entity (table or view) a query reads from or writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryEntity {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl QueryEntity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// The name rows of this entity are addressed by in expressions.
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A projected expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryField {
    pub expr: Expr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl QueryField {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }

    /// The output column name: the alias, or the column name of a plain field.
    pub fn output_name(&self) -> Option<&str> {
        self.alias.as_deref().or_else(|| self.expr.field_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinKind {
    Left,
    Inner,
}

/// A join against another entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinExpression {
    pub entity: QueryEntity,
    pub kind: JoinKind,
    pub on: Expr,
}

impl JoinExpression {
    pub fn left(entity: QueryEntity, on: Expr) -> Self {
        Self {
            entity,
            kind: JoinKind::Left,
            on,
        }
    }

    pub fn inner(entity: QueryEntity, on: Expr) -> Self {
        Self {
            entity,
            kind: JoinKind::Inner,
            on,
        }
    }

    /// Joins are identified by the name they are referenced by.
    pub fn alias(&self) -> &str {
        self.entity.reference()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
}

/// A `select` expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectQuery {
    pub entity: QueryEntity,
    /// Projection; empty selects every column of `entity`.
    pub fields: Vec<QueryField>,
    pub filter: Option<Expr>,
    /// Filter stashed by `prepare`; always combined with `filter` using `and`.
    pub prepared: Option<Expr>,
    pub joins: Vec<JoinExpression>,
    pub order_by: Vec<OrderBy>,
    pub group_by: Vec<Expr>,
    pub skip: usize,
    /// `None` is unbounded.
    pub take: Option<usize>,
    pub distinct: bool,
}

impl SelectQuery {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: QueryEntity::new(entity),
            fields: Vec::new(),
            filter: None,
            prepared: None,
            joins: Vec::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            skip: 0,
            take: None,
            distinct: false,
        }
    }

    #[must_use]
    pub fn select(mut self, fields: Vec<QueryField>) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Expr::and_option(self.filter.take(), Some(expr));
        self
    }

    #[must_use]
    pub fn join(mut self, join: JoinExpression) -> Self {
        self.add_join(join);
        self
    }

    #[must_use]
    pub fn order(mut self, expr: Expr, descending: bool) -> Self {
        self.order_by.push(OrderBy { expr, descending });
        self
    }

    #[must_use]
    pub fn paged(mut self, skip: usize, take: Option<usize>) -> Self {
        self.skip = skip;
        self.take = take;
        self
    }

    /// Append a join unless one with the same alias is already present.
    ///
    /// Returns `true` when the join was added.
    pub fn add_join(&mut self, join: JoinExpression) -> bool {
        if self.has_join(join.alias()) {
            return false;
        }
        tracing::trace!(alias = join.alias(), entity = %join.entity.name, "Adding join");
        self.joins.push(join);
        true
    }

    pub fn has_join(&self, alias: &str) -> bool {
        self.joins.iter().any(|j| j.alias() == alias)
    }

    /// Move the current filter into the prepared filter.
    ///
    /// With `or`, the current filter is combined with an existing prepared filter
    /// using `or` instead of `and`.
    pub fn prepare(&mut self, or: bool) {
        let Some(current) = self.filter.take() else {
            return;
        };
        self.prepared = Some(match self.prepared.take() {
            None => current,
            Some(previous) if or => previous.or(current),
            Some(previous) => previous.and(current),
        });
    }

    /// The filter an adapter must apply.
    pub fn effective_filter(&self) -> Option<Expr> {
        Expr::and_option(self.prepared.clone(), self.filter.clone())
    }
}

/// An `insert` of one object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertQuery {
    pub entity: String,
    pub values: DataObject,
}

/// An `update` of every row matching `filter`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateQuery {
    pub entity: String,
    pub values: DataObject,
    pub filter: Option<Expr>,
}

/// A `delete` of every row matching `filter`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteQuery {
    pub entity: String,
    pub filter: Option<Expr>,
}

/// Any statement an adapter can execute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryExpression {
    Select(SelectQuery),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
}

impl QueryExpression {
    /// The entity the statement targets.
    pub fn entity(&self) -> &str {
        match self {
            QueryExpression::Select(q) => &q.entity.name,
            QueryExpression::Insert(q) => &q.entity,
            QueryExpression::Update(q) => &q.entity,
            QueryExpression::Delete(q) => &q.entity,
        }
    }

    /// Short statement kind for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryExpression::Select(_) => "select",
            QueryExpression::Insert(_) => "insert",
            QueryExpression::Update(_) => "update",
            QueryExpression::Delete(_) => "delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_are_deduplicated_by_alias() {
        let mut query = SelectQuery::new("OrderData");
        let join = JoinExpression::left(
            QueryEntity::aliased("CustomerData", "customer"),
            Expr::qualified("OrderData", "customer").eq_expr(Expr::qualified("customer", "id")),
        );
        assert!(query.add_join(join.clone()));
        assert!(!query.add_join(join));
        assert_eq!(query.joins.len(), 1);
    }

    #[test]
    fn prepare_composes_filters() {
        let mut query = SelectQuery::new("UserData").filter(Expr::field("a").eq(1));
        query.prepare(false);
        assert!(query.filter.is_none());
        query.filter = Some(Expr::field("b").eq(2));
        query.prepare(true);
        query.filter = Some(Expr::field("c").eq(3));
        match query.effective_filter() {
            Some(Expr::And(items)) => {
                assert!(matches!(items[0], Expr::Or(_)));
                assert_eq!(items.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn output_names() {
        let field = QueryField::new(Expr::qualified("customer", "name"));
        assert_eq!(field.output_name(), Some("name"));
        let aliased = QueryField::aliased(Expr::field("name"), "customerName");
        assert_eq!(aliased.output_name(), Some("customerName"));
    }
}
