//! Query expressions for SchemaORM.
//!
//! `schemaorm-query` is the **query layer**: it defines the storage-neutral query
//! expression objects the model layer composes and adapters evaluate, the fluent
//! filter-building state machine behind `Queryable::where_(..).equal(..)`, the
//! attribute expression parser, and the `DataAdapter` contract.
//!
//! # Role In The Architecture
//!
//! - **Expressions**: `Expr`, `CompareOp` and `Func` form filters, projections,
//!   ordering and grouping.
//! - **Statements**: `SelectQuery` (with joins, paging, `prepare`d filters) and
//!   insert/update/delete statements, wrapped in `QueryExpression`.
//! - **Attributes**: `parse_attribute` classifies `a/b as c`-style strings.
//! - **Adapters**: `DataAdapter` is the only seam to storage.

pub mod adapter;
pub mod attribute;
pub mod builder;
pub mod expr;
pub mod query;

pub use adapter::{DataAdapter, QueryResult};
pub use attribute::{AttributeToken, TokenShape, parse_attribute};
pub use builder::{FilterBuilder, LogicalOp};
pub use expr::{CompareOp, Expr, Func};
pub use query::{
    DeleteQuery, InsertQuery, JoinExpression, JoinKind, OrderBy, QueryEntity, QueryExpression,
    QueryField, SelectQuery, UpdateQuery,
};
