//! The fluent query builder.
//!
//! A `Queryable` wraps a `SelectQuery` over a model's view. Attribute strings are
//! resolved through the model (adding joins for nested paths), comparisons are
//! assembled by a `FilterBuilder`, and the terminal methods run the query through
//! the execute pipeline and expand associations on the way out.
//!
//! Builder methods consume and return the queryable. A failure while building (an
//! unknown attribute, a comparison without an operand) is kept and returned by the
//! terminal method, so chains never need intermediate `?`.

use asupersync::{Cx, Outcome};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::Instrument;

use schemaorm_core::value::{DataObject, Value};
use schemaorm_core::{BoxFuture, DataTypeKind, Error, Result, try_outcome, try_result};
use schemaorm_query::{
    CompareOp, Expr, FilterBuilder, Func, JoinExpression, LogicalOp, OrderBy, QueryExpression,
    QueryField, SelectQuery, parse_attribute,
};

use crate::events::{DataExecuteEventArgs, EventKind};
use crate::expand::{self, Expand, ExpandOptions};
use crate::model::DataModel;
use crate::pipeline::Pipeline;

/// A page of results together with the total number of matching objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataList {
    pub total: u64,
    pub skip: usize,
    pub value: Vec<DataObject>,
}

/// A chainable query over a model.
#[derive(Debug, Clone)]
pub struct Queryable {
    model: DataModel,
    query: SelectQuery,
    builder: FilterBuilder,
    error: Option<Error>,
    expands: Vec<Expand>,
    /// Models reached through joins.
    dependencies: Vec<String>,
    levels: Option<usize>,
    flatten: bool,
    cache: bool,
    data: DataObject,
}

impl Queryable {
    pub(crate) fn new(model: DataModel) -> Self {
        let query = SelectQuery::new(model.view_adapter());
        Self {
            model,
            query,
            builder: FilterBuilder::new(),
            error: None,
            expands: Vec::new(),
            dependencies: Vec::new(),
            levels: None,
            flatten: false,
            cache: false,
            data: DataObject::new(),
        }
    }

    pub fn model(&self) -> &DataModel {
        &self.model
    }

    /// The underlying query expression.
    pub fn query(&self) -> &SelectQuery {
        &self.query
    }

    /// Names of the associations that will be expanded.
    pub fn expands(&self) -> &[Expand] {
        &self.expands
    }

    fn try_with(mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Self {
        if self.error.is_none() {
            if let Err(e) = f(&mut self) {
                self.error = Some(e);
            }
        }
        self
    }

    pub(crate) fn join(&mut self, join: JoinExpression) {
        self.query.add_join(join);
    }

    pub(crate) fn depend(&mut self, model: &str) {
        if !self.dependencies.iter().any(|d| d.eq_ignore_ascii_case(model)) {
            self.dependencies.push(model.to_string());
        }
    }

    /// Resolve an attribute expression, adding the joins it needs.
    fn resolve(&mut self, text: &str) -> Result<QueryField> {
        let token = parse_attribute(text)?;
        let resolved = self.model.resolve_member(&token.path)?;
        for join in resolved.joins {
            self.join(join);
        }
        for dependency in &resolved.dependencies {
            self.depend(dependency);
        }
        let expr = match token.func.clone() {
            Some(func) => Expr::call(func, vec![resolved.expr]),
            None => resolved.expr,
        };
        // A nested or aggregated attribute without an alias is named after its leaf.
        let alias = token.alias.clone().or_else(|| {
            (token.is_nested() || token.func.is_some()).then(|| token.leaf().to_string())
        });
        Ok(match alias {
            Some(alias) => QueryField::aliased(expr, alias),
            None => QueryField::new(expr),
        })
    }

    // ========================================================================
    // Filtering
    // ========================================================================

    fn start(self, attribute: &str, logical: LogicalOp) -> Self {
        self.try_with(|q| {
            let field = q.resolve(attribute)?;
            q.builder.start(field.expr, logical);
            Ok(())
        })
    }

    /// Open a filter on an attribute.
    #[must_use]
    pub fn where_(self, attribute: &str) -> Self {
        self.start(attribute, LogicalOp::And)
    }

    /// Open a predicate joined with `and`.
    #[must_use]
    pub fn and(self, attribute: &str) -> Self {
        self.start(attribute, LogicalOp::And)
    }

    /// Open a predicate joined with `or`.
    #[must_use]
    pub fn or(self, attribute: &str) -> Self {
        self.start(attribute, LogicalOp::Or)
    }

    /// Add a finished predicate with `and`.
    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.query.filter = Expr::and_option(self.query.filter.take(), Some(expr));
        self
    }

    fn compare(self, op: CompareOp, value: Value) -> Self {
        self.try_with(|q| q.builder.compare(&mut q.query.filter, op, value))
    }

    #[must_use]
    pub fn equal(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Eq, value.into())
    }

    #[must_use]
    pub fn not_equal(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Ne, value.into())
    }

    #[must_use]
    pub fn greater_than(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Gt, value.into())
    }

    #[must_use]
    pub fn greater_or_equal(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Ge, value.into())
    }

    #[must_use]
    pub fn lower_than(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Lt, value.into())
    }

    #[must_use]
    pub fn lower_or_equal(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Le, value.into())
    }

    #[must_use]
    pub fn in_list(self, values: Vec<Value>) -> Self {
        self.compare(CompareOp::In, Value::Array(values))
    }

    #[must_use]
    pub fn not_in(self, values: Vec<Value>) -> Self {
        self.compare(CompareOp::NotIn, Value::Array(values))
    }

    #[must_use]
    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        let (low, high) = (low.into(), high.into());
        self.try_with(|q| q.builder.between(&mut q.query.filter, low, high))
    }

    #[must_use]
    pub fn contains(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Contains, value.into())
    }

    #[must_use]
    pub fn not_contains(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.try_with(|q| {
            q.builder
                .compare_not(&mut q.query.filter, CompareOp::Contains, value)
        })
    }

    #[must_use]
    pub fn starts_with(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::StartsWith, value.into())
    }

    #[must_use]
    pub fn ends_with(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::EndsWith, value.into())
    }

    /// `(attribute & mask) == result`
    #[must_use]
    pub fn bit(self, mask: i64, result: i64) -> Self {
        self.try_with(|q| {
            q.builder
                .compare_call(&mut q.query.filter, Func::BitAnd, mask.into(), result.into())
        })
    }

    /// `(attribute % divisor) == result`
    #[must_use]
    pub fn modulo(self, divisor: i64, result: i64) -> Self {
        self.try_with(|q| {
            q.builder
                .compare_call(&mut q.query.filter, Func::Mod, divisor.into(), result.into())
        })
    }

    // ========================================================================
    // Transforms of the pending operand
    // ========================================================================

    fn transform(self, func: Func, args: Vec<Value>) -> Self {
        self.try_with(|q| q.builder.transform(func, args))
    }

    #[must_use]
    pub fn add(self, value: impl Into<Value>) -> Self {
        self.transform(Func::Add, vec![value.into()])
    }

    #[must_use]
    pub fn subtract(self, value: impl Into<Value>) -> Self {
        self.transform(Func::Subtract, vec![value.into()])
    }

    #[must_use]
    pub fn multiply(self, value: impl Into<Value>) -> Self {
        self.transform(Func::Multiply, vec![value.into()])
    }

    #[must_use]
    pub fn divide(self, value: impl Into<Value>) -> Self {
        self.transform(Func::Divide, vec![value.into()])
    }

    #[must_use]
    pub fn round(self, digits: u32) -> Self {
        self.transform(Func::Round, vec![digits.into()])
    }

    #[must_use]
    pub fn floor(self) -> Self {
        self.transform(Func::Floor, Vec::new())
    }

    #[must_use]
    pub fn ceil(self) -> Self {
        self.transform(Func::Ceil, Vec::new())
    }

    /// Substring from a zero-based position, optionally bounded in length.
    #[must_use]
    pub fn substr(self, start: usize, length: Option<usize>) -> Self {
        let mut args = vec![Value::from(start)];
        args.extend(length.map(Value::from));
        self.transform(Func::Substring, args)
    }

    #[must_use]
    pub fn index_of(self, text: &str) -> Self {
        self.transform(Func::IndexOf, vec![text.into()])
    }

    #[must_use]
    pub fn concat(self, text: &str) -> Self {
        self.transform(Func::Concat, vec![text.into()])
    }

    #[must_use]
    pub fn trim(self) -> Self {
        self.transform(Func::Trim, Vec::new())
    }

    #[must_use]
    pub fn length(self) -> Self {
        self.transform(Func::Length, Vec::new())
    }

    #[must_use]
    pub fn to_lower_case(self) -> Self {
        self.transform(Func::ToLower, Vec::new())
    }

    #[must_use]
    pub fn to_upper_case(self) -> Self {
        self.transform(Func::ToUpper, Vec::new())
    }

    #[must_use]
    pub fn get_date(self) -> Self {
        self.transform(Func::Date, Vec::new())
    }

    #[must_use]
    pub fn get_year(self) -> Self {
        self.transform(Func::Year, Vec::new())
    }

    #[must_use]
    pub fn get_month(self) -> Self {
        self.transform(Func::Month, Vec::new())
    }

    #[must_use]
    pub fn get_day(self) -> Self {
        self.transform(Func::Day, Vec::new())
    }

    #[must_use]
    pub fn get_hours(self) -> Self {
        self.transform(Func::Hours, Vec::new())
    }

    #[must_use]
    pub fn get_minutes(self) -> Self {
        self.transform(Func::Minutes, Vec::new())
    }

    #[must_use]
    pub fn get_seconds(self) -> Self {
        self.transform(Func::Seconds, Vec::new())
    }

    // ========================================================================
    // Projection, ordering and paging
    // ========================================================================

    /// Replace the projection.
    ///
    /// Accepts attributes, attribute expressions and the names of model views.
    /// Collections are not columns; selecting one expands it instead.
    #[must_use]
    pub fn select(self, attributes: &[&str]) -> Self {
        self.try_with(|q| {
            q.query.fields.clear();
            for text in attributes {
                if q.model.attribute(text)?.is_none() {
                    if let Some(view) = q.model.schema().view_named(text) {
                        for field in view.fields.clone() {
                            let mut selected = q.resolve(&field.name)?;
                            if let Some(property) = field.property {
                                selected.alias = Some(property);
                            }
                            q.query.fields.push(selected);
                        }
                        continue;
                    }
                }
                let token = parse_attribute(text)?;
                if !token.is_nested() && token.func.is_none() {
                    let attribute = q.model.get_attribute(token.member())?;
                    if attribute.is_many() {
                        q.add_expand(Expand::new(attribute.name));
                        continue;
                    }
                }
                let field = q.resolve(text)?;
                q.query.fields.push(field);
            }
            Ok(())
        })
    }

    fn order(self, attribute: &str, descending: bool) -> Self {
        self.try_with(|q| {
            let field = q.resolve(attribute)?;
            q.query.order_by.push(OrderBy {
                expr: field.expr,
                descending,
            });
            Ok(())
        })
    }

    #[must_use]
    pub fn order_by(self, attribute: &str) -> Self {
        self.order(attribute, false)
    }

    #[must_use]
    pub fn order_by_descending(self, attribute: &str) -> Self {
        self.order(attribute, true)
    }

    #[must_use]
    pub fn then_by(self, attribute: &str) -> Self {
        self.order(attribute, false)
    }

    #[must_use]
    pub fn then_by_descending(self, attribute: &str) -> Self {
        self.order(attribute, true)
    }

    #[must_use]
    pub fn group_by(self, attributes: &[&str]) -> Self {
        self.try_with(|q| {
            for text in attributes {
                let field = q.resolve(text)?;
                q.query.group_by.push(field.expr);
            }
            Ok(())
        })
    }

    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.query.skip = skip;
        self
    }

    #[must_use]
    pub fn take(mut self, take: usize) -> Self {
        self.query.take = Some(take);
        self
    }

    #[must_use]
    pub fn distinct(mut self, distinct: bool) -> Self {
        self.query.distinct = distinct;
        self
    }

    /// Stash the current filter so later predicates compose with it.
    #[must_use]
    pub fn prepare(mut self, or: bool) -> Self {
        self.query.prepare(or);
        self.builder.reset();
        self
    }

    // ========================================================================
    // Expansion and execution flags
    // ========================================================================

    fn add_expand(&mut self, expand: Expand) {
        match self.expands.iter_mut().find(|e| e.name == expand.name) {
            Some(existing) => existing.options = expand.options,
            None => self.expands.push(expand),
        }
    }

    /// Expand associations with default options.
    #[must_use]
    pub fn expand(self, attributes: &[&str]) -> Self {
        self.try_with(|q| {
            for name in attributes {
                let attribute = q.model.get_attribute(name)?;
                if !q.expands.iter().any(|e| e.name == attribute.name) {
                    q.expands.push(Expand::new(attribute.name));
                }
            }
            Ok(())
        })
    }

    /// Expand one association with its own query options.
    #[must_use]
    pub fn expand_with(self, attribute: &str, options: ExpandOptions) -> Self {
        self.try_with(|q| {
            let attribute = q.model.get_attribute(attribute)?;
            q.add_expand(Expand {
                name: attribute.name,
                options,
            });
            Ok(())
        })
    }

    /// Suppress every expansion, including automatic ones.
    #[must_use]
    pub fn flatten(mut self) -> Self {
        self.flatten = true;
        self
    }

    /// Bound the depth of nested expansion.
    #[must_use]
    pub fn levels(mut self, levels: usize) -> Self {
        self.levels = Some(levels);
        self
    }

    #[must_use]
    pub fn silent(mut self, silent: bool) -> Self {
        self.model = self.model.silent(silent);
        self
    }

    /// Opt in to conditional caching.
    #[must_use]
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Attach metadata for listeners.
    #[must_use]
    pub fn data(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.data.insert(name.to_string(), value.into());
        self
    }

    /// Full-text search.
    ///
    /// Every token (a word or a quoted phrase) must appear in one of the text
    /// attributes of the model or of the models it references.
    #[must_use]
    pub fn search(self, text: &str) -> Self {
        let tokens = search_tokens(text);
        self.try_with(|q| {
            if tokens.is_empty() {
                return Ok(());
            }
            let columns = q.search_columns()?;
            if columns.is_empty() {
                return Err(Error::model_configuration(
                    q.model.name(),
                    format!("model `{}` has no text attributes to search", q.model.name()),
                ));
            }
            let mut predicate = None;
            for token in tokens {
                let any = columns
                    .iter()
                    .map(|column| {
                        column
                            .clone()
                            .compare(CompareOp::Contains, Expr::lit(token.clone()))
                    })
                    .reduce(Expr::or);
                predicate = Expr::and_option(predicate, any);
            }
            q.query.filter = Expr::and_option(q.query.filter.take(), predicate);
            Ok(())
        })
    }

    fn is_text(&self, type_name: &str) -> bool {
        self.model
            .configuration()
            .types()
            .get(type_name)
            .is_some_and(|t| t.kind == DataTypeKind::Text)
    }

    fn search_columns(&mut self) -> Result<Vec<Expr>> {
        let view = self.model.view_adapter();
        let mut columns = Vec::new();
        for attribute in self.model.attributes()?.iter() {
            if attribute.is_many() {
                continue;
            }
            if self.is_text(&attribute.type_name) {
                columns.push(Expr::qualified(&view, &attribute.name));
                continue;
            }
            if attribute.is_virtual() || self.model.is_primitive(&attribute.type_name) {
                continue;
            }
            let Some(parent) = self.model.context().model(&attribute.type_name).ok() else {
                continue;
            };
            for other in parent.attributes()?.iter() {
                if other.is_many() || !self.is_text(&other.type_name) {
                    continue;
                }
                let field = self.resolve(&format!("{}/{}", attribute.name, other.name))?;
                columns.push(field.expr);
            }
        }
        Ok(columns)
    }

    // ========================================================================
    // Terminals
    // ========================================================================

    /// Every matching object, ignoring `skip` and `take`.
    pub fn all<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<Vec<DataObject>, Error>> {
        Box::pin(async move {
            let query = self.query.clone().paged(0, None);
            self.run(cx, query, true).await
        })
    }

    /// The current page of matching objects.
    pub fn get_items<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<Vec<DataObject>, Error>> {
        self.run(cx, self.query.clone(), true)
    }

    /// The current page, deserialized into `T`.
    pub fn typed_items<'a, T>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<Vec<T>, Error>>
    where
        T: DeserializeOwned + Send + 'a,
    {
        Box::pin(async move {
            let rows = try_outcome!(self.get_items(cx).await);
            let mut items = Vec::with_capacity(rows.len());
            for row in rows {
                let item = try_result!(serde_json::from_value::<T>(Value::Object(row)).map_err(
                    |e| Error::model_configuration(
                        self.model.name(),
                        format!("cannot convert a `{}` row: {e}", self.model.name()),
                    )
                ));
                items.push(item);
            }
            Outcome::Ok(items)
        })
    }

    /// The first matching object.
    pub fn first<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<Option<DataObject>, Error>> {
        Box::pin(async move {
            let query = self.query.clone().paged(self.query.skip, Some(1));
            let rows = try_outcome!(self.run(cx, query, true).await);
            Outcome::Ok(rows.into_iter().next())
        })
    }

    /// The first column of the first matching row.
    pub fn value<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<Value, Error>> {
        Box::pin(async move {
            let query = self.query.clone().paged(self.query.skip, Some(1));
            let rows = try_outcome!(self.run(cx, query, false).await);
            Outcome::Ok(
                rows.into_iter()
                    .next()
                    .and_then(|row| row.into_iter().next().map(|(_, value)| value))
                    .unwrap_or(Value::Null),
            )
        })
    }

    /// The current page plus the total count, fetched with two queries.
    pub fn list<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<DataList, Error>> {
        Box::pin(async move {
            let value = try_outcome!(self.get_items(cx).await);
            let total = try_outcome!(self.count(cx).await);
            Outcome::Ok(DataList {
                total,
                skip: self.query.skip,
                value,
            })
        })
    }

    /// Number of matching objects, ignoring projection, ordering and paging.
    pub fn count<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<u64, Error>> {
        Box::pin(async move {
            let mut query = self.query.clone().paged(0, None);
            query.order_by.clear();
            if !query.group_by.is_empty() {
                query.fields = query.group_by.iter().cloned().map(QueryField::new).collect();
                let rows = try_outcome!(self.run(cx, query, false).await);
                return Outcome::Ok(rows.len() as u64);
            }
            let key = try_result!(self.model.primary_key()).name;
            query.fields = vec![QueryField::aliased(
                Expr::call(
                    Func::Count,
                    vec![Expr::qualified(self.model.view_adapter(), key)],
                ),
                "total",
            )];
            let rows = try_outcome!(self.run(cx, query, false).await);
            let total = rows
                .first()
                .and_then(|row| row.get("total"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Outcome::Ok(total)
        })
    }

    fn aggregate<'a>(
        &'a self,
        cx: &'a Cx,
        func: Func,
        attribute: &'a str,
    ) -> BoxFuture<'a, Outcome<Value, Error>> {
        Box::pin(async move {
            let mut scoped = self.clone();
            let field = try_result!(scoped.resolve(attribute));
            let mut query = scoped.query.clone().paged(0, None);
            query.order_by.clear();
            query.fields = vec![QueryField::aliased(Expr::call(func, vec![field.expr]), "value")];
            let rows = try_outcome!(scoped.run(cx, query, false).await);
            Outcome::Ok(
                rows.into_iter()
                    .next()
                    .and_then(|mut row| row.remove("value"))
                    .unwrap_or(Value::Null),
            )
        })
    }

    pub fn max<'a>(&'a self, cx: &'a Cx, attribute: &'a str) -> BoxFuture<'a, Outcome<Value, Error>> {
        self.aggregate(cx, Func::Max, attribute)
    }

    pub fn min<'a>(&'a self, cx: &'a Cx, attribute: &'a str) -> BoxFuture<'a, Outcome<Value, Error>> {
        self.aggregate(cx, Func::Min, attribute)
    }

    pub fn average<'a>(
        &'a self,
        cx: &'a Cx,
        attribute: &'a str,
    ) -> BoxFuture<'a, Outcome<Value, Error>> {
        self.aggregate(cx, Func::Avg, attribute)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    fn expansion_levels(&self) -> usize {
        if self.flatten {
            0
        } else {
            self.levels
                .unwrap_or(self.model.configuration().settings().default_levels)
        }
    }

    /// Expansions to apply: the requested ones plus every expandable attribute
    /// the projection names.
    fn effective_expands(&self, query: &SelectQuery) -> Result<Vec<Expand>> {
        let mut expands = self.expands.clone();
        for attribute in self.model.attributes()?.iter() {
            if !attribute.expandable || expands.iter().any(|e| e.name == attribute.name) {
                continue;
            }
            let selected = query.fields.is_empty()
                || query
                    .fields
                    .iter()
                    .any(|f| f.output_name() == Some(attribute.name.as_str()));
            if selected {
                expands.push(Expand::new(attribute.name.clone()));
            }
        }
        Ok(expands)
    }

    /// Add the key columns expansion reads when the projection leaves them out.
    /// Returns the added columns that must be dropped from the rows afterwards;
    /// a column an expansion overwrites with related objects is kept.
    fn add_hidden_keys(&self, query: &mut SelectQuery, expands: &[Expand]) -> Result<Vec<String>> {
        let aggregated =
            !query.group_by.is_empty() || query.fields.iter().any(|f| f.expr.has_aggregate());
        if query.fields.is_empty() || aggregated {
            return Ok(Vec::new());
        }
        let view = self.model.view_adapter();
        let mut hidden = Vec::new();
        let mut expanded = Vec::new();
        for expand in expands {
            expanded.push(expand::expand_property(&self.model, &expand.name)?);
            let key = expand::expand_key(&self.model, &expand.name)?;
            if query.fields.iter().any(|f| f.output_name() == Some(key.as_str()))
                || hidden.contains(&key)
            {
                continue;
            }
            query
                .fields
                .push(QueryField::new(Expr::qualified(&view, &key)));
            hidden.push(key);
        }
        hidden.retain(|key| !expanded.contains(key));
        Ok(hidden)
    }

    /// Migrate the model and every model the query joins.
    fn migrate_all<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            try_outcome!(self.model.migrate(cx).await);
            for name in &self.dependencies {
                let dependency = try_result!(self.model.sibling(name));
                try_outcome!(dependency.migrate(cx).await);
            }
            Outcome::Ok(())
        })
    }

    fn run<'a>(
        &'a self,
        cx: &'a Cx,
        mut query: SelectQuery,
        expand: bool,
    ) -> BoxFuture<'a, Outcome<Vec<DataObject>, Error>> {
        let span = tracing::debug_span!("query", model = %self.model.name());
        Box::pin(async move {
            if let Some(error) = &self.error {
                return Outcome::Err(error.clone());
            }
            try_outcome!(self.migrate_all(cx).await);

            let levels = if expand { self.expansion_levels() } else { 0 };
            let expands = if levels > 0 {
                try_result!(self.effective_expands(&query))
            } else {
                Vec::new()
            };
            let hidden = try_result!(self.add_hidden_keys(&mut query, &expands));

            let pipeline = try_result!(Pipeline::for_execute(&self.model));
            let mut event = DataExecuteEventArgs {
                model: self.model.clone(),
                query,
                cache: self.cache,
                data: self.data.clone(),
                expand: expands.iter().map(|e| e.name.clone()).collect(),
                silent: self.model.is_silent(),
                result: None,
                cached: false,
            };
            try_outcome!(pipeline.before_execute(cx, &mut event).await);

            let mut rows = match event.result.take() {
                Some(rows) => rows,
                None => {
                    let statement = QueryExpression::Select(event.query.clone());
                    try_outcome!(self.model.adapter().execute(cx, &statement).await).rows
                }
            };
            if !event.cached {
                try_outcome!(expand::apply(cx, &self.model, &mut rows, &expands, levels).await);
                for row in &mut rows {
                    for key in &hidden {
                        row.remove(key);
                    }
                }
            }
            tracing::debug!(
                model = %self.model.name(),
                rows = rows.len(),
                cached = event.cached,
                "Query executed"
            );

            if !pipeline.subscribes(EventKind::AfterExecute) {
                return Outcome::Ok(rows);
            }
            event.result = Some(rows);
            try_outcome!(pipeline.after_execute(cx, &mut event).await);
            Outcome::Ok(event.result.unwrap_or_default())
        }
        .instrument(span))
    }
}

/// Split search text into words and quoted phrases.
fn search_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in text.chars() {
        match c {
            '"' => {
                if !current.trim().is_empty() {
                    tokens.push(current.trim().to_string());
                }
                current.clear();
                quoted = !quoted;
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        tokens.push(current.trim().to_string());
    }
    tokens
}
