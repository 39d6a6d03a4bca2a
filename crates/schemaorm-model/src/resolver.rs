//! Attribute path resolution.
//!
//! Turns a member path such as `customer/address/city` into the expression that
//! addresses the innermost member plus the joins needed to reach it. Association
//! hops join the related view aliased to the mapping's child field; a junction hop
//! joins the link model aliased to the attribute name and then the model on the
//! other side aliased `<attribute>_<Model>`.

use schemaorm_core::{AssociationMapping, Error, Result};
use schemaorm_query::{Expr, JoinExpression, QueryEntity};

use crate::association;
use crate::model::DataModel;

/// The expression of a member path and what it takes to reach it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedMember {
    pub expr: Expr,
    pub joins: Vec<JoinExpression>,
    /// Models the joins read from; they must be migrated before the query runs.
    pub dependencies: Vec<String>,
}

impl ResolvedMember {
    fn plain(expr: Expr) -> Self {
        Self {
            expr,
            joins: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

fn unsupported(model: &DataModel, other: &str, path: &[String]) -> Error {
    Error::not_supported(
        model.name(),
        format!(
            "cannot resolve `{}` through the association between `{}` and `{other}`",
            path.join("/"),
            model.name()
        ),
    )
}

fn not_an_association(model: &DataModel, member: &str) -> Error {
    Error::model_configuration(
        model.name(),
        format!("attribute `{member}` of `{}` is not an association", model.name()),
    )
}

impl DataModel {
    /// Resolve a member path against this model's view.
    pub(crate) fn resolve_member(&self, path: &[String]) -> Result<ResolvedMember> {
        let Some((last, hops)) = path.split_last() else {
            return Err(Error::expression("", "empty attribute path"));
        };
        if hops.is_empty() {
            return self.resolve_single(last);
        }

        let mut resolved = ResolvedMember::plain(Expr::field(last.clone()));
        let mut model = self.clone();
        let mut alias = self.view_adapter();
        for (index, segment) in hops.iter().enumerate() {
            let attribute = model.get_attribute(segment)?;
            let mapping = model
                .infer_mapping(&attribute.name)?
                .ok_or_else(|| not_an_association(&model, segment))?;
            if mapping.is_junction() {
                if index > 0 || path.len() > 2 {
                    let other = if mapping.parent_model.eq_ignore_ascii_case(model.name()) {
                        &mapping.child_model
                    } else {
                        &mapping.parent_model
                    };
                    return Err(unsupported(&model, other, path));
                }
                return self.resolve_junction(&alias, &attribute.name, &mapping, last);
            }

            let holds_key = mapping.child_model.eq_ignore_ascii_case(model.name())
                && mapping.child_field == attribute.name;
            let join_alias = mapping.child_field.clone();
            let (other_name, on) = if holds_key {
                (
                    mapping.parent_model.clone(),
                    Expr::qualified(&alias, &mapping.child_field)
                        .eq_expr(Expr::qualified(&join_alias, &mapping.parent_field)),
                )
            } else if mapping.parent_model.eq_ignore_ascii_case(model.name()) {
                (
                    mapping.child_model.clone(),
                    Expr::qualified(&alias, &mapping.parent_field)
                        .eq_expr(Expr::qualified(&join_alias, &mapping.child_field)),
                )
            } else {
                let other = if mapping.child_model.eq_ignore_ascii_case(model.name()) {
                    &mapping.parent_model
                } else {
                    &mapping.child_model
                };
                return Err(unsupported(&model, other, path));
            };
            let other = model.sibling(&other_name)?;
            tracing::trace!(
                model = %model.name(),
                member = %segment,
                alias = %join_alias,
                "Resolving association hop"
            );
            resolved.joins.push(JoinExpression::left(
                QueryEntity::aliased(other.view_adapter(), join_alias.clone()),
                on,
            ));
            resolved.dependencies.push(other.name().to_string());
            model = other;
            alias = join_alias;
        }
        let leaf = model.get_attribute(last)?;
        resolved.expr = Expr::qualified(alias, leaf.name);
        Ok(resolved)
    }

    fn resolve_single(&self, member: &str) -> Result<ResolvedMember> {
        let attribute = self.get_attribute(member)?;
        if !attribute.is_many() {
            return Ok(ResolvedMember::plain(Expr::qualified(
                self.view_adapter(),
                attribute.name,
            )));
        }
        let mapping = self
            .infer_mapping(&attribute.name)?
            .ok_or_else(|| not_an_association(self, member))?;
        if self.is_primitive(&attribute.type_name) {
            // A tag collection filters on its values.
            return self.resolve_junction(&self.view_adapter(), &attribute.name, &mapping, "");
        }
        // A collection of objects filters on the key of the related objects.
        let related = if mapping.parent_model.eq_ignore_ascii_case(self.name()) {
            &mapping.child_model
        } else {
            &mapping.parent_model
        };
        let key = self.sibling(related)?.primary_key()?.name;
        self.resolve_member(&[attribute.name, key])
    }

    fn resolve_junction(
        &self,
        alias: &str,
        member: &str,
        mapping: &AssociationMapping,
        leaf: &str,
    ) -> Result<ResolvedMember> {
        let junction = association::junction_model(self, mapping, member)?;
        let object = mapping.object_field();
        let value = mapping.value_field();
        let parent_side = mapping.parent_model.eq_ignore_ascii_case(self.name());
        let first = if parent_side {
            Expr::qualified(member, object).eq_expr(Expr::qualified(alias, &mapping.parent_field))
        } else {
            Expr::qualified(member, value).eq_expr(Expr::qualified(alias, &mapping.child_field))
        };
        let mut resolved = ResolvedMember {
            expr: Expr::qualified(member, value),
            joins: vec![JoinExpression::left(
                QueryEntity::aliased(junction.view_adapter(), member),
                first,
            )],
            dependencies: vec![junction.name().to_string()],
        };
        if parent_side && self.is_primitive(&mapping.child_model) {
            if !leaf.is_empty() && leaf != value {
                return Err(unsupported(self, &mapping.child_model, &[
                    member.to_string(),
                    leaf.to_string(),
                ]));
            }
            return Ok(resolved);
        }

        let (other_name, other_field, link_field) = if parent_side {
            (&mapping.child_model, &mapping.child_field, value)
        } else {
            (&mapping.parent_model, &mapping.parent_field, object)
        };
        let other = self.sibling(other_name)?;
        let other_alias = format!("{member}_{}", other.name());
        tracing::trace!(
            model = %self.name(),
            member = %member,
            alias = %other_alias,
            "Resolving junction hop"
        );
        resolved.joins.push(JoinExpression::left(
            QueryEntity::aliased(other.view_adapter(), other_alias.clone()),
            Expr::qualified(&other_alias, other_field)
                .eq_expr(Expr::qualified(member, link_field)),
        ));
        resolved.dependencies.push(other.name().to_string());
        let leaf = if leaf.is_empty() {
            other_field.clone()
        } else {
            other.get_attribute(leaf)?.name
        };
        resolved.expr = Expr::qualified(other_alias, leaf);
        Ok(resolved)
    }
}
