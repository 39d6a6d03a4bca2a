//! Attribute expression tokens.
//!
//! Attributes are written as strings: `name`, `name as alias`, `count(name)`,
//! `customer/address/city`, `max(lines/price) as top`. Each string is matched
//! against a fixed list of shapes, most specific first; the first match wins.
//! Aliased shapes are tried before bare ones so that `a/b as c` never parses as a
//! bare nested path.

use std::sync::OnceLock;

use regex::Regex;

use schemaorm_core::{Error, Result};

use crate::expr::Func;

/// The shape an attribute expression matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenShape {
    AggregateNestedAliased,
    AggregateAliased,
    NestedAliased,
    Aliased,
    AggregateNested,
    Aggregate,
    Nested,
    Simple,
}

/// A parsed attribute expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeToken {
    pub shape: TokenShape,
    /// Wrapping function, for aggregate shapes.
    pub func: Option<Func>,
    /// Member path; one segment for simple shapes, two to four for nested ones.
    pub path: Vec<String>,
    pub alias: Option<String>,
}

impl AttributeToken {
    pub fn is_nested(&self) -> bool {
        self.path.len() > 1
    }

    /// The first path segment (the attribute of the queried model).
    pub fn member(&self) -> &str {
        self.path.first().map_or("", String::as_str)
    }

    /// The last path segment.
    pub fn leaf(&self) -> &str {
        self.path.last().map_or("", String::as_str)
    }
}

const SEGMENT: &str = r"[A-Za-z_$][A-Za-z0-9_$]*";

fn shapes() -> &'static [(TokenShape, Regex)] {
    static SHAPES: OnceLock<Vec<(TokenShape, Regex)>> = OnceLock::new();
    SHAPES.get_or_init(|| {
        let nested = format!(r"{SEGMENT}(?:/{SEGMENT}){{1,3}}");
        let alias = format!(r"\s+(?i:as)\s+({SEGMENT})");
        let patterns = [
            (
                TokenShape::AggregateNestedAliased,
                format!(r"^(\w+)\(\s*({nested})\s*\){alias}$"),
            ),
            (
                TokenShape::AggregateAliased,
                format!(r"^(\w+)\(\s*({SEGMENT})\s*\){alias}$"),
            ),
            (TokenShape::NestedAliased, format!(r"^({nested}){alias}$")),
            (TokenShape::Aliased, format!(r"^({SEGMENT}){alias}$")),
            (
                TokenShape::AggregateNested,
                format!(r"^(\w+)\(\s*({nested})\s*\)$"),
            ),
            (TokenShape::Aggregate, format!(r"^(\w+)\(\s*({SEGMENT})\s*\)$")),
            (TokenShape::Nested, format!(r"^({nested})$")),
            (TokenShape::Simple, format!(r"^({SEGMENT})$")),
        ];
        patterns
            .into_iter()
            .filter_map(|(shape, pattern)| match Regex::new(&pattern) {
                Ok(regex) => Some((shape, regex)),
                Err(e) => {
                    tracing::error!(?shape, error = %e, "Invalid attribute pattern");
                    None
                }
            })
            .collect()
    })
}

/// Parse an attribute expression.
pub fn parse_attribute(text: &str) -> Result<AttributeToken> {
    let text = text.trim();
    for (shape, regex) in shapes() {
        let Some(captures) = regex.captures(text) else {
            continue;
        };
        let group = |i: usize| captures.get(i).map(|m| m.as_str().to_string());
        let (func, path, alias) = match shape {
            TokenShape::AggregateNestedAliased | TokenShape::AggregateAliased => {
                (group(1).map(|f| Func::parse(&f)), group(2), group(3))
            }
            TokenShape::AggregateNested | TokenShape::Aggregate => {
                (group(1).map(|f| Func::parse(&f)), group(2), None)
            }
            TokenShape::NestedAliased | TokenShape::Aliased => (None, group(1), group(2)),
            TokenShape::Nested | TokenShape::Simple => (None, group(1), None),
        };
        let path = path
            .map(|p| p.split('/').map(ToString::to_string).collect())
            .unwrap_or_default();
        return Ok(AttributeToken {
            shape: *shape,
            func,
            path,
            alias,
        });
    }
    Err(Error::expression(text, "unrecognized attribute expression"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_and_aliased() {
        let token = parse_attribute("name").unwrap();
        assert_eq!(token.shape, TokenShape::Simple);
        assert_eq!(token.path, vec!["name"]);

        let token = parse_attribute("name AS title").unwrap();
        assert_eq!(token.shape, TokenShape::Aliased);
        assert_eq!(token.alias.as_deref(), Some("title"));
    }

    #[test]
    fn nested_alias_is_not_a_bare_path() {
        let token = parse_attribute("customer/address/city as town").unwrap();
        assert_eq!(token.shape, TokenShape::NestedAliased);
        assert_eq!(token.path, vec!["customer", "address", "city"]);
        assert_eq!(token.alias.as_deref(), Some("town"));
    }

    #[test]
    fn aggregates() {
        let token = parse_attribute("count(id) as total").unwrap();
        assert_eq!(token.shape, TokenShape::AggregateAliased);
        assert_eq!(token.func, Some(Func::Count));

        let token = parse_attribute("max(orders/total)").unwrap();
        assert_eq!(token.shape, TokenShape::AggregateNested);
        assert_eq!(token.func, Some(Func::Max));
        assert_eq!(token.leaf(), "total");

        let token = parse_attribute("median(price)").unwrap();
        assert_eq!(token.func, Some(Func::Custom("median".into())));
    }

    #[test]
    fn nesting_depth_is_bounded() {
        assert_eq!(
            parse_attribute("a/b/c/d").unwrap().shape,
            TokenShape::Nested
        );
        assert!(parse_attribute("a/b/c/d/e").is_err());
        assert!(parse_attribute("a b").is_err());
    }
}
