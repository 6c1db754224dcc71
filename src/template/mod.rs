//! Jinja-style expressions for constructed inventory features.
//!
//! `compose`, `groups` and `keyed_groups` entries are short expressions
//! evaluated against a host's variables. Only the expression subset needed
//! by inventory sources is supported: no statements, no macros, no lookups.

pub mod ast;
pub mod eval;
mod filters;
pub mod parser;

pub use eval::{display, is_truthy};

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("syntax error at line {line}, column {column}: expected {expected}")]
    Syntax {
        line: usize,
        column: usize,
        expected: String,
    },

    #[error("'{0}' is undefined")]
    Undefined(String),

    #[error("unsupported operand types for {op}: '{left}' and '{right}'")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("no filter named '{0}'")]
    UnknownFilter(String),

    #[error("no test named '{0}'")]
    UnknownTest(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("unclosed '{{{{' in template")]
    UnclosedPlaceholder,

    #[error("{0}")]
    Invalid(String),
}

impl TemplateError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    ast: ast::Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            ast: parser::parse_expression(source)?,
        })
    }

    /// Evaluate to a JSON value.
    pub fn evaluate(&self, vars: &Map<String, Value>) -> Result<Value, TemplateError> {
        eval::evaluate(&self.ast, vars)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Placeholder(Expression),
}

/// Text with `{{ expr }}` placeholders, e.g. `"{{ env | lower }}_hosts"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or(TemplateError::UnclosedPlaceholder)?;
            segments.push(Segment::Placeholder(Expression::parse(&after[..end])?));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self { segments })
    }

    pub fn render(&self, vars: &Map<String, Value>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(expr) => out.push_str(&display(&expr.evaluate(vars)?)),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_expression_evaluate() {
        let expr = Expression::parse("env == 'DEV'").unwrap();
        assert_eq!(expr.evaluate(&vars(json!({"env": "DEV"}))).unwrap(), json!(true));
        assert_eq!(expr.evaluate(&vars(json!({"env": "QA"}))).unwrap(), json!(false));
    }

    #[test]
    fn test_template_render() {
        let template = Template::parse("{{ env | lower }}_{{ app }}").unwrap();
        let out = template
            .render(&vars(json!({"env": "PROD", "app": "billing"})))
            .unwrap();
        assert_eq!(out, "prod_billing");
    }

    #[test]
    fn test_static_template() {
        let template = Template::parse("datacenter").unwrap();
        assert_eq!(template.render(&Map::new()).unwrap(), "datacenter");
    }

    #[test]
    fn test_unclosed_placeholder() {
        assert_eq!(
            Template::parse("{{ env").unwrap_err(),
            TemplateError::UnclosedPlaceholder
        );
    }

    #[test]
    fn test_unclosed_placeholder_display() {
        assert_eq!(
            TemplateError::UnclosedPlaceholder.to_string(),
            "unclosed '{{' in template"
        );
    }
}
