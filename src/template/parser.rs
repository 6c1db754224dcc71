#![allow(clippy::redundant_closure_call)]
//! Grammar for the Jinja-style expressions used by `compose`, `groups`
//! and `keyed_groups`.

use super::TemplateError;
use super::ast::{BinaryOp, Expr, Postfix};
use serde_json::Value;

peg::parser! {
    grammar jinja() for str {
        rule _()
            = quiet!{[' ' | '\t' | '\r' | '\n']*}

        rule ident_start()
            = ['a'..='z' | 'A'..='Z' | '_']

        rule ident_char()
            = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']

        rule kw_and()   = "and" !ident_char()
        rule kw_or()    = "or" !ident_char()
        rule kw_not()   = "not" !ident_char()
        rule kw_in()    = "in" !ident_char()
        rule kw_is()    = "is" !ident_char()
        rule kw_if()    = "if" !ident_char()
        rule kw_else()  = "else" !ident_char()
        rule kw_true()  = ("true" / "True") !ident_char()
        rule kw_false() = ("false" / "False") !ident_char()
        rule kw_none()  = ("none" / "None") !ident_char()

        rule keyword()
            = kw_and() / kw_or() / kw_not() / kw_in() / kw_is() / kw_if() / kw_else()
            / kw_true() / kw_false() / kw_none()

        // filter and test names may shadow keywords, e.g. `is none`
        rule name() -> String
            = quiet!{ n:$(ident_start() ident_char()*) { n.to_string() } }
            / expected!("a name")

        rule ident() -> String
            = !keyword() n:name() { n }

        // e.g. '0.5', '12.25'
        rule float() -> Value
            = n:$(['0'..='9']+ "." ['0'..='9']+) {?
                n.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or("a float")
            }

        rule integer() -> Value
            = n:$(['0'..='9']+) {? n.parse::<i64>().map(Value::from).or(Err("an integer")) }

        rule string() -> Value
            = quiet!{ "'" s:$([^ '\'']*) "'" { Value::String(s.to_string()) } }
            / quiet!{ "\"" s:$([^ '"']*) "\"" { Value::String(s.to_string()) } }
            / expected!("a quoted string")

        rule literal() -> Value
            = float()
            / integer()
            / string()
            / kw_true() { Value::Bool(true) }
            / kw_false() { Value::Bool(false) }
            / kw_none() { Value::Null }

        rule args() -> Vec<Expr>
            = "(" _ items:(expression() ** ",") ","? _ ")" { items }

        rule dict_pair() -> (Expr, Expr)
            = k:expression() ":" v:expression() { (k, v) }

        rule primary() -> Expr
            = "(" e:expression() ")" { e }
            / "[" _ items:(expression() ** ",") ","? _ "]" { Expr::List(items) }
            / "{" _ pairs:(dict_pair() ** ",") ","? _ "}" { Expr::Dict(pairs) }
            / l:literal() { Expr::Literal(l) }
            / n:ident() { Expr::Variable(n) }

        rule postfix_op() -> Postfix
            = _ "." _ n:name() { Postfix::Attribute(n) }
            / _ "[" i:expression() "]" { Postfix::Index(i) }
            / _ "|" _ n:name() a:(_ a:args() { a })? { Postfix::Filter(n, a.unwrap_or_default()) }
            / _ kw_is() _ negated:(kw_not() _)? n:name() a:(_ a:args() { a })? {
                Postfix::Test(n, a.unwrap_or_default(), negated.is_some())
            }

        rule postfix() -> Expr
            = p:primary() ops:postfix_op()* { ops.into_iter().fold(p, Expr::apply) }

        rule operation() -> Expr
            = precedence!{
                a:(@) _ kw_or() _ b:@ { Expr::binary(BinaryOp::Or, a, b) }
                --
                a:(@) _ kw_and() _ b:@ { Expr::binary(BinaryOp::And, a, b) }
                --
                kw_not() _ e:(@) { Expr::Not(Box::new(e)) }
                --
                a:(@) _ kw_not() _ kw_in() _ b:@ { Expr::binary(BinaryOp::NotIn, a, b) }
                a:(@) _ kw_in() _ b:@ { Expr::binary(BinaryOp::In, a, b) }
                a:(@) _ "==" _ b:@ { Expr::binary(BinaryOp::Eq, a, b) }
                a:(@) _ "!=" _ b:@ { Expr::binary(BinaryOp::Ne, a, b) }
                a:(@) _ "<=" _ b:@ { Expr::binary(BinaryOp::Le, a, b) }
                a:(@) _ ">=" _ b:@ { Expr::binary(BinaryOp::Ge, a, b) }
                a:(@) _ "<" _ b:@ { Expr::binary(BinaryOp::Lt, a, b) }
                a:(@) _ ">" _ b:@ { Expr::binary(BinaryOp::Gt, a, b) }
                --
                a:(@) _ "+" _ b:@ { Expr::binary(BinaryOp::Add, a, b) }
                a:(@) _ "-" _ b:@ { Expr::binary(BinaryOp::Sub, a, b) }
                --
                a:(@) _ "~" _ b:@ { Expr::binary(BinaryOp::Concat, a, b) }
                --
                a:(@) _ "*" _ b:@ { Expr::binary(BinaryOp::Mul, a, b) }
                a:(@) _ "//" _ b:@ { Expr::binary(BinaryOp::FloorDiv, a, b) }
                a:(@) _ "/" _ b:@ { Expr::binary(BinaryOp::Div, a, b) }
                a:(@) _ "%" _ b:@ { Expr::binary(BinaryOp::Mod, a, b) }
                --
                "-" _ e:(@) { Expr::Negate(Box::new(e)) }
                --
                p:postfix() { p }
            }

        rule conditional() -> Expr
            = then:operation() _ kw_if() _ condition:operation()
              otherwise:(_ kw_else() _ e:conditional() { e })? {
                Expr::Conditional {
                    then: Box::new(then),
                    condition: Box::new(condition),
                    otherwise: otherwise.map(Box::new),
                }
            }
            / operation()

        pub rule expression() -> Expr
            = _ e:conditional() _ { e }
    }
}

/// Parse a single expression, e.g. `env == 'PROD' and role | lower == 'web'`.
pub fn parse_expression(source: &str) -> Result<Expr, TemplateError> {
    jinja::expression(source).map_err(|e| TemplateError::Syntax {
        line: e.location.line,
        column: e.location.column,
        expected: e.expected.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn var(name: &str) -> Expr {
        Expr::Variable(name.to_string())
    }

    fn lit(value: Value) -> Expr {
        Expr::Literal(value)
    }

    #[test]
    fn test_parse_equality() {
        let expr = parse_expression("env == 'SAND'").unwrap();
        assert_eq!(
            expr,
            Expr::binary(BinaryOp::Eq, var("env"), lit(json!("SAND")))
        );
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse_expression("42").unwrap(), lit(json!(42)));
        assert_eq!(parse_expression("2.5").unwrap(), lit(json!(2.5)));
        assert_eq!(parse_expression("\"x\"").unwrap(), lit(json!("x")));
        assert_eq!(parse_expression("True").unwrap(), lit(json!(true)));
        assert_eq!(parse_expression("none").unwrap(), lit(Value::Null));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse_expression("a or b and c").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Or,
                var("a"),
                Expr::binary(BinaryOp::And, var("b"), var("c"))
            )
        );
    }

    #[test]
    fn test_not_wraps_comparison() {
        let expr = parse_expression("not env == 'PROD'").unwrap();
        assert_eq!(
            expr,
            Expr::Not(Box::new(Expr::binary(
                BinaryOp::Eq,
                var("env"),
                lit(json!("PROD"))
            )))
        );
    }

    #[test]
    fn test_not_in() {
        let expr = parse_expression("'web' not in roles").unwrap();
        assert_eq!(
            expr,
            Expr::binary(BinaryOp::NotIn, lit(json!("web")), var("roles"))
        );
    }

    #[test]
    fn test_keyword_prefixed_identifiers_are_variables() {
        assert_eq!(parse_expression("india").unwrap(), var("india"));
        assert_eq!(parse_expression("notes").unwrap(), var("notes"));
        assert_eq!(parse_expression("order").unwrap(), var("order"));
    }

    #[test]
    fn test_filter_chain_with_args() {
        let expr = parse_expression("name | replace('-', '_') | upper").unwrap();
        let inner = Expr::Filter {
            target: Box::new(var("name")),
            name: "replace".to_string(),
            args: vec![lit(json!("-")), lit(json!("_"))],
        };
        assert_eq!(
            expr,
            Expr::Filter {
                target: Box::new(inner),
                name: "upper".to_string(),
                args: vec![],
            }
        );
    }

    #[test]
    fn test_negated_test() {
        let expr = parse_expression("owner is not defined").unwrap();
        assert_eq!(
            expr,
            Expr::Test {
                target: Box::new(var("owner")),
                name: "defined".to_string(),
                args: vec![],
                negated: true,
            }
        );
    }

    #[test]
    fn test_attribute_and_index() {
        let expr = parse_expression("tags['team'].name").unwrap();
        assert_eq!(
            expr,
            Expr::Attribute {
                target: Box::new(Expr::Index {
                    target: Box::new(var("tags")),
                    index: Box::new(lit(json!("team"))),
                }),
                name: "name".to_string(),
            }
        );
    }

    #[test]
    fn test_inline_conditional() {
        let expr = parse_expression("'prod' if env == 'PROD' else 'nonprod'").unwrap();
        assert!(matches!(
            expr,
            Expr::Conditional {
                otherwise: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_list_and_dict_literals() {
        assert_eq!(
            parse_expression("[1, 'a', ]").unwrap(),
            Expr::List(vec![lit(json!(1)), lit(json!("a"))])
        );
        assert_eq!(
            parse_expression("{'k': v}").unwrap(),
            Expr::Dict(vec![(lit(json!("k")), var("v"))])
        );
        assert_eq!(parse_expression("[]").unwrap(), Expr::List(vec![]));
    }

    #[test]
    fn test_arithmetic_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Add,
                lit(json!(1)),
                Expr::binary(BinaryOp::Mul, lit(json!(2)), lit(json!(3)))
            )
        );
    }

    #[test]
    fn test_syntax_error_reports_position() {
        let err = parse_expression("env ==").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_unbalanced_parenthesis_is_rejected() {
        assert!(parse_expression("(a and b").is_err());
    }
}
