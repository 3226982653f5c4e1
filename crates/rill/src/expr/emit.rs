//! Client source emission.
//!
//! Emits JavaScript structurally equivalent to the server evaluation of the
//! same tree. References read from the snapshot object `$`; a small runtime
//! (`__rt`) supplies deep equality, length, blank, and the `add`/`sum`
//! operations whose host coercions (array/object to string, string
//! concatenation in `reduce`) diverge from the server's semantics, so the
//! two sides agree on non-primitive values. Subexpressions are
//! parenthesized, which preserves precedence and the left-to-right
//! short-circuit order exactly.
//!
//! Emission works from an explicit allow-list: every AST variant handled
//! here has a defined client equivalent. A construct outside the list
//! (today: `decimal`) fails with [`Untranspilable`] and the caller installs
//! a visible `__serverOnly(...)` marker instead of approximated source.

use super::Spanned;
use super::ast::{BinaryOperator, Builtin, Expr, Literal, UnaryOperator};
use crate::error::Untranspilable;
use std::sync::Arc;

/// Marker installed in emitted source for server-only constructs, so a gap
/// is visible in the client bundle rather than silently mis-evaluated.
pub fn server_only_marker(construct: &str) -> String {
    format!("__serverOnly('{construct}')")
}

pub fn emit_client(expr: &Spanned<Expr>) -> Result<String, Untranspilable> {
    let mut bound = Vec::new();
    emit(expr, &mut bound)
}

fn emit(expr: &Spanned<Expr>, bound: &mut Vec<Arc<str>>) -> Result<String, Untranspilable> {
    match &expr.node {
        Expr::Literal(literal) => Ok(match literal {
            Literal::Number(number) => format_number(*number),
            Literal::Text(text) => format!("'{}'", escape_text(text)),
            Literal::Bool(b) => b.to_string(),
            Literal::Null => "null".to_string(),
        }),
        // Lambda parameters are bound locals; everything else reads the
        // snapshot object.
        Expr::Reference(name) => {
            if bound.iter().any(|parameter| parameter == name) {
                Ok(name.to_string())
            } else {
                Ok(format!("$.{name}"))
            }
        }
        Expr::Access {
            base,
            field,
            optional,
        } => {
            let base = emit(base, bound)?;
            let accessor = if *optional { "?." } else { "." };
            Ok(format!("({base}){accessor}{field}"))
        }
        Expr::Unary { operator, operand } => {
            let operand = emit(operand, bound)?;
            let operator = match operator {
                UnaryOperator::Not => "!",
                UnaryOperator::Negate => "-",
            };
            Ok(format!("{operator}({operand})"))
        }
        Expr::Binary {
            operator,
            left,
            right,
        } => {
            let left = emit(left, bound)?;
            let right = emit(right, bound)?;
            Ok(match operator {
                // Numeric add or text concatenation, decided at runtime.
                // Bare `+` would coerce arrays/objects with the host's
                // rules, which disagree with the server's display form.
                BinaryOperator::Add => format!("__rt.add(({left}), ({right}))"),
                BinaryOperator::Subtract => format!("({left}) - ({right})"),
                BinaryOperator::Multiply => format!("({left}) * ({right})"),
                BinaryOperator::Divide => format!("({left}) / ({right})"),
                // Deep equality: `===` on the client is reference equality
                // for arrays/objects, which would disagree with the server.
                BinaryOperator::Equal => format!("__rt.eq(({left}), ({right}))"),
                BinaryOperator::NotEqual => format!("!__rt.eq(({left}), ({right}))"),
                BinaryOperator::Greater => format!("({left}) > ({right})"),
                BinaryOperator::GreaterOrEqual => format!("({left}) >= ({right})"),
                BinaryOperator::Less => format!("({left}) < ({right})"),
                BinaryOperator::LessOrEqual => format!("({left}) <= ({right})"),
                BinaryOperator::And => format!("({left}) && ({right})"),
                BinaryOperator::Or => format!("({left}) || ({right})"),
            })
        }
        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            let condition = emit(condition, bound)?;
            let then_branch = emit(then_branch, bound)?;
            let else_branch = emit(else_branch, bound)?;
            Ok(format!("({condition}) ? ({then_branch}) : ({else_branch})"))
        }
        Expr::Call { builtin, arguments } => emit_call(*builtin, arguments, bound),
        Expr::Lambda { parameter, body } => {
            bound.push(parameter.clone());
            let body = emit(body, bound);
            bound.pop();
            Ok(format!("({parameter}) => ({})", body?))
        }
    }
}

fn emit_call(
    builtin: Builtin,
    arguments: &[Spanned<Expr>],
    bound: &mut Vec<Arc<str>>,
) -> Result<String, Untranspilable> {
    match builtin {
        Builtin::Length => {
            let value = emit(&arguments[0], bound)?;
            Ok(format!("__rt.length({value})"))
        }
        Builtin::Map => {
            let items = emit(&arguments[0], bound)?;
            let lambda = emit(&arguments[1], bound)?;
            Ok(format!("({items}).map({lambda})"))
        }
        Builtin::Filter => {
            let items = emit(&arguments[0], bound)?;
            let lambda = emit(&arguments[1], bound)?;
            Ok(format!("({items}).filter({lambda})"))
        }
        Builtin::Reject => {
            let items = emit(&arguments[0], bound)?;
            let Expr::Lambda { parameter, body } = &arguments[1].node else {
                return Err(Untranspilable {
                    construct: "reject".into(),
                    reason: "second argument must be a lambda".into(),
                });
            };
            bound.push(parameter.clone());
            let body = emit(body, bound);
            bound.pop();
            Ok(format!("({items}).filter(({parameter}) => !({}))", body?))
        }
        Builtin::Sum => {
            // A raw `reduce((a, b) => a + b, 0)` silently concatenates on
            // non-numeric elements where the server errors.
            let items = emit(&arguments[0], bound)?;
            Ok(format!("__rt.sum({items})"))
        }
        Builtin::Join => {
            let items = emit(&arguments[0], bound)?;
            let separator = emit(&arguments[1], bound)?;
            Ok(format!("({items}).join({separator})"))
        }
        Builtin::Blank => {
            let value = emit(&arguments[0], bound)?;
            Ok(format!("__rt.blank({value})"))
        }
        Builtin::Decimal => Err(Untranspilable {
            construct: "decimal".into(),
            reason: "arbitrary-precision currency arithmetic has no client equivalent".into(),
        }),
    }
}

/// The lexer admits raw newlines and other control characters inside a
/// quoted literal; emitted as-is they would break the JS string.
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            control if (control as u32) < 0x20 => {
                escaped.push_str(&format!("\\u{:04x}", control as u32));
            }
            other => escaped.push(other),
        }
    }
    escaped
}

/// Numbers in emitted source match `Value`'s display form (no trailing
/// `.0`), so e.g. `join` output agrees on both sides.
fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.is_finite() && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::super::compile::parse_expression;
    use super::*;

    fn emit_str(source: &str) -> Result<String, Untranspilable> {
        emit_client(&parse_expression(source).unwrap())
    }

    #[test]
    fn emits_references_and_operators() {
        assert_eq!(emit_str("count * 2").unwrap(), "($.count) * (2)");
        assert_eq!(
            emit_str("a && b || c").unwrap(),
            "(($.a) && ($.b)) || ($.c)"
        );
    }

    #[test]
    fn emits_deep_equality_helper() {
        assert_eq!(emit_str("a == b").unwrap(), "__rt.eq(($.a), ($.b))");
    }

    #[test]
    fn emits_optional_chaining() {
        assert_eq!(emit_str("user?.name").unwrap(), "($.user)?.name");
    }

    #[test]
    fn lambda_parameters_are_locals_not_snapshot_reads() {
        assert_eq!(
            emit_str("map(items, x -> x.qty)").unwrap(),
            "($.items).map((x) => ((x).qty))",
        );
        assert_eq!(
            emit_str("reject(items, x -> x.done)").unwrap(),
            "($.items).filter((x) => !((x).done))",
        );
    }

    #[test]
    fn lambda_parameter_shadows_same_named_field() {
        assert_eq!(
            emit_str("count + sum(map(items, count -> count.qty))").unwrap(),
            "__rt.add(($.count), (__rt.sum(($.items).map((count) => ((count).qty)))))",
        );
    }

    #[test]
    fn addition_and_sum_route_through_runtime_helpers() {
        // Bare `+`/`reduce` would coerce lists and records with the
        // host's rules instead of the server's display form.
        assert_eq!(emit_str("'' + xs").unwrap(), "__rt.add((''), ($.xs))");
        assert_eq!(emit_str("sum(xs)").unwrap(), "__rt.sum($.xs)");
    }

    #[test]
    fn control_characters_in_text_literals_are_escaped() {
        assert_eq!(emit_str("'a\nb'").unwrap(), "'a\\nb'");
        assert_eq!(emit_str("'tab\there'").unwrap(), "'tab\\there'");
    }

    #[test]
    fn emits_conditional_as_ternary() {
        assert_eq!(
            emit_str("if open then 1 else 0").unwrap(),
            "($.open) ? (1) : (0)"
        );
    }

    #[test]
    fn decimal_is_untranspilable() {
        let err = emit_str("decimal(price)").unwrap_err();
        assert_eq!(err.construct.as_ref(), "decimal");
    }

    #[test]
    fn untranspilable_propagates_from_nested_position() {
        assert!(emit_str("1 + decimal(price)").is_err());
    }

    #[test]
    fn marker_is_visible_text() {
        assert_eq!(server_only_marker("decimal"), "__serverOnly('decimal')");
    }
}
