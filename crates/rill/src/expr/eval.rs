//! Server-side expression evaluation.
//!
//! Exhaustive match over the AST with host-native operator semantics. The
//! operator semantics here and the emitted JavaScript in [`super::emit`]
//! must agree for every transpilable construct; `&&`/`||` therefore return
//! operand values (not booleans) and `+` concatenates when either operand
//! is text.
//!
//! A `Pending` operand (an async dependency still in flight) propagates:
//! the whole expression evaluates to `Pending` rather than failing.

use super::Spanned;
use super::ast::{BinaryOperator, Builtin, Expr, Literal, UnaryOperator};
use crate::store::Snapshot;
use crate::value::Value;
use std::sync::Arc;

pub fn evaluate(expr: &Spanned<Expr>, snapshot: &Snapshot) -> Result<Value, String> {
    let mut locals = Vec::new();
    eval(expr, snapshot, &mut locals)
}

type Locals = Vec<(Arc<str>, Value)>;

fn eval(expr: &Spanned<Expr>, snapshot: &Snapshot, locals: &mut Locals) -> Result<Value, String> {
    match &expr.node {
        Expr::Literal(literal) => Ok(match literal {
            Literal::Number(number) => Value::number(*number),
            Literal::Text(text) => Value::Text(text.clone()),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Unit,
        }),
        Expr::Reference(name) => {
            if let Some((_, value)) = locals.iter().rev().find(|(local, _)| local == name) {
                return Ok(value.clone());
            }
            snapshot
                .get(name)
                .cloned()
                .ok_or_else(|| format!("unknown reference `{name}`"))
        }
        Expr::Access {
            base,
            field,
            optional,
        } => {
            let base_value = eval(base, snapshot, locals)?;
            if base_value.is_pending() {
                return Ok(Value::Pending);
            }
            match &base_value {
                Value::Unit if *optional => Ok(Value::Unit),
                Value::Record(_) => Ok(base_value.get_field(field).cloned().unwrap_or(Value::Unit)),
                Value::Unit => Err(format!("cannot access `{field}` on null")),
                other => Err(format!("cannot access `{field}` on {other}")),
            }
        }
        Expr::Unary { operator, operand } => {
            let value = eval(operand, snapshot, locals)?;
            if value.is_pending() {
                return Ok(Value::Pending);
            }
            match operator {
                UnaryOperator::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOperator::Negate => value
                    .as_number()
                    .map(|n| Value::number(-n))
                    .ok_or_else(|| format!("cannot negate {value}")),
            }
        }
        Expr::Binary {
            operator,
            left,
            right,
        } => eval_binary(*operator, left, right, snapshot, locals),
        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            let condition = eval(condition, snapshot, locals)?;
            if condition.is_pending() {
                return Ok(Value::Pending);
            }
            if condition.is_truthy() {
                eval(then_branch, snapshot, locals)
            } else {
                eval(else_branch, snapshot, locals)
            }
        }
        Expr::Call { builtin, arguments } => eval_call(*builtin, arguments, snapshot, locals),
        Expr::Lambda { .. } => Err("lambda is only valid as a collection argument".to_string()),
    }
}

fn eval_binary(
    operator: BinaryOperator,
    left: &Spanned<Expr>,
    right: &Spanned<Expr>,
    snapshot: &Snapshot,
    locals: &mut Locals,
) -> Result<Value, String> {
    // Short-circuit connectives evaluate the right side only when needed,
    // in the same order the emitted client source does.
    match operator {
        BinaryOperator::And => {
            let left = eval(left, snapshot, locals)?;
            if left.is_pending() {
                return Ok(Value::Pending);
            }
            return if left.is_truthy() {
                eval(right, snapshot, locals)
            } else {
                Ok(left)
            };
        }
        BinaryOperator::Or => {
            let left = eval(left, snapshot, locals)?;
            if left.is_pending() {
                return Ok(Value::Pending);
            }
            return if left.is_truthy() {
                Ok(left)
            } else {
                eval(right, snapshot, locals)
            };
        }
        _ => {}
    }

    let left = eval(left, snapshot, locals)?;
    let right = eval(right, snapshot, locals)?;
    if left.is_pending() || right.is_pending() {
        return Ok(Value::Pending);
    }

    match operator {
        BinaryOperator::Add => match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::number(a.0 + b.0)),
            (Value::Text(_), _) | (_, Value::Text(_)) => {
                Ok(Value::text(format!("{left}{right}")))
            }
            _ => Err(format!("cannot add {left} and {right}")),
        },
        BinaryOperator::Subtract => numeric(operator, &left, &right).map(|(a, b)| Value::number(a - b)),
        BinaryOperator::Multiply => numeric(operator, &left, &right).map(|(a, b)| Value::number(a * b)),
        BinaryOperator::Divide => numeric(operator, &left, &right).map(|(a, b)| Value::number(a / b)),
        BinaryOperator::Equal => Ok(Value::Bool(left == right)),
        BinaryOperator::NotEqual => Ok(Value::Bool(left != right)),
        BinaryOperator::Greater => ordering(operator, &left, &right).map(|o| Value::Bool(o > 0)),
        BinaryOperator::GreaterOrEqual => {
            ordering(operator, &left, &right).map(|o| Value::Bool(o >= 0))
        }
        BinaryOperator::Less => ordering(operator, &left, &right).map(|o| Value::Bool(o < 0)),
        BinaryOperator::LessOrEqual => {
            ordering(operator, &left, &right).map(|o| Value::Bool(o <= 0))
        }
        BinaryOperator::And | BinaryOperator::Or => unreachable!("handled above"),
    }
}

fn numeric(
    operator: BinaryOperator,
    left: &Value,
    right: &Value,
) -> Result<(f64, f64), String> {
    match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(format!("{operator:?} expects numbers, found {left} and {right}")),
    }
}

fn ordering(operator: BinaryOperator, left: &Value, right: &Value) -> Result<i8, String> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(compare(a.0, b.0)),
        (Value::Text(a), Value::Text(b)) => Ok(match a.cmp(b) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }),
        _ => Err(format!(
            "{operator:?} expects two numbers or two texts, found {left} and {right}"
        )),
    }
}

fn compare(a: f64, b: f64) -> i8 {
    if a < b {
        -1
    } else if a > b {
        1
    } else {
        0
    }
}

fn eval_call(
    builtin: Builtin,
    arguments: &[Spanned<Expr>],
    snapshot: &Snapshot,
    locals: &mut Locals,
) -> Result<Value, String> {
    match builtin {
        Builtin::Length => {
            let value = eval(&arguments[0], snapshot, locals)?;
            if value.is_pending() {
                return Ok(Value::Pending);
            }
            match &value {
                Value::List(items) => Ok(Value::number(items.len() as f64)),
                // UTF-16 units, matching the client's `.length`
                Value::Text(s) => Ok(Value::number(s.encode_utf16().count() as f64)),
                other => Err(format!("length expects a list or text, found {other}")),
            }
        }
        Builtin::Sum => {
            let value = eval(&arguments[0], snapshot, locals)?;
            if value.is_pending() {
                return Ok(Value::Pending);
            }
            let items = value
                .as_list()
                .ok_or_else(|| format!("sum expects a list, found {value}"))?;
            let mut total = 0.0;
            for item in items {
                total += item
                    .as_number()
                    .ok_or_else(|| format!("sum expects numbers, found {item}"))?;
            }
            Ok(Value::number(total))
        }
        Builtin::Join => {
            let value = eval(&arguments[0], snapshot, locals)?;
            let separator = eval(&arguments[1], snapshot, locals)?;
            if value.is_pending() || separator.is_pending() {
                return Ok(Value::Pending);
            }
            let items = value
                .as_list()
                .ok_or_else(|| format!("join expects a list, found {value}"))?;
            let separator = separator
                .as_text()
                .ok_or_else(|| format!("join separator must be text, found {separator}"))?;
            let joined = items
                .iter()
                .map(|item| item.to_string())
                .collect::<Vec<_>>()
                .join(separator);
            Ok(Value::text(joined))
        }
        Builtin::Blank => {
            let value = eval(&arguments[0], snapshot, locals)?;
            if value.is_pending() {
                return Ok(Value::Pending);
            }
            Ok(Value::Bool(value.is_blank()))
        }
        Builtin::Decimal => {
            // Exact cent rounding for currency values. Deliberately
            // server-only: the emitter rejects it rather than approximate
            // with client floating point.
            let value = eval(&arguments[0], snapshot, locals)?;
            if value.is_pending() {
                return Ok(Value::Pending);
            }
            let number = value
                .as_number()
                .ok_or_else(|| format!("decimal expects a number, found {value}"))?;
            Ok(Value::number((number * 100.0).round() / 100.0))
        }
        Builtin::Map | Builtin::Filter | Builtin::Reject => {
            let value = eval(&arguments[0], snapshot, locals)?;
            if value.is_pending() {
                return Ok(Value::Pending);
            }
            let items = value
                .as_list()
                .ok_or_else(|| format!("{} expects a list, found {value}", builtin.name()))?
                .to_vec();
            let Expr::Lambda { parameter, body } = &arguments[1].node else {
                return Err(format!(
                    "{} expects a lambda as its second argument",
                    builtin.name()
                ));
            };
            let mut result = Vec::with_capacity(items.len());
            for item in items {
                locals.push((parameter.clone(), item.clone()));
                let mapped = eval(body, snapshot, locals);
                locals.pop();
                let mapped = mapped?;
                match builtin {
                    Builtin::Map => result.push(mapped),
                    Builtin::Filter => {
                        if mapped.is_truthy() {
                            result.push(item);
                        }
                    }
                    Builtin::Reject => {
                        if !mapped.is_truthy() {
                            result.push(item);
                        }
                    }
                    _ => unreachable!(),
                }
            }
            Ok(Value::list(result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::compile::parse_expression;
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot::from([
            (Arc::from("count"), Value::number(3.0)),
            (Arc::from("name"), Value::text("Ada")),
            (
                Arc::from("items"),
                Value::list([
                    Value::record([("id", Value::number(1.0)), ("qty", Value::number(2.0))]),
                    Value::record([("id", Value::number(2.0)), ("qty", Value::number(5.0))]),
                ]),
            ),
            (Arc::from("user"), Value::Unit),
            (Arc::from("slow"), Value::Pending),
        ])
    }

    fn eval_str(source: &str) -> Result<Value, String> {
        let parsed = parse_expression(source).unwrap();
        evaluate(&parsed, &snapshot())
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval_str("count * 2 + 1").unwrap(), Value::number(7.0));
        assert_eq!(eval_str("(count + 1) * 2").unwrap(), Value::number(8.0));
    }

    #[test]
    fn text_concatenation() {
        assert_eq!(
            eval_str("'hi ' + name + '!'").unwrap(),
            Value::text("hi Ada!")
        );
        assert_eq!(eval_str("name + count").unwrap(), Value::text("Ada3"));
    }

    #[test]
    fn connectives_return_operand_values() {
        assert_eq!(eval_str("0 || count").unwrap(), Value::number(3.0));
        assert_eq!(eval_str("count && name").unwrap(), Value::text("Ada"));
        assert_eq!(eval_str("0 && name").unwrap(), Value::number(0.0));
    }

    #[test]
    fn short_circuit_skips_right_side() {
        // The right side would fail (adding null) if it were evaluated.
        assert_eq!(eval_str("0 && (user + 1)").unwrap(), Value::number(0.0));
        assert_eq!(eval_str("1 || (user + 1)").unwrap(), Value::number(1.0));
    }

    #[test]
    fn optional_access_propagates_null() {
        assert_eq!(eval_str("user?.address?.city").unwrap(), Value::Unit);
        assert!(eval_str("user.address").is_err());
    }

    #[test]
    fn collection_builtins() {
        assert_eq!(eval_str("length(items)").unwrap(), Value::number(2.0));
        assert_eq!(
            eval_str("sum(map(items, item -> item.qty))").unwrap(),
            Value::number(7.0)
        );
        assert_eq!(
            eval_str("length(filter(items, item -> item.qty > 3))").unwrap(),
            Value::number(1.0)
        );
        assert_eq!(
            eval_str("length(reject(items, item -> item.qty > 3))").unwrap(),
            Value::number(1.0)
        );
        assert_eq!(
            eval_str("join(map(items, item -> item.id), ',')").unwrap(),
            Value::text("1,2")
        );
    }

    #[test]
    fn blank_and_conditional() {
        assert_eq!(eval_str("blank('  ')").unwrap(), Value::Bool(true));
        assert_eq!(
            eval_str("if blank(name) then 'anonymous' else name").unwrap(),
            Value::text("Ada")
        );
    }

    #[test]
    fn decimal_rounds_to_cents() {
        assert_eq!(eval_str("decimal(10 / 3)").unwrap(), Value::number(3.33));
    }

    #[test]
    fn pending_propagates() {
        assert_eq!(eval_str("slow + 1").unwrap(), Value::Pending);
        assert_eq!(eval_str("if slow then 1 else 2").unwrap(), Value::Pending);
    }

    #[test]
    fn lambda_parameter_shadows_field() {
        assert_eq!(
            eval_str("sum(map(items, count -> count.qty))").unwrap(),
            Value::number(7.0)
        );
    }
}
