use super::ast::{BinaryOperator, Builtin, Expr, Literal, UnaryOperator};
use super::lexer::Token;
use super::{ParseError, Span, Spanned};
use chumsky::{input::ValueInput, pratt::*, prelude::*};

pub fn parser<'src, I>()
-> impl Parser<'src, I, Spanned<Expr>, extra::Err<ParseError<'src, Token<'src>>>>
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
{
    recursive(|expression| {
        let identifier = select! { Token::Identifier(identifier) => identifier };

        let literal = select! {
            Token::Number(number) => Literal::Number(number),
            Token::Text(text) => Literal::Text(text.into()),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Null,
        }
        .map(Expr::Literal);

        // Lambda is only meaningful as a collection-builtin argument, but
        // parsing it as an atom keeps the grammar simple; the evaluator
        // rejects a lambda in value position.
        let lambda = identifier
            .then_ignore(just(Token::Arrow))
            .then(expression.clone())
            .map(|(parameter, body)| Expr::Lambda {
                parameter: parameter.into(),
                body: Box::new(body),
            });

        let call = identifier
            .then(
                expression
                    .clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(
                        just(Token::BracketRoundOpen),
                        just(Token::BracketRoundClose),
                    ),
            )
            .try_map(|(name, arguments), span| {
                let builtin = Builtin::from_name(name).ok_or_else(|| {
                    ParseError::custom(span, format!("unknown function `{name}`"))
                })?;
                let (expected, _) = builtin.arity();
                if arguments.len() != expected {
                    return Err(ParseError::custom(
                        span,
                        format!(
                            "`{name}` expects {expected} argument(s), found {}",
                            arguments.len()
                        ),
                    ));
                }
                Ok(Expr::Call { builtin, arguments })
            });

        let reference = identifier.map(|name| Expr::Reference(name.into()));

        let conditional = just(Token::If)
            .ignore_then(expression.clone())
            .then_ignore(just(Token::Then))
            .then(expression.clone())
            .then_ignore(just(Token::Else))
            .then(expression.clone())
            .map(|((condition, then_branch), else_branch)| Expr::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            });

        let nested = expression.clone().delimited_by(
            just(Token::BracketRoundOpen),
            just(Token::BracketRoundClose),
        );

        let atom = choice((
            conditional.map_with(|node, extra| Spanned::new(node, extra.span())),
            lambda.map_with(|node, extra| Spanned::new(node, extra.span())),
            call.map_with(|node, extra| Spanned::new(node, extra.span())),
            literal.map_with(|node, extra| Spanned::new(node, extra.span())),
            reference.map_with(|node, extra| Spanned::new(node, extra.span())),
            nested,
        ));

        // Record member access binds tighter than any operator.
        let access_suffix = choice((
            just(Token::Dot).to(false),
            just(Token::QuestionDot).to(true),
        ))
        .then(identifier);

        let accessed = atom.foldl_with(
            access_suffix.repeated(),
            |base, (optional, field): (bool, &str), extra| {
                Spanned::new(
                    Expr::Access {
                        base: Box::new(base),
                        field: field.into(),
                        optional,
                    },
                    extra.span(),
                )
            },
        );

        accessed.pratt((
            // Precedence 9: unary operators
            prefix(9, just(Token::Not), |_, operand, extra| {
                Spanned::new(
                    Expr::Unary {
                        operator: UnaryOperator::Not,
                        operand: Box::new(operand),
                    },
                    extra.span(),
                )
            }),
            prefix(9, just(Token::Minus), |_, operand, extra| {
                Spanned::new(
                    Expr::Unary {
                        operator: UnaryOperator::Negate,
                        operand: Box::new(operand),
                    },
                    extra.span(),
                )
            }),
            // Precedence 7: multiplicative
            infix(left(7), just(Token::Asterisk), |l, _, r, extra| {
                binary(BinaryOperator::Multiply, l, r, extra.span())
            }),
            infix(left(7), just(Token::Slash), |l, _, r, extra| {
                binary(BinaryOperator::Divide, l, r, extra.span())
            }),
            // Precedence 5: additive (also text concatenation)
            infix(left(5), just(Token::Plus), |l, _, r, extra| {
                binary(BinaryOperator::Add, l, r, extra.span())
            }),
            infix(left(5), just(Token::Minus), |l, _, r, extra| {
                binary(BinaryOperator::Subtract, l, r, extra.span())
            }),
            // Precedence 3: comparisons
            infix(left(3), just(Token::Equal), |l, _, r, extra| {
                binary(BinaryOperator::Equal, l, r, extra.span())
            }),
            infix(left(3), just(Token::NotEqual), |l, _, r, extra| {
                binary(BinaryOperator::NotEqual, l, r, extra.span())
            }),
            infix(left(3), just(Token::Greater), |l, _, r, extra| {
                binary(BinaryOperator::Greater, l, r, extra.span())
            }),
            infix(left(3), just(Token::GreaterOrEqual), |l, _, r, extra| {
                binary(BinaryOperator::GreaterOrEqual, l, r, extra.span())
            }),
            infix(left(3), just(Token::Less), |l, _, r, extra| {
                binary(BinaryOperator::Less, l, r, extra.span())
            }),
            infix(left(3), just(Token::LessOrEqual), |l, _, r, extra| {
                binary(BinaryOperator::LessOrEqual, l, r, extra.span())
            }),
            // Precedence 2: conjunction (short-circuit)
            infix(left(2), just(Token::And), |l, _, r, extra| {
                binary(BinaryOperator::And, l, r, extra.span())
            }),
            // Precedence 1 (lowest): disjunction (short-circuit)
            infix(left(1), just(Token::Or), |l, _, r, extra| {
                binary(BinaryOperator::Or, l, r, extra.span())
            }),
        ))
    })
}

fn binary(
    operator: BinaryOperator,
    left: Spanned<Expr>,
    right: Spanned<Expr>,
    span: Span,
) -> Spanned<Expr> {
    Spanned::new(
        Expr::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::super::compile;
    use super::*;

    fn parse(source: &str) -> Spanned<Expr> {
        compile::parse_expression(source).unwrap()
    }

    #[test]
    fn precedence_multiplication_over_addition() {
        let parsed = parse("1 + 2 * 3");
        let Expr::Binary { operator, right, .. } = &parsed.node else {
            panic!("expected binary, got {:?}", parsed.node);
        };
        assert_eq!(*operator, BinaryOperator::Add);
        assert!(matches!(
            right.node,
            Expr::Binary {
                operator: BinaryOperator::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let parsed = parse("a || b && c");
        let Expr::Binary { operator, right, .. } = &parsed.node else {
            panic!("expected binary");
        };
        assert_eq!(*operator, BinaryOperator::Or);
        assert!(matches!(
            right.node,
            Expr::Binary {
                operator: BinaryOperator::And,
                ..
            }
        ));
    }

    #[test]
    fn optional_access_chain() {
        let parsed = parse("user?.address.city");
        let Expr::Access { field, optional, base } = &parsed.node else {
            panic!("expected access");
        };
        assert_eq!(field.as_ref(), "city");
        assert!(!optional);
        assert!(matches!(
            &base.node,
            Expr::Access { optional: true, .. }
        ));
    }

    #[test]
    fn unknown_function_is_a_parse_error() {
        assert!(compile::parse_expression("frobnicate(x)").is_err());
    }

    #[test]
    fn builtin_arity_checked() {
        assert!(compile::parse_expression("length(a, b)").is_err());
        assert!(compile::parse_expression("map(items)").is_err());
    }

    #[test]
    fn conditional_and_lambda() {
        let parsed = parse("if total > 10 then 'big' else 'small'");
        assert!(matches!(parsed.node, Expr::Conditional { .. }));

        let parsed = parse("map(items, item -> item.qty * 2)");
        let Expr::Call { builtin, arguments } = &parsed.node else {
            panic!("expected call");
        };
        assert_eq!(*builtin, Builtin::Map);
        assert!(matches!(arguments[1].node, Expr::Lambda { .. }));
    }
}
