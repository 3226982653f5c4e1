use super::{ParseError, Span, Spanned};
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'src> {
    BracketRoundOpen,
    BracketRoundClose,
    Comma,
    Dot,
    QuestionDot,
    Arrow,
    Not,
    NotEqual,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
    Equal,
    And,
    Or,
    Minus,
    Plus,
    Asterisk,
    Slash,
    If,
    Then,
    Else,
    True,
    False,
    Null,
    Number(f64),
    Text(&'src str),
    Identifier(&'src str),
}

impl<'src> Token<'src> {
    pub fn into_cow_str(self) -> Cow<'src, str> {
        match self {
            Self::BracketRoundOpen => "(".into(),
            Self::BracketRoundClose => ")".into(),
            Self::Comma => ",".into(),
            Self::Dot => ".".into(),
            Self::QuestionDot => "?.".into(),
            Self::Arrow => "->".into(),
            Self::Not => "!".into(),
            Self::NotEqual => "!=".into(),
            Self::GreaterOrEqual => ">=".into(),
            Self::Greater => ">".into(),
            Self::LessOrEqual => "<=".into(),
            Self::Less => "<".into(),
            Self::Equal => "==".into(),
            Self::And => "&&".into(),
            Self::Or => "||".into(),
            Self::Minus => "-".into(),
            Self::Plus => "+".into(),
            Self::Asterisk => "*".into(),
            Self::Slash => "/".into(),
            Self::If => "if".into(),
            Self::Then => "then".into(),
            Self::Else => "else".into(),
            Self::True => "true".into(),
            Self::False => "false".into(),
            Self::Null => "null".into(),
            Self::Number(number) => number.to_string().into(),
            Self::Text(text) => format!("'{text}'").into(),
            Self::Identifier(identifier) => identifier.into(),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.into_cow_str())
    }
}

pub fn lexer<'src>()
-> impl Parser<'src, &'src str, Vec<Spanned<Token<'src>>>, extra::Err<ParseError<'src, char>>> {
    let bracket = choice((
        just('(').to(Token::BracketRoundOpen),
        just(')').to(Token::BracketRoundClose),
    ));

    let operator = choice((
        just("?.").to(Token::QuestionDot),
        just("->").to(Token::Arrow),
        just("!=").to(Token::NotEqual),
        just(">=").to(Token::GreaterOrEqual),
        just("<=").to(Token::LessOrEqual),
        just("==").to(Token::Equal),
        just("&&").to(Token::And),
        just("||").to(Token::Or),
        just('!').to(Token::Not),
        just('>').to(Token::Greater),
        just('<').to(Token::Less),
        just('-').to(Token::Minus),
        just('+').to(Token::Plus),
        just('*').to(Token::Asterisk),
        just('/').to(Token::Slash),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
    ));

    let number = text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .from_str()
        .unwrapped()
        .map(Token::Number);

    let text_literal = just('\'')
        .ignore_then(none_of('\'').repeated().to_slice())
        .then_ignore(just('\''))
        .map(Token::Text);

    let identifier_or_keyword = any()
        .filter(|character: &char| character.is_ascii_lowercase() || *character == '_')
        .then(
            any()
                .filter(|character: &char| {
                    *character == '_'
                        || character.is_ascii_lowercase()
                        || character.is_ascii_digit()
                })
                .repeated(),
        )
        .to_slice()
        .map(|identifier: &str| match identifier {
            "if" => Token::If,
            "then" => Token::Then,
            "else" => Token::Else,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            other => Token::Identifier(other),
        });

    let token = choice((bracket, number, text_literal, identifier_or_keyword, operator));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded_by(text::whitespace())
        .recover_with(skip_then_retry_until(any().ignored(), end()))
        .repeated()
        .collect()
}

/// Span pointing at the end of the source, for EOF errors.
pub fn span_at_end(source: &str) -> Span {
    Span::from(source.len()..source.len())
}
