//! Restricted expression language.
//!
//! Expressions are written once and compiled into two executable forms that
//! must agree: a server-side evaluator over the parsed tree and JavaScript
//! source for the client runtime. Constructs without a client equivalent
//! fail emission with [`Untranspilable`] and stay server-only.

use chumsky::prelude::*;

mod lexer;
pub use lexer::{Token, lexer};

mod ast;
pub use ast::*;

mod parser;
pub use parser::parser;

mod eval;
pub use eval::evaluate;

mod emit;
pub use emit::{emit_client, server_only_marker};

mod compile;
pub use compile::{CompiledExpr, ExprError, compile, parse_expression};

pub use crate::error::Untranspilable;

pub type Span = SimpleSpan;
pub type ParseError<'src, T> = Rich<'src, T, Span>;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { span, node }
    }
}
