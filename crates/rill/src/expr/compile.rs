//! Expression compilation: one parse, two executable forms.
//!
//! `compile` parses the source once and produces the dependency set (by
//! static walk, never closure introspection), a server evaluator over the
//! tree, and, when every construct is on the emitter's allow-list,
//! equivalent client source. An off-list construct leaves the expression
//! server-evaluable and installs a visible marker in place of client
//! source.

use super::ast::Expr;
use super::emit::{emit_client, server_only_marker};
use super::eval::evaluate;
use super::lexer::{Token, lexer, span_at_end};
use super::{Spanned, parser::parser};
use crate::error::Untranspilable;
use crate::store::Snapshot;
use crate::value::Value;
use chumsky::input::Input as _;
use chumsky::prelude::Parser as _;
use std::ops::Range;
use std::sync::Arc;

/// A parse diagnostic with its source span, renderable by build tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprError {
    pub span: Range<usize>,
    pub message: String,
}

pub fn parse_expression(source: &str) -> Result<Spanned<Expr>, Vec<ExprError>> {
    let (tokens, lex_errors) = lexer().parse(source).into_output_errors();
    if !lex_errors.is_empty() {
        return Err(lex_errors
            .iter()
            .map(|error| ExprError {
                span: error.span().into_range(),
                message: error.to_string(),
            })
            .collect());
    }
    let tokens = tokens.unwrap_or_default();

    let (ast, parse_errors) = parser()
        .parse(
            tokens
                .as_slice()
                .map(span_at_end(source), |spanned| (&spanned.node, &spanned.span)),
        )
        .into_output_errors();
    if !parse_errors.is_empty() {
        return Err(parse_errors
            .iter()
            .map(|error| ExprError {
                span: error.span().into_range(),
                message: error.to_string(),
            })
            .collect());
    }
    ast.ok_or_else(|| {
        vec![ExprError {
            span: 0..source.len(),
            message: "empty expression".to_string(),
        }]
    })
}

/// A compiled expression: dependencies + server evaluator + client source.
#[derive(Clone)]
pub struct CompiledExpr {
    source: Arc<str>,
    ast: Arc<Spanned<Expr>>,
    dependencies: Vec<Arc<str>>,
    client: Result<Arc<str>, Untranspilable>,
}

pub fn compile(source: &str) -> Result<CompiledExpr, Vec<ExprError>> {
    let ast = parse_expression(source)?;
    let dependencies = ast.node.dependencies();
    let client: Result<Arc<str>, Untranspilable> = emit_client(&ast).map(Arc::from);
    Ok(CompiledExpr {
        source: source.into(),
        ast: Arc::new(ast),
        dependencies,
        client,
    })
}

impl CompiledExpr {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Free field/derived references, first-appearance order.
    pub fn dependencies(&self) -> &[Arc<str>] {
        &self.dependencies
    }

    /// Evaluate against a snapshot of current values.
    pub fn evaluate(&self, snapshot: &Snapshot) -> Result<Value, String> {
        evaluate(&self.ast, snapshot)
    }

    /// The server evaluator as a standalone closure.
    pub fn server_eval(&self) -> Arc<dyn Fn(&Snapshot) -> Result<Value, String> + Send + Sync> {
        let ast = self.ast.clone();
        Arc::new(move |snapshot| evaluate(&ast, snapshot))
    }

    /// Equivalent client source, or why there is none.
    pub fn client_source(&self) -> Result<&str, &Untranspilable> {
        match &self.client {
            Ok(source) => Ok(source),
            Err(error) => Err(error),
        }
    }

    pub fn is_transpilable(&self) -> bool {
        self.client.is_ok()
    }

    /// Client source with the visible marker substituted for server-only
    /// expressions.
    pub fn client_source_or_marker(&self) -> String {
        match &self.client {
            Ok(source) => source.to_string(),
            Err(error) => server_only_marker(&error.construct),
        }
    }
}

impl std::fmt::Debug for CompiledExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExpr")
            .field("source", &self.source)
            .field("dependencies", &self.dependencies)
            .field("transpilable", &self.client.is_ok())
            .finish()
    }
}
