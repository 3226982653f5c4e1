//! Expression AST.
//!
//! One variant per supported construct, processed by an exhaustive-match
//! evaluator ([`super::eval`]) and an exhaustive-match client emitter
//! ([`super::emit`]). A new operator is added by adding a variant and both
//! handlers together; the match exhaustiveness check enforces the pairing.

use super::Spanned;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    /// Field, derived-node or lambda-parameter reference; which one is
    /// decided by scope at evaluation/emission time.
    Reference(Arc<str>),
    Access {
        base: Box<Spanned<Expr>>,
        field: Arc<str>,
        /// `?.` propagates null instead of failing on a missing base.
        optional: bool,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Spanned<Expr>>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Spanned<Expr>>,
        right: Box<Spanned<Expr>>,
    },
    Conditional {
        condition: Box<Spanned<Expr>>,
        then_branch: Box<Spanned<Expr>>,
        else_branch: Box<Spanned<Expr>>,
    },
    Call {
        builtin: Builtin,
        arguments: Vec<Spanned<Expr>>,
    },
    Lambda {
        parameter: Arc<str>,
        body: Box<Spanned<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(Arc<str>),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    And,
    Or,
}

/// The fixed builtin library. `Decimal` has no client equivalent and is
/// rejected by the emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Length,
    Map,
    Filter,
    Reject,
    Sum,
    Join,
    Blank,
    Decimal,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "length" => Self::Length,
            "map" => Self::Map,
            "filter" => Self::Filter,
            "reject" => Self::Reject,
            "sum" => Self::Sum,
            "join" => Self::Join,
            "blank" => Self::Blank,
            "decimal" => Self::Decimal,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::Map => "map",
            Self::Filter => "filter",
            Self::Reject => "reject",
            Self::Sum => "sum",
            Self::Join => "join",
            Self::Blank => "blank",
            Self::Decimal => "decimal",
        }
    }

    /// Expected argument count, second slot meaning "takes a lambda".
    pub fn arity(self) -> (usize, bool) {
        match self {
            Self::Length | Self::Sum | Self::Blank | Self::Decimal => (1, false),
            Self::Map | Self::Filter | Self::Reject => (2, true),
            Self::Join => (2, false),
        }
    }
}

impl Expr {
    /// Static dependency extraction: every free field/derived reference in
    /// the tree. Lambda parameters are bound, not dependencies. Order is
    /// first-appearance, duplicates removed.
    pub fn dependencies(&self) -> Vec<Arc<str>> {
        let mut found = Vec::new();
        let mut bound: Vec<Arc<str>> = Vec::new();
        collect_references(self, &mut bound, &mut found);
        found
    }
}

fn collect_references(expr: &Expr, bound: &mut Vec<Arc<str>>, found: &mut Vec<Arc<str>>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Reference(name) => {
            if !bound.iter().any(|parameter| parameter == name)
                && !found.iter().any(|existing| existing == name)
            {
                found.push(name.clone());
            }
        }
        Expr::Access { base, .. } => collect_references(&base.node, bound, found),
        Expr::Unary { operand, .. } => collect_references(&operand.node, bound, found),
        Expr::Binary { left, right, .. } => {
            collect_references(&left.node, bound, found);
            collect_references(&right.node, bound, found);
        }
        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            collect_references(&condition.node, bound, found);
            collect_references(&then_branch.node, bound, found);
            collect_references(&else_branch.node, bound, found);
        }
        Expr::Call { arguments, .. } => {
            for argument in arguments {
                collect_references(&argument.node, bound, found);
            }
        }
        Expr::Lambda { parameter, body } => {
            bound.push(parameter.clone());
            collect_references(&body.node, bound, found);
            bound.pop();
        }
    }
}
