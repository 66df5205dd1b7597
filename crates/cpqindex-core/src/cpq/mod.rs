//! # Conjunctive Path Queries
//!
//! CPQ expressions and their graph representation.
//!
//! A CPQ is built from identity, single labels, concatenation and
//! intersection. Its query graph has a distinguished source and target;
//! intersection glues both endpoints, concatenation glues the target of the
//! left side to the source of the right side, and identity merges source
//! and target.
//!
//! Text syntax (used by [`Cpq::parse`] and `Display`):
//! - `id` for identity
//! - `3` for a forward label, `3⁻` or `3^-` for its inverse
//! - `a◦b` or `a.b` for concatenation (binds tighter)
//! - `a ∩ b` or `a & b` for intersection
//! - parentheses for grouping

mod query_graph;

pub use query_graph::*;

use crate::{IndexError, Label, LabelSequence};
use std::fmt;

// =============================================================================
// EXPRESSIONS
// =============================================================================

/// A conjunctive path query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cpq {
    /// The identity relation (source equals target).
    Identity,
    /// A single edge label.
    Label(Label),
    /// Left followed by right.
    Concat(Box<Cpq>, Box<Cpq>),
    /// Both sides between the same endpoints.
    Intersect(Box<Cpq>, Box<Cpq>),
}

impl Cpq {
    /// The identity query.
    #[must_use]
    pub const fn id() -> Self {
        Self::Identity
    }

    /// A single label.
    #[must_use]
    pub const fn label(label: Label) -> Self {
        Self::Label(label)
    }

    /// `left ◦ right`.
    #[must_use]
    pub fn concat(left: Cpq, right: Cpq) -> Self {
        Self::Concat(Box::new(left), Box::new(right))
    }

    /// `left ∩ right`.
    #[must_use]
    pub fn intersect(left: Cpq, right: Cpq) -> Self {
        Self::Intersect(Box::new(left), Box::new(right))
    }

    /// The path query following a label sequence.
    #[must_use]
    pub fn path(sequence: &LabelSequence) -> Self {
        sequence
            .labels()
            .iter()
            .map(|&label| Self::Label(label))
            .reduce(Self::concat)
            .unwrap_or(Self::Identity)
    }

    /// Left-nested intersection of all operands, `None` when empty.
    #[must_use]
    pub fn intersect_all<I: IntoIterator<Item = Cpq>>(operands: I) -> Option<Self> {
        operands.into_iter().reduce(Self::intersect)
    }

    /// Length of the longest path this query requires.
    #[must_use]
    pub fn diameter(&self) -> usize {
        match self {
            Self::Identity => 0,
            Self::Label(_) => 1,
            Self::Concat(left, right) => left.diameter() + right.diameter(),
            Self::Intersect(left, right) => left.diameter().max(right.diameter()),
        }
    }

    /// Convert to a query graph.
    #[must_use]
    pub fn to_query_graph(&self) -> QueryGraph {
        QueryGraph::from_cpq(self)
    }

    /// Parse the text syntax described in the module docs.
    pub fn parse(text: &str) -> Result<Self, IndexError> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let cpq = parser.intersection()?;
        if parser.pos != parser.tokens.len() {
            return Err(IndexError::InvalidArgument(format!(
                "unexpected input at token {} in '{}'",
                parser.pos, text
            )));
        }
        Ok(cpq)
    }
}

impl fmt::Display for Cpq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "id"),
            Self::Label(label) => write!(f, "{}", label),
            Self::Concat(left, right) => write!(f, "({}◦{})", left, right),
            Self::Intersect(left, right) => write!(f, "({} ∩ {})", left, right),
        }
    }
}

// =============================================================================
// PARSER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Identity,
    Label(Label),
    Concat,
    Intersect,
    Open,
    Close,
}

fn tokenize(text: &str) -> Result<Vec<Token>, IndexError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            '◦' | '.' => tokens.push(Token::Concat),
            '∩' | '&' => tokens.push(Token::Intersect),
            'i' => {
                if chars.next() != Some('d') {
                    return Err(IndexError::InvalidArgument(format!(
                        "expected 'id' in '{}'",
                        text
                    )));
                }
                tokens.push(Token::Identity);
            }
            '0'..='9' => {
                let mut id = c.to_digit(10).unwrap_or(0);
                while let Some(digit) = chars.peek().and_then(|d| d.to_digit(10)) {
                    id = id
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(digit))
                        .ok_or_else(|| {
                            IndexError::InvalidArgument(format!("label id too large in '{}'", text))
                        })?;
                    chars.next();
                }

                let inverse = match chars.peek() {
                    Some('⁻') => {
                        chars.next();
                        true
                    }
                    Some('^') => {
                        chars.next();
                        if chars.next() != Some('-') {
                            return Err(IndexError::InvalidArgument(format!(
                                "expected '^-' in '{}'",
                                text
                            )));
                        }
                        true
                    }
                    _ => false,
                };

                tokens.push(Token::Label(if inverse {
                    Label::inverse_of(id)
                } else {
                    Label::forward(id)
                }));
            }
            other => {
                return Err(IndexError::InvalidArgument(format!(
                    "unexpected character '{}' in '{}'",
                    other, text
                )));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn intersection(&mut self) -> Result<Cpq, IndexError> {
        let mut left = self.concatenation()?;
        while self.peek() == Some(&Token::Intersect) {
            self.pos += 1;
            let right = self.concatenation()?;
            left = Cpq::intersect(left, right);
        }
        Ok(left)
    }

    fn concatenation(&mut self) -> Result<Cpq, IndexError> {
        let mut left = self.atom()?;
        while self.peek() == Some(&Token::Concat) {
            self.pos += 1;
            let right = self.atom()?;
            left = Cpq::concat(left, right);
        }
        Ok(left)
    }

    fn atom(&mut self) -> Result<Cpq, IndexError> {
        let token = self.peek().cloned();
        self.pos += 1;
        match token {
            Some(Token::Identity) => Ok(Cpq::Identity),
            Some(Token::Label(label)) => Ok(Cpq::Label(label)),
            Some(Token::Open) => {
                let inner = self.intersection()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(IndexError::InvalidArgument(
                        "unbalanced parentheses".to_string(),
                    ));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(other) => Err(IndexError::InvalidArgument(format!(
                "unexpected token {:?}",
                other
            ))),
            None => Err(IndexError::InvalidArgument(
                "unexpected end of query".to_string(),
            )),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
