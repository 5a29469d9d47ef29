//! Error types for every stage of the pipeline.
//!
//! Notation problems (lexing, parsing) are kept apart from semantic problems
//! (a ply that does not fit the board it is played on) so that callers can
//! decide which category to skip and which to report.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized character {fragment:?} at offset {position}")]
pub struct LexError {
    pub position: usize,
    pub fragment: char,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error at offset {position}: {message} (near {residual:?})")]
pub struct ParseError {
    pub position: usize,
    pub message: String,
    /// Unconsumed input starting at the offending token, truncated.
    pub residual: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("semantic error at depth {depth}: {message}")]
pub struct SemanticError {
    pub depth: usize,
    pub message: String,
}

impl SemanticError {
    pub fn new(depth: usize, message: impl Into<String>) -> Self {
        SemanticError {
            depth,
            message: message.into(),
        }
    }
}

/// A fact that does not match the predicate catalog, or a catalog that cannot be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("predicate {name} with arity {arity} is not in the catalog")]
    UnknownPredicate { name: String, arity: usize },
    #[error("invalid value '{value}' for {domain} parameter {param} of {predicate}")]
    InvalidParam {
        predicate: String,
        param: String,
        domain: String,
        value: String,
    },
    #[error("malformed catalog line '{line}': {reason}")]
    MalformedCatalog { line: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("invalid piece declaration '{0}'")]
    InvalidPiece(String),
    #[error("square {square} is declared twice")]
    DuplicateSquare { square: String },
    #[error("malformed entry: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("solution not in expected notation: {0}")]
    Lex(#[from] LexError),
    #[error("solution not in expected notation: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error("internal consistency fault: {0}")]
    Validation(#[from] ValidationError),
    #[error("invalid entry: {0}")]
    Entry(#[from] EntryError),
    #[error("solution too long: {plies} nodes exceed the limit of {limit}")]
    SolutionTooLong { plies: usize, limit: usize },
}

impl AnalysisError {
    /// True when the solution text itself could not be read.
    pub fn is_notation_error(&self) -> bool {
        matches!(self, AnalysisError::Lex(_) | AnalysisError::Parse(_))
    }

    pub fn is_semantic_error(&self) -> bool {
        matches!(self, AnalysisError::Semantic(_))
    }
}
