use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can abort a compile. All variants are fatal; nothing is
/// retried or recovered internally.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown text {text:?} at line {line}, column {column}")]
    Lex {
        text: String,
        line: usize,
        column: usize,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("no style rule matches selector {0:?}")]
    StyleNotFound(String),

    #[error("{0}")]
    InvalidOperand(String),
}

/// A token sequence that does not match the grammar. Carries the surrounding
/// source line so the diagnostic can point at the offending token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub token: String,
    pub line: usize,
    pub column: usize,
    pub source_line: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: found {} at line {}, column {}",
            self.message, self.token, self.line, self.column
        )?;
        writeln!(f, "{}", self.source_line)?;
        write!(f, "{}^", " ".repeat(self.column.saturating_sub(1)))
    }
}

impl std::error::Error for ParseError {}
