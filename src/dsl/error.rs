//! Errors raised while tokenizing and parsing filter expressions.

use super::ast::{Filter, Position};
use std::fmt;

/// No token rule matched at `position`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{position}: {kind}")]
pub struct LexError {
    pub position: Position,
    pub kind: LexErrorKind,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexErrorKind {
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("unterminated string starting with {0:?}")]
    UnterminatedString(char),
}

/// No grammar alternative matched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{position}: {reason}")]
pub struct ParseError {
    /// Furthest position the parser reached.
    pub position: Position,
    pub reason: ParseErrorReason,
    /// Best-effort tree built up to the failure. Diagnostic only; it is not a
    /// valid filter.
    pub partial: Box<Filter>,
}

impl ParseError {
    /// Token descriptions that would have been accepted at `position`.
    pub fn expected(&self) -> &[String] {
        match &self.reason {
            ParseErrorReason::Unexpected { expected, .. } => expected,
            ParseErrorReason::TooDeep { .. } => &[],
        }
    }

    /// Text of the offending token, `None` at end of input.
    pub fn found(&self) -> Option<&str> {
        match &self.reason {
            ParseErrorReason::Unexpected { found, .. } => found.as_deref(),
            ParseErrorReason::TooDeep { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorReason {
    Unexpected {
        expected: Vec<String>,
        found: Option<String>,
    },
    TooDeep {
        limit: usize,
    },
}

impl fmt::Display for ParseErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorReason::Unexpected { expected, found } => {
                match found {
                    Some(token) => write!(f, "unexpected token {:?}", token)?,
                    None => f.write_str("unexpected end of input")?,
                }
                for (i, what) in expected.iter().enumerate() {
                    f.write_str(if i == 0 { " (expected " } else { ", " })?;
                    // Token classes bare, literal tokens quoted
                    match what.as_str() {
                        "text" | "string" => f.write_str(what)?,
                        literal => write!(f, "`{}`", literal)?,
                    }
                }
                if !expected.is_empty() {
                    f.write_str(")")?;
                }
                Ok(())
            }
            ParseErrorReason::TooDeep { limit } => {
                write!(f, "nesting too deep (limit {})", limit)
            }
        }
    }
}

/// Error returned by [`parse`](super::parse).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("lex error at {source}")]
    Lex {
        #[source]
        source: LexError,
        partial: Box<Filter>,
    },
    #[error("parse error at {0}")]
    Parse(#[from] ParseError),
}

impl Error {
    pub fn position(&self) -> Position {
        match self {
            Error::Lex { source, .. } => source.position,
            Error::Parse(err) => err.position,
        }
    }

    /// Partial tree built before the error, for diagnostics.
    pub fn partial(&self) -> &Filter {
        match self {
            Error::Lex { partial, .. } => partial,
            Error::Parse(err) => &err.partial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_error(reason: ParseErrorReason) -> Error {
        Error::Parse(ParseError {
            position: Position {
                offset: 5,
                line: 1,
                column: 6,
            },
            reason,
            partial: Box::default(),
        })
    }

    #[test]
    fn test_unexpected_message() {
        let err = parse_error(ParseErrorReason::Unexpected {
            expected: vec!["(".into(), "text".into(), "NOT".into()],
            found: Some(")".into()),
        });
        assert_eq!(
            err.to_string(),
            "parse error at 1:6: unexpected token \")\" (expected `(`, text, `NOT`)"
        );
        assert_eq!(err.position().offset, 5);
    }

    #[test]
    fn test_end_of_input_message() {
        let err = parse_error(ParseErrorReason::Unexpected {
            expected: vec![],
            found: None,
        });
        assert_eq!(err.to_string(), "parse error at 1:6: unexpected end of input");
    }

    #[test]
    fn test_too_deep_message() {
        let err = parse_error(ParseErrorReason::TooDeep { limit: 4 });
        assert_eq!(err.to_string(), "parse error at 1:6: nesting too deep (limit 4)");
    }

    #[test]
    fn test_lex_message() {
        let err = Error::Lex {
            source: LexError {
                position: Position::start(),
                kind: LexErrorKind::UnterminatedString('\''),
            },
            partial: Box::default(),
        };
        assert_eq!(
            err.to_string(),
            "lex error at 1:1: unterminated string starting with '\\''"
        );
        assert!(err.partial().is_empty());
    }
}
