//! AIP-160 list filter expressions.
//!
//! Syntax (see https://google.aip.dev/160):
//!   a b c                   - sequence, all factors must match
//!   a AND b                 - conjunction of sequences
//!   a OR b                  - disjunction, binds tighter than AND
//!   NOT a, -a               - negation
//!   field.path = value      - comparison: = != < <= > >= and has (:)
//!   "prefix*", '*suffix'    - quoted strings with wildcards
//!   fn.name(arg, ...)       - function call
//!   (expr)                  - grouping
//!   prod                    - global restriction
//!
//! Keywords are case-sensitive: `and` is an ordinary name.

mod ast;
mod error;
mod lexer;
mod parser;
mod visitor;

pub use ast::*;
pub use error::{Error, LexError, LexErrorKind, ParseError, ParseErrorReason};
pub use lexer::{Token, TokenKind, Tokenizer, tokenize, unquote};
pub use parser::{DEFAULT_MAX_DEPTH, Parser, ParserConfig, parse};
pub use visitor::{Accept, NoopVisitor, Visitor, visit};
