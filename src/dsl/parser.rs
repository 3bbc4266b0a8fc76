//! Parser for AIP-160 filter expressions.
//!
//! Grammar (EBNF):
//!
//! filter      = expression*
//! expression  = sequence ("AND" sequence)*
//! sequence    = factor factor*
//! factor      = term ("OR" term)*
//! term        = ("NOT" | "-")? simple
//! simple      = restriction | composite
//! restriction = comparable (comparator arg)?
//! comparable  = function | member
//! function    = name ("." name)* "(" (arg ("," arg)*)? ")"
//! member      = value ("." field)*
//! composite   = "(" expression ")"
//! arg         = comparable | composite
//! value       = TEXT | STRING
//! field       = value | "AND" | "OR" | "NOT"
//! name        = TEXT | "AND" | "OR" | "NOT"
//!
//! `function` and `member` share their dotted prefix. The parser reads the
//! name chain and only commits to a function once it sees `(`; otherwise it
//! rewinds to the saved mark and reads a member instead. Keywords may name a
//! function, but an `AND` or `OR` directly after a factor always ends the
//! sequence, so `a AND (b)` is two sequences rather than a call to `AND`.
//!
//! An alternative that fails without consuming a token lets the caller try
//! something else or end a repetition. Once tokens have been consumed the
//! failure is final and is reported from the furthest position reached.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ast::*;
use super::error::{Error, LexError, ParseError, ParseErrorReason};
use super::lexer::{Token, TokenKind, Tokenizer, unquote};

pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Parser settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum nesting of composites and function-call arguments.
    pub max_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Filter expression parser. Holds only configuration, so one instance can be
/// shared between threads.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    pub fn new(config: ParserConfig) -> Self {
        Parser { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse a filter expression into a [`Filter`].
    ///
    /// On failure the error carries a best-effort partial tree; see
    /// [`Error::partial`].
    pub fn parse(&self, input: &str) -> Result<Filter, Error> {
        let mut state = State::new(input, self.config.max_depth);
        let result = state.filter();
        let lex_error = state.tokens.error.take();

        let outcome = match (result, lex_error) {
            (Ok(filter), None) => Ok(filter),
            (Ok(filter), Some(source)) => Err(Error::Lex {
                source,
                partial: Box::new(filter),
            }),
            (Err(stall), lex_error) => {
                let at_lex_error = state.failure_index() >= state.tokens.buffered.len();
                let err = state.into_error(stall.0);
                match lex_error {
                    Some(source) if at_lex_error => Err(Error::Lex {
                        source,
                        partial: err.partial,
                    }),
                    _ => Err(Error::Parse(err)),
                }
            }
        };

        match &outcome {
            Ok(filter) => tracing::debug!(
                "Parsed filter {:?}: {} expression(s)",
                input,
                filter.expressions.len()
            ),
            Err(e) => tracing::debug!("Failed to parse filter {:?}: {}", input, e),
        }
        outcome
    }
}

/// Parse a filter expression with the default configuration.
pub fn parse(input: &str) -> Result<Filter, Error> {
    Parser::default().parse(input)
}

/// Tokens pulled from the tokenizer on demand and kept for backtracking.
struct TokenBuffer<'a> {
    tokenizer: Tokenizer<'a>,
    buffered: Vec<Token<'a>>,
    error: Option<LexError>,
    exhausted: bool,
}

impl<'a> TokenBuffer<'a> {
    fn new(input: &'a str) -> Self {
        TokenBuffer {
            tokenizer: Tokenizer::new(input),
            buffered: Vec::new(),
            error: None,
            exhausted: false,
        }
    }

    /// Token at `index`, or `None` past the end of input or a lex error.
    fn get(&mut self, index: usize) -> Option<Token<'a>> {
        while self.buffered.len() <= index && !self.exhausted {
            match self.tokenizer.next() {
                Some(Ok(token)) => self.buffered.push(token),
                Some(Err(e)) => {
                    self.error = Some(e);
                    self.exhausted = true;
                }
                None => self.exhausted = true,
            }
        }
        self.buffered.get(index).copied()
    }

    fn end_position(&self) -> Position {
        self.tokenizer.position()
    }
}

/// A failed production, keeping whatever part of the node was built.
struct Stall<T>(Option<T>);

type Parsed<T> = Result<T, Stall<T>>;

impl<T> Stall<T> {
    fn none() -> Self {
        Stall(None)
    }

    fn with(partial: T) -> Self {
        Stall(Some(partial))
    }

    fn map<U>(self, f: impl FnOnce(T) -> U) -> Stall<U> {
        Stall(self.0.map(f))
    }

    /// Rebuild the enclosing list node from the finished items plus this one.
    fn collect<P>(self, mut items: Vec<T>, build: impl FnOnce(Vec<T>) -> P) -> Stall<P> {
        items.extend(self.0);
        if items.is_empty() {
            Stall(None)
        } else {
            Stall(Some(build(items)))
        }
    }
}

fn map_parsed<T, U>(parsed: Parsed<T>, f: impl FnOnce(T) -> U) -> Parsed<U> {
    match parsed {
        Ok(node) => Ok(f(node)),
        Err(stall) => Err(stall.map(f)),
    }
}

const TEXT: &str = "text";
const STRING: &str = "string";
const COMPARATORS: [&str; 7] = ["<=", "<", ">=", ">", "!=", "=", ":"];

/// Furthest failure seen so far and what would have been accepted there.
struct Failure {
    index: usize,
    expected: BTreeSet<&'static str>,
}

struct State<'a> {
    tokens: TokenBuffer<'a>,
    cursor: usize,
    depth: usize,
    max_depth: usize,
    furthest: Option<Failure>,
    too_deep: Option<Position>,
}

impl<'a> State<'a> {
    fn new(input: &'a str, max_depth: usize) -> Self {
        State {
            tokens: TokenBuffer::new(input),
            cursor: 0,
            depth: 0,
            max_depth,
            furthest: None,
            too_deep: None,
        }
    }

    fn peek(&mut self) -> Option<Token<'a>> {
        self.tokens.get(self.cursor)
    }

    fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    fn at_connective(&mut self) -> bool {
        matches!(
            self.peek(),
            Some(Token {
                kind: TokenKind::Keyword(Keyword::And | Keyword::Or),
                ..
            })
        )
    }

    fn position_at(&mut self, index: usize) -> Position {
        match self.tokens.get(index) {
            Some(token) => token.pos,
            None => self.tokens.end_position(),
        }
    }

    fn current_pos(&mut self) -> Position {
        self.position_at(self.cursor)
    }

    fn mark(&self) -> usize {
        self.cursor
    }

    fn reset(&mut self, mark: usize) {
        self.cursor = mark;
    }

    /// True when a failed alternative started at `mark` may not be retried.
    fn committed(&self, mark: usize) -> bool {
        self.cursor > mark || self.too_deep.is_some()
    }

    fn expect(&mut self, what: &'static str) {
        let index = self.cursor;
        if let Some(failure) = &mut self.furthest {
            if failure.index > index {
                return;
            }
            if failure.index == index {
                failure.expected.insert(what);
                return;
            }
        }
        self.furthest = Some(Failure {
            index,
            expected: BTreeSet::from([what]),
        });
    }

    fn failure_index(&self) -> usize {
        self.furthest.as_ref().map_or(self.cursor, |f| f.index)
    }

    fn eat_operator(&mut self, op: &'static str) -> bool {
        match self.peek() {
            Some(token) if token.is_operator(op) => {
                self.cursor += 1;
                true
            }
            _ => {
                self.expect(op);
                false
            }
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Keyword(keyword) => {
                self.cursor += 1;
                true
            }
            _ => {
                self.expect(keyword.as_str());
                false
            }
        }
    }

    fn eat_comparator(&mut self) -> Option<Comparator> {
        let comparator = self
            .peek()
            .filter(|token| token.kind == TokenKind::Operator)
            .and_then(|token| Comparator::from_token(token.text));
        match comparator {
            Some(comparator) => {
                self.cursor += 1;
                Some(comparator)
            }
            None => {
                for op in COMPARATORS {
                    self.expect(op);
                }
                None
            }
        }
    }

    /// Enter a nested composite or argument list.
    fn enter(&mut self) -> bool {
        if self.depth >= self.max_depth {
            if self.too_deep.is_none() {
                let pos = self.position_at(self.cursor.saturating_sub(1));
                self.too_deep = Some(pos);
            }
            return false;
        }
        self.depth += 1;
        true
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn into_error(mut self, partial: Option<Filter>) -> ParseError {
        let partial = Box::new(partial.unwrap_or_default());

        if let Some(position) = self.too_deep {
            return ParseError {
                position,
                reason: ParseErrorReason::TooDeep {
                    limit: self.max_depth,
                },
                partial,
            };
        }

        let (index, expected) = match self.furthest.take() {
            Some(failure) => (
                failure.index,
                failure.expected.into_iter().map(String::from).collect(),
            ),
            None => (self.cursor, Vec::new()),
        };
        let position = self.position_at(index);
        let found = self.tokens.get(index).map(|token| token.text.to_string());
        ParseError {
            position,
            reason: ParseErrorReason::Unexpected { expected, found },
            partial,
        }
    }

    fn filter(&mut self) -> Parsed<Filter> {
        let pos = Position::start();
        let mut expressions = Vec::new();
        while !self.at_end() {
            match self.expression() {
                Ok(expression) => expressions.push(expression),
                Err(stall) => {
                    expressions.extend(stall.0);
                    return Err(Stall::with(Filter { pos, expressions }));
                }
            }
        }
        Ok(Filter { pos, expressions })
    }

    fn expression(&mut self) -> Parsed<Expression> {
        let pos = self.current_pos();
        let mut sequences = Vec::new();
        loop {
            match self.sequence() {
                Ok(sequence) => sequences.push(sequence),
                Err(stall) => {
                    return Err(stall.collect(sequences, |sequences| Expression { pos, sequences }));
                }
            }
            if !self.eat_keyword(Keyword::And) {
                return Ok(Expression { pos, sequences });
            }
        }
    }

    fn sequence(&mut self) -> Parsed<Sequence> {
        let pos = self.current_pos();
        let mut factors = Vec::new();
        loop {
            // `AND` or `OR` after a factor belongs to the enclosing rule, never
            // to a call named after the keyword.
            if !factors.is_empty() && self.at_connective() {
                return Ok(Sequence { pos, factors });
            }
            let mark = self.mark();
            match self.factor() {
                Ok(factor) => factors.push(factor),
                Err(stall) if factors.is_empty() || self.committed(mark) => {
                    return Err(stall.collect(factors, |factors| Sequence { pos, factors }));
                }
                Err(_) => {
                    self.reset(mark);
                    return Ok(Sequence { pos, factors });
                }
            }
        }
    }

    fn factor(&mut self) -> Parsed<Factor> {
        let pos = self.current_pos();
        let mut terms = Vec::new();
        loop {
            match self.term() {
                Ok(term) => terms.push(term),
                Err(stall) => {
                    return Err(stall.collect(terms, |terms| Factor { pos, terms }));
                }
            }
            if !self.eat_keyword(Keyword::Or) {
                return Ok(Factor { pos, terms });
            }
        }
    }

    fn term(&mut self) -> Parsed<Term> {
        let pos = self.current_pos();
        let negate = self.eat_keyword(Keyword::Not) || self.eat_operator("-");
        map_parsed(self.simple(), |simple| Term {
            pos,
            negate,
            simple,
        })
    }

    fn simple(&mut self) -> Parsed<Simple> {
        let mark = self.mark();
        match self.restriction() {
            Ok(restriction) => return Ok(Simple::Restriction(restriction)),
            Err(stall) if self.committed(mark) => return Err(stall.map(Simple::Restriction)),
            Err(_) => self.reset(mark),
        }
        map_parsed(self.composite(), Simple::Composite)
    }

    fn restriction(&mut self) -> Parsed<Restriction> {
        let pos = self.current_pos();
        let comparable = match self.comparable() {
            Ok(comparable) => comparable,
            Err(stall) => {
                return Err(stall.map(|comparable| Restriction {
                    pos,
                    comparable,
                    comparison: None,
                }));
            }
        };

        let Some(comparator) = self.eat_comparator() else {
            return Ok(Restriction {
                pos,
                comparable,
                comparison: None,
            });
        };

        match self.arg() {
            Ok(arg) => Ok(Restriction {
                pos,
                comparable,
                comparison: Some(Comparison { comparator, arg }),
            }),
            Err(stall) => Err(Stall::with(Restriction {
                pos,
                comparable,
                comparison: stall.0.map(|arg| Comparison { comparator, arg }),
            })),
        }
    }

    fn comparable(&mut self) -> Parsed<Comparable> {
        let mark = self.mark();
        if let Some(names) = self.function_head() {
            return map_parsed(self.function_call(names), Comparable::Function);
        }
        tracing::trace!(
            "No call at token {}, backtracking to parse a member",
            self.cursor
        );
        self.reset(mark);
        map_parsed(self.member(), Comparable::Member)
    }

    /// `name ("." name)* "("`, returning the names once the paren is consumed.
    fn function_head(&mut self) -> Option<Vec<Name>> {
        let mut names = vec![self.name()?];
        while self.eat_operator(".") {
            names.push(self.name()?);
        }
        self.eat_operator("(").then_some(names)
    }

    /// Arguments and closing paren of a call whose head is already consumed.
    fn function_call(&mut self, names: Vec<Name>) -> Parsed<Function> {
        let pos = names.first().map_or_else(|| self.current_pos(), |name| name.pos);
        if !self.enter() {
            return Err(Stall::with(Function {
                pos,
                names,
                args: Vec::new(),
            }));
        }
        let mut args = Vec::new();
        let complete = self.call_args(&mut args);
        self.leave();

        let function = Function { pos, names, args };
        if complete {
            Ok(function)
        } else {
            Err(Stall::with(function))
        }
    }

    fn call_args(&mut self, args: &mut Vec<Arg>) -> bool {
        if self.eat_operator(")") {
            return true;
        }
        loop {
            match self.arg() {
                Ok(arg) => args.push(arg),
                Err(stall) => {
                    args.extend(stall.0);
                    return false;
                }
            }
            if self.eat_operator(")") {
                return true;
            }
            if !self.eat_operator(",") {
                return false;
            }
        }
    }

    fn member(&mut self) -> Parsed<Member> {
        let Some(value) = self.value() else {
            return Err(Stall::none());
        };
        let pos = value.pos;
        let mut fields = Vec::new();
        while self.eat_operator(".") {
            match self.field() {
                Some(field) => fields.push(field),
                None => return Err(Stall::with(Member { pos, value, fields })),
            }
        }
        Ok(Member { pos, value, fields })
    }

    fn composite(&mut self) -> Parsed<Composite> {
        let pos = self.current_pos();
        if !self.eat_operator("(") || !self.enter() {
            return Err(Stall::none());
        }
        let result = match self.expression() {
            Ok(expression) => {
                let composite = Composite {
                    pos,
                    expression: Box::new(expression),
                };
                if self.eat_operator(")") {
                    Ok(composite)
                } else {
                    Err(Stall::with(composite))
                }
            }
            Err(stall) => Err(stall.map(|expression| Composite {
                pos,
                expression: Box::new(expression),
            })),
        };
        self.leave();
        result
    }

    fn arg(&mut self) -> Parsed<Arg> {
        let mark = self.mark();
        match self.comparable() {
            Ok(comparable) => return Ok(Arg::Comparable(comparable)),
            Err(stall) if self.committed(mark) => return Err(stall.map(Arg::Comparable)),
            Err(_) => self.reset(mark),
        }
        map_parsed(self.composite(), Arg::Composite)
    }

    fn value(&mut self) -> Option<Value> {
        let token = self.peek();
        let kind = match token {
            Some(Token {
                kind: TokenKind::Text,
                text,
                ..
            }) => ValueKind::Text(text.to_string()),
            Some(Token {
                kind: TokenKind::String,
                text,
                ..
            }) => ValueKind::String(unquote(text)),
            _ => {
                self.expect(TEXT);
                self.expect(STRING);
                return None;
            }
        };
        let pos = self.current_pos();
        self.cursor += 1;
        Some(Value { pos, kind })
    }

    fn field(&mut self) -> Option<Field> {
        let pos = self.current_pos();
        if let Some(keyword) = self.eat_any_keyword() {
            return Some(Field {
                pos,
                kind: FieldKind::Keyword(keyword),
            });
        }
        self.value().map(|value| Field {
            pos,
            kind: FieldKind::Value(value),
        })
    }

    fn name(&mut self) -> Option<Name> {
        let pos = self.current_pos();
        if let Some(keyword) = self.eat_any_keyword() {
            return Some(Name {
                pos,
                kind: NameKind::Keyword(keyword),
            });
        }
        match self.peek() {
            Some(Token {
                kind: TokenKind::Text,
                text,
                ..
            }) => {
                self.cursor += 1;
                Some(Name {
                    pos,
                    kind: NameKind::Text(text.to_string()),
                })
            }
            _ => {
                self.expect(TEXT);
                None
            }
        }
    }

    /// A keyword used positionally as a plain name.
    fn eat_any_keyword(&mut self) -> Option<Keyword> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Keyword(keyword),
                ..
            }) => {
                self.cursor += 1;
                Some(keyword)
            }
            _ => {
                for keyword in [Keyword::And, Keyword::Or, Keyword::Not] {
                    self.expect(keyword.as_str());
                }
                None
            }
        }
    }
}
