//! Tokenizer for filter expressions.
//!
//! Token classes, tried in this order at each offset after whitespace is
//! skipped:
//!
//!   string   - `'...'` or `"..."`, `\'` and `\"` escapes honored
//!   word     - `[a-zA-Z0-9_]+`; exactly `AND`, `OR` or `NOT` is a keyword,
//!              anything else (including `and`) is text
//!   operator - `<= >= != = : . < > ( ) , -`, longest first

use winnow::ascii::multispace0;
use winnow::combinator::{alt, opt};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use super::ast::{Keyword, Position};
use super::error::{LexError, LexErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    String,
    Keyword(Keyword),
    Operator,
}

/// A token borrowing its text from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Raw source text; string tokens keep their quotes.
    pub text: &'a str,
    pub pos: Position,
}

impl Token<'_> {
    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }
}

type PResult<T> = Result<T, winnow::error::ErrMode<winnow::error::ContextError>>;

fn lex_quote(input: &mut &str) -> PResult<char> {
    one_of(['\'', '"']).parse_next(input)
}

fn lex_char(input: &mut &str) -> PResult<char> {
    any.parse_next(input)
}

/// Quoted string, returned with its quotes.
fn lex_string<'a>(input: &mut &'a str) -> PResult<&'a str> {
    let start = *input;
    let quote = lex_quote(input)?;
    loop {
        match lex_char(input)? {
            // An escaped quote never closes the string.
            '\\' => {
                opt(lex_quote).parse_next(input)?;
            }
            c if c == quote => break,
            _ => {}
        }
    }
    Ok(&start[..start.len() - input.len()])
}

/// Text or keyword.
fn lex_word<'a>(input: &mut &'a str) -> PResult<(TokenKind, &'a str)> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_')
        .map(|word: &'a str| match Keyword::from_word(word) {
            Some(keyword) => (TokenKind::Keyword(keyword), word),
            None => (TokenKind::Text, word),
        })
        .parse_next(input)
}

fn lex_operator<'a>(input: &mut &'a str) -> PResult<&'a str> {
    alt((
        // Multi-char operators first
        "<=", ">=", "!=", "=", ":", ".", "<", ">", "(", ")", ",", "-",
    ))
    .parse_next(input)
}

fn lex_token<'a>(input: &mut &'a str) -> PResult<(TokenKind, &'a str)> {
    alt((
        lex_string.map(|s| (TokenKind::String, s)),
        lex_word,
        lex_operator.map(|s| (TokenKind::Operator, s)),
    ))
    .parse_next(input)
}

/// Lazy token stream over an input string. Stops after the first error.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    remaining: &'a str,
    pos: Position,
    failed: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Tokenizer {
            remaining: input,
            pos: Position::start(),
            failed: false,
        }
    }

    /// Position of the next unread character. Once the stream is exhausted
    /// this is the end of input, or the offset of the lex error.
    pub fn position(&self) -> Position {
        self.pos
    }

    fn skip_whitespace(&mut self) {
        let skipped: PResult<&str> = multispace0.parse_next(&mut self.remaining);
        if let Ok(ws) = skipped {
            self.pos = self.pos.advance(ws);
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.skip_whitespace();
        let first = self.remaining.chars().next()?;

        let before = self.remaining;
        match lex_token(&mut self.remaining) {
            Ok((kind, text)) => {
                let token = Token {
                    kind,
                    text,
                    pos: self.pos,
                };
                self.pos = self.pos.advance(text);
                Some(Ok(token))
            }
            Err(_) => {
                self.remaining = before;
                self.failed = true;
                let kind = if first == '\'' || first == '"' {
                    LexErrorKind::UnterminatedString(first)
                } else {
                    LexErrorKind::UnexpectedChar(first)
                };
                Some(Err(LexError {
                    position: self.pos,
                    kind,
                }))
            }
        }
    }
}

/// Tokenize the entire input.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, LexError> {
    Tokenizer::new(input).collect()
}

/// Strip the quotes from a string token and resolve `\'` and `\"`.
/// Any other backslash is kept as written.
pub fn unquote(raw: &str) -> String {
    let inner = raw
        .get(1..raw.len().saturating_sub(1))
        .unwrap_or_default();
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&quote @ ('\'' | '"')) = chars.peek() {
                out.push(quote);
                chars.next();
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<(TokenKind, &str)> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_simple_tokens() {
        assert_eq!(
            kinds("package=com.google"),
            vec![
                (TokenKind::Text, "package"),
                (TokenKind::Operator, "="),
                (TokenKind::Text, "com"),
                (TokenKind::Operator, "."),
                (TokenKind::Text, "google"),
            ]
        );
    }

    #[test]
    fn test_longest_operator_first() {
        assert_eq!(
            kinds("a<=1 b>=2 c!=3 d<4 e>5 f:g"),
            vec![
                (TokenKind::Text, "a"),
                (TokenKind::Operator, "<="),
                (TokenKind::Text, "1"),
                (TokenKind::Text, "b"),
                (TokenKind::Operator, ">="),
                (TokenKind::Text, "2"),
                (TokenKind::Text, "c"),
                (TokenKind::Operator, "!="),
                (TokenKind::Text, "3"),
                (TokenKind::Text, "d"),
                (TokenKind::Operator, "<"),
                (TokenKind::Text, "4"),
                (TokenKind::Text, "e"),
                (TokenKind::Operator, ">"),
                (TokenKind::Text, "5"),
                (TokenKind::Text, "f"),
                (TokenKind::Operator, ":"),
                (TokenKind::Text, "g"),
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(
            kinds("a AND b and NOT not OR or ANDROID"),
            vec![
                (TokenKind::Text, "a"),
                (TokenKind::Keyword(Keyword::And), "AND"),
                (TokenKind::Text, "b"),
                (TokenKind::Text, "and"),
                (TokenKind::Keyword(Keyword::Not), "NOT"),
                (TokenKind::Text, "not"),
                (TokenKind::Keyword(Keyword::Or), "OR"),
                (TokenKind::Text, "or"),
                (TokenKind::Text, "ANDROID"),
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds(r#"title = "*and the*" 'x' "it's""#),
            vec![
                (TokenKind::Text, "title"),
                (TokenKind::Operator, "="),
                (TokenKind::String, "\"*and the*\""),
                (TokenKind::String, "'x'"),
                (TokenKind::String, "\"it's\""),
            ]
        );
    }

    #[test]
    fn test_escaped_quotes() {
        let tokens = tokenize(r#"'don\'t' "say \"hi\"""#).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(unquote(tokens[0].text), "don't");
        assert_eq!(unquote(tokens[1].text), "say \"hi\"");
    }

    #[test]
    fn test_unquote_keeps_other_backslashes() {
        assert_eq!(unquote(r"'^.*prod\d$'"), r"^.*prod\d$");
        assert_eq!(unquote("''"), "");
    }

    #[test]
    fn test_negation_and_punctuation() {
        assert_eq!(
            kinds("-file:\".java\" f(a, b)"),
            vec![
                (TokenKind::Operator, "-"),
                (TokenKind::Text, "file"),
                (TokenKind::Operator, ":"),
                (TokenKind::String, "\".java\""),
                (TokenKind::Text, "f"),
                (TokenKind::Operator, "("),
                (TokenKind::Text, "a"),
                (TokenKind::Operator, ","),
                (TokenKind::Text, "b"),
                (TokenKind::Operator, ")"),
            ]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("a\n  AND b").unwrap();
        assert_eq!(
            tokens[1].pos,
            Position {
                offset: 4,
                line: 2,
                column: 3
            }
        );
        assert_eq!(tokens[2].pos.offset, 8);
    }

    #[test]
    fn test_whitespace_only() {
        assert!(tokenize(" \t\r\n").unwrap().is_empty());
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a = $b").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnexpectedChar('$'));
        assert_eq!(err.position.offset, 4);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("name = 'abc").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedString('\''));
        assert_eq!(err.position.offset, 7);
    }

    #[test]
    fn test_tokenizer_is_lazy() {
        let mut tokens = Tokenizer::new("a b $");
        assert_eq!(tokens.next().unwrap().unwrap().text, "a");
        assert_eq!(tokens.next().unwrap().unwrap().text, "b");
        assert!(tokens.next().unwrap().is_err());
        assert!(tokens.next().is_none());
    }
}
