//! AST types for AIP-160 filter expressions.
//!
//! Every node records the [`Position`] of its first token. Positions are for
//! diagnostics only and are skipped when a tree is serialized, so two trees
//! parsed from differently spaced input serialize identically.
//!
//! `Display` on each node renders canonical filter text that parses back to
//! an equivalent tree.

use serde::Serialize;
use std::fmt;

/// Location of a token in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Byte offset from the start of the input.
    pub offset: usize,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
}

impl Position {
    pub const fn start() -> Self {
        Position {
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Position reached after consuming `text` from `self`.
    pub fn advance(self, text: &str) -> Self {
        let mut pos = self;
        for c in text.chars() {
            pos.offset += c.len_utf8();
            if c == '\n' {
                pos.line += 1;
                pos.column = 1;
            } else {
                pos.column += 1;
            }
        }
        pos
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::start()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A whole filter. Empty input yields a filter with no expressions.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Filter {
    #[serde(skip)]
    pub pos: Position,
    pub expressions: Vec<Expression>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}

/// Conjunction of sequences: `a b AND c AND d`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expression {
    #[serde(skip)]
    pub pos: Position,
    pub sequences: Vec<Sequence>,
}

/// Whitespace separated factors: `New York Giants OR Yankees`.
///
/// With exact match semantics a sequence is equivalent to AND; fuzzy match
/// backends may rank results by how many factors match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sequence {
    #[serde(skip)]
    pub pos: Position,
    pub factors: Vec<Factor>,
}

/// Disjunction of terms: `a < 10 OR a >= 100`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Factor {
    #[serde(skip)]
    pub pos: Position,
    pub terms: Vec<Term>,
}

/// A simple expression, negated by a `NOT` or `-` prefix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Term {
    #[serde(skip)]
    pub pos: Position,
    pub negate: bool,
    pub simple: Simple,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Simple {
    Restriction(Restriction),
    Composite(Composite),
}

impl Simple {
    pub fn pos(&self) -> Position {
        match self {
            Simple::Restriction(restriction) => restriction.pos,
            Simple::Composite(composite) => composite.pos,
        }
    }
}

/// A comparable, optionally related to an argument by a comparator.
///
/// Without a comparison this is a global restriction, e.g. `prod`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Restriction {
    #[serde(skip)]
    pub pos: Position,
    pub comparable: Comparable,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
}

impl Restriction {
    pub fn is_global(&self) -> bool {
        self.comparison.is_none()
    }

    pub fn comparator(&self) -> Option<Comparator> {
        self.comparison.as_ref().map(|c| c.comparator)
    }

    pub fn arg(&self) -> Option<&Arg> {
        self.comparison.as_ref().map(|c| &c.arg)
    }
}

/// Right-hand side of a restriction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub comparator: Comparator,
    pub arg: Arg,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparable {
    Function(Function),
    Member(Member),
}

impl Comparable {
    pub fn pos(&self) -> Position {
        match self {
            Comparable::Function(function) => function.pos,
            Comparable::Member(member) => member.pos,
        }
    }
}

/// Function call with a simple or qualified name: `math.mem('30mb')`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    #[serde(skip)]
    pub pos: Position,
    pub names: Vec<Name>,
    pub args: Vec<Arg>,
}

impl Function {
    /// Dot-joined qualified name, e.g. `math.mem`.
    pub fn qualified_name(&self) -> String {
        join_dotted(self.names.iter().map(Name::as_str))
    }
}

/// Value or dot-qualified field reference: `expr.type_map.1.type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Member {
    #[serde(skip)]
    pub pos: Position,
    pub value: Value,
    pub fields: Vec<Field>,
}

impl Member {
    /// Segments of the member path, head first.
    pub fn path(&self) -> Vec<&str> {
        std::iter::once(self.value.as_str())
            .chain(self.fields.iter().map(Field::as_str))
            .collect()
    }
}

/// Parenthesized expression: `(msg.endsWith('world') AND retries < 10)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composite {
    #[serde(skip)]
    pub pos: Position,
    pub expression: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Value {
    #[serde(skip)]
    pub pos: Position,
    #[serde(flatten)]
    pub kind: ValueKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Bare token. May stand for a name, number, boolean or other literal.
    Text(String),
    /// Quoted string with quotes removed and `\'`, `\"` escapes resolved.
    String(String),
}

impl Value {
    pub fn as_str(&self) -> &str {
        match &self.kind {
            ValueKind::Text(text) | ValueKind::String(text) => text,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self.kind, ValueKind::String(_))
    }

    /// `"*suffix"`: a quoted string asking for a suffix match.
    pub fn has_prefix_wildcard(&self) -> bool {
        matches!(&self.kind, ValueKind::String(s) if s.starts_with('*'))
    }

    /// `"prefix*"`: a quoted string asking for a prefix match.
    pub fn has_suffix_wildcard(&self) -> bool {
        matches!(&self.kind, ValueKind::String(s) if s.len() > 1 && s.ends_with('*'))
    }

    /// Content with any leading or trailing wildcard stripped.
    pub fn unwildcarded(&self) -> &str {
        let mut s = self.as_str();
        if self.has_prefix_wildcard() {
            s = &s[1..];
        }
        if self.has_suffix_wildcard() && !s.is_empty() {
            s = &s[..s.len() - 1];
        }
        s
    }
}

/// Member path segment after the first dot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    #[serde(skip)]
    pub pos: Position,
    #[serde(flatten)]
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Value(Value),
    Keyword(Keyword),
}

impl Field {
    pub fn as_str(&self) -> &str {
        match &self.kind {
            FieldKind::Value(value) => value.as_str(),
            FieldKind::Keyword(keyword) => keyword.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arg {
    Comparable(Comparable),
    Composite(Composite),
}

impl Arg {
    pub fn pos(&self) -> Position {
        match self {
            Arg::Comparable(comparable) => comparable.pos(),
            Arg::Composite(composite) => composite.pos,
        }
    }
}

/// Function name segment. Keywords are allowed here, though services
/// should avoid exposing functions named `AND`, `OR` or `NOT`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Name {
    #[serde(skip)]
    pub pos: Position,
    #[serde(flatten)]
    pub kind: NameKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameKind {
    Text(String),
    Keyword(Keyword),
}

impl Name {
    pub fn as_str(&self) -> &str {
        match &self.kind {
            NameKind::Text(text) => text,
            NameKind::Keyword(keyword) => keyword.as_str(),
        }
    }
}

/// Reserved words. Matched case-sensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Keyword {
    And,
    Or,
    Not,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "AND" => Some(Keyword::And),
            "OR" => Some(Keyword::Or),
            "NOT" => Some(Keyword::Not),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::And => "AND",
            Keyword::Or => "OR",
            Keyword::Not => "NOT",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restriction operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    LessEquals,    // <=
    LessThan,      // <
    GreaterEquals, // >=
    GreaterThan,   // >
    NotEquals,     // !=
    Equals,        // =
    Has,           // :
}

impl Comparator {
    pub fn from_token(text: &str) -> Option<Self> {
        match text {
            "<=" => Some(Comparator::LessEquals),
            "<" => Some(Comparator::LessThan),
            ">=" => Some(Comparator::GreaterEquals),
            ">" => Some(Comparator::GreaterThan),
            "!=" => Some(Comparator::NotEquals),
            "=" => Some(Comparator::Equals),
            ":" => Some(Comparator::Has),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::LessEquals => "<=",
            Comparator::LessThan => "<",
            Comparator::GreaterEquals => ">=",
            Comparator::GreaterThan => ">",
            Comparator::NotEquals => "!=",
            Comparator::Equals => "=",
            Comparator::Has => ":",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn join_dotted<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(".")
}

fn write_separated<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    separator: &str,
) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_separated(f, &self.expressions, " ")
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_separated(f, &self.sequences, " AND ")
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_separated(f, &self.factors, " ")
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_separated(f, &self.terms, " OR ")
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            f.write_str("NOT ")?;
        }
        write!(f, "{}", self.simple)
    }
}

impl fmt::Display for Simple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Simple::Restriction(restriction) => write!(f, "{}", restriction),
            Simple::Composite(composite) => write!(f, "{}", composite),
        }
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.comparable)?;
        match &self.comparison {
            Some(Comparison {
                comparator: Comparator::Has,
                arg,
            }) => write!(f, ":{}", arg),
            Some(Comparison { comparator, arg }) => write!(f, " {} {}", comparator, arg),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Comparable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparable::Function(function) => write!(f, "{}", function),
            Comparable::Member(member) => write!(f, "{}", member),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_separated(f, &self.names, ".")?;
        f.write_str("(")?;
        write_separated(f, &self.args, ", ")?;
        f.write_str(")")
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)?;
        for field in &self.fields {
            write!(f, ".{}", field)?;
        }
        Ok(())
    }
}

impl fmt::Display for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.expression)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Comparable(comparable) => write!(f, "{}", comparable),
            Arg::Composite(composite) => write!(f, "{}", composite),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::Text(text) => f.write_str(text),
            ValueKind::String(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    if c == '"' {
                        f.write_str("\\\"")?;
                    } else {
                        write!(f, "{}", c)?;
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FieldKind::Value(value) => write!(f, "{}", value),
            FieldKind::Keyword(keyword) => write!(f, "{}", keyword),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value {
            pos: Position::start(),
            kind: ValueKind::Text(s.into()),
        }
    }

    fn string(s: &str) -> Value {
        Value {
            pos: Position::start(),
            kind: ValueKind::String(s.into()),
        }
    }

    #[test]
    fn test_position_advance() {
        let pos = Position::start().advance("ab\ncd");
        assert_eq!(
            pos,
            Position {
                offset: 5,
                line: 2,
                column: 3
            }
        );
        assert_eq!(pos.to_string(), "2:3");
    }

    #[test]
    fn test_comparator_mapping() {
        for token in ["<=", "<", ">=", ">", "!=", "=", ":"] {
            let comparator = Comparator::from_token(token).unwrap();
            assert_eq!(comparator.as_str(), token);
        }
        assert_eq!(Comparator::from_token("=="), None);
        assert_eq!(Comparator::from_token(":"), Some(Comparator::Has));
    }

    #[test]
    fn test_keyword_is_case_sensitive() {
        assert_eq!(Keyword::from_word("AND"), Some(Keyword::And));
        assert_eq!(Keyword::from_word("and"), None);
        assert_eq!(Keyword::from_word("Not"), None);
    }

    #[test]
    fn test_wildcards() {
        let value = string("*and the*");
        assert!(value.has_prefix_wildcard());
        assert!(value.has_suffix_wildcard());
        assert_eq!(value.unwildcarded(), "and the");

        let value = string("*.java");
        assert!(value.has_prefix_wildcard());
        assert!(!value.has_suffix_wildcard());
        assert_eq!(value.unwildcarded(), ".java");

        let value = text("plain");
        assert!(!value.has_prefix_wildcard());
        assert_eq!(value.unwildcarded(), "plain");
    }

    #[test]
    fn test_string_value_display_escapes_quotes() {
        assert_eq!(string("say \"hi\"").to_string(), r#""say \"hi\"""#);
        assert_eq!(string("it's").to_string(), r#""it's""#);
    }

    #[test]
    fn test_member_path() {
        let member = Member {
            pos: Position::start(),
            value: text("expr"),
            fields: vec![
                Field {
                    pos: Position::start(),
                    kind: FieldKind::Value(text("type_map")),
                },
                Field {
                    pos: Position::start(),
                    kind: FieldKind::Keyword(Keyword::Or),
                },
            ],
        };
        assert_eq!(member.path(), vec!["expr", "type_map", "OR"]);
        assert_eq!(member.to_string(), "expr.type_map.OR");
    }
}
