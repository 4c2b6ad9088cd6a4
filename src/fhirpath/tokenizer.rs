//! Tokenizer for path expressions.
//!
//! Lexing is lenient: characters that start no token are skipped rather than
//! reported, so `name.exists() ;` tokenizes the same as `name.exists()`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Identifier(String),
    String(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    /// `@`-prefixed date/time literal, without the `@`
    DateTime(String),

    // Operators and punctuation
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Union,
    Plus,
    Dot,
    LeftParen,
    RightParen,
    Comma,

    // Keywords
    And,
    Or,
    Xor,
    Implies,
    Not,
    Where,
    Exists,
    Empty,
    Count,
    As,
    Is,
    All,
    HasValue,
    StartsWith,
    EndsWith,
    Contains,
    Matches,
    Length,

    Eof,
}

impl Token {
    fn from_keyword(word: &str) -> Option<Token> {
        let token = match word {
            "true" => Token::Boolean(true),
            "false" => Token::Boolean(false),
            "and" => Token::And,
            "or" => Token::Or,
            "xor" => Token::Xor,
            "implies" => Token::Implies,
            "not" => Token::Not,
            "where" => Token::Where,
            "exists" => Token::Exists,
            "empty" => Token::Empty,
            "count" => Token::Count,
            "as" => Token::As,
            "is" => Token::Is,
            "all" => Token::All,
            "hasValue" => Token::HasValue,
            "startsWith" => Token::StartsWith,
            "endsWith" => Token::EndsWith,
            "contains" => Token::Contains,
            "matches" => Token::Matches,
            "length" => Token::Length,
            _ => return None,
        };
        Some(token)
    }

    /// The name this token contributes when used as a function or field name.
    ///
    /// Boolean operators have no name: they can only appear between operands.
    pub fn name(&self) -> Option<&str> {
        let name = match self {
            Token::Identifier(name) => return Some(name),
            Token::Not => "not",
            Token::Where => "where",
            Token::Exists => "exists",
            Token::Empty => "empty",
            Token::Count => "count",
            Token::As => "as",
            Token::Is => "is",
            Token::All => "all",
            Token::HasValue => "hasValue",
            Token::StartsWith => "startsWith",
            Token::EndsWith => "endsWith",
            Token::Contains => "contains",
            Token::Matches => "matches",
            Token::Length => "length",
            _ => return None,
        };
        Some(name)
    }
}

pub struct Tokenizer {
    chars: Vec<char>,
    pos: usize,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    /// Scan the whole input. The result always ends with [`Token::Eof`].
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        tokens.push(Token::Eof);
        tokens
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            let c = self.peek()?;
            match c {
                c if c.is_whitespace() => self.pos += 1,
                c if c.is_ascii_alphabetic() || c == '_' => return Some(self.identifier()),
                '`' => return Some(self.delimited_identifier()),
                c if c.is_ascii_digit() => return Some(self.number()),
                '\'' => return Some(self.string_literal()),
                '@' => return Some(self.date_time()),
                '=' => return Some(self.single(Token::Equal)),
                '|' => return Some(self.single(Token::Union)),
                '+' => return Some(self.single(Token::Plus)),
                '.' => return Some(self.single(Token::Dot)),
                '(' => return Some(self.single(Token::LeftParen)),
                ')' => return Some(self.single(Token::RightParen)),
                ',' => return Some(self.single(Token::Comma)),
                '>' => return Some(self.with_equal(Token::GreaterThan, Token::GreaterThanOrEqual)),
                '<' => return Some(self.with_equal(Token::LessThan, Token::LessThanOrEqual)),
                '!' if self.peek_next() == Some('=') => {
                    self.pos += 2;
                    return Some(Token::NotEqual);
                }
                _ => self.pos += 1,
            }
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.pos += 1;
        token
    }

    fn with_equal(&mut self, bare: Token, with_equal: Token) -> Token {
        if self.peek_next() == Some('=') {
            self.pos += 2;
            with_equal
        } else {
            self.pos += 1;
            bare
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn identifier(&mut self) -> Token {
        let word = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        Token::from_keyword(&word).unwrap_or(Token::Identifier(word))
    }

    fn delimited_identifier(&mut self) -> Token {
        self.pos += 1;
        let word = self.take_while(|c| c != '`');
        if self.peek() == Some('`') {
            self.pos += 1;
        }
        Token::Identifier(word)
    }

    fn number(&mut self) -> Token {
        let mut text = self.take_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            let fraction = self.take_while(|c| c.is_ascii_digit());
            text.push('.');
            text.push_str(&fraction);
            return Decimal::from_str(&text)
                .map(Token::Decimal)
                .unwrap_or(Token::String(text));
        }
        match text.parse::<i64>() {
            Ok(i) => Token::Integer(i),
            Err(_) => Decimal::from_str(&text)
                .map(Token::Decimal)
                .unwrap_or(Token::String(text)),
        }
    }

    fn string_literal(&mut self) -> Token {
        self.pos += 1;
        let mut text = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '\'' => break,
                '\\' => {
                    let Some(escaped) = self.peek() else { break };
                    self.pos += 1;
                    text.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        'f' => '\u{000C}',
                        other => other,
                    });
                }
                other => text.push(other),
            }
        }
        Token::String(text)
    }

    fn date_time(&mut self) -> Token {
        self.pos += 1;
        let text = self.take_while(|c| c.is_ascii_digit() || matches!(c, '-' | ':' | 'T' | '.' | '+' | 'Z'));
        if is_date_time_literal(&text) {
            Token::DateTime(text)
        } else {
            Token::String(text)
        }
    }
}

/// Tokenize a complete expression.
pub fn tokenize(input: &str) -> Vec<Token> {
    Tokenizer::new(input).tokenize()
}

/// Whether `text` is a (possibly partial) date, dateTime or time.
pub fn is_date_time_literal(text: &str) -> bool {
    if let Some(time) = text.strip_prefix('T') {
        return is_time(time);
    }
    let text = text.strip_suffix('T').unwrap_or(text);
    match text.len() {
        4 => text.chars().all(|c| c.is_ascii_digit()),
        7 => NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").is_ok(),
        10 => NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok(),
        _ => {
            DateTime::parse_from_rfc3339(text).is_ok()
                || ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
                    .iter()
                    .any(|fmt| NaiveDateTime::parse_from_str(text, fmt).is_ok())
        }
    }
}

fn is_time(text: &str) -> bool {
    ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"]
        .iter()
        .any(|fmt| NaiveTime::parse_from_str(text, fmt).is_ok())
}
