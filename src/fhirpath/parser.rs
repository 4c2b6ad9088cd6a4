//! Recursive-descent parser producing an [`Expression`] tree.
//!
//! Precedence, lowest first: `implies`, `or`/`xor`, `and`, comparison,
//! `|`, `+`, invocation, primary.
//!
//! The parser never fails. Missing operands become [`Expression::Empty`],
//! a dangling `.` ends the invocation chain, and tokens left over after the
//! top-level expression are ignored.

use super::tokenizer::{Token, tokenize};
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Implies,
    Or,
    Xor,
    And,
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Union,
    Add,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Empty,
    Literal(Value),
    /// Field looked up on the evaluation root
    Identifier(String),
    /// `target.name`
    Member(Box<Expression>, String),
    /// `target.name(args)`, or `name(args)` applied to the root when `target` is `None`
    Function {
        target: Option<Box<Expression>>,
        name: String,
        args: Vec<Expression>,
    },
    Not(Box<Expression>),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// Functions whose argument list is skipped rather than parsed.
const UNPARSED_ARGUMENT_FUNCTIONS: &[&str] = &["where", "all"];

/// Maximum height of a parsed tree and maximum nesting of parentheses,
/// prefix `not` and call arguments. Input beyond it is truncated.
pub const MAX_DEPTH: usize = 256;

/// An expression together with the height of its tree.
type Parsed = (Expression, usize);

fn empty() -> Parsed {
    (Expression::Empty, 1)
}

/// Join two operands, or hand `left` back when the joined tree would be
/// taller than [`MAX_DEPTH`].
fn combine(op: BinaryOp, left: Parsed, right: Parsed) -> Result<Parsed, Parsed> {
    let height = left.1.max(right.1) + 1;
    if height > MAX_DEPTH {
        tracing::trace!(?op, "path expression too deep, truncating");
        return Err(left);
    }
    Ok((Expression::binary(op, left.0, right.0), height))
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Self {
            tokens: tokenize(source),
            pos: 0,
            nesting: 0,
        }
    }

    /// Parse the top-level expression.
    pub fn parse(mut self) -> Expression {
        let (expression, _) = self.parse_implies();
        if !self.at_end() {
            tracing::trace!(
                remaining = self.tokens.len() - 1 - self.pos,
                "ignoring trailing tokens in path expression"
            );
        }
        expression
    }

    fn peek(&self) -> &Token {
        // tokens always end with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    /// Run `parse` one nesting level deeper; at the limit nothing is consumed
    /// and the result is empty.
    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> Parsed) -> Parsed {
        if self.nesting >= MAX_DEPTH {
            tracing::trace!("path expression nesting limit reached");
            return empty();
        }
        self.nesting += 1;
        let parsed = parse(self);
        self.nesting -= 1;
        parsed
    }

    fn parse_implies(&mut self) -> Parsed {
        let mut left = self.parse_or();
        while matches!(self.peek(), Token::Implies) {
            self.advance();
            let right = self.parse_or();
            left = match combine(BinaryOp::Implies, left, right) {
                Ok(joined) => joined,
                Err(left) => return left,
            };
        }
        left
    }

    fn parse_or(&mut self) -> Parsed {
        let mut left = self.parse_and();
        loop {
            let op = match self.peek() {
                Token::Or => BinaryOp::Or,
                Token::Xor => BinaryOp::Xor,
                _ => return left,
            };
            self.advance();
            let right = self.parse_and();
            left = match combine(op, left, right) {
                Ok(joined) => joined,
                Err(left) => return left,
            };
        }
    }

    fn parse_and(&mut self) -> Parsed {
        let mut left = self.parse_comparison();
        while matches!(self.peek(), Token::And) {
            self.advance();
            let right = self.parse_comparison();
            left = match combine(BinaryOp::And, left, right) {
                Ok(joined) => joined,
                Err(left) => return left,
            };
        }
        left
    }

    fn parse_comparison(&mut self) -> Parsed {
        let mut left = self.parse_union();
        loop {
            let op = match self.peek() {
                Token::Equal => BinaryOp::Equal,
                Token::NotEqual => BinaryOp::NotEqual,
                Token::GreaterThan => BinaryOp::GreaterThan,
                Token::LessThan => BinaryOp::LessThan,
                Token::GreaterThanOrEqual => BinaryOp::GreaterThanOrEqual,
                Token::LessThanOrEqual => BinaryOp::LessThanOrEqual,
                _ => return left,
            };
            self.advance();
            let right = self.parse_union();
            left = match combine(op, left, right) {
                Ok(joined) => joined,
                Err(left) => return left,
            };
        }
    }

    fn parse_union(&mut self) -> Parsed {
        let mut left = self.parse_additive();
        while matches!(self.peek(), Token::Union) {
            self.advance();
            let right = self.parse_additive();
            left = match combine(BinaryOp::Union, left, right) {
                Ok(joined) => joined,
                Err(left) => return left,
            };
        }
        left
    }

    fn parse_additive(&mut self) -> Parsed {
        let mut left = self.parse_invocation();
        while matches!(self.peek(), Token::Plus) {
            self.advance();
            let right = self.parse_invocation();
            left = match combine(BinaryOp::Add, left, right) {
                Ok(joined) => joined,
                Err(left) => return left,
            };
        }
        left
    }

    fn parse_invocation(&mut self) -> Parsed {
        let (mut expression, mut height) = self.parse_primary();
        while matches!(self.peek(), Token::Dot) && height < MAX_DEPTH {
            self.advance();
            let Some(name) = self.peek().name().map(str::to_string) else {
                break;
            };
            self.advance();
            (expression, height) = if matches!(self.peek(), Token::LeftParen) {
                self.parse_call(Some((expression, height)), name)
            } else {
                (Expression::Member(Box::new(expression), name), height + 1)
            };
        }
        (expression, height)
    }

    fn parse_primary(&mut self) -> Parsed {
        let literal = match self.peek() {
            Token::String(s) => Some(Value::String(s.clone())),
            Token::Integer(i) => Some(Value::Integer(*i)),
            Token::Decimal(d) => Some(Value::Decimal(*d)),
            Token::Boolean(b) => Some(Value::Boolean(*b)),
            Token::DateTime(s) => Some(Value::DateTime(s.clone())),
            _ => None,
        };
        if let Some(value) = literal {
            self.advance();
            return (Expression::Literal(value), 1);
        }

        match self.peek() {
            Token::LeftParen => {
                self.advance();
                let inner = self.nested(Self::parse_implies);
                if matches!(self.peek(), Token::RightParen) {
                    self.advance();
                }
                inner
            }
            Token::Not if !matches!(self.peek_next(), Token::Dot) => {
                self.advance();
                let (operand, height) = self.nested(Self::parse_invocation);
                if height >= MAX_DEPTH {
                    return empty();
                }
                (Expression::Not(Box::new(operand)), height + 1)
            }
            token => match token.name().map(str::to_string) {
                Some(name) => {
                    self.advance();
                    if matches!(self.peek(), Token::LeftParen) {
                        self.parse_call(None, name)
                    } else {
                        (Expression::Identifier(name), 1)
                    }
                }
                None => empty(),
            },
        }
    }

    /// Parse `(args)` following a function name; the current token is `(`.
    fn parse_call(&mut self, target: Option<Parsed>, name: String) -> Parsed {
        let mut height = target.as_ref().map_or(0, |(_, h)| *h);
        let target = target.map(|(expression, _)| Box::new(expression));
        if UNPARSED_ARGUMENT_FUNCTIONS.contains(&name.as_str()) {
            self.skip_balanced();
            let function = Expression::Function {
                target,
                name,
                args: Vec::new(),
            };
            return (function, height + 1);
        }

        self.advance();
        let mut args = Vec::new();
        if matches!(self.peek(), Token::RightParen) {
            self.advance();
        } else {
            loop {
                let (arg, arg_height) = self.nested(Self::parse_implies);
                height = height.max(arg_height);
                args.push(arg);
                match self.peek() {
                    Token::Comma => self.advance(),
                    Token::RightParen => {
                        self.advance();
                        break;
                    }
                    _ => break,
                }
            }
        }
        if height >= MAX_DEPTH {
            tracing::trace!(function = %name, "path expression too deep, truncating");
            return empty();
        }
        (Expression::Function { target, name, args }, height + 1)
    }

    /// Skip a parenthesized group, including nested parentheses.
    fn skip_balanced(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Token::LeftParen => depth += 1,
                Token::RightParen => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                Token::Eof => return,
                _ => {}
            }
            self.advance();
        }
    }
}

/// Parse an expression source into its tree.
pub fn parse(source: &str) -> Expression {
    Parser::new(source).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ident(name: &str) -> Box<Expression> {
        Box::new(Expression::Identifier(name.to_string()))
    }

    #[test]
    fn test_precedence() {
        // and binds tighter than or
        let expr = parse("a or b and c");
        assert_eq!(
            expr,
            Expression::binary(
                BinaryOp::Or,
                Expression::Identifier("a".into()),
                Expression::binary(
                    BinaryOp::And,
                    Expression::Identifier("b".into()),
                    Expression::Identifier("c".into())
                )
            )
        );
    }

    #[test]
    fn test_union_binds_tighter_than_comparison() {
        let expr = parse("a | b = c");
        let Expression::Binary { op, left, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::Equal);
        assert!(matches!(*left, Expression::Binary { op: BinaryOp::Union, .. }));
    }

    #[test]
    fn test_invocation_chain() {
        assert_eq!(
            parse("name.given.exists()"),
            Expression::Function {
                target: Some(Box::new(Expression::Member(ident("name"), "given".into()))),
                name: "exists".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn test_where_arguments_are_skipped() {
        assert_eq!(
            parse("telecom.where(system = 'phone' and (use = 'home')).exists()"),
            Expression::Function {
                target: Some(Box::new(Expression::Function {
                    target: Some(ident("telecom")),
                    name: "where".into(),
                    args: vec![],
                })),
                name: "exists".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn test_function_arguments() {
        assert_eq!(
            parse("code.startsWith('AB')"),
            Expression::Function {
                target: Some(ident("code")),
                name: "startsWith".into(),
                args: vec![Expression::Literal(Value::String("AB".into()))],
            }
        );
    }

    #[test]
    fn test_malformed_input_degrades() {
        assert_eq!(parse(""), Expression::Empty);
        assert_eq!(parse("name."), Expression::Identifier("name".into()));
        assert_eq!(parse("(name"), Expression::Identifier("name".into()));
        assert_eq!(parse("name ) )"), Expression::Identifier("name".into()));
    }

    #[test]
    fn test_prefix_not() {
        assert_eq!(parse("not active"), Expression::Not(ident("active")));
    }

    fn height(expression: &Expression) -> usize {
        match expression {
            Expression::Empty | Expression::Literal(_) | Expression::Identifier(_) => 1,
            Expression::Member(target, _) | Expression::Not(target) => height(target) + 1,
            Expression::Function { target, args, .. } => {
                let target = target.as_deref().map_or(0, height);
                args.iter().map(height).max().unwrap_or(0).max(target) + 1
            }
            Expression::Binary { left, right, .. } => height(left).max(height(right)) + 1,
        }
    }

    #[test]
    fn test_deeply_nested_parentheses_degrade() {
        let source = format!("{}true{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(parse(&source), Expression::Empty);

        let shallow = format!("{}true{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse(&shallow), Expression::Literal(Value::Boolean(true)));
    }

    #[test]
    fn test_nesting_limit_applies_to_not_and_arguments() {
        let nots = format!("{}active", "not ".repeat(10_000));
        assert!(height(&parse(&nots)) <= MAX_DEPTH);

        let calls = format!("{}x{}", "a.contains(".repeat(10_000), ")".repeat(10_000));
        assert!(height(&parse(&calls)) <= MAX_DEPTH);
    }

    #[test]
    fn test_long_operator_chains_are_truncated() {
        let source = vec!["true"; 10_000].join(" and ");
        let expr = parse(&source);
        assert_eq!(height(&expr), MAX_DEPTH);

        let members = vec!["name"; 10_000].join(".");
        assert_eq!(height(&parse(&members)), MAX_DEPTH);
    }
}
