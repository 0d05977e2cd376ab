//! Preprocessor condition parsing and evaluation.
//!
//! Supports the restricted grammar needed to decide whether a buffer
//! declaration is active:
//! - `defined(NAME)` / `defined NAME`
//! - `NAME` (truthiness of its value, undefined reads as 0)
//! - `NAME OP literal` with OP in `== != < <= > >=`
//! - `!`, `&&`, `||` and parentheses
//!
//! Anything else (arithmetic, function-like macros, the ternary operator,
//! character literals) is rejected instead of being guessed at.

use crate::error::{BufferError, Origin, Result};

use super::env::{MacroEnvironment, MacroValue};

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }
}

/// A parsed condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// An integer literal: `0`, `0x10`, `-1`
    Literal(i64),
    /// A macro reference: `FEATURE`
    Macro(String),
    /// `defined(FEATURE)`
    Defined(String),
    Not(Box<Condition>),
    Compare {
        op: CompareOp,
        lhs: Box<Condition>,
        rhs: Box<Condition>,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// Parse a condition from the text following `#if`/`#elif`.
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(syntax("empty condition", None));
        }

        let mut parser = Parser { tokens, pos: 0 };
        let condition = parser.parse_or()?;

        if let Some(token) = parser.peek() {
            return Err(syntax(
                format!("unexpected '{}' in '{}'", token, input.trim()),
                Some("Only !, &&, ||, comparisons and defined() are supported"),
            ));
        }

        Ok(condition)
    }
}

/// Intermediate value during evaluation.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i64),
    /// A macro whose value is not an integer.
    Text(String),
    /// An undefined identifier; reads as 0, or as its own name in text comparisons.
    Undefined(String),
}

impl Value {
    fn as_int(&self, context: &str) -> Result<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Undefined(_) => Ok(0),
            Value::Text(text) => Err(syntax(
                format!("'{}' is not an integer {}", text, context),
                Some("Text values can only be compared with == or !="),
            )),
        }
    }

    fn as_text(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Text(text) => text.clone(),
            Value::Undefined(name) => name.clone(),
        }
    }
}

/// Condition evaluator bound to a macro environment.
///
/// Evaluation has no side effects; the same condition and environment
/// always produce the same answer.
pub struct ConditionEvaluator<'a> {
    env: &'a MacroEnvironment,
}

impl<'a> ConditionEvaluator<'a> {
    pub fn new(env: &'a MacroEnvironment) -> Self {
        Self { env }
    }

    /// Parse and evaluate a condition in one step.
    pub fn eval_str(&self, input: &str) -> Result<bool> {
        self.eval(&Condition::parse(input)?)
    }

    /// Evaluate a condition to a boolean.
    pub fn eval(&self, condition: &Condition) -> Result<bool> {
        Ok(self.value(condition)?.as_int("in a boolean context")? != 0)
    }

    /// Whether a macro is defined (for `#ifdef`/`#ifndef`).
    pub fn is_defined(&self, name: &str) -> bool {
        self.env.is_defined(name)
    }

    fn value(&self, condition: &Condition) -> Result<Value> {
        match condition {
            Condition::Literal(n) => Ok(Value::Int(*n)),

            Condition::Macro(name) => Ok(match self.env.get(name) {
                None => Value::Undefined(name.clone()),
                Some(MacroValue::Defined) => Value::Int(1),
                Some(MacroValue::Value(text)) => match parse_integer(text.trim()) {
                    Some(n) => Value::Int(n),
                    None if text.trim().is_empty() => {
                        return Err(syntax(
                            format!("macro '{}' is defined without a value", name),
                            Some("Use defined() to test macros defined as empty"),
                        ))
                    }
                    None => Value::Text(text.trim().to_string()),
                },
            }),

            Condition::Defined(name) => Ok(Value::Int(self.env.is_defined(name) as i64)),

            Condition::Not(inner) => {
                let value = self.value(inner)?.as_int("after '!'")?;
                Ok(Value::Int((value == 0) as i64))
            }

            Condition::And(lhs, rhs) => {
                if self.eval(lhs)? {
                    Ok(Value::Int(self.eval(rhs)? as i64))
                } else {
                    Ok(Value::Int(0))
                }
            }

            Condition::Or(lhs, rhs) => {
                if self.eval(lhs)? {
                    Ok(Value::Int(1))
                } else {
                    Ok(Value::Int(self.eval(rhs)? as i64))
                }
            }

            Condition::Compare { op, lhs, rhs } => {
                let lhs = self.value(lhs)?;
                let rhs = self.value(rhs)?;
                Ok(Value::Int(compare(*op, &lhs, &rhs)? as i64))
            }
        }
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool> {
    let textual = matches!(lhs, Value::Text(_)) || matches!(rhs, Value::Text(_));

    if textual {
        if !op.is_equality() {
            let context = format!("for '{}'", op.symbol());
            lhs.as_int(&context)?;
            rhs.as_int(&context)?;
        }
        let equal = lhs.as_text() == rhs.as_text();
        return Ok(if op == CompareOp::Eq { equal } else { !equal });
    }

    let context = format!("for '{}'", op.symbol());
    let (a, b) = (lhs.as_int(&context)?, rhs.as_int(&context)?);
    Ok(match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    })
}

/// Parse a C integer literal: decimal, `0x` hex, `0b` binary or leading-zero octal,
/// with optional `u`/`l` suffixes and a leading sign.
pub fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let digits = digits.trim_end_matches(['u', 'U', 'l', 'L']);
    if digits.is_empty() {
        return None;
    }

    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = digits
        .strip_prefix("0b")
        .or_else(|| digits.strip_prefix("0B"))
    {
        u64::from_str_radix(bin, 2).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<u64>().ok()?
    };

    // Values above i64::MAX wrap like an unsigned preprocessor value would.
    let value = magnitude as i64;
    Some(if negative { value.wrapping_neg() } else { value })
}

fn syntax(message: impl Into<String>, help: Option<&str>) -> BufferError {
    BufferError::Syntax {
        origin: Origin::default(),
        message: message.into(),
        help: help.map(|h| h.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(i64),
    Not,
    AndAnd,
    OrOr,
    LParen,
    RParen,
    Minus,
    Cmp(CompareOp),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "{}", name),
            Token::Number(n) => write!(f, "{}", n),
            Token::Not => write!(f, "!"),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Minus => write!(f, "-"),
            Token::Cmp(op) => write!(f, "{}", op.symbol()),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Cmp(CompareOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::OrOr);
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Cmp(CompareOp::Eq));
                i += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Cmp(CompareOp::Le));
                i += 2;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Cmp(CompareOp::Ge));
                i += 2;
            }
            '<' if next != Some('<') => {
                tokens.push(Token::Cmp(CompareOp::Lt));
                i += 1;
            }
            '>' if next != Some('>') => {
                tokens.push(Token::Cmp(CompareOp::Gt));
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = parse_integer(&text)
                    .ok_or_else(|| syntax(format!("invalid number '{}'", text), None))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(syntax(
                    format!("unsupported character '{}' in '{}'", other, input.trim()),
                    Some("Only !, &&, ||, comparisons and defined() are supported"),
                ));
            }
        }
    }

    Ok(tokens)
}

/// Recursive-descent parser over the token list.
///
/// Precedence, lowest first: `||`, `&&`, comparison, `!`.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(syntax(
                format!("expected '{}', found '{}'", expected, token),
                None,
            )),
            None => Err(syntax(
                format!("expected '{}' at end of condition", expected),
                None,
            )),
        }
    }

    fn parse_or(&mut self) -> Result<Condition> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Condition::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Condition> {
        let mut lhs = self.parse_comparison()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.pos += 1;
            let rhs = self.parse_comparison()?;
            lhs = Condition::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Condition> {
        let lhs = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Cmp(op)) => *op,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_unary()?;

        if let Some(Token::Cmp(next)) = self.peek() {
            return Err(syntax(
                format!("chained comparison '{}' is not supported", next.symbol()),
                Some("Split the comparison with && or ||"),
            ));
        }

        Ok(Condition::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_unary(&mut self) -> Result<Condition> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Condition> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Number(n)) => Ok(Condition::Literal(n)),
            Some(Token::Minus) => match self.next() {
                Some(Token::Number(n)) => Ok(Condition::Literal(n.wrapping_neg())),
                _ => Err(syntax(
                    "'-' is only supported in front of a number",
                    Some("Arithmetic is not supported in buffer conditions"),
                )),
            },
            Some(Token::Ident(name)) if name == "defined" => self.parse_defined(),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    return Err(syntax(
                        format!("function-like macro '{}(...)' is not supported", name),
                        None,
                    ));
                }
                Ok(Condition::Macro(name))
            }
            Some(token) => Err(syntax(format!("unexpected '{}'", token), None)),
            None => Err(syntax("unexpected end of condition", None)),
        }
    }

    fn parse_defined(&mut self) -> Result<Condition> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(Condition::Defined(name)),
            Some(Token::LParen) => match self.next() {
                Some(Token::Ident(name)) => {
                    self.expect(Token::RParen)?;
                    Ok(Condition::Defined(name))
                }
                _ => Err(syntax("defined() requires a macro name", None)),
            },
            _ => Err(syntax("defined requires a macro name", None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(flags: &[&str]) -> MacroEnvironment {
        MacroEnvironment::from_flags(flags.iter().copied()).unwrap()
    }

    fn eval(input: &str, flags: &[&str]) -> bool {
        let env = env(flags);
        ConditionEvaluator::new(&env).eval_str(input).unwrap()
    }

    fn eval_err(input: &str, flags: &[&str]) -> BufferError {
        let env = env(flags);
        ConditionEvaluator::new(&env).eval_str(input).unwrap_err()
    }

    #[test]
    fn test_parse_defined_forms() {
        assert_eq!(
            Condition::parse("defined(FOO)").unwrap(),
            Condition::Defined("FOO".to_string())
        );
        assert_eq!(
            Condition::parse("defined FOO").unwrap(),
            Condition::Defined("FOO".to_string())
        );
    }

    #[test]
    fn test_parse_precedence() {
        let parsed = Condition::parse("A || B && !C").unwrap();
        match parsed {
            Condition::Or(lhs, rhs) => {
                assert_eq!(*lhs, Condition::Macro("A".to_string()));
                assert!(matches!(*rhs, Condition::And(_, _)));
            }
            other => panic!("Expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_defined() {
        assert!(eval("defined(FEATURE)", &["-DFEATURE"]));
        assert!(!eval("defined(FEATURE)", &[]));
        assert!(eval("!defined(FEATURE)", &[]));
    }

    #[test]
    fn test_truthiness() {
        assert!(eval("FEATURE", &["-DFEATURE"]));
        assert!(eval("LEVEL", &["LEVEL=2"]));
        assert!(!eval("LEVEL", &["LEVEL=0"]));
        assert!(!eval("MISSING", &[]));
        assert!(eval("1", &[]));
        assert!(!eval("0", &[]));
    }

    #[test]
    fn test_comparisons() {
        let flags = ["LEVEL=3"];
        assert!(eval("LEVEL == 3", &flags));
        assert!(eval("LEVEL != 4", &flags));
        assert!(eval("LEVEL < 4", &flags));
        assert!(eval("LEVEL <= 3", &flags));
        assert!(eval("LEVEL > 2", &flags));
        assert!(eval("LEVEL >= 3", &flags));
        assert!(!eval("LEVEL > 3", &flags));
    }

    #[test]
    fn test_undefined_compares_as_zero() {
        assert!(eval("MISSING == 0", &[]));
        assert!(eval("MISSING < 1", &[]));
        assert!(eval("MISSING > -1", &[]));
    }

    #[test]
    fn test_number_bases() {
        assert!(eval("MASK == 0x10", &["MASK=16"]));
        assert!(eval("MASK == 020", &["MASK=16"]));
        assert!(eval("MASK == 0b10000", &["MASK=16"]));
        assert!(eval("MASK == 16UL", &["MASK=0x10"]));
    }

    #[test]
    fn test_text_values_compare_by_equality() {
        let flags = ["BOARD=stm32"];
        assert!(eval("BOARD == stm32", &flags));
        assert!(!eval("BOARD == esp32", &flags));
        assert!(eval("BOARD != esp32", &flags));
    }

    #[test]
    fn test_text_values_reject_ordering() {
        let err = eval_err("BOARD > 1", &["BOARD=stm32"]);
        assert!(matches!(err, BufferError::Syntax { .. }));
    }

    #[test]
    fn test_logic_and_nesting() {
        let flags = ["-DA", "LEVEL=2"];
        assert!(eval("defined(A) && (LEVEL == 2 || defined(B))", &flags));
        assert!(!eval("defined(A) && !(LEVEL == 2 || defined(B))", &flags));
        assert!(eval("((A))", &flags));
    }

    #[test]
    fn test_not_binds_tighter_than_comparison() {
        // (!A) == 0, as in C
        assert!(eval("!A == 0", &["-DA"]));
    }

    #[test]
    fn test_short_circuit_skips_invalid_operand() {
        // BOARD is text; the right-hand side is never evaluated
        assert!(!eval("defined(NOPE) && BOARD", &["BOARD=stm32"]));
        assert!(eval("defined(BOARD) || BOARD", &["BOARD=stm32"]));
    }

    #[test]
    fn test_rejects_unsupported_constructs() {
        for input in [
            "A + 1",
            "A ? 1 : 0",
            "FOO(1)",
            "A == 'x'",
            "1 < 2 < 3",
            "A &",
            "",
            "(A",
            "defined()",
            "A << 2",
        ] {
            let err = Condition::parse(input);
            assert!(err.is_err(), "expected '{}' to be rejected", input);
        }
    }

    #[test]
    fn test_empty_value_in_boolean_context_is_error() {
        let err = eval_err("EMPTY", &["EMPTY="]);
        assert!(matches!(err, BufferError::Syntax { .. }));
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer("-42"), Some(-42));
        assert_eq!(parse_integer("0xff"), Some(255));
        assert_eq!(parse_integer("017"), Some(15));
        assert_eq!(parse_integer("0"), Some(0));
        assert_eq!(parse_integer("10u"), Some(10));
        assert_eq!(parse_integer("abc"), None);
        assert_eq!(parse_integer(""), None);
    }
}
