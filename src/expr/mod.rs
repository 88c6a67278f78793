// =============================================================================
// Expression evaluator — curated arithmetic/boolean mini-language
// =============================================================================
//
// Backs the Strategy decision engine's rule conditions and value expressions
// (spec.md §4.5, §9 Open Question (a): "a small, sandboxed expression
// evaluator" rather than free-form code execution or a compiled-plugin
// table). No loops, no function calls, no I/O: identifiers resolve against a
// flat numeric environment and the grammar is closed over +,-,*,/,
// comparisons, && / || / !, and parentheses. Idiom follows the match-over-
// enum style visible throughout `indicators::*`.

use std::collections::HashMap;
use std::fmt;

pub type Env = HashMap<String, f64>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    UnexpectedEnd,
    UnexpectedToken(String),
    UnknownVariable(String),
    DivisionByZero,
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd => write!(f, "unexpected end of expression"),
            Self::UnexpectedToken(t) => write!(f, "unexpected token: {t}"),
            Self::UnknownVariable(v) => write!(f, "unknown variable: {v}"),
            Self::DivisionByZero => write!(f, "division by zero"),
        }
    }
}

impl std::error::Error for ExprError {}

/// Truthiness for the numeric-only value model: zero is false, anything else
/// is true (booleans are represented as 1.0/0.0 throughout).
pub fn is_truthy(v: f64) -> bool {
    v != 0.0
}

pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError::UnexpectedToken(parser.tokens[parser.pos].clone()));
    }
    Ok(expr)
}

pub fn eval(expr: &Expr, env: &Env) -> Result<f64, ExprError> {
    match expr {
        Expr::Num(n) => Ok(*n),
        Expr::Var(name) => env.get(name).copied().ok_or_else(|| ExprError::UnknownVariable(name.clone())),
        Expr::Not(inner) => Ok(if is_truthy(eval(inner, env)?) { 0.0 } else { 1.0 }),
        Expr::Neg(inner) => Ok(-eval(inner, env)?),
        Expr::BinOp(lhs, op, rhs) => {
            // && / || short-circuit.
            match op {
                BinOp::And => {
                    let l = eval(lhs, env)?;
                    if !is_truthy(l) {
                        return Ok(0.0);
                    }
                    return Ok(if is_truthy(eval(rhs, env)?) { 1.0 } else { 0.0 });
                }
                BinOp::Or => {
                    let l = eval(lhs, env)?;
                    if is_truthy(l) {
                        return Ok(1.0);
                    }
                    return Ok(if is_truthy(eval(rhs, env)?) { 1.0 } else { 0.0 });
                }
                _ => {}
            }
            let l = eval(lhs, env)?;
            let r = eval(rhs, env)?;
            Ok(match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => {
                    if r == 0.0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    l / r
                }
                BinOp::Eq => bool_f64(l == r),
                BinOp::Ne => bool_f64(l != r),
                BinOp::Lt => bool_f64(l < r),
                BinOp::Le => bool_f64(l <= r),
                BinOp::Gt => bool_f64(l > r),
                BinOp::Ge => bool_f64(l >= r),
                BinOp::And | BinOp::Or => unreachable!("short-circuited above"),
            })
        }
    }
}

fn bool_f64(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

// -------------------------------------------------------------------------
// Tokenizer
// -------------------------------------------------------------------------

fn tokenize(src: &str) -> Result<Vec<String>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit()) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
            continue;
        }
        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        if ["&&", "||", "==", "!=", "<=", ">="].contains(&two.as_str()) {
            tokens.push(two);
            i += 2;
            continue;
        }
        if "+-*/()<>!".contains(c) {
            tokens.push(c.to_string());
            i += 1;
            continue;
        }
        return Err(ExprError::UnexpectedToken(c.to_string()));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn advance(&mut self) -> Option<String> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: &str) -> Result<(), ExprError> {
        match self.advance() {
            Some(t) if t == tok => Ok(()),
            Some(t) => Err(ExprError::UnexpectedToken(t)),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some("||") {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_comparison()?;
        while self.peek() == Some("&&") {
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some("==") => Some(BinOp::Eq),
            Some("!=") => Some(BinOp::Ne),
            Some("<") => Some(BinOp::Lt),
            Some("<=") => Some(BinOp::Le),
            Some(">") => Some(BinOp::Gt),
            Some(">=") => Some(BinOp::Ge),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let rhs = self.parse_additive()?;
                Ok(Expr::BinOp(Box::new(lhs), op, Box::new(rhs)))
            }
            None => Ok(lhs),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            match self.peek() {
                Some("+") => {
                    self.advance();
                    let rhs = self.parse_multiplicative()?;
                    lhs = Expr::BinOp(Box::new(lhs), BinOp::Add, Box::new(rhs));
                }
                Some("-") => {
                    self.advance();
                    let rhs = self.parse_multiplicative()?;
                    lhs = Expr::BinOp(Box::new(lhs), BinOp::Sub, Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek() {
                Some("*") => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::BinOp(Box::new(lhs), BinOp::Mul, Box::new(rhs));
                }
                Some("/") => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    lhs = Expr::BinOp(Box::new(lhs), BinOp::Div, Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some("!") => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some("-") => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some(tok) if tok == "(" => {
                let inner = self.parse_or()?;
                self.expect(")")?;
                Ok(inner)
            }
            Some(tok) if tok.chars().next().map(|c| c.is_ascii_digit() || c == '.').unwrap_or(false) => {
                tok.parse::<f64>().map(Expr::Num).map_err(|_| ExprError::UnexpectedToken(tok))
            }
            Some(tok) if tok.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false) => {
                Ok(Expr::Var(tok))
            }
            Some(tok) => Err(ExprError::UnexpectedToken(tok)),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, f64)]) -> Env {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn evaluates_arithmetic() {
        let e = parse("2 + 3 * 4").unwrap();
        assert_eq!(eval(&e, &Env::new()).unwrap(), 14.0);
    }

    #[test]
    fn evaluates_comparison() {
        let e = parse("rsi < 30").unwrap();
        assert_eq!(eval(&e, &env(&[("rsi", 20.0)])).unwrap(), 1.0);
        assert_eq!(eval(&e, &env(&[("rsi", 40.0)])).unwrap(), 0.0);
    }

    #[test]
    fn evaluates_and_or_short_circuit() {
        let e = parse("rsi < 30 && change_percent > 0").unwrap();
        assert_eq!(eval(&e, &env(&[("rsi", 20.0), ("change_percent", 1.0)])).unwrap(), 1.0);
        assert_eq!(eval(&e, &env(&[("rsi", 20.0), ("change_percent", -1.0)])).unwrap(), 0.0);
    }

    #[test]
    fn respects_operator_precedence_with_parens() {
        let e = parse("(cash - margin_used) / price").unwrap();
        let v = eval(&e, &env(&[("cash", 1000.0), ("margin_used", 200.0), ("price", 100.0)])).unwrap();
        assert_eq!(v, 8.0);
    }

    #[test]
    fn unary_not_and_neg() {
        assert_eq!(eval(&parse("!0").unwrap(), &Env::new()).unwrap(), 1.0);
        assert_eq!(eval(&parse("!1").unwrap(), &Env::new()).unwrap(), 0.0);
        assert_eq!(eval(&parse("-5 + 10").unwrap(), &Env::new()).unwrap(), 5.0);
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let e = parse("missing_var").unwrap();
        assert!(eval(&e, &Env::new()).is_err());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let e = parse("1 / 0").unwrap();
        assert!(eval(&e, &Env::new()).is_err());
    }

    #[test]
    fn malformed_expression_fails_to_parse() {
        assert!(parse("1 +").is_err());
        assert!(parse("(1 + 2").is_err());
    }
}
