use crate::connector::{ConnectorId, Informant};
use crate::constraint::ConstraintKind;
use crate::error::{ParseError, PropagationError, PropagationResult};
use crate::network::{Network, NetworkSettings};
use anyhow::Context;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// --- AST ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, ConstraintKind, Box<Expr>),
}

impl Expr {
    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Binary(left, _, right) => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
        }
    }
}

/// `lhs = rhs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    pub lhs: Expr,
    pub rhs: Expr,
}

impl Equation {
    /// Distinct variable names in order of first appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.lhs.collect_variables(&mut out);
        self.rhs.collect_variables(&mut out);
        out
    }
}

// --- Network builder ---

/// Materializes equations into a network.
///
/// Variable names map to one shared connector each, across every equation
/// added to the same builder. Literals get a fresh connector pinned by a
/// constant; operators get a fresh output connector and the matching
/// constraint. The two sides of an equation are tied by `lhs + 0 = rhs`.
#[derive(Debug, Clone)]
pub struct NetworkBuilder {
    pub network: Network<f64>,
    pub var_map: HashMap<String, ConnectorId>,
    user: Informant,
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::with_settings(NetworkSettings::default())
    }

    pub fn with_settings(settings: NetworkSettings) -> Self {
        let mut network = Network::with_settings(settings);
        let user = network.user();
        Self {
            network,
            var_map: HashMap::new(),
            user,
        }
    }

    /// The external informant used by `set` and `forget`.
    pub fn user(&self) -> Informant {
        self.user
    }

    /// Shared connector for `name`, created on first use.
    pub fn variable(&mut self, name: &str) -> ConnectorId {
        if let Some(&id) = self.var_map.get(name) {
            return id;
        }
        let id = self.network.new_connector();
        self.var_map.insert(name.to_string(), id);
        id
    }

    pub fn build_expr(&mut self, expr: &Expr) -> PropagationResult<ConnectorId> {
        match expr {
            Expr::Number(n) => {
                let connector = self.network.new_connector();
                self.network.constant(*n, connector)?;
                Ok(connector)
            }
            Expr::Variable(name) => Ok(self.variable(name)),
            Expr::Binary(left, kind, right) => {
                let left = self.build_expr(left)?;
                let right = self.build_expr(right)?;
                let output = self.network.new_connector();
                self.network.constraint(*kind, &[left, right], output)?;
                Ok(output)
            }
        }
    }

    pub fn add_equation(&mut self, equation: &Equation) -> PropagationResult<()> {
        let lhs = self.build_expr(&equation.lhs)?;
        let rhs = self.build_expr(&equation.rhs)?;
        let zero = self.network.new_connector();
        self.network.constant(0.0, zero)?;
        self.network.adder(&[lhs, zero], rhs)?;
        debug!(
            "equation over {:?} built ({} connectors)",
            equation.variables(),
            self.network.connector_count()
        );
        Ok(())
    }

    /// Supplies a known value for `name`.
    pub fn set(&mut self, name: &str, value: f64) -> PropagationResult<()> {
        let id = self.variable(name);
        self.network.set_value(id, value, self.user)
    }

    /// Retracts a value previously supplied with `set`.
    pub fn forget(&mut self, name: &str) -> PropagationResult<()> {
        match self.var_map.get(name) {
            Some(&id) => self.network.forget_value(id, self.user),
            None => Ok(()),
        }
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.var_map
            .get(name)
            .map_or(false, |&id| self.network.has_value(id))
    }

    pub fn value(&self, name: &str) -> PropagationResult<f64> {
        self.var_map
            .get(name)
            .and_then(|&id| self.network.get_value(id).ok())
            .ok_or_else(|| PropagationError::UnknownValue(name.to_string()))
    }

    /// Every variable that currently holds a value.
    pub fn values(&self) -> BTreeMap<String, f64> {
        self.var_map
            .iter()
            .filter_map(|(name, &id)| {
                self.network
                    .get_value(id)
                    .ok()
                    .map(|value| (name.clone(), value))
            })
            .collect()
    }

    /// Variable names, sorted.
    pub fn variables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.var_map.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Builds every equation into one network, supplies the known values and
/// reads back `unknown`.
pub fn solve(
    equations: &[Equation],
    unknown: &str,
    known: &HashMap<String, f64>,
) -> PropagationResult<f64> {
    let mut builder = NetworkBuilder::new();
    for equation in equations {
        builder.add_equation(equation)?;
    }
    let mut known: Vec<(&String, &f64)> = known.iter().collect();
    known.sort_by(|a, b| a.0.cmp(b.0));
    for (name, value) in known {
        builder.set(name, *value)?;
    }
    builder.value(unknown)
}

/// Parses each equation string, then `solve`s.
pub fn solve_str<S: AsRef<str>>(
    equations: &[S],
    unknown: &str,
    known: &HashMap<String, f64>,
) -> anyhow::Result<f64> {
    let parsed = equations
        .iter()
        .map(|src| {
            let src = src.as_ref();
            parse_equation(src).with_context(|| format!("Failed to parse equation '{src}'"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let value = solve(&parsed, unknown, known)
        .with_context(|| format!("Failed to solve for '{unknown}'"))?;
    Ok(value)
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parses `lhs = rhs`.
pub fn parse_equation(input: &str) -> Result<Equation, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.iter().filter(|t| **t == Token::Equals).count() != 1 {
        return Err(ParseError::MissingEquals);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let lhs = parser.parse_expression()?;
    match parser.consume() {
        Some(Token::Equals) => {}
        Some(other) => {
            return Err(ParseError::UnexpectedToken {
                found: format!("{other:?}"),
                expected: "'='",
            })
        }
        None => return Err(ParseError::UnexpectedEnd("'='")),
    }
    let rhs = parser.parse_expression()?;
    parser.expect_end()?;
    Ok(Equation { lhs, rhs })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Equals,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                pos += 1;
            }
            // Exponent only when digits follow, so `2e` stays `2` then `e`.
            if pos < chars.len() && (chars[pos] == 'e' || chars[pos] == 'E') {
                let mut look = pos + 1;
                if look < chars.len() && (chars[look] == '+' || chars[look] == '-') {
                    look += 1;
                }
                if look < chars.len() && chars[look].is_ascii_digit() {
                    pos = look;
                    while pos < chars.len() && chars[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
            }
            let text: String = chars[start..pos].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ParseError::InvalidNumber(text.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() {
            let start = pos;
            while pos < chars.len()
                && (chars[pos].is_alphanumeric() || chars[pos] == '_' || chars[pos] == '$')
            {
                pos += 1;
            }
            tokens.push(Token::Identifier(chars[start..pos].iter().collect()));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                '=' => Token::Equals,
                _ => return Err(ParseError::UnexpectedChar { ch: c, pos }),
            };
            tokens.push(token);
            pos += 1;
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(Token::Caret) => Err(ParseError::UnsupportedOperator('^')),
            Some(token) => Err(ParseError::UnexpectedToken {
                found: format!("{token:?}"),
                expected: "end of input",
            }),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_factor()?;

        while let Some(token) = self.peek() {
            let kind = match token {
                Token::Plus => ConstraintKind::Adder,
                Token::Minus => ConstraintKind::Subtracter,
                _ => break,
            };
            self.consume();
            let right = self.parse_factor()?;
            left = Expr::Binary(Box::new(left), kind, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let kind = match token {
                Token::Star => ConstraintKind::Multiplier,
                Token::Slash => ConstraintKind::Divider,
                Token::Caret => return Err(ParseError::UnsupportedOperator('^')),
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), kind, Box::new(right));
        }
        Ok(left)
    }

    /// `-literal` folds into the literal; `-expr` becomes `0 - expr`.
    /// A leading `+` is dropped.
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if let Some(Token::Plus) = self.peek() {
            self.consume();
            return self.parse_unary();
        }
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let operand = self.parse_unary()?;
            return Ok(match operand {
                Expr::Number(n) => Expr::Number(-n),
                other => Expr::Binary(
                    Box::new(Expr::Number(0.0)),
                    ConstraintKind::Subtracter,
                    Box::new(other),
                ),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    Err(ParseError::UnsupportedCall(name))
                } else if name.eq_ignore_ascii_case("pi") {
                    Ok(Expr::Number(std::f64::consts::PI))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(expr),
                    Some(other) => Err(ParseError::UnexpectedToken {
                        found: format!("{other:?}"),
                        expected: "')'",
                    }),
                    None => Err(ParseError::UnexpectedEnd("')'")),
                }
            }
            Some(Token::Caret) => Err(ParseError::UnsupportedOperator('^')),
            Some(other) => Err(ParseError::UnexpectedToken {
                found: format!("{other:?}"),
                expected: "number, variable or '('",
            }),
            None => Err(ParseError::UnexpectedEnd("number, variable or '('")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Variable(name.to_string()))
    }

    fn equations(sources: &[&str]) -> Vec<Equation> {
        sources
            .iter()
            .map(|src| parse_equation(src).expect("equation should parse"))
            .collect()
    }

    #[test]
    fn parse_respects_precedence_and_associativity() {
        let expr = parse("a + b * c - d").expect("parse");
        let expected = Expr::Binary(
            Box::new(Expr::Binary(
                var("a"),
                ConstraintKind::Adder,
                Box::new(Expr::Binary(var("b"), ConstraintKind::Multiplier, var("c"))),
            )),
            ConstraintKind::Subtracter,
            var("d"),
        );
        assert_eq!(expr, expected);

        let grouped = parse("(a + b) / c").expect("parse");
        assert!(matches!(
            grouped,
            Expr::Binary(_, ConstraintKind::Divider, _)
        ));
    }

    #[test]
    fn parse_handles_signed_and_scientific_literals() {
        assert_eq!(parse("-9").expect("parse"), Expr::Number(-9.0));
        assert_eq!(parse("1.5e-3").expect("parse"), Expr::Number(1.5e-3));
        assert_eq!(parse("2E2").expect("parse"), Expr::Number(200.0));
        assert_eq!(
            parse("-x").expect("parse"),
            Expr::Binary(
                Box::new(Expr::Number(0.0)),
                ConstraintKind::Subtracter,
                var("x")
            )
        );
        // `2e` is not an exponent.
        assert!(parse("2e").is_err());
    }

    #[test]
    fn parse_accepts_leading_plus() {
        assert_eq!(parse("+9").expect("parse"), Expr::Number(9.0));
        assert_eq!(parse("+x").expect("parse"), Expr::Variable("x".to_string()));
        assert_eq!(
            parse("-9 + +1").expect("parse"),
            Expr::Binary(
                Box::new(Expr::Number(-9.0)),
                ConstraintKind::Adder,
                Box::new(Expr::Number(1.0))
            )
        );
        let eq = parse_equation("x = +5").expect("parse");
        assert_eq!(eq.rhs, Expr::Number(5.0));
    }

    #[test]
    fn pi_is_a_constant_not_a_variable() {
        assert_eq!(parse("PI").expect("parse"), Expr::Number(std::f64::consts::PI));
        assert_eq!(parse("pi").expect("parse"), Expr::Number(std::f64::consts::PI));
        assert_eq!(parse("-PI").expect("parse"), Expr::Number(-std::f64::consts::PI));

        let eq = parse_equation("c = 2 * PI * r").expect("parse");
        assert_eq!(eq.variables(), vec!["c", "r"]);
        let known = HashMap::from([("r".to_string(), 1.0)]);
        let c = solve(&[eq], "c", &known).expect("c");
        assert_eq!(c, 2.0 * std::f64::consts::PI);
        assert_eq!(
            parse("pivot").expect("parse"),
            Expr::Variable("pivot".to_string())
        );
    }

    #[test]
    fn parse_accepts_identifier_characters() {
        let eq = parse_equation("3 + x = 5 * y_2").expect("parse");
        assert_eq!(eq.variables(), vec!["x", "y_2"]);
        let eq = parse_equation("total$ = a + a").expect("parse");
        assert_eq!(eq.variables(), vec!["total$", "a"]);
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert_eq!(parse_equation("a + b"), Err(ParseError::MissingEquals));
        assert_eq!(parse_equation("a = b = c"), Err(ParseError::MissingEquals));
        assert_eq!(parse("a ^ 2"), Err(ParseError::UnsupportedOperator('^')));
        assert_eq!(
            parse("sin(x)"),
            Err(ParseError::UnsupportedCall("sin".to_string()))
        );
        assert_eq!(
            parse("a # b"),
            Err(ParseError::UnexpectedChar { ch: '#', pos: 2 })
        );
        assert_eq!(parse("(a + b"), Err(ParseError::UnexpectedEnd("')'")));
        assert!(matches!(
            parse("a b"),
            Err(ParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(parse("1.2.3"), Err(ParseError::InvalidNumber(_))));
    }

    #[test]
    fn solve_force_for_acceleration() {
        let eqs = equations(&["F = m*a", "F = 10", "m = 2.0"]);
        assert_eq!(solve(&eqs, "a", &HashMap::new()), Ok(5.0));
    }

    #[test]
    fn solve_subtraction_for_subtrahend() {
        let eqs = equations(&["A - B = C", "A = 10", "C = 2"]);
        assert_eq!(solve(&eqs, "B", &HashMap::new()), Ok(8.0));
    }

    #[test]
    fn solve_division_for_dividend() {
        let eqs = equations(&["A / B = C", "B = 10", "C = 2"]);
        assert_eq!(solve(&eqs, "A", &HashMap::new()), Ok(20.0));
    }

    #[test]
    fn solve_uses_known_values() {
        let eqs = equations(&["F = m*a"]);
        let known = HashMap::from([("F".to_string(), 10.0), ("a".to_string(), 4.0)]);
        assert_eq!(solve(&eqs, "m", &known), Ok(2.5));
    }

    #[test]
    fn solve_reports_undetermined_unknown() {
        let eqs = equations(&["F = m*a", "F = 10"]);
        assert_eq!(
            solve(&eqs, "a", &HashMap::new()),
            Err(PropagationError::UnknownValue("a".to_string()))
        );
        assert_eq!(
            solve(&eqs, "missing", &HashMap::new()),
            Err(PropagationError::UnknownValue("missing".to_string()))
        );
    }

    #[test]
    fn solve_surfaces_contradictions() {
        let eqs = equations(&["x = 1", "x = 2"]);
        let result = solve(&eqs, "x", &HashMap::new());
        assert!(matches!(result, Err(PropagationError::Contradiction { .. })));
    }

    #[test]
    fn solve_str_reports_parse_failures_with_context() {
        let err = solve_str(&["F = m *"], "F", &HashMap::new()).expect_err("bad input");
        let message = format!("{err:#}");
        assert!(message.contains("Failed to parse equation 'F = m *'"));

        let value = solve_str(&["y = 2 * x + 1", "x = 3"], "y", &HashMap::new())
            .expect("solvable");
        assert_eq!(value, 7.0);
    }

    #[test]
    fn celsius_fahrenheit_from_text() {
        let eqs = ["9 * c = 5 * (f - 32)"];
        let known = HashMap::from([("f".to_string(), 212.0)]);
        let c = solve_str(&eqs, "c", &known).expect("c");
        assert!((c - 100.0).abs() < 1e-12);

        let known = HashMap::from([("c".to_string(), 100.0)]);
        let f = solve_str(&eqs, "f", &known).expect("f");
        assert!((f - 212.0).abs() < 1e-12);
    }

    #[test]
    fn builder_shares_connectors_and_retracts() {
        let mut builder = NetworkBuilder::new();
        for eq in equations(&["d = r * t", "r = 3"]) {
            builder.add_equation(&eq).expect("build");
        }
        assert_eq!(builder.variables(), vec!["d", "r", "t"]);

        builder.set("t", 4.0).expect("t");
        assert_eq!(builder.value("d"), Ok(12.0));
        assert_eq!(
            builder.values(),
            BTreeMap::from([
                ("d".to_string(), 12.0),
                ("r".to_string(), 3.0),
                ("t".to_string(), 4.0),
            ])
        );

        builder.forget("t").expect("forget");
        assert!(!builder.has_value("t"));
        assert!(!builder.has_value("d"));
        assert!(builder.has_value("r"), "equation-pinned values stay");

        builder.set("d", 6.0).expect("d");
        assert_eq!(builder.value("t"), Ok(2.0));
    }
}
