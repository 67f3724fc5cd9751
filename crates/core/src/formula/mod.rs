//! Formula engine: a lexer and recursive-descent parser producing an
//! expression tree, and a tree-walking interpreter over a fixed builtin
//! table. There is deliberately no dynamic code generation, and this is the
//! single canonical evaluator for both pricing and settings validation.

pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;

use std::collections::HashMap;

use thiserror::Error;

pub use parser::{BinaryOp, Expr, UnaryOp};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum FormulaError {
    #[error("unexpected character `{0}` in formula")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid number literal `{0}`")]
    InvalidNumber(String),
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("unexpected token `{0}`")]
    UnexpectedToken(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("function `{name}` expects {expected} argument(s), got {got}")]
    WrongArity { name: String, expected: &'static str, got: usize },
    #[error("unresolved identifier `{0}`")]
    UnresolvedIdentifier(String),
    #[error("expected a number, got `{0}`")]
    NotANumber(String),
    #[error("formula produced a non-finite result")]
    NonFinite,
}

/// Runtime value. Formulas are numeric at the boundary, but string literals
/// and the text builtins need text, and comparisons produce booleans.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    pub fn as_number(&self) -> Result<f64, FormulaError> {
        match self {
            Self::Number(value) => Ok(*value),
            Self::Bool(value) => Ok(if *value { 1.0 } else { 0.0 }),
            Self::Text(value) => value
                .trim()
                .parse()
                .map_err(|_| FormulaError::NotANumber(value.clone())),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::Number(value) => format!("{value}"),
            Self::Text(value) => value.clone(),
            Self::Bool(value) => if *value { "TRUE" } else { "FALSE" }.to_string(),
        }
    }

    pub fn is_truthy(&self) -> Result<bool, FormulaError> {
        match self {
            Self::Bool(value) => Ok(*value),
            _ => Ok(self.as_number()? != 0.0),
        }
    }
}

/// Parses formula text into an expression tree. A leading `=` is stripped,
/// matching how formulas arrive from settings documents.
pub fn parse(formula: &str) -> Result<Expr, FormulaError> {
    let source = formula.trim();
    let source = source.strip_prefix('=').unwrap_or(source).trim_start();
    if source.is_empty() {
        return Err(FormulaError::UnexpectedEnd);
    }
    let tokens = lexer::tokenize(source)?;
    parser::Parser::new(tokens).parse()
}

/// Evaluates formula text against bound parameter values. Pure and
/// deterministic; every failure mode comes back as a [`FormulaError`], never
/// a panic. Non-finite results (division by zero, overflow) are rejected so
/// callers can fall back to a last-known price.
pub fn evaluate(formula: &str, bindings: &HashMap<String, f64>) -> Result<f64, FormulaError> {
    let expr = parse(formula)?;
    evaluate_expr(&expr, bindings)
}

/// Evaluates an already-parsed tree, for callers that parse once and reuse.
pub fn evaluate_expr(expr: &Expr, bindings: &HashMap<String, f64>) -> Result<f64, FormulaError> {
    let result = eval::eval_expr(expr, bindings)?.as_number()?;
    if !result.is_finite() {
        return Err(FormulaError::NonFinite);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{evaluate, parse, FormulaError};

    fn bindings(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(name, value)| (name.to_string(), *value)).collect()
    }

    #[test]
    fn quantity_times_cost_with_margin_rounds_to_cents() {
        let bound = bindings(&[("qty", 50.0), ("unit_cost", 45.0), ("margin", 1.25)]);
        let price = evaluate("ROUND(qty*unit_cost*margin,2)", &bound).expect("evaluate");
        assert_eq!(price, 2812.5);
    }

    #[test]
    fn leading_equals_sign_is_stripped() {
        let price = evaluate("= 2 + 3 * 4", &HashMap::new()).expect("evaluate");
        assert_eq!(price, 14.0);
    }

    #[test]
    fn repeated_evaluation_is_deterministic() {
        let bound = bindings(&[("base", 120.0), ("rate", 0.18)]);
        let first = evaluate("VAT(base, rate * 100)", &bound).expect("first");
        let second = evaluate("VAT(base, rate * 100)", &bound).expect("second");
        assert_eq!(first, second);
        assert!((first - 141.6).abs() < 1e-9);
    }

    #[test]
    fn unresolved_identifier_is_an_error_not_a_panic() {
        let error = evaluate("qty * unit_cost", &bindings(&[("qty", 2.0)]))
            .expect_err("unbound identifier");
        assert_eq!(error, FormulaError::UnresolvedIdentifier("unit_cost".to_string()));
    }

    #[test]
    fn division_by_zero_is_rejected_as_non_finite() {
        let error = evaluate("100 / qty", &bindings(&[("qty", 0.0)])).expect_err("divide by zero");
        assert_eq!(error, FormulaError::NonFinite);
    }

    #[test]
    fn malformed_formula_is_a_parse_error() {
        assert!(parse("1 + * 2").is_err());
        assert!(parse("MAX(1, ").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn constants_are_available_unless_shadowed_by_a_binding() {
        let tau = evaluate("2 * PI", &HashMap::new()).expect("constant");
        assert!((tau - std::f64::consts::TAU).abs() < 1e-12);

        let shadowed = evaluate("2 * PI", &bindings(&[("PI", 3.0)])).expect("shadowed");
        assert_eq!(shadowed, 6.0);
    }

    #[test]
    fn text_result_that_is_not_numeric_is_rejected() {
        let error = evaluate("UPPER(\"steel\")", &HashMap::new()).expect_err("text result");
        assert!(matches!(error, FormulaError::NotANumber(_)));
    }

    #[test]
    fn conditional_pricing_branches_on_quantity() {
        let small = evaluate("IF(qty >= 100, 8.5, 11)", &bindings(&[("qty", 40.0)]));
        let bulk = evaluate("IF(qty >= 100, 8.5, 11)", &bindings(&[("qty", 250.0)]));
        assert_eq!(small.expect("small"), 11.0);
        assert_eq!(bulk.expect("bulk"), 8.5);
    }
}
