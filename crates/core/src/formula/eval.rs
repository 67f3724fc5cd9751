use std::collections::HashMap;

use crate::formula::parser::{BinaryOp, Expr, UnaryOp};
use crate::formula::{functions, FormulaError, Value};

pub fn eval_expr(expr: &Expr, bindings: &HashMap<String, f64>) -> Result<Value, FormulaError> {
    match expr {
        Expr::Number(value) => Ok(Value::Number(*value)),
        Expr::Text(value) => Ok(Value::Text(value.clone())),
        Expr::Ident(name) => resolve_ident(name, bindings),
        Expr::Unary { op: UnaryOp::Negate, operand } => {
            let value = eval_expr(operand, bindings)?.as_number()?;
            Ok(Value::Number(-value))
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, bindings),
        Expr::Call { name, args } => eval_call(name, args, bindings),
    }
}

fn resolve_ident(name: &str, bindings: &HashMap<String, f64>) -> Result<Value, FormulaError> {
    if let Some(value) = bindings.get(name) {
        return Ok(Value::Number(*value));
    }
    match name {
        "PI" => Ok(Value::Number(std::f64::consts::PI)),
        "E" => Ok(Value::Number(std::f64::consts::E)),
        "TRUE" => Ok(Value::Bool(true)),
        "FALSE" => Ok(Value::Bool(false)),
        _ => Err(FormulaError::UnresolvedIdentifier(name.to_string())),
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    bindings: &HashMap<String, f64>,
) -> Result<Value, FormulaError> {
    let left = eval_expr(left, bindings)?;
    let right = eval_expr(right, bindings)?;

    match op {
        BinaryOp::Add => Ok(Value::Number(left.as_number()? + right.as_number()?)),
        BinaryOp::Subtract => Ok(Value::Number(left.as_number()? - right.as_number()?)),
        BinaryOp::Multiply => Ok(Value::Number(left.as_number()? * right.as_number()?)),
        BinaryOp::Divide => Ok(Value::Number(left.as_number()? / right.as_number()?)),
        BinaryOp::Modulo => Ok(Value::Number(left.as_number()? % right.as_number()?)),
        BinaryOp::Power => Ok(Value::Number(left.as_number()?.powf(right.as_number()?))),
        BinaryOp::Eq => Ok(Value::Bool(compare(&left, &right)? == std::cmp::Ordering::Equal)),
        BinaryOp::Ne => Ok(Value::Bool(compare(&left, &right)? != std::cmp::Ordering::Equal)),
        BinaryOp::Lt => Ok(Value::Bool(compare(&left, &right)? == std::cmp::Ordering::Less)),
        BinaryOp::Le => Ok(Value::Bool(compare(&left, &right)? != std::cmp::Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Bool(compare(&left, &right)? == std::cmp::Ordering::Greater)),
        BinaryOp::Ge => Ok(Value::Bool(compare(&left, &right)? != std::cmp::Ordering::Less)),
    }
}

/// Text compares case-insensitively against text; everything else compares
/// numerically. NaN never appears here because inputs are finite bindings
/// and a NaN intermediate fails the numeric total-order check below.
fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, FormulaError> {
    if let (Value::Text(a), Value::Text(b)) = (left, right) {
        return Ok(a.to_lowercase().cmp(&b.to_lowercase()));
    }
    let (a, b) = (left.as_number()?, right.as_number()?);
    a.partial_cmp(&b).ok_or(FormulaError::NonFinite)
}

fn eval_call(
    name: &str,
    args: &[Expr],
    bindings: &HashMap<String, f64>,
) -> Result<Value, FormulaError> {
    // IF evaluates only the branch it takes, so a guarded division like
    // IF(qty = 0, 0, total / qty) stays safe.
    if name == "IF" {
        if args.len() != 3 {
            return Err(FormulaError::WrongArity {
                name: name.to_string(),
                expected: "3",
                got: args.len(),
            });
        }
        let condition = eval_expr(&args[0], bindings)?.is_truthy()?;
        let branch = if condition { &args[1] } else { &args[2] };
        return eval_expr(branch, bindings);
    }

    let values = args
        .iter()
        .map(|arg| eval_expr(arg, bindings))
        .collect::<Result<Vec<_>, _>>()?;
    functions::call(name, &values)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::formula::{evaluate, FormulaError};

    fn bound(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(name, value)| (name.to_string(), *value)).collect()
    }

    #[test]
    fn modulo_and_power_follow_convention() {
        assert_eq!(evaluate("10 % 3", &HashMap::new()).expect("modulo"), 1.0);
        assert_eq!(evaluate("-2 ^ 2", &HashMap::new()).expect("power"), -4.0);
    }

    #[test]
    fn if_does_not_evaluate_the_untaken_branch() {
        let result = evaluate("IF(qty = 0, 0, 100 / qty)", &bound(&[("qty", 0.0)]));
        assert_eq!(result.expect("guarded division"), 0.0);
    }

    #[test]
    fn if_requires_exactly_three_arguments() {
        let error = evaluate("IF(1, 2)", &HashMap::new()).expect_err("arity");
        assert!(matches!(error, FormulaError::WrongArity { .. }));
    }

    #[test]
    fn text_comparison_is_case_insensitive() {
        assert_eq!(
            evaluate("IF(\"Steel\" = \"steel\", 1, 0)", &HashMap::new()).expect("compare"),
            1.0
        );
    }

    #[test]
    fn boolean_results_coerce_to_unit_numbers() {
        assert_eq!(evaluate("2 > 1", &HashMap::new()).expect("comparison"), 1.0);
        assert_eq!(evaluate("(2 > 1) + (3 > 5)", &HashMap::new()).expect("sum"), 1.0);
    }
}
