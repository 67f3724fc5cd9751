//! Fixed builtin-function table. Names are uppercase; unknown names are
//! rejected rather than treated as identifiers.

use crate::formula::{FormulaError, Value};

pub fn call(name: &str, args: &[Value]) -> Result<Value, FormulaError> {
    match name {
        // Arithmetic.
        "SQRT" => unary(name, args, f64::sqrt),
        "ABS" => unary(name, args, f64::abs),
        "EXP" => unary(name, args, f64::exp),
        "LN" => unary(name, args, f64::ln),
        "LOG" => log(name, args),
        "POWER" => binary(name, args, f64::powf),
        "MAX" => fold(name, args, f64::max),
        "MIN" => fold(name, args, f64::min),

        // Trigonometry.
        "SIN" => unary(name, args, f64::sin),
        "COS" => unary(name, args, f64::cos),
        "TAN" => unary(name, args, f64::tan),
        "ASIN" => unary(name, args, f64::asin),
        "ACOS" => unary(name, args, f64::acos),
        "ATAN" => unary(name, args, f64::atan),
        "ATAN2" => binary(name, args, f64::atan2),

        // Rounding.
        "ROUND" => round_digits(name, args, |value| value.round()),
        "ROUNDUP" => round_digits(name, args, |value| value.abs().ceil().copysign(value)),
        "ROUNDDOWN" | "TRUNC" => round_digits(name, args, f64::trunc),
        "CEILING" => significance(name, args, f64::ceil),
        "FLOOR" => significance(name, args, f64::floor),

        // Aggregates.
        "SUM" => {
            let numbers = numeric_args(name, args, 1)?;
            Ok(Value::Number(numbers.iter().sum()))
        }
        "AVERAGE" => {
            let numbers = numeric_args(name, args, 1)?;
            Ok(Value::Number(numbers.iter().sum::<f64>() / numbers.len() as f64))
        }
        "COUNT" => {
            let numeric = args.iter().filter(|value| value.as_number().is_ok()).count();
            Ok(Value::Number(numeric as f64))
        }
        "COUNTA" => {
            let non_empty = args
                .iter()
                .filter(|value| !matches!(value, Value::Text(text) if text.is_empty()))
                .count();
            Ok(Value::Number(non_empty as f64))
        }
        "SUMPRODUCT" => sumproduct(name, args),

        // Logic. IF is handled by the interpreter so branches stay lazy.
        "AND" => {
            let mut all = true;
            for value in required(name, args, 1)? {
                all &= value.is_truthy()?;
            }
            Ok(Value::Bool(all))
        }
        "OR" => {
            let mut any = false;
            for value in required(name, args, 1)? {
                any |= value.is_truthy()?;
            }
            Ok(Value::Bool(any))
        }
        "NOT" => {
            exact(name, args, 1)?;
            Ok(Value::Bool(!args[0].is_truthy()?))
        }

        // Text.
        "LEN" => {
            exact(name, args, 1)?;
            Ok(Value::Number(args[0].as_text().chars().count() as f64))
        }
        "UPPER" => {
            exact(name, args, 1)?;
            Ok(Value::Text(args[0].as_text().to_uppercase()))
        }
        "LOWER" => {
            exact(name, args, 1)?;
            Ok(Value::Text(args[0].as_text().to_lowercase()))
        }
        "LEFT" => {
            let (text, count) = text_and_count(name, args)?;
            Ok(Value::Text(text.chars().take(count).collect()))
        }
        "RIGHT" => {
            let (text, count) = text_and_count(name, args)?;
            let length = text.chars().count();
            Ok(Value::Text(text.chars().skip(length.saturating_sub(count)).collect()))
        }
        "MID" => {
            exact(name, args, 3)?;
            let text = args[0].as_text();
            let start = index_arg(&args[1])?;
            let count = index_arg(&args[2])?;
            // 1-based start, per the spreadsheet convention.
            Ok(Value::Text(text.chars().skip(start.saturating_sub(1)).take(count).collect()))
        }

        // Business helpers. Percentages are whole numbers (25 means 25%).
        "MARGIN" => {
            let (cost, pct) = two_numbers(name, args)?;
            Ok(Value::Number(cost / (1.0 - pct / 100.0)))
        }
        "DISCOUNT" => {
            let (price, pct) = two_numbers(name, args)?;
            Ok(Value::Number(price * (1.0 - pct / 100.0)))
        }
        "VAT" => {
            let (price, pct) = two_numbers(name, args)?;
            Ok(Value::Number(price * (1.0 + pct / 100.0)))
        }
        "MARKUP" => {
            let (cost, pct) = two_numbers(name, args)?;
            Ok(Value::Number(cost * (1.0 + pct / 100.0)))
        }

        other => Err(FormulaError::UnknownFunction(other.to_string())),
    }
}

fn exact(name: &str, args: &[Value], count: usize) -> Result<(), FormulaError> {
    if args.len() != count {
        return Err(FormulaError::WrongArity {
            name: name.to_string(),
            expected: match count {
                1 => "1",
                2 => "2",
                _ => "3",
            },
            got: args.len(),
        });
    }
    Ok(())
}

fn required<'a>(
    name: &str,
    args: &'a [Value],
    minimum: usize,
) -> Result<&'a [Value], FormulaError> {
    if args.len() < minimum {
        return Err(FormulaError::WrongArity {
            name: name.to_string(),
            expected: "1 or more",
            got: args.len(),
        });
    }
    Ok(args)
}

fn unary(name: &str, args: &[Value], f: impl Fn(f64) -> f64) -> Result<Value, FormulaError> {
    exact(name, args, 1)?;
    Ok(Value::Number(f(args[0].as_number()?)))
}

fn binary(name: &str, args: &[Value], f: impl Fn(f64, f64) -> f64) -> Result<Value, FormulaError> {
    exact(name, args, 2)?;
    Ok(Value::Number(f(args[0].as_number()?, args[1].as_number()?)))
}

fn two_numbers(name: &str, args: &[Value]) -> Result<(f64, f64), FormulaError> {
    exact(name, args, 2)?;
    Ok((args[0].as_number()?, args[1].as_number()?))
}

fn fold(name: &str, args: &[Value], f: impl Fn(f64, f64) -> f64) -> Result<Value, FormulaError> {
    let numbers = numeric_args(name, args, 1)?;
    let first = numbers[0];
    Ok(Value::Number(numbers.into_iter().skip(1).fold(first, f)))
}

fn numeric_args(name: &str, args: &[Value], minimum: usize) -> Result<Vec<f64>, FormulaError> {
    required(name, args, minimum)?;
    args.iter().map(Value::as_number).collect()
}

/// LOG(x) is base 10; LOG(x, base) uses the given base.
fn log(name: &str, args: &[Value]) -> Result<Value, FormulaError> {
    match args.len() {
        1 => Ok(Value::Number(args[0].as_number()?.log10())),
        2 => Ok(Value::Number(args[0].as_number()?.log(args[1].as_number()?))),
        got => Err(FormulaError::WrongArity { name: name.to_string(), expected: "1 or 2", got }),
    }
}

/// Rounding family with an optional digit count: ROUND(x), ROUND(x, digits).
fn round_digits(
    name: &str,
    args: &[Value],
    f: impl Fn(f64) -> f64,
) -> Result<Value, FormulaError> {
    let (value, digits) = match args.len() {
        1 => (args[0].as_number()?, 0i32),
        2 => (args[0].as_number()?, args[1].as_number()?.trunc() as i32),
        got => {
            return Err(FormulaError::WrongArity {
                name: name.to_string(),
                expected: "1 or 2",
                got,
            })
        }
    };
    let factor = 10f64.powi(digits);
    Ok(Value::Number(f(value * factor) / factor))
}

/// CEILING/FLOOR with an optional significance: CEILING(x), CEILING(x, step).
fn significance(
    name: &str,
    args: &[Value],
    f: impl Fn(f64) -> f64,
) -> Result<Value, FormulaError> {
    let (value, step) = match args.len() {
        1 => (args[0].as_number()?, 1.0),
        2 => (args[0].as_number()?, args[1].as_number()?),
        got => {
            return Err(FormulaError::WrongArity {
                name: name.to_string(),
                expected: "1 or 2",
                got,
            })
        }
    };
    if step == 0.0 {
        return Ok(Value::Number(0.0));
    }
    Ok(Value::Number(f(value / step) * step))
}

/// SUMPRODUCT over consecutive pairs: SUMPRODUCT(a, b, c, d) = a*b + c*d.
fn sumproduct(name: &str, args: &[Value]) -> Result<Value, FormulaError> {
    if args.is_empty() || args.len() % 2 != 0 {
        return Err(FormulaError::WrongArity {
            name: name.to_string(),
            expected: "an even number of",
            got: args.len(),
        });
    }
    let mut total = 0.0;
    for pair in args.chunks(2) {
        total += pair[0].as_number()? * pair[1].as_number()?;
    }
    Ok(Value::Number(total))
}

fn index_arg(value: &Value) -> Result<usize, FormulaError> {
    let number = value.as_number()?;
    if number < 0.0 {
        return Err(FormulaError::NotANumber(format!("{number}")));
    }
    Ok(number.trunc() as usize)
}

fn text_and_count(name: &str, args: &[Value]) -> Result<(String, usize), FormulaError> {
    match args.len() {
        1 => Ok((args[0].as_text(), 1)),
        2 => Ok((args[0].as_text(), index_arg(&args[1])?)),
        got => Err(FormulaError::WrongArity { name: name.to_string(), expected: "1 or 2", got }),
    }
}
