use rustpython_parser::ast::Operator;

use crate::sandbox::ExecutionError;
use crate::sandbox::builtins::{
    Kwargs, arity, float_arg, no_kwargs, sort_values,
};
use crate::sandbox::value::{Value, binary_op};

pub(super) const FUNCTIONS: &[&str] = &[
    "fmean", "mean", "median", "median_high", "median_low", "mode",
    "multimode", "pstdev", "pvariance", "stdev", "variance",
];

fn statistics_error(detail: &str) -> ExecutionError {
    ExecutionError::runtime(format!("StatisticsError: {detail}"))
}

/// Returns the data as integers if they all are.
fn integers(data: &[Value]) -> Option<Vec<i128>> {
    data.iter()
        .map(|value| match value {
            Value::Int(_) | Value::Bool(_) => value.as_i64().map(i128::from),
            _ => None,
        })
        .collect()
}

fn floats(name: &str, data: &[Value]) -> Result<Vec<f64>, ExecutionError> {
    data.iter().map(|value| float_arg(name, value)).collect()
}

/// An exact quotient of integers is an int, as with Python's fractions.
fn ratio(numerator: i128, denominator: i128) -> Value {
    if numerator % denominator == 0 {
        if let Ok(int) = i64::try_from(numerator / denominator) {
            return Value::Int(int);
        }
    }
    Value::Float(numerator as f64 / denominator as f64)
}

fn mean(name: &str, data: &[Value]) -> Result<Value, ExecutionError> {
    if data.is_empty() {
        return Err(statistics_error("mean requires at least one data point"));
    }
    if let Some(ints) = integers(data) {
        if let Some(sum) = ints.iter().try_fold(0i128, |a, b| a.checked_add(*b))
        {
            return Ok(ratio(sum, data.len() as i128));
        }
    }
    let values = floats(name, data)?;
    Ok(Value::Float(values.iter().sum::<f64>() / values.len() as f64))
}

/// The variance of `data`, divided by `n - ddof`.
fn variance(
    name: &str,
    data: &[Value],
    ddof: usize,
) -> Result<Value, ExecutionError> {
    if data.len() <= ddof {
        return Err(statistics_error(if ddof == 0 {
            "pvariance requires at least one data point"
        } else {
            "variance requires at least two data points"
        }));
    }
    let n = data.len();
    if let Some(ints) = integers(data) {
        // n * sum(x^2) - sum(x)^2 over n * (n - ddof), kept exact.
        let exact =
            ints.iter().try_fold((0i128, 0i128), |(sum, squares), x| {
                let square = x.checked_mul(*x)?;
                Some((sum.checked_add(*x)?, squares.checked_add(square)?))
            });
        if let Some((sum, squares)) = exact {
            let n = n as i128;
            let numerator = n
                .checked_mul(squares)
                .and_then(|a| a.checked_sub(sum.checked_mul(sum)?));
            let denominator = n.checked_mul(n - ddof as i128);
            if let Some((numerator, denominator)) = numerator.zip(denominator)
            {
                return Ok(ratio(numerator, denominator));
            }
        }
    }
    let values = floats(name, data)?;
    let mean = values.iter().sum::<f64>() / n as f64;
    let squares: f64 = values.iter().map(|x| (x - mean) * (x - mean)).sum();
    Ok(Value::Float(squares / (n - ddof) as f64))
}

fn sorted(data: &[Value]) -> Result<Vec<Value>, ExecutionError> {
    let mut sorted = data.to_vec();
    sort_values(&mut sorted, false)?;
    Ok(sorted)
}

/// Counts the distinct values, in order of first appearance.
fn counts(data: &[Value]) -> Vec<(Value, usize)> {
    let mut counts: Vec<(Value, usize)> = Vec::new();
    for value in data {
        match counts.iter_mut().find(|(seen, _)| seen.py_eq(value)) {
            Some((_, count)) => *count += 1,
            None => counts.push((value.clone(), 1)),
        }
    }
    counts
}

pub(super) fn call(
    name: &str,
    function: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, ExecutionError> {
    no_kwargs(name, &kwargs)?;
    arity(name, &args, 1, 1)?;
    let data = args[0].iterate()?;
    match function {
        "mean" => mean(name, &data),
        "fmean" => {
            if data.is_empty() {
                return Err(statistics_error(
                    "fmean requires at least one data point",
                ));
            }
            let values = floats(name, &data)?;
            Ok(Value::Float(values.iter().sum::<f64>() / values.len() as f64))
        }
        "median" | "median_low" | "median_high" => {
            if data.is_empty() {
                return Err(statistics_error("no median for empty data"));
            }
            let sorted = sorted(&data)?;
            let n = sorted.len();
            match function {
                "median_low" => Ok(sorted[(n - 1) / 2].clone()),
                "median_high" => Ok(sorted[n / 2].clone()),
                _ if n % 2 == 1 => Ok(sorted[n / 2].clone()),
                _ => {
                    let (low, high) = (&sorted[n / 2 - 1], &sorted[n / 2]);
                    let sum = binary_op(Operator::Add, low, high)?;
                    binary_op(Operator::Div, &sum, &Value::Int(2))
                }
            }
        }
        "mode" => counts(&data)
            .into_iter()
            .fold(None, |best: Option<(Value, usize)>, (value, count)| {
                match best {
                    Some(best) if best.1 >= count => Some(best),
                    _ => Some((value, count)),
                }
            })
            .map(|(value, _)| value)
            .ok_or_else(|| statistics_error("no mode for empty data")),
        "multimode" => {
            let counts = counts(&data);
            let top =
                counts.iter().map(|(_, count)| *count).max().unwrap_or(0);
            Ok(Value::List(
                counts
                    .into_iter()
                    .filter(|(_, count)| *count == top)
                    .map(|(value, _)| value)
                    .collect(),
            ))
        }
        "variance" => variance(name, &data, 1),
        "pvariance" => variance(name, &data, 0),
        "stdev" | "pstdev" => {
            let ddof = usize::from(function == "stdev");
            let variance = variance(name, &data, ddof)?;
            Ok(Value::Float(float_arg(name, &variance)?.sqrt()))
        }
        _ => Err(ExecutionError::runtime(format!(
            "AttributeError: module 'statistics' has no attribute '{function}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statistics(
        function: &str,
        data: &[f64],
    ) -> Result<Value, ExecutionError> {
        let data = data
            .iter()
            .map(|x| {
                if x.fract() == 0.0 {
                    Value::Int(*x as i64)
                } else {
                    Value::Float(*x)
                }
            })
            .collect();
        call(
            &format!("statistics.{function}"),
            function,
            vec![Value::List(data)],
            vec![],
        )
    }

    #[test]
    fn test_averages() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(statistics("mean", &data).unwrap().to_string(), "5");
        let mean = statistics("mean", &[1.0, 2.0]).unwrap();
        assert_eq!(mean.to_string(), "1.5");
        assert_eq!(statistics("fmean", &data).unwrap().to_string(), "5.0");
        assert_eq!(statistics("median", &data).unwrap().to_string(), "4.5");
        assert_eq!(
            statistics("median", &[3.0, 1.0, 2.0]).unwrap().to_string(),
            "2"
        );
        assert_eq!(statistics("median_low", &data).unwrap().to_string(), "4");
        assert_eq!(statistics("mode", &data).unwrap().to_string(), "4");
        assert_eq!(
            statistics("multimode", &[1.0, 2.0, 2.0, 1.0])
                .unwrap()
                .to_string(),
            "[1, 2]"
        );
        assert!(statistics("mean", &[]).is_err());
        assert!(statistics("mode", &[]).is_err());
    }

    #[test]
    fn test_spread() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(statistics("pvariance", &data).unwrap().to_string(), "4");
        assert_eq!(statistics("pstdev", &data).unwrap().to_string(), "2.0");
        assert_eq!(
            statistics("variance", &[1.0, 2.0, 3.0, 4.0])
                .unwrap()
                .to_string(),
            "1.6666666666666667"
        );
        assert_eq!(
            statistics("variance", &[1.5, 2.5]).unwrap().to_string(),
            "0.5"
        );
        assert!(statistics("stdev", &[1.0]).is_err());
    }
}
