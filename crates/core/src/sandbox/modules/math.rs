use rustpython_parser::ast::Operator;

use crate::sandbox::ExecutionError;
use crate::sandbox::builtins::{
    Kwargs, arity, float_arg, int_arg, no_kwargs, to_int, value_error,
};
use crate::sandbox::value::{Value, binary_op};

pub(super) const FUNCTIONS: &[&str] = &[
    "atan", "atan2", "ceil", "comb", "cos", "degrees", "exp", "fabs",
    "factorial", "floor", "fsum", "gcd", "hypot", "isclose", "log", "log10",
    "log2", "pow", "prod", "radians", "sin", "sqrt", "tan", "trunc",
];

pub(super) fn constant(attr: &str) -> Option<Value> {
    match attr {
        "pi" => Some(Value::Float(std::f64::consts::PI)),
        "e" => Some(Value::Float(std::f64::consts::E)),
        "tau" => Some(Value::Float(std::f64::consts::TAU)),
        "inf" => Some(Value::Float(f64::INFINITY)),
        "nan" => Some(Value::Float(f64::NAN)),
        _ => None,
    }
}

fn domain_error() -> ExecutionError {
    value_error("math domain error".to_owned())
}

fn overflow() -> ExecutionError {
    ExecutionError::runtime("integer overflow")
}

pub(super) fn call(
    name: &str,
    function: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, ExecutionError> {
    no_kwargs(name, &kwargs)?;
    let unary = |f: fn(f64) -> f64| -> Result<Value, ExecutionError> {
        arity(name, &args, 1, 1)?;
        Ok(Value::Float(f(float_arg(name, &args[0])?)))
    };
    let binary = |f: fn(f64, f64) -> f64| -> Result<Value, ExecutionError> {
        arity(name, &args, 2, 2)?;
        let x = float_arg(name, &args[0])?;
        Ok(Value::Float(f(x, float_arg(name, &args[1])?)))
    };
    match function {
        "ceil" | "floor" | "trunc" => {
            arity(name, &args, 1, 1)?;
            if let Value::Int(i) = args[0] {
                return Ok(Value::Int(i));
            }
            let x = float_arg(name, &args[0])?;
            let x = match function {
                "ceil" => x.ceil(),
                "floor" => x.floor(),
                _ => x.trunc(),
            };
            to_int(&Value::Float(x))
        }
        "atan" => unary(f64::atan),
        "cos" => unary(f64::cos),
        "degrees" => unary(f64::to_degrees),
        "exp" => unary(f64::exp),
        "fabs" => unary(f64::abs),
        "radians" => unary(f64::to_radians),
        "sin" => unary(f64::sin),
        "tan" => unary(f64::tan),
        "log10" => unary(f64::log10),
        "log2" => unary(f64::log2),
        "atan2" => binary(f64::atan2),
        "hypot" => binary(f64::hypot),
        "pow" => binary(f64::powf),
        "sqrt" => {
            arity(name, &args, 1, 1)?;
            let x = float_arg(name, &args[0])?;
            if x < 0.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(x.sqrt()))
        }
        "log" => {
            arity(name, &args, 1, 2)?;
            let x = float_arg(name, &args[0])?;
            if x <= 0.0 {
                return Err(domain_error());
            }
            match args.get(1) {
                Some(base) => Ok(Value::Float(x.log(float_arg(name, base)?))),
                None => Ok(Value::Float(x.ln())),
            }
        }
        "factorial" => {
            arity(name, &args, 1, 1)?;
            let n = int_arg(name, &args[0])?;
            if n < 0 {
                return Err(value_error(
                    "factorial() not defined for negative values".to_owned(),
                ));
            }
            (1..=n)
                .try_fold(1i64, i64::checked_mul)
                .map(Value::Int)
                .ok_or_else(overflow)
        }
        "comb" => {
            arity(name, &args, 2, 2)?;
            let n = int_arg(name, &args[0])?;
            let k = int_arg(name, &args[1])?;
            if n < 0 || k < 0 {
                return Err(value_error(
                    "comb() arguments must be non-negative".to_owned(),
                ));
            }
            if k > n {
                return Ok(Value::Int(0));
            }
            let k = k.min(n - k);
            let mut comb = 1i128;
            for i in 0..k {
                comb = comb
                    .checked_mul(i128::from(n - i))
                    .ok_or_else(overflow)?
                    / i128::from(i + 1);
            }
            i64::try_from(comb).map(Value::Int).map_err(|_| overflow())
        }
        "gcd" => {
            let mut acc = 0i64;
            for arg in &args {
                let mut b = int_arg(name, arg)?.abs();
                let mut a = acc;
                while b != 0 {
                    (a, b) = (b, a % b);
                }
                acc = a;
            }
            Ok(Value::Int(acc))
        }
        "fsum" => {
            arity(name, &args, 1, 1)?;
            let mut total = 0.0;
            for item in args[0].iterate()? {
                total += float_arg(name, &item)?;
            }
            Ok(Value::Float(total))
        }
        "prod" => {
            arity(name, &args, 1, 1)?;
            let mut product = Value::Int(1);
            for item in args[0].iterate()? {
                product = binary_op(Operator::Mult, &product, &item)?;
            }
            Ok(product)
        }
        "isclose" => {
            arity(name, &args, 2, 2)?;
            let a = float_arg(name, &args[0])?;
            let b = float_arg(name, &args[1])?;
            Ok(Value::Bool((a - b).abs() <= 1e-9 * a.abs().max(b.abs())))
        }
        _ => Err(ExecutionError::runtime(format!(
            "AttributeError: module 'math' has no attribute '{function}'"
        ))),
    }
}
