use std::sync::LazyLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::sandbox::ExecutionError;
use crate::sandbox::builtins::{Kwargs, arity, no_kwargs};
use crate::sandbox::value::Value;

pub(super) const FUNCTIONS: &[&str] =
    &["monotonic", "perf_counter", "time", "time_ns"];

static START: LazyLock<Instant> = LazyLock::new(Instant::now);

pub(super) fn call(
    name: &str,
    function: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, ExecutionError> {
    no_kwargs(name, &kwargs)?;
    arity(name, &args, 0, 0)?;
    let since_epoch = || {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    };
    match function {
        "time" => Ok(Value::Float(since_epoch().as_secs_f64())),
        "time_ns" => Ok(Value::Int(
            i64::try_from(since_epoch().as_nanos()).unwrap_or(i64::MAX),
        )),
        "monotonic" | "perf_counter" => {
            Ok(Value::Float(START.elapsed().as_secs_f64()))
        }
        _ => Err(ExecutionError::runtime(format!(
            "AttributeError: module 'time' has no attribute '{function}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clocks() {
        let time = |function: &str| {
            call(&format!("time.{function}"), function, vec![], vec![])
                .unwrap()
        };
        assert!(time("time").as_f64().unwrap() > 1.6e9);
        assert!(time("time_ns").as_i64().unwrap() > 1_600_000_000_000_000_000);
        let start = time("perf_counter").as_f64().unwrap();
        let end = time("perf_counter").as_f64().unwrap();
        assert!(end >= start);
        assert!(call("time.sleep", "sleep", vec![], vec![]).is_err());
        assert!(
            call("time.time", "time", vec![Value::Int(1)], vec![]).is_err()
        );
    }
}
