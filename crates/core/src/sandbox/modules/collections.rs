use super::bind;
use crate::sandbox::ExecutionError;
use crate::sandbox::builtins::{Kwargs, arity, call_builtin, type_error};
use crate::sandbox::value::Value;

pub(super) const FUNCTIONS: &[&str] =
    &["Counter", "OrderedDict", "defaultdict", "deque", "namedtuple"];

fn unsupported(name: &str, hint: &str) -> ExecutionError {
    ExecutionError::runtime(format!(
        "NotImplementedError: {name} is not supported in the sandbox, {hint}"
    ))
}

/// Builds a `Counter`, which is a dict mapping items to their count.
fn counter(
    name: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, ExecutionError> {
    arity(name, &args, 0, 1)?;
    let mut counts: Vec<(Value, Value)> = Vec::new();
    let mut add = |item: Value, count: Value| -> Result<(), ExecutionError> {
        let Some(count) = count.as_i64() else {
            return Err(type_error(format!(
                "{name}() counts must be integers, got '{}'",
                count.type_name()
            )));
        };
        match counts.iter_mut().find(|(seen, _)| seen.py_eq(&item)) {
            Some((_, Value::Int(total))) => {
                *total = total.checked_add(count).ok_or_else(|| {
                    ExecutionError::runtime("integer overflow")
                })?;
            }
            _ => counts.push((item, Value::Int(count))),
        }
        Ok(())
    };
    match args.into_iter().next() {
        Some(Value::Dict(entries)) => {
            for (item, count) in entries {
                add(item, count)?;
            }
        }
        Some(iterable) => {
            for item in iterable.iterate()? {
                add(item, Value::Int(1))?;
            }
        }
        None => {}
    }
    for (key, count) in kwargs {
        add(Value::Str(key), count)?;
    }
    Ok(Value::Dict(counts))
}

pub(super) fn call(
    name: &str,
    function: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, ExecutionError> {
    match function {
        "Counter" => counter(name, args, kwargs),
        "OrderedDict" => call_builtin("dict", args, kwargs),
        "deque" => {
            let mut bound =
                bind(name, args, kwargs, &["iterable", "maxlen"], 0)?;
            if bound[1].take().is_some_and(|m| !matches!(m, Value::None)) {
                return Err(unsupported(
                    "deque(maxlen=...)",
                    "slice the list instead",
                ));
            }
            match bound[0].take() {
                Some(iterable) => Ok(Value::List(iterable.iterate()?)),
                None => Ok(Value::List(Vec::new())),
            }
        }
        "defaultdict" => Err(unsupported(
            name,
            "use a dict with dict.get(key, default) or dict.setdefault()",
        )),
        "namedtuple" => Err(unsupported(name, "use a dict or a tuple")),
        _ => Err(ExecutionError::runtime(format!(
            "AttributeError: module 'collections' has no attribute \
             '{function}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collections(
        function: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, ExecutionError> {
        call(&format!("collections.{function}"), function, args, kwargs)
    }

    #[test]
    fn test_counter() {
        let counts = collections(
            "Counter",
            vec![Value::Str("abca".to_owned())],
            vec![("z".to_owned(), Value::Int(2))],
        )
        .unwrap();
        assert_eq!(counts.to_string(), "{'a': 2, 'b': 1, 'c': 1, 'z': 2}");

        let copied = collections("Counter", vec![counts], vec![]).unwrap();
        assert_eq!(copied.to_string(), "{'a': 2, 'b': 1, 'c': 1, 'z': 2}");

        let bad = collections(
            "Counter",
            vec![Value::Dict(vec![(Value::Int(1), Value::Float(0.5))])],
            vec![],
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_containers() {
        let deque = collections(
            "deque",
            vec![Value::Tuple(vec![Value::Int(1), Value::Int(2)])],
            vec![],
        )
        .unwrap();
        assert_eq!(deque.to_string(), "[1, 2]");
        assert_eq!(
            collections("deque", vec![], vec![]).unwrap().to_string(),
            "[]"
        );
        let bounded = collections(
            "deque",
            vec![],
            vec![("maxlen".to_owned(), Value::Int(3))],
        );
        assert!(bounded.unwrap_err().detail().contains("slice"));

        let ordered = collections(
            "OrderedDict",
            vec![],
            vec![("b".to_owned(), Value::Int(1))],
        )
        .unwrap();
        assert_eq!(ordered.to_string(), "{'b': 1}");

        let err = collections("defaultdict", vec![], vec![]).unwrap_err();
        assert!(err.detail().contains("setdefault"));
    }
}
