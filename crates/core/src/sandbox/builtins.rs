//! Builtin functions and methods of the builtin types.

use std::cmp::Ordering;

use rustpython_parser::ast::Operator;

use super::ExecutionError;
use super::modules;
use super::value::{
    MAX_SEQUENCE_LEN, MAX_VALUE_SIZE, Value, binary_op, check_size, dict_get,
    dict_set, repr_float, too_large,
};

/// Functions reachable without an import. `print` is handled by the
/// interpreter, since it writes to the logs.
pub(crate) const BUILTINS: &[&str] = &[
    "abs", "all", "any", "bool", "dict", "enumerate", "float", "int", "len",
    "list", "max", "min", "print", "range", "repr", "reversed", "round",
    "sorted", "str", "sum", "tuple", "zip",
];

pub(crate) type Kwargs = Vec<(String, Value)>;

#[inline]
pub(crate) fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

pub(super) fn type_error(detail: String) -> ExecutionError {
    ExecutionError::runtime(format!("TypeError: {detail}"))
}

pub(super) fn value_error(detail: String) -> ExecutionError {
    ExecutionError::runtime(format!("ValueError: {detail}"))
}

pub(super) fn arity(
    name: &str,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), ExecutionError> {
    if args.len() < min || args.len() > max {
        return Err(type_error(format!(
            "{name}() takes from {min} to {max} arguments ({} given)",
            args.len()
        )));
    }
    Ok(())
}

pub(super) fn no_kwargs(
    name: &str,
    kwargs: &Kwargs,
) -> Result<(), ExecutionError> {
    match kwargs.first() {
        Some((key, _)) => Err(type_error(format!(
            "{name}() got an unexpected keyword argument '{key}'"
        ))),
        None => Ok(()),
    }
}

pub(super) fn take_kwarg(kwargs: &mut Kwargs, key: &str) -> Option<Value> {
    let idx = kwargs.iter().position(|(k, _)| k == key)?;
    Some(kwargs.remove(idx).1)
}

pub(super) fn int_arg(
    name: &str,
    value: &Value,
) -> Result<i64, ExecutionError> {
    value.as_i64().ok_or_else(|| {
        type_error(format!(
            "{name}() expected an integer, got '{}'",
            value.type_name()
        ))
    })
}

pub(super) fn float_arg(
    name: &str,
    value: &Value,
) -> Result<f64, ExecutionError> {
    value.as_f64().ok_or_else(|| {
        type_error(format!(
            "{name}() expected a number, got '{}'",
            value.type_name()
        ))
    })
}

pub(super) fn str_arg<'a>(
    name: &str,
    value: &'a Value,
) -> Result<&'a str, ExecutionError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(type_error(format!(
            "{name}() expected a str, got '{}'",
            other.type_name()
        ))),
    }
}

pub(super) fn sort_values(
    items: &mut [Value],
    reverse: bool,
) -> Result<(), ExecutionError> {
    let mut error = None;
    items.sort_by(|a, b| {
        a.py_cmp(b).unwrap_or_else(|err| {
            error.get_or_insert(err);
            Ordering::Equal
        })
    });
    if let Some(err) = error {
        return Err(err);
    }
    if reverse {
        items.reverse();
    }
    Ok(())
}

fn extreme(
    name: &str,
    args: Vec<Value>,
    wanted: Ordering,
) -> Result<Value, ExecutionError> {
    let items = match args.len() {
        0 => {
            return Err(type_error(format!(
                "{name} expected at least 1 argument, got 0"
            )));
        }
        1 => args[0].iterate()?,
        _ => args,
    };
    let mut best: Option<Value> = None;
    for item in items {
        best = match best {
            Some(current) if item.py_cmp(&current)? != wanted => Some(current),
            _ => Some(item),
        };
    }
    best.ok_or_else(|| {
        value_error(format!("{name}() arg is an empty sequence"))
    })
}

fn round_float(x: f64, digits: i64) -> f64 {
    let scale = 10f64.powi(i32::try_from(digits).unwrap_or(i32::MAX));
    (x * scale).round_ties_even() / scale
}

pub(super) fn to_int(value: &Value) -> Result<Value, ExecutionError> {
    match value {
        Value::Str(s) => {
            s.trim().replace('_', "").parse::<i64>().map(Value::Int).map_err(
                |_| {
                    value_error(format!(
                        "invalid literal for int() with base 10: {}",
                        value.repr()
                    ))
                },
            )
        }
        Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Value::Float(_) => Err(value_error(
            "cannot convert float infinity or NaN to integer".to_owned(),
        )),
        other => other.as_i64().map(Value::Int).ok_or_else(|| {
            type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn to_float(value: &Value) -> Result<Value, ExecutionError> {
    match value {
        Value::Str(s) => {
            let trimmed = s.trim().to_ascii_lowercase();
            let parsed = match trimmed.as_str() {
                "inf" | "+inf" | "infinity" => Ok(f64::INFINITY),
                "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => other.parse::<f64>(),
            };
            parsed.map(Value::Float).map_err(|_| {
                value_error(format!(
                    "could not convert string to float: {}",
                    value.repr()
                ))
            })
        }
        other => other.as_f64().map(Value::Float).ok_or_else(|| {
            type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn range(args: &[Value]) -> Result<Value, ExecutionError> {
    arity("range", args, 1, 3)?;
    let ints = args
        .iter()
        .map(|a| int_arg("range", a))
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints[..] {
        [stop] => (0, stop, 1),
        [start, stop] => (start, stop, 1),
        [start, stop, step] => (start, stop, step),
        _ => return Ok(Value::List(Vec::new())),
    };
    if step == 0 {
        return Err(value_error("range() arg 3 must not be zero".to_owned()));
    }
    let (start, stop, step) =
        (i128::from(start), i128::from(stop), i128::from(step));
    let len = if step > 0 {
        (stop - start + step - 1).max(0) / step
    } else {
        (start - stop - step - 1).max(0) / -step
    };
    if len > MAX_SEQUENCE_LEN as i128 {
        return Err(ExecutionError::runtime(format!(
            "range() of {len} items is too large for the sandbox"
        )));
    }
    Ok(Value::List(
        (0..len)
            .map(|i| Value::Int((start + i * step) as i64))
            .collect(),
    ))
}

pub(super) fn dict_entries(
    value: Value,
) -> Result<Vec<(Value, Value)>, ExecutionError> {
    if let Value::Dict(entries) = value {
        return Ok(entries);
    }
    let mut entries = Vec::new();
    for pair in value.iterate()? {
        match pair.iterate()?.as_slice() {
            [k, v] => dict_set(&mut entries, k.clone(), v.clone()),
            _ => {
                return Err(value_error(
                    "dictionary update sequence element has wrong length"
                        .to_owned(),
                ));
            }
        }
    }
    Ok(entries)
}

/// Calls a builtin function, `print` excluded.
pub(crate) fn call_builtin(
    name: &str,
    mut args: Vec<Value>,
    mut kwargs: Kwargs,
) -> Result<Value, ExecutionError> {
    if name == "sorted" {
        let reverse = take_kwarg(&mut kwargs, "reverse")
            .is_some_and(|r| r.is_truthy());
        no_kwargs(name, &kwargs)?;
        arity(name, &args, 1, 1)?;
        let mut items = args[0].iterate()?;
        sort_values(&mut items, reverse)?;
        return Ok(Value::List(items));
    }
    if name == "sum" {
        let start = take_kwarg(&mut kwargs, "start");
        no_kwargs(name, &kwargs)?;
        arity(name, &args, 1, 2)?;
        let mut total = start
            .or_else(|| args.get(1).cloned())
            .unwrap_or(Value::Int(0));
        for item in args[0].iterate()? {
            total = binary_op(Operator::Add, &total, &item)?;
        }
        return Ok(total);
    }
    if name == "dict" {
        arity(name, &args, 0, 1)?;
        let mut entries = match args.pop() {
            Some(other) => dict_entries(other)?,
            None => Vec::new(),
        };
        for (k, v) in kwargs {
            dict_set(&mut entries, Value::Str(k), v);
        }
        return Ok(Value::Dict(entries));
    }

    no_kwargs(name, &kwargs)?;
    match name {
        "abs" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => int_arg(name, other)?
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| ExecutionError::runtime("integer overflow")),
            }
        }
        "all" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(args[0].iterate()?.iter().all(Value::is_truthy)))
        }
        "any" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(args[0].iterate()?.iter().any(Value::is_truthy)))
        }
        "bool" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
        }
        "enumerate" => {
            arity(name, &args, 1, 2)?;
            let start = match args.get(1) {
                Some(start) => int_arg(name, start)?,
                None => 0,
            };
            Ok(Value::List(
                args[0]
                    .iterate()?
                    .into_iter()
                    .zip(start..)
                    .map(|(item, idx)| {
                        Value::Tuple(vec![Value::Int(idx), item])
                    })
                    .collect(),
            ))
        }
        "float" => {
            arity(name, &args, 0, 1)?;
            args.first().map_or(Ok(Value::Float(0.0)), to_float)
        }
        "int" => {
            arity(name, &args, 0, 1)?;
            args.first().map_or(Ok(Value::Int(0)), to_int)
        }
        "len" => {
            arity(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) | Value::Tuple(items) => items.len(),
                Value::Dict(entries) => entries.len(),
                other => {
                    return Err(type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
        }
        "list" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                Some(iterable) => Ok(Value::List(iterable.iterate()?)),
                None => Ok(Value::List(Vec::new())),
            }
        }
        "max" => extreme(name, args, Ordering::Greater),
        "min" => extreme(name, args, Ordering::Less),
        "range" => range(&args),
        "repr" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Str(args[0].repr()))
        }
        "reversed" => {
            arity(name, &args, 1, 1)?;
            let mut items = args[0].iterate()?;
            items.reverse();
            Ok(Value::List(items))
        }
        "round" => {
            arity(name, &args, 1, 2)?;
            let digits = match args.get(1) {
                Some(Value::None) | None => None,
                Some(digits) => Some(int_arg(name, digits)?),
            };
            match (&args[0], digits) {
                (Value::Float(f), None) => {
                    to_int(&Value::Float(f.round_ties_even()))
                }
                (Value::Float(f), Some(digits)) => {
                    Ok(Value::Float(round_float(*f, digits)))
                }
                (other, _) => Ok(Value::Int(int_arg(name, other)?)),
            }
        }
        "str" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Str(
                args.first().map(ToString::to_string).unwrap_or_default(),
            ))
        }
        "tuple" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                Some(iterable) => Ok(Value::Tuple(iterable.iterate()?)),
                None => Ok(Value::Tuple(Vec::new())),
            }
        }
        "zip" => {
            let columns = args
                .iter()
                .map(Value::iterate)
                .collect::<Result<Vec<_>, _>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Value::List(
                (0..len)
                    .map(|i| {
                        Value::Tuple(
                            columns.iter().map(|c| c[i].clone()).collect(),
                        )
                    })
                    .collect(),
            ))
        }
        _ => Err(ExecutionError::undefined(name)),
    }
}

fn str_method(
    s: &str,
    method: &str,
    args: &[Value],
) -> Result<Value, ExecutionError> {
    let string = |value: String| -> Result<Value, ExecutionError> {
        Ok(Value::Str(value))
    };
    let strip_chars =
        |args: &[Value]| -> Result<Option<Vec<char>>, ExecutionError> {
            match args.first() {
                None | Some(Value::None) => Ok(None),
                Some(chars) => {
                    Ok(Some(str_arg(method, chars)?.chars().collect()))
                }
            }
        };
    match method {
        "upper" => string(s.to_uppercase()),
        "lower" => string(s.to_lowercase()),
        "title" => string(
            s.split(' ')
                .map(|word| capitalize(&word.to_lowercase()))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "capitalize" => string(capitalize(&s.to_lowercase())),
        "strip" | "lstrip" | "rstrip" => {
            arity(method, args, 0, 1)?;
            let chars = strip_chars(args)?;
            let matches = |c: char| match &chars {
                Some(chars) => chars.contains(&c),
                None => c.is_whitespace(),
            };
            string(
                match method {
                    "strip" => s.trim_matches(matches),
                    "lstrip" => s.trim_start_matches(matches),
                    _ => s.trim_end_matches(matches),
                }
                .to_owned(),
            )
        }
        "split" => {
            arity(method, args, 0, 2)?;
            let max_split = match args.get(1) {
                Some(n) => usize::try_from(int_arg(method, n)?).ok(),
                None => None,
            };
            let parts: Vec<String> = match args.first() {
                None | Some(Value::None) => {
                    let mut parts: Vec<String> =
                        s.split_whitespace().map(str::to_owned).collect();
                    if let Some(max) = max_split {
                        if parts.len() > max + 1 {
                            // Python keeps the remainder unsplit.
                            let rest = s
                                .split_whitespace()
                                .skip(max)
                                .collect::<Vec<_>>()
                                .join(" ");
                            parts.truncate(max);
                            parts.push(rest);
                        }
                    }
                    parts
                }
                Some(sep) => {
                    let sep = str_arg(method, sep)?;
                    if sep.is_empty() {
                        return Err(value_error("empty separator".to_owned()));
                    }
                    match max_split {
                        Some(max) => {
                            s.splitn(max + 1, sep).map(str::to_owned).collect()
                        }
                        None => s.split(sep).map(str::to_owned).collect(),
                    }
                }
            };
            Ok(Value::List(parts.into_iter().map(Value::Str).collect()))
        }
        "splitlines" => Ok(Value::List(
            s.lines().map(|l| Value::Str(l.to_owned())).collect(),
        )),
        "join" => {
            arity(method, args, 1, 1)?;
            let items = args[0]
                .iterate()?
                .iter()
                .map(|item| str_arg(method, item).map(str::to_owned))
                .collect::<Result<Vec<_>, _>>()?;
            let len = items.iter().try_fold(0usize, |acc, item| {
                acc.checked_add(item.len())?.checked_add(s.len())
            });
            check_size(len)?;
            string(items.join(s))
        }
        "replace" => {
            arity(method, args, 2, 2)?;
            let from = str_arg(method, &args[0])?;
            let to = str_arg(method, &args[1])?;
            let count = s.matches(from).count();
            check_size(
                count
                    .checked_mul(to.len())
                    .and_then(|added| added.checked_add(s.len())),
            )?;
            string(s.replace(from, to))
        }
        "startswith" | "endswith" => {
            arity(method, args, 1, 1)?;
            let candidates = match &args[0] {
                Value::Tuple(items) => items.clone(),
                other => vec![other.clone()],
            };
            let mut found = false;
            for candidate in &candidates {
                let candidate = str_arg(method, candidate)?;
                found |= if method == "startswith" {
                    s.starts_with(candidate)
                } else {
                    s.ends_with(candidate)
                };
            }
            Ok(Value::Bool(found))
        }
        "find" => {
            arity(method, args, 1, 1)?;
            let needle = str_arg(method, &args[0])?;
            let idx = s
                .find(needle)
                .map(|byte| s[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Value::Int(idx))
        }
        "count" => {
            arity(method, args, 1, 1)?;
            let needle = str_arg(method, &args[0])?;
            let count = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Ok(Value::Int(count as i64))
        }
        "isdigit" => Ok(Value::Bool(
            !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
        )),
        "isalpha" => Ok(Value::Bool(
            !s.is_empty() && s.chars().all(char::is_alphabetic),
        )),
        _ => Err(no_attribute("str", method)),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(super) fn no_attribute(type_name: &str, attr: &str) -> ExecutionError {
    ExecutionError::runtime(format!(
        "AttributeError: '{type_name}' object has no attribute '{attr}'"
    ))
}

fn normalize_index(idx: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let idx = if idx < 0 { idx + len } else { idx };
    (0..len).contains(&idx).then_some(idx as usize)
}

/// Lists double as `collections.deque`, hence `appendleft` and `popleft`.
fn list_method(
    items: &mut Vec<Value>,
    method: &str,
    mut args: Vec<Value>,
    mut kwargs: Kwargs,
) -> Result<Value, ExecutionError> {
    if method == "sort" {
        let reverse =
            take_kwarg(&mut kwargs, "reverse").is_some_and(|r| r.is_truthy());
        no_kwargs(method, &kwargs)?;
        sort_values(items, reverse)?;
        return Ok(Value::None);
    }
    no_kwargs(method, &kwargs)?;
    match method {
        "append" | "appendleft" => {
            arity(method, &args, 1, 1)?;
            check_size(args[0].size().checked_add(items.len()))?;
            let value = args.pop().unwrap_or(Value::None);
            if method == "append" {
                items.push(value);
            } else {
                items.insert(0, value);
            }
            Ok(Value::None)
        }
        "extend" => {
            arity(method, &args, 1, 1)?;
            let added = args[0].iterate()?;
            let size = added.iter().try_fold(items.len(), |acc, item| {
                acc.checked_add(item.size())
            });
            check_size(size)?;
            items.extend(added);
            Ok(Value::None)
        }
        "insert" => {
            arity(method, &args, 2, 2)?;
            check_size(args[1].size().checked_add(items.len()))?;
            let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
            let idx = int_arg(method, &args[0])?;
            let idx = if idx < 0 { (idx + len).max(0) } else { idx.min(len) };
            let value = args.pop().unwrap_or(Value::None);
            items.insert(idx as usize, value);
            Ok(Value::None)
        }
        "pop" => {
            arity(method, &args, 0, 1)?;
            let idx = match args.first() {
                Some(idx) => int_arg(method, idx)?,
                None => -1,
            };
            let idx = normalize_index(idx, items.len()).ok_or_else(|| {
                ExecutionError::runtime("IndexError: pop index out of range")
            })?;
            Ok(items.remove(idx))
        }
        "popleft" => {
            arity(method, &args, 0, 0)?;
            if items.is_empty() {
                return Err(ExecutionError::runtime(
                    "IndexError: pop from an empty deque",
                ));
            }
            Ok(items.remove(0))
        }
        "remove" => {
            arity(method, &args, 1, 1)?;
            let idx = items
                .iter()
                .position(|item| item.py_eq(&args[0]))
                .ok_or_else(|| {
                    value_error("list.remove(x): x not in list".to_owned())
                })?;
            items.remove(idx);
            Ok(Value::None)
        }
        "index" => {
            arity(method, &args, 1, 1)?;
            items
                .iter()
                .position(|item| item.py_eq(&args[0]))
                .map(|idx| Value::Int(idx as i64))
                .ok_or_else(|| {
                    value_error(format!("{} is not in list", args[0].repr()))
                })
        }
        "count" => {
            arity(method, &args, 1, 1)?;
            let count =
                items.iter().filter(|item| item.py_eq(&args[0])).count();
            Ok(Value::Int(count as i64))
        }
        "reverse" => {
            items.reverse();
            Ok(Value::None)
        }
        "clear" => {
            items.clear();
            Ok(Value::None)
        }
        "copy" => Ok(Value::List(items.clone())),
        _ => Err(no_attribute("list", method)),
    }
}

/// Dicts double as `collections.Counter`, hence `most_common`.
fn dict_method(
    entries: &mut Vec<(Value, Value)>,
    method: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, ExecutionError> {
    if method == "update" {
        arity(method, &args, 0, 1)?;
        if let Some(other) = args.into_iter().next() {
            for (k, v) in dict_entries(other)? {
                dict_set(entries, k, v);
            }
        }
        for (k, v) in kwargs {
            dict_set(entries, Value::Str(k), v);
        }
        return Ok(Value::None);
    }
    no_kwargs(method, &kwargs)?;
    let pair =
        |(k, v): &(Value, Value)| Value::Tuple(vec![k.clone(), v.clone()]);
    match method {
        "get" => {
            arity(method, &args, 1, 2)?;
            Ok(dict_get(entries, &args[0])
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            Ok(Value::List(entries.iter().map(|(k, _)| k.clone()).collect()))
        }
        "values" => {
            Ok(Value::List(entries.iter().map(|(_, v)| v.clone()).collect()))
        }
        "items" => Ok(Value::List(entries.iter().map(pair).collect())),
        "most_common" => {
            arity(method, &args, 0, 1)?;
            let mut counted = entries.clone();
            let mut error = None;
            // Stable, so ties keep their insertion order.
            counted.sort_by(|(_, a), (_, b)| {
                b.py_cmp(a).unwrap_or_else(|err| {
                    error.get_or_insert(err);
                    Ordering::Equal
                })
            });
            if let Some(err) = error {
                return Err(err);
            }
            if let Some(n) = args.first().filter(|n| !matches!(n, Value::None))
            {
                let n = usize::try_from(int_arg(method, n)?).unwrap_or(0);
                counted.truncate(n);
            }
            Ok(Value::List(counted.iter().map(pair).collect()))
        }
        "pop" => {
            arity(method, &args, 1, 2)?;
            match entries.iter().position(|(k, _)| k.py_eq(&args[0])) {
                Some(idx) => Ok(entries.remove(idx).1),
                None => args.get(1).cloned().ok_or_else(|| {
                    ExecutionError::runtime(format!(
                        "KeyError: {}",
                        args[0].repr()
                    ))
                }),
            }
        }
        "setdefault" => {
            arity(method, &args, 1, 2)?;
            if let Some(existing) = dict_get(entries, &args[0]) {
                return Ok(existing.clone());
            }
            let default = args.get(1).cloned().unwrap_or(Value::None);
            entries.push((args[0].clone(), default.clone()));
            Ok(default)
        }
        "copy" => Ok(Value::Dict(entries.clone())),
        "clear" => {
            entries.clear();
            Ok(Value::None)
        }
        _ => Err(no_attribute("dict", method)),
    }
}

/// Calls a method of a builtin type. Mutating methods change `receiver`
/// in place.
pub(crate) fn call_method(
    receiver: &mut Value,
    method: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, ExecutionError> {
    match receiver {
        Value::Str(s) => {
            if method == "format" {
                return format_str(s, &args, &kwargs);
            }
            no_kwargs(method, &kwargs)?;
            str_method(s, method, &args)
        }
        Value::List(items) => list_method(items, method, args, kwargs),
        Value::Dict(entries) => dict_method(entries, method, args, kwargs),
        Value::Match(m) => {
            no_kwargs(method, &kwargs)?;
            modules::match_method(m, method, &args)
        }
        other => Err(no_attribute(other.type_name(), method)),
    }
}

/// Implements `str.format` for `{}`, `{0}` and `{name}` fields, with an
/// optional format spec.
fn format_str(
    template: &str,
    args: &[Value],
    kwargs: &Kwargs,
) -> Result<Value, ExecutionError> {
    let mut formatted = String::with_capacity(template.len());
    let mut auto_index = 0;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                formatted.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                formatted.push('}');
            }
            '{' => {
                let mut field = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    field.push(c);
                }
                let (name, spec) =
                    field.split_once(':').unwrap_or((field.as_str(), ""));
                let value = if name.is_empty() {
                    auto_index += 1;
                    args.get(auto_index - 1)
                } else if let Ok(idx) = name.parse::<usize>() {
                    args.get(idx)
                } else {
                    kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
                };
                let value = value.ok_or_else(|| {
                    ExecutionError::runtime(format!(
                        "IndexError: replacement field '{{{name}}}' has no \
                         value"
                    ))
                })?;
                let field = format_value(value, spec)?;
                check_size(formatted.len().checked_add(field.len()))?;
                formatted.push_str(&field);
            }
            c => formatted.push(c),
        }
    }
    Ok(Value::Str(formatted))
}

/// Reads the digits of a width or precision at `pos`, `None` if there are
/// none.
fn spec_number(
    chars: &[char],
    pos: &mut usize,
) -> Result<Option<usize>, ExecutionError> {
    let mut number = None;
    while let Some(d) = chars.get(*pos).and_then(|c| c.to_digit(10)) {
        let next = number
            .unwrap_or(0usize)
            .checked_mul(10)
            .and_then(|n| n.checked_add(d as usize))
            .filter(|n| *n <= MAX_VALUE_SIZE)
            .ok_or_else(too_large)?;
        number = Some(next);
        *pos += 1;
    }
    Ok(number)
}

/// Formats a value with a Python format spec, as in `f"{x:.2f}"`.
///
/// Supported: `[[fill]align][width][,|_][.precision][type]` with the types
/// `s`, `d`, `f`, `e` and `%`.
pub(crate) fn format_value(
    value: &Value,
    spec: &str,
) -> Result<String, ExecutionError> {
    if spec.is_empty() {
        return Ok(value.to_string());
    }
    let invalid = || value_error(format!("invalid format specifier '{spec}'"));

    let chars: Vec<char> = spec.chars().collect();
    let mut pos = 0;
    let mut fill = ' ';
    let mut align = None;
    if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
        fill = chars[0];
        align = Some(chars[1]);
        pos = 2;
    } else if matches!(chars.first(), Some('<' | '>' | '^')) {
        align = chars.first().copied();
        pos = 1;
    }
    if align.is_none() && chars.get(pos) == Some(&'0') {
        fill = '0';
        align = Some('>');
    }
    let width = spec_number(&chars, &mut pos)?.unwrap_or(0);
    let grouping = match chars.get(pos) {
        Some(&c @ (',' | '_')) => {
            pos += 1;
            Some(c)
        }
        _ => None,
    };
    let mut precision = None;
    if chars.get(pos) == Some(&'.') {
        pos += 1;
        precision = Some(spec_number(&chars, &mut pos)?.ok_or_else(invalid)?);
    }
    let ty = chars.get(pos).copied();
    if chars.len() > pos + usize::from(ty.is_some()) {
        return Err(invalid());
    }

    let number = value.as_f64();
    let mut body = match (ty, number) {
        (Some('f' | 'F'), Some(x)) => format!("{x:.*}", precision.unwrap_or(6)),
        (Some('%'), Some(x)) => {
            format!("{:.*}%", precision.unwrap_or(6), x * 100.0)
        }
        (Some('e'), Some(x)) => {
            let formatted = format!("{x:.*e}", precision.unwrap_or(6));
            let (mantissa, exponent) = formatted
                .split_once('e')
                .unwrap_or((formatted.as_str(), "0"));
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        (Some('d'), _) => match value {
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => i64::from(*b).to_string(),
            _ => return Err(invalid()),
        },
        (None, Some(x))
            if precision.is_some() && matches!(value, Value::Float(_)) =>
        {
            // Python's general format; close enough for display purposes.
            let formatted = format!("{x:.*}", precision.unwrap_or(6));
            repr_float(formatted.parse().unwrap_or(x))
        }
        (None | Some('s'), _) => {
            let text = value.to_string();
            match precision {
                Some(p) if matches!(value, Value::Str(_)) => {
                    text.chars().take(p).collect()
                }
                _ => text,
            }
        }
        _ => return Err(invalid()),
    };
    if let Some(sep) = grouping {
        body = group_digits(&body, sep);
    }

    let len = body.chars().count();
    if len >= width {
        return Ok(body);
    }
    let padding = width - len;
    let align = align.unwrap_or(if number.is_some() { '>' } else { '<' });
    let pad = |n: usize| fill.to_string().repeat(n);
    Ok(match align {
        '<' => format!("{body}{}", pad(padding)),
        '^' => {
            format!("{}{body}{}", pad(padding / 2), pad(padding - padding / 2))
        }
        _ => format!("{}{body}", pad(padding)),
    })
}

fn group_digits(number: &str, sep: char) -> String {
    let (sign, rest) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let split = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (int_part, tail) = rest.split_at(split);
    let mut grouped = String::with_capacity(number.len() + int_part.len() / 3);
    for (idx, c) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(sep);
        }
        grouped.push(c);
    }
    format!("{sign}{grouped}{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(value: &str) -> Value {
        Value::Str(value.to_owned())
    }

    fn ints(values: &[i64]) -> Value {
        Value::List(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_builtins() {
        let sorted = call_builtin(
            "sorted",
            vec![ints(&[3, 1, 2])],
            vec![("reverse".to_owned(), Value::Bool(true))],
        )
        .unwrap();
        assert_eq!(sorted.to_string(), "[3, 2, 1]");

        let range = call_builtin(
            "range",
            vec![Value::Int(10), Value::Int(0), Value::Int(-3)],
            vec![],
        )
        .unwrap();
        assert_eq!(range.to_string(), "[10, 7, 4, 1]");
        assert!(call_builtin("range", vec![Value::Int(1 << 40)], vec![])
            .is_err());

        let rounded =
            call_builtin("round", vec![Value::Float(2.5)], vec![]).unwrap();
        assert!(rounded.py_eq(&Value::Int(2)));
        let rounded = call_builtin(
            "round",
            vec![Value::Float(3.14159), Value::Int(2)],
            vec![],
        )
        .unwrap();
        assert_eq!(rounded.to_string(), "3.14");

        assert!(call_builtin("int", vec![s("12x")], vec![]).is_err());
        assert!(call_builtin("max", vec![ints(&[])], vec![]).is_err());
        assert_eq!(
            call_builtin("max", vec![Value::Int(3), Value::Float(4.5)], vec![])
                .unwrap()
                .to_string(),
            "4.5"
        );
    }

    #[test]
    fn test_methods() {
        let mut text = s("  Hello, World  ");
        let stripped = call_method(&mut text, "strip", vec![], vec![]).unwrap();
        assert_eq!(stripped.to_string(), "Hello, World");

        let mut csv = s("a,b,,c");
        let parts =
            call_method(&mut csv, "split", vec![s(",")], vec![]).unwrap();
        assert_eq!(parts.to_string(), "['a', 'b', '', 'c']");

        let mut list = ints(&[1]);
        call_method(&mut list, "append", vec![Value::Int(2)], vec![]).unwrap();
        let (at, value) = (Value::Int(0), Value::Int(0));
        call_method(&mut list, "insert", vec![at, value], vec![]).unwrap();
        assert_eq!(list.to_string(), "[0, 1, 2]");
        let popped = call_method(&mut list, "pop", vec![], vec![]).unwrap();
        assert!(popped.py_eq(&Value::Int(2)));

        let mut dict = Value::Dict(vec![]);
        let kwargs = vec![("a".to_owned(), Value::Int(1))];
        call_method(&mut dict, "update", vec![], kwargs).unwrap();
        let missing =
            call_method(&mut dict, "get", vec![s("b"), Value::Int(0)], vec![])
                .unwrap();
        assert!(missing.py_eq(&Value::Int(0)));
        assert_eq!(dict.to_string(), "{'a': 1}");
    }

    #[test]
    fn test_deque_and_counter_methods() {
        let mut deque = ints(&[1, 2]);
        call_method(&mut deque, "appendleft", vec![Value::Int(0)], vec![])
            .unwrap();
        let first = call_method(&mut deque, "popleft", vec![], vec![]).unwrap();
        assert!(first.py_eq(&Value::Int(0)));
        assert_eq!(deque.to_string(), "[1, 2]");
        let popped = call_method(&mut ints(&[]), "popleft", vec![], vec![]);
        assert!(popped.is_err());

        let mut counts = Value::Dict(vec![
            (s("a"), Value::Int(1)),
            (s("b"), Value::Int(3)),
            (s("c"), Value::Int(1)),
        ]);
        let top = call_method(&mut counts, "most_common", vec![], vec![])
            .unwrap();
        assert_eq!(top.to_string(), "[('b', 3), ('a', 1), ('c', 1)]");
        let top =
            call_method(&mut counts, "most_common", vec![Value::Int(1)], vec![])
                .unwrap();
        assert_eq!(top.to_string(), "[('b', 3)]");
    }

    #[test]
    fn test_growth_is_bounded() {
        let big = s(&"x".repeat(MAX_VALUE_SIZE / 2 + 1));
        let mut list = Value::List(vec![big.clone(), big.clone()]);
        let err =
            call_method(&mut s(""), "join", vec![list.clone()], vec![])
                .unwrap_err();
        assert!(err.detail().contains("too large for the sandbox"));
        let list_copy = list.clone();
        assert!(
            call_method(&mut list, "extend", vec![list_copy], vec![])
                .is_err()
        );
        let mut text = s(&"x".repeat(1000));
        assert!(call_method(
            &mut text,
            "replace",
            vec![s("x"), s(&"y".repeat(100_000))],
            vec![]
        )
        .is_err());
        let mut template = s("{}{}");
        let args = vec![big.clone(), big];
        assert!(call_method(&mut template, "format", args, vec![]).is_err());
    }

    #[test]
    fn test_format_value() {
        let pi = format_value(&Value::Float(3.14159), ".2f").unwrap();
        assert_eq!(pi, "3.14");
        let grouped = format_value(&Value::Int(1234567), ",").unwrap();
        assert_eq!(grouped, "1,234,567");
        assert_eq!(format_value(&Value::Float(0.256), ".1%").unwrap(), "25.6%");
        assert_eq!(format_value(&s("ab"), ">4").unwrap(), "  ab");
        assert_eq!(format_value(&s("ab"), "*^6").unwrap(), "**ab**");
        assert_eq!(format_value(&Value::Int(7), "03d").unwrap(), "007");
        assert!(format_value(&Value::Int(7), ".2q").is_err());
        assert!(format_value(&Value::Float(1.0), ".f").is_err());
    }

    #[test]
    fn test_format_value_rejects_huge_widths() {
        let err = format_value(&Value::Int(1), "99999999999999999999999")
            .unwrap_err();
        assert!(err.detail().contains("too large for the sandbox"));
        assert!(format_value(&Value::Int(1), "<99999999").is_err());
        assert!(format_value(&Value::Float(1.0), ".99999999999f").is_err());
        assert_eq!(format_value(&s("a"), "-<3").unwrap(), "a--");
    }
}
