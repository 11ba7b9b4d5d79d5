use rustpython_parser::ast::Operator;

use super::bind;
use crate::sandbox::ExecutionError;
use crate::sandbox::builtins::{
    Kwargs, arity, call_builtin, int_arg, is_builtin, no_kwargs, take_kwarg,
    type_error, value_error,
};
use crate::sandbox::value::{
    MAX_SEQUENCE_LEN, Value, binary_op, check_size, too_large,
};

pub(super) const FUNCTIONS: &[&str] = &[
    "accumulate", "chain", "combinations", "combinations_with_replacement",
    "count", "cycle", "groupby", "islice", "pairwise", "permutations",
    "product", "repeat", "zip_longest",
];

/// Checks how many tuples of `width` items a function is about to produce.
fn check_count(
    count: Option<u128>,
    width: usize,
) -> Result<usize, ExecutionError> {
    let count = count
        .filter(|count| *count <= MAX_SEQUENCE_LEN as u128)
        .map(|count| count as usize)
        .ok_or_else(too_large)?;
    check_size(count.checked_mul(width.max(1)))?;
    Ok(count)
}

/// `n! / (n - k)!`, or `None` when it overflows.
fn arrangements(n: usize, k: usize) -> Option<u128> {
    (0..k).try_fold(1u128, |acc, i| acc.checked_mul((n - i) as u128))
}

/// `C(n, k)`, or `None` when it overflows.
fn binomial(n: usize, k: usize) -> Option<u128> {
    (0..k).try_fold(1u128, |acc, i| {
        Some(acc.checked_mul((n - i) as u128)? / (i as u128 + 1))
    })
}

/// Visits the increasing index tuples of length `k` drawn from `0..n`,
/// with repeated indices when `repeat` is set.
fn combinations(
    pool: &[Value],
    k: usize,
    repeat: bool,
) -> Result<Vec<Value>, ExecutionError> {
    let n = pool.len();
    let count = if repeat {
        if n == 0 {
            Some(u128::from(k == 0))
        } else {
            binomial(n + k - 1, k)
        }
    } else if k > n {
        Some(0)
    } else {
        binomial(n, k)
    };
    let count = check_count(count, k)?;
    if count == 0 {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(count);
    let mut indices: Vec<usize> =
        if repeat { vec![0; k] } else { (0..k).collect() };
    loop {
        out.push(Value::Tuple(
            indices.iter().map(|i| pool[*i].clone()).collect(),
        ));
        // Rightmost index that can still move.
        let Some(i) = (0..k).rev().find(|&i| {
            if repeat {
                indices[i] != n - 1
            } else {
                indices[i] != i + n - k
            }
        }) else {
            return Ok(out);
        };
        indices[i] += 1;
        for j in i + 1..k {
            indices[j] = if repeat { indices[i] } else { indices[j - 1] + 1 };
        }
    }
}

fn permutations(
    pool: &[Value],
    k: usize,
) -> Result<Vec<Value>, ExecutionError> {
    let n = pool.len();
    if k > n {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(check_count(arrangements(n, k), k)?);
    let mut chosen = Vec::with_capacity(k);
    let mut used = vec![false; n];
    permute(pool, k, &mut chosen, &mut used, &mut out);
    Ok(out)
}

fn permute(
    pool: &[Value],
    k: usize,
    chosen: &mut Vec<usize>,
    used: &mut [bool],
    out: &mut Vec<Value>,
) {
    if chosen.len() == k {
        let tuple = chosen.iter().map(|i| pool[*i].clone()).collect();
        out.push(Value::Tuple(tuple));
        return;
    }
    for i in 0..pool.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        chosen.push(i);
        permute(pool, k, chosen, used, out);
        chosen.pop();
        used[i] = false;
    }
}

fn product(pools: &[Vec<Value>]) -> Result<Vec<Value>, ExecutionError> {
    let count = pools
        .iter()
        .try_fold(1u128, |acc, pool| acc.checked_mul(pool.len() as u128));
    let count = check_count(count, pools.len())?;
    if count == 0 {
        return Ok(Vec::new());
    }
    let mut out: Vec<Vec<Value>> = Vec::with_capacity(count);
    out.push(Vec::new());
    for pool in pools {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                pool.iter().map(move |item| {
                    let mut tuple = prefix.clone();
                    tuple.push(item.clone());
                    tuple
                })
            })
            .collect();
    }
    Ok(out.into_iter().map(Value::Tuple).collect())
}

/// Converts an `islice()` bound, `None` meaning the default.
fn slice_bound(
    name: &str,
    value: Option<&Value>,
    default: usize,
) -> Result<usize, ExecutionError> {
    match value {
        None | Some(Value::None) => Ok(default),
        Some(value) => usize::try_from(int_arg(name, value)?).map_err(|_| {
            value_error(format!(
                "indices for {name}() must be None or non-negative integers"
            ))
        }),
    }
}

fn groupby(
    name: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, ExecutionError> {
    let mut bound = bind(name, args, kwargs, &["iterable", "key"], 1)?;
    let key = match bound[1].take() {
        None | Some(Value::None) => None,
        Some(Value::Function(function)) if is_builtin(&function) => {
            Some(function)
        }
        Some(other) => {
            return Err(type_error(format!(
                "{name}() key must be a builtin function such as len or str, \
                 got '{}'",
                other.type_name()
            )));
        }
    };
    let items = match bound[0].take() {
        Some(iterable) => iterable.iterate()?,
        None => Vec::new(),
    };
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    for item in items {
        let group_key = match &key {
            Some(function) => {
                call_builtin(function, vec![item.clone()], Vec::new())?
            }
            None => item.clone(),
        };
        match groups.last_mut() {
            Some((last, members)) if last.py_eq(&group_key) => {
                members.push(item)
            }
            _ => groups.push((group_key, vec![item])),
        }
    }
    Ok(Value::List(
        groups
            .into_iter()
            .map(|(key, members)| Value::Tuple(vec![key, Value::List(members)]))
            .collect(),
    ))
}

pub(super) fn call(
    name: &str,
    function: &str,
    args: Vec<Value>,
    mut kwargs: Kwargs,
) -> Result<Value, ExecutionError> {
    match function {
        "chain" => {
            no_kwargs(name, &kwargs)?;
            let mut out = Vec::new();
            for iterable in &args {
                out.extend(iterable.iterate()?);
                if out.len() > MAX_SEQUENCE_LEN {
                    return Err(too_large());
                }
            }
            Ok(Value::List(out))
        }
        "combinations" | "combinations_with_replacement" | "permutations" => {
            let params = ["iterable", "r"];
            let required = if function == "permutations" { 1 } else { 2 };
            let bound = bind(name, args, kwargs, &params, required)?;
            let pool = match &bound[0] {
                Some(iterable) => iterable.iterate()?,
                None => Vec::new(),
            };
            let r = match &bound[1] {
                None | Some(Value::None) => pool.len(),
                Some(r) => usize::try_from(int_arg(name, r)?).map_err(|_| {
                    value_error("r must be non-negative".to_owned())
                })?,
            };
            let out = match function {
                "permutations" => permutations(&pool, r)?,
                "combinations" => combinations(&pool, r, false)?,
                _ => combinations(&pool, r, true)?,
            };
            Ok(Value::List(out))
        }
        "product" => {
            let repeat = match take_kwarg(&mut kwargs, "repeat") {
                Some(repeat) => usize::try_from(int_arg(name, &repeat)?)
                    .map_err(|_| {
                        value_error(
                            "repeat argument cannot be negative".to_owned(),
                        )
                    })?,
                None => 1,
            };
            no_kwargs(name, &kwargs)?;
            let pools = args
                .iter()
                .map(Value::iterate)
                .collect::<Result<Vec<_>, _>>()?;
            check_count(
                pools.len().checked_mul(repeat).map(|n| n as u128),
                1,
            )?;
            let pools: Vec<Vec<Value>> = std::iter::repeat_n(pools, repeat)
                .flatten()
                .collect();
            Ok(Value::List(product(&pools)?))
        }
        "accumulate" => {
            let initial = take_kwarg(&mut kwargs, "initial");
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let mut out: Vec<Value> = initial.into_iter().collect();
            let mut size = out.iter().map(Value::size).sum::<usize>();
            for item in args[0].iterate()? {
                let next = match out.last() {
                    Some(total) => binary_op(Operator::Add, total, &item)?,
                    None => item,
                };
                size = check_size(size.checked_add(next.size()))?;
                out.push(next);
            }
            Ok(Value::List(out))
        }
        "groupby" => groupby(name, args, kwargs),
        "islice" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 2, 4)?;
            let items = args[0].iterate()?;
            let (start, stop, step) = if args.len() == 2 {
                (0, slice_bound(name, args.get(1), items.len())?, 1)
            } else {
                (
                    slice_bound(name, args.get(1), 0)?,
                    slice_bound(name, args.get(2), items.len())?,
                    slice_bound(name, args.get(3), 1)?,
                )
            };
            if step == 0 {
                return Err(value_error(format!(
                    "step for {name}() must be a positive integer"
                )));
            }
            let stop = stop.min(items.len());
            Ok(Value::List(
                items
                    .into_iter()
                    .take(stop)
                    .skip(start)
                    .step_by(step)
                    .collect(),
            ))
        }
        "pairwise" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let items = args[0].iterate()?;
            Ok(Value::List(
                items
                    .windows(2)
                    .map(|pair| Value::Tuple(pair.to_vec()))
                    .collect(),
            ))
        }
        "repeat" => {
            let bound = bind(name, args, kwargs, &["object", "times"], 1)?;
            let Some(times) = &bound[1] else {
                return Err(ExecutionError::runtime(
                    "NotImplementedError: an endless itertools.repeat() is not \
                     supported in the sandbox, pass times",
                ));
            };
            let times = usize::try_from(int_arg(name, times)?).unwrap_or(0);
            let object = bound[0].clone().unwrap_or(Value::None);
            check_count(Some(times as u128), object.size())?;
            Ok(Value::List(vec![object; times]))
        }
        "zip_longest" => {
            let fill =
                take_kwarg(&mut kwargs, "fillvalue").unwrap_or(Value::None);
            no_kwargs(name, &kwargs)?;
            let columns = args
                .iter()
                .map(Value::iterate)
                .collect::<Result<Vec<_>, _>>()?;
            let len = columns.iter().map(Vec::len).max().unwrap_or(0);
            Ok(Value::List(
                (0..len)
                    .map(|i| {
                        Value::Tuple(
                            columns
                                .iter()
                                .map(|column| {
                                    column.get(i).unwrap_or(&fill).clone()
                                })
                                .collect(),
                        )
                    })
                    .collect(),
            ))
        }
        "count" | "cycle" => Err(ExecutionError::runtime(format!(
            "NotImplementedError: {name}() never ends and is not supported in \
             the sandbox, use range() or a bounded loop"
        ))),
        _ => Err(ExecutionError::runtime(format!(
            "AttributeError: module 'itertools' has no attribute '{function}'"
        ))),
    }
}
