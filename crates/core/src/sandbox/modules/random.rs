use std::hash::{DefaultHasher, Hash, Hasher};

use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};

use super::bind;
use crate::sandbox::ExecutionError;
use crate::sandbox::builtins::{
    Kwargs, arity, float_arg, int_arg, no_kwargs, type_error, value_error,
};
use crate::sandbox::value::{MAX_SEQUENCE_LEN, Value};

pub(super) const FUNCTIONS: &[&str] = &[
    "choice", "choices", "gauss", "randint", "random", "randrange", "sample",
    "seed", "shuffle", "uniform",
];

fn index_error(detail: &str) -> ExecutionError {
    ExecutionError::runtime(format!("IndexError: {detail}"))
}

/// Picks an integer of `start..stop` stepping by `step`.
fn randrange(
    rng: &mut StdRng,
    start: i64,
    stop: i64,
    step: i64,
) -> Result<Value, ExecutionError> {
    if step == 0 {
        return Err(value_error("zero step for randrange()".to_owned()));
    }
    let (start, stop, step) =
        (i128::from(start), i128::from(stop), i128::from(step));
    let len = if step > 0 {
        (stop - start + step - 1) / step
    } else {
        (start - stop - step - 1) / -step
    };
    if len <= 0 {
        return Err(value_error(format!(
            "empty range in randrange({start}, {stop}, {step})"
        )));
    }
    let picked = start + rng.random_range(0..len) * step;
    Ok(Value::Int(picked as i64))
}

fn choices(
    name: &str,
    rng: &mut StdRng,
    population: Vec<Value>,
    weights: Option<Value>,
    k: i64,
) -> Result<Value, ExecutionError> {
    let k = usize::try_from(k).unwrap_or(0);
    if k > MAX_SEQUENCE_LEN {
        return Err(value_error(format!("{name}() k is too large")));
    }
    if population.is_empty() {
        if k == 0 {
            return Ok(Value::List(Vec::new()));
        }
        return Err(index_error("cannot choose from an empty sequence"));
    }
    let Some(weights) = weights.filter(|w| !matches!(w, Value::None)) else {
        let picked = (0..k)
            .filter_map(|_| population.choose(rng).cloned())
            .collect();
        return Ok(Value::List(picked));
    };
    let mut cumulative = Vec::with_capacity(population.len());
    let mut total = 0.0;
    for weight in weights.iterate()? {
        total += float_arg(name, &weight)?;
        cumulative.push(total);
    }
    if cumulative.len() != population.len() {
        return Err(value_error(
            "the number of weights does not match the population".to_owned(),
        ));
    }
    if !(total > 0.0 && total.is_finite()) {
        return Err(value_error(
            "total of weights must be greater than zero".to_owned(),
        ));
    }
    let picked = (0..k)
        .map(|_| {
            let point = rng.random::<f64>() * total;
            let idx = cumulative.partition_point(|c| *c <= point);
            population[idx.min(population.len() - 1)].clone()
        })
        .collect();
    Ok(Value::List(picked))
}

pub(super) fn call(
    name: &str,
    function: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
    rng: &mut StdRng,
) -> Result<Value, ExecutionError> {
    match function {
        "seed" => {
            let bound = bind(name, args, kwargs, &["a"], 0)?;
            *rng = match bound.into_iter().next().flatten() {
                None | Some(Value::None) => StdRng::from_os_rng(),
                Some(Value::Int(seed)) => StdRng::seed_from_u64(seed as u64),
                Some(Value::Str(seed)) => {
                    let mut hasher = DefaultHasher::new();
                    seed.hash(&mut hasher);
                    StdRng::seed_from_u64(hasher.finish())
                }
                Some(other) => {
                    return Err(type_error(format!(
                        "{name}() expected an int or a str, got '{}'",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::None)
        }
        "choices" => {
            let mut bound = bind(
                name,
                args,
                kwargs,
                &["population", "weights", "k"],
                1,
            )?;
            let k = match bound[2].take() {
                Some(k) => int_arg(name, &k)?,
                None => 1,
            };
            let weights = bound[1].take();
            let population = match bound[0].take() {
                Some(population) => population.iterate()?,
                None => Vec::new(),
            };
            choices(name, rng, population, weights, k)
        }
        "sample" => {
            let bound = bind(name, args, kwargs, &["population", "k"], 2)?;
            let (Some(population), Some(k)) = (&bound[0], &bound[1]) else {
                return Ok(Value::List(Vec::new()));
            };
            let population = population.iterate()?;
            let k = usize::try_from(int_arg(name, k)?)
                .ok()
                .filter(|k| *k <= population.len())
                .ok_or_else(|| {
                    value_error(
                        "sample larger than population or is negative"
                            .to_owned(),
                    )
                })?;
            let picked = rand::seq::index::sample(rng, population.len(), k)
                .into_iter()
                .map(|idx| population[idx].clone())
                .collect();
            Ok(Value::List(picked))
        }
        "randrange" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 3)?;
            let ints = args
                .iter()
                .map(|arg| int_arg(name, arg))
                .collect::<Result<Vec<_>, _>>()?;
            match ints[..] {
                [stop] => randrange(rng, 0, stop, 1),
                [start, stop] => randrange(rng, start, stop, 1),
                [start, stop, step] => randrange(rng, start, stop, step),
                _ => Ok(Value::None),
            }
        }
        _ => {
            no_kwargs(name, &kwargs)?;
            call_positional(name, function, args, rng)
        }
    }
}

fn call_positional(
    name: &str,
    function: &str,
    mut args: Vec<Value>,
    rng: &mut StdRng,
) -> Result<Value, ExecutionError> {
    match function {
        "random" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Float(rng.random::<f64>()))
        }
        "uniform" => {
            arity(name, &args, 2, 2)?;
            let a = float_arg(name, &args[0])?;
            let b = float_arg(name, &args[1])?;
            Ok(Value::Float(a + (b - a) * rng.random::<f64>()))
        }
        "randint" => {
            arity(name, &args, 2, 2)?;
            let a = int_arg(name, &args[0])?;
            let b = int_arg(name, &args[1])?;
            if a > b {
                return Err(value_error(format!(
                    "empty range in randint({a}, {b})"
                )));
            }
            Ok(Value::Int(rng.random_range(a..=b)))
        }
        "gauss" => {
            arity(name, &args, 0, 2)?;
            let mu = args.first().map_or(Ok(0.0), |v| float_arg(name, v))?;
            let sigma = args.get(1).map_or(Ok(1.0), |v| float_arg(name, v))?;
            // Box-Muller, with u1 in (0, 1].
            let u1 = 1.0 - rng.random::<f64>();
            let u2 = rng.random::<f64>();
            let angle = std::f64::consts::TAU * u2;
            let z = (-2.0 * u1.ln()).sqrt() * angle.cos();
            Ok(Value::Float(mu + sigma * z))
        }
        "choice" => {
            arity(name, &args, 1, 1)?;
            args[0].iterate()?.choose(rng).cloned().ok_or_else(|| {
                index_error("cannot choose from an empty sequence")
            })
        }
        "shuffle" => {
            arity(name, &args, 1, 1)?;
            match args.pop() {
                Some(Value::List(mut items)) => {
                    items.shuffle(rng);
                    Ok(Value::List(items))
                }
                Some(other) => Err(type_error(format!(
                    "{name}() expected a list, got '{}'",
                    other.type_name()
                ))),
                None => Ok(Value::None),
            }
        }
        _ => Err(ExecutionError::runtime(format!(
            "AttributeError: module 'random' has no attribute '{function}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random(
        rng: &mut StdRng,
        function: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, ExecutionError> {
        call(&format!("random.{function}"), function, args, kwargs, rng)
    }

    fn ints(values: &[i64]) -> Value {
        Value::List(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_seeded_draws_repeat() {
        let mut rng = StdRng::from_os_rng();
        let mut draws = Vec::new();
        for _ in 0..2 {
            random(&mut rng, "seed", vec![Value::Int(42)], vec![]).unwrap();
            let draw = random(&mut rng, "random", vec![], vec![]).unwrap();
            let pick = random(
                &mut rng,
                "choice",
                vec![Value::Str("abcdef".to_owned())],
                vec![],
            )
            .unwrap();
            draws.push(format!("{draw} {pick}"));
        }
        assert_eq!(draws[0], draws[1]);
        assert!(
            random(&mut rng, "seed", vec![Value::Float(1.5)], vec![]).is_err()
        );
    }

    #[test]
    fn test_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let n = random(
                &mut rng,
                "randint",
                vec![Value::Int(1), Value::Int(6)],
                vec![],
            )
            .unwrap();
            assert!((1..=6).contains(&n.as_i64().unwrap()));

            let n = random(
                &mut rng,
                "randrange",
                vec![Value::Int(10), Value::Int(0), Value::Int(-3)],
                vec![],
            )
            .unwrap();
            assert!([10, 7, 4, 1].contains(&n.as_i64().unwrap()));

            let x = random(
                &mut rng,
                "uniform",
                vec![Value::Int(2), Value::Int(3)],
                vec![],
            )
            .unwrap();
            assert!((2.0..=3.0).contains(&x.as_f64().unwrap()));
        }
        let empty = random(
            &mut rng,
            "randint",
            vec![Value::Int(2), Value::Int(1)],
            vec![],
        );
        assert!(empty.unwrap_err().detail().contains("ValueError"));
        let empty =
            random(&mut rng, "randrange", vec![Value::Int(0)], vec![]);
        assert!(empty.is_err());
    }

    #[test]
    fn test_sequences() {
        let mut rng = StdRng::seed_from_u64(7);
        let shuffled =
            random(&mut rng, "shuffle", vec![ints(&[1, 2, 3, 4])], vec![])
                .unwrap();
        let Value::List(mut items) = shuffled else {
            panic!("shuffle returns a list");
        };
        sort_ints(&mut items);
        assert!(Value::List(items).py_eq(&ints(&[1, 2, 3, 4])));

        let sample = random(
            &mut rng,
            "sample",
            vec![ints(&[1, 2, 3, 4]), Value::Int(4)],
            vec![],
        )
        .unwrap();
        let Value::List(mut items) = sample else {
            panic!("sample returns a list");
        };
        sort_ints(&mut items);
        assert!(Value::List(items).py_eq(&ints(&[1, 2, 3, 4])));
        let too_many = random(
            &mut rng,
            "sample",
            vec![ints(&[1, 2]), Value::Int(3)],
            vec![],
        );
        assert!(too_many.is_err());

        let picked = random(
            &mut rng,
            "choices",
            vec![ints(&[1, 2, 3])],
            vec![
                ("weights".to_owned(), ints(&[0, 0, 1])),
                ("k".to_owned(), Value::Int(5)),
            ],
        )
        .unwrap();
        assert!(picked.py_eq(&ints(&[3, 3, 3, 3, 3])));

        let empty = random(&mut rng, "choice", vec![ints(&[])], vec![]);
        assert!(empty.unwrap_err().detail().contains("IndexError"));
        let tuple = random(
            &mut rng,
            "shuffle",
            vec![Value::Tuple(vec![Value::Int(1)])],
            vec![],
        );
        assert!(tuple.is_err());
    }

    fn sort_ints(items: &mut [Value]) {
        items.sort_by_key(|item| item.as_i64());
    }
}
