//! Standard library modules implemented by the sandbox.
//!
//! Each module lists its functions and dispatches calls by name. The
//! sandbox values stand in for the module types: `collections.Counter`
//! builds a dict, `collections.deque` a list, `itertools` functions return
//! lists instead of lazy iterators.

mod collections;
mod itertools;
mod math;
mod random;
mod re;
mod statistics;
mod time;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::ExecutionError;
use super::builtins::{Kwargs, type_error};
use super::value::Value;

pub(crate) use re::match_method;

/// Modules implemented by the sandbox. Other authorized modules can be
/// imported, but nothing can be used from them.
pub(crate) const IMPLEMENTED_MODULES: &[&str] = &[
    "collections",
    "itertools",
    "math",
    "random",
    "re",
    "statistics",
    "time",
];

/// State of the modules that lives as long as the executor.
pub(crate) struct ModuleState {
    rng: StdRng,
}

impl Default for ModuleState {
    fn default() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

#[inline]
pub(crate) fn is_implemented(module: &str) -> bool {
    IMPLEMENTED_MODULES.contains(&module)
}

fn functions(module: &str) -> &'static [&'static str] {
    match module {
        "collections" => collections::FUNCTIONS,
        "itertools" => itertools::FUNCTIONS,
        "math" => math::FUNCTIONS,
        "random" => random::FUNCTIONS,
        "re" => re::FUNCTIONS,
        "statistics" => statistics::FUNCTIONS,
        "time" => time::FUNCTIONS,
        _ => &[],
    }
}

/// Returns an attribute of a module that is not a function.
pub(crate) fn constant(module: &str, attr: &str) -> Option<Value> {
    match module {
        "math" => math::constant(attr),
        "re" => re::constant(attr),
        _ => None,
    }
}

/// Returns `true` if the module has a function named `attr`.
#[inline]
pub(crate) fn has_function(module: &str, attr: &str) -> bool {
    functions(module).contains(&attr)
}

/// Returns `true` if the function updates its first argument in place.
/// Such functions return the updated value, the interpreter stores it.
#[inline]
pub(crate) fn mutates_first_argument(function: &str) -> bool {
    function == "random.shuffle"
}

/// Calls a function of an implemented module.
pub(crate) fn call(
    module: &str,
    function: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
    state: &mut ModuleState,
) -> Result<Value, ExecutionError> {
    if !has_function(module, function) {
        return Err(ExecutionError::runtime(format!(
            "AttributeError: module '{module}' has no attribute '{function}'"
        )));
    }
    let name = format!("{module}.{function}");
    match module {
        "collections" => collections::call(&name, function, args, kwargs),
        "itertools" => itertools::call(&name, function, args, kwargs),
        "math" => math::call(&name, function, args, kwargs),
        "random" => {
            random::call(&name, function, args, kwargs, &mut state.rng)
        }
        "re" => re::call(&name, function, args, kwargs),
        "statistics" => statistics::call(&name, function, args, kwargs),
        _ => time::call(&name, function, args, kwargs),
    }
}

/// Binds positional and keyword arguments to `params`, the first
/// `required` of which must be given.
fn bind(
    name: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
    params: &[&str],
    required: usize,
) -> Result<Vec<Option<Value>>, ExecutionError> {
    if args.len() > params.len() {
        return Err(type_error(format!(
            "{name}() takes at most {} arguments ({} given)",
            params.len(),
            args.len()
        )));
    }
    let mut bound: Vec<Option<Value>> = args.into_iter().map(Some).collect();
    bound.resize(params.len(), None);
    for (key, value) in kwargs {
        let Some(idx) = params.iter().position(|param| *param == key) else {
            return Err(type_error(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        };
        if bound[idx].is_some() {
            return Err(type_error(format!(
                "{name}() got multiple values for argument '{key}'"
            )));
        }
        bound[idx] = Some(value);
    }
    if let Some(missing) = bound[..required].iter().position(Option::is_none) {
        return Err(type_error(format!(
            "{name}() missing required argument '{}'",
            params[missing]
        )));
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind() {
        let bound = bind(
            "re.sub",
            vec![Value::Int(1), Value::Int(2)],
            vec![("count".to_owned(), Value::Int(3))],
            &["pattern", "repl", "string", "count"],
            3,
        );
        assert!(bound.is_err());

        let bound = bind(
            "re.sub",
            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
            vec![("count".to_owned(), Value::Int(4))],
            &["pattern", "repl", "string", "count", "flags"],
            3,
        )
        .unwrap();
        assert!(bound[3].as_ref().is_some_and(|v| v.py_eq(&Value::Int(4))));
        assert!(bound[4].is_none());

        let err = bind(
            "random.seed",
            vec![Value::Int(1)],
            vec![("a".to_owned(), Value::Int(2))],
            &["a"],
            0,
        )
        .unwrap_err();
        assert!(err.detail().contains("multiple values"));
    }

    #[test]
    fn test_dispatch() {
        let mut state = ModuleState::default();
        assert!(has_function("math", "sqrt"));
        assert!(!has_function("math", "system"));
        assert!(constant("math", "pi").is_some());
        assert!(call("math", "system", vec![], vec![], &mut state).is_err());
        let sqrt =
            call("math", "sqrt", vec![Value::Int(16)], vec![], &mut state)
                .unwrap();
        assert!(sqrt.py_eq(&Value::Float(4.0)));
        assert!(mutates_first_argument("random.shuffle"));
        assert!(!is_implemented("datetime"));
    }
}
