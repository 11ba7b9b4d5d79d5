use std::cmp::Ordering;
use std::fmt;

use rustpython_parser::ast::{CmpOp, Operator};
use serde_json::{Map, Number};

use super::ExecutionError;

/// A value of the sandboxed interpreter.
#[derive(Clone, Debug)]
pub enum Value {
    /// `None`.
    None,
    /// A boolean.
    Bool(bool),
    /// An integer. Overflowing arithmetic is a runtime error.
    Int(i64),
    /// A float.
    Float(f64),
    /// A string.
    Str(String),
    /// A list.
    List(Vec<Value>),
    /// A tuple.
    Tuple(Vec<Value>),
    /// A dict, in insertion order.
    Dict(Vec<(Value, Value)>),
    /// An imported module.
    Module(String),
    /// A callable: a builtin, a module function or a tool.
    Function(String),
    /// A match returned by the `re` module.
    Match(Box<RegexMatch>),
}

/// A successful match of the `re` module.
#[derive(Clone, Debug, PartialEq)]
pub struct RegexMatch {
    /// Group 0 is the whole match, `None` for groups that didn't take part.
    pub(crate) groups: Vec<Option<MatchGroup>>,
    pub(crate) names: Vec<(String, usize)>,
}

/// A matched group, offsets count characters.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MatchGroup {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) text: String,
}

/// The largest value the sandbox builds, as measured by [`Value::size`].
pub(crate) const MAX_VALUE_SIZE: usize = 10_000_000;

/// The longest sequence a builtin such as `range()` produces.
pub(crate) const MAX_SEQUENCE_LEN: usize = 1_000_000;

pub(crate) fn too_large() -> ExecutionError {
    ExecutionError::runtime("MemoryError: result is too large for the sandbox")
}

/// Checks the size of a value about to be built, `None` meaning that
/// computing it overflowed.
pub(crate) fn check_size(size: Option<usize>) -> Result<usize, ExecutionError> {
    size.filter(|size| *size <= MAX_VALUE_SIZE)
        .ok_or_else(too_large)
}

impl Value {
    /// Returns the Python type name of the value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Module(_) => "module",
            Value::Function(_) => "function",
            Value::Match(_) => "re.Match",
        }
    }

    /// Returns the truthiness of the value.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.is_empty(),
            Value::Module(_) | Value::Function(_) | Value::Match(_) => true,
        }
    }

    /// Roughly how much memory the value takes: a unit per item and a unit
    /// per byte of string.
    pub(crate) fn size(&self) -> usize {
        match self {
            Value::Str(s) => s.len().max(1),
            Value::List(items) | Value::Tuple(items) => items_size(items),
            Value::Dict(entries) => {
                entries.iter().fold(1, |acc: usize, (k, v)| {
                    acc.saturating_add(k.size()).saturating_add(v.size())
                })
            }
            _ => 1,
        }
    }

    /// Returns the Python `repr()` of the value.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => repr_str(s),
            _ => self.to_string(),
        }
    }

    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Converts a tool result into a value.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Dict(
                map.into_iter()
                    .map(|(k, v)| (Value::Str(k), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts the value into a tool argument.
    pub fn to_json(&self) -> Result<serde_json::Value, ExecutionError> {
        Ok(match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) | Value::Tuple(items) => {
                serde_json::Value::Array(
                    items
                        .iter()
                        .map(Value::to_json)
                        .collect::<Result<_, _>>()?,
                )
            }
            Value::Dict(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = match key {
                        Value::Str(s) => s.clone(),
                        other => other.to_string(),
                    };
                    map.insert(key, value.to_json()?);
                }
                serde_json::Value::Object(map)
            }
            Value::Module(_) | Value::Function(_) | Value::Match(_) => {
                return Err(ExecutionError::runtime(format!(
                    "a {} can't be passed to a tool",
                    self.type_name()
                )));
            }
        })
    }

    /// Python `==`.
    pub fn py_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b))
            | (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        dict_get(b, k).is_some_and(|other| v.py_eq(other))
                    })
            }
            (Value::Module(a), Value::Module(b))
            | (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Match(a), Value::Match(b)) => a == b,
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => a == b,
                _ => match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                },
            },
        }
    }

    /// Python ordering, for `<` and friends and for sorting.
    pub fn py_cmp(&self, other: &Value) -> Result<Ordering, ExecutionError> {
        let ordering = match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b))
            | (Value::Tuple(a), Value::Tuple(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.py_cmp(y)? {
                        Ordering::Equal => continue,
                        ordering => return Ok(ordering),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                },
            },
        };
        ordering.ok_or_else(|| {
            ExecutionError::runtime(format!(
                "'<' not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))
        })
    }

    /// Python `in`.
    pub fn contains(&self, needle: &Value) -> Result<bool, ExecutionError> {
        match self {
            Value::Str(s) => match needle {
                Value::Str(n) => Ok(s.contains(n.as_str())),
                _ => Err(ExecutionError::runtime(format!(
                    "'in <string>' requires string as left operand, not {}",
                    needle.type_name()
                ))),
            },
            Value::List(items) | Value::Tuple(items) => {
                Ok(items.iter().any(|item| item.py_eq(needle)))
            }
            Value::Dict(entries) => Ok(dict_get(entries, needle).is_some()),
            _ => Err(ExecutionError::runtime(format!(
                "argument of type '{}' is not iterable",
                self.type_name()
            ))),
        }
    }

    /// Expands an iterable into its items.
    pub fn iterate(&self) -> Result<Vec<Value>, ExecutionError> {
        match self {
            Value::Str(s) => {
                Ok(s.chars().map(|c| Value::Str(c.to_string())).collect())
            }
            Value::List(items) | Value::Tuple(items) => Ok(items.clone()),
            Value::Dict(entries) => {
                Ok(entries.iter().map(|(k, _)| k.clone()).collect())
            }
            _ => Err(ExecutionError::runtime(format!(
                "'{}' object is not iterable",
                self.type_name()
            ))),
        }
    }
}

pub(crate) fn dict_get<'a>(
    entries: &'a [(Value, Value)],
    key: &Value,
) -> Option<&'a Value> {
    entries.iter().find(|(k, _)| k.py_eq(key)).map(|(_, v)| v)
}

pub(crate) fn dict_set(
    entries: &mut Vec<(Value, Value)>,
    key: Value,
    value: Value,
) {
    match entries.iter_mut().find(|(k, _)| k.py_eq(&key)) {
        Some((_, slot)) => *slot = value,
        None => entries.push((key, value)),
    }
}

fn overflow() -> ExecutionError {
    ExecutionError::runtime("integer overflow")
}

fn zero_division() -> ExecutionError {
    ExecutionError::runtime("division by zero")
}

fn unsupported_operands(op: &str, lhs: &Value, rhs: &Value) -> ExecutionError {
    ExecutionError::runtime(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn op_symbol(op: Operator) -> &'static str {
    match op {
        Operator::Add => "+",
        Operator::Sub => "-",
        Operator::Mult => "*",
        Operator::MatMult => "@",
        Operator::Div => "/",
        Operator::Mod => "%",
        Operator::Pow => "**",
        Operator::LShift => "<<",
        Operator::RShift => ">>",
        Operator::BitOr => "|",
        Operator::BitXor => "^",
        Operator::BitAnd => "&",
        Operator::FloorDiv => "//",
    }
}

fn items_size(items: &[Value]) -> usize {
    items
        .iter()
        .fold(1, |acc: usize, item| acc.saturating_add(item.size()))
}

fn repeat(items: &[Value], times: i64) -> Result<Vec<Value>, ExecutionError> {
    let times = usize::try_from(times).unwrap_or(0);
    if items.is_empty() || times == 0 {
        return Ok(Vec::new());
    }
    check_size(items_size(items).checked_mul(times))?;
    let mut repeated = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        repeated.extend_from_slice(items);
    }
    Ok(repeated)
}

fn concat(a: &[Value], b: &[Value]) -> Result<Vec<Value>, ExecutionError> {
    check_size(items_size(a).checked_add(items_size(b)))?;
    Ok(a.iter().chain(b).cloned().collect())
}

/// Applies a binary operator.
pub(crate) fn binary_op(
    op: Operator,
    lhs: &Value,
    rhs: &Value,
) -> Result<Value, ExecutionError> {
    match (op, lhs, rhs) {
        (Operator::Add, Value::Str(a), Value::Str(b)) => {
            check_size(a.len().checked_add(b.len()))?;
            return Ok(Value::Str(format!("{a}{b}")));
        }
        (Operator::Add, Value::List(a), Value::List(b)) => {
            return Ok(Value::List(concat(a, b)?));
        }
        (Operator::Add, Value::Tuple(a), Value::Tuple(b)) => {
            return Ok(Value::Tuple(concat(a, b)?));
        }
        (Operator::Mult, Value::Str(s), n) | (Operator::Mult, n, Value::Str(s))
            if n.as_i64().is_some() =>
        {
            let times = usize::try_from(n.as_i64().unwrap_or(0)).unwrap_or(0);
            if s.is_empty() || times == 0 {
                return Ok(Value::Str(String::new()));
            }
            check_size(s.len().checked_mul(times))?;
            return Ok(Value::Str(s.repeat(times)));
        }
        (Operator::Mult, Value::List(items), n)
        | (Operator::Mult, n, Value::List(items))
            if n.as_i64().is_some() =>
        {
            let times = n.as_i64().unwrap_or(0);
            return Ok(Value::List(repeat(items, times)?));
        }
        (Operator::Mult, Value::Tuple(items), n)
        | (Operator::Mult, n, Value::Tuple(items))
            if n.as_i64().is_some() =>
        {
            let times = n.as_i64().unwrap_or(0);
            return Ok(Value::Tuple(repeat(items, times)?));
        }
        (Operator::Mod, Value::Str(_), _) => {
            return Err(ExecutionError::unsupported(
                "printf-style string formatting, use an f-string instead",
            ));
        }
        (Operator::BitOr, Value::Dict(a), Value::Dict(b)) => {
            let mut merged = a.clone();
            for (k, v) in b {
                dict_set(&mut merged, k.clone(), v.clone());
            }
            return Ok(Value::Dict(merged));
        }
        _ => {}
    }

    if let (Some(a), Some(b)) = (lhs.as_i64(), rhs.as_i64()) {
        return int_op(op, a, b).ok_or_else(|| match op {
            Operator::Div | Operator::FloorDiv | Operator::Mod if b == 0 => {
                zero_division()
            }
            Operator::MatMult => unsupported_operands("@", lhs, rhs),
            _ => overflow(),
        });
    }
    let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
        return Err(unsupported_operands(op_symbol(op), lhs, rhs));
    };
    let value = match op {
        Operator::Add => a + b,
        Operator::Sub => a - b,
        Operator::Mult => a * b,
        Operator::Div if b == 0.0 => return Err(zero_division()),
        Operator::Div => a / b,
        Operator::FloorDiv if b == 0.0 => return Err(zero_division()),
        Operator::FloorDiv => (a / b).floor(),
        Operator::Mod if b == 0.0 => return Err(zero_division()),
        Operator::Mod => a - b * (a / b).floor(),
        Operator::Pow => a.powf(b),
        _ => return Err(unsupported_operands(op_symbol(op), lhs, rhs)),
    };
    Ok(Value::Float(value))
}

fn int_op(op: Operator, a: i64, b: i64) -> Option<Value> {
    let int = match op {
        Operator::Add => a.checked_add(b)?,
        Operator::Sub => a.checked_sub(b)?,
        Operator::Mult => a.checked_mul(b)?,
        Operator::Div => {
            if b == 0 {
                return None;
            }
            return Some(Value::Float(a as f64 / b as f64));
        }
        Operator::FloorDiv => {
            let q = a.checked_div(b)?;
            if (a % b != 0) && ((a < 0) != (b < 0)) { q - 1 } else { q }
        }
        Operator::Mod => {
            let r = a.checked_rem(b)?;
            if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }
        }
        Operator::Pow => {
            if b < 0 {
                return Some(Value::Float((a as f64).powf(b as f64)));
            }
            a.checked_pow(u32::try_from(b).ok()?)?
        }
        Operator::LShift => a.checked_shl(u32::try_from(b).ok()?)?,
        Operator::RShift => a.checked_shr(u32::try_from(b).ok()?)?,
        Operator::BitOr => a | b,
        Operator::BitXor => a ^ b,
        Operator::BitAnd => a & b,
        Operator::MatMult => return None,
    };
    Some(Value::Int(int))
}

/// Applies a comparison operator, except the identity ones.
pub(crate) fn compare(
    op: CmpOp,
    lhs: &Value,
    rhs: &Value,
) -> Result<bool, ExecutionError> {
    Ok(match op {
        CmpOp::Eq => lhs.py_eq(rhs),
        CmpOp::NotEq => !lhs.py_eq(rhs),
        CmpOp::Lt => lhs.py_cmp(rhs)? == Ordering::Less,
        CmpOp::LtE => lhs.py_cmp(rhs)? != Ordering::Greater,
        CmpOp::Gt => lhs.py_cmp(rhs)? == Ordering::Greater,
        CmpOp::GtE => lhs.py_cmp(rhs)? != Ordering::Less,
        CmpOp::In => rhs.contains(lhs)?,
        CmpOp::NotIn => !rhs.contains(lhs)?,
        // `is` is only meaningful for singletons here.
        CmpOp::Is => is_same(lhs, rhs),
        CmpOp::IsNot => !is_same(lhs, rhs),
    })
}

fn is_same(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => false,
    }
}

pub(crate) fn repr_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        // Python writes `1e+20` and `1.5e-05` where Rust writes `1e20` and
        // `1.5e-5`.
        let formatted = format!("{f:e}");
        let (mantissa, exponent) =
            formatted.split_once('e').unwrap_or((formatted.as_str(), "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(digits) => ('-', digits),
            None => ('+', exponent),
        };
        return format!("{mantissa}e{sign}{digits:0>2}");
    }
    if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

pub(crate) fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut repr = String::with_capacity(s.len() + 2);
    repr.push(quote);
    for c in s.chars() {
        match c {
            '\\' => repr.push_str("\\\\"),
            '\n' => repr.push_str("\\n"),
            '\r' => repr.push_str("\\r"),
            '\t' => repr.push_str("\\t"),
            c if c == quote => {
                repr.push('\\');
                repr.push(c);
            }
            c => repr.push(c),
        }
    }
    repr.push(quote);
    repr
}

fn write_items(
    f: &mut fmt::Formatter<'_>,
    items: &[Value],
) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        f.write_str(&item.repr())?;
    }
    Ok(())
}

/// Formats like Python `str()`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => f.write_str(&repr_float(*x)),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::Dict(entries) => {
                f.write_str("{")?;
                for (idx, (k, v)) in entries.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k.repr(), v.repr())?;
                }
                f.write_str("}")
            }
            Value::Module(name) => write!(f, "<module '{name}'>"),
            Value::Function(name) => write!(f, "<function {name}>"),
            Value::Match(m) => match m.groups.first() {
                Some(Some(whole)) => write!(
                    f,
                    "<re.Match object; span=({}, {}), match={}>",
                    whole.start,
                    whole.end,
                    repr_str(&whole.text)
                ),
                _ => f.write_str("<re.Match object>"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_render() {
        let value = Value::from_json(json!({
            "city": "Shanghai",
            "temp": 20,
            "rain": 0.5,
            "tags": ["it's", "sunny"],
            "alert": null,
        }));
        assert_eq!(
            value.to_string(),
            "{'city': 'Shanghai', 'temp': 20, 'rain': 0.5, \
             'tags': [\"it's\", 'sunny'], 'alert': None}"
        );
        assert_eq!(Value::Str("a\nb".to_owned()).repr(), "'a\\nb'");
        assert_eq!(Value::Tuple(vec![Value::Int(1)]).to_string(), "(1,)");
    }

    #[test]
    fn test_repr_float() {
        assert_eq!(repr_float(3.0), "3.0");
        assert_eq!(repr_float(1299.678), "1299.678");
        assert_eq!(repr_float(1e20), "1e+20");
        assert_eq!(repr_float(1.5e-5), "1.5e-05");
        assert_eq!(repr_float(f64::INFINITY), "inf");
    }

    #[test]
    fn test_arithmetic() {
        let int = |i| Value::Int(i);
        assert!(binary_op(Operator::Div, &int(7), &int(2))
            .unwrap()
            .py_eq(&Value::Float(3.5)));
        assert!(binary_op(Operator::FloorDiv, &int(-7), &int(2))
            .unwrap()
            .py_eq(&int(-4)));
        assert!(binary_op(Operator::Mod, &int(-7), &int(3))
            .unwrap()
            .py_eq(&int(2)));
        assert!(binary_op(Operator::Pow, &int(2), &int(10))
            .unwrap()
            .py_eq(&int(1024)));
        assert!(binary_op(Operator::Add, &int(1), &Value::Float(0.5))
            .unwrap()
            .py_eq(&Value::Float(1.5)));
        assert!(binary_op(Operator::Div, &int(1), &int(0)).is_err());
        assert!(binary_op(Operator::Mult, &int(i64::MAX), &int(2)).is_err());
        assert!(
            binary_op(Operator::Add, &int(1), &Value::Str("a".into())).is_err()
        );
    }

    #[test]
    fn test_compare() {
        let list = Value::List(vec![Value::Int(1), Value::Str("a".into())]);
        assert!(compare(CmpOp::In, &Value::Int(1), &list).unwrap());
        assert!(compare(CmpOp::NotIn, &Value::Int(2), &list).unwrap());
        assert!(
            compare(CmpOp::Eq, &Value::Int(1), &Value::Float(1.0)).unwrap()
        );
        assert!(compare(CmpOp::Is, &Value::None, &Value::None).unwrap());
        assert!(
            compare(CmpOp::Lt, &Value::Str("a".into()), &Value::Int(1)).is_err()
        );
    }

    #[test]
    fn test_oversized_results() {
        let huge = Value::Int(1 << 62);
        let err = binary_op(Operator::Mult, &Value::Str("ab".into()), &huge)
            .unwrap_err();
        assert!(err.detail().contains("too large for the sandbox"));

        let pair = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert!(binary_op(Operator::Mult, &pair, &huge).is_err());
        assert!(binary_op(Operator::Mult, &huge, &pair).is_err());
        let tuple = Value::Tuple(vec![Value::None]);
        assert!(binary_op(Operator::Mult, &tuple, &huge).is_err());

        // Doubling a string by concatenation stops at the size limit.
        let mut s = Value::Str("ab".into());
        let mut doublings = 0;
        while let Ok(doubled) = binary_op(Operator::Add, &s, &s) {
            s = doubled;
            doublings += 1;
        }
        assert_eq!(doublings, 22);

        let empty = Value::List(vec![]);
        let repeated = binary_op(Operator::Mult, &empty, &huge).unwrap();
        assert_eq!(repeated.to_string(), "[]");
        let repeated =
            binary_op(Operator::Mult, &Value::Str("ab".into()), &Value::Int(3))
                .unwrap();
        assert_eq!(repeated.to_string(), "ababab");
        assert_eq!(
            binary_op(Operator::Mult, &Value::Int(-1), &pair)
                .unwrap()
                .to_string(),
            "[]"
        );
    }
}
