//! `re`, on top of the `regex` crate.
//!
//! Patterns use the syntax of `regex`, which covers most Python patterns
//! but has no lookaround and no backreferences.

use regex::{Captures, Regex, RegexBuilder};

use super::bind;
use crate::sandbox::ExecutionError;
use crate::sandbox::builtins::{Kwargs, arity, int_arg, no_attribute, str_arg};
use crate::sandbox::value::{
    MatchGroup, RegexMatch, Value, check_size, dict_set,
};

pub(super) const FUNCTIONS: &[&str] = &[
    "compile", "escape", "findall", "finditer", "fullmatch", "match",
    "search", "split", "sub", "subn",
];

const IGNORECASE: i64 = 2;
const MULTILINE: i64 = 8;
const DOTALL: i64 = 16;
const VERBOSE: i64 = 64;

pub(super) fn constant(attr: &str) -> Option<Value> {
    let flag = match attr {
        "I" | "IGNORECASE" => IGNORECASE,
        "M" | "MULTILINE" => MULTILINE,
        "S" | "DOTALL" => DOTALL,
        "X" | "VERBOSE" => VERBOSE,
        // Unicode matching is the default of `regex` too.
        "U" | "UNICODE" => 32,
        _ => return None,
    };
    Some(Value::Int(flag))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Anchor {
    None,
    Start,
    Full,
}

fn compile(
    name: &str,
    pattern: &Value,
    flags: Option<&Value>,
    anchor: Anchor,
) -> Result<Regex, ExecutionError> {
    let pattern = str_arg(name, pattern)?;
    let flags = match flags {
        Some(flags) => int_arg(name, flags)?,
        None => 0,
    };
    let verbose = flags & VERBOSE != 0;
    // A trailing comment of a verbose pattern would swallow the `)`.
    let close = if verbose { "\n)" } else { ")" };
    let pattern = match anchor {
        Anchor::None => pattern.to_owned(),
        Anchor::Start => format!(r"\A(?:{pattern}{close}"),
        Anchor::Full => format!(r"\A(?:{pattern}{close}\z"),
    };
    RegexBuilder::new(&pattern)
        .case_insensitive(flags & IGNORECASE != 0)
        .multi_line(flags & MULTILINE != 0)
        .dot_matches_new_line(flags & DOTALL != 0)
        .ignore_whitespace(verbose)
        .build()
        .map_err(|err| ExecutionError::runtime(format!("re.error: {err}")))
}

/// Converts byte offsets of a text into character offsets, counting from
/// the last converted offset when moving forward.
struct CharOffsets<'t> {
    text: &'t str,
    byte: usize,
    chars: usize,
}

impl<'t> CharOffsets<'t> {
    fn new(text: &'t str) -> Self {
        Self {
            text,
            byte: 0,
            chars: 0,
        }
    }

    fn at(&mut self, byte: usize) -> usize {
        if byte < self.byte {
            return self.text[..byte].chars().count();
        }
        self.chars += self.text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

fn to_match(
    regex: &Regex,
    caps: &Captures<'_>,
    offsets: &mut CharOffsets<'_>,
) -> Value {
    let groups = (0..caps.len())
        .map(|idx| {
            caps.get(idx).map(|m| MatchGroup {
                start: offsets.at(m.start()),
                end: offsets.at(m.end()),
                text: m.as_str().to_owned(),
            })
        })
        .collect();
    let names = regex
        .capture_names()
        .enumerate()
        .filter_map(|(idx, name)| name.map(|name| (name.to_owned(), idx)))
        .collect();
    Value::Match(Box::new(RegexMatch { groups, names }))
}

fn group_text(caps: &Captures<'_>, idx: usize) -> Value {
    Value::Str(caps.get(idx).map_or("", |m| m.as_str()).to_owned())
}

/// Translates a Python replacement template (`\1`, `\g<name>`) into the
/// syntax of `regex` (`${1}`, `${name}`).
fn replacement(
    regex: &Regex,
    template: &str,
) -> Result<String, ExecutionError> {
    let bad_group = |group: &str| {
        ExecutionError::runtime(format!(
            "re.error: invalid group reference {group}"
        ))
    };
    let mut translated = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => translated.push_str("$$"),
            '\\' => match chars.next() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = d.to_string();
                    if let Some(e) = chars.next_if(char::is_ascii_digit) {
                        group.push(e);
                    }
                    let idx: usize = group.parse().unwrap_or(0);
                    if idx == 0 || idx >= regex.captures_len() {
                        return Err(bad_group(&group));
                    }
                    translated.push_str(&format!("${{{group}}}"));
                }
                Some('g') if chars.peek() == Some(&'<') => {
                    chars.next();
                    let group: String =
                        chars.by_ref().take_while(|c| *c != '>').collect();
                    let known = match group.parse::<usize>() {
                        Ok(idx) => idx < regex.captures_len(),
                        Err(_) => regex
                            .capture_names()
                            .any(|name| name == Some(group.as_str())),
                    };
                    if !known {
                        return Err(bad_group(&group));
                    }
                    translated.push_str(&format!("${{{group}}}"));
                }
                Some('n') => translated.push('\n'),
                Some('t') => translated.push('\t'),
                Some('r') => translated.push('\r'),
                Some('\\') => translated.push('\\'),
                Some('$') => translated.push_str("\\$$"),
                Some(other) => {
                    translated.push('\\');
                    translated.push(other);
                }
                None => {
                    return Err(ExecutionError::runtime(
                        "re.error: bad escape (end of pattern)",
                    ));
                }
            },
            c => translated.push(c),
        }
    }
    Ok(translated)
}

fn substitute(
    regex: &Regex,
    template: &str,
    text: &str,
    count: usize,
) -> Result<(String, usize), ExecutionError> {
    let template = replacement(regex, template)?;
    let mut replaced = String::with_capacity(text.len());
    let mut last = 0;
    let mut n = 0;
    for caps in regex.captures_iter(text) {
        if count > 0 && n == count {
            break;
        }
        let Some(whole) = caps.get(0) else {
            continue;
        };
        replaced.push_str(&text[last..whole.start()]);
        caps.expand(&template, &mut replaced);
        check_size(Some(replaced.len()))?;
        last = whole.end();
        n += 1;
    }
    replaced.push_str(&text[last..]);
    Ok((replaced, n))
}

fn split(regex: &Regex, text: &str, max_split: usize) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut last = 0;
    for (n, caps) in regex.captures_iter(text).enumerate() {
        if max_split > 0 && n == max_split {
            break;
        }
        let Some(whole) = caps.get(0) else {
            continue;
        };
        parts.push(Value::Str(text[last..whole.start()].to_owned()));
        // Python keeps the groups of the separator.
        for idx in 1..caps.len() {
            parts.push(caps.get(idx).map_or(Value::None, |m| {
                Value::Str(m.as_str().to_owned())
            }));
        }
        last = whole.end();
    }
    parts.push(Value::Str(text[last..].to_owned()));
    parts
}

fn count_arg(
    name: &str,
    value: Option<&Value>,
) -> Result<usize, ExecutionError> {
    match value {
        Some(value) => Ok(usize::try_from(int_arg(name, value)?).unwrap_or(0)),
        None => Ok(0),
    }
}

pub(super) fn call(
    name: &str,
    function: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, ExecutionError> {
    match function {
        "compile" => Err(ExecutionError::unsupported(
            "re.compile, pass the pattern string to the re functions instead",
        )),
        "escape" => {
            let bound = bind(name, args, kwargs, &["pattern"], 1)?;
            let pattern =
                str_arg(name, bound[0].as_ref().unwrap_or(&Value::None))?;
            Ok(Value::Str(regex::escape(pattern)))
        }
        "search" | "match" | "fullmatch" | "findall" | "finditer" => {
            let bound =
                bind(name, args, kwargs, &["pattern", "string", "flags"], 2)?;
            let anchor = match function {
                "match" => Anchor::Start,
                "fullmatch" => Anchor::Full,
                _ => Anchor::None,
            };
            let (pattern, text) = required_pair(&bound)?;
            let regex = compile(name, pattern, bound[2].as_ref(), anchor)?;
            let text = str_arg(name, text)?;
            let mut offsets = CharOffsets::new(text);
            match function {
                "findall" => {
                    let groups = regex.captures_len() - 1;
                    let found = regex
                        .captures_iter(text)
                        .map(|caps| match groups {
                            0 => group_text(&caps, 0),
                            1 => group_text(&caps, 1),
                            _ => Value::Tuple(
                                (1..=groups)
                                    .map(|idx| group_text(&caps, idx))
                                    .collect(),
                            ),
                        })
                        .collect();
                    Ok(Value::List(found))
                }
                "finditer" => Ok(Value::List(
                    regex
                        .captures_iter(text)
                        .map(|caps| to_match(&regex, &caps, &mut offsets))
                        .collect(),
                )),
                _ => Ok(regex.captures(text).map_or(Value::None, |caps| {
                    to_match(&regex, &caps, &mut offsets)
                })),
            }
        }
        "sub" | "subn" => {
            let bound = bind(
                name,
                args,
                kwargs,
                &["pattern", "repl", "string", "count", "flags"],
                3,
            )?;
            let regex = compile(
                name,
                bound[0].as_ref().unwrap_or(&Value::None),
                bound[4].as_ref(),
                Anchor::None,
            )?;
            let template = match &bound[1] {
                Some(Value::Str(template)) => template,
                _ => {
                    return Err(ExecutionError::unsupported(format!(
                        "{name}() with a replacement that is not a string"
                    )));
                }
            };
            let text =
                str_arg(name, bound[2].as_ref().unwrap_or(&Value::None))?;
            let count = count_arg(name, bound[3].as_ref())?;
            let (replaced, n) = substitute(&regex, template, text, count)?;
            if function == "sub" {
                return Ok(Value::Str(replaced));
            }
            Ok(Value::Tuple(vec![
                Value::Str(replaced),
                Value::Int(i64::try_from(n).unwrap_or(i64::MAX)),
            ]))
        }
        "split" => {
            let bound = bind(
                name,
                args,
                kwargs,
                &["pattern", "string", "maxsplit", "flags"],
                2,
            )?;
            let (pattern, text) = required_pair(&bound)?;
            let regex =
                compile(name, pattern, bound[3].as_ref(), Anchor::None)?;
            let text = str_arg(name, text)?;
            let max_split = count_arg(name, bound[2].as_ref())?;
            Ok(Value::List(split(&regex, text, max_split)))
        }
        _ => Err(ExecutionError::runtime(format!(
            "AttributeError: module 're' has no attribute '{function}'"
        ))),
    }
}

fn required_pair(
    bound: &[Option<Value>],
) -> Result<(&Value, &Value), ExecutionError> {
    match bound {
        [Some(first), Some(second), ..] => Ok((first, second)),
        _ => Err(ExecutionError::runtime(
            "TypeError: missing required argument",
        )),
    }
}

fn group_index(m: &RegexMatch, group: &Value) -> Result<usize, ExecutionError> {
    let idx = match group {
        Value::Str(name) => m
            .names
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, idx)| *idx),
        other => other.as_i64().and_then(|idx| usize::try_from(idx).ok()),
    };
    idx.filter(|idx| *idx < m.groups.len()).ok_or_else(|| {
        ExecutionError::runtime("IndexError: no such group")
    })
}

fn group_value(m: &RegexMatch, idx: usize, default: &Value) -> Value {
    match &m.groups[idx] {
        Some(group) => Value::Str(group.text.clone()),
        None => default.clone(),
    }
}

/// Calls a method of a match object; `m[1]` is `m.group(1)`.
pub(crate) fn match_method(
    m: &RegexMatch,
    method: &str,
    args: &[Value],
) -> Result<Value, ExecutionError> {
    match method {
        "group" => {
            let mut values = Vec::with_capacity(args.len().max(1));
            for group in args {
                let idx = group_index(m, group)?;
                values.push(group_value(m, idx, &Value::None));
            }
            match values.len() {
                0 => Ok(group_value(m, 0, &Value::None)),
                1 => Ok(values.remove(0)),
                _ => Ok(Value::Tuple(values)),
            }
        }
        "groups" => {
            arity(method, args, 0, 1)?;
            let default = args.first().unwrap_or(&Value::None);
            Ok(Value::Tuple(
                (1..m.groups.len())
                    .map(|idx| group_value(m, idx, default))
                    .collect(),
            ))
        }
        "groupdict" => {
            arity(method, args, 0, 1)?;
            let default = args.first().unwrap_or(&Value::None);
            let mut entries = Vec::with_capacity(m.names.len());
            for (name, idx) in &m.names {
                let value = group_value(m, *idx, default);
                dict_set(&mut entries, Value::Str(name.clone()), value);
            }
            Ok(Value::Dict(entries))
        }
        "start" | "end" | "span" => {
            arity(method, args, 0, 1)?;
            let idx = match args.first() {
                Some(group) => group_index(m, group)?,
                None => 0,
            };
            let (start, end) = match &m.groups[idx] {
                Some(group) => (group.start as i64, group.end as i64),
                None => (-1, -1),
            };
            Ok(match method {
                "start" => Value::Int(start),
                "end" => Value::Int(end),
                _ => Value::Tuple(vec![Value::Int(start), Value::Int(end)]),
            })
        }
        _ => Err(no_attribute("re.Match", method)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(value: &str) -> Value {
        Value::Str(value.to_owned())
    }

    fn re(function: &str, args: Vec<Value>) -> Result<Value, ExecutionError> {
        call(&format!("re.{function}"), function, args, vec![])
    }

    #[test]
    fn test_search_and_groups() {
        let pattern = s(r"(?P<user>\w+)@(\w+)");
        let m = re("search", vec![pattern, s("mail: bob@home")]).unwrap();
        assert_eq!(
            m.to_string(),
            "<re.Match object; span=(6, 14), match='bob@home'>"
        );
        let Value::Match(m) = m else {
            panic!("not a match: {m}");
        };
        let whole = match_method(&m, "group", &[]).unwrap();
        assert_eq!(whole.to_string(), "bob@home");
        assert_eq!(
            match_method(&m, "group", &[Value::Int(1), Value::Int(2)])
                .unwrap()
                .to_string(),
            "('bob', 'home')"
        );
        assert_eq!(
            match_method(&m, "groupdict", &[]).unwrap().to_string(),
            "{'user': 'bob'}"
        );
        let span = match_method(&m, "span", &[s("user")]).unwrap();
        assert_eq!(span.to_string(), "(6, 9)");
        assert!(match_method(&m, "group", &[Value::Int(3)]).is_err());

        let none = re("match", vec![s("b"), s("abc")]).unwrap();
        assert!(matches!(none, Value::None));
        let full = re("fullmatch", vec![s("a|ab"), s("ab")]).unwrap();
        assert_eq!(
            full.to_string(),
            "<re.Match object; span=(0, 2), match='ab'>"
        );
    }

    #[test]
    fn test_findall_sub_split() {
        let found =
            re("findall", vec![s(r"(\w)=(\d)"), s("a=1, b=2")]).unwrap();
        assert_eq!(found.to_string(), "[('a', '1'), ('b', '2')]");
        let found = re("findall", vec![s(r"\d+"), s("é1 22")]).unwrap();
        assert_eq!(found.to_string(), "['1', '22']");

        let replaced =
            re("sub", vec![s(r"(\d+)"), s(r"<\1>$"), s("a1b22")]).unwrap();
        assert_eq!(replaced.to_string(), "a<1>$b<22>$");
        let replaced = call(
            "re.subn",
            "subn",
            vec![s("a"), s("b"), s("aaa")],
            vec![("count".to_owned(), Value::Int(2))],
        )
        .unwrap();
        assert_eq!(replaced.to_string(), "('bba', 2)");
        assert!(re("sub", vec![s("a"), s(r"\2"), s("a")]).is_err());

        let parts =
            re("split", vec![s(r"\s*([,;])\s*"), s("a , b;c")]).unwrap();
        assert_eq!(parts.to_string(), "['a', ',', 'b', ';', 'c']");
        assert!(re("search", vec![s("("), s("")]).is_err());
    }

    #[test]
    fn test_flags() {
        let flags = constant("IGNORECASE").unwrap();
        let found = call(
            "re.findall",
            "findall",
            vec![s("hello"), s("Hello HELLO")],
            vec![("flags".to_owned(), flags)],
        )
        .unwrap();
        assert_eq!(found.to_string(), "['Hello', 'HELLO']");
        let escaped = re("escape", vec![s("a.b")]).unwrap();
        assert_eq!(escaped.to_string(), r"a\.b");
    }
}
