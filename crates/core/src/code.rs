//! Extracting code from model outputs.
//!
//! Models are asked to wrap their code in a fenced block, but they don't
//! always do. [`parse_code_blobs`] tolerates a missing fence when the whole
//! text is already valid code, and [`fix_final_answer_code`] repairs the
//! common ways a model breaks the `final_answer` call.

use std::sync::LazyLock;

use regex::Regex;
use rustpython_parser::{Parse, ast};

use crate::tool::FINAL_ANSWER_TOOL_NAME;

/// The pattern of a fenced code block.
pub const CODE_BLOCK_PATTERN: &str = r"```(?:py|python)?\n(.*?)\n```";

/// Renamed identifier for a variable that shadows `final_answer`.
pub const FINAL_ANSWER_VARIABLE: &str = "final_answer_variable";

const FINAL_ANSWER_HINT: &str = r#"Code:
```py
final_answer("YOUR FINAL ANSWER HERE")
```<end_code>"#;

const CODE_BLOCK_HINT: &str = r#"Thoughts: Your thoughts
Code:
```py
# Your python code here
```<end_code>"#;

static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| compiled(&format!("(?s){CODE_BLOCK_PATTERN}")));

static FINAL_ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| compiled(&format!(r"\b{FINAL_ANSWER_TOOL_NAME}\b")));

fn compiled(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern must compile")
}

/// No usable code was found in the model output.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The model seems to answer directly instead of calling the final
    /// answer tool from code.
    #[error(
        "The code blob is invalid, because the regex pattern {pattern} was \
         not found in code_blob={text:?}. It seems like you're trying to \
         return the final answer, you can do it as follows:\n{hint}",
        pattern = CODE_BLOCK_PATTERN,
        hint = FINAL_ANSWER_HINT
    )]
    FinalAnswerOutsideCode {
        /// The offending model output.
        text: String,
    },
    /// Neither a fenced block nor valid code.
    #[error(
        "The code blob is invalid, because the regex pattern {pattern} was \
         not found in code_blob={text:?}. Make sure to include code with \
         the correct pattern, for instance:\n{hint}",
        pattern = CODE_BLOCK_PATTERN,
        hint = CODE_BLOCK_HINT
    )]
    MissingCodeBlock {
        /// The offending model output.
        text: String,
    },
}

impl ParseError {
    /// Returns the model output that failed to parse.
    #[inline]
    pub fn text(&self) -> &str {
        match self {
            ParseError::FinalAnswerOutsideCode { text }
            | ParseError::MissingCodeBlock { text } => text,
        }
    }

    /// Returns an example of the expected output.
    #[inline]
    pub fn hint(&self) -> &'static str {
        match self {
            ParseError::FinalAnswerOutsideCode { .. } => FINAL_ANSWER_HINT,
            ParseError::MissingCodeBlock { .. } => CODE_BLOCK_HINT,
        }
    }
}

/// Returns `true` if `source` is a syntactically valid Python module.
#[inline]
pub fn is_valid_python(source: &str) -> bool {
    ast::Suite::parse(source, "<embedded>").is_ok()
}

/// Extracts the code from a model output.
///
/// Fenced blocks win: the contents of all of them are trimmed and joined by
/// a blank line. Without a fence, a text that parses as Python as a whole is
/// returned verbatim. Otherwise the error depends on whether the text looks
/// like a final answer (it contains both `final` and `answer`).
pub fn parse_code_blobs(text: &str) -> Result<String, ParseError> {
    let blocks: Vec<&str> = CODE_BLOCK_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .collect();
    if !blocks.is_empty() {
        return Ok(blocks.join("\n\n"));
    }

    // Maybe the model wrote the code directly.
    if is_valid_python(text) {
        return Ok(text.to_owned());
    }

    let text = text.to_owned();
    if text.contains("final") && text.contains("answer") {
        return Err(ParseError::FinalAnswerOutsideCode { text });
    }
    Err(ParseError::MissingCodeBlock { text })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Usage {
    Call,
    Assignment,
    Other,
}

/// Repairs broken `final_answer` usages, leaving everything else intact.
///
/// Two defects are handled:
///
/// - A statement like `final_answer "Paris"`, where the argument is not
///   parenthesized, becomes `final_answer("Paris")`.
/// - If the code calls `final_answer(...)` but also assigns to a variable
///   named `final_answer`, the variable (every non-call use of the name) is
///   renamed to [`FINAL_ANSWER_VARIABLE`] so the call still reaches the tool.
pub fn fix_final_answer_code(code: &str) -> String {
    let code = parenthesize_final_answer(code);

    let usages: Vec<(usize, usize, Usage)> = FINAL_ANSWER_RE
        .find_iter(&code)
        .filter(|m| !code[..m.start()].ends_with('.'))
        .map(|m| (m.start(), m.end(), usage_after(&code[m.end()..])))
        .collect();
    let has_call = usages.iter().any(|(_, _, u)| *u == Usage::Call);
    let has_assignment =
        usages.iter().any(|(_, _, u)| *u == Usage::Assignment);
    if !has_call || !has_assignment {
        // Renaming without a call would confuse the model in later turns.
        return code;
    }

    let mut fixed = String::with_capacity(code.len() + 16);
    let mut last = 0;
    for (start, end, usage) in usages {
        if usage == Usage::Call {
            continue;
        }
        fixed.push_str(&code[last..start]);
        fixed.push_str(FINAL_ANSWER_VARIABLE);
        last = end;
    }
    fixed.push_str(&code[last..]);
    debug!("renamed final_answer variable in code");
    fixed
}

fn usage_after(rest: &str) -> Usage {
    let rest = rest.trim_start_matches([' ', '\t']);
    if rest.starts_with('(') {
        Usage::Call
    } else if rest.starts_with('=') && !rest.starts_with("==") {
        Usage::Assignment
    } else {
        Usage::Other
    }
}

fn parenthesize_final_answer(code: &str) -> String {
    let mut changed = false;
    let lines: Vec<String> = code
        .split('\n')
        .map(|line| {
            let body = line.trim_start();
            let indent = &line[..line.len() - body.len()];
            let Some(rest) = body.strip_prefix(FINAL_ANSWER_TOOL_NAME) else {
                return line.to_owned();
            };
            let arg = rest.trim();
            let separated = rest.starts_with([' ', '\t']);
            if !separated || !starts_like_literal(arg) {
                return line.to_owned();
            }
            changed = true;
            let (arg, comment) = split_comment(arg);
            let value = arg.trim_end();
            let gap = &arg[value.len()..];
            format!("{indent}{FINAL_ANSWER_TOOL_NAME}({value}){gap}{comment}")
        })
        .collect();
    if changed {
        debug!("parenthesized final_answer argument");
    }
    lines.join("\n")
}

/// Splits a trailing `# comment` off a line, ignoring `#` inside string
/// literals. The comment is empty if there is none.
fn split_comment(line: &str) -> (&str, &str) {
    let mut quote = None;
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' => return line.split_at(idx),
            None => {}
        }
    }
    (line, "")
}

/// Returns `true` if `arg` starts like a literal, so `final_answer <arg>`
/// can't be anything but a call with a missing pair of parentheses.
fn starts_like_literal(arg: &str) -> bool {
    let mut chars = arg.chars();
    match chars.next() {
        Some('"' | '\'' | '[' | '{') => true,
        Some(c) if c.is_ascii_digit() => true,
        Some('f' | 'F' | 'r' | 'R') => {
            matches!(chars.next(), Some('"' | '\''))
        }
        _ => false,
    }
}
