use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use codeact_core::tool::{Error as ToolError, Tool, ToolResult};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use tokio::task::spawn_blocking;

const MAX_LINES: usize = 200;

#[derive(Deserialize, JsonSchema)]
pub struct ReadTextFileParameters {
    #[schemars(
        description = "Path to the file, relative paths are resolved against the working directory."
    )]
    path: String,
    #[schemars(description = "1-based start line to read from, default to 1.")]
    start_line: Option<usize>,
}

/// A tool for reading text files.
///
/// Relative paths are resolved against the root directory the tool was
/// created with.
pub struct ReadTextFileTool {
    root: PathBuf,
    parameter_schema: Value,
}

impl ReadTextFileTool {
    /// Creates a new tool resolving relative paths against `root`.
    #[inline]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        ReadTextFileTool {
            root: root.into(),
            parameter_schema: schema_for!(ReadTextFileParameters).to_value(),
        }
    }
}

impl Tool for ReadTextFileTool {
    type Input = ReadTextFileParameters;

    fn name(&self) -> &str {
        "read_text_file"
    }

    fn description(&self) -> &str {
        "Read the content of a text file, returns up to 200 lines starting \
         from `start_line`."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: ReadTextFileParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let path = self.root.join(&input.path);
        async move {
            let start_line = input.start_line.unwrap_or(1);
            if start_line == 0 {
                return Err(ToolError::invalid_input()
                    .with_reason("`start_line` must be 1-based"));
            }

            let text = spawn_blocking(move || read_lines(&path, start_line))
                .await
                .map_err(|_| {
                    ToolError::execution_error()
                        .with_reason("failed to read file")
                })??;
            Ok(Value::String(text))
        }
    }
}

fn read_lines(path: &Path, start_line: usize) -> Result<String, ToolError> {
    let file = File::open(path).map_err(|err| {
        ToolError::execution_error()
            .with_reason(format!("{}: {err}", path.display()))
    })?;
    collect_lines(file, start_line)
}

fn collect_lines<R: Read>(
    reader: R,
    start_line: usize,
) -> Result<String, ToolError> {
    let mut text = String::new();
    let lines = BufReader::new(reader)
        .lines()
        .skip(start_line - 1)
        .take(MAX_LINES);
    for line in lines {
        let line = line.map_err(|err| {
            ToolError::execution_error().with_reason(err.to_string())
        })?;
        text.push_str(&line);
        text.push('\n');
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_collect_lines_from_start_line() {
        let text = collect_lines(Cursor::new("first\nsecond\nthird"), 2)
            .unwrap();
        assert_eq!(text, "second\nthird\n");
    }

    #[test]
    fn test_collect_lines_respects_limit() {
        let input = "line\n".repeat(MAX_LINES + 10);
        let text = collect_lines(Cursor::new(input), 1).unwrap();
        assert_eq!(text.lines().count(), MAX_LINES);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let tool = ReadTextFileTool::new(env!("CARGO_MANIFEST_DIR"));
        let err = tool
            .execute(ReadTextFileParameters {
                path: "no/such/file.txt".to_owned(),
                start_line: None,
            })
            .await
            .unwrap_err();
        assert!(err.reason().contains("file.txt"));

        let text = tool
            .execute(ReadTextFileParameters {
                path: "Cargo.toml".to_owned(),
                start_line: None,
            })
            .await
            .unwrap();
        assert!(text.as_str().unwrap().starts_with("[package]\n"));
    }
}
