/// Why the sandbox rejected or aborted a code blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecutionErrorKind {
    /// The code does not parse.
    Syntax,
    /// The code imports a module outside the authorized list.
    ImportNotAllowed,
    /// The code refers to a name that is not defined.
    UndefinedName,
    /// The code uses a construct the sandbox does not support.
    Unsupported,
    /// The code raised an error while running.
    Runtime,
    /// A tool call failed.
    Tool,
}

impl ExecutionErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            ExecutionErrorKind::Syntax => "SyntaxError",
            ExecutionErrorKind::ImportNotAllowed => "ImportError",
            ExecutionErrorKind::UndefinedName => "NameError",
            ExecutionErrorKind::Unsupported => "NotImplementedError",
            ExecutionErrorKind::Runtime => "RuntimeError",
            ExecutionErrorKind::Tool => "ToolError",
        }
    }
}

/// An error raised while executing code in the sandbox.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{}: {detail}", .kind.as_str())]
pub struct ExecutionError {
    kind: ExecutionErrorKind,
    detail: String,
}

impl ExecutionError {
    /// Creates an error.
    #[inline]
    pub fn new<S: Into<String>>(kind: ExecutionErrorKind, detail: S) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    #[inline]
    pub(crate) fn syntax<S: Into<String>>(detail: S) -> Self {
        Self::new(ExecutionErrorKind::Syntax, detail)
    }

    #[inline]
    pub(crate) fn runtime<S: Into<String>>(detail: S) -> Self {
        Self::new(ExecutionErrorKind::Runtime, detail)
    }

    #[inline]
    pub(crate) fn unsupported<S: Into<String>>(detail: S) -> Self {
        Self::new(ExecutionErrorKind::Unsupported, detail)
    }

    #[inline]
    pub(crate) fn undefined(name: &str) -> Self {
        Self::new(
            ExecutionErrorKind::UndefinedName,
            format!("name '{name}' is not defined"),
        )
    }

    /// Returns the kind of the error.
    #[inline]
    pub fn kind(&self) -> ExecutionErrorKind {
        self.kind
    }

    /// Returns the human-readable detail.
    #[inline]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}
