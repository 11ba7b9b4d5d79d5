//! System prompt assembly.

/// Placeholder for the agent name.
pub const NAME_PLACEHOLDER: &str = "{{name}}";
/// Placeholder for the rendered tool documentation.
pub const TOOL_DESCRIPTIONS_PLACEHOLDER: &str = "{{tool_descriptions}}";
/// Placeholder for the authorized imports.
pub const AUTHORIZED_IMPORTS_PLACEHOLDER: &str = "{{authorized_imports}}";

/// Marks the import list as unrestricted.
pub const UNRESTRICTED_IMPORTS: &str = "*";

const UNRESTRICTED_IMPORTS_TEXT: &str =
    "You can import from any package you want.";

/// Modules the sandbox always allows to import, all of them usable in the
/// sandbox.
pub const BASE_BUILTIN_MODULES: &[&str] = &[
    "collections",
    "itertools",
    "math",
    "random",
    "re",
    "statistics",
    "time",
];

/// The default system prompt template.
pub const CODE_SYSTEM_PROMPT: &str =
    include_str!("prompt/code_system_prompt.md");

/// An ordered, deduplicated list of importable module names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorizedImports {
    modules: Vec<String>,
}

impl AuthorizedImports {
    /// Creates the union of `base` and `additional`, keeping the first
    /// occurrence of every module.
    pub fn new<B, A>(base: B, additional: A) -> Self
    where
        B: IntoIterator,
        B::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        let mut modules: Vec<String> = Vec::new();
        let all = base
            .into_iter()
            .map(Into::into)
            .chain(additional.into_iter().map(Into::into));
        for module in all {
            if !modules.contains(&module) {
                modules.push(module);
            }
        }
        Self { modules }
    }

    /// Returns the module names.
    #[inline]
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Returns `true` if any module may be imported.
    #[inline]
    pub fn is_unrestricted(&self) -> bool {
        self.modules.iter().any(|m| m == UNRESTRICTED_IMPORTS)
    }

    /// Returns `true` if `module` (or the package it belongs to) may be
    /// imported.
    pub fn allows(&self, module: &str) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        let root = module.split('.').next().unwrap_or(module);
        self.modules.iter().any(|m| m == module || m == root)
    }

    /// Renders the imports for the system prompt: either a sentence that
    /// allows everything, or a Python list literal.
    pub fn render(&self) -> String {
        if self.is_unrestricted() {
            return UNRESTRICTED_IMPORTS_TEXT.to_owned();
        }
        let quoted: Vec<String> =
            self.modules.iter().map(|m| format!("'{m}'")).collect();
        format!("[{}]", quoted.join(", "))
    }
}

/// Everything needed to render a system prompt.
#[derive(Clone, Debug)]
pub struct PromptConfig {
    /// The agent name.
    pub name: String,
    /// The template, see [`CODE_SYSTEM_PROMPT`].
    pub template: String,
    /// The rendered tool documentation.
    pub tools_instruction: String,
    /// The authorized imports.
    pub imports: AuthorizedImports,
}

impl PromptConfig {
    /// Renders the system prompt.
    ///
    /// The tool documentation is substituted last and literally, so
    /// whatever it contains (braces, or even placeholder-like text) is kept
    /// as is. The result always ends with a line feed.
    pub fn render(&self) -> String {
        let mut template = self.template.clone();
        if !template.ends_with('\n') {
            template.push('\n');
        }
        let mut prompt = template
            .replace(NAME_PLACEHOLDER, &self.name)
            .replace(AUTHORIZED_IMPORTS_PLACEHOLDER, &self.imports.render())
            .replace(TOOL_DESCRIPTIONS_PLACEHOLDER, &self.tools_instruction);
        if !prompt.ends_with('\n') {
            prompt.push('\n');
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(imports: AuthorizedImports) -> PromptConfig {
        PromptConfig {
            name: "Friday".to_owned(),
            template: CODE_SYSTEM_PROMPT.to_owned(),
            tools_instruction: "1. search: {\"query\": {{name}}}".to_owned(),
            imports,
        }
    }

    #[test]
    fn test_render_import_list() {
        let imports = AuthorizedImports::new(
            BASE_BUILTIN_MODULES.iter().copied(),
            ["numpy", "math"],
        );
        assert!(!imports.is_unrestricted());
        assert_eq!(imports.modules().len(), BASE_BUILTIN_MODULES.len() + 1);

        let prompt = config(imports).render();
        assert!(prompt.contains(
            "['collections', 'itertools', 'math', 'random', 're', \
             'statistics', 'time', 'numpy']"
        ));
        assert!(!prompt.contains(UNRESTRICTED_IMPORTS_TEXT));
        assert!(prompt.contains("expert assistant named Friday"));
        assert!(!prompt.contains(AUTHORIZED_IMPORTS_PLACEHOLDER));
        assert!(!prompt.contains(TOOL_DESCRIPTIONS_PLACEHOLDER));
    }

    #[test]
    fn test_render_unrestricted() {
        let imports = AuthorizedImports::new(["math", "*"], ["numpy"]);
        assert!(imports.is_unrestricted());
        assert!(imports.allows("pandas.io"));

        let prompt = config(imports).render();
        assert!(prompt.contains(UNRESTRICTED_IMPORTS_TEXT));
        assert!(!prompt.contains("'numpy'"));
    }

    #[test]
    fn test_tool_instruction_is_literal() {
        let prompt = config(AuthorizedImports::default()).render();
        // The placeholder inside the tool text is not substituted again.
        assert!(prompt.contains("1. search: {\"query\": {{name}}}"));
    }

    #[test]
    fn test_trailing_newline() {
        let config = PromptConfig {
            name: "a".to_owned(),
            template: "You are {{name}}.".to_owned(),
            tools_instruction: String::new(),
            imports: AuthorizedImports::default(),
        };
        assert_eq!(config.render(), "You are a.\n");

        let config = PromptConfig {
            template: "Tools:\n{{tool_descriptions}}".to_owned(),
            tools_instruction: "none".to_owned(),
            ..config
        };
        assert_eq!(config.render(), "Tools:\nnone\n");
    }

    #[test]
    fn test_allows() {
        let imports =
            AuthorizedImports::new(["math", "collections"], ["numpy"]);
        assert!(imports.allows("math"));
        assert!(imports.allows("numpy.linalg"));
        assert!(!imports.allows("os"));
        assert!(!imports.allows("mathx"));
    }
}
