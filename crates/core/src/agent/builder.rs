use backoff::ExponentialBackoff;
use codeact_model::ModelProvider;

use super::{CodeAgent, TranscriptFn};
use crate::conversation::{Conversation, Item, Role};
use crate::model_client::ModelClient;
use crate::prompt::{
    AuthorizedImports, BASE_BUILTIN_MODULES, CODE_SYSTEM_PROMPT, PromptConfig,
};
use crate::sandbox::{CodeExecutor, LocalPythonExecutor};
use crate::tool::{FinishTool, Tool, Toolkit};

const DEFAULT_NAME: &str = "assistant";
const DEFAULT_MAX_ITERS: usize = 10;

/// [`CodeAgent`] builder.
pub struct CodeAgentBuilder {
    model_client: ModelClient,
    name: String,
    template: String,
    toolkit: Toolkit,
    base_imports: Vec<String>,
    additional_imports: Vec<String>,
    max_iters: usize,
    verbose: bool,
    executor: Option<Box<dyn CodeExecutor>>,
    recoverable_execution_errors: bool,
    backoff: Option<ExponentialBackoff>,
    on_transcript: Option<TranscriptFn>,
}

impl CodeAgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            name: DEFAULT_NAME.to_owned(),
            template: CODE_SYSTEM_PROMPT.to_owned(),
            toolkit: Toolkit::new(),
            base_imports: BASE_BUILTIN_MODULES
                .iter()
                .map(|m| (*m).to_owned())
                .collect(),
            additional_imports: vec![],
            max_iters: DEFAULT_MAX_ITERS,
            verbose: true,
            executor: None,
            recoverable_execution_errors: false,
            backoff: None,
            on_transcript: None,
        }
    }

    /// Sets the name the agent introduces itself with.
    #[inline]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces the system prompt template.
    ///
    /// The template may contain `{{name}}`, `{{tool_descriptions}}` and
    /// `{{authorized_imports}}`.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, template: S) -> Self {
        self.template = template.into();
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.toolkit.add(tool);
        self
    }

    /// Adds modules the code may import, on top of the base ones. `"*"`
    /// allows everything.
    pub fn with_additional_authorized_imports<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_imports
            .extend(modules.into_iter().map(Into::into));
        self
    }

    /// Replaces the base modules, which default to
    /// [`BASE_BUILTIN_MODULES`].
    pub fn with_base_authorized_imports<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_imports = modules.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the maximum number of turns per reply. Defaults to 10.
    #[inline]
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Sets whether intermediate items are reported to the transcript
    /// listener. Defaults to `true`.
    #[inline]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Replaces the sandbox. By default, a [`LocalPythonExecutor`] that
    /// allows the authorized imports is used.
    #[inline]
    pub fn with_executor(mut self, executor: Box<dyn CodeExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sets whether execution errors are fed back to the model as
    /// observations instead of aborting the reply. Defaults to `false`.
    #[inline]
    pub fn with_recoverable_execution_errors(mut self, recoverable: bool) -> Self {
        self.recoverable_execution_errors = recoverable;
        self
    }

    /// Replaces the retry policy for transient model errors.
    #[inline]
    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Attaches a callback invoked with every displayed conversation item.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&Item) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Box::new(on_transcript));
        self
    }

    /// Builds the agent.
    ///
    /// The finish tool is registered here, replacing any tool of the same
    /// name, and the system prompt is rendered once.
    pub fn build(self) -> CodeAgent {
        let Self {
            mut model_client,
            name,
            template,
            mut toolkit,
            base_imports,
            additional_imports,
            max_iters,
            verbose,
            executor,
            recoverable_execution_errors,
            backoff,
            on_transcript,
        } = self;

        toolkit.add(FinishTool::new());
        if let Some(backoff) = backoff {
            model_client = model_client.with_backoff(backoff);
        }

        let imports = AuthorizedImports::new(base_imports, additional_imports);
        let executor = executor.unwrap_or_else(|| {
            Box::new(LocalPythonExecutor::new(imports.clone()))
        });
        let system_prompt = PromptConfig {
            name: name.clone(),
            template,
            tools_instruction: toolkit.tools_instruction(),
            imports,
        }
        .render();
        debug!("built agent {name} with tools: {:?}", toolkit.names().collect::<Vec<_>>());

        let mut memory = Conversation::default();
        memory.push(
            Item::new(Role::System, "system", system_prompt).with_display(false),
        );

        CodeAgent {
            name,
            model_client,
            toolkit,
            executor,
            memory,
            max_iters,
            verbose,
            recoverable_execution_errors,
            on_transcript,
        }
    }
}
