use std::future::ready;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use codeact_model::{ErrorKind, ModelMessage};
use codeact_test_model::{PresetResponse, TestModelProvider};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;

use crate::code::ParseError;
use crate::conversation::{Item, Role};
use crate::sandbox::{
    CodeExecutor, ExecutionErrorKind, ExecutionOutcome, Observation,
};
use crate::tool::{Tool, ToolResult, Toolkit};
use crate::{CodeAgentBuilder, Error};

fn code_turn(thought: &str, code: &str) -> String {
    format!("Thought: {thought}\nCode:\n```py\n{code}\n```<end_code>")
}

#[derive(Deserialize, JsonSchema)]
struct ShoutParameters {
    text: String,
}

struct ShoutTool {
    schema: serde_json::Value,
}

impl Tool for ShoutTool {
    type Input = ShoutParameters;

    fn name(&self) -> &str {
        "shout"
    }

    fn description(&self) -> &str {
        "Turns the text into upper case."
    }

    fn parameter_schema(&self) -> &serde_json::Value {
        &self.schema
    }

    fn execute(
        &self,
        input: ShoutParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        ready(Ok(input.text.to_uppercase().into()))
    }
}

#[tokio::test]
async fn test_finish_on_first_turn() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_text_response(code_turn(
        "I know the weather already.",
        "final_answer(\"Shanghai is sunny, 20°C\")",
    ));

    let mut agent =
        CodeAgentBuilder::with_model_provider(model_provider.clone()).build();
    let reply = agent.reply("How is the weather in Shanghai?").await.unwrap();

    assert_eq!(reply.content, "Shanghai is sunny, 20°C");
    assert_eq!(reply.name, "assistant");
    assert_eq!(reply.iterations, 1);
    assert!(!reply.exhausted);
    assert_eq!(agent.memory().len(), 4);
    assert_eq!(model_provider.remaining_responses(), 0);
}

#[tokio::test]
async fn test_two_turns() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_text_response(code_turn(
        "Let me compute it first.",
        "x = 6 * 7\nprint(x)",
    ));
    model_provider.add_text_response(code_turn(
        "The value is printed above.",
        "final_answer(str(x))",
    ));

    let mut agent =
        CodeAgentBuilder::with_model_provider(model_provider.clone()).build();
    let reply = agent.reply("What is 6 times 7?").await.unwrap();

    assert_eq!(reply.content, "42");
    assert_eq!(reply.iterations, 2);
    // system + user + 2 * (assistant + observation)
    assert_eq!(agent.memory().len(), 6);

    let requests = model_provider.requests();
    assert_eq!(requests.len(), 2);
    for req in &requests {
        assert_eq!(req.stop, vec!["<end_code>", "Observation:"]);
    }
    assert!(matches!(requests[0].messages[0], ModelMessage::System(_)));
    assert_eq!(requests[1].messages.len(), 4);
    let ModelMessage::User(observation) = &requests[1].messages[3] else {
        panic!("expected an observation");
    };
    assert!(observation.starts_with("Observation:\nExecution logs:\n42\n"));

    let items = agent.memory().items();
    assert_eq!(items[2].role(), Role::Assistant);
    assert!(!items[2].content().contains("<end_code>"));
    assert_eq!(items[3].name(), "observation");
}

#[tokio::test]
async fn test_max_iters_exhausted() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_text_response(code_turn("Try one.", "print(1)"));
    model_provider.add_text_response(code_turn("Try two.", "print(2)"));
    model_provider.add_text_response("I printed 1 and 2, no answer yet.");

    let mut agent =
        CodeAgentBuilder::with_model_provider(model_provider.clone())
            .with_max_iters(2)
            .build();
    let reply = agent.reply("Keep trying").await.unwrap();

    assert!(reply.exhausted);
    assert_eq!(reply.iterations, 2);
    assert_eq!(reply.content, "I printed 1 and 2, no answer yet.");

    let requests = model_provider.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[2].stop.is_empty());
    let Some(ModelMessage::System(advisory)) = requests[2].messages.last()
    else {
        panic!("expected the advisory");
    };
    assert!(advisory.starts_with("You have failed to generate response"));

    let last = agent.memory().last().unwrap();
    assert_eq!(last.role(), Role::Assistant);
    assert_eq!(last.content(), reply.content);
}

#[tokio::test]
async fn test_summary_failure_yields_reply() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_text_response(code_turn("Try.", "print(1)"));

    let mut agent = CodeAgentBuilder::with_model_provider(model_provider)
        .with_max_iters(1)
        .build();
    let reply = agent.reply("Keep trying").await.unwrap();

    assert!(reply.exhausted);
    assert!(reply.content.starts_with("I could not finish the task"));
}

#[tokio::test]
async fn test_parse_error_aborts() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_text_response("I don't know what to do.");

    let mut agent =
        CodeAgentBuilder::with_model_provider(model_provider.clone()).build();
    let err = agent.reply("Hi").await.unwrap_err();

    assert!(matches!(
        err,
        Error::Parse(ParseError::MissingCodeBlock { .. })
    ));
    assert!(err.to_string().starts_with("Error in code parsing:\n"));
    assert!(
        err.to_string()
            .ends_with("\nMake sure to provide correct code blobs.")
    );
    assert_eq!(model_provider.requests().len(), 1);
    assert_eq!(agent.memory().len(), 3);
}

#[tokio::test]
async fn test_final_answer_outside_code() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_text_response("So the final answer is 42.");

    let mut agent =
        CodeAgentBuilder::with_model_provider(model_provider).build();
    let err = agent.reply("Hi").await.unwrap_err();

    assert!(matches!(
        err,
        Error::Parse(ParseError::FinalAnswerOutsideCode { .. })
    ));
}

#[tokio::test]
async fn test_execution_error_is_fatal_by_default() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_text_response(code_turn("List files.", "import os"));

    let mut agent =
        CodeAgentBuilder::with_model_provider(model_provider).build();
    let Err(Error::Execution(err)) = agent.reply("Hi").await else {
        panic!("expected an execution error");
    };
    assert_eq!(err.kind(), ExecutionErrorKind::ImportNotAllowed);
}

#[tokio::test]
async fn test_recoverable_execution_error() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_text_response(code_turn("List files.", "import os"));
    model_provider
        .add_text_response(code_turn("Not allowed.", "final_answer(\"done\")"));

    let mut agent =
        CodeAgentBuilder::with_model_provider(model_provider.clone())
            .with_recoverable_execution_errors(true)
            .build();
    let reply = agent.reply("Hi").await.unwrap();

    assert_eq!(reply.content, "done");
    assert_eq!(reply.iterations, 2);
    let observation = agent.memory().items()[3].content();
    assert!(observation.starts_with("Observation:\nError in code execution:"));
    assert!(observation.contains("ImportError"));
}

#[tokio::test]
async fn test_oversized_values_are_recoverable() {
    let oversized = [
        "s = 'ab' * (2 ** 62)",
        "l = [1, 2] * (2 ** 62)",
        "x = f'{1:99999999999999999999999}'",
    ];
    let mut model_provider = TestModelProvider::default();
    for code in oversized {
        model_provider.add_text_response(code_turn("Grow it.", code));
    }
    model_provider
        .add_text_response(code_turn("Too large.", "final_answer(\"done\")"));

    let mut agent = CodeAgentBuilder::with_model_provider(model_provider)
        .with_recoverable_execution_errors(true)
        .build();
    let reply = agent.reply("Hi").await.unwrap();

    assert_eq!(reply.content, "done");
    assert_eq!(reply.iterations, 4);
    for idx in [3, 5, 7] {
        let observation = agent.memory().items()[idx].content();
        assert!(observation.contains("too large for the sandbox"));
    }
}

#[tokio::test]
async fn test_model_error() {
    let model_provider = TestModelProvider::default();

    let mut agent =
        CodeAgentBuilder::with_model_provider(model_provider).build();
    let Err(Error::Model(err)) = agent.reply("Hi").await else {
        panic!("expected a model error");
    };
    assert_eq!(err.kind(), ErrorKind::Other);
}

#[tokio::test]
async fn test_tool_call_and_state_across_replies() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_text_response(code_turn(
        "Shout it.",
        "loud = shout(\"hello\")\nfinal_answer(loud)",
    ));
    model_provider.add_text_response(code_turn(
        "I still have it.",
        "final_answer(loud + \"!\")",
    ));

    let mut agent = CodeAgentBuilder::with_model_provider(model_provider)
        .with_tool(ShoutTool {
            schema: schema_for!(ShoutParameters).to_value(),
        })
        .build();
    assert!(agent.toolkit().contains("shout"));
    assert!(agent.toolkit().contains("final_answer"));

    assert_eq!(agent.reply("Shout hello").await.unwrap().content, "HELLO");
    assert_eq!(agent.reply("Again").await.unwrap().content, "HELLO!");
}

#[tokio::test]
async fn test_transcript() {
    for verbose in [true, false] {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_text_response(code_turn("Print.", "print(1)"));
        model_provider.add_response(PresetResponse::with_text("Done."));

        let roles = Arc::new(Mutex::new(vec![]));
        let roles_ref = Arc::clone(&roles);
        let mut agent = CodeAgentBuilder::with_model_provider(model_provider)
            .with_max_iters(1)
            .with_verbose(verbose)
            .on_transcript(move |item: &Item| {
                roles_ref.lock().unwrap().push(item.role());
            })
            .build();
        agent.reply("Hi").await.unwrap();

        let roles = roles.lock().unwrap().clone();
        if verbose {
            assert_eq!(
                roles,
                vec![
                    Role::User,
                    Role::Assistant,
                    Role::User,
                    Role::System,
                    Role::Assistant,
                ]
            );
        } else {
            assert_eq!(roles, vec![Role::User, Role::Assistant]);
        }
    }
}

#[tokio::test]
async fn test_system_prompt_imports() {
    let agent = CodeAgentBuilder::with_model_provider(
        TestModelProvider::default(),
    )
    .with_name("Ada")
    .with_additional_authorized_imports(["numpy"])
    .build();
    let prompt = agent.system_prompt();

    assert!(prompt.contains("expert assistant named Ada"));
    assert!(prompt.contains("'math'"));
    assert!(prompt.contains("'numpy']"));
    assert!(!prompt.contains("You can import from any package you want."));
    assert!(prompt.contains("final_answer"));
    assert!(prompt.ends_with('\n'));
    assert!(!agent.memory().items()[0].display());

    let agent = CodeAgentBuilder::with_model_provider(
        TestModelProvider::default(),
    )
    .with_base_authorized_imports(["*"])
    .with_additional_authorized_imports(["numpy"])
    .build();
    let prompt = agent.system_prompt();

    assert!(prompt.contains("You can import from any package you want."));
    assert!(!prompt.contains("'numpy'"));
}

struct EchoExecutor;

#[async_trait]
impl CodeExecutor for EchoExecutor {
    async fn execute(
        &mut self,
        code: &str,
        toolkit: &Toolkit,
    ) -> ExecutionOutcome {
        if code.contains("final_answer") {
            return ExecutionOutcome::Terminate {
                answer: format!("{} tools", toolkit.len()),
                logs: String::new(),
            };
        }
        ExecutionOutcome::Continue(Observation {
            logs: code.to_owned(),
            output: "None".to_owned(),
        })
    }
}

#[tokio::test]
async fn test_custom_executor() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_text_response(code_turn("Echo.", "anything goes"));
    model_provider.add_text_response(code_turn("Done.", "final_answer()"));

    let mut agent = CodeAgentBuilder::with_model_provider(model_provider)
        .with_executor(Box::new(EchoExecutor))
        .build();
    let reply = agent.reply("Hi").await.unwrap();

    assert_eq!(reply.content, "1 tools");
    assert!(
        agent.memory().items()[3]
            .content()
            .contains("Execution logs:\nanything goes\n")
    );
}
