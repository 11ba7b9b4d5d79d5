use codeact_model::ModelRequest;
use tracing::Instrument;

use super::{CodeAgent, Error, Reply};
use crate::code::{fix_final_answer_code, parse_code_blobs};
use crate::conversation::{Item, Role};
use crate::sandbox::{ExecutionError, ExecutionOutcome, Observation};

/// Markers that end one `Thought:`/`Code:` segment.
pub const STOP_SEQUENCES: [&str; 2] = ["<end_code>", "Observation:"];

const OBSERVATION_NAME: &str = "observation";

const MAX_ITERS_ADVISORY: &str = "You have failed to generate response within the maximum iterations. Now respond directly by summarizing the current situation.";

enum Step {
    Continue,
    Finish(String),
}

impl CodeAgent {
    /// Replies to a user message.
    ///
    /// Runs turns until the code calls `final_answer` or `max_iters` turns
    /// have run. In the latter case the model is asked once more, without
    /// stop sequences, to summarize, and that text is the reply.
    pub async fn reply<S: Into<String>>(
        &mut self,
        input: S,
    ) -> Result<Reply, Error> {
        let span = debug_span!("code agent reply", agent = %self.name);
        self.reply_inner(input.into()).instrument(span).await
    }

    async fn reply_inner(&mut self, input: String) -> Result<Reply, Error> {
        self.push(Item::new(Role::User, "user", input));

        for iteration in 0..self.max_iters {
            debug!("turn {} of {}", iteration + 1, self.max_iters);
            if let Step::Finish(content) = self.step().await? {
                return Ok(Reply {
                    name: self.name.clone(),
                    content,
                    iterations: iteration + 1,
                    exhausted: false,
                });
            }
        }

        warn!("no final answer after {} turns", self.max_iters);
        let content = self.summarize().await;
        Ok(Reply {
            name: self.name.clone(),
            content,
            iterations: self.max_iters,
            exhausted: true,
        })
    }

    async fn step(&mut self) -> Result<Step, Error> {
        let req = ModelRequest::new(self.memory.to_messages())
            .with_stop(STOP_SEQUENCES);
        let resp = self
            .model_client
            .send_request(req, |_| {})
            .await
            .map_err(Error::Model)?;
        trace!("model output: {:?}", resp.transcript);

        let text = resp.transcript;
        self.push(
            Item::new(Role::Assistant, self.name.clone(), text.clone())
                .with_display(self.verbose),
        );

        let code = parse_code_blobs(&text).map_err(Error::Parse)?;
        let code = fix_final_answer_code(&code);

        let outcome = self.executor.execute(&code, &self.toolkit).await;
        match outcome {
            ExecutionOutcome::Continue(observation) => {
                self.push_observation(observation.to_string());
                Ok(Step::Continue)
            }
            ExecutionOutcome::Terminate { answer, logs } => {
                let observation = Observation {
                    logs,
                    output: answer.clone(),
                };
                self.push_observation(observation.to_string());
                Ok(Step::Finish(answer))
            }
            ExecutionOutcome::Failed(err) => {
                if !self.recoverable_execution_errors {
                    return Err(Error::Execution(err));
                }
                debug!("feeding execution error back: {err}");
                self.push_observation(execution_error_feedback(&err));
                Ok(Step::Continue)
            }
        }
    }

    fn push_observation(&mut self, body: String) {
        self.push(
            Item::new(
                Role::User,
                OBSERVATION_NAME,
                format!("Observation:\n{body}"),
            )
            .with_display(self.verbose),
        );
    }

    async fn summarize(&mut self) -> String {
        self.push(
            Item::new(Role::System, "system", MAX_ITERS_ADVISORY)
                .with_display(self.verbose),
        );

        let req = ModelRequest::new(self.memory.to_messages());
        let content = match self.model_client.send_request(req, |_| {}).await {
            Ok(resp) => resp.transcript,
            Err(err) => {
                error!("failed to summarize: {err}");
                format!(
                    "I could not finish the task within {} steps, and \
                     summarizing the progress failed: {err}",
                    self.max_iters
                )
            }
        };

        self.push(Item::new(Role::Assistant, self.name.clone(), content.clone()));
        content
    }
}

fn execution_error_feedback(err: &ExecutionError) -> String {
    format!(
        "Error in code execution:\n{err}\nNow let's retry: take care not to \
         repeat previous errors! If you have retried several times, try a \
         completely different approach."
    )
}
