//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use codeact_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

/// Errors returned by [`TestModelProvider`].
#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// A response streaming the preset deltas.
pub struct TestModelResponse {
    deltas: VecDeque<String>,
    completed: bool,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };

        if let Some(sleep) = &mut this.sleep {
            let sleep = sleep.as_mut();
            ready!(sleep.poll(cx));
            this.sleep = None;

            if let Some(delta) = this.deltas.pop_front() {
                return Poll::Ready(Ok(Some(ModelResponseEvent::MessageDelta(
                    delta,
                ))));
            }
            if !this.completed {
                this.completed = true;
                return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                    ModelFinishReason::Stop,
                ))));
            }
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

#[derive(Default)]
struct Script {
    responses: VecDeque<PresetResponse>,
    failed_attempts: u64,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how the
/// model should respond to each request. Responses are consumed in the order
/// they were added, one per successful request, and the script is shared
/// between clones of the provider. If the script runs out, an error will be
/// returned.
///
/// Stop markers in the request are honored: the preset text is cut right
/// before the earliest marker.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    /// Appends a response to the script.
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.lock_script().responses.push_back(preset);
    }

    /// Appends a response that streams `text` to the script.
    #[inline]
    pub fn add_text_response<S: Into<String>>(&mut self, text: S) {
        self.add_response(PresetResponse::with_text(text));
    }

    /// Sets the delay before each streamed event. Defaults to 1ms.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far, including the failed ones.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock_script().requests.clone()
    }

    /// Returns the number of responses that have not been consumed yet.
    pub fn remaining_responses(&self) -> usize {
        self.lock_script().responses.len()
    }

    #[inline]
    fn lock_script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_response(
        &self,
        req: &ModelRequest,
    ) -> Result<TestModelResponse, Error> {
        let mut script = self.lock_script();
        script.requests.push(req.clone());

        let Some(failures) = script.responses.front().map(|p| p.failures)
        else {
            return Err(Error {
                message: "no enough responses",
                kind: ErrorKind::Other,
            });
        };
        match failures {
            Some(0) => {
                return Err(Error {
                    message: "preset to always fail",
                    kind: ErrorKind::RateLimitExceeded,
                });
            }
            Some(failures) if script.failed_attempts < failures => {
                script.failed_attempts += 1;
                return Err(Error {
                    message: "preset to fail",
                    kind: ErrorKind::RateLimitExceeded,
                });
            }
            _ => {}
        }

        let deltas = script
            .responses
            .pop_front()
            .map(|preset| preset.truncated_deltas(&req.stop))
            .unwrap_or_default();
        script.failed_attempts = 0;

        Ok(TestModelResponse {
            deltas: deltas.into(),
            completed: false,
            delay: self.delay.unwrap_or(Duration::from_millis(1)),
            sleep: None,
        })
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        ready(self.next_response(req))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use codeact_model::ModelMessage;

    use super::*;

    async fn collect_response(resp: TestModelResponse) -> String {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
                .unwrap();
            match event {
                ModelResponseEvent::Completed(_) => break,
                ModelResponseEvent::MessageDelta(delta) => {
                    msg.push_str(&delta);
                }
            }
        }
        msg
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Hello, ".to_owned()),
            PresetEvent::MessageDelta("world!".to_owned()),
        ]));
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Sure, ".to_owned()),
            PresetEvent::MessageDelta("let me take a look.\n".to_owned()),
            PresetEvent::MessageDelta("```py\nprint(1)\n```".to_owned()),
            PresetEvent::MessageDelta("<end_code>\nObservation: 1".to_owned()),
        ]));

        let mut req =
            ModelRequest::new(vec![ModelMessage::User("Hi".to_owned())]);
        let resp = provider.send_request(&req).await.unwrap();
        assert_eq!(collect_response(resp).await, "Hello, world!");

        req.messages
            .push(ModelMessage::Assistant("Hello, world!".to_owned()));
        req.messages
            .push(ModelMessage::User("Check my todo".to_owned()));
        let req = req.with_stop(["<end_code>", "Observation:"]);
        let resp = provider.send_request(&req).await.unwrap();
        assert_eq!(
            collect_response(resp).await,
            "Sure, let me take a look.\n```py\nprint(1)\n```"
        );

        assert_eq!(provider.remaining_responses(), 0);
        assert_eq!(provider.requests().len(), 2);
        assert!(provider.send_request(&req).await.is_err());
    }

    #[tokio::test]
    async fn test_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_text("ok").with_failures(2));

        let req = ModelRequest::new(vec![ModelMessage::User("Hi".to_owned())]);
        for _ in 0..2 {
            let err = provider.send_request(&req).await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        }
        let resp = provider.send_request(&req).await.unwrap();
        assert_eq!(collect_response(resp).await, "ok");
        assert_eq!(provider.requests().len(), 3);
    }
}
