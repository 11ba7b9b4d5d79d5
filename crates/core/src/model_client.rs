use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::ExponentialBackoffBuilder;
use codeact_model::{
    ModelFinishReason, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, ModelResponseEvent,
};
use tracing::Instrument;

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type OnDelta = Arc<dyn Fn(&str) + Send + Sync>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, OnDelta) -> BoxedSendRequestFuture + Send + Sync
>;

/// A wrapper around a model provider that maintains an execution
/// environment for the provider and provides a type-erased interface
/// for the other modules.
///
/// Requests failed with a transient error are retried with an exponential
/// backoff. Any other error is returned to the caller immediately.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    backoff: ExponentialBackoff,
}

impl ModelClient {
    /// Creates a client with the default retry policy.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_delta| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_delta).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            backoff: default_backoff(),
        }
    }

    /// Replaces the retry policy for transient failures.
    #[inline]
    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sends a request and returns the completely received response.
    ///
    /// `on_delta` is invoked for every text delta as it streams in. Note
    /// that a retried request streams its deltas again from the start.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    pub async fn send_request(
        &self,
        req: ModelRequest,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<ModelClientResponse, Box<dyn ModelProviderError>> {
        let on_delta: OnDelta = Arc::new(on_delta);
        let handler_fn = &self.handler_fn;
        let operation = || {
            let fut = handler_fn(req.clone(), Arc::clone(&on_delta));
            async move {
                fut.await.map_err(|err| {
                    if err.kind().is_transient() {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        };
        backoff::future::retry_notify(
            self.backoff.clone(),
            operation,
            |err: Box<dyn ModelProviderError>, after: Duration| {
                warn!("model request failed ({err}), retrying in {after:?}");
            },
        )
        .await
    }
}

#[inline]
fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500))
        .with_max_interval(Duration::from_secs(10))
        .with_max_elapsed_time(Some(Duration::from_secs(60)))
        .build()
}

/// A completely received response from the model client.
#[derive(Clone, Debug)]
pub struct ModelClientResponse {
    /// The full text generated by the model.
    pub transcript: String,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_delta: OnDelta,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut transcript = String::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                transcript.push_str(&msg);
                on_delta(&msg);
            }
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(ModelClientResponse {
        transcript,
        finish_reason,
    })
}
