use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
}

/// The preset response for one model request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request will fail in the first `failure` attempts.
    /// `Some(0)` means the request will fail infinitely.
    pub failures: Option<u64>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failures: None,
        }
    }

    /// Creates a `PresetResponse` that streams `text` in one delta.
    #[inline]
    pub fn with_text<S: Into<String>>(text: S) -> Self {
        Self::with_events([PresetEvent::MessageDelta(text.into())])
    }

    /// Sets failure times before a successful response. `0` means the
    /// response will always be a failure.
    #[inline]
    pub fn with_failures(mut self, failures: u64) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Returns the deltas of this response, cut right before the earliest
    /// occurrence of any stop marker.
    pub(crate) fn truncated_deltas(&self, stop: &[String]) -> Vec<String> {
        let full_text: String = self
            .events
            .iter()
            .map(|PresetEvent::MessageDelta(delta)| delta.as_str())
            .collect();
        let cut = stop
            .iter()
            .filter(|marker| !marker.is_empty())
            .filter_map(|marker| full_text.find(marker.as_str()))
            .min()
            .unwrap_or(full_text.len());

        let mut deltas = vec![];
        let mut consumed = 0;
        for PresetEvent::MessageDelta(delta) in &self.events {
            if consumed >= cut {
                break;
            }
            let remaining = cut - consumed;
            if delta.len() <= remaining {
                deltas.push(delta.clone());
            } else {
                deltas.push(delta[..remaining].to_owned());
            }
            consumed += delta.len();
        }
        deltas.retain(|delta| !delta.is_empty());
        deltas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::with_events([
            PresetEvent::MessageDelta("Thought: I will compute it.\n".into()),
            PresetEvent::MessageDelta("Code:\n```py\nprint(1 + 1)\n```".into()),
        ])
        .with_failures(2);

        let serialized = serde_json::to_string(&response).unwrap();
        assert!(serialized.contains(r#""type":"message_delta""#));
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response, deserialized);
    }

    #[test]
    fn test_truncated_deltas() {
        let response = PresetResponse::with_events([
            PresetEvent::MessageDelta("```py\nx = 1\n```".into()),
            PresetEvent::MessageDelta("<end_".into()),
            PresetEvent::MessageDelta("code>\nObservation: 1".into()),
        ]);
        let stop = vec!["<end_code>".to_owned(), "Observation:".to_owned()];
        assert_eq!(
            response.truncated_deltas(&stop),
            vec!["```py\nx = 1\n```".to_owned()]
        );

        let response = PresetResponse::with_text("abc Observation: def");
        assert_eq!(response.truncated_deltas(&stop), vec!["abc ".to_owned()]);
        assert_eq!(
            response.truncated_deltas(&[]),
            vec!["abc Observation: def".to_owned()]
        );
    }
}
