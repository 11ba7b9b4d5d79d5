use codeact_model::{ModelMessage, ModelRequest};
use serde::{Deserialize, Serialize};

use crate::OpenAIConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Choice {
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: String },
    User { content: String },
    Assistant { content: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    stream: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(
    req: &ModelRequest,
    config: &OpenAIConfig,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: config.model.clone(),
        messages: req.messages.iter().map(create_message).collect(),
        stop: req.stop.clone(),
        temperature: config.temperature,
        stream_options: Some(StreamOptions {
            include_usage: true,
        }),
        stream: true,
    }
}

#[inline]
fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::System(content) => Message::System {
            content: content.clone(),
        },
        ModelMessage::User(content) => Message::User {
            content: content.clone(),
        },
        ModelMessage::Assistant(content) => Message::Assistant {
            content: content.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::OpenAIConfigBuilder;

    #[test]
    fn test_create_request() {
        let request = ModelRequest::new(vec![
            ModelMessage::System("You are a helpful assistant.".to_owned()),
            ModelMessage::User("Hello".to_owned()),
            ModelMessage::Assistant("```py\nprint(1)\n```".to_owned()),
        ])
        .with_stop(["<end_code>", "Observation:"]);
        let config = OpenAIConfigBuilder::with_api_key("xxx")
            .with_model("custom")
            .build();

        let body = serde_json::to_value(create_request(&request, &config))
            .unwrap();
        assert_eq!(
            body,
            json!({
                "model": "custom",
                "messages": [
                    { "role": "system", "content": "You are a helpful assistant." },
                    { "role": "user", "content": "Hello" },
                    { "role": "assistant", "content": "```py\nprint(1)\n```" },
                ],
                "stop": ["<end_code>", "Observation:"],
                "stream_options": { "include_usage": true },
                "stream": true,
            })
        );
    }

    #[test]
    fn test_create_request_without_stop() {
        let request =
            ModelRequest::new(vec![ModelMessage::User("Summarize".to_owned())]);
        let config = OpenAIConfigBuilder::with_api_key("xxx")
            .with_temperature(0.5)
            .build();

        let body = serde_json::to_value(create_request(&request, &config))
            .unwrap();
        assert!(body.get("stop").is_none());
        assert_eq!(body["temperature"], json!(0.5));
    }
}
