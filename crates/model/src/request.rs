/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// The input messages, in conversation order.
    pub messages: Vec<ModelMessage>,
    /// Stop markers. Generation ends right before the first occurrence of
    /// any of them. Empty means the model may generate freely.
    pub stop: Vec<String>,
}

impl ModelRequest {
    /// Creates a request with the given messages and no stop markers.
    #[inline]
    pub fn new(messages: Vec<ModelMessage>) -> Self {
        Self {
            messages,
            stop: vec![],
        }
    }

    /// Sets the stop markers of this request.
    #[inline]
    pub fn with_stop<I, S>(mut self, stop: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop = stop.into_iter().map(Into::into).collect();
        self
    }
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant text.
    Assistant(String),
}

impl ModelMessage {
    /// Returns the text content of this message.
    #[inline]
    pub fn content(&self) -> &str {
        match self {
            ModelMessage::System(text)
            | ModelMessage::User(text)
            | ModelMessage::Assistant(text) => text,
        }
    }
}
