/// One event of a simulated response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A frame of generated text.
    Delta { content: String },
    /// Terminal marker. Always the last event of a stream.
    Done,
    /// A fault raised after streaming started.
    Error { message: String },
}

impl StreamEvent {
    pub fn delta(content: impl Into<String>) -> Self {
        StreamEvent::Delta {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            message: message.into(),
        }
    }
}
