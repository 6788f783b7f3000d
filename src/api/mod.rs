//! Wire payloads for OpenAI-compatible `chat/completions` endpoints.

use serde::{Deserialize, Serialize};

use crate::core::message::Message;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: &str, history: &[Message], stream: bool) -> Self {
        Self {
            model: model.to_string(),
            messages: history.iter().map(ChatMessage::from).collect(),
            stream,
        }
    }
}

/// One `data:` frame of a streamed completion.
#[derive(Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatResponseChoice>,
}

#[derive(Deserialize)]
pub struct ChatResponseChoice {
    pub delta: ChatResponseDelta,
}

#[derive(Deserialize)]
pub struct ChatResponseDelta {
    pub content: Option<String>,
}

/// Body of a non-streamed completion.
#[derive(Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionMessage,
}

#[derive(Deserialize)]
pub struct ChatCompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_history_in_order() {
        let history = vec![Message::user("hi"), Message::assistant("Hello")];
        let request = ChatRequest::new("gpt-4o", &history, true);
        let value = serde_json::to_value(&request).expect("serialize");

        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["stream"], true);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][1]["role"], "assistant");
        assert_eq!(value["messages"][1]["content"], "Hello");
    }

    #[test]
    fn stream_frame_tolerates_missing_content() {
        let frame: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#)
                .expect("parse");
        assert!(frame.choices[0].delta.content.is_none());
    }
}
