// crates/llm_connector/src/lib.rs

use async_trait::async_trait;
use castmate_core::CastmateResult;
use serde::{Deserialize, Serialize};

pub mod openai;

pub use openai::OpenAiClient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One text-completion request: a role-tagged message list in, a
/// completion string out.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
        }
    }
}

/// One text-to-speech request: text in, encoded audio bytes out.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub model: String,
    pub input: String,
    pub voice: String,
    pub speed: f32,
    pub format: String,
}

/// Completion side of the AI backend. Failures are surfaced to the
/// caller, which logs and skips the cycle; there is no retry layer.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> CastmateResult<String>;
    fn name(&self) -> &str;
}

/// Speech side of the AI backend.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn synthesize(&self, request: SpeechRequest) -> CastmateResult<Vec<u8>>;
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let message = Message::system("hi");
        let json = serde_json::to_value(&message).expect("serializes");
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn request_builder_keeps_message_order() {
        let request = CompletionRequest::new(
            "gpt-4o-mini",
            vec![Message::system("a"), Message::user("b")],
            150,
        );
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(request.max_tokens, 150);
    }
}
