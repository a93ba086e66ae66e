//! Where reply bytes come from.
//!
//! A transport opens one streamed reply per request. The session only sees a
//! stream of byte chunks with no alignment to lines or characters.

pub mod ollama;
pub mod site;

pub use ollama::{OllamaClient, OllamaTransport};
pub use site::SiteTransport;

use async_trait::async_trait;
use futures_util::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

use crate::state::{ChatMessage, ChatRole};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response stream: {0}")]
    Malformed(String),

    #[error("no complete reply within {0:?}")]
    Timeout(Duration),
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Body sent to the chat endpoint: the conversation so far, newest last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
}

impl ChatRequest {
    /// Builds a request from history, leaving out client-generated failure notices.
    pub fn from_history(history: &[ChatMessage]) -> Self {
        let messages = history
            .iter()
            .filter(|m| !m.synthetic)
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();

        Self { messages }
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and returns the reply body as it streams in.
    ///
    /// Errors before the first byte (connection refused, non-2xx) come back
    /// here; errors mid-stream come through the stream itself.
    async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError> {
        (**self).open(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_skips_synthetic_messages() {
        let history = vec![
            ChatMessage::user("hola"),
            ChatMessage::failure("Something went wrong, please retry."),
            ChatMessage::user("¿hay alguien?"),
        ];

        let request = ChatRequest::from_history(&history);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.last_user_message(), Some("¿hay alguien?"));

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hola");
    }
}
