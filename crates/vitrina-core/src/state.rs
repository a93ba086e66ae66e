//! UI-agnostic chat state types
//!
//! Shared between the session driver and whatever renders it (terminal, web
//! view, tests). Nothing here depends on a UI framework.

use serde::{Deserialize, Serialize};

use crate::decoder;
use crate::legacy::{self, LegacyActionMessage};
use crate::protocol::StructuredMessage;

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Where a session is in its single request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Ready,
    Submitting,
    Streaming,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Ready => "ready",
            SessionStatus::Submitting => "submitting",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Error => "error",
        }
    }

    /// A new turn may only start from here.
    pub fn accepts_input(&self) -> bool {
        matches!(self, SessionStatus::Ready | SessionStatus::Error)
    }

    pub fn in_flight(&self) -> bool {
        matches!(self, SessionStatus::Submitting | SessionStatus::Streaming)
    }
}

/// Which grammar the endpoint answers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyFormat {
    #[default]
    Structured,
    Legacy,
}

impl ReplyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyFormat::Structured => "structured",
            ReplyFormat::Legacy => "legacy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "structured" => Some(ReplyFormat::Structured),
            "legacy" => Some(ReplyFormat::Legacy),
            _ => None,
        }
    }

    pub fn decode(&self, text: &str) -> Reply {
        match self {
            ReplyFormat::Structured => Reply::Structured(decoder::decode(text)),
            ReplyFormat::Legacy => Reply::Legacy(legacy::parse_legacy_tags(text)),
        }
    }
}

/// A decoded assistant reply in either grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum Reply {
    Structured(StructuredMessage),
    Legacy(LegacyActionMessage),
}

impl Reply {
    /// The human-readable part of the reply.
    pub fn text(&self) -> &str {
        match self {
            Reply::Structured(message) => &message.message,
            Reply::Legacy(message) => &message.text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text().trim().is_empty()
    }

    pub fn as_structured(&self) -> Option<&StructuredMessage> {
        match self {
            Reply::Structured(message) => Some(message),
            Reply::Legacy(_) => None,
        }
    }

    pub fn as_legacy(&self) -> Option<&LegacyActionMessage> {
        match self {
            Reply::Legacy(message) => Some(message),
            Reply::Structured(_) => None,
        }
    }
}

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Decoded reply, assistant turns only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<Reply>,
    /// Client-generated message standing in for a failed turn.
    #[serde(default)]
    pub synthetic: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            reply: None,
            synthetic: false,
        }
    }

    pub fn assistant(reply: Reply) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: reply.text().to_string(),
            reply: Some(reply),
            synthetic: false,
        }
    }

    pub fn failure(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            role: ChatRole::Assistant,
            reply: Some(Reply::Structured(StructuredMessage::text(content.clone()))),
            content,
            synthetic: true,
        }
    }
}
