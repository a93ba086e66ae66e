//! Client chat session.
//!
//! One session owns one conversation and at most one request in flight:
//!
//! ```text
//! ready ──submit──▶ submitting ──headers ok──▶ streaming ──end──▶ ready
//!                        │                          │
//!                        └──── failure / timeout ───┴──▶ error ──submit──▶ submitting
//!                        └──────────── abort ───────┴──▶ ready
//! ```
//!
//! The transition methods are public so a UI can drive its own event loop;
//! `send` runs a whole turn against a `Transport`.

use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decoder::TextBuffer;
use crate::state::{ChatMessage, ReplyFormat, SessionStatus};
use crate::transport::{ChatRequest, Transport, TransportError};

/// Shown in place of a reply when a turn fails.
pub const FAILURE_MESSAGE: &str = "Something went wrong, please retry.";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Receives incremental state while a turn streams.
pub trait SessionObserver {
    /// Called after every received chunk with the re-decoded assistant turn.
    fn on_update(&mut self, _message: &ChatMessage) {}

    /// Called once the reply is frozen into history.
    fn on_finish(&mut self, _elapsed: Duration) {}
}

impl SessionObserver for () {}

#[derive(Debug)]
pub enum TurnOutcome {
    /// Blank input, or a request was already in flight.
    Rejected,
    Completed { elapsed: Duration },
    Failed(TransportError),
    Aborted,
}

pub struct ChatSession<T> {
    transport: T,
    format: ReplyFormat,
    timeout: Duration,
    status: SessionStatus,
    messages: Vec<ChatMessage>,
    buffer: Option<TextBuffer>,
    started: Option<Instant>,
}

impl<T: Transport> ChatSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            format: ReplyFormat::default(),
            timeout: DEFAULT_TIMEOUT,
            status: SessionStatus::Ready,
            messages: Vec::new(),
            buffer: None,
            started: None,
        }
    }

    pub fn with_format(mut self, format: ReplyFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn format(&self) -> ReplyFormat {
        self.format
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Forgets the conversation. Ignored while a request is in flight.
    pub fn clear(&mut self) -> bool {
        if self.status.in_flight() {
            return false;
        }
        self.messages.clear();
        self.transition(SessionStatus::Ready);
        true
    }

    /// `ready`/`error` → `submitting`. Returns the request to send, or `None`
    /// when the input is blank or another request is outstanding.
    pub fn submit(&mut self, input: &str) -> Option<ChatRequest> {
        let input = input.trim();
        if input.is_empty() {
            debug!("Ignoring blank chat input");
            return None;
        }
        if !self.status.accepts_input() {
            debug!(status = self.status.as_str(), "Ignoring submit while a request is in flight");
            return None;
        }

        self.messages.push(ChatMessage::user(input));
        self.started = Some(Instant::now());
        self.transition(SessionStatus::Submitting);

        Some(ChatRequest::from_history(&self.messages))
    }

    /// `submitting` → `streaming`; opens an empty assistant turn.
    pub fn begin_stream(&mut self) -> bool {
        if self.status != SessionStatus::Submitting {
            return false;
        }

        self.messages.push(ChatMessage::assistant(self.format.decode("")));
        self.buffer = Some(TextBuffer::new());
        self.transition(SessionStatus::Streaming);
        true
    }

    /// Feeds a chunk and re-decodes the whole reply received so far.
    pub fn receive(&mut self, chunk: &[u8]) -> Option<&ChatMessage> {
        if self.status != SessionStatus::Streaming {
            return None;
        }

        let buffer = self.buffer.as_mut()?;
        buffer.push(chunk);
        let reply = self.format.decode(buffer.as_str());

        let last = self.messages.last_mut()?;
        *last = ChatMessage::assistant(reply);
        Some(last)
    }

    /// `streaming` → `ready`; freezes the reply and returns the turn's duration.
    pub fn complete(&mut self) -> Option<Duration> {
        if self.status != SessionStatus::Streaming {
            return None;
        }

        let text = self.buffer.take().map(TextBuffer::finish).unwrap_or_default();
        let reply = self.format.decode(&text);
        if reply.is_empty() {
            warn!(bytes = text.len(), "Reply finished without a message");
        }
        if let Some(last) = self.messages.last_mut() {
            *last = ChatMessage::assistant(reply);
        }

        let elapsed = self.started.take().map(|s| s.elapsed()).unwrap_or_default();
        self.transition(SessionStatus::Ready);
        Some(elapsed)
    }

    /// `submitting`/`streaming` → `error`, replacing any partial reply with a notice.
    pub fn fail(&mut self, error: &TransportError) {
        if !self.status.in_flight() {
            return;
        }

        warn!(error = %error, "Chat turn failed");
        self.discard_partial_reply();
        self.messages.push(ChatMessage::failure(FAILURE_MESSAGE));
        self.transition(SessionStatus::Error);
    }

    /// `submitting`/`streaming` → `ready`. Not a failure: no notice is added.
    pub fn abort(&mut self) {
        if !self.status.in_flight() {
            return;
        }

        info!("Chat turn cancelled");
        self.discard_partial_reply();
        self.transition(SessionStatus::Ready);
    }

    /// Runs one full turn: submit, stream, then complete, fail or abort.
    ///
    /// Cancelling `cancel` aborts the turn. The session timeout bounds the
    /// whole turn and counts as a failure.
    pub async fn send<O: SessionObserver>(
        &mut self,
        input: &str,
        cancel: &CancellationToken,
        observer: &mut O,
    ) -> TurnOutcome {
        let Some(request) = self.submit(input) else {
            return TurnOutcome::Rejected;
        };
        let timeout = self.timeout;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(timeout, self.stream_reply(&request, observer)) => Some(result),
        };

        match result {
            None => {
                self.abort();
                TurnOutcome::Aborted
            }
            Some(Ok(Ok(()))) => {
                let elapsed = self.complete().unwrap_or_default();
                debug!(elapsed_ms = elapsed.as_millis() as u64, "Chat turn finished");
                observer.on_finish(elapsed);
                TurnOutcome::Completed { elapsed }
            }
            Some(Ok(Err(error))) => {
                self.fail(&error);
                TurnOutcome::Failed(error)
            }
            Some(Err(_)) => {
                let error = TransportError::Timeout(timeout);
                self.fail(&error);
                TurnOutcome::Failed(error)
            }
        }
    }

    async fn stream_reply<O: SessionObserver>(
        &mut self,
        request: &ChatRequest,
        observer: &mut O,
    ) -> Result<(), TransportError> {
        let mut stream = self.transport.open(request).await?;
        self.begin_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let Some(message) = self.receive(&chunk) {
                observer.on_update(message);
            }
        }

        Ok(())
    }

    // Drops the in-flight assistant turn, if streaming had started.
    fn discard_partial_reply(&mut self) {
        if self.status == SessionStatus::Streaming {
            self.messages.pop();
        }
        self.buffer = None;
        self.started = None;
    }

    fn transition(&mut self, next: SessionStatus) {
        if self.status != next {
            debug!(from = self.status.as_str(), to = next.as_str(), "Session transition");
        }
        self.status = next;
    }
}
