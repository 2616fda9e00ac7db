//! Question/answer session protocol.
//!
//! A session is one client connection. It is admitted by the rate limiter
//! exactly once, then answers up to `message_cap` questions, strictly one
//! at a time and in order:
//!
//! ```text
//! Connecting ──admit──▶ Admitted ──▶ Active(0) ──msg──▶ Active(1) ─ … ─▶ Active(cap)
//!      │                                 │                                   │
//!      └─rejected─▶ Closed(1008)         └─error / remote close─▶ Closed     └─▶ Closed(1008)
//! ```
//!
//! | Inbound | Outbound |
//! |---------|----------|
//! | `"<document>\|\|<question>"` | `"done"`, then the answer text |
//!
//! Failures never produce an extra message: they end the session with a
//! close frame whose reason is a short tag (see [`CloseReason::tag`]). The
//! protocol is independent of the transport; the WebSocket adapter lives in
//! the server.

use async_trait::async_trait;

use crate::answer::AnswerEngine;
use crate::metadata::MetadataStore;
use crate::rate_limit::{Admission, RateLimiter};

pub const DONE_MARKER: &str = "done";
pub const DELIMITER: &str = "||";
pub const DEFAULT_MESSAGE_CAP: u32 = 5;

/// Close code for policy violations (rate limit, message cap).
pub const CLOSE_POLICY: u16 = 1008;
/// Close code for every other server-initiated close.
pub const CLOSE_NORMAL: u16 = 1000;

/// A frame received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary,
    Close,
}

#[async_trait]
pub trait SessionTransport: Send {
    /// Next client frame, or `None` once the stream has ended.
    async fn recv(&mut self) -> Option<Inbound>;
    async fn send_text(&mut self, text: String) -> anyhow::Result<()>;
    async fn close(&mut self, code: u16, reason: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Admitted,
    Active(u32),
    Closed(CloseReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    RateLimited,
    MessageLimit,
    Malformed,
    /// The engine failed; carries the error's tag.
    Query(&'static str),
    /// The client closed or the stream ended.
    Remote,
    /// Sending to the client failed.
    Transport,
}

impl CloseReason {
    /// Code of the close frame to send, if the server sends one.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            CloseReason::RateLimited | CloseReason::MessageLimit => Some(CLOSE_POLICY),
            CloseReason::Malformed | CloseReason::Query(_) => Some(CLOSE_NORMAL),
            CloseReason::Remote | CloseReason::Transport => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            CloseReason::RateLimited => "rate_limit_exceeded",
            CloseReason::MessageLimit => "message_limit_reached",
            CloseReason::Malformed => "malformed_message",
            CloseReason::Query(tag) => *tag,
            CloseReason::Remote => "remote_closed",
            CloseReason::Transport => "transport_error",
        }
    }
}

/// How a finished session went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub answered: u32,
    pub reason: CloseReason,
}

/// Split `"<document>||<question>"` into its two trimmed, non-empty parts.
pub fn parse_question(message: &str) -> Option<(&str, &str)> {
    let mut parts = message.split(DELIMITER);
    let document = parts.next()?.trim();
    let question = parts.next()?.trim();
    if parts.next().is_some() || document.is_empty() || question.is_empty() {
        return None;
    }
    Some((document, question))
}

pub struct Session<'a> {
    client: &'a str,
    limiter: &'a RateLimiter,
    engine: &'a AnswerEngine,
    history: Option<&'a MetadataStore>,
    message_cap: u32,
    state: SessionState,
}

impl<'a> Session<'a> {
    pub fn new(client: &'a str, limiter: &'a RateLimiter, engine: &'a AnswerEngine) -> Self {
        Self {
            client,
            limiter,
            engine,
            history: None,
            message_cap: DEFAULT_MESSAGE_CAP,
            state: SessionState::Connecting,
        }
    }

    /// Record every answered question in `store`.
    pub fn with_history(mut self, store: &'a MetadataStore) -> Self {
        self.history = Some(store);
        self
    }

    pub fn with_message_cap(mut self, cap: u32) -> Self {
        self.message_cap = cap.max(1);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Drive the session over `transport` until it closes.
    pub async fn run<T: SessionTransport + ?Sized>(&mut self, transport: &mut T) -> SessionOutcome {
        if let Admission::Rejected { retry_after } = self.limiter.admit(self.client) {
            tracing::info!(
                client = self.client,
                retry_after_secs = retry_after.as_secs(),
                "connection rejected by rate limiter"
            );
            return self.finish(transport, 0, CloseReason::RateLimited).await;
        }
        self.state = SessionState::Admitted;
        tracing::debug!(client = self.client, "session admitted");

        let mut answered = 0u32;
        self.state = SessionState::Active(answered);

        loop {
            let text = match transport.recv().await {
                Some(Inbound::Text(text)) => text,
                Some(Inbound::Binary) => {
                    return self.finish(transport, answered, CloseReason::Malformed).await
                }
                Some(Inbound::Close) | None => {
                    return self.finish(transport, answered, CloseReason::Remote).await
                }
            };

            let Some((document, question)) = parse_question(&text) else {
                tracing::debug!(client = self.client, "malformed message");
                return self.finish(transport, answered, CloseReason::Malformed).await;
            };

            let answer = match self.engine.answer(document, question).await {
                Ok(answer) => answer,
                Err(e) => {
                    tracing::warn!(client = self.client, document, error = %e, "query failed");
                    return self.finish(transport, answered, CloseReason::Query(e.tag())).await;
                }
            };

            if transport.send_text(DONE_MARKER.to_string()).await.is_err()
                || transport.send_text(answer.clone()).await.is_err()
            {
                return self.finish(transport, answered, CloseReason::Transport).await;
            }

            answered += 1;
            self.state = SessionState::Active(answered);
            tracing::info!(client = self.client, document, n = answered, "question answered");

            if let Some(store) = self.history {
                if let Err(e) = store.add_question(document, question, &answer).await {
                    tracing::warn!(document, error = %e, "failed to record question");
                }
            }

            if answered >= self.message_cap {
                return self.finish(transport, answered, CloseReason::MessageLimit).await;
            }
        }
    }

    async fn finish<T: SessionTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        answered: u32,
        reason: CloseReason,
    ) -> SessionOutcome {
        if let Some(code) = reason.close_code() {
            if let Err(e) = transport.close(code, reason.tag()).await {
                tracing::debug!(client = self.client, error = %e, "close frame not delivered");
            }
        }
        tracing::debug!(client = self.client, answered, reason = reason.tag(), "session closed");
        self.state = SessionState::Closed(reason.clone());
        SessionOutcome { answered, reason }
    }
}
