//! Escalation events: the low-level signals the engine consumes.
//!
//! Events are immutable once created. Processing order is arrival order;
//! timestamps are informational and only used for window retention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tier::Tier;

/// The kind of an escalation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UserMessage,
    AssistantMessage,
    Response,
    ResponseError,
    TokenUsage,
    Latency,
    ToolResult,
    Manual,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::UserMessage => "user_message",
            EventKind::AssistantMessage => "assistant_message",
            EventKind::Response => "response",
            EventKind::ResponseError => "response_error",
            EventKind::TokenUsage => "token_usage",
            EventKind::Latency => "latency",
            EventKind::ToolResult => "tool_result",
            EventKind::Manual => "manual",
        };
        write!(f, "{}", name)
    }
}

/// Role of a conversation message observed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Per-kind payload of an escalation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// A conversation message, pre-scored by the signal scorer.
    Message {
        role: MessageRole,
        text: String,
        token_count: usize,
        score: f64,
        tier_hints: Vec<Tier>,
    },
    /// A whole model response (summary view; companion synthetic events
    /// carry the individual measurements).
    Response {
        total_tokens: Option<u64>,
        latency_ms: Option<u64>,
        status: Option<u16>,
    },
    /// An error outcome from the model backend.
    ResponseError {
        status: Option<u16>,
        message: Option<String>,
    },
    /// Token consumption for one exchange.
    TokenUsage { total_tokens: u64 },
    /// Wall-clock latency for one exchange.
    Latency { latency_ms: u64 },
    /// Outcome of a single tool invocation.
    ToolResult {
        tool: String,
        ok: bool,
        detail: Option<String>,
    },
    /// Operator override requesting a specific tier.
    Manual { tier: Tier, reason: Option<String> },
}

impl EventPayload {
    /// The event kind this payload belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Message {
                role: MessageRole::User,
                ..
            } => EventKind::UserMessage,
            EventPayload::Message {
                role: MessageRole::Assistant,
                ..
            } => EventKind::AssistantMessage,
            EventPayload::Response { .. } => EventKind::Response,
            EventPayload::ResponseError { .. } => EventKind::ResponseError,
            EventPayload::TokenUsage { .. } => EventKind::TokenUsage,
            EventPayload::Latency { .. } => EventKind::Latency,
            EventPayload::ToolResult { .. } => EventKind::ToolResult,
            EventPayload::Manual { .. } => EventKind::Manual,
        }
    }

    /// Total tokens carried by this payload, if any.
    pub fn total_tokens(&self) -> Option<u64> {
        match self {
            EventPayload::TokenUsage { total_tokens } => Some(*total_tokens),
            EventPayload::Response { total_tokens, .. } => *total_tokens,
            _ => None,
        }
    }

    /// Latency in milliseconds carried by this payload, if any.
    pub fn latency_ms(&self) -> Option<u64> {
        match self {
            EventPayload::Latency { latency_ms } => Some(*latency_ms),
            EventPayload::Response { latency_ms, .. } => *latency_ms,
            _ => None,
        }
    }

    /// Whether this payload represents a server-side error: HTTP 5xx or
    /// an explicit error with no status at all.
    pub fn is_server_error(&self) -> bool {
        match self {
            EventPayload::ResponseError { status, .. } => status.map_or(true, |s| s >= 500),
            _ => false,
        }
    }
}

/// One observed signal, as appended to the session window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl EscalationEvent {
    /// Create an event with the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
            source: None,
        }
    }

    /// Tag the event with an origin label.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Create a token usage event.
    pub fn token_usage(total_tokens: u64) -> Self {
        Self::new(EventPayload::TokenUsage { total_tokens })
    }

    /// Create a latency event.
    pub fn latency(latency_ms: u64) -> Self {
        Self::new(EventPayload::Latency { latency_ms })
    }

    /// Create a response error event.
    pub fn response_error(status: Option<u16>, message: Option<String>) -> Self {
        Self::new(EventPayload::ResponseError { status, message })
    }

    /// Create a tool result event.
    pub fn tool_result(tool: impl Into<String>, ok: bool, detail: Option<String>) -> Self {
        Self::new(EventPayload::ToolResult {
            tool: tool.into(),
            ok,
            detail,
        })
    }

    /// Create a manual override event.
    pub fn manual(tier: Tier, reason: Option<String>) -> Self {
        Self::new(EventPayload::Manual { tier, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_derivation() {
        assert_eq!(
            EscalationEvent::token_usage(100).kind(),
            EventKind::TokenUsage
        );
        assert_eq!(
            EscalationEvent::tool_result("bash", false, None).kind(),
            EventKind::ToolResult
        );
        let msg = EventPayload::Message {
            role: MessageRole::Assistant,
            text: "hi".into(),
            token_count: 1,
            score: 0.0,
            tier_hints: vec![],
        };
        assert_eq!(msg.kind(), EventKind::AssistantMessage);
    }

    #[test]
    fn test_total_tokens_accessor() {
        assert_eq!(
            EscalationEvent::token_usage(1300).payload.total_tokens(),
            Some(1300)
        );
        let resp = EventPayload::Response {
            total_tokens: Some(42),
            latency_ms: Some(900),
            status: Some(200),
        };
        assert_eq!(resp.total_tokens(), Some(42));
        assert_eq!(resp.latency_ms(), Some(900));
        assert_eq!(EscalationEvent::latency(5).payload.total_tokens(), None);
    }

    #[test]
    fn test_server_error_detection() {
        assert!(EscalationEvent::response_error(Some(500), None)
            .payload
            .is_server_error());
        assert!(EscalationEvent::response_error(None, Some("boom".into()))
            .payload
            .is_server_error());
        assert!(!EscalationEvent::response_error(Some(429), None)
            .payload
            .is_server_error());
        assert!(!EscalationEvent::latency(10).payload.is_server_error());
    }
}
