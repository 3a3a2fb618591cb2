//! Decomposition of one model response into synthetic events.
//!
//! `response_to_events` is a pure function so the decomposition order can
//! be unit-tested independently of the escalator. The order is fixed:
//! `response`, then `assistant_message` (if there is text), `token_usage`,
//! `latency`, `response_error` (if an error or 4xx/5xx status is
//! present), then one `tool_result` per reported tool outcome. The
//! ordering guarantees that a `response_error` event always sees the
//! token/latency counters already updated for the same response.

use serde::{Deserialize, Serialize};

use crate::event::{EscalationEvent, EventPayload, MessageRole};
use crate::scorer::SignalScorer;

/// Outcome of a single tool invocation reported by the host session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ToolOutcome {
    pub fn ok(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            ok: true,
            detail: None,
        }
    }

    pub fn failed(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

/// One already-parsed response from the host session's model backend.
///
/// Transport and wire format are the caller's concern; the engine only
/// consumes this shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Assistant text, if the response produced any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Total tokens consumed by the exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    /// Wall-clock latency of the exchange in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// HTTP-ish status code, if the backend reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Explicit error message, if the backend reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tool outcomes attributed to this response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolOutcome>,
}

impl ModelResponse {
    /// Whether this response carries an error condition.
    pub fn has_error(&self) -> bool {
        self.error.is_some() || self.status.is_some_and(|s| s >= 400)
    }
}

/// Decompose a response into synthetic events in the fixed order.
pub fn response_to_events(
    response: &ModelResponse,
    scorer: &SignalScorer,
) -> Vec<EscalationEvent> {
    let mut events = Vec::new();
    let source = "response";

    events.push(
        EscalationEvent::new(EventPayload::Response {
            total_tokens: response.total_tokens,
            latency_ms: response.latency_ms,
            status: response.status,
        })
        .with_source(source),
    );

    if let Some(text) = &response.text {
        let scored = scorer.score(text);
        events.push(
            EscalationEvent::new(EventPayload::Message {
                role: MessageRole::Assistant,
                text: text.clone(),
                token_count: scored.token_count,
                score: scored.score,
                tier_hints: scored.tier_hints,
            })
            .with_source(source),
        );
    }

    if let Some(total_tokens) = response.total_tokens {
        events.push(EscalationEvent::token_usage(total_tokens).with_source(source));
    }

    if let Some(latency_ms) = response.latency_ms {
        events.push(EscalationEvent::latency(latency_ms).with_source(source));
    }

    if response.has_error() {
        events.push(
            EscalationEvent::response_error(response.status, response.error.clone())
                .with_source(source),
        );
    }

    for outcome in &response.tools {
        events.push(
            EscalationEvent::tool_result(&outcome.tool, outcome.ok, outcome.detail.clone())
                .with_source(source),
        );
    }

    events
}
