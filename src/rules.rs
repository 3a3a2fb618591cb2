//! The escalation rule set.
//!
//! A rule is a pure check `(event, state) -> Option<suggestion>`. Rules
//! are interchangeable values behind one trait; the five built-ins can be
//! removed or replaced individually, and [`FnRule`] wraps a closure for
//! ad-hoc rules. Cooldown bookkeeping is owned by the escalator (keyed by
//! rule id), not by the rules themselves.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{EscalatorConfig, ScoreThresholds, Thresholds};
use crate::event::{EscalationEvent, EventKind, EventPayload};
use crate::state::SessionState;
use crate::tier::Tier;

/// A rule's proposed tier plus justification, not yet final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationSuggestion {
    pub tier: Tier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub reasons: Vec<String>,
    /// Filled in from the rule's static priority when the rule omits it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Id of the rule that produced this suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
}

impl EscalationSuggestion {
    /// Create a suggestion with a single reason.
    pub fn new(tier: Tier, reason: impl Into<String>) -> Self {
        Self {
            tier,
            score: None,
            reasons: vec![reason.into()],
            priority: None,
            triggered_by: None,
        }
    }

    /// Set the numeric score behind this suggestion.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Override the rule's static priority for this suggestion.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Append a reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }
}

/// Which event kinds a rule subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// The rule sees every event.
    All,
    /// The rule sees only the listed kinds.
    Only(Vec<EventKind>),
}

impl EventFilter {
    /// Build a filter from a list of kinds.
    pub fn only(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        EventFilter::Only(kinds.into_iter().collect())
    }

    /// Whether the filter admits `kind`.
    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(kinds) => kinds.contains(&kind),
        }
    }
}

/// An escalation rule: a total function from an event and the session
/// state to an optional suggestion.
///
/// `evaluate` must never panic by contract; panics from user-supplied
/// rules are isolated by the escalator and treated as "no suggestion".
pub trait EscalationRule: Send + Sync {
    /// Unique id, used for cooldown tracking and removal.
    fn id(&self) -> &str;

    /// Event kinds this rule subscribes to.
    fn subscriptions(&self) -> EventFilter;

    /// Static priority used when a suggestion does not carry its own.
    fn priority(&self) -> i32 {
        0
    }

    /// Minimum time between successive firings, if any. The clock only
    /// advances when the rule actually fires.
    fn cooldown(&self) -> Option<Duration> {
        None
    }

    /// Evaluate the rule against an event.
    fn evaluate(
        &self,
        event: &EscalationEvent,
        state: &SessionState,
    ) -> Option<EscalationSuggestion>;
}

/// Escalates on high token consumption.
#[derive(Debug, Clone)]
pub struct TokenUsageRule {
    thresholds: Thresholds,
    cooldown: Option<Duration>,
}

impl TokenUsageRule {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            cooldown: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }
}

impl EscalationRule for TokenUsageRule {
    fn id(&self) -> &str {
        "token-usage"
    }

    fn subscriptions(&self) -> EventFilter {
        EventFilter::only([EventKind::TokenUsage, EventKind::Response])
    }

    fn priority(&self) -> i32 {
        10
    }

    fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    fn evaluate(
        &self,
        event: &EscalationEvent,
        _state: &SessionState,
    ) -> Option<EscalationSuggestion> {
        let total = event.payload.total_tokens()?;
        if total >= self.thresholds.high {
            Some(
                EscalationSuggestion::new(
                    Tier::Flagship,
                    format!("token_usage>={}", self.thresholds.high),
                )
                .with_score(total as f64)
                .with_priority(20),
            )
        } else if total >= self.thresholds.mid {
            Some(
                EscalationSuggestion::new(
                    Tier::Balanced,
                    format!("token_usage>={}", self.thresholds.mid),
                )
                .with_score(total as f64)
                .with_priority(10),
            )
        } else {
            None
        }
    }
}

/// Escalates on slow responses.
#[derive(Debug, Clone)]
pub struct LatencySpikeRule {
    thresholds: Thresholds,
    cooldown: Option<Duration>,
}

impl LatencySpikeRule {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            cooldown: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }
}

impl EscalationRule for LatencySpikeRule {
    fn id(&self) -> &str {
        "latency-spike"
    }

    fn subscriptions(&self) -> EventFilter {
        EventFilter::only([EventKind::Latency, EventKind::Response])
    }

    fn priority(&self) -> i32 {
        10
    }

    fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    fn evaluate(
        &self,
        event: &EscalationEvent,
        _state: &SessionState,
    ) -> Option<EscalationSuggestion> {
        let latency = event.payload.latency_ms()?;
        if latency >= self.thresholds.high {
            Some(
                EscalationSuggestion::new(
                    Tier::Flagship,
                    format!("latency_ms>={}", self.thresholds.high),
                )
                .with_score(latency as f64)
                .with_priority(20),
            )
        } else if latency >= self.thresholds.mid {
            Some(
                EscalationSuggestion::new(
                    Tier::Balanced,
                    format!("latency_ms>={}", self.thresholds.mid),
                )
                .with_score(latency as f64)
                .with_priority(10),
            )
        } else {
            None
        }
    }
}

/// Escalates on server errors; a repeat error in the same session jumps
/// straight to the top tier.
#[derive(Debug, Clone, Default)]
pub struct ResponseErrorRule {
    cooldown: Option<Duration>,
}

impl ResponseErrorRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }
}

impl EscalationRule for ResponseErrorRule {
    fn id(&self) -> &str {
        "response-error"
    }

    fn subscriptions(&self) -> EventFilter {
        EventFilter::only([EventKind::ResponseError])
    }

    fn priority(&self) -> i32 {
        30
    }

    fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    fn evaluate(
        &self,
        event: &EscalationEvent,
        state: &SessionState,
    ) -> Option<EscalationSuggestion> {
        if !event.payload.is_server_error() {
            return None;
        }
        let status = match &event.payload {
            EventPayload::ResponseError { status, .. } => *status,
            _ => None,
        };
        // error_count already includes this event; > 1 means a prior
        // error existed.
        if state.error_count > 1 {
            Some(EscalationSuggestion::new(
                Tier::highest(),
                format!("repeated_server_errors (count={})", state.error_count),
            ))
        } else {
            let reason = match status {
                Some(code) => format!("server_error status={}", code),
                None => "server_error".to_string(),
            };
            Some(EscalationSuggestion::new(
                state.current_tier.escalated(),
                reason,
            ))
        }
    }
}

/// Escalates on failed tool invocations, with the same repeat
/// intensification as [`ResponseErrorRule`].
#[derive(Debug, Clone, Default)]
pub struct ToolFailureRule {
    cooldown: Option<Duration>,
}

impl ToolFailureRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }
}

impl EscalationRule for ToolFailureRule {
    fn id(&self) -> &str {
        "tool-failure"
    }

    fn subscriptions(&self) -> EventFilter {
        EventFilter::only([EventKind::ToolResult])
    }

    fn priority(&self) -> i32 {
        25
    }

    fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    fn evaluate(
        &self,
        event: &EscalationEvent,
        state: &SessionState,
    ) -> Option<EscalationSuggestion> {
        let tool = match &event.payload {
            EventPayload::ToolResult { tool, ok: false, .. } => tool,
            _ => return None,
        };
        if state.tool_error_count > 1 {
            Some(EscalationSuggestion::new(
                Tier::highest(),
                format!(
                    "repeated_tool_failures (count={})",
                    state.tool_error_count
                ),
            ))
        } else {
            Some(EscalationSuggestion::new(
                state.current_tier.escalated(),
                format!("tool_failure:{}", tool),
            ))
        }
    }
}

/// Escalates on message complexity: the scorer's result against the
/// configured thresholds, combined with any collected tier hints.
#[derive(Debug, Clone)]
pub struct ContextSignalRule {
    thresholds: ScoreThresholds,
    cooldown: Option<Duration>,
}

impl ContextSignalRule {
    pub fn new(thresholds: ScoreThresholds) -> Self {
        Self {
            thresholds,
            cooldown: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }
}

impl EscalationRule for ContextSignalRule {
    fn id(&self) -> &str {
        "context-signal"
    }

    fn subscriptions(&self) -> EventFilter {
        EventFilter::only([EventKind::UserMessage, EventKind::AssistantMessage])
    }

    fn priority(&self) -> i32 {
        15
    }

    fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    fn evaluate(
        &self,
        event: &EscalationEvent,
        _state: &SessionState,
    ) -> Option<EscalationSuggestion> {
        let (score, hints) = match &event.payload {
            EventPayload::Message {
                score, tier_hints, ..
            } => (*score, tier_hints),
            _ => return None,
        };

        let threshold_tier = if score >= self.thresholds.high {
            Tier::Flagship
        } else if score >= self.thresholds.mid {
            Tier::Balanced
        } else {
            Tier::lowest()
        };

        // Maximum of the threshold-implied tier and every hint.
        let target = hints
            .iter()
            .copied()
            .fold(threshold_tier, |acc, hint| acc.max(hint));
        if target == Tier::lowest() {
            return None;
        }

        let mut suggestion = EscalationSuggestion::new(
            target,
            format!("complexity_score={:.1}", score),
        )
        .with_score(score);
        if let Some(max_hint) = hints.iter().copied().max() {
            suggestion = suggestion.with_reason(format!("signal_hint:{}", max_hint));
        }
        Some(suggestion)
    }
}

/// Adapter wrapping a closure plus metadata, so callers can register an
/// ad-hoc rule without defining a new type.
pub struct FnRule<F> {
    id: String,
    filter: EventFilter,
    priority: i32,
    cooldown: Option<Duration>,
    func: F,
}

impl<F> FnRule<F>
where
    F: Fn(&EscalationEvent, &SessionState) -> Option<EscalationSuggestion> + Send + Sync,
{
    pub fn new(id: impl Into<String>, filter: EventFilter, func: F) -> Self {
        Self {
            id: id.into(),
            filter,
            priority: 0,
            cooldown: None,
            func,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }
}

impl<F> EscalationRule for FnRule<F>
where
    F: Fn(&EscalationEvent, &SessionState) -> Option<EscalationSuggestion> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn subscriptions(&self) -> EventFilter {
        self.filter.clone()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    fn evaluate(
        &self,
        event: &EscalationEvent,
        state: &SessionState,
    ) -> Option<EscalationSuggestion> {
        (self.func)(event, state)
    }
}

/// The built-in rule set, parameterized by the configured thresholds.
pub fn built_in_rules(config: &EscalatorConfig) -> Vec<Arc<dyn EscalationRule>> {
    vec![
        Arc::new(TokenUsageRule::new(config.token_thresholds)),
        Arc::new(LatencySpikeRule::new(config.latency_thresholds)),
        Arc::new(ResponseErrorRule::new()),
        Arc::new(ToolFailureRule::new()),
        Arc::new(ContextSignalRule::new(config.score_thresholds)),
    ]
}
