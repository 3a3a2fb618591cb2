//! # tierswitch
//!
//! A real-time escalation engine for interactive AI sessions: observes
//! low-level signals (message text, token counts, latency, errors, tool
//! outcomes) and continuously re-targets the session's capability/cost
//! tier so that capability scales with observed complexity.
//!
//! ## Core Components
//!
//! - **Tier**: the ordered set of capability levels
//! - **SignalScorer**: pattern-based complexity scoring of message text
//! - **Rules**: pluggable `(event, state) -> suggestion` checks
//! - **Arbiter**: tier-first resolution of conflicting suggestions
//! - **Escalator**: the façade owning session state and the adapter
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tierswitch::{Escalator, EscalatorConfig, StaticAdapter, Tier};
//!
//! let adapter = Arc::new(StaticAdapter::new(Tier::Fast));
//! let escalator = Escalator::new(EscalatorConfig::default(), adapter)?;
//!
//! if let Some(decision) = escalator
//!     .observe_message(tierswitch::MessageRole::User, "audit every auth path")
//!     .await
//! {
//!     println!("escalated to {}: {:?}", decision.target_tier, decision.reasons);
//! }
//! ```

pub mod adapter;
pub mod arbiter;
pub mod config;
pub mod error;
pub mod escalator;
pub mod event;
pub mod response;
pub mod rules;
pub mod scorer;
pub mod state;
pub mod tier;

// Re-exports for convenience
pub use adapter::{CommandAdapter, CommandAdapterConfig, SessionAdapter, StaticAdapter};
pub use arbiter::{constrain, resolve};
pub use config::{
    whitespace_token_counter, EscalatorConfig, ScoreThresholds, Thresholds, TokenCounter,
};
pub use error::{Error, Result};
pub use escalator::{EscalationDecision, Escalator};
pub use event::{EscalationEvent, EventKind, EventPayload, MessageRole};
pub use response::{response_to_events, ModelResponse, ToolOutcome};
pub use rules::{
    built_in_rules, ContextSignalRule, EscalationRule, EscalationSuggestion, EventFilter, FnRule,
    LatencySpikeRule, ResponseErrorRule, TokenUsageRule, ToolFailureRule,
};
pub use scorer::{default_signals, ComplexitySignal, SignalPattern, SignalScorer, TextScore};
pub use state::SessionState;
pub use tier::Tier;
