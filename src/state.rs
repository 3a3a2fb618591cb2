//! Per-session mutable state.
//!
//! One `SessionState` is owned exclusively by one `Escalator`; all
//! mutation goes through the escalator's methods. Counters are
//! monotonically adjusted by [`SessionState::update_counters`] and only
//! cleared by an explicit [`SessionState::reset`].

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::event::{EscalationEvent, EventPayload};
use crate::tier::Tier;

/// Mutable record for one conversation/session.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Tier the session is currently running at (last known).
    pub current_tier: Tier,
    /// Baseline tier resolved lazily from the adapter on first need, then
    /// frozen for the life of the instance unless reset.
    pub original_tier: Option<Tier>,
    /// Rolling, time- and size-bounded event window.
    pub recent_events: VecDeque<EscalationEvent>,
    /// Accumulated complexity score from observed messages.
    pub rolling_score: f64,
    /// Count of server errors seen this session.
    pub error_count: u32,
    /// Count of failed tool invocations seen this session.
    pub tool_error_count: u32,
    /// When the last decision was produced.
    pub last_decision_at: Option<DateTime<Utc>>,
    /// When the tier was last actually switched.
    pub last_switch_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Create state for a session assumed to start at `initial_tier`.
    pub fn new(initial_tier: Tier) -> Self {
        Self {
            current_tier: initial_tier,
            original_tier: None,
            recent_events: VecDeque::new(),
            rolling_score: 0.0,
            error_count: 0,
            tool_error_count: 0,
            last_decision_at: None,
            last_switch_at: None,
        }
    }

    /// Append an event to the window, dropping entries older than
    /// `window` and trimming to at most `max_events` (oldest first).
    pub fn push_event(&mut self, event: EscalationEvent, window: Duration, max_events: usize) {
        self.recent_events.push_back(event);

        if let Ok(age) = chrono::Duration::from_std(window) {
            let cutoff = Utc::now() - age;
            while self
                .recent_events
                .front()
                .is_some_and(|e| e.timestamp < cutoff)
            {
                self.recent_events.pop_front();
            }
        }
        while self.recent_events.len() > max_events {
            self.recent_events.pop_front();
        }
    }

    /// Update counters for an event. Runs before rule evaluation so a
    /// `response_error` always sees the token/latency effects of its own
    /// response.
    pub fn update_counters(&mut self, event: &EscalationEvent) {
        match &event.payload {
            EventPayload::Message { score, .. } => {
                self.rolling_score += score;
            }
            EventPayload::ResponseError { .. } => {
                if event.payload.is_server_error() {
                    self.error_count += 1;
                }
            }
            EventPayload::ToolResult { ok, .. } => {
                if !ok {
                    self.tool_error_count += 1;
                }
            }
            _ => {}
        }
    }

    /// Explicit session reset: clears the window, counters, timestamps,
    /// and the frozen baseline.
    pub fn reset(&mut self) {
        let tier = self.current_tier;
        *self = Self::new(tier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_size_bound() {
        let mut state = SessionState::new(Tier::Fast);
        for i in 0..10 {
            state.push_event(
                EscalationEvent::token_usage(i),
                Duration::from_secs(600),
                4,
            );
        }
        assert_eq!(state.recent_events.len(), 4);
        // Oldest were dropped.
        assert_eq!(state.recent_events[0].payload.total_tokens(), Some(6));
    }

    #[test]
    fn test_window_age_bound() {
        let mut state = SessionState::new(Tier::Fast);
        let mut stale = EscalationEvent::token_usage(1);
        stale.timestamp = Utc::now() - chrono::Duration::seconds(120);
        state.push_event(stale, Duration::from_secs(600), 10);
        state.push_event(
            EscalationEvent::token_usage(2),
            Duration::from_secs(60),
            10,
        );
        assert_eq!(state.recent_events.len(), 1);
        assert_eq!(state.recent_events[0].payload.total_tokens(), Some(2));
    }

    #[test]
    fn test_counters_track_failures() {
        let mut state = SessionState::new(Tier::Fast);

        state.update_counters(&EscalationEvent::response_error(Some(503), None));
        state.update_counters(&EscalationEvent::response_error(Some(404), None));
        state.update_counters(&EscalationEvent::tool_result("bash", false, None));
        state.update_counters(&EscalationEvent::tool_result("bash", true, None));

        // 4xx is not a server error.
        assert_eq!(state.error_count, 1);
        assert_eq!(state.tool_error_count, 1);
    }

    #[test]
    fn test_rolling_score_accumulates() {
        let mut state = SessionState::new(Tier::Fast);
        let msg = EscalationEvent::new(EventPayload::Message {
            role: crate::event::MessageRole::User,
            text: "x".into(),
            token_count: 1,
            score: 2.5,
            tier_hints: vec![],
        });
        state.update_counters(&msg);
        state.update_counters(&msg);
        assert_eq!(state.rolling_score, 5.0);
    }

    #[test]
    fn test_reset_clears_everything_but_current_tier() {
        let mut state = SessionState::new(Tier::Fast);
        state.current_tier = Tier::Flagship;
        state.original_tier = Some(Tier::Fast);
        state.error_count = 3;
        state.push_event(
            EscalationEvent::token_usage(1),
            Duration::from_secs(60),
            10,
        );

        state.reset();

        assert_eq!(state.current_tier, Tier::Flagship);
        assert_eq!(state.original_tier, None);
        assert_eq!(state.error_count, 0);
        assert!(state.recent_events.is_empty());
    }
}
