//! The escalation engine façade.
//!
//! An [`Escalator`] owns one session's state, the rule set, and a session
//! adapter. Events flow in through [`Escalator::handle_event`] (or the
//! convenience wrappers [`Escalator::observe_message`] and
//! [`Escalator::ingest_response`]); each event is windowed, counted,
//! evaluated against every subscribed rule that is not cooling down,
//! arbitrated into one decision, and applied through the adapter when the
//! target differs from the current tier.
//!
//! One escalator is logically single-threaded: the session state, rule
//! list, and cooldown map live behind a single async mutex, so one event
//! is fully processed (including any adapter I/O) before the next is
//! accepted, even when callers race. Instances are independent; run one
//! per conversation.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::adapter::SessionAdapter;
use crate::arbiter;
use crate::config::EscalatorConfig;
use crate::error::{Error, Result};
use crate::event::{EscalationEvent, EventPayload, MessageRole};
use crate::response::{response_to_events, ModelResponse};
use crate::rules::{built_in_rules, EscalationRule, EscalationSuggestion};
use crate::scorer::SignalScorer;
use crate::state::SessionState;
use crate::tier::Tier;

/// The arbitrated, policy-constrained outcome for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationDecision {
    /// The tier the engine decided on after policy constraints.
    pub target_tier: Tier,
    /// Why, including any switch failure appended at apply time.
    pub reasons: Vec<String>,
    /// True only if the tier actually changed.
    pub applied: bool,
    /// The winning suggestion, if arbitration ran.
    pub suggestion: Option<EscalationSuggestion>,
    /// The event that produced this decision.
    pub event: EscalationEvent,
}

impl EscalationDecision {
    /// Pick the stronger of two decisions: higher target tier wins; on a
    /// tier tie the decision with more reasons wins. The tie-break is a
    /// heuristic, kept as documented behavior.
    pub fn strongest(a: Self, b: Self) -> Self {
        if b.target_tier > a.target_tier {
            return b;
        }
        if b.target_tier == a.target_tier && b.reasons.len() > a.reasons.len() {
            return b;
        }
        a
    }
}

struct Inner {
    config: EscalatorConfig,
    scorer: SignalScorer,
    state: SessionState,
    rules: Vec<Arc<dyn EscalationRule>>,
    /// Last successful firing per rule id, for cooldown enforcement.
    last_fired: HashMap<String, chrono::DateTime<Utc>>,
}

/// Decides which tier should handle the next step of a session and
/// applies that decision through the adapter.
pub struct Escalator {
    inner: Mutex<Inner>,
    adapter: Arc<dyn SessionAdapter>,
}

impl Escalator {
    /// Create an escalator with the built-in rule set.
    pub fn new(config: EscalatorConfig, adapter: Arc<dyn SessionAdapter>) -> Result<Self> {
        let rules = built_in_rules(&config);
        Self::with_rules(config, adapter, rules)
    }

    /// Create an escalator with a custom rule set, overriding the
    /// built-ins entirely.
    pub fn with_rules(
        config: EscalatorConfig,
        adapter: Arc<dyn SessionAdapter>,
        rules: Vec<Arc<dyn EscalationRule>>,
    ) -> Result<Self> {
        config.validate()?;
        let mut seen = std::collections::HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id().to_string()) {
                return Err(Error::config(format!("duplicate rule id '{}'", rule.id())));
            }
        }
        let scorer = SignalScorer::from_config(&config);
        Ok(Self {
            adapter,
            inner: Mutex::new(Inner {
                scorer,
                state: SessionState::new(Tier::lowest()),
                rules,
                last_fired: HashMap::new(),
                config,
            }),
        })
    }

    /// Process one event end to end and return the decision, or `None`
    /// when no rule fired (a fast path that performs no adapter I/O).
    pub async fn handle_event(&self, event: EscalationEvent) -> Option<EscalationDecision> {
        let mut inner = self.inner.lock().await;
        let debug = inner.config.debug;
        if debug {
            tracing::debug!(kind = %event.kind(), source = ?event.source, "handling event");
        }

        let window = inner.config.event_window;
        let max_events = inner.config.max_events;
        inner.state.push_event(event.clone(), window, max_events);
        inner.state.update_counters(&event);

        let now = Utc::now();
        let mut suggestions = Vec::new();
        {
            let Inner {
                rules,
                state,
                last_fired,
                ..
            } = &mut *inner;
            for rule in rules.iter() {
                if !rule.subscriptions().matches(event.kind()) {
                    continue;
                }
                if let (Some(cooldown), Some(last)) =
                    (rule.cooldown(), last_fired.get(rule.id()))
                {
                    let elapsed = (now - *last).to_std().unwrap_or(Duration::ZERO);
                    if elapsed < cooldown {
                        if debug {
                            tracing::debug!(rule = rule.id(), "rule cooling down, skipped");
                        }
                        continue;
                    }
                }

                // User rules may misbehave; a panic is contained here and
                // treated as "no suggestion" from that rule.
                let outcome = catch_unwind(AssertUnwindSafe(|| rule.evaluate(&event, state)));
                match outcome {
                    Ok(Some(mut suggestion)) => {
                        suggestion.priority.get_or_insert(rule.priority());
                        suggestion
                            .triggered_by
                            .get_or_insert_with(|| rule.id().to_string());
                        last_fired.insert(rule.id().to_string(), now);
                        suggestions.push(suggestion);
                    }
                    Ok(None) => {}
                    Err(panic) => {
                        let err = Error::RuleEvaluation {
                            rule: rule.id().to_string(),
                            message: panic_message(&panic),
                        };
                        tracing::warn!(error = %err, "rule panicked during evaluation, ignoring");
                    }
                }
            }
        }

        // Operator overrides enter arbitration at maximal priority but
        // still pass through the policy clamps.
        if let EventPayload::Manual { tier, reason } = &event.payload {
            suggestions.push(EscalationSuggestion {
                tier: *tier,
                score: None,
                reasons: vec![reason.clone().unwrap_or_else(|| "manual_override".into())],
                priority: Some(i32::MAX),
                triggered_by: Some("manual".into()),
            });
        }

        if suggestions.is_empty() {
            return None;
        }
        let winning = arbiter::resolve(suggestions)?;

        self.resolve_original(&mut inner).await;
        let original = inner.state.original_tier.unwrap_or(inner.state.current_tier);
        let target = arbiter::constrain(winning.tier, original, &inner.config);
        inner.state.last_decision_at = Some(now);

        let mut reasons = winning.reasons.clone();
        let mut applied = false;
        if target != inner.state.current_tier {
            let timeout = inner.config.adapter_timeout;
            match bounded(timeout, self.adapter.set_tier(target)).await {
                Ok(()) => {
                    inner.state.current_tier = target;
                    inner.state.last_switch_at = Some(Utc::now());
                    applied = true;
                    if debug {
                        tracing::debug!(tier = %target, "switched session tier");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, tier = %target, "tier switch failed");
                    reasons.push(format!("switch_failed: {}", e));
                }
            }
        }

        Some(EscalationDecision {
            target_tier: target,
            reasons,
            applied,
            suggestion: Some(winning),
            event,
        })
    }

    /// Decompose one model response into synthetic events, run each
    /// through [`Escalator::handle_event`] in the fixed order, and return
    /// the strongest decision observed.
    pub async fn ingest_response(&self, response: &ModelResponse) -> Option<EscalationDecision> {
        let scorer = self.inner.lock().await.scorer.clone();
        let mut strongest: Option<EscalationDecision> = None;
        for event in response_to_events(response, &scorer) {
            if let Some(decision) = self.handle_event(event).await {
                strongest = Some(match strongest {
                    None => decision,
                    Some(best) => EscalationDecision::strongest(best, decision),
                });
            }
        }
        strongest
    }

    /// Score `text` and forward it as a message event.
    pub async fn observe_message(
        &self,
        role: MessageRole,
        text: &str,
    ) -> Option<EscalationDecision> {
        let scored = self.inner.lock().await.scorer.score(text);
        let event = EscalationEvent::new(EventPayload::Message {
            role,
            text: text.to_string(),
            token_count: scored.token_count,
            score: scored.score,
            tier_hints: scored.tier_hints,
        });
        self.handle_event(event).await
    }

    /// Scoped escalation: observe `context` (possibly escalating), run
    /// `task`, and restore the baseline tier on the way out when
    /// `preserve_original_model` is set. `task`'s own error propagates
    /// unchanged; restoration runs on success and failure alike.
    pub async fn run_with_escalation<F, Fut, T, E>(
        &self,
        context: &str,
        task: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock().await;
            self.resolve_original(&mut inner).await;
        }
        let entry_tier = self.current_tier().await;
        let _ = self.observe_message(MessageRole::User, context).await;

        let result = task().await;

        let preserve = self.inner.lock().await.config.preserve_original_model;
        if preserve {
            self.restore_baseline(entry_tier).await;
        }
        result
    }

    /// Register a rule; a rule with the same id is replaced.
    pub async fn register_rule(&self, rule: Arc<dyn EscalationRule>) {
        let mut inner = self.inner.lock().await;
        if let Some(slot) = inner.rules.iter_mut().find(|r| r.id() == rule.id()) {
            tracing::debug!(rule = rule.id(), "replacing existing rule");
            *slot = rule;
        } else {
            inner.rules.push(rule);
        }
    }

    /// Remove a rule by id. Returns whether anything was removed.
    pub async fn remove_rule(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let before = inner.rules.len();
        inner.rules.retain(|r| r.id() != id);
        inner.last_fired.remove(id);
        inner.rules.len() < before
    }

    /// Ids of the currently registered rules, in evaluation order.
    pub async fn list_rules(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .rules
            .iter()
            .map(|r| r.id().to_string())
            .collect()
    }

    /// A snapshot of the active configuration.
    pub async fn config(&self) -> EscalatorConfig {
        self.inner.lock().await.config.clone()
    }

    /// Replace the configuration. Re-validates, rebuilds the scorer, and
    /// refreshes any still-registered built-in rules with the new
    /// thresholds.
    pub async fn update_config(&self, config: EscalatorConfig) -> Result<()> {
        config.validate()?;
        let mut inner = self.inner.lock().await;
        for replacement in built_in_rules(&config) {
            if let Some(slot) = inner
                .rules
                .iter_mut()
                .find(|r| r.id() == replacement.id())
            {
                *slot = replacement;
            }
        }
        inner.scorer = SignalScorer::from_config(&config);
        inner.config = config;
        Ok(())
    }

    /// The last known tier of the session.
    pub async fn current_tier(&self) -> Tier {
        self.inner.lock().await.state.current_tier
    }

    /// The session's frozen baseline tier, once resolved.
    pub async fn original_tier(&self) -> Option<Tier> {
        self.inner.lock().await.state.original_tier
    }

    /// Explicitly switch the session tier, still honoring the ceiling.
    pub async fn switch_tier(&self, tier: Tier) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let target = tier.clamp_to(inner.config.max_escalation_level);
        bounded(inner.config.adapter_timeout, self.adapter.set_tier(target)).await?;
        inner.state.current_tier = target;
        inner.state.last_switch_at = Some(Utc::now());
        Ok(())
    }

    /// Explicit session reset: clears the window, counters, cooldowns,
    /// and the frozen baseline. The cached current tier is kept.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.state.reset();
        inner.last_fired.clear();
    }

    /// Resolve the baseline tier from the adapter on first need; cached
    /// afterwards. Read failures degrade to the cached value and are
    /// retried on the next need.
    async fn resolve_original(&self, inner: &mut Inner) {
        if inner.state.original_tier.is_some() {
            return;
        }
        let timeout = inner.config.adapter_timeout;
        match bounded(timeout, self.adapter.get_current_tier()).await {
            Ok(Some(tier)) => {
                inner.state.original_tier = Some(tier);
                inner.state.current_tier = tier;
            }
            Ok(None) => {
                tracing::warn!("adapter reported unknown tier, using cached value");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read session tier, using cached value");
            }
        }
    }

    /// Restore the baseline tier if the session moved during a scoped
    /// escalation. Restoration failures are logged, never raised.
    async fn restore_baseline(&self, entry_tier: Tier) {
        let mut inner = self.inner.lock().await;
        if inner.state.current_tier == entry_tier {
            return;
        }
        let original = inner.state.original_tier.unwrap_or(entry_tier);
        let timeout = inner.config.adapter_timeout;
        match bounded(timeout, self.adapter.set_tier(original)).await {
            Ok(()) => {
                inner.state.current_tier = original;
                inner.state.last_switch_at = Some(Utc::now());
            }
            Err(e) => {
                tracing::warn!(error = %e, tier = %original, "failed to restore baseline tier");
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Bound an adapter call by the configured timeout.
async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| Error::timeout(timeout.as_millis() as u64))?
}
