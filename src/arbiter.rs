//! Arbitration among conflicting rule suggestions.
//!
//! `resolve` folds the suggestions left to right with a fixed ordering:
//! tier first, then priority, then score. The fold is deterministic and
//! independent of rule evaluation order (a tested property). `constrain`
//! then applies the downgrade policy and the tier ceiling.

use crate::config::EscalatorConfig;
use crate::rules::EscalationSuggestion;
use crate::tier::Tier;

/// Whether `candidate` beats `incumbent` under tier-first, priority-
/// second, score-third ordering. Ties keep the incumbent.
fn beats(candidate: &EscalationSuggestion, incumbent: &EscalationSuggestion) -> bool {
    if candidate.tier != incumbent.tier {
        return candidate.tier > incumbent.tier;
    }
    let (cp, ip) = (
        candidate.priority.unwrap_or(0),
        incumbent.priority.unwrap_or(0),
    );
    if cp != ip {
        return cp > ip;
    }
    candidate.score.unwrap_or(0.0).total_cmp(&incumbent.score.unwrap_or(0.0))
        == std::cmp::Ordering::Greater
}

/// Pick one suggestion from all rules that fired for an event.
///
/// The resolved tier is always the maximum tier among the inputs; the
/// arbitrator never picks a weaker tier than the strongest suggestion.
pub fn resolve(suggestions: Vec<EscalationSuggestion>) -> Option<EscalationSuggestion> {
    suggestions.into_iter().reduce(|incumbent, candidate| {
        if beats(&candidate, &incumbent) {
            candidate
        } else {
            incumbent
        }
    })
}

/// Apply the downgrade policy and tier ceiling to a resolved tier.
///
/// With `allow_downgrade` off, the result never drops below the session's
/// original tier. The ceiling applies last and unconditionally, so a
/// ceiling below the baseline wins over the floor.
pub fn constrain(suggested: Tier, original: Tier, config: &EscalatorConfig) -> Tier {
    let mut tier = suggested;
    if !config.allow_downgrade && tier < original {
        tier = original;
    }
    tier.clamp_to(config.max_escalation_level)
}
