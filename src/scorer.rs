//! Pattern-based complexity scoring of message text.
//!
//! The scorer turns a block of text into a numeric complexity score plus
//! tier hints. It combines:
//! - a base contribution from token count, added in two configurable bands
//! - weighted literal/regex signal matches against the lower-cased text
//!
//! Scoring is a pure function of the input text and the static signal
//! table; nothing here mutates session state.

use regex::Regex;

use crate::config::{EscalatorConfig, Thresholds, TokenCounter};
use crate::error::{Error, Result};
use crate::tier::Tier;

/// A literal or regex pattern matched against lower-cased text.
#[derive(Debug, Clone)]
pub enum SignalPattern {
    /// Substring match; contributes at most once regardless of repetition.
    Literal(String),
    /// Regex match; contributes once per non-overlapping match.
    Regex(Regex),
}

/// A weighted textual pattern used to estimate task complexity.
///
/// Static configuration; signals are never mutated at runtime.
#[derive(Debug, Clone)]
pub struct ComplexitySignal {
    pub pattern: SignalPattern,
    pub weight: f64,
    pub tier_hint: Option<Tier>,
    pub description: Option<String>,
}

impl ComplexitySignal {
    /// Create a literal (substring) signal.
    pub fn literal(pattern: impl Into<String>, weight: f64) -> Self {
        Self {
            pattern: SignalPattern::Literal(pattern.into().to_lowercase()),
            weight,
            tier_hint: None,
            description: None,
        }
    }

    /// Create a regex signal. The pattern is compiled here so malformed
    /// expressions fail at construction, not during scoring.
    pub fn regex(pattern: &str, weight: f64) -> Result<Self> {
        let compiled = Regex::new(pattern)
            .map_err(|e| Error::config(format!("invalid signal regex '{}': {}", pattern, e)))?;
        Ok(Self {
            pattern: SignalPattern::Regex(compiled),
            weight,
            tier_hint: None,
            description: None,
        })
    }

    /// Attach a tier hint contributed whenever this signal matches.
    pub fn with_hint(mut self, tier: Tier) -> Self {
        self.tier_hint = Some(tier);
        self
    }

    /// Attach a human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// A short label for diagnostics: the description if set, else the
    /// pattern source.
    pub fn label(&self) -> &str {
        if let Some(desc) = &self.description {
            return desc;
        }
        match &self.pattern {
            SignalPattern::Literal(s) => s,
            SignalPattern::Regex(re) => re.as_str(),
        }
    }

    /// Count matches against already-lower-cased text. Literal patterns
    /// saturate at one.
    fn match_count(&self, lowered: &str) -> usize {
        match &self.pattern {
            SignalPattern::Literal(needle) => usize::from(lowered.contains(needle.as_str())),
            SignalPattern::Regex(re) => re.find_iter(lowered).count(),
        }
    }
}

/// Result of scoring one block of text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextScore {
    /// Token count per the configured counting strategy.
    pub token_count: usize,
    /// Combined complexity score (band bonuses + weighted matches).
    pub score: f64,
    /// Tier hints from every signal with at least one match, deduplicated.
    pub tier_hints: Vec<Tier>,
}

impl TextScore {
    /// The strongest hint collected, if any.
    pub fn max_hint(&self) -> Option<Tier> {
        self.tier_hints.iter().copied().max()
    }
}

/// Turns text into a complexity score plus tier hints.
#[derive(Clone)]
pub struct SignalScorer {
    signals: Vec<ComplexitySignal>,
    token_thresholds: Thresholds,
    mid_band_bonus: f64,
    high_band_bonus: f64,
    counter: TokenCounter,
}

impl SignalScorer {
    /// Build a scorer from the escalator configuration.
    pub fn from_config(config: &EscalatorConfig) -> Self {
        Self {
            signals: config.signals.clone(),
            token_thresholds: config.token_thresholds,
            mid_band_bonus: config.mid_band_bonus,
            high_band_bonus: config.high_band_bonus,
            counter: config.token_counter.clone(),
        }
    }

    /// Score a block of text.
    pub fn score(&self, text: &str) -> TextScore {
        let token_count = (self.counter)(text);
        let mut score = 0.0;

        // Banded base contribution from raw length.
        if token_count as u64 >= self.token_thresholds.mid {
            score += self.mid_band_bonus;
        }
        if token_count as u64 >= self.token_thresholds.high {
            score += self.high_band_bonus;
        }

        let lowered = text.to_lowercase();
        let mut tier_hints = Vec::new();
        for signal in &self.signals {
            let matches = signal.match_count(&lowered);
            if matches == 0 {
                continue;
            }
            score += signal.weight * matches as f64;
            if let Some(hint) = signal.tier_hint {
                tier_hints.push(hint);
            }
        }
        tier_hints.sort();
        tier_hints.dedup();

        TextScore {
            token_count,
            score,
            tier_hints,
        }
    }
}

impl std::fmt::Debug for SignalScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalScorer")
            .field("signals", &self.signals.len())
            .field("token_thresholds", &self.token_thresholds)
            .finish()
    }
}

/// The complexity signal table shipped with the crate.
///
/// Pattern families mirror the cues that reliably separate heavyweight
/// work from quick lookups: architecture/refactoring, debugging, security
/// review, exhaustive search, explicit thoroughness requests, and an
/// explicit "keep it quick" counter-signal.
pub fn default_signals() -> Vec<ComplexitySignal> {
    // The regexes below are fixed and known-valid; expect() never fires
    // for them.
    let regex = |pattern: &str, weight: f64| {
        ComplexitySignal::regex(pattern, weight).expect("built-in signal regex must compile")
    };

    vec![
        regex(r"architect|redesign|refactor|restructure|high.level", 3.0)
            .with_hint(Tier::Flagship)
            .with_description("architecture"),
        regex(r"security|vulnerab|injection|credential|auth\b", 3.0)
            .with_hint(Tier::Flagship)
            .with_description("security_review"),
        regex(r"\b(all|every|entire|exhaustive|comprehensive)\b", 2.0)
            .with_hint(Tier::Flagship)
            .with_description("exhaustive_search"),
        regex(r"debug|traceback|stack\s*trace|root\s*cause|not\s+work", 2.0)
            .with_hint(Tier::Balanced)
            .with_description("debugging"),
        regex(r"across|between|multiple\s+(files|modules|services)", 2.0)
            .with_hint(Tier::Balanced)
            .with_description("multi_file"),
        ComplexitySignal::literal("be thorough", 3.0)
            .with_hint(Tier::Flagship)
            .with_description("user_thorough"),
        ComplexitySignal::literal("step by step", 1.5)
            .with_hint(Tier::Balanced)
            .with_description("deliberate"),
        regex(r"\b(quick|quickly|just|simple|brief)\b", -2.0).with_description("user_fast"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scorer_with(signals: Vec<ComplexitySignal>) -> SignalScorer {
        let config = EscalatorConfig::default().with_signals(signals);
        SignalScorer::from_config(&config)
    }

    #[test]
    fn test_empty_text_scores_zero() {
        let scorer = scorer_with(vec![]);
        let result = scorer.score("");
        assert_eq!(result.token_count, 0);
        assert_eq!(result.score, 0.0);
        assert!(result.tier_hints.is_empty());
    }

    #[test]
    fn test_literal_saturates_at_one_match() {
        let scorer = scorer_with(vec![ComplexitySignal::literal("deploy", 3.0)]);
        let result = scorer.score("deploy the service then deploy again");
        assert_eq!(result.score, 3.0);
    }

    #[test]
    fn test_regex_counts_each_match() {
        let scorer = scorer_with(vec![ComplexitySignal::regex(r"deploy", 2.0).unwrap()]);
        let result = scorer.score("deploy the service then deploy again");
        assert_eq!(result.score, 4.0);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let scorer = scorer_with(vec![ComplexitySignal::literal("Refactor", 1.0)]);
        assert_eq!(scorer.score("REFACTOR this").score, 1.0);
    }

    #[test]
    fn test_token_band_bonuses() {
        let config = EscalatorConfig::default()
            .with_signals(vec![])
            .with_token_thresholds(3, 6);
        let scorer = SignalScorer::from_config(&config);

        assert_eq!(scorer.score("one two").score, 0.0);
        // Mid band only.
        assert_eq!(scorer.score("one two three four").score, 1.0);
        // Mid + high bands.
        assert_eq!(scorer.score("a b c d e f g").score, 3.5);
    }

    #[test]
    fn test_tier_hints_collected_and_deduped() {
        let scorer = scorer_with(vec![
            ComplexitySignal::literal("security", 3.0).with_hint(Tier::Flagship),
            ComplexitySignal::literal("audit", 2.0).with_hint(Tier::Flagship),
            ComplexitySignal::literal("debug", 2.0).with_hint(Tier::Balanced),
        ]);
        let result = scorer.score("security audit plus debug pass");
        assert_eq!(result.tier_hints, vec![Tier::Balanced, Tier::Flagship]);
        assert_eq!(result.max_hint(), Some(Tier::Flagship));
    }

    #[test]
    fn test_negative_weight_reduces_score() {
        let scorer = scorer_with(vec![
            ComplexitySignal::literal("debug", 2.0),
            ComplexitySignal::literal("quick", -3.0),
        ]);
        assert_eq!(scorer.score("quick debug").score, -1.0);
    }

    #[test]
    fn test_invalid_regex_rejected() {
        assert!(ComplexitySignal::regex(r"([unclosed", 1.0).is_err());
    }

    #[test]
    fn test_custom_token_counter() {
        let config = EscalatorConfig::default()
            .with_signals(vec![])
            .with_token_counter(std::sync::Arc::new(|text: &str| text.len()));
        let scorer = SignalScorer::from_config(&config);
        assert_eq!(scorer.score("abcd").token_count, 4);
    }

    #[test]
    fn test_default_signals_flag_complex_prompts() {
        let config = EscalatorConfig::default();
        let scorer = SignalScorer::from_config(&config);

        let complex = scorer.score("Refactor the auth layer and audit every security boundary");
        let simple = scorer.score("just a quick question");

        assert!(complex.score > simple.score);
        assert_eq!(complex.max_hint(), Some(Tier::Flagship));
        assert!(simple.score < 0.0);
    }
}
