//! Escalator configuration.
//!
//! All knobs are validated once at construction; a bad configuration
//! fails fast and never surfaces mid-session.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::scorer::{default_signals, ComplexitySignal};
use crate::tier::Tier;

/// Mid/high breakpoints for integer-valued measurements (tokens, latency).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Thresholds {
    pub mid: u64,
    pub high: u64,
}

impl Thresholds {
    pub fn new(mid: u64, high: u64) -> Self {
        Self { mid, high }
    }
}

/// Mid/high breakpoints for the complexity score.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScoreThresholds {
    pub mid: f64,
    pub high: f64,
}

impl ScoreThresholds {
    pub fn new(mid: f64, high: f64) -> Self {
        Self { mid, high }
    }
}

/// Injectable token-counting strategy. The default counts whitespace-
/// delimited tokens, which is monotonic in text length for equal-weight
/// tokens; callers with a real tokenizer can plug it in here.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Default token counter: whitespace-delimited words.
pub fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|text: &str| text.split_whitespace().count())
}

/// Configuration consumed by the [`Escalator`](crate::Escalator) at
/// construction.
#[derive(Clone)]
pub struct EscalatorConfig {
    /// Token-count breakpoints for the token-usage rule and base score bands.
    pub token_thresholds: Thresholds,
    /// Score breakpoints for the context-signal rule.
    pub score_thresholds: ScoreThresholds,
    /// Latency breakpoints (ms) for the latency-spike rule.
    pub latency_thresholds: Thresholds,
    /// Complexity signals used by the signal scorer.
    pub signals: Vec<ComplexitySignal>,
    /// Score bonus added when the token count reaches the mid band.
    pub mid_band_bonus: f64,
    /// Score bonus added when the token count reaches the high band.
    pub high_band_bonus: f64,
    /// Hard ceiling tier; the applied tier never exceeds it.
    pub max_escalation_level: Tier,
    /// Whether `run_with_escalation` restores the baseline tier on exit.
    pub preserve_original_model: bool,
    /// Whether arbitration may go below the session's original tier.
    pub allow_downgrade: bool,
    /// Events older than this are dropped from the session window.
    pub event_window: Duration,
    /// Maximum number of events retained in the session window.
    pub max_events: usize,
    /// Upper bound on each adapter call.
    pub adapter_timeout: Duration,
    /// Injectable token-counting function.
    pub token_counter: TokenCounter,
    /// Enables verbose per-event diagnostic logging.
    pub debug: bool,
}

impl Default for EscalatorConfig {
    fn default() -> Self {
        Self {
            token_thresholds: Thresholds::new(500, 1200),
            score_thresholds: ScoreThresholds::new(3.0, 6.0),
            latency_thresholds: Thresholds::new(5_000, 15_000),
            signals: default_signals(),
            mid_band_bonus: 1.0,
            high_band_bonus: 2.5,
            max_escalation_level: Tier::highest(),
            preserve_original_model: true,
            allow_downgrade: false,
            event_window: Duration::from_secs(300),
            max_events: 100,
            adapter_timeout: Duration::from_secs(10),
            token_counter: whitespace_token_counter(),
            debug: false,
        }
    }
}

impl EscalatorConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the token-count breakpoints.
    pub fn with_token_thresholds(mut self, mid: u64, high: u64) -> Self {
        self.token_thresholds = Thresholds::new(mid, high);
        self
    }

    /// Set the complexity score breakpoints.
    pub fn with_score_thresholds(mut self, mid: f64, high: f64) -> Self {
        self.score_thresholds = ScoreThresholds::new(mid, high);
        self
    }

    /// Set the latency breakpoints (milliseconds).
    pub fn with_latency_thresholds(mut self, mid: u64, high: u64) -> Self {
        self.latency_thresholds = Thresholds::new(mid, high);
        self
    }

    /// Replace the complexity signal table.
    pub fn with_signals(mut self, signals: Vec<ComplexitySignal>) -> Self {
        self.signals = signals;
        self
    }

    /// Set the tier ceiling.
    pub fn with_max_escalation_level(mut self, tier: Tier) -> Self {
        self.max_escalation_level = tier;
        self
    }

    /// Set whether the baseline tier is restored after scoped escalation.
    pub fn with_preserve_original_model(mut self, preserve: bool) -> Self {
        self.preserve_original_model = preserve;
        self
    }

    /// Set whether the applied tier may drop below the session baseline.
    pub fn with_allow_downgrade(mut self, allow: bool) -> Self {
        self.allow_downgrade = allow;
        self
    }

    /// Set the event window retention policy.
    pub fn with_event_window(mut self, window: Duration, max_events: usize) -> Self {
        self.event_window = window;
        self.max_events = max_events;
        self
    }

    /// Set the per-call adapter timeout.
    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    /// Inject a custom token counter.
    pub fn with_token_counter(mut self, counter: TokenCounter) -> Self {
        self.token_counter = counter;
        self
    }

    /// Enable verbose diagnostic logging.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validate the configuration. Called once at Escalator construction.
    pub fn validate(&self) -> Result<()> {
        if self.token_thresholds.mid > self.token_thresholds.high {
            return Err(Error::config(format!(
                "token thresholds inverted: mid {} > high {}",
                self.token_thresholds.mid, self.token_thresholds.high
            )));
        }
        if self.latency_thresholds.mid > self.latency_thresholds.high {
            return Err(Error::config(format!(
                "latency thresholds inverted: mid {} > high {}",
                self.latency_thresholds.mid, self.latency_thresholds.high
            )));
        }
        if self.score_thresholds.mid > self.score_thresholds.high {
            return Err(Error::config(format!(
                "score thresholds inverted: mid {} > high {}",
                self.score_thresholds.mid, self.score_thresholds.high
            )));
        }
        if !self.score_thresholds.mid.is_finite() || !self.score_thresholds.high.is_finite() {
            return Err(Error::config("score thresholds must be finite"));
        }
        if self.max_events == 0 {
            return Err(Error::config("max_events must be at least 1"));
        }
        if self.event_window.is_zero() {
            return Err(Error::config("event_window must be non-zero"));
        }
        for signal in &self.signals {
            if !signal.weight.is_finite() {
                return Err(Error::config(format!(
                    "signal '{}' has a non-finite weight",
                    signal.label()
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for EscalatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalatorConfig")
            .field("token_thresholds", &self.token_thresholds)
            .field("score_thresholds", &self.score_thresholds)
            .field("latency_thresholds", &self.latency_thresholds)
            .field("signals", &self.signals.len())
            .field("max_escalation_level", &self.max_escalation_level)
            .field("preserve_original_model", &self.preserve_original_model)
            .field("allow_downgrade", &self.allow_downgrade)
            .field("event_window", &self.event_window)
            .field("max_events", &self.max_events)
            .field("adapter_timeout", &self.adapter_timeout)
            .field("debug", &self.debug)
            .finish()
    }
}
