//! Capability/cost tiers for model selection.
//!
//! Tiers form a fixed total order used for all comparisons: `Fast <
//! Balanced < Flagship`. Arbitration always picks an existing tier and
//! never interpolates between them.

use serde::{Deserialize, Serialize};

/// One of the ordered capability/cost levels a session can run at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Fast and cheap (e.g., Claude Haiku, GPT-4o-mini)
    Fast = 0,
    /// Balanced capability and cost (e.g., Claude Sonnet, GPT-4o)
    Balanced = 1,
    /// Most capable, highest cost (e.g., Claude Opus, GPT-4)
    Flagship = 2,
}

impl Tier {
    /// The lowest tier in the order.
    pub const fn lowest() -> Self {
        Tier::Fast
    }

    /// The highest tier in the order.
    pub const fn highest() -> Self {
        Tier::Flagship
    }

    /// Get the tier name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Balanced => "balanced",
            Tier::Flagship => "flagship",
        }
    }

    /// Parse a tier from a string, accepting common aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fast" | "low" | "haiku" | "mini" => Some(Tier::Fast),
            "balanced" | "mid" | "medium" | "sonnet" => Some(Tier::Balanced),
            "flagship" | "high" | "opus" | "premium" => Some(Tier::Flagship),
            _ => None,
        }
    }

    /// Get the next tier up (for escalation).
    pub fn next(&self) -> Option<Self> {
        match self {
            Tier::Fast => Some(Tier::Balanced),
            Tier::Balanced => Some(Tier::Flagship),
            Tier::Flagship => None,
        }
    }

    /// Get the next tier down (for downgrades).
    pub fn previous(&self) -> Option<Self> {
        match self {
            Tier::Fast => None,
            Tier::Balanced => Some(Tier::Fast),
            Tier::Flagship => Some(Tier::Balanced),
        }
    }

    /// Escalate one step, saturating at the top tier.
    pub fn escalated(&self) -> Self {
        self.next().unwrap_or(*self)
    }

    /// Clamp this tier to at most `ceiling`.
    pub fn clamp_to(&self, ceiling: Tier) -> Self {
        (*self).min(ceiling)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid tier: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Fast < Tier::Balanced);
        assert!(Tier::Balanced < Tier::Flagship);
        assert_eq!(Tier::lowest(), Tier::Fast);
        assert_eq!(Tier::highest(), Tier::Flagship);
    }

    #[test]
    fn test_tier_progression() {
        assert_eq!(Tier::Fast.next(), Some(Tier::Balanced));
        assert_eq!(Tier::Balanced.next(), Some(Tier::Flagship));
        assert_eq!(Tier::Flagship.next(), None);
        assert_eq!(Tier::Flagship.escalated(), Tier::Flagship);
    }

    #[test]
    fn test_tier_demotion() {
        assert_eq!(Tier::Flagship.previous(), Some(Tier::Balanced));
        assert_eq!(Tier::Balanced.previous(), Some(Tier::Fast));
        assert_eq!(Tier::Fast.previous(), None);
    }

    #[test]
    fn test_clamp_to_ceiling() {
        assert_eq!(Tier::Flagship.clamp_to(Tier::Balanced), Tier::Balanced);
        assert_eq!(Tier::Fast.clamp_to(Tier::Balanced), Tier::Fast);
        assert_eq!(Tier::Flagship.clamp_to(Tier::Flagship), Tier::Flagship);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(Tier::parse("opus"), Some(Tier::Flagship));
        assert_eq!(Tier::parse("MID"), Some(Tier::Balanced));
        assert_eq!(Tier::parse(" fast "), Some(Tier::Fast));
        assert_eq!(Tier::parse("gigantic"), None);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Tier::Flagship).unwrap();
        assert_eq!(json, "\"flagship\"");
        let tier: Tier = serde_json::from_str("\"balanced\"").unwrap();
        assert_eq!(tier, Tier::Balanced);
    }
}
