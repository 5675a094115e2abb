use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualitative weight of a reward. `Hollow` sorts below every genuine tier,
/// so it can never preempt a running arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardTier {
    Hollow,
    Minimal,
    Mild,
    Satisfying,
    Deep,
    Profound,
}

impl RewardTier {
    pub const GENUINE: [RewardTier; 5] = [
        RewardTier::Minimal,
        RewardTier::Mild,
        RewardTier::Satisfying,
        RewardTier::Deep,
        RewardTier::Profound,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hollow => "hollow",
            Self::Minimal => "minimal",
            Self::Mild => "mild",
            Self::Satisfying => "satisfying",
            Self::Deep => "deep",
            Self::Profound => "profound",
        }
    }

    pub fn is_hollow(&self) -> bool {
        matches!(self, Self::Hollow)
    }
}

impl fmt::Display for RewardTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Emotional exposure of a dialogue choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Safe,
    Moderate,
    Bold,
    Vulnerable,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Safe,
        RiskTier::Moderate,
        RiskTier::Bold,
        RiskTier::Vulnerable,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Moderate => "moderate",
            Self::Bold => "bold",
            Self::Vulnerable => "vulnerable",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pulse speed of the anticipatory glow on a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseRate {
    Slow,
    Medium,
    Fast,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hollow_is_lowest_reward_tier() {
        for tier in RewardTier::GENUINE {
            assert!(RewardTier::Hollow < tier);
        }
        assert!(RewardTier::Deep > RewardTier::Minimal);
        assert!(RewardTier::Profound > RewardTier::Deep);
    }

    #[test]
    fn risk_tiers_ascend() {
        for pair in RiskTier::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
