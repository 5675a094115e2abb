use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::magnitude::RewardError;

/// Newtype wrapper for character ids ("maya", "memory_mom", ...).
///
/// Characters are open-ended content: any id is accepted and unknown ids
/// simply fall back to default multipliers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub String);

impl CharacterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CharacterId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a conversation beat resolved, as judged by the outcome evaluator.
///
/// `Hollow` marks an outcome reached through manipulation rather than
/// genuine connection. It is a closed set: unknown names are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    Best,
    Good,
    Neutral,
    Poor,
    Hollow,
}

impl OutcomeClass {
    pub const ALL: [OutcomeClass; 5] = [
        OutcomeClass::Best,
        OutcomeClass::Good,
        OutcomeClass::Neutral,
        OutcomeClass::Poor,
        OutcomeClass::Hollow,
    ];

    /// Every class except `Hollow`.
    pub const GENUINE: [OutcomeClass; 4] = [
        OutcomeClass::Best,
        OutcomeClass::Good,
        OutcomeClass::Neutral,
        OutcomeClass::Poor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::Good => "good",
            Self::Neutral => "neutral",
            Self::Poor => "poor",
            Self::Hollow => "hollow",
        }
    }

    pub fn is_hollow(&self) -> bool {
        matches!(self, Self::Hollow)
    }

    /// Best and good outcomes build combos and are eligible for jackpots.
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Best | Self::Good)
    }
}

impl fmt::Display for OutcomeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutcomeClass {
    type Err = RewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "good" => Ok(Self::Good),
            "neutral" => Ok(Self::Neutral),
            "poor" => Ok(Self::Poor),
            "hollow" => Ok(Self::Hollow),
            _ => Err(RewardError::InvalidOutcomeClass(s.to_string())),
        }
    }
}

/// Context flags understood by the engine. Any other flag is carried
/// through untouched.
pub mod flags {
    pub const SIGNIFICANT: &str = "significant";
    pub const BREAKTHROUGH: &str = "breakthrough";
    pub const RARE: &str = "rare";
    pub const NEAR_MISS: &str = "near_miss";
    pub const FRACTIONATION: &str = "fractionation";

    pub const ANGER: &str = "anger";
    pub const JOY: &str = "joy";
    pub const RELIEF: &str = "relief";

    pub const REPAIR: &str = "repair";
    pub const HIGH_TENSION: &str = "high_tension";
    pub const FAST_PLAYER: &str = "fast_player";
    pub const SLOW_PLAYER: &str = "slow_player";

    pub const HIGH_PRESSURE_SURVIVED: &str = "high_pressure_survived";
    pub const CONSECUTIVE_VULNERABLE: &str = "consecutive_vulnerable";
    pub const NEAR_FAILURE_RECOVERY: &str = "near_failure_recovery";
    pub const LATE_CHAPTER: &str = "late_chapter";
    pub const DEEP_RELATIONSHIP: &str = "deep_relationship";
}

/// A resolved outcome delivered by the dialogue collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub class: OutcomeClass,
    /// Total change across the relationship metrics caused by this beat.
    pub metric_delta: f64,
    pub character_id: CharacterId,
    #[serde(default)]
    pub context_flags: FxHashSet<String>,
}

impl OutcomeEvent {
    pub fn new(class: OutcomeClass, metric_delta: f64, character_id: impl Into<String>) -> Self {
        Self {
            class,
            metric_delta,
            character_id: CharacterId::new(character_id),
            context_flags: FxHashSet::default(),
        }
    }

    /// Builds an event from a class name, rejecting unknown classes.
    pub fn parse(
        class: &str,
        metric_delta: f64,
        character_id: impl Into<String>,
    ) -> Result<Self, RewardError> {
        Ok(Self::new(class.parse()?, metric_delta, character_id))
    }

    pub fn with_flag(mut self, flag: &str) -> Self {
        self.context_flags.insert(flag.to_string());
        self
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.context_flags.contains(flag)
    }
}

/// A dialogue option offered to the player, scored before commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceCandidate {
    pub tone_tag: String,
    pub character_id: CharacterId,
}

impl ChoiceCandidate {
    pub fn new(tone_tag: impl Into<String>, character_id: impl Into<String>) -> Self {
        Self {
            tone_tag: tone_tag.into(),
            character_id: CharacterId::new(character_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_class_parses_case_insensitively() {
        assert_eq!("best".parse::<OutcomeClass>().unwrap(), OutcomeClass::Best);
        assert_eq!(" Hollow ".parse::<OutcomeClass>().unwrap(), OutcomeClass::Hollow);
        assert_eq!("POOR".parse::<OutcomeClass>().unwrap(), OutcomeClass::Poor);
    }

    #[test]
    fn unknown_outcome_class_is_rejected() {
        let err = "jackpot".parse::<OutcomeClass>().unwrap_err();
        assert_eq!(err, RewardError::InvalidOutcomeClass("jackpot".to_string()));
        assert!(OutcomeEvent::parse("excellent", 3.0, "maya").is_err());
        assert_eq!(
            OutcomeEvent::parse("good", 3.0, "maya").unwrap().class,
            OutcomeClass::Good
        );
    }

    #[test]
    fn positive_classes() {
        assert!(OutcomeClass::Best.is_positive());
        assert!(OutcomeClass::Good.is_positive());
        assert!(!OutcomeClass::Neutral.is_positive());
        assert!(!OutcomeClass::Hollow.is_positive());
        assert!(!OutcomeClass::GENUINE.contains(&OutcomeClass::Hollow));
    }

    #[test]
    fn outcome_event_flags() {
        let event = OutcomeEvent::new(OutcomeClass::Good, 12.0, "maya")
            .with_flag(flags::REPAIR)
            .with_flag(flags::LATE_CHAPTER);
        assert!(event.has_flag("repair"));
        assert!(event.has_flag("late_chapter"));
        assert!(!event.has_flag("near_miss"));
        assert_eq!(event.character_id.as_str(), "maya");
    }
}
