//! Reward magnitude: base value by outcome class, context bonuses with
//! per-modifier caps, a global cap, and the hollow attenuation.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::config::ConfigError;
use crate::schema::outcome::{flags, OutcomeClass};
use crate::schema::tier::RewardTier;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RewardError {
    #[error("invalid outcome class: '{0}'")]
    InvalidOutcomeClass(String),
}

/// Context that can amplify a reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardModifier {
    HighPressureSurvived,
    ConsecutiveVulnerable,
    NearFailureRecovery,
    LateChapter,
    DeepRelationship,
}

impl RewardModifier {
    pub const ALL: [RewardModifier; 5] = [
        RewardModifier::HighPressureSurvived,
        RewardModifier::ConsecutiveVulnerable,
        RewardModifier::NearFailureRecovery,
        RewardModifier::LateChapter,
        RewardModifier::DeepRelationship,
    ];

    /// The context flag that switches this modifier on.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::HighPressureSurvived => flags::HIGH_PRESSURE_SURVIVED,
            Self::ConsecutiveVulnerable => flags::CONSECUTIVE_VULNERABLE,
            Self::NearFailureRecovery => flags::NEAR_FAILURE_RECOVERY,
            Self::LateChapter => flags::LATE_CHAPTER,
            Self::DeepRelationship => flags::DEEP_RELATIONSHIP,
        }
    }

    pub fn from_flag(flag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.flag() == flag)
    }
}

/// Bonus fraction a modifier adds at full strength, and its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModifierRule {
    pub bonus: f64,
    pub cap: f64,
}

impl ModifierRule {
    pub const fn new(bonus: f64, cap: f64) -> Self {
        Self { bonus, cap }
    }
}

/// Active modifiers with a strength each (1.0 = fully present).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifiers {
    strengths: FxHashMap<RewardModifier, f64>,
}

impl Modifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, modifier: RewardModifier, strength: f64) -> Self {
        self.set(modifier, strength);
        self
    }

    pub fn set(&mut self, modifier: RewardModifier, strength: f64) {
        self.strengths.insert(modifier, strength);
    }

    /// Every recognised flag switches its modifier on at full strength.
    pub fn from_flags<'a, I>(context_flags: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut modifiers = Self::new();
        for flag in context_flags {
            if let Some(m) = RewardModifier::from_flag(flag) {
                modifiers.set(m, 1.0);
            }
        }
        modifiers
    }

    pub fn strength(&self, modifier: RewardModifier) -> f64 {
        self.strengths.get(&modifier).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.strengths.is_empty()
    }
}

/// Tunable reward table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardTable {
    pub base: FxHashMap<OutcomeClass, u32>,
    pub modifiers: FxHashMap<RewardModifier, ModifierRule>,
    pub magnitude_cap: u32,
    pub hollow_factor: f64,
    /// Lower bounds per genuine tier, ascending.
    pub tier_thresholds: Vec<(RewardTier, u32)>,
}

impl Default for RewardTable {
    fn default() -> Self {
        let base = [
            (OutcomeClass::Best, 100),
            (OutcomeClass::Good, 70),
            (OutcomeClass::Neutral, 30),
            (OutcomeClass::Poor, 20),
            (OutcomeClass::Hollow, 100),
        ]
        .into_iter()
        .collect();
        let modifiers = [
            (RewardModifier::HighPressureSurvived, ModifierRule::new(0.4, 0.4)),
            (RewardModifier::ConsecutiveVulnerable, ModifierRule::new(0.5, 0.5)),
            (RewardModifier::NearFailureRecovery, ModifierRule::new(0.6, 0.6)),
            (RewardModifier::LateChapter, ModifierRule::new(0.3, 0.3)),
            (RewardModifier::DeepRelationship, ModifierRule::new(0.3, 0.3)),
        ]
        .into_iter()
        .collect();
        Self {
            base,
            modifiers,
            magnitude_cap: 200,
            hollow_factor: 0.15,
            tier_thresholds: vec![
                (RewardTier::Minimal, 0),
                (RewardTier::Mild, 40),
                (RewardTier::Satisfying, 70),
                (RewardTier::Deep, 100),
                (RewardTier::Profound, 150),
            ],
        }
    }
}

impl RewardTable {
    pub fn base_for(&self, class: OutcomeClass) -> u32 {
        self.base.get(&class).copied().unwrap_or(0)
    }

    /// Checks the table can keep every hollow magnitude strictly below
    /// every genuine one.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for class in OutcomeClass::ALL {
            if !self.base.contains_key(&class) {
                return Err(ConfigError::Invalid(format!(
                    "reward table has no base for '{class}'"
                )));
            }
        }
        if self.magnitude_cap == 0 {
            return Err(ConfigError::Invalid("magnitude cap must be positive".into()));
        }
        if !(self.hollow_factor > 0.0 && self.hollow_factor < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "hollow factor {} must lie strictly between 0 and 1",
                self.hollow_factor
            )));
        }
        for (modifier, rule) in &self.modifiers {
            if !(rule.bonus >= 0.0 && rule.cap >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "modifier '{}' has a negative bonus or cap",
                    modifier.flag()
                )));
            }
        }

        let cap = self.magnitude_cap as f64;
        let min_genuine = OutcomeClass::GENUINE
            .iter()
            .map(|c| self.base_for(*c))
            .min()
            .unwrap_or(0) as f64;
        let hollow_ceiling = self.base_for(OutcomeClass::Hollow) as f64 * self.hollow_factor;
        if hollow_ceiling + 1.0 > min_genuine.min(cap) {
            return Err(ConfigError::Invalid(format!(
                "hollow base x factor ({hollow_ceiling}) must sit at least 1 below \
                 the smallest genuine base ({min_genuine})"
            )));
        }
        if cap * (1.0 - self.hollow_factor) < 1.0 {
            return Err(ConfigError::Invalid(
                "magnitude cap too small to separate hollow from genuine rewards".into(),
            ));
        }

        let mut previous: Option<&(RewardTier, u32)> = None;
        for entry in &self.tier_thresholds {
            if entry.0.is_hollow() {
                return Err(ConfigError::Invalid(
                    "hollow has no magnitude threshold".into(),
                ));
            }
            if let Some(prev) = previous {
                if entry.0 <= prev.0 || entry.1 <= prev.1 {
                    return Err(ConfigError::Invalid(format!(
                        "tier thresholds must ascend: '{}' after '{}'",
                        entry.0, prev.0
                    )));
                }
            }
            previous = Some(entry);
        }
        match self.tier_thresholds.first() {
            Some((_, 0)) => Ok(()),
            _ => Err(ConfigError::Invalid(
                "the lowest tier threshold must be 0".into(),
            )),
        }
    }
}

/// A computed reward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardMagnitude {
    pub class: OutcomeClass,
    pub tier: RewardTier,
    pub magnitude: u32,
    pub cap: u32,
    /// Total bonus fraction applied before the cap.
    pub bonus: f64,
}

impl RewardMagnitude {
    pub fn is_hollow(&self) -> bool {
        self.class.is_hollow()
    }

    /// Magnitude as a share of the cap.
    pub fn fraction(&self) -> f64 {
        if self.cap == 0 {
            0.0
        } else {
            self.magnitude as f64 / self.cap as f64
        }
    }
}

impl fmt::Display for RewardMagnitude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({}/{})", self.class, self.tier, self.magnitude, self.cap)
    }
}

#[derive(Debug, Clone)]
pub struct RewardCalculator {
    table: RewardTable,
}

impl RewardCalculator {
    pub fn new(table: RewardTable) -> Result<Self, ConfigError> {
        table.validate()?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &RewardTable {
        &self.table
    }

    pub fn cap(&self) -> u32 {
        self.table.magnitude_cap
    }

    /// Capped magnitude for `class` under `modifiers`. Bonuses are summed
    /// after each is clamped to its own cap; the total is then clamped to
    /// the global cap. Hollow outcomes are attenuated afterwards.
    pub fn compute_magnitude(&self, class: OutcomeClass, modifiers: &Modifiers) -> RewardMagnitude {
        let cap = self.table.magnitude_cap as f64;
        let bonus = self.total_bonus(modifiers);
        let raw = (self.table.base_for(class) as f64 * (1.0 + bonus)).min(cap);

        let (magnitude, tier) = if class.is_hollow() {
            ((raw * self.table.hollow_factor).round() as u32, RewardTier::Hollow)
        } else {
            let magnitude = raw.round() as u32;
            (magnitude, self.tier_for(magnitude))
        };

        RewardMagnitude {
            class,
            tier,
            magnitude: magnitude.min(self.table.magnitude_cap),
            cap: self.table.magnitude_cap,
            bonus,
        }
    }

    /// Same as [`compute_magnitude`](Self::compute_magnitude) for a class
    /// given by name.
    pub fn compute_magnitude_str(
        &self,
        class: &str,
        modifiers: &Modifiers,
    ) -> Result<RewardMagnitude, RewardError> {
        let class: OutcomeClass = class.parse()?;
        Ok(self.compute_magnitude(class, modifiers))
    }

    /// Genuine tier for a magnitude.
    pub fn tier_for(&self, magnitude: u32) -> RewardTier {
        self.table
            .tier_thresholds
            .iter()
            .rev()
            .find(|(_, floor)| magnitude >= *floor)
            .map(|(tier, _)| *tier)
            .unwrap_or(RewardTier::Minimal)
    }

    /// Lowers a genuine reward to at most `ceiling`, trimming the magnitude
    /// into that tier's band.
    pub fn limit_to_tier(&self, reward: RewardMagnitude, ceiling: RewardTier) -> RewardMagnitude {
        if reward.is_hollow() || reward.tier <= ceiling {
            return reward;
        }
        let next_floor = self
            .table
            .tier_thresholds
            .iter()
            .find(|(tier, _)| *tier > ceiling)
            .map(|(_, floor)| *floor);
        let magnitude = match next_floor {
            Some(floor) => reward.magnitude.min(floor.saturating_sub(1)),
            None => reward.magnitude,
        };
        RewardMagnitude {
            magnitude,
            tier: self.tier_for(magnitude),
            ..reward
        }
    }

    fn total_bonus(&self, modifiers: &Modifiers) -> f64 {
        self.table
            .modifiers
            .iter()
            .map(|(modifier, rule)| {
                let strength = modifiers.strength(*modifier);
                let strength = if strength.is_nan() { 0.0 } else { strength };
                (rule.bonus * strength).clamp(0.0, rule.cap)
            })
            .sum()
    }
}
