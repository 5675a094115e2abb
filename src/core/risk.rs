//! Anticipatory choice scoring. Stateless: a tone lookup times a
//! per-character multiplier, bucketed into a risk tier that drives how the
//! choice is presented before the player commits.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::config::ConfigError;
use crate::schema::outcome::{ChoiceCandidate, CharacterId};
use crate::schema::tier::{PulseRate, RiskTier};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskError {
    #[error("unknown tone tag: '{0}'")]
    UnknownTone(String),
}

/// Glow strength and pulse speed used to preview a choice of a given tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskPresentation {
    pub glow: f64,
    pub pulse: PulseRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskTable {
    /// Base risk per tone tag, 0..=100.
    pub tones: FxHashMap<String, u32>,
    pub characters: FxHashMap<CharacterId, f64>,
    /// Multiplier for characters missing from `characters`.
    pub default_multiplier: f64,
    /// Lowest score of each tier, ascending from 0.
    pub tier_floors: Vec<(RiskTier, u8)>,
    pub presentation: FxHashMap<RiskTier, RiskPresentation>,
}

impl Default for RiskTable {
    fn default() -> Self {
        let tones = [
            ("neutral", 10),
            ("polite", 15),
            ("casual", 15),
            ("supportive", 20),
            ("warm", 30),
            ("curious", 35),
            ("empathetic", 40),
            ("direct", 55),
            ("honest", 60),
            ("confrontational", 70),
            ("apologetic", 75),
            ("vulnerable", 80),
            ("raw", 85),
            ("admitting", 90),
            ("exposed", 95),
        ]
        .into_iter()
        .map(|(tone, value)| (tone.to_string(), value))
        .collect();

        let characters = [
            ("dad", 1.2),
            ("maya", 1.3),
            ("james", 0.9),
            ("alex", 1.1),
            ("memory_mom", 1.4),
        ]
        .into_iter()
        .map(|(id, m)| (CharacterId::from(id), m))
        .collect();

        let presentation = [
            (RiskTier::Safe, 0.2, PulseRate::Slow),
            (RiskTier::Moderate, 0.4, PulseRate::Slow),
            (RiskTier::Bold, 0.6, PulseRate::Medium),
            (RiskTier::Vulnerable, 0.8, PulseRate::Fast),
        ]
        .into_iter()
        .map(|(tier, glow, pulse)| (tier, RiskPresentation { glow, pulse }))
        .collect();

        Self {
            tones,
            characters,
            default_multiplier: 1.0,
            tier_floors: vec![
                (RiskTier::Safe, 0),
                (RiskTier::Moderate, 25),
                (RiskTier::Bold, 50),
                (RiskTier::Vulnerable, 75),
            ],
            presentation,
        }
    }
}

/// Lookup form of a tone tag.
fn tone_key(tag: &str) -> String {
    tag.trim().to_lowercase()
}

impl RiskTable {
    /// Rewrites tone keys into lookup form.
    fn normalized(mut self) -> Self {
        self.tones = self
            .tones
            .into_iter()
            .map(|(tone, value)| (tone_key(&tone), value))
            .collect();
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = FxHashMap::default();
        for tone in self.tones.keys() {
            let key = tone_key(tone);
            if key.is_empty() {
                return Err(ConfigError::Invalid("blank tone tag in risk table".into()));
            }
            if let Some(other) = seen.insert(key, tone) {
                return Err(ConfigError::Invalid(format!(
                    "tone tags '{other}' and '{tone}' differ only in case or spacing"
                )));
            }
        }
        if let Some((tone, value)) = self.tones.iter().find(|(_, v)| **v > 100) {
            return Err(ConfigError::Invalid(format!(
                "tone '{tone}' has base value {value}, above 100"
            )));
        }
        let bad_multiplier = |m: f64| !m.is_finite() || m < 0.0;
        if bad_multiplier(self.default_multiplier) {
            return Err(ConfigError::Invalid(format!(
                "default character multiplier {} must be finite and non-negative",
                self.default_multiplier
            )));
        }
        if let Some((id, m)) = self.characters.iter().find(|(_, m)| bad_multiplier(**m)) {
            return Err(ConfigError::Invalid(format!(
                "character '{id}' has invalid multiplier {m}"
            )));
        }
        if self.tier_floors.first().map(|(_, floor)| *floor) != Some(0) {
            return Err(ConfigError::Invalid(
                "the lowest risk tier must start at 0".into(),
            ));
        }
        for pair in self.tier_floors.windows(2) {
            if pair[1].0 <= pair[0].0 || pair[1].1 <= pair[0].1 {
                return Err(ConfigError::Invalid(format!(
                    "risk tiers must ascend: '{}' after '{}'",
                    pair[1].0, pair[0].0
                )));
            }
        }
        for (tier, _) in &self.tier_floors {
            if !self.presentation.contains_key(tier) {
                return Err(ConfigError::Invalid(format!(
                    "risk tier '{tier}' has no presentation"
                )));
            }
        }
        Ok(())
    }
}

/// Score, tier, and preview parameters for one candidate choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceRiskProfile {
    pub tone_tag: String,
    pub character_id: CharacterId,
    pub score: u8,
    pub tier: RiskTier,
    pub glow: f64,
    pub pulse: PulseRate,
}

#[derive(Debug, Clone)]
pub struct RiskScorer {
    table: RiskTable,
}

impl RiskScorer {
    pub fn new(table: RiskTable) -> Result<Self, ConfigError> {
        table.validate()?;
        Ok(Self {
            table: table.normalized(),
        })
    }

    pub fn table(&self) -> &RiskTable {
        &self.table
    }

    pub fn character_multiplier(&self, character: &CharacterId) -> f64 {
        self.table
            .characters
            .get(character)
            .copied()
            .unwrap_or(self.table.default_multiplier)
    }

    /// Scores a tone for a character: `base(tone) * multiplier`, rounded and
    /// clamped to 0..=100. Tone tags match case-insensitively.
    pub fn score_choice(
        &self,
        tone_tag: &str,
        character: &CharacterId,
    ) -> Result<ChoiceRiskProfile, RiskError> {
        let key = tone_key(tone_tag);
        let base = self
            .table
            .tones
            .get(&key)
            .copied()
            .ok_or_else(|| RiskError::UnknownTone(tone_tag.to_string()))?;

        let score = (base as f64 * self.character_multiplier(character))
            .round()
            .clamp(0.0, 100.0) as u8;
        let tier = self.tier_for(score);
        let look = self.table.presentation.get(&tier).copied().unwrap_or(RiskPresentation {
            glow: 0.0,
            pulse: PulseRate::Slow,
        });

        Ok(ChoiceRiskProfile {
            tone_tag: key,
            character_id: character.clone(),
            score,
            tier,
            glow: look.glow,
            pulse: look.pulse,
        })
    }

    pub fn score_candidate(&self, candidate: &ChoiceCandidate) -> Result<ChoiceRiskProfile, RiskError> {
        self.score_choice(&candidate.tone_tag, &candidate.character_id)
    }

    pub fn tier_for(&self, score: u8) -> RiskTier {
        self.table
            .tier_floors
            .iter()
            .rev()
            .find(|(_, floor)| score >= *floor)
            .map(|(tier, _)| *tier)
            .unwrap_or(RiskTier::Safe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> RiskScorer {
        RiskScorer::new(RiskTable::default()).unwrap()
    }

    #[test]
    fn exposed_with_memory_mom_clamps_to_vulnerable() {
        let profile = scorer()
            .score_choice("exposed", &CharacterId::from("memory_mom"))
            .unwrap();
        assert_eq!(profile.score, 100);
        assert_eq!(profile.tier, RiskTier::Vulnerable);
        assert_eq!(profile.pulse, PulseRate::Fast);
        assert!((profile.glow - 0.8).abs() < 1e-9);
    }

    #[test]
    fn unknown_character_uses_default_multiplier() {
        let s = scorer();
        let profile = s.score_choice("warm", &CharacterId::from("stranger")).unwrap();
        assert_eq!(profile.score, 30);
        assert_eq!(profile.tier, RiskTier::Moderate);
        assert_eq!(s.character_multiplier(&CharacterId::from("stranger")), 1.0);
    }

    #[test]
    fn character_multiplier_shifts_tier() {
        let s = scorer();
        // 40 * 0.9 = 36 vs 40 * 1.3 = 52.
        let james = s.score_choice("empathetic", &CharacterId::from("james")).unwrap();
        let maya = s.score_choice("empathetic", &CharacterId::from("maya")).unwrap();
        assert_eq!(james.score, 36);
        assert_eq!(james.tier, RiskTier::Moderate);
        assert_eq!(maya.score, 52);
        assert_eq!(maya.tier, RiskTier::Bold);
    }

    #[test]
    fn tone_lookup_ignores_case() {
        let profile = scorer()
            .score_choice("  Neutral", &CharacterId::from("alex"))
            .unwrap();
        assert_eq!(profile.tone_tag, "neutral");
        assert_eq!(profile.score, 11);
        assert_eq!(profile.tier, RiskTier::Safe);
    }

    #[test]
    fn injected_tone_keys_match_any_case() {
        let mut table = RiskTable::default();
        table.tones.clear();
        table.tones.insert("Exposed".into(), 95);
        table.tones.insert(" Warm ".into(), 30);
        let s = RiskScorer::new(table).unwrap();
        let maya = CharacterId::from("maya");
        assert_eq!(s.score_choice("Exposed", &maya).unwrap().score, 100);
        assert_eq!(s.score_choice("exposed", &maya).unwrap().tier, RiskTier::Vulnerable);
        assert_eq!(s.score_choice("WARM", &maya).unwrap().score, 39);
        assert!(s.table().tones.contains_key("warm"));
    }

    #[test]
    fn colliding_tone_keys_are_rejected() {
        let mut table = RiskTable::default();
        table.tones.insert("Exposed".into(), 60);
        assert!(RiskScorer::new(table).is_err());

        let mut table = RiskTable::default();
        table.tones.insert("  ".into(), 10);
        assert!(RiskScorer::new(table).is_err());
    }

    #[test]
    fn unknown_tone_is_an_error() {
        let err = scorer()
            .score_choice("sarcastic", &CharacterId::from("maya"))
            .unwrap_err();
        assert_eq!(err, RiskError::UnknownTone("sarcastic".into()));
    }

    #[test]
    fn tier_boundaries() {
        let s = scorer();
        assert_eq!(s.tier_for(24), RiskTier::Safe);
        assert_eq!(s.tier_for(25), RiskTier::Moderate);
        assert_eq!(s.tier_for(49), RiskTier::Moderate);
        assert_eq!(s.tier_for(50), RiskTier::Bold);
        assert_eq!(s.tier_for(74), RiskTier::Bold);
        assert_eq!(s.tier_for(75), RiskTier::Vulnerable);
        assert_eq!(s.tier_for(100), RiskTier::Vulnerable);
    }

    #[test]
    fn validation_rejects_bad_tables() {
        let mut table = RiskTable::default();
        table.characters.insert(CharacterId::from("ghost"), f64::NAN);
        assert!(RiskScorer::new(table).is_err());

        let mut table = RiskTable::default();
        table.tones.insert("shouting".into(), 140);
        assert!(RiskScorer::new(table).is_err());

        let mut table = RiskTable::default();
        table.presentation.remove(&RiskTier::Bold);
        assert!(RiskScorer::new(table).is_err());
    }
}
