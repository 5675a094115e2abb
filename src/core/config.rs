//! Engine configuration: every tunable table in one injectable structure,
//! loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::arc::ArcProfile;
use crate::core::magnitude::RewardTable;
use crate::core::phase::{SessionSchedule, SessionTemplate};
use crate::core::risk::RiskTable;
use crate::core::sync::SyncProfile;
use crate::core::trigger::TriggerRules;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// All engine tables. Every section defaults, so a RON document only needs
/// the fields it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for jackpot rolls.
    pub seed: u64,
    /// Tick gaps longer than this are logged as a suspended host.
    pub suspend_threshold_ms: u64,
    pub session: SessionSchedule,
    pub reward: RewardTable,
    pub risk: RiskTable,
    pub arc: ArcProfile,
    pub sync: SyncProfile,
    pub triggers: TriggerRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            suspend_threshold_ms: 1000,
            session: SessionSchedule::default(),
            reward: RewardTable::default(),
            risk: RiskTable::default(),
            arc: ArcProfile::default(),
            sync: SyncProfile::default(),
            triggers: TriggerRules::default(),
        }
    }
}

impl EngineConfig {
    /// Default tables with the phase schedule of `template`.
    pub fn for_template(template: SessionTemplate) -> Self {
        Self {
            session: SessionSchedule::from_template(template),
            ..Self::default()
        }
    }

    /// Load and validate a configuration from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and validate a configuration from a RON string.
    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;
        self.reward.validate()?;
        self.risk.validate()?;
        self.arc.validate()?;
        self.sync.validate()?;
        self.triggers.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::session::Phase;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        for template in [
            SessionTemplate::Standard,
            SessionTemplate::FitnessHabit,
            SessionTemplate::SocialExperience,
        ] {
            assert!(EngineConfig::for_template(template).validate().is_ok());
        }
    }

    #[test]
    fn partial_ron_uses_defaults() {
        let config = EngineConfig::parse_ron("(seed: 7, suspend_threshold_ms: 250)").unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.suspend_threshold_ms, 250);
        assert_eq!(config.session.phases.len(), 6);
        assert_eq!(config.reward.magnitude_cap, 200);
    }

    #[test]
    fn nested_overrides() {
        let config = EngineConfig::parse_ron(
            "(reward: (magnitude_cap: 180), sync: (tolerance_ms: 90))",
        )
        .unwrap();
        assert_eq!(config.reward.magnitude_cap, 180);
        assert_eq!(config.reward.hollow_factor, 0.15);
        assert_eq!(config.sync.tolerance_ms, 90);
    }

    #[test]
    fn invalid_values_are_rejected_on_parse() {
        let err = EngineConfig::parse_ron("(sync: (tolerance_ms: 250))").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = EngineConfig::parse_ron("(seed: \"many\")").unwrap_err();
        assert!(matches!(err, ConfigError::Ron(_)));
    }

    #[test]
    fn load_standard_session_file() {
        let path = std::path::PathBuf::from("data/standard_session.ron");
        let config = EngineConfig::load_from_ron(&path).unwrap();
        assert_eq!(config.session.phases.len(), 6);
        assert_eq!(config.session.phases[3].phase, Phase::Peak);
        assert_eq!(config.session.session_end_ms(), 660_000);
        assert_eq!(config.arc.hollow_flash_ms, 300);
        assert_eq!(config.arc.delivery[2].levels.blur, 4.0);
        assert_eq!(config.triggers, TriggerRules::default());
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = std::path::PathBuf::from("data/no_such_config.ron");
        assert!(matches!(
            EngineConfig::load_from_ron(&path),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn ron_round_trip() {
        let config = EngineConfig::for_template(SessionTemplate::FitnessHabit);
        let serialized = ron::to_string(&config).unwrap();
        let parsed = EngineConfig::parse_ron(&serialized).unwrap();
        assert_eq!(parsed.session.phases.len(), 5);
        assert_eq!(parsed.risk.tones.len(), config.risk.tones.len());
        assert_eq!(parsed.seed, config.seed);
    }
}
