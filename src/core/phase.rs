//! Session phase scheduler: which pacing phase owns a point in session
//! time, and how likely an ambient reward is there.

use serde::{Deserialize, Serialize};

use crate::core::clock::{check_time, TimeError};
use crate::core::config::ConfigError;
use crate::schema::session::Phase;

/// One phase's half-open `[start_ms, end_ms)` window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseWindow {
    pub phase: Phase,
    pub start_ms: u64,
    pub end_ms: u64,
    pub reward_probability: f64,
}

impl PhaseWindow {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }

    pub fn contains(&self, elapsed_ms: f64) -> bool {
        elapsed_ms >= self.start_ms as f64 && elapsed_ms < self.end_ms as f64
    }
}

/// Standard eleven-minute arc: (phase, seconds, base probability).
const STANDARD_ARC: [(Phase, u64, f64); 6] = [
    (Phase::Entry, 60, 0.05),
    (Phase::Build, 120, 0.15),
    (Phase::Challenge, 180, 0.25),
    (Phase::Peak, 120, 0.35),
    (Phase::Integrate, 120, 0.20),
    (Phase::Close, 60, 0.10),
];

/// Prebuilt session shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTemplate {
    /// 11 minutes, all six phases.
    Standard,
    /// 5 minutes, no integrate phase.
    FitnessHabit,
    /// 12 minutes, all six phases.
    SocialExperience,
}

impl SessionTemplate {
    pub fn total_ms(&self) -> u64 {
        match self {
            Self::Standard => 660_000,
            Self::FitnessHabit => 300_000,
            Self::SocialExperience => 720_000,
        }
    }

    pub fn phases(&self) -> &'static [Phase] {
        match self {
            Self::Standard | Self::SocialExperience => &Phase::ALL,
            Self::FitnessHabit => &[
                Phase::Entry,
                Phase::Build,
                Phase::Challenge,
                Phase::Peak,
                Phase::Close,
            ],
        }
    }

    /// Windows for this template. Included phases keep their standard
    /// relative weights, rescaled to the template length.
    pub fn phase_table(&self) -> Vec<PhaseWindow> {
        let included: Vec<(Phase, u64, f64)> = STANDARD_ARC
            .iter()
            .copied()
            .filter(|(phase, _, _)| self.phases().contains(phase))
            .collect();
        let total_weight: u64 = included.iter().map(|(_, secs, _)| secs).sum();
        let total_ms = self.total_ms();

        let mut windows = Vec::with_capacity(included.len());
        let mut cumulative = 0u64;
        let mut start_ms = 0u64;
        for (phase, secs, probability) in included {
            cumulative += secs;
            // Rounded cumulatively so the windows stay contiguous.
            let end_ms = (total_ms as f64 * cumulative as f64 / total_weight as f64).round() as u64;
            windows.push(PhaseWindow {
                phase,
                start_ms,
                end_ms,
                reward_probability: probability,
            });
            start_ms = end_ms;
        }
        windows
    }
}

/// The static phase table plus interpolation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSchedule {
    pub phases: Vec<PhaseWindow>,
    /// Blend probabilities across phase boundaries.
    pub interpolate: bool,
    /// Share of each phase's duration used for blending at each end.
    pub blend_fraction: f64,
}

impl Default for SessionSchedule {
    fn default() -> Self {
        Self::from_template(SessionTemplate::Standard)
    }
}

impl SessionSchedule {
    pub fn from_template(template: SessionTemplate) -> Self {
        Self {
            phases: template.phase_table(),
            interpolate: true,
            blend_fraction: 0.1,
        }
    }

    pub fn session_end_ms(&self) -> u64 {
        self.phases.last().map(|w| w.end_ms).unwrap_or(0)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let first = self
            .phases
            .first()
            .ok_or_else(|| ConfigError::Invalid("phase table is empty".to_string()))?;
        if first.start_ms != 0 {
            return Err(ConfigError::Invalid(format!(
                "first phase '{}' must start at 0, starts at {}",
                first.phase, first.start_ms
            )));
        }
        for window in &self.phases {
            if window.end_ms <= window.start_ms {
                return Err(ConfigError::Invalid(format!(
                    "phase '{}' has an empty window [{}, {})",
                    window.phase, window.start_ms, window.end_ms
                )));
            }
            if !(0.0..=1.0).contains(&window.reward_probability) {
                return Err(ConfigError::Invalid(format!(
                    "phase '{}' reward probability {} is outside [0, 1]",
                    window.phase, window.reward_probability
                )));
            }
        }
        for pair in self.phases.windows(2) {
            if pair[1].start_ms != pair[0].end_ms {
                return Err(ConfigError::Invalid(format!(
                    "phases '{}' and '{}' leave a gap or overlap",
                    pair[0].phase, pair[1].phase
                )));
            }
            if pair[1].phase <= pair[0].phase {
                return Err(ConfigError::Invalid(format!(
                    "phase '{}' cannot follow '{}'",
                    pair[1].phase, pair[0].phase
                )));
            }
        }
        if self.phases.last().map(|w| w.phase) != Some(Phase::Close) {
            return Err(ConfigError::Invalid(
                "the last phase must be 'close'".to_string(),
            ));
        }
        if !(0.0..=0.5).contains(&self.blend_fraction) {
            return Err(ConfigError::Invalid(format!(
                "blend fraction {} is outside [0, 0.5]",
                self.blend_fraction
            )));
        }
        Ok(())
    }
}

/// Pure function of elapsed session time over a validated schedule.
#[derive(Debug, Clone)]
pub struct PhaseScheduler {
    schedule: SessionSchedule,
}

impl PhaseScheduler {
    pub fn new(schedule: SessionSchedule) -> Result<Self, ConfigError> {
        schedule.validate()?;
        Ok(Self { schedule })
    }

    pub fn windows(&self) -> &[PhaseWindow] {
        &self.schedule.phases
    }

    pub fn session_end_ms(&self) -> u64 {
        self.schedule.session_end_ms()
    }

    /// The phase owning `elapsed_ms`. Past the last boundary this stays
    /// `Close`: sessions may run long.
    pub fn current_phase(&self, elapsed_ms: f64) -> Result<Phase, TimeError> {
        let elapsed_ms = check_time(elapsed_ms)?;
        Ok(self.schedule.phases[self.index_at(elapsed_ms)].phase)
    }

    /// True once the schedule has nothing left to do.
    pub fn is_finished(&self, elapsed_ms: f64) -> Result<bool, TimeError> {
        Ok(check_time(elapsed_ms)? >= self.session_end_ms() as f64)
    }

    /// Base reward probability of the owning phase, blended linearly with
    /// the neighbouring phase over the final and initial `blend_fraction`
    /// of each phase so it never jumps at a boundary.
    pub fn ambient_reward_probability(&self, elapsed_ms: f64) -> Result<f64, TimeError> {
        let t = check_time(elapsed_ms)?;
        let windows = &self.schedule.phases;
        let idx = self.index_at(t);
        let window = &windows[idx];
        let base = window.reward_probability;

        if !self.schedule.interpolate || t >= self.session_end_ms() as f64 {
            return Ok(base);
        }

        let zone = window.duration_ms() as f64 * self.schedule.blend_fraction;
        if zone <= 0.0 {
            return Ok(base);
        }

        if idx > 0 {
            let head_end = window.start_ms as f64 + zone;
            if t < head_end {
                let previous = windows[idx - 1].reward_probability;
                let midpoint = (previous + base) / 2.0;
                let progress = (t - window.start_ms as f64) / zone;
                return Ok(lerp(midpoint, base, progress));
            }
        }

        if let Some(next) = windows.get(idx + 1) {
            let tail_start = window.end_ms as f64 - zone;
            if t >= tail_start {
                let midpoint = (base + next.reward_probability) / 2.0;
                let progress = (t - tail_start) / zone;
                return Ok(lerp(base, midpoint, progress));
            }
        }

        Ok(base)
    }

    fn index_at(&self, elapsed_ms: f64) -> usize {
        let windows = &self.schedule.phases;
        windows
            .iter()
            .position(|w| elapsed_ms < w.end_ms as f64)
            .unwrap_or(windows.len() - 1)
    }
}

fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t.clamp(0.0, 1.0)
}
