//! Delivery arc scheduling.
//!
//! A genuine arc runs `Hook -> Build -> Peak -> Release -> Afterglow`. The
//! first four segments form the delivery window and are tuned so the
//! release onset, the moment of peak intensity, lands late in it (about
//! 93% through). Afterglow length depends on the reward tier. A hollow arc
//! is a single short `HollowFlash` segment held at the intensity floor.
//!
//! Contextual speed scaling stretches or compresses the whole arc.
//! Boundaries scale with it, so relative segment weight holds.

use std::ops::Range;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::config::ConfigError;
use crate::core::magnitude::RewardMagnitude;
use crate::schema::instruction::{ArcId, ArcState, HapticPattern};
use crate::schema::outcome::{flags, OutcomeEvent};
use crate::schema::session::SessionContext;
use crate::schema::tier::RewardTier;

/// Target presentation levels while an arc sits in one state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    pub glow: f64,
    /// Pulses per second.
    pub pulse_rate: f64,
    pub particle_density: f64,
    /// Visual blur radius in px. Not an intensity: never scaled.
    #[serde(default)]
    pub blur: f64,
    pub volume: f64,
    pub pitch: f64,
    pub layers: u32,
    pub haptic_intensity: f64,
    pub haptic_pattern: HapticPattern,
    pub haptic_interval_ms: u64,
}

impl ParameterSnapshot {
    /// Scales the intensity scalars by `gain` and clamps them to
    /// `[floor, 1]`. Rates, pitch and layering are left alone.
    pub fn scaled(&self, gain: f64, floor: f64) -> Self {
        let scale = |v: f64| (v * gain).clamp(floor, 1.0);
        Self {
            glow: scale(self.glow),
            particle_density: scale(self.particle_density),
            volume: scale(self.volume),
            haptic_intensity: scale(self.haptic_intensity),
            ..*self
        }
    }

    /// Every intensity at `floor`: the look of a hollow flash.
    pub fn at_floor(floor: f64) -> Self {
        Self {
            glow: floor,
            pulse_rate: 0.0,
            particle_density: floor,
            blur: 0.0,
            volume: floor,
            pitch: 1.0,
            layers: 1,
            haptic_intensity: floor,
            haptic_pattern: HapticPattern::SinglePulse,
            haptic_interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentProfile {
    pub state: ArcState,
    pub base_ms: u64,
    pub levels: ParameterSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AfterglowProfile {
    pub levels: ParameterSnapshot,
    pub duration_ms: FxHashMap<RewardTier, u64>,
}

/// Context factors applied to arc length. Factors multiply; the product
/// is clamped to `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedRules {
    pub repair: f64,
    pub high_tension: f64,
    pub returning_player: f64,
    pub fast_player: f64,
    pub slow_player: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for SpeedRules {
    fn default() -> Self {
        Self {
            repair: 1.2,
            high_tension: 0.9,
            returning_player: 0.9,
            fast_player: 0.85,
            slow_player: 1.15,
            min: 0.7,
            max: 1.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcProfile {
    /// Hook, build, peak and release, in order.
    pub delivery: Vec<SegmentProfile>,
    pub afterglow: AfterglowProfile,
    pub hollow_flash_ms: u64,
    pub intensity_floor: f64,
    pub tier_gain: FxHashMap<RewardTier, f64>,
    pub speed: SpeedRules,
    /// Accepted range for the release onset as a share of the delivery
    /// window.
    pub peak_window: (f64, f64),
}

impl Default for ArcProfile {
    fn default() -> Self {
        #[allow(clippy::too_many_arguments)]
        fn snapshot(
            glow: f64,
            pulse_rate: f64,
            particles: f64,
            blur: f64,
            volume: f64,
            pitch: f64,
            layers: u32,
            haptic: f64,
            pattern: HapticPattern,
            interval: u64,
        ) -> ParameterSnapshot {
            ParameterSnapshot {
                glow,
                pulse_rate,
                particle_density: particles / 50.0,
                blur,
                volume,
                pitch,
                layers,
                haptic_intensity: haptic,
                haptic_pattern: pattern,
                haptic_interval_ms: interval,
            }
        }
        use HapticPattern::*;
        let delivery = vec![
            SegmentProfile {
                state: ArcState::Hook,
                base_ms: 2000,
                levels: snapshot(0.2, 0.5, 5.0, 0.0, 0.3, 1.0, 1, 0.2, Pulse, 1000),
            },
            SegmentProfile {
                state: ArcState::Build,
                base_ms: 3000,
                levels: snapshot(0.5, 1.0, 15.0, 2.0, 0.5, 1.05, 2, 0.4, Heartbeat, 600),
            },
            SegmentProfile {
                state: ArcState::Peak,
                base_ms: 1500,
                levels: snapshot(0.8, 2.0, 30.0, 4.0, 0.7, 1.1, 3, 0.7, Crescendo, 300),
            },
            SegmentProfile {
                state: ArcState::Release,
                base_ms: 500,
                levels: snapshot(1.0, 0.0, 50.0, 0.0, 0.9, 1.0, 4, 1.0, Burst, 0),
            },
        ];
        let afterglow = AfterglowProfile {
            levels: snapshot(0.4, 0.3, 10.0, 1.0, 0.4, 0.98, 1, 0.15, Pulse, 2000),
            duration_ms: [
                (RewardTier::Minimal, 800),
                (RewardTier::Mild, 1200),
                (RewardTier::Satisfying, 1800),
                (RewardTier::Deep, 2500),
                (RewardTier::Profound, 3500),
            ]
            .into_iter()
            .collect(),
        };
        let tier_gain = [
            (RewardTier::Minimal, 0.4),
            (RewardTier::Mild, 0.55),
            (RewardTier::Satisfying, 0.7),
            (RewardTier::Deep, 0.85),
            (RewardTier::Profound, 1.0),
        ]
        .into_iter()
        .collect();

        Self {
            delivery,
            afterglow,
            hollow_flash_ms: 300,
            intensity_floor: 0.1,
            tier_gain,
            speed: SpeedRules::default(),
            peak_window: (0.90, 0.95),
        }
    }
}

impl ArcProfile {
    pub fn delivery_window_ms(&self) -> u64 {
        self.delivery.iter().map(|s| s.base_ms).sum()
    }

    /// Release onset as a share of the delivery window.
    pub fn peak_fraction(&self) -> f64 {
        let onset: u64 = self
            .delivery
            .iter()
            .take_while(|s| s.state != ArcState::Release)
            .map(|s| s.base_ms)
            .sum();
        onset as f64 / self.delivery_window_ms() as f64
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let states: Vec<ArcState> = self.delivery.iter().map(|s| s.state).collect();
        if states != ArcState::CHAIN[..4] {
            return Err(ConfigError::Invalid(format!(
                "delivery segments must be hook, build, peak, release; got {states:?}"
            )));
        }
        if let Some(empty) = self.delivery.iter().find(|s| s.base_ms == 0) {
            return Err(ConfigError::Invalid(format!(
                "segment '{}' has zero length",
                empty.state
            )));
        }
        let (low, high) = self.peak_window;
        let fraction = self.peak_fraction();
        if !(low..=high).contains(&fraction) {
            return Err(ConfigError::Invalid(format!(
                "release onset at {:.1}% of the delivery window, outside {:.0}-{:.0}%",
                fraction * 100.0,
                low * 100.0,
                high * 100.0
            )));
        }
        for tier in RewardTier::GENUINE {
            match self.afterglow.duration_ms.get(&tier) {
                Some(ms) if *ms > 0 => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "tier '{tier}' has no afterglow duration"
                    )))
                }
            }
            match self.tier_gain.get(&tier) {
                Some(g) if *g > 0.0 && *g <= 1.0 => {}
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "tier '{tier}' needs a gain in (0, 1]"
                    )))
                }
            }
        }
        if self.hollow_flash_ms == 0 {
            return Err(ConfigError::Invalid("hollow flash must have a length".into()));
        }
        if !(0.0..1.0).contains(&self.intensity_floor) {
            return Err(ConfigError::Invalid(format!(
                "intensity floor {} is outside [0, 1)",
                self.intensity_floor
            )));
        }
        let s = &self.speed;
        if !(s.min > 0.0 && s.min <= 1.0 && s.max >= 1.0 && s.max.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "speed bounds [{}, {}] must bracket 1.0",
                s.min, s.max
            )));
        }
        let factors = [s.repair, s.high_tension, s.returning_player, s.fast_player, s.slow_player];
        if factors.iter().any(|f| !(f.is_finite() && *f > 0.0)) {
            return Err(ConfigError::Invalid(
                "speed factors must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// One scheduled segment, `[start_ms, end_ms)` relative to the arc start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcSegment {
    pub state: ArcState,
    pub start_ms: u64,
    pub end_ms: u64,
    pub snapshot: ParameterSnapshot,
}

impl ArcSegment {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// A fully scheduled arc. Segments are contiguous and cover
/// `[0, duration_ms)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryArc {
    pub id: ArcId,
    pub tier: RewardTier,
    pub magnitude: u32,
    pub started_at_ms: u64,
    pub duration_ms: u64,
    pub speed: f64,
    pub segments: Vec<ArcSegment>,
}

impl DeliveryArc {
    pub fn is_hollow(&self) -> bool {
        self.tier.is_hollow()
    }

    /// State at `arc_elapsed_ms`; `Idle` once the arc has run its course.
    pub fn state_at(&self, arc_elapsed_ms: u64) -> ArcState {
        self.segments
            .iter()
            .find(|s| arc_elapsed_ms < s.end_ms)
            .map(|s| s.state)
            .unwrap_or(ArcState::Idle)
    }

    pub fn segment(&self, state: ArcState) -> Option<&ArcSegment> {
        self.segments.iter().find(|s| s.state == state)
    }

    /// Release onset relative to the arc start.
    pub fn peak_moment_ms(&self) -> Option<u64> {
        self.segment(ArcState::Release).map(|s| s.start_ms)
    }

    pub fn delivery_window_ms(&self) -> Option<u64> {
        self.segment(ArcState::Release).map(|s| s.end_ms)
    }

    pub fn peak_fraction(&self) -> Option<f64> {
        let peak = self.peak_moment_ms()?;
        let window = self.delivery_window_ms()?;
        Some(peak as f64 / window as f64)
    }
}

#[derive(Debug, Clone)]
pub struct ArcScheduler {
    profile: ArcProfile,
}

impl ArcScheduler {
    pub fn new(profile: ArcProfile) -> Result<Self, ConfigError> {
        profile.validate()?;
        Ok(Self { profile })
    }

    pub fn profile(&self) -> &ArcProfile {
        &self.profile
    }

    /// Unscaled arc length for a tier.
    pub fn base_duration_ms(&self, tier: RewardTier) -> u64 {
        if tier.is_hollow() {
            return self.profile.hollow_flash_ms;
        }
        self.profile.delivery_window_ms() + self.afterglow_ms(tier)
    }

    /// Contextual speed factor for an outcome, clamped to the profile's
    /// bounds.
    pub fn speed_multiplier(&self, outcome: &OutcomeEvent, session: &SessionContext) -> f64 {
        let rules = &self.profile.speed;
        let mut speed = 1.0;
        if outcome.has_flag(flags::REPAIR) {
            speed *= rules.repair;
        }
        if outcome.has_flag(flags::HIGH_TENSION) {
            speed *= rules.high_tension;
        }
        if session.returning_player {
            speed *= rules.returning_player;
        }
        if outcome.has_flag(flags::FAST_PLAYER) {
            speed *= rules.fast_player;
        }
        if outcome.has_flag(flags::SLOW_PLAYER) {
            speed *= rules.slow_player;
        }
        speed.clamp(rules.min, rules.max)
    }

    /// Schedules an arc for `reward` starting at session time
    /// `started_at_ms`. `speed` is clamped again here; hollow arcs ignore it.
    pub fn build(
        &self,
        id: ArcId,
        reward: &RewardMagnitude,
        speed: f64,
        started_at_ms: u64,
    ) -> DeliveryArc {
        if reward.is_hollow() {
            let duration_ms = self.profile.hollow_flash_ms;
            return DeliveryArc {
                id,
                tier: RewardTier::Hollow,
                magnitude: reward.magnitude,
                started_at_ms,
                duration_ms,
                speed: 1.0,
                segments: vec![ArcSegment {
                    state: ArcState::HollowFlash,
                    start_ms: 0,
                    end_ms: duration_ms,
                    snapshot: ParameterSnapshot::at_floor(self.profile.intensity_floor),
                }],
            };
        }

        let rules = &self.profile.speed;
        let speed = if speed.is_finite() { speed.clamp(rules.min, rules.max) } else { 1.0 };
        let gain = self.intensity_gain(reward);
        let floor = self.profile.intensity_floor;

        let plan = self
            .profile
            .delivery
            .iter()
            .map(|s| (s.state, s.base_ms, s.levels))
            .chain(std::iter::once((
                ArcState::Afterglow,
                self.afterglow_ms(reward.tier),
                self.profile.afterglow.levels,
            )));

        let mut segments = Vec::with_capacity(ArcState::CHAIN.len());
        let mut cumulative = 0u64;
        let mut start_ms = 0u64;
        for (state, base_ms, levels) in plan {
            cumulative += base_ms;
            // Scale cumulative boundaries, not lengths, so rounding never
            // drifts the release onset.
            let end_ms = (cumulative as f64 * speed).round() as u64;
            segments.push(ArcSegment {
                state,
                start_ms,
                end_ms,
                snapshot: levels.scaled(gain, floor),
            });
            start_ms = end_ms;
        }

        DeliveryArc {
            id,
            tier: reward.tier,
            magnitude: reward.magnitude,
            started_at_ms,
            duration_ms: start_ms,
            speed,
            segments,
        }
    }

    fn afterglow_ms(&self, tier: RewardTier) -> u64 {
        self.profile
            .afterglow
            .duration_ms
            .get(&tier)
            .copied()
            .unwrap_or(0)
    }

    fn intensity_gain(&self, reward: &RewardMagnitude) -> f64 {
        let tier_gain = self.profile.tier_gain.get(&reward.tier).copied().unwrap_or(1.0);
        tier_gain * (0.5 + 0.5 * reward.fraction())
    }
}

/// Playback cursor over a scheduled arc. Tracks which segment transitions
/// have already been reported.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcRun {
    arc: DeliveryArc,
    emitted: usize,
}

impl ArcRun {
    pub fn new(arc: DeliveryArc) -> Self {
        Self { arc, emitted: 0 }
    }

    pub fn arc(&self) -> &DeliveryArc {
        &self.arc
    }

    pub fn id(&self) -> ArcId {
        self.arc.id
    }

    /// Indices of segments entered since the last call, in order. A large
    /// jump returns every skipped-over segment.
    pub fn advance(&mut self, arc_elapsed_ms: u64) -> Range<usize> {
        let from = self.emitted;
        let reached = self
            .arc
            .segments
            .iter()
            .take_while(|s| s.start_ms <= arc_elapsed_ms)
            .count();
        self.emitted = reached.max(from);
        from..self.emitted
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Done once time has run out and every segment has been reported.
    pub fn is_complete(&self, arc_elapsed_ms: u64) -> bool {
        arc_elapsed_ms >= self.arc.duration_ms && self.emitted == self.arc.segments.len()
    }

    pub fn current_state(&self, arc_elapsed_ms: u64) -> ArcState {
        self.arc.state_at(arc_elapsed_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::magnitude::{Modifiers, RewardCalculator, RewardTable};
    use crate::schema::outcome::OutcomeClass;

    fn scheduler() -> ArcScheduler {
        ArcScheduler::new(ArcProfile::default()).unwrap()
    }

    fn reward(class: OutcomeClass) -> RewardMagnitude {
        RewardCalculator::new(RewardTable::default())
            .unwrap()
            .compute_magnitude(class, &Modifiers::new())
    }

    #[test]
    fn base_durations_by_tier() {
        let s = scheduler();
        assert_eq!(s.base_duration_ms(RewardTier::Profound), 10_500);
        assert_eq!(s.base_duration_ms(RewardTier::Deep), 9_500);
        assert_eq!(s.base_duration_ms(RewardTier::Minimal), 7_800);
        assert_eq!(s.base_duration_ms(RewardTier::Hollow), 300);
    }

    #[test]
    fn genuine_arc_is_contiguous_chain() {
        let arc = scheduler().build(ArcId(1), &reward(OutcomeClass::Best), 1.0, 5_000);
        let states: Vec<ArcState> = arc.segments.iter().map(|s| s.state).collect();
        assert_eq!(states, ArcState::CHAIN.to_vec());
        assert_eq!(arc.segments[0].start_ms, 0);
        for pair in arc.segments.windows(2) {
            assert_eq!(pair[0].end_ms, pair[1].start_ms);
        }
        assert_eq!(arc.segments.last().unwrap().end_ms, arc.duration_ms);
        assert_eq!(arc.duration_ms, 9_500);
        assert_eq!(arc.peak_moment_ms(), Some(6_500));
        assert_eq!(arc.delivery_window_ms(), Some(7_000));
    }

    #[test]
    fn speed_scales_boundaries_and_keeps_peak_fraction() {
        let s = scheduler();
        let r = reward(OutcomeClass::Best);
        for speed in [0.7, 0.85, 1.0, 1.2, 1.4] {
            let arc = s.build(ArcId(1), &r, speed, 0);
            assert_eq!(arc.duration_ms, (9_500.0 * speed).round() as u64);
            let fraction = arc.peak_fraction().unwrap();
            assert!((0.90..=0.95).contains(&fraction), "{speed}: {fraction}");
        }
        let clamped = s.build(ArcId(2), &r, 3.0, 0);
        assert!((clamped.speed - 1.4).abs() < 1e-9);
    }

    #[test]
    fn hollow_arc_is_single_floor_flash() {
        let s = scheduler();
        let arc = s.build(ArcId(3), &reward(OutcomeClass::Hollow), 1.4, 0);
        assert!(arc.is_hollow());
        assert_eq!(arc.duration_ms, 300);
        assert_eq!(arc.segments.len(), 1);
        let seg = arc.segments[0];
        assert_eq!(seg.state, ArcState::HollowFlash);
        assert_eq!(seg.snapshot.glow, 0.1);
        assert_eq!(seg.snapshot.haptic_intensity, 0.1);
        assert_eq!(seg.snapshot.haptic_pattern, HapticPattern::SinglePulse);
        assert_eq!(seg.snapshot.blur, 0.0);
        assert_eq!(arc.peak_moment_ms(), None);
    }

    #[test]
    fn blur_follows_segments_unscaled() {
        let weak = scheduler().build(ArcId(1), &reward(OutcomeClass::Poor), 1.0, 0);
        let blur: Vec<f64> = weak.segments.iter().map(|s| s.snapshot.blur).collect();
        assert_eq!(blur, vec![0.0, 2.0, 4.0, 0.0, 1.0]);
    }

    #[test]
    fn intensities_scale_with_tier_and_magnitude() {
        let s = scheduler();
        let strong = s.build(ArcId(1), &reward(OutcomeClass::Best), 1.0, 0);
        let weak = s.build(ArcId(2), &reward(OutcomeClass::Neutral), 1.0, 0);
        let release = |a: &DeliveryArc| a.segment(ArcState::Release).unwrap().snapshot;
        assert!(release(&strong).glow > release(&weak).glow);
        // Deep at 100/200: 0.85 * 0.75.
        assert!((release(&strong).glow - 0.6375).abs() < 1e-9);
        // Pitch is not an intensity.
        assert_eq!(release(&strong).pitch, 1.0);
        for seg in &weak.segments {
            assert!(seg.snapshot.glow >= 0.1 && seg.snapshot.glow <= 1.0);
        }
    }

    #[test]
    fn speed_multiplier_from_context() {
        let s = scheduler();
        let plain = OutcomeEvent::new(OutcomeClass::Good, 0.0, "maya");
        let first = SessionContext::default();
        assert_eq!(s.speed_multiplier(&plain, &first), 1.0);

        let repair = plain.clone().with_flag("repair");
        assert!((s.speed_multiplier(&repair, &first) - 1.2).abs() < 1e-9);

        let returning = SessionContext::new(4, true, 50.0);
        let rushed = plain.clone().with_flag("high_tension").with_flag("fast_player");
        // 0.9 * 0.85 * 0.9 = 0.6885, clamped up.
        assert!((s.speed_multiplier(&rushed, &returning) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn state_at_walks_the_chain() {
        let arc = scheduler().build(ArcId(1), &reward(OutcomeClass::Best), 1.0, 0);
        assert_eq!(arc.state_at(0), ArcState::Hook);
        assert_eq!(arc.state_at(1_999), ArcState::Hook);
        assert_eq!(arc.state_at(2_000), ArcState::Build);
        assert_eq!(arc.state_at(6_500), ArcState::Release);
        assert_eq!(arc.state_at(7_000), ArcState::Afterglow);
        assert_eq!(arc.state_at(9_500), ArcState::Idle);
    }

    #[test]
    fn run_reports_each_segment_once() {
        let arc = scheduler().build(ArcId(1), &reward(OutcomeClass::Best), 1.0, 0);
        let mut run = ArcRun::new(arc);
        assert_eq!(run.advance(0), 0..1);
        assert_eq!(run.advance(100), 1..1);
        assert_eq!(run.advance(6_600), 1..4);
        assert!(!run.is_complete(6_600));
        assert_eq!(run.advance(20_000), 4..5);
        assert!(run.is_complete(20_000));
        assert_eq!(run.advance(30_000), 5..5);
    }

    #[test]
    fn profile_validation() {
        assert!((ArcProfile::default().peak_fraction() - 6.5 / 7.0).abs() < 1e-9);

        let mut early_peak = ArcProfile::default();
        early_peak.delivery[3].base_ms = 2_000;
        assert!(ArcScheduler::new(early_peak).is_err());

        let mut reordered = ArcProfile::default();
        reordered.delivery.swap(0, 1);
        assert!(ArcScheduler::new(reordered).is_err());

        let mut no_afterglow = ArcProfile::default();
        no_afterglow.afterglow.duration_ms.remove(&RewardTier::Deep);
        assert!(ArcScheduler::new(no_afterglow).is_err());
    }
}
