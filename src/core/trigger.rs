//! Decides whether an outcome warrants a delivery arc: a probabilistic
//! jackpot OR'd with guaranteed narrative triggers. Near-miss, combo,
//! fractionation and significant-moment mechanics are all expressed here
//! as reasons to warrant an arc, never as separate timers. Some reasons
//! carry a tier ceiling; an arc is capped only when every reason it has
//! is capped.

use std::collections::VecDeque;

use rand::Rng;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::core::config::ConfigError;
use crate::schema::outcome::{flags, CharacterId, OutcomeClass, OutcomeEvent};
use crate::schema::session::SessionContext;
use crate::schema::tier::RewardTier;

/// Variable-ratio jackpot tuning. Bonuses are added to the ambient phase
/// probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JackpotRules {
    /// Sessions up to and including this index get the early bonus.
    pub early_session_max_index: u32,
    pub early_session_bonus: f64,
    pub emotional_characters: FxHashSet<CharacterId>,
    pub emotional_bonus: f64,
    pub high_metric_threshold: f64,
    pub high_metric_bonus: f64,
    pub combo_step: f64,
    pub combo_bonus_cap: f64,
    pub probability_cap: f64,
}

impl Default for JackpotRules {
    fn default() -> Self {
        Self {
            early_session_max_index: 3,
            early_session_bonus: 0.15,
            emotional_characters: ["dad", "maya", "memory_mom"]
                .into_iter()
                .map(CharacterId::from)
                .collect(),
            emotional_bonus: 0.10,
            high_metric_threshold: 70.0,
            high_metric_bonus: 0.15,
            combo_step: 0.10,
            combo_bonus_cap: 0.5,
            probability_cap: 0.6,
        }
    }
}

/// A streak length that earns its own arc the moment it is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboLevel {
    pub count: u32,
    pub label: String,
    pub ceiling: RewardTier,
}

impl ComboLevel {
    pub fn new(count: u32, label: &str, ceiling: RewardTier) -> Self {
        Self {
            count,
            label: label.to_string(),
            ceiling,
        }
    }
}

/// Anger, joy, anger, relief cycling detected over recent outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FractionationRules {
    /// How many recent beats the pattern may span.
    pub window: usize,
    pub ceiling: RewardTier,
}

impl Default for FractionationRules {
    fn default() -> Self {
        Self {
            window: 5,
            ceiling: RewardTier::Satisfying,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerRules {
    pub jackpot: JackpotRules,
    /// Metric deltas strictly above this always warrant an arc.
    pub metric_delta_threshold: f64,
    /// Deltas at most this far below the threshold count as a near miss
    /// when nothing else fired. Zero disables the window.
    pub near_miss_window: f64,
    pub significant_flags: Vec<String>,
    pub combo_milestone: u32,
    /// Ascending by count.
    pub combo_levels: Vec<ComboLevel>,
    pub fractionation: FractionationRules,
    /// Ceiling for arcs warranted only by a near miss.
    pub near_miss_ceiling: RewardTier,
}

impl Default for TriggerRules {
    fn default() -> Self {
        Self {
            jackpot: JackpotRules::default(),
            metric_delta_threshold: 15.0,
            near_miss_window: 10.0,
            significant_flags: vec![
                flags::SIGNIFICANT.to_string(),
                flags::BREAKTHROUGH.to_string(),
                flags::RARE.to_string(),
            ],
            combo_milestone: 7,
            combo_levels: vec![
                ComboLevel::new(2, "Nice", RewardTier::Minimal),
                ComboLevel::new(3, "Flow", RewardTier::Mild),
                ComboLevel::new(5, "In Sync", RewardTier::Satisfying),
                ComboLevel::new(7, "Deep Connection", RewardTier::Deep),
                ComboLevel::new(10, "Breakthrough", RewardTier::Profound),
            ],
            fractionation: FractionationRules::default(),
            near_miss_ceiling: RewardTier::Mild,
        }
    }
}

impl TriggerRules {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let j = &self.jackpot;
        let unit = |v: f64| (0.0..=1.0).contains(&v);
        if !unit(j.probability_cap) {
            return Err(ConfigError::Invalid(format!(
                "jackpot probability cap {} is outside [0, 1]",
                j.probability_cap
            )));
        }
        for (name, bonus) in [
            ("early session", j.early_session_bonus),
            ("emotional character", j.emotional_bonus),
            ("high metric", j.high_metric_bonus),
            ("combo step", j.combo_step),
            ("combo cap", j.combo_bonus_cap),
        ] {
            if !unit(bonus) {
                return Err(ConfigError::Invalid(format!(
                    "{name} bonus {bonus} is outside [0, 1]"
                )));
            }
        }
        if !self.metric_delta_threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "metric delta threshold must be finite".into(),
            ));
        }
        if !(self.near_miss_window.is_finite() && self.near_miss_window >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "near-miss window {} must be finite and non-negative",
                self.near_miss_window
            )));
        }
        if self.combo_milestone == 0 {
            return Err(ConfigError::Invalid("combo milestone must be positive".into()));
        }
        if self.combo_levels.first().is_some_and(|l| l.count == 0) {
            return Err(ConfigError::Invalid("combo levels must start above 0".into()));
        }
        for pair in self.combo_levels.windows(2) {
            if pair[1].count <= pair[0].count {
                return Err(ConfigError::Invalid(format!(
                    "combo level '{}' must come after a shorter streak than '{}'",
                    pair[1].label, pair[0].label
                )));
            }
        }
        if self.fractionation.window < FRACTIONATION_PATTERN.len() {
            return Err(ConfigError::Invalid(format!(
                "fractionation window {} cannot hold a {}-beat pattern",
                self.fractionation.window,
                FRACTIONATION_PATTERN.len()
            )));
        }
        let ceilings = [
            ("near-miss", self.near_miss_ceiling),
            ("fractionation", self.fractionation.ceiling),
        ]
        .into_iter()
        .chain(self.combo_levels.iter().map(|l| (l.label.as_str(), l.ceiling)));
        for (name, ceiling) in ceilings {
            if ceiling.is_hollow() {
                return Err(ConfigError::Invalid(format!(
                    "{name} ceiling must be a genuine tier"
                )));
            }
        }
        Ok(())
    }

    /// The level reached at exactly `combo`, if any.
    pub fn combo_level(&self, combo: u32) -> Option<&ComboLevel> {
        self.combo_levels.iter().find(|l| l.count == combo)
    }
}

/// Why an arc was warranted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Jackpot,
    MetricThreshold,
    Significant,
    ComboMilestone,
    ComboLevel,
    Fractionation,
    NearMiss,
}

impl TriggerReason {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Jackpot => "jackpot",
            Self::MetricThreshold => "metric_threshold",
            Self::Significant => "significant",
            Self::ComboMilestone => "combo_milestone",
            Self::ComboLevel => "combo_level",
            Self::Fractionation => "fractionation",
            Self::NearMiss => "near_miss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDecision {
    pub warranted: bool,
    pub reasons: Vec<TriggerReason>,
    /// Jackpot probability after bonuses and cap.
    pub probability: f64,
    /// The jackpot draw, when one was made.
    pub roll: Option<f64>,
    /// Highest tier the resulting arc may reach.
    pub tier_ceiling: Option<RewardTier>,
    /// Label of the combo level reached by this outcome.
    #[serde(default)]
    pub combo_label: Option<String>,
}

/// Consecutive positive outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComboTracker {
    count: u32,
}

impl ComboTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best/good extend the streak, neutral leaves it, poor/hollow break it.
    pub fn record(&mut self, class: OutcomeClass) -> u32 {
        self.count = match class {
            OutcomeClass::Best | OutcomeClass::Good => self.count.saturating_add(1),
            OutcomeClass::Neutral => self.count,
            OutcomeClass::Poor | OutcomeClass::Hollow => 0,
        };
        self.count
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

/// Emotional register of an outcome, read from its context flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalBeat {
    Anger,
    Joy,
    Relief,
    Neutral,
}

impl EmotionalBeat {
    pub fn of(outcome: &OutcomeEvent) -> Self {
        if outcome.has_flag(flags::ANGER) {
            Self::Anger
        } else if outcome.has_flag(flags::JOY) {
            Self::Joy
        } else if outcome.has_flag(flags::RELIEF) {
            Self::Relief
        } else {
            Self::Neutral
        }
    }
}

const FRACTIONATION_PATTERN: [EmotionalBeat; 4] = [
    EmotionalBeat::Anger,
    EmotionalBeat::Joy,
    EmotionalBeat::Anger,
    EmotionalBeat::Relief,
];

/// Sliding window over recent beats that spots an A-J-A-R cycle closing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FractionationTracker {
    recent: VecDeque<EmotionalBeat>,
    window: usize,
}

impl FractionationTracker {
    pub fn new(window: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Records `beat`; true when it is the relief that completes the
    /// pattern inside the window. The window is cleared on detection.
    pub fn record(&mut self, beat: EmotionalBeat) -> bool {
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(beat);
        if beat != EmotionalBeat::Relief {
            return false;
        }
        let mut wanted = FRACTIONATION_PATTERN.iter().peekable();
        for b in &self.recent {
            if wanted.peek() == Some(&b) {
                wanted.next();
            }
        }
        let detected = wanted.peek().is_none();
        if detected {
            self.recent.clear();
        }
        detected
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

#[derive(Debug, Clone)]
pub struct TriggerPolicy {
    rules: TriggerRules,
}

impl TriggerPolicy {
    pub fn new(rules: TriggerRules) -> Result<Self, ConfigError> {
        rules.validate()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &TriggerRules {
        &self.rules
    }

    pub fn jackpot_probability(
        &self,
        ambient: f64,
        character: &CharacterId,
        session: &SessionContext,
        combo: u32,
    ) -> f64 {
        let j = &self.rules.jackpot;
        let mut p = ambient;
        if session.session_index <= j.early_session_max_index {
            p += j.early_session_bonus;
        }
        if j.emotional_characters.contains(character) {
            p += j.emotional_bonus;
        }
        if session.average_recent_metric > j.high_metric_threshold {
            p += j.high_metric_bonus;
        }
        p += (j.combo_step * combo as f64).min(j.combo_bonus_cap);
        p.clamp(0.0, j.probability_cap)
    }

    /// Draws the jackpot roll from `rng` for positive outcomes only, then
    /// defers to [`decide`](Self::decide).
    pub fn evaluate<R: Rng>(
        &self,
        outcome: &OutcomeEvent,
        ambient: f64,
        session: &SessionContext,
        combo: u32,
        fractionation: bool,
        rng: &mut R,
    ) -> TriggerDecision {
        let roll = outcome.class.is_positive().then(|| rng.gen::<f64>());
        self.decide(outcome, ambient, session, combo, fractionation, roll)
    }

    /// Deterministic core: `roll` is the jackpot draw in `[0, 1)`, or
    /// `None` when no draw applies. `fractionation` is true when this
    /// outcome closed an A-J-A-R cycle.
    pub fn decide(
        &self,
        outcome: &OutcomeEvent,
        ambient: f64,
        session: &SessionContext,
        combo: u32,
        fractionation: bool,
        roll: Option<f64>,
    ) -> TriggerDecision {
        let probability =
            self.jackpot_probability(ambient, &outcome.character_id, session, combo);
        let mut reasons = Vec::new();

        if outcome.class.is_positive() && roll.is_some_and(|r| r < probability) {
            reasons.push(TriggerReason::Jackpot);
        }
        if outcome.metric_delta > self.rules.metric_delta_threshold {
            reasons.push(TriggerReason::MetricThreshold);
        }
        if self.rules.significant_flags.iter().any(|f| outcome.has_flag(f)) {
            reasons.push(TriggerReason::Significant);
        }
        if combo >= self.rules.combo_milestone {
            reasons.push(TriggerReason::ComboMilestone);
        }
        let level = outcome
            .class
            .is_positive()
            .then(|| self.rules.combo_level(combo))
            .flatten();
        if level.is_some() {
            reasons.push(TriggerReason::ComboLevel);
        }
        if fractionation || outcome.has_flag(flags::FRACTIONATION) {
            reasons.push(TriggerReason::Fractionation);
        }
        if outcome.has_flag(flags::NEAR_MISS) || (reasons.is_empty() && self.near_miss(outcome)) {
            reasons.push(TriggerReason::NearMiss);
        }

        let tier_ceiling = reasons
            .iter()
            .map(|reason| match reason {
                TriggerReason::NearMiss => Some(self.rules.near_miss_ceiling),
                TriggerReason::Fractionation => Some(self.rules.fractionation.ceiling),
                TriggerReason::ComboLevel => level.map(|l| l.ceiling),
                _ => None,
            })
            .try_fold(None, |acc: Option<RewardTier>, ceiling| {
                ceiling.map(|c| Some(acc.map_or(c, |a| a.max(c))))
            })
            .flatten();

        TriggerDecision {
            warranted: !reasons.is_empty(),
            reasons,
            probability,
            roll,
            tier_ceiling,
            combo_label: level.map(|l| l.label.clone()),
        }
    }

    /// Delta fell short of the threshold by no more than the window.
    fn near_miss(&self, outcome: &OutcomeEvent) -> bool {
        let threshold = self.rules.metric_delta_threshold;
        let window = self.rules.near_miss_window;
        window > 0.0
            && outcome.metric_delta >= threshold - window
            && outcome.metric_delta <= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn policy() -> TriggerPolicy {
        TriggerPolicy::new(TriggerRules::default()).unwrap()
    }

    fn late_session() -> SessionContext {
        SessionContext::new(10, false, 50.0)
    }

    #[test]
    fn combo_tracker_counts_positive_streaks() {
        let mut combo = ComboTracker::new();
        assert_eq!(combo.record(OutcomeClass::Best), 1);
        assert_eq!(combo.record(OutcomeClass::Good), 2);
        assert_eq!(combo.record(OutcomeClass::Neutral), 2);
        assert_eq!(combo.record(OutcomeClass::Hollow), 0);
        assert_eq!(combo.record(OutcomeClass::Good), 1);
        assert_eq!(combo.record(OutcomeClass::Poor), 0);
    }

    #[test]
    fn jackpot_probability_sums_bonuses_and_caps() {
        let p = policy();
        let early = SessionContext::new(1, false, 50.0);
        let maya = CharacterId::from("maya");
        let james = CharacterId::from("james");
        // 0.25 + 0.15 early + 0.10 emotional
        assert!((p.jackpot_probability(0.25, &maya, &early, 0) - 0.50).abs() < 1e-9);
        assert!((p.jackpot_probability(0.25, &james, &late_session(), 0) - 0.25).abs() < 1e-9);
        // Combo bonus alone is capped at 0.5, the total at 0.6.
        assert!((p.jackpot_probability(0.0, &james, &late_session(), 9) - 0.5).abs() < 1e-9);
        assert!((p.jackpot_probability(0.35, &maya, &early, 9) - 0.6).abs() < 1e-9);
        let keen = SessionContext::new(10, false, 80.0);
        assert!((p.jackpot_probability(0.1, &james, &keen, 0) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn jackpot_only_for_positive_outcomes() {
        let p = policy();
        let good = OutcomeEvent::new(OutcomeClass::Good, 0.0, "james");
        let decision = p.decide(&good, 0.3, &late_session(), 0, false, Some(0.1));
        assert!(decision.warranted);
        assert_eq!(decision.reasons, vec![TriggerReason::Jackpot]);

        let miss = p.decide(&good, 0.3, &late_session(), 0, false, Some(0.9));
        assert!(!miss.warranted);

        let neutral = OutcomeEvent::new(OutcomeClass::Neutral, 0.0, "james");
        let mut rng = StdRng::seed_from_u64(1);
        let decision = p.evaluate(&neutral, 0.3, &late_session(), 0, false, &mut rng);
        assert_eq!(decision.roll, None);
        assert!(!decision.warranted);
    }

    #[test]
    fn guaranteed_triggers() {
        let p = policy();
        let s = late_session();

        let big = OutcomeEvent::new(OutcomeClass::Neutral, 16.0, "alex");
        assert_eq!(p.decide(&big, 0.0, &s, 0, false, None).reasons, vec![TriggerReason::MetricThreshold]);

        let rare = OutcomeEvent::new(OutcomeClass::Poor, 0.0, "alex").with_flag("breakthrough");
        assert_eq!(p.decide(&rare, 0.0, &s, 0, false, None).reasons, vec![TriggerReason::Significant]);

        let streak = OutcomeEvent::new(OutcomeClass::Good, 0.0, "alex");
        let d = p.decide(&streak, 0.0, &s, 7, false, Some(0.99));
        assert_eq!(
            d.reasons,
            vec![TriggerReason::ComboMilestone, TriggerReason::ComboLevel]
        );
        assert_eq!(d.tier_ceiling, None);
        assert_eq!(d.combo_label.as_deref(), Some("Deep Connection"));

        let streak = p.decide(&streak, 0.0, &s, 8, false, Some(0.99));
        assert_eq!(streak.reasons, vec![TriggerReason::ComboMilestone]);
        assert_eq!(streak.combo_label, None);
    }

    #[test]
    fn combo_levels_cap_by_streak_length() {
        let p = policy();
        let s = late_session();
        let good = OutcomeEvent::new(OutcomeClass::Good, 0.0, "alex");
        let ceilings: Vec<Option<RewardTier>> = (1..=6)
            .map(|combo| p.decide(&good, 0.0, &s, combo, false, Some(0.99)).tier_ceiling)
            .collect();
        assert_eq!(
            ceilings,
            vec![
                None,
                Some(RewardTier::Minimal),
                Some(RewardTier::Mild),
                None,
                Some(RewardTier::Satisfying),
                None,
            ]
        );
        let flow = p.decide(&good, 0.0, &s, 3, false, Some(0.99));
        assert_eq!(flow.reasons, vec![TriggerReason::ComboLevel]);
        assert_eq!(flow.combo_label.as_deref(), Some("Flow"));
        assert!(!p.decide(&good, 0.0, &s, 4, false, Some(0.99)).warranted);

        // Neutral keeps the streak but never re-announces the level.
        let neutral = OutcomeEvent::new(OutcomeClass::Neutral, 0.0, "alex");
        assert!(!p.decide(&neutral, 0.0, &s, 3, false, None).warranted);

        // An uncapped reason lifts the ceiling.
        let jackpot = p.decide(&good, 0.0, &s, 2, false, Some(0.0));
        assert!(jackpot.probability > 0.0);
        assert_eq!(jackpot.reasons, vec![TriggerReason::Jackpot, TriggerReason::ComboLevel]);
        assert_eq!(jackpot.tier_ceiling, None);
    }

    #[test]
    fn near_miss_window_below_threshold() {
        let p = policy();
        let s = late_session();
        let at = |delta: f64| {
            let outcome = OutcomeEvent::new(OutcomeClass::Neutral, delta, "alex");
            p.decide(&outcome, 0.0, &s, 0, false, None)
        };
        assert_eq!(at(5.0).reasons, vec![TriggerReason::NearMiss]);
        assert_eq!(at(5.0).tier_ceiling, Some(RewardTier::Mild));
        assert!(!at(4.99).warranted);
        assert_eq!(at(15.0).reasons, vec![TriggerReason::NearMiss]);
        assert_eq!(at(15.01).reasons, vec![TriggerReason::MetricThreshold]);

        // Only when nothing else fired.
        let flagged = OutcomeEvent::new(OutcomeClass::Neutral, 10.0, "alex").with_flag("rare");
        let d = p.decide(&flagged, 0.0, &s, 0, false, None);
        assert_eq!(d.reasons, vec![TriggerReason::Significant]);

        let rules = TriggerRules {
            near_miss_window: 0.0,
            ..TriggerRules::default()
        };
        let closed = TriggerPolicy::new(rules).unwrap();
        let outcome = OutcomeEvent::new(OutcomeClass::Neutral, 12.0, "alex");
        assert!(!closed.decide(&outcome, 0.0, &s, 0, false, None).warranted);
        let flagged = outcome.with_flag("near_miss");
        assert!(closed.decide(&flagged, 0.0, &s, 0, false, None).warranted);
    }

    #[test]
    fn fractionation_cycle_is_detected() {
        use EmotionalBeat::*;
        let mut tracker = FractionationTracker::new(5);
        let seen: Vec<bool> = [Anger, Joy, Neutral, Anger, Relief]
            .into_iter()
            .map(|b| tracker.record(b))
            .collect();
        assert_eq!(seen, vec![false, false, false, false, true]);
        // Cleared after detection: a lone relief does not re-fire.
        assert!(!tracker.record(Relief));

        // Too spread out for a window of 5.
        let mut tracker = FractionationTracker::new(5);
        for b in [Anger, Joy, Neutral, Neutral, Anger, Relief] {
            assert!(!tracker.record(b));
        }
        // Out of order.
        let mut tracker = FractionationTracker::new(5);
        for b in [Joy, Anger, Anger, Relief] {
            assert!(!tracker.record(b));
        }
    }

    #[test]
    fn fractionation_warrants_capped_arc() {
        let p = policy();
        let s = late_session();
        let relief = OutcomeEvent::new(OutcomeClass::Neutral, 0.0, "dad").with_flag("relief");
        assert_eq!(EmotionalBeat::of(&relief), EmotionalBeat::Relief);
        let d = p.decide(&relief, 0.0, &s, 0, true, None);
        assert_eq!(d.reasons, vec![TriggerReason::Fractionation]);
        assert_eq!(d.tier_ceiling, Some(RewardTier::Satisfying));

        let flagged = OutcomeEvent::new(OutcomeClass::Neutral, 0.0, "dad").with_flag("fractionation");
        assert!(p.decide(&flagged, 0.0, &s, 0, false, None).warranted);

        // Two capped reasons: the looser ceiling wins.
        let near = relief.with_flag("near_miss");
        let d = p.decide(&near, 0.0, &s, 0, true, None);
        assert_eq!(d.tier_ceiling, Some(RewardTier::Satisfying));
    }

    #[test]
    fn near_miss_alone_is_capped_at_mild() {
        let p = policy();
        let s = late_session();
        let near = OutcomeEvent::new(OutcomeClass::Neutral, 0.0, "alex").with_flag("near_miss");
        let d = p.decide(&near, 0.0, &s, 0, false, None);
        assert!(d.warranted);
        assert_eq!(d.tier_ceiling, Some(RewardTier::Mild));

        let both = near.clone().with_flag("significant");
        let d = p.decide(&both, 0.0, &s, 0, false, None);
        assert_eq!(d.reasons, vec![TriggerReason::Significant, TriggerReason::NearMiss]);
        assert_eq!(d.tier_ceiling, None);
    }

    #[test]
    fn seeded_rolls_are_reproducible() {
        let p = policy();
        let best = OutcomeEvent::new(OutcomeClass::Best, 0.0, "maya");
        let s = SessionContext::default();
        let a = p.evaluate(&best, 0.2, &s, 1, false, &mut StdRng::seed_from_u64(42));
        let b = p.evaluate(&best, 0.2, &s, 1, false, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
        assert!(a.roll.is_some());
    }

    #[test]
    fn invalid_rules_are_rejected() {
        let mut rules = TriggerRules::default();
        rules.jackpot.probability_cap = 1.5;
        assert!(TriggerPolicy::new(rules).is_err());
        let rules = TriggerRules {
            combo_milestone: 0,
            ..TriggerRules::default()
        };
        assert!(TriggerPolicy::new(rules).is_err());
        let mut rules = TriggerRules::default();
        rules.combo_levels.swap(0, 1);
        assert!(TriggerPolicy::new(rules).is_err());

        let mut rules = TriggerRules::default();
        rules.fractionation.window = 3;
        assert!(TriggerPolicy::new(rules).is_err());

        let mut rules = TriggerRules::default();
        rules.combo_levels[0].ceiling = RewardTier::Hollow;
        assert!(TriggerPolicy::new(rules).is_err());

        let rules = TriggerRules {
            near_miss_window: f64::NAN,
            ..TriggerRules::default()
        };
        assert!(TriggerPolicy::new(rules).is_err());
    }
}
