//! The session orchestrator: consumes outcome and choice events, drives the
//! phase and arc schedulers, and queues presentation instructions for the
//! renderer. Built via `SessionOrchestrator::builder()`.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::arc::{ArcRun, ArcScheduler, DeliveryArc};
use crate::core::clock::{Clock, SessionClock, TimeError};
use crate::core::config::{ConfigError, EngineConfig};
use crate::core::magnitude::{Modifiers, RewardCalculator, RewardError, RewardMagnitude};
use crate::core::phase::{PhaseScheduler, SessionSchedule, SessionTemplate};
use crate::core::risk::{ChoiceRiskProfile, RiskError, RiskScorer};
use crate::core::sync::SyncPlanner;
use crate::core::trigger::{
    ComboTracker, EmotionalBeat, FractionationTracker, TriggerDecision, TriggerPolicy,
};
use crate::schema::instruction::{ArcId, ArcState, PresentationInstruction};
use crate::schema::outcome::{ChoiceCandidate, OutcomeEvent};
use crate::schema::session::{Phase, SessionContext};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("reward error: {0}")]
    Reward(#[from] RewardError),
    #[error("risk error: {0}")]
    Risk(#[from] RiskError),
    #[error("time error: {0}")]
    Time(#[from] TimeError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// What happened to the arc an outcome asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcDisposition {
    NotWarranted,
    Started(ArcId),
    /// A strictly higher tier replaced the running arc.
    Preempted { started: ArcId, cancelled: ArcId },
    /// An equal or lower tier arrived while `active` was running.
    Dropped { active: ArcId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorResult {
    pub phase: Phase,
    pub ambient_probability: f64,
    pub decision: TriggerDecision,
    pub reward: Option<RewardMagnitude>,
    pub arc: Option<DeliveryArc>,
    pub disposition: ArcDisposition,
}

pub struct SessionOrchestrator {
    phases: PhaseScheduler,
    rewards: RewardCalculator,
    risk: RiskScorer,
    triggers: TriggerPolicy,
    arcs: ArcScheduler,
    sync: SyncPlanner,
    clock: SessionClock,
    session: SessionContext,
    combo: ComboTracker,
    fractionation: FractionationTracker,
    active: Option<ArcRun>,
    outbox: Vec<PresentationInstruction>,
    last_phase: Phase,
    schedule_finished: bool,
    next_arc_id: u64,
    seed: u64,
    outcome_count: u64,
    suspend_threshold_ms: u64,
}

/// Builder for constructing a `SessionOrchestrator`.
pub struct SessionOrchestratorBuilder {
    config: Option<EngineConfig>,
    config_path: Option<String>,
    template: Option<SessionTemplate>,
    session: SessionContext,
    seed: Option<u64>,
}

impl SessionOrchestrator {
    pub fn builder() -> SessionOrchestratorBuilder {
        SessionOrchestratorBuilder {
            config: None,
            config_path: None,
            template: None,
            session: SessionContext::default(),
            seed: None,
        }
    }

    /// Handles a resolved outcome at the current session time.
    ///
    /// Any transitions of the running arc that are already due are queued
    /// first, so a preempting abort always follows them.
    pub fn on_outcome(
        &mut self,
        outcome: &OutcomeEvent,
    ) -> Result<OrchestratorResult, OrchestratorError> {
        self.settle();

        let now = self.clock.elapsed_ms();
        let phase = self.phases.current_phase(now as f64)?;
        let ambient_probability = self.phases.ambient_reward_probability(now as f64)?;
        let combo = self.combo.record(outcome.class);
        let cycled = self.fractionation.record(EmotionalBeat::of(outcome));
        if cycled {
            debug!(character = %outcome.character_id, "fractionation cycle closed");
        }

        let mut rng = StdRng::seed_from_u64(
            self.seed.wrapping_add(self.outcome_count.wrapping_mul(7919)),
        );
        self.outcome_count += 1;
        let decision = self.triggers.evaluate(
            outcome,
            ambient_probability,
            &self.session,
            combo,
            cycled,
            &mut rng,
        );

        if !decision.warranted {
            debug!(class = %outcome.class, %phase, combo, "outcome did not warrant an arc");
            return Ok(OrchestratorResult {
                phase,
                ambient_probability,
                decision,
                reward: None,
                arc: None,
                disposition: ArcDisposition::NotWarranted,
            });
        }

        let modifiers = Modifiers::from_flags(&outcome.context_flags);
        let mut reward = self.rewards.compute_magnitude(outcome.class, &modifiers);
        if let Some(ceiling) = decision.tier_ceiling {
            reward = self.rewards.limit_to_tier(reward, ceiling);
        }
        let speed = self.arcs.speed_multiplier(outcome, &self.session);

        let (disposition, arc) = match self.active.as_ref().map(|run| (run.id(), run.arc().tier)) {
            Some((running, running_tier)) if reward.tier <= running_tier => {
                debug!(
                    active = %running,
                    active_tier = %running_tier,
                    tier = %reward.tier,
                    "arc dropped: running arc is at least as strong"
                );
                (ArcDisposition::Dropped { active: running }, None)
            }
            Some((running, running_tier)) => {
                self.abort_active();
                let arc = self.start_arc(&reward, speed);
                debug!(
                    cancelled = %running,
                    cancelled_tier = %running_tier,
                    started = %arc.id,
                    tier = %arc.tier,
                    "arc preempted"
                );
                (
                    ArcDisposition::Preempted {
                        started: arc.id,
                        cancelled: running,
                    },
                    Some(arc),
                )
            }
            None => {
                let arc = self.start_arc(&reward, speed);
                (ArcDisposition::Started(arc.id), Some(arc))
            }
        };

        Ok(OrchestratorResult {
            phase,
            ambient_probability,
            decision,
            reward: Some(reward),
            arc,
            disposition,
        })
    }

    /// Risk profiles for the choices about to be shown, in input order.
    pub fn on_choice_presented(
        &self,
        candidates: &[ChoiceCandidate],
    ) -> Result<Vec<ChoiceRiskProfile>, OrchestratorError> {
        candidates
            .iter()
            .map(|c| self.risk.score_candidate(c).map_err(OrchestratorError::from))
            .collect()
    }

    /// Advances session time to `now_ms` and returns every instruction that
    /// became due since the previous tick, in order.
    ///
    /// A large gap is replayed rather than skipped: each segment crossed
    /// inside it is still emitted.
    pub fn tick(&mut self, now_ms: f64) -> Result<Vec<PresentationInstruction>, OrchestratorError> {
        let delta = self.clock.advance_to(now_ms)?;
        let elapsed = self.clock.elapsed_ms();
        if delta > self.suspend_threshold_ms {
            warn!(
                gap_ms = delta,
                threshold_ms = self.suspend_threshold_ms,
                elapsed_ms = elapsed,
                "tick gap exceeds suspend threshold, fast-forwarding"
            );
        }

        let phase = self.phases.current_phase(elapsed as f64)?;
        if phase != self.last_phase {
            info!(from = %self.last_phase, to = %phase, elapsed_ms = elapsed, "session phase changed");
            self.last_phase = phase;
        }
        if !self.schedule_finished && self.phases.is_finished(elapsed as f64)? {
            info!(elapsed_ms = elapsed, "session schedule complete");
            self.schedule_finished = true;
        }

        self.settle();
        Ok(std::mem::take(&mut self.outbox))
    }

    pub fn tick_clock<C: Clock>(
        &mut self,
        clock: &C,
    ) -> Result<Vec<PresentationInstruction>, OrchestratorError> {
        self.tick(clock.elapsed_ms())
    }

    /// Cancels the running arc, queueing its terminal abort instruction.
    pub fn cancel_active(&mut self) -> Option<ArcId> {
        self.settle();
        let cancelled = self.abort_active();
        if let Some(id) = cancelled {
            debug!(arc = %id, "arc cancelled");
        }
        cancelled
    }

    /// Starts a new session at time zero. A running arc is aborted first.
    pub fn start_session(&mut self, session: SessionContext) {
        self.abort_active();
        self.clock.reset();
        self.combo.reset();
        self.fractionation.reset();
        self.session = session;
        self.last_phase = Phase::Entry;
        self.schedule_finished = false;
        self.outcome_count = 0;
        info!(
            session_index = self.session.session_index,
            returning = self.session.returning_player,
            "session started"
        );
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.clock.elapsed_ms()
    }

    pub fn current_phase(&self) -> Phase {
        self.last_phase
    }

    pub fn active_arc(&self) -> Option<&DeliveryArc> {
        self.active.as_ref().map(|run| run.arc())
    }

    /// State of the running arc at the current session time.
    pub fn arc_state(&self) -> ArcState {
        match &self.active {
            Some(run) => {
                let elapsed = self.clock.arc_elapsed_ms(run.id()).unwrap_or(0);
                run.current_state(elapsed)
            }
            None => ArcState::Idle,
        }
    }

    pub fn combo(&self) -> u32 {
        self.combo.count()
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Changes the jackpot seed; later outcomes roll from it.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    pub fn phases(&self) -> &PhaseScheduler {
        &self.phases
    }

    pub fn rewards(&self) -> &RewardCalculator {
        &self.rewards
    }

    pub fn sync(&self) -> &SyncPlanner {
        &self.sync
    }

    /// Instructions queued for the next tick.
    pub fn pending(&self) -> &[PresentationInstruction] {
        &self.outbox
    }

    fn start_arc(&mut self, reward: &RewardMagnitude, speed: f64) -> DeliveryArc {
        let id = ArcId(self.next_arc_id);
        self.next_arc_id += 1;
        let now = self.clock.elapsed_ms();
        let arc = self.arcs.build(id, reward, speed, now);
        self.clock.start_arc(id, arc.duration_ms);
        debug!(
            arc = %id,
            tier = %arc.tier,
            magnitude = arc.magnitude,
            duration_ms = arc.duration_ms,
            speed = arc.speed,
            started_at_ms = now,
            "arc started"
        );
        self.active = Some(ArcRun::new(arc.clone()));
        arc
    }

    /// Queues the segments the running arc has reached and retires it once
    /// it has run its course.
    fn settle(&mut self) {
        let Some(run) = self.active.as_mut() else {
            return;
        };
        let id = run.id();
        let elapsed = self
            .clock
            .arc_elapsed_ms(id)
            .unwrap_or(run.arc().duration_ms);
        let entered = run.advance(elapsed);
        if !entered.is_empty() {
            let planned = self.sync.plan_segments(id, &run.arc().segments[entered]);
            self.outbox.extend(planned);
        }
        if run.is_complete(elapsed) {
            debug!(arc = %id, duration_ms = run.arc().duration_ms, "arc completed");
            self.clock.end_arc(id);
            self.active = None;
        }
    }

    fn abort_active(&mut self) -> Option<ArcId> {
        let run = self.active.take()?;
        let id = run.id();
        let elapsed = self.clock.arc_elapsed_ms(id).unwrap_or(0);
        self.outbox.push(self.sync.abort(id, elapsed));
        self.clock.end_arc(id);
        Some(id)
    }
}

impl SessionOrchestratorBuilder {
    /// Use `config` instead of the built-in tables.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load tables from a RON file at build time.
    pub fn config_file(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    /// Replace the phase schedule with a prebuilt template.
    pub fn template(mut self, template: SessionTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn session(mut self, session: SessionContext) -> Self {
        self.session = session;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<SessionOrchestrator, OrchestratorError> {
        let mut config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => EngineConfig::load_from_ron(Path::new(&path))?,
            (None, None) => EngineConfig::default(),
        };
        if let Some(template) = self.template {
            config.session = SessionSchedule::from_template(template);
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        let fractionation_window = config.triggers.fractionation.window;
        Ok(SessionOrchestrator {
            phases: PhaseScheduler::new(config.session)?,
            rewards: RewardCalculator::new(config.reward)?,
            risk: RiskScorer::new(config.risk)?,
            triggers: TriggerPolicy::new(config.triggers)?,
            arcs: ArcScheduler::new(config.arc)?,
            sync: SyncPlanner::new(config.sync)?,
            clock: SessionClock::new(),
            session: self.session,
            combo: ComboTracker::new(),
            fractionation: FractionationTracker::new(fractionation_window),
            active: None,
            outbox: Vec::new(),
            last_phase: Phase::Entry,
            schedule_finished: false,
            next_arc_id: 1,
            seed: config.seed,
            outcome_count: 0,
            suspend_threshold_ms: config.suspend_threshold_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::trigger::TriggerReason;
    use crate::schema::outcome::OutcomeClass;
    use crate::schema::tier::RewardTier;

    fn orchestrator() -> SessionOrchestrator {
        SessionOrchestrator::builder()
            .seed(42)
            .session(SessionContext::new(10, false, 50.0))
            .build()
            .unwrap()
    }

    fn significant(class: OutcomeClass) -> OutcomeEvent {
        OutcomeEvent::new(class, 0.0, "alex").with_flag("significant")
    }

    #[test]
    fn arc_segments_flow_through_ticks() {
        let mut o = orchestrator();
        o.tick(1_000.0).unwrap();
        let result = o.on_outcome(&significant(OutcomeClass::Best)).unwrap();
        let arc = result.arc.unwrap();
        assert_eq!(arc.started_at_ms, 1_000);
        assert_eq!(result.disposition, ArcDisposition::Started(arc.id));
        assert!(o.pending().is_empty());

        let first = o.tick(1_010.0).unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|i| i.state() == Some(ArcState::Hook)));
        assert_eq!(o.arc_state(), ArcState::Hook);

        assert!(o.tick(1_500.0).unwrap().is_empty());
        let build = o.tick(3_000.0).unwrap();
        assert!(build.iter().all(|i| i.state() == Some(ArcState::Build)));

        let rest = o.tick(20_000.0).unwrap();
        assert_eq!(rest.len(), 9);
        assert!(o.active_arc().is_none());
        assert_eq!(o.arc_state(), ArcState::Idle);
    }

    #[test]
    fn unwarranted_outcome_starts_nothing() {
        let mut o = orchestrator();
        let plain = OutcomeEvent::new(OutcomeClass::Poor, 0.0, "alex");
        let result = o.on_outcome(&plain).unwrap();
        assert_eq!(result.disposition, ArcDisposition::NotWarranted);
        assert!(result.reward.is_none());
        assert!(o.tick(100.0).unwrap().is_empty());
    }

    #[test]
    fn equal_tier_is_dropped() {
        let mut o = orchestrator();
        let first = o.on_outcome(&significant(OutcomeClass::Best)).unwrap();
        let first_id = first.arc.unwrap().id;
        o.tick(100.0).unwrap();
        let second = o.on_outcome(&significant(OutcomeClass::Best)).unwrap();
        assert_eq!(second.disposition, ArcDisposition::Dropped { active: first_id });
        assert!(second.arc.is_none());
        assert_eq!(o.active_arc().unwrap().id, first_id);
    }

    #[test]
    fn cancel_emits_single_abort() {
        let mut o = orchestrator();
        o.on_outcome(&significant(OutcomeClass::Good)).unwrap();
        o.tick(2_500.0).unwrap();
        let id = o.cancel_active().unwrap();
        assert_eq!(o.cancel_active(), None);

        let out = o.tick(2_600.0).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_aborted());
        assert_eq!(out[0].arc_id, id);
        assert_eq!(out[0].offset_ms, 2_500);
        assert!(o.tick(30_000.0).unwrap().is_empty());
    }

    #[test]
    fn near_miss_reward_is_capped() {
        let mut config = EngineConfig::default();
        config.triggers.jackpot.probability_cap = 0.0;
        let mut o = SessionOrchestrator::builder().config(config).build().unwrap();
        let near = OutcomeEvent::new(OutcomeClass::Best, 0.0, "alex").with_flag("near_miss");
        let result = o.on_outcome(&near).unwrap();
        assert!(result.decision.warranted);
        let reward = result.reward.unwrap();
        assert_eq!(reward.tier, RewardTier::Mild);
        assert_eq!(reward.magnitude, 69);
    }

    #[test]
    fn fractionation_cycle_starts_capped_arc() {
        let mut config = EngineConfig::default();
        config.triggers.jackpot.probability_cap = 0.0;
        let mut o = SessionOrchestrator::builder().config(config).build().unwrap();
        let beat = |flag: &str| OutcomeEvent::new(OutcomeClass::Best, 0.0, "dad").with_flag(flag);
        for flag in ["anger", "joy", "anger"] {
            let result = o.on_outcome(&beat(flag)).unwrap();
            assert!(!result.decision.reasons.contains(&TriggerReason::Fractionation));
        }
        let poor = OutcomeEvent::new(OutcomeClass::Poor, 0.0, "dad").with_flag("relief");
        let result = o.on_outcome(&poor).unwrap();
        assert_eq!(result.decision.reasons, vec![TriggerReason::Fractionation]);
        assert_eq!(result.decision.tier_ceiling, Some(RewardTier::Satisfying));

        // A new session forgets half-finished cycles.
        for flag in ["anger", "joy", "anger"] {
            o.on_outcome(&beat(flag)).unwrap();
        }
        o.start_session(SessionContext::default());
        let result = o.on_outcome(&poor).unwrap();
        assert!(!result.decision.warranted);
    }

    #[test]
    fn phase_tracks_ticks() {
        let mut o = orchestrator();
        assert_eq!(o.current_phase(), Phase::Entry);
        o.tick(400_000.0).unwrap();
        assert_eq!(o.current_phase(), Phase::Peak);
        o.tick(900_000.0).unwrap();
        assert_eq!(o.current_phase(), Phase::Close);
    }

    #[test]
    fn start_session_resets_time_and_aborts() {
        let mut o = orchestrator();
        o.tick(5_000.0).unwrap();
        o.on_outcome(&significant(OutcomeClass::Good)).unwrap();
        o.start_session(SessionContext::default());
        assert_eq!(o.elapsed_ms(), 0);
        assert_eq!(o.combo(), 0);
        assert!(o.active_arc().is_none());
        assert_eq!(o.pending().len(), 1);
        assert!(o.pending()[0].is_aborted());
    }

    #[test]
    fn bad_config_fails_build() {
        let mut config = EngineConfig::default();
        config.sync.tolerance_ms = 500;
        let err = SessionOrchestrator::builder().config(config).build();
        assert!(matches!(err, Err(OrchestratorError::Config(_))));
    }
}
