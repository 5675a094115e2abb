//! Multi-channel synchronization.
//!
//! Each channel has an output latency (time from instruction to the
//! player's senses) and a perceptual lead (how far after the visual onset
//! the channel should land to feel simultaneous). A common pre-roll keeps
//! every latency-compensated offset non-negative, so the planner only ever
//! shifts instructions later.
//!
//! Every `offset_ms` the planner produces is a dispatch time: how long after
//! the arc started the instruction should be handed to its output. Segment
//! instructions and aborts share that frame; perceived time lags it by
//! the channel latency less the pre-roll.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::core::arc::{ArcSegment, DeliveryArc};
use crate::core::config::ConfigError;
use crate::schema::instruction::{ArcId, Channel, InstructionKind, PresentationInstruction};

/// Hard ceiling on perceived onset spread between channels.
pub const MAX_TOLERANCE_MS: u64 = 100;

/// Upper bound for any channel's lead or output latency.
pub const MAX_CHANNEL_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTiming {
    pub lead_ms: u64,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncProfile {
    pub channels: FxHashMap<Channel, ChannelTiming>,
    pub tolerance_ms: u64,
}

impl Default for SyncProfile {
    fn default() -> Self {
        let channels = [
            (Channel::Visual, ChannelTiming { lead_ms: 0, latency_ms: 16 }),
            (Channel::Audio, ChannelTiming { lead_ms: 50, latency_ms: 40 }),
            (Channel::Haptic, ChannelTiming { lead_ms: 70, latency_ms: 30 }),
        ]
        .into_iter()
        .collect();
        Self {
            channels,
            tolerance_ms: MAX_TOLERANCE_MS,
        }
    }
}

impl SyncProfile {
    fn timing(&self, channel: Channel) -> ChannelTiming {
        self.channels.get(&channel).copied().unwrap_or(ChannelTiming {
            lead_ms: 0,
            latency_ms: 0,
        })
    }

    /// Largest difference between two channels' perceived onsets.
    pub fn lead_spread_ms(&self) -> u64 {
        let leads = Channel::ALL.map(|c| self.timing(c).lead_ms);
        let max = leads.iter().max().copied().unwrap_or(0);
        let min = leads.iter().min().copied().unwrap_or(0);
        max - min
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(missing) = Channel::ALL.iter().find(|c| !self.channels.contains_key(*c)) {
            return Err(ConfigError::Invalid(format!(
                "no timing for channel '{}'",
                missing.name()
            )));
        }
        for channel in Channel::ALL {
            let t = self.timing(channel);
            if t.lead_ms > MAX_CHANNEL_DELAY_MS || t.latency_ms > MAX_CHANNEL_DELAY_MS {
                return Err(ConfigError::Invalid(format!(
                    "channel '{}' lead {} ms / latency {} ms exceed {MAX_CHANNEL_DELAY_MS} ms",
                    channel.name(),
                    t.lead_ms,
                    t.latency_ms
                )));
            }
        }
        if self.tolerance_ms == 0 || self.tolerance_ms > MAX_TOLERANCE_MS {
            return Err(ConfigError::Invalid(format!(
                "sync tolerance {} ms must be within 1..={MAX_TOLERANCE_MS}",
                self.tolerance_ms
            )));
        }
        let spread = self.lead_spread_ms();
        if spread >= self.tolerance_ms {
            return Err(ConfigError::Invalid(format!(
                "channel leads spread {spread} ms, tolerance is {} ms",
                self.tolerance_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SyncPlanner {
    profile: SyncProfile,
    preroll_ms: u64,
}

impl SyncPlanner {
    pub fn new(profile: SyncProfile) -> Result<Self, ConfigError> {
        profile.validate()?;
        let preroll_ms = Channel::ALL
            .iter()
            .map(|c| {
                let t = profile.timing(*c);
                t.latency_ms.saturating_sub(t.lead_ms)
            })
            .max()
            .unwrap_or(0);
        Ok(Self { profile, preroll_ms })
    }

    pub fn profile(&self) -> &SyncProfile {
        &self.profile
    }

    pub fn preroll_ms(&self) -> u64 {
        self.preroll_ms
    }

    /// When the player perceives an instruction issued at `offset_ms`,
    /// relative to the arc start.
    pub fn perceived_onset_ms(&self, channel: Channel, offset_ms: u64) -> u64 {
        offset_ms
            .saturating_add(self.profile.timing(channel).latency_ms)
            .saturating_sub(self.preroll_ms)
    }

    /// One instruction per channel for entering `segment`.
    pub fn plan_segment(&self, arc_id: ArcId, segment: &ArcSegment) -> Vec<PresentationInstruction> {
        Channel::ALL
            .iter()
            .map(|channel| {
                let timing = self.profile.timing(*channel);
                let offset_ms = self
                    .preroll_ms
                    .saturating_add(segment.start_ms)
                    .saturating_add(timing.lead_ms)
                    .saturating_sub(timing.latency_ms);
                let snap = &segment.snapshot;
                let mut params = BTreeMap::new();
                let haptic_pattern = match channel {
                    Channel::Visual => {
                        params.insert("glow".to_string(), snap.glow);
                        params.insert("pulse_rate".to_string(), snap.pulse_rate);
                        params.insert("particle_density".to_string(), snap.particle_density);
                        params.insert("blur".to_string(), snap.blur);
                        None
                    }
                    Channel::Audio => {
                        params.insert("volume".to_string(), snap.volume);
                        params.insert("pitch".to_string(), snap.pitch);
                        params.insert("layers".to_string(), snap.layers as f64);
                        None
                    }
                    Channel::Haptic => {
                        params.insert("intensity".to_string(), snap.haptic_intensity);
                        params.insert("interval_ms".to_string(), snap.haptic_interval_ms as f64);
                        Some(snap.haptic_pattern)
                    }
                };
                PresentationInstruction {
                    arc_id,
                    kind: InstructionKind::Segment { state: segment.state },
                    channel: Some(*channel),
                    offset_ms,
                    duration_ms: segment.duration_ms().saturating_sub(timing.lead_ms),
                    params,
                    haptic_pattern,
                }
            })
            .collect()
    }

    /// Instructions for a run of segments, ordered by offset then channel.
    pub fn plan_segments<'a, I>(&self, arc_id: ArcId, segments: I) -> Vec<PresentationInstruction>
    where
        I: IntoIterator<Item = &'a ArcSegment>,
    {
        let mut out: Vec<PresentationInstruction> = segments
            .into_iter()
            .flat_map(|s| self.plan_segment(arc_id, s))
            .collect();
        out.sort_by_key(|i| (i.offset_ms, i.channel));
        out
    }

    pub fn plan_arc(&self, arc: &DeliveryArc) -> Vec<PresentationInstruction> {
        self.plan_segments(arc.id, &arc.segments)
    }

    /// Terminal instruction for a cancelled arc, addressed to every channel
    /// and dispatched at the moment of cancellation.
    pub fn abort(&self, arc_id: ArcId, arc_elapsed_ms: u64) -> PresentationInstruction {
        let mut params = BTreeMap::new();
        params.insert("arc_elapsed_ms".to_string(), arc_elapsed_ms as f64);
        PresentationInstruction {
            arc_id,
            kind: InstructionKind::Aborted,
            channel: None,
            offset_ms: arc_elapsed_ms,
            duration_ms: 0,
            params,
            haptic_pattern: None,
        }
    }
}
