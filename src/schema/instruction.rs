use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Newtype wrapper for delivery arc ids. Unique within an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArcId(pub u64);

impl fmt::Display for ArcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arc#{}", self.0)
    }
}

/// States of the delivery arc state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcState {
    Idle,
    Hook,
    Build,
    Peak,
    Release,
    Afterglow,
    /// The only state of a hollow arc.
    HollowFlash,
}

impl ArcState {
    /// Segment order of a genuine arc.
    pub const CHAIN: [ArcState; 5] = [
        ArcState::Hook,
        ArcState::Build,
        ArcState::Peak,
        ArcState::Release,
        ArcState::Afterglow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Hook => "hook",
            Self::Build => "build",
            Self::Peak => "peak",
            Self::Release => "release",
            Self::Afterglow => "afterglow",
            Self::HollowFlash => "hollow_flash",
        }
    }
}

impl fmt::Display for ArcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Independent output modality of the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Visual,
    Audio,
    Haptic,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Visual, Channel::Audio, Channel::Haptic];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Visual => "visual",
            Self::Audio => "audio",
            Self::Haptic => "haptic",
        }
    }
}

/// Vibration envelope requested from the haptic collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticPattern {
    Pulse,
    Heartbeat,
    Crescendo,
    Burst,
    /// One weak tap, used by hollow arcs.
    SinglePulse,
}

impl HapticPattern {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pulse => "pulse",
            Self::Heartbeat => "heartbeat",
            Self::Crescendo => "crescendo",
            Self::Burst => "burst",
            Self::SinglePulse => "single_pulse",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKind {
    /// The arc entered `state`; render it on the instruction's channel.
    Segment { state: ArcState },
    /// The arc was cancelled. Release every held channel resource.
    Aborted,
}

/// One unit of work for the rendering collaborator.
///
/// Offsets are relative to the arc start on the renderer's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationInstruction {
    pub arc_id: ArcId,
    pub kind: InstructionKind,
    /// `None` addresses every channel; only terminal instructions use it.
    pub channel: Option<Channel>,
    pub offset_ms: u64,
    pub duration_ms: u64,
    pub params: BTreeMap<String, f64>,
    #[serde(default)]
    pub haptic_pattern: Option<HapticPattern>,
}

impl PresentationInstruction {
    pub fn is_aborted(&self) -> bool {
        matches!(self.kind, InstructionKind::Aborted)
    }

    /// The arc state this instruction renders, if it is a segment instruction.
    pub fn state(&self) -> Option<ArcState> {
        match self.kind {
            InstructionKind::Segment { state } => Some(state),
            InstructionKind::Aborted => None,
        }
    }

    pub fn param(&self, key: &str) -> Option<f64> {
        self.params.get(key).copied()
    }
}
