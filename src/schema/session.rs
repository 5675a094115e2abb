use serde::{Deserialize, Serialize};
use std::fmt;

/// Session-level pacing phase. Ordered by position in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Entry,
    Build,
    Challenge,
    Peak,
    Integrate,
    Close,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Entry,
        Phase::Build,
        Phase::Challenge,
        Phase::Peak,
        Phase::Integrate,
        Phase::Close,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Build => "build",
            Self::Challenge => "challenge",
            Self::Peak => "peak",
            Self::Integrate => "integrate",
            Self::Close => "close",
        }
    }

    /// `Close` has no successor.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Close)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Supplied once per session by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    /// 1-based count of sessions this player has started.
    pub session_index: u32,
    pub returning_player: bool,
    /// Average of the player's recent relationship metrics, 0..100.
    pub average_recent_metric: f64,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            session_index: 1,
            returning_player: false,
            average_recent_metric: 50.0,
        }
    }
}

impl SessionContext {
    pub fn new(session_index: u32, returning_player: bool, average_recent_metric: f64) -> Self {
        Self {
            session_index,
            returning_player,
            average_recent_metric,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered() {
        for pair in Phase::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(Phase::Close.is_terminal());
        assert!(!Phase::Peak.is_terminal());
    }

    #[test]
    fn session_context_default_is_first_session() {
        let ctx = SessionContext::default();
        assert_eq!(ctx.session_index, 1);
        assert!(!ctx.returning_player);
    }
}
