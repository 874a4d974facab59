//! Lifecycle phase types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a tracked session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "outcome")]
pub enum SessionPhase {
    NotStarted,
    Active,
    Backgrounded,
    Ended(EndKind),
}

/// How a session reached its terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndKind {
    Completed,
    Abandoned,
    TimedOut,
}

impl SessionPhase {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Active | Self::Backgrounded)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not_started"),
            Self::Active => f.write_str("active"),
            Self::Backgrounded => f.write_str("backgrounded"),
            Self::Ended(kind) => write!(f, "ended({})", kind.as_str()),
        }
    }
}

impl EndKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
            Self::TimedOut => "timed_out",
        }
    }
}
