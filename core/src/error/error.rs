use thiserror::Error;

use crate::state::TransitionError;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("store unavailable: {op} {key}: {source}")]
    StoreUnavailable {
        op: &'static str,
        key: String,
        source: anyhow::Error,
    },
    #[error("corrupt snapshot under {key}: {source}")]
    CorruptSnapshot {
        key: String,
        source: serde_json::Error,
    },
    #[error("snapshot encode failed for {key}: {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
    #[error("transition rejected: {0}")]
    Transition(#[from] TransitionError),
    #[error("config error: {0}")]
    Config(String),
    #[error("plugin error: {0}")]
    Plugin(#[source] anyhow::Error),
}

impl TrackerError {
    /// Stable identifier used as the `error.kind` log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StoreUnavailable { .. } => "store.unavailable",
            Self::CorruptSnapshot { .. } => "store.corrupt_snapshot",
            Self::Encode { .. } => "store.encode_failed",
            Self::Transition(_) => "state.transition_rejected",
            Self::Config(_) => "config",
            Self::Plugin(_) => "plugin",
        }
    }
}
