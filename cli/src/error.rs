use thiserror::Error;

use tether_core::api::TrackerError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),
    #[error("script error at line {line}: {message}")]
    Script { line: usize, message: String },
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Command(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        // 11: config error
        // 12: bad script
        // 20: store / IO error
        // 50: internal/uncategorized
        match self {
            CliError::Config(_) => 11,
            CliError::Script { .. } => 12,
            CliError::Tracker(te) => match te {
                TrackerError::Config(_) => 11,
                TrackerError::StoreUnavailable { .. } | TrackerError::Plugin(_) => 20,
                _ => 50,
            },
            CliError::Io(_) | CliError::Command(_) => 20,
            CliError::Anyhow(_) => 50,
        }
    }
}
