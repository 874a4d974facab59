//! Lifecycle transition rules

use super::types::{EndKind, SessionPhase};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {action:?} while {from}")]
    InvalidTransition {
        from: SessionPhase,
        action: LifecycleAction,
    },
    #[error("session already ended ({})", .kind.as_str())]
    FromTerminalState { kind: EndKind },
    #[error("no session has been started")]
    NotStarted,
}

/// Something a caller or the platform asks a session to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Background,
    Foreground,
    End(EndKind),
}

pub struct StateTransition;

impl StateTransition {
    /// Returns the phase reached by applying `action` in phase `from`.
    ///
    /// `Start` is accepted from every phase: from `NotStarted` or `Ended` it
    /// opens a fresh session, from an open phase it re-activates the session.
    pub fn validate(
        from: SessionPhase,
        action: LifecycleAction,
    ) -> Result<SessionPhase, TransitionError> {
        match (from, action) {
            (_, LifecycleAction::Start) => Ok(SessionPhase::Active),

            (SessionPhase::Active, LifecycleAction::Background) => Ok(SessionPhase::Backgrounded),
            (SessionPhase::Backgrounded, LifecycleAction::Foreground) => Ok(SessionPhase::Active),
            (SessionPhase::Active | SessionPhase::Backgrounded, LifecycleAction::End(kind)) => {
                Ok(SessionPhase::Ended(kind))
            }

            (SessionPhase::NotStarted, _) => Err(TransitionError::NotStarted),
            (SessionPhase::Ended(kind), _) => Err(TransitionError::FromTerminalState { kind }),
            (from, action) => Err(TransitionError::InvalidTransition { from, action }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert_eq!(
            StateTransition::validate(SessionPhase::NotStarted, LifecycleAction::Start),
            Ok(SessionPhase::Active)
        );
        assert_eq!(
            StateTransition::validate(SessionPhase::Active, LifecycleAction::Background),
            Ok(SessionPhase::Backgrounded)
        );
        assert_eq!(
            StateTransition::validate(SessionPhase::Backgrounded, LifecycleAction::Foreground),
            Ok(SessionPhase::Active)
        );
        assert_eq!(
            StateTransition::validate(
                SessionPhase::Backgrounded,
                LifecycleAction::End(EndKind::TimedOut)
            ),
            Ok(SessionPhase::Ended(EndKind::TimedOut))
        );
    }

    #[test]
    fn test_restart_after_terminal() {
        let ended = SessionPhase::Ended(EndKind::Completed);
        assert_eq!(
            StateTransition::validate(ended, LifecycleAction::Start),
            Ok(SessionPhase::Active)
        );
    }

    #[test]
    fn test_invalid_transitions() {
        assert_eq!(
            StateTransition::validate(SessionPhase::NotStarted, LifecycleAction::Background),
            Err(TransitionError::NotStarted)
        );
        assert_eq!(
            StateTransition::validate(SessionPhase::Active, LifecycleAction::Foreground),
            Err(TransitionError::InvalidTransition {
                from: SessionPhase::Active,
                action: LifecycleAction::Foreground,
            })
        );
        assert_eq!(
            StateTransition::validate(
                SessionPhase::Ended(EndKind::Abandoned),
                LifecycleAction::End(EndKind::Completed)
            ),
            Err(TransitionError::FromTerminalState {
                kind: EndKind::Abandoned
            })
        );
    }
}
