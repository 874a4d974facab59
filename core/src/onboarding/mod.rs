//! Signup funnel tracking.
//!
//! An onboarding session runs from first launch until signup completes or
//! the user gives up. Milestones mark progress through a fixed funnel and
//! drive the funnel events and metrics.

pub mod funnel;
pub mod manager;
pub mod session;

pub use funnel::{MilestoneTiming, OnboardingResult, SignupUserData};
pub use manager::{OnboardingSessionManager, BACKGROUND_TIMEOUT_REASON};
pub use session::{Interaction, Milestone, MilestoneRecord, OnboardingSession, FUNNEL};

#[cfg(test)]
mod tests;
