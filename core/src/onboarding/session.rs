//! Onboarding session state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clock::{elapsed, millis};
use crate::config::MilestonePolicy;
use crate::sink::names;
use crate::state::SessionPhase;

/// A named checkpoint in the signup funnel. Names outside the funnel are
/// kept as [`Milestone::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Milestone {
    AppLaunch,
    SignupStarted,
    ProfileImageUploaded,
    InterestSelected,
    SignupCompleted,
    Other(String),
}

/// The funnel steps, in order.
pub const FUNNEL: [Milestone; 5] = [
    Milestone::AppLaunch,
    Milestone::SignupStarted,
    Milestone::ProfileImageUploaded,
    Milestone::InterestSelected,
    Milestone::SignupCompleted,
];

impl Milestone {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AppLaunch => "app_launch",
            Self::SignupStarted => "signup_started",
            Self::ProfileImageUploaded => "profile_image_uploaded",
            Self::InterestSelected => "interest_selected",
            Self::SignupCompleted => "signup_completed",
            Self::Other(name) => name,
        }
    }

    /// Event emitted the first time this milestone is reached, if any.
    pub fn funnel_event(&self) -> Option<&'static str> {
        match self {
            Self::SignupStarted => Some(names::SIGNUP_STARTED),
            Self::ProfileImageUploaded => Some(names::SIGNUP_PROFILE_IMAGE_UPLOADED),
            Self::InterestSelected => Some(names::SIGNUP_INTEREST_SELECTED),
            Self::SignupCompleted => Some(names::SIGNUP_COMPLETED),
            Self::AppLaunch | Self::Other(_) => None,
        }
    }
}

impl From<&str> for Milestone {
    fn from(s: &str) -> Self {
        match s {
            "app_launch" => Self::AppLaunch,
            "signup_started" => Self::SignupStarted,
            "profile_image_uploaded" => Self::ProfileImageUploaded,
            "interest_selected" => Self::InterestSelected,
            "signup_completed" => Self::SignupCompleted,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Milestone {
    fn from(s: String) -> Self {
        match Milestone::from(s.as_str()) {
            Self::Other(_) => Self::Other(s),
            known => known,
        }
    }
}

impl From<Milestone> for String {
    fn from(m: Milestone) -> Self {
        match m {
            Milestone::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneRecord {
    pub name: Milestone,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub duration_since_start_ms: u64,
}

/// Persisted signup funnel session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingSession {
    pub start_time: DateTime<Utc>,
    pub is_anonymous: bool,
    pub total_time_ms: u64,
    /// In recording order. Each name appears at most once.
    pub milestones: Vec<MilestoneRecord>,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    #[serde(default)]
    pub background_started_at: Option<DateTime<Utc>>,
}

impl OnboardingSession {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            start_time: now,
            is_anonymous: true,
            total_time_ms: 0,
            milestones: vec![MilestoneRecord {
                name: Milestone::AppLaunch,
                at: now,
            }],
            interactions: Vec::new(),
            background_started_at: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.background_started_at.is_some() {
            SessionPhase::Backgrounded
        } else {
            SessionPhase::Active
        }
    }

    pub fn milestone_at(&self, name: &Milestone) -> Option<DateTime<Utc>> {
        self.milestones
            .iter()
            .find(|m| &m.name == name)
            .map(|m| m.at)
    }

    pub fn has_milestone(&self, name: &Milestone) -> bool {
        self.milestone_at(name).is_some()
    }

    /// Writes `name` at `now` under `policy`. Returns whether the stored
    /// timestamp changed.
    pub fn record_milestone(
        &mut self,
        name: &Milestone,
        now: DateTime<Utc>,
        policy: MilestonePolicy,
    ) -> bool {
        match self.milestones.iter_mut().find(|m| &m.name == name) {
            None => {
                self.milestones.push(MilestoneRecord {
                    name: name.clone(),
                    at: now,
                });
                true
            }
            Some(existing) => match policy {
                MilestonePolicy::FirstWriteWins => false,
                MilestonePolicy::LastWriteWins => {
                    existing.at = now;
                    true
                }
            },
        }
    }

    pub fn push_interaction(&mut self, action: &str, now: DateTime<Utc>) {
        self.interactions.push(Interaction {
            action: action.to_string(),
            timestamp: now,
            duration_since_start_ms: millis(elapsed(self.start_time, now)),
        });
    }

    /// Chronologically latest milestone; on equal timestamps the one recorded
    /// last.
    pub fn latest_milestone(&self) -> Option<&MilestoneRecord> {
        self.milestones
            .iter()
            .enumerate()
            .max_by_key(|(i, m)| (m.at, *i))
            .map(|(_, m)| m)
    }

    /// Start of the funnel: the `app_launch` milestone, or the session start
    /// if that milestone is somehow missing.
    pub fn launch_time(&self) -> DateTime<Utc> {
        self.milestone_at(&Milestone::AppLaunch)
            .unwrap_or(self.start_time)
    }
}
