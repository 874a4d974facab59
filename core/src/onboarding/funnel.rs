//! Funnel metrics computed from an onboarding session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::session::{Milestone, OnboardingSession, FUNNEL};
use crate::clock::{elapsed, millis};
use crate::sink::Properties;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestoneTiming {
    pub milestone: Milestone,
    pub since_previous: Duration,
}

/// Derived summary of a finished (or in-flight) funnel. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnboardingResult {
    pub total_time: Duration,
    /// Percentage of funnel steps reached, 0–100.
    pub completion_rate: u32,
    pub drop_off_points: Vec<Milestone>,
    pub time_per_milestone: Vec<MilestoneTiming>,
}

impl OnboardingResult {
    pub fn compute(session: &OnboardingSession, now: DateTime<Utc>) -> Self {
        Self {
            total_time: elapsed(session.start_time, now),
            completion_rate: completion_rate(session),
            drop_off_points: drop_off_points(session),
            time_per_milestone: time_per_milestone(session),
        }
    }

    pub fn to_properties(&self) -> Properties {
        let timings: Map<String, Value> = self
            .time_per_milestone
            .iter()
            .map(|t| (t.milestone.to_string(), json!(millis(t.since_previous))))
            .collect();
        let drop_offs: Vec<&str> = self.drop_off_points.iter().map(Milestone::as_str).collect();

        let mut props = Properties::new();
        props.insert("total_time_ms".into(), json!(millis(self.total_time)));
        props.insert("completion_rate".into(), json!(self.completion_rate));
        props.insert("drop_off_points".into(), json!(drop_offs));
        props.insert("time_per_milestone".into(), Value::Object(timings));
        props
    }
}

pub fn completion_rate(session: &OnboardingSession) -> u32 {
    let reached = FUNNEL.iter().filter(|m| session.has_milestone(m)).count();
    (100 * reached / FUNNEL.len()) as u32
}

/// Every funnel step from the first unreached one through the end, even
/// steps after it that do have a timestamp.
pub fn drop_off_points(session: &OnboardingSession) -> Vec<Milestone> {
    FUNNEL
        .iter()
        .skip_while(|m| session.has_milestone(m))
        .cloned()
        .collect()
}

/// Milestones in chronological order, each with the time since the one
/// before it. The first is measured from `app_launch`.
pub fn time_per_milestone(session: &OnboardingSession) -> Vec<MilestoneTiming> {
    let mut ordered: Vec<_> = session.milestones.iter().collect();
    ordered.sort_by_key(|m| m.at);

    let mut previous = session.launch_time();
    ordered
        .into_iter()
        .map(|m| {
            let since_previous = (m.at - previous).to_std().unwrap_or_default();
            previous = m.at;
            MilestoneTiming {
                milestone: m.name.clone(),
                since_previous,
            }
        })
        .collect()
}

/// Profile details known at signup completion. Only derived flags leave the
/// device, never the values themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignupUserData {
    #[serde(default)]
    pub photo_count: usize,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
}

impl SignupUserData {
    pub fn flags(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("has_photos".into(), json!(self.photo_count > 0));
        props.insert("photo_count".into(), json!(self.photo_count));
        props.insert("interest_count".into(), json!(self.interests.len()));
        props.insert(
            "has_bio".into(),
            json!(self.bio.as_deref().is_some_and(|b| !b.trim().is_empty())),
        );
        props.insert("has_gender".into(), json!(self.gender.is_some()));
        props.insert("has_age".into(), json!(self.age.is_some()));
        props
    }
}
