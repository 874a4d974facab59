use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl SessionQuality {
    /// Averages a duration score and a feature score, both on a 1..=4 scale
    /// (features floor at 0).
    pub fn score(duration: Duration, features_used: usize) -> Self {
        let time_score: u32 = if duration > Duration::from_secs(5 * 60) {
            4
        } else if duration > Duration::from_secs(2 * 60) {
            3
        } else if duration > Duration::from_secs(30) {
            2
        } else {
            1
        };
        let feature_score = features_used.min(4) as u32;
        let total = f64::from(time_score + feature_score) / 2.0;

        if total >= 3.5 {
            Self::Excellent
        } else if total >= 2.5 {
            Self::Good
        } else if total >= 1.5 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

/// 0–100: up to 50 for duration (capped at 5 minutes), up to 30 for
/// features (capped at 5), up to 20 for app opens (capped at 10).
pub fn engagement_score(duration: Duration, features_used: usize, app_open_count: u32) -> u32 {
    let duration_part = (duration.as_secs_f64() / 300.0 * 50.0).min(50.0);
    let feature_part = (features_used as f64 / 5.0 * 30.0).min(30.0);
    let opens_part = (f64::from(app_open_count) / 10.0 * 20.0).min(20.0);
    (duration_part + feature_part + opens_part).round() as u32
}

/// Derived view of an engagement session. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMetrics {
    pub total_duration: Duration,
    pub active_duration: Duration,
    pub background_duration: Duration,
    pub features_used: usize,
    pub app_open_count: u32,
    pub session_quality: SessionQuality,
}

impl SessionMetrics {
    pub fn engagement_score(&self) -> u32 {
        engagement_score(self.total_duration, self.features_used, self.app_open_count)
    }
}
