//! Lifecycle script format for `tether simulate`.
//!
//! One step per line, `#` starts a comment:
//!
//! ```text
//! at 2024-06-01T20:00:00Z
//! start new push
//! feature start chat
//! advance 3m
//! feature end chat
//! background
//! advance 45s
//! foreground
//! milestone signup_started
//! end app_close
//! ```

use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::time::Duration;

use tether_core::api::{EndReason, Milestone, OpenSource, SessionKind};

use crate::error::CliError;

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    At(DateTime<Utc>),
    Advance(Duration),
    Start { kind: SessionKind, source: OpenSource },
    Identify(String),
    FeatureStart(String),
    FeatureEnd(String),
    Background,
    Foreground,
    End(EndReason),
    OnboardingStart,
    OnboardingComplete,
    OnboardingAbort(String),
    Milestone(Milestone),
    Metrics,
}

impl FromStr for ScriptStep {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let step = match words.as_slice() {
            ["at", ts] => ScriptStep::At(
                DateTime::parse_from_rfc3339(ts)
                    .map_err(|e| format!("bad timestamp {ts:?}: {e}"))?
                    .with_timezone(&Utc),
            ),
            ["advance", d] => ScriptStep::Advance(parse_duration(d)?),
            ["start"] => ScriptStep::Start {
                kind: SessionKind::New,
                source: OpenSource::Direct,
            },
            ["start", kind] => ScriptStep::Start {
                kind: kind.parse()?,
                source: OpenSource::Direct,
            },
            ["start", kind, source] => ScriptStep::Start {
                kind: kind.parse()?,
                source: source.parse()?,
            },
            ["identify", user] => ScriptStep::Identify(user.to_string()),
            ["feature", "start", name] => ScriptStep::FeatureStart(name.to_string()),
            ["feature", "end", name] => ScriptStep::FeatureEnd(name.to_string()),
            ["background"] => ScriptStep::Background,
            ["foreground"] => ScriptStep::Foreground,
            ["end"] => ScriptStep::End(EndReason::AppClose),
            ["end", reason] => ScriptStep::End(reason.parse()?),
            ["onboarding", "start"] => ScriptStep::OnboardingStart,
            ["onboarding", "complete"] => ScriptStep::OnboardingComplete,
            ["onboarding", "abort", reason @ ..] if !reason.is_empty() => {
                ScriptStep::OnboardingAbort(reason.join(" "))
            }
            ["milestone", name] => ScriptStep::Milestone(Milestone::from(*name)),
            ["metrics"] => ScriptStep::Metrics,
            _ => return Err(format!("unrecognized step {line:?}")),
        };
        Ok(step)
    }
}

/// `90s`, `5m`, `2h`; a bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => s.split_at(i),
        None => (s, "s"),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("bad duration {s:?}"))?;
    let secs = match unit {
        "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        _ => return Err(format!("bad duration unit in {s:?}")),
    };
    Ok(Duration::from_secs(secs))
}

pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>, CliError> {
    let mut steps = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let step = line.parse().map_err(|message| CliError::Script {
            line: idx + 1,
            message,
        })?;
        steps.push(step);
    }
    Ok(steps)
}
