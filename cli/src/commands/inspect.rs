//! `tether inspect` and `tether clear`.

use serde_json::{json, Value};

use tether_core::api::{
    keys, Clock, EngagementSession, OnboardingResult, OnboardingSession, PersistentStore,
};

use crate::error::CliError;

/// Reads every known key and attaches derived metrics as of `clock.now()`.
///
/// Values that do not parse are reported as raw strings, not errors.
pub async fn inspect_store(
    store: &dyn PersistentStore,
    clock: &dyn Clock,
) -> Result<Value, CliError> {
    let now = clock.now();
    let mut out = serde_json::Map::new();
    out.insert("store".into(), json!(store.name()));
    out.insert("now".into(), json!(now.to_rfc3339()));

    let user_session = read(store, keys::USER_SESSION).await?;
    out.insert(
        keys::USER_SESSION.into(),
        match user_session {
            None => Value::Null,
            Some(raw) => match serde_json::from_str::<EngagementSession>(&raw) {
                Ok(session) => {
                    let metrics = session.metrics(now);
                    json!({
                        "session": session,
                        "phase": session.phase().to_string(),
                        "total_duration_ms": metrics.total_duration.as_millis() as u64,
                        "session_quality": metrics.session_quality,
                        "engagement_score": metrics.engagement_score(),
                    })
                }
                Err(e) => json!({ "raw": raw, "error": e.to_string() }),
            },
        },
    );

    let last_end = read(store, keys::LAST_SESSION_END).await?;
    out.insert(
        keys::LAST_SESSION_END.into(),
        last_end
            .map(|raw| serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw)))
            .unwrap_or(Value::Null),
    );

    let signup = read(store, keys::SIGNUP_SESSION).await?;
    out.insert(
        keys::SIGNUP_SESSION.into(),
        match signup {
            None => Value::Null,
            Some(raw) => match serde_json::from_str::<OnboardingSession>(&raw) {
                Ok(session) => {
                    let result = OnboardingResult::compute(&session, now);
                    json!({
                        "session": session,
                        "progress": Value::Object(result.to_properties()),
                    })
                }
                Err(e) => json!({ "raw": raw, "error": e.to_string() }),
            },
        },
    );

    Ok(Value::Object(out))
}

/// Removes `only`, or every known key. Returns the keys removed.
pub async fn clear_store(
    store: &dyn PersistentStore,
    only: Option<&str>,
) -> Result<Vec<String>, CliError> {
    let targets: Vec<&str> = match only {
        Some(key) if keys::ALL.contains(&key) => vec![key],
        Some(key) => {
            return Err(CliError::Command(format!(
                "unknown key {key:?}, expected one of {}",
                keys::ALL.join(", ")
            )))
        }
        None => keys::ALL.to_vec(),
    };

    for key in &targets {
        store.remove(key).await.map_err(CliError::Anyhow)?;
        tracing::info!(target: "tether.store", key, "cleared");
    }
    Ok(targets.into_iter().map(str::to_string).collect())
}

async fn read(store: &dyn PersistentStore, key: &str) -> Result<Option<String>, CliError> {
    store.get(key).await.map_err(CliError::Anyhow)
}
