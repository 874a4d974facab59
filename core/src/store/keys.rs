//! Keys under which the trackers persist their snapshots.

/// JSON-encoded `EngagementSession`.
pub const USER_SESSION: &str = "user_session";
/// JSON string holding the RFC 3339 end time of the last engagement session.
pub const LAST_SESSION_END: &str = "last_session_end";
/// JSON-encoded `OnboardingSession`.
pub const SIGNUP_SESSION: &str = "signup_session";

pub const ALL: [&str; 3] = [USER_SESSION, LAST_SESSION_END, SIGNUP_SESSION];
