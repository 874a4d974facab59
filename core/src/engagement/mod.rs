//! App-engagement session tracking.
//!
//! A session spans continuous use of the app. It survives short trips to the
//! background and ends when the user logs out, closes the app, or stays away
//! longer than the configured timeout.

mod heartbeat;
pub mod manager;
pub mod metrics;
pub mod session;

pub use manager::UserSessionManager;
pub use metrics::{engagement_score, SessionMetrics, SessionQuality};
pub use session::{EndReason, EngagementSession, OpenSource, SessionKind};
