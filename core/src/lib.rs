//! Session lifecycle tracking for the app client.
//!
//! Two cooperating managers live here: [`engagement::UserSessionManager`]
//! follows the general app-engagement session across foreground/background
//! transitions, and [`onboarding::OnboardingSessionManager`] follows the
//! signup funnel. Both persist snapshots through a [`store::PersistentStore`]
//! and report to an [`sink::EventSink`].

pub mod api;
pub mod clock;
pub mod config;
pub mod context;
pub mod engagement;
pub mod error;
pub mod events_out;
pub mod lifecycle;
pub mod onboarding;
pub mod sink;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;
