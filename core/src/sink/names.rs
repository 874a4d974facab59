//! Canonical event names.

pub const APP_OPENED: &str = "AppOpened";
pub const SESSION_STARTED: &str = "SessionStarted";
pub const SESSION_ENDED: &str = "SessionEnded";
pub const APP_BACKGROUNDED: &str = "AppBackgrounded";
pub const FEATURE_USED: &str = "FeatureUsed";
pub const ONBOARDING_STARTED: &str = "OnboardingStarted";
pub const SIGNUP_STARTED: &str = "SignupStarted";
pub const SIGNUP_PROFILE_IMAGE_UPLOADED: &str = "SignupProfileImageUploaded";
pub const SIGNUP_INTEREST_SELECTED: &str = "SignupInterestSelected";
pub const SIGNUP_COMPLETED: &str = "SignupCompleted";
pub const SIGNUP_ABANDONED: &str = "SignupAbandoned";
