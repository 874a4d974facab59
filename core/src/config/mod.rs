mod load;
mod types;

pub use load::{get_tether_data_dir, load_default, load_explicit, load_from_path};
pub use types::{
    EngagementConfig, EventsOutConfig, LoggingConfig, MilestonePolicy, OnboardingConfig,
    StoreConfig, StoreProvider, TrackerConfig,
};
