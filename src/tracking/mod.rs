mod api;
mod constants;
pub mod error;
mod links;
mod loader;
mod options;

pub use api::{error_page_path, PageTracker, TrackerState, TrackingEvent};
pub use constants::{TRACKED_MARKER, TRACKING_LOGGER_NAME};
pub use loader::script_url;
pub use options::{LinkTrackingOptions, MetaValue, PageTrackingOptions};
