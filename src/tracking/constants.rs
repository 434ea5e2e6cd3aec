/// Name of the logger every tracking diagnostic goes through.
pub const TRACKING_LOGGER_NAME: &str = "@ga-page-tracker/tracking";

/// Class marker set on elements that already carry a tracking handler.
pub const TRACKED_MARKER: &str = "tracked";

pub(crate) const SECURE_SCRIPT_PREFIX: &str = "https://ssl.";
pub(crate) const INSECURE_SCRIPT_PREFIX: &str = "http://www.";
pub(crate) const SCRIPT_RESOURCE: &str = "google-analytics.com/ga.js";

pub(crate) const DEFAULT_STATUS_CODE: u16 = 200;
pub(crate) const DEFAULT_ACTION: &str = "click";
pub(crate) const DEFAULT_EVENT_NAME: &str = "click";
pub(crate) const INTERNAL_CATEGORY: &str = "internal";
pub(crate) const EXTERNAL_CATEGORY: &str = "external";
