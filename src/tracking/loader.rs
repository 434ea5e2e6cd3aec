//! Script loading for the remote `ga.js` tracker.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::platform::{PageLocation, ScriptRequest};
use crate::tracking::constants::{INSECURE_SCRIPT_PREFIX, SCRIPT_RESOURCE, SECURE_SCRIPT_PREFIX};
use crate::tracking::options::PageTrackingOptions;
use crate::tracking::PageTracker;

/// URL of the tracking script for a page at `location`.
///
/// HTTPS pages load from the `ssl.` host, everything else from `www.`. An explicit
/// `script_url` option takes precedence.
pub fn script_url(location: &PageLocation, options: &PageTrackingOptions) -> String {
    if let Some(url) = options.script_url.as_deref() {
        return url.to_owned();
    }
    let prefix = if location.protocol() == "https:" {
        SECURE_SCRIPT_PREFIX
    } else {
        INSECURE_SCRIPT_PREFIX
    };
    format!("{prefix}{SCRIPT_RESOURCE}")
}

/// Lets exactly one of possibly several "script loaded" signals through.
#[derive(Debug, Default)]
pub(crate) struct ReadyGuard {
    fired: AtomicBool,
}

impl ReadyGuard {
    /// Returns `true` the first time only.
    pub(crate) fn fire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Builds the script request whose ready callback initializes the tracker once.
///
/// The callback keeps `tracker` alive for as long as the host holds the request.
pub(crate) fn script_request(
    tracker: PageTracker,
    src: String,
    account_id: String,
    options: PageTrackingOptions,
) -> ScriptRequest {
    let guard = ReadyGuard::default();
    let on_ready = Rc::new(move || {
        if !guard.fire() {
            return;
        }
        tracker.initialize_tracker(&account_id, &options);
    });
    ScriptRequest::new(src, on_ready)
}

/// Inserts `request` now, or once the window has loaded when `defer_load` is set.
pub(crate) fn schedule_insertion(tracker: &PageTracker, request: ScriptRequest, defer_load: bool) {
    if !defer_load {
        tracker.insert_script(request);
        return;
    }

    tracker.logger().debug(format!("deferring `{}` until window load", request.src));
    let pending = tracker.clone();
    tracker.host().on_window_load(Box::new(move || pending.insert_script(request)));
}
