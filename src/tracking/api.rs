use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::logger::Logger;
use crate::platform::{PageHost, PageLocation, ScriptRequest, TrackerClient};
use crate::tracking::constants::{DEFAULT_STATUS_CODE, TRACKING_LOGGER_NAME};
use crate::tracking::error::{invalid_argument, script_load_failed, TrackingResult};
use crate::tracking::loader::{schedule_insertion, script_request, script_url};
use crate::tracking::options::PageTrackingOptions;

/// Page-level tracking state: the host page plus the tracker handle, once the remote script
/// produced one.
///
/// Every public call is fire-and-forget. Failures are logged through the tracking logger and
/// never surface to the caller.
#[derive(Clone)]
pub struct PageTracker {
    inner: Rc<PageTrackerInner>,
}

struct PageTrackerInner {
    host: Rc<dyn PageHost>,
    logger: Logger,
    tracker: OnceCell<Rc<dyn TrackerClient>>,
    script_requested: Cell<bool>,
}

impl fmt::Debug for PageTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageTracker")
            .field("state", &self.state())
            .field("script_requested", &self.inner.script_requested.get())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    Ready,
}

/// A user interaction forwarded to the tracker's event call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackingEvent {
    pub category: String,
    pub action: String,
    pub label: Option<String>,
    pub value: Option<i64>,
}

impl TrackingEvent {
    pub fn new(category: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            action: action.into(),
            label: None,
            value: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_value(mut self, value: i64) -> Self {
        self.value = Some(value);
        self
    }

    fn validate(&self) -> TrackingResult<()> {
        if self.category.trim().is_empty() {
            return Err(invalid_argument("event category must not be empty"));
        }
        if self.action.trim().is_empty() {
            return Err(invalid_argument("event action must not be empty"));
        }
        Ok(())
    }
}

impl PageTracker {
    pub fn new(host: Rc<dyn PageHost>) -> Self {
        Self::with_logger(host, Logger::new(TRACKING_LOGGER_NAME))
    }

    pub fn with_logger(host: Rc<dyn PageHost>, logger: Logger) -> Self {
        Self {
            inner: Rc::new(PageTrackerInner {
                host,
                logger,
                tracker: OnceCell::new(),
                script_requested: Cell::new(false),
            }),
        }
    }

    pub fn state(&self) -> TrackerState {
        if self.inner.tracker.get().is_some() {
            TrackerState::Ready
        } else {
            TrackerState::Uninitialized
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == TrackerState::Ready
    }

    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    /// Loads the tracking script for `account_id` and records a page view once it is ready.
    ///
    /// With `defer_load` (the default) the script is inserted when the window `load` event
    /// fires, otherwise during this call. Only the first call on a tracker has an effect.
    pub fn track_page(&self, account_id: &str, options: PageTrackingOptions) {
        if let Err(err) = self.try_track_page(account_id, options) {
            self.inner.logger.error(format!("page tracking not started: {err}"));
        }
    }

    fn try_track_page(&self, account_id: &str, options: PageTrackingOptions) -> TrackingResult<()> {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            return Err(invalid_argument("account id must not be empty"));
        }
        if self.inner.script_requested.replace(true) {
            self.inner
                .logger
                .warn("tracking script already requested for this page, ignoring");
            return Ok(());
        }

        let location = match self.inner.host.location() {
            Ok(location) => location,
            Err(err) => {
                self.inner.script_requested.set(false);
                return Err(err);
            }
        };
        let src = script_url(&location, &options);
        let defer_load = options.defer_load;
        let request = script_request(self.clone(), src, account_id.to_owned(), options);
        schedule_insertion(self, request, defer_load);
        Ok(())
    }

    pub(crate) fn insert_script(&self, request: ScriptRequest) {
        let src = request.src.clone();
        match self.inner.host.append_script(request) {
            Ok(()) => self.inner.logger.debug(format!("inserted tracking script `{src}`")),
            Err(err) => self
                .inner
                .logger
                .error(format!("could not insert tracking script `{src}`: {err}")),
        }
    }

    /// Creates the tracker handle and records the page view. Runs from the script's ready
    /// signal.
    pub(crate) fn initialize_tracker(&self, account_id: &str, options: &PageTrackingOptions) {
        match self.try_initialize_tracker(account_id, options) {
            Ok(()) => self.inner.logger.debug("tracker initialized"),
            Err(err) => self
                .inner
                .logger
                .error(format!("tracker initialization failed: {err}")),
        }
    }

    fn try_initialize_tracker(&self, account_id: &str, options: &PageTrackingOptions) -> TrackingResult<()> {
        if self.is_ready() {
            return Ok(());
        }
        let api = self.inner.host.analytics_api().ok_or_else(|| {
            script_load_failed("tracking script finished loading without defining its global API")
        })?;
        let client = api.create_tracker(account_id)?;
        let client = self.inner.tracker.get_or_init(|| client).clone();

        match options.status_code {
            None | Some(DEFAULT_STATUS_CODE) => {
                client.track_pageview(None)?;
                self.inner.logger.debug("page view tracked");
            }
            Some(status_code) => {
                let location = self.inner.host.location()?;
                let path = error_page_path(status_code, &location, &self.inner.host.referrer());
                client.track_pageview(Some(&path))?;
                self.inner
                    .logger
                    .debug(format!("error page view tracked as `{path}`"));
            }
        }
        Ok(())
    }

    /// Forwards `event` to the tracker. Dropped with a diagnostic while the tracker is not
    /// initialized.
    pub fn track_event(&self, event: TrackingEvent) {
        let Some(client) = self.inner.tracker.get() else {
            self.inner
                .logger
                .debug("event not tracked, tracker not initialized");
            return;
        };
        if let Err(err) = event.validate().and_then(|()| client.track_event(&event)) {
            self.inner.logger.error(format!(
                "event `{}/{}` not tracked: {err}",
                event.category, event.action
            ));
        }
    }

    pub fn track(&self, category: &str, action: &str, label: Option<&str>, value: Option<i64>) {
        self.track_event(TrackingEvent {
            category: category.to_owned(),
            action: action.to_owned(),
            label: label.map(str::to_owned),
            value,
        });
    }

    pub(crate) fn host(&self) -> &Rc<dyn PageHost> {
        &self.inner.host
    }
}

/// Virtual path recorded for pages served with an error status, so error funnels can be
/// reported: `/<status>.html?page=<path><query>&from=<referrer>`.
pub fn error_page_path(status_code: u16, location: &PageLocation, referrer: &str) -> String {
    format!(
        "/{status_code}.html?page={}{}&from={referrer}",
        location.pathname(),
        location.search()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LogLevel;
    use crate::platform::memory::{RecordedCall, RecordingAnalyticsApi, SimulatedLink, SimulatedPage};
    use crate::platform::LinkElement;
    use crate::test_support::{capturing_logger, LogCapture};
    use crate::tracking::LinkTrackingOptions;
    use serde_json::json;

    fn setup(href: &str) -> (Rc<SimulatedPage>, Rc<RecordingAnalyticsApi>, PageTracker, LogCapture) {
        let page = Rc::new(SimulatedPage::new(href).unwrap());
        let api = Rc::new(RecordingAnalyticsApi::new());
        let (logger, capture) = capturing_logger();
        let tracker = PageTracker::with_logger(page.clone(), logger);
        (page, api, tracker, capture)
    }

    #[test]
    fn deferred_load_waits_for_window_load() {
        let (page, _api, tracker, _capture) = setup("http://example.com/");
        tracker.track_page("UA-1234-1", PageTrackingOptions::default());
        assert!(page.inserted_scripts().is_empty());

        page.fire_window_load();
        assert_eq!(page.inserted_scripts(), ["http://www.google-analytics.com/ga.js"]);
    }

    #[test]
    fn deferred_load_after_window_load_inserts_immediately() {
        let (page, _api, tracker, _capture) = setup("http://example.com/");
        page.fire_window_load();
        tracker.track_page("UA-1234-1", PageTrackingOptions::default());
        assert_eq!(page.inserted_scripts().len(), 1);
    }

    #[test]
    fn immediate_load_inserts_synchronously() {
        let (page, _api, tracker, _capture) = setup("https://example.com/");
        tracker.track_page("UA-1234-1", PageTrackingOptions::default().with_defer_load(false));
        assert_eq!(page.inserted_scripts(), ["https://ssl.google-analytics.com/ga.js"]);
        assert!(!page.is_loaded());
    }

    #[test]
    fn ready_signal_creates_tracker_and_records_pageview() {
        let (page, api, tracker, _capture) = setup("http://example.com/");
        page.install_api(api.clone());
        tracker.track_page("UA-1234-1", PageTrackingOptions::default().with_defer_load(false));
        assert_eq!(tracker.state(), TrackerState::Uninitialized);

        page.fire_script_load();
        assert_eq!(tracker.state(), TrackerState::Ready);
        assert_eq!(
            api.calls(),
            [
                RecordedCall::CreateTracker("UA-1234-1".into()),
                RecordedCall::Pageview(None)
            ]
        );
    }

    #[test]
    fn both_load_signals_initialize_once() {
        let (page, api, tracker, _capture) = setup("http://example.com/");
        page.install_api(api.clone());
        tracker.track_page("UA-1234-1", PageTrackingOptions::default().with_defer_load(false));

        page.fire_script_ready_state("loaded");
        page.fire_script_load();
        page.fire_script_ready_state("complete");

        assert_eq!(api.calls().len(), 2);
        assert_eq!(api.pageviews(), [None::<String>]);
    }

    #[test]
    fn error_status_records_synthesized_path() {
        let (page, api, tracker, _capture) = setup("http://example.com/orders/42?tab=items");
        page.set_referrer("http://search.example.org/?q=order");
        page.install_api(api.clone());
        tracker.track_page("UA-1234-1", PageTrackingOptions::default().with_status_code(500));
        page.fire_window_load();
        page.fire_script_load();

        let pageviews = api.pageviews();
        assert_eq!(pageviews.len(), 1);
        let path = pageviews[0].clone().unwrap();
        assert_eq!(
            path,
            "/500.html?page=/orders/42?tab=items&from=http://search.example.org/?q=order"
        );
        assert!(path.contains("500"));
        assert!(path.contains("/orders/42"));
        assert!(path.contains("http://search.example.org/?q=order"));
    }

    #[test]
    fn missing_global_api_is_logged_and_leaves_tracker_uninitialized() {
        let (page, _api, tracker, capture) = setup("http://example.com/");
        tracker.track_page("UA-1234-1", PageTrackingOptions::default().with_defer_load(false));
        page.fire_script_load();

        assert_eq!(tracker.state(), TrackerState::Uninitialized);
        assert_eq!(capture.count(LogLevel::Error), 1);
        assert!(capture.contains("tracking/script-load-failed"));
    }

    #[test]
    fn tracker_creation_failure_is_caught() {
        let (page, api, tracker, capture) = setup("http://example.com/");
        api.fail_tracker_creation(true);
        page.install_api(api.clone());
        tracker.track_page("UA-1234-1", PageTrackingOptions::default().with_defer_load(false));
        page.fire_script_load();

        assert!(!tracker.is_ready());
        assert!(api.calls().is_empty());
        assert!(capture.contains("tracker initialization failed"));
    }

    #[test]
    fn script_insertion_failure_is_logged() {
        let (page, _api, tracker, capture) = setup("http://example.com/");
        page.reject_scripts(true);
        tracker.track_page("UA-1234-1", PageTrackingOptions::default().with_defer_load(false));

        assert!(page.inserted_scripts().is_empty());
        assert!(capture.contains("could not insert tracking script"));
    }

    #[test]
    fn empty_account_id_is_rejected() {
        let (page, _api, tracker, capture) = setup("http://example.com/");
        tracker.track_page("  ", PageTrackingOptions::default().with_defer_load(false));

        assert!(page.inserted_scripts().is_empty());
        assert!(capture.contains("tracking/invalid-argument"));
    }

    #[test]
    fn second_track_page_is_ignored() {
        let (page, _api, tracker, capture) = setup("http://example.com/");
        let options = PageTrackingOptions::default().with_defer_load(false);
        tracker.track_page("UA-1234-1", options.clone());
        tracker.track_page("UA-1234-1", options);

        assert_eq!(page.inserted_scripts().len(), 1);
        assert_eq!(capture.count(LogLevel::Warn), 1);
    }

    #[test]
    fn event_before_initialization_is_dropped_with_one_log_entry() {
        let (page, api, tracker, capture) = setup("http://example.com/");
        page.install_api(api.clone());

        tracker.track("video", "play", Some("intro"), None);

        assert!(api.calls().is_empty());
        assert_eq!(capture.len(), 1);
        assert!(capture.contains("tracker not initialized"));
    }

    #[test]
    fn events_are_forwarded_verbatim() {
        let (page, api, tracker, _capture) = setup("http://example.com/");
        page.install_api(api.clone());
        tracker.track_page("UA-1234-1", PageTrackingOptions::default().with_defer_load(false));
        page.fire_script_load();

        tracker.track("video", "play", Some("intro"), Some(42));
        tracker.track_event(TrackingEvent::new("form", "submit"));

        assert_eq!(
            api.events(),
            [
                TrackingEvent::new("video", "play").with_label("intro").with_value(42),
                TrackingEvent::new("form", "submit"),
            ]
        );
    }

    #[test]
    fn events_without_category_are_rejected() {
        let (page, api, tracker, capture) = setup("http://example.com/");
        page.install_api(api.clone());
        tracker.track_page("UA-1234-1", PageTrackingOptions::default().with_defer_load(false));
        page.fire_script_load();

        tracker.track("", "play", None, None);

        assert!(api.events().is_empty());
        assert!(capture.contains("event category must not be empty"));
    }

    #[test]
    fn pending_load_and_link_handlers_outlive_the_tracker_handle() {
        let (page, api, tracker, _capture) = setup("http://example.com/");
        page.install_api(api.clone());
        tracker.track_page("UA-1234-1", PageTrackingOptions::default());
        let link = Rc::new(SimulatedLink::new("https://partner.org/offer"));
        let elements = vec![link.clone() as Rc<dyn LinkElement>];
        assert_eq!(tracker.track_links(&elements, LinkTrackingOptions::default()), 1);
        drop(tracker);

        page.fire_window_load();
        assert_eq!(page.inserted_scripts(), ["http://www.google-analytics.com/ga.js"]);
        page.fire_script_load();
        assert_eq!(api.pageviews(), [None::<String>]);

        link.click();
        assert_eq!(
            api.events(),
            [TrackingEvent::new("external", "click").with_label("https://partner.org/offer")]
        );
    }

    #[test]
    fn empty_json_options_defer_until_window_load() {
        let (page, api, tracker, _capture) = setup("http://example.com/");
        page.install_api(api.clone());
        let options = PageTrackingOptions::from_json(&json!({})).unwrap();
        tracker.track_page("UA-1234-1", options);

        assert!(page.inserted_scripts().is_empty());
        page.fire_script_load();
        assert!(!tracker.is_ready());

        page.fire_window_load();
        assert_eq!(page.inserted_scripts(), ["http://www.google-analytics.com/ga.js"]);
        page.fire_script_load();
        assert!(tracker.is_ready());
        assert_eq!(api.pageviews(), [None::<String>]);
    }

    #[test]
    fn error_status_without_query_or_referrer_keeps_empty_parts() {
        let (page, api, tracker, _capture) = setup("http://example.com/missing");
        page.install_api(api.clone());
        tracker.track_page(
            "UA-1234-1",
            PageTrackingOptions::default()
                .with_defer_load(false)
                .with_status_code(404),
        );
        page.fire_script_load();

        assert_eq!(api.pageviews(), [Some("/404.html?page=/missing&from=".to_owned())]);
    }

    #[test]
    fn null_status_code_records_a_normal_page_view() {
        let (page, api, tracker, _capture) = setup("http://example.com/");
        page.install_api(api.clone());
        let options = PageTrackingOptions::from_json(&json!({"status_code": null, "onload": null})).unwrap();
        tracker.track_page("UA-1234-1", options);
        page.fire_window_load();
        page.fire_script_load();

        assert_eq!(api.pageviews(), [None::<String>]);
    }
}
