//! In-memory page, link and analytics API.
//!
//! Nothing here touches a real browser. Load events, script readiness and clicks are driven
//! explicitly by the caller, which makes the tracking flow usable in native builds and tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use crate::platform::{
    is_script_ready_state, AnalyticsApi, LinkElement, PageHost, PageLocation, ScriptRequest, TrackerClient,
};
use crate::tracking::error::{internal_error, script_load_failed, TrackingResult};
use crate::tracking::TrackingEvent;

pub struct SimulatedPage {
    location: RefCell<PageLocation>,
    referrer: RefCell<String>,
    loaded: Cell<bool>,
    load_callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
    scripts: RefCell<Vec<ScriptRequest>>,
    api: RefCell<Option<Rc<dyn AnalyticsApi>>>,
    reject_scripts: Cell<bool>,
}

impl SimulatedPage {
    pub fn new(href: &str) -> TrackingResult<Self> {
        Ok(Self {
            location: RefCell::new(PageLocation::parse(href)?),
            referrer: RefCell::new(String::new()),
            loaded: Cell::new(false),
            load_callbacks: RefCell::new(Vec::new()),
            scripts: RefCell::new(Vec::new()),
            api: RefCell::new(None),
            reject_scripts: Cell::new(false),
        })
    }

    pub fn set_referrer(&self, referrer: impl Into<String>) {
        *self.referrer.borrow_mut() = referrer.into();
    }

    pub fn navigate(&self, href: &str) -> TrackingResult<()> {
        *self.location.borrow_mut() = PageLocation::parse(href)?;
        Ok(())
    }

    /// Makes the analytics global available, as the remote script would once evaluated.
    pub fn install_api(&self, api: Rc<dyn AnalyticsApi>) {
        *self.api.borrow_mut() = Some(api);
    }

    /// Makes subsequent script insertions fail.
    pub fn reject_scripts(&self, reject: bool) {
        self.reject_scripts.set(reject);
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get()
    }

    /// Fires the window `load` event, running every pending callback once.
    pub fn fire_window_load(&self) {
        self.loaded.set(true);
        let callbacks = std::mem::take(&mut *self.load_callbacks.borrow_mut());
        for callback in callbacks {
            callback();
        }
    }

    pub fn inserted_scripts(&self) -> Vec<String> {
        self.scripts.borrow().iter().map(|script| script.src.clone()).collect()
    }

    /// Fires the `load` event of every inserted script.
    pub fn fire_script_load(&self) {
        for on_ready in self.ready_callbacks() {
            on_ready();
        }
    }

    /// Reports a `readystatechange` on every inserted script. Only the finished states signal
    /// readiness.
    pub fn fire_script_ready_state(&self, state: &str) {
        if !is_script_ready_state(state) {
            return;
        }
        for on_ready in self.ready_callbacks() {
            on_ready();
        }
    }

    fn ready_callbacks(&self) -> Vec<Rc<dyn Fn()>> {
        self.scripts
            .borrow()
            .iter()
            .map(|script| script.on_ready.clone())
            .collect()
    }
}

impl PageHost for SimulatedPage {
    fn location(&self) -> TrackingResult<PageLocation> {
        Ok(self.location.borrow().clone())
    }

    fn referrer(&self) -> String {
        self.referrer.borrow().clone()
    }

    fn on_window_load(&self, callback: Box<dyn FnOnce()>) {
        if self.loaded.get() {
            callback();
        } else {
            self.load_callbacks.borrow_mut().push(callback);
        }
    }

    fn append_script(&self, request: ScriptRequest) -> TrackingResult<()> {
        if self.reject_scripts.get() {
            return Err(script_load_failed(format!("page refused script `{}`", request.src)));
        }
        self.scripts.borrow_mut().push(request);
        Ok(())
    }

    fn analytics_api(&self) -> Option<Rc<dyn AnalyticsApi>> {
        self.api.borrow().clone()
    }
}

/// Call made against a [`RecordingAnalyticsApi`] or one of its trackers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedCall {
    CreateTracker(String),
    Pageview(Option<String>),
    Event(TrackingEvent),
}

/// Analytics API double that records every call in order.
#[derive(Default)]
pub struct RecordingAnalyticsApi {
    calls: Rc<RefCell<Vec<RecordedCall>>>,
    fail_create: Cell<bool>,
}

impl RecordingAnalyticsApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create_tracker` fail, as when the remote script throws.
    pub fn fail_tracker_creation(&self, fail: bool) {
        self.fail_create.set(fail);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn events(&self) -> Vec<TrackingEvent> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Event(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn pageviews(&self) -> Vec<Option<String>> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Pageview(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }
}

impl AnalyticsApi for RecordingAnalyticsApi {
    fn create_tracker(&self, account_id: &str) -> TrackingResult<Rc<dyn TrackerClient>> {
        if self.fail_create.get() {
            return Err(internal_error(format!("_getTracker threw for account `{account_id}`")));
        }
        self.calls
            .borrow_mut()
            .push(RecordedCall::CreateTracker(account_id.to_owned()));
        Ok(Rc::new(RecordingTracker {
            calls: self.calls.clone(),
        }))
    }
}

struct RecordingTracker {
    calls: Rc<RefCell<Vec<RecordedCall>>>,
}

impl TrackerClient for RecordingTracker {
    fn track_pageview(&self, path: Option<&str>) -> TrackingResult<()> {
        self.calls
            .borrow_mut()
            .push(RecordedCall::Pageview(path.map(str::to_owned)));
        Ok(())
    }

    fn track_event(&self, event: &TrackingEvent) -> TrackingResult<()> {
        self.calls.borrow_mut().push(RecordedCall::Event(event.clone()));
        Ok(())
    }
}

type Listener = (String, Rc<dyn Fn() -> bool>);

/// Anchor-like element with class markers and listeners.
pub struct SimulatedLink {
    href: Option<String>,
    markers: RefCell<BTreeSet<String>>,
    listeners: RefCell<Vec<Listener>>,
}

impl SimulatedLink {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            markers: RefCell::new(BTreeSet::new()),
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn without_href() -> Self {
        Self {
            href: None,
            markers: RefCell::new(BTreeSet::new()),
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(name, _)| name == event_name)
            .count()
    }

    /// Dispatches `event_name` and reports whether the default action may proceed.
    pub fn dispatch(&self, event_name: &str) -> bool {
        let handlers: Vec<_> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(name, _)| name == event_name)
            .map(|(_, handler)| handler.clone())
            .collect();
        handlers.iter().fold(true, |proceed, handler| handler() && proceed)
    }

    pub fn click(&self) -> bool {
        self.dispatch("click")
    }
}

impl LinkElement for SimulatedLink {
    fn href(&self) -> Option<String> {
        self.href.clone()
    }

    fn has_marker(&self, marker: &str) -> bool {
        self.markers.borrow().contains(marker)
    }

    fn add_marker(&self, marker: &str) {
        self.markers.borrow_mut().insert(marker.to_owned());
    }

    fn add_listener(&self, event_name: &str, handler: Box<dyn Fn() -> bool>) -> TrackingResult<()> {
        self.listeners
            .borrow_mut()
            .push((event_name.to_owned(), Rc::from(handler)));
        Ok(())
    }
}
