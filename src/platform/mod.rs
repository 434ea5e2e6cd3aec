//! Host page abstractions.
//!
//! The tracking layer never touches the DOM directly. It talks to a [`PageHost`] for location,
//! load timing and script insertion, to an [`AnalyticsApi`] for the global exposed by the remote
//! script, and to [`LinkElement`]s for click binding. `memory` provides a simulated page usable
//! on every target, `browser` binds the real window through `web-sys`.

use std::fmt;
use std::rc::Rc;

use url::Url;

use crate::tracking::error::{invalid_argument, TrackingResult};
use crate::tracking::TrackingEvent;

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub mod browser;
pub mod memory;

/// Parsed `window.location` of the page being tracked.
#[derive(Clone, PartialEq, Eq)]
pub struct PageLocation {
    url: Url,
}

impl PageLocation {
    pub fn parse(href: &str) -> TrackingResult<Self> {
        let url = Url::parse(href).map_err(|err| invalid_argument(format!("invalid page URL `{href}`: {err}")))?;
        Ok(Self { url })
    }

    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    /// Scheme followed by a colon, as `location.protocol` reports it.
    pub fn protocol(&self) -> String {
        format!("{}:", self.url.scheme())
    }

    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or("")
    }

    pub fn pathname(&self) -> &str {
        self.url.path()
    }

    /// Query string including the leading `?`, or empty.
    pub fn search(&self) -> String {
        match self.url.query() {
            Some(query) if !query.is_empty() => format!("?{query}"),
            _ => String::new(),
        }
    }

    /// Resolves `href` against this page and returns the resulting hostname.
    pub fn resolve_hostname(&self, href: &str) -> Option<String> {
        let resolved = self.url.join(href).ok()?;
        resolved.host_str().map(str::to_owned)
    }
}

impl fmt::Debug for PageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PageLocation").field(&self.url.as_str()).finish()
    }
}

/// Script insertion request handed to the host.
///
/// `on_ready` may be invoked by the host any number of times, from any of the load signals it
/// observes. Callers guard it themselves.
#[derive(Clone)]
pub struct ScriptRequest {
    pub src: String,
    pub on_ready: Rc<dyn Fn()>,
}

impl ScriptRequest {
    pub fn new(src: impl Into<String>, on_ready: Rc<dyn Fn()>) -> Self {
        Self {
            src: src.into(),
            on_ready,
        }
    }
}

impl fmt::Debug for ScriptRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRequest").field("src", &self.src).finish()
    }
}

/// Returns `true` for the `readyState` values that mean a script finished loading.
pub fn is_script_ready_state(state: &str) -> bool {
    matches!(state, "loaded" | "complete")
}

pub trait PageHost {
    fn location(&self) -> TrackingResult<PageLocation>;

    fn referrer(&self) -> String;

    /// Runs `callback` once the window `load` event fired, immediately if it already has.
    fn on_window_load(&self, callback: Box<dyn FnOnce()>);

    fn append_script(&self, request: ScriptRequest) -> TrackingResult<()>;

    /// The global analytics API, once the remote script defined it.
    fn analytics_api(&self) -> Option<Rc<dyn AnalyticsApi>>;
}

/// Global factory exposed by the remote tracking script.
pub trait AnalyticsApi {
    fn create_tracker(&self, account_id: &str) -> TrackingResult<Rc<dyn TrackerClient>>;
}

/// Tracker handle returned by [`AnalyticsApi::create_tracker`].
pub trait TrackerClient {
    /// Records a page view, for the current page or for `path` when given.
    fn track_pageview(&self, path: Option<&str>) -> TrackingResult<()>;

    fn track_event(&self, event: &TrackingEvent) -> TrackingResult<()>;
}

pub trait LinkElement {
    /// Raw `href` attribute.
    fn href(&self) -> Option<String>;

    fn has_marker(&self, marker: &str) -> bool;

    fn add_marker(&self, marker: &str);

    /// Attaches `handler` to `event_name`. A `false` return from the handler cancels the
    /// default action.
    fn add_listener(&self, event_name: &str, handler: Box<dyn Fn() -> bool>) -> TrackingResult<()>;
}
