//! `web-sys` bindings for the real browser page and the `ga.js` global.

use std::rc::Rc;

use js_sys::{Array, Function, Reflect};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, Event, HtmlScriptElement, Window};

use crate::logger::Logger;
use crate::platform::{
    is_script_ready_state, AnalyticsApi, LinkElement, PageHost, PageLocation, ScriptRequest, TrackerClient,
};
use crate::tracking::error::{internal_error, script_load_failed, tracker_unavailable, TrackingResult};
use crate::tracking::{TrackingEvent, TRACKING_LOGGER_NAME};

const GLOBAL_API_NAME: &str = "_gat";

/// The window the crate is running in.
pub struct BrowserPage {
    window: Window,
    logger: Logger,
}

impl BrowserPage {
    pub fn new() -> TrackingResult<Self> {
        Self::with_logger(Logger::new(TRACKING_LOGGER_NAME))
    }

    /// Reports DOM failures that happen outside a tracker call through `logger`, normally the
    /// tracker's own.
    pub fn with_logger(logger: Logger) -> TrackingResult<Self> {
        let window = web_sys::window().ok_or_else(|| internal_error("Window not available"))?;
        Ok(Self { window, logger })
    }

    fn document(&self) -> TrackingResult<Document> {
        self.window
            .document()
            .ok_or_else(|| internal_error("Document not available"))
    }
}

impl PageHost for BrowserPage {
    fn location(&self) -> TrackingResult<PageLocation> {
        let href = self
            .window
            .location()
            .href()
            .map_err(|err| internal_error(format!("Failed to read location: {}", js_error_message(err))))?;
        PageLocation::parse(&href)
    }

    fn referrer(&self) -> String {
        self.document().map(|doc| doc.referrer()).unwrap_or_default()
    }

    fn on_window_load(&self, callback: Box<dyn FnOnce()>) {
        let already_loaded = self
            .document()
            .map(|doc| doc.ready_state() == "complete")
            .unwrap_or(false);
        if already_loaded {
            callback();
            return;
        }

        let listener = Closure::once_into_js(move || callback());
        if let Err(err) = self
            .window
            .add_event_listener_with_callback("load", listener.unchecked_ref())
        {
            self.logger
                .error(format!("Failed to listen for window load: {}", js_error_message(err)));
        }
    }

    fn append_script(&self, request: ScriptRequest) -> TrackingResult<()> {
        let document = self.document()?;
        let script = document
            .create_element("script")
            .map_err(|err| script_load_failed(format!("Failed to create script: {}", js_error_message(err))))?
            .dyn_into::<HtmlScriptElement>()
            .map_err(|_| script_load_failed("Script element has wrong type"))?;
        script.set_type("text/javascript");
        script.set_src(&request.src);

        let load_ready = request.on_ready.clone();
        let onload = Closure::wrap(Box::new(move || load_ready()) as Box<dyn FnMut()>);
        script.set_onload(Some(onload.as_ref().unchecked_ref()));
        onload.forget();

        let state_ready = request.on_ready.clone();
        let state_script = script.clone();
        let onreadystatechange = Closure::wrap(Box::new(move || {
            let state = Reflect::get(&state_script, &JsValue::from_str("readyState"))
                .ok()
                .and_then(|value| value.as_string())
                .unwrap_or_default();
            if is_script_ready_state(&state) {
                state_ready();
            }
        }) as Box<dyn FnMut()>);
        script
            .add_event_listener_with_callback("readystatechange", onreadystatechange.as_ref().unchecked_ref())
            .map_err(|err| {
                script_load_failed(format!("Failed to listen for readystatechange: {}", js_error_message(err)))
            })?;
        onreadystatechange.forget();

        if let Some(head) = document.head() {
            head.append_child(&script)
                .map_err(|err| script_load_failed(format!("Failed to append script to <head>: {}", js_error_message(err))))?;
        } else if let Some(body) = document.body() {
            body.append_child(&script)
                .map_err(|err| script_load_failed(format!("Failed to append script to <body>: {}", js_error_message(err))))?;
        } else {
            return Err(script_load_failed("No <head> or <body> element found"));
        }
        Ok(())
    }

    fn analytics_api(&self) -> Option<Rc<dyn AnalyticsApi>> {
        let value = Reflect::get(&js_sys::global(), &JsValue::from_str(GLOBAL_API_NAME)).ok()?;
        if value.is_null() || value.is_undefined() {
            return None;
        }
        Some(Rc::new(GaJsApi { gat: value }))
    }
}

/// The `_gat` object defined by `ga.js`.
struct GaJsApi {
    gat: JsValue,
}

impl AnalyticsApi for GaJsApi {
    fn create_tracker(&self, account_id: &str) -> TrackingResult<Rc<dyn TrackerClient>> {
        let handle = call_method(&self.gat, "_getTracker", &[JsValue::from_str(account_id)])?;
        if handle.is_null() || handle.is_undefined() {
            return Err(tracker_unavailable(format!("_getTracker returned no tracker for `{account_id}`")));
        }
        Ok(Rc::new(GaJsTracker { handle }))
    }
}

struct GaJsTracker {
    handle: JsValue,
}

impl TrackerClient for GaJsTracker {
    fn track_pageview(&self, path: Option<&str>) -> TrackingResult<()> {
        let args: Vec<JsValue> = path.map(JsValue::from_str).into_iter().collect();
        call_method(&self.handle, "_trackPageview", &args).map(|_| ())
    }

    fn track_event(&self, event: &TrackingEvent) -> TrackingResult<()> {
        let args = [
            JsValue::from_str(&event.category),
            JsValue::from_str(&event.action),
            event
                .label
                .as_deref()
                .map_or(JsValue::UNDEFINED, JsValue::from_str),
            event
                .value
                .map_or(JsValue::UNDEFINED, |value| JsValue::from_f64(value as f64)),
        ];
        call_method(&self.handle, "_trackEvent", &args).map(|_| ())
    }
}

fn call_method(target: &JsValue, name: &str, args: &[JsValue]) -> TrackingResult<JsValue> {
    let method = Reflect::get(target, &JsValue::from_str(name))
        .map_err(|err| tracker_unavailable(format!("Failed to access {name}(): {}", js_error_message(err))))?
        .dyn_into::<Function>()
        .map_err(|_| tracker_unavailable(format!("{name}() is not a function")))?;
    let arguments: Array = args.iter().collect();
    method
        .apply(target, &arguments)
        .map_err(|err| internal_error(format!("{name}() threw: {}", js_error_message(err))))
}

/// A DOM element bound for link tracking, normally an `<a>`.
pub struct BrowserLink {
    element: Element,
    logger: Logger,
}

impl BrowserLink {
    pub fn new(element: Element, logger: Logger) -> Self {
        Self { element, logger }
    }

    /// Every element in the document matching `selector`, reporting through `logger`.
    pub fn select_all(selector: &str, logger: &Logger) -> TrackingResult<Vec<Rc<dyn LinkElement>>> {
        let document = web_sys::window()
            .and_then(|win| win.document())
            .ok_or_else(|| internal_error("Document not available"))?;
        let nodes = document
            .query_selector_all(selector)
            .map_err(|err| internal_error(format!("Invalid selector `{selector}`: {}", js_error_message(err))))?;

        let mut links: Vec<Rc<dyn LinkElement>> = Vec::with_capacity(nodes.length() as usize);
        for index in 0..nodes.length() {
            if let Some(element) = nodes.item(index).and_then(|node| node.dyn_into::<Element>().ok()) {
                links.push(Rc::new(BrowserLink::new(element, logger.clone())));
            }
        }
        Ok(links)
    }
}

impl LinkElement for BrowserLink {
    fn href(&self) -> Option<String> {
        self.element.get_attribute("href")
    }

    fn has_marker(&self, marker: &str) -> bool {
        self.element.class_list().contains(marker)
    }

    fn add_marker(&self, marker: &str) {
        if let Err(err) = self.element.class_list().add_1(marker) {
            self.logger
                .warn(format!("Failed to mark element as tracked: {}", js_error_message(err)));
        }
    }

    fn add_listener(&self, event_name: &str, handler: Box<dyn Fn() -> bool>) -> TrackingResult<()> {
        let listener = Closure::wrap(Box::new(move |event: Event| {
            if !handler() {
                event.prevent_default();
            }
        }) as Box<dyn FnMut(Event)>);
        self.element
            .add_event_listener_with_callback(event_name, listener.as_ref().unchecked_ref())
            .map_err(|err| internal_error(format!("Failed to listen for `{event_name}`: {}", js_error_message(err))))?;
        listener.forget();
        Ok(())
    }
}

fn js_error_message(value: JsValue) -> String {
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        format!("{}", error.message())
    } else if let Some(string) = value.as_string() {
        string
    } else {
        format!("{value:?}")
    }
}
