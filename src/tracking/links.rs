//! Click tracking for link elements.

use std::rc::{Rc, Weak};

use crate::logger::log_arg;
use crate::platform::{LinkElement, PageLocation};
use crate::tracking::constants::{
    DEFAULT_ACTION, DEFAULT_EVENT_NAME, EXTERNAL_CATEGORY, INTERNAL_CATEGORY, TRACKED_MARKER,
};
use crate::tracking::error::TrackingResult;
use crate::tracking::options::LinkTrackingOptions;
use crate::tracking::{PageTracker, TrackingEvent};

/// Link metadata after merging the options with the defaults for one element.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ResolvedLink {
    category: String,
    action: String,
    label: String,
    value: Option<i64>,
    event_name: String,
    skip_internal: bool,
}

impl ResolvedLink {
    fn resolve(element: &dyn LinkElement, options: &LinkTrackingOptions, location: &PageLocation) -> Self {
        let category = match &options.category {
            Some(category) => category.resolve(element),
            None if is_internal_link(element, location) => INTERNAL_CATEGORY.to_owned(),
            None => EXTERNAL_CATEGORY.to_owned(),
        };
        Self {
            category,
            action: options
                .action
                .as_ref()
                .map_or_else(|| DEFAULT_ACTION.to_owned(), |action| action.resolve(element)),
            label: options
                .label
                .as_ref()
                .map_or_else(|| element.href().unwrap_or_default(), |label| label.resolve(element)),
            value: options.value.as_ref().and_then(|value| value.resolve(element)),
            event_name: options
                .event_name
                .as_ref()
                .map_or_else(|| DEFAULT_EVENT_NAME.to_owned(), |name| name.resolve(element)),
            skip_internal: options.skip_internal.unwrap_or(true),
        }
    }

    fn to_event(&self) -> TrackingEvent {
        TrackingEvent {
            category: self.category.clone(),
            action: self.action.clone(),
            label: (!self.label.is_empty()).then(|| self.label.clone()),
            value: self.value,
        }
    }
}

/// A link is internal when its `href` resolves to the page's own hostname.
fn is_internal_link(element: &dyn LinkElement, location: &PageLocation) -> bool {
    element
        .href()
        .and_then(|href| location.resolve_hostname(&href))
        .is_some_and(|host| host == location.hostname())
}

impl PageTracker {
    /// Binds tracking handlers to `elements` and returns how many were newly bound.
    ///
    /// Elements already carrying the tracked marker are skipped individually, so binding a
    /// superset of a previously bound set only affects the new elements. An element is marked
    /// only once its handler is attached, so a failed bind can be retried.
    pub fn track_links(&self, elements: &[Rc<dyn LinkElement>], options: LinkTrackingOptions) -> usize {
        let mut bound = 0;
        for element in elements {
            if element.has_marker(TRACKED_MARKER) {
                continue;
            }
            match self.bind_link(element, &options) {
                Ok(()) => {
                    element.add_marker(TRACKED_MARKER);
                    bound += 1;
                }
                Err(err) => self.logger().error(format!("link tracking not bound: {err}")),
            }
        }
        bound
    }

    fn bind_link(&self, element: &Rc<dyn LinkElement>, options: &LinkTrackingOptions) -> TrackingResult<()> {
        let location = self.host().location()?;
        let resolved = ResolvedLink::resolve(element.as_ref(), options, &location);
        let event_name = resolved.event_name.clone();

        // The element owns its listeners; a strong reference back to it would never be freed.
        let tracker = self.clone();
        let target: Weak<dyn LinkElement> = Rc::downgrade(element);
        element.add_listener(
            &event_name,
            Box::new(move || {
                if let Some(element) = target.upgrade() {
                    tracker.handle_link_event(element.as_ref(), &resolved);
                }
                true
            }),
        )
    }

    fn handle_link_event(&self, element: &dyn LinkElement, resolved: &ResolvedLink) {
        let internal = match self.host().location() {
            Ok(location) => is_internal_link(element, &location),
            Err(err) => {
                self.logger().error(format!("page location unavailable: {err}"));
                false
            }
        };

        if resolved.skip_internal && internal {
            self.logger()
                .debug_with([log_arg("skipped"), log_arg(element.href())]);
            return;
        }

        let event = resolved.to_event();
        self.track_event(event.clone());
        self.logger().debug_with([
            log_arg("tracked"),
            log_arg(event.category),
            log_arg(event.action),
            log_arg(event.label),
            log_arg(event.value),
        ]);
    }
}
