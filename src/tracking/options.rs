use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::platform::LinkElement;
use crate::tracking::error::{invalid_argument, TrackingResult};

/// Options accepted by [`PageTracker::track_page`](crate::tracking::PageTracker::track_page).
///
/// Deserializes from the JSON options mapping (`onload`, `status_code`, `script_url`); missing
/// or `null` keys keep their defaults and unknown keys are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageTrackingOptions {
    /// Wait for the window `load` event before inserting the script.
    #[serde(rename = "onload", deserialize_with = "null_as_true")]
    pub defer_load: bool,
    /// HTTP status of the page. `None` and 200 record a normal page view, anything else an
    /// error page view.
    pub status_code: Option<u16>,
    /// Replaces the protocol-selected `ga.js` URL.
    pub script_url: Option<String>,
}

impl Default for PageTrackingOptions {
    fn default() -> Self {
        Self {
            defer_load: true,
            status_code: None,
            script_url: None,
        }
    }
}

impl PageTrackingOptions {
    pub fn from_json(value: &Value) -> TrackingResult<Self> {
        Self::deserialize(value).map_err(|err| invalid_argument(format!("invalid page tracking options: {err}")))
    }

    pub fn with_defer_load(mut self, defer_load: bool) -> Self {
        self.defer_load = defer_load;
        self
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_script_url(mut self, script_url: impl Into<String>) -> Self {
        self.script_url = Some(script_url.into());
        self
    }
}

fn null_as_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

/// A link metadata field: either a fixed value or a function of the element being bound.
pub enum MetaValue<T> {
    Literal(T),
    Computed(Rc<dyn Fn(&dyn LinkElement) -> T>),
}

impl<T: Clone> MetaValue<T> {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&dyn LinkElement) -> T + 'static,
    {
        MetaValue::Computed(Rc::new(f))
    }

    pub fn resolve(&self, element: &dyn LinkElement) -> T {
        match self {
            MetaValue::Literal(value) => value.clone(),
            MetaValue::Computed(f) => f(element),
        }
    }
}

impl<T: Clone> Clone for MetaValue<T> {
    fn clone(&self) -> Self {
        match self {
            MetaValue::Literal(value) => MetaValue::Literal(value.clone()),
            MetaValue::Computed(f) => MetaValue::Computed(f.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for MetaValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            MetaValue::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

impl From<&str> for MetaValue<String> {
    fn from(value: &str) -> Self {
        MetaValue::Literal(value.to_owned())
    }
}

impl From<String> for MetaValue<String> {
    fn from(value: String) -> Self {
        MetaValue::Literal(value)
    }
}

impl From<i64> for MetaValue<Option<i64>> {
    fn from(value: i64) -> Self {
        MetaValue::Literal(Some(value))
    }
}

/// Options accepted by [`PageTracker::track_links`](crate::tracking::PageTracker::track_links).
///
/// Unset fields fall back to the defaults when an element is bound: category `internal` or
/// `external` by origin, action `click`, label the element `href`, no value, internal links
/// skipped, and the `click` event.
#[derive(Clone, Debug, Default)]
pub struct LinkTrackingOptions {
    pub category: Option<MetaValue<String>>,
    pub action: Option<MetaValue<String>>,
    pub label: Option<MetaValue<String>>,
    pub value: Option<MetaValue<Option<i64>>>,
    pub skip_internal: Option<bool>,
    pub event_name: Option<MetaValue<String>>,
}

#[derive(Deserialize)]
struct LiteralLinkOptions {
    category: Option<String>,
    action: Option<String>,
    label: Option<String>,
    value: Option<i64>,
    skip_internal: Option<bool>,
    event_name: Option<String>,
}

impl LinkTrackingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from a JSON mapping of literal values.
    pub fn from_json(value: &Value) -> TrackingResult<Self> {
        let literal = LiteralLinkOptions::deserialize(value)
            .map_err(|err| invalid_argument(format!("invalid link tracking options: {err}")))?;
        Ok(Self {
            category: literal.category.map(MetaValue::Literal),
            action: literal.action.map(MetaValue::Literal),
            label: literal.label.map(MetaValue::Literal),
            value: literal.value.map(|v| MetaValue::Literal(Some(v))),
            skip_internal: literal.skip_internal,
            event_name: literal.event_name.map(MetaValue::Literal),
        })
    }

    pub fn with_category(mut self, category: impl Into<MetaValue<String>>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<MetaValue<String>>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<MetaValue<String>>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<MetaValue<Option<i64>>>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_skip_internal(mut self, skip_internal: bool) -> Self {
        self.skip_internal = Some(skip_internal);
        self
    }

    pub fn with_event_name(mut self, event_name: impl Into<MetaValue<String>>) -> Self {
        self.event_name = Some(event_name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::SimulatedLink;
    use serde_json::json;

    #[test]
    fn page_options_default_when_mapping_is_empty() {
        let options = PageTrackingOptions::from_json(&json!({})).unwrap();
        assert_eq!(options, PageTrackingOptions::default());
        assert!(options.defer_load);
        assert_eq!(options.status_code, None);
    }

    #[test]
    fn page_options_read_recognized_keys() {
        let options = PageTrackingOptions::from_json(&json!({
            "onload": false,
            "status_code": 404,
            "unrelated": "ignored"
        }))
        .unwrap();
        assert!(!options.defer_load);
        assert_eq!(options.status_code, Some(404));
        assert_eq!(options.script_url, None);
    }

    #[test]
    fn page_options_treat_null_as_unset() {
        let options = PageTrackingOptions::from_json(&json!({
            "onload": null,
            "status_code": null,
            "script_url": null
        }))
        .unwrap();
        assert_eq!(options, PageTrackingOptions::default());
    }

    #[test]
    fn page_options_reject_mistyped_values() {
        let err = PageTrackingOptions::from_json(&json!({"status_code": "five hundred"})).unwrap_err();
        assert_eq!(err.code_str(), "tracking/invalid-argument");
    }

    #[test]
    fn link_options_from_json_are_literals() {
        let options = LinkTrackingOptions::from_json(&json!({
            "category": "downloads",
            "value": 3,
            "skip_internal": false
        }))
        .unwrap();
        let link = SimulatedLink::new("/files/report.pdf");

        assert_eq!(options.category.unwrap().resolve(&link), "downloads");
        assert_eq!(options.value.unwrap().resolve(&link), Some(3));
        assert_eq!(options.skip_internal, Some(false));
        assert!(options.action.is_none());
        assert!(options.event_name.is_none());
    }

    #[test]
    fn computed_values_see_the_element() {
        let label = MetaValue::computed(|element: &dyn LinkElement| {
            format!("link:{}", element.href().unwrap_or_default())
        });
        let link = SimulatedLink::new("https://partner.org/");
        assert_eq!(label.resolve(&link), "link:https://partner.org/");
        assert_eq!(format!("{:?}", label), "Computed(<fn>)");
    }
}
