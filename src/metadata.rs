use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

/// Label used whenever the page does not say which date it rendered.
pub const UNKNOWN_DATE: &str = "Unknown Date";

static SETTINGS_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"script[type="application/json"][data-drupal-selector="drupal-settings-json"]"#,
    )
    .expect("settings selector is valid")
});

/// Networks and dates advertised by the listings page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleMetadata {
    pub networks: Vec<String>,
    pub dates: Vec<String>,
    pub current_date: String,
}

impl ScheduleMetadata {
    pub fn empty() -> Self {
        Self {
            networks: Vec::new(),
            dates: Vec::new(),
            current_date: UNKNOWN_DATE.to_string(),
        }
    }
}

impl Default for ScheduleMetadata {
    fn default() -> Self {
        Self::empty()
    }
}

// The drupalSettings document; everything except `tvListings` is ignored.
#[derive(Debug, Deserialize)]
struct DrupalSettings {
    #[serde(rename = "tvListings")]
    tv_listings: Option<Map<String, Value>>,
}

/// Reads the embedded drupalSettings JSON out of a listings page.
///
/// A missing script, invalid JSON or a document without `tvListings` all
/// produce [`ScheduleMetadata::empty`]. Inside `tvListings` each field is
/// decoded on its own; a missing, null or malformed field takes its default
/// without affecting the others.
pub fn extract_metadata(page_body: &str) -> ScheduleMetadata {
    let Some(raw) = settings_json(page_body) else {
        warn!("Could not find drupalSettings in the page");
        return ScheduleMetadata::empty();
    };

    let settings: DrupalSettings = match serde_json::from_str(raw.trim()) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Failed to parse drupalSettings JSON");
            return ScheduleMetadata::empty();
        }
    };

    let Some(tv) = settings.tv_listings else {
        warn!("drupalSettings has no tvListings entry");
        return ScheduleMetadata::empty();
    };

    let metadata = ScheduleMetadata {
        networks: field(&tv, "networks").unwrap_or_default(),
        dates: field(&tv, "dates").unwrap_or_default(),
        current_date: field(&tv, "currentDate").unwrap_or_else(|| UNKNOWN_DATE.to_string()),
    };

    debug!(
        networks = metadata.networks.len(),
        dates = metadata.dates.len(),
        current_date = metadata.current_date.as_str(),
        "Found listings metadata"
    );

    metadata
}

fn field<T: DeserializeOwned>(tv: &Map<String, Value>, key: &str) -> Option<T> {
    let value = tv.get(key).filter(|v| !v.is_null())?;
    match T::deserialize(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(field = key, error = %e, "Ignoring malformed tvListings field");
            None
        }
    }
}

fn settings_json(page_body: &str) -> Option<String> {
    let document = Html::parse_document(page_body);
    document
        .select(&SETTINGS_SELECTOR)
        .next()
        .map(|script| script.text().collect::<String>())
}
