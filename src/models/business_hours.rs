use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// The campaign's business-information blob. Only the scheduling keys are
/// typed; everything else is kept verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BusinessInformation {
    #[serde(default, alias = "time_zone")]
    pub timezone: Option<String>,
    #[serde(default, alias = "hours", alias = "operating_hours", deserialize_with = "lenient_hours")]
    pub business_hours: Option<BusinessHours>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Declared open hours, either per weekday or as one weekday range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BusinessHours {
    Generalized(GeneralizedHours),
    Weekly(BTreeMap<String, DayHours>),
}

/// Open/close times as "HH:MM" (or "HH:MM:SS") local time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DayHours {
    #[serde(default)]
    pub open: Option<String>,
    #[serde(default)]
    pub close: Option<String>,
    #[serde(default)]
    pub closed: bool,
}

/// e.g. monday..friday 09:00-17:00. The range may wrap past sunday.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralizedHours {
    pub start_day: String,
    pub end_day: String,
    pub open: String,
    pub close: String,
}

/// Unrecognised hours configurations are treated as absent (closed).
fn lenient_hours<'de, D>(deserializer: D) -> Result<Option<BusinessHours>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    if raw.is_null() {
        return Ok(None);
    }
    match serde_json::from_value::<BusinessHours>(raw.clone()) {
        Ok(hours) => Ok(Some(hours)),
        Err(e) => {
            tracing::warn!(hours = %raw, "Unrecognised business hours, treating as closed: {}", e);
            Ok(None)
        }
    }
}
