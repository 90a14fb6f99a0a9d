//! # Push Payload Parsing
//!
//! The pure half of push classification: turns a raw payload into a typed
//! record without looking at storage.
//!
//! ## Payload Shape
//! ```text
//! {
//!   "aps": { "alert": { "title": "…", "body": "…" } },   ← platform part
//!   "psh": {                                              ← SDK part
//!     "campaign_id" | "custom_id": "…",
//!     "type": 1,
//!     "title", "text", "url", "thumbnail_url", "date"
//!   }
//! }
//! ```
//!
//! ## Decision Table
//! | `psh`             | id field            | Result                      |
//! |-------------------|---------------------|-----------------------------|
//! | absent            | -                   | `Other`                     |
//! | not an object     | -                   | `InvalidField("psh")`       |
//! | object            | `campaign_id`       | `Campaign`                  |
//! | object            | `custom_id` only    | `Custom`                    |
//! | object            | neither             | `MissingField`              |

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use url::Url;

use crate::error::PayloadError;
use crate::types::{CampaignRecord, CustomRecord};

/// Untyped key/value payload of a remote push.
pub type PushPayload = Map<String, Value>;

/// Key under which the backend places SDK data.
pub const SDK_PAYLOAD_KEY: &str = "psh";

const CAMPAIGN_ID: &str = "campaign_id";
const CUSTOM_ID: &str = "custom_id";

/// Outcome of parsing a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPush {
    Campaign(CampaignRecord),
    Custom(CustomRecord),
    /// No SDK data; the payload belongs to the host app.
    Other,
}

/// Parses a push payload.
///
/// Deterministic: the same payload always gives the same result.
pub fn parse_push(payload: &PushPayload) -> Result<ParsedPush, PayloadError> {
    let psh = match payload.get(SDK_PAYLOAD_KEY) {
        None | Some(Value::Null) => return Ok(ParsedPush::Other),
        Some(Value::Object(obj)) => obj,
        Some(_) => {
            return Err(PayloadError::invalid(SDK_PAYLOAD_KEY, "expected an object"));
        }
    };

    let alert = Alert::from_payload(payload);

    if let Some(id) = non_empty_string(psh, CAMPAIGN_ID)? {
        let fields = Fields::parse(psh, &alert)?;
        return Ok(ParsedPush::Campaign(CampaignRecord {
            id,
            campaign_type: fields.kind,
            title: fields.title,
            text: fields.text,
            link: fields.link,
            thumbnail_link: fields.thumbnail_link,
            date: fields.date,
            viewed: false,
        }));
    }

    if let Some(id) = non_empty_string(psh, CUSTOM_ID)? {
        let fields = Fields::parse(psh, &alert)?;
        return Ok(ParsedPush::Custom(CustomRecord {
            id,
            custom_type: fields.kind,
            title: fields.title,
            text: fields.text,
            link: fields.link,
            thumbnail_link: fields.thumbnail_link,
            date: fields.date,
        }));
    }

    Err(PayloadError::missing("campaign_id|custom_id"))
}

// =============================================================================
// Field Extraction
// =============================================================================

/// Fields shared by campaign and custom shapes.
struct Fields {
    kind: i64,
    title: String,
    text: String,
    link: Option<String>,
    thumbnail_link: Option<String>,
    date: Option<DateTime<Utc>>,
}

impl Fields {
    fn parse(psh: &Map<String, Value>, alert: &Alert) -> Result<Self, PayloadError> {
        Ok(Fields {
            kind: parse_type(psh)?,
            title: optional_string(psh, "title")?
                .or_else(|| alert.title.clone())
                .unwrap_or_default(),
            text: optional_string(psh, "text")?
                .or_else(|| alert.body.clone())
                .unwrap_or_default(),
            link: optional_url(psh, "url")?,
            thumbnail_link: optional_url(psh, "thumbnail_url")?,
            date: parse_date(psh)?,
        })
    }
}

/// The platform alert, used when the SDK part omits title or text.
#[derive(Default)]
struct Alert {
    title: Option<String>,
    body: Option<String>,
}

impl Alert {
    fn from_payload(payload: &PushPayload) -> Self {
        let alert = payload.get("aps").and_then(|aps| aps.get("alert"));
        match alert {
            Some(Value::String(body)) => Alert {
                title: None,
                body: Some(body.clone()),
            },
            Some(Value::Object(obj)) => Alert {
                title: obj.get("title").and_then(Value::as_str).map(str::to_owned),
                body: obj.get("body").and_then(Value::as_str).map(str::to_owned),
            },
            _ => Alert::default(),
        }
    }
}

fn non_empty_string(obj: &Map<String, Value>, field: &str) -> Result<Option<String>, PayloadError> {
    Ok(optional_string(obj, field)?.filter(|s| !s.is_empty()))
}

fn optional_string(obj: &Map<String, Value>, field: &str) -> Result<Option<String>, PayloadError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        // Ids are sometimes sent as numbers
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(PayloadError::invalid(field, "expected a string")),
    }
}

fn parse_type(obj: &Map<String, Value>) -> Result<i64, PayloadError> {
    match obj.get("type") {
        None | Some(Value::Null) => Err(PayloadError::missing("type")),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| PayloadError::invalid("type", "expected an integer")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| PayloadError::invalid("type", format!("'{s}' is not an integer"))),
        Some(_) => Err(PayloadError::invalid("type", "expected an integer")),
    }
}

fn optional_url(obj: &Map<String, Value>, field: &str) -> Result<Option<String>, PayloadError> {
    let Some(raw) = optional_string(obj, field)?.filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    Url::parse(&raw).map_err(|e| PayloadError::invalid(field, e.to_string()))?;
    Ok(Some(raw))
}

fn parse_date(obj: &Map<String, Value>) -> Result<Option<DateTime<Utc>>, PayloadError> {
    match obj.get("date") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let secs = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| PayloadError::invalid("date", "expected epoch seconds"))?;
            Utc.timestamp_opt(secs, 0)
                .single()
                .map(Some)
                .ok_or_else(|| PayloadError::invalid("date", "timestamp out of range"))
        }
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|e| PayloadError::invalid("date", e.to_string())),
        Some(_) => Err(PayloadError::invalid("date", "expected a number or string")),
    }
}
