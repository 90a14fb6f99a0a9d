//! # Metrics
//!
//! Metric entries and the catalog of domain metrics.
//!
//! A metric is a `(type, subtype, value)` triple. The pair `(type, subtype)`
//! is its [`MetricKey`]; on-change deduplication compares values per key.
//!
//! ## Catalog
//! ```text
//! ┌──────────────┬──────────────────────────────┬───────────────────────────┐
//! │ Group        │ Constructors                 │ (type, subtype)           │
//! ├──────────────┼──────────────────────────────┼───────────────────────────┤
//! │ Profile      │ first_name, last_name, ...   │ ("first_name", "")        │
//! │ Contact      │ email, phone                 │ ("email", "")             │
//! │ Place        │ city, country, carrier,      │ ("city", "")              │
//! │              │ location                     │ ("location", "")          │
//! │ Subscription │ subscribe, unsubscribe       │ ("subscription", "")      │
//! │ Social       │ facebook_friends, ...        │ ("facebook", "friends")   │
//! │ Session      │ login, logout, register      │ ("login", "<provider>")   │
//! │ Identity     │ facebook_id, user_id, ...    │ ("id", "facebook")        │
//! │ Commerce     │ cart_products, purchase, ... │ ("cart", "products")      │
//! │ Content      │ content_view                 │ ("content_view", "")      │
//! │ Campaign     │ campaign_viewed, ...         │ ("campaign", "viewed")    │
//! │ Custom       │ custom_bool, custom_date, ...│ (caller's type, subtype)  │
//! └──────────────┴──────────────────────────────┴───────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::notification::NotificationAction;
use crate::types::Product;

// =============================================================================
// Values and Keys
// =============================================================================

/// Value carried by a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "value_type", content = "value", rename_all = "lowercase")]
pub enum MetricValue {
    #[serde(rename = "boolean")]
    Bool(bool),
    String(String),
    Number(f64),
    Date(DateTime<Utc>),
}

impl MetricValue {
    /// Wire name of the value's type.
    pub fn value_type(&self) -> &'static str {
        match self {
            MetricValue::Bool(_) => "boolean",
            MetricValue::String(_) => "string",
            MetricValue::Number(_) => "number",
            MetricValue::Date(_) => "date",
        }
    }

    /// JSON representation sent in a batch. Dates go out as RFC 3339.
    pub fn to_json(&self) -> Value {
        match self {
            MetricValue::Bool(b) => Value::Bool(*b),
            MetricValue::String(s) => Value::String(s.clone()),
            MetricValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            MetricValue::Date(d) => Value::String(d.to_rfc3339()),
        }
    }
}

/// Deduplication key of a metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricKey {
    pub metric_type: String,
    pub subtype: String,
}

/// One metric waiting to be sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub metric_type: String,
    pub subtype: String,
    pub value: MetricValue,
    pub created_at: DateTime<Utc>,
}

impl MetricEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(
        metric_type: impl Into<String>,
        subtype: impl Into<String>,
        value: MetricValue,
    ) -> Self {
        MetricEntry {
            metric_type: metric_type.into(),
            subtype: subtype.into(),
            value,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> MetricKey {
        MetricKey {
            metric_type: self.metric_type.clone(),
            subtype: self.subtype.clone(),
        }
    }

    /// Returns true for location metrics, which the acquisition mode may drop.
    pub fn is_location(&self) -> bool {
        self.metric_type == LOCATION
    }

    /// Wire form inside a metrics batch.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "type": self.metric_type,
            "subtype": self.subtype,
            "value": self.value.to_json(),
            "value_type": self.value.value_type(),
            "created_at": self.created_at.to_rfc3339(),
        })
    }
}

// =============================================================================
// Catalog Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderType {
    Male,
    Female,
}

impl GenderType {
    fn as_str(self) -> &'static str {
        match self {
            GenderType::Male => "male",
            GenderType::Female => "female",
        }
    }
}

/// Identity provider used for login/logout metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginProvider {
    Generic,
    Facebook,
    Google,
    Twitter,
}

impl LoginProvider {
    fn subtype(self) -> &'static str {
        match self {
            LoginProvider::Generic => "",
            LoginProvider::Facebook => "facebook",
            LoginProvider::Google => "google",
            LoginProvider::Twitter => "twitter",
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

const LOCATION: &str = "location";

fn string(metric_type: &str, subtype: &str, value: impl Into<String>) -> MetricEntry {
    MetricEntry::new(metric_type, subtype, MetricValue::String(value.into()))
}

fn products_json(products: &[Product]) -> String {
    Value::Array(products.iter().map(Product::offer).collect()).to_string()
}

impl MetricEntry {
    // -------------------------------------------------------------------------
    // Profile
    // -------------------------------------------------------------------------

    pub fn first_name(name: impl Into<String>) -> Self {
        string("first_name", "", name)
    }

    pub fn last_name(name: impl Into<String>) -> Self {
        string("last_name", "", name)
    }

    pub fn gender(gender: GenderType) -> Self {
        string("gender", "", gender.as_str())
    }

    /// Birthday at midnight UTC.
    pub fn birthday(date: NaiveDate) -> Self {
        let at = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        MetricEntry::new("birthday", "", MetricValue::Date(at))
    }

    pub fn email(email: impl Into<String>) -> Self {
        string("email", "", email)
    }

    pub fn phone(phone: impl Into<String>) -> Self {
        string("phone", "", phone)
    }

    // -------------------------------------------------------------------------
    // Place
    // -------------------------------------------------------------------------

    pub fn carrier(name: impl Into<String>) -> Self {
        string("carrier", "", name)
    }

    pub fn city(city: impl Into<String>) -> Self {
        string("city", "", city)
    }

    pub fn country(country: impl Into<String>) -> Self {
        string("country", "", country)
    }

    /// Device location. Coordinates must be valid degrees; accuracy in meters.
    pub fn location(
        latitude: f64,
        longitude: f64,
        accuracy: f64,
    ) -> Result<Self, ValidationError> {
        check_range("latitude", latitude, -90.0, 90.0)?;
        check_range("longitude", longitude, -180.0, 180.0)?;
        if !accuracy.is_finite() {
            return Err(ValidationError::NotFinite {
                field: "accuracy".into(),
            });
        }
        let value = serde_json::json!({
            "lat": latitude,
            "lon": longitude,
            "accuracy": accuracy,
        });
        Ok(string(LOCATION, "", value.to_string()))
    }

    // -------------------------------------------------------------------------
    // Subscription and Social
    // -------------------------------------------------------------------------

    pub fn subscribe() -> Self {
        MetricEntry::new("subscription", "", MetricValue::Bool(true))
    }

    pub fn unsubscribe() -> Self {
        MetricEntry::new("subscription", "", MetricValue::Bool(false))
    }

    pub fn facebook_friends(count: u32) -> Self {
        MetricEntry::new("facebook", "friends", MetricValue::Number(count as f64))
    }

    pub fn twitter_followers(count: u32) -> Self {
        MetricEntry::new("twitter", "followers", MetricValue::Number(count as f64))
    }

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------

    pub fn login(provider: LoginProvider) -> Self {
        MetricEntry::new("login", provider.subtype(), MetricValue::Bool(true))
    }

    pub fn logout(provider: LoginProvider) -> Self {
        MetricEntry::new("logout", provider.subtype(), MetricValue::Bool(true))
    }

    pub fn register() -> Self {
        MetricEntry::new("register", "", MetricValue::Bool(true))
    }

    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------

    pub fn facebook_id(id: impl Into<String>) -> Self {
        string("id", "facebook", id)
    }

    pub fn twitter_id(id: impl Into<String>) -> Self {
        string("id", "twitter", id)
    }

    pub fn google_id(id: impl Into<String>) -> Self {
        string("id", "google", id)
    }

    pub fn user_id(id: impl Into<String>) -> Self {
        string("id", "user", id)
    }

    // -------------------------------------------------------------------------
    // Commerce
    // -------------------------------------------------------------------------

    pub fn purchase_products(products: &[Product]) -> Self {
        string("purchase", "products", products_json(products))
    }

    /// Number of products currently in the cart.
    pub fn cart_products(count: u32) -> Self {
        MetricEntry::new("cart", "products", MetricValue::Number(count as f64))
    }

    pub fn add_cart_product(product: &Product) -> Self {
        string("cart", "add", product.offer().to_string())
    }

    pub fn delete_cart_product(product: &Product) -> Self {
        string("cart", "delete", product.offer().to_string())
    }

    // -------------------------------------------------------------------------
    // Content and Campaigns
    // -------------------------------------------------------------------------

    pub fn content_view(name: impl Into<String>) -> Self {
        string("content_view", "", name)
    }

    pub fn campaign_viewed(campaign_id: impl Into<String>) -> Self {
        string("campaign", "viewed", campaign_id)
    }

    pub fn campaign_received(campaign_id: impl Into<String>) -> Self {
        string("campaign", "received", campaign_id)
    }

    pub fn campaign_opened(campaign_id: impl Into<String>) -> Self {
        string("campaign", "opened", campaign_id)
    }

    /// User picked `action` on the notification identified by `notification_id`.
    pub fn interaction(action: NotificationAction, notification_id: Option<&str>) -> Self {
        let value = serde_json::json!({
            "action": action.as_str(),
            "notification_id": notification_id,
        });
        string("notification", "interaction", value.to_string())
    }

    // -------------------------------------------------------------------------
    // Custom
    // -------------------------------------------------------------------------

    pub fn custom_bool(
        metric_type: &str,
        subtype: &str,
        value: bool,
    ) -> Result<Self, ValidationError> {
        custom(metric_type, subtype, MetricValue::Bool(value))
    }

    pub fn custom_string(
        metric_type: &str,
        subtype: &str,
        value: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        custom(metric_type, subtype, MetricValue::String(value.into()))
    }

    pub fn custom_number(
        metric_type: &str,
        subtype: &str,
        value: f64,
    ) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite {
                field: "value".into(),
            });
        }
        custom(metric_type, subtype, MetricValue::Number(value))
    }

    pub fn custom_date(
        metric_type: &str,
        subtype: &str,
        value: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        custom(metric_type, subtype, MetricValue::Date(value))
    }
}

fn custom(metric_type: &str, subtype: &str, value: MetricValue) -> Result<MetricEntry, ValidationError> {
    if metric_type.trim().is_empty() {
        return Err(ValidationError::required("metric type"));
    }
    Ok(MetricEntry::new(metric_type, subtype, value))
}

fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite {
            field: field.into(),
        });
    }
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.into(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_keys() {
        let key = MetricEntry::first_name("Ann").key();
        assert_eq!(key.metric_type, "first_name");
        assert_eq!(key.subtype, "");

        assert_eq!(MetricEntry::login(LoginProvider::Google).subtype, "google");
        assert_eq!(MetricEntry::login(LoginProvider::Generic).subtype, "");
        assert_eq!(MetricEntry::twitter_followers(10).value, MetricValue::Number(10.0));
        assert_eq!(MetricEntry::unsubscribe().value, MetricValue::Bool(false));
        assert_eq!(MetricEntry::subscribe().key(), MetricEntry::unsubscribe().key());
    }

    #[test]
    fn test_location_validation() {
        assert!(MetricEntry::location(40.4, -3.7, 12.0).unwrap().is_location());
        assert!(matches!(
            MetricEntry::location(91.0, 0.0, 1.0),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            MetricEntry::location(0.0, f64::NAN, 1.0),
            Err(ValidationError::NotFinite { .. })
        ));
    }

    #[test]
    fn test_custom_requires_type() {
        assert!(MetricEntry::custom_bool("", "x", true).is_err());
        assert!(MetricEntry::custom_number("score", "", f64::INFINITY).is_err());
        let entry = MetricEntry::custom_string("level", "world", "3").unwrap();
        assert_eq!(entry.value.value_type(), "string");
    }

    #[test]
    fn test_birthday_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(1990, 4, 12).unwrap();
        let MetricValue::Date(at) = MetricEntry::birthday(date).value else {
            panic!("birthday must be a date metric");
        };
        assert_eq!(at.to_rfc3339(), "1990-04-12T00:00:00+00:00");
    }

    #[test]
    fn test_cart_products_counts_items() {
        let entry = MetricEntry::cart_products(3);
        assert_eq!(entry.metric_type, "cart");
        assert_eq!(entry.subtype, "products");
        assert_eq!(entry.value, MetricValue::Number(3.0));
        assert_eq!(entry.to_wire()["value_type"], "number");
    }

    #[test]
    fn test_purchase_products_serializes_offers() {
        let products = [
            Product::new("Mug", "m-1", 9.5, "EUR"),
            Product::new("Tee", "t-1", 19.0, "EUR"),
        ];
        let MetricValue::String(json) = MetricEntry::purchase_products(&products).value else {
            panic!("purchase metric must be a string");
        };
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
        assert_eq!(parsed[1]["id"], "t-1");
    }

    #[test]
    fn test_wire_form() {
        let wire = MetricEntry::subscribe().to_wire();
        assert_eq!(wire["type"], "subscription");
        assert_eq!(wire["value"], true);
        assert_eq!(wire["value_type"], "boolean");
        assert!(wire["created_at"].is_string());
    }

    #[test]
    fn test_interaction_metric() {
        let entry = MetricEntry::interaction(NotificationAction::Buy, Some("c-1"));
        let MetricValue::String(json) = &entry.value else {
            panic!("interaction must be a string metric");
        };
        assert!(json.contains("BUY"));
        assert_eq!(entry.key().subtype, "interaction");
    }
}
