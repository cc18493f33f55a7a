//! Decoding helpers for the router's REST representation.
//!
//! The router encodes every scalar as a JSON string (`"true"`, `"2"`, `"10.00"`),
//! but some firmware versions emit native JSON numbers and booleans. These helpers
//! accept both so the typed records never see the difference.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, de::Error};

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Timestamp layouts observed on the router, tried in order.
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%b/%d/%Y %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub fn bool_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::Bool(b) => Ok(b),
        Scalar::Int(i) => Ok(i != 0),
        Scalar::Float(f) => Ok(f != 0.0),
        Scalar::Str(s) => match s.trim() {
            "true" | "yes" => Ok(true),
            "false" | "no" | "" => Ok(false),
            other => Err(D::Error::custom(format!("invalid boolean flag '{other}'"))),
        },
    }
}

pub fn counter<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Scalar::deserialize(deserializer)? {
        Scalar::Int(i) => i,
        Scalar::Float(f) if f.fract() == 0.0 => f as i64,
        Scalar::Str(s) if s.trim().is_empty() => 0,
        Scalar::Str(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| D::Error::custom(format!("invalid counter '{s}': {e}")))?,
        _ => return Err(D::Error::custom("counter must be an integer")),
    };
    if value < 0 {
        return Err(D::Error::custom(format!("counter must be non-negative, got {value}")));
    }
    Ok(value)
}

/// `shared-users` is at least one on the router; anything lower is clamped.
pub fn shared_users<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = counter(deserializer)?;
    Ok(value.clamp(1, i32::MAX as i64) as i32)
}

pub fn default_shared_users() -> i32 {
    1
}

pub fn decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Scalar::deserialize(deserializer)? {
        Scalar::Int(i) => Decimal::from(i),
        Scalar::Float(f) => {
            Decimal::try_from(f).map_err(|e| D::Error::custom(format!("invalid decimal {f}: {e}")))?
        }
        Scalar::Str(s) if s.trim().is_empty() => Decimal::ZERO,
        Scalar::Str(s) => Decimal::from_str(s.trim())
            .map_err(|e| D::Error::custom(format!("invalid decimal '{s}': {e}")))?,
        Scalar::Bool(_) => return Err(D::Error::custom("decimal expected, found boolean")),
    };
    if value.is_sign_negative() && !value.is_zero() {
        return Err(D::Error::custom(format!("price must be non-negative, got {value}")));
    }
    Ok(value)
}

pub fn default_price() -> Decimal {
    Decimal::new(0, 2)
}

pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("unlimited") => Ok(None),
        Some(s) => parse_timestamp(s)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("unrecognised timestamp '{s}'"))),
    }
}

/// Parses a router timestamp. Naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Renders a timestamp the way the router expects it in request bodies.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "bool_flag")]
        flag: bool,
        #[serde(default, deserialize_with = "counter")]
        bytes: i64,
        #[serde(default = "default_shared_users", deserialize_with = "shared_users")]
        seats: i32,
        #[serde(default = "default_price", deserialize_with = "decimal")]
        price: Decimal,
        #[serde(default, deserialize_with = "timestamp")]
        at: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_string_encoded_scalars() {
        let sample: Sample = serde_json::from_value(json!({
            "flag": "true",
            "bytes": "1048576",
            "seats": "3",
            "price": "12.50",
            "at": "2024-03-01 08:30:00"
        }))
        .unwrap();

        assert!(sample.flag);
        assert_eq!(sample.bytes, 1_048_576);
        assert_eq!(sample.seats, 3);
        assert_eq!(sample.price, Decimal::new(1250, 2));
        assert_eq!(sample.at, Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()));
    }

    #[test]
    fn test_native_scalars_and_defaults() {
        let sample: Sample = serde_json::from_value(json!({ "flag": false, "bytes": 42 })).unwrap();
        assert!(!sample.flag);
        assert_eq!(sample.bytes, 42);
        assert_eq!(sample.seats, 1);
        assert_eq!(sample.price, Decimal::ZERO);
        assert_eq!(sample.at, None);
    }

    #[test]
    fn test_shared_users_clamped_to_one() {
        let sample: Sample = serde_json::from_value(json!({ "seats": "0" })).unwrap();
        assert_eq!(sample.seats, 1);
    }

    #[test]
    fn test_unlimited_end_time_is_none() {
        let sample: Sample = serde_json::from_value(json!({ "at": "unlimited" })).unwrap();
        assert_eq!(sample.at, None);
    }

    #[test]
    fn test_routeros_month_format() {
        let parsed = parse_timestamp("jan/02/2024 10:00:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_rejects_negative_counter_and_bad_flag() {
        assert!(serde_json::from_value::<Sample>(json!({ "bytes": "-5" })).is_err());
        assert!(serde_json::from_value::<Sample>(json!({ "flag": "maybe" })).is_err());
        assert!(serde_json::from_value::<Sample>(json!({ "at": "yesterday" })).is_err());
    }
}
