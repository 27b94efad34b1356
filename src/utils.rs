//! Lenient serde helpers for the XML-derived JSON the Carrier API returns.
//!
//! Leaf values that are numbers on the device frequently arrive as strings
//! (`"72"`), sometimes as real JSON numbers, and single-element lists are
//! collapsed into bare objects.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use std::fmt;

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
    Flag(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => write!(f, "{}", v),
            Scalar::Flag(v) => write!(f, "{}", v),
        }
    }
}

fn scalar_to_f64<E: serde::de::Error>(s: Scalar) -> Result<f64, E> {
    match s {
        Scalar::Int(v) => Ok(v as f64),
        Scalar::Float(v) => Ok(v),
        Scalar::Text(t) => t
            .trim()
            .parse::<f64>()
            .map_err(|_| E::custom(format!("expected a number, got {:?}", t))),
        Scalar::Flag(b) => Err(E::custom(format!("expected a number, got {}", b))),
    }
}

fn scalar_to_i32<E: serde::de::Error>(s: Scalar) -> Result<i32, E> {
    let v = match s {
        Scalar::Int(v) => v,
        other => {
            let f = scalar_to_f64::<E>(other)?;
            if f.fract() != 0.0 {
                return Err(E::custom(format!("expected an integer, got {}", f)));
            }
            f as i64
        }
    };
    i32::try_from(v).map_err(|_| E::custom(format!("integer {} out of range", v)))
}

pub fn lenient_i32<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
    scalar_to_i32(Scalar::deserialize(d)?)
}

pub fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    scalar_to_f64(Scalar::deserialize(d)?)
}

/// `null`, a missing key and `""` all read as `None`.
pub fn lenient_opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    match Option::<Scalar>::deserialize(d)? {
        None => Ok(None),
        Some(Scalar::Text(t)) if t.trim().is_empty() => Ok(None),
        Some(s) => scalar_to_f64(s).map(Some),
    }
}

pub fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Scalar::deserialize(d)?.to_string())
}

/// ISO-8601 with an offset, or without one (read as UTC).
pub fn iso_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_iso_timestamp(&raw).ok_or_else(|| D::Error::custom(format!("invalid ISO-8601 timestamp {:?}", raw)))
}

/// Like [`iso_timestamp`] but keeps the reported offset, so callers can tell
/// which calendar day the device was on.
pub fn opt_local_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<FixedOffset>>, D::Error> {
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(raw) => parse_local_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid ISO-8601 timestamp {:?}", raw))),
    }
}

pub fn parse_iso_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    parse_local_timestamp(raw).map(|ts| ts.with_timezone(&Utc))
}

/// Timestamps without an offset are taken to be UTC.
pub fn parse_local_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

/// A field that is a list when repeated and a bare value when it occurs once.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(v) => vec![v],
        }
    }
}

/// Deserialize with the JSON path of the first mismatch in the error.
pub fn decode_value<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T, (String, String)> {
    serde_path_to_error::deserialize(value).map_err(|e| (e.path().to_string(), e.inner().to_string()))
}

pub fn decode_str<T: DeserializeOwned>(body: &str) -> Result<T, (String, String)> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|e| (e.path().to_string(), e.inner().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(deserialize_with = "lenient_i32")]
        i: i32,
        #[serde(deserialize_with = "lenient_f64")]
        f: f64,
        #[serde(default, deserialize_with = "lenient_opt_f64")]
        o: Option<f64>,
        #[serde(deserialize_with = "lenient_string")]
        s: String,
    }

    #[test]
    fn accepts_strings_and_numbers() {
        let p: Probe = decode_value(&json!({"i": "72", "f": 1.5, "o": "3.25", "s": 4})).unwrap();
        assert_eq!(p.i, 72);
        assert_eq!(p.f, 1.5);
        assert_eq!(p.o, Some(3.25));
        assert_eq!(p.s, "4");

        let p: Probe = decode_value(&json!({"i": 5.0, "f": "-2", "o": null, "s": "off"})).unwrap();
        assert_eq!(p.i, 5);
        assert_eq!(p.f, -2.0);
        assert_eq!(p.o, None);

        let p: Probe = decode_value(&json!({"i": 1, "f": 1, "o": "", "s": "x"})).unwrap();
        assert_eq!(p.o, None);
        let p: Probe = decode_value(&json!({"i": 1, "f": 1, "s": "x"})).unwrap();
        assert_eq!(p.o, None);
    }

    #[test]
    fn reports_path_of_bad_field() {
        let (path, _) = decode_value::<Probe>(&json!({"i": "warm", "f": 1, "s": "x"})).unwrap_err();
        assert_eq!(path, "i");
        let (path, _) = decode_value::<Probe>(&json!({"i": 1.5, "f": 1, "s": "x"})).unwrap_err();
        assert_eq!(path, "i");
    }

    #[test]
    fn parses_timestamps_with_and_without_offset() {
        let expected = Utc.with_ymd_and_hms(2022, 11, 20, 18, 15, 30).unwrap();
        assert_eq!(parse_iso_timestamp("2022-11-20T10:15:30-08:00"), Some(expected));
        assert_eq!(parse_iso_timestamp("2022-11-20T18:15:30Z"), Some(expected));
        assert_eq!(parse_iso_timestamp("2022-11-20T18:15:30"), Some(expected));
        assert_eq!(parse_iso_timestamp("yesterday"), None);
    }

    #[test]
    fn local_timestamp_keeps_offset_and_calendar_day() {
        let ts = parse_local_timestamp("2023-03-01T20:00:00-08:00").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), -8 * 3600);
        assert_eq!(ts.date_naive(), chrono::NaiveDate::from_ymd_opt(2023, 3, 1).unwrap());
        assert_eq!(ts.with_timezone(&Utc).date_naive(), chrono::NaiveDate::from_ymd_opt(2023, 3, 2).unwrap());

        let naive = parse_local_timestamp("2023-03-01T20:00:00").unwrap();
        assert_eq!(naive.offset().local_minus_utc(), 0);
    }

    #[test]
    fn one_or_many_flattens() {
        let one: OneOrMany<u8> = serde_json::from_value(json!(3)).unwrap();
        let many: OneOrMany<u8> = serde_json::from_value(json!([1, 2])).unwrap();
        assert_eq!(one.into_vec(), vec![3]);
        assert_eq!(many.into_vec(), vec![1, 2]);
    }
}
