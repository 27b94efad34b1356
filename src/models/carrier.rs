//! Typed views over the Carrier Infinity/Evolution API responses.
//!
//! Only the parts the client acts on are typed; everything else stays
//! `serde_json::Value` and is passed through untouched.

use crate::utils::{
    OneOrMany, decode_value, iso_timestamp, lenient_f64, lenient_i32, lenient_opt_f64, lenient_string,
    opt_local_timestamp,
};
use chrono::{DateTime, Datelike, FixedOffset, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// =====================
// Authentication
// =====================

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub result: AuthResult,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    pub access_token: String,
}

// =====================
// Links
// =====================

/// `{"$": {"href": "...", "rel": "self"}}`, as produced by the XML->JSON layer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AtomLink {
    #[serde(rename = "$")]
    pub attrs: AtomLinkAttrs,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AtomLinkAttrs {
    pub href: String,
    #[serde(default)]
    pub rel: Option<String>,
}

pub const SELF_LINK_KEY: &str = "atom:link";

#[derive(Debug, Clone, Deserialize)]
pub struct LocationsEnvelope {
    pub locations: LocationsBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationsBody {
    #[serde(default)]
    pub location: Option<OneOrMany<Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemsBody {
    #[serde(default)]
    pub system: Option<OneOrMany<Value>>,
}

// =====================
// System sub-resources
// =====================

/// Sub-resources of `systems/{serial}/{item}`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SystemItem {
    Status,
    Profile,
    Config,
    Energy,
    Dealer,
    OduConfig,
    OduStatus,
    OduFaults,
    IduConfig,
    IduStatus,
    IduFaults,
    History,
    EquipmentEvents,
    RootCause,
    UtilityEvents,
}

impl SystemItem {
    pub const ALL: [SystemItem; 15] = [
        SystemItem::Status,
        SystemItem::Profile,
        SystemItem::Config,
        SystemItem::Energy,
        SystemItem::Dealer,
        SystemItem::OduConfig,
        SystemItem::OduStatus,
        SystemItem::OduFaults,
        SystemItem::IduConfig,
        SystemItem::IduStatus,
        SystemItem::IduFaults,
        SystemItem::History,
        SystemItem::EquipmentEvents,
        SystemItem::RootCause,
        SystemItem::UtilityEvents,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SystemItem::Status => "status",
            SystemItem::Profile => "profile",
            SystemItem::Config => "config",
            SystemItem::Energy => "energy",
            SystemItem::Dealer => "dealer",
            SystemItem::OduConfig => "odu_config",
            SystemItem::OduStatus => "odu_status",
            SystemItem::OduFaults => "odu_faults",
            SystemItem::IduConfig => "idu_config",
            SystemItem::IduStatus => "idu_status",
            SystemItem::IduFaults => "idu_faults",
            SystemItem::History => "history",
            SystemItem::EquipmentEvents => "equipment_events",
            SystemItem::RootCause => "root_cause",
            SystemItem::UtilityEvents => "utility_events",
        }
    }

    /// The vendor answers `status` with an error; callers should expect it.
    pub fn is_known_broken(self) -> bool {
        matches!(self, SystemItem::Status)
    }
}

impl fmt::Display for SystemItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemItem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SystemItem::ALL
            .into_iter()
            .find(|item| item.as_str() == s)
            .ok_or_else(|| format!("unknown system item: {}", s))
    }
}

// =====================
// Outdoor unit status
// =====================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValueWithUnit {
    #[serde(rename = "$")]
    pub attrs: UnitAttrs,
    #[serde(rename = "_", deserialize_with = "lenient_i32")]
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UnitAttrs {
    #[serde(deserialize_with = "lenient_string")]
    pub unit: String,
}

/// One `odu_status` reading. Field names follow the wire format.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OduStatus {
    #[serde(deserialize_with = "iso_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(deserialize_with = "lenient_string")]
    pub odutype: String,
    #[serde(deserialize_with = "lenient_i32")]
    pub opstat: i32,
    #[serde(deserialize_with = "lenient_string")]
    pub opmode: String,
    #[serde(deserialize_with = "lenient_i32")]
    pub iducfm: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub lat: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub oat: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub oducoiltmp: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub blwrpm: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub linevolt: i32,
    #[serde(deserialize_with = "lenient_string")]
    pub lockactive: String,
    #[serde(deserialize_with = "lenient_i32")]
    pub locktime: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub comprpm: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub suctpress: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub sucttemp: i32,
    #[serde(deserialize_with = "lenient_f64")]
    pub suctsupheat: f64,
    #[serde(deserialize_with = "lenient_i32")]
    pub dischargetmp: i32,
    #[serde(deserialize_with = "lenient_string")]
    pub sparesensorstatus: String,
    #[serde(deserialize_with = "lenient_i32")]
    pub sparesensorvalue: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub exvpos: i32,
    #[serde(deserialize_with = "lenient_string")]
    pub curtail: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub statpress: f64,
    #[serde(deserialize_with = "lenient_i32")]
    pub enterreftmp: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub availminheatstage: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub availmaxheatstage: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub availmincoolstage: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub availmaxcoolstage: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub opminheatstage: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub opmaxheatstage: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub opmincoolstage: i32,
    #[serde(deserialize_with = "lenient_i32")]
    pub opmaxcoolstage: i32,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub aclinecurrent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub dcbusvoltage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub dischargepressure: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub dischargesuperheat: Option<f64>,
    pub exvposvi: ValueWithUnit,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub ipmtemperature: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub lowambientcooling: String,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub pfcmtemperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub outdoorfanrpm: Option<f64>,
}

impl OduStatus {
    /// Decode a `systems/{serial}/odu_status` payload, with or without its
    /// `odu_status` envelope.
    pub fn from_payload(payload: &Value) -> Result<Self, (String, String)> {
        decode_value(unwrap_envelope(payload, "odu_status"))
    }
}

// =====================
// Energy usage
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Day,
    Month,
    Year,
}

impl PeriodType {
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::Day => "day",
            PeriodType::Month => "month",
            PeriodType::Year => "year",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar period an energy figure belongs to. `month`/`day` are 0 when the
/// period is coarser than that.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodKey {
    pub period_type: PeriodType,
    pub year: i32,
    pub month: i32,
    pub day: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnergyReport {
    /// As reported, in the device's own offset.
    #[serde(default, deserialize_with = "opt_local_timestamp")]
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub usage: EnergyUsage,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnergyUsage {
    #[serde(default)]
    pub period: Option<OneOrMany<EnergyPeriod>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PeriodAttrs {
    pub id: String,
}

/// Per-mode consumption for one period (`day1` = yesterday, `month1` = last
/// month, and so on).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnergyPeriod {
    #[serde(rename = "$")]
    pub attrs: PeriodAttrs,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cooling: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub hpheat: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fan: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub eheat: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub reheat: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fangas: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub gas: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub looppump: f64,
}

impl EnergyReport {
    pub fn from_payload(payload: &Value) -> Result<Self, (String, String)> {
        decode_value(unwrap_envelope(payload, "energy"))
    }

    pub fn periods(&self) -> Vec<EnergyPeriod> {
        self.usage.period.clone().map(OneOrMany::into_vec).unwrap_or_default()
    }
}

impl EnergyPeriod {
    /// Resolve `dayN`/`monthN`/`yearN` against the day the report was taken.
    pub fn period_key(&self, reference: NaiveDate) -> Result<PeriodKey, String> {
        let id = self.attrs.id.as_str();
        let split = id
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| format!("energy period id without offset: {}", id))?;
        let (kind, offset) = id.split_at(split);
        let offset: u32 = offset
            .parse()
            .map_err(|_| format!("energy period id with bad offset: {}", id))?;

        let out_of_range = || format!("energy period {} out of calendar range", id);
        match kind {
            "day" => {
                let date = reference
                    .checked_sub_days(chrono::Days::new(u64::from(offset)))
                    .ok_or_else(out_of_range)?;
                Ok(PeriodKey {
                    period_type: PeriodType::Day,
                    year: date.year(),
                    month: date.month() as i32,
                    day: date.day() as i32,
                })
            }
            "month" => {
                let first = reference.with_day(1).ok_or_else(out_of_range)?;
                let date = first.checked_sub_months(Months::new(offset)).ok_or_else(out_of_range)?;
                Ok(PeriodKey {
                    period_type: PeriodType::Month,
                    year: date.year(),
                    month: date.month() as i32,
                    day: 0,
                })
            }
            "year" => Ok(PeriodKey {
                period_type: PeriodType::Year,
                year: reference.year() - offset as i32,
                month: 0,
                day: 0,
            }),
            other => Err(format!("unknown energy period kind {:?} in {}", other, id)),
        }
    }
}

fn unwrap_envelope<'a>(payload: &'a Value, key: &str) -> &'a Value {
    match payload.get(key) {
        Some(inner) if inner.is_object() => inner,
        _ => payload,
    }
}
