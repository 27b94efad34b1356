//! Diesel row types for the local telemetry store.

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;

use crate::models::carrier::{EnergyPeriod, OduStatus, PeriodKey};
use crate::schema;

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = schema::odu_status)]
pub struct NewOduStatus {
    pub ts: NaiveDateTime,
    pub odutype: String,
    pub opstat: i32,
    pub opmode: String,
    pub iducfm: i32,
    pub lat: i32,
    pub oat: i32,
    pub oducoiltmp: i32,
    pub blwrpm: i32,
    pub linevolt: i32,
    pub lockactive: String,
    pub locktime: i32,
    pub comprpm: i32,
    pub suctpress: i32,
    pub sucttemp: i32,
    pub suctsupheat: f64,
    pub dischargetmp: i32,
    pub sparesensorstatus: String,
    pub sparesensorvalue: i32,
    pub exvpos: i32,
    pub curtail: String,
    pub statpress: f64,
    pub enterreftmp: i32,
    pub availminheatstage: i32,
    pub availmaxheatstage: i32,
    pub availmincoolstage: i32,
    pub availmaxcoolstage: i32,
    pub opminheatstage: i32,
    pub opmaxheatstage: i32,
    pub opmincoolstage: i32,
    pub opmaxcoolstage: i32,
    pub aclinecurrent: Option<f64>,
    pub dcbusvoltage: Option<f64>,
    pub dischargepressure: Option<f64>,
    pub dischargesuperheat: Option<f64>,
    pub exvposvi_unit: String,
    pub exvposvi_value: i32,
    pub ipmtemperature: Option<f64>,
    pub lowambientcooling: String,
    pub pfcmtemperature: Option<f64>,
    pub outdoorfanrpm: Option<f64>,
}

impl From<&OduStatus> for NewOduStatus {
    fn from(s: &OduStatus) -> Self {
        NewOduStatus {
            ts: s.timestamp.naive_utc(),
            odutype: s.odutype.clone(),
            opstat: s.opstat,
            opmode: s.opmode.clone(),
            iducfm: s.iducfm,
            lat: s.lat,
            oat: s.oat,
            oducoiltmp: s.oducoiltmp,
            blwrpm: s.blwrpm,
            linevolt: s.linevolt,
            lockactive: s.lockactive.clone(),
            locktime: s.locktime,
            comprpm: s.comprpm,
            suctpress: s.suctpress,
            sucttemp: s.sucttemp,
            suctsupheat: s.suctsupheat,
            dischargetmp: s.dischargetmp,
            sparesensorstatus: s.sparesensorstatus.clone(),
            sparesensorvalue: s.sparesensorvalue,
            exvpos: s.exvpos,
            curtail: s.curtail.clone(),
            statpress: s.statpress,
            enterreftmp: s.enterreftmp,
            availminheatstage: s.availminheatstage,
            availmaxheatstage: s.availmaxheatstage,
            availmincoolstage: s.availmincoolstage,
            availmaxcoolstage: s.availmaxcoolstage,
            opminheatstage: s.opminheatstage,
            opmaxheatstage: s.opmaxheatstage,
            opmincoolstage: s.opmincoolstage,
            opmaxcoolstage: s.opmaxcoolstage,
            aclinecurrent: s.aclinecurrent,
            dcbusvoltage: s.dcbusvoltage,
            dischargepressure: s.dischargepressure,
            dischargesuperheat: s.dischargesuperheat,
            exvposvi_unit: s.exvposvi.attrs.unit.clone(),
            exvposvi_value: s.exvposvi.value,
            ipmtemperature: s.ipmtemperature,
            lowambientcooling: s.lowambientcooling.clone(),
            pfcmtemperature: s.pfcmtemperature,
            outdoorfanrpm: s.outdoorfanrpm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = schema::energy_usage)]
pub struct NewEnergyUsage {
    /// Unix seconds of the report the figures came from.
    pub ts: f64,
    pub period_type: String,
    pub period_year: i32,
    pub period_month: i32,
    pub period_day: i32,
    pub cooling: f64,
    pub hpheat: f64,
    pub fan: f64,
    pub eheat: f64,
    pub reheat: f64,
    pub fangas: f64,
    pub gas: f64,
    pub looppump: f64,
}

impl NewEnergyUsage {
    pub fn new(ts: DateTime<Utc>, key: PeriodKey, p: &EnergyPeriod) -> Self {
        NewEnergyUsage {
            ts: ts.timestamp_millis() as f64 / 1000.0,
            period_type: key.period_type.as_str().to_string(),
            period_year: key.year,
            period_month: key.month,
            period_day: key.day,
            cooling: p.cooling,
            hpheat: p.hpheat,
            fan: p.fan,
            eheat: p.eheat,
            reheat: p.reheat,
            fangas: p.fangas,
            gas: p.gas,
            looppump: p.looppump,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable)]
#[diesel(table_name = schema::energy_usage)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EnergyUsage {
    pub id: i64,
    pub ts: f64,
    pub period_type: String,
    pub period_year: i32,
    pub period_month: i32,
    pub period_day: i32,
    pub cooling: f64,
    pub hpheat: f64,
    pub fan: f64,
    pub eheat: f64,
    pub reheat: f64,
    pub fangas: f64,
    pub gas: f64,
    pub looppump: f64,
}

/// Latest-row pointer for one period key.
#[derive(Debug, Clone, PartialEq, Insertable, Queryable, Selectable)]
#[diesel(table_name = schema::energy_period_usage)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EnergyPeriodUsage {
    pub period_type: String,
    pub period_year: i32,
    pub period_month: i32,
    pub period_day: i32,
    pub eu_id: i64,
}

impl EnergyPeriodUsage {
    pub fn new(key: PeriodKey, eu_id: i64) -> Self {
        EnergyPeriodUsage {
            period_type: key.period_type.as_str().to_string(),
            period_year: key.year,
            period_month: key.month,
            period_day: key.day,
            eu_id,
        }
    }
}
