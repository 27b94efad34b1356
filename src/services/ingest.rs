use crate::db::models::{EnergyPeriodUsage, EnergyUsage, NewEnergyUsage, NewOduStatus};
use crate::models::carrier::{EnergyReport, OduStatus, PeriodKey};
use crate::schema;
use chrono::{DateTime, Utc};
use diesel::SqliteConnection;
use diesel::prelude::*;
use log::{debug, error};

/// Append one `odu_status` row. Duplicate timestamps are kept.
pub fn write_odu_status(conn: &mut SqliteConnection, status: &OduStatus) -> Result<usize, String> {
    use schema::odu_status::dsl as O;

    let row = NewOduStatus::from(status);
    diesel::insert_into(O::odu_status)
        .values(&row)
        .execute(conn)
        .map_err(|e| {
            error!("Unable to push params: {:?}", row);
            format!("insert odu_status row failed: {}", e)
        })
}

/// Store every period of `report` as a new `energy_usage` row and move the
/// period's latest pointer to it. Earlier rows stay in place.
///
/// Period ids count back from the device's local date. `fallback_ts` stands
/// in when the report carries no timestamp of its own.
pub fn write_energy_usage(
    conn: &mut SqliteConnection,
    report: &EnergyReport,
    fallback_ts: DateTime<Utc>,
) -> Result<usize, String> {
    use schema::energy_period_usage::dsl as P;
    use schema::energy_usage::dsl as E;

    let local_ts = report.timestamp.unwrap_or_else(|| fallback_ts.fixed_offset());
    let reference = local_ts.date_naive();
    let ts = local_ts.with_timezone(&Utc);
    let rows = report
        .periods()
        .iter()
        .map(|p| p.period_key(reference).map(|key| (key, NewEnergyUsage::new(ts, key, p))))
        .collect::<Result<Vec<_>, String>>()?;
    if rows.is_empty() {
        return Ok(0);
    }

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        for (key, row) in &rows {
            let eu_id: i64 = diesel::insert_into(E::energy_usage)
                .values(row)
                .returning(E::id)
                .get_result(conn)
                .inspect_err(|_| error!("Unable to push params: {:?}", row))?;
            let pointer = EnergyPeriodUsage::new(*key, eu_id);
            diesel::replace_into(P::energy_period_usage)
                .values(&pointer)
                .execute(conn)
                .inspect_err(|_| error!("Unable to push params: {:?}", pointer))?;
            debug!("energy {:?} -> row {}", key, eu_id);
        }
        Ok(rows.len())
    })
    .map_err(|e| format!("insert energy_usage rows failed: {}", e))
}

/// Most recent figures recorded for `key`, if any.
pub fn latest_energy_usage(conn: &mut SqliteConnection, key: PeriodKey) -> Result<Option<EnergyUsage>, String> {
    use schema::energy_period_usage::dsl as P;
    use schema::energy_usage::dsl as E;

    P::energy_period_usage
        .inner_join(E::energy_usage)
        .filter(
            P::period_type
                .eq(key.period_type.as_str())
                .and(P::period_year.eq(key.year))
                .and(P::period_month.eq(key.month))
                .and(P::period_day.eq(key.day)),
        )
        .select(EnergyUsage::as_select())
        .first(conn)
        .optional()
        .map_err(|e| format!("fetch latest energy usage failed: {}", e))
}
