//! Electrical consumption bookkeeping for home-automation variables.
//!
//! The cloud reports consumption per 2-hour slot over two days: slots 0-11
//! cover yesterday, slots 12-23 cover today. Published totals are split in
//! a committed part (completed slots) and a current part (committed plus
//! the slot in progress), stamped with the commit date.

use chrono::{NaiveDateTime, Timelike};
use serde_json::Value;
use tracing::{debug, warn};

use crate::entities::DeviceId;

/// Data point holding the consumption series
pub const CONSUMPTION_DATA: &str = "consumptionData";

/// Key of the electrical series inside the consumption data point
pub const ELECTRICAL: &str = "/electrical";

pub const COMMIT_DATE: &str = "commit_date";
pub const COOLING_CURRENT: &str = "cooling_current";
pub const COOLING_COMMIT: &str = "cooling_commit";
pub const HEATING_CURRENT: &str = "heating_current";
pub const HEATING_COMMIT: &str = "heating_commit";

/// Name of a per-device variable, e.g. `daikin.<id>.commit_date`
pub fn variable_name(device_id: &DeviceId, field: &str) -> String {
    format!("daikin.{}.{}", device_id, field)
}

/// First `consumptionData` value found anywhere in a device data tree
pub fn find_consumption_data(data: &Value) -> Option<&Value> {
    match data {
        Value::Array(items) => items.iter().find_map(find_consumption_data),
        Value::Object(fields) => fields.iter().find_map(|(key, value)| {
            if key == CONSUMPTION_DATA {
                Some(value)
            } else {
                find_consumption_data(value)
            }
        }),
        _ => None,
    }
}

/// Daily series (`d`) for `mode` (`cooling` or `heating`).
/// Slots not reported yet (`null`) count as zero.
pub fn electrical_series(consumption: &Value, mode: &str) -> Option<Vec<f64>> {
    let slots = consumption.get(ELECTRICAL)?.get(mode)?.get("d")?.as_array()?;
    Some(slots.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect())
}

/// Index (0-23) of the 2-hour slot containing `date`
pub fn datetime_to_slot(date: NaiveDateTime, yesterday: bool) -> usize {
    date.hour() as usize / 2 + if yesterday { 0 } else { 12 }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerUpdate {
    /// Completed slots since the last commit
    pub cumulated: f64,
    /// Slot in progress
    pub current: f64,
}

/// Consumption accrued since `last_commit` and in the current slot.
///
/// A commit older than yesterday only recovers what the series still
/// holds, starting at yesterday's first slot.
pub fn cumulate_power(power: &[f64], last_commit: NaiveDateTime, now: NaiveDateTime) -> PowerUpdate {
    let current_slot = datetime_to_slot(now, false);

    let last_slot = if last_commit > now {
        warn!(%last_commit, %now, "last commit is in the future");
        current_slot
    } else if now
        .date()
        .pred_opt()
        .is_some_and(|yesterday| last_commit.date() < yesterday)
    {
        warn!(%last_commit, "last commit is before yesterday, older consumption is lost");
        0
    } else {
        datetime_to_slot(last_commit, last_commit.date() < now.date())
    };

    debug!(current_slot, last_slot, "consumption slots");

    let cumulated = power
        .iter()
        .take(current_slot)
        .skip(last_slot)
        .sum();

    PowerUpdate {
        cumulated,
        current: power.get(current_slot).copied().unwrap_or(0.0),
    }
}

/// Stored commit date, or the Unix epoch when missing or unreadable
pub fn parse_commit_date(raw: &str) -> NaiveDateTime {
    raw.trim().parse().unwrap_or_else(|_| {
        debug!(raw, "unreadable commit date, using the epoch");
        NaiveDateTime::default()
    })
}

/// Stored energy total, or zero when missing or unreadable
pub fn parse_energy(raw: &str) -> f64 {
    raw.trim().parse().unwrap_or_else(|_| {
        debug!(raw, "unreadable energy value, using 0");
        0.0
    })
}

/// Published consumption totals of one device
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionCommit {
    pub commit_date: NaiveDateTime,
    pub cooling_current: f64,
    pub cooling_commit: f64,
    pub heating_current: f64,
    pub heating_commit: f64,
}

impl Default for ConsumptionCommit {
    fn default() -> Self {
        Self {
            commit_date: NaiveDateTime::default(),
            cooling_current: 0.0,
            cooling_commit: 0.0,
            heating_current: 0.0,
            heating_commit: 0.0,
        }
    }
}

impl ConsumptionCommit {
    /// Roll the totals forward to `now` using the daily series.
    pub fn advance(&self, cooling: &[f64], heating: &[f64], now: NaiveDateTime) -> Self {
        let cooling_update = cumulate_power(cooling, self.commit_date, now);
        let heating_update = cumulate_power(heating, self.commit_date, now);

        let cooling_commit = self.cooling_commit + cooling_update.cumulated;
        let heating_commit = self.heating_commit + heating_update.cumulated;

        Self {
            commit_date: now,
            cooling_current: cooling_commit + cooling_update.current,
            cooling_commit,
            heating_current: heating_commit + heating_update.current,
            heating_commit,
        }
    }

    /// Variable fields and their rendered values, in publication order
    pub fn to_variables(&self) -> [(&'static str, String); 5] {
        [
            (
                COMMIT_DATE,
                self.commit_date.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            ),
            (COOLING_CURRENT, self.cooling_current.to_string()),
            (COOLING_COMMIT, self.cooling_commit.to_string()),
            (HEATING_CURRENT, self.heating_current.to_string()),
            (HEATING_COMMIT, self.heating_commit.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;
    use serde_json::json;

    fn at(day: u32, hour: u32, min: u32, sec: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, day)
            .unwrap()
            .and_hms_opt(hour, min, sec)
            .unwrap()
    }

    fn hourly() -> Vec<f64> {
        (0..24).map(f64::from).collect()
    }

    #[rstest]
    #[case(at(1, 0, 0, 0), true, 0)]
    #[case(at(1, 2, 0, 0), true, 1)]
    #[case(at(1, 11, 59, 59), true, 5)]
    #[case(at(1, 23, 59, 59), true, 11)]
    #[case(at(1, 1, 0, 0), false, 12)]
    #[case(at(1, 2, 0, 0), false, 13)]
    #[case(at(1, 22, 0, 0), false, 23)]
    fn test_datetime_to_slot(#[case] date: NaiveDateTime, #[case] yesterday: bool, #[case] slot: usize) {
        assert_eq!(datetime_to_slot(date, yesterday), slot);
    }

    #[rstest]
    #[case::same_day(at(1, 0, 0, 0), at(1, 2, 0, 0), 12.0, 13.0)]
    #[case::across_midnight(at(1, 21, 10, 0), at(2, 0, 5, 0), 10.0 + 11.0, 12.0)]
    #[case::same_slot(at(1, 2, 10, 0), at(1, 3, 50, 0), 0.0, 13.0)]
    #[case::before_yesterday(at(1, 8, 0, 0), at(3, 2, 0, 0), (0..13).map(f64::from).sum(), 13.0)]
    #[case::future_commit(at(2, 6, 0, 0), at(1, 2, 0, 0), 0.0, 13.0)]
    fn test_cumulate_power(
        #[case] last_commit: NaiveDateTime,
        #[case] now: NaiveDateTime,
        #[case] cumulated: f64,
        #[case] current: f64,
    ) {
        assert_eq!(
            cumulate_power(&hourly(), last_commit, now),
            PowerUpdate { cumulated, current }
        );
    }

    #[test]
    fn test_cumulate_power_short_series() {
        // Slots the series does not reach count as zero.
        let update = cumulate_power(&[1.0, 2.0, 3.0], at(1, 0, 0, 0), at(2, 4, 0, 0));
        assert_eq!(update, PowerUpdate { cumulated: 6.0, current: 0.0 });
    }

    #[test]
    fn test_find_consumption_data_in_device_tree() {
        let data = json!({
            "gateway": { "modelInfo": { "value": "BRP069A78" } },
            "climateControl": {
                "consumptionData": {
                    "/electrical": { "cooling": { "d": [1, 2] }, "heating": { "d": [3, null] } }
                }
            }
        });

        let consumption = find_consumption_data(&data).unwrap();
        assert_eq!(electrical_series(consumption, "cooling"), Some(vec![1.0, 2.0]));
        assert_eq!(electrical_series(consumption, "heating"), Some(vec![3.0, 0.0]));
        assert_eq!(electrical_series(consumption, "fan"), None);
    }

    #[test]
    fn test_find_consumption_data_through_lists() {
        let data = json!([{ "points": [{ "other": 1 }, { "consumptionData": { "x": 1 } }] }]);
        assert_eq!(find_consumption_data(&data), Some(&json!({ "x": 1 })));
        assert_eq!(find_consumption_data(&json!({ "gateway": {} })), None);
    }

    #[rstest]
    #[case("2023-01-01T02:00:00", at(1, 2, 0, 0))]
    #[case("2023-01-01T02:00:00.250\n", at(1, 2, 0, 0) + chrono::Duration::milliseconds(250))]
    #[case("", NaiveDateTime::default())]
    #[case("Vous n'êtes pas autorisé", NaiveDateTime::default())]
    fn test_parse_commit_date(#[case] raw: &str, #[case] expected: NaiveDateTime) {
        assert_eq!(parse_commit_date(raw), expected);
    }

    #[rstest]
    #[case("12.5", 12.5)]
    #[case(" 3 ", 3.0)]
    #[case("", 0.0)]
    #[case("n/a", 0.0)]
    fn test_parse_energy(#[case] raw: &str, #[case] expected: f64) {
        assert_eq!(parse_energy(raw), expected);
    }

    #[test]
    fn test_commit_advance() {
        let previous = ConsumptionCommit {
            commit_date: at(1, 0, 0, 0),
            cooling_current: 105.0,
            cooling_commit: 100.0,
            heating_current: 52.0,
            heating_commit: 50.0,
        };
        let heating: Vec<f64> = hourly().iter().map(|v| v * 2.0).collect();

        let next = previous.advance(&hourly(), &heating, at(1, 2, 0, 0));

        assert_eq!(
            next,
            ConsumptionCommit {
                commit_date: at(1, 2, 0, 0),
                cooling_current: 100.0 + 12.0 + 13.0,
                cooling_commit: 100.0 + 12.0,
                heating_current: 50.0 + 24.0 + 26.0,
                heating_commit: 50.0 + 24.0,
            }
        );
    }

    #[test]
    fn test_commit_variables() {
        let commit = ConsumptionCommit {
            commit_date: at(1, 2, 0, 0),
            cooling_current: 25.0,
            cooling_commit: 12.5,
            heating_current: 0.0,
            heating_commit: 0.0,
        };
        insta::assert_debug_snapshot!(commit.to_variables(), @r#"
        [
            (
                "commit_date",
                "2023-01-01T02:00:00",
            ),
            (
                "cooling_current",
                "25",
            ),
            (
                "cooling_commit",
                "12.5",
            ),
            (
                "heating_current",
                "0",
            ),
            (
                "heating_commit",
                "0",
            ),
        ]
        "#);
        assert_eq!(
            variable_name(&DeviceId::new("A"), COMMIT_DATE),
            "daikin.A.commit_date"
        );
    }
}
