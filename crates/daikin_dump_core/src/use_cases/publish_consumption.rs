use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{info, instrument, warn};

use crate::consumption::{
    electrical_series, find_consumption_data, parse_commit_date, parse_energy, variable_name,
    ConsumptionCommit, COMMIT_DATE, COOLING_COMMIT, COOLING_CURRENT, HEATING_COMMIT,
    HEATING_CURRENT,
};
use crate::entities::DeviceId;
use crate::error::Error;
use crate::ports::{SnapshotReader, VariableStore};

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConsumption {
    pub device_id: DeviceId,
    pub previous: ConsumptionCommit,
    pub committed: ConsumptionCommit,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishReport {
    pub published: Vec<DeviceConsumption>,
    pub failed: Vec<(DeviceId, String)>,
}

struct Series {
    cooling: Vec<f64>,
    heating: Vec<f64>,
}

/// Publishes each device's electrical consumption as home-automation
/// variables (`daikin.<id>.commit_date`, `.cooling_current`,
/// `.cooling_commit`, `.heating_current`, `.heating_commit`).
///
/// A device whose snapshot lacks consumption data is reported and skipped.
/// Variable store failures abort the run.
pub struct PublishConsumptionUseCase<R, V>
where
    R: SnapshotReader,
    V: VariableStore,
{
    snapshots: Arc<R>,
    variables: Arc<V>,
}

impl<R, V> PublishConsumptionUseCase<R, V>
where
    R: SnapshotReader,
    V: VariableStore,
{
    pub fn new(snapshots: Arc<R>, variables: Arc<V>) -> Self {
        Self {
            snapshots,
            variables,
        }
    }

    pub async fn execute(
        &self,
        device_ids: &[DeviceId],
        now: NaiveDateTime,
    ) -> Result<PublishReport, Error> {
        let mut report = PublishReport::default();

        for device_id in device_ids {
            let series = match self.load_series(device_id).await {
                Ok(series) => series,
                Err(e) => {
                    warn!(device_id = %device_id, error = %e, "skipping device");
                    report.failed.push((device_id.clone(), e.to_string()));
                    continue;
                }
            };

            report
                .published
                .push(self.publish(device_id, &series, now).await?);
        }

        Ok(report)
    }

    async fn load_series(&self, device_id: &DeviceId) -> Result<Series, Error> {
        let consumption_error = |reason: &str| Error::Consumption {
            device_id: device_id.to_string(),
            reason: reason.to_string(),
        };

        let data = self.snapshots.read_snapshot(device_id).await?;
        let consumption = find_consumption_data(&data)
            .ok_or_else(|| consumption_error("snapshot has no consumptionData"))?;

        Ok(Series {
            cooling: electrical_series(consumption, "cooling")
                .ok_or_else(|| consumption_error("no daily cooling series"))?,
            heating: electrical_series(consumption, "heating")
                .ok_or_else(|| consumption_error("no daily heating series"))?,
        })
    }

    #[instrument(skip(self, device_id, series), fields(device_id = %device_id))]
    async fn publish(
        &self,
        device_id: &DeviceId,
        series: &Series,
        now: NaiveDateTime,
    ) -> Result<DeviceConsumption, Error> {
        let previous = ConsumptionCommit {
            commit_date: parse_commit_date(&self.read(device_id, COMMIT_DATE).await?),
            cooling_current: parse_energy(&self.read(device_id, COOLING_CURRENT).await?),
            cooling_commit: parse_energy(&self.read(device_id, COOLING_COMMIT).await?),
            heating_current: parse_energy(&self.read(device_id, HEATING_CURRENT).await?),
            heating_commit: parse_energy(&self.read(device_id, HEATING_COMMIT).await?),
        };

        let committed = previous.advance(&series.cooling, &series.heating, now);
        info!(
            "cooling update {} + {} + {}",
            previous.cooling_commit,
            committed.cooling_commit - previous.cooling_commit,
            committed.cooling_current - committed.cooling_commit
        );
        info!(
            "heating update {} + {} + {}",
            previous.heating_commit,
            committed.heating_commit - previous.heating_commit,
            committed.heating_current - committed.heating_commit
        );

        for (field, value) in committed.to_variables() {
            self.variables
                .write_variable(&variable_name(device_id, field), &value)
                .await?;
        }

        Ok(DeviceConsumption {
            device_id: device_id.clone(),
            previous,
            committed,
        })
    }

    async fn read(&self, device_id: &DeviceId, field: &str) -> Result<String, Error> {
        let name = variable_name(device_id, field);
        self.variables.read_variable(&name).await
    }
}
