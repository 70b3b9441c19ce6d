use std::sync::Arc;

use tracing::{info, warn};

use crate::entities::{Device, SnapshotReport};
use crate::ports::SnapshotWriter;
use crate::use_cases::DumpEvent;

/// Writes one snapshot per device. A failed device is reported and the
/// remaining devices are still processed.
pub struct SnapshotDevicesUseCase<S>
where
    S: SnapshotWriter,
{
    writer: Arc<S>,
}

impl<S> SnapshotDevicesUseCase<S>
where
    S: SnapshotWriter,
{
    pub fn new(writer: Arc<S>) -> Self {
        Self { writer }
    }

    pub async fn execute<F>(&self, devices: &[Device], progress: &F) -> SnapshotReport
    where
        F: Fn(DumpEvent) + Send + Sync,
    {
        let mut report = SnapshotReport::default();

        if devices.is_empty() {
            info!("no devices returned");
            progress(DumpEvent::NoDevices);
            return report;
        }

        for device in devices {
            let device_id = device.id().clone();
            match self.writer.write_snapshot(device).await {
                Ok(path) => {
                    info!(device_id = %device_id, path = %path.display(), "wrote device snapshot");
                    progress(DumpEvent::SnapshotWritten {
                        device_id: device_id.clone(),
                        path: path.clone(),
                    });
                    report.written.push((device_id, path));
                }
                Err(e) => {
                    warn!(device_id = %device_id, error = %e, "device snapshot failed");
                    let reason = e.to_string();
                    progress(DumpEvent::SnapshotFailed {
                        device_id: device_id.clone(),
                        reason: reason.clone(),
                    });
                    report.failed.push((device_id, reason));
                }
            }
        }

        report
    }
}
