use std::path::{Path, PathBuf};

use async_trait::async_trait;
use daikin_dump_core::entities::{Device, DeviceId};
use daikin_dump_core::ports::{SnapshotReader, SnapshotWriter};
use daikin_dump_core::Error;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, instrument};

/// Writes and reads back `<out_dir>/<device id>.json` snapshots
pub struct FileSnapshotWriter {
    out_dir: PathBuf,
}

impl FileSnapshotWriter {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn snapshot_path(&self, device_id: &DeviceId) -> Result<PathBuf, Error> {
        device_id
            .snapshot_file_name()
            .map(|file_name| self.out_dir.join(file_name))
            .ok_or_else(|| Error::Snapshot {
                device_id: device_id.to_string(),
                reason: "device id is not a valid file name".to_string(),
            })
    }
}

#[async_trait]
impl SnapshotWriter for FileSnapshotWriter {
    #[instrument(skip(self, device), fields(device_id = %device.id()))]
    async fn write_snapshot(&self, device: &Device) -> Result<PathBuf, Error> {
        let snapshot_error = |reason: String| Error::Snapshot {
            device_id: device.id().to_string(),
            reason,
        };

        let path = self.snapshot_path(device.id())?;

        let content = serde_json::to_string_pretty(device.data())
            .map_err(|e| snapshot_error(format!("failed to serialize data tree: {}", e)))?;

        fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|e| snapshot_error(format!("failed to create {}: {}", self.out_dir.display(), e)))?;
        fs::write(&path, content)
            .await
            .map_err(|e| snapshot_error(format!("failed to write {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "snapshot written");
        Ok(path)
    }
}

#[async_trait]
impl SnapshotReader for FileSnapshotWriter {
    #[instrument(skip(self), fields(device_id = %device_id))]
    async fn read_snapshot(&self, device_id: &DeviceId) -> Result<Value, Error> {
        let snapshot_error = |reason: String| Error::Snapshot {
            device_id: device_id.to_string(),
            reason,
        };

        let path = self.snapshot_path(device_id)?;
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| snapshot_error(format!("failed to read {}: {}", path.display(), e)))?;

        serde_json::from_str(&content)
            .map_err(|e| snapshot_error(format!("malformed {}: {}", path.display(), e)))
    }
}
