mod acquire_credentials;
mod dump;
mod events;
mod publish_consumption;
mod snapshot_devices;

pub use acquire_credentials::{AcquireCredentialsUseCase, PROXY_SHUTDOWN_GRACE};
pub use dump::DumpUseCase;
pub use events::DumpEvent;
pub use publish_consumption::{DeviceConsumption, PublishConsumptionUseCase, PublishReport};
pub use snapshot_devices::SnapshotDevicesUseCase;
