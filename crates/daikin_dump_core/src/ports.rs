use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::entities::{Credentials, Device, DeviceId, TokenSet};
use crate::error::Error;

// ============================================================================
// Cloud Ports
// ============================================================================

/// Cloud account access: authentication, token lifecycle and device inventory
#[async_trait]
pub trait CloudController: Send + Sync {
    /// Register for token-set notifications.
    /// Every new or refreshed token set is delivered to every subscriber.
    fn subscribe_token_updates(&self) -> mpsc::UnboundedReceiver<TokenSet>;

    /// Direct login with email and password
    async fn login(&self, credentials: &Credentials) -> Result<TokenSet, Error>;

    /// Start the local login server the operator uses for interactive login
    async fn init_proxy_server(&self) -> Result<(), Error>;

    /// Wait until a token set has been captured through the login server
    async fn wait_for_token_from_proxy(&self) -> Result<TokenSet, Error>;

    /// Stop the local login server
    async fn stop_proxy_server(&self) -> Result<(), Error>;

    /// Raw device listing as returned by the cloud API
    async fn get_cloud_device_details(&self) -> Result<Value, Error>;

    /// Devices registered to the account, in cloud order
    async fn get_cloud_devices(&self) -> Result<Vec<Device>, Error>;
}

// ============================================================================
// Persistence Ports
// ============================================================================

/// Token set persistence for future process starts
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Overwrite the stored token set
    async fn save(&self, token_set: &TokenSet) -> Result<(), Error>;

    /// Location of the stored token set
    fn path(&self) -> &Path;
}

/// Per-device data tree snapshots
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
    /// Write the device's data tree, replacing any previous snapshot.
    /// Returns the path written.
    async fn write_snapshot(&self, device: &Device) -> Result<PathBuf, Error>;
}

/// Reads back snapshots written by a [`SnapshotWriter`]
#[async_trait]
pub trait SnapshotReader: Send + Sync {
    async fn read_snapshot(&self, device_id: &DeviceId) -> Result<Value, Error>;
}

// ============================================================================
// Home Automation Ports
// ============================================================================

/// Named variables on the home-automation box
#[async_trait]
pub trait VariableStore: Send + Sync {
    /// Raw variable content; unknown variables read as whatever the box
    /// answers, typically an empty string
    async fn read_variable(&self, name: &str) -> Result<String, Error>;

    async fn write_variable(&self, name: &str, value: &str) -> Result<(), Error>;
}
