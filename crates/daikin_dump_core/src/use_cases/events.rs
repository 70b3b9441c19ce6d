use std::fmt;
use std::path::PathBuf;

use crate::entities::{DeviceId, RunState};

/// Progress notifications emitted while a dump runs.
///
/// `Display` renders the operator-facing status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpEvent {
    State(RunState),
    /// Where token sets will be persisted
    TokenFile { path: PathBuf },
    DirectLogin { email: String },
    /// Positional arguments were discarded in favor of interactive login
    ArgumentsIgnored,
    VisitLoginPage { url: String },
    TokenSaved { path: PathBuf },
    TokensRetrieved { path: PathBuf },
    SnapshotWritten { device_id: DeviceId, path: PathBuf },
    SnapshotFailed { device_id: DeviceId, reason: String },
    NoDevices,
}

impl fmt::Display for DumpEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpEvent::State(state) => write!(f, "[{}]", state),
            DumpEvent::TokenFile { path } => {
                write!(f, "Writing tokenset to: {}", path.display())
            }
            DumpEvent::DirectLogin { email } => {
                write!(f, "Using provided login credentials ({}) for a direct login", email)
            }
            DumpEvent::ArgumentsIgnored => write!(
                f,
                "Ignoring provided parameters because the first parameter does not look like an email address"
            ),
            DumpEvent::VisitLoginPage { url } => {
                write!(f, "Please visit {} and log in to Daikin Cloud.", url)
            }
            DumpEvent::TokenSaved { path } => {
                write!(f, "Updated tokens, wrote to {}", path.display())
            }
            DumpEvent::TokensRetrieved { path } => {
                write!(f, "Retrieved tokens. Saved to {}", path.display())
            }
            DumpEvent::SnapshotWritten { path, .. } => {
                write!(f, "Output file: {}", path.display())
            }
            DumpEvent::SnapshotFailed { device_id, reason } => {
                write!(f, "Failed to write snapshot for device {}: {}", device_id, reason)
            }
            DumpEvent::NoDevices => write!(f, "No devices returned"),
        }
    }
}
