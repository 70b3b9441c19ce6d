pub mod configuration;
pub mod daikin;
pub mod jeedom;
pub mod network;
pub mod snapshot_writer;
pub mod telemetry;
pub mod token_store;

// Re-exports for convenience
pub use daikin::DaikinCloud;
pub use jeedom::JeedomClient;
pub use snapshot_writer::FileSnapshotWriter;
pub use token_store::FileTokenStore;
