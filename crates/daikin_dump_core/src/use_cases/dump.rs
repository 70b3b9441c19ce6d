use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::ProxySettings;
use crate::entities::{RunState, SnapshotReport, TokenSet};
use crate::error::Error;
use crate::login_strategy::LoginStrategy;
use crate::ports::{CloudController, SnapshotWriter, TokenStore};
use crate::use_cases::{AcquireCredentialsUseCase, DumpEvent, SnapshotDevicesUseCase};

/// Orchestrates a complete dump run:
/// - Token-update subscription persisted through the token store
/// - Credential acquisition (direct or interactive)
/// - Device inventory fetch
/// - Per-device snapshots
pub struct DumpUseCase<C, T, S>
where
    C: CloudController,
    T: TokenStore,
    S: SnapshotWriter,
{
    cloud: Arc<C>,
    token_store: Arc<T>,
    acquirer: AcquireCredentialsUseCase<C>,
    snapshotter: SnapshotDevicesUseCase<S>,
}

impl<C, T, S> DumpUseCase<C, T, S>
where
    C: CloudController,
    T: TokenStore,
    S: SnapshotWriter,
{
    pub fn new(
        cloud: Arc<C>,
        token_store: Arc<T>,
        snapshot_writer: Arc<S>,
        proxy: ProxySettings,
    ) -> Self {
        Self {
            acquirer: AcquireCredentialsUseCase::new(cloud.clone(), proxy),
            snapshotter: SnapshotDevicesUseCase::new(snapshot_writer),
            cloud,
            token_store,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.acquirer = self.acquirer.with_shutdown_grace(grace);
        self
    }

    /// Run the dump to completion.
    ///
    /// Token updates received at any point of the run are written to the
    /// token store as they arrive; a failed write aborts the run. Device
    /// snapshot failures are collected in the returned report.
    pub async fn execute<F>(&self, strategy: &LoginStrategy, progress: F) -> Result<SnapshotReport, Error>
    where
        F: Fn(DumpEvent) + Send + Sync,
    {
        progress(DumpEvent::TokenFile {
            path: self.token_store.path().to_path_buf(),
        });

        match self.drive(strategy, &progress).await {
            Ok(report) => {
                info!(
                    written = report.written.len(),
                    failed = report.failed.len(),
                    "dump completed"
                );
                progress(DumpEvent::State(RunState::Done));
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "dump failed");
                progress(DumpEvent::State(RunState::Fatal));
                Err(e)
            }
        }
    }

    async fn drive<F>(&self, strategy: &LoginStrategy, progress: &F) -> Result<SnapshotReport, Error>
    where
        F: Fn(DumpEvent) + Send + Sync,
    {
        let mut updates = self.cloud.subscribe_token_updates();

        let flow = self.run_flow(strategy, progress);
        tokio::pin!(flow);

        let report = loop {
            tokio::select! {
                biased;
                Some(token_set) = updates.recv() => {
                    self.persist(&token_set, progress).await?;
                }
                result = &mut flow => break result?,
            }
        };

        while let Ok(token_set) = updates.try_recv() {
            self.persist(&token_set, progress).await?;
        }

        Ok(report)
    }

    async fn run_flow<F>(&self, strategy: &LoginStrategy, progress: &F) -> Result<SnapshotReport, Error>
    where
        F: Fn(DumpEvent) + Send + Sync,
    {
        progress(DumpEvent::State(RunState::Authenticating(strategy.mode())));
        self.acquirer.execute(strategy, progress).await?;

        // Let the pending token update reach the store before reporting it.
        tokio::task::yield_now().await;
        progress(DumpEvent::TokensRetrieved {
            path: self.token_store.path().to_path_buf(),
        });
        progress(DumpEvent::State(RunState::Authenticated));

        let details = self.cloud.get_cloud_device_details().await?;
        debug!(
            device_count = details.as_array().map(Vec::len).unwrap_or(0),
            is_array = details.is_array(),
            "fetched cloud device details"
        );

        let devices = self.cloud.get_cloud_devices().await?;
        info!(count = devices.len(), "fetched cloud devices");

        progress(DumpEvent::State(RunState::Snapshotting));
        Ok(self.snapshotter.execute(&devices, progress).await)
    }

    async fn persist<F>(&self, token_set: &TokenSet, progress: &F) -> Result<(), Error>
    where
        F: Fn(DumpEvent) + Send + Sync,
    {
        self.token_store.save(token_set).await?;
        debug!(path = %self.token_store.path().display(), "token set persisted");
        progress(DumpEvent::TokenSaved {
            path: self.token_store.path().to_path_buf(),
        });
        Ok(())
    }
}
