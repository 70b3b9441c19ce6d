use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ProxySettings;
use crate::entities::TokenSet;
use crate::error::Error;
use crate::login_strategy::LoginStrategy;
use crate::ports::CloudController;
use crate::use_cases::DumpEvent;

/// Time the login server keeps running after token capture, so the
/// operator's browser still receives the success page.
pub const PROXY_SHUTDOWN_GRACE: Duration = Duration::from_millis(1000);

/// Obtains a token set via direct login or the interactive proxy login.
pub struct AcquireCredentialsUseCase<C>
where
    C: CloudController,
{
    cloud: Arc<C>,
    proxy: ProxySettings,
    shutdown_grace: Duration,
}

impl<C> AcquireCredentialsUseCase<C>
where
    C: CloudController,
{
    pub fn new(cloud: Arc<C>, proxy: ProxySettings) -> Self {
        Self {
            cloud,
            proxy,
            shutdown_grace: PROXY_SHUTDOWN_GRACE,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Run the login path selected by `strategy` to completion.
    ///
    /// On the interactive path the login server is stopped after the grace
    /// period whether or not a token set was captured.
    pub async fn execute<F>(&self, strategy: &LoginStrategy, progress: &F) -> Result<TokenSet, Error>
    where
        F: Fn(DumpEvent) + Send + Sync,
    {
        match strategy {
            LoginStrategy::DirectCredentials(credentials) => {
                info!(email = %credentials.email, "performing direct login");
                progress(DumpEvent::DirectLogin {
                    email: credentials.email.clone(),
                });
                self.cloud.login(credentials).await
            }
            LoginStrategy::Interactive { args_ignored } => {
                if *args_ignored {
                    warn!("ignoring arguments: first parameter is not an email address");
                    progress(DumpEvent::ArgumentsIgnored);
                }
                self.interactive_login(progress).await
            }
        }
    }

    async fn interactive_login<F>(&self, progress: &F) -> Result<TokenSet, Error>
    where
        F: Fn(DumpEvent) + Send + Sync,
    {
        self.cloud.init_proxy_server().await?;

        let url = self.proxy.web_url();
        info!(url = %url, "login server started, waiting for operator");
        progress(DumpEvent::VisitLoginPage { url });

        let captured = self.cloud.wait_for_token_from_proxy().await;

        tokio::time::sleep(self.shutdown_grace).await;
        let stopped = self.cloud.stop_proxy_server().await;

        let token_set = captured?;
        stopped?;
        Ok(token_set)
    }
}
