//! Daikin Onecta cloud access.
//!
//! Implements [`CloudController`] on top of the Onecta identity provider
//! (token endpoint and authorization page) and the gateway-devices API.

mod oidc;
mod proxy;

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use daikin_dump_core::config::{CloudSettings, ProxySettings, Settings};
use daikin_dump_core::entities::{Credentials, Device, TokenSet};
use daikin_dump_core::error::AuthError;
use daikin_dump_core::ports::CloudController;
use daikin_dump_core::Error;
use rand::RngCore;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::network::{build_cloud_client, send_with_retries};

pub use oidc::OidcClient;
pub use proxy::{BoundAddrs, ProxyServer};

const GATEWAY_DEVICES_PATH: &str = "/v1/gateway-devices";

/// Refresh the access token when it expires within this many seconds
const REFRESH_MARGIN_SECS: i64 = 60;

pub struct DaikinCloud {
    client: Client,
    oidc: OidcClient,
    cloud: CloudSettings,
    proxy_settings: ProxySettings,
    proxy: ProxyServer,
    token_set: Mutex<Option<TokenSet>>,
    subscribers: StdMutex<Vec<mpsc::UnboundedSender<TokenSet>>>,
}

impl DaikinCloud {
    /// Create a cloud client, optionally seeded with a previously obtained
    /// token set.
    pub fn new(token_set: Option<TokenSet>, settings: &Settings) -> Result<Self, Error> {
        let client = build_cloud_client(settings.cloud.communication_timeout())?;
        Ok(Self {
            oidc: OidcClient::new(client.clone(), &settings.cloud),
            client,
            cloud: settings.cloud.clone(),
            proxy_settings: settings.proxy.clone(),
            proxy: ProxyServer::new(settings.proxy.clone()),
            token_set: Mutex::new(token_set),
            subscribers: StdMutex::new(Vec::new()),
        })
    }

    /// Addresses of the running login server
    pub fn proxy_addrs(&self) -> Option<BoundAddrs> {
        self.proxy.bound_addrs()
    }

    /// Store a new token set and notify every live subscriber
    fn publish(&self, slot: &mut Option<TokenSet>, token_set: TokenSet) -> TokenSet {
        *slot = Some(token_set.clone());

        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(token_set.clone()).is_ok());
        debug!(subscribers = subscribers.len(), "token update published");

        token_set
    }

    async fn set_token_set(&self, token_set: TokenSet) -> TokenSet {
        let mut slot = self.token_set.lock().await;
        self.publish(&mut slot, token_set)
    }

    /// Current access token, refreshed first when close to expiry
    async fn access_token(&self, force_refresh: bool) -> Result<String, Error> {
        let mut slot = self.token_set.lock().await;
        let current = slot.as_ref().ok_or(Error::NotAuthenticated)?;

        if !force_refresh && !current.expires_within(REFRESH_MARGIN_SECS) {
            return Ok(current.access_token.clone());
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            if force_refresh {
                return Err(Error::Authentication(AuthError::InvalidGrant));
            }
            warn!("access token expiring and no refresh token available");
            return Ok(current.access_token.clone());
        };

        info!("refreshing access token");
        let refreshed = self.oidc.refresh(&refresh_token).await?;
        Ok(self.publish(&mut slot, refreshed).access_token)
    }

    async fn api_get(&self, path: &str) -> Result<Value, Error> {
        let url = format!("{}{}", self.cloud.api_base_url.trim_end_matches('/'), path);

        let mut retried_auth = false;
        loop {
            let access_token = self.access_token(retried_auth).await?;
            let request = self
                .client
                .get(&url)
                .header(header::ACCEPT, "application/json")
                .bearer_auth(access_token);
            let response =
                send_with_retries(request, self.cloud.communication_retries, "device request")
                    .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !retried_auth {
                debug!("access token rejected, refreshing once");
                retried_auth = true;
                continue;
            }
            if status == StatusCode::UNAUTHORIZED {
                return Err(Error::Authentication(AuthError::InvalidGrant));
            }
            if !status.is_success() {
                return Err(Error::InvalidServerResponse(format!(
                    "{} returned {}",
                    path, status
                )));
            }

            return response
                .json::<Value>()
                .await
                .map_err(|e| Error::InvalidServerResponse(format!("malformed {} response: {}", path, e)));
        }
    }
}

/// Random value tying the login callback to this run
fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn devices_from_details(details: &Value) -> Result<Vec<Device>, Error> {
    let entries = details.as_array().ok_or_else(|| {
        Error::InvalidServerResponse("device listing is not an array".to_string())
    })?;

    Ok(entries
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| {
            let device = Device::from_cloud_json(raw);
            if device.is_none() {
                warn!(index, "skipping device without id");
            }
            device
        })
        .collect())
}

#[async_trait]
impl CloudController for DaikinCloud {
    fn subscribe_token_updates(&self) -> mpsc::UnboundedReceiver<TokenSet> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    #[instrument(skip(self, credentials))]
    async fn login(&self, credentials: &Credentials) -> Result<TokenSet, Error> {
        let token_set = self.oidc.password_grant(credentials).await?;
        Ok(self.set_token_set(token_set).await)
    }

    #[instrument(skip(self))]
    async fn init_proxy_server(&self) -> Result<(), Error> {
        let state = generate_state();
        let authorize_url = self
            .oidc
            .authorize_url(&self.proxy_settings.redirect_uri(), &state)?;
        self.proxy.start(authorize_url, state).await
    }

    #[instrument(skip(self))]
    async fn wait_for_token_from_proxy(&self) -> Result<TokenSet, Error> {
        let code = self.proxy.wait_for_code().await?;
        let token_set = self
            .oidc
            .exchange_code(&code, &self.proxy_settings.redirect_uri())
            .await?;
        Ok(self.set_token_set(token_set).await)
    }

    #[instrument(skip(self))]
    async fn stop_proxy_server(&self) -> Result<(), Error> {
        self.proxy.stop().await
    }

    #[instrument(skip(self))]
    async fn get_cloud_device_details(&self) -> Result<Value, Error> {
        self.api_get(GATEWAY_DEVICES_PATH).await
    }

    #[instrument(skip(self))]
    async fn get_cloud_devices(&self) -> Result<Vec<Device>, Error> {
        let details = self.get_cloud_device_details().await?;
        let devices = devices_from_details(&details)?;
        info!(count = devices.len(), "devices mapped");
        Ok(devices)
    }
}
