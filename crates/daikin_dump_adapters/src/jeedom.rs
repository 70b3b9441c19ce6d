//! Jeedom home-automation box.
//!
//! Variables are read and written through the plain-text HTTP API at
//! `<host>/core/api/jeeApi.php`: a GET with `apikey`, `type=variable`,
//! `name` and, for writes, `value`. The response body is the raw value.

use async_trait::async_trait;
use daikin_dump_core::config::JeedomSettings;
use daikin_dump_core::ports::VariableStore;
use daikin_dump_core::Error;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::network::send_with_retries;

pub const JEEDOM_API_PATH: &str = "/core/api/jeeApi.php";

pub struct JeedomClient {
    client: Client,
    api_url: String,
    api_key: String,
    retries: u32,
}

impl JeedomClient {
    pub fn new(client: Client, settings: &JeedomSettings, retries: u32) -> Self {
        Self {
            client,
            api_url: format!("{}{}", settings.host.trim_end_matches('/'), JEEDOM_API_PATH),
            api_key: settings.api_key.clone(),
            retries,
        }
    }

    async fn call(&self, name: &str, value: Option<&str>, what: &str) -> Result<String, Error> {
        let mut query = vec![
            ("apikey", self.api_key.as_str()),
            ("type", "variable"),
            ("name", name),
        ];
        if let Some(value) = value {
            query.push(("value", value));
        }

        let request = self.client.get(&self.api_url).query(&query);
        let response = send_with_retries(request, self.retries, what).await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("{} failed: {}", what, e)))?;

        if !status.is_success() {
            return Err(Error::InvalidServerResponse(format!(
                "{} returned {}: {}",
                what,
                status,
                body.trim()
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl VariableStore for JeedomClient {
    #[instrument(skip(self))]
    async fn read_variable(&self, name: &str) -> Result<String, Error> {
        let value = self.call(name, None, "Jeedom variable read").await?;
        debug!("Jeedom - read variable {} --> {}", name, value);
        Ok(value)
    }

    #[instrument(skip(self))]
    async fn write_variable(&self, name: &str, value: &str) -> Result<(), Error> {
        debug!("Jeedom - write variable {} with value {}", name, value);
        self.call(name, Some(value), "Jeedom variable write").await?;
        Ok(())
    }
}
