use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::schema::Schema;

pub const DEFAULT_IDP_BASE_URL: &str = "https://idp.onecta.daikineurope.com/v1/oidc";
pub const DEFAULT_API_BASE_URL: &str = "https://api.onecta.daikineurope.com";
pub const DEFAULT_SCOPE: &str = "openid onecta:basic.integration";

/// Environment variable overriding `cloud.client_id`
pub const CLIENT_ID_ENV_VAR: &str = "DAIKIN_DUMP__CLOUD__CLIENT_ID";
const CONFIG_FILE_HINT: &str = "./config/config.toml or config.toml in the user configuration directory";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub proxy: ProxySettings,
    pub cloud: CloudSettings,
    pub data_dir: PathBuf,
    pub log_level: String,
}

/// Local login server settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    /// Host or IP the operator uses to reach the login server
    pub own_ip: String,
    /// Port receiving the OAuth redirect
    pub port: u16,
    /// Port serving the operator web interface
    pub web_port: u16,
    pub listen_bind: String,
}

impl ProxySettings {
    /// URL the operator visits to start an interactive login.
    pub fn web_url(&self) -> String {
        format!("http://{}:{}", self.own_ip, self.web_port)
    }

    /// Redirect URI registered with the identity provider.
    pub fn redirect_uri(&self) -> String {
        format!("http://{}:{}/callback", self.own_ip, self.port)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CloudSettings {
    pub client_id: String,
    pub client_secret: String,
    pub idp_base_url: String,
    pub api_base_url: String,
    pub scope: String,
    pub communication_timeout_ms: u64,
    pub communication_retries: u32,
}

impl CloudSettings {
    pub fn communication_timeout(&self) -> Duration {
        Duration::from_millis(self.communication_timeout_ms)
    }
}

impl Settings {
    /// Reject settings the rest of the run cannot work with.
    pub fn validate(&self) -> Result<(), Error> {
        let proxy = &self.proxy;

        if proxy.port == 0 || proxy.web_port == 0 {
            return Err(Error::Configuration(
                "proxy ports must be non-zero".to_string(),
            ));
        }
        if proxy.port == proxy.web_port {
            return Err(Error::Configuration(format!(
                "proxy.port and proxy.web_port must differ (both {})",
                proxy.port
            )));
        }
        if proxy.own_ip.trim().is_empty() {
            return Err(Error::Configuration(
                "proxy.own_ip must not be empty".to_string(),
            ));
        }
        if proxy.listen_bind.parse::<IpAddr>().is_err() {
            return Err(Error::Configuration(format!(
                "proxy.listen_bind is not an IP address: {}",
                proxy.listen_bind
            )));
        }
        if self.cloud.communication_timeout_ms == 0 {
            return Err(Error::Configuration(
                "cloud.communication_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.cloud.client_id.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "cloud.client_id is required: set {} or `client_id` under [cloud] in {}",
                CLIENT_ID_ENV_VAR, CONFIG_FILE_HINT
            )));
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy: ProxySettings::default(),
            cloud: CloudSettings::default(),
            data_dir: PathBuf::from("."),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            own_ip: "127.0.0.1".to_string(),
            port: 8888,
            web_port: 8889,
            listen_bind: "0.0.0.0".to_string(),
        }
    }
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            idp_base_url: DEFAULT_IDP_BASE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            communication_timeout_ms: 10_000,
            communication_retries: 3,
        }
    }
}

/// Make a configured directory absolute against `current_dir`.
/// Interior `.` segments are dropped.
pub fn absolute_data_dir(data_dir: &Path, current_dir: &Path) -> PathBuf {
    current_dir.join(data_dir).components().collect()
}

/// `conf.json` read by the Jeedom publisher
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct JeedomConf {
    pub jeedom: JeedomSettings,
    pub daikin: DaikinAccount,
    pub conf: PublisherSettings,
}

impl JeedomConf {
    /// Structure every `conf.json` must have
    pub fn schema() -> Schema {
        Schema::object(
            vec![
                ("jeedom", Schema::required_strings(&["api_key", "host"])),
                ("daikin", Schema::required_strings(&["username", "password"])),
                ("conf", Schema::required_strings(&["data_dir"])),
            ],
            vec!["jeedom", "daikin", "conf"],
        )
    }
}

#[derive(Deserialize, Clone, PartialEq, Eq)]
pub struct JeedomSettings {
    pub api_key: String,
    /// Base URL of the Jeedom host, e.g. `http://jeedom.local`
    pub host: String,
}

impl fmt::Debug for JeedomSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JeedomSettings")
            .field("api_key", &"<redacted>")
            .field("host", &self.host)
            .finish()
    }
}

#[derive(Deserialize, Clone, PartialEq, Eq)]
pub struct DaikinAccount {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DaikinAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaikinAccount")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PublisherSettings {
    /// Where token and device snapshots are written
    pub data_dir: PathBuf,
}
