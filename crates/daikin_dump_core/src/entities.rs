use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// OAuth token bundle issued by the cloud identity provider.
///
/// Opaque to the use cases: it is only ever handed to the token store.
/// Provider fields not modeled here are kept in `extra` so a persisted
/// set round-trips without loss.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expiry as Unix epoch seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenSet {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_at: None,
            id_token: None,
            scope: None,
            extra: Map::new(),
        }
    }

    /// True when the access token expires within `margin_secs` from now.
    /// A set without expiry information never counts as expiring.
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - now_epoch_secs() <= margin_secs,
            None => false,
        }
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

pub fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Credentials for a direct login (never persisted to disk)
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: String, password: String) -> Self {
        Self { email, password }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Stable identifier of a cloud-connected device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name for this device's snapshot, or `None` when the id cannot
    /// be used as a single path component.
    pub fn snapshot_file_name(&self) -> Option<String> {
        let id = self.0.as_str();
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
            return None;
        }
        Some(format!("{}.json", id))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cloud-connected device and its nested data tree.
///
/// The tree is keyed by management point (`embeddedId`), each holding its
/// named data points. A data point with a scalar value is kept as sent
/// (`{"value": ..., "settable": ..., ...}`). A data point whose value is an
/// object is flattened into `/path` keys, e.g.
/// `temperatureControl["/operationModes/auto/setpoints/roomTemperature"]`
/// or `consumptionData["/electrical"]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    id: DeviceId,
    data: Value,
    pub model: Option<String>,
    pub last_updated: Option<String>,
}

impl Device {
    pub fn new(id: DeviceId, data: Value) -> Self {
        Self {
            id,
            data,
            model: None,
            last_updated: None,
        }
    }

    /// Build a device from one entry of the cloud's gateway-device listing.
    ///
    /// Returns `None` when the entry carries no usable `id`.
    pub fn from_cloud_json(raw: &Value) -> Option<Self> {
        let id = raw.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())?;

        let mut points = Map::new();
        if let Some(management_points) = raw.get("managementPoints").and_then(Value::as_array) {
            for point in management_points {
                let Some(fields) = point.as_object() else {
                    continue;
                };
                let Some(embedded_id) = fields.get("embeddedId").and_then(Value::as_str) else {
                    continue;
                };
                let data_points: Map<String, Value> = fields
                    .iter()
                    .filter(|(name, _)| name.as_str() != "embeddedId")
                    .map(|(name, value)| (name.clone(), translate_data_point(value)))
                    .collect();
                points.insert(embedded_id.to_string(), Value::Object(data_points));
            }
        }

        Some(Self {
            id: DeviceId::new(id),
            data: Value::Object(points),
            model: raw
                .get("deviceModel")
                .and_then(Value::as_str)
                .map(str::to_string),
            last_updated: raw
                .get("lastUpdateReceived")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Full data tree
    pub fn data(&self) -> &Value {
        &self.data
    }
}

fn translate_data_point(point: &Value) -> Value {
    match point.get("value") {
        Some(Value::Object(nested)) if !nested.is_empty() => {
            let mut flat = Map::new();
            flatten_data_point(nested, "", &mut flat);
            Value::Object(flat)
        }
        _ => point.clone(),
    }
}

/// Descend until a node carries data point metadata or nothing below it
/// does; that node is stored whole under its `/a/b` path.
fn flatten_data_point(node: &Map<String, Value>, prefix: &str, out: &mut Map<String, Value>) {
    for (key, child) in node {
        let path = format!("{}/{}", prefix, key);
        match child {
            Value::Object(fields) if !is_data_point(fields) && contains_data_point(fields) => {
                flatten_data_point(fields, &path, out)
            }
            _ => {
                out.insert(path, child.clone());
            }
        }
    }
}

fn is_data_point(fields: &Map<String, Value>) -> bool {
    ["value", "settable", "values"]
        .iter()
        .any(|key| fields.contains_key(*key))
}

fn contains_data_point(fields: &Map<String, Value>) -> bool {
    fields.values().any(|child| match child {
        Value::Object(nested) => is_data_point(nested) || contains_data_point(nested),
        _ => false,
    })
}

/// Which login path the run takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    Direct,
    ProxyInteractive,
}

impl fmt::Display for LoginMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginMode::Direct => write!(f, "direct login"),
            LoginMode::ProxyInteractive => write!(f, "interactive proxy login"),
        }
    }
}

/// Phases of a dump run. `Done` and `Fatal` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    Configuring,
    Authenticating(LoginMode),
    Authenticated,
    Snapshotting,
    Done,
    Fatal,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Fatal)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Start => write!(f, "starting"),
            RunState::Configuring => write!(f, "configuring"),
            RunState::Authenticating(mode) => write!(f, "authenticating ({})", mode),
            RunState::Authenticated => write!(f, "authenticated"),
            RunState::Snapshotting => write!(f, "writing device snapshots"),
            RunState::Done => write!(f, "done"),
            RunState::Fatal => write!(f, "failed"),
        }
    }
}

/// Outcome of snapshotting a device inventory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    pub written: Vec<(DeviceId, PathBuf)>,
    pub failed: Vec<(DeviceId, String)>,
}

impl SnapshotReport {
    pub fn total(&self) -> usize {
        self.written.len() + self.failed.len()
    }
}
