//! In-memory port implementations for use-case tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::entities::{Credentials, Device, DeviceId, TokenSet};
use crate::error::{AuthError, Error};
use crate::ports::{CloudController, SnapshotReader, SnapshotWriter, TokenStore, VariableStore};
use crate::use_cases::DumpEvent;

pub(crate) fn device(id: &str, data: Value) -> Device {
    Device::new(DeviceId::new(id), data)
}

/// Progress callback recording every event
pub(crate) fn collect_events() -> (Arc<Mutex<Vec<DumpEvent>>>, impl Fn(DumpEvent) + Send + Sync) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    (events, move |event| sink.lock().unwrap().push(event))
}

#[derive(Default)]
pub(crate) struct MockCloud {
    calls: Mutex<Vec<String>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<TokenSet>>>,
    devices: Vec<Device>,
    refreshes_during_fetch: Vec<String>,
    fail_login: bool,
    fail_proxy_start: bool,
    fail_proxy_wait: bool,
}

impl MockCloud {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_devices(mut self, devices: Vec<Device>) -> Self {
        self.devices = devices;
        self
    }

    pub(crate) fn refreshing_during_fetch(mut self, access_tokens: Vec<&str>) -> Self {
        self.refreshes_during_fetch = access_tokens.into_iter().map(str::to_string).collect();
        self
    }

    pub(crate) fn failing_login(mut self) -> Self {
        self.fail_login = true;
        self
    }

    pub(crate) fn failing_proxy_start(mut self) -> Self {
        self.fail_proxy_start = true;
        self
    }

    pub(crate) fn failing_proxy_wait(mut self) -> Self {
        self.fail_proxy_wait = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn emit(&self, access_token: &str) -> TokenSet {
        let token_set = TokenSet::new(access_token);
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(token_set.clone()).is_ok());
        token_set
    }
}

#[async_trait]
impl CloudController for MockCloud {
    fn subscribe_token_updates(&self) -> mpsc::UnboundedReceiver<TokenSet> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    async fn login(&self, credentials: &Credentials) -> Result<TokenSet, Error> {
        self.record(format!("login:{}:{}", credentials.email, credentials.password));
        if self.fail_login {
            return Err(Error::Authentication(AuthError::InvalidCredentials));
        }
        Ok(self.emit("direct-token"))
    }

    async fn init_proxy_server(&self) -> Result<(), Error> {
        self.record("init_proxy_server");
        if self.fail_proxy_start {
            return Err(Error::Proxy("address already in use".to_string()));
        }
        Ok(())
    }

    async fn wait_for_token_from_proxy(&self) -> Result<TokenSet, Error> {
        self.record("wait_for_token_from_proxy");
        if self.fail_proxy_wait {
            return Err(Error::Authentication(AuthError::AccessDenied(
                "operator cancelled".to_string(),
            )));
        }
        Ok(self.emit("proxy-token"))
    }

    async fn stop_proxy_server(&self) -> Result<(), Error> {
        self.record("stop_proxy_server");
        Ok(())
    }

    async fn get_cloud_device_details(&self) -> Result<Value, Error> {
        self.record("get_cloud_device_details");
        Ok(Value::Array(
            self.devices
                .iter()
                .map(|d| serde_json::json!({ "id": d.id().as_str() }))
                .collect(),
        ))
    }

    async fn get_cloud_devices(&self) -> Result<Vec<Device>, Error> {
        self.record("get_cloud_devices");
        for access_token in &self.refreshes_during_fetch {
            self.emit(access_token);
        }
        Ok(self.devices.clone())
    }
}

pub(crate) struct MockTokenStore {
    path: PathBuf,
    saved: Mutex<Vec<TokenSet>>,
    fail: bool,
}

impl MockTokenStore {
    pub(crate) fn new() -> Self {
        Self {
            path: PathBuf::from("/data/tokenset.json"),
            saved: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub(crate) fn saved(&self) -> Vec<TokenSet> {
        self.saved.lock().unwrap().clone()
    }

    pub(crate) fn last_saved(&self) -> Option<TokenSet> {
        self.saved.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TokenStore for MockTokenStore {
    async fn save(&self, token_set: &TokenSet) -> Result<(), Error> {
        if self.fail {
            return Err(Error::TokenPersistence {
                path: self.path.clone(),
                reason: "permission denied".to_string(),
            });
        }
        self.saved.lock().unwrap().push(token_set.clone());
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Default)]
pub(crate) struct MockSnapshotWriter {
    written: Mutex<Vec<(DeviceId, Value)>>,
    failing_ids: HashSet<String>,
}

impl MockSnapshotWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_for(mut self, id: &str) -> Self {
        self.failing_ids.insert(id.to_string());
        self
    }

    pub(crate) fn written(&self) -> Vec<(DeviceId, Value)> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotWriter for MockSnapshotWriter {
    async fn write_snapshot(&self, device: &Device) -> Result<PathBuf, Error> {
        if self.failing_ids.contains(device.id().as_str()) {
            return Err(Error::Snapshot {
                device_id: device.id().to_string(),
                reason: "disk full".to_string(),
            });
        }
        self.written
            .lock()
            .unwrap()
            .push((device.id().clone(), device.data().clone()));
        Ok(PathBuf::from(format!("/data/{}.json", device.id())))
    }
}

#[derive(Default)]
pub(crate) struct MockSnapshotReader {
    snapshots: HashMap<String, Value>,
}

impl MockSnapshotReader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, id: &str, data: Value) -> Self {
        self.snapshots.insert(id.to_string(), data);
        self
    }
}

#[async_trait]
impl SnapshotReader for MockSnapshotReader {
    async fn read_snapshot(&self, device_id: &DeviceId) -> Result<Value, Error> {
        self.snapshots
            .get(device_id.as_str())
            .cloned()
            .ok_or_else(|| Error::Snapshot {
                device_id: device_id.to_string(),
                reason: "no such file".to_string(),
            })
    }
}

/// Unknown variables read as an empty string
#[derive(Default)]
pub(crate) struct MockVariableStore {
    values: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl MockVariableStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(self, name: &str, value: &str) -> Self {
        self.values
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub(crate) fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl VariableStore for MockVariableStore {
    async fn read_variable(&self, name: &str) -> Result<String, Error> {
        if self.fail {
            return Err(Error::Network("connection refused".to_string()));
        }
        Ok(self
            .values
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn write_variable(&self, name: &str, value: &str) -> Result<(), Error> {
        if self.fail {
            return Err(Error::Network("connection refused".to_string()));
        }
        self.values
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        self.writes
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
        Ok(())
    }
}
