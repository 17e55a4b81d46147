//! Test doubles for the bluetooth transport, the operator prompt, config storage and key
//! injection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::io::AddressStore;
use crate::device::resolver::DeviceSelector;
use crate::device::transport::{BleConnection, BleTransport, NotificationHandler};
use crate::device::types::DeviceCandidate;
use crate::error::{ConfigError, DeviceError, SimError};
use crate::sim::input_sim::KeyInjector;
use crate::sim::types::KeyName;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    Down(KeyName),
    Up(KeyName),
}

#[derive(Default)]
pub struct RecordingInjector {
    actions: Mutex<Vec<KeyAction>>,
    fail: AtomicBool,
}

impl RecordingInjector {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn actions(&self) -> Vec<KeyAction> {
        self.actions.lock().unwrap().clone()
    }

    pub fn downs(&self) -> usize {
        self.actions().iter().filter(|action| matches!(action, KeyAction::Down(_))).count()
    }

    pub fn ups(&self) -> usize {
        self.actions().iter().filter(|action| matches!(action, KeyAction::Up(_))).count()
    }

    fn record(&self, action: KeyAction) -> Result<(), SimError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SimError::Simulate { event: format!("{:?}", action) });
        }
        self.actions.lock().unwrap().push(action);
        Ok(())
    }
}

impl KeyInjector for RecordingInjector {
    fn key_down(&self, key: KeyName) -> Result<(), SimError> {
        self.record(KeyAction::Down(key))
    }

    fn key_up(&self, key: KeyName) -> Result<(), SimError> {
        self.record(KeyAction::Up(key))
    }
}

/// Answers the device prompt with a fixed number, or never answers at all.
pub struct ScriptedSelector {
    answer: Option<Option<usize>>,
    asked: AtomicUsize,
}

impl ScriptedSelector {
    pub fn answer(answer: Option<usize>) -> Self {
        ScriptedSelector { answer: Some(answer), asked: AtomicUsize::new(0) }
    }

    pub fn never() -> Self {
        ScriptedSelector { answer: None, asked: AtomicUsize::new(0) }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceSelector for ScriptedSelector {
    async fn choose(&self, _candidates: &[DeviceCandidate]) -> Option<usize> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        match self.answer {
            Some(answer) => answer,
            None => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    stored: Mutex<Vec<String>>,
    fail: bool,
}

impl MemoryStore {
    pub fn failing() -> Self {
        MemoryStore { stored: Mutex::new(Vec::new()), fail: true }
    }

    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn store_address(&self, address: &str) -> Result<(), ConfigError> {
        if self.fail {
            return Err(ConfigError::NoConfigPath);
        }
        self.stored.lock().unwrap().push(address.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Succeed,
    Refuse,
    Hang,
}

/// State shared by every connection handed out by a `MockTransport`.
#[derive(Default)]
pub struct MockConnectionState {
    // number of liveness checks that still answer true, None for forever
    alive_polls: Mutex<Option<usize>>,
    on_subscribe: Mutex<Vec<Vec<u8>>>,
    handler: Mutex<Option<NotificationHandler>>,
    fail_subscribe: AtomicBool,
    fail_unsubscribe: AtomicBool,
    fail_liveness: AtomicBool,
    hang_teardown: AtomicBool,
    polls: AtomicUsize,
    unsubscribes: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockConnectionState {
    pub fn alive_for_polls(&self, polls: usize) {
        *self.alive_polls.lock().unwrap() = Some(polls);
    }

    /// Delivers `payload` right after the subscription is set up.
    pub fn notify_on_subscribe(&self, payload: &[u8]) {
        self.on_subscribe.lock().unwrap().push(payload.to_vec());
    }

    /// Delivers `payload` now, if there is a subscription.
    pub fn notify(&self, payload: &[u8]) {
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(payload);
        }
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn fail_unsubscribe(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    pub fn fail_liveness(&self, fail: bool) {
        self.fail_liveness.store(fail, Ordering::SeqCst);
    }

    /// Makes unsubscribe and disconnect never complete.
    pub fn hang_teardown(&self, hang: bool) {
        self.hang_teardown.store(hang, Ordering::SeqCst);
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

pub struct MockConnection {
    state: Arc<MockConnectionState>,
}

#[async_trait]
impl BleConnection for MockConnection {
    async fn is_connected(&self) -> Result<bool, DeviceError> {
        self.state.polls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_liveness.load(Ordering::SeqCst) {
            return Err(DeviceError::Timeout { operation: "is_connected" });
        }

        let mut alive_polls = self.state.alive_polls.lock().unwrap();
        match alive_polls.as_mut() {
            None => Ok(true),
            Some(0) => Ok(false),
            Some(remaining) => {
                *remaining -= 1;
                Ok(true)
            },
        }
    }

    async fn subscribe(&self, _characteristic: Uuid, handler: NotificationHandler) -> Result<(), DeviceError> {
        if self.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(DeviceError::MissingCharacteristic);
        }

        *self.state.handler.lock().unwrap() = Some(handler);
        let payloads = self.state.on_subscribe.lock().unwrap().clone();
        for payload in payloads {
            self.state.notify(&payload);
        }
        Ok(())
    }

    async fn unsubscribe(&self, _characteristic: Uuid) -> Result<(), DeviceError> {
        self.state.unsubscribes.fetch_add(1, Ordering::SeqCst);
        if self.state.hang_teardown.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.state.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(DeviceError::Timeout { operation: "unsubscribe" });
        }
        self.state.handler.lock().unwrap().take();
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.state.hang_teardown.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.state.handler.lock().unwrap().take();
        Ok(())
    }
}

type ScanHook = Box<dyn Fn(usize) + Send + Sync>;

pub struct MockTransport {
    devices: Mutex<Vec<DeviceCandidate>>,
    scans: Mutex<Vec<(Duration, Instant)>>,
    on_scan: Mutex<Option<ScanHook>>,
    fail_scans: AtomicBool,
    hang_scans: AtomicBool,
    connect_behavior: Mutex<ConnectBehavior>,
    connects: Mutex<Vec<(String, Instant)>>,
    connection: Arc<MockConnectionState>,
}

impl MockTransport {
    pub fn with_devices(devices: Vec<DeviceCandidate>) -> Self {
        MockTransport {
            devices: Mutex::new(devices),
            scans: Mutex::new(Vec::new()),
            on_scan: Mutex::new(None),
            fail_scans: AtomicBool::new(false),
            hang_scans: AtomicBool::new(false),
            connect_behavior: Mutex::new(ConnectBehavior::Succeed),
            connects: Mutex::new(Vec::new()),
            connection: Arc::new(MockConnectionState::default()),
        }
    }

    pub fn set_devices(&self, devices: Vec<DeviceCandidate>) {
        *self.devices.lock().unwrap() = devices;
    }

    /// Runs `hook` with the 1-based number of every scan, as it starts.
    pub fn on_scan(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.on_scan.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    /// Makes every scan stay pending until it is dropped.
    pub fn hang_scans(&self, hang: bool) {
        self.hang_scans.store(hang, Ordering::SeqCst);
    }

    pub fn set_connect_behavior(&self, behavior: ConnectBehavior) {
        *self.connect_behavior.lock().unwrap() = behavior;
    }

    pub fn connection(&self) -> &MockConnectionState {
        &self.connection
    }

    pub fn scan_durations(&self) -> Vec<Duration> {
        self.scans.lock().unwrap().iter().map(|(duration, _)| *duration).collect()
    }

    pub fn scan_times(&self) -> Vec<Instant> {
        self.scans.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn connects(&self) -> Vec<(String, Instant)> {
        self.connects.lock().unwrap().clone()
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    type Connection = MockConnection;

    async fn scan(&self, duration: Duration) -> Result<Vec<DeviceCandidate>, DeviceError> {
        let count = {
            let mut scans = self.scans.lock().unwrap();
            scans.push((duration, Instant::now()));
            scans.len()
        };
        if let Some(hook) = self.on_scan.lock().unwrap().as_ref() {
            hook(count);
        }

        if self.hang_scans.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(DeviceError::NoAdapter);
        }
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn connect(&self, address: &str) -> Result<MockConnection, DeviceError> {
        self.connects.lock().unwrap().push((address.to_string(), Instant::now()));

        let behavior = *self.connect_behavior.lock().unwrap();
        match behavior {
            ConnectBehavior::Succeed => Ok(MockConnection { state: self.connection.clone() }),
            ConnectBehavior::Refuse => Err(DeviceError::PeripheralNotFound { address: address.to_string() }),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }
}
