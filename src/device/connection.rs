use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use crate::device::constants::{CONNECT_TIMEOUT, DISCONNECT_DEADLINE, HIDDEN_ADDRESS};
use crate::device::transport::{BleConnection, BleTransport, NotificationHandler};
use crate::device::types::DeviceCandidate;
use crate::error::DeviceError;

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

// macOS does not expose MAC addresses, the peripheral id is the only stable identifier there
fn peripheral_address(peripheral: &Peripheral, address: String) -> String {
    if address == HIDDEN_ADDRESS {
        format!("{:?}", peripheral.id())
            .trim_start_matches("PeripheralId(")
            .trim_end_matches(')')
            .to_string()
    } else {
        address
    }
}

async fn describe_peripheral(peripheral: &Peripheral) -> Option<DeviceCandidate> {
    match peripheral.properties().await {
        Err(err) => {
            warn!("Could not query peripheral for properties: {:?}", err);
            None
        },
        Ok(None) => {
            debug!("Peripheral has no properties");
            None
        },
        Ok(Some(properties)) => {
            let address = peripheral_address(peripheral, properties.address.to_string());
            Some(DeviceCandidate { address, name: properties.local_name })
        },
    }
}

async fn scan_adapter(adapter: &Adapter, duration: Duration) -> Result<Vec<DeviceCandidate>, DeviceError> {
    info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));

    let mut events = adapter.events().await?;
    adapter.start_scan(ScanFilter::default()).await?;

    // the adapter also remembers peripherals from earlier scans, only report the ones that
    // advertised during this scan, in the order they showed up
    let mut seen: Vec<PeripheralId> = Vec::new();
    let deadline = sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.next() => match event {
                Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                    if !seen.contains(&id) {
                        seen.push(id);
                    }
                },
                Some(_) => {},
                None => {
                    (&mut deadline).await;
                    break;
                },
            },
        }
    }

    if let Err(err) = adapter.stop_scan().await {
        warn!("Failed to stop scanning: {:?}", err);
    }

    let mut candidates = Vec::with_capacity(seen.len());
    for id in seen {
        match adapter.peripheral(&id).await {
            Ok(peripheral) => {
                if let Some(candidate) = describe_peripheral(&peripheral).await {
                    candidates.push(candidate);
                }
            },
            Err(err) => warn!("Peripheral {:?} disappeared: {:?}", id, err),
        }
    }

    Ok(candidates)
}

async fn find_peripheral(adapters: &[Adapter], address: &str) -> Result<Option<Peripheral>, DeviceError> {
    for adapter in adapters {
        let peripherals = match adapter.peripherals().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripherals: {}", err);
                continue;
            },
        };

        for peripheral in peripherals {
            if let Some(candidate) = describe_peripheral(&peripheral).await {
                if candidate.matches_address(address) {
                    info!("Using peripheral {}", candidate);
                    return Ok(Some(peripheral));
                }
            }
        }
    }

    Ok(None)
}

// the link of an abandoned connect attempt can still come up later, and a connected device
// stops advertising
fn spawn_disconnect(peripheral: Peripheral) {
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            debug!("No runtime left to disconnect the peripheral");
            return;
        },
    };

    handle.spawn(async move {
        match timeout(DISCONNECT_DEADLINE, peripheral.disconnect()).await {
            Ok(Ok(())) => debug!("Disconnected abandoned peripheral"),
            Ok(Err(err)) => debug!("Failed to disconnect abandoned peripheral: {:?}", err),
            Err(_) => warn!("Disconnecting abandoned peripheral took too long"),
        }
    });
}

/// Runs `on_abandon` when dropped, unless the attempt it guards completed.
struct AbandonGuard<F: FnOnce()> {
    on_abandon: Option<F>,
}

impl<F: FnOnce()> AbandonGuard<F> {
    fn new(on_abandon: F) -> Self {
        AbandonGuard { on_abandon: Some(on_abandon) }
    }

    fn complete(mut self) {
        self.on_abandon = None;
    }
}

impl<F: FnOnce()> Drop for AbandonGuard<F> {
    fn drop(&mut self) {
        if let Some(on_abandon) = self.on_abandon.take() {
            on_abandon();
        }
    }
}

async fn bounded_connect<T>(attempt: impl Future<Output = Result<T, DeviceError>>) -> Result<T, DeviceError> {
    timeout(CONNECT_TIMEOUT, attempt)
        .await
        .unwrap_or_else(|_| Err(DeviceError::Timeout { operation: "connect" }))
}

/// `BleTransport` backed by btleplug, using every adapter of the system.
pub struct BtleTransport {
    manager: Manager,
}

impl BtleTransport {
    pub async fn new() -> Result<Self, DeviceError> {
        Ok(BtleTransport { manager: Manager::new().await? })
    }

    async fn adapters(&self) -> Result<Vec<Adapter>, DeviceError> {
        let adapters = self.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(DeviceError::NoAdapter);
        }
        Ok(adapters)
    }
}

#[async_trait]
impl BleTransport for BtleTransport {
    type Connection = BtleConnection;

    async fn scan(&self, duration: Duration) -> Result<Vec<DeviceCandidate>, DeviceError> {
        let adapters = self.adapters().await?;

        if adapters.len() == 1 {
            return scan_adapter(&adapters[0], duration).await;
        }

        let scans = adapters.iter().map(|adapter| scan_adapter(adapter, duration));
        let mut candidates: Vec<DeviceCandidate> = Vec::new();
        for result in futures::future::join_all(scans).await {
            match result {
                Ok(found) => {
                    for candidate in found {
                        if !candidates.iter().any(|known| known.matches_address(&candidate.address)) {
                            candidates.push(candidate);
                        }
                    }
                },
                Err(err) => warn!("Scanning failed {:?}", err),
            }
        }

        Ok(candidates)
    }

    async fn connect(&self, address: &str) -> Result<BtleConnection, DeviceError> {
        let adapters = self.adapters().await?;
        let peripheral = find_peripheral(&adapters, address).await?
            .ok_or_else(|| DeviceError::PeripheralNotFound { address: address.to_string() })?;

        // also covers the caller dropping this future half way
        let abandon = AbandonGuard::new({
            let peripheral = peripheral.clone();
            move || spawn_disconnect(peripheral)
        });

        bounded_connect(async {
            info!("Connecting to peripheral...");
            peripheral.connect().await?;

            info!("Connected; Discovering services...");
            peripheral.discover_services().await?;
            Ok::<(), DeviceError>(())
        }).await?;
        abandon.complete();

        Ok(BtleConnection {
            peripheral,
            subscriptions: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        })
    }
}

struct Subscription {
    characteristic: Characteristic,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Subscription {
    async fn stop(self) -> Characteristic {
        self.cancel.cancel();

        if let Err(err) = self.handle.await {
            warn!("Read notifications task failed: {:?}", err);
        }

        self.characteristic
    }
}

pub struct BtleConnection {
    peripheral: Peripheral,
    subscriptions: Mutex<Vec<Subscription>>,
    disconnected: AtomicBool,
}

impl BtleConnection {
    fn take_subscriptions(&self, characteristic: Option<Uuid>) -> Vec<Subscription> {
        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (taken, kept): (Vec<Subscription>, Vec<Subscription>) = subscriptions
            .drain(..)
            .partition(|subscription| characteristic.map_or(true, |uuid| subscription.characteristic.uuid == uuid));
        *subscriptions = kept;
        taken
    }
}

fn read_notifications_task(cancel: CancellationToken, mut notification_stream: NotificationStream, characteristic: Uuid, handler: NotificationHandler) -> JoinHandle<()> {
    spawn(async move {
        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                notification = notification_stream.next() => match notification {
                    Some(data) => {
                        if data.uuid.eq(&characteristic) {
                            handler(data.value.as_slice());
                        }
                    },
                    None => {
                        debug!("Notification stream ended");
                        break 'mainloop;
                    },
                },
            }
        }
    })
}

#[async_trait]
impl BleConnection for BtleConnection {
    async fn is_connected(&self) -> Result<bool, DeviceError> {
        Ok(self.peripheral.is_connected().await?)
    }

    async fn subscribe(&self, characteristic: Uuid, handler: NotificationHandler) -> Result<(), DeviceError> {
        let data_char = self.peripheral.characteristics()
            .into_iter()
            .find(|c| c.uuid.eq(&characteristic))
            .ok_or(DeviceError::MissingCharacteristic)?;

        // open the stream before subscribing, so that no early notification is lost
        let notification_stream = self.peripheral.notifications().await?;

        info!("Subscribing to characteristic {:?} {:?}", data_char.service_uuid, data_char.uuid);
        self.peripheral.subscribe(&data_char).await?;

        let cancel = CancellationToken::new();
        let handle = read_notifications_task(cancel.clone(), notification_stream, characteristic, handler);

        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Subscription { characteristic: data_char, cancel, handle });
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<(), DeviceError> {
        for subscription in self.take_subscriptions(Some(characteristic)) {
            let data_char = subscription.stop().await;
            self.peripheral.unsubscribe(&data_char).await?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        for subscription in self.take_subscriptions(None) {
            subscription.stop().await;
        }

        info!("Disconnecting from peripheral");
        self.peripheral.disconnect().await?;
        self.disconnected.store(true, Ordering::Release);
        Ok(())
    }
}

impl Drop for BtleConnection {
    fn drop(&mut self) {
        for subscription in self.take_subscriptions(None) {
            subscription.cancel.cancel();
        }

        if !self.disconnected.load(Ordering::Acquire) {
            debug!("Connection dropped without a completed disconnect");
            spawn_disconnect(self.peripheral.clone());
        }
    }
}
