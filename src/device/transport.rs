use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use uuid::Uuid;

use crate::device::types::DeviceCandidate;
use crate::error::DeviceError;

/// Callback invoked with the raw value of every notification of a subscribed characteristic.
pub type NotificationHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// The BLE stack: scanning and connecting.
#[async_trait]
pub trait BleTransport: Send + Sync {
    type Connection: BleConnection;

    /// Scans for `duration` and returns the devices seen, in the order they were discovered.
    async fn scan(&self, duration: Duration) -> Result<Vec<DeviceCandidate>, DeviceError>;

    async fn connect(&self, address: &str) -> Result<Self::Connection, DeviceError>;
}

/// An open connection to a single peripheral.
#[async_trait]
pub trait BleConnection: Send + Sync {
    async fn is_connected(&self) -> Result<bool, DeviceError>;

    /// Delivers every notification of `characteristic` to `handler` until unsubscribed or
    /// disconnected.
    async fn subscribe(&self, characteristic: Uuid, handler: NotificationHandler) -> Result<(), DeviceError>;

    async fn unsubscribe(&self, characteristic: Uuid) -> Result<(), DeviceError>;

    /// Closes the connection. No notification is delivered after this returns.
    async fn disconnect(&self) -> Result<(), DeviceError>;
}
