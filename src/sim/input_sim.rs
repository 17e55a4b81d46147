use rdev::{EventType, simulate};
use log::debug;

use crate::error::SimError;
use crate::sim::types::KeyName;

/// Sends synthetic keyboard events to the operating system.
pub trait KeyInjector: Send + Sync {
    fn key_down(&self, key: KeyName) -> Result<(), SimError>;
    fn key_up(&self, key: KeyName) -> Result<(), SimError>;
}

fn send(event_type: &EventType) -> Result<(), SimError> {
    debug!("Simulating {:?}", event_type);
    simulate(event_type).map_err(|_| SimError::Simulate { event: format!("{:?}", event_type) })
}

/// `KeyInjector` backed by `rdev::simulate`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RdevInjector;

impl KeyInjector for RdevInjector {
    fn key_down(&self, key: KeyName) -> Result<(), SimError> {
        send(&EventType::KeyPress(key.rdev_key()))
    }

    fn key_up(&self, key: KeyName) -> Result<(), SimError> {
        send(&EventType::KeyRelease(key.rdev_key()))
    }
}
