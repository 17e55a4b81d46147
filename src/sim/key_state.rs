use std::sync::{Arc, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use log::{debug, error, info, trace};

use crate::device::constants::{MESSAGE_BATTERY, MESSAGE_PRESS, MESSAGE_RELEASE, MIN_MESSAGE_LEN};
use crate::device::types::{DeviceEvent, Events};
use crate::sim::input_sim::KeyInjector;
use crate::sim::types::KeyName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonMessage<'a> {
    Press,
    Release,
    Battery(&'a str),
    Other,
}

/// Decodes a notification payload for classification and display.
///
/// Returns `None` for payloads that are too short to be a button message. Payloads that are not
/// ASCII are rendered as lowercase hex.
pub fn decode_payload(data: &[u8]) -> Option<String> {
    if data.len() < MIN_MESSAGE_LEN {
        return None;
    }

    if data.is_ascii() {
        Some(String::from_utf8_lossy(data).into_owned())
    } else {
        Some(data.iter().map(|byte| format!("{:02x}", byte)).collect())
    }
}

pub fn classify(message: &str) -> ButtonMessage<'_> {
    if message.starts_with(MESSAGE_PRESS) {
        ButtonMessage::Press
    } else if message.starts_with(MESSAGE_RELEASE) {
        ButtonMessage::Release
    } else if message.starts_with(MESSAGE_BATTERY) {
        ButtonMessage::Battery(&message[MESSAGE_BATTERY.len()..])
    } else {
        ButtonMessage::Other
    }
}

/// Tracks whether the configured key is currently held down.
///
/// The flag is shared between the session (which forces a release when it ends) and the
/// notification task of the transport (which presses and releases). Both sides only flip it with
/// atomic compare-and-swap operations, so a key-down or key-up is never sent twice in a row.
/// Each flip and the key event that goes with it happen under `injecting`, so a forced release
/// can not overtake the key-down of a press that is still in progress.
pub struct KeyStateTracker {
    key: KeyName,
    held: AtomicBool,
    injecting: Mutex<()>,
    injector: Arc<dyn KeyInjector>,
    events: Events,
}

impl KeyStateTracker {
    pub fn new(key: KeyName, injector: Arc<dyn KeyInjector>, events: Events) -> Self {
        KeyStateTracker {
            key,
            held: AtomicBool::new(false),
            injecting: Mutex::new(()),
            injector,
            events,
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    pub fn on_notification(&self, data: &[u8]) {
        let message = match decode_payload(data) {
            Some(message) => message,
            None => {
                trace!("Ignoring short notification ({} bytes)", data.len());
                return;
            },
        };

        debug!("Received: {}", message);

        match classify(&message) {
            ButtonMessage::Press => self.press(),
            ButtonMessage::Release => self.release(),
            ButtonMessage::Battery(status) => {
                debug!("Battery status: {}", status);
                self.events.send(DeviceEvent::Battery(status.to_string()));
            },
            ButtonMessage::Other => {},
        }
    }

    fn lock_injection(&self) -> MutexGuard<'_, ()> {
        // guards no data, a panic while holding it leaves nothing inconsistent
        self.injecting.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn press(&self) {
        let _injecting = self.lock_injection();
        if self.held.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return;
        }

        info!("Button PRESSED - holding '{}'", self.key);
        match self.injector.key_down(self.key) {
            Ok(()) => self.events.send(DeviceEvent::KeyHeld(true)),
            Err(err) => {
                error!("Failed to hold '{}': {}", self.key, err);
                // the key never went down, so there is nothing to release later
                self.held.store(false, Ordering::Release);
            },
        }
    }

    fn release(&self) {
        let _injecting = self.lock_injection();
        if self.held.compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return;
        }

        info!("Button RELEASED - releasing '{}'", self.key);
        self.send_key_up();
    }

    /// Releases the key if it is held. Returns true if a key-up was sent.
    pub fn release_held(&self) -> bool {
        let _injecting = self.lock_injection();
        if !self.held.swap(false, Ordering::AcqRel) {
            return false;
        }

        info!("Releasing held key '{}'", self.key);
        self.send_key_up();
        true
    }

    /// Returns a guard that releases the key when dropped, whichever way the scope is left.
    pub fn release_guard(&self) -> KeyReleaseGuard<'_> {
        KeyReleaseGuard { tracker: self }
    }

    fn send_key_up(&self) {
        if let Err(err) = self.injector.key_up(self.key) {
            error!("Failed to release '{}': {}", self.key, err);
        }
        self.events.send(DeviceEvent::KeyHeld(false));
    }
}

pub struct KeyReleaseGuard<'a> {
    tracker: &'a KeyStateTracker,
}

impl Drop for KeyReleaseGuard<'_> {
    fn drop(&mut self) {
        self.tracker.release_held();
    }
}
