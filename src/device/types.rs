use std::fmt;
use futures::channel::mpsc::UnboundedSender;
use log::debug;

use crate::error::DeviceError;

/// A device seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub address: String,
    pub name: Option<String>,
}

impl DeviceCandidate {
    pub fn new(address: impl Into<String>, name: Option<&str>) -> Self {
        DeviceCandidate { address: address.into(), name: name.map(String::from) }
    }

    pub fn matches_address(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address.trim())
    }

    pub fn name_contains(&self, token: &str) -> bool {
        self.name.as_deref().is_some_and(|name| name.contains(token))
    }
}

impl fmt::Display for DeviceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.address, self.name.as_deref().unwrap_or("(unnamed)"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    Connecting,
    Subscribed,
    Disconnected,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            SessionState::Idle => "Idle",
            SessionState::Resolving => "Resolving",
            SessionState::Connecting => "Connecting",
            SessionState::Subscribed => "Subscribed",
            SessionState::Disconnected => "Disconnected",
            SessionState::Failed => "Failed",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ResolveOutcome {
    Found(String),
    NotFound,
    Cancelled,
}

#[derive(Debug)]
pub enum SessionOutcome {
    LostConnection,
    ConnectFailed,
    Error(DeviceError),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    StateChange(SessionState),
    DeviceResolved(String),
    KeyHeld(bool),
    Battery(String),
}

/// Fans out `DeviceEvent`s to every interested receiver. Receivers that went away are skipped.
#[derive(Debug, Clone, Default)]
pub struct Events {
    senders: Vec<UnboundedSender<DeviceEvent>>,
}

impl Events {
    pub fn new(senders: Vec<UnboundedSender<DeviceEvent>>) -> Self {
        Events { senders }
    }

    pub fn send(&self, event: DeviceEvent) {
        for sender in &self.senders {
            if sender.unbounded_send(event.clone()).is_err() {
                debug!("Dropping {:?}, receiver is gone", event);
            }
        }
    }
}
