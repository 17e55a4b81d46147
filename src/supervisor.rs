use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use futures::FutureExt;
use log::{error, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::io::AddressStore;
use crate::config::types::Settings;
use crate::device::constants::PRODUCT_NAME_TOKEN;
use crate::device::resolver::{DeviceResolver, DeviceSelector};
use crate::device::session::SessionManager;
use crate::device::transport::BleTransport;
use crate::device::types::{DeviceEvent, Events, ResolveOutcome, SessionOutcome, SessionState};
use crate::error::readable_panic_error;
use crate::sim::key_state::KeyStateTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The operator pressed Ctrl+C.
    Interrupted,
    /// The operator did not pick one of the discovered devices.
    SelectionCancelled,
}

enum Next {
    Retry(Duration),
    Stop(StopReason),
}

/// Finds the PTT button, keeps a session with it open, and starts over whenever that fails.
pub struct Supervisor<T: BleTransport> {
    resolver: DeviceResolver<T>,
    sessions: SessionManager<T>,
    // the configured address, or the one picked during discovery
    address: Option<String>,
    scan_interval: Duration,
    reconnect_delay: Duration,
    events: Events,
}

impl<T: BleTransport> Supervisor<T> {
    pub fn new(
        transport: Arc<T>,
        selector: Arc<dyn DeviceSelector>,
        store: Arc<dyn AddressStore>,
        tracker: Arc<KeyStateTracker>,
        settings: &Settings,
        events: Events,
    ) -> Self {
        Supervisor {
            resolver: DeviceResolver::new(transport.clone(), selector, store),
            sessions: SessionManager::new(transport, tracker, settings.ptt_characteristic, events.clone()),
            address: settings.mac_address.clone(),
            scan_interval: settings.scan_interval,
            reconnect_delay: settings.reconnect_delay,
            events,
        }
    }

    pub async fn run(&mut self, cancel: &CancellationToken) -> StopReason {
        loop {
            if cancel.is_cancelled() {
                return StopReason::Interrupted;
            }

            let next = match AssertUnwindSafe(self.iteration(cancel)).catch_unwind().await {
                Ok(next) => next,
                Err(panic) => {
                    error!("Unexpected error: {}", readable_panic_error(&panic));
                    self.events.send(DeviceEvent::StateChange(SessionState::Failed));
                    println!("[*] Will retry in {} seconds...", self.reconnect_delay.as_secs());
                    Next::Retry(self.reconnect_delay)
                },
            };

            match next {
                Next::Stop(reason) => return reason,
                Next::Retry(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return StopReason::Interrupted,
                        _ = sleep(delay) => {},
                    }
                },
            }
        }
    }

    async fn iteration(&mut self, cancel: &CancellationToken) -> Next {
        self.events.send(DeviceEvent::StateChange(SessionState::Idle));
        self.events.send(DeviceEvent::StateChange(SessionState::Resolving));

        let resolved = self.resolver.resolve(self.address.as_deref(), cancel).await;
        if cancel.is_cancelled() {
            return Next::Stop(StopReason::Interrupted);
        }

        let address = match resolved {
            Ok(ResolveOutcome::Found(address)) => address,
            Ok(ResolveOutcome::NotFound) => {
                println!("[!] No {} device found", PRODUCT_NAME_TOKEN);
                println!("[*] Will scan again in {} seconds...", self.scan_interval.as_secs());
                println!("[*] Make sure PTT is powered on and press button to wake it");
                println!();
                return Next::Retry(self.scan_interval);
            },
            Ok(ResolveOutcome::Cancelled) => return Next::Stop(StopReason::SelectionCancelled),
            Err(err) => {
                warn!("Scanning failed: {}", err);
                println!("[!] Bluetooth error: {}", err);
                println!("[*] Will retry in {} seconds...", self.reconnect_delay.as_secs());
                self.events.send(DeviceEvent::StateChange(SessionState::Failed));
                return Next::Retry(self.reconnect_delay);
            },
        };

        self.address = Some(address.clone());
        self.events.send(DeviceEvent::DeviceResolved(address.clone()));

        let outcome = self.sessions.run_session(&address, cancel).await;
        info!("Session with {} ended: {:?}", address, outcome);

        match outcome {
            SessionOutcome::Cancelled => Next::Stop(StopReason::Interrupted),
            _ => {
                println!("[*] Will retry connection in {} seconds...", self.reconnect_delay.as_secs());
                Next::Retry(self.reconnect_delay)
            },
        }
    }
}
