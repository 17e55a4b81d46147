use std::sync::Arc;
use log::{debug, error, info, warn};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::{CONNECT_TIMEOUT, DISCONNECT_DEADLINE, IS_CONNECTED_DEADLINE, LIVENESS_POLL_INTERVAL};
use crate::device::transport::{BleConnection, BleTransport, NotificationHandler};
use crate::device::types::{DeviceEvent, Events, SessionOutcome, SessionState};
use crate::sim::key_state::KeyStateTracker;

/// Runs connect, subscribe, monitor and disconnect for one device at a time.
pub struct SessionManager<T: BleTransport> {
    transport: Arc<T>,
    tracker: Arc<KeyStateTracker>,
    characteristic: Uuid,
    events: Events,
}

impl<T: BleTransport> SessionManager<T> {
    pub fn new(transport: Arc<T>, tracker: Arc<KeyStateTracker>, characteristic: Uuid, events: Events) -> Self {
        SessionManager { transport, tracker, characteristic, events }
    }

    fn set_state(&self, state: SessionState) {
        debug!("Session state: {}", state);
        self.events.send(DeviceEvent::StateChange(state));
    }

    pub async fn run_session(&self, address: &str, cancel: &CancellationToken) -> SessionOutcome {
        // a key still held at this point belongs to a session that is already gone
        self.tracker.release_held();
        let _release = self.tracker.release_guard();

        self.set_state(SessionState::Connecting);
        let connection = tokio::select! {
            _ = cancel.cancelled() => {
                self.set_state(SessionState::Disconnected);
                return SessionOutcome::Cancelled;
            },
            result = timeout(CONNECT_TIMEOUT, self.transport.connect(address)) => match result {
                Ok(Ok(connection)) => connection,
                Ok(Err(err)) => {
                    warn!("Connecting to {} failed: {}", address, err);
                    self.set_state(SessionState::Failed);
                    return SessionOutcome::ConnectFailed;
                },
                Err(_) => {
                    warn!("Connecting to {} timed out after {:?}", address, CONNECT_TIMEOUT);
                    self.set_state(SessionState::Failed);
                    return SessionOutcome::ConnectFailed;
                },
            },
        };

        let outcome = self.listen(&connection, cancel).await;
        // teardown can take seconds, the key must not stay down meanwhile
        self.tracker.release_held();
        self.close(&connection).await;

        match &outcome {
            SessionOutcome::Error(err) => {
                error!("Connection error: {}", err);
                self.set_state(SessionState::Failed);
            },
            _ => self.set_state(SessionState::Disconnected),
        }

        // _release catches a press that arrived while closing
        outcome
    }

    async fn listen(&self, connection: &T::Connection, cancel: &CancellationToken) -> SessionOutcome {
        let tracker = self.tracker.clone();
        let handler: NotificationHandler = Arc::new(move |data: &[u8]| tracker.on_notification(data));

        let subscribed = tokio::select! {
            _ = cancel.cancelled() => return SessionOutcome::Cancelled,
            result = connection.subscribe(self.characteristic, handler) => result,
        };
        if let Err(err) = subscribed {
            return SessionOutcome::Error(err);
        }

        info!("Listening for button presses on {}", self.characteristic);
        self.set_state(SessionState::Subscribed);

        loop {
            // some platforms do not report a disconnect on their own, so poll for it
            tokio::select! {
                _ = cancel.cancelled() => return SessionOutcome::Cancelled,
                _ = sleep(LIVENESS_POLL_INTERVAL) => {},
            }

            let alive = tokio::select! {
                _ = cancel.cancelled() => return SessionOutcome::Cancelled,
                result = timeout(IS_CONNECTED_DEADLINE, connection.is_connected()) => result,
            };

            match alive {
                Ok(Ok(true)) => {},
                Ok(Ok(false)) => {
                    warn!("Connection lost");
                    return SessionOutcome::LostConnection;
                },
                Ok(Err(err)) => return SessionOutcome::Error(err),
                Err(_) => {
                    // macOS
                    warn!("Checking for connection status took too long");
                    return SessionOutcome::LostConnection;
                },
            }
        }
    }

    async fn close(&self, connection: &T::Connection) {
        let still_connected = matches!(
            timeout(IS_CONNECTED_DEADLINE, connection.is_connected()).await,
            Ok(Ok(true))
        );

        if still_connected {
            match timeout(DISCONNECT_DEADLINE, connection.unsubscribe(self.characteristic)).await {
                Ok(Ok(())) => {},
                Ok(Err(err)) => debug!("Failed to unsubscribe: {}", err),
                Err(_) => debug!("Unsubscribing took too long"),
            }
        }

        match timeout(DISCONNECT_DEADLINE, connection.disconnect()).await {
            Ok(Ok(())) => {},
            Ok(Err(err)) => debug!("Failed to disconnect: {}", err),
            Err(_) => warn!("Disconnecting took too long"),
        }
    }
}
