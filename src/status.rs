use futures::channel::mpsc::UnboundedReceiver;
use futures::StreamExt;

use crate::device::types::{DeviceEvent, SessionState};
use crate::sim::types::KeyName;

/// Turns device events into the status lines shown to the operator.
pub struct StatusView {
    key: KeyName,
    address: Option<String>,
    latest_state: SessionState,
}

impl StatusView {
    pub fn new(key: KeyName) -> Self {
        StatusView { key, address: None, latest_state: SessionState::Idle }
    }

    pub fn update(&mut self, event: DeviceEvent) -> Vec<String> {
        match event {
            DeviceEvent::DeviceResolved(address) => {
                self.address = Some(address);
                Vec::new()
            },
            DeviceEvent::StateChange(state) => {
                let previous = self.latest_state;
                self.latest_state = state;
                self.state_lines(previous, state)
            },
            DeviceEvent::KeyHeld(true) => vec![format!("[PTT] Button PRESSED - holding '{}'", self.key)],
            DeviceEvent::KeyHeld(false) => vec![format!("[PTT] Button RELEASED - released '{}'", self.key)],
            DeviceEvent::Battery(status) => vec![format!("[*] Battery: {}", status)],
        }
    }

    fn state_lines(&self, previous: SessionState, state: SessionState) -> Vec<String> {
        let address = self.address.as_deref().unwrap_or("device");

        match state {
            SessionState::Idle | SessionState::Resolving => Vec::new(),
            SessionState::Connecting => vec![format!("[*] Connecting to {}...", address)],
            SessionState::Subscribed => vec![
                String::from("[+] Connected successfully!"),
                format!("[*] PTT will hold '{}' key while pressed", self.key),
                String::from("[*] Listening for button presses..."),
            ],
            SessionState::Disconnected if previous == SessionState::Subscribed => {
                vec![format!("[!] Disconnected from {}", address)]
            },
            SessionState::Disconnected => Vec::new(),
            SessionState::Failed if previous == SessionState::Connecting => {
                vec![format!("[!] Failed to connect to {}", address)]
            },
            SessionState::Failed => vec![String::from("[!] Connection error")],
        }
    }
}

/// Prints a status line for every event until all senders are gone.
pub async fn print_status(mut receiver: UnboundedReceiver<DeviceEvent>, key: KeyName) {
    let mut view = StatusView::new(key);

    while let Some(event) = receiver.next().await {
        for line in view.update(event) {
            println!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> StatusView {
        let mut view = StatusView::new(KeyName::default());
        view.update(DeviceEvent::DeviceResolved(String::from("AA:BB:CC:DD:EE:01")));
        view
    }

    #[test]
    fn connected_session_reports_key() {
        let mut view = view();

        assert_eq!(view.update(DeviceEvent::StateChange(SessionState::Connecting)), vec![
            "[*] Connecting to AA:BB:CC:DD:EE:01...",
        ]);
        assert_eq!(view.update(DeviceEvent::StateChange(SessionState::Subscribed)), vec![
            "[+] Connected successfully!",
            "[*] PTT will hold 'ctrl' key while pressed",
            "[*] Listening for button presses...",
        ]);
        assert_eq!(view.update(DeviceEvent::KeyHeld(true)), vec!["[PTT] Button PRESSED - holding 'ctrl'"]);
        assert_eq!(view.update(DeviceEvent::StateChange(SessionState::Disconnected)), vec![
            "[!] Disconnected from AA:BB:CC:DD:EE:01",
        ]);
    }

    #[test]
    fn failures_depend_on_the_previous_state() {
        let mut view = view();

        view.update(DeviceEvent::StateChange(SessionState::Connecting));
        assert_eq!(view.update(DeviceEvent::StateChange(SessionState::Failed)), vec![
            "[!] Failed to connect to AA:BB:CC:DD:EE:01",
        ]);

        view.update(DeviceEvent::StateChange(SessionState::Subscribed));
        assert_eq!(view.update(DeviceEvent::StateChange(SessionState::Failed)), vec!["[!] Connection error"]);
    }

    #[test]
    fn quiet_states_print_nothing() {
        let mut view = StatusView::new(KeyName::default());

        assert!(view.update(DeviceEvent::StateChange(SessionState::Idle)).is_empty());
        assert!(view.update(DeviceEvent::StateChange(SessionState::Resolving)).is_empty());
        assert!(view.update(DeviceEvent::StateChange(SessionState::Disconnected)).is_empty());
        assert!(view.update(DeviceEvent::DeviceResolved(String::from("AA:BB:CC:DD:EE:01"))).is_empty());
    }
}
