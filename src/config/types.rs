use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::DEFAULT_PTT_CHARACTERISTIC;
use crate::error::ConfigError;
use crate::sim::types::KeyName;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PttSection {
    pub mac_address: String,
    pub key_to_hold: String,
}

impl Default for PttSection {
    fn default() -> Self {
        PttSection {
            mac_address: String::new(),
            key_to_hold: String::from("ctrl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSection {
    /// Seconds to wait before scanning again when no device was found.
    pub scan_interval: u64,
    /// Seconds to wait before reconnecting after a session ended.
    pub reconnect_delay: u64,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        ConnectionSection {
            scan_interval: 5,
            reconnect_delay: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothSection {
    pub ptt_uuid: String,
}

impl Default for BluetoothSection {
    fn default() -> Self {
        BluetoothSection {
            ptt_uuid: String::from(DEFAULT_PTT_CHARACTERISTIC),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "PTT")]
    pub ptt: PttSection,
    #[serde(rename = "Connection")]
    pub connection: ConnectionSection,
    #[serde(rename = "Bluetooth")]
    pub bluetooth: BluetoothSection,
}

impl Config {
    /// The configured device address, `None` when the user has not chosen a device yet.
    pub fn mac_address(&self) -> Option<&str> {
        let address = self.ptt.mac_address.trim();
        if address.is_empty() { None } else { Some(address) }
    }
}

/// Validated runtime view of `Config`.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub mac_address: Option<String>,
    pub key_to_hold: KeyName,
    pub scan_interval: Duration,
    pub reconnect_delay: Duration,
    pub ptt_characteristic: Uuid,
}

impl TryFrom<&Config> for Settings {
    type Error = ConfigError;

    fn try_from(config: &Config) -> Result<Self, Self::Error> {
        let key_to_hold = config.ptt.key_to_hold.parse::<KeyName>()?;
        let ptt_uuid = config.bluetooth.ptt_uuid.trim();
        let ptt_characteristic = Uuid::parse_str(ptt_uuid).map_err(|source| ConfigError::InvalidUuid {
            value: ptt_uuid.to_string(),
            source,
        })?;

        Ok(Settings {
            mac_address: config.mac_address().map(String::from),
            key_to_hold,
            scan_interval: Duration::from_secs(config.connection.scan_interval),
            reconnect_delay: Duration::from_secs(config.connection.reconnect_delay),
            ptt_characteristic,
        })
    }
}
