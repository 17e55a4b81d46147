use std::time::Duration;

/**
 * How long to scan when verifying that the configured device is nearby.
 */
pub const VERIFY_SCAN_DURATION: Duration = Duration::from_secs(3);

/**
 * How long to scan when looking for any PTT device.
 */
pub const DISCOVERY_SCAN_DURATION: Duration = Duration::from_secs(5);

/**
 * How long connecting to the device may take.
 */
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/**
 * How often to check the connection status while connected.
 */
pub const LIVENESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/**
 * How long checking if the peripheral is still connected may take
 */
pub const IS_CONNECTED_DEADLINE: Duration = Duration::from_secs(2);

/**
 * How long unsubscribing and disconnecting may take when a session ends.
 */
pub const DISCONNECT_DEADLINE: Duration = Duration::from_secs(5);

/**
 * Advertised names of the PTT buttons contain this token, e.g. "ELET-PTT-01".
 */
pub const PRODUCT_NAME_TOKEN: &str = "ELET-PTT";

/**
 * The UUID of the Bluetooth BLE remote GATT characteristic that notifies button events.
 */
pub const DEFAULT_PTT_CHARACTERISTIC: &str = "0000ff02-0000-1000-8000-00805f9b34fb";

/**
 * Notifications shorter than this are noise.
 */
pub const MIN_MESSAGE_LEN: usize = 5;

pub const MESSAGE_PRESS: &str = "ELET1";
pub const MESSAGE_RELEASE: &str = "ELET2";
pub const MESSAGE_BATTERY: &str = "BATT";

/**
 * btleplug reports this address on macOS, where the peripheral id must be used instead.
 */
pub const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";
