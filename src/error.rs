use std::any::Any;
use std::io;
use std::str::Utf8Error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },

    #[error("Unknown key name {name:?} (use --list-keys to see the supported names)")]
    UnknownKey { name: String },

    #[error("Invalid characteristic uuid {value:?}: {source}")]
    InvalidUuid { value: String, source: uuid::Error },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (bluetooth): {source}")]
    DeviceError { #[from] source: DeviceError },

    #[error("Failed to start application (runtime): {source}")]
    Runtime { #[from] source: io::Error },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("Device {address} is not known to any bluetooth adapter")]
    PeripheralNotFound { address: String },

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,

    #[error("Bluetooth operation timed out: {operation}")]
    Timeout { operation: &'static str },
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Failed to simulate {event}")]
    Simulate { event: String },
}

/// Formats an error together with its chain of sources, for the final fatal error report.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(cause) = source {
        let cause_message = cause.to_string();
        // thiserror messages above already embed their source
        if !message.contains(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }

    message
}

pub fn readable_panic_error(error: &Box<dyn Any + Send + 'static>) -> String {
    let mut stringified = String::from("???");

    if let Some(s) = error.downcast_ref::<&str>() {
        stringified = s.to_string();
    }
    else if let Some(s) = error.downcast_ref::<String>() {
        stringified = s.clone();
    }

    format!("panic: [{}]", stringified)
}
